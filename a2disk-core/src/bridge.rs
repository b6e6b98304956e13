//! Mount bridge: binds a staged image to a floppy controller and back.

use crate::catalog::ImageKind;
use crate::controller::{FloppyController, ImageFile, TrackFormat};
use crate::drive::DRIVE_COUNT;
use crate::error::{DiskError, DiskResult};

/// Borrowed view of an image staged in a drive slot.
#[derive(Debug, Clone, Copy)]
pub struct StagedImage<'a> {
    pub filename: &'a str,
    pub kind: ImageKind,
    pub data: &'a [u8],
}

/// What a drive is bound to in the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub filename: String,
    pub format: TrackFormat,
    pub slot: u8,
}

/// Tracks which drive slot feeds which controller drive.
#[derive(Debug, Default, Clone)]
pub struct MountBridge {
    bindings: [Option<Binding>; DRIVE_COUNT],
}

impl MountBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binding(&self, drive: usize) -> Option<&Binding> {
        self.bindings.get(drive).and_then(|b| b.as_ref())
    }

    pub fn is_mounted(&self, drive: usize) -> bool {
        self.binding(drive).is_some()
    }

    /// Hand `image` to the controller's track loader for `drive`.
    ///
    /// Nothing in the controller changes unless an image is staged and the
    /// card answers for `slot`. A loader failure leaves the drive empty.
    pub fn mount<C: FloppyController + ?Sized>(
        &mut self,
        drive: usize,
        image: Option<StagedImage<'_>>,
        controller: &mut C,
        slot: u8,
    ) -> DiskResult<()> {
        if drive >= DRIVE_COUNT {
            return Err(DiskError::InvalidDrive(drive));
        }
        let Some(image) = image else {
            log::warn!("No disk loaded in drive {}", drive + 1);
            return Err(DiskError::NotLoaded(drive));
        };
        let Some(floppy) = controller.floppy(slot, drive) else {
            log::warn!(
                "Failed to get floppy for drive {} (slot {})",
                drive + 1,
                slot
            );
            return Err(DiskError::NoFloppy { slot, drive });
        };

        let format = TrackFormat::for_image(image.kind, image.filename);
        log::info!(
            "Mounting {} to drive {} (format={:?}, size={})",
            image.filename,
            drive + 1,
            format,
            image.data.len()
        );
        log::debug!(
            "Image head: {:02X?}",
            &image.data[..image.data.len().min(16)]
        );

        self.bindings[drive] = None;
        floppy.reinit();
        let file = ImageFile {
            pathname: image.filename,
            format,
            read_only: false,
            data: image.data,
        };
        if let Err(e) = floppy.load(&file) {
            log::warn!("Failed to load disk image to floppy: {}", e);
            floppy.reinit();
            return Err(e);
        }

        self.bindings[drive] = Some(Binding {
            filename: image.filename.to_string(),
            format,
            slot,
        });
        controller.set_bootable(slot, true);
        log::info!(
            "Disk {} mounted successfully to drive {}",
            image.filename,
            drive + 1
        );
        Ok(())
    }

    /// Empty the controller's tracks for `drive` and forget the binding. The
    /// staged image is left alone; flushing it is the drive slot's job.
    pub fn eject<C: FloppyController + ?Sized>(
        &mut self,
        drive: usize,
        controller: &mut C,
        slot: u8,
    ) -> DiskResult<()> {
        if drive >= DRIVE_COUNT {
            return Err(DiskError::InvalidDrive(drive));
        }
        let Some(floppy) = controller.floppy(slot, drive) else {
            log::warn!("Failed to get floppy for drive {}", drive + 1);
            return Err(DiskError::NoFloppy { slot, drive });
        };
        floppy.reinit();
        self.bindings[drive] = None;
        log::info!("Drive {} ejected", drive + 1);
        Ok(())
    }

    /// Copy tracks the controller wrote back into the staged image. Returns
    /// true if the image changed.
    pub fn sync<C: FloppyController + ?Sized>(
        &self,
        drive: usize,
        image: &mut [u8],
        controller: &mut C,
    ) -> DiskResult<bool> {
        let Some(binding) = self.binding(drive) else {
            return Err(DiskError::NotLoaded(drive));
        };
        let (slot, format) = (binding.slot, binding.format);
        let floppy = controller
            .floppy(slot, drive)
            .ok_or(DiskError::NoFloppy { slot, drive })?;
        floppy.store(format, image)
    }

    /// Forget a binding without touching the controller.
    pub(crate) fn unbind(&mut self, drive: usize) {
        if let Some(binding) = self.bindings.get_mut(drive) {
            *binding = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DSK_IMAGE_SIZE;
    use crate::controller::TrackStorage;
    use crate::disk2::Disk2Card;

    #[test]
    fn test_mount_without_image_leaves_controller_alone() {
        let mut bridge = MountBridge::new();
        let mut card = Disk2Card::new(6);
        assert!(matches!(
            bridge.mount(0, None, &mut card, 6),
            Err(DiskError::NotLoaded(0))
        ));
        assert!(!card.is_bootable());
        assert!(card.drive(0).unwrap().is_empty());
        assert!(!bridge.is_mounted(0));
    }

    #[test]
    fn test_mount_wrong_slot() {
        let data = vec![0u8; DSK_IMAGE_SIZE];
        let image = StagedImage {
            filename: "A.DSK",
            kind: ImageKind::Sector,
            data: &data,
        };
        let mut bridge = MountBridge::new();
        let mut card = Disk2Card::new(6);
        assert!(matches!(
            bridge.mount(0, Some(image), &mut card, 5),
            Err(DiskError::NoFloppy { slot: 5, drive: 0 })
        ));
        assert!(!card.is_bootable());
    }

    #[test]
    fn test_mount_then_eject() {
        let data = vec![0u8; DSK_IMAGE_SIZE];
        let image = StagedImage {
            filename: "GAME.PO",
            kind: ImageKind::Sector,
            data: &data,
        };
        let mut bridge = MountBridge::new();
        let mut card = Disk2Card::new(6);

        bridge.mount(1, Some(image), &mut card, 6).unwrap();
        assert!(card.is_bootable());
        assert!(!card.drive(1).unwrap().is_empty());
        assert_eq!(bridge.binding(1).unwrap().format, TrackFormat::Po);

        bridge.eject(1, &mut card, 6).unwrap();
        assert!(card.drive(1).unwrap().is_empty());
        assert!(!bridge.is_mounted(1));
    }

    #[test]
    fn test_loader_failure_leaves_drive_empty() {
        let good = vec![0u8; DSK_IMAGE_SIZE];
        let bad = vec![0u8; 100];
        let mut bridge = MountBridge::new();
        let mut card = Disk2Card::new(6);
        fn staged(data: &[u8]) -> StagedImage<'_> {
            StagedImage {
                filename: "A.DSK",
                kind: ImageKind::Sector,
                data,
            }
        }

        bridge.mount(0, Some(staged(&good)), &mut card, 6).unwrap();
        assert!(bridge.mount(0, Some(staged(&bad)), &mut card, 6).is_err());
        assert!(card.drive(0).unwrap().is_empty());
        assert!(!bridge.is_mounted(0));
    }

    #[test]
    fn test_sync_requires_binding() {
        let mut bridge = MountBridge::new();
        let mut card = Disk2Card::new(6);
        let mut image = vec![0u8; DSK_IMAGE_SIZE];
        assert!(bridge.sync(0, &mut image, &mut card).is_err());
    }
}

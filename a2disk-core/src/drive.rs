//! Drive slots and the disk subsystem staging images into them.
//!
//! `DiskSystem` owns everything the loader needs: the storage driver, the
//! catalog, the image pool shared by both drives and the mount bridge.
//! Ordering rules:
//! - `unload` flushes a dirty image before giving its pool region back
//! - `load` unloads (and so flushes) the drive before allocating
//! - a failed load leaves the drive empty and its region returned

use std::io::{self, Read, Write};

use crate::bridge::{MountBridge, StagedImage};
use crate::catalog::{Catalog, CatalogEntry, ImageKind};
use crate::config::DiskConfig;
use crate::controller::FloppyController;
use crate::error::{DiskError, DiskResult};
use crate::pool::{MemoryPool, PoolRegion};
use crate::storage::{join_path, Storage};

/// Number of Disk II drives.
pub const DRIVE_COUNT: usize = 2;

/// Image held by a loaded slot.
struct LoadedImage {
    region: PoolRegion,
    kind: ImageKind,
    filename: String,
    /// Path the image was read from; flush writes back here.
    path: String,
    dirty: bool,
}

/// Holder of at most one staged image.
#[derive(Default)]
pub struct DriveSlot {
    image: Option<LoadedImage>,
}

impl DriveSlot {
    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    /// Modified since it was loaded or last flushed.
    pub fn is_dirty(&self) -> bool {
        self.image.as_ref().is_some_and(|i| i.dirty)
    }

    pub fn filename(&self) -> Option<&str> {
        self.image.as_ref().map(|i| i.filename.as_str())
    }

    pub fn path(&self) -> Option<&str> {
        self.image.as_ref().map(|i| i.path.as_str())
    }

    pub fn kind(&self) -> Option<ImageKind> {
        self.image.as_ref().map(|i| i.kind)
    }

    /// Bytes staged (0 when empty).
    pub fn size(&self) -> usize {
        self.image.as_ref().map_or(0, |i| i.region.len())
    }
}

/// Catalog, pool, drive slots and mount bridge over one storage driver.
pub struct DiskSystem<S: Storage> {
    storage: S,
    config: DiskConfig,
    catalog: Catalog,
    pool: MemoryPool,
    drives: [DriveSlot; DRIVE_COUNT],
    bridge: MountBridge,
}

impl<S: Storage> DiskSystem<S> {
    pub fn new(storage: S, config: DiskConfig) -> Self {
        let pool = MemoryPool::new(config.pool_capacity);
        Self {
            storage,
            config,
            catalog: Catalog::new(),
            pool,
            drives: Default::default(),
            bridge: MountBridge::new(),
        }
    }

    /// First scan of the card. Returns the number of images found.
    pub fn init(&mut self) -> usize {
        let count = self.scan();
        log::info!("Found {} disk images", count);
        count
    }

    /// Rebuild the catalog. Indices from an earlier scan become invalid.
    pub fn scan(&mut self) -> usize {
        self.catalog.scan(&self.storage, &self.config)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn entry(&self, index: usize) -> Option<&CatalogEntry> {
        self.catalog.get(index)
    }

    pub fn config(&self) -> &DiskConfig {
        &self.config
    }

    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }

    pub fn bridge(&self) -> &MountBridge {
        &self.bridge
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn slot(&self, drive: usize) -> Option<&DriveSlot> {
        self.drives.get(drive)
    }

    /// Staged bytes of a loaded drive.
    pub fn image(&self, drive: usize) -> Option<&[u8]> {
        let image = self.drives.get(drive)?.image.as_ref()?;
        Some(self.pool.bytes(&image.region))
    }

    /// Mutable staged bytes of a loaded drive. The drive is marked dirty.
    pub fn image_mut(&mut self, drive: usize) -> Option<&mut [u8]> {
        let image = self.drives.get_mut(drive)?.image.as_mut()?;
        image.dirty = true;
        Some(self.pool.bytes_mut(&image.region))
    }

    /// Record that the staged image was modified.
    pub fn mark_dirty(&mut self, drive: usize) -> DiskResult<()> {
        check_drive(drive)?;
        let image = self.drives[drive]
            .image
            .as_mut()
            .ok_or(DiskError::NotLoaded(drive))?;
        image.dirty = true;
        Ok(())
    }

    /// Stage catalog entry `index` into `drive`.
    pub fn load(&mut self, drive: usize, index: usize) -> DiskResult<()> {
        check_drive(drive)?;
        let Some(entry) = self.catalog.get(index).cloned() else {
            log::warn!("Invalid disk index: {}", index);
            return Err(DiskError::InvalidIndex(index));
        };

        self.unload(drive)?;

        let size = usize::try_from(entry.size).map_err(|_| DiskError::PoolExhausted {
            requested: usize::MAX,
            available: self.pool.available(),
        })?;

        let primary = join_path(&self.config.image_dir, &entry.filename);
        log::info!("Loading {} to drive {}...", primary, drive + 1);
        let (path, mut reader) = match self.storage.open_read(&primary) {
            Ok(reader) => (primary, reader),
            Err(_) => {
                let fallback = join_path(&self.config.fallback_dir, &entry.filename);
                match self.storage.open_read(&fallback) {
                    Ok(reader) => (fallback, reader),
                    Err(e) => {
                        log::warn!("Failed to open {}: {}", fallback, e);
                        return Err(e);
                    }
                }
            }
        };

        let region = self.pool.alloc(size)?;
        let read = read_full(&mut reader, self.pool.bytes_mut(&region));
        drop(reader);

        let failure = match read {
            Ok(n) if n == size => None,
            Ok(n) => Some(DiskError::ShortRead {
                path: path.clone(),
                read: n,
                expected: size,
            }),
            Err(e) => Some(DiskError::Io(e)),
        };
        if let Some(e) = failure {
            log::warn!("Failed to read {}: {}", path, e);
            let idle = self.all_idle();
            self.pool.free(region, idle);
            return Err(e);
        }

        if !entry.is_nominal_size() {
            log::warn!(
                "{}: {} bytes is not a standard {:?} image size",
                entry.filename,
                size,
                entry.kind
            );
        }
        log::info!(
            "Loaded {} to drive {} ({} bytes)",
            entry.filename,
            drive + 1,
            size
        );
        self.drives[drive].image = Some(LoadedImage {
            region,
            kind: entry.kind,
            filename: entry.filename,
            path,
            dirty: false,
        });
        Ok(())
    }

    /// Flush a dirty image, then empty the drive. If the flush fails the
    /// image stays loaded and dirty. A drive still mounted in a controller
    /// is refused: its unsynced tracks would be lost.
    pub fn unload(&mut self, drive: usize) -> DiskResult<()> {
        check_drive(drive)?;
        if self.bridge.is_mounted(drive) {
            log::warn!("Drive {} is still mounted", drive + 1);
            return Err(DiskError::StillMounted(drive));
        }
        if !self.drives[drive].is_loaded() {
            return Ok(());
        }
        if self.drives[drive].is_dirty() {
            self.flush(drive)?;
        }
        self.release(drive);
        Ok(())
    }

    /// Empty the drive without writing pending changes back.
    pub fn discard(&mut self, drive: usize) -> DiskResult<()> {
        check_drive(drive)?;
        let slot = &self.drives[drive];
        if let Some(name) = slot.filename().filter(|_| slot.is_dirty()) {
            log::warn!("Discarding unsaved changes to {}", name);
        }
        self.release(drive);
        Ok(())
    }

    /// Write a dirty image back to the path it was loaded from. The dirty
    /// flag is only cleared once every byte is written.
    pub fn flush(&mut self, drive: usize) -> DiskResult<()> {
        check_drive(drive)?;
        let image = match &self.drives[drive].image {
            Some(image) if image.dirty => image,
            _ => return Ok(()),
        };

        log::info!("Writing back {}...", image.path);
        let data = self.pool.bytes(&image.region);
        if let Err(e) = write_full(&mut self.storage, &image.path, data) {
            log::warn!("Failed to write {}: {}", image.path, e);
            return Err(e);
        }
        log::info!("Written {} ({} bytes)", image.filename, data.len());

        if let Some(image) = self.drives[drive].image.as_mut() {
            image.dirty = false;
        }
        Ok(())
    }

    /// Hand a loaded drive to the controller.
    pub fn mount<C: FloppyController + ?Sized>(
        &mut self,
        drive: usize,
        controller: &mut C,
        slot: u8,
    ) -> DiskResult<()> {
        check_drive(drive)?;
        let pool = &self.pool;
        let staged = self.drives[drive]
            .image
            .as_ref()
            .map(|image| StagedImage {
                filename: &image.filename,
                kind: image.kind,
                data: pool.bytes(&image.region),
            });
        self.bridge.mount(drive, staged, controller, slot)
    }

    /// Empty the controller's drive. Tracks written by the controller are
    /// pulled into the staged image first; the image is not flushed.
    pub fn eject<C: FloppyController + ?Sized>(
        &mut self,
        drive: usize,
        controller: &mut C,
        slot: u8,
    ) -> DiskResult<()> {
        if self.bridge.is_mounted(drive) {
            self.sync(drive, controller)?;
        }
        self.bridge.eject(drive, controller, slot)
    }

    /// Pull controller writes into the staged image, marking the drive dirty
    /// when bytes changed.
    pub fn sync<C: FloppyController + ?Sized>(
        &mut self,
        drive: usize,
        controller: &mut C,
    ) -> DiskResult<bool> {
        check_drive(drive)?;
        let image = self.drives[drive]
            .image
            .as_mut()
            .ok_or(DiskError::NotLoaded(drive))?;
        let changed = self
            .bridge
            .sync(drive, self.pool.bytes_mut(&image.region), controller)?;
        if changed {
            log::debug!("Drive {} modified by controller", drive + 1);
            image.dirty = true;
        }
        Ok(changed)
    }

    /// Unload every drive. All drives are attempted; the first error is
    /// returned.
    pub fn shutdown(&mut self) -> DiskResult<()> {
        let mut result = Ok(());
        for drive in 0..DRIVE_COUNT {
            if let Err(e) = self.unload(drive) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// Give the storage driver back.
    pub fn into_storage(self) -> S {
        self.storage
    }

    fn all_idle(&self) -> bool {
        self.drives.iter().all(|d| !d.is_loaded())
    }

    fn release(&mut self, drive: usize) {
        if let Some(image) = self.drives[drive].image.take() {
            let idle = self.all_idle();
            self.pool.free(image.region, idle);
            self.bridge.unbind(drive);
            log::info!("Unloaded drive {}", drive + 1);
        }
    }
}

fn check_drive(drive: usize) -> DiskResult<()> {
    if drive < DRIVE_COUNT {
        Ok(())
    } else {
        log::warn!("Invalid drive: {}", drive);
        Err(DiskError::InvalidDrive(drive))
    }
}

/// Read until `buf` is full or the file ends.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn write_full<S: Storage + ?Sized>(storage: &mut S, path: &str, data: &[u8]) -> DiskResult<()> {
    let mut writer = storage.open_write(path)?;
    let mut written = 0;
    while written < data.len() {
        match writer.write(&data[written..]) {
            Ok(0) => {
                return Err(DiskError::ShortWrite {
                    path: path.to_string(),
                    written,
                    expected: data.len(),
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn system(files: &[(&str, Vec<u8>)]) -> DiskSystem<MemoryStorage> {
        let storage = MemoryStorage::with_files(files.iter().cloned());
        let mut disks = DiskSystem::new(storage, DiskConfig::default());
        disks.init();
        disks
    }

    fn index_of<S: Storage>(disks: &DiskSystem<S>, name: &str) -> usize {
        disks.catalog().position(name).unwrap()
    }

    #[test]
    fn test_load_copies_file_exactly() {
        let data: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        let mut disks = system(&[("/apple/A.DSK", data.clone())]);
        disks.load(0, index_of(&disks, "A.DSK")).unwrap();

        let slot = disks.slot(0).unwrap();
        assert!(slot.is_loaded());
        assert!(!slot.is_dirty());
        assert_eq!(slot.size(), 1000);
        assert_eq!(slot.kind(), Some(ImageKind::Sector));
        assert_eq!(slot.path(), Some("/apple/A.DSK"));
        assert_eq!(disks.image(0).unwrap(), &data[..]);
    }

    #[test]
    fn test_load_rejects_bad_drive_and_index() {
        let mut disks = system(&[("/apple/A.DSK", vec![1u8; 8])]);
        assert!(matches!(disks.load(2, 0), Err(DiskError::InvalidDrive(2))));
        assert!(matches!(disks.load(0, 5), Err(DiskError::InvalidIndex(5))));
        assert_eq!(disks.pool().used(), 0);
        assert!(!disks.slot(0).unwrap().is_loaded());
    }

    #[test]
    fn test_bad_index_keeps_current_image() {
        let mut disks = system(&[("/apple/A.DSK", vec![1u8; 8])]);
        disks.load(0, 0).unwrap();
        disks.mark_dirty(0).unwrap();
        assert!(disks.load(0, 9).is_err());
        assert!(disks.slot(0).unwrap().is_dirty());
    }

    #[test]
    fn test_load_falls_back_to_root_path() {
        let mut disks = system(&[("/apple/A.DSK", vec![1u8; 8])]);
        let index = index_of(&disks, "A.DSK");
        disks.storage_mut().remove_file("/apple/A.DSK");
        disks.storage_mut().add_file("/A.DSK", vec![2u8; 8]);

        disks.load(1, index).unwrap();
        assert_eq!(disks.slot(1).unwrap().path(), Some("/A.DSK"));
        assert_eq!(disks.image(1).unwrap(), &[2u8; 8]);
    }

    #[test]
    fn test_load_missing_file_leaves_drive_empty() {
        let mut disks = system(&[("/apple/A.DSK", vec![1u8; 8])]);
        disks.storage_mut().remove_file("/apple/A.DSK");
        assert!(matches!(disks.load(0, 0), Err(DiskError::NotFound(_))));
        assert!(!disks.slot(0).unwrap().is_loaded());
        assert_eq!(disks.pool().used(), 0);
    }

    #[test]
    fn test_short_read_leaves_drive_empty() {
        let mut disks = system(&[("/apple/A.DSK", vec![1u8; 64])]);
        // File shrank after the scan.
        disks.storage_mut().add_file("/apple/A.DSK", vec![1u8; 10]);
        assert!(matches!(
            disks.load(0, 0),
            Err(DiskError::ShortRead {
                read: 10,
                expected: 64,
                ..
            })
        ));
        assert!(!disks.slot(0).unwrap().is_loaded());
        assert!(disks.image(0).is_none());
        assert_eq!(disks.pool().used(), 0);
    }

    #[test]
    fn test_pool_exhaustion_leaves_drive_empty() {
        let storage = MemoryStorage::with_files([
            ("/apple/A.DSK", vec![1u8; 40]),
            ("/apple/B.DSK", vec![2u8; 40]),
        ]);
        let config = DiskConfig {
            pool_capacity: 64,
            ..DiskConfig::default()
        };
        let mut disks = DiskSystem::new(storage, config);
        disks.init();

        disks.load(0, index_of(&disks, "A.DSK")).unwrap();
        assert!(matches!(
            disks.load(1, index_of(&disks, "B.DSK")),
            Err(DiskError::PoolExhausted { .. })
        ));
        assert!(!disks.slot(1).unwrap().is_loaded());
        assert!(disks.slot(0).unwrap().is_loaded());
    }

    #[test]
    fn test_pool_resets_only_when_both_empty() {
        let mut disks = system(&[
            ("/apple/A.DSK", vec![1u8; 16]),
            ("/apple/B.NIB", vec![2u8; 16]),
        ]);
        disks.load(0, index_of(&disks, "A.DSK")).unwrap();
        disks.load(1, index_of(&disks, "B.NIB")).unwrap();
        assert_eq!(disks.pool().used(), 32);

        disks.unload(0).unwrap();
        assert_eq!(disks.pool().used(), 32);
        assert_eq!(disks.image(1).unwrap(), &[2u8; 16]);

        disks.unload(1).unwrap();
        assert_eq!(disks.pool().used(), 0);
    }

    #[test]
    fn test_flush_clean_or_empty_is_noop() {
        let mut disks = system(&[("/apple/A.DSK", vec![1u8; 8])]);
        disks.storage_mut().set_read_only(true);
        assert!(disks.flush(0).is_ok());
        disks.load(0, 0).unwrap();
        assert!(disks.flush(0).is_ok());
    }

    #[test]
    fn test_flush_writes_back_and_clears_dirty() {
        let mut disks = system(&[("/apple/A.DSK", vec![0u8; 8])]);
        disks.load(0, 0).unwrap();
        disks.image_mut(0).unwrap()[3] = 0x42;
        assert!(disks.slot(0).unwrap().is_dirty());

        disks.flush(0).unwrap();
        assert!(!disks.slot(0).unwrap().is_dirty());
        assert_eq!(disks.storage().file("/apple/A.DSK").unwrap()[3], 0x42);
    }

    #[test]
    fn test_flush_failure_keeps_dirty() {
        let mut disks = system(&[("/apple/A.DSK", vec![0u8; 8])]);
        disks.load(0, 0).unwrap();
        disks.image_mut(0).unwrap()[0] = 0xFF;
        disks.storage_mut().set_read_only(true);

        assert!(matches!(disks.flush(0), Err(DiskError::ReadOnly)));
        assert!(disks.slot(0).unwrap().is_dirty());

        // Unload refuses to drop unsaved data.
        assert!(disks.unload(0).is_err());
        assert!(disks.slot(0).unwrap().is_loaded());

        disks.storage_mut().set_read_only(false);
        disks.unload(0).unwrap();
        assert_eq!(disks.storage().file("/apple/A.DSK").unwrap()[0], 0xFF);
    }

    #[test]
    fn test_load_over_dirty_drive_flushes_first() {
        let mut disks = system(&[
            ("/apple/A.DSK", vec![0u8; 8]),
            ("/apple/B.DSK", vec![7u8; 8]),
        ]);
        disks.load(0, index_of(&disks, "A.DSK")).unwrap();
        disks.image_mut(0).unwrap().copy_from_slice(&[9u8; 8]);

        disks.load(0, index_of(&disks, "B.DSK")).unwrap();
        assert_eq!(disks.storage().file("/apple/A.DSK").unwrap(), &[9u8; 8]);
        assert_eq!(disks.slot(0).unwrap().filename(), Some("B.DSK"));
        assert_eq!(disks.image(0).unwrap(), &[7u8; 8]);
    }

    #[test]
    fn test_discard_drops_changes() {
        let mut disks = system(&[("/apple/A.DSK", vec![0u8; 8])]);
        disks.load(0, 0).unwrap();
        disks.image_mut(0).unwrap()[0] = 1;
        disks.discard(0).unwrap();
        assert!(!disks.slot(0).unwrap().is_loaded());
        assert_eq!(disks.storage().file("/apple/A.DSK").unwrap()[0], 0);
    }

    #[test]
    fn test_mark_dirty_requires_image() {
        let mut disks = system(&[]);
        assert!(matches!(disks.mark_dirty(1), Err(DiskError::NotLoaded(1))));
        assert!(matches!(disks.mark_dirty(3), Err(DiskError::InvalidDrive(3))));
    }

    #[test]
    fn test_shutdown_unloads_everything() {
        let mut disks = system(&[
            ("/apple/A.DSK", vec![0u8; 8]),
            ("/apple/B.DSK", vec![0u8; 8]),
        ]);
        disks.load(0, index_of(&disks, "A.DSK")).unwrap();
        disks.load(1, index_of(&disks, "B.DSK")).unwrap();
        disks.image_mut(1).unwrap()[0] = 5;
        disks.shutdown().unwrap();
        assert!(!disks.slot(0).unwrap().is_loaded());
        assert!(!disks.slot(1).unwrap().is_loaded());
        assert_eq!(disks.pool().used(), 0);

        let storage = disks.into_storage();
        assert_eq!(storage.file("/apple/A.DSK").unwrap()[0], 0);
        assert_eq!(storage.file("/apple/B.DSK").unwrap()[0], 5);
    }
}

//! Floppy controller collaborator: what the mount bridge needs from an
//! emulated Disk II card.

use crate::catalog::{extension, ImageKind};
use crate::error::DiskResult;

/// On-disk layout tag handed to the track loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackFormat {
    /// `.dsk`: sector image, DOS 3.3 order assumed.
    Dsk,
    /// `.do`: sector image in DOS 3.3 order.
    Do,
    /// `.po`: sector image in ProDOS order.
    Po,
    Nib,
    Woz,
}

impl TrackFormat {
    /// Pick the loader format for a staged image. Sector images are told
    /// apart by extension.
    pub fn for_image(kind: ImageKind, filename: &str) -> Self {
        match kind {
            ImageKind::Sector => match extension(filename) {
                Some(ext) if ext.eq_ignore_ascii_case("po") => TrackFormat::Po,
                Some(ext) if ext.eq_ignore_ascii_case("do") => TrackFormat::Do,
                _ => TrackFormat::Dsk,
            },
            ImageKind::Nibble => TrackFormat::Nib,
            ImageKind::Flux => TrackFormat::Woz,
        }
    }
}

/// An image as presented to the image-to-tracks loader.
#[derive(Debug, Clone, Copy)]
pub struct ImageFile<'a> {
    pub pathname: &'a str,
    pub format: TrackFormat,
    pub read_only: bool,
    pub data: &'a [u8],
}

impl ImageFile<'_> {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Per-drive track storage inside the controller.
pub trait TrackStorage {
    /// Drop every track; the drive reads as empty.
    fn reinit(&mut self);

    /// Decode an image into tracks.
    fn load(&mut self, image: &ImageFile<'_>) -> DiskResult<()>;

    /// True when no track holds data.
    fn is_empty(&self) -> bool;

    /// Encode tracks written since the last load/store back into `image`,
    /// laid out as `format`. Returns true if any byte of `image` changed.
    fn store(&mut self, format: TrackFormat, image: &mut [u8]) -> DiskResult<bool>;
}

/// A machine hosting Disk II cards.
pub trait FloppyController {
    /// Track storage for `drive` of the card in `slot`. `None` if the slot
    /// holds no Disk II card or the drive does not exist.
    fn floppy(&mut self, slot: u8, drive: usize) -> Option<&mut dyn TrackStorage>;

    /// Enable or disable the boot signature of the card in `slot`.
    fn set_bootable(&mut self, slot: u8, enable: bool);
}

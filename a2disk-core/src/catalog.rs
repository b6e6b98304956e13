//! Disk image catalog: which images the card holds.

use serde::Serialize;

use crate::config::DiskConfig;
use crate::storage::Storage;

/// Size of a 140KB sector image (35 tracks x 16 sectors x 256 bytes).
pub const DSK_IMAGE_SIZE: usize = 143_360;

/// Size of a nibble image (35 tracks x 6656 bytes).
pub const NIB_IMAGE_SIZE: usize = 232_960;

/// Image family, derived from the filename extension only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// `.dsk`, `.do`, `.po` sector images.
    Sector,
    /// `.nib` raw nibble images.
    Nibble,
    /// `.woz` flux-level images.
    Flux,
}

impl ImageKind {
    /// Size every well-formed image of this family has, if fixed.
    pub fn nominal_size(self) -> Option<usize> {
        match self {
            ImageKind::Sector => Some(DSK_IMAGE_SIZE),
            ImageKind::Nibble => Some(NIB_IMAGE_SIZE),
            ImageKind::Flux => None,
        }
    }
}

/// Extension of `filename` (text after the last dot).
pub(crate) fn extension(filename: &str) -> Option<&str> {
    filename.rfind('.').map(|pos| &filename[pos + 1..])
}

/// Classify an image by extension, case-insensitively. `None` for anything
/// that is not a disk image.
///
/// # Examples
/// ```
/// use a2disk_core::{classify, ImageKind};
/// assert_eq!(classify("GAME.DSK"), Some(ImageKind::Sector));
/// assert_eq!(classify("game.woz"), Some(ImageKind::Flux));
/// assert_eq!(classify("NOTES.TXT"), None);
/// ```
pub fn classify(filename: &str) -> Option<ImageKind> {
    let ext = extension(filename)?.to_ascii_lowercase();
    match ext.as_str() {
        "dsk" | "do" | "po" => Some(ImageKind::Sector),
        "nib" => Some(ImageKind::Nibble),
        "woz" => Some(ImageKind::Flux),
        _ => None,
    }
}

/// One image found on storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub filename: String,
    pub size: u64,
    pub kind: ImageKind,
}

impl CatalogEntry {
    /// True when the size matches the family's fixed image size, or the
    /// family has none.
    pub fn is_nominal_size(&self) -> bool {
        self.kind
            .nominal_size()
            .map_or(true, |nominal| self.size == nominal as u64)
    }
}

/// List of images built by the last scan. Indices are only valid until the
/// next scan.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    dir: Option<String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the list from storage. Tries `config.image_dir`, then
    /// `config.fallback_dir`; if both fail the catalog is empty. Returns the
    /// number of accepted images.
    pub fn scan<S: Storage + ?Sized>(&mut self, storage: &S, config: &DiskConfig) -> usize {
        self.entries.clear();
        self.dir = None;

        let (dir, listing) = match storage.read_dir(&config.image_dir) {
            Ok(listing) => {
                log::info!("Scanning {} directory...", config.image_dir);
                (&config.image_dir, listing)
            }
            Err(_) => {
                log::info!(
                    "{} not found, checking {}",
                    config.image_dir,
                    config.fallback_dir
                );
                match storage.read_dir(&config.fallback_dir) {
                    Ok(listing) => (&config.fallback_dir, listing),
                    Err(e) => {
                        log::warn!("Failed to open directory: {}", e);
                        return 0;
                    }
                }
            }
        };

        for entry in listing {
            if self.entries.len() >= config.max_images {
                break;
            }
            if entry.is_dir {
                continue;
            }
            let Some(kind) = classify(&entry.name) else {
                continue;
            };
            if entry.name.len() >= config.max_filename_len {
                log::debug!("Skipping {}: name too long", entry.name);
                continue;
            }

            log::debug!(
                "  [{}] {} ({} bytes, {:?})",
                self.entries.len(),
                entry.name,
                entry.size,
                kind
            );
            self.entries.push(CatalogEntry {
                filename: entry.name,
                size: entry.size,
                kind,
            });
        }

        self.dir = Some(dir.clone());
        self.entries.len()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Directory the last successful scan listed.
    pub fn scanned_dir(&self) -> Option<&str> {
        self.dir.as_deref()
    }

    /// Position of an image by name (case-insensitive).
    pub fn position(&self, filename: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.filename.eq_ignore_ascii_case(filename))
    }
}

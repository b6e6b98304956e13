//! Loader configuration.
//!
//! Read from a camelCase JSON file; every field is optional and falls back
//! to the values of the reference board.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DiskResult;
use crate::pool::DEFAULT_POOL_CAPACITY;

/// Maximum number of catalog entries.
pub const MAX_DISK_IMAGES: usize = 32;

/// Maximum filename length, terminator included.
pub const MAX_FILENAME_LEN: usize = 64;

/// Slot the Disk II card is usually installed in.
pub const DEFAULT_DISK2_SLOT: u8 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiskConfig {
    /// Preferred directory holding images.
    pub image_dir: String,
    /// Directory scanned (and searched on load) when `image_dir` fails.
    pub fallback_dir: String,
    pub max_images: usize,
    pub max_filename_len: usize,
    /// Pool capacity in bytes.
    pub pool_capacity: usize,
    /// Disk II slot number.
    pub slot: u8,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            image_dir: "/apple".to_string(),
            fallback_dir: "/".to_string(),
            max_images: MAX_DISK_IMAGES,
            max_filename_len: MAX_FILENAME_LEN,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            slot: DEFAULT_DISK2_SLOT,
        }
    }
}

impl DiskConfig {
    /// Parse a JSON document.
    pub fn from_json(text: &str) -> DiskResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a JSON file.
    pub fn from_path(path: &Path) -> DiskResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

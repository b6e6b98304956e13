//! Storage trait - the filesystem driver seen by the disk loader.

use std::io::{Read, Write};

use crate::error::DiskResult;

/// One directory entry as reported by the storage driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Filesystem interface for the card holding disk images.
/// Paths are absolute and `/`-separated (`/apple/GAME.DSK`).
pub trait Storage {
    /// List a directory in storage order.
    fn read_dir(&self, dir: &str) -> DiskResult<Vec<DirEntry>>;

    /// Open an existing file for reading.
    fn open_read(&self, path: &str) -> DiskResult<Box<dyn Read + '_>>;

    /// Open an existing file for rewriting from offset zero. Never creates
    /// a file.
    fn open_write(&mut self, path: &str) -> DiskResult<Box<dyn Write + '_>>;
}

/// Join a directory and a file name with exactly one separator.
///
/// # Examples
/// ```
/// use a2disk_core::join_path;
/// assert_eq!(join_path("/apple", "GAME.DSK"), "/apple/GAME.DSK");
/// assert_eq!(join_path("/", "GAME.DSK"), "/GAME.DSK");
/// ```
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

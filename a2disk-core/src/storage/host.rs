//! Host filesystem storage: a directory standing in for the card root.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use super::backend::{DirEntry, Storage};
use crate::error::{DiskError, DiskResult};

/// Storage rooted at a host directory. `/apple/A.DSK` maps to
/// `<root>/apple/A.DSK`.
#[derive(Debug, Clone)]
pub struct HostStorage {
    root: PathBuf,
}

impl HostStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn not_found(path: &str, err: io::Error) -> DiskError {
    if err.kind() == io::ErrorKind::NotFound {
        DiskError::NotFound(path.to_string())
    } else {
        DiskError::Io(err)
    }
}

/// Keep the entries listed before the first failing one.
fn collect_entries<I>(dir: &str, listing: I) -> Vec<DirEntry>
where
    I: IntoIterator<Item = io::Result<DirEntry>>,
{
    let mut entries = Vec::new();
    for entry in listing {
        match entry {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                log::warn!("Listing {} stopped early: {}", dir, e);
                break;
            }
        }
    }
    entries
}

impl Storage for HostStorage {
    fn read_dir(&self, dir: &str) -> DiskResult<Vec<DirEntry>> {
        let listing = std::fs::read_dir(self.resolve(dir)).map_err(|e| not_found(dir, e))?;
        Ok(collect_entries(dir, listing.map(|entry| -> io::Result<DirEntry> {
            let entry = entry?;
            let meta = entry.metadata()?;
            Ok(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                is_dir: meta.is_dir(),
            })
        })))
    }

    fn open_read(&self, path: &str) -> DiskResult<Box<dyn Read + '_>> {
        let file = File::open(self.resolve(path)).map_err(|e| not_found(path, e))?;
        Ok(Box::new(file))
    }

    fn open_write(&mut self, path: &str) -> DiskResult<Box<dyn Write + '_>> {
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.resolve(path))
            .map_err(|e| not_found(path, e))?;
        Ok(Box::new(file))
    }
}

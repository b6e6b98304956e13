//! In-memory storage implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

use super::backend::{DirEntry, Storage};
use crate::error::{DiskError, DiskResult};

/// Simple in-memory tree of directories and files.
#[derive(Clone)]
pub struct MemoryStorage {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    read_only: bool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create an empty tree holding only the root directory.
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            dirs: BTreeSet::from(["/".to_string()]),
            read_only: false,
        }
    }

    /// Create with initial files (parent directories are created).
    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: AsRef<str>,
    {
        let mut storage = Self::new();
        for (path, data) in files {
            storage.add_file(path.as_ref(), data);
        }
        storage
    }

    /// Add or replace a file.
    pub fn add_file(&mut self, path: &str, data: impl Into<Vec<u8>>) {
        let path = normalize(path);
        self.add_dir(parent(&path));
        self.files.insert(path, data.into());
    }

    /// Add a directory and its parents.
    pub fn add_dir(&mut self, path: &str) {
        let mut path = normalize(path);
        while self.dirs.insert(path.clone()) {
            path = parent(&path).to_string();
        }
    }

    /// Remove a file. Returns true if it existed.
    pub fn remove_file(&mut self, path: &str) -> bool {
        self.files.remove(&normalize(path)).is_some()
    }

    /// Current content of a file.
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(&normalize(path)).map(|f| f.as_slice())
    }

    /// Refuse (or allow again) every write.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }
}

impl Storage for MemoryStorage {
    fn read_dir(&self, dir: &str) -> DiskResult<Vec<DirEntry>> {
        let dir = normalize(dir);
        if !self.dirs.contains(&dir) {
            return Err(DiskError::NotFound(dir));
        }

        let subdirs = self
            .dirs
            .iter()
            .filter(|d| d.as_str() != "/" && parent(d) == dir)
            .map(|d| DirEntry {
                name: file_name(d).to_string(),
                size: 0,
                is_dir: true,
            });
        let files = self
            .files
            .iter()
            .filter(|(path, _)| parent(path) == dir)
            .map(|(path, data)| DirEntry {
                name: file_name(path).to_string(),
                size: data.len() as u64,
                is_dir: false,
            });
        Ok(subdirs.chain(files).collect())
    }

    fn open_read(&self, path: &str) -> DiskResult<Box<dyn Read + '_>> {
        let path = normalize(path);
        match self.files.get(&path) {
            Some(data) => Ok(Box::new(data.as_slice())),
            None => Err(DiskError::NotFound(path)),
        }
    }

    fn open_write(&mut self, path: &str) -> DiskResult<Box<dyn Write + '_>> {
        if self.read_only {
            return Err(DiskError::ReadOnly);
        }
        let path = normalize(path);
        match self.files.get_mut(&path) {
            Some(data) => {
                data.clear();
                Ok(Box::new(data))
            }
            None => Err(DiskError::NotFound(path)),
        }
    }
}

/// Absolute path without trailing separator.
fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{}", trimmed)
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(pos) => &path[..pos],
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

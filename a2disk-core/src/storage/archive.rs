//! Read-only storage unpacked from a ZIP bundle of disk images.

use std::io::{Read, Seek, Write};
use std::path::Path;

use zip::ZipArchive;

use super::backend::{DirEntry, Storage};
use super::memory::MemoryStorage;
use crate::error::{DiskError, DiskResult};

/// Disk images distributed as a ZIP archive. Archive paths become absolute
/// storage paths (`apple/A.DSK` -> `/apple/A.DSK`). Writes are refused, so a
/// modified image stays dirty in its drive.
#[derive(Clone)]
pub struct ArchiveStorage {
    tree: MemoryStorage,
}

impl ArchiveStorage {
    /// Unpack every entry of a ZIP archive.
    pub fn from_reader<R: Read + Seek>(reader: R) -> DiskResult<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut tree = MemoryStorage::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            if file.is_dir() {
                tree.add_dir(&name);
                continue;
            }

            let mut content = Vec::new();
            file.read_to_end(&mut content)?;
            tree.add_file(&name, content);
        }

        tree.set_read_only(true);
        Ok(Self { tree })
    }

    /// Unpack a ZIP archive from a host path.
    pub fn from_path(path: &Path) -> DiskResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }
}

impl Storage for ArchiveStorage {
    fn read_dir(&self, dir: &str) -> DiskResult<Vec<DirEntry>> {
        self.tree.read_dir(dir)
    }

    fn open_read(&self, path: &str) -> DiskResult<Box<dyn Read + '_>> {
        self.tree.open_read(path)
    }

    fn open_write(&mut self, _path: &str) -> DiskResult<Box<dyn Write + '_>> {
        Err(DiskError::ReadOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn create_test_zip() -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = Cursor::new(&mut buf);
            let mut zip = zip::ZipWriter::new(cursor);

            zip.start_file::<_, ()>("apple/GAME.DSK", Default::default())
                .unwrap();
            zip.write_all(&[0xA5; 16]).unwrap();

            zip.start_file::<_, ()>("README.TXT", Default::default())
                .unwrap();
            zip.write_all(b"Disk bundle").unwrap();

            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_archive_tree() {
        let storage = ArchiveStorage::from_reader(Cursor::new(create_test_zip())).unwrap();

        let root = storage.read_dir("/").unwrap();
        assert!(root.iter().any(|e| e.name == "apple" && e.is_dir));
        assert!(root.iter().any(|e| e.name == "README.TXT"));

        let apple = storage.read_dir("/apple").unwrap();
        assert_eq!(apple.len(), 1);
        assert_eq!(apple[0].size, 16);

        let mut data = Vec::new();
        storage
            .open_read("/apple/GAME.DSK")
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        assert_eq!(data, vec![0xA5; 16]);
    }

    #[test]
    fn test_archive_is_read_only() {
        let mut storage = ArchiveStorage::from_reader(Cursor::new(create_test_zip())).unwrap();
        assert!(matches!(
            storage.open_write("/apple/GAME.DSK"),
            Err(DiskError::ReadOnly)
        ));
    }
}

//! Storage collaborators the disk loader reads images from.
//!
//! - `Storage`: directory listing plus file open for read/write
//! - `HostStorage`: a directory on the host acting as the card root
//! - `MemoryStorage`: in-memory tree
//! - `ArchiveStorage`: read-only tree unpacked from a ZIP bundle

mod archive;
mod backend;
mod host;
mod memory;

pub use archive::ArchiveStorage;
pub use backend::{join_path, DirEntry, Storage};
pub use host::HostStorage;
pub use memory::MemoryStorage;

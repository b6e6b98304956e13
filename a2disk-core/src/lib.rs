//! Apple II Disk Staging Core
//!
//! This crate provides the pieces an emulator needs to get disk images from
//! a storage card into an emulated Disk II controller:
//! - Banked memory with per-page I/O intercepts and video dirty tracking
//! - Disk image catalog built from a storage directory
//! - Monotonic image pool shared by the two drives
//!
//! # Architecture
//!
//! - `Storage` trait: directory listing and file access (host, memory, ZIP)
//! - `Catalog`: images found by the last scan, classified by extension
//! - `DiskSystem`: drive slots staging catalog entries into the pool
//! - `MountBridge`: hands staged images to a `FloppyController` and pulls
//!   written tracks back
//! - `Bank`: address-space region with `PageHandler` intercepts; `Paddles`
//!   is one such handler

pub mod analog;
pub mod bank;
pub mod bridge;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod disk2;
pub mod drive;
pub mod error;
pub mod pool;
pub mod storage;

pub use analog::Paddles;
pub use bank::{
    shared_handler, Bank, DirtyPages, IdentityMap, PageAccess, PageHandler, PageMap, SharedRam,
    VideoPages, PAGE_SIZE,
};
pub use bridge::{Binding, MountBridge, StagedImage};
pub use catalog::{classify, Catalog, CatalogEntry, ImageKind, DSK_IMAGE_SIZE, NIB_IMAGE_SIZE};
pub use config::DiskConfig;
pub use controller::{FloppyController, ImageFile, TrackFormat, TrackStorage};
pub use disk2::{Disk2Card, Floppy, RawTrackCodec, Track, TrackCodec, TRACK_COUNT};
pub use drive::{DiskSystem, DriveSlot, DRIVE_COUNT};
pub use error::{DiskError, DiskResult};
pub use pool::{MemoryPool, PoolRegion};
pub use storage::{join_path, ArchiveStorage, DirEntry, HostStorage, MemoryStorage, Storage};

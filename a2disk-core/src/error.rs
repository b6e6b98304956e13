//! Error types for the disk staging core.

use thiserror::Error;

/// Errors raised by banks, the image pool, drive slots and the mount bridge.
#[derive(Error, Debug)]
pub enum DiskError {
    #[error("Invalid drive: {0}")]
    InvalidDrive(usize),

    #[error("Invalid disk index: {0}")]
    InvalidIndex(usize),

    #[error("Invalid page range {first:#04x}-{last:#04x}")]
    InvalidPageRange { first: u8, last: u8 },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Read-only storage")]
    ReadOnly,

    #[error("Short read on {path}: read {read}, expected {expected}")]
    ShortRead {
        path: String,
        read: usize,
        expected: usize,
    },

    #[error("Short write on {path}: wrote {written}, expected {expected}")]
    ShortWrite {
        path: String,
        written: usize,
        expected: usize,
    },

    #[error("Pool exhausted: need {requested}, have {available}")]
    PoolExhausted { requested: usize, available: usize },

    #[error("Bank {bank}: cannot allocate {bytes} bytes")]
    BankAlloc { bank: String, bytes: usize },

    #[error("Bank not initialized: {0}")]
    BankUninitialized(String),

    #[error("Bank {bank}: access at {addr:#06x} (+{len}) out of range")]
    AddressOutOfRange { bank: String, addr: u16, len: usize },

    #[error("Bank {bank}: page {page:#x} has no physical mapping")]
    UnmappedPage { bank: String, page: u32 },

    #[error("No disk loaded in drive {0}")]
    NotLoaded(usize),

    #[error("Drive {0} is still mounted")]
    StillMounted(usize),

    #[error("No floppy for drive {drive} in slot {slot}")]
    NoFloppy { slot: u8, drive: usize },

    #[error("Track loader error: {0}")]
    Loader(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DiskError {
    /// True for faults raised before any I/O because the caller passed a bad
    /// drive, index or page range.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DiskError::InvalidDrive(_)
                | DiskError::InvalidIndex(_)
                | DiskError::InvalidPageRange { .. }
        )
    }
}

/// Result type for disk staging operations.
pub type DiskResult<T> = Result<T, DiskError>;

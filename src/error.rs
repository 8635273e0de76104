//! Error kinds surfaced at the storage-core boundary (spec §6/§7).

use thiserror::Error;

/// Errors returned by any storage-core operation.
#[derive(Error, Debug)]
pub enum Error {
    /// No free block, inode, or slice run was available.
    #[error("no space left on device")]
    NoSpace,

    /// The requested operation would grow a file past `MAX_FILE_SIZE`.
    #[error("file would exceed the maximum supported size")]
    TooLarge,

    /// A block read or write failed.
    #[error("i/o error on block {block}")]
    Io {
        block: u32,
        #[source]
        source: std::io::Error,
    },

    /// An on-disk invariant was violated (double free, bad pointer, ...).
    #[error("on-disk corruption detected: {0}")]
    Corruption(&'static str),

    /// A parameter or on-disk header was invalid (bad magic, bad inode number).
    #[error("invalid argument or format: {0}")]
    Invalid(&'static str),

    /// The requested inode does not exist or is not allocated.
    #[error("inode {0} not found")]
    NotFound(u32),
}

/// Result alias used throughout the storage core.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wraps an I/O failure that occurred while touching `block`.
    pub fn io(block: u32, source: std::io::Error) -> Self {
        Error::Io { block, source }
    }
}

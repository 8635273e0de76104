//! `slicefs`: the storage core of a block-addressed file system that packs
//! small files into shared *sliced blocks* and indexes large files through
//! a per-file index block.
//!
//! This crate implements components B through H of the design (bitmap
//! module, superblock, inode store, slice allocator, file body engine,
//! mount/sync driver, stats surface) behind a [`BlockDevice`] trait; the
//! device itself, directory entries and path lookup, VFS glue, the page
//! cache, and an mkfs/debug-ioctl front end are external collaborators not
//! provided here. See `DESIGN.md` for the grounding of each module.

#![forbid(unsafe_op_in_unsafe_fn)]

mod bitmap;
mod device;
mod error;
mod file;
mod fs;
mod inode;
mod layout;
mod mem_device;
mod slice_alloc;
mod stats;
mod superblock;

pub use bitmap::Bitmap;
pub use device::BlockDevice;
pub use error::{Error, Result};
pub use fs::{format, Fs, FormatOptions, RegularFile, Statfs};
pub use inode::{Inode, S_IFDIR, S_IFREG};
pub use layout::{
    BLOCK, FILENAME_LEN, MAGIC, MAX_FILE_SIZE, ROOT_INO, SLICE, SLICES_PER_BLOCK, SMALL_THRESHOLD,
};
pub use mem_device::MemDevice;
pub use stats::Stats;
pub use superblock::Superblock;

//! Fixed on-disk constants shared by every module.
//!
//! Mirrors `OUICHEFS_BLOCK_SIZE`/`OUICHEFS_SLICE_SIZE`/`OUICHEFS_MAGIC` in
//! `ouichefs.h`, scaled to the 4 KiB block size this design targets.

/// Size of a disk block, in bytes.
pub const BLOCK: usize = 4096;
/// Size of a slice inside a sliced block, in bytes.
pub const SLICE: usize = 128;
/// Number of slices in one sliced block (slot 0 is reserved for the header).
pub const SLICES_PER_BLOCK: usize = 32;
/// Maximum size of a regular file.
pub const MAX_FILE_SIZE: u64 = 4 * 1024 * 1024;
/// Maximum length of a filename (directory entries are out of scope, this
/// constant only fixes the record width external collaborators rely on).
pub const FILENAME_LEN: usize = 28;
/// Filesystem magic number, stamped into the superblock.
pub const MAGIC: u32 = 0x4843_4957;

/// Threshold below which a file is stored as a slice run: `BLOCK - SLICE`.
pub const SMALL_THRESHOLD: u64 = (BLOCK - SLICE) as u64;

/// Number of 32-bit block-number entries in one index block.
pub const ENTRIES_PER_INDEX_BLOCK: usize = BLOCK / 4;

/// Size, in bytes, of one on-disk inode record.
///
/// Fields occupy 54 bytes (mode, uid, gid, size, ctime/atime/mtime as
/// sec+nsec pairs, i_blocks, nlink, index_block, num_slices); the rest is
/// reserved padding so a power-of-two count of records packs a block evenly.
pub const INODE_SIZE: usize = 80;
/// Number of inode records packed into one block.
pub const INODES_PER_BLOCK: u32 = (BLOCK / INODE_SIZE) as u32;

/// Reserved, invalid inode number.
pub const INODE_NONE: u32 = 0;
/// The root directory's inode number.
pub const ROOT_INO: u32 = 1;

/// Block number of the superblock itself.
pub const SUPERBLOCK_BLOCK: u32 = 0;

//! The stats/query surface (spec §4.H).
//!
//! Mirrors the counters `examples/original_source/sysfs.c` exports one
//! attribute at a time (`free_blocks_show`, `used_blocks_show`,
//! `total_data_size`, `total_file_count`, `total_small_file_count`,
//! `total_used_size`); this module computes them all at once and also
//! offers the same by-name lookup shape via [`Stats::get`].

use crate::bitmap::Bitmap;
use crate::device::BlockDevice;
use crate::error::Result;
use crate::inode::{Inode, S_IFDIR};
use crate::layout::{BLOCK, INODE_NONE};
use crate::superblock::Superblock;

/// A snapshot of the derived, read-only filesystem counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub free_blocks: u32,
    pub used_blocks: u32,
    pub sliced_blocks: u32,
    pub total_free_slices: u32,
    pub files: u32,
    pub small_files: u32,
    pub total_data_size: u64,
    pub total_used_size: u64,
    /// Percentage, `total_data_size * 100 / total_used_size`; `0` when
    /// nothing is used yet.
    pub efficiency: u64,
}

impl Stats {
    /// Looks up one counter by the name sysfs-style collaborators would use
    /// for an individual attribute file.
    pub fn get(&self, name: &str) -> Option<String> {
        Some(match name {
            "free_blocks" => self.free_blocks.to_string(),
            "used_blocks" => self.used_blocks.to_string(),
            "sliced_blocks" => self.sliced_blocks.to_string(),
            "total_free_slices" => self.total_free_slices.to_string(),
            "files" => self.files.to_string(),
            "small_files" => self.small_files.to_string(),
            "total_data_size" => self.total_data_size.to_string(),
            "total_used_size" => self.total_used_size.to_string(),
            "efficiency" => self.efficiency.to_string(),
            _ => return None,
        })
    }
}

/// Computes a fresh snapshot by scanning every allocated inode.
pub(crate) fn compute(dev: &dyn BlockDevice, sb: &Superblock, ifree: &Bitmap) -> Result<Stats> {
    let used_blocks = sb.nr_blocks - sb.nr_free_blocks;
    let total_free_slices = sb.nr_sliced_blocks.saturating_mul(31).saturating_sub(sb.nr_used_slices);

    let mut files = 0u32;
    let mut small_files = 0u32;
    let mut total_data_size: u64 = 0;

    for ino in 1..sb.nr_inodes {
        if ino == INODE_NONE || ifree.is_free(ino) {
            continue;
        }
        let inode = Inode::iget(dev, ino)?;
        if inode.mode & S_IFDIR != 0 {
            continue;
        }
        files += 1;
        if inode.is_small() {
            small_files += 1;
        }
        total_data_size += inode.size;
    }

    let total_used_size = used_blocks as u64 * BLOCK as u64;
    let efficiency = if total_used_size == 0 { 0 } else { total_data_size * 100 / total_used_size };

    Ok(Stats {
        free_blocks: sb.nr_free_blocks,
        used_blocks,
        sliced_blocks: sb.nr_sliced_blocks,
        total_free_slices,
        files,
        small_files,
        total_data_size,
        total_used_size,
        efficiency,
    })
}

//! The mount/sync driver and the `RegularFile` handle the rest of the crate
//! is built to serve (spec §4.G, §6).
//!
//! Grounded on `ouichefs_fill_super`/`ouichefs_sync_fs` in
//! `examples/original_source/super.c` for the mount sequence and counter
//! bookkeeping, and on `Ext2Fs::format` (`examples/csBenClarkson-rustfs/src/fs/ext2.rs`) for
//! the shape of a from-scratch formatting routine. The original's own sync
//! order is superblock-info, then ifree, then bfree, with inode writeback
//! handled separately by `mark_inode_dirty`; this crate instead flushes
//! inodes, then ifree, then bfree, then superblock, since metadata
//! describing a block must be durable before the bitmap is allowed to call
//! that block free again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::bitmap::Bitmap;
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::file::{self, Ctx};
use crate::inode::{Inode, S_IFDIR};
use crate::layout::{
    BLOCK, INODES_PER_BLOCK, INODE_NONE, MAGIC, ROOT_INO, SUPERBLOCK_BLOCK,
};
use crate::superblock::Superblock;

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

fn now() -> (u32, u32) {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (d.as_secs() as u32, d.subsec_nanos())
}

/// Parameters for formatting a fresh filesystem image (spec §4.C/§4.D
/// layout; no external mkfs tool is included, so the options struct it
/// would consume is kept typed here instead).
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    pub nr_blocks: u32,
    pub nr_inodes: u32,
}

impl FormatOptions {
    pub fn new(nr_blocks: u32, nr_inodes: u32) -> Self {
        FormatOptions { nr_blocks, nr_inodes }
    }
}

struct Layout {
    istore_start: u32,
    nr_istore_blocks: u32,
    ifree_start: u32,
    nr_ifree_blocks: u32,
    bfree_start: u32,
    nr_bfree_blocks: u32,
    data_start: u32,
}

fn compute_layout(nr_blocks: u32, nr_inodes: u32) -> Layout {
    let nr_istore_blocks = ceil_div(nr_inodes as u64, INODES_PER_BLOCK as u64) as u32;
    let bits_per_block = (BLOCK * 8) as u64;
    let nr_ifree_blocks = ceil_div(nr_inodes as u64, bits_per_block) as u32;
    let nr_bfree_blocks = ceil_div(nr_blocks as u64, bits_per_block) as u32;

    let istore_start = SUPERBLOCK_BLOCK + 1;
    let ifree_start = istore_start + nr_istore_blocks;
    let bfree_start = ifree_start + nr_ifree_blocks;
    let data_start = bfree_start + nr_bfree_blocks;

    Layout {
        istore_start,
        nr_istore_blocks,
        ifree_start,
        nr_ifree_blocks,
        bfree_start,
        nr_bfree_blocks,
        data_start,
    }
}

/// Writes a brand-new, empty filesystem image: superblock, zeroed inode
/// store, free-inode/free-block bitmaps, and a root directory inode.
pub fn format(dev: &dyn BlockDevice, opts: FormatOptions) -> Result<()> {
    let layout = compute_layout(opts.nr_blocks, opts.nr_inodes);
    if layout.data_start >= opts.nr_blocks {
        return Err(Error::Invalid("device too small for the requested inode count"));
    }

    let zero = [0u8; BLOCK];
    for b in layout.istore_start..layout.ifree_start {
        dev.write_block(b, &zero)?;
    }

    let mut ifree = Bitmap::new_all_free(layout.ifree_start, layout.nr_ifree_blocks, opts.nr_inodes as usize);
    ifree.set_used(INODE_NONE);
    ifree.set_used(ROOT_INO);
    ifree.flush(dev)?;

    let mut bfree = Bitmap::new_all_free(layout.bfree_start, layout.nr_bfree_blocks, opts.nr_blocks as usize);
    for b in 0..layout.data_start {
        bfree.set_used(b);
    }
    bfree.flush(dev)?;

    let sb = Superblock {
        magic: MAGIC,
        nr_blocks: opts.nr_blocks,
        nr_inodes: opts.nr_inodes,
        nr_istore_blocks: layout.nr_istore_blocks,
        nr_ifree_blocks: layout.nr_ifree_blocks,
        nr_bfree_blocks: layout.nr_bfree_blocks,
        nr_free_inodes: opts.nr_inodes - 2,
        nr_free_blocks: opts.nr_blocks - layout.data_start,
        first_free_sliced_block: 0,
        nr_sliced_blocks: 0,
        nr_used_slices: 0,
    };
    sb.flush(dev)?;

    let mut root = Inode::new_regular(ROOT_INO, 0o755, 0, 0, (0, 0));
    root.mode = S_IFDIR | 0o755;
    root.nlink = 2;
    root.write_inode(dev)?;

    info!(nr_blocks = opts.nr_blocks, nr_inodes = opts.nr_inodes, "formatted filesystem image");
    Ok(())
}

struct Shared {
    sb: Superblock,
    ifree: Bitmap,
    bfree: Bitmap,
}

/// An open, mounted filesystem. Owns the block device and the process-wide
/// shared state (superblock counters, both bitmaps, the sliced-block list
/// anchor) behind a single mutex, per the lock ordering in spec §5.
pub struct Fs {
    dev: Box<dyn BlockDevice>,
    shared: Mutex<Shared>,
    dirty_inodes: Mutex<HashMap<u32, Inode>>,
}

impl Fs {
    /// Mounts an already-formatted image.
    pub fn mount(dev: Box<dyn BlockDevice>) -> Result<Arc<Fs>> {
        let sb = Superblock::load(dev.as_ref())?;
        let layout = compute_layout(sb.nr_blocks, sb.nr_inodes);
        let ifree = Bitmap::load(dev.as_ref(), layout.ifree_start, sb.nr_ifree_blocks)?;
        let bfree = Bitmap::load(dev.as_ref(), layout.bfree_start, sb.nr_bfree_blocks)?;
        info!(nr_blocks = sb.nr_blocks, free_blocks = sb.nr_free_blocks, "mounted filesystem");

        Ok(Arc::new(Fs {
            dev,
            shared: Mutex::new(Shared { sb, ifree, bfree }),
            dirty_inodes: Mutex::new(HashMap::new()),
        }))
    }

    /// The root directory's inode number; directory semantics themselves
    /// are an external collaborator's concern (spec §1 Non-goals).
    pub fn root_ino(&self) -> u32 {
        ROOT_INO
    }

    /// Opens a regular file for read/write, optionally truncating it first
    /// (spec §4.F "Open with truncate").
    pub fn open(self: &Arc<Self>, ino: u32, truncate: bool) -> Result<RegularFile> {
        let inode = Inode::iget(self.dev.as_ref(), ino)?;
        let file = RegularFile {
            fs: self.clone(),
            ino,
            inode: Mutex::new(inode),
        };
        if truncate {
            file.truncate(0)?;
        }
        Ok(file)
    }

    /// Allocates a fresh inode and returns a handle to it.
    ///
    /// Directory entries and path lookup live outside this crate (spec §1
    /// Non-goals), so there is no `create(name)`; a caller that owns a
    /// directory layer links the returned `ino` into it separately.
    pub fn create(self: &Arc<Self>, mode: u32) -> Result<RegularFile> {
        let ino = {
            let mut shared = self.shared.lock().unwrap();
            let ino = shared.ifree.alloc_first_free().ok_or(Error::NoSpace)?;
            shared.sb.nr_free_inodes = shared.sb.nr_free_inodes.saturating_sub(1);
            ino
        };
        let inode = Inode::new_regular(ino, mode, 0, 0, now());
        inode.write_inode(self.dev.as_ref())?;
        info!(ino, "created inode");
        Ok(RegularFile {
            fs: self.clone(),
            ino,
            inode: Mutex::new(inode),
        })
    }

    /// Releases a file's data (slice run, or index block's data blocks)
    /// and returns its inode number to the free-inode pool.
    pub fn remove(self: &Arc<Self>, ino: u32) -> Result<()> {
        let file = self.open(ino, false)?;
        file.truncate(0)?;
        let mut shared = self.shared.lock().unwrap();
        shared.ifree.set_free(ino);
        shared.sb.nr_free_inodes += 1;
        self.dirty_inodes.lock().unwrap().remove(&ino);
        info!(ino, "removed inode");
        Ok(())
    }

    fn mark_dirty(&self, ino: u32, inode: Inode) {
        self.dirty_inodes.lock().unwrap().insert(ino, inode);
    }

    /// Flushes dirty inodes, then the free-inode bitmap, then the
    /// free-block bitmap, then the superblock, in that order (spec §4.G).
    pub fn sync(&self, wait: bool) -> Result<()> {
        let mut dirty: Vec<(u32, Inode)> = self.dirty_inodes.lock().unwrap().drain().collect();
        dirty.sort_by_key(|(ino, _)| *ino);
        for (ino, inode) in &dirty {
            inode.write_inode(self.dev.as_ref())?;
            debug!(ino, "flushed dirty inode");
        }

        let shared = self.shared.lock().unwrap();
        shared.ifree.flush(self.dev.as_ref())?;
        shared.bfree.flush(self.dev.as_ref())?;
        shared.sb.flush(self.dev.as_ref())?;

        if wait {
            self.dev.sync_block(SUPERBLOCK_BLOCK)?;
        }
        debug!(wait, "sync complete");
        Ok(())
    }

    /// Returns a snapshot of the current superblock counters.
    pub fn statfs(&self) -> Statfs {
        let shared = self.shared.lock().unwrap();
        Statfs {
            block_size: BLOCK as u32,
            total_blocks: shared.sb.nr_blocks,
            free_blocks: shared.sb.nr_free_blocks,
            total_inodes: shared.sb.nr_inodes,
            free_inodes: shared.sb.nr_free_inodes,
            name_max: crate::layout::FILENAME_LEN as u32,
        }
    }

    /// Computes the derived counters exposed to observability collaborators
    /// (spec §4.H).
    pub fn stats(&self) -> Result<crate::stats::Stats> {
        let shared = self.shared.lock().unwrap();
        crate::stats::compute(self.dev.as_ref(), &shared.sb, &shared.ifree)
    }

    /// Debug channel: returns the raw contents of the sliced block backing
    /// a small file (spec §6 `READ_SLICED_BLOCK`).
    pub fn read_sliced_block(&self, ino: u32) -> Result<[u8; BLOCK]> {
        let inode = Inode::iget(self.dev.as_ref(), ino)?;
        if !inode.is_small() {
            return Err(Error::Invalid("READ_SLICED_BLOCK is only valid for small files"));
        }
        let (block, _) = crate::inode::decode_small_pointer(inode.index_block);
        crate::slice_alloc::read_sliced_block(self.dev.as_ref(), block)
    }

    pub(crate) fn device(&self) -> &dyn BlockDevice {
        self.dev.as_ref()
    }
}

/// Block-size/capacity snapshot exposed to the VFS collaborator's `statfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statfs {
    pub block_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub total_inodes: u32,
    pub free_inodes: u32,
    pub name_max: u32,
}

/// A handle to one open regular file. Owns its own copy of the in-memory
/// inode, protected by its own mutex. The "one writer, many readers under
/// caller-guaranteed exclusion" policy of spec §5 is the caller's
/// responsibility, not this handle's.
pub struct RegularFile {
    fs: Arc<Fs>,
    ino: u32,
    inode: Mutex<Inode>,
}

impl RegularFile {
    pub fn ino(&self) -> u32 {
        self.ino
    }

    pub fn size(&self) -> u64 {
        self.inode.lock().unwrap().size
    }

    pub fn read(&self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let inode = self.inode.lock().unwrap();
        file::read(self.fs.device(), &inode, pos, buf)
    }

    pub fn write(&self, pos: u64, data: &[u8]) -> Result<usize> {
        self.write_impl(pos, data, false)
    }

    pub fn append(&self, data: &[u8]) -> Result<usize> {
        self.write_impl(0, data, true)
    }

    fn write_impl(&self, pos: u64, data: &[u8], append: bool) -> Result<usize> {
        let mut inode = self.inode.lock().unwrap();
        let mut shared = self.fs.shared.lock().unwrap();
        let mut ctx = Ctx {
            dev: self.fs.device(),
            sb: &mut shared.sb,
            bfree: &mut shared.bfree,
        };
        let n = file::write(&mut ctx, &mut inode, pos, data, append)?;
        inode.write_inode(self.fs.device())?;
        self.fs.mark_dirty(self.ino, inode.clone());
        Ok(n)
    }

    /// Truncates the file. Only `new_size == 0` is supported, matching
    /// spec §4.F (no shrink-in-place to a non-zero size is specified).
    pub fn truncate(&self, new_size: u64) -> Result<()> {
        if new_size != 0 {
            return Err(Error::Invalid("truncate to a non-zero size is not supported"));
        }
        let mut inode = self.inode.lock().unwrap();
        let mut shared = self.fs.shared.lock().unwrap();
        let mut ctx = Ctx {
            dev: self.fs.device(),
            sb: &mut shared.sb,
            bfree: &mut shared.bfree,
        };
        file::truncate_to_zero(&mut ctx, &mut inode)?;
        inode.write_inode(self.fs.device())?;
        self.fs.mark_dirty(self.ino, inode.clone());
        Ok(())
    }

    /// Writes this file's inode back immediately, then flushes the shared
    /// allocator state through `Fs::sync` (spec §4.G, §6).
    pub fn sync(&self, wait: bool) -> Result<()> {
        let inode = self.inode.lock().unwrap();
        inode.write_inode(self.fs.device())?;
        drop(inode);
        self.fs.sync(wait)
    }
}

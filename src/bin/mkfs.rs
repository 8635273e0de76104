//! A tiny `mkfs`-style front end over [`slicefs`], mirroring
//! `examples/original_source/util/ouichefs-util.c`'s role as a standalone
//! tool layered on top of the storage core rather than part of it.
//!
//! This binary formats a fresh in-memory image, mounts it, and prints the
//! resulting capacity and stats. It exists to give this crate's one
//! tool-facing entry point somewhere to use `anyhow` for ad-hoc glue, the
//! same way `Ext2Fs::format` reaches for `anyhow` outside a typed library
//! surface.

use anyhow::{bail, Context, Result};
use slicefs::{format, Fs, FormatOptions, MemDevice};

fn parse_args() -> Result<(u32, u32)> {
    let mut args = std::env::args().skip(1);
    let nr_blocks: u32 = args
        .next()
        .context("expected <nr_blocks> as the first argument")?
        .parse()
        .context("nr_blocks must be a positive integer")?;
    let nr_inodes: u32 = args
        .next()
        .context("expected <nr_inodes> as the second argument")?
        .parse()
        .context("nr_inodes must be a positive integer")?;
    if nr_blocks == 0 || nr_inodes == 0 {
        bail!("nr_blocks and nr_inodes must both be nonzero");
    }
    Ok((nr_blocks, nr_inodes))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let (nr_blocks, nr_inodes) = parse_args().unwrap_or_else(|err| {
        eprintln!("usage: mkfs <nr_blocks> <nr_inodes>\n{err:?}");
        std::process::exit(1);
    });

    let dev = MemDevice::new(nr_blocks);
    format(&dev, FormatOptions::new(nr_blocks, nr_inodes)).context("formatting image failed")?;

    let fs = Fs::mount(Box::new(dev)).context("mounting freshly formatted image failed")?;
    let info = fs.statfs();
    println!(
        "formatted {} blocks / {} inodes ({} blocks free, {} inodes free)",
        info.total_blocks, info.total_inodes, info.free_blocks, info.free_inodes
    );

    let stats = fs.stats().context("computing stats failed")?;
    println!(
        "files={} small_files={} sliced_blocks={} total_free_slices={}",
        stats.files, stats.small_files, stats.sliced_blocks, stats.total_free_slices
    );

    Ok(())
}

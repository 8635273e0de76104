//! An in-memory [`BlockDevice`], used by the test suite and by callers that
//! only need a scratch filesystem image.
//!
//! Grounded on `Ext2Fs { image: Box<[u8]> }` in
//! `examples/csBenClarkson-rustfs/src/fs/ext2.rs`, generalized to the
//! `BlockDevice` trait and made safe for concurrent readers via a `Mutex`.

use std::io;
use std::sync::Mutex;

use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::layout::BLOCK;

/// A filesystem image held entirely in memory.
pub struct MemDevice {
    image: Mutex<Vec<u8>>,
}

impl MemDevice {
    /// Creates a zeroed image of `nr_blocks` blocks.
    pub fn new(nr_blocks: u32) -> Self {
        Self {
            image: Mutex::new(vec![0u8; nr_blocks as usize * BLOCK]),
        }
    }

    /// Number of blocks backing this device.
    pub fn nr_blocks(&self) -> u32 {
        (self.image.lock().unwrap().len() / BLOCK) as u32
    }

    fn range(n: u32) -> std::ops::Range<usize> {
        let start = n as usize * BLOCK;
        start..start + BLOCK
    }

    fn out_of_range() -> Error {
        Error::io(
            u32::MAX,
            io::Error::new(io::ErrorKind::UnexpectedEof, "block index out of range"),
        )
    }
}

impl BlockDevice for MemDevice {
    fn read_block(&self, n: u32) -> Result<[u8; BLOCK]> {
        let image = self.image.lock().unwrap();
        let range = Self::range(n);
        let slice = image.get(range).ok_or_else(Self::out_of_range)?;
        let mut buf = [0u8; BLOCK];
        buf.copy_from_slice(slice);
        Ok(buf)
    }

    fn write_block(&self, n: u32, data: &[u8; BLOCK]) -> Result<()> {
        let mut image = self.image.lock().unwrap();
        let range = Self::range(n);
        let slice = image.get_mut(range).ok_or_else(Self::out_of_range)?;
        slice.copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_block() {
        let dev = MemDevice::new(4);
        let mut data = [0u8; BLOCK];
        data[0] = 0xAB;
        data[BLOCK - 1] = 0xCD;
        dev.write_block(2, &data).unwrap();
        let read = dev.read_block(2).unwrap();
        assert_eq!(read, data);
    }

    #[test]
    fn rejects_out_of_range_block() {
        let dev = MemDevice::new(2);
        assert!(dev.read_block(5).is_err());
    }
}

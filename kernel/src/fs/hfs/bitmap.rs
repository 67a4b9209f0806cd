//! Allocation bitmap: one bit per allocation block, bit `n` set iff
//! block `n` is allocated (spec §4.5.2). Cached in memory as a flat
//! byte vector; callers flush explicitly or on unmount.

use alloc::vec;
use alloc::vec::Vec;

use crate::block::BlockDevice;
use crate::error::{KernelError, Result};

pub struct Bitmap<'d> {
    device: &'d dyn BlockDevice,
    /// Sector at which the bitmap begins on disk.
    start_sector: u64,
    bits: Vec<u8>,
    total_blocks: u32,
    dirty: bool,
    /// Where the next `alloc_blocks` search should start, to spread
    /// allocations across the volume instead of always scanning from 0.
    next_hint: u32,
}

fn byte_index(block: u32) -> (usize, u8) {
    ((block / 8) as usize, 1u8 << (7 - (block % 8)))
}

impl<'d> Bitmap<'d> {
    /// Load the bitmap covering `total_blocks` bits starting at
    /// `start_sector` on `device`.
    pub fn load(device: &'d dyn BlockDevice, start_sector: u64, total_blocks: u32) -> Result<Self> {
        let byte_len = ((total_blocks as usize) + 7) / 8;
        let sector_count = (byte_len + 511) / 512;
        let mut bits = vec![0u8; sector_count * 512];
        for i in 0..sector_count {
            let mut sector = [0u8; 512];
            device.read_blocks(start_sector + i as u64, &mut sector).map_err(KernelError::Io)?;
            bits[i * 512..i * 512 + 512].copy_from_slice(&sector);
        }
        bits.truncate(byte_len);
        Ok(Self { device, start_sector, bits, total_blocks, dirty: false, next_hint: 0 })
    }

    fn is_set(&self, block: u32) -> bool {
        let (byte, mask) = byte_index(block);
        self.bits[byte] & mask != 0
    }

    fn set(&mut self, block: u32) {
        let (byte, mask) = byte_index(block);
        self.bits[byte] |= mask;
    }

    fn clear(&mut self, block: u32) {
        let (byte, mask) = byte_index(block);
        self.bits[byte] &= !mask;
    }

    /// True iff every block in `[start, start+count)` is allocated.
    pub fn check(&self, start: u32, count: u32) -> bool {
        if start.saturating_add(count) > self.total_blocks {
            return false;
        }
        (start..start + count).all(|b| self.is_set(b))
    }

    pub fn count_free(&self) -> u32 {
        (0..self.total_blocks).filter(|&b| !self.is_set(b)).count() as u32
    }

    /// Longest free run starting at `from`, capped at `max`.
    fn free_run_at(&self, from: u32, max: u32) -> u32 {
        let mut n = 0;
        while n < max && from + n < self.total_blocks && !self.is_set(from + n) {
            n += 1;
        }
        n
    }

    /// Scan `[from, to)` for the largest free run of at least `min`
    /// blocks, capped at `max`. Returns as soon as a run of `max` is
    /// found.
    fn scan_range(&self, from: u32, to: u32, min: u32, max: u32) -> Option<(u32, u32)> {
        let mut best: Option<(u32, u32)> = None;
        let mut b = from;
        while b < to {
            if self.is_set(b) {
                b += 1;
                continue;
            }
            let run = self.free_run_at(b, max).min(to - b);
            if run >= min && best.map(|(_, c)| run > c).unwrap_or(true) {
                best = Some((b, run));
                if run >= max {
                    return best;
                }
            }
            b += run.max(1);
        }
        best
    }

    /// Search starting at `self.next_hint`, wrapping to 0. Returns the
    /// largest run of at least `min` free blocks found, up to `max`.
    pub fn alloc_blocks(&mut self, min: u32, max: u32) -> Result<(u32, u32)> {
        if min == 0 || self.total_blocks == 0 {
            return Err(KernelError::ParamErr);
        }
        let start_hint = self.next_hint.min(self.total_blocks.saturating_sub(1));
        let mut best = self.scan_range(start_hint, self.total_blocks, min, max);
        if best.as_ref().map(|(_, c)| *c < max).unwrap_or(true) {
            if let Some(wrapped) = self.scan_range(0, start_hint, min, max) {
                if best.map(|(_, c)| wrapped.1 > c).unwrap_or(true) {
                    best = Some(wrapped);
                }
            }
        }
        let (start, count) = best.ok_or(KernelError::OutOfSpace)?;
        for b in start..start + count {
            self.set(b);
        }
        self.next_hint = start + count;
        self.dirty = true;
        Ok((start, count))
    }

    pub fn free_blocks(&mut self, start: u32, count: u32) -> Result<()> {
        if start.saturating_add(count) > self.total_blocks {
            return Err(KernelError::OutOfRange);
        }
        for b in start..start + count {
            self.clear(b);
        }
        self.dirty = true;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        for (i, chunk) in self.bits.chunks(512).enumerate() {
            let mut sector = [0u8; 512];
            sector[..chunk.len()].copy_from_slice(chunk);
            self.device.write_blocks(self.start_sector + i as u64, &sector).map_err(KernelError::Io)?;
        }
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::SECTOR_SIZE;
    use spin::Mutex;

    struct MemDevice {
        data: Mutex<Vec<u8>>,
    }

    impl BlockDevice for MemDevice {
        fn sector_count(&self) -> u64 {
            (self.data.lock().len() / SECTOR_SIZE) as u64
        }
        fn ready(&self) -> bool {
            true
        }
        fn read_blocks(&self, lba: u64, dst: &mut [u8]) -> core::result::Result<(), crate::error::IoError> {
            let data = self.data.lock();
            let off = lba as usize * SECTOR_SIZE;
            dst.copy_from_slice(&data[off..off + dst.len()]);
            Ok(())
        }
        fn write_blocks(&self, lba: u64, src: &[u8]) -> core::result::Result<(), crate::error::IoError> {
            let mut data = self.data.lock();
            let off = lba as usize * SECTOR_SIZE;
            data[off..off + src.len()].copy_from_slice(src);
            Ok(())
        }
    }

    fn dev(sectors: usize) -> MemDevice {
        MemDevice { data: Mutex::new(vec![0u8; sectors * SECTOR_SIZE]) }
    }

    #[test]
    fn alloc_then_free_restores_free_count() {
        let d = dev(2);
        let mut bm = Bitmap::load(&d, 0, 64).unwrap();
        let free_before = bm.count_free();
        let (start, count) = bm.alloc_blocks(4, 4).unwrap();
        assert_eq!(count, 4);
        assert!(bm.check(start, count));
        bm.free_blocks(start, count).unwrap();
        assert_eq!(bm.count_free(), free_before);
    }

    #[test]
    fn alloc_exact_free_count_succeeds_one_more_fails() {
        let d = dev(1);
        let mut bm = Bitmap::load(&d, 0, 8).unwrap();
        let (_, count) = bm.alloc_blocks(8, 8).unwrap();
        assert_eq!(count, 8);
        assert_eq!(bm.alloc_blocks(1, 1).unwrap_err(), KernelError::OutOfSpace);
    }

    #[test]
    fn alloc_wraps_past_hint_to_find_earlier_free_run() {
        let d = dev(1);
        let mut bm = Bitmap::load(&d, 0, 16).unwrap();
        let (_, count) = bm.alloc_blocks(16, 16).unwrap();
        assert_eq!(count, 16);
        bm.free_blocks(0, 4).unwrap();
        // hint now sits at the end of a fully-allocated volume; the only
        // free run is behind it, so this only succeeds if the search wraps.
        let (start, count) = bm.alloc_blocks(4, 4).unwrap();
        assert_eq!(start, 0);
        assert_eq!(count, 4);
    }
}

//! Block cache: fixed-size LRU pool keyed by `(volume, blockNum)`
//! (spec §4.5.7). Single-threaded — the filesystem runs cooperatively
//! on the boot thread, so no locking is needed inside the pool itself.

use alloc::vec::Vec;

use crate::block::{BlockDevice, SECTOR_SIZE};
use crate::error::Result;

const CACHE_SLOTS: usize = 32;

struct Buffer {
    block_num: u64,
    data: [u8; SECTOR_SIZE],
    dirty: bool,
    pin_count: u32,
    /// LRU recency counter; higher is more recently used.
    stamp: u64,
}

pub struct Cache<'d> {
    device: &'d dyn BlockDevice,
    slots: Vec<Option<Buffer>>,
    clock: u64,
    pub hits: u64,
    pub misses: u64,
}

impl<'d> Cache<'d> {
    pub fn new(device: &'d dyn BlockDevice) -> Self {
        let mut slots = Vec::with_capacity(CACHE_SLOTS);
        slots.resize_with(CACHE_SLOTS, || None);
        Self { device, slots, clock: 0, hits: 0, misses: 0 }
    }

    fn find_slot(&self, block_num: u64) -> Option<usize> {
        self.slots.iter().position(|s| matches!(s, Some(b) if b.block_num == block_num))
    }

    fn evict_one(&mut self) -> Result<usize> {
        // Prefer an empty slot; otherwise evict the least-recently-used
        // unpinned buffer, writing it back first if dirty.
        if let Some(i) = self.slots.iter().position(|s| s.is_none()) {
            return Ok(i);
        }
        let victim = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Some(b) if b.pin_count == 0))
            .min_by_key(|(_, s)| s.as_ref().unwrap().stamp)
            .map(|(i, _)| i)
            .ok_or(crate::error::KernelError::OutOfSpace)?;

        let buf = self.slots[victim].take().unwrap();
        if buf.dirty {
            self.device
                .write_blocks(buf.block_num, &buf.data)
                .map_err(crate::error::KernelError::Io)?;
        }
        Ok(victim)
    }

    /// Read (on miss) or return the cached buffer for `block_num`,
    /// pinning it. Caller must `release` when done.
    pub fn get(&mut self, block_num: u64) -> Result<usize> {
        if let Some(i) = self.find_slot(block_num) {
            self.hits += 1;
            self.clock += 1;
            let buf = self.slots[i].as_mut().unwrap();
            buf.pin_count += 1;
            buf.stamp = self.clock;
            return Ok(i);
        }
        self.misses += 1;
        let slot = self.evict_one()?;
        let mut data = [0u8; SECTOR_SIZE];
        self.device.read_blocks(block_num, &mut data).map_err(crate::error::KernelError::Io)?;
        self.clock += 1;
        self.slots[slot] = Some(Buffer { block_num, data, dirty: false, pin_count: 1, stamp: self.clock });
        Ok(slot)
    }

    pub fn data(&self, slot: usize) -> &[u8; SECTOR_SIZE] {
        &self.slots[slot].as_ref().unwrap().data
    }

    pub fn data_mut(&mut self, slot: usize) -> &mut [u8; SECTOR_SIZE] {
        &mut self.slots[slot].as_mut().unwrap().data
    }

    /// Unpin; if `dirty`, mark for write-back on eviction.
    pub fn release(&mut self, slot: usize, dirty: bool) {
        if let Some(buf) = self.slots[slot].as_mut() {
            buf.pin_count = buf.pin_count.saturating_sub(1);
            buf.dirty |= dirty;
        }
    }

    /// Flush every dirty buffer, regardless of pin state.
    pub fn flush_all(&mut self) -> Result<()> {
        for slot in self.slots.iter_mut().flatten() {
            if slot.dirty {
                self.device
                    .write_blocks(slot.block_num, &slot.data)
                    .map_err(crate::error::KernelError::Io)?;
                slot.dirty = false;
            }
        }
        Ok(())
    }
}

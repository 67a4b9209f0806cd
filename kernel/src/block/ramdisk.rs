//! RAMDisk `BlockDevice` backend — wraps `khal::ramdisk::RamDisk`.

use khal::ramdisk::{RamDisk, SECTOR_SIZE as KHAL_SECTOR_SIZE};

use super::{BlockDevice, SECTOR_SIZE};
use crate::error::IoError;

const _: () = assert!(SECTOR_SIZE == KHAL_SECTOR_SIZE);

pub struct RamDiskDevice {
    disk: RamDisk,
}

impl RamDiskDevice {
    /// # Safety
    /// Same contract as `RamDisk::new`: `base` must be valid for `size`
    /// bytes for the life of the kernel.
    pub const unsafe fn new(base: *const u8, size: usize) -> Self {
        Self {
            disk: unsafe { RamDisk::new(base, size) },
        }
    }
}

// The bootloader module region outlives the kernel; sharing the pointer
// across the single CPU this kernel targets is fine (mirrors RamDisk's
// own Send/Sync impls).
unsafe impl Send for RamDiskDevice {}
unsafe impl Sync for RamDiskDevice {}

impl BlockDevice for RamDiskDevice {
    fn sector_count(&self) -> u64 {
        self.disk.sector_count() as u64
    }

    fn ready(&self) -> bool {
        self.disk.size() > 0
    }

    fn read_blocks(&self, lba: u64, dst: &mut [u8]) -> Result<(), IoError> {
        if dst.len() % SECTOR_SIZE != 0 {
            return Err(IoError::OutOfRange);
        }
        for (i, chunk) in dst.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            let sector = self
                .disk
                .read_sector(lba as usize + i)
                .ok_or(IoError::OutOfRange)?;
            chunk.copy_from_slice(sector);
        }
        Ok(())
    }

    fn write_blocks(&self, _lba: u64, _src: &[u8]) -> Result<(), IoError> {
        Err(IoError::WriteProtected)
    }
}

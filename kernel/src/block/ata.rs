//! ATA PIO `BlockDevice` backend.
//!
//! Wraps `khal::ata`'s raw register access with the retry and timeout
//! policy: up to 3 attempts per request, bounded by a coarse spin count
//! rather than a wall-clock timer (the PIT hasn't necessarily started
//! ticking yet when this is probed during early boot).

use khal::ata::{self, Bus, Drive};

use super::{BlockDevice, SECTOR_SIZE};
use crate::error::IoError;

const MAX_RETRIES: u32 = 3;

pub struct AtaDisk {
    bus: Bus,
    drive: Drive,
    sectors: u64,
}

impl AtaDisk {
    /// Probe `bus`/`drive` via IDENTIFY. Returns `None` if no drive answers.
    pub fn probe(bus: Bus, drive: Drive) -> Option<Self> {
        let words = ata::identify(bus, drive)?;
        // Words 60-61 hold the 28-bit LBA total sector count.
        let sectors = (words[60] as u64) | ((words[61] as u64) << 16);
        klog::info!(
            "ata: drive found on {:?}/{:?}, {} sectors ({} MiB)",
            bus,
            drive,
            sectors,
            sectors * SECTOR_SIZE as u64 / 1024 / 1024
        );
        Some(Self { bus, drive, sectors })
    }
}

impl BlockDevice for AtaDisk {
    fn sector_count(&self) -> u64 {
        self.sectors
    }

    fn ready(&self) -> bool {
        self.sectors > 0
    }

    fn read_blocks(&self, lba: u64, dst: &mut [u8]) -> Result<(), IoError> {
        if dst.len() % SECTOR_SIZE != 0 {
            return Err(IoError::OutOfRange);
        }
        let count = (dst.len() / SECTOR_SIZE) as u32;
        if lba + count as u64 > self.sectors {
            return Err(IoError::OutOfRange);
        }

        for attempt in 0..MAX_RETRIES {
            // The register-level transfer handles at most 256 sectors per
            // command (count byte wraps 0 -> 256); chunk larger requests.
            let mut ok = true;
            let mut done = 0u32;
            while done < count {
                let chunk = (count - done).min(256);
                let chunk_count = if chunk == 256 { 0 } else { chunk as u8 };
                let start = done as usize * SECTOR_SIZE;
                let end = start + chunk as usize * SECTOR_SIZE;
                if !ata::read_sectors(self.bus, self.drive, (lba as u32) + done, chunk_count, &mut dst[start..end]) {
                    ok = false;
                    break;
                }
                done += chunk;
            }
            if ok {
                return Ok(());
            }
            klog::warn!("ata: read failed (attempt {}/{}), error reg {:#04x}", attempt + 1, MAX_RETRIES, ata::read_error(self.bus));
        }
        Err(IoError::Timeout)
    }

    fn write_blocks(&self, lba: u64, src: &[u8]) -> Result<(), IoError> {
        if src.len() % SECTOR_SIZE != 0 {
            return Err(IoError::OutOfRange);
        }
        let count = (src.len() / SECTOR_SIZE) as u32;
        if lba + count as u64 > self.sectors {
            return Err(IoError::OutOfRange);
        }

        for attempt in 0..MAX_RETRIES {
            let mut ok = true;
            let mut done = 0u32;
            while done < count {
                let chunk = (count - done).min(256);
                let chunk_count = if chunk == 256 { 0 } else { chunk as u8 };
                let start = done as usize * SECTOR_SIZE;
                let end = start + chunk as usize * SECTOR_SIZE;
                if !ata::write_sectors(self.bus, self.drive, (lba as u32) + done, chunk_count, &src[start..end]) {
                    ok = false;
                    break;
                }
                done += chunk;
            }
            if ok {
                return Ok(());
            }
            klog::warn!("ata: write failed (attempt {}/{}), error reg {:#04x}", attempt + 1, MAX_RETRIES, ata::read_error(self.bus));
        }
        Err(IoError::Timeout)
    }
}

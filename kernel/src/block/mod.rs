//! Block device layer: one trait, three backends (ATA PIO, RAMDisk, a USB
//! mass-storage stub), all addressed by 512-byte LBA.

pub mod ata;
pub mod ramdisk;
pub mod usb_msd;

use crate::error::IoError;

/// Sector size every backend in this kernel agrees on.
pub const SECTOR_SIZE: usize = 512;

/// A block-addressable storage device.
///
/// `read_blocks`/`write_blocks` operate on whole 512-byte sectors; `dst`/
/// `src` lengths must be exact multiples of `SECTOR_SIZE`. Backends retry
/// transient failures internally (see `block::ata`'s retry policy) before
/// surfacing an `IoError` — once surfaced, the caller should treat it as
/// terminal for that request, not transient.
pub trait BlockDevice {
    /// Total number of 512-byte sectors on the device, or `0` if not yet
    /// probed / not present.
    fn sector_count(&self) -> u64;

    /// Whether the device responded to its last probe.
    fn ready(&self) -> bool;

    fn read_blocks(&self, lba: u64, dst: &mut [u8]) -> Result<(), IoError>;

    fn write_blocks(&self, lba: u64, src: &[u8]) -> Result<(), IoError>;
}

//! USB mass-storage `BlockDevice` stub.
//!
//! No USB host controller driver exists in this kernel (no transport to
//! ground one on in `original_source/`), but the boot-sequencing code
//! wants a uniform `BlockDevice` to try alongside ATA/RAMDisk. This
//! backend always reports not-ready so that code path is exercised
//! without pretending a transport exists.

use super::BlockDevice;
use crate::error::IoError;

pub struct UsbMassStorage;

impl BlockDevice for UsbMassStorage {
    fn sector_count(&self) -> u64 {
        0
    }

    fn ready(&self) -> bool {
        false
    }

    fn read_blocks(&self, _lba: u64, _dst: &mut [u8]) -> Result<(), IoError> {
        Err(IoError::NotReady)
    }

    fn write_blocks(&self, _lba: u64, _src: &[u8]) -> Result<(), IoError> {
        Err(IoError::NotReady)
    }
}

//! File I/O: map a logical offset to a physical block via the extent
//! list, read/write through the cache, advance, repeat (spec §4.5.6).

use spin::Mutex;

use crate::error::{KernelError, Result};

use super::cache::Cache;
use super::extents::{map_block_with_overflow, ExtentRecord};

/// Read up to `buf.len()` bytes starting at `offset` from a file whose
/// logical end-of-fork is `eof` bytes, following `initial_extents`
/// (falling back to `overflow` past them). Returns the number of bytes
/// actually copied, which is less than `buf.len()` at EOF — never an
/// error for a short read.
#[allow(clippy::too_many_arguments)]
pub fn read(
    cache: &Mutex<Cache<'_>>,
    alloc_block_size: u32,
    first_alloc_block_sector: u64,
    initial_extents: &ExtentRecord,
    file_id: u32,
    fork_type: u8,
    eof: u32,
    offset: u64,
    buf: &mut [u8],
    mut overflow: impl FnMut(u32, u8, u16) -> Option<ExtentRecord>,
) -> Result<usize> {
    if offset >= eof as u64 {
        return Ok(0);
    }
    let want = buf.len().min((eof as u64 - offset) as usize);
    let sectors_per_block = alloc_block_size / 512;
    let mut copied = 0usize;
    while copied < want {
        let pos = offset + copied as u64;
        let logical_block = (pos / alloc_block_size as u64) as u32;
        let within_block = pos % alloc_block_size as u64;
        let (phys_block, _run) =
            map_block_with_overflow(initial_extents, logical_block, file_id, fork_type, &mut overflow)?;
        let phys_sector = first_alloc_block_sector + phys_block as u64 * sectors_per_block as u64 + within_block / 512;
        let sector_off = (within_block % 512) as usize;
        let take = (512 - sector_off).min(want - copied);
        let mut c = cache.lock();
        let slot = c.get(phys_sector)?;
        buf[copied..copied + take].copy_from_slice(&c.data(slot)[sector_off..sector_off + take]);
        c.release(slot, false);
        copied += take;
    }
    Ok(copied)
}

/// Write `buf` at `offset`. If the write crosses the current `eof`,
/// the caller (`Volume::write`) is responsible for growing the file's
/// inline extents via `Bitmap::alloc_blocks` first; this function only
/// ever writes into blocks already present in `extents`.
#[allow(clippy::too_many_arguments)]
pub fn write(
    cache: &Mutex<Cache<'_>>,
    alloc_block_size: u32,
    first_alloc_block_sector: u64,
    extents: &ExtentRecord,
    file_id: u32,
    fork_type: u8,
    offset: u64,
    buf: &[u8],
    mut overflow: impl FnMut(u32, u8, u16) -> Option<ExtentRecord>,
) -> Result<usize> {
    let sectors_per_block = alloc_block_size / 512;
    let mut written = 0usize;
    while written < buf.len() {
        let pos = offset + written as u64;
        let logical_block = (pos / alloc_block_size as u64) as u32;
        let within_block = pos % alloc_block_size as u64;
        let (phys_block, _run) = map_block_with_overflow(extents, logical_block, file_id, fork_type, &mut overflow)
            .map_err(|_| KernelError::OutOfRange)?;
        let phys_sector = first_alloc_block_sector + phys_block as u64 * sectors_per_block as u64 + within_block / 512;
        let sector_off = (within_block % 512) as usize;
        let take = (512 - sector_off).min(buf.len() - written);
        let mut c = cache.lock();
        let slot = c.get(phys_sector)?;
        c.data_mut(slot)[sector_off..sector_off + take].copy_from_slice(&buf[written..written + take]);
        c.release(slot, true);
        written += take;
    }
    Ok(written)
}

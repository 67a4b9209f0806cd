//! Read-only ISO9660 (spec §4.5 parallel path). Sector size 2048;
//! Primary Volume Descriptor at LBA 16 with signature `CD001` at
//! offset 1; root directory record at PVD offset 156 (spec §6).

use alloc::string::String;
use alloc::vec::Vec;

use crate::block::BlockDevice;
use crate::error::{KernelError, Result};
use crate::fs::{DirEntry, Filesystem};

const ISO_SECTOR: usize = 2048;
const SECTORS_PER_ISO_SECTOR: u64 = (ISO_SECTOR / 512) as u64;
const PVD_LBA: u32 = 16;
const DIR_FLAG: u8 = 0x02;

pub struct Iso9660<'d> {
    device: &'d dyn BlockDevice,
    root_lba: u32,
    root_size: u32,
}

impl<'d> Iso9660<'d> {
    pub fn mount(device: &'d dyn BlockDevice) -> Result<Self> {
        let pvd = read_iso_sector(device, PVD_LBA)?;
        if &pvd[1..6] != b"CD001" {
            return Err(KernelError::BadVolume);
        }
        let root_record = &pvd[156..156 + 34];
        let root_lba = u32::from_le_bytes(root_record[2..6].try_into().unwrap());
        let root_size = u32::from_le_bytes(root_record[10..14].try_into().unwrap());
        if root_lba == 0 {
            return Err(KernelError::BadVolume);
        }
        Ok(Self { device, root_lba, root_size })
    }

    fn read_extent(&self, lba: u32, size: u32) -> Result<Vec<u8>> {
        let sector_count = (size as usize + ISO_SECTOR - 1) / ISO_SECTOR;
        let mut out = alloc::vec![0u8; sector_count * ISO_SECTOR];
        for i in 0..sector_count {
            let sector = read_iso_sector(self.device, lba + i as u32)?;
            out[i * ISO_SECTOR..(i + 1) * ISO_SECTOR].copy_from_slice(&sector);
        }
        out.truncate(size as usize);
        Ok(out)
    }

    fn parse_directory(&self, lba: u32, size: u32) -> Result<Vec<DirEntry>> {
        let data = self.read_extent(lba, size)?;
        let mut out = Vec::new();
        let mut pos = 0usize;
        while pos + 1 < data.len() {
            let len = data[pos] as usize;
            if len == 0 {
                // Directory records never span a logical sector boundary;
                // a zero length byte means "skip to the next sector".
                pos = ((pos / ISO_SECTOR) + 1) * ISO_SECTOR;
                continue;
            }
            if pos + len > data.len() {
                break;
            }
            let record = &data[pos..pos + len];
            let extent_lba = u32::from_le_bytes(record[2..6].try_into().unwrap());
            let extent_size = u32::from_le_bytes(record[10..14].try_into().unwrap());
            let flags = record[25];
            let name_len = record[32] as usize;
            let raw_name = &record[33..33 + name_len];

            let is_self_or_parent = name_len == 1 && (raw_name[0] == 0x00 || raw_name[0] == 0x01);
            if !is_self_or_parent {
                let name = strip_version_suffix(&String::from_utf8_lossy(raw_name));
                let is_dir = flags & DIR_FLAG != 0;
                out.push(DirEntry { name, is_dir, size: extent_size as u64, location: extent_lba as u64 });
            }
            pos += len;
        }
        Ok(out)
    }
}

fn read_iso_sector(device: &dyn BlockDevice, lba: u32) -> Result<[u8; ISO_SECTOR]> {
    let mut out = [0u8; ISO_SECTOR];
    let base = lba as u64 * SECTORS_PER_ISO_SECTOR;
    for i in 0..SECTORS_PER_ISO_SECTOR {
        let mut sector = [0u8; 512];
        device.read_blocks(base + i, &mut sector).map_err(KernelError::Io)?;
        let off = i as usize * 512;
        out[off..off + 512].copy_from_slice(&sector);
    }
    Ok(out)
}

fn strip_version_suffix(name: &str) -> String {
    match name.find(';') {
        Some(i) => String::from(&name[..i]),
        None => String::from(name),
    }
}

impl<'d> Filesystem for Iso9660<'d> {
    fn find_path(&self, path: &str) -> Result<DirEntry> {
        let mut lba = self.root_lba;
        let mut size = self.root_size;
        let mut result = DirEntry { name: String::new(), is_dir: true, size: size as u64, location: lba as u64 };
        for component in crate::fs::split_components(path) {
            let entries = self.parse_directory(lba, size)?;
            let hit = entries
                .into_iter()
                .find(|e| e.name.eq_ignore_ascii_case(component))
                .ok_or(KernelError::NotFound)?;
            if hit.is_dir {
                lba = hit.location as u32;
                size = hit.size as u32;
            }
            result = hit;
        }
        Ok(result)
    }

    fn read_file(&self, entry: &DirEntry, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if entry.is_dir {
            return Err(KernelError::ParamErr);
        }
        if offset >= entry.size {
            return Ok(0);
        }
        let data = self.read_extent(entry.location as u32, entry.size as u32)?;
        let want = buf.len().min((entry.size - offset) as usize);
        buf[..want].copy_from_slice(&data[offset as usize..offset as usize + want]);
        Ok(want)
    }

    fn read_dir(&self, entry: &DirEntry) -> Result<Vec<DirEntry>> {
        if !entry.is_dir {
            return Err(KernelError::ParamErr);
        }
        self.parse_directory(entry.location as u32, entry.size as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_version_suffix_removes_semicolon_tag() {
        assert_eq!(strip_version_suffix("GRUB.CFG;1"), "GRUB.CFG");
        assert_eq!(strip_version_suffix("README"), "README");
    }
}

//! Read-only FAT32 (spec §4.5 parallel path, SPEC_FULL boot/rescue
//! media). Little-endian throughout; boot sector at LBA 0, signature
//! byte `0x29` at offset 38, `BPB_FATSz16 = 0` and `BPB_RootEntCnt = 0`
//! distinguish it from FAT12/16 (spec §6).

use alloc::string::String;
use alloc::vec::Vec;

use crate::block::BlockDevice;
use crate::error::{KernelError, Result};
use crate::fs::{DirEntry, Filesystem};

const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_LONG_NAME: u8 = 0x0F;
const ATTR_VOLUME_ID: u8 = 0x08;
const EOC_MIN: u32 = 0x0FFF_FFF8;
const FREE_CLUSTER: u32 = 0;
const DELETED_MARK: u8 = 0xE5;

pub struct Fat32<'d> {
    device: &'d dyn BlockDevice,
    fat_start_sector: u64,
    data_start_sector: u64,
    sectors_per_cluster: u32,
    pub root_cluster: u32,
}

impl<'d> Fat32<'d> {
    pub fn mount(device: &'d dyn BlockDevice) -> Result<Self> {
        let mut boot = [0u8; 512];
        device.read_blocks(0, &mut boot).map_err(KernelError::Io)?;

        let bytes_per_sector = u16::from_le_bytes([boot[11], boot[12]]);
        let sectors_per_cluster = boot[13] as u32;
        let reserved_sectors = u16::from_le_bytes([boot[14], boot[15]]) as u64;
        let num_fats = boot[16] as u64;
        let root_entry_count = u16::from_le_bytes([boot[17], boot[18]]);
        let fat_sz16 = u16::from_le_bytes([boot[22], boot[23]]);
        let fat_sz32 = u32::from_le_bytes(boot[36..40].try_into().unwrap()) as u64;
        let ext_sig = boot[38];
        let root_cluster = u32::from_le_bytes(boot[44..48].try_into().unwrap());

        if bytes_per_sector != 512 || fat_sz16 != 0 || root_entry_count != 0 || ext_sig != 0x29 || sectors_per_cluster == 0 {
            return Err(KernelError::BadVolume);
        }

        let fat_start_sector = reserved_sectors;
        let data_start_sector = reserved_sectors + num_fats * fat_sz32;

        Ok(Self { device, fat_start_sector, data_start_sector, sectors_per_cluster, root_cluster })
    }

    fn cluster_to_sector(&self, cluster: u32) -> u64 {
        self.data_start_sector + (cluster as u64 - 2) * self.sectors_per_cluster as u64
    }

    fn next_cluster(&self, cluster: u32) -> Result<u32> {
        let fat_offset = cluster as u64 * 4;
        let sector = self.fat_start_sector + fat_offset / 512;
        let offset_in_sector = (fat_offset % 512) as usize;
        let mut buf = [0u8; 512];
        self.device.read_blocks(sector, &mut buf).map_err(KernelError::Io)?;
        let raw = u32::from_le_bytes(buf[offset_in_sector..offset_in_sector + 4].try_into().unwrap());
        Ok(raw & 0x0FFF_FFFF)
    }

    fn cluster_chain(&self, start: u32) -> Result<Vec<u32>> {
        let mut chain = Vec::new();
        let mut c = start;
        while c != FREE_CLUSTER && c < EOC_MIN {
            chain.push(c);
            c = self.next_cluster(c)?;
            if chain.len() > 1_000_000 {
                return Err(KernelError::BadVolume); // runaway chain, corrupt FAT
            }
        }
        Ok(chain)
    }

    fn cluster_bytes(&self) -> usize {
        self.sectors_per_cluster as usize * 512
    }

    fn read_cluster(&self, cluster: u32, out: &mut [u8]) -> Result<()> {
        let sector = self.cluster_to_sector(cluster);
        for s in 0..self.sectors_per_cluster as u64 {
            let mut sector_buf = [0u8; 512];
            self.device.read_blocks(sector + s, &mut sector_buf).map_err(KernelError::Io)?;
            let off = s as usize * 512;
            out[off..off + 512].copy_from_slice(&sector_buf);
        }
        Ok(())
    }

    fn read_directory(&self, first_cluster: u32) -> Result<Vec<DirEntry>> {
        let chain = self.cluster_chain(first_cluster)?;
        let cluster_bytes = self.cluster_bytes();
        let mut out = Vec::new();
        let mut lfn_parts: Vec<(u8, [u16; 13])> = Vec::new();

        'clusters: for cluster in chain {
            let mut buf = alloc::vec![0u8; cluster_bytes];
            self.read_cluster(cluster, &mut buf)?;
            for raw in buf.chunks(32) {
                if raw[0] == 0x00 {
                    break 'clusters; // end of directory
                }
                if raw[0] == DELETED_MARK {
                    continue;
                }
                let attr = raw[11];
                if attr == ATTR_LONG_NAME {
                    lfn_parts.push((raw[0], decode_lfn_chars(raw)));
                    continue;
                }
                if attr & ATTR_VOLUME_ID != 0 {
                    lfn_parts.clear();
                    continue;
                }

                let name = if !lfn_parts.is_empty() {
                    let n = reassemble_lfn(&lfn_parts);
                    lfn_parts.clear();
                    n
                } else {
                    decode_short_name(raw)
                };

                let cluster_hi = u16::from_le_bytes([raw[20], raw[21]]) as u32;
                let cluster_lo = u16::from_le_bytes([raw[26], raw[27]]) as u32;
                let first_cluster = (cluster_hi << 16) | cluster_lo;
                let size = u32::from_le_bytes(raw[28..32].try_into().unwrap());
                let is_dir = attr & ATTR_DIRECTORY != 0;
                out.push(DirEntry { name, is_dir, size: size as u64, location: first_cluster as u64 });
            }
        }
        Ok(out)
    }
}

fn decode_lfn_chars(raw: &[u8]) -> [u16; 13] {
    let mut chars = [0u16; 13];
    let mut idx = 0;
    for off in [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30] {
        chars[idx] = u16::from_le_bytes([raw[off], raw[off + 1]]);
        idx += 1;
    }
    chars
}

fn reassemble_lfn(parts: &[(u8, [u16; 13])]) -> String {
    let mut ordered: Vec<&(u8, [u16; 13])> = parts.iter().collect();
    ordered.sort_by_key(|(order, _)| order & 0x1F);
    let mut units = Vec::new();
    for (_, chars) in ordered {
        for &c in chars {
            if c == 0x0000 || c == 0xFFFF {
                break;
            }
            units.push(c);
        }
    }
    String::from_utf16_lossy(&units)
}

fn decode_short_name(raw: &[u8]) -> String {
    let base = raw[0..8].iter().rposition(|&b| b != b' ').map(|i| i + 1).unwrap_or(0);
    let ext = raw[8..11].iter().rposition(|&b| b != b' ').map(|i| i + 1).unwrap_or(0);
    let mut name = String::new();
    name.push_str(core::str::from_utf8(&raw[0..base]).unwrap_or(""));
    if ext > 0 {
        name.push('.');
        name.push_str(core::str::from_utf8(&raw[8..8 + ext]).unwrap_or(""));
    }
    name
}

impl<'d> Filesystem for Fat32<'d> {
    fn find_path(&self, path: &str) -> Result<DirEntry> {
        let mut cluster = self.root_cluster;
        let mut result = DirEntry { name: String::new(), is_dir: true, size: 0, location: cluster as u64 };
        for component in crate::fs::split_components(path) {
            let entries = self.read_directory(cluster)?;
            let hit = entries
                .into_iter()
                .find(|e| e.name.eq_ignore_ascii_case(component))
                .ok_or(KernelError::NotFound)?;
            if hit.is_dir {
                cluster = hit.location as u32;
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
        let chain = self.cluster_chain(entry.location as u32)?;
        let cluster_bytes = self.cluster_bytes() as u64;
        let want = buf.len().min((entry.size - offset) as usize);
        let mut copied = 0;
        while copied < want {
            let pos = offset + copied as u64;
            let idx = (pos / cluster_bytes) as usize;
            let Some(&cluster) = chain.get(idx) else { break };
            let mut cbuf = alloc::vec![0u8; cluster_bytes as usize];
            self.read_cluster(cluster, &mut cbuf)?;
            let within = (pos % cluster_bytes) as usize;
            let take = (cluster_bytes as usize - within).min(want - copied);
            buf[copied..copied + take].copy_from_slice(&cbuf[within..within + take]);
            copied += take;
        }
        Ok(copied)
    }

    fn read_dir(&self, entry: &DirEntry) -> Result<Vec<DirEntry>> {
        if !entry.is_dir {
            return Err(KernelError::ParamErr);
        }
        self.read_directory(entry.location as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_trims_padding_and_inserts_dot() {
        let mut raw = [0u8; 32];
        raw[0..8].copy_from_slice(b"README  ");
        raw[8..11].copy_from_slice(b"TXT");
        assert_eq!(decode_short_name(&raw), "README.TXT");
    }

    #[test]
    fn short_name_without_extension_has_no_dot() {
        let mut raw = [0u8; 32];
        raw[0..8].copy_from_slice(b"BOOT    ");
        raw[8..11].copy_from_slice(b"   ");
        assert_eq!(decode_short_name(&raw), "BOOT");
    }

    #[test]
    fn lfn_reassembly_orders_fragments_and_stops_at_terminator() {
        // Physically first on disk: sequence 2, flagged as the last
        // logical entry (0x40), holding the tail of the name.
        let mut last_entry = [0u8; 32];
        last_entry[0] = 0x42;
        last_entry[11] = ATTR_LONG_NAME;
        for (i, c) in "cfg".encode_utf16().enumerate() {
            let off = [1, 3, 5][i];
            last_entry[off..off + 2].copy_from_slice(&c.to_le_bytes());
        }
        last_entry[7] = 0; // terminator right after "cfg"
        last_entry[8] = 0xFF;
        last_entry[9] = 0xFF;

        // Physically second: sequence 1, holding the head of the name.
        let mut first_entry = [0u8; 32];
        first_entry[0] = 0x01;
        first_entry[11] = ATTR_LONG_NAME;
        for (i, c) in "grub.".encode_utf16().enumerate() {
            let off = [1, 3, 5, 7, 9][i];
            first_entry[off..off + 2].copy_from_slice(&c.to_le_bytes());
        }

        let parts = alloc::vec![(last_entry[0], decode_lfn_chars(&last_entry)), (first_entry[0], decode_lfn_chars(&first_entry))];
        assert_eq!(reassemble_lfn(&parts), "grub.cfg");
    }
}

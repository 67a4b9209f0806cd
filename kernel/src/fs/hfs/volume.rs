//! HFS volume mount and catalog traversal (spec §4.5.1, §6 on-disk
//! format). Master directory block at sector 2, signature `0x4244`.

use alloc::string::String;
use alloc::vec::Vec;

use spin::Mutex;

use crate::block::BlockDevice;
use crate::error::{KernelError, Result};
use crate::fs::{DirEntry, Filesystem};

use super::bitmap::Bitmap;
use super::btree::{BTree, BTreeKind, CatalogKey, ExtentDescriptor3, ExtentKey};
use super::cache::Cache;
use super::extents::{decode_record, encode_record, ExtentDescriptor, ExtentRecord};
use super::file;

const MDB_SECTOR: u64 = 2;
const MDB_SIGNATURE: u16 = 0x4244;

/// Root directory's catalog node ID, fixed in every HFS volume (CNID 1
/// is the notional root *parent*, used only in thread records).
pub const ROOT_FOLDER_ID: u32 = 2;
/// CNID every folder/file thread record's key carries as its own
/// "parent": unused by lookup (thread records are skipped), kept here
/// for documentation parity with the on-disk format.
#[allow(dead_code)]
const ROOT_PARENT_ID: u32 = 1;

const RECORD_FOLDER: u8 = 1;
const RECORD_FILE: u8 = 2;
const RECORD_FOLDER_THREAD: u8 = 3;
const RECORD_FILE_THREAD: u8 = 4;

struct Mdb {
    vbm_start_sector: u64,
    alloc_block_size: u32,
    alloc_block_count: u32,
    first_alloc_block_sector: u64,
    extents_file_extents: ExtentDescriptor3,
    catalog_file_extents: ExtentDescriptor3,
}

impl Mdb {
    fn parse(sector: &[u8; 512]) -> Result<Self> {
        let sig = u16::from_be_bytes([sector[0], sector[1]]);
        if sig != MDB_SIGNATURE {
            return Err(KernelError::BadVolume);
        }
        let vbm_start_sector = u16::from_be_bytes([sector[14], sector[15]]) as u64;
        let alloc_block_count = u16::from_be_bytes([sector[18], sector[19]]) as u32;
        let alloc_block_size = u32::from_be_bytes(sector[20..24].try_into().unwrap());
        let first_alloc_block_sector = u16::from_be_bytes([sector[28], sector[29]]) as u64;

        if alloc_block_size == 0 || alloc_block_size % 512 != 0 {
            return Err(KernelError::BadVolume);
        }

        // drXTExtRec/drCTExtRec sit at MDB offsets 134/150 (Inside
        // Macintosh: Files), well past drVN (36..64) and the
        // file/directory counters (82..92) that precede them.
        let extents_file_extents = decode_record(&sector[134..146]);
        let catalog_file_extents = decode_record(&sector[150..162]);
        if extents_file_extents[0].block_count == 0 || catalog_file_extents[0].block_count == 0 {
            return Err(KernelError::BadVolume);
        }

        Ok(Self {
            vbm_start_sector,
            alloc_block_size,
            alloc_block_count,
            first_alloc_block_sector,
            extents_file_extents,
            catalog_file_extents,
        })
    }
}

/// A folder or file catalog record's payload, decoded from the bytes
/// following its key in a leaf node.
enum CatalogData {
    Folder { folder_id: u32 },
    File { file_id: u32, logical_eof: u32, extents: ExtentRecord },
    Thread,
}

fn decode_catalog_data(data: &[u8]) -> CatalogData {
    match data[0] {
        RECORD_FOLDER => CatalogData::Folder { folder_id: u32::from_be_bytes(data[4..8].try_into().unwrap()) },
        RECORD_FILE => CatalogData::File {
            file_id: u32::from_be_bytes(data[4..8].try_into().unwrap()),
            logical_eof: u32::from_be_bytes(data[8..12].try_into().unwrap()),
            extents: decode_record(&data[12..24]),
        },
        _ => CatalogData::Thread,
    }
}

fn encode_folder_record(folder_id: u32) -> alloc::vec::Vec<u8> {
    let mut out = alloc::vec![0u8; 8];
    out[0] = RECORD_FOLDER;
    out[4..8].copy_from_slice(&folder_id.to_be_bytes());
    out
}

pub fn encode_file_record(file_id: u32, logical_eof: u32, extents: &ExtentRecord) -> alloc::vec::Vec<u8> {
    let mut out = alloc::vec![0u8; 24];
    out[0] = RECORD_FILE;
    out[4..8].copy_from_slice(&file_id.to_be_bytes());
    out[8..12].copy_from_slice(&logical_eof.to_be_bytes());
    encode_record(extents, &mut out[12..24]);
    out
}

pub struct Volume<'d> {
    device: &'d dyn BlockDevice,
    cache: Mutex<Cache<'d>>,
    bitmap: Mutex<Bitmap<'d>>,
    catalog: BTree,
    extents: Mutex<BTree>,
    alloc_block_size: u32,
    first_alloc_block_sector: u64,
    next_cnid: Mutex<u32>,
}

impl<'d> Volume<'d> {
    pub fn mount(device: &'d dyn BlockDevice) -> Result<Self> {
        let mut sector = [0u8; 512];
        device.read_blocks(MDB_SECTOR, &mut sector).map_err(KernelError::Io)?;
        let mdb = Mdb::parse(&sector)?;

        let cache = Mutex::new(Cache::new(device));
        let bitmap = Bitmap::load(device, mdb.vbm_start_sector, mdb.alloc_block_count)?;

        let catalog = BTree::open(
            BTreeKind::Catalog,
            mdb.catalog_file_extents,
            mdb.alloc_block_size,
            mdb.first_alloc_block_sector,
            &cache,
        )?;
        let extents = BTree::open(
            BTreeKind::Extents,
            mdb.extents_file_extents,
            mdb.alloc_block_size,
            mdb.first_alloc_block_sector,
            &cache,
        )?;

        Ok(Self {
            device,
            cache,
            bitmap: Mutex::new(bitmap),
            catalog,
            extents: Mutex::new(extents),
            alloc_block_size: mdb.alloc_block_size,
            first_alloc_block_sector: mdb.first_alloc_block_sector,
            next_cnid: Mutex::new(16), // CNIDs below 16 are reserved, per convention
        })
    }

    fn extent_overflow(&self, file_id: u32, fork_type: u8, start_block: u16) -> Option<ExtentRecord> {
        let key = ExtentKey { file_id, fork_type, start_block };
        let mut found = None;
        let extents = self.extents.lock();
        let _ = extents.for_each_leaf(&self.cache, |k, data| {
            let candidate = ExtentKey::decode(k);
            if candidate == key {
                found = Some(decode_record(data));
                false
            } else {
                true
            }
        });
        found
    }

    /// Find the immediate child of `parent_id` named `name`
    /// (case-insensitive), returning its decoded catalog payload.
    fn lookup_child(&self, parent_id: u32, name: &str) -> Result<CatalogData> {
        let mut found = None;
        self.catalog.for_each_leaf(&self.cache, |k, data| {
            let key = CatalogKey::decode(k);
            if key.parent_id == parent_id && eq_ignore_case(key.name(), name.as_bytes()) {
                found = Some(decode_catalog_data(data));
                false
            } else {
                true
            }
        })?;
        found.ok_or(KernelError::NotFound)
    }

    fn find_file_by_id(&self, file_id: u32) -> Result<(u32, ExtentRecord)> {
        let mut found = None;
        self.catalog.for_each_leaf(&self.cache, |_k, data| {
            if let CatalogData::File { file_id: fid, logical_eof, extents } = decode_catalog_data(data) {
                if fid == file_id {
                    found = Some((logical_eof, extents));
                    return false;
                }
            }
            true
        })?;
        found.ok_or(KernelError::NotFound)
    }

    pub fn allocate_cnid(&self) -> u32 {
        let mut next = self.next_cnid.lock();
        let id = *next;
        *next += 1;
        id
    }

    /// Insert a new file record under `parent_id`. Blocks are taken
    /// from the bitmap (single inline extent only — this kernel does
    /// not grow a file past the three inline extent slots).
    pub fn create_file(&mut self, parent_id: u32, name: &str, blocks: u32) -> Result<u32> {
        let file_id = self.allocate_cnid();
        let (start, count) = self.bitmap.lock().alloc_blocks(blocks.max(1), blocks.max(1))?;
        let extents = [
            ExtentDescriptor { start_block: start as u16, block_count: count as u16 },
            ExtentDescriptor::default(),
            ExtentDescriptor::default(),
        ];
        let key = CatalogKey::new(parent_id, name.as_bytes());
        let data = encode_file_record(file_id, 0, &extents);
        self.catalog.insert_leaf(&self.cache, &key.encode(), &data)?;
        Ok(file_id)
    }

    pub fn create_folder(&mut self, parent_id: u32, name: &str) -> Result<u32> {
        let folder_id = self.allocate_cnid();
        let key = CatalogKey::new(parent_id, name.as_bytes());
        let data = encode_folder_record(folder_id);
        self.catalog.insert_leaf(&self.cache, &key.encode(), &data)?;
        Ok(folder_id)
    }

    pub fn flush(&self) -> Result<()> {
        self.bitmap.lock().flush()?;
        self.cache.lock().flush_all()
    }
}

fn eq_ignore_case(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_ascii_uppercase() == y.to_ascii_uppercase())
}

impl<'d> Filesystem for Volume<'d> {
    fn find_path(&self, path: &str) -> Result<DirEntry> {
        let mut current = ROOT_FOLDER_ID;
        let mut last: Option<(String, CatalogData)> = None;
        for component in crate::fs::split_components(path) {
            let data = self.lookup_child(current, component)?;
            match &data {
                CatalogData::Folder { folder_id } => current = *folder_id,
                CatalogData::File { .. } => {}
                CatalogData::Thread => return Err(KernelError::NotFound),
            }
            last = Some((String::from(component), data));
        }
        match last {
            None => Ok(crate::fs::root_entry(ROOT_FOLDER_ID as u64)),
            Some((name, CatalogData::Folder { folder_id })) => {
                Ok(DirEntry { name, is_dir: true, size: 0, location: folder_id as u64 })
            }
            Some((name, CatalogData::File { file_id, logical_eof, .. })) => {
                Ok(DirEntry { name, is_dir: false, size: logical_eof as u64, location: file_id as u64 })
            }
            Some((_, CatalogData::Thread)) => Err(KernelError::NotFound),
        }
    }

    fn read_file(&self, entry: &DirEntry, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if entry.is_dir {
            return Err(KernelError::ParamErr);
        }
        let (eof, extents) = self.find_file_by_id(entry.location as u32)?;
        file::read(
            &self.cache,
            self.alloc_block_size,
            self.first_alloc_block_sector,
            &extents,
            entry.location as u32,
            0,
            eof,
            offset,
            buf,
            |file_id, fork, start| self.extent_overflow(file_id, fork, start),
        )
    }

    fn read_dir(&self, entry: &DirEntry) -> Result<Vec<DirEntry>> {
        if !entry.is_dir {
            return Err(KernelError::ParamErr);
        }
        let folder_id = entry.location as u32;
        let mut out = Vec::new();
        self.catalog.for_each_leaf(&self.cache, |k, data| {
            let key = CatalogKey::decode(k);
            if key.parent_id != folder_id {
                return true;
            }
            let name = String::from_utf8_lossy(key.name()).into_owned();
            match decode_catalog_data(data) {
                CatalogData::Folder { folder_id } => out.push(DirEntry { name, is_dir: true, size: 0, location: folder_id as u64 }),
                CatalogData::File { file_id, logical_eof, .. } => {
                    out.push(DirEntry { name, is_dir: false, size: logical_eof as u64, location: file_id as u64 })
                }
                CatalogData::Thread => {}
            }
            true
        })?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a literal MDB sector with distinct, recognizable values in
    /// every field this kernel reads, per Inside Macintosh: Files' layout:
    /// `drVBMSt`@14, `drNmAlBlks`@18, `drAlBlkSiz`@20, `drAlBlSt`@28,
    /// `drXTExtRec`@134 (12 bytes), `drCTExtRec`@150 (12 bytes).
    fn sample_mdb() -> [u8; 512] {
        let mut s = [0u8; 512];
        s[0..2].copy_from_slice(&MDB_SIGNATURE.to_be_bytes());
        s[14..16].copy_from_slice(&200u16.to_be_bytes()); // drVBMSt
        s[18..20].copy_from_slice(&4096u16.to_be_bytes()); // drNmAlBlks
        s[20..24].copy_from_slice(&1024u32.to_be_bytes()); // drAlBlkSiz
        s[28..30].copy_from_slice(&300u16.to_be_bytes()); // drAlBlSt

        // drXTExtRec: one descriptor (start=10, count=2), rest zero.
        s[134..136].copy_from_slice(&10u16.to_be_bytes());
        s[136..138].copy_from_slice(&2u16.to_be_bytes());

        // drCTExtRec: one descriptor (start=50, count=7), rest zero.
        s[150..152].copy_from_slice(&50u16.to_be_bytes());
        s[152..154].copy_from_slice(&7u16.to_be_bytes());

        s
    }

    #[test]
    fn mdb_parse_reads_extent_records_from_their_real_offsets() {
        let mdb = Mdb::parse(&sample_mdb()).unwrap();
        assert_eq!(mdb.vbm_start_sector, 200);
        assert_eq!(mdb.alloc_block_count, 4096);
        assert_eq!(mdb.alloc_block_size, 1024);
        assert_eq!(mdb.first_alloc_block_sector, 300);

        assert_eq!(mdb.extents_file_extents[0].start_block, 10);
        assert_eq!(mdb.extents_file_extents[0].block_count, 2);
        assert_eq!(mdb.catalog_file_extents[0].start_block, 50);
        assert_eq!(mdb.catalog_file_extents[0].block_count, 7);
    }

    #[test]
    fn mdb_parse_rejects_bad_signature() {
        let mut s = sample_mdb();
        s[0..2].copy_from_slice(&0u16.to_be_bytes());
        assert_eq!(Mdb::parse(&s).unwrap_err(), KernelError::BadVolume);
    }

    #[test]
    fn mdb_parse_rejects_empty_extent_records() {
        let mut s = sample_mdb();
        s[134..146].copy_from_slice(&[0u8; 12]); // zero out drXTExtRec
        assert_eq!(Mdb::parse(&s).unwrap_err(), KernelError::BadVolume);
    }
}

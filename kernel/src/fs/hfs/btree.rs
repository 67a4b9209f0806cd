//! B-tree node layout, leaf iteration, and single-level insert
//! (spec §4.5.3, §4.5.4). Depth-1 trees only: splitting and internal
//! index nodes are out of scope, matching every volume this kernel is
//! expected to mount (a freshly-initialized disk never grows a catalog
//! past one leaf node's worth of files without real split support,
//! which `BTreeFull` makes an explicit, surfaced error rather than
//! silent corruption).

use alloc::vec::Vec;
use core::cmp::Ordering;

use spin::Mutex;

use crate::error::{KernelError, Result};

use super::cache::Cache;
use super::extents::{map_block, ExtentDescriptor};

pub const INDEX_NODE: u8 = 0x00;
pub const HEADER_NODE: u8 = 0x01;
pub const MAP_NODE: u8 = 0x02;
pub const LEAF_NODE: u8 = 0xFF;

#[derive(Clone, Copy)]
pub enum BTreeKind {
    Catalog,
    Extents,
}

/// `parentID` + case-folded name, compared per spec §4.5.4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CatalogKey {
    pub parent_id: u32,
    name: [u8; 31],
    name_len: u8,
}

impl CatalogKey {
    pub fn new(parent_id: u32, name: &[u8]) -> Self {
        let len = name.len().min(31);
        let mut buf = [0u8; 31];
        buf[..len].copy_from_slice(&name[..len]);
        Self { parent_id, name: buf, name_len: len as u8 }
    }

    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len as usize]
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(7 + self.name_len as usize);
        out.push(6 + self.name_len); // keyLength: bytes following this field itself
        out.push(0); // reserved
        out.extend_from_slice(&self.parent_id.to_be_bytes());
        out.push(self.name_len);
        out.extend_from_slice(self.name());
        out
    }

    pub fn decode(buf: &[u8]) -> Self {
        let parent_id = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
        let name_len = buf[6];
        Self::new(parent_id, &buf[7..7 + name_len as usize])
    }
}

pub fn cmp_catalog(a: &CatalogKey, b: &CatalogKey) -> Ordering {
    a.parent_id.cmp(&b.parent_id).then_with(|| {
        let (an, bn) = (a.name(), b.name());
        for i in 0..an.len().min(bn.len()) {
            let ord = an[i].to_ascii_uppercase().cmp(&bn[i].to_ascii_uppercase());
            if ord != Ordering::Equal {
                return ord;
            }
        }
        an.len().cmp(&bn.len())
    })
}

/// `fileID` + fork + starting allocation block, compared per
/// spec §4.5.4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtentKey {
    pub file_id: u32,
    pub fork_type: u8,
    pub start_block: u16,
}

impl ExtentKey {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8);
        out.push(7); // keyLength
        out.push(self.fork_type);
        out.extend_from_slice(&self.file_id.to_be_bytes());
        out.extend_from_slice(&self.start_block.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            fork_type: buf[1],
            file_id: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
            start_block: u16::from_be_bytes([buf[6], buf[7]]),
        }
    }
}

pub fn cmp_extent(a: &ExtentKey, b: &ExtentKey) -> Ordering {
    a.file_id.cmp(&b.file_id).then(a.fork_type.cmp(&b.fork_type)).then(a.start_block.cmp(&b.start_block))
}

pub struct NodeDescriptor {
    pub f_link: u32,
    pub b_link: u32,
    pub kind: u8,
    pub height: u8,
    pub num_recs: u16,
}

impl NodeDescriptor {
    pub fn read(node: &[u8]) -> Self {
        Self {
            f_link: u32::from_be_bytes(node[0..4].try_into().unwrap()),
            b_link: u32::from_be_bytes(node[4..8].try_into().unwrap()),
            kind: node[8],
            height: node[9],
            num_recs: u16::from_be_bytes(node[10..12].try_into().unwrap()),
        }
    }

    pub fn write(&self, node: &mut [u8]) {
        node[0..4].copy_from_slice(&self.f_link.to_be_bytes());
        node[4..8].copy_from_slice(&self.b_link.to_be_bytes());
        node[8] = self.kind;
        node[9] = self.height;
        node[10..12].copy_from_slice(&self.num_recs.to_be_bytes());
        node[12..14].copy_from_slice(&0u16.to_be_bytes());
    }
}

pub const NODE_DESCRIPTOR_LEN: usize = 14;

/// Offset table entry `i` lives at `node[nodeSize - 2*(i+1)]`, growing
/// backward from the last two bytes (spec §4.5.3).
fn record_offset(node: &[u8], node_size: usize, i: usize) -> usize {
    let pos = node_size - 2 * (i + 1);
    u16::from_be_bytes([node[pos], node[pos + 1]]) as usize
}

/// Byte span of each of `num_recs` records in `node`. The last record
/// runs to the base of the offset table itself.
pub fn records_of(node: &[u8], node_size: usize, num_recs: u16) -> Vec<(usize, usize)> {
    let num_recs = num_recs as usize;
    let table_base = node_size - 2 * num_recs;
    let mut out = Vec::with_capacity(num_recs);
    for i in 0..num_recs {
        let start = record_offset(node, node_size, i);
        let end = if i + 1 < num_recs { record_offset(node, node_size, i + 1) } else { table_base };
        out.push((start, end));
    }
    out
}

fn write_offset(node: &mut [u8], node_size: usize, i: usize, value: u16) {
    let pos = node_size - 2 * (i + 1);
    node[pos..pos + 2].copy_from_slice(&value.to_be_bytes());
}

pub struct BTreeHeader {
    pub depth: u16,
    pub root_node: u32,
    pub leaf_records: u32,
    pub first_leaf_node: u32,
    pub last_leaf_node: u32,
    pub node_size: u16,
    pub max_key_length: u16,
    pub total_nodes: u32,
    pub free_nodes: u32,
}

impl BTreeHeader {
    /// Header record occupies node 0 immediately after its 14-byte
    /// descriptor (node 0's record 0, per the header node layout).
    pub fn read(node0: &[u8]) -> Self {
        Self {
            depth: u16::from_be_bytes(node0[14..16].try_into().unwrap()),
            root_node: u32::from_be_bytes(node0[16..20].try_into().unwrap()),
            leaf_records: u32::from_be_bytes(node0[20..24].try_into().unwrap()),
            first_leaf_node: u32::from_be_bytes(node0[24..28].try_into().unwrap()),
            last_leaf_node: u32::from_be_bytes(node0[28..32].try_into().unwrap()),
            node_size: u16::from_be_bytes(node0[32..34].try_into().unwrap()),
            max_key_length: u16::from_be_bytes(node0[34..36].try_into().unwrap()),
            total_nodes: u32::from_be_bytes(node0[36..40].try_into().unwrap()),
            free_nodes: u32::from_be_bytes(node0[40..44].try_into().unwrap()),
        }
    }
}

/// A mounted B-tree file (catalog or extents overflow): its own inline
/// extents (this kernel does not support a B-tree file large enough to
/// need overflow extents of its own), plus the parsed header. Does not
/// own the block cache — every method takes it as a parameter — so a
/// `Volume` can hold both a `BTree` and its `Mutex<Cache>` side by side
/// without a self-referential borrow.
pub struct BTree {
    pub kind: BTreeKind,
    extents: ExtentDescriptor3,
    alloc_block_size: u32,
    first_alloc_block_sector: u64,
    pub header: BTreeHeader,
}

pub type ExtentDescriptor3 = [ExtentDescriptor; 3];

impl BTree {
    pub fn open(
        kind: BTreeKind,
        extents: ExtentDescriptor3,
        alloc_block_size: u32,
        first_alloc_block_sector: u64,
        cache: &Mutex<Cache<'_>>,
    ) -> Result<Self> {
        let node0 = read_node_bytes(&extents, alloc_block_size, first_alloc_block_sector, 0, 512, cache)?;
        let desc = NodeDescriptor::read(&node0);
        if desc.kind != HEADER_NODE {
            return Err(KernelError::BadVolume);
        }
        let header = BTreeHeader::read(&node0);
        Ok(Self { kind, extents, alloc_block_size, first_alloc_block_sector, header })
    }

    fn node_size(&self) -> usize {
        self.header.node_size as usize
    }

    pub fn read_node(&self, cache: &Mutex<Cache<'_>>, n: u32) -> Result<Vec<u8>> {
        read_node_bytes(&self.extents, self.alloc_block_size, self.first_alloc_block_sector, n, self.node_size(), cache)
    }

    fn write_node(&self, cache: &Mutex<Cache<'_>>, n: u32, data: &[u8]) -> Result<()> {
        write_node_bytes(&self.extents, self.alloc_block_size, self.first_alloc_block_sector, n, data, cache)
    }

    fn cmp_keys(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.kind {
            BTreeKind::Catalog => cmp_catalog(&CatalogKey::decode(a), &CatalogKey::decode(b)),
            BTreeKind::Extents => cmp_extent(&ExtentKey::decode(a), &ExtentKey::decode(b)),
        }
    }

    /// Visit every leaf record starting at `firstLeafNode`, following
    /// `fLink` between nodes, until `visitor` returns `false` or the
    /// chain is exhausted.
    pub fn for_each_leaf(&self, cache: &Mutex<Cache<'_>>, mut visitor: impl FnMut(&[u8], &[u8]) -> bool) -> Result<()> {
        let mut node_num = self.header.first_leaf_node;
        if node_num == 0 {
            return Ok(());
        }
        loop {
            let node = self.read_node(cache, node_num)?;
            let desc = NodeDescriptor::read(&node);
            for (start, end) in records_of(&node, self.node_size(), desc.num_recs) {
                let key_len = node[start] as usize;
                let key = &node[start..start + 1 + key_len];
                // Key records are padded to even length on disk; data
                // follows immediately after the raw key bytes.
                let data_start = start + 1 + key_len + ((1 + key_len) % 2);
                let data = &node[data_start..end];
                if !visitor(key, data) {
                    return Ok(());
                }
            }
            if desc.f_link == 0 {
                return Ok(());
            }
            node_num = desc.f_link;
        }
    }

    /// Insert into the root/leaf node (depth-1 trees only). Finds the
    /// sorted position by linear scan, shifts record bytes and the
    /// offset table, and flushes the node. Returns `BTreeFull` if the
    /// node would overflow.
    pub fn insert_leaf(&mut self, cache: &Mutex<Cache<'_>>, key: &[u8], data: &[u8]) -> Result<()> {
        let node_num = self.header.root_node;
        let mut node = self.read_node(cache, node_num)?;
        let node_size = self.node_size();
        let desc = NodeDescriptor::read(&node);
        if desc.kind != LEAF_NODE {
            return Err(KernelError::ParamErr);
        }
        let spans = records_of(&node, node_size, desc.num_recs);

        let mut insert_at = spans.len();
        for (i, (start, end)) in spans.iter().enumerate() {
            let existing_key_len = node[*start] as usize;
            let existing_key = &node[*start..*start + 1 + existing_key_len];
            let _ = end;
            if self.cmp_keys(key, existing_key) == Ordering::Less {
                insert_at = i;
                break;
            }
        }

        let key_padded_len = key.len() + (key.len() % 2);
        let record_len = key_padded_len + data.len();
        let new_num_recs = desc.num_recs + 1;
        let tail_end = spans.last().map(|(_, e)| *e).unwrap_or(NODE_DESCRIPTOR_LEN);
        let new_table_base = node_size - 2 * new_num_recs as usize;
        if new_table_base < tail_end || new_table_base - tail_end < record_len {
            return Err(KernelError::BTreeFull);
        }

        let insert_byte = if insert_at < spans.len() { spans[insert_at].0 } else { tail_end };

        // Shift everything from insert_byte onward forward by record_len
        // to make room, then write the new record in place.
        node.copy_within(insert_byte..tail_end, insert_byte + record_len);
        node[insert_byte..insert_byte + key.len()].copy_from_slice(key);
        for pad in key.len()..key_padded_len {
            node[insert_byte + pad] = 0;
        }
        node[insert_byte + key_padded_len..insert_byte + record_len].copy_from_slice(data);

        // Rebuild the offset table: records before insert_at keep their
        // offsets, the new record gets insert_byte, and everything after
        // shifts by record_len.
        for i in (0..spans.len()).rev() {
            let old_offset = spans[i].0;
            let shifted = if i >= insert_at { old_offset + record_len } else { old_offset };
            let dest_index = if i >= insert_at { i + 1 } else { i };
            write_offset(&mut node, node_size, dest_index, shifted as u16);
        }
        write_offset(&mut node, node_size, insert_at, insert_byte as u16);

        let mut new_desc = NodeDescriptor::read(&node);
        new_desc.num_recs = new_num_recs;
        new_desc.write(&mut node);

        self.write_node(cache, node_num, &node)?;
        self.header.leaf_records += 1;
        Ok(())
    }
}

fn read_node_bytes(
    extents: &ExtentDescriptor3,
    alloc_block_size: u32,
    first_alloc_block_sector: u64,
    n: u32,
    node_size: usize,
    cache: &Mutex<Cache<'_>>,
) -> Result<Vec<u8>> {
    let mut out = alloc::vec![0u8; node_size];
    let sectors_per_block = alloc_block_size / 512;
    let mut remaining = node_size;
    let mut byte_offset = n as u64 * node_size as u64;
    let mut written = 0;
    while remaining > 0 {
        let logical_block = (byte_offset / alloc_block_size as u64) as u32;
        let within_block = byte_offset % alloc_block_size as u64;
        let (phys_block, _) = map_block(extents, logical_block).ok_or(KernelError::OutOfRange)?;
        let phys_sector = first_alloc_block_sector + phys_block as u64 * sectors_per_block as u64 + within_block / 512;
        let mut cache = cache.lock();
        let slot = cache.get(phys_sector)?;
        let sector_off = (within_block % 512) as usize;
        let take = (512 - sector_off).min(remaining);
        out[written..written + take].copy_from_slice(&cache.data(slot)[sector_off..sector_off + take]);
        cache.release(slot, false);
        written += take;
        remaining -= take;
        byte_offset += take as u64;
    }
    Ok(out)
}

fn write_node_bytes(
    extents: &ExtentDescriptor3,
    alloc_block_size: u32,
    first_alloc_block_sector: u64,
    n: u32,
    data: &[u8],
    cache: &Mutex<Cache<'_>>,
) -> Result<()> {
    let sectors_per_block = alloc_block_size / 512;
    let mut remaining = data.len();
    let mut byte_offset = n as u64 * data.len() as u64;
    let mut read = 0;
    while remaining > 0 {
        let logical_block = (byte_offset / alloc_block_size as u64) as u32;
        let within_block = byte_offset % alloc_block_size as u64;
        let (phys_block, _) = map_block(extents, logical_block).ok_or(KernelError::OutOfRange)?;
        let phys_sector = first_alloc_block_sector + phys_block as u64 * sectors_per_block as u64 + within_block / 512;
        let mut cache = cache.lock();
        let slot = cache.get(phys_sector)?;
        let sector_off = (within_block % 512) as usize;
        let take = (512 - sector_off).min(remaining);
        cache.data_mut(slot)[sector_off..sector_off + take].copy_from_slice(&data[read..read + take]);
        cache.release(slot, true);
        read += take;
        remaining -= take;
        byte_offset += take as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_key_round_trips_through_encode_decode() {
        let k = CatalogKey::new(2, b"Hello");
        let enc = k.encode();
        let dec = CatalogKey::decode(&enc);
        assert_eq!(dec.parent_id, 2);
        assert_eq!(dec.name(), b"Hello");
    }

    #[test]
    fn catalog_compare_is_case_insensitive_then_parent_then_length() {
        let a = CatalogKey::new(2, b"apple");
        let b = CatalogKey::new(2, b"APPLE");
        assert_eq!(cmp_catalog(&a, &b), Ordering::Equal);

        let short = CatalogKey::new(2, b"ab");
        let long = CatalogKey::new(2, b"abc");
        assert_eq!(cmp_catalog(&short, &long), Ordering::Less);

        let p1 = CatalogKey::new(1, b"zzz");
        let p2 = CatalogKey::new(2, b"aaa");
        assert_eq!(cmp_catalog(&p1, &p2), Ordering::Less);
    }

    #[test]
    fn extent_compare_orders_by_file_then_fork_then_start() {
        let a = ExtentKey { file_id: 5, fork_type: 0, start_block: 10 };
        let b = ExtentKey { file_id: 5, fork_type: 0, start_block: 20 };
        assert_eq!(cmp_extent(&a, &b), Ordering::Less);
        let c = ExtentKey { file_id: 5, fork_type: 1, start_block: 0 };
        assert_eq!(cmp_extent(&a, &c), Ordering::Less);
    }

    #[test]
    fn records_of_reads_backward_growing_offset_table() {
        let node_size = 32usize;
        let mut node = alloc::vec![0u8; node_size];
        // Two records: [14..20) and [20..24).
        write_offset(&mut node, node_size, 0, 14);
        write_offset(&mut node, node_size, 1, 20);
        let spans = records_of(&node, node_size, 2);
        assert_eq!(spans, alloc::vec![(14, 20), (20, node_size - 4)]);
    }

    struct MemDevice {
        data: Mutex<Vec<u8>>,
    }

    impl crate::block::BlockDevice for MemDevice {
        fn sector_count(&self) -> u64 {
            (self.data.lock().len() / crate::block::SECTOR_SIZE) as u64
        }
        fn ready(&self) -> bool {
            true
        }
        fn read_blocks(&self, lba: u64, dst: &mut [u8]) -> core::result::Result<(), crate::error::IoError> {
            let data = self.data.lock();
            let off = lba as usize * crate::block::SECTOR_SIZE;
            dst.copy_from_slice(&data[off..off + dst.len()]);
            Ok(())
        }
        fn write_blocks(&self, lba: u64, src: &[u8]) -> core::result::Result<(), crate::error::IoError> {
            let mut data = self.data.lock();
            let off = lba as usize * crate::block::SECTOR_SIZE;
            data[off..off + src.len()].copy_from_slice(src);
            Ok(())
        }
    }

    /// One header node (sector 0) and one empty leaf node (sector 1),
    /// wired together as a depth-1 catalog tree over a 2-sector volume.
    fn two_node_catalog_tree() -> (MemDevice, ExtentDescriptor3) {
        let node_size = 512usize;
        let mut image = alloc::vec![0u8; 2 * node_size];

        let header_desc = NodeDescriptor { f_link: 0, b_link: 0, kind: HEADER_NODE, height: 0, num_recs: 0 };
        header_desc.write(&mut image[0..node_size]);
        image[14..16].copy_from_slice(&1u16.to_be_bytes()); // depth
        image[16..20].copy_from_slice(&1u32.to_be_bytes()); // root_node
        image[20..24].copy_from_slice(&0u32.to_be_bytes()); // leaf_records
        image[24..28].copy_from_slice(&1u32.to_be_bytes()); // first_leaf_node
        image[28..32].copy_from_slice(&1u32.to_be_bytes()); // last_leaf_node
        image[32..34].copy_from_slice(&(node_size as u16).to_be_bytes());
        image[34..36].copy_from_slice(&37u16.to_be_bytes()); // max_key_length
        image[36..40].copy_from_slice(&2u32.to_be_bytes()); // total_nodes
        image[40..44].copy_from_slice(&0u32.to_be_bytes()); // free_nodes

        let leaf_desc = NodeDescriptor { f_link: 0, b_link: 0, kind: LEAF_NODE, height: 1, num_recs: 0 };
        leaf_desc.write(&mut image[node_size..2 * node_size]);

        let device = MemDevice { data: Mutex::new(image) };
        let extents = [ExtentDescriptor { start_block: 0, block_count: 2 }, ExtentDescriptor::default(), ExtentDescriptor::default()];
        (device, extents)
    }

    #[test]
    fn leaf_insert_keeps_records_in_sorted_order() {
        let (device, extents) = two_node_catalog_tree();
        let cache = Mutex::new(Cache::new(&device));
        let mut tree = BTree::open(BTreeKind::Catalog, extents, 512, 0, &cache).unwrap();

        let apple = CatalogKey::new(2, b"Apple").encode();
        let cherry = CatalogKey::new(2, b"Cherry").encode();
        let banana = CatalogKey::new(2, b"banana").encode();

        tree.insert_leaf(&cache, &apple, &[0xAA]).unwrap();
        tree.insert_leaf(&cache, &cherry, &[0xCC]).unwrap();
        tree.insert_leaf(&cache, &banana, &[0xBB]).unwrap();

        let mut names = Vec::new();
        tree.for_each_leaf(&cache, |k, _data| {
            names.push(alloc::string::String::from_utf8_lossy(CatalogKey::decode(k).name()).into_owned());
            true
        })
        .unwrap();

        assert_eq!(names, alloc::vec!["Apple", "banana", "Cherry"]);
    }
}

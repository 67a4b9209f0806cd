//! Filesystem stack: HFS (read/write, B-tree catalog + extents) and two
//! read-only parallel paths, FAT32 and ISO9660, all sharing the
//! `block::BlockDevice` abstraction (spec §4.5, SPEC_FULL §4.5).

pub mod fat32;
pub mod hfs;
pub mod iso9660;

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{KernelError, Result};

/// One directory entry as returned by `read_dir`/`find_path`, common
/// across all three filesystem backends.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    /// Backend-specific locator: HFS catalog node ID, FAT32 first
    /// cluster, or ISO9660 extent LBA.
    pub location: u64,
}

/// Shared read surface every mounted filesystem exposes. HFS's write
/// path (`hfs::Volume::write`) lives outside this trait since FAT32 and
/// ISO9660 are read-only media in this kernel (spec §4.5 Non-goals are
/// silent on FAT32 writes; SPEC_FULL §4.5 treats it as boot/rescue
/// read-only media, matching every FAT32 file in the original source).
pub trait Filesystem {
    fn find_path(&self, path: &str) -> Result<DirEntry>;
    fn read_file(&self, entry: &DirEntry, offset: u64, buf: &mut [u8]) -> Result<usize>;
    fn read_dir(&self, entry: &DirEntry) -> Result<Vec<DirEntry>>;
}

/// Root directory entry every backend returns for `find_path("/")`.
pub fn root_entry(location: u64) -> DirEntry {
    DirEntry { name: String::new(), is_dir: true, size: 0, location }
}

pub fn split_components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Tried in order against an unknown block device during boot
/// (spec §4.5: "a caller can try HFS, then FAT32, then ISO9660... without
/// knowing which one mounts").
pub enum MountedFs<'d> {
    Hfs(hfs::Volume<'d>),
    Fat32(fat32::Fat32<'d>),
    Iso9660(iso9660::Iso9660<'d>),
}

pub fn mount_any<'d>(device: &'d dyn crate::block::BlockDevice) -> Result<MountedFs<'d>> {
    if let Ok(vol) = hfs::Volume::mount(device) {
        return Ok(MountedFs::Hfs(vol));
    }
    if let Ok(fs) = fat32::Fat32::mount(device) {
        return Ok(MountedFs::Fat32(fs));
    }
    if let Ok(fs) = iso9660::Iso9660::mount(device) {
        return Ok(MountedFs::Iso9660(fs));
    }
    Err(KernelError::BadVolume)
}

impl<'d> Filesystem for MountedFs<'d> {
    fn find_path(&self, path: &str) -> Result<DirEntry> {
        match self {
            MountedFs::Hfs(v) => v.find_path(path),
            MountedFs::Fat32(v) => v.find_path(path),
            MountedFs::Iso9660(v) => v.find_path(path),
        }
    }

    fn read_file(&self, entry: &DirEntry, offset: u64, buf: &mut [u8]) -> Result<usize> {
        match self {
            MountedFs::Hfs(v) => v.read_file(entry, offset, buf),
            MountedFs::Fat32(v) => v.read_file(entry, offset, buf),
            MountedFs::Iso9660(v) => v.read_file(entry, offset, buf),
        }
    }

    fn read_dir(&self, entry: &DirEntry) -> Result<Vec<DirEntry>> {
        match self {
            MountedFs::Hfs(v) => v.read_dir(entry),
            MountedFs::Fat32(v) => v.read_dir(entry),
            MountedFs::Iso9660(v) => v.read_dir(entry),
        }
    }
}

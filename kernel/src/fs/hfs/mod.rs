//! HFS core: mount, allocation bitmap, B-tree catalog/extents, extent
//! mapping, file I/O, and the block cache (spec §4.5).

pub mod bitmap;
pub mod btree;
pub mod cache;
pub mod extents;
pub mod file;
pub mod volume;

pub use volume::Volume;

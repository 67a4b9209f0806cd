//! Platform Abstraction Layer.
//!
//! Every higher-level component — traps, the block device layer, input
//! drivers, the timer — calls through here rather than touching
//! architecture-specific code directly. The PAL exports exactly the same
//! names on every architecture; nothing above this module branches on
//! `target_arch`.
//!
//! x86_64 is the only architecture with a real backing implementation;
//! `arch::aarch64::pal` exists with the same signatures so a port only has
//! to fill in bodies, never rename call sites.

#[cfg(target_arch = "x86_64")]
pub use crate::arch::x86_64::pal::*;

#[cfg(target_arch = "aarch64")]
pub use crate::arch::aarch64::pal::*;

// =============================================================================
// MinimalOS NextGen — aarch64 Architecture HAL
// =============================================================================
//
// Mirrors `arch::x86_64`'s public shape so `crate::pal` can re-export this
// module's `pal` unchanged. Port-I/O is a no-op here (spec §4.1): ARM64
// devices are all MMIO, so `port_in*/out*` exist only to keep the PAL's
// name surface identical across architectures.
// =============================================================================

pub mod pal;

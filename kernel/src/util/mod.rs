// =============================================================================
// MinimalOS NextGen — Kernel Utilities
// =============================================================================
//
// Shared utilities used across the entire kernel.
//
//   panic.rs — panic handler (what happens when the kernel panics)
//
// Formatted console output goes through `klog`, not a kernel-local printer:
// klog already wraps `khal::serial` with level tags and works before the
// heap is up, which is exactly what a panic handler needs.
// =============================================================================

pub mod panic;

//! Kernel-wide error types.
//!
//! Every fallible API in this kernel returns one of these instead of
//! panicking or silently substituting a default. CPU exceptions are the
//! one exception to "return an error": they never return at all (see
//! `traps::fault_sentinel`).

use core::fmt;

/// Block-device transport failure. Retried at the backend (ATA: up to 3
/// times) before being surfaced to the caller as `KernelError::Io`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    NotReady,
    BadBlock,
    Timeout,
    OutOfRange,
    WriteProtected,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IoError::NotReady => "device not ready",
            IoError::BadBlock => "bad block",
            IoError::Timeout => "transfer timed out",
            IoError::OutOfRange => "block index out of range",
            IoError::WriteProtected => "device is write-protected",
        };
        f.write_str(s)
    }
}

/// Error kinds surfaced across the kernel core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Block-device transport failure (see `IoError` for the reason).
    Io(IoError),
    /// Volume failed mount validation. Fatal for that mount; the kernel
    /// keeps running and simply never mounts that volume.
    BadVolume,
    /// Seek or extent index past end of file/device.
    OutOfRange,
    /// Allocation bitmap has no run of the requested size.
    OutOfSpace,
    /// Catalog or directory lookup failed.
    NotFound,
    /// A B-tree leaf cannot accept an insert (would overflow the node);
    /// split/rebalance is out of scope, so this is not recoverable by
    /// retrying — the caller must not treat it as transient.
    BTreeFull,
    /// API misuse (bad argument, wrong state for the call).
    ParamErr,
    /// Heap allocation failed.
    MemErr,
    /// A CPU exception reached the fault sentinel. Never actually
    /// returned — the sentinel halts rather than unwinding — kept as a
    /// variant so logging/diagnostics that want to name the fault kind
    /// alongside the rest of `KernelError` have one to construct.
    CpuException,
}

impl From<IoError> for KernelError {
    fn from(e: IoError) -> Self {
        KernelError::Io(e)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Io(e) => write!(f, "I/O error: {e}"),
            KernelError::BadVolume => f.write_str("volume failed mount validation"),
            KernelError::OutOfRange => f.write_str("out of range"),
            KernelError::OutOfSpace => f.write_str("allocation bitmap exhausted"),
            KernelError::NotFound => f.write_str("not found"),
            KernelError::BTreeFull => f.write_str("b-tree leaf full (split out of scope)"),
            KernelError::ParamErr => f.write_str("invalid parameter"),
            KernelError::MemErr => f.write_str("out of memory"),
            KernelError::CpuException => f.write_str("cpu exception"),
        }
    }
}

pub type Result<T> = core::result::Result<T, KernelError>;

//! # Error taxonomy

use crate::dispatch::InstallError;
use crate::sdt::Signature;

/// Coarse classification of an [`AcpiPlatformError`].
///
/// The driver maps these onto firmware status codes; tests use them to assert
/// the class of a failure without pinning the exact variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A structure that was looked for does not exist.
    NotFound,
    /// The structure exists but in a form this firmware does not handle.
    Unsupported,
    /// Corrupt or malformed data: checksum mismatch, bad length, unmapped memory.
    ProtocolError,
    /// A size did not match what the protocol requires.
    BadBufferSize,
    /// A buffer could not be allocated.
    OutOfResources,
    /// The caller passed an unusable argument.
    InvalidParameter,
    /// The firmware table registry rejected a table.
    InstallFailed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcpiPlatformError {
    #[error("RSDP not found in {start:#x}..{end:#x}")]
    RsdpNotFound { start: u64, end: u64 },
    #[error("unsupported RSDP found at {address:#x} (revision {revision})")]
    UnsupportedRevision { address: u64, revision: u8 },
    #[error("RSDP header checksum not valid: {sum:#04x}")]
    RsdpChecksum { address: u64, sum: u8 },
    #[error("RSDP table checksum not valid: {sum:#04x}")]
    RsdpExtendedChecksum { address: u64, sum: u8 },
    #[error("RSDP at {address:#x} reports invalid length {length}")]
    RsdpLength { address: u64, length: u32 },
    #[error("XSDT not found")]
    XsdtMissing,
    #[error("{signature} at {address:#x} has invalid length {length}")]
    TableLength {
        signature: Signature,
        address: u64,
        length: u32,
    },
    #[error("{signature} at {address:#x} checksum not valid: {sum:#04x}")]
    TableChecksum {
        signature: Signature,
        address: u64,
        sum: u8,
    },
    #[error("table buffer of {len} bytes is shorter than its header")]
    BufferTooShort { len: usize },
    #[error("unable to map {len} bytes at {address:#x}")]
    Unmapped { address: u64, len: usize },
    #[error("out of resources allocating {size} bytes for the MADT")]
    OutOfResources { size: usize },
    #[error("invalid RSDP scan window {start:#x}..{end:#x}")]
    InvalidScanWindow { start: u64, end: u64 },
    #[error("failed to install ACPI table {signature}")]
    Install {
        signature: Signature,
        #[source]
        source: InstallError,
    },
}

impl AcpiPlatformError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RsdpNotFound { .. } => ErrorKind::NotFound,
            Self::UnsupportedRevision { .. } | Self::XsdtMissing => ErrorKind::Unsupported,
            Self::RsdpChecksum { .. }
            | Self::RsdpExtendedChecksum { .. }
            | Self::RsdpLength { .. }
            | Self::TableLength { .. }
            | Self::TableChecksum { .. }
            | Self::BufferTooShort { .. }
            | Self::Unmapped { .. } => ErrorKind::ProtocolError,
            Self::OutOfResources { .. } => ErrorKind::OutOfResources,
            Self::InvalidScanWindow { .. } => ErrorKind::InvalidParameter,
            Self::Install { .. } => ErrorKind::InstallFailed,
        }
    }

    /// The registry's own status if this error came from a failed installation.
    #[must_use]
    pub const fn install_error(&self) -> Option<InstallError> {
        match self {
            Self::Install { source, .. } => Some(*source),
            _ => None,
        }
    }
}

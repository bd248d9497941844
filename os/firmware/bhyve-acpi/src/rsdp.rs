//! # RSDP (Root System Description Pointer)
//!
//! bhyve places the RSDP at a fixed, documented offset below 1 MiB. The
//! locator walks the [`ScanWindow`] in 16-byte steps looking for the
//! `"RSD PTR "` signature. A signature hit is trusted to be unique: once one is
//! found the scan ends, successfully or not. A second same-signature region is
//! never accepted as a fallback for a corrupt first one.
//!
//! ## Layout
//!
//! ```text
//! offset  size  field
//!      0     8  signature "RSD PTR "
//!      8     1  checksum (bytes 0..20 sum to zero)
//!      9     6  OEM ID
//!     15     1  revision (2+ for ACPI 2.0)
//!     16     4  RSDT address
//! ---------------- ACPI 2.0+ ----------------
//!     20     4  length (whole structure)
//!     24     8  XSDT address
//!     32     1  extended checksum (bytes 0..length sum to zero)
//!     33     3  reserved
//! ```

use log::{debug, info};

use crate::checksum;
use crate::config::{RSDP_SCAN_STEP, ScanWindow};
use crate::error::AcpiPlatformError;
use crate::phys::{PhysMapRo, map_bytes, read_array, read_u32, read_u64};

/// Validated ACPI 2.0+ Root System Description Pointer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Rsdp {
    /// Physical address the RSDP was found at.
    pub address: u64,
    pub oem_id: [u8; 6],
    pub revision: u8,
    pub rsdt_address: u32,
    pub length: u32,
    pub xsdt_address: u64,
}

impl Rsdp {
    /// The 8-byte signature, trailing space included.
    pub const SIGNATURE: &'static [u8; 8] = b"RSD PTR ";

    /// Bytes covered by the ACPI 1.0 checksum.
    pub const V1_SIZE: usize = 20;

    /// Size of the ACPI 2.0 structure.
    pub const V2_SIZE: usize = 36;

    /// First revision that carries the XSDT address.
    pub const MIN_REVISION: u8 = 2;

    /// Validate a candidate whose signature already matched.
    ///
    /// `address` is only used for diagnostics.
    ///
    /// # Errors
    /// * [`AcpiPlatformError::UnsupportedRevision`] for revisions below 2.
    /// * [`AcpiPlatformError::RsdpChecksum`] if the first 20 bytes do not sum to zero.
    /// * [`AcpiPlatformError::RsdpLength`] if `length` is smaller than 36.
    /// * [`AcpiPlatformError::RsdpExtendedChecksum`] if the full structure does not sum to
    ///   zero.
    /// * [`AcpiPlatformError::Unmapped`] if the structure cannot be mapped.
    pub fn validate(
        map: &(impl PhysMapRo + ?Sized),
        address: u64,
    ) -> Result<Self, AcpiPlatformError> {
        let v1 = map_bytes(map, address, Self::V1_SIZE)?;
        let revision = v1[15];
        if revision < Self::MIN_REVISION {
            info!("unsupported RSDP found at {address:#x} (revision {revision})");
            return Err(AcpiPlatformError::UnsupportedRevision { address, revision });
        }

        // For ACPI 1.0/2.0/3.0 the checksum of the first 20 bytes must be 0.
        let sum = checksum::sum(v1);
        if sum != 0 {
            info!("RSDP header checksum not valid: {sum:#04x}");
            return Err(AcpiPlatformError::RsdpChecksum { address, sum });
        }

        let v2 = map_bytes(map, address, Self::V2_SIZE)?;
        let length = read_u32(v2, 20).unwrap_or_default();
        let full_len = usize::try_from(length).unwrap_or(usize::MAX);
        if full_len < Self::V2_SIZE {
            info!("RSDP at {address:#x} reports invalid length {length}");
            return Err(AcpiPlatformError::RsdpLength { address, length });
        }

        // For ACPI 2.0+ the checksum of the entire structure must be 0 as well.
        let full = map_bytes(map, address, full_len)?;
        let sum = checksum::sum(full);
        if sum != 0 {
            info!("RSDP table checksum not valid: {sum:#04x}");
            return Err(AcpiPlatformError::RsdpExtendedChecksum { address, sum });
        }

        Ok(Self {
            address,
            oem_id: read_array(v2, 9).unwrap_or_default(),
            revision,
            rsdt_address: read_u32(v2, 16).unwrap_or_default(),
            length,
            xsdt_address: read_u64(v2, 24).unwrap_or_default(),
        })
    }
}

/// Scan `window` for bhyve's RSDP.
///
/// # Errors
/// * [`AcpiPlatformError::InvalidScanWindow`] if the window is empty or misaligned.
/// * [`AcpiPlatformError::RsdpNotFound`] if no signature is found in the window.
/// * Any error of [`Rsdp::validate`] for the first signature match.
pub fn find_rsdp(
    map: &(impl PhysMapRo + ?Sized),
    window: ScanWindow,
) -> Result<Rsdp, AcpiPlatformError> {
    if !window.is_valid() {
        return Err(AcpiPlatformError::InvalidScanWindow {
            start: window.start,
            end: window.end,
        });
    }

    let window_len =
        usize::try_from(window.len()).map_err(|_| AcpiPlatformError::InvalidScanWindow {
            start: window.start,
            end: window.end,
        })?;
    let region = map_bytes(map, window.start, window_len)?;

    let step = usize::try_from(RSDP_SCAN_STEP).unwrap_or(16);
    let signature_len = Rsdp::SIGNATURE.len();
    for offset in (0..window_len).step_by(step) {
        // The signature of the last slot may run past the window; such a slot
        // cannot hold an RSDP the hypervisor placed inside it.
        let Some(candidate) = region.get(offset..offset + signature_len) else {
            break;
        };
        if candidate != Rsdp::SIGNATURE {
            continue;
        }

        let address = window.start + offset as u64;
        debug!("RSDP signature found at {address:#x}");
        return Rsdp::validate(map, address);
    }

    debug!("RSDP not found in {:#x}..{:#x}", window.start, window.end);
    Err(AcpiPlatformError::RsdpNotFound {
        start: window.start,
        end: window.end,
    })
}

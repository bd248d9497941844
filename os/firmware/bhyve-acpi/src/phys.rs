//! # Guest Physical Memory Access
//!
//! ACPI structures live in memory the hypervisor owns. Rather than casting
//! addresses to typed pointers, the parsers request a byte slice of known
//! length through [`PhysMapRo`] and decode fields from it with the helpers
//! below. A mapping that cannot be provided is reported, not assumed.

use crate::error::AcpiPlatformError;

/// Map a physical region and return a *read-only* byte slice for its contents.
///
/// Implementations decide how physical memory is reached (identity map in
/// firmware, a sparse buffer in tests). Returning `None` means the region is
/// not accessible; the parsers turn that into [`AcpiPlatformError::Unmapped`].
pub trait PhysMapRo {
    fn map_ro(&self, paddr: u64, len: usize) -> Option<&[u8]>;
}

impl<T: PhysMapRo + ?Sized> PhysMapRo for &T {
    fn map_ro(&self, paddr: u64, len: usize) -> Option<&[u8]> {
        (**self).map_ro(paddr, len)
    }
}

/// Map `len` bytes at `paddr` or report the region as unmapped.
pub(crate) fn map_bytes(
    map: &(impl PhysMapRo + ?Sized),
    paddr: u64,
    len: usize,
) -> Result<&[u8], AcpiPlatformError> {
    match map.map_ro(paddr, len) {
        Some(bytes) if bytes.len() >= len => Ok(&bytes[..len]),
        _ => Err(AcpiPlatformError::Unmapped {
            address: paddr,
            len,
        }),
    }
}

#[inline]
pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

#[inline]
pub(crate) fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    let raw = bytes.get(offset..offset.checked_add(8)?)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Some(u64::from_le_bytes(buf))
}

#[inline]
pub(crate) fn read_array<const N: usize>(bytes: &[u8], offset: usize) -> Option<[u8; N]> {
    let raw = bytes.get(offset..offset.checked_add(N)?)?;
    let mut buf = [0u8; N];
    buf.copy_from_slice(raw);
    Some(buf)
}

//! # 8-bit ACPI checksums

/// Sum all bytes modulo 256. A valid ACPI structure sums to zero.
#[must_use]
pub fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |a, &b| a.wrapping_add(b))
}

/// Compute the checksum byte that makes `bytes` sum to zero, assuming the
/// checksum field inside `bytes` currently holds zero.
#[must_use]
pub fn compute(bytes: &[u8]) -> u8 {
    0u8.wrapping_sub(sum(bytes))
}

/// Recompute the checksum stored at `offset` in place.
///
/// Does nothing if `offset` lies outside `bytes`.
pub fn update(bytes: &mut [u8], offset: usize) {
    if offset >= bytes.len() {
        return;
    }

    bytes[offset] = 0;
    bytes[offset] = compute(bytes);
}

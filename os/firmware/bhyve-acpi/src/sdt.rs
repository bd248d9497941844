//! # System Description Table Header
//!
//! Every ACPI table except the RSDP and FACS starts with the same 36-byte
//! header. The header's `length` covers the entire table and is the only
//! thing that tells us how many bytes to map; it is validated before anything
//! behind the header is read.

use core::fmt;

use crate::checksum;
use crate::error::AcpiPlatformError;
use crate::phys::{PhysMapRo, map_bytes, read_array, read_u32};

/// Four-character table signature, e.g. `APIC` or `FACP`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 4]);

impl Signature {
    /// Multiple APIC Description Table.
    pub const MADT: Self = Self(*b"APIC");
    /// Fixed ACPI Description Table.
    pub const FADT: Self = Self(*b"FACP");
    /// Firmware ACPI Control Structure.
    pub const FACS: Self = Self(*b"FACS");
    /// Differentiated System Description Table.
    pub const DSDT: Self = Self(*b"DSDT");
    /// Extended System Description Table.
    pub const XSDT: Self = Self(*b"XSDT");
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' {
                char::from(b)
            } else {
                '?'
            };
            fmt::Write::write_char(f, c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(\"{self}\")")
    }
}

/// Parsed standard table header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SdtHeader {
    pub signature: Signature,
    pub length: u32,
    pub revision: u8,
    pub checksum: u8,
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub creator_id: u32,
    pub creator_revision: u32,
}

impl SdtHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 36;

    /// Byte offset of the `length` field.
    pub const LENGTH_OFFSET: usize = 4;

    /// Byte offset of the `checksum` field.
    pub const CHECKSUM_OFFSET: usize = 9;

    /// Decode a header from the first [`SdtHeader::SIZE`] bytes of `bytes`.
    ///
    /// Returns `None` if `bytes` is too short. The `length` field is returned
    /// as found; callers check it against [`SdtHeader::SIZE`].
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }

        Some(Self {
            signature: Signature(read_array(bytes, 0)?),
            length: read_u32(bytes, 4)?,
            revision: bytes[8],
            checksum: bytes[9],
            oem_id: read_array(bytes, 10)?,
            oem_table_id: read_array(bytes, 16)?,
            oem_revision: read_u32(bytes, 24)?,
            creator_id: read_u32(bytes, 28)?,
            creator_revision: read_u32(bytes, 32)?,
        })
    }

    /// Encode the header into its 36-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.signature.0);
        out[4..8].copy_from_slice(&self.length.to_le_bytes());
        out[8] = self.revision;
        out[9] = self.checksum;
        out[10..16].copy_from_slice(&self.oem_id);
        out[16..24].copy_from_slice(&self.oem_table_id);
        out[24..28].copy_from_slice(&self.oem_revision.to_le_bytes());
        out[28..32].copy_from_slice(&self.creator_id.to_le_bytes());
        out[32..36].copy_from_slice(&self.creator_revision.to_le_bytes());
        out
    }

    /// The table length as a `usize`.
    #[must_use]
    pub fn table_len(&self) -> usize {
        usize::try_from(self.length).unwrap_or(usize::MAX)
    }

    /// `true` if the reported length cannot even hold the header.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.table_len() < Self::SIZE
    }
}

/// A mapped table: its parsed header plus exactly `header.length` bytes.
#[derive(Debug, Copy, Clone)]
pub struct Table<'a> {
    pub address: u64,
    pub header: SdtHeader,
    pub bytes: &'a [u8],
}

impl Table<'_> {
    #[must_use]
    pub const fn signature(&self) -> Signature {
        self.header.signature
    }

    /// Checksum over the whole table; zero when valid.
    #[must_use]
    pub fn checksum_sum(&self) -> u8 {
        checksum::sum(self.bytes)
    }

    /// Fail with [`AcpiPlatformError::TableChecksum`] unless the table sums to zero.
    ///
    /// # Errors
    /// Returns [`AcpiPlatformError::TableChecksum`] carrying the computed sum.
    pub fn verify_checksum(&self) -> Result<(), AcpiPlatformError> {
        match self.checksum_sum() {
            0 => Ok(()),
            sum => Err(AcpiPlatformError::TableChecksum {
                signature: self.signature(),
                address: self.address,
                sum,
            }),
        }
    }
}

/// Map the table at `address`: the header first, then its full length.
///
/// # Errors
/// * [`AcpiPlatformError::Unmapped`] if either mapping fails.
/// * [`AcpiPlatformError::TableLength`] if `length` is smaller than the header.
pub fn map_table(
    map: &(impl PhysMapRo + ?Sized),
    address: u64,
) -> Result<Table<'_>, AcpiPlatformError> {
    let head = map_bytes(map, address, SdtHeader::SIZE)?;
    let header = SdtHeader::parse(head).ok_or(AcpiPlatformError::Unmapped {
        address,
        len: SdtHeader::SIZE,
    })?;

    if header.is_truncated() {
        return Err(AcpiPlatformError::TableLength {
            signature: header.signature,
            address,
            length: header.length,
        });
    }

    let bytes = map_bytes(map, address, header.table_len())?;
    Ok(Table {
        address,
        header,
        bytes,
    })
}

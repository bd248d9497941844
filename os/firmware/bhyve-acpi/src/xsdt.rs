//! # XSDT (Extended System Description Table)
//!
//! A standard header followed by a packed array of 64-bit physical table
//! addresses. bhyve always provides one; the 32-bit RSDT is ignored.

use crate::error::AcpiPlatformError;
use crate::phys::{PhysMapRo, read_u64};
use crate::sdt::{SdtHeader, Table, map_table};

const ENTRY_SIZE: usize = size_of::<u64>();

#[derive(Debug, Copy, Clone)]
pub struct Xsdt<'a> {
    table: Table<'a>,
}

impl<'a> Xsdt<'a> {
    /// Map the XSDT at `address`.
    ///
    /// # Errors
    /// * [`AcpiPlatformError::XsdtMissing`] for a zero address.
    /// * [`AcpiPlatformError::TableLength`] if the header reports fewer bytes than itself.
    /// * [`AcpiPlatformError::TableChecksum`] if `verify_checksum` is set and the table is corrupt.
    /// * [`AcpiPlatformError::Unmapped`] if the table cannot be mapped.
    pub fn map(
        map: &'a (impl PhysMapRo + ?Sized),
        address: u64,
        verify_checksum: bool,
    ) -> Result<Self, AcpiPlatformError> {
        if address == 0 {
            return Err(AcpiPlatformError::XsdtMissing);
        }

        let table = map_table(map, address)?;
        if verify_checksum {
            table.verify_checksum()?;
        }

        Ok(Self { table })
    }

    #[must_use]
    pub const fn header(&self) -> &SdtHeader {
        &self.table.header
    }

    /// Number of table pointers; trailing bytes that do not form a whole entry are ignored.
    #[must_use]
    pub const fn entry_count(&self) -> usize {
        (self.table.bytes.len() - SdtHeader::SIZE) / ENTRY_SIZE
    }

    /// Physical addresses of the referenced tables, in table order.
    pub fn entries(&self) -> impl Iterator<Item = u64> + use<'a> {
        let bytes = self.table.bytes;
        (0..self.entry_count())
            .filter_map(move |index| read_u64(bytes, SdtHeader::SIZE + index * ENTRY_SIZE))
    }
}

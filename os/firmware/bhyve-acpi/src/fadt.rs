//! # FADT (Fixed ACPI Description Table) pointers
//!
//! Only the FACS and DSDT pointers are read from the FADT. Each exists as a
//! legacy 32-bit field and, from ACPI 2.0 on, an extended 64-bit field. A
//! non-zero extended pointer wins; a FADT too short to carry the extended
//! fields is treated as if they were zero.

use crate::phys::{read_u32, read_u64};
use crate::sdt::Table;

const FIRMWARE_CTRL_OFFSET: usize = 36;
const DSDT_OFFSET: usize = 40;
const X_FIRMWARE_CTRL_OFFSET: usize = 132;
const X_DSDT_OFFSET: usize = 140;

/// FACS and DSDT locations extracted from one FADT.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FadtPointers {
    pub firmware_ctrl: u32,
    pub dsdt: u32,
    pub x_firmware_ctrl: u64,
    pub x_dsdt: u64,
}

impl FadtPointers {
    /// Read the pointer fields from a mapped FADT.
    ///
    /// Fields beyond the table's `length` read as zero.
    #[must_use]
    pub fn parse(fadt: &Table<'_>) -> Self {
        let bytes = fadt.bytes;
        Self {
            firmware_ctrl: read_u32(bytes, FIRMWARE_CTRL_OFFSET).unwrap_or_default(),
            dsdt: read_u32(bytes, DSDT_OFFSET).unwrap_or_default(),
            x_firmware_ctrl: read_u64(bytes, X_FIRMWARE_CTRL_OFFSET).unwrap_or_default(),
            x_dsdt: read_u64(bytes, X_DSDT_OFFSET).unwrap_or_default(),
        }
    }

    /// Physical address of the FACS, if any.
    #[must_use]
    pub fn facs(&self) -> Option<u64> {
        prefer_extended(self.x_firmware_ctrl, self.firmware_ctrl)
    }

    /// Physical address of the DSDT, if any.
    #[must_use]
    pub fn dsdt(&self) -> Option<u64> {
        prefer_extended(self.x_dsdt, self.dsdt)
    }
}

fn prefer_extended(extended: u64, legacy: u32) -> Option<u64> {
    let address = if extended != 0 {
        extended
    } else {
        u64::from(legacy)
    };
    (address != 0).then_some(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdt::{SdtHeader, Signature};

    fn fadt_bytes(len: usize, legacy: (u32, u32), extended: (u64, u64)) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        bytes[0..4].copy_from_slice(b"FACP");
        bytes[4..8].copy_from_slice(&u32::try_from(len).unwrap().to_le_bytes());
        bytes[36..40].copy_from_slice(&legacy.0.to_le_bytes());
        bytes[40..44].copy_from_slice(&legacy.1.to_le_bytes());
        if len >= 148 {
            bytes[132..140].copy_from_slice(&extended.0.to_le_bytes());
            bytes[140..148].copy_from_slice(&extended.1.to_le_bytes());
        }
        bytes
    }

    fn table(bytes: &[u8]) -> Table<'_> {
        let header = SdtHeader::parse(bytes).unwrap();
        assert_eq!(header.signature, Signature::FADT);
        Table {
            address: 0x7000,
            header,
            bytes,
        }
    }

    #[test]
    fn legacy_pointers_when_extended_are_zero() {
        let raw = fadt_bytes(244, (0x1000, 0x2000), (0, 0));
        let p = FadtPointers::parse(&table(&raw));
        assert_eq!(p.facs(), Some(0x1000));
        assert_eq!(p.dsdt(), Some(0x2000));
    }

    #[test]
    fn extended_pointers_win() {
        let raw = fadt_bytes(244, (0x1000, 0x2000), (0x1_0000_1000, 0x1_0000_2000));
        let p = FadtPointers::parse(&table(&raw));
        assert_eq!(p.facs(), Some(0x1_0000_1000));
        assert_eq!(p.dsdt(), Some(0x1_0000_2000));
    }

    #[test]
    fn acpi_1_fadt_has_no_extended_fields() {
        let raw = fadt_bytes(116, (0x3000, 0x4000), (0, 0));
        let p = FadtPointers::parse(&table(&raw));
        assert_eq!(p.x_dsdt, 0);
        assert_eq!(p.dsdt(), Some(0x4000));
    }

    #[test]
    fn all_zero_means_absent() {
        let raw = fadt_bytes(244, (0, 0), (0, 0));
        let p = FadtPointers::parse(&table(&raw));
        assert_eq!(p.facs(), None);
        assert_eq!(p.dsdt(), None);
    }
}

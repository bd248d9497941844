//! # Table Installation Dispatch
//!
//! Every table bhyve hands over reaches the firmware registry through
//! [`TableDispatcher::install`]. Only the MADT is special-cased: it is rebuilt
//! for the runtime vCPU count before installation. All other tables are
//! relayed byte for byte.

use log::debug;

use crate::config::MadtConfig;
use crate::cpu_count::CpuCount;
use crate::error::AcpiPlatformError;
use crate::madt;
use crate::sdt::{SdtHeader, Signature};

/// Handle the registry assigned to an installed table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TableKey(pub usize);

/// The registry rejected a table; carries its raw status code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ACPI table registry returned status {0:#x}")]
pub struct InstallError(pub usize);

/// The firmware's ACPI table registration operation.
pub trait AcpiTableInstaller {
    /// Register a copy of `table`; the registry does not keep the borrowed buffer.
    ///
    /// # Errors
    /// Returns the registry's status if the table was rejected.
    fn install_acpi_table(&mut self, table: &[u8]) -> Result<TableKey, InstallError>;
}

impl<T: AcpiTableInstaller + ?Sized> AcpiTableInstaller for &mut T {
    fn install_acpi_table(&mut self, table: &[u8]) -> Result<TableKey, InstallError> {
        (**self).install_acpi_table(table)
    }
}

/// Routes tables by signature to the MADT synthesizer or straight to the registry.
pub struct TableDispatcher<I, C> {
    installer: I,
    cpu_count: C,
    madt: MadtConfig,
}

impl<I, C> TableDispatcher<I, C>
where
    I: AcpiTableInstaller,
    C: CpuCount,
{
    #[must_use]
    pub const fn new(installer: I, cpu_count: C, madt: MadtConfig) -> Self {
        Self {
            installer,
            cpu_count,
            madt,
        }
    }

    /// Install one table, synthesizing a replacement if it is a MADT.
    ///
    /// # Errors
    /// * [`AcpiPlatformError::BufferTooShort`] if `table` cannot hold a header.
    /// * [`AcpiPlatformError::OutOfResources`] if the MADT buffer cannot be allocated.
    /// * [`AcpiPlatformError::Install`] if the registry rejects the table.
    pub fn install(&mut self, table: &[u8]) -> Result<TableKey, AcpiPlatformError> {
        let signature = table
            .get(..4)
            .and_then(|s| <[u8; 4]>::try_from(s).ok())
            .map(Signature)
            .ok_or(AcpiPlatformError::BufferTooShort { len: table.len() })?;

        if signature == Signature::MADT {
            if table.len() < SdtHeader::SIZE {
                return Err(AcpiPlatformError::BufferTooShort { len: table.len() });
            }
            let cpu_count = self.cpu_count.cpu_count();
            return madt::install_madt(&mut self.installer, table, cpu_count, &self.madt);
        }

        debug!("installing {signature} verbatim ({} bytes)", table.len());
        self.installer
            .install_acpi_table(table)
            .map_err(|source| AcpiPlatformError::Install { signature, source })
    }

    #[must_use]
    pub const fn installer(&self) -> &I {
        &self.installer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::num::NonZeroU8;

    #[derive(Default)]
    struct Recorder {
        tables: Vec<Vec<u8>>,
        reject: Option<usize>,
    }

    impl AcpiTableInstaller for Recorder {
        fn install_acpi_table(&mut self, table: &[u8]) -> Result<TableKey, InstallError> {
            if let Some(status) = self.reject {
                return Err(InstallError(status));
            }
            self.tables.push(table.to_vec());
            Ok(TableKey(self.tables.len()))
        }
    }

    struct Fixed(u8);

    impl CpuCount for Fixed {
        fn cpu_count(&mut self) -> NonZeroU8 {
            NonZeroU8::new(self.0).unwrap()
        }
    }

    fn table(signature: &[u8; 4], len: usize) -> Vec<u8> {
        let mut t = vec![0x5Au8; len];
        t[0..4].copy_from_slice(signature);
        t[4..8].copy_from_slice(&u32::try_from(len).unwrap().to_le_bytes());
        t
    }

    #[test]
    fn madt_is_synthesized() {
        let mut d = TableDispatcher::new(Recorder::default(), Fixed(3), MadtConfig::new());
        let source = table(b"APIC", 0x5A);
        assert_eq!(d.install(&source), Ok(TableKey(1)));

        let installed = &d.installer().tables[0];
        assert_eq!(installed.len(), madt::madt_size(NonZeroU8::new(3).unwrap()));
        assert_ne!(installed.len(), source.len());
    }

    #[test]
    fn other_tables_pass_through() {
        let mut d = TableDispatcher::new(Recorder::default(), Fixed(3), MadtConfig::new());
        let hpet = table(b"HPET", 56);
        d.install(&hpet).unwrap();
        assert_eq!(d.installer().tables, vec![hpet]);
    }

    #[test]
    fn registry_errors_carry_signature() {
        let recorder = Recorder {
            reject: Some(0x8000_0000_0000_0009),
            ..Recorder::default()
        };
        let mut d = TableDispatcher::new(recorder, Fixed(1), MadtConfig::new());
        assert_eq!(
            d.install(&table(b"APIC", 44)),
            Err(AcpiPlatformError::Install {
                signature: Signature::MADT,
                source: InstallError(0x8000_0000_0000_0009),
            })
        );
    }

    #[test]
    fn truncated_buffers_are_rejected() {
        let mut d = TableDispatcher::new(Recorder::default(), Fixed(1), MadtConfig::new());
        assert_eq!(
            d.install(b"AP"),
            Err(AcpiPlatformError::BufferTooShort { len: 2 })
        );
        assert_eq!(
            d.install(&table(b"APIC", 12)),
            Err(AcpiPlatformError::BufferTooShort { len: 12 })
        );
        assert!(d.installer().tables.is_empty());
    }
}

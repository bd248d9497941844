//! # `EFI_ACPI_TABLE_PROTOCOL`
//!
//! The platform's ACPI table registry. Installing a table copies it into
//! ACPI reclaim memory and links it into the RSDT/XSDT the firmware itself
//! publishes, so callers may release their buffer as soon as the call returns.

use bhyve_acpi::{AcpiTableInstaller, InstallError, TableKey};
use core::ffi::c_void;
use uefi::boot::{self, OpenProtocolAttributes, OpenProtocolParams, ScopedProtocol};
use uefi::proto::unsafe_protocol;
use uefi::Status;

#[repr(C)]
#[unsafe_protocol("ffe06bdd-6107-46a6-7bb2-5a9c7ec5275c")]
pub struct AcpiTableProtocol {
    install_acpi_table: unsafe extern "efiapi" fn(
        this: *const Self,
        acpi_table_buffer: *const c_void,
        acpi_table_buffer_size: usize,
        table_key: *mut usize,
    ) -> Status,
    _uninstall_acpi_table: unsafe extern "efiapi" fn(this: *const Self, table_key: usize) -> Status,
}

/// [`AcpiTableInstaller`] backed by the firmware's table protocol.
pub struct FirmwareAcpiTables {
    protocol: ScopedProtocol<AcpiTableProtocol>,
}

impl FirmwareAcpiTables {
    /// Open the table protocol without taking ownership of it; other drivers keep using it.
    ///
    /// # Errors
    /// `NOT_FOUND` if the protocol has not been installed yet.
    pub fn locate() -> uefi::Result<Self> {
        let handle = boot::get_handle_for_protocol::<AcpiTableProtocol>()?;

        // SAFETY: the protocol is a platform singleton that outlives this driver's entry point.
        let protocol = unsafe {
            boot::open_protocol::<AcpiTableProtocol>(
                OpenProtocolParams {
                    handle,
                    agent: boot::image_handle(),
                    controller: None,
                },
                OpenProtocolAttributes::GetProtocol,
            )
        }?;

        Ok(Self { protocol })
    }
}

impl AcpiTableInstaller for FirmwareAcpiTables {
    fn install_acpi_table(&mut self, table: &[u8]) -> Result<TableKey, InstallError> {
        let protocol: &AcpiTableProtocol = &self.protocol;
        let mut key = 0usize;

        // SAFETY: `table` is valid for `table.len()` bytes for the duration of
        // the call, and the protocol copies it before returning.
        let status = unsafe {
            (protocol.install_acpi_table)(
                protocol,
                table.as_ptr().cast::<c_void>(),
                table.len(),
                &raw mut key,
            )
        };

        if status.is_success() {
            Ok(TableKey(key))
        } else {
            Err(InstallError(status.0))
        }
    }
}

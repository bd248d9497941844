//! # bhyve ACPI Platform Driver
//!
//! UEFI boot service driver that publishes bhyve's ACPI tables to the guest.
//! It runs once, early in the DXE phase, after `EFI_ACPI_TABLE_PROTOCOL` is
//! available, and does the following:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            bhyve-acpi-dxe                   │
//! ├─────────────────────────────────────────────┤
//! │  1. Environment Setup                       │
//! │     • Initialize UEFI helpers and logging   │
//! │     • Locate EFI_ACPI_TABLE_PROTOCOL        │
//! │  2. vCPU Discovery                          │
//! │     • fw_cfg "opt/bhyve/hw.ncpu"            │
//! │     • else fwctl "hw.ncpu", else 1          │
//! │  3. Table Installation                      │
//! │     • Scan 0xF2400..0x100000 for the RSDP   │
//! │     • Relay XSDT tables, rebuild the MADT   │
//! │     • Install the FACS and DSDT             │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Errors are logged and reported as the image's exit status. A table set
//! without a DSDT stops the machine, since no guest OS could boot from it.
//!
//! ## Features
//!
//! * `fw-cfg` (default): probe the QEMU-style fw_cfg device for the vCPU count.
//! * `fw-ctl` (default): fall back to bhyve's fwctl interface.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![no_main]
#![allow(unsafe_code)]
extern crate alloc;

mod acpi_table;
mod logger;
mod memory;
mod ports;

use crate::acpi_table::FirmwareAcpiTables;
use crate::logger::DxeLogger;
use crate::memory::IdentityMap;
use bhyve_acpi::{
    AcpiPlatformError, CpuCountResolver, ErrorKind, FatalHalt, PlatformConfig, TableDispatcher,
    install_bhyve_tables,
};
use log::{LevelFilter, error, info, warn};
use uefi::prelude::*;

#[cfg(debug_assertions)]
const LOG_LEVEL: LevelFilter = LevelFilter::Debug;
#[cfg(not(debug_assertions))]
const LOG_LEVEL: LevelFilter = LevelFilter::Info;

static LOGGER: DxeLogger = DxeLogger::new(LOG_LEVEL);

const CONFIG: PlatformConfig = PlatformConfig::new();

/// Parks the boot processor for good.
struct DeadLoop;

impl FatalHalt for DeadLoop {
    fn halt(&self) -> ! {
        loop {
            // SAFETY: boot services run at CPL0; nothing resumes this CPU.
            unsafe {
                core::arch::asm!("cli", "hlt", options(nomem, nostack));
            }
        }
    }
}

#[entry]
fn efi_main() -> Status {
    // Initialize logging and allocator helpers
    if uefi::helpers::init().is_err() {
        return Status::UNSUPPORTED;
    }

    if LOGGER.init().is_err() {
        uefi::println!("bhyve-acpi-dxe: a logger is already installed");
    }

    let installer = match FirmwareAcpiTables::locate() {
        Ok(installer) => installer,
        Err(e) => {
            error!("EFI_ACPI_TABLE_PROTOCOL not available: {:?}", e.status());
            return e.status();
        }
    };

    let cpu_count = CpuCountResolver::new(fw_cfg(), fw_ctl(), CONFIG.cpu_count);
    let mut dispatcher = TableDispatcher::new(installer, cpu_count, CONFIG.madt);

    match install_bhyve_tables(&IdentityMap, &mut dispatcher, &DeadLoop, &CONFIG) {
        Ok(installed) => {
            info!(
                "bhyve ACPI tables installed: {} from the XSDT, DSDT key {:#x}",
                installed.xsdt_entries, installed.dsdt.0
            );
            Status::SUCCESS
        }
        Err(e) => {
            if e.kind() == ErrorKind::NotFound {
                warn!("no bhyve ACPI tables: {e}");
            } else {
                error!("installing bhyve ACPI tables failed: {e}");
            }
            status_for(&e)
        }
    }
}

#[cfg(feature = "fw-cfg")]
const fn fw_cfg() -> bhyve_acpi::QemuFwCfg<ports::X86Ports> {
    bhyve_acpi::QemuFwCfg::new(ports::X86Ports)
}

#[cfg(not(feature = "fw-cfg"))]
const fn fw_cfg() -> bhyve_acpi::NoFwCfg {
    bhyve_acpi::NoFwCfg
}

#[cfg(feature = "fw-ctl")]
const fn fw_ctl() -> bhyve_acpi::BhyveFwCtl<ports::X86Ports> {
    bhyve_acpi::BhyveFwCtl::new(ports::X86Ports)
}

#[cfg(not(feature = "fw-ctl"))]
const fn fw_ctl() -> bhyve_acpi::NoFwCtl {
    bhyve_acpi::NoFwCtl
}

/// Firmware status reported for a failed installation.
///
/// Registry failures keep the protocol's own status.
fn status_for(error: &AcpiPlatformError) -> Status {
    if let Some(source) = error.install_error() {
        return Status(source.0);
    }

    match error.kind() {
        ErrorKind::NotFound => Status::NOT_FOUND,
        ErrorKind::Unsupported => Status::UNSUPPORTED,
        ErrorKind::ProtocolError => Status::PROTOCOL_ERROR,
        ErrorKind::BadBufferSize => Status::BAD_BUFFER_SIZE,
        ErrorKind::OutOfResources => Status::OUT_OF_RESOURCES,
        ErrorKind::InvalidParameter => Status::INVALID_PARAMETER,
        ErrorKind::InstallFailed => Status::DEVICE_ERROR,
    }
}

//! # bhyve ACPI Platform Tables
//!
//! This crate implements the firmware side of bhyve's ACPI hand-off: it finds
//! the ACPI tables the hypervisor placed in guest memory, validates them, and
//! relays them to the firmware's ACPI table registry so the guest operating
//! system can discover CPUs, interrupt controllers and power management.
//!
//! ## Overview
//!
//! bhyve publishes a complete ACPI table set below 1 MiB. The firmware does not
//! trust it blindly: every structure is read from a bounds-checked byte slice,
//! checksums are verified before pointers are followed, and the statically
//! published MADT is replaced by one that matches the number of vCPUs the
//! guest actually has.
//!
//! ```text
//! bhyve guest memory                     Firmware ACPI registry
//!
//! 0x000F_2400 ┌──────────┐
//!   (scan)    │   RSDP   │──┐
//! 0x0010_0000 └──────────┘  │
//!             ┌──────────┐  │            ┌──────────────────────┐
//!             │   XSDT   │<─┘            │ FACP, HPET, MCFG ... │ (verbatim)
//!             └──────────┘── each entry ─│ APIC (synthesized)   │
//!                 │                      │ FACS                 │
//!               FACP ── X_DSDT/DSDT ────>│ DSDT                 │
//!                    └─ X_FIRMWARE_CTRL  └──────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! * [`rsdp`]: scans the fixed window for a revision 2+ RSDP with valid legacy
//!   and extended checksums.
//! * [`xsdt`] / [`fadt`]: typed, bounds-checked views over the XSDT pointer array
//!   and the FADT's FACS/DSDT pointers.
//! * [`madt`]: builds a fresh MADT (Local APICs, one I/O APIC, one interrupt
//!   source override) through a running-offset writer.
//! * [`dispatch`]: routes `APIC` tables to the synthesizer and everything else
//!   verbatim to the [`AcpiTableInstaller`].
//! * [`cpu_count`]: resolves the vCPU count over fw_cfg or fwctl, falling back
//!   to a single CPU.
//! * [`platform`]: the boot-time sequence, RSDP → XSDT walk → FACS → DSDT.
//!
//! ## Collaborators
//!
//! The crate contains no `unsafe` code. Everything that touches hardware or
//! firmware services sits behind a trait the caller implements:
//!
//! * [`PhysMapRo`] for reading guest physical memory,
//! * [`AcpiTableInstaller`] for the firmware's table registration,
//! * [`PortIo`] for the x86 ports used by [`fw_cfg`] and [`fw_ctl`],
//! * [`FatalHalt`] for the one unrecoverable condition (no DSDT).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bhyve_acpi::{PlatformConfig, TableDispatcher, install_bhyve_tables};
//!
//! let config = PlatformConfig::new();
//! let mut dispatcher = TableDispatcher::new(installer, cpu_count, config.madt);
//! install_bhyve_tables(&memory, &mut dispatcher, &DeadLoop, &config)?;
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod checksum;
pub mod config;
pub mod cpu_count;
pub mod dispatch;
mod error;
pub mod fadt;
pub mod fw_cfg;
pub mod fw_ctl;
pub mod madt;
pub mod phys;
pub mod platform;
pub mod port;
pub mod rsdp;
pub mod sdt;
pub mod xsdt;

pub use config::{CpuCountConfig, MadtConfig, PlatformConfig, ScanWindow};
pub use cpu_count::{CpuCount, CpuCountError, CpuCountResolver, FixedCpuCount};
pub use dispatch::{AcpiTableInstaller, InstallError, TableDispatcher, TableKey};
pub use error::{AcpiPlatformError, ErrorKind};
pub use fw_cfg::{FirmwareConfig, FwCfgFile, NoFwCfg, QemuFwCfg};
pub use fw_ctl::{BhyveFwCtl, FirmwareControl, FwCtlError, NoFwCtl};
pub use phys::PhysMapRo;
pub use platform::{FatalHalt, InstalledTables, install_bhyve_tables};
pub use port::PortIo;
pub use rsdp::{Rsdp, find_rsdp};
pub use sdt::{SdtHeader, Signature};

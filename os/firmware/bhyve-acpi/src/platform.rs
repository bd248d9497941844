//! # Boot-time Table Installation
//!
//! [`install_bhyve_tables`] runs the complete hand-off once per boot:
//!
//! 1. locate and validate the RSDP,
//! 2. map the XSDT and install every table it lists, remembering the FACS and
//!    DSDT pointers of the FADT,
//! 3. install the FACS, if the FADT named one,
//! 4. install the DSDT. There is no recovery without one: the guest OS
//!    cannot run, so the firmware halts.
//!
//! The first failure ends the sequence; tables installed before it stay
//! installed.

use log::{debug, error, info};

use crate::config::PlatformConfig;
use crate::cpu_count::CpuCount;
use crate::dispatch::{AcpiTableInstaller, TableDispatcher, TableKey};
use crate::error::AcpiPlatformError;
use crate::fadt::FadtPointers;
use crate::phys::{PhysMapRo, map_bytes, read_u32};
use crate::rsdp::find_rsdp;
use crate::sdt::{Signature, map_table};
use crate::xsdt::Xsdt;

/// Smallest FACS the ACPI specification defines.
pub const FACS_MIN_LENGTH: u32 = 64;

/// Stops the machine. Used only when the DSDT is missing.
pub trait FatalHalt {
    fn halt(&self) -> !;
}

impl<T: FatalHalt + ?Sized> FatalHalt for &T {
    fn halt(&self) -> ! {
        (**self).halt()
    }
}

/// What [`install_bhyve_tables`] registered.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InstalledTables {
    /// Tables installed from the XSDT.
    pub xsdt_entries: usize,
    pub facs: Option<TableKey>,
    pub dsdt: TableKey,
}

/// Install bhyve's ACPI tables through `dispatcher`.
///
/// # Errors
/// Any error locating or validating the RSDP, XSDT, FACS or DSDT, and the
/// first installation failure. A missing DSDT does not return: it calls
/// [`FatalHalt::halt`].
pub fn install_bhyve_tables<M, I, C, H>(
    map: &M,
    dispatcher: &mut TableDispatcher<I, C>,
    halt: &H,
    config: &PlatformConfig,
) -> Result<InstalledTables, AcpiPlatformError>
where
    M: PhysMapRo + ?Sized,
    I: AcpiTableInstaller,
    C: CpuCount,
    H: FatalHalt + ?Sized,
{
    let rsdp = find_rsdp(map, config.scan_window)?;
    info!(
        "RSDP at {:#x}, revision {}, XSDT at {:#x}",
        rsdp.address, rsdp.revision, rsdp.xsdt_address
    );

    let xsdt = Xsdt::map(map, rsdp.xsdt_address, config.verify_table_checksums)?;
    debug!("XSDT lists {} tables", xsdt.entry_count());

    let mut pointers = None;
    let mut xsdt_entries = 0;
    for address in xsdt.entries() {
        let table = map_table(map, address)?;
        if config.verify_table_checksums {
            table.verify_checksum()?;
        }

        dispatcher.install(table.bytes)?;
        xsdt_entries += 1;
        debug!("installed {} from {address:#x}", table.signature());

        if table.signature() == Signature::FADT {
            pointers = Some(FadtPointers::parse(&table));
        }
    }

    let pointers = pointers.unwrap_or_default();

    let facs = match pointers.facs() {
        Some(address) => Some(install_facs(map, dispatcher, address)?),
        None => None,
    };

    let Some(dsdt_address) = pointers.dsdt() else {
        error!("no DSDT found in the bhyve ACPI tables, halting");
        halt.halt();
    };

    let dsdt = map_table(map, dsdt_address)?;
    if config.verify_table_checksums {
        dsdt.verify_checksum()?;
    }
    let dsdt = dispatcher.install(dsdt.bytes)?;
    info!(
        "installed {xsdt_entries} XSDT tables and the DSDT (FACS: {})",
        if facs.is_some() { "yes" } else { "none" }
    );

    Ok(InstalledTables {
        xsdt_entries,
        facs,
        dsdt,
    })
}

/// The FACS has a signature and length but no standard header or checksum.
fn install_facs<M, I, C>(
    map: &M,
    dispatcher: &mut TableDispatcher<I, C>,
    address: u64,
) -> Result<TableKey, AcpiPlatformError>
where
    M: PhysMapRo + ?Sized,
    I: AcpiTableInstaller,
    C: CpuCount,
{
    let head = map_bytes(map, address, 8)?;
    let length = read_u32(head, 4).unwrap_or_default();
    if length < FACS_MIN_LENGTH {
        return Err(AcpiPlatformError::TableLength {
            signature: Signature::FACS,
            address,
            length,
        });
    }

    let len = usize::try_from(length).map_err(|_| AcpiPlatformError::Unmapped {
        address,
        len: usize::MAX,
    })?;
    let facs = map_bytes(map, address, len)?;
    debug!("installing FACS from {address:#x} ({length} bytes)");
    dispatcher.install(facs)
}

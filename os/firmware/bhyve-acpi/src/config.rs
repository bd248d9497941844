//! # Platform Configuration
//!
//! Constants of the bhyve firmware contract, bundled so that tests and other
//! platforms can move them. [`PlatformConfig::new`] yields the bhyve defaults.

/// Physical address where bhyve's ACPI tables begin.
pub const BHYVE_ACPI_PHYSICAL_ADDRESS: u64 = 0x000F_2400;

/// End (exclusive) of the legacy BIOS area that holds the RSDP.
pub const BHYVE_BIOS_PHYSICAL_END: u64 = 0x0010_0000;

/// The RSDP is always 16-byte aligned.
pub const RSDP_SCAN_STEP: u64 = 0x10;

/// Base address of every vCPU's local APIC.
pub const LOCAL_APIC_ADDRESS: u32 = 0xFEE0_0000;

/// Address of bhyve's single I/O APIC.
pub const IO_APIC_ADDRESS: u32 = 0xFEC0_0000;

/// fw_cfg file carrying the vCPU count.
pub const NCPU_FW_CFG_FILE: &str = "opt/bhyve/hw.ncpu";

/// fwctl key carrying the vCPU count.
pub const NCPU_FW_CTL_KEY: &str = "hw.ncpu";

/// Half-open physical range `[start, end)` scanned for the RSDP.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScanWindow {
    pub start: u64,
    pub end: u64,
}

impl ScanWindow {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// A window is usable if it is non-empty and starts on a scan step.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.start < self.end && self.start.is_multiple_of(RSDP_SCAN_STEP)
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ScanWindow {
    fn default() -> Self {
        Self::new(BHYVE_ACPI_PHYSICAL_ADDRESS, BHYVE_BIOS_PHYSICAL_END)
    }
}

/// Fixed values written into the synthesized MADT.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MadtConfig {
    pub local_apic_address: u32,
    pub io_apic_address: u32,
    /// ISA IRQ redirected by the interrupt source override (the 8254 timer).
    pub iso_source_irq: u8,
    /// Global system interrupt the override routes to.
    pub iso_gsi: u32,
}

impl MadtConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            local_apic_address: LOCAL_APIC_ADDRESS,
            io_apic_address: IO_APIC_ADDRESS,
            iso_source_irq: 0,
            iso_gsi: 2,
        }
    }
}

impl Default for MadtConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Names under which the hypervisor publishes the vCPU count.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CpuCountConfig {
    pub fw_cfg_file: &'static str,
    pub fw_ctl_key: &'static str,
}

impl CpuCountConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fw_cfg_file: NCPU_FW_CFG_FILE,
            fw_ctl_key: NCPU_FW_CTL_KEY,
        }
    }
}

impl Default for CpuCountConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub scan_window: ScanWindow,
    pub madt: MadtConfig,
    pub cpu_count: CpuCountConfig,
    /// Reject the XSDT and every relayed table whose checksum does not sum to zero.
    pub verify_table_checksums: bool,
}

impl PlatformConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            scan_window: ScanWindow::new(BHYVE_ACPI_PHYSICAL_ADDRESS, BHYVE_BIOS_PHYSICAL_END),
            madt: MadtConfig::new(),
            cpu_count: CpuCountConfig::new(),
            verify_table_checksums: true,
        }
    }

    #[must_use]
    pub const fn with_scan_window(mut self, scan_window: ScanWindow) -> Self {
        self.scan_window = scan_window;
        self
    }

    #[must_use]
    pub const fn with_madt(mut self, madt: MadtConfig) -> Self {
        self.madt = madt;
        self
    }

    #[must_use]
    pub const fn with_cpu_count(mut self, cpu_count: CpuCountConfig) -> Self {
        self.cpu_count = cpu_count;
        self
    }

    #[must_use]
    pub const fn with_verify_table_checksums(mut self, verify: bool) -> Self {
        self.verify_table_checksums = verify;
        self
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::new()
    }
}

const _: () = {
    assert!(BHYVE_ACPI_PHYSICAL_ADDRESS.is_multiple_of(RSDP_SCAN_STEP));
    assert!(BHYVE_ACPI_PHYSICAL_ADDRESS < BHYVE_BIOS_PHYSICAL_END);
};

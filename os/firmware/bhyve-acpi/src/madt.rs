//! # MADT (Multiple APIC Description Table) synthesis
//!
//! bhyve publishes a static MADT that may not match the number of vCPUs the
//! guest was started with. The firmware therefore never relays it; it keeps
//! only the source header (signature, revision, OEM fields) and builds a new
//! table:
//!
//! ```text
//! offset      size  contents
//!      0        36  header (copied, length overwritten, checksum recomputed)
//!     36         4  local APIC address (0xFEE0_0000)
//!     40         4  flags (PCAT_COMPAT)
//!     44     8 * N  Processor Local APIC, IDs 0..N-1, enabled
//!  44+8N        12  I/O APIC, ID N, 0xFEC0_0000, GSI base 0
//!  56+8N        10  Interrupt Source Override, ISA IRQ0 -> GSI 2
//!  66+8N            end
//! ```
//!
//! The size is computed up front, the buffer is reserved once, and each record
//! is appended through [`TableWriter`]. The final offset must equal the
//! precomputed size.

use core::num::NonZeroU8;

use alloc::vec::Vec;
use bitfield_struct::bitfield;
use log::debug;

use crate::checksum;
use crate::config::MadtConfig;
use crate::dispatch::{AcpiTableInstaller, TableKey};
use crate::error::AcpiPlatformError;
use crate::sdt::{SdtHeader, Signature};

/// Header plus the local APIC address and flags words.
pub const MADT_HEADER_SIZE: usize = SdtHeader::SIZE + 4 + 4;

const TYPE_LOCAL_APIC: u8 = 0;
const TYPE_IO_APIC: u8 = 1;
const TYPE_INTERRUPT_SOURCE_OVERRIDE: u8 = 2;

/// ISA bus identifier used by interrupt source overrides.
const BUS_ISA: u8 = 0;

/// MADT `Flags` field.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct MadtFlags {
    /// The system also has a PC-AT-compatible dual 8259 setup.
    pub pcat_compat: bool,
    #[bits(31)]
    __: u32,
}

/// Processor Local APIC `Flags` field.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct LocalApicFlags {
    pub enabled: bool,
    pub online_capable: bool,
    #[bits(30)]
    __: u32,
}

/// MPS INTI flags of an interrupt source override.
///
/// A value of zero for both fields means "conforms to the bus specification".
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct MpsIntiFlags {
    #[bits(2)]
    pub polarity: u8,
    #[bits(2)]
    pub trigger_mode: u8,
    #[bits(12)]
    __: u16,
}

/// A fixed-size MADT interrupt controller structure.
pub trait MadtRecord {
    /// Structure type code.
    const TYPE: u8;
    /// Encoded size including the two-byte type/length prefix.
    const LENGTH: u8;

    /// Encode the record body following the type/length prefix.
    fn write_body(&self, w: &mut TableWriter);

    /// Encode the whole record.
    fn write_to(&self, w: &mut TableWriter) {
        let start = w.offset();
        w.put_u8(Self::TYPE);
        w.put_u8(Self::LENGTH);
        self.write_body(w);
        debug_assert_eq!(w.offset() - start, usize::from(Self::LENGTH));
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LocalApic {
    pub processor_id: u8,
    pub apic_id: u8,
    pub flags: LocalApicFlags,
}

impl MadtRecord for LocalApic {
    const TYPE: u8 = TYPE_LOCAL_APIC;
    const LENGTH: u8 = 8;

    fn write_body(&self, w: &mut TableWriter) {
        w.put_u8(self.processor_id);
        w.put_u8(self.apic_id);
        w.put_u32(self.flags.into_bits());
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IoApic {
    pub io_apic_id: u8,
    pub address: u32,
    pub gsi_base: u32,
}

impl MadtRecord for IoApic {
    const TYPE: u8 = TYPE_IO_APIC;
    const LENGTH: u8 = 12;

    fn write_body(&self, w: &mut TableWriter) {
        w.put_u8(self.io_apic_id);
        w.put_u8(0); // reserved
        w.put_u32(self.address);
        w.put_u32(self.gsi_base);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InterruptSourceOverride {
    pub bus: u8,
    pub source: u8,
    pub gsi: u32,
    pub flags: MpsIntiFlags,
}

impl MadtRecord for InterruptSourceOverride {
    const TYPE: u8 = TYPE_INTERRUPT_SOURCE_OVERRIDE;
    const LENGTH: u8 = 10;

    fn write_body(&self, w: &mut TableWriter) {
        w.put_u8(self.bus);
        w.put_u8(self.source);
        w.put_u32(self.gsi);
        w.put_u16(self.flags.into_bits());
    }
}

/// Append-only little-endian writer over a buffer reserved up front.
#[derive(Debug)]
pub struct TableWriter {
    buf: Vec<u8>,
}

impl TableWriter {
    /// Reserve exactly `size` bytes.
    ///
    /// # Errors
    /// Returns [`AcpiPlatformError::OutOfResources`] if the allocation fails.
    pub fn with_capacity(size: usize) -> Result<Self, AcpiPlatformError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| AcpiPlatformError::OutOfResources { size })?;
        Ok(Self { buf })
    }

    /// Number of bytes written so far.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.buf.len()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Size of the synthesized MADT for `cpu_count` vCPUs.
#[must_use]
pub fn madt_size(cpu_count: NonZeroU8) -> usize {
    MADT_HEADER_SIZE
        + usize::from(cpu_count.get()) * usize::from(LocalApic::LENGTH)
        + usize::from(IoApic::LENGTH)
        + usize::from(InterruptSourceOverride::LENGTH)
}

/// Build a MADT for `cpu_count` vCPUs, reusing the header of `source`.
///
/// # Errors
/// * [`AcpiPlatformError::BufferTooShort`] if `source` cannot hold a header.
/// * [`AcpiPlatformError::OutOfResources`] if the buffer cannot be allocated.
///
/// # Panics
/// Panics if the written records do not add up to [`madt_size`], which would
/// be a bug in the record encoders.
pub fn synthesize_madt(
    source: &[u8],
    cpu_count: NonZeroU8,
    config: &MadtConfig,
) -> Result<Vec<u8>, AcpiPlatformError> {
    let mut header = SdtHeader::parse(source).ok_or(AcpiPlatformError::BufferTooShort {
        len: source.len(),
    })?;

    let size = madt_size(cpu_count);
    header.length = u32::try_from(size).map_err(|_| AcpiPlatformError::OutOfResources { size })?;
    header.checksum = 0;

    let mut w = TableWriter::with_capacity(size)?;
    w.put_bytes(&header.to_bytes());
    w.put_u32(config.local_apic_address);
    w.put_u32(MadtFlags::new().with_pcat_compat(true).into_bits());

    for id in 0..cpu_count.get() {
        LocalApic {
            processor_id: id,
            apic_id: id,
            flags: LocalApicFlags::new().with_enabled(true),
        }
        .write_to(&mut w);
    }

    IoApic {
        io_apic_id: cpu_count.get(),
        address: config.io_apic_address,
        gsi_base: 0,
    }
    .write_to(&mut w);

    // IRQ0 (8254 timer) is wired to GSI 2 on the I/O APIC.
    InterruptSourceOverride {
        bus: BUS_ISA,
        source: config.iso_source_irq,
        gsi: config.iso_gsi,
        flags: MpsIntiFlags::new(),
    }
    .write_to(&mut w);

    assert_eq!(w.offset(), size, "MADT layout does not match its computed size");

    let mut madt = w.into_inner();
    checksum::update(&mut madt, SdtHeader::CHECKSUM_OFFSET);
    Ok(madt)
}

/// Synthesize a MADT for `cpu_count` vCPUs and hand it to `installer`.
///
/// The synthesized buffer is released when this returns, whatever the outcome.
///
/// # Errors
/// Any error of [`synthesize_madt`], or [`AcpiPlatformError::Install`] if the
/// installer rejects the table.
pub fn install_madt(
    installer: &mut (impl AcpiTableInstaller + ?Sized),
    source: &[u8],
    cpu_count: NonZeroU8,
    config: &MadtConfig,
) -> Result<TableKey, AcpiPlatformError> {
    let madt = synthesize_madt(source, cpu_count, config)?;
    debug!(
        "installing synthesized MADT: {} CPUs, {} bytes (source {} bytes)",
        cpu_count,
        madt.len(),
        source.len()
    );

    installer
        .install_acpi_table(&madt)
        .map_err(|source| AcpiPlatformError::Install {
            signature: Signature::MADT,
            source,
        })
}

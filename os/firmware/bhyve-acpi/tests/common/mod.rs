#![allow(dead_code)]

use std::collections::BTreeMap;
use std::num::NonZeroU8;

use bhyve_acpi::checksum;
use bhyve_acpi::{
    AcpiTableInstaller, FatalHalt, FirmwareConfig, FirmwareControl, FixedCpuCount, FwCfgFile,
    FwCtlError, InstallError, MadtConfig, SdtHeader, Signature, TableDispatcher, TableKey,
};

pub const RSDP_ADDRESS: u64 = 0x000F_2400;
pub const XSDT_ADDRESS: u64 = 0x7FE0_0000;
pub const FADT_ADDRESS: u64 = 0x7FE0_1000;
pub const MADT_ADDRESS: u64 = 0x7FE0_2000;
pub const HPET_ADDRESS: u64 = 0x7FE0_3000;
pub const FACS_ADDRESS: u64 = 0x7FE0_4000;
pub const DSDT_ADDRESS: u64 = 0x7FE0_5000;
pub const DSDT_ALT_ADDRESS: u64 = 0x7FE0_6000;

/// Guest physical memory made of disjoint regions.
#[derive(Default)]
pub struct SparseMemory {
    regions: BTreeMap<u64, Vec<u8>>,
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: u64, bytes: Vec<u8>) {
        self.regions.insert(address, bytes);
    }

    pub fn region_mut(&mut self, address: u64) -> &mut Vec<u8> {
        self.regions.get_mut(&address).expect("no region at address")
    }

    /// Zero-filled region covering the RSDP scan window.
    pub fn with_bios_area() -> Self {
        let mut mem = Self::new();
        mem.insert(0x000F_0000, vec![0; 0x1_0000]);
        mem
    }

    /// Write `bytes` into whichever region holds `address`.
    pub fn write(&mut self, address: u64, bytes: &[u8]) {
        let (&base, region) = self
            .regions
            .range_mut(..=address)
            .next_back()
            .expect("address below all regions");
        let offset = usize::try_from(address - base).unwrap();
        region[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl bhyve_acpi::PhysMapRo for SparseMemory {
    fn map_ro(&self, paddr: u64, len: usize) -> Option<&[u8]> {
        let (base, region) = self.regions.range(..=paddr).next_back()?;
        let start = usize::try_from(paddr - base).ok()?;
        region.get(start..start.checked_add(len)?)
    }
}

/// An ACPI 2.0 RSDP pointing at `xsdt`.
pub fn rsdp(revision: u8, xsdt: u64) -> Vec<u8> {
    let mut b = vec![0u8; 36];
    b[0..8].copy_from_slice(b"RSD PTR ");
    b[9..15].copy_from_slice(b"BHYVE ");
    b[15] = revision;
    b[16..20].copy_from_slice(&0x7FE0_8000u32.to_le_bytes());
    b[20..24].copy_from_slice(&36u32.to_le_bytes());
    b[24..32].copy_from_slice(&xsdt.to_le_bytes());
    b[8] = checksum::compute(&b[..20]);
    b[32] = checksum::compute(&b);
    b
}

/// A checksummed table with a standard header and `body`.
pub fn table(signature: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let length = SdtHeader::SIZE + body.len();
    let header = SdtHeader {
        signature: Signature(*signature),
        length: u32::try_from(length).unwrap(),
        revision: 1,
        checksum: 0,
        oem_id: *b"BHYVE ",
        oem_table_id: *b"BVTABLE ",
        oem_revision: 1,
        creator_id: u32::from_le_bytes(*b"BASL"),
        creator_revision: 0x2009_1013,
    };
    let mut bytes = header.to_bytes().to_vec();
    bytes.extend_from_slice(body);
    checksum::update(&mut bytes, SdtHeader::CHECKSUM_OFFSET);
    bytes
}

pub fn xsdt(entries: &[u64]) -> Vec<u8> {
    let body: Vec<u8> = entries.iter().flat_map(|e| e.to_le_bytes()).collect();
    table(b"XSDT", &body)
}

/// A 244-byte FADT with the given FACS/DSDT pointers.
pub fn fadt(firmware_ctrl: u32, dsdt: u32, x_firmware_ctrl: u64, x_dsdt: u64) -> Vec<u8> {
    let mut body = vec![0u8; 244 - SdtHeader::SIZE];
    body[0..4].copy_from_slice(&firmware_ctrl.to_le_bytes());
    body[4..8].copy_from_slice(&dsdt.to_le_bytes());
    body[96..104].copy_from_slice(&x_firmware_ctrl.to_le_bytes());
    body[104..112].copy_from_slice(&x_dsdt.to_le_bytes());
    table(b"FACP", &body)
}

/// The static MADT bhyve publishes, describing `cpus` processors.
pub fn static_madt(cpus: u8) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0xFEE0_0000u32.to_le_bytes());
    body.extend_from_slice(&1u32.to_le_bytes());
    for id in 0..cpus {
        body.extend_from_slice(&[0, 8, id, id, 1, 0, 0, 0]);
    }
    table(b"APIC", &body)
}

pub fn facs() -> Vec<u8> {
    let mut b = vec![0u8; 64];
    b[0..4].copy_from_slice(b"FACS");
    b[4..8].copy_from_slice(&64u32.to_le_bytes());
    b
}

pub fn dsdt() -> Vec<u8> {
    // DefinitionBlock body bytes are opaque here.
    table(b"DSDT", &[0x10, 0x0A, 0x5C, 0x5F, 0x53, 0x42, 0x5F])
}

/// A complete, valid bhyve table set: FACP, APIC, HPET, then FACS and DSDT.
pub fn bhyve_image() -> SparseMemory {
    let mut mem = SparseMemory::with_bios_area();
    mem.write(RSDP_ADDRESS, &rsdp(2, XSDT_ADDRESS));
    mem.insert(
        XSDT_ADDRESS,
        xsdt(&[FADT_ADDRESS, MADT_ADDRESS, HPET_ADDRESS]),
    );
    mem.insert(
        FADT_ADDRESS,
        fadt(
            u32::try_from(FACS_ADDRESS).unwrap(),
            u32::try_from(DSDT_ADDRESS).unwrap(),
            0,
            0,
        ),
    );
    mem.insert(MADT_ADDRESS, static_madt(16));
    mem.insert(HPET_ADDRESS, table(b"HPET", &[0u8; 20]));
    mem.insert(FACS_ADDRESS, facs());
    mem.insert(DSDT_ADDRESS, dsdt());
    mem
}

/// Records every installed table; optionally rejects one signature.
#[derive(Default)]
pub struct RecordingInstaller {
    pub tables: Vec<Vec<u8>>,
    pub reject: Option<(Signature, usize)>,
}

impl RecordingInstaller {
    pub fn rejecting(signature: &[u8; 4], status: usize) -> Self {
        Self {
            reject: Some((Signature(*signature), status)),
            ..Self::default()
        }
    }

    pub fn signatures(&self) -> Vec<String> {
        self.tables
            .iter()
            .map(|t| String::from_utf8_lossy(&t[..4]).into_owned())
            .collect()
    }

    pub fn table(&self, signature: &[u8; 4]) -> Option<&[u8]> {
        self.tables
            .iter()
            .find(|t| &t[..4] == signature)
            .map(Vec::as_slice)
    }
}

impl AcpiTableInstaller for RecordingInstaller {
    fn install_acpi_table(&mut self, table: &[u8]) -> Result<TableKey, InstallError> {
        if let Some((signature, status)) = self.reject {
            if table[..4] == signature.0 {
                return Err(InstallError(status));
            }
        }
        self.tables.push(table.to_vec());
        Ok(TableKey(self.tables.len()))
    }
}

/// Turns the fatal halt into an observable panic.
pub struct PanicHalt;

impl FatalHalt for PanicHalt {
    fn halt(&self) -> ! {
        panic!("fatal halt: no DSDT");
    }
}

pub fn dispatcher(cpus: u8) -> TableDispatcher<RecordingInstaller, FixedCpuCount> {
    dispatcher_with(RecordingInstaller::default(), cpus)
}

pub fn dispatcher_with(
    installer: RecordingInstaller,
    cpus: u8,
) -> TableDispatcher<RecordingInstaller, FixedCpuCount> {
    TableDispatcher::new(
        installer,
        FixedCpuCount(NonZeroU8::new(cpus).unwrap()),
        MadtConfig::new(),
    )
}

/// fw_cfg with a fixed set of named files.
#[derive(Default)]
pub struct FakeFwCfg {
    pub files: BTreeMap<String, Vec<u8>>,
    pub lookups: usize,
}

impl FakeFwCfg {
    pub fn with_file(name: &str, contents: &[u8]) -> Self {
        let mut files = BTreeMap::new();
        files.insert(name.to_string(), contents.to_vec());
        Self { files, lookups: 0 }
    }
}

impl FirmwareConfig for FakeFwCfg {
    fn is_available(&mut self) -> bool {
        true
    }

    fn find_file(&mut self, name: &str) -> Option<FwCfgFile> {
        self.lookups += 1;
        let index = self.files.keys().position(|k| k == name)?;
        Some(FwCfgFile {
            select: 0x20 + u16::try_from(index).unwrap(),
            size: u32::try_from(self.files[name].len()).unwrap(),
        })
    }

    fn read_file(&mut self, file: FwCfgFile, buf: &mut [u8]) {
        let index = usize::from(file.select - 0x20);
        let contents = self.files.values().nth(index).unwrap();
        buf.copy_from_slice(&contents[..buf.len()]);
    }
}

/// fwctl with a fixed set of keys; counts requests.
#[derive(Default)]
pub struct FakeFwCtl {
    pub values: BTreeMap<String, Vec<u8>>,
    pub requests: usize,
}

impl FakeFwCtl {
    pub fn with_key(name: &str, value: &[u8]) -> Self {
        let mut values = BTreeMap::new();
        values.insert(name.to_string(), value.to_vec());
        Self {
            values,
            requests: 0,
        }
    }
}

impl FirmwareControl for FakeFwCtl {
    fn get(&mut self, name: &str, buf: &mut [u8]) -> Result<usize, FwCtlError> {
        self.requests += 1;
        let value = self.values.get(name).ok_or(FwCtlError::NotFound)?;
        let needed = value.len();
        buf.get_mut(..needed)
            .ok_or(FwCtlError::BufferTooSmall { needed })?
            .copy_from_slice(value);
        Ok(needed)
    }
}

//! # fw_cfg Configuration Channel
//!
//! bhyve can expose a QEMU-compatible firmware configuration device. An item
//! is selected by writing its 16-bit key to the selector port, after which its
//! contents stream out of the data port one byte at a time. Named items are
//! listed in the file directory:
//!
//! ```text
//! key 0x0019 (big-endian)
//!   u32 count
//!   count × { u32 size, u16 select, u16 reserved, [u8; 56] name }
//! ```

use log::debug;

use crate::port::{FW_CFG_DATA_PORT, FW_CFG_SELECTOR_PORT, PortIo};

const SIGNATURE_KEY: u16 = 0x0000;
const FILE_DIR_KEY: u16 = 0x0019;
const SIGNATURE: [u8; 4] = *b"QEMU";
const FILE_NAME_LEN: usize = 56;

/// A named fw_cfg item.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FwCfgFile {
    /// Key to write to the selector port.
    pub select: u16,
    /// Size of the item in bytes.
    pub size: u32,
}

/// File-style configuration channel: look an item up by name, then read it.
pub trait FirmwareConfig {
    /// Whether the channel exists on this platform at all.
    fn is_available(&mut self) -> bool;

    /// Look up a named item; `None` if the channel is unavailable or the name is unknown.
    fn find_file(&mut self, name: &str) -> Option<FwCfgFile>;

    /// Select `file` and fill `buf` from its start.
    fn read_file(&mut self, file: FwCfgFile, buf: &mut [u8]);
}

impl<T: FirmwareConfig + ?Sized> FirmwareConfig for &mut T {
    fn is_available(&mut self) -> bool {
        (**self).is_available()
    }

    fn find_file(&mut self, name: &str) -> Option<FwCfgFile> {
        (**self).find_file(name)
    }

    fn read_file(&mut self, file: FwCfgFile, buf: &mut [u8]) {
        (**self).read_file(file, buf);
    }
}

/// Placeholder for a platform without an fw_cfg device.
#[derive(Debug, Copy, Clone, Default)]
pub struct NoFwCfg;

impl FirmwareConfig for NoFwCfg {
    fn is_available(&mut self) -> bool {
        false
    }

    fn find_file(&mut self, _name: &str) -> Option<FwCfgFile> {
        None
    }

    fn read_file(&mut self, _file: FwCfgFile, buf: &mut [u8]) {
        buf.fill(0);
    }
}

/// The fw_cfg device behind the legacy I/O ports.
pub struct QemuFwCfg<P> {
    ports: P,
    available: Option<bool>,
}

impl<P: PortIo> QemuFwCfg<P> {
    #[must_use]
    pub const fn new(ports: P) -> Self {
        Self {
            ports,
            available: None,
        }
    }

    fn select(&mut self, key: u16) {
        self.ports.write_u16(FW_CFG_SELECTOR_PORT, key);
    }

    fn read_bytes(&mut self, buf: &mut [u8]) {
        for byte in buf {
            *byte = self.ports.read_u8(FW_CFG_DATA_PORT);
        }
    }

    fn read_array<const N: usize>(&mut self) -> [u8; N] {
        let mut buf = [0u8; N];
        self.read_bytes(&mut buf);
        buf
    }

    fn probe(&mut self) -> bool {
        self.select(SIGNATURE_KEY);
        let signature = self.read_array::<4>();
        let found = signature == SIGNATURE;
        debug!("fw_cfg signature {signature:02x?}, available: {found}");
        found
    }

    #[must_use]
    pub fn into_inner(self) -> P {
        self.ports
    }
}

impl<P: PortIo> FirmwareConfig for QemuFwCfg<P> {
    fn is_available(&mut self) -> bool {
        if let Some(available) = self.available {
            return available;
        }
        let available = self.probe();
        self.available = Some(available);
        available
    }

    fn find_file(&mut self, name: &str) -> Option<FwCfgFile> {
        if !self.is_available() {
            return None;
        }

        self.select(FILE_DIR_KEY);
        let count = u32::from_be_bytes(self.read_array());
        for _ in 0..count {
            let size = u32::from_be_bytes(self.read_array());
            let select = u16::from_be_bytes(self.read_array());
            let _reserved: [u8; 2] = self.read_array();
            let raw_name: [u8; FILE_NAME_LEN] = self.read_array();

            if file_name(&raw_name) == name.as_bytes() {
                debug!("fw_cfg file {name} at key {select:#06x}, {size} bytes");
                return Some(FwCfgFile { select, size });
            }
        }

        debug!("fw_cfg file {name} not found among {count} entries");
        None
    }

    fn read_file(&mut self, file: FwCfgFile, buf: &mut [u8]) {
        self.select(file.select);
        self.read_bytes(buf);
    }
}

/// The NUL-terminated part of a directory entry's name.
fn file_name(raw: &[u8; FILE_NAME_LEN]) -> &[u8] {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(FILE_NAME_LEN);
    &raw[..end]
}

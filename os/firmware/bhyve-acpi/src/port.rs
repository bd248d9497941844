//! # x86 I/O Port Access
//!
//! The hypervisor configuration channels live in the legacy I/O port space.
//! This crate never executes `in`/`out` itself; the driver provides a
//! [`PortIo`] implementation backed by inline assembly, which keeps the
//! transports in [`fw_cfg`](crate::fw_cfg) and [`fw_ctl`](crate::fw_ctl)
//! testable against scripted devices.
//!
//! ```text
//! 0x0510   selector (fw_cfg) / message word (fwctl)
//! 0x0511   data byte (fw_cfg) / signature byte (fwctl probe)
//! ```

/// Selector port shared by fw_cfg and fwctl.
pub const FW_CFG_SELECTOR_PORT: u16 = 0x510;

/// Data port shared by fw_cfg and fwctl.
pub const FW_CFG_DATA_PORT: u16 = 0x511;

/// Access to the x86 I/O port space.
///
/// Implementations are responsible for the privilege and device-presence
/// requirements of the underlying instructions.
pub trait PortIo {
    /// Read one byte from `port` (`in al, dx`).
    fn read_u8(&mut self, port: u16) -> u8;

    /// Read a double word from `port` (`in eax, dx`).
    fn read_u32(&mut self, port: u16) -> u32;

    /// Write a word to `port` (`out dx, ax`).
    fn write_u16(&mut self, port: u16, value: u16);

    /// Write a double word to `port` (`out dx, eax`).
    fn write_u32(&mut self, port: u16, value: u32);
}

impl<T: PortIo + ?Sized> PortIo for &mut T {
    fn read_u8(&mut self, port: u16) -> u8 {
        (**self).read_u8(port)
    }

    fn read_u32(&mut self, port: u16) -> u32 {
        (**self).read_u32(port)
    }

    fn write_u16(&mut self, port: u16, value: u16) {
        (**self).write_u16(port, value);
    }

    fn write_u32(&mut self, port: u16, value: u32) {
        (**self).write_u32(port, value);
    }
}

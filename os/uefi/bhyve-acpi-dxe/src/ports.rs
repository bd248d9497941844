//! # x86 I/O Port Access
//!
//! [`X86Ports`] executes the `in`/`out` instructions behind
//! [`bhyve_acpi::PortIo`]. Boot service drivers run at CPL0, so every port is
//! accessible; the caller must still only address devices that exist.

use bhyve_acpi::PortIo;

/// The processor's I/O port space.
#[derive(Debug, Copy, Clone, Default)]
pub struct X86Ports;

impl PortIo for X86Ports {
    #[inline]
    fn read_u8(&mut self, port: u16) -> u8 {
        let v: u8;
        // SAFETY: CPL0; the fw_cfg/fwctl ports are read-safe even when no device decodes them.
        unsafe {
            core::arch::asm!(
                "in al, dx",
                in("dx") port,
                out("al") v,
                options(nomem, nostack, preserves_flags),
            );
        }
        v
    }

    #[inline]
    fn read_u32(&mut self, port: u16) -> u32 {
        let v: u32;
        // SAFETY: as for `read_u8`.
        unsafe {
            core::arch::asm!(
                "in eax, dx",
                in("dx") port,
                out("eax") v,
                options(nomem, nostack, preserves_flags),
            );
        }
        v
    }

    #[inline]
    fn write_u16(&mut self, port: u16, value: u16) {
        // SAFETY: the selector port only latches the written key.
        unsafe {
            core::arch::asm!(
                "out dx, ax",
                in("dx") port,
                in("ax") value,
                options(nomem, nostack, preserves_flags),
            );
        }
    }

    #[inline]
    fn write_u32(&mut self, port: u16, value: u32) {
        // SAFETY: as for `write_u16`.
        unsafe {
            core::arch::asm!(
                "out dx, eax",
                in("dx") port,
                in("eax") value,
                options(nomem, nostack, preserves_flags),
            );
        }
    }
}

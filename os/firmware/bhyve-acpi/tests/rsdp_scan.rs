mod common;

use bhyve_acpi::{AcpiPlatformError, ErrorKind, ScanWindow, find_rsdp};
use common::{RSDP_ADDRESS, SparseMemory, XSDT_ADDRESS, rsdp};

fn memory_with_rsdp_at(address: u64, raw: &[u8]) -> SparseMemory {
    let mut mem = SparseMemory::with_bios_area();
    mem.write(address, raw);
    mem
}

#[test]
fn found_at_every_aligned_offset_of_the_window() {
    let window = ScanWindow::default();
    let raw = rsdp(2, XSDT_ADDRESS);
    // The last slots cannot hold 36 bytes inside the BIOS area.
    for address in (window.start..window.end - 0x30).step_by(0x10) {
        let mem = memory_with_rsdp_at(address, &raw);
        let found = find_rsdp(&mem, window).unwrap();
        assert_eq!(found.address, address);
        assert_eq!(found.xsdt_address, XSDT_ADDRESS);
    }
}

#[test]
fn not_found_below_the_window() {
    let mem = memory_with_rsdp_at(0x000F_2000, &rsdp(2, XSDT_ADDRESS));
    let err = find_rsdp(&mem, ScanWindow::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn not_found_at_the_window_end() {
    let mut mem = SparseMemory::with_bios_area();
    mem.insert(0x0010_0000, rsdp(2, XSDT_ADDRESS));
    let err = find_rsdp(&mem, ScanWindow::default()).unwrap_err();
    assert_eq!(
        err,
        AcpiPlatformError::RsdpNotFound {
            start: 0x000F_2400,
            end: 0x0010_0000
        }
    );
}

#[test]
fn not_found_when_misaligned() {
    let mem = memory_with_rsdp_at(RSDP_ADDRESS + 8, &rsdp(2, XSDT_ADDRESS));
    let err = find_rsdp(&mem, ScanWindow::default()).unwrap_err();
    assert_eq!(
        err,
        AcpiPlatformError::RsdpNotFound {
            start: 0x000F_2400,
            end: 0x0010_0000
        }
    );
}

#[test]
fn revision_one_stops_the_scan() {
    let mut mem = memory_with_rsdp_at(RSDP_ADDRESS, &rsdp(1, XSDT_ADDRESS));
    // A valid candidate further up must not be reached.
    mem.write(RSDP_ADDRESS + 0x100, &rsdp(2, XSDT_ADDRESS));

    let err = find_rsdp(&mem, ScanWindow::default()).unwrap_err();
    assert_eq!(
        err,
        AcpiPlatformError::UnsupportedRevision {
            address: RSDP_ADDRESS,
            revision: 1
        }
    );
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[test]
fn corrupt_legacy_bytes_are_protocol_errors() {
    let raw = rsdp(2, XSDT_ADDRESS);
    // Bytes 0..8 are the signature and byte 15 the revision; both change the
    // outcome before the checksum is looked at.
    for index in (8..15).chain(16..20) {
        let mut corrupt = raw.clone();
        corrupt[index] ^= 0x01;
        let mem = memory_with_rsdp_at(RSDP_ADDRESS, &corrupt);
        let err = find_rsdp(&mem, ScanWindow::default()).unwrap_err();
        assert!(
            matches!(err, AcpiPlatformError::RsdpChecksum { .. }),
            "byte {index}: {err:?}"
        );
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
    }
}

#[test]
fn corrupt_extended_bytes_are_protocol_errors() {
    let raw = rsdp(2, XSDT_ADDRESS);
    // Bytes 20..24 are the length; corrupting it is covered separately.
    for index in 24..36 {
        let mut corrupt = raw.clone();
        corrupt[index] ^= 0x80;
        assert_eq!(bhyve_acpi::checksum::sum(&corrupt[..20]), 0);

        let mem = memory_with_rsdp_at(RSDP_ADDRESS, &corrupt);
        let err = find_rsdp(&mem, ScanWindow::default()).unwrap_err();
        assert!(
            matches!(err, AcpiPlatformError::RsdpExtendedChecksum { .. }),
            "byte {index}: {err:?}"
        );
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
    }
}

#[test]
fn corrupt_length_is_a_protocol_error() {
    let mut corrupt = rsdp(2, XSDT_ADDRESS);
    corrupt[20] = 40;
    let mem = memory_with_rsdp_at(RSDP_ADDRESS, &corrupt);
    let err = find_rsdp(&mem, ScanWindow::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolError);
}

#[test]
fn corrupt_first_candidate_is_not_skipped() {
    let mut corrupt = rsdp(2, XSDT_ADDRESS);
    corrupt[8] ^= 0xFF;
    let mut mem = memory_with_rsdp_at(RSDP_ADDRESS, &corrupt);
    mem.write(RSDP_ADDRESS + 0x40, &rsdp(2, XSDT_ADDRESS));

    let err = find_rsdp(&mem, ScanWindow::default()).unwrap_err();
    assert!(matches!(
        err,
        AcpiPlatformError::RsdpChecksum {
            address: RSDP_ADDRESS,
            ..
        }
    ));
}

#[test]
fn invalid_window_is_rejected() {
    let mem = SparseMemory::with_bios_area();
    let err = find_rsdp(&mem, ScanWindow::new(0x000F_2404, 0x0010_0000)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
}

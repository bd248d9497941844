#![allow(unsafe_code)]

use bhyve_acpi::PhysMapRo;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use core::ptr::{NonNull, null_mut};
use uefi::boot;
use uefi::boot::MemoryType;

/// Global allocator over the Boot Services pool.
///
/// The driver never outlives boot services, so the pool is always there.
/// Pool memory is only 8-byte aligned: each block is over-allocated and the
/// pool pointer is kept in the word just below the aligned region.
pub struct UefiBootAllocator;

#[global_allocator]
static GLOBAL_ALLOC: UefiBootAllocator = UefiBootAllocator;

const HEADER: usize = size_of::<*mut u8>();

unsafe impl GlobalAlloc for UefiBootAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let align = layout.align().max(HEADER);
        let Some(total) = layout
            .size()
            .max(1)
            .checked_add(align)
            .and_then(|v| v.checked_add(HEADER))
        else {
            return null_mut();
        };

        let Ok(pool) = boot::allocate_pool(MemoryType::BOOT_SERVICES_DATA, total) else {
            return null_mut();
        };

        let base = pool.as_ptr();
        // SAFETY: `HEADER + padding + size` stays within the `total` bytes just
        // allocated, and the header slot is pointer-aligned because `align` is.
        unsafe {
            let body = base.add(HEADER);
            let padding = body.align_offset(align);
            if padding >= align {
                let _ = boot::free_pool(pool);
                return null_mut();
            }
            let aligned = body.add(padding);
            aligned.cast::<*mut u8>().sub(1).write(base);
            aligned
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        // SAFETY: forwarded caller contract.
        let block = unsafe { self.alloc(layout) };
        if !block.is_null() {
            // SAFETY: `alloc` returned at least `layout.size()` writable bytes.
            unsafe { block.write_bytes(0, layout.size()) };
        }
        block
    }

    unsafe fn dealloc(&self, block: *mut u8, _layout: Layout) {
        // SAFETY: `block` came from `alloc`, which stored the pool pointer below it.
        let base = unsafe { block.cast::<*mut u8>().sub(1).read() };
        if let Some(pool) = NonNull::new(base) {
            // SAFETY: `pool` is the pointer `allocate_pool` returned.
            let _ = unsafe { boot::free_pool(pool) };
        }
    }
}

/// Guest physical memory as seen through the firmware's identity mapping.
///
/// UEFI maps all system memory 1:1 during boot services, so a physical
/// address is directly usable as a pointer. Only the hypervisor's ACPI
/// regions are ever requested.
#[derive(Debug, Copy, Clone, Default)]
pub struct IdentityMap;

impl PhysMapRo for IdentityMap {
    fn map_ro(&self, paddr: u64, len: usize) -> Option<&[u8]> {
        if paddr == 0 {
            return None;
        }
        let addr = usize::try_from(paddr).ok()?;
        addr.checked_add(len)?;
        if isize::try_from(len).is_err() {
            return None;
        }

        let ptr = ptr::with_exposed_provenance::<u8>(addr);
        // SAFETY: boot services identity-map guest RAM; bhyve's tables are
        // resident and never written while the driver reads them.
        Some(unsafe { core::slice::from_raw_parts(ptr, len) })
    }
}

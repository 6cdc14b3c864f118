//! Fixed physical layout shared between the loader and every executable.
//!
//! These constants are ABI: user programs are linked against the image load
//! address, and the per-slot kernel stacks are found by arithmetic on the
//! process identifier.

use x86_64::{PhysAddr, VirtAddr};

/// Physical load address of the kernel's own 4MB page.
pub const KERNEL_PHYS: u64 = 0x40_0000;

/// End of the kernel region. Process slots start here.
pub const KERNEL_END: u64 = 0x80_0000; // 8MB

/// Physical base of the first process slot.
pub const SLOT_BASE: u64 = KERNEL_END;

/// Each process owns one contiguous 4MB physical slot.
pub const SLOT_SIZE: u64 = 0x40_0000;

/// One kernel stack page per process identifier.
pub const KSTACK_SIZE: u64 = 0x2000; // 8KB

/// Virtual base of the user slot mapping (page directory entry 32).
pub const USER_SLOT_VIRT: VirtAddr = VirtAddr::new_truncate(0x0800_0000); // 128MB

/// User programs are linked to execute at this virtual address.
pub const USER_IMAGE_VIRT: VirtAddr = VirtAddr::new_truncate(0x0804_8000);

/// Virtual address handed to user code by `vidmap` (page directory entry 33).
pub const USER_VIDEO_VIRT: VirtAddr = VirtAddr::new_truncate(0x0840_0000); // 132MB

/// Physical address of the live text-mode video page.
pub const VIDEO_PHYS: PhysAddr = PhysAddr::new_truncate(0xB8000);

/// Page granularity of the video mappings and the filesystem blocks.
pub const PAGE_SIZE: usize = 4096;

pub const MAX_PROCS: usize = 6;
pub const NUM_TERMINALS: usize = 3;
/// Per-terminal cap on the process chain.
pub const MAX_TERM_PROCS: usize = 4;

pub const FD_COUNT: usize = 8;
pub const CMD_LEN: usize = 128;
pub const FNAME_LEN: usize = 32;

/// Executables start with this signature.
pub const EXEC_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
/// Entry point lives at this offset in the image, little endian.
pub const ENTRY_OFFSET: usize = 24;

/// Reserved exit status for processes terminated by a fault.
pub const FAULT_STATUS: i32 = 256;

/// Physical base of process `pid`'s 4MB slot.
pub fn slot_phys(pid: usize) -> PhysAddr {
    PhysAddr::new(SLOT_BASE + pid as u64 * SLOT_SIZE)
}

/// Top of process `pid`'s kernel stack, loaded into the task state before
/// every privilege transition into that process.
pub fn kernel_stack_top(pid: usize) -> VirtAddr {
    VirtAddr::new(KERNEL_END - pid as u64 * KSTACK_SIZE - 4)
}

/// Physical page holding terminal `tid`'s off-screen contents.
pub fn video_backing_phys(tid: usize) -> PhysAddr {
    PhysAddr::new(VIDEO_PHYS.as_u64() + (tid as u64 + 1) * PAGE_SIZE as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_addresses_are_4mb_apart() {
        assert_eq!(slot_phys(0).as_u64(), 0x80_0000);
        assert_eq!(slot_phys(1).as_u64(), 0xC0_0000);
        assert_eq!(slot_phys(5).as_u64(), 0x80_0000 + 5 * 0x40_0000);
    }

    #[test]
    fn kernel_stacks_descend_from_kernel_end() {
        assert_eq!(kernel_stack_top(0).as_u64(), 0x80_0000 - 4);
        assert_eq!(kernel_stack_top(1).as_u64(), 0x80_0000 - 0x2000 - 4);
    }

    #[test]
    fn backing_pages_follow_the_live_page() {
        assert_eq!(video_backing_phys(0).as_u64(), 0xB9000);
        assert_eq!(video_backing_phys(2).as_u64(), 0xBB000);
    }
}

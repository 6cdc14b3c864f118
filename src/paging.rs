//! Address-space manager.
//!
//! One shared page directory for the whole machine. Isolation comes from
//! remapping directory entry 32 to the dispatched process's physical slot
//! before every transfer; this is sound only because exactly one process
//! executes at a time. The TLB flush is exposed as a monotonic epoch the
//! boot shim watches, reloading CR3 whenever it advances.

use x86_64::structures::paging::PageTableFlags as Flags;
use x86_64::PhysAddr;

use crate::layout::{self, MAX_PROCS, PAGE_SIZE};
use crate::process::Pid;

pub const TABLE_ENTRIES: usize = 1024;

/// Directory entry covering the user slot at 128MB.
pub const USER_SLOT_PDE: usize = 32;
/// Directory entry covering the user video mapping at 132MB.
pub const USER_VIDEO_PDE: usize = 33;

/// Synthetic frames for the two page tables. The real tables sit wherever
/// the kernel image placed them; the directory entries only need stable
/// addresses to point at.
const BASE_TABLE_PHYS: u64 = 0x10_0000;
const VIDEO_TABLE_PHYS: u64 = 0x10_1000;

/// Bound on the image copied into a slot. Every shipped executable is far
/// smaller than the 4MB slot itself.
pub const PROGRAM_IMAGE_CAP: usize = 0x8000;

/// Which physical video page backs the user-visible mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoTarget {
    /// The live page owned by the displayed terminal.
    Live,
    /// Terminal `tid`'s off-screen backing page.
    Backing(usize),
}

impl VideoTarget {
    pub fn phys(self) -> PhysAddr {
        match self {
            VideoTarget::Live => layout::VIDEO_PHYS,
            VideoTarget::Backing(tid) => layout::video_backing_phys(tid),
        }
    }
}

/// The modeled contents of one 4MB slot: the program image copied there at
/// load time. Overwritten by the next occupant, never cleared.
struct Slot {
    image: [u8; PROGRAM_IMAGE_CAP],
    len: usize,
}

impl Slot {
    const fn new() -> Self {
        Self {
            image: [0; PROGRAM_IMAGE_CAP],
            len: 0,
        }
    }
}

pub struct AddressSpace {
    directory: [u64; TABLE_ENTRIES],
    base_table: [u64; TABLE_ENTRIES],
    video_table: [u64; TABLE_ENTRIES],
    slots: [Slot; MAX_PROCS],
    tlb_epoch: u64,
}

impl AddressSpace {
    /// Boot layout: kernel 4MB page at entry 1, the base table covering the
    /// first 4MB with the video pages user-visible, everything else absent.
    pub fn new() -> Self {
        let mut space = Self {
            directory: [Flags::WRITABLE.bits(); TABLE_ENTRIES],
            base_table: [0; TABLE_ENTRIES],
            video_table: [0; TABLE_ENTRIES],
            slots: [const { Slot::new() }; MAX_PROCS],
            tlb_epoch: 0,
        };

        let kernel_flags = Flags::PRESENT | Flags::WRITABLE | Flags::HUGE_PAGE;
        space.directory[1] = layout::KERNEL_PHYS | kernel_flags.bits();

        let video_lo = layout::VIDEO_PHYS.as_u64() as usize / PAGE_SIZE;
        for i in 0..TABLE_ENTRIES {
            let frame = (i * PAGE_SIZE) as u64;
            // the live video page plus the three backing pages
            if (video_lo..video_lo + 4).contains(&i) {
                space.base_table[i] =
                    frame | (Flags::PRESENT | Flags::WRITABLE | Flags::USER_ACCESSIBLE).bits();
            } else {
                space.base_table[i] = frame | Flags::WRITABLE.bits();
            }
        }
        space.directory[0] =
            BASE_TABLE_PHYS | (Flags::PRESENT | Flags::WRITABLE | Flags::USER_ACCESSIBLE).bits();
        space
    }

    /// Map the user slot onto process `pid`'s 4MB physical slot. Must run
    /// before control transfers to or resumes that process. Cannot fail:
    /// the slot address is valid by construction.
    pub fn map_process(&mut self, pid: Pid) {
        let flags = Flags::PRESENT | Flags::WRITABLE | Flags::USER_ACCESSIBLE | Flags::HUGE_PAGE;
        self.directory[USER_SLOT_PDE] = layout::slot_phys(pid).as_u64() | flags.bits();
        self.flush_tlb();
    }

    /// Back the user video mapping with the live page or a terminal's
    /// off-screen page.
    pub fn map_video(&mut self, target: VideoTarget) {
        let flags = Flags::PRESENT | Flags::WRITABLE | Flags::USER_ACCESSIBLE;
        self.video_table[0] = target.phys().as_u64() | flags.bits();
        self.directory[USER_VIDEO_PDE] = VIDEO_TABLE_PHYS | flags.bits();
        self.flush_tlb();
    }

    fn flush_tlb(&mut self) {
        self.tlb_epoch += 1;
    }

    /// Flush count; the shim reloads CR3 when it advances.
    pub fn tlb_epoch(&self) -> u64 {
        self.tlb_epoch
    }

    pub fn directory_entry(&self, index: usize) -> u64 {
        self.directory[index]
    }

    /// The currently mapped video page, if any.
    pub fn video_target(&self) -> Option<VideoTarget> {
        let entry = self.video_table[0];
        if entry & Flags::PRESENT.bits() == 0 {
            return None;
        }
        let phys = entry & !0xFFF;
        if phys == layout::VIDEO_PHYS.as_u64() {
            Some(VideoTarget::Live)
        } else {
            let tid = (phys - layout::VIDEO_PHYS.as_u64()) as usize / PAGE_SIZE - 1;
            Some(VideoTarget::Backing(tid))
        }
    }

    /// Identifier of the process the user slot currently maps.
    pub fn mapped_slot(&self) -> Option<Pid> {
        let entry = self.directory[USER_SLOT_PDE];
        if entry & Flags::PRESENT.bits() == 0 {
            return None;
        }
        let phys = entry & !((layout::SLOT_SIZE) - 1);
        Some(((phys - layout::SLOT_BASE) / layout::SLOT_SIZE) as Pid)
    }

    /// Scratch view of slot `pid` for the loader to copy an image into.
    pub fn slot_buffer_mut(&mut self, pid: Pid) -> &mut [u8] {
        &mut self.slots[pid].image
    }

    pub fn set_image_len(&mut self, pid: Pid, len: usize) {
        self.slots[pid].len = len.min(PROGRAM_IMAGE_CAP);
    }

    /// The image occupying slot `pid`.
    pub fn image(&self, pid: Pid) -> &[u8] {
        &self.slots[pid].image[..self.slots[pid].len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_process_installs_a_user_huge_page() {
        let mut space = AddressSpace::new();
        space.map_process(2);
        let entry = space.directory_entry(USER_SLOT_PDE);
        assert_eq!(entry & !0xFFF, layout::slot_phys(2).as_u64());
        let flags = Flags::from_bits_truncate(entry);
        assert!(flags.contains(Flags::PRESENT | Flags::WRITABLE | Flags::USER_ACCESSIBLE));
        assert!(flags.contains(Flags::HUGE_PAGE));
        assert_eq!(space.mapped_slot(), Some(2));
    }

    #[test]
    fn every_remap_flushes() {
        let mut space = AddressSpace::new();
        let before = space.tlb_epoch();
        space.map_process(0);
        space.map_video(VideoTarget::Backing(1));
        assert_eq!(space.tlb_epoch(), before + 2);
    }

    #[test]
    fn video_target_round_trips() {
        let mut space = AddressSpace::new();
        assert_eq!(space.video_target(), None);
        space.map_video(VideoTarget::Live);
        assert_eq!(space.video_target(), Some(VideoTarget::Live));
        space.map_video(VideoTarget::Backing(2));
        assert_eq!(space.video_target(), Some(VideoTarget::Backing(2)));
    }

    #[test]
    fn slot_reuse_overwrites_the_previous_image() {
        let mut space = AddressSpace::new();
        let n = {
            let buf = space.slot_buffer_mut(0);
            buf[..4].copy_from_slice(b"old!");
            4
        };
        space.set_image_len(0, n);
        assert_eq!(space.image(0), b"old!");
        let buf = space.slot_buffer_mut(0);
        buf[..2].copy_from_slice(b"no");
        space.set_image_len(0, 2);
        assert_eq!(space.image(0), b"no");
    }

    #[test]
    fn kernel_page_is_supervisor_only() {
        let space = AddressSpace::new();
        let entry = space.directory_entry(1);
        let flags = Flags::from_bits_truncate(entry);
        assert!(flags.contains(Flags::PRESENT | Flags::HUGE_PAGE));
        assert!(!flags.contains(Flags::USER_ACCESSIBLE));
    }
}

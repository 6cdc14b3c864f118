//! Process control blocks and the fixed-capacity process table.
//!
//! A slot identifier doubles as the process identifier: it names the PCB,
//! the 4MB physical slot, and the kernel stack page. Lookup is plain array
//! indexing; a PCB is valid only while its slot is marked active.

use crate::context::SavedContext;
use crate::layout::{CMD_LEN, FD_COUNT, MAX_PROCS};

pub type Pid = usize;

/// Capability set resolved at `open` time. Dispatch is a match on the tag,
/// not late binding; `Vacant` fails every call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileOps {
    Vacant,
    Stdin,
    Stdout,
    Rtc,
    Dir,
    File,
}

/// One of the eight descriptor entries in a PCB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FdEntry {
    pub ops: FileOps,
    pub inode: u32,
    pub pos: usize,
    pub in_use: bool,
}

impl FdEntry {
    pub const fn vacant() -> Self {
        Self {
            ops: FileOps::Vacant,
            inode: 0,
            pos: 0,
            in_use: false,
        }
    }

    pub const fn open(ops: FileOps, inode: u32) -> Self {
        Self {
            ops,
            inode,
            pos: 0,
            in_use: true,
        }
    }
}

/// Command-line argument string, copied into the PCB at load time.
#[derive(Clone, Copy)]
pub struct ArgBuf {
    buf: [u8; CMD_LEN],
    len: usize,
}

impl ArgBuf {
    pub const fn new() -> Self {
        Self {
            buf: [0; CMD_LEN],
            len: 0,
        }
    }

    pub fn set(&mut self, args: &[u8]) {
        let n = args.len().min(CMD_LEN);
        self.buf[..n].copy_from_slice(&args[..n]);
        self.len = n;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Clone, Copy)]
pub struct Pcb {
    pub pid: Pid,
    pub parent: Pid,
    /// Where `halt` resumes: the parent's context at its `execute` call.
    pub parent_ctx: SavedContext,
    /// Where the scheduler left this process when it was last preempted.
    pub ctx: SavedContext,
    pub files: [FdEntry; FD_COUNT],
    pub args: ArgBuf,
    /// Set once the scheduler has context-switched away from this process.
    pub sched_enabled: bool,
}

impl Pcb {
    pub const fn empty() -> Self {
        Self {
            pid: 0,
            parent: 0,
            parent_ctx: SavedContext::empty(),
            ctx: SavedContext::empty(),
            files: [FdEntry::vacant(); FD_COUNT],
            args: ArgBuf::new(),
            sched_enabled: false,
        }
    }
}

pub struct ProcessTable {
    active: [bool; MAX_PROCS],
    pcbs: [Pcb; MAX_PROCS],
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            active: [false; MAX_PROCS],
            pcbs: [Pcb::empty(); MAX_PROCS],
        }
    }

    /// Claim the lowest-numbered free slot.
    pub fn alloc(&mut self) -> Option<Pid> {
        for pid in 0..MAX_PROCS {
            if !self.active[pid] {
                self.active[pid] = true;
                self.pcbs[pid] = Pcb::empty();
                self.pcbs[pid].pid = pid;
                return Some(pid);
            }
        }
        None
    }

    /// Mark a slot inactive. The record stays readable until the slot is
    /// reused, matching the physical slot it names.
    pub fn release(&mut self, pid: Pid) {
        self.active[pid] = false;
    }

    pub fn is_active(&self, pid: Pid) -> bool {
        pid < MAX_PROCS && self.active[pid]
    }

    pub fn full(&self) -> bool {
        self.active.iter().all(|&a| a)
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    pub fn get(&self, pid: Pid) -> &Pcb {
        &self.pcbs[pid]
    }

    pub fn get_mut(&mut self, pid: Pid) -> &mut Pcb {
        &mut self.pcbs[pid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_takes_the_lowest_free_slot() {
        let mut table = ProcessTable::new();
        assert_eq!(table.alloc(), Some(0));
        assert_eq!(table.alloc(), Some(1));
        assert_eq!(table.alloc(), Some(2));
        table.release(1);
        assert_eq!(table.alloc(), Some(1));
        assert_eq!(table.alloc(), Some(3));
    }

    #[test]
    fn table_holds_exactly_six() {
        let mut table = ProcessTable::new();
        for _ in 0..MAX_PROCS {
            assert!(table.alloc().is_some());
        }
        assert!(table.full());
        assert_eq!(table.alloc(), None);
        table.release(5);
        assert!(!table.full());
        assert_eq!(table.alloc(), Some(5));
    }

    #[test]
    fn released_slot_is_inactive_but_readable() {
        let mut table = ProcessTable::new();
        let pid = table.alloc().unwrap();
        table.get_mut(pid).args.set(b"one two");
        table.release(pid);
        assert!(!table.is_active(pid));
        assert_eq!(table.get(pid).args.as_bytes(), b"one two");
    }

    #[test]
    fn fresh_pcb_has_vacant_descriptors() {
        let mut table = ProcessTable::new();
        let pid = table.alloc().unwrap();
        let pcb = table.get(pid);
        assert!(pcb.files.iter().all(|f| !f.in_use && f.ops == FileOps::Vacant));
        assert!(!pcb.sched_enabled);
    }

    #[test]
    fn arg_buffer_caps_at_128() {
        let mut args = ArgBuf::new();
        let long = [b'x'; 200];
        args.set(&long);
        assert_eq!(args.as_bytes().len(), CMD_LEN);
    }
}

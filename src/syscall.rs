//! The execution engine and syscall dispatcher.
//!
//! `execute` and `halt` are the only places a privilege boundary is
//! crossed: `execute` resolves to a one-way drop into user code and `halt`
//! unwinds to the parent's saved call site. Everything else is descriptor
//! plumbing dispatched on the capability tag resolved at `open` time.

use thiserror::Error;
use x86_64::VirtAddr;

use crate::context::{Exception, SavedContext, Transfer};
use crate::filesys;
use crate::layout::{self, ENTRY_OFFSET, EXEC_MAGIC, FD_COUNT, FNAME_LEN, MAX_TERM_PROCS};
use crate::paging::VideoTarget;
use crate::process::{FdEntry, FileOps, Pid};
use crate::Kernel;

/// Rejections raised before a new process is committed. All of them reach
/// user code as -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("empty command")]
    EmptyCommand,
    #[error("no available process slot")]
    NoFreeSlot,
    #[error("terminal process limit reached")]
    TerminalFull,
    #[error("executable name too long")]
    NameTooLong,
    #[error("file not found")]
    NotFound,
    #[error("file is not an executable")]
    NotExecutable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HaltError {
    #[error("no process is running")]
    NoProcess,
    #[error("halting an inactive process")]
    InactiveProcess,
}

/// Split a command line into the executable name and the argument string.
/// Leading spaces are skipped, the separating space run is collapsed, and
/// the argument keeps its interior and trailing spaces.
pub(crate) fn parse_command(command: &[u8]) -> Result<(&[u8], &[u8]), ExecError> {
    let mut i = 0;
    while i < command.len() && command[i] == b' ' {
        i += 1;
    }
    let name_start = i;
    while i < command.len() && command[i] != b' ' {
        i += 1;
    }
    let name = &command[name_start..i];
    if name.len() > FNAME_LEN {
        return Err(ExecError::NameTooLong);
    }
    while i < command.len() && command[i] == b' ' {
        i += 1;
    }
    Ok((name, &command[i..]))
}

impl<'img> Kernel<'img> {
    /// The process whose syscall or fault this is: the running terminal's
    /// foreground process.
    pub fn current_pid(&self) -> Option<Pid> {
        self.terminals
            .term(self.sched.running)
            .foreground
            .filter(|&pid| self.procs.is_active(pid))
    }

    /// Load and start a program on the invoking (running) terminal.
    /// `caller` is the invoking process's context; `halt` later unwinds to
    /// it. On success the returned transfer never comes back through the
    /// normal call mechanism.
    pub fn execute(
        &mut self,
        command: &[u8],
        caller: SavedContext,
    ) -> Result<Transfer, ExecError> {
        self.execute_on(self.sched.running, command, caller)
    }

    pub(crate) fn execute_on(
        &mut self,
        tid: usize,
        command: &[u8],
        caller: SavedContext,
    ) -> Result<Transfer, ExecError> {
        if command.is_empty() {
            log::warn!("execute: empty command");
            return Err(ExecError::EmptyCommand);
        }
        if self.procs.full() {
            log::warn!("execute: no available process slot");
            return Err(ExecError::NoFreeSlot);
        }
        if self.terminals.term(tid).num_proc as usize >= MAX_TERM_PROCS {
            log::warn!("execute: terminal {tid} is full");
            return Err(ExecError::TerminalFull);
        }

        let pid = self.procs.alloc().ok_or(ExecError::NoFreeSlot)?;
        match self.load(pid, tid, command, caller) {
            Ok(transfer) => Ok(transfer),
            Err(err) => {
                // nothing was committed beyond the slot
                self.procs.release(pid);
                log::warn!("execute: {err}");
                Err(err)
            }
        }
    }

    fn load(
        &mut self,
        pid: Pid,
        tid: usize,
        command: &[u8],
        caller: SavedContext,
    ) -> Result<Transfer, ExecError> {
        let (name, args) = parse_command(command)?;
        let dentry = self.fs.resolve(name).ok_or(ExecError::NotFound)?;

        // pull the image straight into the slot it will occupy; the slot
        // belongs to this pid until release either way
        let loaded = {
            let Kernel { vmem, fs, .. } = self;
            fs.read_data(dentry.inode, 0, vmem.slot_buffer_mut(pid))
        };
        self.vmem.set_image_len(pid, loaded);
        if loaded < ENTRY_OFFSET + 4 || self.vmem.image(pid)[..4] != EXEC_MAGIC {
            return Err(ExecError::NotExecutable);
        }
        let image = self.vmem.image(pid);
        let entry = u32::from_le_bytes([
            image[ENTRY_OFFSET],
            image[ENTRY_OFFSET + 1],
            image[ENTRY_OFFSET + 2],
            image[ENTRY_OFFSET + 3],
        ]);

        let term = self.terminals.term_mut(tid);
        // a terminal's first process is its own parent
        let parent = if term.num_proc == 0 {
            pid
        } else {
            term.foreground.unwrap_or(pid)
        };
        term.register(pid);
        term.foreground = Some(pid);
        if name == b"shell" {
            term.last_shell = Some(pid);
        }

        let pcb = self.procs.get_mut(pid);
        pcb.parent = parent;
        pcb.parent_ctx = caller;
        pcb.ctx = SavedContext::empty();
        pcb.sched_enabled = false;
        pcb.files[0] = FdEntry::open(FileOps::Stdin, 0);
        pcb.files[1] = FdEntry::open(FileOps::Stdout, 0);
        pcb.args.set(args);

        self.vmem.map_process(pid);
        self.tss.point_to(pid);
        log::debug!("execute: pid {pid} on terminal {tid}, entry {entry:#x}");
        Ok(Transfer::EnterUser {
            pid,
            entry: VirtAddr::new(entry as u64),
        })
    }

    /// Terminate the running process and resume its parent. A fault
    /// recorded before the call overrides `status` with the reserved 256
    /// sentinel so the parent can tell a crash from an exit.
    pub fn halt(&mut self, status: u8) -> Result<Transfer, HaltError> {
        let tid = self.sched.running;
        let status = if self.fault_pending {
            self.fault_pending = false;
            layout::FAULT_STATUS
        } else {
            status as i32
        };

        let Some(pid) = self.terminals.term(tid).foreground else {
            return Err(HaltError::NoProcess);
        };
        if !self.procs.is_active(pid) {
            log::warn!("halt: pid {pid} is already inactive");
            return Err(HaltError::InactiveProcess);
        }
        let parent = self.procs.get(pid).parent;
        let parent_ctx = self.procs.get(pid).parent_ctx;

        let term = self.terminals.term_mut(tid);
        term.remove(pid);
        let was_last = term.num_proc == 0;
        term.foreground = Some(parent);
        if term.last_shell == Some(pid) {
            term.last_shell = Some(parent);
        }

        // release backing drivers, then park every descriptor on the
        // vacant table so stale calls fail cleanly
        for fd in 2..FD_COUNT {
            if self.procs.get(pid).files[fd].in_use {
                self.close_fd(pid, fd);
            }
        }
        self.procs.get_mut(pid).files = [FdEntry::vacant(); FD_COUNT];

        self.procs.release(pid);
        log::debug!("halt: pid {pid} exits with status {status}");

        if was_last {
            // a terminal is never left with zero processes
            log::debug!("terminal {tid}: last process exited, respawning shell");
            match self.execute_on(tid, b"shell", parent_ctx) {
                Ok(transfer) => return Ok(transfer),
                Err(err) => log::warn!("terminal {tid}: shell respawn failed: {err}"),
            }
        }

        self.vmem.map_process(parent);
        self.tss.point_to(parent);
        Ok(Transfer::ReturnToParent {
            ctx: parent_ctx,
            status,
        })
    }

    /// Exception entry point: terminate the faulting process exactly as a
    /// voluntary halt, but with the fault sentinel. The kernel survives.
    pub fn fault(&mut self, exception: Exception) -> Transfer {
        log::warn!("fault: {exception:?} terminates the running process");
        self.fault_pending = true;
        match self.halt(0) {
            Ok(transfer) => transfer,
            Err(_) => {
                self.fault_pending = false;
                Transfer::Stay
            }
        }
    }

    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> isize {
        if fd >= FD_COUNT {
            return -1;
        }
        let Some(pid) = self.current_pid() else {
            return -1;
        };
        let entry = self.procs.get(pid).files[fd];
        if !entry.in_use {
            return -1;
        }
        match entry.ops {
            FileOps::Stdin => {
                let term = self.terminals.term_mut(self.sched.running);
                term.input.take_line(buf) as isize
            }
            FileOps::Rtc => self.rtc.read(),
            FileOps::File => {
                let Kernel { procs, fs, .. } = self;
                let entry = &mut procs.get_mut(pid).files[fd];
                let n = fs.read_data(entry.inode, entry.pos, buf);
                entry.pos += n;
                n as isize
            }
            FileOps::Dir => {
                let Kernel { procs, fs, .. } = self;
                let entry = &mut procs.get_mut(pid).files[fd];
                match fs.dentry_by_index(entry.pos) {
                    Some(dentry) => {
                        let name = dentry.name();
                        let n = name.len().min(buf.len());
                        buf[..n].copy_from_slice(&name[..n]);
                        entry.pos += 1;
                        n as isize
                    }
                    None => 0,
                }
            }
            FileOps::Stdout | FileOps::Vacant => -1,
        }
    }

    pub fn write(&mut self, fd: usize, buf: &[u8]) -> isize {
        if fd >= FD_COUNT {
            return -1;
        }
        let Some(pid) = self.current_pid() else {
            return -1;
        };
        let entry = self.procs.get(pid).files[fd];
        if !entry.in_use {
            return -1;
        }
        match entry.ops {
            FileOps::Stdout => self.terminal_write(buf),
            FileOps::Rtc => self.rtc.write(buf),
            // the filesystem is read-only
            FileOps::File | FileOps::Dir => -1,
            FileOps::Stdin | FileOps::Vacant => -1,
        }
    }

    /// Resolve a name and bind a free descriptor to the capability set its
    /// declared type selects.
    pub fn open(&mut self, filename: &[u8]) -> isize {
        if filename.is_empty() || filename.len() > FNAME_LEN {
            return -1;
        }
        let Some(pid) = self.current_pid() else {
            return -1;
        };
        let Some(dentry) = self.fs.resolve(filename) else {
            return -1;
        };
        let Some(fd) = (2..FD_COUNT).find(|&fd| !self.procs.get(pid).files[fd].in_use) else {
            return -1;
        };
        let entry = match dentry.file_type {
            filesys::TYPE_RTC => {
                if self.rtc.open() != 0 {
                    return -1;
                }
                FdEntry::open(FileOps::Rtc, 0)
            }
            filesys::TYPE_DIR => FdEntry::open(FileOps::Dir, 0),
            filesys::TYPE_FILE => FdEntry::open(FileOps::File, dentry.inode),
            other => {
                log::warn!("open: unknown file type {other}");
                return -1;
            }
        };
        self.procs.get_mut(pid).files[fd] = entry;
        fd as isize
    }

    pub fn close(&mut self, fd: usize) -> isize {
        if !(2..FD_COUNT).contains(&fd) {
            return -1;
        }
        let Some(pid) = self.current_pid() else {
            return -1;
        };
        self.close_fd(pid, fd)
    }

    /// Dispatcher close path, shared with process teardown.
    fn close_fd(&mut self, pid: Pid, fd: usize) -> isize {
        let entry = self.procs.get(pid).files[fd];
        if !entry.in_use {
            return -1;
        }
        if entry.ops == FileOps::Rtc {
            self.rtc.close();
        }
        self.procs.get_mut(pid).files[fd] = FdEntry::vacant();
        0
    }

    /// Copy the caller's command-line arguments; fails if there are none.
    pub fn getargs(&mut self, buf: &mut [u8]) -> isize {
        let Some(pid) = self.current_pid() else {
            return -1;
        };
        let args = self.procs.get(pid).args;
        if args.is_empty() {
            return -1;
        }
        let bytes = args.as_bytes();
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        0
    }

    /// Map the video page into user space and yield the fixed user video
    /// address. The scheduler retargets the mapping every quantum.
    pub fn vidmap(&mut self) -> isize {
        if self.current_pid().is_none() {
            return -1;
        }
        self.vmem.map_video(VideoTarget::Live);
        layout::USER_VIDEO_VIRT.as_u64() as isize
    }

    /// Signals are not supported.
    pub fn set_handler(&mut self, _signum: i32, _handler: usize) -> isize {
        -1
    }

    /// Signals are not supported.
    pub fn sigreturn(&mut self) -> isize {
        -1
    }

    fn terminal_write(&mut self, buf: &[u8]) -> isize {
        let running = self.sched.running;
        let target = if running == self.terminals.displayed {
            VideoTarget::Live
        } else {
            VideoTarget::Backing(running)
        };
        let Kernel { video, terminals, .. } = self;
        let term = terminals.term_mut(running);
        video.page_mut(target).write_bytes(&mut term.cursor, buf);
        buf.len() as isize
    }
}

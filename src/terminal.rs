//! Virtual terminal registry.
//!
//! Three terminals exist from boot and are never destroyed; only their
//! contents churn. Each owns its process chain, cursor, line buffer and
//! last-shell record. Which terminal is displayed is independent of which
//! one the scheduler is currently running.

use crate::context::{SavedContext, Transfer};
use crate::layout::{CMD_LEN, MAX_TERM_PROCS, NUM_TERMINALS};
use crate::process::Pid;
use crate::vga::Cursor;
use crate::Kernel;

/// Line-oriented keyboard input, one per terminal. The last byte is
/// reserved for the terminating newline.
#[derive(Clone, Copy)]
pub struct LineBuffer {
    buf: [u8; CMD_LEN],
    len: usize,
    ready: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            buf: [0; CMD_LEN],
            len: 0,
            ready: false,
        }
    }

    /// Append a typed byte. Refused once the line is complete or the
    /// buffer is full.
    pub fn push(&mut self, b: u8) -> bool {
        if self.ready || self.len >= CMD_LEN - 1 {
            return false;
        }
        self.buf[self.len] = b;
        self.len += 1;
        true
    }

    /// Remove the last typed byte, if any.
    pub fn backspace(&mut self) -> bool {
        if self.ready || self.len == 0 {
            return false;
        }
        self.len -= 1;
        true
    }

    /// Terminate the line with a newline and mark it complete.
    pub fn finish(&mut self) {
        if self.ready {
            return;
        }
        self.buf[self.len] = b'\n';
        self.len += 1;
        self.ready = true;
    }

    /// Hand a completed line to a reader, or nothing if input is still
    /// being typed. The blocking loop lives in the driver shim.
    pub fn take_line(&mut self, out: &mut [u8]) -> usize {
        if !self.ready {
            return 0;
        }
        let n = self.len.min(out.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.len = 0;
        self.ready = false;
        n
    }

    pub fn reset(&mut self) {
        self.len = 0;
        self.ready = false;
    }

    pub fn contents(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

pub struct Terminal {
    /// Ordered chain of processes belonging to this terminal.
    pub procs: [Option<Pid>; MAX_TERM_PROCS],
    /// The process currently designated foreground here.
    pub foreground: Option<Pid>,
    pub num_proc: u8,
    pub cursor: Cursor,
    pub input: LineBuffer,
    /// True until the terminal's first process is created.
    pub first_run: bool,
    /// Most recent shell started on this terminal.
    pub last_shell: Option<Pid>,
}

impl Terminal {
    pub const fn new() -> Self {
        Self {
            procs: [None; MAX_TERM_PROCS],
            foreground: None,
            num_proc: 0,
            cursor: Cursor { x: 0, y: 0 },
            input: LineBuffer::new(),
            first_run: true,
            last_shell: None,
        }
    }

    /// Register a process at the head (first ever) or the first vacant
    /// chain slot.
    pub fn register(&mut self, pid: Pid) {
        if self.first_run {
            self.procs[0] = Some(pid);
            self.first_run = false;
        } else if let Some(slot) = self.procs.iter_mut().find(|s| s.is_none()) {
            *slot = Some(pid);
        }
        self.num_proc += 1;
    }

    /// Vacate `pid`'s chain slot and drop the live count.
    pub fn remove(&mut self, pid: Pid) {
        if let Some(slot) = self.procs.iter_mut().find(|s| **s == Some(pid)) {
            *slot = None;
        }
        self.num_proc = self.num_proc.saturating_sub(1);
    }

    /// Occupied chain slots; always equals `num_proc`.
    pub fn occupied(&self) -> usize {
        self.procs.iter().filter(|s| s.is_some()).count()
    }
}

pub struct TerminalSet {
    terms: [Terminal; NUM_TERMINALS],
    /// The terminal owning the physical screen and keyboard focus.
    pub displayed: usize,
}

impl TerminalSet {
    pub const fn new() -> Self {
        Self {
            terms: [const { Terminal::new() }; NUM_TERMINALS],
            displayed: 0,
        }
    }

    pub fn term(&self, tid: usize) -> &Terminal {
        &self.terms[tid]
    }

    pub fn term_mut(&mut self, tid: usize) -> &mut Terminal {
        &mut self.terms[tid]
    }
}

impl Kernel<'_> {
    /// Foreground switch on a privileged key combination. Swaps screen
    /// contents and keyboard focus to `target` and resumes its foreground
    /// process. Does not advance the scheduler's running index.
    pub fn switch_foreground(&mut self, target: usize, current: SavedContext) -> Transfer {
        if target >= NUM_TERMINALS || target == self.terminals.displayed {
            return Transfer::Stay;
        }
        let displayed = self.terminals.displayed;

        // park the outgoing terminal's execution context
        if let Some(pid) = self.terminals.term(displayed).foreground {
            if self.procs.is_active(pid) {
                self.procs.get_mut(pid).ctx = current;
            }
        }

        // cursor and line buffer already live in the terminal records;
        // only the screen contents need to move
        self.video.save_to_backing(displayed);
        self.terminals.displayed = target;
        self.video.restore_from_backing(target);

        if self.terminals.term(target).first_run {
            log::debug!("terminal {target}: first display, spawning shell");
            return match self.execute_on(target, b"shell", current) {
                Ok(transfer) => transfer,
                Err(err) => {
                    log::warn!("terminal {target}: shell spawn failed: {err}");
                    Transfer::Stay
                }
            };
        }

        let Some(pid) = self.terminals.term(target).foreground else {
            return Transfer::Stay;
        };
        self.vmem.map_process(pid);
        self.tss.point_to(pid);
        Transfer::Resume {
            pid,
            ctx: self.procs.get(pid).ctx,
        }
    }
}

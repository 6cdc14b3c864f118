//! Timer-driven round robin across the virtual terminals.
//!
//! The PIT preempts whatever is running once per quantum; the interrupted
//! context arrives here and the next terminal's foreground process leaves.
//! A terminal that has never run gets its shell spawned from inside the
//! tick, which is how every terminal lazily comes to life. The switch is
//! invisible to the preempted code.

use crate::context::{InterruptController, SavedContext, Transfer, TIMER_IRQ};
use crate::layout::NUM_TERMINALS;
use crate::paging::VideoTarget;
use crate::Kernel;

/// Quantum rate the external PIT driver is expected to program.
pub const QUANTUM_HZ: u32 = 100;

pub struct Scheduler {
    /// Index of the terminal owning the CPU this quantum. Distinct from
    /// the displayed terminal.
    pub running: usize,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self { running: 1 }
    }

    pub fn advance(&mut self) -> usize {
        self.running = (self.running + 1) % NUM_TERMINALS;
        self.running
    }
}

impl Kernel<'_> {
    /// Timer interrupt entry point. `current` is the context the timer
    /// interrupted. The interrupt is acknowledged before any transfer that
    /// abandons the interrupted context.
    pub fn timer_tick(
        &mut self,
        current: SavedContext,
        pic: &mut dyn InterruptController,
    ) -> Transfer {
        let running = self.sched.running;

        // park the interrupted process; an unpopulated terminal instead
        // takes its first activation now
        let foreground = self.terminals.term(running).foreground;
        match foreground {
            Some(pid) => {
                let pcb = self.procs.get_mut(pid);
                pcb.ctx = current;
                pcb.sched_enabled = true;
            }
            None => return self.activate_terminal(running, current, pic),
        }

        let next = self.sched.advance();
        let Some(pid) = self.terminals.term(next).foreground else {
            // nothing to run there yet; wait for its activation tick
            pic.end_of_interrupt(TIMER_IRQ);
            return Transfer::Stay;
        };

        // background terminals render into their own page
        let target = if next == self.terminals.displayed {
            VideoTarget::Live
        } else {
            VideoTarget::Backing(next)
        };
        self.vmem.map_video(target);
        self.vmem.map_process(pid);
        self.tss.point_to(pid);

        // the PIC must see the acknowledgment before the jump below, which
        // never returns through normal means
        pic.end_of_interrupt(TIMER_IRQ);
        Transfer::Resume {
            pid,
            ctx: self.procs.get(pid).ctx,
        }
    }

    /// First activation of a terminal: spawn its shell synchronously from
    /// the tick, with the interrupted context standing in as the shell's
    /// parent context.
    fn activate_terminal(
        &mut self,
        tid: usize,
        current: SavedContext,
        pic: &mut dyn InterruptController,
    ) -> Transfer {
        pic.end_of_interrupt(TIMER_IRQ);
        log::debug!("terminal {tid}: first activation, spawning shell");
        match self.execute_on(tid, b"shell", current) {
            Ok(transfer) => transfer,
            Err(err) => {
                log::warn!("terminal {tid}: shell spawn failed: {err}");
                Transfer::Stay
            }
        }
    }
}

//! Execution contexts and control transfers.
//!
//! The interrupt and syscall shims capture the interrupted stack/frame
//! pointer pair on entry and hand it to the core; every core entry point
//! resolves to a [`Transfer`] telling the shim which one-way jump to perform.
//! The core never touches registers itself.

use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;
use x86_64::VirtAddr;

use crate::layout;
use crate::process::Pid;

/// Kernel data segment selector (GDT index 3, ring 0).
pub const KERNEL_DS: SegmentSelector = SegmentSelector::new(3, PrivilegeLevel::Ring0);

pub const TIMER_IRQ: u8 = 0;
pub const KEYBOARD_IRQ: u8 = 1;
pub const RTC_IRQ: u8 = 8;

/// A suspended execution context: the stack and frame pointers saved when a
/// process was preempted, or when a parent entered `execute`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SavedContext {
    pub sp: usize,
    pub fp: usize,
}

impl SavedContext {
    pub const fn empty() -> Self {
        Self { sp: 0, fp: 0 }
    }
}

/// The one-way control transfer a core entry point resolved to. The shim
/// executes it after the core returns; none of these come back through the
/// normal call mechanism.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transfer {
    /// Drop to user mode at `entry` for a newly created process.
    EnterUser { pid: Pid, entry: VirtAddr },
    /// Reload a context saved at an earlier preemption.
    Resume { pid: Pid, ctx: SavedContext },
    /// Unwind to the parent's saved call site, yielding `status` as the
    /// value of its `execute` call.
    ReturnToParent { ctx: SavedContext, status: i32 },
    /// Keep executing the interrupted context.
    Stay,
}

/// Mirror of the privileged task-state fields consulted on privilege
/// transitions. The shim copies these into the hardware TSS whenever they
/// change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskState {
    pub ss0: SegmentSelector,
    pub esp0: VirtAddr,
}

impl TaskState {
    pub const fn new() -> Self {
        Self {
            ss0: KERNEL_DS,
            esp0: VirtAddr::zero(),
        }
    }

    /// Point the kernel stack at process `pid`'s stack page.
    pub fn point_to(&mut self, pid: Pid) {
        self.ss0 = KERNEL_DS;
        self.esp0 = layout::kernel_stack_top(pid);
    }
}

/// Acknowledgment interface of the interrupt controller driver. The core
/// must acknowledge every interrupt before resolving to a transfer that
/// never returns.
pub trait InterruptController {
    fn end_of_interrupt(&mut self, irq: u8);
}

/// Processor exceptions that terminate the faulting process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exception {
    DivideError,
    InvalidOpcode,
    DeviceNotAvailable,
    DoubleFault,
    InvalidTss,
    SegmentNotPresent,
    StackFault,
    GeneralProtection,
    PageFault,
    FloatingPoint,
    AlignmentCheck,
    MachineCheck,
    SimdFloatingPoint,
}

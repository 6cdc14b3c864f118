//! triton: the process and memory core of a small protected-mode kernel.
//!
//! Six fixed process slots, three virtual terminals, round-robin time
//! slicing, one shared page directory remapped before every dispatch.
//! Boot glue, the IDT and the device ISRs live outside this crate and
//! drive it through [`Kernel`]'s entry points: `timer_tick`, `key_event`,
//! `rtc_event`, `fault` and the syscall surface.

#![cfg_attr(not(test), no_std)]

pub mod context;
pub mod filesys;
pub mod kb;
pub mod layout;
pub mod logger;
pub mod paging;
pub mod process;
pub mod rtc;
pub mod scheduler;
pub mod syscall;
pub mod terminal;
pub mod vga;

use spin::Mutex;

pub use context::{Exception, InterruptController, SavedContext, TaskState, Transfer};
pub use process::Pid;
pub use syscall::{ExecError, HaltError};

/// The whole kernel state, owned in one place and passed by reference into
/// every core operation. Interrupt handlers reach it through [`KERNEL`].
pub struct Kernel<'img> {
    pub procs: process::ProcessTable,
    pub terminals: terminal::TerminalSet,
    pub vmem: paging::AddressSpace,
    pub video: vga::VideoMem,
    pub tss: context::TaskState,
    pub sched: scheduler::Scheduler,
    pub fs: filesys::Filesys<'img>,
    pub rtc: rtc::Rtc,
    pub kb: kb::Kb,
    pub(crate) fault_pending: bool,
}

impl<'img> Kernel<'img> {
    /// Boot-time initialization: parse the filesystem image, lay out the
    /// page tables, reset the terminal registry. This is the only
    /// initialization path; nothing re-initializes implicitly.
    pub fn new(fs_image: &'img [u8]) -> Result<Self, filesys::FsError> {
        Ok(Self {
            procs: process::ProcessTable::new(),
            terminals: terminal::TerminalSet::new(),
            vmem: paging::AddressSpace::new(),
            video: vga::VideoMem::new(),
            tss: context::TaskState::new(),
            sched: scheduler::Scheduler::new(),
            fs: filesys::Filesys::new(fs_image)?,
            rtc: rtc::Rtc::new(),
            kb: kb::Kb::new(),
            fault_pending: false,
        })
    }
}

/// The interrupt shim's handle on the kernel. Empty until [`boot`] runs.
pub static KERNEL: Mutex<Option<Kernel<'static>>> = Mutex::new(None);

/// Bring the core up against the boot filesystem image.
pub fn boot(fs_image: &'static [u8]) -> Result<(), filesys::FsError> {
    logger::init();
    let kernel = Kernel::new(fs_image)?;
    log::debug!("boot: core initialized");
    *KERNEL.lock() = Some(kernel);
    Ok(())
}

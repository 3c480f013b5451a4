//! Process model
//!
//! The process control block and its arena. PCBs are owned by a fixed
//! [`table::ProcessTable`]; the scheduler ring and the wait queues
//! refer to processes by arena slot, never by pointer, so queue
//! membership and ownership cannot disagree.

pub mod queue;
pub mod table;

pub use queue::{WaitQueue, QUEUE_CAPACITY};
pub use table::{ProcessTable, Slot, MAX_PROCESSES, PROCESS_TABLE};

use crate::arch::context::CpuContext;
use crate::arch::{INITIAL_EFLAGS, USER_CODE_SELECTOR, USER_DATA_SELECTOR};
use crate::mm::paging::UserLayout;
use crate::mm::AddressSpace;

/// Process identifier, unique over the lifetime of the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Created, program image not yet loaded from disk
    New,
    /// Runnable, waiting for a quantum
    Ready,
    /// Currently on the CPU
    Running,
    /// Blocked: sleeping or queued on a synchronization object
    Waiting,
    /// Dead, waiting for the scheduler to reap it
    Terminated,
}

impl ProcessState {
    /// One-letter form used by the `ps` command
    pub fn letter(&self) -> char {
        match self {
            ProcessState::New => 'N',
            ProcessState::Ready => 'Q',
            ProcessState::Running => 'R',
            ProcessState::Waiting => 'W',
            ProcessState::Terminated => 'T',
        }
    }
}

/// Virtual-memory descriptor of a process
#[derive(Debug, Clone, Copy)]
pub struct MemoryDescriptor {
    pub start_code: u32,
    pub end_code: u32,
    pub start_brk: u32,
    pub brk: u32,
    pub start_stack: u32,
    pub space: AddressSpace,
}

impl MemoryDescriptor {
    pub fn new(space: AddressSpace, layout: UserLayout) -> Self {
        Self {
            start_code: layout.start_code.as_u32(),
            end_code: layout.end_code.as_u32(),
            start_brk: layout.start_brk.as_u32(),
            brk: layout.brk.as_u32(),
            start_stack: layout.start_stack.as_u32(),
            space,
        }
    }
}

/// Where the program image lives on disk; used to lazy-load on first
/// schedule and echoed in fault diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct DiskImage {
    pub lba: u32,
    pub n_sectors: u32,
}

/// Bookkeeping for a blocked lock/semaphore caller: the object's key
/// and the caller's slot inside its wait queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitOn {
    pub key: Option<u8>,
    pub queue_index: usize,
}

/// A process's shared-memory attachment (at most one at a time)
#[derive(Debug, Clone, Copy, Default)]
pub struct ShmAttachment {
    pub attached: bool,
    pub key: u8,
}

/// Intrusive ready-ring links (arena slots)
#[derive(Debug, Clone, Copy, Default)]
pub struct RingLink {
    pub prev: Slot,
    pub next: Slot,
}

/// Process control block
#[derive(Debug, Clone, Copy)]
pub struct Process {
    pub pid: Pid,
    pub state: ProcessState,
    pub cpu: CpuContext,
    pub mem: MemoryDescriptor,
    pub disk: DiskImage,
    /// Wake-up epoch of a sleeping process; zero when not sleeping
    pub sleep_end: u32,
    pub mutex_wait: WaitOn,
    pub sem_wait: WaitOn,
    pub shm: ShmAttachment,
    pub(crate) link: RingLink,
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::mm::paging::UserLayout;
    use crate::mm::{AddressSpace, FrameNumber, VirtAddr};

    /// A process skeleton that never touches real memory; enough for
    /// arena and scheduling tests.
    pub(crate) fn dummy_process(table: &mut ProcessTable) -> Process {
        let layout = UserLayout {
            start_code: VirtAddr::new(0),
            end_code: VirtAddr::new(0x1000),
            start_brk: VirtAddr::new(0x1000),
            brk: VirtAddr::new(0x1000),
            start_stack: VirtAddr::new(0xBFFF_FFF0),
        };
        let space = AddressSpace::from_pd_frame(FrameNumber::new(0));
        let mem = MemoryDescriptor::new(space, layout);
        let pid = table.alloc_pid();
        Process::new(pid, mem, DiskImage { lba: 0, n_sectors: 1 })
    }
}

impl Process {
    /// A freshly created background process: entry point at the start
    /// of its code, stack just below the kernel base, user-mode
    /// selectors, interrupts enabled on first dispatch.
    pub fn new(pid: Pid, mem: MemoryDescriptor, disk: DiskImage) -> Self {
        let cpu = CpuContext {
            ss: USER_DATA_SELECTOR,
            cs: USER_CODE_SELECTOR,
            esp: mem.start_stack,
            eip: mem.start_code,
            eflags: INITIAL_EFLAGS,
            ..CpuContext::default()
        };
        Self {
            pid,
            state: ProcessState::New,
            cpu,
            mem,
            disk,
            sleep_end: 0,
            mutex_wait: WaitOn::default(),
            sem_wait: WaitOn::default(),
            shm: ShmAttachment::default(),
            link: RingLink::default(),
        }
    }
}

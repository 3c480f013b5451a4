//! Shared fixture for the kernel integration tests
//!
//! Stands the whole kernel core up on the host: a heap-backed
//! physical window, real frame allocator and paging, the scheduler,
//! the synchronization tables, and mock collaborators for the disk,
//! display and keyboard. Tests drive it the way the trap gateway
//! does: spawn, schedule, syscall.

#![allow(dead_code)]

use sos_kernel::drivers::disk::testing::ImageDisk;
use sos_kernel::drivers::disk::SECTOR_SIZE;
use sos_kernel::drivers::display::testing::CaptureDisplay;
use sos_kernel::drivers::keyboard::testing::ScriptedKeys;
use sos_kernel::ipc::{MutexTable, SemaphoreTable, ShmTable};
use sos_kernel::mm::paging::init_kernel_pages;
use sos_kernel::mm::phys::FrameAllocator;
use sos_kernel::mm::{PhysMap, FRAME_SIZE};
use sos_kernel::process::{ProcessTable, Slot};
use sos_kernel::sched::{Decision, SchedEnv, Scheduler};
use sos_kernel::syscall::{self, ServiceContext};
use sos_kernel::console::{self, ShellEnv, ShellOutcome};
use sos_kernel::{Pid, ProcessState};

/// 16 MiB of simulated RAM
pub const TEST_FRAMES: u32 = 4096;

pub struct Kernel {
    pub table: ProcessTable,
    pub sched: Scheduler,
    pub frames: FrameAllocator,
    pub phys: PhysMap,
    pub disk: ImageDisk,
    pub display: CaptureDisplay,
    pub keys: ScriptedKeys,
    pub mutexes: MutexTable,
    pub semaphores: SemaphoreTable,
    pub shm: ShmTable,
    /// Epoch counter the tests advance by hand
    pub now: u32,
}

impl Kernel {
    pub fn boot(disk: ImageDisk) -> Self {
        let mut frames = FrameAllocator::empty();
        frames.init(TEST_FRAMES * FRAME_SIZE);
        let phys = PhysMap::host_backed(TEST_FRAMES);
        init_kernel_pages(&phys);

        Self {
            table: ProcessTable::new(),
            sched: Scheduler::new(),
            frames,
            phys,
            disk,
            display: CaptureDisplay::new(),
            keys: ScriptedKeys::new(&[]),
            mutexes: MutexTable::new(),
            semaphores: SemaphoreTable::new(),
            shm: ShmTable::new(),
            now: 0,
        }
    }

    /// A kernel with a patterned 64-sector disk
    pub fn boot_default() -> Self {
        Self::boot(ImageDisk::patterned(64))
    }

    /// A disk whose sectors each hold one repeated marker byte
    pub fn marker_disk(sectors: u32) -> ImageDisk {
        let mut image = Vec::with_capacity(sectors as usize * SECTOR_SIZE);
        for s in 0..sectors {
            image.extend(core::iter::repeat(0xB0u8 + (s % 16) as u8).take(SECTOR_SIZE));
        }
        ImageDisk::new(image)
    }

    /// `run <lba> <count>` without the console: create and queue
    pub fn spawn(&mut self, lba: u32, n_sectors: u32) -> Pid {
        self.sched
            .spawn_program(lba, n_sectors, &mut self.table, &mut self.frames, &self.phys)
            .expect("spawn")
    }

    pub fn slot_of(&self, pid: Pid) -> Slot {
        self.table
            .iter()
            .find(|(_, p)| p.pid == pid)
            .map(|(s, _)| s)
            .expect("pid in arena")
    }

    /// One scheduling decision at the current epoch
    pub fn schedule(&mut self) -> Decision {
        let mut env = SchedEnv {
            frames: &mut self.frames,
            phys: &self.phys,
            disk: &mut self.disk,
            display: &mut self.display,
            now_epochs: self.now,
        };
        self.sched.schedule(&mut self.table, &mut env)
    }

    /// Schedule, asserting a user process is picked; returns its slot.
    pub fn schedule_user(&mut self) -> Slot {
        match self.schedule() {
            Decision::Run(slot) => slot,
            Decision::Console => panic!("expected a user process to be picked"),
        }
    }

    /// Simulate the timer ending the current quantum: the running
    /// process goes READY and the console takes its turn.
    pub fn tick_to_console(&mut self) {
        if let sos_kernel::sched::Current::User(slot) = self.sched.current {
            if let Some(p) = self.table.get_mut(slot) {
                if p.state == ProcessState::Running {
                    p.state = ProcessState::Ready;
                }
            }
        }
        assert_eq!(self.schedule(), Decision::Console);
    }

    /// Issue syscall `eax` from the process in `slot` (as the 0x94
    /// gate would) and return the value it left in `edx`.
    pub fn syscall(&mut self, slot: Slot, eax: u32, ebx: u32, ecx: u32) -> u32 {
        {
            let p = self.table.get_mut(slot).expect("caller alive");
            p.cpu.eax = eax;
            p.cpu.ebx = ebx;
            p.cpu.ecx = ecx;
        }
        let mut ctx = ServiceContext {
            table: &mut self.table,
            current: slot,
            frames: &mut self.frames,
            phys: &self.phys,
            mutexes: &mut self.mutexes,
            semaphores: &mut self.semaphores,
            shm: &mut self.shm,
            display: &mut self.display,
            keys: &mut self.keys,
            now_epochs: self.now,
        };
        syscall::execute(&mut ctx);
        self.table.get(slot).expect("caller alive").cpu.edx
    }

    pub fn state_of(&self, slot: Slot) -> ProcessState {
        self.table.get(slot).expect("alive").state
    }

    /// Run one console command line
    pub fn run_command(&mut self, line: &str) -> ShellOutcome {
        let mut env = ShellEnv {
            disk: &mut self.disk,
            display: &mut self.display,
            table: &mut self.table,
            sched: &mut self.sched,
            frames: &mut self.frames,
            phys: &self.phys,
            uptime_ms: self.now * 10,
        };
        console::process_command(line, &mut env)
    }
}

/// Syscall numbers, spelled out the way user programs use them
pub mod nr {
    pub const GETC: u32 = 1;
    pub const PRINTF: u32 = 2;
    pub const SLEEP: u32 = 3;
    pub const MUTEX_CREATE: u32 = 4;
    pub const MUTEX_DESTROY: u32 = 5;
    pub const MUTEX_LOCK: u32 = 6;
    pub const MUTEX_UNLOCK: u32 = 7;
    pub const SEM_CREATE: u32 = 8;
    pub const SEM_DESTROY: u32 = 9;
    pub const SEM_UP: u32 = 10;
    pub const SEM_DOWN: u32 = 11;
    pub const SHM_CREATE: u32 = 12;
    pub const SHM_ATTACH: u32 = 13;
    pub const SHM_DETACH: u32 = 14;
}

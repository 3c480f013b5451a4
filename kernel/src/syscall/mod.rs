//! System-call interface
//!
//! Trap vector 0x94 carries every kernel service; the number rides in
//! `eax`, arguments in `ebx`/`ecx`, and the return value is written
//! back to the caller's saved `edx`. Dispatch is an exhaustive match
//! over [`Syscall`]; unknown numbers return 0 and do nothing else.
//!
//! Entry marks the caller WAITING; each service body re-readies it
//! unless it genuinely blocked (lock contention, semaphore at zero,
//! sleep), in which case only the corresponding wake-up path may make
//! it READY again.

pub mod printf;
mod services;

use crate::drivers::display::TextDisplay;
use crate::drivers::keyboard::KeySource;
use crate::ipc::{MutexTable, SemaphoreTable, ShmTable};
use crate::mm::phys::FrameAllocator;
use crate::mm::PhysMap;
use crate::process::{ProcessState, ProcessTable, Slot};

/// Kernel service numbers (the value of `eax` at `int 0x94`)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Getc = 1,
    Printf = 2,
    Sleep = 3,
    MutexCreate = 4,
    MutexDestroy = 5,
    MutexLock = 6,
    MutexUnlock = 7,
    SemCreate = 8,
    SemDestroy = 9,
    SemUp = 10,
    SemDown = 11,
    ShmCreate = 12,
    ShmAttach = 13,
    ShmDetach = 14,
}

impl TryFrom<u32> for Syscall {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Syscall::Getc),
            2 => Ok(Syscall::Printf),
            3 => Ok(Syscall::Sleep),
            4 => Ok(Syscall::MutexCreate),
            5 => Ok(Syscall::MutexDestroy),
            6 => Ok(Syscall::MutexLock),
            7 => Ok(Syscall::MutexUnlock),
            8 => Ok(Syscall::SemCreate),
            9 => Ok(Syscall::SemDestroy),
            10 => Ok(Syscall::SemUp),
            11 => Ok(Syscall::SemDown),
            12 => Ok(Syscall::ShmCreate),
            13 => Ok(Syscall::ShmAttach),
            14 => Ok(Syscall::ShmDetach),
            _ => Err(()),
        }
    }
}

/// Everything a service body may touch, borrowed for the duration of
/// one syscall. The trap gateway builds this from the kernel
/// singletons; tests build it from fixtures.
pub struct ServiceContext<'a> {
    pub table: &'a mut ProcessTable,
    /// Arena slot of the calling process
    pub current: Slot,
    pub frames: &'a mut FrameAllocator,
    pub phys: &'a PhysMap,
    pub mutexes: &'a mut MutexTable,
    pub semaphores: &'a mut SemaphoreTable,
    pub shm: &'a mut ShmTable,
    pub display: &'a mut dyn TextDisplay,
    pub keys: &'a mut dyn KeySource,
    pub now_epochs: u32,
}

/// Handle the 0x94 trap for the process in `ctx.current`, whose
/// context has already been saved into its PCB.
pub fn execute(ctx: &mut ServiceContext<'_>) {
    let caller = ctx.table.get_mut(ctx.current).expect("caller alive");
    caller.state = ProcessState::Waiting;
    let number = caller.cpu.eax;

    match Syscall::try_from(number) {
        Ok(Syscall::Getc) => services::sys_getc(ctx),
        Ok(Syscall::Printf) => services::sys_printf(ctx),
        Ok(Syscall::Sleep) => services::sys_sleep(ctx),
        Ok(Syscall::MutexCreate) => services::sys_mutex_create(ctx),
        Ok(Syscall::MutexDestroy) => services::sys_mutex_destroy(ctx),
        Ok(Syscall::MutexLock) => services::sys_mutex_lock(ctx),
        Ok(Syscall::MutexUnlock) => services::sys_mutex_unlock(ctx),
        Ok(Syscall::SemCreate) => services::sys_semaphore_create(ctx),
        Ok(Syscall::SemDestroy) => services::sys_semaphore_destroy(ctx),
        Ok(Syscall::SemUp) => services::sys_semaphore_up(ctx),
        Ok(Syscall::SemDown) => services::sys_semaphore_down(ctx),
        Ok(Syscall::ShmCreate) => services::sys_shm_create(ctx),
        Ok(Syscall::ShmAttach) => services::sys_shm_attach(ctx),
        Ok(Syscall::ShmDetach) => services::sys_shm_detach(ctx),
        Err(()) => {
            let caller = ctx.table.get_mut(ctx.current).expect("caller alive");
            caller.cpu.edx = 0;
            caller.state = ProcessState::Ready;
        }
    }
}

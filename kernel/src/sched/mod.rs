//! Round-robin scheduler with console priority
//!
//! The console (kernel mode, PID 0) and the user ring strictly
//! alternate: after any user quantum the console runs, and when the
//! console is interrupted the ring is scanned exactly once for the
//! next READY process. The scan is also where TERMINATED processes
//! are reaped, expired sleepers woken, and NEW processes get their
//! program image pulled from disk (lazy first-schedule load).
//!
//! Picking is separated from dispatching: [`Scheduler::schedule`]
//! computes a [`Decision`], and the boot target's dispatcher performs
//! the actual ring transition, which does not return.

pub mod ring;

pub use ring::ReadyRing;

use spin::Mutex;

use crate::arch::context::CpuContext;
use crate::drivers::disk::{Disk, SECTOR_SIZE};
use crate::drivers::display::{Out, TextDisplay};
use crate::error::KernelError;
use crate::mm::paging::init_logical_memory;
use crate::mm::phys::FrameAllocator;
use crate::mm::{user, PhysMap};
use crate::process::{
    DiskImage, MemoryDescriptor, Pid, Process, ProcessState, ProcessTable, Slot,
};

/// What the scheduler decided to run next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Resume the console from its saved context
    Console,
    /// Ring-transition into this user process
    Run(Slot),
}

/// Who owns the CPU right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Current {
    Console,
    User(Slot),
}

/// Collaborators the scheduler needs while scanning: the frame
/// allocator and window for reaping, the disk for lazy loads, the
/// display for load diagnostics, and the clock for waking sleepers.
pub struct SchedEnv<'a> {
    pub frames: &'a mut FrameAllocator,
    pub phys: &'a PhysMap,
    pub disk: &'a mut dyn Disk,
    pub display: &'a mut dyn TextDisplay,
    pub now_epochs: u32,
}

/// Scheduler state: the console pseudo-process and the user ring
pub struct Scheduler {
    /// Saved register file of the console (kernel-to-kernel resume)
    pub console_cpu: CpuContext,
    pub console_state: ProcessState,
    pub current: Current,
    pub ring: ReadyRing,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            console_cpu: CpuContext::zeroed(),
            console_state: ProcessState::Running,
            current: Current::Console,
            ring: ReadyRing::new(),
        }
    }

    /// Create a process for the program stored at `lba` and queue it
    /// behind the cursor. The image itself is loaded on first
    /// schedule.
    pub fn spawn_program(
        &mut self,
        lba: u32,
        n_sectors: u32,
        table: &mut ProcessTable,
        frames: &mut FrameAllocator,
        phys: &PhysMap,
    ) -> Result<Pid, KernelError> {
        let code_size = n_sectors
            .checked_mul(SECTOR_SIZE as u32)
            .ok_or(KernelError::BadSize { size: n_sectors })?;
        if code_size == 0 {
            return Err(KernelError::BadSize { size: 0 });
        }

        let (space, layout) = init_logical_memory(code_size, frames, phys)?;
        let pid = table.alloc_pid();
        let process = Process::new(
            pid,
            MemoryDescriptor::new(space, layout),
            DiskImage { lba, n_sectors },
        );

        let slot = match table.insert(process) {
            Ok(slot) => slot,
            Err(e) => {
                space.destroy(frames, phys);
                return Err(e);
            }
        };
        self.ring.insert(table, slot);
        log::info!("spawned pid {} from ({}, {})", pid, lba, n_sectors);
        Ok(pid)
    }

    /// The scheduling state machine. Called from the trap gateway with
    /// interrupts disabled; the returned decision is handed to the
    /// dispatcher.
    pub fn schedule(&mut self, table: &mut ProcessTable, env: &mut SchedEnv<'_>) -> Decision {
        // An empty ring, or any interrupt out of a user quantum,
        // hands the CPU back to the console.
        if self.ring.is_empty() || matches!(self.current, Current::User(_)) {
            return self.resume_console();
        }

        // The console was interrupted: scan the ring exactly once.
        let mut steps = self.ring.len(table);
        while steps > 0 {
            let Some(slot) = self.ring.cursor() else {
                break;
            };
            let state = table.get(slot).expect("ring member alive").state;
            match state {
                ProcessState::Terminated => {
                    self.reap(table, env, slot);
                    steps -= 1;
                }
                ProcessState::New => {
                    // Lazy load; a loadable process becomes READY and
                    // is picked on the next loop iteration.
                    let p = table.get_mut(slot).expect("ring member alive");
                    match load_image(p, env.phys, env.disk) {
                        Ok(()) => p.state = ProcessState::Ready,
                        Err(_) => {
                            use core::fmt::Write;
                            let (lba, n) = (p.disk.lba, p.disk.n_sectors);
                            p.state = ProcessState::Terminated;
                            let _ = writeln!(
                                Out(env.display),
                                "run: Load error ({},{}).",
                                lba,
                                n
                            );
                        }
                    }
                }
                ProcessState::Waiting => {
                    let p = table.get_mut(slot).expect("ring member alive");
                    if p.sleep_end != 0 && env.now_epochs >= p.sleep_end {
                        p.state = ProcessState::Ready;
                        p.sleep_end = 0;
                        // Picked on the next loop iteration
                    } else {
                        self.ring.advance(table);
                        steps -= 1;
                    }
                }
                ProcessState::Ready => {
                    let p = table.get_mut(slot).expect("ring member alive");
                    p.state = ProcessState::Running;
                    if self.console_state == ProcessState::Running {
                        self.console_state = ProcessState::Ready;
                    }
                    self.current = Current::User(slot);
                    self.ring.advance(table);
                    return Decision::Run(slot);
                }
                ProcessState::Running => {
                    // Cannot happen while the console is current
                    self.ring.advance(table);
                    steps -= 1;
                }
            }
        }

        self.resume_console()
    }

    fn resume_console(&mut self) -> Decision {
        self.console_state = ProcessState::Running;
        self.current = Current::Console;
        Decision::Console
    }

    /// Reap a terminated ring member: unlink it, free every frame it
    /// owned, release its PCB slot.
    fn reap(&mut self, table: &mut ProcessTable, env: &mut SchedEnv<'_>, slot: Slot) {
        self.ring.remove(table, slot);
        let p = table.remove(slot).expect("reaping a live slot");
        p.mem.space.destroy(env.frames, env.phys);
        log::info!("reaped pid {}", p.pid);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull a process's program image from disk into its freshly mapped
/// code pages, one page-sized batch at a time, writing through the
/// process's own address space.
fn load_image(p: &Process, phys: &PhysMap, disk: &mut dyn Disk) -> Result<(), KernelError> {
    const BATCH_SECTORS: u32 = (4096 / SECTOR_SIZE) as u32;

    let mut lba = p.disk.lba;
    let mut remaining = p.disk.n_sectors;
    let mut va = p.mem.start_code;
    let mut buf = [0u8; 4096];

    while remaining > 0 {
        let batch = remaining.min(BATCH_SECTORS);
        let bytes = batch as usize * SECTOR_SIZE;
        disk.read(lba, batch as u8, &mut buf[..bytes])?;
        user::copy_to_user(&p.mem.space, phys, va, &buf[..bytes])?;
        remaining -= batch;
        lba += batch;
        va += bytes as u32;
    }
    Ok(())
}

/// Global scheduler instance
pub static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());

/// Perform the ring transition the decision calls for. Interrupts are
/// re-enabled by the `iret` path; this never returns.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn dispatch(decision: Decision) -> ! {
    match decision {
        Decision::Console => {
            let ctx = SCHEDULER.lock().console_cpu;
            // SAFETY: the console context is only ever written by
            // save_context at a ring-0 trap boundary.
            unsafe { crate::arch::x86::switch::switch_to_kernel_process(&ctx) }
        }
        Decision::Run(slot) => {
            let (ctx, pd) = {
                let table = crate::process::PROCESS_TABLE.lock();
                let p = table.get(slot).expect("dispatching a live process");
                (p.cpu, p.mem.space.pd_frame())
            };
            // SAFETY: the PCB context is a ring-3 capture (or the
            // initial image the spawner built) and its directory
            // shares the kernel half.
            unsafe { crate::arch::x86::switch::switch_to_user_process(&ctx, pd) }
        }
    }
}

/// Host builds never dispatch; tests inspect [`Decision`]s instead.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn dispatch(_decision: Decision) -> ! {
    panic!("ring transitions require the boot target");
}

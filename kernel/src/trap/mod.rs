//! Trap gateway
//!
//! Five sources funnel through here: the timer tick, the kernel
//! service call (0x94), user termination (0xFF), the default
//! exception handler for vectors 0..31, and the page fault. Interrupt
//! gates keep interrupts disabled from entry until the dispatcher's
//! `iret`; nothing in a trap body may nest.
//!
//! The portable pieces (termination cleanup and the fault banners)
//! live here and are unit tested; the interrupt-service routines that
//! stitch them to the hardware are compiled for the boot target only
//! (see [`isr`]).

use core::fmt::Write;

use crate::drivers::display::{puts, Color, Out, TextDisplay};
use crate::ipc::{self, MutexTable, SemaphoreTable, ShmTable};
use crate::mm::phys::FrameAllocator;
use crate::mm::PhysMap;
use crate::process::{Pid, ProcessState, ProcessTable, Slot};

/// Mark the process dead and reclaim its synchronization holdings.
/// Frames and the PCB slot stay put until the scheduler's next scan
/// reaps them.
#[allow(clippy::too_many_arguments)]
pub fn terminate_process(
    slot: Slot,
    table: &mut ProcessTable,
    mutexes: &mut MutexTable,
    semaphores: &mut SemaphoreTable,
    shm: &mut ShmTable,
    frames: &mut FrameAllocator,
    phys: &PhysMap,
) {
    // Cleanup reads the PCB's wait bookkeeping, so it runs before
    // anything else touches the process.
    ipc::cleanup_process(slot, table, mutexes, semaphores, shm, frames, phys);
    if let Some(p) = table.get_mut(slot) {
        p.state = ProcessState::Terminated;
        log::info!("terminated pid {}", p.pid);
    }
}

/// The red fatal banner every unhandled exception prints.
pub fn fatal_banner(display: &mut dyn TextDisplay) {
    puts(display, "\n");
    display.set_color(Color::White, Color::Red);
    puts(display, " OUCHH! Fatal exception. ");
    display.set_color(Color::LightGray, Color::Black);
    puts(display, "\n");
}

/// Diagnostics for a user page fault: who, which image, where.
pub fn page_fault_report(
    display: &mut dyn TextDisplay,
    pid: Pid,
    lba: u32,
    n_sectors: u32,
    fault_addr: u32,
) {
    let _ = writeln!(
        Out(display),
        "\nPage fault: {} ({},{}) @ {:#X}.",
        pid,
        lba,
        n_sectors,
        fault_addr
    );
}

/// Banner for the unrecoverable case: the fault happened while the
/// console itself was running.
pub fn kernel_page_fault_report(display: &mut dyn TextDisplay, fault_addr: u32) {
    let _ = writeln!(
        Out(display),
        "\nKernel page fault @ {:#X}...SYSTEM HALTED!!",
        fault_addr
    );
}

/// Interrupt-service routines for the boot target. Each is entered
/// from an assembly stub (see `arch::x86::idt`) with a pointer to the
/// trap frame, runs with interrupts disabled, and ends in a dispatch
/// that does not return.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod isr {
    use super::*;
    use crate::arch::context::{ring_of, save_context, Ring, TrapFrame};
    use crate::arch::x86;
    use crate::mm::physmap::phys_map;
    use crate::mm::FRAME_ALLOCATOR;
    use crate::process::PROCESS_TABLE;
    use crate::sched::{Current, Decision, SchedEnv, SCHEDULER};
    use crate::syscall::ServiceContext;
    use crate::time;

    /// Run the scheduler against the kernel singletons and perform
    /// the resulting ring transition.
    fn schedule_and_dispatch(now_epochs: u32) -> ! {
        let decision = {
            let mut sched = SCHEDULER.lock();
            let mut table = PROCESS_TABLE.lock();
            let mut frames = FRAME_ALLOCATOR.lock();
            let mut disk = x86::disk().lock();
            let mut display = x86::vga().lock();
            let mut env = SchedEnv {
                frames: &mut frames,
                phys: phys_map(),
                disk: &mut *disk,
                display: &mut *display,
                now_epochs,
            };
            sched.schedule(&mut table, &mut env)
        };
        crate::sched::dispatch(decision)
    }

    /// Save the interrupted flow into whoever was current.
    fn save_current(frame: &TrapFrame) {
        let mut sched = SCHEDULER.lock();
        match sched.current {
            Current::Console => {
                save_context(&mut sched.console_cpu, frame, Ring::Kernel);
            }
            Current::User(slot) => {
                let mut table = PROCESS_TABLE.lock();
                let p = table.get_mut(slot).expect("current process alive");
                save_context(&mut p.cpu, frame, ring_of(frame));
            }
        }
    }

    /// Timer (IRQ0): quantum boundary.
    #[no_mangle]
    pub extern "C" fn timer_interrupt_handler(frame: &mut TrapFrame) -> ! {
        let now = time::tick();
        save_current(frame);

        {
            let mut sched = SCHEDULER.lock();
            match sched.current {
                Current::Console => {
                    if sched.console_state == ProcessState::Running {
                        sched.console_state = ProcessState::Ready;
                    }
                }
                Current::User(slot) => {
                    let mut table = PROCESS_TABLE.lock();
                    let p = table.get_mut(slot).expect("current process alive");
                    if p.state == ProcessState::Running {
                        p.state = ProcessState::Ready;
                    }
                }
            }
        }

        if let Some(mut vga) = x86::vga().try_lock() {
            vga.update_clock(time::uptime_ms());
        }
        x86::pic::end_of_interrupt(0);
        schedule_and_dispatch(now)
    }

    /// Syscall 0x94: kernel service. Only user processes reach this
    /// gate; the console calls kernel functions directly.
    #[no_mangle]
    pub extern "C" fn syscall_0x94_handler(frame: &mut TrapFrame) -> ! {
        save_current(frame);

        let current = SCHEDULER.lock().current;
        if let Current::User(slot) = current {
            let mut table = PROCESS_TABLE.lock();
            let mut frames = FRAME_ALLOCATOR.lock();
            let mut mutexes = crate::ipc::MUTEXES.lock();
            let mut semaphores = crate::ipc::SEMAPHORES.lock();
            let mut shm = crate::ipc::SHM_OBJECTS.lock();
            let mut display = x86::vga().lock();
            let mut keyboard = x86::keyboard().lock();
            let mut ctx = ServiceContext {
                table: &mut table,
                current: slot,
                frames: &mut frames,
                phys: phys_map(),
                mutexes: &mut mutexes,
                semaphores: &mut semaphores,
                shm: &mut shm,
                display: &mut *display,
                keys: &mut *keyboard,
                now_epochs: time::epochs(),
            };
            crate::syscall::execute(&mut ctx);
        }

        schedule_and_dispatch(time::epochs())
    }

    /// Syscall 0xFF: the caller terminates itself.
    #[no_mangle]
    pub extern "C" fn syscall_0xff_handler(_frame: &mut TrapFrame) -> ! {
        let current = SCHEDULER.lock().current;
        if let Current::User(slot) = current {
            terminate_current_user(slot);
        }
        schedule_and_dispatch(time::epochs())
    }

    /// Exceptions 0..31 without a dedicated handler.
    #[no_mangle]
    pub extern "C" fn default_exception_handler(_frame: &mut TrapFrame) -> ! {
        fatal_banner(&mut *x86::vga().lock());

        let current = SCHEDULER.lock().current;
        match current {
            // Single-tasking fallback: the console resumes at the
            // context captured by the last timer tick.
            Current::Console => crate::sched::dispatch(Decision::Console),
            Current::User(slot) => {
                terminate_current_user(slot);
                schedule_and_dispatch(time::epochs())
            }
        }
    }

    /// Page fault (vector 14).
    #[no_mangle]
    pub extern "C" fn page_fault_handler(_frame: &mut TrapFrame) -> ! {
        let fault_addr = x86::read_cr2();

        let current = SCHEDULER.lock().current;
        match current {
            Current::Console => {
                kernel_page_fault_report(&mut *x86::vga().lock(), fault_addr);
                crate::arch::halt()
            }
            Current::User(slot) => {
                {
                    let table = PROCESS_TABLE.lock();
                    let p = table.get(slot).expect("current process alive");
                    page_fault_report(
                        &mut *x86::vga().lock(),
                        p.pid,
                        p.disk.lba,
                        p.disk.n_sectors,
                        fault_addr,
                    );
                }
                terminate_current_user(slot);
                schedule_and_dispatch(time::epochs())
            }
        }
    }

    fn terminate_current_user(slot: crate::process::Slot) {
        let mut table = PROCESS_TABLE.lock();
        let mut mutexes = crate::ipc::MUTEXES.lock();
        let mut semaphores = crate::ipc::SEMAPHORES.lock();
        let mut shm = crate::ipc::SHM_OBJECTS.lock();
        let mut frames = FRAME_ALLOCATOR.lock();
        terminate_process(
            slot,
            &mut table,
            &mut mutexes,
            &mut semaphores,
            &mut shm,
            &mut frames,
            phys_map(),
        );
    }
}

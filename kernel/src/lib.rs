//! SOS kernel library
//!
//! Core of a small x86-32 teaching operating system: process control
//! blocks and their arena, the round-robin scheduler with console
//! priority, the trap gateway, the two-tier memory manager (physical
//! frame bitmap + per-process page directories with a higher-half
//! kernel map), and the user-visible synchronization objects (mutexes,
//! counting semaphores, shared memory).
//!
//! Everything architecture-specific (port I/O, ring transitions, the
//! IDT/PIC/PIT glue) is confined to [`arch`] and compiled only for the
//! boot target; the rest of the kernel is exercised on the host by the
//! unit and integration tests against mock collaborators.

#![no_std]

extern crate alloc;

// On the boot target the kernel heap is a linked-list allocator over a
// region handed out by the frame allocator at boot. Host builds (unit
// and integration tests) get their allocator from the test harness.
#[cfg(target_os = "none")]
use linked_list_allocator::LockedHeap;

#[cfg(target_os = "none")]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Get a reference to the global allocator (heap init happens at boot)
#[cfg(target_os = "none")]
pub fn get_allocator() -> &'static LockedHeap {
    &ALLOCATOR
}

#[macro_use]
pub mod print;

pub mod arch;
pub mod console;
pub mod drivers;
pub mod error;
pub mod ipc;
pub mod log_service;
pub mod mm;
pub mod process;
pub mod sched;
pub mod syscall;
pub mod time;
pub mod trap;

// Re-exports used throughout the crate and by the integration tests
pub use error::KernelError;
pub use mm::{FrameNumber, PhysAddr, VirtAddr, FRAME_SIZE};
pub use process::{Pid, Process, ProcessState};

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("\nKERNEL PANIC: {}", info);
    crate::arch::halt()
}

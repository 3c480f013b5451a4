//! Inter-process synchronization objects
//!
//! Fixed tables of 256 mutexes and 256 counting semaphores (key 0
//! reserved in both), and a registry of 256 shared-memory objects.
//! Each mutex/semaphore slot carries a bounded FIFO wait queue;
//! process death cancels queue membership through the removed
//! sentinel so other waiters keep their positions.

pub mod mutex;
pub mod semaphore;
pub mod shm;

pub use mutex::{MutexTable, MUTEXES};
pub use semaphore::{SemaphoreTable, SEMAPHORES};
pub use shm::{ShmTable, SHM_OBJECTS};

use crate::mm::phys::FrameAllocator;
use crate::mm::PhysMap;
use crate::process::{ProcessTable, Slot};

/// Termination cleanup: destroy every mutex and semaphore the dying
/// process created, cancel its wait-queue membership, and detach it
/// from any shared-memory object. Must run before the scheduler reaps
/// the PCB, with interrupts disabled.
#[allow(clippy::too_many_arguments)]
pub fn cleanup_process(
    slot: Slot,
    table: &mut ProcessTable,
    mutexes: &mut MutexTable,
    semaphores: &mut SemaphoreTable,
    shm: &mut ShmTable,
    frames: &mut FrameAllocator,
    phys: &PhysMap,
) {
    mutexes.cleanup(slot, table);
    semaphores.cleanup(slot, table);
    shm.detach(slot, table, frames, phys);
}

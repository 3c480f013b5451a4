//! Process arena
//!
//! A fixed array of PCB slots owns every process in the system. Slot
//! indices are the "weak references" handed to the ready ring and the
//! wait queues; a slot is only reused after the scheduler reaps its
//! previous owner, and PIDs themselves are never reused.

use spin::Mutex;

use super::{Pid, Process};
use crate::error::KernelError;

/// Maximum number of live processes
pub const MAX_PROCESSES: usize = 64;

/// Index of a PCB inside the arena
pub type Slot = usize;

/// The arena of process control blocks
pub struct ProcessTable {
    slots: [Option<Process>; MAX_PROCESSES],
    next_pid: u32,
    count: usize,
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_PROCESSES],
            // PID 0 is the console
            next_pid: 1,
            count: 0,
        }
    }

    /// Hand out the next PID; monotonically increasing, never reused.
    pub fn alloc_pid(&mut self) -> Pid {
        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        pid
    }

    /// Place a PCB into the first free slot.
    pub fn insert(&mut self, process: Process) -> Result<Slot, KernelError> {
        for (slot, entry) in self.slots.iter_mut().enumerate() {
            if entry.is_none() {
                *entry = Some(process);
                self.count += 1;
                return Ok(slot);
            }
        }
        Err(KernelError::OutOfSlots {
            resource: "process",
        })
    }

    pub fn get(&self, slot: Slot) -> Option<&Process> {
        self.slots.get(slot).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut Process> {
        self.slots.get_mut(slot).and_then(|s| s.as_mut())
    }

    /// Take the PCB out of its slot (reaping). The caller frees the
    /// process's memory before or after as appropriate.
    pub fn remove(&mut self, slot: Slot) -> Option<Process> {
        let taken = self.slots.get_mut(slot).and_then(|s| s.take());
        if taken.is_some() {
            self.count -= 1;
        }
        taken
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Occupied slots in arena order
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &Process)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|p| (i, p)))
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Global process arena
pub static PROCESS_TABLE: Mutex<ProcessTable> = Mutex::new(ProcessTable::new());

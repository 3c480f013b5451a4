//! Counting semaphore table
//!
//! Same keying scheme as the mutex table: 256 slots, key 0 reserved,
//! creator-only destroy. The value counts credits not yet claimed by
//! woken waiters: `up` increments and, if it hands the credit straight
//! to a queued waiter, decrements again, so a credit is never counted
//! twice.

use spin::Mutex as SpinMutex;

use crate::error::KernelError;
use crate::process::{Pid, ProcessState, ProcessTable, Slot, WaitQueue};

/// Number of semaphore keys, including the reserved key 0
pub const SEM_MAX: usize = 256;

struct SemaphoreEntry {
    creator: Pid,
    value: i32,
    waitq: WaitQueue,
}

/// The fixed table of semaphore objects
pub struct SemaphoreTable {
    entries: [Option<SemaphoreEntry>; SEM_MAX],
}

impl SemaphoreTable {
    pub const fn new() -> Self {
        Self {
            entries: [const { None }; SEM_MAX],
        }
    }

    /// Claim the lowest free key with the given starting value.
    pub fn create(&mut self, init_value: u8, creator: Pid) -> Option<u8> {
        for key in 1..SEM_MAX {
            if self.entries[key].is_none() {
                self.entries[key] = Some(SemaphoreEntry {
                    creator,
                    value: i32::from(init_value),
                    waitq: WaitQueue::new(),
                });
                return Some(key as u8);
            }
        }
        None
    }

    /// Release a key; creator only.
    pub fn destroy(&mut self, key: u8, caller: Pid) -> Result<(), KernelError> {
        let entry = self.entries[key as usize]
            .as_ref()
            .ok_or(KernelError::NoSuchKey { key })?;
        if entry.creator != caller {
            return Err(KernelError::NotCreator);
        }
        self.entries[key as usize] = None;
        Ok(())
    }

    /// P operation. Returns true when a credit was taken; false when
    /// the caller was queued and must stay blocked until an `up`.
    pub fn down(
        &mut self,
        key: u8,
        slot: Slot,
        table: &mut ProcessTable,
    ) -> Result<bool, KernelError> {
        let entry = self.entries[key as usize]
            .as_mut()
            .ok_or(KernelError::NoSuchKey { key })?;
        let p = table.get_mut(slot).expect("downing process alive");

        if entry.value > 0 {
            entry.value -= 1;
            p.sem_wait.key = None;
            Ok(true)
        } else {
            let index = entry.waitq.enqueue(slot)?;
            p.sem_wait.key = Some(key);
            p.sem_wait.queue_index = index;
            Ok(false)
        }
    }

    /// V operation. Adds a credit; if a live waiter is queued it is
    /// woken and given the credit immediately.
    pub fn up(&mut self, key: u8, table: &mut ProcessTable) -> Result<(), KernelError> {
        let entry = self.entries[key as usize]
            .as_mut()
            .ok_or(KernelError::NoSuchKey { key })?;

        entry.value += 1;
        if let Some(next) = entry.waitq.dequeue() {
            let w = table.get_mut(next).expect("waiter alive");
            w.sem_wait.key = None;
            w.state = ProcessState::Ready;
            entry.value -= 1;
        }
        Ok(())
    }

    /// Current value of `key`, if it exists
    pub fn value(&self, key: u8) -> Option<i32> {
        self.entries[key as usize].as_ref().map(|e| e.value)
    }

    pub fn exists(&self, key: u8) -> bool {
        self.entries[key as usize].is_some()
    }

    /// Termination hook: destroy created semaphores, cancel queue
    /// membership via the sentinel.
    pub fn cleanup(&mut self, slot: Slot, table: &mut ProcessTable) {
        let Some(p) = table.get(slot) else { return };
        let pid = p.pid;
        let waiting_on = p.sem_wait;

        for key in 1..SEM_MAX {
            if let Some(entry) = self.entries[key].as_ref() {
                if entry.creator == pid {
                    self.entries[key] = None;
                }
            }
        }

        if let Some(key) = waiting_on.key {
            if let Some(entry) = self.entries[key as usize].as_mut() {
                entry.waitq.remove(waiting_on.queue_index);
            }
        }
    }
}

impl Default for SemaphoreTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Global semaphore table
pub static SEMAPHORES: SpinMutex<SemaphoreTable> = SpinMutex::new(SemaphoreTable::new());

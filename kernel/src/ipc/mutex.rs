//! Mutex table
//!
//! 256 slots addressed by an 8-bit key; key 0 is never issued. A slot
//! is either free (`None`) or a live object recording its creator and
//! current holder. Slot allocation and lock state are separate
//! concepts; locking never touches availability. Hand-off is
//! strict FIFO across waiters that are still alive.

use spin::Mutex as SpinMutex;

use crate::error::KernelError;
use crate::process::{Pid, ProcessState, ProcessTable, Slot, WaitQueue};

/// Number of mutex keys, including the reserved key 0
pub const MUTEX_MAX: usize = 256;

/// A live mutex object
struct MutexEntry {
    creator: Pid,
    /// Arena slot of the process holding the lock, if any
    holder: Option<Slot>,
    waitq: WaitQueue,
}

/// The fixed table of mutex objects
pub struct MutexTable {
    entries: [Option<MutexEntry>; MUTEX_MAX],
}

impl MutexTable {
    pub const fn new() -> Self {
        Self {
            entries: [const { None }; MUTEX_MAX],
        }
    }

    /// Claim the lowest free key for `creator`. Returns None when all
    /// 255 usable keys are taken; the syscall reports that as 0.
    pub fn create(&mut self, creator: Pid) -> Option<u8> {
        for key in 1..MUTEX_MAX {
            if self.entries[key].is_none() {
                self.entries[key] = Some(MutexEntry {
                    creator,
                    holder: None,
                    waitq: WaitQueue::new(),
                });
                return Some(key as u8);
            }
        }
        None
    }

    /// Release a key. Only the creator may do this, and by contract
    /// only while nobody holds or waits on the lock; the wait queue is
    /// not woken.
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

    /// Try to take the lock for the process in `slot`. Returns true
    /// when acquired; false when the caller was queued and must stay
    /// blocked until [`unlock`](Self::unlock) hands the lock over.
    pub fn lock(
        &mut self,
        key: u8,
        slot: Slot,
        table: &mut ProcessTable,
    ) -> Result<bool, KernelError> {
        let entry = self.entries[key as usize]
            .as_mut()
            .ok_or(KernelError::NoSuchKey { key })?;
        let p = table.get_mut(slot).expect("locking process alive");

        if entry.holder.is_none() {
            entry.holder = Some(slot);
            p.mutex_wait.key = None;
            Ok(true)
        } else {
            // Non-recursive: the holder locking again queues itself
            let index = entry.waitq.enqueue(slot)?;
            p.mutex_wait.key = Some(key);
            p.mutex_wait.queue_index = index;
            Ok(false)
        }
    }

    /// Release the lock. Only the holder may unlock; the oldest live
    /// waiter (sentinels skipped) becomes the new holder and is made
    /// READY, or the lock goes free when the queue drains.
    pub fn unlock(
        &mut self,
        key: u8,
        slot: Slot,
        table: &mut ProcessTable,
    ) -> Result<(), KernelError> {
        let entry = self.entries[key as usize]
            .as_mut()
            .ok_or(KernelError::NoSuchKey { key })?;
        if entry.holder != Some(slot) {
            return Err(KernelError::NotOwner);
        }

        match entry.waitq.dequeue() {
            Some(next) => {
                let w = table.get_mut(next).expect("waiter alive");
                w.mutex_wait.key = None;
                w.state = ProcessState::Ready;
                entry.holder = Some(next);
            }
            None => entry.holder = None,
        }
        Ok(())
    }

    /// Holder of `key`, if the object exists and is locked
    pub fn holder(&self, key: u8) -> Option<Slot> {
        self.entries[key as usize].as_ref().and_then(|e| e.holder)
    }

    /// Is `key` backed by a live object?
    pub fn exists(&self, key: u8) -> bool {
        self.entries[key as usize].is_some()
    }

    /// Waiters queued on `key` (including removed sentinels)
    pub fn queue_len(&self, key: u8) -> usize {
        self.entries[key as usize]
            .as_ref()
            .map_or(0, |e| e.waitq.len())
    }

    /// Termination hook: destroy every mutex this process created and
    /// replace its wait-queue entry, if any, with the sentinel.
    pub fn cleanup(&mut self, slot: Slot, table: &mut ProcessTable) {
        let Some(p) = table.get(slot) else { return };
        let pid = p.pid;
        let waiting_on = p.mutex_wait;

        for key in 1..MUTEX_MAX {
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

impl Default for MutexTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Global mutex table
pub static MUTEXES: SpinMutex<MutexTable> = SpinMutex::new(MutexTable::new());

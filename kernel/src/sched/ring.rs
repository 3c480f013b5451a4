//! Ready ring
//!
//! The circular doubly linked scheduling list, built from arena slots
//! through the intrusive links in each PCB. The cursor names the next
//! user process in line for a quantum; insertion goes immediately
//! before it (tail of a ring rooted at the cursor), and removing the
//! last member clears the cursor.

use crate::process::{ProcessTable, Slot};

/// The scheduling ring's cursor plus the link operations
#[derive(Debug, Clone, Copy)]
pub struct ReadyRing {
    next: Option<Slot>,
}

impl ReadyRing {
    pub const fn new() -> Self {
        Self { next: None }
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_none()
    }

    /// The next user process to receive a quantum
    pub fn cursor(&self) -> Option<Slot> {
        self.next
    }

    /// Insert `slot` immediately before the cursor.
    pub fn insert(&mut self, table: &mut ProcessTable, slot: Slot) {
        match self.next {
            None => {
                let p = table.get_mut(slot).expect("inserting a live process");
                p.link.prev = slot;
                p.link.next = slot;
                self.next = Some(slot);
            }
            Some(head) => {
                let tail = table.get(head).expect("ring head alive").link.prev;
                {
                    let p = table.get_mut(slot).expect("inserting a live process");
                    p.link.prev = tail;
                    p.link.next = head;
                }
                table.get_mut(tail).expect("ring tail alive").link.next = slot;
                table.get_mut(head).expect("ring head alive").link.prev = slot;
            }
        }
    }

    /// Unlink `slot`; returns its successor, or None if the ring is
    /// now empty. A cursor pointing at the removed member moves to the
    /// successor.
    pub fn remove(&mut self, table: &mut ProcessTable, slot: Slot) -> Option<Slot> {
        let link = table.get(slot).expect("removing a live process").link;
        if link.next == slot {
            self.next = None;
            return None;
        }
        table.get_mut(link.prev).expect("ring prev alive").link.next = link.next;
        table.get_mut(link.next).expect("ring next alive").link.prev = link.prev;
        if self.next == Some(slot) {
            self.next = Some(link.next);
        }
        Some(link.next)
    }

    /// Move the cursor to its successor.
    pub fn advance(&mut self, table: &ProcessTable) {
        if let Some(slot) = self.next {
            self.next = Some(table.get(slot).expect("cursor alive").link.next);
        }
    }

    /// Number of ring members
    pub fn len(&self, table: &ProcessTable) -> usize {
        let Some(start) = self.next else { return 0 };
        let mut n = 1;
        let mut slot = table.get(start).expect("cursor alive").link.next;
        while slot != start {
            n += 1;
            slot = table.get(slot).expect("ring member alive").link.next;
        }
        n
    }

    /// Members in ring order starting at the cursor (the order `ps`
    /// prints them).
    pub fn members<'a>(&'a self, table: &'a ProcessTable) -> impl Iterator<Item = Slot> + 'a {
        let start = self.next;
        let mut slot = start;
        let mut first = true;
        core::iter::from_fn(move || {
            let current = slot?;
            if !first && Some(current) == start {
                return None;
            }
            first = false;
            slot = Some(table.get(current).expect("ring member alive").link.next);
            Some(current)
        })
    }
}

impl Default for ReadyRing {
    fn default() -> Self {
        Self::new()
    }
}

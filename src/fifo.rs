//! The per-resource waiter FIFO (C1).
//!
//! Waiters are not heap nodes: each task's [`Waiter`] lives inside its
//! own task-extension slot, and the FIFO threads them together with
//! plain slot indices (`next`/`prev`), the same intrusive-list shape as
//! this codebase's thread block-lists, except doubly linked so that a
//! waiter can be unlinked from the middle of the queue, not just the
//! head — the preemption hook needs exactly that to cancel an arbitrary
//! spinner.

use crate::ids::{Priority, Slot, NO_SLOT};

/// One task's position in a resource's wait queue.
///
/// Embedded inside [`crate::task_table::TaskExtension`]; never
/// allocated separately.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Waiter {
    pub(crate) next: Slot,
    pub(crate) prev: Slot,
    pub(crate) enqueued: bool,
    pub(crate) cancelled: bool,
    /// The task's priority as observed when it entered `lock`.
    pub(crate) base_prio: Priority,
    /// The elevated priority it spins at while waiting for this
    /// resource (R1).
    pub(crate) spin_prio: Priority,
}

impl Waiter {
    pub const fn new() -> Self {
        Self {
            next: NO_SLOT,
            prev: NO_SLOT,
            enqueued: false,
            cancelled: false,
            base_prio: Priority::new(0),
            spin_prio: Priority::new(0),
        }
    }

    /// Resets the waiter for a fresh `lock` attempt, clearing the queue
    /// linkage and the cancellation flag, and recording the priorities
    /// this attempt spins at.
    pub fn reset(&mut self, base_prio: Priority, spin_prio: Priority) {
        self.next = NO_SLOT;
        self.prev = NO_SLOT;
        self.enqueued = false;
        self.cancelled = false;
        self.base_prio = base_prio;
        self.spin_prio = spin_prio;
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}

/// A FIFO of waiter slots for a single resource.
///
/// All operations assume the caller already holds the resource's own
/// spinlock; the FIFO performs no synchronization of its own.
///
/// Waiters are not stored contiguously (each lives inside a separate
/// task-extension slot, alongside fields the FIFO has no business
/// touching), so every method is handed a `waiter_of` accessor rather
/// than a slice: given a [`Slot`], it produces a raw pointer to that
/// slot's [`Waiter`]. This type stores only the head/tail indices, not
/// the nodes themselves.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaiterFifo {
    head: Slot,
    tail: Slot,
}

impl WaiterFifo {
    pub const fn new() -> Self {
        Self {
            head: NO_SLOT,
            tail: NO_SLOT,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head == NO_SLOT
    }

    pub fn peek_head(&self) -> Option<Slot> {
        (self.head != NO_SLOT).then_some(self.head)
    }

    /// Appends `slot` to the tail of the queue. No-op if `slot` is
    /// already enqueued (idempotent — see invariant 7).
    ///
    /// # Safety
    /// `waiter_of` must return a valid, uniquely-owned pointer for
    /// every slot touched during the call (this slot, the current
    /// tail).
    pub unsafe fn enqueue_tail(&mut self, slot: Slot, waiter_of: impl Fn(Slot) -> *mut Waiter) {
        let w = unsafe { &mut *waiter_of(slot) };
        if w.enqueued {
            return;
        }
        w.prev = self.tail;
        w.next = NO_SLOT;
        w.enqueued = true;
        if self.tail != NO_SLOT {
            unsafe { &mut *waiter_of(self.tail) }.next = slot;
        } else {
            self.head = slot;
        }
        self.tail = slot;
    }

    /// Places `slot` at the head of the queue. Used once, to claim a
    /// unique "first arriver" identity on an otherwise-empty queue
    /// before ownership is actually granted. No-op if already enqueued.
    ///
    /// # Safety
    /// See [`WaiterFifo::enqueue_tail`].
    pub unsafe fn enqueue_head_if_needed(
        &mut self,
        slot: Slot,
        waiter_of: impl Fn(Slot) -> *mut Waiter,
    ) {
        let w = unsafe { &mut *waiter_of(slot) };
        if w.enqueued {
            return;
        }
        w.prev = NO_SLOT;
        w.next = self.head;
        w.enqueued = true;
        if self.head != NO_SLOT {
            unsafe { &mut *waiter_of(self.head) }.prev = slot;
        } else {
            self.tail = slot;
        }
        self.head = slot;
    }

    /// Unlinks `slot` from wherever it currently sits in the queue.
    /// No-op if it is not enqueued.
    ///
    /// # Safety
    /// See [`WaiterFifo::enqueue_tail`].
    pub unsafe fn remove(&mut self, slot: Slot, waiter_of: impl Fn(Slot) -> *mut Waiter) {
        let (prev, next) = {
            let w = unsafe { &*waiter_of(slot) };
            if !w.enqueued {
                return;
            }
            (w.prev, w.next)
        };
        if prev != NO_SLOT {
            unsafe { &mut *waiter_of(prev) }.next = next;
        } else {
            self.head = next;
        }
        if next != NO_SLOT {
            unsafe { &mut *waiter_of(next) }.prev = prev;
        } else {
            self.tail = prev;
        }
        let w = unsafe { &mut *waiter_of(slot) };
        w.enqueued = false;
        w.next = NO_SLOT;
        w.prev = NO_SLOT;
    }
}

impl Default for WaiterFifo {
    /// Equivalent to [`WaiterFifo::new`] — `NO_SLOT`, not `0`, is the
    /// empty sentinel, so a field-wise derive would be wrong here.
    fn default() -> Self {
        Self::new()
    }
}

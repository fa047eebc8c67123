//! The task-extension table (C3): a fixed-capacity map from a host
//! task identity to that task's FRAP state.
//!
//! Allocation and lookup-by-identity are guarded by a dedicated
//! spinlock, but once a slot is resolved its fields are touched
//! without re-acquiring that lock — the same shape the NuttX `frap`
//! driver this crate's protocol is modeled on uses for its own
//! extension pool. Safety instead rests on the concurrency model: a
//! task's extension is mutated only by that task itself, or by the
//! preemption hook acting on a task that is, by definition, not
//! currently running. Those two writers never overlap in time.

use core::cell::UnsafeCell;

use crate::fifo::Waiter;
use crate::ids::{Priority, Slot};
use crate::resource::Resource;
use crate::spinlock::Spinlock;

/// Per-task FRAP state.
pub(crate) struct TaskExtension {
    /// Resource this task is currently spinning for, if any.
    pub(crate) waiting_res: Option<&'static Resource>,
    /// This task's node in `waiting_res`'s FIFO.
    pub(crate) waiter: Waiter,
    /// Whether this task currently holds a resource's critical section.
    pub(crate) in_cs: bool,
    /// The task's priority as observed when it entered `lock`, mirroring
    /// `waiter.base_prio`. Not yet consulted by restoration logic (both
    /// `unlock` and the preemption hook restore from `waiter.base_prio`
    /// directly); kept so a future priority-inheritance coordination
    /// path has a stable place to read the pre-elevation priority from.
    #[allow(dead_code)]
    pub(crate) saved_prio: Priority,
}

impl TaskExtension {
    const fn new() -> Self {
        Self {
            waiting_res: None,
            waiter: Waiter::new(),
            in_cs: false,
            saved_prio: Priority::new(0),
        }
    }
}

/// Fixed-capacity directory mapping a host task identity to a slot,
/// plus the per-slot extension storage.
pub(crate) struct TaskTable<Id, const MAX_TASKS: usize> {
    directory: Spinlock<[Option<Id>; MAX_TASKS]>,
    extensions: [UnsafeCell<TaskExtension>; MAX_TASKS],
}

unsafe impl<Id: Send, const MAX_TASKS: usize> Sync for TaskTable<Id, MAX_TASKS> {}

impl<Id: Copy + Eq, const MAX_TASKS: usize> TaskTable<Id, MAX_TASKS> {
    pub const fn new() -> Self {
        Self {
            directory: Spinlock::new([None; MAX_TASKS]),
            extensions: [const { UnsafeCell::new(TaskExtension::new()) }; MAX_TASKS],
        }
    }

    /// Resolves `task` to its slot, allocating a fresh one on first
    /// use. Returns `None` if the table is full and `task` has no
    /// existing slot.
    pub fn get_or_insert(&self, task: Id) -> Option<Slot> {
        let mut dir = self.directory.lock();
        if let Some(slot) = dir.iter().position(|occ| *occ == Some(task)) {
            return Some(slot as Slot);
        }
        let free = dir.iter().position(|occ| occ.is_none())?;
        dir[free] = Some(task);
        // SAFETY: `free` was `None` in the directory the instant ago
        // checked above, under the directory lock; no other caller can
        // have resolved this slot for any task yet, so resetting it
        // here races with nobody.
        unsafe {
            *self.extensions[free].get() = TaskExtension::new();
        }
        Some(free as Slot)
    }

    /// Frees a task's slot, e.g. once the host knows the task has
    /// exited. Caller must ensure the task holds no resource and is
    /// not enqueued anywhere at the time of the call.
    pub fn remove(&self, task: Id) {
        let mut dir = self.directory.lock();
        if let Some(slot) = dir.iter().position(|occ| *occ == Some(task)) {
            dir[slot] = None;
        }
    }

    /// Returns the extension for an already-resolved slot without
    /// taking the directory lock.
    ///
    /// # Safety
    /// The caller must not alias this reference with another live
    /// reference to the same slot's extension — see the module-level
    /// reasoning for why the two legitimate callers (the owning task,
    /// and the preemption hook acting on a non-running task) never do.
    pub unsafe fn extension(&self, slot: Slot) -> &mut TaskExtension {
        unsafe { &mut *self.extensions[slot as usize].get() }
    }

    /// Returns a raw pointer to a slot's embedded [`Waiter`], for
    /// [`crate::fifo::WaiterFifo`] to thread its intrusive list through.
    /// Does not take the directory lock; the resource spinlock held by
    /// the FIFO's caller is what actually serializes access to the
    /// linkage fields.
    pub fn waiter_ptr(&self, slot: Slot) -> *mut Waiter {
        // SAFETY: projecting a field pointer out of a live allocation.
        unsafe { &mut (*self.extensions[slot as usize].get()).waiter as *mut Waiter }
    }
}

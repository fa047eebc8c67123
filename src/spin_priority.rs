//! The spin-priority registry (C4): a fixed-capacity map from
//! `(task, resource)` to the priority that task should spin at while
//! waiting for that resource.
//!
//! The original driver this table is modeled on left its equivalent
//! array unsynchronized, unlike every other shared table in it. This
//! version gives it its own spinlock instead of inheriting that gap —
//! see `DESIGN.md`.

use crate::error::FrapError;
use crate::ids::{Priority, ResourceId};
use crate::spinlock::Spinlock;

#[cfg(feature = "defmt")]
macro_rules! debug {
    ($($arg:tt)*) => { defmt::debug!($($arg)*) };
}
#[cfg(not(feature = "defmt"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

#[derive(Clone, Copy)]
struct Entry<Id> {
    task: Id,
    resource: ResourceId,
    prio: Priority,
}

/// Fixed-capacity `(task, resource) -> Priority` registry.
pub struct SpinPriorityTable<Id, const TABLE_SIZE: usize> {
    entries: Spinlock<[Option<Entry<Id>>; TABLE_SIZE]>,
}

impl<Id: Copy + Eq, const TABLE_SIZE: usize> SpinPriorityTable<Id, TABLE_SIZE> {
    pub const fn new() -> Self {
        Self {
            entries: Spinlock::new([None; TABLE_SIZE]),
        }
    }

    /// Inserts or updates the spin priority for `(task, resource)`.
    pub fn set(&self, task: Id, resource: ResourceId, prio: Priority) -> Result<(), FrapError> {
        let mut entries = self.entries.lock();
        if let Some(slot) = entries
            .iter_mut()
            .flatten()
            .find(|e| e.task == task && e.resource == resource)
        {
            slot.prio = prio;
            return Ok(());
        }
        let free = entries.iter().position(|e| e.is_none()).ok_or_else(|| {
            debug!("frap: spin_prio: registry full");
            FrapError::NoSpace
        })?;
        entries[free] = Some(Entry {
            task,
            resource,
            prio,
        });
        Ok(())
    }

    /// Looks up the spin priority registered for `(task, resource)`.
    pub fn get(&self, task: Id, resource: ResourceId) -> Result<Priority, FrapError> {
        let entries = self.entries.lock();
        entries
            .iter()
            .flatten()
            .find(|e| e.task == task && e.resource == resource)
            .map(|e| e.prio)
            .ok_or(FrapError::NotFound)
    }

    /// Drops any entries recorded for `task`, e.g. on task exit.
    pub fn remove_task(&self, task: Id) {
        let mut entries = self.entries.lock();
        for slot in entries.iter_mut() {
            if slot.is_some_and(|e| e.task == task) {
                *slot = None;
            }
        }
    }
}

//! FRAP: a Flexible Resource Access Protocol for preemptive,
//! priority-scheduled SMP RTOSes.
//!
//! A [`Resource`] is guarded by a FIFO of spinning waiters. A task
//! waiting for a resource spins at an elevated priority (R1, the
//! spin-priority floor); the task holding the resource runs with local
//! preemption disabled (R2); a spinning task that is preempted by
//! strictly higher-priority work loses its place in the queue and
//! returns to its base priority, to retry later (R3, cancel-on-preempt).
//! A companion ceiling-protocol fast path ([`Engine::local_lock`])
//! serves resources that are never contended across cores.
//!
//! The crate has no notion of tasks, priorities, or context switches of
//! its own: it drives a host-supplied [`Scheduler`] implementation
//! through [`Engine`], and the host drives the engine back by calling
//! [`Engine::on_context_switch`] from its own context-switch path. There
//! is no crate-owned static; a host typically places its `Engine` in
//! whatever one-time-init wrapper it already uses for other globals.
#![cfg_attr(not(test), no_std)]
// Possible panics from indexing a fixed-capacity table by an
// already-validated `Slot` rely on invariants enforced internally.
#![allow(clippy::indexing_slicing)]

mod engine;
mod error;
mod fifo;
mod ids;
mod resource;
mod scheduler;
mod spin_priority;
mod spinlock;
mod task_table;

pub use engine::Engine;
pub use error::FrapError;
pub use ids::{Locality, Priority, ResourceId};
pub use resource::Resource;
pub use scheduler::Scheduler;
pub use spin_priority::SpinPriorityTable;

/// Default capacity of a task-extension table (C3): the number of
/// distinct tasks that may simultaneously hold or wait for resources.
pub const DEFAULT_MAX_TASKS: usize = 64;

/// Default capacity of a spin-priority registry (C4): the number of
/// `(task, resource)` entries it can hold at once.
pub const DEFAULT_TABLE_SIZE: usize = 64;

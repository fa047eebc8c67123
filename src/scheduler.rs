//! The collaborator contract this crate needs from a host scheduler.

use crate::error::FrapError;
use crate::ids::Priority;

/// Everything the FRAP engine needs from the host's task scheduler.
///
/// The engine never touches a task control block directly; it drives
/// the scheduler only through this trait, and the host drives the
/// engine only by calling [`crate::Engine::on_context_switch`] from its
/// own context-switch path. Neither side owns a static global pointing
/// at the other.
pub trait Scheduler {
    /// Opaque task identity, as minted by the host.
    type TaskId: Copy + Eq;

    /// The task currently executing on this core.
    fn current_task(&self) -> Self::TaskId;

    /// Reads a task's current scheduling priority.
    fn priority_of(&self, task: Self::TaskId) -> Priority;

    /// Writes a task's scheduling priority.
    ///
    /// Returns `InvalidArg` if the host rejects the requested priority
    /// (e.g. out of the scheduler's configured priority range).
    fn set_priority(&self, task: Self::TaskId, prio: Priority) -> Result<(), FrapError>;

    /// Disables preemption of the *currently running* task on this
    /// core. Used to bracket a critical section (R2); does not exclude
    /// other cores.
    fn disable_local_preemption(&self);

    /// Reverses [`Scheduler::disable_local_preemption`].
    fn enable_local_preemption(&self);

    /// Cooperatively yields the CPU to another runnable task of equal
    /// or higher priority, then returns once this task is scheduled
    /// again.
    fn yield_cpu(&self);
}

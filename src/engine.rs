//! The lock/unlock engine (C5), the preemption hook (C6), and the
//! local PCP fast path (C7) — the three operations a host wires up to
//! drive FRAP.

use crate::error::FrapError;
use crate::ids::{Priority, ResourceId};
use crate::resource::Resource;
use crate::scheduler::Scheduler;
use crate::spin_priority::SpinPriorityTable;
use crate::task_table::TaskTable;

#[cfg(feature = "defmt")]
macro_rules! trace {
    ($($arg:tt)*) => { defmt::trace!($($arg)*) };
}
#[cfg(not(feature = "defmt"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "defmt")]
macro_rules! debug {
    ($($arg:tt)*) => { defmt::debug!($($arg)*) };
}
#[cfg(not(feature = "defmt"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

/// Owns the state FRAP needs and drives a host [`Scheduler`] through
/// its collaborator contract.
///
/// A host creates exactly one `Engine` (typically in a `static`, using
/// whatever one-time-init wrapper it already uses for other globals)
/// and is responsible for two things: calling [`Engine::lock`] /
/// [`Engine::unlock`] / [`Engine::local_lock`] / [`Engine::local_unlock`]
/// around its own critical sections, and calling
/// [`Engine::on_context_switch`] from its own context-switch path on
/// every switch. The engine itself never reaches for a static global of
/// its own.
///
/// `MAX_TASKS` bounds the task-extension pool (C3); `TABLE_SIZE` bounds
/// the spin-priority registry (C4). Both default to 64, matching this
/// protocol's usual configuration.
pub struct Engine<S: Scheduler, const MAX_TASKS: usize = 64, const TABLE_SIZE: usize = 64> {
    scheduler: S,
    tasks: TaskTable<S::TaskId, MAX_TASKS>,
    spin_prios: SpinPriorityTable<S::TaskId, TABLE_SIZE>,
}

impl<S: Scheduler, const MAX_TASKS: usize, const TABLE_SIZE: usize>
    Engine<S, MAX_TASKS, TABLE_SIZE>
{
    pub const fn new(scheduler: S) -> Self {
        Self {
            scheduler,
            tasks: TaskTable::new(),
            spin_prios: SpinPriorityTable::new(),
        }
    }

    /// Gives back the scheduler collaborator this engine was built
    /// with.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Registers the priority a task should spin at when it next locks
    /// `resource`, for callers that prefer to configure this ahead of
    /// time rather than pass it to [`Engine::lock`] directly.
    pub fn set_spin_prio(
        &self,
        task: S::TaskId,
        resource: ResourceId,
        prio: Priority,
    ) -> Result<(), FrapError> {
        self.spin_prios.set(task, resource, prio)
    }

    /// Looks up a previously registered spin priority.
    pub fn get_spin_prio(&self, task: S::TaskId, resource: ResourceId) -> Result<Priority, FrapError> {
        self.spin_prios.get(task, resource)
    }

    /// Acquires `resource`, spinning at `spin_prio` while contended.
    ///
    /// `spin_prio` must be at least the caller's current priority (R1);
    /// violating this is a caller bug and reported as `InvalidArg`
    /// without any state change.
    pub fn lock(&self, resource: &'static Resource, spin_prio: Priority) -> Result<(), FrapError> {
        let task = self.scheduler.current_task();
        let base_prio = self.scheduler.priority_of(task);
        if spin_prio < base_prio {
            return Err(FrapError::InvalidArg);
        }
        let slot = self.tasks.get_or_insert(task).ok_or(FrapError::InvalidArg)?;
        // SAFETY: `slot` belongs to `task`, which is the only running
        // task that can touch it; the preemption hook only touches a
        // *different*, non-running task's slot.
        let ext = unsafe { self.tasks.extension(slot) };
        ext.waiter.reset(base_prio, spin_prio);
        ext.waiting_res = Some(resource);
        ext.in_cs = false;
        ext.saved_prio = base_prio;

        self.scheduler.set_priority(task, spin_prio)?;
        trace!("frap: lock: task elevated for spin");

        loop {
            let mut can_enter;
            {
                let mut state = resource.state.lock();
                can_enter = state.owner == crate::ids::NO_SLOT;
                // SAFETY: the resource spinlock is held for the
                // duration of every FIFO mutation below, and
                // `waiter_ptr` only ever projects the embedded `Waiter`
                // field, never aliasing the rest of the extension.
                if can_enter {
                    if state.fifo.is_empty() {
                        unsafe {
                            state
                                .fifo
                                .enqueue_head_if_needed(slot, |s| self.tasks.waiter_ptr(s));
                        }
                    }
                    can_enter = state.fifo.peek_head() == Some(slot);
                }
                if can_enter {
                    unsafe {
                        state.fifo.remove(slot, |s| self.tasks.waiter_ptr(s));
                    }
                    state.owner = slot;
                } else {
                    unsafe {
                        state.fifo.enqueue_tail(slot, |s| self.tasks.waiter_ptr(s));
                    }
                }
            }

            if can_enter {
                self.scheduler.disable_local_preemption();
                let ext = unsafe { self.tasks.extension(slot) };
                ext.in_cs = true;
                ext.waiting_res = None;
                debug!("frap: lock: acquired");
                return Ok(());
            }

            let ext = unsafe { self.tasks.extension(slot) };
            ext.waiter.cancelled = false;
            self.scheduler.yield_cpu();
        }
    }

    /// Releases `resource`, previously acquired with [`Engine::lock`].
    ///
    /// Calling this without holding `resource` is a caller bug; checked
    /// with `debug_assert!` rather than surfaced as a `Result`.
    pub fn unlock(&self, resource: &'static Resource) {
        let task = self.scheduler.current_task();
        let Some(slot) = self.tasks.get_or_insert(task) else {
            debug_assert!(false, "frap: unlock: task has no extension");
            return;
        };
        // SAFETY: see `lock`.
        let ext = unsafe { self.tasks.extension(slot) };
        debug_assert!(ext.in_cs, "frap: unlock: task is not in a critical section");

        ext.in_cs = false;
        self.scheduler.enable_local_preemption();

        {
            let mut state = resource.state.lock();
            debug_assert!(
                state.owner == slot,
                "frap: unlock: resource not held by caller"
            );
            state.owner = crate::ids::NO_SLOT;
        }

        let _ = self.scheduler.set_priority(task, ext.waiter.base_prio);
        ext.waiting_res = None;
        debug!("frap: unlock: released");
    }

    /// Acquires a `Locality::Local` resource via the ceiling protocol:
    /// elevate to `max(base, ceiling)`, disable local preemption, take
    /// ownership. No FIFO interaction — the caller is asserting this
    /// resource is never contended from another core.
    pub fn local_lock(&self, resource: &'static Resource, ceiling: Priority) -> Result<(), FrapError> {
        let task = self.scheduler.current_task();
        let base_prio = self.scheduler.priority_of(task);
        let slot = self.tasks.get_or_insert(task).ok_or(FrapError::InvalidArg)?;
        let elevated = base_prio.at_least(ceiling);

        // Elevate and disable preemption *before* publishing ownership,
        // so `owner` never points at a task that isn't yet running at
        // its elevated priority with preemption disabled — otherwise a
        // second same-core `local_lock` could slip in and observe the
        // resource as free-to-claim-next while actually contended.
        self.scheduler.set_priority(task, elevated)?;
        self.scheduler.disable_local_preemption();

        // SAFETY: see `lock`.
        let ext = unsafe { self.tasks.extension(slot) };
        ext.in_cs = true;
        ext.saved_prio = base_prio;
        ext.waiter.base_prio = base_prio;

        {
            let mut state = resource.state.lock();
            state.ceiling = ceiling;
            state.owner = slot;
        }
        debug!("frap: local_lock: acquired");
        Ok(())
    }

    /// Releases a resource acquired with [`Engine::local_lock`].
    pub fn local_unlock(&self, resource: &'static Resource) {
        let task = self.scheduler.current_task();
        let Some(slot) = self.tasks.get_or_insert(task) else {
            debug_assert!(false, "frap: local_unlock: task has no extension");
            return;
        };
        // SAFETY: see `lock`.
        let ext = unsafe { self.tasks.extension(slot) };
        debug_assert!(
            ext.in_cs,
            "frap: local_unlock: task is not in a critical section"
        );
        ext.in_cs = false;
        self.scheduler.enable_local_preemption();

        {
            let mut state = resource.state.lock();
            debug_assert!(
                state.owner == slot,
                "frap: local_unlock: resource not held by caller"
            );
            state.owner = crate::ids::NO_SLOT;
        }

        let _ = self.scheduler.set_priority(task, ext.waiter.base_prio);
        debug!("frap: local_unlock: released");
    }

    /// Drives R3. The host must call this from its context-switch path
    /// on every switch, passing the outgoing (`from`) and incoming
    /// (`to`) task.
    ///
    /// A same-or-lower-priority switch is not a preemption and is a
    /// pure no-op (invariant 8).
    pub fn on_context_switch(&self, from: S::TaskId, to: S::TaskId) {
        let from_prio = self.scheduler.priority_of(from);
        let to_prio = self.scheduler.priority_of(to);
        if to_prio <= from_prio {
            return;
        }
        let Some(slot) = self.tasks.get_or_insert(from) else {
            return;
        };
        // SAFETY: `from` is, by the caller's contract, not the
        // currently running task once this hook observes it (it is
        // being switched away from); `lock`/`unlock` for `from` cannot
        // be running concurrently with this call.
        let ext = unsafe { self.tasks.extension(slot) };
        let Some(resource) = ext.waiting_res else {
            return;
        };
        if ext.in_cs {
            return;
        }

        {
            let mut state = resource.state.lock();
            // SAFETY: see `lock`.
            unsafe {
                state.fifo.remove(slot, |s| self.tasks.waiter_ptr(s));
            }
        }
        ext.waiter.cancelled = true;
        let _ = self.scheduler.set_priority(from, ext.waiter.base_prio);
        debug!("frap: on_context_switch: cancelled spinner");
    }

    /// Releases a task's extension slot and any spin-priority registry
    /// entries for it. The host calls this once it knows the task has
    /// exited and holds nothing and waits on nothing.
    pub fn task_exit(&self, task: S::TaskId) {
        self.tasks.remove(task);
        self.spin_prios.remove_task(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Locality;
    use core::cell::Cell;
    use std::vec::Vec;

    struct MockScheduler {
        prios: [Cell<u8>; 4],
        current: Cell<usize>,
        preempt_disabled: Cell<bool>,
        yields: Cell<u32>,
    }

    impl MockScheduler {
        fn new(base_prios: [u8; 4]) -> Self {
            Self {
                prios: base_prios.map(Cell::new),
                current: Cell::new(0),
                preempt_disabled: Cell::new(false),
                yields: Cell::new(0),
            }
        }

        #[allow(dead_code)]
        fn set_current(&self, t: usize) {
            self.current.set(t);
        }
    }

    impl Scheduler for MockScheduler {
        type TaskId = usize;

        fn current_task(&self) -> usize {
            self.current.get()
        }

        fn priority_of(&self, task: usize) -> Priority {
            Priority::new(self.prios[task].get())
        }

        fn set_priority(&self, task: usize, prio: Priority) -> Result<(), FrapError> {
            self.prios[task].set(prio.get());
            Ok(())
        }

        fn disable_local_preemption(&self) {
            self.preempt_disabled.set(true);
        }

        fn enable_local_preemption(&self) {
            self.preempt_disabled.set(false);
        }

        fn yield_cpu(&self) {
            self.yields.set(self.yields.get() + 1);
        }
    }

    #[test]
    fn s1_uncontended_acquisition() {
        static RES: Resource = Resource::new(ResourceId::new(0), Locality::Global);
        let sched = MockScheduler::new([3, 3, 3, 3]);
        let engine: Engine<MockScheduler, 4, 4> = Engine::new(sched);
        engine.lock(&RES, Priority::new(5)).unwrap();
        assert_eq!(engine.scheduler().priority_of(0), Priority::new(5));
        engine.unlock(&RES);
        assert_eq!(engine.scheduler().priority_of(0), Priority::new(3));
        assert!(!RES.is_locked());
    }

    #[test]
    fn rejects_spin_prio_below_base() {
        static RES: Resource = Resource::new(ResourceId::new(1), Locality::Global);
        let sched = MockScheduler::new([5, 3, 3, 3]);
        let engine: Engine<MockScheduler, 4, 4> = Engine::new(sched);
        let err = engine.lock(&RES, Priority::new(1)).unwrap_err();
        assert_eq!(err, FrapError::InvalidArg);
        assert!(!RES.is_locked());
    }

    #[test]
    fn s6_same_priority_switch_is_noop() {
        static RES: Resource = Resource::new(ResourceId::new(2), Locality::Global);
        let sched = MockScheduler::new([3, 3, 3, 3]);
        let engine: Engine<MockScheduler, 4, 4> = Engine::new(sched);
        engine.lock(&RES, Priority::new(5)).unwrap();
        engine.on_context_switch(0, 1);
        // not a strictly-higher preemption: still holding, priority untouched
        assert_eq!(engine.scheduler().priority_of(0), Priority::new(5));
        engine.unlock(&RES);
    }

    #[test]
    fn r3_cancel_on_preempt_while_spinning() {
        static RES2: Resource = Resource::new(ResourceId::new(3), Locality::Global);
        let sched = MockScheduler::new([3, 3, 3, 3]);
        let engine: Engine<MockScheduler, 4, 4> = Engine::new(sched);

        // task 0 takes the resource.
        engine.lock(&RES2, Priority::new(5)).unwrap();

        // task 1 registers itself as a spinner by entering the
        // task-extension table and marking itself as waiting, without
        // actually running the spin loop (that would busy-loop in a
        // test with no other task ever releasing the resource).
        let slot = engine.tasks.get_or_insert(1).unwrap();
        let ext = unsafe { engine.tasks.extension(slot) };
        ext.waiter.reset(Priority::new(3), Priority::new(5));
        ext.waiting_res = Some(&RES2);
        ext.in_cs = false;
        {
            let mut state = RES2.state.lock();
            unsafe {
                state.fifo.enqueue_tail(slot, |s| engine.tasks.waiter_ptr(s));
            }
        }
        engine.scheduler().set_priority(1, Priority::new(5)).unwrap();

        // a higher-priority task 2 preempts task 1.
        engine.scheduler().set_priority(2, Priority::new(9)).unwrap();
        engine.on_context_switch(1, 2);

        let ext = unsafe { engine.tasks.extension(slot) };
        assert!(ext.waiter.cancelled);
        assert!(!ext.waiter.enqueued);
        assert_eq!(engine.scheduler().priority_of(1), Priority::new(3));

        engine.unlock(&RES2);
    }

    #[test]
    fn local_lock_uses_ceiling() {
        static RES3: Resource = Resource::new(ResourceId::new(2), Locality::Local);
        let sched = MockScheduler::new([3, 3, 3, 3]);
        let engine: Engine<MockScheduler, 4, 4> = Engine::new(sched);
        engine.local_lock(&RES3, Priority::new(7)).unwrap();
        assert_eq!(engine.scheduler().priority_of(0), Priority::new(7));
        engine.local_unlock(&RES3);
        assert_eq!(engine.scheduler().priority_of(0), Priority::new(3));
    }

    #[test]
    fn spin_priority_registry_roundtrip() {
        let sched = MockScheduler::new([3, 3, 3, 3]);
        let engine: Engine<MockScheduler, 4, 4> = Engine::new(sched);
        engine
            .set_spin_prio(0, ResourceId::new(9), Priority::new(6))
            .unwrap();
        assert_eq!(
            engine.get_spin_prio(0, ResourceId::new(9)).unwrap(),
            Priority::new(6)
        );
    }

    #[test]
    fn task_exit_frees_slot_and_registry() {
        let sched = MockScheduler::new([3, 3, 3, 3]);
        let engine: Engine<MockScheduler, 4, 4> = Engine::new(sched);
        engine
            .set_spin_prio(0, ResourceId::new(9), Priority::new(6))
            .unwrap();
        let _ = engine.tasks.get_or_insert(0);
        engine.task_exit(0);
        assert_eq!(
            engine.get_spin_prio(0, ResourceId::new(9)).unwrap_err(),
            FrapError::NotFound
        );
    }

    /// Exercises S2 (two tasks really racing for the same resource) and
    /// both halves of S3 (cancel-on-preempt, then retry-and-acquire)
    /// over genuine `std::thread` concurrency rather than a single
    /// mock-driven thread.
    ///
    /// A real host scheduler guarantees a preempted task is not running
    /// while `on_context_switch` examines its extension; two bare OS
    /// threads give no such guarantee on their own; this test supplies
    /// it with a one-shot rendezvous (`parked_tx`/`resume_rx`) so task
    /// 1's *first* `yield_cpu` call genuinely blocks until the driver
    /// has finished calling `on_context_switch` for it — the channel
    /// operations establish the happens-before edges that make this
    /// race-free, standing in for what the real scheduler would provide.
    #[test]
    fn s2_s3_real_thread_contention() {
        use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
        use std::sync::mpsc;
        use std::sync::{Arc, Mutex};
        use std::thread;
        use std::time::Duration;

        struct ThreadScheduler {
            prios: [AtomicU8; 3],
            parked_tx: Mutex<mpsc::SyncSender<()>>,
            resume_rx: Mutex<mpsc::Receiver<()>>,
            armed: AtomicBool,
        }

        std::thread_local! {
            static CURRENT: Cell<usize> = Cell::new(usize::MAX);
        }

        impl Scheduler for ThreadScheduler {
            type TaskId = usize;

            fn current_task(&self) -> usize {
                CURRENT.with(|c| c.get())
            }

            fn priority_of(&self, task: usize) -> Priority {
                Priority::new(self.prios[task].load(Ordering::Acquire))
            }

            fn set_priority(&self, task: usize, prio: Priority) -> Result<(), FrapError> {
                self.prios[task].store(prio.get(), Ordering::Release);
                Ok(())
            }

            fn disable_local_preemption(&self) {}
            fn enable_local_preemption(&self) {}

            fn yield_cpu(&self) {
                if CURRENT.with(|c| c.get()) == 1 && self.armed.swap(false, Ordering::AcqRel) {
                    self.parked_tx.lock().unwrap().send(()).unwrap();
                    self.resume_rx.lock().unwrap().recv().unwrap();
                } else {
                    thread::yield_now();
                }
            }
        }

        static RES: Resource = Resource::new(ResourceId::new(20), Locality::Global);

        let (parked_tx, parked_rx) = mpsc::sync_channel::<()>(0);
        let (resume_tx, resume_rx) = mpsc::channel::<()>();

        let sched = ThreadScheduler {
            prios: [AtomicU8::new(5), AtomicU8::new(5), AtomicU8::new(9)],
            parked_tx: Mutex::new(parked_tx),
            resume_rx: Mutex::new(resume_rx),
            armed: AtomicBool::new(true),
        };
        let engine: Arc<Engine<ThreadScheduler, 4, 4>> = Arc::new(Engine::new(sched));

        // task 0 acquires RES uncontended, then holds it briefly.
        let e0 = engine.clone();
        let t0 = thread::spawn(move || {
            CURRENT.with(|c| c.set(0));
            e0.lock(&RES, Priority::new(5)).unwrap();
            thread::sleep(Duration::from_millis(20));
            e0.unlock(&RES);
        });

        thread::sleep(Duration::from_millis(5));

        // task 1 contends for the same resource (S2): it enqueues,
        // parks on its first failed spin attempt, and later retries and
        // acquires once task 0 releases.
        let e1 = engine.clone();
        let t1 = thread::spawn(move || {
            CURRENT.with(|c| c.set(1));
            e1.lock(&RES, Priority::new(5)).unwrap();
            e1.unlock(&RES);
        });

        // Wait until task 1 has genuinely parked after its first failed
        // attempt, then drive a real preemption-hook call for it (S3,
        // cancel half) exactly as a scheduler's context-switch path
        // would.
        parked_rx.recv().unwrap();
        engine.on_context_switch(1, 2);
        {
            let slot = engine.tasks.get_or_insert(1).unwrap();
            // SAFETY: task 1 is parked on `resume_rx` and cannot be
            // touching its own extension right now.
            let ext = unsafe { engine.tasks.extension(slot) };
            assert!(ext.waiter.cancelled);
            assert!(!ext.waiter.enqueued);
            assert_eq!(engine.scheduler().priority_of(1), Priority::new(5));
        }

        // Let task 1 resume; it re-enqueues at the tail and completes
        // the retry-and-acquire half of S3 once task 0 unlocks.
        resume_tx.send(()).unwrap();

        t0.join().unwrap();
        t1.join().unwrap();

        assert!(!RES.is_locked());
        assert_eq!(engine.scheduler().priority_of(0), Priority::new(5));
        assert_eq!(engine.scheduler().priority_of(1), Priority::new(5));
    }

    // silence unused-import/dead-code warnings for the Vec import used
    // only to document that this test module runs under `std`.
    #[allow(dead_code)]
    fn _uses_std() -> Vec<u8> {
        Vec::new()
    }
}

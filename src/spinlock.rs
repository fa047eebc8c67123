//! A small IRQ-safe spinlock used to guard the engine's internal tables.
//!
//! Built the way this codebase's own critical-section-backed spinlock
//! backend does: a `portable-atomic` flag for cross-core exclusion, plus
//! a `critical_section` token held for the guard's whole lifetime (the
//! same shape as `sync/cs_lock.rs::CsLock`/`CsLockGuard`, which stashes
//! its acquire token in the guard and releases it on `Drop`) so that
//! local interrupts stay masked for as long as the lock is held, not
//! just while it is being acquired. This is what lets a holder's
//! critical section run concurrently with the scheduler's own
//! context-switch path without that path observing the lock half-held.
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::Ordering,
};

use portable_atomic::AtomicBool;

/// A short-hold mutual-exclusion lock for internal state.
///
/// Not re-entrant. Critical sections under a [`Spinlock`] must be
/// short and must not yield, allocate, or take another `Spinlock`.
pub struct Spinlock<T> {
    locked: AtomicBool,
    inner: UnsafeCell<T>,
}

unsafe impl<T> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Acquires the lock, spinning until it is free.
    ///
    /// Masks local interrupts (via `critical_section::acquire`) before
    /// spinning on the cross-core atomic flag, and keeps them masked for
    /// as long as the returned guard lives — the IRQ-save/restore
    /// bracket spans the whole hold, matching `spinlock_acquire_irqsave`
    /// / `spinlock_release_irqrestore`.
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        let restore = critical_section::acquire();
        while !self.try_acquire() {
            core::hint::spin_loop();
        }
        SpinlockGuard {
            lock: self,
            restore,
        }
    }
}

/// Grants access to a [`Spinlock`]'s inner data. Releases the lock and
/// restores interrupts when dropped.
pub struct SpinlockGuard<'a, T> {
    lock: &'a Spinlock<T>,
    restore: critical_section::RestoreState,
}

impl<T> Deref for SpinlockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SpinlockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release();
        // SAFETY: `restore` was produced by the matching
        // `critical_section::acquire()` in `lock`, and this is the only
        // place it is consumed.
        unsafe { critical_section::release(self.restore) };
    }
}

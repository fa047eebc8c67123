//! Small newtypes shared across the crate.

/// A scheduling priority. Higher value means more urgent, matching the
/// convention of the host scheduler this crate is wired into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Priority(u8);

impl Priority {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns whichever priority is more urgent. Named distinctly from
    /// `Ord::max` so a call site never has to disambiguate.
    pub(crate) fn at_least(self, other: Self) -> Self {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }
}

/// Identifies a [`crate::Resource`] for lookups in the spin-priority
/// registry. Resources are normally `'static`, so callers typically
/// derive this from a small enum or a counter rather than from the
/// resource's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResourceId(u16);

impl ResourceId {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u16 {
        self.0
    }
}

/// Whether a resource can be contended from another core.
///
/// `Local` resources may use the cheaper ceiling-protocol fast path
/// ([`crate::Engine::local_lock`]); `Global` resources must go through
/// the spin/FIFO protocol since a local preemption-disable bracket does
/// not exclude another core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Locality {
    Global,
    Local,
}

/// Internal index into a fixed-capacity table. Never exposed in the
/// public API; the host only ever deals in its own `Scheduler::TaskId`.
pub(crate) type Slot = u16;

pub(crate) const NO_SLOT: Slot = Slot::MAX;

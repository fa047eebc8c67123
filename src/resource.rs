//! The resource object (C2): a spinlock-guarded owner slot plus waiter
//! FIFO, one per protected shared resource.

use crate::fifo::WaiterFifo;
use crate::ids::{Locality, Priority, ResourceId, Slot, NO_SLOT};
use crate::spinlock::Spinlock;

pub(crate) struct ResourceState {
    pub(crate) owner: Slot,
    pub(crate) fifo: WaiterFifo,
    /// Ceiling priority for the local PCP fast path. Unused for
    /// `Locality::Global` resources.
    pub(crate) ceiling: Priority,
}

/// A single protected resource.
///
/// Created once, typically as a `static`, and passed by reference to
/// every [`crate::Engine`] method that operates on it. A `Resource`
/// has no notion of the data it protects — like this codebase's
/// `Lock`, it carries no payload; pair it with the data it guards the
/// way callers see fit.
pub struct Resource {
    pub(crate) id: ResourceId,
    pub(crate) locality: Locality,
    pub(crate) state: Spinlock<ResourceState>,
}

unsafe impl Sync for Resource {}

impl Resource {
    /// Creates a new, unheld resource.
    pub const fn new(id: ResourceId, locality: Locality) -> Self {
        Self {
            id,
            locality,
            state: Spinlock::new(ResourceState {
                owner: NO_SLOT,
                fifo: WaiterFifo::new(),
                ceiling: Priority::new(0),
            }),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn locality(&self) -> Locality {
        self.locality
    }

    /// Whether the resource is currently held by some task. Racy by
    /// nature (the answer may be stale by the time the caller acts on
    /// it); useful for diagnostics, not for synchronization decisions.
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner != NO_SLOT
    }
}

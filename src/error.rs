//! Error taxonomy returned by the public FRAP operations.

/// Failure outcomes surfaced by [`crate::Engine`] operations.
///
/// Violations of an operation's preconditions that a correct caller can
/// never trigger without a logic bug (unlocking a resource that isn't
/// held, for instance) are not modeled here: they are checked with
/// `debug_assert!` instead, matching the severity the rest of this
/// codebase assigns to "can't happen, but check anyway" conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrapError {
    /// An argument violated a contract, e.g. a spin priority below the
    /// caller's base priority, or a rejection from the scheduler
    /// collaborator when asked to change a task's priority.
    InvalidArg,
    /// A fixed-capacity table (task-extension pool, spin-priority
    /// registry) has no free slot left.
    NoSpace,
    /// A lookup found no entry for the given key.
    NotFound,
}

impl core::fmt::Display for FrapError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            FrapError::InvalidArg => "invalid argument",
            FrapError::NoSpace => "table is full",
            FrapError::NotFound => "no matching entry",
        };
        f.write_str(msg)
    }
}

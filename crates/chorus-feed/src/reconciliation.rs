//! Commit/rollback rules for optimistic mutations
//!
//! A [`PendingMutation`] is created when a value is changed ahead of the
//! remote call that justifies it. It is consumed by exactly one of
//! [`commit`](PendingMutation::commit), [`rollback`](PendingMutation::rollback)
//! or [`settle`](PendingMutation::settle), so a mutation can never end twice.
//! Rollback restores the captured pre-mutation value verbatim and never
//! consults the server.

/// An optimistic change awaiting its terminal outcome.
///
/// Not `Clone`: a copy could be settled a second time.
///
/// ```compile_fail
/// let pending = chorus_feed::PendingMutation::new(false, true);
/// let copy = pending.clone();
/// let _ = (pending.commit(), copy.rollback());
/// ```
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a pending mutation must be committed or rolled back"]
pub struct PendingMutation<V> {
    previous: V,
    target: V,
}

/// Terminal outcome of a [`PendingMutation`], carrying the value to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<V> {
    /// The remote side confirmed; keep the target
    Committed(V),
    /// The remote side failed; restore the previous value
    RolledBack(V),
}

impl<V> PendingMutation<V> {
    /// Record a change from `previous` to `target`.
    pub fn new(previous: V, target: V) -> Self {
        Self { previous, target }
    }

    /// Value before the optimistic change.
    pub fn previous(&self) -> &V {
        &self.previous
    }

    /// Optimistically applied value.
    pub fn target(&self) -> &V {
        &self.target
    }

    /// Keep the optimistic value.
    pub fn commit(self) -> Settled<V> {
        Settled::Committed(self.target)
    }

    /// Restore the pre-mutation value.
    pub fn rollback(self) -> Settled<V> {
        Settled::RolledBack(self.previous)
    }

    /// Commit on `Ok`, roll back on any error.
    pub fn settle<T, E>(self, result: &Result<T, E>) -> Settled<V> {
        match result {
            Ok(_) => self.commit(),
            Err(_) => self.rollback(),
        }
    }
}

impl<V> Settled<V> {
    /// Whether the mutation was committed.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    /// Borrow the value to keep.
    pub fn value(&self) -> &V {
        match self {
            Self::Committed(v) | Self::RolledBack(v) => v,
        }
    }

    /// Take the value to keep.
    pub fn into_value(self) -> V {
        match self {
            Self::Committed(v) | Self::RolledBack(v) => v,
        }
    }
}

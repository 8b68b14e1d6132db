//! Optimistic engagement toggles
//!
//! Each `(user, post, kind)` key is a small state machine:
//!
//! ```text
//!   settled(applied) --begin--> pending(!applied) --ok----> settled(!applied)
//!                                                 \-error-> settled(applied)
//! ```
//!
//! The optimistic value is written to the [`EngagementStore`] synchronously in
//! [`EngagementToggle::begin`], before any remote call is issued. A second
//! `begin` on a pending key fails with `Busy` and changes nothing. The store
//! lock is never held across an `.await`.

use crate::reconciliation::{PendingMutation, Settled};
use chorus_core::{
    normalize_repost_comment, ActionKind, EngagementEffects, EngagementKey, EngagementMutation,
    EngagementState, FeedEntry, FeedError, PostId, RemoteError, Result, Transition, UserId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-key engagement state owned by one session.
#[derive(Debug, Default)]
pub struct EngagementStore {
    states: HashMap<EngagementKey, EngagementState>,
}

impl EngagementStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a key; unknown keys are settled and not applied.
    pub fn get(&self, key: &EngagementKey) -> EngagementState {
        self.states.get(key).cloned().unwrap_or_default()
    }

    /// Set a key's applied flag from an authoritative source.
    ///
    /// Pending keys are left alone and `false` is returned.
    pub fn seed(&mut self, key: EngagementKey, applied: bool) -> bool {
        let state = self.states.entry(key).or_default();
        if state.pending {
            return false;
        }
        if state.applied != applied {
            state.repost_comment = None;
        }
        state.applied = applied;
        true
    }

    /// Number of keys currently awaiting a remote outcome.
    pub fn pending_count(&self) -> usize {
        self.states.values().filter(|s| s.pending).count()
    }

    fn start(
        &mut self,
        key: &EngagementKey,
        comment: Option<String>,
    ) -> PendingMutation<EngagementState> {
        let previous = self.get(key);
        let transition = Transition::from_current(previous.applied);
        let target = EngagementState {
            applied: transition.target(),
            pending: false,
            repost_comment: match transition {
                Transition::Apply => comment,
                Transition::Revoke => None,
            },
        };
        self.states.insert(
            key.clone(),
            EngagementState {
                pending: true,
                ..target.clone()
            },
        );
        PendingMutation::new(previous, target)
    }

    fn finish(&mut self, key: &EngagementKey, settled: Settled<EngagementState>) {
        let mut state = settled.into_value();
        state.pending = false;
        self.states.insert(key.clone(), state);
    }
}

/// What the user did with the repost comment prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepostSubmission {
    /// The prompt was confirmed, with or without a comment
    Submitted {
        /// Comment text; blank is treated as absent
        comment: Option<String>,
    },
    /// The prompt was dismissed
    Cancelled,
}

impl RepostSubmission {
    /// Submission without a comment.
    pub fn plain() -> Self {
        Self::Submitted { comment: None }
    }

    /// Submission with a comment.
    pub fn with_comment(comment: impl Into<String>) -> Self {
        Self::Submitted {
            comment: Some(comment.into()),
        }
    }
}

/// Result of a repost toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The toggle ran; carries the committed `applied` value
    Applied(bool),
    /// The comment prompt was dismissed; nothing changed
    Cancelled,
}

/// Drives optimistic like/repost/save toggles for one session.
pub struct EngagementToggle<E: ?Sized> {
    effects: Arc<E>,
    store: Arc<Mutex<EngagementStore>>,
    timeout: Duration,
}

impl<E: ?Sized> Clone for EngagementToggle<E> {
    fn clone(&self) -> Self {
        Self {
            effects: Arc::clone(&self.effects),
            store: Arc::clone(&self.store),
            timeout: self.timeout,
        }
    }
}

impl<E: EngagementEffects + ?Sized> EngagementToggle<E> {
    /// Create a toggle with its own empty store.
    pub fn new(effects: Arc<E>, timeout: Duration) -> Self {
        Self::with_store(effects, Arc::new(Mutex::new(EngagementStore::new())), timeout)
    }

    /// Create a toggle over an existing store.
    pub fn with_store(
        effects: Arc<E>,
        store: Arc<Mutex<EngagementStore>>,
        timeout: Duration,
    ) -> Self {
        Self {
            effects,
            store,
            timeout,
        }
    }

    /// Shared store handle.
    pub fn store(&self) -> Arc<Mutex<EngagementStore>> {
        Arc::clone(&self.store)
    }

    /// Current state of a key.
    pub fn state(&self, key: &EngagementKey) -> EngagementState {
        self.store.lock().get(key)
    }

    /// Seed a key from an authoritative source. Pending keys are skipped.
    pub fn seed(&self, key: EngagementKey, applied: bool) -> bool {
        self.store.lock().seed(key, applied)
    }

    /// Seed every kind of every entry from the baseline viewer flags.
    pub fn seed_from_entries(&self, user: &UserId, entries: &[FeedEntry]) -> usize {
        let mut store = self.store.lock();
        let mut skipped = 0;
        for entry in entries {
            for kind in ActionKind::ALL {
                let key = EngagementKey::new(user.clone(), entry.post.id.clone(), kind);
                if !store.seed(key, kind.viewer_flag(&entry.viewer)) {
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            debug!(user = %user, skipped, "kept pending engagement keys while seeding");
        }
        skipped
    }

    /// Apply the optimistic flip for `key` and return the in-flight call.
    ///
    /// Repost keys turned on this way carry no comment.
    pub fn begin(&self, key: EngagementKey) -> Result<InFlightToggle<E>> {
        key.validate()?;
        let mut store = self.store.lock();
        if store.get(&key).pending {
            return Err(FeedError::busy(&key));
        }
        Ok(self.start_locked(&mut store, key, None))
    }

    /// Like [`begin`](Self::begin) for a repost key, honouring the comment
    /// prompt. Returns `None` when turning the repost on was cancelled.
    pub fn begin_repost(
        &self,
        user: impl Into<UserId>,
        post: impl Into<PostId>,
        submission: RepostSubmission,
    ) -> Result<Option<InFlightToggle<E>>> {
        let key = EngagementKey::new(user, post, ActionKind::Repost);
        key.validate()?;
        let mut store = self.store.lock();
        let current = store.get(&key);
        if current.pending {
            return Err(FeedError::busy(&key));
        }

        let comment = match (Transition::from_current(current.applied), submission) {
            (Transition::Revoke, _) => None,
            (Transition::Apply, RepostSubmission::Cancelled) => {
                debug!(key = %key, "repost cancelled at comment prompt");
                return Ok(None);
            }
            (Transition::Apply, RepostSubmission::Submitted { comment }) => {
                normalize_repost_comment(comment)?
            }
        };
        Ok(Some(self.start_locked(&mut store, key, comment)))
    }

    /// Flip a key and wait for the remote outcome.
    ///
    /// Returns the committed `applied` value. On failure the key is back at
    /// its pre-toggle state when the error is returned.
    pub async fn toggle(
        &self,
        user: impl Into<UserId>,
        post: impl Into<PostId>,
        kind: ActionKind,
    ) -> Result<bool> {
        self.begin(EngagementKey::new(user, post, kind))?
            .resolve()
            .await
    }

    /// Flip a repost key through the comment prompt and wait for the outcome.
    pub async fn toggle_repost(
        &self,
        user: impl Into<UserId>,
        post: impl Into<PostId>,
        submission: RepostSubmission,
    ) -> Result<ToggleOutcome> {
        match self.begin_repost(user, post, submission)? {
            Some(in_flight) => in_flight.resolve().await.map(ToggleOutcome::Applied),
            None => Ok(ToggleOutcome::Cancelled),
        }
    }

    fn start_locked(
        &self,
        store: &mut EngagementStore,
        key: EngagementKey,
        comment: Option<String>,
    ) -> InFlightToggle<E> {
        let pending = store.start(&key, comment.clone());
        let transition = Transition::from_current(pending.previous().applied);
        let mutation = EngagementMutation::for_transition(key.kind, transition, comment);
        debug!(key = %key, target = transition.target(), "engagement applied optimistically");

        InFlightToggle {
            key,
            mutation,
            pending: Some(pending),
            store: Arc::clone(&self.store),
            effects: Arc::clone(&self.effects),
            timeout: self.timeout,
        }
    }
}

/// A toggle whose optimistic value is visible and whose remote call has not
/// finished.
///
/// Dropping it without calling [`resolve`](Self::resolve), or dropping the
/// `resolve` future before it completes, rolls the key back.
#[must_use = "an in-flight toggle rolls back when dropped"]
pub struct InFlightToggle<E: ?Sized> {
    key: EngagementKey,
    mutation: EngagementMutation,
    pending: Option<PendingMutation<EngagementState>>,
    store: Arc<Mutex<EngagementStore>>,
    effects: Arc<E>,
    timeout: Duration,
}

impl<E: EngagementEffects + ?Sized> InFlightToggle<E> {
    /// Key being toggled.
    pub fn key(&self) -> &EngagementKey {
        &self.key
    }

    /// Remote mutation that will be issued.
    pub fn mutation(&self) -> &EngagementMutation {
        &self.mutation
    }

    /// Value shown to the user while the call is in flight.
    pub fn optimistic_value(&self) -> bool {
        self.mutation.transition().target()
    }

    /// Issue the remote mutation and reconcile.
    pub async fn resolve(mut self) -> Result<bool> {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let result = match tokio::time::timeout(
            self.timeout,
            self.effects.mutate_engagement(&self.key.post, &self.mutation),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout { timeout_ms }),
        };

        let Some(pending) = self.pending.take() else {
            return Err(FeedError::invalid("toggle already resolved"));
        };
        let settled = pending.settle(&result);
        let applied = settled.value().applied;
        self.store.lock().finish(&self.key, settled);

        match result {
            Ok(()) => {
                debug!(key = %self.key, applied, "engagement committed");
                Ok(applied)
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "engagement rolled back");
                Err(err.into())
            }
        }
    }
}

impl<E: ?Sized> Drop for InFlightToggle<E> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(key = %self.key, "in-flight toggle dropped, rolling back");
            self.store.lock().finish(&self.key, pending.rollback());
        }
    }
}

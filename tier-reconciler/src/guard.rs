//! At-most-once attempt guard and per-mount liveness.
//!
//! [`AttemptGuard`] is the only shared mutable resource of the protocol. Claiming it
//! is a single atomic read-then-set with no `.await` in between, so repeated runs
//! caused by unrelated identity updates cannot start a second attempt.
//!
//! [`Liveness`] is the cancellation token threaded through every asynchronous step.
//! Once a session is torn down, continuations that resume afterwards must not mutate
//! state, emit analytics, or navigate.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::watch;

/// Outcome of a reconciliation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Not started, or started and still in flight.
    Pending,
    /// Reached the `success` state.
    Success,
    /// Reached the `error` state.
    Error,
}

/// Snapshot of the per-mount attempt record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationAttempt {
    /// Whether the guard has been claimed.
    pub started: bool,
    /// How the attempt ended, if it has.
    pub outcome: AttemptOutcome,
}

/// Guard granting exactly one reconciliation attempt per mount.
///
/// Acquisition depends only on whether an attempt already started, never on the
/// token or identity, which may legitimately change between runs. The guard is never
/// reset; a retry mounts a fresh session with a fresh guard.
///
/// # Examples
///
/// ```
/// use tier_reconciler::guard::AttemptGuard;
///
/// let guard = AttemptGuard::new();
/// assert!(guard.try_acquire());
/// assert!(!guard.try_acquire());
/// ```
#[derive(Debug, Default)]
pub struct AttemptGuard {
    started: AtomicBool,
}

impl AttemptGuard {
    /// Creates an unclaimed guard.
    #[must_use]
    pub const fn new() -> Self {
        Self { started: AtomicBool::new(false) }
    }

    /// Claims the guard. Returns `true` for the first caller only.
    #[must_use = "the attempt may only proceed when the guard was acquired"]
    pub fn try_acquire(&self) -> bool {
        self.started.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    /// Whether the guard has been claimed.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

/// Cancellation token tied to the lifetime of one mounted session.
///
/// Clones share state. Teardown is one-way.
#[derive(Debug, Clone)]
pub struct Liveness {
    alive: Arc<watch::Sender<bool>>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    /// Creates a live token.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { alive: Arc::new(tx) }
    }

    /// Whether the owning session is still mounted.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        *self.alive.borrow()
    }

    /// Marks the owning session as torn down and wakes every waiter.
    pub fn teardown(&self) {
        self.alive.send_replace(false);
    }

    /// Completes once [`teardown`](Self::teardown) has been called.
    pub async fn torn_down(&self) {
        let mut rx = self.alive.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|alive| !*alive).await;
    }
}

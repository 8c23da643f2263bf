//! Reconciliation state machine.
//!
//! ```text
//!              ┌──────────> success
//! processing ──┤
//!              └──────────> error
//! ```
//!
//! `processing` is the initial state. Exactly one transition into a terminal state is
//! accepted; every later transition is ignored, so a terminal state never reverts.
//! The UI observes the state through a [`watch::Receiver`].

use serde::Serialize;
use tokio::sync::watch;

use crate::{
    account::Tier,
    error::{ErrorKind, ReconcileError},
};

/// Message shown while an attempt is in flight.
pub const PROCESSING_MESSAGE: &str = "Confirming your upgrade...";

/// How a successful reconciliation confirmed the upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPath {
    /// The cached account already showed the target tier.
    AlreadyApplied,
    /// No token; the status endpoint reported the subscription active.
    StatusProbe,
    /// The completion endpoint accepted the checkout token.
    Completion,
}

impl ConfirmationPath {
    /// User-facing confirmation message for this path.
    #[must_use]
    pub fn message(self, tier: Tier) -> String {
        match self {
            Self::AlreadyApplied => {
                format!("Your account is already on {}. You're all set!", tier.display_name())
            }
            Self::StatusProbe => {
                format!("Your {} upgrade has already been applied.", tier.display_name())
            }
            Self::Completion => format!("Upgrade complete! Welcome to {}.", tier.display_name()),
        }
    }

    /// Whether the cached user must be refreshed after confirming on this path.
    #[must_use]
    pub const fn needs_refresh(self) -> bool {
        !matches!(self, Self::AlreadyApplied)
    }
}

/// Action the UI offers from a terminal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Affordance {
    /// Reload the whole reconciliation as a fresh attempt.
    Retry,
    /// Navigate to the home surface manually.
    GoHome,
    /// Sign in again.
    SignIn,
}

/// State rendered by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationState {
    /// Attempt in flight, or waiting for identity.
    Processing {
        /// Progress message.
        message: String,
    },
    /// The upgrade is confirmed.
    Success {
        /// Confirmation message.
        message: String,
        /// Confirmed tier.
        tier: Tier,
        /// How it was confirmed.
        path: ConfirmationPath,
    },
    /// The attempt failed.
    Error {
        /// User-facing failure message.
        message: String,
        /// Failure classification.
        kind: ErrorKind,
    },
}

impl Default for ReconciliationState {
    fn default() -> Self {
        Self::Processing { message: PROCESSING_MESSAGE.to_owned() }
    }
}

impl ReconciliationState {
    /// Whether this state is `success` or `error`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing { .. })
    }

    /// The message to render.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Processing { message }
            | Self::Success { message, .. }
            | Self::Error { message, .. } => message,
        }
    }

    /// Short state name: `processing`, `success` or `error`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Processing { .. } => "processing",
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
        }
    }

    /// Actions offered to the user in this state.
    #[must_use]
    pub fn affordances(&self) -> Vec<Affordance> {
        match self {
            Self::Processing { .. } | Self::Success { .. } => Vec::new(),
            Self::Error { kind: ErrorKind::MissingCredential, .. } => {
                vec![Affordance::SignIn, Affordance::Retry, Affordance::GoHome]
            }
            Self::Error { .. } => vec![Affordance::Retry, Affordance::GoHome],
        }
    }
}

/// Holder of the current [`ReconciliationState`] enforcing the transition rules.
#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<ReconciliationState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Creates a machine in `processing`.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ReconciliationState::default());
        Self { tx }
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn current(&self) -> ReconciliationState {
        self.tx.borrow().clone()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ReconciliationState> {
        self.tx.subscribe()
    }

    /// Moves to `success`. Returns `false` if the machine was already terminal.
    pub fn succeed(&self, tier: Tier, path: ConfirmationPath) -> bool {
        self.finish(ReconciliationState::Success { message: path.message(tier), tier, path })
    }

    /// Moves to `error` with the error's user-facing message. Returns `false` if the
    /// machine was already terminal.
    pub fn fail(&self, error: &ReconcileError) -> bool {
        self.finish(ReconciliationState::Error { message: error.to_string(), kind: error.kind() })
    }

    fn finish(&self, next: ReconciliationState) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_terminal() {
                tracing::debug!(
                    current = state.name(),
                    rejected = next.name(),
                    "ignoring transition out of terminal state"
                );
                return false;
            }
            *state = next;
            true
        })
    }
}

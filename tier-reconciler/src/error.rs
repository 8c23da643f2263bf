//! Error types for tier reconciliation.
//!
//! Every failure the reconciliation protocol can hit is a [`ReconcileError`]. The
//! protocol catches them all at its top level and maps them into the terminal
//! `error` state, so the `Display` text of each variant is the message shown to the
//! user.
//!
//! # Error Categories
//!
//! - **Identity** ([`ReconcileError::MissingCredential`]): the user must sign in again
//! - **Pending upgrade** ([`ReconcileError::MissingSessionToken`]): wait and refresh
//! - **Support cases** ([`ReconcileError::StatusMismatch`]): contact support
//! - **Server decisions** ([`ReconcileError::ServerRejected`]): reason shown verbatim
//! - **Network** ([`ReconcileError::TransportFailure`]): safe to retry
//! - **Setup** ([`ReconcileError::InvalidConfig`], [`ReconcileError::InvalidUrl`],
//!   [`ReconcileError::InvalidToken`]): fix the input
//!
//! # Examples
//!
//! ```
//! use tier_reconciler::error::{ErrorKind, ReconcileError};
//!
//! let err = ReconcileError::ServerRejected("Session already used".to_owned());
//! assert_eq!(err.to_string(), "Session already used");
//! assert_eq!(err.kind(), ErrorKind::ServerRejected);
//! ```

use std::fmt;

use thiserror::Error;

use crate::account::Tier;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Network operation that failed to produce a usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `POST` to the upgrade completion endpoint.
    Completion,
    /// `GET` of the subscription status endpoint.
    StatusProbe,
    /// `GET` of the current account, used to refresh the cached user.
    AccountRefresh,
}

impl Operation {
    /// User-facing message for a transport failure during this operation.
    #[must_use]
    pub const fn failure_message(self) -> &'static str {
        match self {
            Self::Completion => {
                "Network failure while confirming your upgrade. Your payment may not be \
                 applied yet; please retry in a moment."
            }
            Self::StatusProbe => {
                "Could not verify your subscription status. Please check your connection \
                 and retry."
            }
            Self::AccountRefresh => "Could not refresh your account details.",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completion => "completion",
            Self::StatusProbe => "status_probe",
            Self::AccountRefresh => "account_refresh",
        })
    }
}

/// Errors that can occur while reconciling an upgrade.
///
/// # Error Recovery
///
/// - [`MissingCredential`](Self::MissingCredential): sign in again, then retry
/// - [`MissingSessionToken`](Self::MissingSessionToken): the webhook may still be
///   running; wait and refresh
/// - [`StatusMismatch`](Self::StatusMismatch): not recoverable client-side
/// - [`ServerRejected`](Self::ServerRejected): depends on the reason
/// - [`TransportFailure`](Self::TransportFailure): retry; completion is idempotent per
///   token server-side
#[must_use = "errors should be handled, propagated, or explicitly panicked"]
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// No authenticated identity, or the server refused the bearer credential.
    #[error("You are not signed in. Please sign in again to finish your upgrade.")]
    MissingCredential,

    /// No checkout token reached the client and the server does not report the
    /// subscription yet.
    #[error(
        "Missing session information. Your upgrade may still be processing; wait a minute \
         and refresh this page."
    )]
    MissingSessionToken,

    /// The server reports an active subscription on a different tier.
    #[error(
        "Subscription status mismatch (expected {expected}, found {actual}). Please contact \
         support."
    )]
    StatusMismatch {
        /// Tier the checkout was for.
        expected: Tier,
        /// Tier string the server reported.
        actual: String,
    },

    /// The completion endpoint explicitly declined the upgrade.
    #[error("{0}")]
    ServerRejected(String),

    /// No usable response was received.
    #[error("{}", .operation.failure_message())]
    TransportFailure {
        /// Which call failed.
        operation: Operation,
        /// Developer-facing detail; never shown to the user.
        detail: String,
    },

    /// The session was torn down while an asynchronous step was in flight.
    #[error("reconciliation abandoned after teardown")]
    Cancelled,

    /// Configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A URL could not be parsed or violates the URL policy.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A checkout token failed validation.
    #[error("Invalid checkout token: {0}")]
    InvalidToken(String),
}

/// Copyable classification of a [`ReconcileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`ReconcileError::MissingCredential`].
    MissingCredential,
    /// See [`ReconcileError::MissingSessionToken`].
    MissingSessionToken,
    /// See [`ReconcileError::StatusMismatch`].
    StatusMismatch,
    /// See [`ReconcileError::ServerRejected`].
    ServerRejected,
    /// See [`ReconcileError::TransportFailure`].
    TransportFailure,
    /// Cancellation and setup errors.
    Internal,
}

impl ReconcileError {
    /// Builds a transport failure for `operation`.
    pub fn transport(operation: Operation, detail: impl Into<String>) -> Self {
        Self::TransportFailure { operation, detail: detail.into() }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential => ErrorKind::MissingCredential,
            Self::MissingSessionToken => ErrorKind::MissingSessionToken,
            Self::StatusMismatch { .. } => ErrorKind::StatusMismatch,
            Self::ServerRejected(_) => ErrorKind::ServerRejected,
            Self::TransportFailure { .. } => ErrorKind::TransportFailure,
            Self::Cancelled
            | Self::InvalidConfig(_)
            | Self::InvalidUrl(_)
            | Self::InvalidToken(_) => ErrorKind::Internal,
        }
    }

    /// Whether the user has to sign in before a retry can succeed.
    #[must_use]
    pub const fn requires_sign_in(&self) -> bool {
        matches!(self, Self::MissingCredential)
    }

    /// Whether a user-triggered retry of the whole attempt is worthwhile.
    #[must_use]
    pub const fn is_retry_safe(&self) -> bool {
        matches!(self, Self::TransportFailure { .. } | Self::MissingSessionToken)
    }
}

//! Upgrade API abstraction.
//!
//! [`UpgradeApi`] is the seam between the reconciliation protocol and the server.
//! [`HttpUpgradeApi`] talks to the real endpoints with reqwest; tests substitute
//! in-process implementations.
//!
//! Response interpretation is kept in pure functions ([`interpret_completion`],
//! [`interpret_status`], [`interpret_account`]) so the mapping from raw HTTP
//! responses to the error taxonomy can be tested without a network:
//!
//! | Response | Completion | Status probe |
//! |----------|------------|--------------|
//! | 401 / 403 | `MissingCredential` | `MissingCredential` |
//! | decodable body | parsed response | parsed snapshot (2xx only) |
//! | anything else | `TransportFailure` | `TransportFailure` |

#[allow(
    redundant_imports,
    reason = "Future needed for RPITIT despite being in Edition 2024 prelude"
)]
use std::future::Future;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    account::{BearerCredential, SubscriptionStatusSnapshot, Tier, UserAccount},
    error::{Operation, ReconcileError, Result},
    token::CheckoutToken,
};

pub mod http;

pub use http::HttpUpgradeApi;

/// Body of `POST /api/complete-upgrade`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest<'a> {
    /// Checkout token.
    pub session_id: &'a str,
}

/// User fragment returned by a successful completion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompletedUser {
    /// Tier after the upgrade, as reported by the server.
    pub tier: String,
}

/// Response of the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompletionResponse {
    /// Whether the server applied the upgrade.
    pub success: bool,
    /// Updated user, present on success.
    #[serde(default)]
    pub user: Option<CompletedUser>,
    /// Machine-oriented rejection reason.
    #[serde(default)]
    pub error: Option<String>,
    /// Human-oriented message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Fallback shown when a rejection carries neither `error` nor `message`.
pub const GENERIC_REJECTION: &str = "We couldn't complete your upgrade. Please contact support.";

impl CompletionResponse {
    /// Tier reported in `user.tier`, if present and recognised.
    #[must_use]
    pub fn reported_tier(&self) -> Option<Tier> {
        self.user.as_ref().and_then(|user| user.tier.parse().ok())
    }

    /// Rejection reason: `error`, then `message`, then [`GENERIC_REJECTION`].
    #[must_use]
    pub fn rejection_reason(&self) -> String {
        [self.error.as_deref(), self.message.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|reason| !reason.is_empty())
            .unwrap_or(GENERIC_REJECTION)
            .to_owned()
    }
}

/// Server operations the reconciler depends on.
///
/// Every call carries the session's bearer credential. Implementations return
/// [`ReconcileError::MissingCredential`] when the server refuses the credential and
/// [`ReconcileError::TransportFailure`] when no usable response was received.
pub trait UpgradeApi: Send + Sync {
    /// Submits the checkout token to the completion endpoint.
    ///
    /// This is the only mutating call.
    ///
    /// # Errors
    ///
    /// Returns an error if no decodable response was received.
    fn complete_upgrade<'a>(
        &'a self,
        credential: &'a BearerCredential,
        token: &'a CheckoutToken,
    ) -> impl Future<Output = Result<CompletionResponse>> + Send + 'a;

    /// Fetches the authoritative subscription status.
    ///
    /// # Errors
    ///
    /// Returns an error if the status could not be retrieved.
    fn subscription_status<'a>(
        &'a self,
        credential: &'a BearerCredential,
    ) -> impl Future<Output = Result<SubscriptionStatusSnapshot>> + Send + 'a;

    /// Fetches the current account.
    ///
    /// # Errors
    ///
    /// Returns an error if the account could not be retrieved.
    fn current_account<'a>(
        &'a self,
        credential: &'a BearerCredential,
    ) -> impl Future<Output = Result<UserAccount>> + Send + 'a;
}

const fn is_auth_rejection(status: u16) -> bool {
    status == 401 || status == 403
}

const fn is_success(status: u16) -> bool {
    status >= 200 && status < 300
}

/// Maps a raw completion response.
///
/// Rejections usually arrive as non-2xx with a decodable `{success: false, ..}`
/// body, which is returned as-is so the reason can be shown. A non-2xx response
/// claiming `success: true` is contradictory and treated as a transport failure.
///
/// # Errors
///
/// Returns [`ReconcileError::MissingCredential`] on 401/403 and
/// [`ReconcileError::TransportFailure`] when the body cannot be used.
pub fn interpret_completion(status: u16, body: &[u8]) -> Result<CompletionResponse> {
    if is_auth_rejection(status) {
        return Err(ReconcileError::MissingCredential);
    }
    match serde_json::from_slice::<CompletionResponse>(body) {
        Ok(response) if is_success(status) || !response.success => Ok(response),
        Ok(_) => Err(ReconcileError::transport(
            Operation::Completion,
            format!("status {status} with a success body"),
        )),
        Err(e) => Err(ReconcileError::transport(
            Operation::Completion,
            format!("status {status} with undecodable body: {e}"),
        )),
    }
}

/// Maps a raw subscription status response.
///
/// # Errors
///
/// Returns [`ReconcileError::MissingCredential`] on 401/403 and
/// [`ReconcileError::TransportFailure`] for any other non-2xx or undecodable body.
pub fn interpret_status(status: u16, body: &[u8]) -> Result<SubscriptionStatusSnapshot> {
    decode_success(Operation::StatusProbe, status, body)
}

/// Maps a raw current-account response.
///
/// # Errors
///
/// Same mapping as [`interpret_status`].
pub fn interpret_account(status: u16, body: &[u8]) -> Result<UserAccount> {
    decode_success(Operation::AccountRefresh, status, body)
}

fn decode_success<T: DeserializeOwned>(
    operation: Operation,
    status: u16,
    body: &[u8],
) -> Result<T> {
    if is_auth_rejection(status) {
        return Err(ReconcileError::MissingCredential);
    }
    if !is_success(status) {
        return Err(ReconcileError::transport(
            operation,
            format!("server returned status {status}"),
        ));
    }
    serde_json::from_slice(body).map_err(|e| {
        ReconcileError::transport(operation, format!("undecodable {operation} body: {e}"))
    })
}

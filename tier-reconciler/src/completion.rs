//! Completion invoker.
//!
//! Submits the checkout token to the completion endpoint. This is the only mutating
//! call in the protocol; the session's guard ensures it runs at most once per mount
//! and never alongside the status probe.

use tracing::{info, instrument, warn};

use crate::{
    account::{BearerCredential, Tier},
    api::UpgradeApi,
    error::{ReconcileError, Result},
    guard::Liveness,
    token::CheckoutToken,
};

/// Submits `token` and interprets the result.
///
/// On success returns the tier reported by the server, falling back to `target` when
/// the response carries no recognisable tier.
///
/// # Errors
///
/// Returns [`ReconcileError::ServerRejected`] with the server's reason when
/// `success` is false, the API error when no usable response arrived, or
/// [`ReconcileError::Cancelled`] if the session was torn down while waiting.
#[instrument(skip_all, fields(token = %token.redacted(), %target))]
pub async fn invoke_completion<A: UpgradeApi>(
    api: &A,
    credential: &BearerCredential,
    token: &CheckoutToken,
    target: Tier,
    liveness: &Liveness,
) -> Result<Tier> {
    info!("submitting checkout token for completion");
    let response = api.complete_upgrade(credential, token).await;
    if !liveness.is_alive() {
        return Err(ReconcileError::Cancelled);
    }
    let response = response?;

    if !response.success {
        let reason = response.rejection_reason();
        warn!(%reason, "completion rejected by server");
        return Err(ReconcileError::ServerRejected(reason));
    }

    let tier = response.reported_tier().unwrap_or_else(|| {
        warn!("completion response carried no recognised tier, assuming target");
        target
    });
    if !tier.satisfies(target) {
        warn!(%tier, "server reported a tier below the checkout target");
    }
    info!(%tier, "upgrade completed");
    Ok(tier)
}

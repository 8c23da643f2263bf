//! Status fallback probe.
//!
//! Used only when no checkout token reached the client, for example after the user
//! closed the return tab and opened the page again. The webhook may still have
//! upgraded the account, so the server's subscription status is asked directly.
//!
//! | subscribed | tier == target | outcome |
//! |------------|----------------|---------|
//! | true | true | confirmed |
//! | true | false | [`ReconcileError::StatusMismatch`] |
//! | false | any | [`ReconcileError::MissingSessionToken`] |
//!
//! A refused credential surfaces as [`ReconcileError::MissingCredential`] and any
//! other failure as a status-probe [`ReconcileError::TransportFailure`], so "could
//! not verify" stays distinct from "not upgraded".

use tracing::{info, instrument};

use crate::{
    account::{BearerCredential, SubscriptionStatusSnapshot, Tier},
    api::UpgradeApi,
    error::{ReconcileError, Result},
    guard::Liveness,
};

/// Fetches the subscription status and applies the decision table.
///
/// # Errors
///
/// Returns the decision-table error, the API error, or
/// [`ReconcileError::Cancelled`] if the session was torn down while waiting.
#[instrument(skip_all, fields(%target))]
pub async fn probe_status<A: UpgradeApi>(
    api: &A,
    credential: &BearerCredential,
    target: Tier,
    liveness: &Liveness,
) -> Result<Tier> {
    info!("no checkout token, probing subscription status");
    let snapshot = api.subscription_status(credential).await;
    if !liveness.is_alive() {
        return Err(ReconcileError::Cancelled);
    }
    let snapshot = snapshot?;
    info!(subscribed = snapshot.subscribed, tier = %snapshot.tier, "subscription status received");
    evaluate_snapshot(&snapshot, target)
}

/// Applies the decision table to a snapshot.
///
/// # Errors
///
/// Returns [`ReconcileError::MissingSessionToken`] when not subscribed and
/// [`ReconcileError::StatusMismatch`] when subscribed on another tier.
pub fn evaluate_snapshot(snapshot: &SubscriptionStatusSnapshot, target: Tier) -> Result<Tier> {
    if !snapshot.subscribed {
        return Err(ReconcileError::MissingSessionToken);
    }
    match snapshot.parsed_tier() {
        Some(tier) if tier == target => Ok(tier),
        _ => Err(ReconcileError::StatusMismatch {
            expected: target,
            actual: snapshot.tier.clone(),
        }),
    }
}

//! Short-circuit for upgrades the webhook already applied.
//!
//! The payment provider's webhook can update the account before the browser finishes
//! its own completion round-trip. When the cached tier already satisfies the target
//! there is nothing to reconcile: no network call is made and the checkout token is
//! left unused.

use crate::account::Tier;

/// Result of comparing the cached tier against the checkout's target tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierPrecheck {
    /// The cached tier meets or exceeds the target.
    AlreadyUpgraded,
    /// The cached tier is below the target.
    NeedsUpgrade,
}

/// Compares `current` against `target`.
///
/// # Examples
///
/// ```
/// use tier_reconciler::{
///     account::Tier,
///     precheck::{TierPrecheck, precheck},
/// };
///
/// assert_eq!(precheck(Tier::Elite, Tier::Pro), TierPrecheck::AlreadyUpgraded);
/// assert_eq!(precheck(Tier::Free, Tier::Pro), TierPrecheck::NeedsUpgrade);
/// ```
#[must_use]
pub fn precheck(current: Tier, target: Tier) -> TierPrecheck {
    if current.satisfies(target) {
        TierPrecheck::AlreadyUpgraded
    } else {
        TierPrecheck::NeedsUpgrade
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_tier_is_upgraded() {
        assert_eq!(precheck(Tier::Pro, Tier::Pro), TierPrecheck::AlreadyUpgraded);
    }

    #[test]
    fn test_lower_tier_needs_upgrade() {
        assert_eq!(precheck(Tier::Free, Tier::Elite), TierPrecheck::NeedsUpgrade);
        assert_eq!(precheck(Tier::Pro, Tier::Elite), TierPrecheck::NeedsUpgrade);
    }
}

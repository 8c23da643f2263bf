//! Account and identity data models.
//!
//! The reconciler only ever reads the cached [`UserAccount`]. Tier changes reach
//! the cache through a refresh, never through a direct write.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

/// Subscription level of an account.
///
/// Tiers are ordered: `Free < Pro < Elite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Unpaid tier.
    Free,
    /// First paid tier.
    Pro,
    /// Highest paid tier.
    Elite,
}

impl Tier {
    /// Returns the wire name of the tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Elite => "elite",
        }
    }

    /// Returns the name shown to users.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Pro => "Pro",
            Self::Elite => "Elite",
        }
    }

    /// Whether this tier is paid.
    #[must_use]
    pub const fn is_paid(self) -> bool {
        !matches!(self, Self::Free)
    }

    /// Whether this tier meets or exceeds `target`.
    #[must_use]
    pub fn satisfies(self, target: Self) -> bool {
        self >= target
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "elite" => Ok(Self::Elite),
            other => Err(ReconcileError::InvalidConfig(format!("unknown tier: {other}"))),
        }
    }
}

/// Cached view of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    /// Account identifier.
    pub id: String,
    /// Current subscription tier.
    pub tier: Tier,
    /// Remaining credit balance.
    #[serde(default)]
    pub credits: u64,
    /// Whether the onboarding flow is still pending.
    #[serde(default)]
    pub needs_onboarding: bool,
}

impl UserAccount {
    /// Creates an account with zero credits and onboarding complete.
    pub fn new(id: impl Into<String>, tier: Tier) -> Self {
        Self { id: id.into(), tier, credits: 0, needs_onboarding: false }
    }
}

/// Bearer credential issued by the identity provider.
///
/// The value is never printed: `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerCredential(String);

impl BearerCredential {
    /// Wraps a raw bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for the `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerCredential(***)")
    }
}

/// A resolved, authenticated identity.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Credential sent with every request.
    pub credential: BearerCredential,
    /// Cached account at the time the identity resolved.
    pub account: UserAccount,
}

/// Identity as observed by the page.
///
/// Identity resolves asynchronously, so the same session sees `Resolving` first and
/// one of the other two variants later.
#[derive(Debug, Clone)]
pub enum IdentityState {
    /// The identity provider has not answered yet.
    Resolving,
    /// Resolution finished and nobody is signed in.
    SignedOut,
    /// Resolution finished with an authenticated user.
    SignedIn(Identity),
}

/// Authoritative subscription status reported by the server.
///
/// Only valid at fetch time; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionStatusSnapshot {
    /// Whether the account has an active paid subscription.
    pub subscribed: bool,
    /// Tier string as reported by the server.
    #[serde(default)]
    pub tier: String,
}

impl SubscriptionStatusSnapshot {
    /// Parses the reported tier, if it names a known tier.
    #[must_use]
    pub fn parsed_tier(&self) -> Option<Tier> {
        self.tier.parse().ok()
    }
}

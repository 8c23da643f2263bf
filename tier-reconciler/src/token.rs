//! Checkout token resolution.
//!
//! After checkout the payment provider sends the browser back with the checkout
//! session identifier somewhere in the URL. Upstream naming has drifted over time,
//! so several encodings are accepted. Sources are checked in a fixed order and the
//! first valid match wins:
//!
//! 1. the primary query parameter
//! 2. each alias query parameter, in configured order
//! 3. any of those names inside the URL fragment
//! 4. a raw scan of the full URL string, which also catches double-encoded returns
//!
//! # Examples
//!
//! ```
//! use tier_reconciler::token::{NavigationContext, TokenParams, resolve_token};
//!
//! let ctx = NavigationContext::from_url("https://app.example.com/upgrade?sessionId=cs_test_42")?;
//! let token = resolve_token(&ctx, &TokenParams::default()).unwrap();
//! assert_eq!(token.as_str(), "cs_test_42");
//! # Ok::<(), tier_reconciler::error::ReconcileError>(())
//! ```

use std::fmt;

use serde::Deserialize;
use url::{Url, form_urlencoded};

use crate::error::{ReconcileError, Result};

/// Maximum accepted token length in bytes.
const MAX_TOKEN_LEN: usize = 255;

/// Opaque identifier of one checkout transaction.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CheckoutToken(String);

impl CheckoutToken {
    /// Validates and wraps a checkout token.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidToken`] if the token is empty, longer than 255
    /// bytes, or contains anything besides ASCII alphanumerics, `_` and `-`. Unreplaced
    /// provider placeholders such as `{CHECKOUT_SESSION_ID}` fail the character check.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(ReconcileError::InvalidToken("token cannot be empty".into()));
        }
        if token.len() > MAX_TOKEN_LEN {
            return Err(ReconcileError::InvalidToken(format!(
                "token must be {MAX_TOKEN_LEN} bytes or less"
            )));
        }
        if !token.bytes().all(is_token_byte) {
            return Err(ReconcileError::InvalidToken(
                "token can only contain alphanumeric characters, hyphens, and underscores".into(),
            ));
        }
        Ok(Self(token))
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a form safe for logs.
    ///
    /// Shows the prefix up to the first `_`, or a quarter of the token without one,
    /// and never more than half of it.
    #[must_use]
    pub fn redacted(&self) -> String {
        let len = self.0.len();
        let end = self.0.find('_').map_or(len / 4, |i| i + 1).min(len / 2);
        // Tokens are ASCII, so any byte index is a char boundary.
        format!("{}***", &self.0[..end])
    }
}

impl fmt::Debug for CheckoutToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CheckoutToken({})", self.redacted())
    }
}

const fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Parameter names under which the token may arrive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenParams {
    /// Name checked first.
    #[serde(default = "default_primary")]
    pub primary: String,
    /// Alternate names, checked in order after the primary.
    #[serde(default = "default_aliases")]
    pub aliases: Vec<String>,
}

impl Default for TokenParams {
    fn default() -> Self {
        Self { primary: default_primary(), aliases: default_aliases() }
    }
}

impl TokenParams {
    /// Iterates the primary name followed by the aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Validates the parameter names.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] if a name is empty or not URL-safe,
    /// fewer than two aliases are configured, or a name repeats.
    pub fn validate(&self) -> Result<()> {
        if self.aliases.len() < 2 {
            return Err(ReconcileError::InvalidConfig(
                "token.aliases must list at least two alternate parameter names".into(),
            ));
        }
        let mut seen = Vec::with_capacity(self.aliases.len() + 1);
        for name in self.names() {
            if name.is_empty() || !name.bytes().all(is_token_byte) {
                return Err(ReconcileError::InvalidConfig(format!(
                    "invalid token parameter name: '{name}'"
                )));
            }
            if seen.contains(&name) {
                return Err(ReconcileError::InvalidConfig(format!(
                    "duplicate token parameter name: '{name}'"
                )));
            }
            seen.push(name);
        }
        Ok(())
    }
}

fn default_primary() -> String {
    "session_id".to_owned()
}

fn default_aliases() -> Vec<String> {
    vec!["sessionId".to_owned(), "checkout_session_id".to_owned()]
}

/// Read-only view of the navigation that brought the user to the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationContext {
    query: Vec<(String, String)>,
    fragment: Option<String>,
    full_url: String,
}

impl NavigationContext {
    /// Builds a context from already-split parts.
    #[must_use]
    pub fn new(query: Vec<(String, String)>, fragment: Option<String>, full_url: String) -> Self {
        Self { query, fragment, full_url }
    }

    /// Parses a full URL into its query pairs and fragment.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidUrl`] if `raw` is not an absolute URL.
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| ReconcileError::InvalidUrl(format!("{raw}: {e}")))?;
        let query = url.query_pairs().into_owned().collect();
        let fragment = url.fragment().map(str::to_owned);
        Ok(Self { query, fragment, full_url: raw.to_owned() })
    }

    /// Returns the first value of query parameter `name`.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// Returns the fragment without the leading `#`.
    #[must_use]
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Returns the URL string exactly as received.
    #[must_use]
    pub fn full_url(&self) -> &str {
        &self.full_url
    }
}

/// Resolves the checkout token from the navigation context.
///
/// Pure and synchronous. Candidates that fail [`CheckoutToken::new`] are skipped and
/// resolution continues with the next source.
#[must_use]
pub fn resolve_token(ctx: &NavigationContext, params: &TokenParams) -> Option<CheckoutToken> {
    params
        .names()
        .find_map(|name| ctx.query_param(name).and_then(accept))
        .or_else(|| ctx.fragment().and_then(|fragment| from_fragment(fragment, params)))
        .or_else(|| params.names().find_map(|name| scan_full_url(ctx.full_url(), name)))
}

fn accept(candidate: &str) -> Option<CheckoutToken> {
    CheckoutToken::new(candidate.trim()).ok()
}

/// Fragment forms: `#session_id=..`, `#?session_id=..` and hash routes such as
/// `#/billing/success?session_id=..`.
fn from_fragment(fragment: &str, params: &TokenParams) -> Option<CheckoutToken> {
    let pairs = fragment.rsplit_once('?').map_or(fragment, |(_, query)| query);
    let parsed: Vec<(String, String)> =
        form_urlencoded::parse(pairs.as_bytes()).into_owned().collect();
    params.names().find_map(|name| {
        parsed.iter().find(|(key, _)| key == name).and_then(|(_, value)| accept(value))
    })
}

/// Scans the raw URL for `name=value` or `name%3Dvalue`.
///
/// The value ends at the first byte that cannot be part of a token, so `&`, `#` and
/// any percent escape (including `%26`) terminate it.
fn scan_full_url(url: &str, name: &str) -> Option<CheckoutToken> {
    let bytes = url.as_bytes();
    url.match_indices(name).find_map(|(start, _)| {
        let escaped_separator = start >= 3 && bytes[start - 3] == b'%';
        if start > 0 && is_token_byte(bytes[start - 1]) && !escaped_separator {
            return None;
        }
        let rest = &url[start + name.len()..];
        let value = if let Some(value) = rest.strip_prefix('=') {
            value
        } else if rest.as_bytes().get(..3).is_some_and(|b| b.eq_ignore_ascii_case(b"%3D")) {
            &rest[3..]
        } else {
            return None;
        };
        let end = value.bytes().position(|b| !is_token_byte(b)).unwrap_or(value.len());
        accept(&value[..end])
    })
}

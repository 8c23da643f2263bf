//! Tier Reconciler: Client-Driven Confirmation of Paid Upgrades
//!
//! After a hosted checkout the payment provider sends the user back to the
//! application. This crate confirms on that return visit that the account was
//! upgraded, exactly once per visit, whether or not the checkout token survived the
//! redirect and whether or not the provider's webhook already applied the upgrade.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   identity changes   ┌─────────────────────────────┐
//! │  Host page / CLI │─────────────────────>│   ReconciliationSession     │
//! └──────────────────┘                      │  token ─ guard ─ liveness   │
//!          ▲                                │        │                    │
//!          │ watch::Receiver                │   precheck(cached tier)     │
//!          │                                │    ┌───┴────┐               │
//!          │                                │ completion  status probe    │
//!          │                                └────┬────────────────────────┘
//!          │                                     │ UpgradeApi (HTTPS)
//!          │       ┌─────────────────────────────▼──┐
//!          └───────│ StateMachine + side effects    │ refresh, analytics,
//!                  └────────────────────────────────┘ delayed redirect
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tier_reconciler::{
//!     AccountCache, HttpUpgradeApi, NavigationContext, Reconciler, ReconcilerConfig,
//!     account::{BearerCredential, Identity, IdentityState, Tier, UserAccount},
//!     analytics::TracingAnalytics,
//!     effects::Navigator,
//! };
//!
//! struct Log;
//!
//! impl Navigator for Log {
//!     fn navigate(&self, path: &str) {
//!         println!("navigate to {path}");
//!     }
//! }
//!
//! # async fn example() -> tier_reconciler::Result<()> {
//! let config = ReconcilerConfig::new("https://app.example.com");
//! let api = Arc::new(HttpUpgradeApi::new(&config)?);
//! let cache = Arc::new(AccountCache::new(Arc::clone(&api), None));
//! let analytics = Arc::new(TracingAnalytics);
//! let reconciler = Reconciler::new(&config, api, cache, analytics, Arc::new(Log))?;
//!
//! let return_url = "https://app.example.com/upgrade?session_id=sess_123";
//! let navigation = NavigationContext::from_url(return_url)?;
//! let session = reconciler.mount(navigation);
//! let identity = IdentityState::SignedIn(Identity {
//!     credential: BearerCredential::new("token-from-identity-provider"),
//!     account: UserAccount::new("user-1", Tier::Free),
//! });
//!
//! let state = session.run(&identity).await;
//! println!("{}: {}", state.name(), state.message());
//! session.redirect_finished().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`token`]: checkout token validation and resolution from the return URL
//! - [`guard`]: at-most-once attempt guard and per-session liveness
//! - [`precheck`]: short-circuit when the cached tier already satisfies the target
//! - [`completion`]: the mutating completion call
//! - [`probe`]: subscription status fallback when no token is available
//! - [`state`]: `processing` / `success` / `error` state machine
//! - [`effects`]: cache refresh, analytics and the delayed redirect
//! - [`reconciler`]: sessions tying the above together
//! - [`api`]: the server seam and its reqwest implementation
//! - [`config`]: TOML configuration
//! - [`error`]: error taxonomy with user-facing messages
//!
//! # Error Handling
//!
//! Failures end the session in the `error` state with a message chosen by error
//! kind. Transport failures ("could not verify") are kept distinct from server
//! rejections ("not upgraded"):
//!
//! ```rust
//! use tier_reconciler::{ErrorKind, ReconcileError, error::Operation};
//!
//! let rejected = ReconcileError::ServerRejected("Checkout session expired".into());
//! let offline = ReconcileError::transport(Operation::Completion, "connection reset");
//!
//! assert_eq!(rejected.kind(), ErrorKind::ServerRejected);
//! assert_eq!(offline.kind(), ErrorKind::TransportFailure);
//! assert_ne!(rejected.to_string(), offline.to_string());
//! assert!(offline.is_retry_safe());
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions, reason = "transitive dependencies from reqwest")]

pub mod account;
pub mod analytics;
pub mod api;
pub mod completion;
pub mod config;
pub mod effects;
pub mod error;
pub mod guard;
pub mod precheck;
pub mod probe;
pub mod reconciler;
pub mod state;
pub mod token;

#[cfg(test)]
mod testing;

pub use api::{HttpUpgradeApi, UpgradeApi};
pub use config::ReconcilerConfig;
pub use effects::{AccountCache, Navigator, UserCache};
pub use error::{ErrorKind, ReconcileError, Result};
pub use reconciler::{ReconciliationSession, Reconciler};
pub use state::{Affordance, ReconciliationState};
pub use token::{CheckoutToken, NavigationContext};


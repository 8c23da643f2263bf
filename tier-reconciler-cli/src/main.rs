//! Tier Reconcile - command-line driver for the upgrade reconciler
//!
//! Plays the part of the return page: it mounts one reconciliation session for the
//! given return URL, runs it against the identity supplied on the command line, prints
//! the resulting state and, on success, waits for the redirect.
//!
//! # Exit codes
//!
//! - `0`: the upgrade is confirmed
//! - `1`: the session ended in the `error` state
//! - `2`: setup failed (configuration, URL, identity lookup)

#![allow(clippy::multiple_crate_versions, reason = "transitive dependencies from reqwest")]

use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use tier_reconciler::{
    AccountCache, HttpUpgradeApi, NavigationContext, ReconcileError, ReconciliationState,
    Reconciler, ReconcilerConfig, UpgradeApi,
    account::{BearerCredential, Identity, IdentityState, Tier, UserAccount},
    analytics::TracingAnalytics,
    effects::Navigator,
};
use tracing::{error, info};

mod cli;
mod observability;

use cli::Cli;
use observability::init_observability;

/// Prints navigations instead of performing them.
#[derive(Debug, Clone, Copy)]
struct StdoutNavigator;

impl Navigator for StdoutNavigator {
    fn navigate(&self, path: &str) {
        println!("redirect: {path}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_observability(cli.log_format);

    match run(cli).await {
        Ok(state) => exit_code(&state),
        Err(e) => {
            error!(error = %e, "reconciliation could not start");
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> tier_reconciler::Result<ReconciliationState> {
    let config = ReconcilerConfig::from_file(&cli.config)?;
    let navigation = NavigationContext::from_url(&cli.url)?;
    let api = Arc::new(HttpUpgradeApi::new(&config)?);

    let identity = resolve_identity(api.as_ref(), cli.credential, cli.current_tier).await?;
    let cached = match &identity {
        IdentityState::SignedIn(identity) => Some(identity.account.clone()),
        IdentityState::Resolving | IdentityState::SignedOut => None,
    };
    let cache = Arc::new(AccountCache::new(Arc::clone(&api), cached));

    let analytics = Arc::new(TracingAnalytics);
    let reconciler = Reconciler::new(&config, api, cache, analytics, Arc::new(StdoutNavigator))?;
    let session = reconciler.mount(navigation);
    let state = session.run(&identity).await;

    println!("state: {}", state.name());
    println!("message: {}", state.message());
    for affordance in state.affordances() {
        println!("action: {affordance:?}");
    }

    if matches!(state, ReconciliationState::Success { .. }) && !cli.no_wait {
        info!("waiting for redirect");
        session.redirect_finished().await;
    }
    Ok(state)
}

/// Builds the identity the session runs against.
///
/// Without a credential the user is signed out. With one, the cached account is
/// either taken from `--current-tier` or fetched from the server; a refused
/// credential also means signed out.
async fn resolve_identity<A: UpgradeApi>(
    api: &A,
    credential: Option<String>,
    current_tier: Option<Tier>,
) -> tier_reconciler::Result<IdentityState> {
    let Some(credential) = credential.filter(|c| !c.trim().is_empty()) else {
        return Ok(IdentityState::SignedOut);
    };
    let credential = BearerCredential::new(credential.trim());

    let account = match current_tier {
        Some(tier) => UserAccount::new("cli", tier),
        None => match api.current_account(&credential).await {
            Ok(account) => account,
            Err(ReconcileError::MissingCredential) => return Ok(IdentityState::SignedOut),
            Err(e) => return Err(e),
        },
    };
    info!(tier = %account.tier, "identity resolved");
    Ok(IdentityState::SignedIn(Identity { credential, account }))
}

fn exit_code(state: &ReconciliationState) -> ExitCode {
    match state {
        ReconciliationState::Success { .. } => ExitCode::SUCCESS,
        ReconciliationState::Error { .. } | ReconciliationState::Processing { .. } => {
            ExitCode::FAILURE
        }
    }
}

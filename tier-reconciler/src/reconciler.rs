//! Reconciliation sessions.
//!
//! A [`Reconciler`] owns the long-lived collaborators (API, cache, analytics,
//! navigator) and mounts one [`ReconciliationSession`] per visit to the return page.
//! A session may be [`run`](ReconciliationSession::run) any number of times as the
//! identity changes; only the first run with a resolved identity starts an attempt.
//!
//! ```text
//! run(identity)
//!   Resolving ........................ stay in processing
//!   torn down / guard already claimed  no-op
//!   SignedOut ........................ error (sign in)
//!   cached tier >= target ............ success, no network call
//!   token present .................... completion
//!   no token ......................... status probe
//! ```

use std::sync::Arc;

use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    account::{Identity, IdentityState, Tier},
    analytics::AnalyticsSink,
    api::UpgradeApi,
    completion::invoke_completion,
    config::ReconcilerConfig,
    effects::{Navigator, SideEffectCoordinator, UserCache},
    error::{ReconcileError, Result},
    guard::{AttemptGuard, AttemptOutcome, Liveness, ReconciliationAttempt},
    precheck::{TierPrecheck, precheck},
    probe::probe_status,
    state::{Affordance, ConfirmationPath, ReconciliationState, StateMachine},
    token::{CheckoutToken, NavigationContext, TokenParams, resolve_token},
};

struct Shared<A, C> {
    api: Arc<A>,
    effects: SideEffectCoordinator<C>,
    target_tier: Tier,
    token_params: TokenParams,
}

/// Factory for reconciliation sessions.
pub struct Reconciler<A, C> {
    shared: Arc<Shared<A, C>>,
}

impl<A, C> Clone for Reconciler<A, C> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<A, C> std::fmt::Debug for Reconciler<A, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("target_tier", &self.shared.target_tier)
            .field("token_params", &self.shared.token_params)
            .finish_non_exhaustive()
    }
}

impl<A: UpgradeApi, C: UserCache> Reconciler<A, C> {
    /// Creates a reconciler from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] if the configuration is invalid.
    pub fn new(
        config: &ReconcilerConfig,
        api: Arc<A>,
        cache: Arc<C>,
        analytics: Arc<dyn AnalyticsSink>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        config.validate()?;
        let effects = SideEffectCoordinator::new(
            cache,
            analytics,
            navigator,
            config.home_path.clone(),
            config.redirect_delay(),
        );
        let shared = Shared {
            api,
            effects,
            target_tier: config.target_tier,
            token_params: config.token.clone(),
        };
        Ok(Self { shared: Arc::new(shared) })
    }

    /// Tier every session of this reconciler tries to confirm.
    #[must_use]
    pub fn target_tier(&self) -> Tier {
        self.shared.target_tier
    }

    /// Mounts a session for the page reached through `navigation`.
    ///
    /// The checkout token is resolved once, here.
    #[must_use]
    pub fn mount(&self, navigation: NavigationContext) -> ReconciliationSession<A, C> {
        let token = resolve_token(&navigation, &self.shared.token_params);
        let attempt_id = Uuid::new_v4();
        info!(
            %attempt_id,
            token = token.as_ref().map_or_else(|| "none".to_owned(), CheckoutToken::redacted),
            "reconciliation session mounted"
        );
        ReconciliationSession {
            shared: Arc::clone(&self.shared),
            attempt_id,
            navigation,
            token,
            guard: AttemptGuard::new(),
            liveness: Liveness::new(),
            state: StateMachine::new(),
            redirect: Mutex::new(None),
        }
    }

    /// Tears `previous` down and mounts a fresh session for the same page.
    ///
    /// The new session has its own guard, so it makes a new attempt. Resubmitting a
    /// token the server already applied is harmless: completion is idempotent per
    /// token on the server side.
    #[must_use]
    pub fn retry(&self, previous: &ReconciliationSession<A, C>) -> ReconciliationSession<A, C> {
        info!(previous = %previous.attempt_id, "retrying reconciliation");
        previous.teardown();
        self.mount(previous.navigation.clone())
    }
}

/// One mounted visit to the return page.
///
/// Dropping the session tears it down.
pub struct ReconciliationSession<A, C> {
    shared: Arc<Shared<A, C>>,
    attempt_id: Uuid,
    navigation: NavigationContext,
    token: Option<CheckoutToken>,
    guard: AttemptGuard,
    liveness: Liveness,
    state: StateMachine,
    redirect: Mutex<Option<JoinHandle<()>>>,
}

impl<A, C> std::fmt::Debug for ReconciliationSession<A, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationSession")
            .field("attempt_id", &self.attempt_id)
            .field("token", &self.token)
            .field("started", &self.guard.is_started())
            .field("alive", &self.liveness.is_alive())
            .field("state", &self.state.current().name())
            .finish_non_exhaustive()
    }
}

impl<A, C> Drop for ReconciliationSession<A, C> {
    fn drop(&mut self) {
        self.liveness.teardown();
    }
}

impl<A: UpgradeApi, C: UserCache> ReconciliationSession<A, C> {
    /// Runs the session against the current identity and returns the resulting state.
    ///
    /// Safe to call on every identity change. While identity is resolving the session
    /// stays in `processing` without claiming its guard; afterwards only the first
    /// call performs any work.
    #[instrument(skip_all, fields(attempt_id = %self.attempt_id))]
    pub async fn run(&self, identity: &IdentityState) -> ReconciliationState {
        let identity = match identity {
            IdentityState::Resolving => {
                debug!("identity still resolving, waiting");
                return self.state();
            }
            IdentityState::SignedOut => None,
            IdentityState::SignedIn(identity) => Some(identity),
        };
        if !self.liveness.is_alive() {
            debug!("session torn down, not starting");
            return self.state();
        }
        if !self.guard.try_acquire() {
            debug!("attempt already started for this session");
            return self.state();
        }

        let outcome = match identity {
            None => Err(ReconcileError::MissingCredential),
            Some(identity) => self.reconcile(identity).await,
        };
        self.conclude(identity, outcome).await;
        self.state()
    }

    async fn reconcile(&self, identity: &Identity) -> Result<(Tier, ConfirmationPath)> {
        let target = self.shared.target_tier;
        let current = identity.account.tier;
        if precheck(current, target) == TierPrecheck::AlreadyUpgraded {
            info!(%current, %target, "account already upgraded, nothing to reconcile");
            return Ok((current, ConfirmationPath::AlreadyApplied));
        }

        let api = self.shared.api.as_ref();
        let credential = &identity.credential;
        match &self.token {
            Some(token) => invoke_completion(api, credential, token, target, &self.liveness)
                .await
                .map(|tier| (tier, ConfirmationPath::Completion)),
            None => probe_status(api, credential, target, &self.liveness)
                .await
                .map(|tier| (tier, ConfirmationPath::StatusProbe)),
        }
    }

    async fn conclude(
        &self,
        identity: Option<&Identity>,
        outcome: Result<(Tier, ConfirmationPath)>,
    ) {
        if matches!(outcome, Err(ReconcileError::Cancelled)) || !self.liveness.is_alive() {
            debug!("session torn down mid-flight, discarding result");
            return;
        }
        match outcome {
            Ok((tier, path)) => {
                if !self.state.succeed(tier, path) {
                    return;
                }
                info!(%tier, ?path, "upgrade confirmed");
                let effects = &self.shared.effects;
                let redirect = effects.on_success(self.attempt_id, tier, &self.liveness);
                *self.redirect.lock().await = Some(redirect);
                let credential = identity.map(|identity| &identity.credential);
                effects.refresh_account(credential, path, &self.liveness).await;
            }
            Err(error) => {
                warn!(kind = ?error.kind(), error = %error, "reconciliation failed");
                if self.state.fail(&error) {
                    self.shared.effects.on_error(self.attempt_id);
                }
            }
        }
    }
}

impl<A, C: UserCache> ReconciliationSession<A, C> {
    /// Navigates home immediately and tears the session down, cancelling any pending
    /// redirect.
    pub fn go_home(&self) {
        self.liveness.teardown();
        self.shared.effects.go_home();
    }
}

impl<A, C> ReconciliationSession<A, C> {
    /// Correlation id of this session's attempt.
    #[must_use]
    pub const fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    /// Checkout token resolved at mount, if any.
    #[must_use]
    pub const fn token(&self) -> Option<&CheckoutToken> {
        self.token.as_ref()
    }

    /// Navigation context the session was mounted with.
    #[must_use]
    pub const fn navigation(&self) -> &NavigationContext {
        &self.navigation
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ReconciliationState {
        self.state.current()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ReconciliationState> {
        self.state.subscribe()
    }

    /// Actions available from the current state.
    #[must_use]
    pub fn affordances(&self) -> Vec<Affordance> {
        self.state.current().affordances()
    }

    /// Snapshot of the attempt record.
    #[must_use]
    pub fn attempt(&self) -> ReconciliationAttempt {
        let outcome = match self.state.current() {
            ReconciliationState::Processing { .. } => AttemptOutcome::Pending,
            ReconciliationState::Success { .. } => AttemptOutcome::Success,
            ReconciliationState::Error { .. } => AttemptOutcome::Error,
        };
        ReconciliationAttempt { started: self.guard.is_started(), outcome }
    }

    /// Whether the session is still mounted.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    /// Unmounts the session. Pending results are discarded and the redirect cancelled.
    pub fn teardown(&self) {
        if self.liveness.is_alive() {
            debug!(attempt_id = %self.attempt_id, "session torn down");
        }
        self.liveness.teardown();
    }

    /// Waits for the scheduled redirect to settle.
    ///
    /// Returns `true` if a redirect was scheduled and its task finished, whether it
    /// navigated or was abandoned after teardown. Returns `false` when no redirect is
    /// pending, including when it was already awaited.
    pub async fn redirect_finished(&self) -> bool {
        let handle = self.redirect.lock().await.take();
        match handle {
            Some(handle) => handle.await.is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex as StdMutex, time::Duration};

    use super::*;
    use crate::{
        account::{BearerCredential, UserAccount},
        analytics::AnalyticsEvent,
        effects::AccountCache,
        error::ErrorKind,
        testing::{RecordingAnalytics, RecordingNavigator, ScriptedApi},
    };

    const WITH_TOKEN: &str = "https://app.example.com/upgrade?session_id=sess_123";

    type TestReconciler = Reconciler<ScriptedApi, AccountCache<ScriptedApi>>;

    struct Harness {
        api: Arc<ScriptedApi>,
        analytics: Arc<RecordingAnalytics>,
        navigator: Arc<RecordingNavigator>,
        reconciler: TestReconciler,
    }

    fn harness(api: ScriptedApi) -> Harness {
        let api = Arc::new(api);
        let analytics = Arc::new(RecordingAnalytics::default());
        let navigator = Arc::new(RecordingNavigator::default());
        let cache = Arc::new(AccountCache::new(Arc::clone(&api), None));
        let config = ReconcilerConfig::new("https://app.example.com");
        let reconciler = Reconciler::new(
            &config,
            Arc::clone(&api),
            cache,
            Arc::clone(&analytics) as Arc<dyn AnalyticsSink>,
            Arc::clone(&navigator) as Arc<dyn Navigator>,
        )
        .unwrap();
        Harness { api, analytics, navigator, reconciler }
    }

    fn signed_in(tier: Tier) -> IdentityState {
        IdentityState::SignedIn(Identity {
            credential: BearerCredential::new("bearer"),
            account: UserAccount::new("u-1", tier),
        })
    }

    fn nav(url: &str) -> NavigationContext {
        NavigationContext::from_url(url).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_success_path() {
        let h = harness(ScriptedApi::default());
        let session = h.reconciler.mount(nav(WITH_TOKEN));

        let state = session.run(&signed_in(Tier::Free)).await;

        assert!(matches!(
            state,
            ReconciliationState::Success { tier: Tier::Pro, path: ConfirmationPath::Completion, .. }
        ));
        assert_eq!(h.api.completion_calls(), 1);
        assert_eq!(h.api.status_calls(), 0);
        assert_eq!(h.api.account_calls(), 1);
        let completed = AnalyticsEvent::CheckoutCompleted { tier: Tier::Pro };
        assert_eq!(h.analytics.events(), vec![completed]);
        assert!(session.redirect_finished().await);
        assert_eq!(h.navigator.visited(), vec!["/".to_owned()]);
        assert_eq!(
            session.attempt(),
            ReconciliationAttempt { started: true, outcome: AttemptOutcome::Success }
        );
    }

    #[tokio::test]
    async fn test_already_upgraded_makes_no_calls() {
        let h = harness(ScriptedApi::default());
        let session = h.reconciler.mount(nav(WITH_TOKEN));

        let state = session.run(&signed_in(Tier::Pro)).await;

        assert!(matches!(
            state,
            ReconciliationState::Success { path: ConfirmationPath::AlreadyApplied, .. }
        ));
        assert_eq!(h.api.completion_calls() + h.api.status_calls() + h.api.account_calls(), 0);
        assert_eq!(h.analytics.events().len(), 1);
    }

    #[tokio::test]
    async fn test_resolving_does_not_claim_guard() {
        let h = harness(ScriptedApi::default());
        let session = h.reconciler.mount(nav(WITH_TOKEN));

        let state = session.run(&IdentityState::Resolving).await;

        assert!(!state.is_terminal());
        assert!(!session.attempt().started);
        session.run(&signed_in(Tier::Free)).await;
        assert_eq!(h.api.completion_calls(), 1);
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let h = harness(ScriptedApi::default());
        let session = h.reconciler.mount(nav(WITH_TOKEN));

        session.run(&signed_in(Tier::Free)).await;
        session.run(&signed_in(Tier::Free)).await;

        assert_eq!(h.api.completion_calls(), 1);
        assert_eq!(h.analytics.events().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_runs_issue_one_request() {
        let h = harness(ScriptedApi::default());
        let session = h.reconciler.mount(nav(WITH_TOKEN));
        let identity = signed_in(Tier::Free);

        let (a, b) = tokio::join!(session.run(&identity), session.run(&identity));

        assert_eq!(h.api.completion_calls(), 1);
        assert!(a.is_terminal() || b.is_terminal());
    }

    #[tokio::test]
    async fn test_signed_out_requires_sign_in() {
        let h = harness(ScriptedApi::default());
        let session = h.reconciler.mount(nav(WITH_TOKEN));

        let state = session.run(&IdentityState::SignedOut).await;

        assert!(matches!(
            state,
            ReconciliationState::Error { kind: ErrorKind::MissingCredential, .. }
        ));
        assert!(session.affordances().contains(&Affordance::SignIn));
        assert_eq!(h.api.completion_calls(), 0);
        assert_eq!(h.analytics.events(), vec![AnalyticsEvent::checkout_error()]);
    }

    #[tokio::test]
    async fn test_probe_path_without_token() {
        let h = harness(ScriptedApi::default());
        let session = h.reconciler.mount(nav("https://app.example.com/upgrade"));
        assert!(session.token().is_none());

        let state = session.run(&signed_in(Tier::Free)).await;

        assert!(matches!(
            state,
            ReconciliationState::Success { path: ConfirmationPath::StatusProbe, .. }
        ));
        assert_eq!(h.api.status_calls(), 1);
        assert_eq!(h.api.completion_calls(), 0);
    }

    #[tokio::test]
    async fn test_probe_unsubscribed_is_missing_session() {
        let api = ScriptedApi {
            status: StdMutex::new(Some(crate::account::SubscriptionStatusSnapshot {
                subscribed: false,
                tier: String::new(),
            })),
            ..ScriptedApi::default()
        };
        let h = harness(api);
        let session = h.reconciler.mount(nav("https://app.example.com/upgrade"));

        let state = session.run(&signed_in(Tier::Free)).await;

        assert!(matches!(
            state,
            ReconciliationState::Error { kind: ErrorKind::MissingSessionToken, .. }
        ));
        assert!(state.message().starts_with("Missing session information"));
        assert_eq!(session.affordances(), vec![Affordance::Retry, Affordance::GoHome]);
    }

    #[tokio::test]
    async fn test_teardown_discards_in_flight_result() {
        let h = harness(ScriptedApi::default());
        let session = h.reconciler.mount(nav(WITH_TOKEN));
        let identity = signed_in(Tier::Free);

        // `join!` polls in order: the request is in flight when teardown runs.
        let (state, ()) = tokio::join!(session.run(&identity), async { session.teardown() });

        assert!(!state.is_terminal());
        assert_eq!(h.api.completion_calls(), 1);
        assert!(h.analytics.events().is_empty());
        assert!(h.navigator.visited().is_empty());
    }

    #[tokio::test]
    async fn test_retry_mounts_fresh_attempt() {
        let h = harness(ScriptedApi { completion: StdMutex::new(None), ..ScriptedApi::default() });
        let first = h.reconciler.mount(nav(WITH_TOKEN));
        let state = first.run(&signed_in(Tier::Free)).await;
        assert!(matches!(
            state,
            ReconciliationState::Error { kind: ErrorKind::TransportFailure, .. }
        ));

        let second = h.reconciler.retry(&first);

        assert!(!first.is_alive());
        assert_ne!(first.attempt_id(), second.attempt_id());
        assert_eq!(second.token().map(CheckoutToken::as_str), Some("sess_123"));
        assert!(!second.attempt().started);
        second.run(&signed_in(Tier::Free)).await;
        assert_eq!(h.api.completion_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_refresh_does_not_delay_redirect() {
        let h = harness(ScriptedApi {
            account_delay: Duration::from_secs(20),
            ..ScriptedApi::default()
        });
        let session = h.reconciler.mount(nav(WITH_TOKEN));
        let identity = signed_in(Tier::Free);

        let (state, ()) = tokio::join!(session.run(&identity), async {
            tokio::time::sleep(Duration::from_millis(2999)).await;
            assert!(h.navigator.visited().is_empty());
            tokio::time::sleep(Duration::from_millis(2)).await;
            assert_eq!(h.navigator.visited(), vec!["/".to_owned()]);
        });

        assert!(state.is_terminal());
        assert_eq!(h.api.account_calls(), 1);
        assert_eq!(h.navigator.visited().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_during_refresh_keeps_success_event() {
        let h = harness(ScriptedApi {
            account_delay: Duration::from_secs(20),
            ..ScriptedApi::default()
        });
        let session = h.reconciler.mount(nav(WITH_TOKEN));
        let identity = signed_in(Tier::Free);

        let (state, ()) = tokio::join!(session.run(&identity), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            session.teardown();
        });

        assert!(matches!(state, ReconciliationState::Success { tier: Tier::Pro, .. }));
        let completed = AnalyticsEvent::CheckoutCompleted { tier: Tier::Pro };
        assert_eq!(h.analytics.events(), vec![completed]);
        assert!(session.redirect_finished().await);
        assert!(h.navigator.visited().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_go_home_cancels_redirect() {
        let h = harness(ScriptedApi::default());
        let session = h.reconciler.mount(nav(WITH_TOKEN));
        session.run(&signed_in(Tier::Free)).await;

        session.go_home();

        assert!(session.redirect_finished().await);
        assert_eq!(h.navigator.visited(), vec!["/".to_owned()]);
    }
}

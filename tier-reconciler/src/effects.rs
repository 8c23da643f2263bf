//! Side effects of a terminal transition.
//!
//! On success the coordinator emits exactly one `checkout_completed` event and
//! schedules the redirect home at the moment of the transition, then refreshes the
//! cached account. A failed or slow refresh is logged and otherwise ignored: the
//! upgrade is already durable server-side.

#[allow(
    redundant_imports,
    reason = "Future needed for RPITIT despite being in Edition 2024 prelude"
)]
use std::future::Future;
use std::{sync::Arc, time::Duration};

use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    account::{BearerCredential, Tier, UserAccount},
    analytics::{AnalyticsEvent, AnalyticsRecord, AnalyticsSink},
    api::UpgradeApi,
    error::Result,
    guard::Liveness,
    state::ConfirmationPath,
};

/// Local cache of the signed-in user.
pub trait UserCache: Send + Sync {
    /// Reloads the cached account from the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server could not be reached or refused the credential.
    fn refresh<'a>(
        &'a self,
        credential: &'a BearerCredential,
    ) -> impl Future<Output = Result<UserAccount>> + Send + 'a;
}

/// In-memory [`UserCache`] reloaded through [`UpgradeApi::current_account`].
#[derive(Debug)]
pub struct AccountCache<A> {
    api: Arc<A>,
    account: RwLock<Option<UserAccount>>,
}

impl<A: UpgradeApi> AccountCache<A> {
    /// Creates a cache, optionally seeded with a known account.
    pub fn new(api: Arc<A>, initial: Option<UserAccount>) -> Self {
        Self { api, account: RwLock::new(initial) }
    }

    /// Returns the cached account, if any.
    pub async fn get(&self) -> Option<UserAccount> {
        self.account.read().await.clone()
    }
}

impl<A: UpgradeApi> UserCache for AccountCache<A> {
    async fn refresh<'a>(&'a self, credential: &'a BearerCredential) -> Result<UserAccount> {
        let account = self.api.current_account(credential).await?;
        *self.account.write().await = Some(account.clone());
        Ok(account)
    }
}

/// Navigation capability of the host application.
pub trait Navigator: Send + Sync {
    /// Navigates to `path`.
    fn navigate(&self, path: &str);
}

/// Runs the side effects of terminal transitions.
pub struct SideEffectCoordinator<C> {
    cache: Arc<C>,
    analytics: Arc<dyn AnalyticsSink>,
    navigator: Arc<dyn Navigator>,
    home_path: String,
    redirect_delay: Duration,
}

impl<C> std::fmt::Debug for SideEffectCoordinator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideEffectCoordinator")
            .field("home_path", &self.home_path)
            .field("redirect_delay", &self.redirect_delay)
            .finish_non_exhaustive()
    }
}

impl<C: UserCache> SideEffectCoordinator<C> {
    /// Creates a coordinator.
    pub fn new(
        cache: Arc<C>,
        analytics: Arc<dyn AnalyticsSink>,
        navigator: Arc<dyn Navigator>,
        home_path: impl Into<String>,
        redirect_delay: Duration,
    ) -> Self {
        Self { cache, analytics, navigator, home_path: home_path.into(), redirect_delay }
    }

    /// Emits `checkout_completed` and schedules the redirect home.
    ///
    /// Called once, at the success transition. The redirect fires `redirect_delay`
    /// after this call unless the session is torn down first.
    pub fn on_success(&self, attempt_id: Uuid, tier: Tier, liveness: &Liveness) -> JoinHandle<()> {
        self.analytics
            .emit(&AnalyticsRecord::new(attempt_id, AnalyticsEvent::CheckoutCompleted { tier }));
        self.schedule_redirect(liveness.clone())
    }

    /// Refreshes the cached account after a confirmed upgrade.
    ///
    /// Skipped when the upgrade was already applied or there is no credential. A
    /// failure is logged only. The refresh is abandoned on teardown.
    pub async fn refresh_account(
        &self,
        credential: Option<&BearerCredential>,
        path: ConfirmationPath,
        liveness: &Liveness,
    ) {
        let Some(credential) = credential.filter(|_| path.needs_refresh()) else {
            return;
        };
        tokio::select! {
            result = self.cache.refresh(credential) => match result {
                Ok(account) => info!(tier = %account.tier, "cached account refreshed"),
                Err(e) => warn!(error = %e, "account refresh failed; upgrade stays confirmed"),
            },
            () = liveness.torn_down() => debug!("session torn down during refresh"),
        }
    }

    /// Runs the failure effects.
    pub fn on_error(&self, attempt_id: Uuid) {
        self.analytics.emit(&AnalyticsRecord::new(attempt_id, AnalyticsEvent::checkout_error()));
    }

    /// Navigates home immediately.
    pub fn go_home(&self) {
        self.navigator.navigate(&self.home_path);
    }

    fn schedule_redirect(&self, liveness: Liveness) -> JoinHandle<()> {
        let navigator = Arc::clone(&self.navigator);
        let home_path = self.home_path.clone();
        let delay = self.redirect_delay;
        info!(delay_ms = delay.as_millis(), %home_path, "redirect scheduled");
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    if liveness.is_alive() {
                        navigator.navigate(&home_path);
                    }
                }
                () = liveness.torn_down() => debug!("redirect abandoned after teardown"),
            }
        })
    }
}

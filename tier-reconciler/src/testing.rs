//! In-process collaborators for unit tests.

use std::{
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::{
    account::{BearerCredential, SubscriptionStatusSnapshot, Tier, UserAccount},
    analytics::{AnalyticsEvent, AnalyticsRecord, AnalyticsSink},
    api::{CompletedUser, CompletionResponse, UpgradeApi},
    effects::Navigator,
    error::{Operation, ReconcileError, Result},
    token::CheckoutToken,
};

/// Scripted API. `None` in a slot means the call fails with a transport error.
///
/// `account_delay` makes `current_account` wait on the tokio clock before answering.
#[derive(Debug)]
pub(crate) struct ScriptedApi {
    pub(crate) completion: Mutex<Option<CompletionResponse>>,
    pub(crate) status: Mutex<Option<SubscriptionStatusSnapshot>>,
    pub(crate) account: Mutex<Option<UserAccount>>,
    pub(crate) account_delay: Duration,
    pub(crate) completion_calls: AtomicUsize,
    pub(crate) status_calls: AtomicUsize,
    pub(crate) account_calls: AtomicUsize,
}

impl Default for ScriptedApi {
    fn default() -> Self {
        Self {
            completion: Mutex::new(Some(CompletionResponse {
                success: true,
                user: Some(CompletedUser { tier: "pro".to_owned() }),
                error: None,
                message: None,
            })),
            status: Mutex::new(Some(SubscriptionStatusSnapshot {
                subscribed: true,
                tier: "pro".to_owned(),
            })),
            account: Mutex::new(Some(UserAccount::new("u-1", Tier::Pro))),
            account_delay: Duration::ZERO,
            completion_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            account_calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedApi {
    pub(crate) fn completion_calls(&self) -> usize {
        self.completion_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn account_calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
    }
}

impl UpgradeApi for ScriptedApi {
    async fn complete_upgrade<'a>(
        &'a self,
        _credential: &'a BearerCredential,
        _token: &'a CheckoutToken,
    ) -> Result<CompletionResponse> {
        self.completion_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.completion
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ReconcileError::transport(Operation::Completion, "scripted failure"))
    }

    async fn subscription_status<'a>(
        &'a self,
        _credential: &'a BearerCredential,
    ) -> Result<SubscriptionStatusSnapshot> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.status
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ReconcileError::transport(Operation::StatusProbe, "scripted failure"))
    }

    async fn current_account<'a>(
        &'a self,
        _credential: &'a BearerCredential,
    ) -> Result<UserAccount> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        if !self.account_delay.is_zero() {
            tokio::time::sleep(self.account_delay).await;
        }
        self.account
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ReconcileError::transport(Operation::AccountRefresh, "scripted failure"))
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingAnalytics {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingAnalytics {
    pub(crate) fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn emit(&self, record: &AnalyticsRecord) {
        self.events.lock().unwrap().push(record.event.clone());
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub(crate) fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.visited.lock().unwrap().push(path.to_owned());
    }
}

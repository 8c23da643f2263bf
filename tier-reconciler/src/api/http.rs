//! HTTP implementation of [`UpgradeApi`] using reqwest.

use reqwest::{Client, RequestBuilder, header};
use tracing::{debug, instrument};
use url::Url;

use super::{
    CompletionRequest, CompletionResponse, UpgradeApi, interpret_account, interpret_completion,
    interpret_status,
};
use crate::{
    account::{BearerCredential, SubscriptionStatusSnapshot, UserAccount},
    config::{EndpointConfig, HttpConfig, ReconcilerConfig},
    error::{Operation, ReconcileError, Result},
    token::CheckoutToken,
};

/// reqwest-backed client for the upgrade endpoints.
///
/// Cloning is cheap and shares the connection pool.
///
/// # Examples
///
/// ```
/// use tier_reconciler::{api::HttpUpgradeApi, config::ReconcilerConfig};
///
/// let config = ReconcilerConfig::new("https://app.example.com");
/// let api = HttpUpgradeApi::new(&config)?;
/// assert_eq!(api.endpoint_url("/api/user").as_str(), "https://app.example.com/api/user");
/// # Ok::<(), tier_reconciler::error::ReconcileError>(())
/// ```
#[derive(Debug, Clone)]
pub struct HttpUpgradeApi {
    client: Client,
    base_url: Url,
    endpoints: EndpointConfig,
}

impl HttpUpgradeApi {
    /// Creates a client from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] if the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: &ReconcilerConfig) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config.http)?;
        let base_url = config.parsed_base_url()?;
        Ok(Self { client, base_url, endpoints: config.endpoints.clone() })
    }

    /// Resolves an endpoint path against the base URL.
    ///
    /// Paths are absolute, so any path component of the base URL is replaced.
    #[must_use]
    pub fn endpoint_url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    fn authorized(&self, builder: RequestBuilder, credential: &BearerCredential) -> RequestBuilder {
        builder.bearer_auth(credential.expose()).header(header::ACCEPT, "application/json")
    }

    /// Sends a request and returns the status and raw body.
    async fn send(&self, operation: Operation, request: RequestBuilder) -> Result<(u16, Vec<u8>)> {
        let response = request
            .send()
            .await
            .map_err(|e| ReconcileError::transport(operation, format!("request failed: {e}")))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            ReconcileError::transport(operation, format!("failed to read body: {e}"))
        })?;
        debug!(%operation, status, body_len = body.len(), "received response");
        Ok((status, body.to_vec()))
    }
}

fn build_client(config: &HttpConfig) -> Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .build()
        .map_err(|e| ReconcileError::InvalidConfig(format!("failed to build HTTP client: {e}")))
}

impl UpgradeApi for HttpUpgradeApi {
    #[instrument(skip_all, fields(token = %token.redacted()))]
    async fn complete_upgrade<'a>(
        &'a self,
        credential: &'a BearerCredential,
        token: &'a CheckoutToken,
    ) -> Result<CompletionResponse> {
        let url = self.endpoint_url(&self.endpoints.complete_upgrade);
        let request = self
            .authorized(self.client.post(url), credential)
            .json(&CompletionRequest { session_id: token.as_str() });
        let (status, body) = self.send(Operation::Completion, request).await?;
        interpret_completion(status, &body)
    }

    #[instrument(skip_all)]
    async fn subscription_status<'a>(
        &'a self,
        credential: &'a BearerCredential,
    ) -> Result<SubscriptionStatusSnapshot> {
        let url = self.endpoint_url(&self.endpoints.subscription_status);
        let request = self.authorized(self.client.get(url), credential);
        let (status, body) = self.send(Operation::StatusProbe, request).await?;
        interpret_status(status, &body)
    }

    #[instrument(skip_all)]
    async fn current_account<'a>(
        &'a self,
        credential: &'a BearerCredential,
    ) -> Result<UserAccount> {
        let url = self.endpoint_url(&self.endpoints.current_user);
        let request = self.authorized(self.client.get(url), credential);
        let (status, body) = self.send(Operation::AccountRefresh, request).await?;
        interpret_account(status, &body)
    }
}

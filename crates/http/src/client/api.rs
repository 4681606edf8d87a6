//! Consumer-facing request API: cached queries and mutations

use super::{ClientError, FetchArgs, RequestClient};
use chrono::Utc;
use latch_core::{Action, LatchConfig, Middleware, RootState, StoreApi};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default lifetime of a cached query result
pub const DEFAULT_KEEP_UNUSED_DATA_FOR: Duration = Duration::from_secs(60);

/// Request API bound to a store
#[derive(Clone)]
pub struct RequestApi {
    client: RequestClient,
    store: Arc<dyn StoreApi>,
    keep_unused_data_for: Duration,
}

impl RequestApi {
    pub fn new(client: RequestClient, store: Arc<dyn StoreApi>) -> Self {
        Self {
            client,
            store,
            keep_unused_data_for: DEFAULT_KEEP_UNUSED_DATA_FOR,
        }
    }

    /// Build the client and API from loaded configuration
    pub fn from_config(
        config: &LatchConfig,
        store: Arc<dyn StoreApi>,
    ) -> Result<Self, ClientError> {
        let client = RequestClient::from_config(config)?;
        Ok(Self::new(client, store)
            .keep_unused_data_for(Duration::from_secs(config.keep_unused_data_for_secs)))
    }

    /// How long a fulfilled query is served from the cache
    #[must_use]
    pub fn keep_unused_data_for(mut self, duration: Duration) -> Self {
        self.keep_unused_data_for = duration;
        self
    }

    /// Store middleware keeping the query cache scoped to one session
    pub fn middleware() -> Arc<dyn Middleware> {
        Arc::new(ApiMiddleware)
    }

    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn StoreApi> {
        &self.store
    }

    /// Query `url`, serving a fresh cached result when there is one
    pub async fn get_data(&self, url: &str) -> Result<Value, ClientError> {
        let max_age = chrono::Duration::from_std(self.keep_unused_data_for)
            .unwrap_or(chrono::Duration::MAX);
        let cached = self
            .store
            .get_state()
            .await
            .request
            .fresh(url, Utc::now(), max_age)
            .cloned();

        if let Some(data) = cached {
            debug!(url, "Serving cached query");
            return Ok(data);
        }
        self.refetch_data(url).await
    }

    /// Query `url` over the network and cache the result
    pub async fn refetch_data(&self, url: &str) -> Result<Value, ClientError> {
        let data = self
            .client
            .fetch_with_reauth(url, self.store.as_ref())
            .await?;

        self.store
            .dispatch(Action::QueryFulfilled {
                key: url.to_string(),
                data: data.clone(),
                fulfilled_at: Utc::now(),
            })
            .await;
        Ok(data)
    }

    /// Send `data` to `url` with `method`; the response is returned as is
    pub async fn send_data(
        &self,
        url: &str,
        data: Option<Value>,
        method: Method,
    ) -> Result<Value, ClientError> {
        let mut args = FetchArgs::new(url).method(method);
        if let Some(data) = data {
            args = args.body(data);
        }
        self.client
            .fetch_with_reauth(args, self.store.as_ref())
            .await
    }
}

/// Resets the query cache whenever the logged-in status changes
pub struct ApiMiddleware;

impl Middleware for ApiMiddleware {
    fn on_action(&self, action: &Action, state: &RootState) -> Vec<Action> {
        let session_changed = match action {
            Action::LogOut => true,
            Action::SetIsAuth { is_auth, .. } => *is_auth != state.auth.is_auth,
            _ => false,
        };

        if session_changed && !state.request.queries.is_empty() {
            vec![Action::ResetApiState]
        } else {
            Vec::new()
        }
    }
}

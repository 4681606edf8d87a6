//! One-shot reauthentication
//!
//! When a request fails with 401 or 403 the client asks the refresh endpoint
//! (the base URL itself) for a new token pair. On success the pair is
//! committed to the store and the original request is replayed exactly once;
//! whatever the replay returns is final. On failure the store is logged out
//! and the original error is returned.
//!
//! Concurrent failures each run their own refresh; there is no single-flight.

use super::{ClientError, FetchArgs, RequestClient};
use latch_core::{Action, StoreApi};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Payload returned by a successful refresh
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    /// Extract a token pair from a refresh response; `None` means no payload
    pub fn from_payload(payload: Value) -> Option<Self> {
        serde_json::from_value::<Self>(payload)
            .ok()
            .filter(|pair| !pair.access_token.is_empty())
    }
}

impl From<TokenPair> for Action {
    fn from(pair: TokenPair) -> Self {
        Self::login(pair.access_token, pair.refresh_token)
    }
}

impl RequestClient {
    /// Execute a request, refreshing credentials and replaying it once on 401/403
    pub async fn fetch_with_reauth(
        &self,
        args: impl Into<FetchArgs>,
        store: &dyn StoreApi,
    ) -> Result<Value, ClientError> {
        let args = args.into();
        let result = self.fetch(&args, store).await;

        let needs_refresh = matches!(&result, Err(e) if e.is_auth_failure());
        if !needs_refresh {
            return result;
        }

        warn!(url = %args.url, "Authorization failed, attempting token refresh");
        match self.refresh(store).await {
            Some(tokens) => {
                store.dispatch(tokens.into()).await;
                info!(url = %args.url, "Token refreshed, retrying request");
                self.fetch(&args, store).await
            }
            None => {
                warn!("Token refresh failed, logging out");
                store.dispatch(Action::LogOut).await;
                result
            }
        }
    }

    async fn refresh(&self, store: &dyn StoreApi) -> Option<TokenPair> {
        match self.fetch(&FetchArgs::refresh(), store).await {
            Ok(payload) => {
                let tokens = TokenPair::from_payload(payload);
                if tokens.is_none() {
                    debug!("Refresh response carried no token pair");
                }
                tokens
            }
            Err(e) => {
                debug!(error = %e, "Refresh request failed");
                None
            }
        }
    }
}

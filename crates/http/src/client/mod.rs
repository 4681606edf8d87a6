//! Latch HTTP client
//!
//! [`RequestClient`] is the base query: it resolves a [`FetchArgs`] against
//! the base URL, injects credentials from the store and maps the response to
//! a JSON value or a [`ClientError`]. The reauthentication wrapper lives in
//! [`reauth`], the consumer API in [`api`].

pub mod api;
pub mod args;
pub mod error;
pub mod reauth;

pub use api::{ApiMiddleware, RequestApi};
pub use args::FetchArgs;
pub use error::ClientError;
pub use reauth::TokenPair;

use latch_core::{LatchConfig, RootState, StoreApi};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Header carrying the refresh token
pub const USER_TOKEN_HEADER: HeaderName = HeaderName::from_static("user-token");

/// Header carrying the current user's email
pub const USER_EMAIL_HEADER: HeaderName = HeaderName::from_static("user-email");

const DEFAULT_USER_AGENT: &str = concat!("latch-client/", env!("CARGO_PKG_VERSION"));

/// Base query client
#[derive(Clone, Debug)]
pub struct RequestClient {
    client: Client,
    base_url: String,
}

impl RequestClient {
    /// Create a new client with default configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> RequestClientBuilder {
        RequestClientBuilder::default()
    }

    /// Create a client from loaded configuration
    pub fn from_config(config: &LatchConfig) -> Result<Self, ClientError> {
        let mut builder = Self::builder().base_url(&config.base_url);
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent);
        }
        builder.build()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a request URL against the base URL
    pub fn resolve(&self, url: &str) -> String {
        if url.is_empty() {
            self.base_url.clone()
        } else if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }

    /// Execute a request once with credentials taken from `store`
    pub async fn fetch(
        &self,
        args: &FetchArgs,
        store: &dyn StoreApi,
    ) -> Result<Value, ClientError> {
        let state = store.get_state().await;

        let mut headers = HeaderMap::new();
        prepare_headers(&mut headers, &state)?;

        let url = self.resolve(&args.url);
        debug!(
            method = %args.method,
            url = %url,
            authenticated = headers.contains_key(AUTHORIZATION),
            "Sending request"
        );

        let mut request = self
            .client
            .request(args.method.clone(), url)
            .headers(headers);
        if let Some(body) = &args.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            Ok(parse_body(&text))
        } else {
            debug!(status = status.as_u16(), "Request failed");
            let message = if text.is_empty() {
                status.to_string()
            } else {
                text
            };
            Err(ClientError::from_status(status, message))
        }
    }
}

/// Attach credentials from `state`
///
/// Nothing is added without an access token. With one, `Authorization`
/// carries the raw access token, `user-token` the refresh token when there is
/// one and `user-email` the current user's email when it is known.
pub fn prepare_headers(headers: &mut HeaderMap, state: &RootState) -> Result<(), ClientError> {
    let Some(access_token) = state
        .auth
        .access_token
        .as_deref()
        .filter(|token| !token.is_empty())
    else {
        return Ok(());
    };

    let mut authorization = HeaderValue::from_str(access_token)?;
    authorization.set_sensitive(true);
    headers.insert(AUTHORIZATION, authorization);

    if let Some(refresh_token) = state.auth.refresh_token.as_deref() {
        let mut value = HeaderValue::from_str(refresh_token)?;
        value.set_sensitive(true);
        headers.insert(USER_TOKEN_HEADER, value);
    }

    if !state.user.email.is_empty() {
        headers.insert(USER_EMAIL_HEADER, HeaderValue::from_str(&state.user.email)?);
    }

    Ok(())
}

/// Empty bodies carry no payload; non-JSON bodies are kept as text
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Builder for [`RequestClient`]
#[derive(Default)]
pub struct RequestClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl RequestClientBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<RequestClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();
        url::Url::parse(&base_url).map_err(|e| {
            ClientError::Configuration(format!("invalid base_url {base_url:?}: {e}"))
        })?;

        let mut client_builder = ClientBuilder::new()
            .user_agent(self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()));

        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        let client = client_builder.build()?;

        Ok(RequestClient { client, base_url })
    }
}

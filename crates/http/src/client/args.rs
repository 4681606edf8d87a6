//! Outbound request descriptor

use reqwest::Method;
use serde_json::Value;

/// One outbound call: URL relative to the base URL, method and JSON body
#[derive(Clone, Debug, PartialEq)]
pub struct FetchArgs {
    pub url: String,
    pub method: Method,
    pub body: Option<Value>,
}

impl FetchArgs {
    /// GET request without a body
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            body: None,
        }
    }

    /// Set the HTTP method
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the JSON body
    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// The refresh call: a GET on the base URL itself
    pub fn refresh() -> Self {
        Self::new("")
    }
}

impl From<&str> for FetchArgs {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for FetchArgs {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

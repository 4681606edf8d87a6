//! Latch HTTP request layer
//!
//! Wraps a reqwest client with credential injection from the application
//! store and a one-shot refresh-and-replay on authorization failures.

pub mod client;

pub use client::{
    ApiMiddleware, ClientError, FetchArgs, RequestApi, RequestClient, RequestClientBuilder,
    TokenPair,
};

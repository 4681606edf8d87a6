//! Application state tree, actions and reducers
//!
//! The tree is split into named partitions (`auth`, `user`, `request`). Each
//! partition owns a pure reducer; [`RootState::reduce`] combines them so a
//! single [`Action`] flows through every slice.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Authentication partition
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthState {
    pub is_auth: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl AuthState {
    /// Partition name used by persistence
    pub const KEY: &'static str = "auth";

    /// Logged-in state holding the given token pair
    pub fn logged_in(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            is_auth: true,
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    pub fn reduce(&self, action: &Action) -> Self {
        match action {
            Action::SetIsAuth {
                is_auth,
                access_token,
                refresh_token,
            } => {
                // A session without an access token is not a session.
                if *is_auth && access_token.as_deref().is_none_or(str::is_empty) {
                    return Self::default();
                }
                Self {
                    is_auth: *is_auth,
                    access_token: access_token.clone(),
                    refresh_token: refresh_token.clone(),
                }
            }
            Action::LogOut => Self::default(),
            _ => self.clone(),
        }
    }
}

/// Current user partition
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserState {
    pub email: String,
    pub name: Option<String>,
}

impl UserState {
    /// Partition name used by persistence
    pub const KEY: &'static str = "user";

    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn reduce(&self, action: &Action) -> Self {
        match action {
            Action::SetUser(user) => user.clone(),
            Action::ClearUser => Self::default(),
            _ => self.clone(),
        }
    }
}

/// One cached query result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryEntry {
    pub data: Value,
    pub fulfilled_at: DateTime<Utc>,
}

/// Query cache owned by the request API
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestState {
    pub queries: BTreeMap<String, QueryEntry>,
}

impl RequestState {
    /// Partition name used by persistence
    pub const KEY: &'static str = "request";

    /// Cached data for `key` if it was fulfilled less than `max_age` before `now`
    pub fn fresh(&self, key: &str, now: DateTime<Utc>, max_age: Duration) -> Option<&Value> {
        self.queries
            .get(key)
            .filter(|entry| now - entry.fulfilled_at < max_age)
            .map(|entry| &entry.data)
    }

    pub fn reduce(&self, action: &Action) -> Self {
        match action {
            Action::QueryFulfilled {
                key,
                data,
                fulfilled_at,
            } => {
                let mut queries = self.queries.clone();
                queries.insert(
                    key.clone(),
                    QueryEntry {
                        data: data.clone(),
                        fulfilled_at: *fulfilled_at,
                    },
                );
                Self { queries }
            }
            Action::ResetApiState => Self::default(),
            _ => self.clone(),
        }
    }
}

/// The whole state tree
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootState {
    pub auth: AuthState,
    pub user: UserState,
    pub request: RequestState,
}

impl RootState {
    /// Names of every top-level partition
    pub const PARTITIONS: [&'static str; 3] = [AuthState::KEY, UserState::KEY, RequestState::KEY];

    /// Combined reducer
    #[must_use]
    pub fn reduce(&self, action: &Action) -> Self {
        Self {
            auth: self.auth.reduce(action),
            user: self.user.reduce(action),
            request: self.request.reduce(action),
        }
    }
}

/// State transitions understood by the store
#[derive(Clone, PartialEq)]
pub enum Action {
    SetIsAuth {
        is_auth: bool,
        access_token: Option<String>,
        refresh_token: Option<String>,
    },
    LogOut,
    SetUser(UserState),
    ClearUser,
    QueryFulfilled {
        key: String,
        data: Value,
        fulfilled_at: DateTime<Utc>,
    },
    ResetApiState,
}

impl Action {
    /// Log in with a fresh token pair
    pub fn login(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self::SetIsAuth {
            is_auth: true,
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    /// Stable action type name, safe to log
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SetIsAuth { .. } => "auth/setIsAuth",
            Self::LogOut => "auth/logOut",
            Self::SetUser(_) => "user/setUser",
            Self::ClearUser => "user/clearUser",
            Self::QueryFulfilled { .. } => "request/queryFulfilled",
            Self::ResetApiState => "request/resetApiState",
        }
    }
}

// Tokens must never end up in logs.
impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetIsAuth { is_auth, .. } => f
                .debug_struct("SetIsAuth")
                .field("is_auth", is_auth)
                .finish_non_exhaustive(),
            Self::QueryFulfilled { key, .. } => f
                .debug_struct("QueryFulfilled")
                .field("key", key)
                .finish_non_exhaustive(),
            other => f.write_str(other.kind()),
        }
    }
}

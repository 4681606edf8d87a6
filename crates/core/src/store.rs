//! The application store
//!
//! A [`Store`] owns the [`RootState`] and is its single writer. Every state
//! transition goes through [`StoreApi::dispatch`], which runs registered
//! middleware, reduces the action and persists the allow-listed partitions.

use crate::error::{CoreError, CoreResult};
use crate::persist::Persistor;
use crate::state::{Action, RootState};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// State access handed to collaborators such as the request layer
#[async_trait]
pub trait StoreApi: Send + Sync {
    /// Snapshot of the current state
    async fn get_state(&self) -> RootState;

    /// Apply an action
    async fn dispatch(&self, action: Action);
}

/// Hook observing every dispatched action
///
/// Middleware sees the action together with the state before it is reduced
/// and may return follow-up actions, which are reduced in the same dispatch.
pub trait Middleware: Send + Sync {
    fn on_action(&self, action: &Action, state: &RootState) -> Vec<Action>;
}

/// Application store
pub struct Store {
    state: RwLock<RootState>,
    dispatch_lock: Mutex<()>,
    middleware: Vec<Arc<dyn Middleware>>,
    persistor: Option<Persistor>,
}

impl Store {
    /// Create a new store builder
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    /// Read a value out of the current state
    pub async fn select<T>(&self, selector: impl FnOnce(&RootState) -> T) -> T {
        selector(&*self.state.read().await)
    }

    /// Remove persisted state from storage; in-memory state is untouched
    pub async fn purge(&self) -> CoreResult<()> {
        match &self.persistor {
            Some(persistor) => persistor.purge().await,
            None => Ok(()),
        }
    }

    async fn persist(&self, before: &RootState, after: &RootState) {
        let Some(persistor) = &self.persistor else {
            return;
        };

        let result = match persistor.has_changes(before, after) {
            Ok(true) => persistor.persist(after).await,
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist state");
        }
    }
}

#[async_trait]
impl StoreApi for Store {
    async fn get_state(&self) -> RootState {
        self.state.read().await.clone()
    }

    async fn dispatch(&self, action: Action) {
        let _guard = self.dispatch_lock.lock().await;
        debug!(action = action.kind(), "Dispatching action");

        let before = self.state.read().await.clone();
        let follow_ups: Vec<Action> = self
            .middleware
            .iter()
            .flat_map(|middleware| middleware.on_action(&action, &before))
            .collect();

        let mut after = before.reduce(&action);
        for follow_up in &follow_ups {
            debug!(action = follow_up.kind(), "Reducing middleware action");
            after = after.reduce(follow_up);
        }

        *self.state.write().await = after.clone();
        self.persist(&before, &after).await;
    }
}

/// Builder for [`Store`]
#[derive(Default)]
pub struct StoreBuilder {
    initial_state: RootState,
    middleware: Vec<Arc<dyn Middleware>>,
    persistor: Option<Persistor>,
}

impl StoreBuilder {
    /// Set the state used before rehydration
    pub fn initial_state(mut self, state: RootState) -> Self {
        self.initial_state = state;
        self
    }

    /// Register a middleware
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Persist allow-listed partitions through the given persistor
    pub fn persistor(mut self, persistor: Persistor) -> Self {
        self.persistor = Some(persistor);
        self
    }

    /// Build the store, rehydrating persisted partitions
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend cannot be read. A corrupt
    /// persisted document is logged and ignored.
    pub async fn build(self) -> CoreResult<Store> {
        let state = match &self.persistor {
            Some(persistor) => match persistor.rehydrate(self.initial_state.clone()).await {
                Ok(state) => state,
                Err(CoreError::Serialization { message }) => {
                    warn!(error = %message, "Ignoring unreadable persisted state");
                    self.initial_state
                }
                Err(e) => return Err(e),
            },
            None => self.initial_state,
        };

        Ok(Store {
            state: RwLock::new(state),
            dispatch_lock: Mutex::new(()),
            middleware: self.middleware,
            persistor: self.persistor,
        })
    }
}

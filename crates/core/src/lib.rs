//! Latch core: state tree, store, persistence and configuration

pub mod config;
pub mod error;
pub mod persist;
pub mod state;
pub mod store;

pub use config::LatchConfig;
pub use error::{CoreError, CoreResult};
pub use persist::{FileStorage, MemoryStorage, PersistConfig, Persistor, Storage};
pub use state::{Action, AuthState, QueryEntry, RequestState, RootState, UserState};
pub use store::{Middleware, Store, StoreApi, StoreBuilder};

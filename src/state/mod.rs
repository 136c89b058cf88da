//! Observable values and the stores behind them

pub mod observable;
pub mod secrets;
pub mod store;

pub use observable::{Observable, PersistentObservable, SameValue, Subscribers, Subscription};
pub use secrets::{ApiKeyResolver, FileSecretStore, KeySource, MemorySecretStore, SecretStore};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, FILES_TO_EXCLUDE_KEY, FILES_TO_INCLUDE_KEY};

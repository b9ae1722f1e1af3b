//! Infrastructure module.
//!
//! Storage for versioned records and application configuration.

pub mod config;
pub mod in_memory;
pub mod store;

pub use config::{AppConfig, AppConfigBuilder, ConfigurationError, ServerConfig};
pub use in_memory::InMemoryIssueStore;
pub use store::{ConditionalWrite, StoreError, VersionedStore};

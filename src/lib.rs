//! # safe-parallelism
//!
//! Concurrency-safety building blocks for request-handling services.
//!
//! ## Overview
//!
//! - **Idempotency**: [`coordination::IdempotencyCoordinator`] runs an
//!   operation at most once per idempotency key. Concurrent retries join the
//!   in-flight execution and later ones are served the cached result until
//!   the entry expires.
//! - **Optimistic Concurrency**: [`coordination::OptimisticConcurrencyGuard`]
//!   reads a versioned record, applies a mutation without holding a lock, and
//!   writes only if the version is unchanged. The losing writer of a race gets
//!   a typed conflict instead of silently overwriting the winner.
//!
//! The [`api`] module exposes both over HTTP (`POST /idempotency`,
//! `POST /issues`, `GET|PUT /issues/{id}`) on top of the in-memory issue
//! store in [`infrastructure`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use safe_parallelism::api::{AppState, router};
//! use safe_parallelism::infrastructure::AppConfig;
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::in_memory(AppConfig::from_env()?);
//! let application = router(state);
//! # let _ = application;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod coordination;
pub mod domain;
pub mod infrastructure;

//! Single-flight idempotency coordination.
//!
//! [`IdempotencyCoordinator`] deduplicates concurrent and repeated calls that
//! share an idempotency key. The first caller for a key becomes the
//! *executor*: its operation runs exactly once on a detached task. Callers
//! arriving while that execution is in flight *join* it and receive the same
//! result, and callers arriving after completion get the cached result until
//! the entry's window expires.
//!
//! # State Machine
//!
//! ```text
//!   absent ──claim──▶ Pending ──success──▶ Completed ──expiry──▶ absent
//!                        │
//!                        └──failure / timeout / abandon──▶ absent
//! ```
//!
//! Expiry only applies to `Completed` entries. A `Pending` entry is never
//! reclaimed, so a key has at most one execution in flight no matter how the
//! window compares to the operation's running time.
//!
//! Every transition happens inside one critical section on the entry map, so
//! two callers can never both observe `absent` and both become executors.
//! Waiters suspend on a `watch` channel after the lock is released; the lock
//! is never held across an `.await`.
//!
//! # Cancellation
//!
//! The operation runs on its own task. Dropping the future returned by
//! [`IdempotencyCoordinator::execute`] (executor or waiter) only stops that
//! caller from observing the outcome; the shared execution still completes
//! and populates the cache.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use safe_parallelism::coordination::{IdempotencyConfig, IdempotencyCoordinator};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = IdempotencyCoordinator::with_system_clock(IdempotencyConfig::default());
//!
//! let execution = coordinator
//!     .execute("order-42", || async {
//!         tokio::time::sleep(Duration::from_millis(50)).await;
//!         Ok::<_, std::io::Error>(42_u64)
//!     })
//!     .await?;
//!
//! assert_eq!(**execution.value(), 42);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::clock::{Clock, SystemClock, to_time_delta};
use super::error::IdempotencyError;
use super::key::IdempotencyKey;

/// Outcome broadcast from the executor to every waiter.
type Outcome<T> = Result<Arc<T>, IdempotencyError>;

// =============================================================================
// Configuration
// =============================================================================

/// Tuning knobs for [`IdempotencyCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencyConfig {
    /// How long an entry lives after it is created, whatever state it reached.
    pub window: Duration,
    /// Upper bound on a single execution. `None` disables the bound.
    pub operation_timeout: Option<Duration>,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            operation_timeout: Some(Duration::from_secs(30)),
        }
    }
}

// =============================================================================
// Public Views
// =============================================================================

/// Lifecycle state of an idempotency entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// An execution is in flight.
    Pending,
    /// The execution finished and its result is cached.
    Completed,
}

/// Point-in-time snapshot of an idempotency entry.
#[derive(Debug, Clone)]
pub struct IdempotencyEntry<T> {
    pub key: IdempotencyKey,
    pub state: EntryState,
    /// Present only when `state` is [`EntryState::Completed`].
    pub result: Option<Arc<T>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// How a call obtained its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionOrigin {
    /// This call ran the operation.
    Executed,
    /// This call waited on an execution started by another caller.
    Joined,
    /// This call was served from a completed entry.
    Cached,
}

impl ExecutionOrigin {
    /// Returns `true` when the result was shared rather than produced.
    #[must_use]
    pub const fn is_hit(self) -> bool {
        matches!(self, Self::Joined | Self::Cached)
    }
}

impl fmt::Display for ExecutionOrigin {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executed => write!(formatter, "executed"),
            Self::Joined => write!(formatter, "joined"),
            Self::Cached => write!(formatter, "cached"),
        }
    }
}

/// Result of [`IdempotencyCoordinator::execute`].
///
/// `value` is the same `Arc` for every caller sharing a key, so callers can
/// rely on shared identity (`Arc::ptr_eq`) as well as equal contents.
#[derive(Debug, Clone)]
pub struct Execution<T> {
    key: IdempotencyKey,
    value: Arc<T>,
    origin: ExecutionOrigin,
}

impl<T> Execution<T> {
    #[must_use]
    pub const fn key(&self) -> &IdempotencyKey {
        &self.key
    }

    #[must_use]
    pub const fn value(&self) -> &Arc<T> {
        &self.value
    }

    #[must_use]
    pub const fn origin(&self) -> ExecutionOrigin {
        self.origin
    }

    #[must_use]
    pub const fn is_hit(&self) -> bool {
        self.origin.is_hit()
    }

    #[must_use]
    pub fn into_value(self) -> Arc<T> {
        self.value
    }
}

// =============================================================================
// Internal State
// =============================================================================

enum Phase<T> {
    Pending(watch::Receiver<Option<Outcome<T>>>),
    Completed(Arc<T>),
}

struct Slot<T> {
    generation: u64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    phase: Phase<T>,
}

impl<T> Slot<T> {
    const fn is_pending(&self) -> bool {
        matches!(self.phase, Phase::Pending(_))
    }
}

struct Shared<T> {
    entries: Mutex<HashMap<IdempotencyKey, Slot<T>>>,
    next_generation: AtomicU64,
    clock: Arc<dyn Clock>,
    config: IdempotencyConfig,
}

impl<T> Shared<T> {
    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, slot| slot.is_pending() || now < slot.expires_at);
        before - entries.len()
    }

    /// Removes the entry for `key` if it still belongs to `generation`.
    fn release(&self, key: &IdempotencyKey, generation: u64) {
        let mut entries = self.entries.lock();
        if entries
            .get(key)
            .is_some_and(|slot| slot.generation == generation)
        {
            entries.remove(key);
        }
    }

    /// Flips the entry for `key` to `Completed` if it still belongs to `generation`.
    fn publish(&self, key: &IdempotencyKey, generation: u64, value: &Arc<T>) {
        let mut entries = self.entries.lock();
        if let Some(slot) = entries.get_mut(key)
            && slot.generation == generation
        {
            slot.phase = Phase::Completed(Arc::clone(value));
        }
    }
}

enum Claim<T> {
    Cached(Arc<T>),
    Join(watch::Receiver<Option<Outcome<T>>>),
    Execute {
        generation: u64,
        sender: watch::Sender<Option<Outcome<T>>>,
        receiver: watch::Receiver<Option<Outcome<T>>>,
    },
}

/// Owns the completion signal of one execution.
///
/// If the execution task ends without calling [`Completion::finish`]
/// (panic, abort, runtime shutdown) the drop handler releases the entry and
/// tells waiters the execution was abandoned, so no entry stays `Pending`.
struct Completion<T> {
    shared: Arc<Shared<T>>,
    key: IdempotencyKey,
    generation: u64,
    sender: Option<watch::Sender<Option<Outcome<T>>>>,
}

impl<T> Completion<T> {
    fn finish(mut self, result: Result<T, IdempotencyError>) {
        let outcome = result.map(Arc::new);

        match &outcome {
            Ok(value) => self.shared.publish(&self.key, self.generation, value),
            Err(error) => {
                tracing::warn!(key = %self.key, error = %error, "idempotent operation did not complete");
                self.shared.release(&self.key, self.generation);
            }
        }

        if let Some(sender) = self.sender.take() {
            sender.send_replace(Some(outcome));
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            tracing::warn!(key = %self.key, "idempotent operation abandoned, releasing entry");
            self.shared.release(&self.key, self.generation);
            sender.send_replace(Some(Err(IdempotencyError::Abandoned {
                key: self.key.to_string(),
            })));
        }
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Deduplicates operations sharing an idempotency key within one process.
///
/// Cloning is cheap and yields a handle to the same entry map.
pub struct IdempotencyCoordinator<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for IdempotencyCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for IdempotencyCoordinator<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("IdempotencyCoordinator")
            .field("config", &self.shared.config)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T> IdempotencyCoordinator<T>
where
    T: Send + Sync + 'static,
{
    #[must_use]
    pub fn new(config: IdempotencyConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                clock,
                config,
            }),
        }
    }

    #[must_use]
    pub fn with_system_clock(config: IdempotencyConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn config(&self) -> &IdempotencyConfig {
        &self.shared.config
    }

    /// Runs `operation` at most once per key within the configured window.
    ///
    /// The key is validated first; an invalid key never reaches the entry map
    /// and never invokes `operation`.
    ///
    /// # Errors
    ///
    /// - [`IdempotencyError::InvalidKey`] if `raw_key` is empty or malformed
    /// - [`IdempotencyError::OperationFailed`] if the shared execution failed
    /// - [`IdempotencyError::Timeout`] if it exceeded `operation_timeout`
    /// - [`IdempotencyError::Abandoned`] if it panicked or was aborted
    pub async fn execute<F, Fut, E>(
        &self,
        raw_key: &str,
        operation: F,
    ) -> Result<Execution<T>, IdempotencyError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        let key = IdempotencyKey::parse(raw_key)?;
        self.execute_with_key(key, operation).await
    }

    /// Same as [`execute`](Self::execute) for an already validated key.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn execute_with_key<F, Fut, E>(
        &self,
        key: IdempotencyKey,
        operation: F,
    ) -> Result<Execution<T>, IdempotencyError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        let (receiver, origin) = match self.claim(&key) {
            Claim::Cached(value) => {
                tracing::debug!(key = %key, "idempotency cache hit");
                return Ok(Execution {
                    key,
                    value,
                    origin: ExecutionOrigin::Cached,
                });
            }
            Claim::Join(receiver) => {
                tracing::debug!(key = %key, "joining in-flight execution");
                (receiver, ExecutionOrigin::Joined)
            }
            Claim::Execute {
                generation,
                sender,
                receiver,
            } => {
                tracing::debug!(key = %key, generation, "executing idempotent operation");
                self.spawn_execution(key.clone(), generation, sender, operation);
                (receiver, ExecutionOrigin::Executed)
            }
        };

        let value = wait_for_outcome(receiver, &key).await?;
        Ok(Execution { key, value, origin })
    }

    /// Atomic check-and-insert.
    fn claim(&self, key: &IdempotencyKey) -> Claim<T> {
        let now = self.shared.clock.now();
        let mut entries = self.shared.entries.lock();

        if let Some(slot) = entries.get(key) {
            match &slot.phase {
                Phase::Pending(receiver) => return Claim::Join(receiver.clone()),
                Phase::Completed(value) if now < slot.expires_at => {
                    return Claim::Cached(Arc::clone(value));
                }
                Phase::Completed(_) => {
                    tracing::debug!(key = %key, expired_at = %slot.expires_at, "reclaiming expired entry");
                }
            }
        }

        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        let expires_at = now
            .checked_add_signed(to_time_delta(self.shared.config.window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let (sender, receiver) = watch::channel(None);

        entries.insert(
            key.clone(),
            Slot {
                generation,
                created_at: now,
                expires_at,
                phase: Phase::Pending(receiver.clone()),
            },
        );
        drop(entries);

        Claim::Execute {
            generation,
            sender,
            receiver,
        }
    }

    fn spawn_execution<F, Fut, E>(
        &self,
        key: IdempotencyKey,
        generation: u64,
        sender: watch::Sender<Option<Outcome<T>>>,
        operation: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        let completion = Completion {
            shared: Arc::clone(&self.shared),
            key,
            generation,
            sender: Some(sender),
        };
        let timeout = self.shared.config.operation_timeout;

        tokio::spawn(async move {
            let key = completion.key.to_string();
            let failed = |error: E| IdempotencyError::OperationFailed {
                key: key.clone(),
                source: Arc::new(error),
            };

            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(result) => result.map_err(failed),
                    Err(_) => Err(IdempotencyError::Timeout {
                        key: key.clone(),
                        timeout: limit,
                    }),
                },
                None => operation().await.map_err(failed),
            };

            completion.finish(result);
        });
    }

    /// Removes every completed entry whose window has elapsed. Returns how many
    /// were removed.
    ///
    /// `Pending` entries stay until their execution settles, even past their
    /// window.
    pub fn purge_expired(&self) -> usize {
        self.shared.purge_expired()
    }

    /// Spawns a background task that calls [`purge_expired`](Self::purge_expired)
    /// every `interval`.
    ///
    /// The task holds only a weak reference and exits on its own once every
    /// coordinator handle has been dropped. Abort the returned handle to stop
    /// it earlier.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let shared: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        let period = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let removed = shared.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, "purged expired idempotency entries");
                }
            }
        })
    }

    /// Returns a snapshot of the entry for `key`, expired or not.
    #[must_use]
    pub fn entry(&self, key: &IdempotencyKey) -> Option<IdempotencyEntry<T>> {
        let entries = self.shared.entries.lock();
        entries.get(key).map(|slot| {
            let (state, result) = match &slot.phase {
                Phase::Pending(_) => (EntryState::Pending, None),
                Phase::Completed(value) => (EntryState::Completed, Some(Arc::clone(value))),
            };
            IdempotencyEntry {
                key: key.clone(),
                state,
                result,
                created_at: slot.created_at,
                expires_at: slot.expires_at,
            }
        })
    }
}

impl<T> IdempotencyCoordinator<T> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn wait_for_outcome<T>(
    mut receiver: watch::Receiver<Option<Outcome<T>>>,
    key: &IdempotencyKey,
) -> Outcome<T> {
    let abandoned = || IdempotencyError::Abandoned {
        key: key.to_string(),
    };

    let outcome = receiver
        .wait_for(Option::is_some)
        .await
        .map_err(|_| abandoned())?
        .clone();

    outcome.unwrap_or_else(|| Err(abandoned()))
}

// =============================================================================
// Tests
// =============================================================================

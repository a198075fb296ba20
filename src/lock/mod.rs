//! # Named Leases
//!
//! Time-bounded named locks used to serialize writers of the same plan expansion
//! document. A lease expires on its own if the holder dies, and waiters poll until a
//! deadline instead of blocking indefinitely.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pipeline_engine::lock::{wait_to_acquire_lock, InMemoryPersistentLocker, PersistentLocker};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), pipeline_engine::lock::LockError> {
//! let locker: Arc<dyn PersistentLocker> = Arc::new(InMemoryPersistentLocker::new());
//! let lock = wait_to_acquire_lock(&locker, "PLAN_EXPANSION_LOCK_pe-1", Duration::from_secs(10), Duration::from_secs(5)).await?;
//! // ... guarded write ...
//! lock.release().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LockError {
    #[error("Timed out after {waited_ms}ms waiting for lock {name}")]
    Timeout { name: String, waited_ms: u64 },

    #[error("Lock {name} is not held by this token")]
    NotHeld { name: String },

    #[error("Lock backend error: {0}")]
    Backend(String),
}

pub type LockResult<T> = Result<T, LockError>;

#[async_trait]
pub trait PersistentLocker: Send + Sync {
    /// Take the lease if it is free or expired; returns the holder token
    async fn try_acquire(&self, name: &str, lease: Duration) -> LockResult<Option<String>>;

    async fn release(&self, name: &str, token: &str) -> LockResult<()>;
}

/// Guard over an acquired lease. Prefer [`AcquiredLock::release`]; dropping the guard
/// releases in the background when a tokio runtime is available, otherwise the lease
/// simply expires.
pub struct AcquiredLock {
    locker: Arc<dyn PersistentLocker>,
    name: String,
    token: Option<String>,
}

impl std::fmt::Debug for AcquiredLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquiredLock")
            .field("name", &self.name)
            .field("held", &self.token.is_some())
            .finish()
    }
}

impl AcquiredLock {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn release(mut self) -> LockResult<()> {
        match self.token.take() {
            Some(token) => self.locker.release(&self.name, &token).await,
            None => Ok(()),
        }
    }
}

impl Drop for AcquiredLock {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let locker = Arc::clone(&self.locker);
        let name = self.name.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = locker.release(&name, &token).await {
                        warn!(lock = %name, error = %error, "Failed to release lock on drop");
                    }
                });
            }
            Err(_) => debug!(lock = %name, "No runtime to release lock, lease will expire"),
        }
    }
}

/// Poll for the lease until `wait_timeout` elapses
pub async fn wait_to_acquire_lock(
    locker: &Arc<dyn PersistentLocker>,
    name: &str,
    lease: Duration,
    wait_timeout: Duration,
) -> LockResult<AcquiredLock> {
    let started = Instant::now();
    loop {
        if let Some(token) = locker.try_acquire(name, lease).await? {
            debug!(lock = %name, waited_ms = started.elapsed().as_millis() as u64, "🔒 Lock acquired");
            return Ok(AcquiredLock {
                locker: Arc::clone(locker),
                name: name.to_string(),
                token: Some(token),
            });
        }

        let elapsed = started.elapsed();
        if elapsed >= wait_timeout {
            return Err(LockError::Timeout {
                name: name.to_string(),
                waited_ms: elapsed.as_millis() as u64,
            });
        }
        tokio::time::sleep(POLL_INTERVAL.min(wait_timeout - elapsed)).await;
    }
}

#[derive(Debug)]
struct Lease {
    token: String,
    expires_at: Instant,
}

/// Process-local locker
#[derive(Debug, Default)]
pub struct InMemoryPersistentLocker {
    leases: Mutex<HashMap<String, Lease>>,
}

impl InMemoryPersistentLocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.leases
            .lock()
            .get(name)
            .is_some_and(|lease| lease.expires_at > Instant::now())
    }
}

#[async_trait]
impl PersistentLocker for InMemoryPersistentLocker {
    async fn try_acquire(&self, name: &str, lease: Duration) -> LockResult<Option<String>> {
        let now = Instant::now();
        let mut leases = self.leases.lock();
        if let Some(existing) = leases.get(name) {
            if existing.expires_at > now {
                return Ok(None);
            }
        }
        let token = Uuid::new_v4().to_string();
        leases.insert(
            name.to_string(),
            Lease {
                token: token.clone(),
                expires_at: now + lease,
            },
        );
        Ok(Some(token))
    }

    async fn release(&self, name: &str, token: &str) -> LockResult<()> {
        let mut leases = self.leases.lock();
        match leases.get(name) {
            Some(lease) if lease.token == token => {
                leases.remove(name);
                Ok(())
            }
            // Expired and taken over by someone else
            Some(_) => Err(LockError::NotHeld {
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }
}

//! Exactly-once lazy initialization
//!
//! [`LazySingleton`] holds a client that must exist at most once per process
//! (cache, coordination store). The first caller runs the constructor while
//! everyone else waits on the cell; late arrivals re-check before
//! constructing. A failed constructor leaves the cell empty, so the next
//! caller retries instead of observing a cached failure.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// A value constructed on first use and shared for the owner's lifetime
pub struct LazySingleton<T> {
    /// Human-readable label for logging
    name: String,

    cell: OnceCell<Arc<T>>,

    /// Number of times the constructor has been invoked
    attempts: AtomicU64,
}

impl<T> LazySingleton<T> {
    /// Create an empty singleton; nothing is constructed yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cell: OnceCell::new(),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the value if it has already been constructed
    pub fn get(&self) -> Option<Arc<T>> {
        self.cell.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Number of constructor invocations so far, successful or not
    pub fn init_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Return the value, constructing it with `init` if no caller has yet.
    ///
    /// Concurrent callers wait for the in-flight construction instead of
    /// starting their own. On failure the error goes to the caller that ran
    /// `init` and the next waiter (or later caller) gets a fresh attempt.
    pub async fn get_or_init<F, Fut, E>(&self, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        if let Some(value) = self.cell.get() {
            return Ok(Arc::clone(value));
        }

        let value = self
            .cell
            .get_or_try_init(|| async move {
                let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(name = %self.name, attempt, "Initializing lazy singleton");

                match init().await {
                    Ok(value) => {
                        info!(name = %self.name, attempt, "Lazy singleton initialized");
                        Ok(Arc::new(value))
                    }
                    Err(e) => {
                        warn!(name = %self.name, attempt, error = %e, "Lazy singleton initialization failed");
                        Err(e)
                    }
                }
            })
            .await?;

        Ok(Arc::clone(value))
    }
}

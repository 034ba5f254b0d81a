//! Self-healing connection handle
//!
//! A [`SelfHealingHandle`] caches one shared connection. `get` returns the
//! cached value while it looks healthy; when it is absent, or the error
//! predicate reports it broken, the next `get` rebuilds it under the
//! handle's rebuild lock. Detection is reactive: the operation that fails
//! flags the connection, and only the *following* `get` replaces it.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::connection::{BackendId, Connector, PoolError};
use crate::config::BackendConfig;

type ErrorPredicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Lazily built, cached connection that rebuilds itself once found broken
pub struct SelfHealingHandle<C: Connector> {
    name: BackendId,
    config: BackendConfig,
    connector: Arc<C>,

    /// Current connection; only held briefly, never across an await
    cached: RwLock<Option<Arc<C::Conn>>>,

    /// Serializes reconstruction
    rebuild: Mutex<()>,

    is_broken: ErrorPredicate<C::Conn>,

    /// Number of successful constructions
    generation: AtomicU64,
}

impl<C: Connector> SelfHealingHandle<C> {
    /// Create a handle with nothing cached. By default no connection is ever
    /// considered broken; see [`with_error_predicate`](Self::with_error_predicate).
    pub fn new(name: impl Into<BackendId>, config: BackendConfig, connector: Arc<C>) -> Result<Self, PoolError> {
        let name = name.into();
        config.validate_endpoint(&name)?;

        Ok(Self {
            name,
            config,
            connector,
            cached: RwLock::new(None),
            rebuild: Mutex::new(()),
            is_broken: Box::new(|_| false),
            generation: AtomicU64::new(0),
        })
    }

    /// Use `predicate` to decide whether the cached connection must be replaced
    pub fn with_error_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&C::Conn) -> bool + Send + Sync + 'static,
    {
        self.is_broken = Box::new(predicate);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a connection is currently cached (healthy or not)
    pub fn is_cached(&self) -> bool {
        self.cached.read().is_some()
    }

    /// Number of connections this handle has successfully built
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Return the cached connection, rebuilding it if absent or broken.
    ///
    /// On construction failure nothing is cached and the error is returned;
    /// the next call tries again.
    pub async fn get(&self) -> Result<Arc<C::Conn>, PoolError> {
        if let Some(conn) = self.healthy() {
            return Ok(conn);
        }

        let _guard = self.rebuild.lock().await;

        // Another caller may have rebuilt it while we waited
        if let Some(conn) = self.healthy() {
            return Ok(conn);
        }

        let discarded = self.cached.write().take();
        if let Some(old) = discarded {
            warn!(
                backend = %self.name,
                generation = self.generation(),
                references = Arc::strong_count(&old),
                "Discarding broken connection"
            );
        }

        match self.connector.connect(&self.name, &self.config).await {
            Ok(conn) => {
                let conn = Arc::new(conn);
                *self.cached.write() = Some(Arc::clone(&conn));
                let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                info!(backend = %self.name, generation, "Connection established");
                Ok(conn)
            }
            Err(e) => {
                warn!(backend = %self.name, error = %e, "Failed to re-establish connection");
                Err(e)
            }
        }
    }

    /// Drop the cached connection so the next `get` rebuilds it
    pub fn invalidate(&self) {
        if self.cached.write().take().is_some() {
            debug!(backend = %self.name, "Cached connection invalidated");
        }
    }

    fn healthy(&self) -> Option<Arc<C::Conn>> {
        let conn = self.cached.read().clone()?;
        if (self.is_broken)(&conn) {
            None
        } else {
            Some(conn)
        }
    }
}

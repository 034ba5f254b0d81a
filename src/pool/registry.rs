//! Per-service pool registry
//!
//! [`KeyedPoolRegistry`] maps a logical service name to an independently
//! built pool. Pools are built on first resolution, under a single build
//! lock, from the configuration the registry's [`ConfigSource`] reports for
//! that name. Entries are type-erased so one registry can hold pools of
//! different kinds; resolving a name as a kind other than the one stored
//! discards the stale entry and rebuilds it.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::connection::{Connector, PoolError};
use super::slot::SlotPool;
use crate::config::{BackendConfig, ConfigSource};

type Entry = Arc<dyn Any + Send + Sync>;

/// Lazily populated map from service name to pool
pub struct KeyedPoolRegistry {
    source: Arc<dyn ConfigSource>,

    /// Built pools; the lock is only held for map access
    entries: RwLock<HashMap<String, Entry>>,

    /// Serializes pool construction
    build: Mutex<()>,
}

impl KeyedPoolRegistry {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
            build: Mutex::new(()),
        }
    }

    /// Return the pool registered for `name`, building it with `build` on
    /// first use.
    ///
    /// At most one pool is built per name regardless of how many callers
    /// race on the first resolution. A name with no configuration fails with
    /// [`PoolError::UnknownService`] and nothing is cached. If `build` fails
    /// the error is returned and the next call tries again.
    pub async fn resolve<P, F, Fut>(&self, name: &str, build: F) -> Result<Arc<P>, PoolError>
    where
        P: Send + Sync + 'static,
        F: FnOnce(BackendConfig) -> Fut,
        Fut: Future<Output = Result<P, PoolError>>,
    {
        if let Some(pool) = self.lookup::<P>(name) {
            return Ok(pool);
        }

        let _guard = self.build.lock().await;

        if let Some(pool) = self.lookup::<P>(name) {
            return Ok(pool);
        }

        let config = self.source.backend(name).ok_or_else(|| {
            warn!(service = %name, "No configuration for service");
            PoolError::UnknownService(name.to_string())
        })?;

        debug!(service = %name, address = %config.address, "Building service pool");
        let pool = Arc::new(build(config).await.map_err(|e| {
            warn!(service = %name, error = %e, "Failed to build service pool");
            e
        })?);

        let entry: Entry = pool.clone();
        self.entries.write().insert(name.to_string(), entry);
        info!(service = %name, "Registered service pool");

        Ok(pool)
    }

    /// Resolve `name` to a pre-filled [`SlotPool`] built with `connector`
    pub async fn resolve_slot_pool<C: Connector>(
        &self,
        name: &str,
        connector: Arc<C>,
    ) -> Result<Arc<SlotPool<C>>, PoolError> {
        let service = name.to_string();
        self.resolve(name, move |config| async move {
            let pool = SlotPool::new(service, config, connector)?;
            pool.prefill().await?;
            Ok(pool)
        })
        .await
    }

    /// Whether a pool is registered for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Names of all registered pools, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn lookup<P: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<P>> {
        let entry = self.entries.read().get(name).cloned()?;

        match entry.downcast::<P>() {
            Ok(pool) => Some(pool),
            Err(_) => {
                self.discard_mismatched::<P>(name);
                None
            }
        }
    }

    fn discard_mismatched<P: Send + Sync + 'static>(&self, name: &str) {
        let mut entries = self.entries.write();

        // Re-check: another caller may already have rebuilt the entry
        let mismatched = entries
            .get(name)
            .is_some_and(|entry| !(**entry).is::<P>());

        if mismatched {
            entries.remove(name);
            warn!(
                service = %name,
                expected = std::any::type_name::<P>(),
                "Discarding registry entry of unexpected type"
            );
        }
    }
}

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, ConfigSource};
use crate::pool::{
    Connector, KeyedPoolRegistry, LazySingleton, PoolError, SelfHealingHandle, SlotLease, SlotPool,
    TcpConnector,
};

/// Process-scoped context owning one lifecycle component per configured backend
///
/// Built once at startup and shared by cloning; clones share the same pools,
/// handle, singleton and registry. There is no reset: everything lives until
/// the process exits.
pub struct Core<C: Connector = TcpConnector> {
    pub config: Arc<Config>,
    connector: Arc<C>,
    documents: Option<Arc<SlotPool<C>>>,
    database: Option<Arc<SelfHealingHandle<C>>>,
    cache: Arc<LazySingleton<C::Conn>>,
    registry: Arc<KeyedPoolRegistry>,
}

impl<C: Connector> Clone for Core<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            connector: Arc::clone(&self.connector),
            documents: self.documents.clone(),
            database: self.database.clone(),
            cache: Arc::clone(&self.cache),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl Core<TcpConnector> {
    /// Build the context with the TCP connector
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_connector(config, Arc::new(TcpConnector::new())).await
    }
}

impl<C: Connector> Core<C> {
    /// Build the context, pre-filling the document pool.
    ///
    /// A pre-fill failure is logged and tolerated: the pool grows on demand
    /// once the backend is reachable. Nothing else connects until first use.
    pub async fn with_connector(config: Config, connector: Arc<C>) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        let config = Arc::new(config);

        let documents = match &config.documents {
            Some(backend) => {
                let pool = SlotPool::new("documents", backend.clone(), Arc::clone(&connector))?;
                match pool.prefill().await {
                    Ok(size) => info!(backend = "documents", size, "Document pool ready"),
                    Err(e) => warn!(backend = "documents", error = %e, "Document pool pre-fill failed"),
                }
                Some(Arc::new(pool))
            }
            None => None,
        };

        let database = match &config.database {
            Some(backend) => {
                let health = Arc::clone(&connector);
                let handle = SelfHealingHandle::new("database", backend.clone(), Arc::clone(&connector))?
                    .with_error_predicate(move |conn| health.is_broken(conn));
                Some(Arc::new(handle))
            }
            None => None,
        };

        let source: Arc<dyn ConfigSource> = config.clone();
        let registry = Arc::new(KeyedPoolRegistry::new(source));

        Ok(Self {
            config,
            connector,
            documents,
            database,
            cache: Arc::new(LazySingleton::new("cache")),
            registry,
        })
    }

    /// The document slot pool, if configured
    pub fn document_pool(&self) -> Option<&Arc<SlotPool<C>>> {
        self.documents.as_ref()
    }

    /// Check out a document-store connection
    pub async fn documents(&self) -> Result<SlotLease<C::Conn>> {
        let pool = self
            .documents
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Document store is not configured"))?;
        Ok(pool.acquire().await?)
    }

    /// The database handle, if configured
    pub fn database_handle(&self) -> Option<&Arc<SelfHealingHandle<C>>> {
        self.database.as_ref()
    }

    /// Get the shared database connection, reconnecting if it was found broken
    pub async fn database(&self) -> Result<Arc<C::Conn>> {
        let handle = self
            .database
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Database is not configured"))?;
        Ok(handle.get().await?)
    }

    /// Get the process-wide cache client, connecting on first use
    pub async fn cache(&self) -> Result<Arc<C::Conn>> {
        let backend = self
            .config
            .cache
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Cache is not configured"))?;

        let conn = self
            .cache
            .get_or_init(|| self.connector.connect("cache", backend))
            .await?;
        Ok(conn)
    }

    /// Whether the cache client has been constructed
    pub fn cache_ready(&self) -> bool {
        self.cache.is_initialized()
    }

    /// Get the connection pool for a remote service
    pub async fn service(&self, name: &str) -> Result<Arc<SlotPool<C>>, PoolError> {
        self.registry
            .resolve_slot_pool(name, Arc::clone(&self.connector))
            .await
    }

    pub fn registry(&self) -> &KeyedPoolRegistry {
        &self.registry
    }
}

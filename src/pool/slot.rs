//! Bounded slot pool with lazy growth
//!
//! A [`SlotPool`] owns up to `capacity` resources, each in its own slot with
//! a busy flag. The pool:
//! - Pre-fills `min(initial, capacity)` slots on [`SlotPool::prefill`]
//! - Hands out the lowest-index free slot on [`SlotPool::acquire`]
//! - Grows by one slot when every existing slot is busy
//! - Reports exhaustion instead of waiting once `size == capacity`
//!
//! Slots are never torn down or replaced. There is no health check on
//! acquire or release, so a resource that silently failed stays in rotation
//! until the process restarts; callers that need self-healing should use
//! [`SelfHealingHandle`](super::SelfHealingHandle) instead.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::connection::{BackendId, Connector, PoolError};
use crate::config::BackendConfig;

/// Statistics for a slot pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Maximum number of slots
    pub capacity: usize,

    /// Slots holding a constructed resource
    pub size: usize,

    /// Slots currently checked out
    pub busy: usize,

    /// Slots constructed and free
    pub idle: usize,

    /// Total resources constructed
    pub total_created: u64,

    /// Total successful acquisitions
    pub total_acquired: u64,

    /// Acquisitions rejected because the pool was full
    pub total_exhausted: u64,

    /// Failed construction attempts
    pub failed_attempts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    acquired: AtomicU64,
    exhausted: AtomicU64,
    failed: AtomicU64,
}

/// A pool-owned resource plus its busy flag
#[derive(Debug)]
struct Slot<T> {
    index: usize,
    resource: T,
    busy: AtomicBool,
}

impl<T> Slot<T> {
    fn new(index: usize, resource: T, busy: bool) -> Self {
        Self {
            index,
            resource,
            busy: AtomicBool::new(busy),
        }
    }

    /// Atomically flip the slot from free to busy
    fn try_claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
}

/// Exclusive checkout of one pooled resource.
///
/// Leases cannot be built outside the pool. Dropping a lease (or passing it
/// to [`SlotPool::release`]) returns the slot; since the lease is consumed,
/// a slot cannot be released twice.
#[derive(Debug)]
pub struct SlotLease<T> {
    slot: Arc<Slot<T>>,
}

impl<T> SlotLease<T> {
    /// Position of the leased slot in its pool
    pub fn index(&self) -> usize {
        self.slot.index
    }
}

impl<T> Deref for SlotLease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.slot.resource
    }
}

impl<T> Drop for SlotLease<T> {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}

/// Fixed-capacity pool of lazily constructed resources for one backend
pub struct SlotPool<C: Connector> {
    name: BackendId,
    config: BackendConfig,
    connector: Arc<C>,

    /// Constructed slots; `slots.len()` is the pool size and only grows
    slots: RwLock<Vec<Arc<Slot<C::Conn>>>>,

    counters: Counters,
}

impl<C: Connector> SlotPool<C> {
    /// Create an empty pool; no resource is constructed until
    /// [`prefill`](Self::prefill) or [`acquire`](Self::acquire)
    pub fn new(name: impl Into<BackendId>, config: BackendConfig, connector: Arc<C>) -> Result<Self, PoolError> {
        let name = name.into();
        config.validate(&name)?;

        debug!(
            backend = %name,
            capacity = config.capacity,
            initial = config.initial,
            "Creating slot pool"
        );

        Ok(Self {
            slots: RwLock::new(Vec::with_capacity(config.capacity)),
            name,
            config,
            connector,
            counters: Counters::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Number of constructed slots
    pub async fn size(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Construct free slots until `min(initial, capacity)` exist.
    ///
    /// Stops at the first construction failure and returns it; slots built
    /// before the failure stay in the pool. Returns the resulting size.
    pub async fn prefill(&self) -> Result<usize, PoolError> {
        let target = self.config.initial.min(self.capacity());
        let mut slots = self.slots.write().await;

        while slots.len() < target {
            let index = slots.len();
            let resource = self.construct(index).await?;
            slots.push(Arc::new(Slot::new(index, resource, false)));
        }

        debug!(backend = %self.name, size = slots.len(), "Slot pool pre-filled");
        Ok(slots.len())
    }

    /// Check out the lowest-index free resource, growing the pool if needed.
    ///
    /// Fails with [`PoolError::Exhausted`] when every slot is busy and the
    /// pool is at capacity. A construction failure while growing is returned
    /// as-is and leaves the pool size unchanged.
    pub async fn acquire(&self) -> Result<SlotLease<C::Conn>, PoolError> {
        {
            let slots = self.slots.read().await;
            if let Some(lease) = Self::claim_free(&slots) {
                self.counters.acquired.fetch_add(1, Ordering::Relaxed);
                debug!(backend = %self.name, index = lease.index(), "Reusing slot");
                return Ok(lease);
            }
        }

        let mut slots = self.slots.write().await;

        // A slot may have been released while we waited for the write lock
        if let Some(lease) = Self::claim_free(&slots) {
            self.counters.acquired.fetch_add(1, Ordering::Relaxed);
            debug!(backend = %self.name, index = lease.index(), "Reusing slot");
            return Ok(lease);
        }

        if slots.len() >= self.capacity() {
            self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
            warn!(backend = %self.name, capacity = self.capacity(), "Slot pool exhausted");
            return Err(PoolError::Exhausted {
                backend: self.name.clone(),
                capacity: self.capacity(),
            });
        }

        let index = slots.len();
        let resource = self.construct(index).await?;
        let slot = Arc::new(Slot::new(index, resource, true));
        slots.push(Arc::clone(&slot));
        self.counters.acquired.fetch_add(1, Ordering::Relaxed);

        info!(
            backend = %self.name,
            index,
            size = slots.len(),
            capacity = self.capacity(),
            "Slot pool grown"
        );

        Ok(SlotLease { slot })
    }

    /// Return a leased resource to the pool
    pub fn release(&self, lease: SlotLease<C::Conn>) {
        debug!(backend = %self.name, index = lease.index(), "Releasing slot");
        drop(lease);
    }

    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        let slots = self.slots.read().await;
        let busy = slots
            .iter()
            .filter(|slot| slot.busy.load(Ordering::Acquire))
            .count();

        PoolStats {
            capacity: self.capacity(),
            size: slots.len(),
            busy,
            idle: slots.len() - busy,
            total_created: self.counters.created.load(Ordering::Relaxed),
            total_acquired: self.counters.acquired.load(Ordering::Relaxed),
            total_exhausted: self.counters.exhausted.load(Ordering::Relaxed),
            failed_attempts: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    fn claim_free(slots: &[Arc<Slot<C::Conn>>]) -> Option<SlotLease<C::Conn>> {
        slots
            .iter()
            .find(|slot| slot.try_claim())
            .map(|slot| SlotLease {
                slot: Arc::clone(slot),
            })
    }

    async fn construct(&self, index: usize) -> Result<C::Conn, PoolError> {
        match self.connector.connect(&self.name, &self.config).await {
            Ok(resource) => {
                self.counters.created.fetch_add(1, Ordering::Relaxed);
                Ok(resource)
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(backend = %self.name, index, error = %e, "Failed to construct slot resource");
                Err(e)
            }
        }
    }
}

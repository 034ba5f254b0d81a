//! Connection lifecycle module
//!
//! This module provides:
//! - A lazy singleton for clients that must exist at most once per process
//! - A bounded slot pool grown lazily up to its capacity
//! - A self-healing handle that rebuilds a broken cached connection on next use
//! - A per-service registry of independently built pools
//! - The `Connector` seam every component builds its resources through

pub mod connection;
pub mod handle;
pub mod lazy;
pub mod registry;
pub mod slot;

pub use connection::{BackendId, Connector, PoolError, TcpConnection, TcpConnector};
pub use handle::SelfHealingHandle;
pub use lazy::LazySingleton;
pub use registry::KeyedPoolRegistry;
pub use slot::{PoolStats, SlotLease, SlotPool};

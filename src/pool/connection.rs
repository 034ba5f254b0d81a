//! Backend connections and the connector seam
//!
//! Every lifecycle component builds its resources through a [`Connector`].
//! This module provides:
//! - The shared [`PoolError`] taxonomy
//! - The [`Connector`] trait (backend constructor)
//! - A TCP connector that dials with a timeout and enables keep-alive
//! - [`TcpConnection`], a connection carrying a sticky "broken" flag

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;

/// Logical name of a backend (e.g. "documents", "database", a service name)
pub type BackendId = String;

/// Error types for connection lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Failed to connect to backend {backend}: {reason}")]
    ConnectionFailed { backend: BackendId, reason: String },

    #[error("Pool is exhausted for backend {backend} (capacity {capacity})")]
    Exhausted { backend: BackendId, capacity: usize },

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Invalid configuration for backend {backend}: {reason}")]
    InvalidConfig { backend: BackendId, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoolError {
    /// Create a connection failure for the given backend
    pub fn connection_failed(backend: impl Into<BackendId>, reason: impl ToString) -> Self {
        Self::ConnectionFailed {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error for the given backend
    pub fn invalid_config(backend: impl Into<BackendId>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a capacity backpressure signal
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Backend constructor used by every lifecycle component.
///
/// `connect` may perform network I/O and may be slow. Components call it
/// while holding their construction lock, so it runs at most once per
/// construction decision.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The resource produced by this connector
    type Conn: Send + Sync + 'static;

    /// Build a new resource for `backend` from its configuration
    async fn connect(&self, backend: &str, config: &BackendConfig) -> Result<Self::Conn, PoolError>;

    /// Whether a previously built resource has been observed broken.
    ///
    /// This only reads state left behind by earlier operations; it must not
    /// probe the backend.
    fn is_broken(&self, _conn: &Self::Conn) -> bool {
        false
    }
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A TCP connection to a backend
#[derive(Debug)]
pub struct TcpConnection {
    id: u64,
    backend: BackendId,
    peer: SocketAddr,
    stream: Mutex<TcpStream>,

    /// Sticky error flag, set by the first failed operation
    broken: AtomicBool,

    use_count: AtomicU64,
}

impl TcpConnection {
    fn new(backend: BackendId, peer: SocketAddr, stream: TcpStream) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            backend,
            peer,
            stream: Mutex::new(stream),
            broken: AtomicBool::new(false),
            use_count: AtomicU64::new(0),
        }
    }

    /// Process-unique connection id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn use_count(&self) -> u64 {
        self.use_count.load(Ordering::Relaxed)
    }

    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Flag the connection as broken so its owner replaces it
    pub fn mark_broken(&self) {
        if !self.broken.swap(true, Ordering::AcqRel) {
            warn!(
                backend = %self.backend,
                connection_id = self.id,
                peer = %self.peer,
                "Connection marked broken"
            );
        }
    }

    /// Write a payload to the backend.
    ///
    /// A failed write marks the connection broken; it is not retried.
    pub async fn send(&self, payload: &[u8]) -> Result<(), PoolError> {
        self.use_count.fetch_add(1, Ordering::Relaxed);

        let mut stream = self.stream.lock().await;
        let result = match stream.write_all(payload).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };

        result.map_err(|e| {
            self.mark_broken();
            PoolError::Io(e)
        })
    }
}

/// Connector that dials `BackendConfig::address` over TCP
#[derive(Debug, Clone, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, backend: &str, config: &BackendConfig) -> Result<TcpConnection, PoolError> {
        debug!(
            backend = %backend,
            address = %config.address,
            timeout_secs = config.connect_timeout_secs,
            "Creating new connection"
        );

        let stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(&config.address))
            .await
            .map_err(|_| PoolError::connection_failed(backend, "Connection timeout"))?
            .map_err(|e| PoolError::connection_failed(backend, e))?;

        // Configure TCP keep-alive
        let socket = socket2::Socket::from(stream.into_std()?);
        socket.set_keepalive(true)?;
        let stream = TcpStream::from_std(socket.into())?;
        let peer = stream.peer_addr()?;

        let conn = TcpConnection::new(backend.to_string(), peer, stream);

        info!(
            backend = %backend,
            connection_id = conn.id(),
            peer = %peer,
            "Created new connection"
        );

        Ok(conn)
    }

    fn is_broken(&self, conn: &TcpConnection) -> bool {
        conn.is_broken()
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;

/// Identifier assigned to each viewer connection
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Result of handing one message to one viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for the viewer's writer
    Delivered,
    /// Viewer queue full, message skipped for this viewer only
    Dropped,
    /// Viewer is gone; the connection should be unregistered
    Closed,
}

/// Handle to one viewer's outgoing queue
///
/// Sending never waits: each connection has a bounded queue drained by its
/// own writer task, so a stalled viewer only ever loses its own messages.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<str>>,
}

impl Connection {
    /// Create a connection and the receiving end its writer drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a message without waiting
    pub fn try_send(&self, message: Arc<str>) -> SendOutcome {
        match self.tx.try_send(message) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(_)) => SendOutcome::Dropped,
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

/// Thread-safe set of live viewer connections
///
/// Register and unregister are idempotent. Broadcasts iterate over a
/// snapshot, so membership changes during a pass only affect later passes.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<Vec<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns `false` if it was already registered.
    pub async fn register(&self, conn: Connection) -> bool {
        let mut connections = self.connections.write().await;
        if connections.iter().any(|c| c.id == conn.id) {
            return false;
        }
        connections.push(conn);
        tracing::info!("Viewer connected. Total viewers: {}", connections.len());
        true
    }

    /// Remove a connection. Returns `false` if it was not registered.
    pub async fn unregister(&self, conn: &Connection) -> bool {
        self.unregister_id(conn.id).await
    }

    pub async fn unregister_id(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        let before = connections.len();
        connections.retain(|c| c.id != id);
        let removed = connections.len() != before;
        if removed {
            tracing::info!("Viewer {} removed. Remaining: {}", id, connections.len());
        }
        removed
    }

    /// Copy of the current membership, in registration order
    pub async fn snapshot(&self) -> Vec<Connection> {
        self.connections.read().await.clone()
    }

    /// Apply `f` to every connection in a snapshot taken now
    ///
    /// The lock is released before `f` runs, so `f` may freely call back into
    /// the registry.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Connection),
    {
        for conn in self.snapshot().await.iter() {
            f(conn);
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Drop every connection, closing their queues
    pub async fn clear(&self) {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        connections.clear();
        if count > 0 {
            tracing::info!("Released {} viewer connections", count);
        }
    }
}

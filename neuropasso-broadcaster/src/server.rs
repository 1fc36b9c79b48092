use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};

use crate::connection::{Connection, ConnectionId, ConnectionRegistry};
use crate::error::{BroadcasterError, Result};

/// Tuning for accepted viewer connections
#[derive(Debug, Clone)]
pub struct ViewerOptions {
    /// Messages buffered per viewer before updates are skipped
    pub queue_capacity: usize,
    /// Longest a single line write may take before the viewer is dropped
    pub write_timeout: Duration,
    /// Pause after a failed accept (e.g. out of file descriptors)
    pub accept_backoff: Duration,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            write_timeout: Duration::from_secs(2),
            accept_backoff: Duration::from_millis(100),
        }
    }
}

/// TCP server streaming newline-delimited JSON updates to viewers
///
/// Every accepted socket is registered with the shared [`ConnectionRegistry`]
/// and unregistered again when the viewer hangs up, a write fails, or a write
/// exceeds the configured timeout. Viewers receive only updates published
/// after they connect.
pub struct ViewerServer {
    bind_addr: String,
    registry: ConnectionRegistry,
    options: ViewerOptions,
    local_addr: Arc<RwLock<Option<SocketAddr>>>,
    accept_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    running: Arc<RwLock<bool>>,
}

impl ViewerServer {
    pub fn new(bind_addr: impl Into<String>, registry: ConnectionRegistry, options: ViewerOptions) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            registry,
            options,
            local_addr: Arc::new(RwLock::new(None)),
            accept_task: Arc::new(Mutex::new(None)),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Bind the listener and start accepting viewers
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 was requested.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.running.write().await;
        if *running {
            return Err(BroadcasterError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!("Viewer server listening on {}", addr);

        let registry = self.registry.clone();
        let options = self.options.clone();
        let task = tokio::spawn(accept_loop(listener, registry, options));

        *self.accept_task.lock().await = Some(task);
        *self.local_addr.write().await = Some(addr);
        *running = true;

        Ok(addr)
    }

    /// Stop accepting viewers and disconnect the ones already connected
    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.write().await;
        if !*running {
            return Err(BroadcasterError::NotStarted);
        }

        if let Some(task) = self.accept_task.lock().await.take() {
            task.abort();
        }
        self.registry.clear().await;
        *self.local_addr.write().await = None;
        *running = false;

        tracing::info!("Viewer server stopped");
        Ok(())
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    pub async fn viewer_count(&self) -> usize {
        self.registry.len().await
    }
}

impl Drop for ViewerServer {
    fn drop(&mut self) {
        if let Ok(mut task) = self.accept_task.try_lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

// Viewer tasks live in the JoinSet, so aborting the accept task tears them
// down too.
async fn accept_loop(listener: TcpListener, registry: ConnectionRegistry, options: ViewerOptions) {
    let mut viewers = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let (conn, rx) = Connection::channel(options.queue_capacity);
                    let id = conn.id();
                    tracing::info!("Viewer {} connected from {}", id, peer);
                    registry.register(conn).await;
                    viewers.spawn(serve_viewer(stream, rx, id, registry.clone(), options.write_timeout));
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to accept viewer: {} (retrying in {:?})",
                        e,
                        options.accept_backoff
                    );
                    tokio::time::sleep(options.accept_backoff).await;
                }
            },
            Some(_) = viewers.join_next(), if !viewers.is_empty() => {}
        }
    }
}

/// Pump queued lines to one viewer until either side goes away.
///
/// Holds no [`Connection`] handle, so the loop ends once the registry lets
/// go of the viewer.
async fn serve_viewer(
    mut stream: TcpStream,
    mut rx: mpsc::Receiver<Arc<str>>,
    id: ConnectionId,
    registry: ConnectionRegistry,
    write_timeout: Duration,
) {
    let (mut reader, mut writer) = stream.split();
    let mut scratch = [0u8; 512];

    loop {
        tokio::select! {
            line = rx.recv() => {
                let Some(line) = line else { break };
                match tokio::time::timeout(write_timeout, writer.write_all(line.as_bytes())).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!("Failed to write to viewer {}: {}", id, e);
                        break;
                    }
                    Err(_) => {
                        tracing::warn!("Viewer {} write timed out after {:?}", id, write_timeout);
                        break;
                    }
                }
            }
            read = reader.read(&mut scratch) => match read {
                Ok(0) => {
                    tracing::debug!("Viewer {} hung up", id);
                    break;
                }
                // Viewers have nothing to say; inbound bytes are discarded.
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Viewer {} read error: {}", id, e);
                    break;
                }
            },
        }
    }

    registry.unregister_id(id).await;
    let _ = writer.shutdown().await;
}

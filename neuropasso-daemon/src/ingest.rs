//! UDP ingestion loop
//!
//! Single consumer of the telemetry socket. Each datagram is decoded, applied
//! to the device state and, if accepted, published to viewers. The receive
//! is the only point where the loop waits; everything after it runs to
//! completion without suspending on viewers.

use anyhow::{Context, Result};
use neuropasso_broadcaster::{BroadcastHub, DeliveryReport};
use neuropasso_telemetry::{decode, DecodeError, DeviceStateStore};
use serde::Serialize;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

/// Largest datagram read in one receive
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Default pause after a receive error
pub const DEFAULT_RECEIVE_BACKOFF: Duration = Duration::from_millis(100);

/// Pause before retrying when no data was actually ready
const TRANSIENT_RETRY: Duration = Duration::from_millis(5);

/// What happened to one datagram
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Applied to the state store and offered to viewers
    Published(DeliveryReport),
    /// Well-formed, but not from a known device
    UnknownDevice(String),
    /// Could not be decoded
    Rejected(DecodeError),
}

/// Running totals, readable while the loop runs
#[derive(Debug, Default)]
pub struct IngestCounters {
    received: AtomicU64,
    published: AtomicU64,
    unknown: AtomicU64,
    rejected: AtomicU64,
    receive_errors: AtomicU64,
}

/// Point-in-time copy of [`IngestCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub received: u64,
    pub published: u64,
    pub unknown: u64,
    pub rejected: u64,
    pub receive_errors: u64,
}

impl IngestCounters {
    pub fn snapshot(&self) -> IngestStats {
        IngestStats {
            received: self.received.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct IngestionLoop {
    socket: UdpSocket,
    store: Arc<DeviceStateStore>,
    hub: BroadcastHub,
    backoff: Duration,
    counters: Arc<IngestCounters>,
}

impl IngestionLoop {
    pub fn new(socket: UdpSocket, store: Arc<DeviceStateStore>, hub: BroadcastHub) -> Self {
        Self {
            socket,
            store,
            hub,
            backoff: DEFAULT_RECEIVE_BACKOFF,
            counters: Arc::new(IngestCounters::default()),
        }
    }

    /// Bind the telemetry socket at `addr`
    pub async fn bind(addr: &str, store: Arc<DeviceStateStore>, hub: BroadcastHub) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind UDP socket on {}", addr))?;
        Ok(Self::new(socket, store, hub))
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().context("Failed to read UDP socket address")
    }

    pub fn counters(&self) -> Arc<IngestCounters> {
        Arc::clone(&self.counters)
    }

    /// Receive and process datagrams for as long as the task lives
    ///
    /// Receive errors never end the loop.
    pub async fn run(&self) {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        match self.socket.local_addr() {
            Ok(addr) => info!("📡 Listening for leg nodes on UDP {}", addr),
            Err(_) => info!("📡 Listening for leg nodes"),
        }

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, peer)) => {
                    trace!("{} bytes from {}", len, peer);
                    self.process_datagram(&buf[..len]).await;
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    tokio::time::sleep(TRANSIENT_RETRY).await;
                }
                Err(e) => {
                    IngestCounters::bump(&self.counters.receive_errors);
                    warn!("UDP receive error: {} (retrying in {:?})", e, self.backoff);
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }

    /// Decode, apply and publish one datagram
    pub async fn process_datagram(&self, raw: &[u8]) -> IngestOutcome {
        IngestCounters::bump(&self.counters.received);

        let reading = match decode(raw) {
            Ok(reading) => reading,
            Err(e) => {
                IngestCounters::bump(&self.counters.rejected);
                warn!("Dropping datagram {:?}: {}", String::from_utf8_lossy(raw), e);
                return IngestOutcome::Rejected(e);
            }
        };

        let device_id = reading.device_id().to_string();
        if !self.store.update(reading.clone()) {
            IngestCounters::bump(&self.counters.unknown);
            debug!("Ignoring reading from unknown device {:?}", device_id);
            return IngestOutcome::UnknownDevice(device_id);
        }

        let last_seen = self
            .store
            .last_seen(&device_id)
            .unwrap_or_else(|| reading.received_at());
        let report = self.hub.publish(&reading, last_seen).await;
        IngestCounters::bump(&self.counters.published);

        IngestOutcome::Published(report)
    }
}

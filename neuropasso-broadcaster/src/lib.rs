//! Real-time fan-out of leg-node readings to NeuroPasso viewers
//!
//! This crate keeps the set of connected viewers and pushes every accepted
//! reading to all of them. A slow or broken viewer never holds up ingestion
//! or the other viewers: sends are non-blocking, each viewer drains its own
//! bounded queue, and viewers that have gone away are pruned.
//!
//! # Features
//!
//! - TCP viewer server with newline-delimited JSON output
//! - Idempotent, snapshot-based connection registry
//! - Per-viewer write timeout
//! - No catch-up: viewers only see updates published after they connect
//!
//! # Message
//!
//! ```text
//! {"type":"data","id":"ESQ","timestamp":1699000001.0,
//!  "values":{"angle":45.5,"emg":120,"ecg":300,"last_seen":1699000000.5}}
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use neuropasso_broadcaster::{BroadcastHub, ConnectionRegistry, ViewerOptions, ViewerServer};
//! use neuropasso_telemetry::decode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ConnectionRegistry::new();
//!     let server = ViewerServer::new("0.0.0.0:8765", registry.clone(), ViewerOptions::default());
//!     server.start().await?;
//!
//!     let hub = BroadcastHub::new(registry);
//!     let reading = decode(b"ESQ,45.5,120,300")?;
//!     hub.publish(&reading, reading.received_at()).await;
//!
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;
pub mod events;
pub mod hub;
pub mod server;

// Re-exports
pub use connection::{Connection, ConnectionId, ConnectionRegistry, SendOutcome};
pub use error::{BroadcasterError, Result};
pub use events::{PushMessage, ReadingValues};
pub use hub::{BroadcastHub, DeliveryReport};
pub use server::{ViewerOptions, ViewerServer};

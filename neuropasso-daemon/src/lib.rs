//! NeuroPasso daemon library
//!
//! This module re-exports the daemon's modules for integration testing.

pub mod config;
pub mod ingest;
pub mod recorder;
pub mod status;

pub use config::DaemonConfig;
pub use ingest::{IngestCounters, IngestOutcome, IngestStats, IngestionLoop};
pub use recorder::SessionRecorder;

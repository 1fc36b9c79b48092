//! NeuroPasso session records
//!
//! Persists patients and per-session summaries in SQLite, and turns a live
//! stream of leg readings into such a summary. The real-time pipeline never
//! depends on this crate; the daemon feeds it as an ordinary viewer.

pub mod accumulator;
pub mod database;
pub mod models;

// Re-export main types
pub use accumulator::SessionAccumulator;
pub use database::RecordsDatabase;
pub use models::{Patient, SessionRecord, SessionSummary};

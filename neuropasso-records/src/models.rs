//! Record types for patients and rehabilitation sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Summary of one finished session, as submitted for storage
///
/// `raw_data_blob` is opaque to the store; the session accumulator fills it
/// with a JSON array of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub patient_id: i64,
    pub duration_seconds: f64,
    pub max_angle_esq: f64,
    pub max_angle_dir: f64,
    pub avg_emg_esq: f64,
    pub avg_emg_dir: f64,
    pub raw_data_blob: String,
}

/// A stored session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub summary: SessionSummary,
}

//! Folding a live stream of readings into a session summary

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use neuropasso_telemetry::{DeviceReading, LEFT_LEG, RIGHT_LEG};
use serde::Serialize;

use crate::models::SessionSummary;

/// One sample kept for the raw-data blob
#[derive(Debug, Clone, Serialize)]
struct Sample {
    /// Seconds since the session started
    t: f64,
    id: String,
    angle: f64,
    emg: i64,
    ecg: i64,
}

/// Collects readings for one session and produces its summary
#[derive(Debug)]
pub struct SessionAccumulator {
    started_at: DateTime<Utc>,
    samples: Vec<Sample>,
}

impl SessionAccumulator {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            samples: Vec::new(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn record(&mut self, reading: &DeviceReading) {
        self.record_values(
            reading.device_id(),
            reading.angle(),
            reading.emg(),
            reading.ecg(),
            reading.received_at(),
        );
    }

    pub fn record_values(&mut self, device_id: &str, angle: f64, emg: i64, ecg: i64, at: DateTime<Utc>) {
        let t = at.signed_duration_since(self.started_at).num_microseconds().unwrap_or(0) as f64
            / 1_000_000.0;
        self.samples.push(Sample {
            t,
            id: device_id.to_string(),
            angle,
            emg,
            ecg,
        });
    }

    /// Close the session at `ended_at` and summarize it for `patient_id`
    ///
    /// A leg with no samples reports zero for its maximum angle and mean EMG.
    pub fn finish(self, patient_id: i64, ended_at: DateTime<Utc>) -> Result<SessionSummary> {
        let duration_seconds = ended_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;

        let raw_data_blob = serde_json::to_string(&self.samples)
            .context("Failed to serialize session samples")?;

        Ok(SessionSummary {
            patient_id,
            duration_seconds,
            max_angle_esq: self.max_angle(LEFT_LEG),
            max_angle_dir: self.max_angle(RIGHT_LEG),
            avg_emg_esq: self.mean_emg(LEFT_LEG),
            avg_emg_dir: self.mean_emg(RIGHT_LEG),
            raw_data_blob,
        })
    }

    fn max_angle(&self, device_id: &str) -> f64 {
        self.samples
            .iter()
            .filter(|s| s.id == device_id)
            .map(|s| s.angle)
            .reduce(f64::max)
            .unwrap_or(0.0)
    }

    fn mean_emg(&self, device_id: &str) -> f64 {
        let emg: Vec<f64> = self
            .samples
            .iter()
            .filter(|s| s.id == device_id)
            .map(|s| s.emg as f64)
            .collect();

        if emg.is_empty() {
            0.0
        } else {
            statistical::mean(emg.as_slice())
        }
    }
}

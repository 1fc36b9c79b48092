use chrono::{DateTime, Utc};
use serde::Serialize;

/// Identifier of the left-leg node.
pub const LEFT_LEG: &str = "ESQ";

/// Identifier of the right-leg node.
pub const RIGHT_LEG: &str = "DIR";

/// Device identifiers accepted when no explicit set is configured.
pub const DEFAULT_DEVICES: [&str; 2] = [LEFT_LEG, RIGHT_LEG];

/// One decoded sample from a leg node.
///
/// `received_at` is stamped on the ingestion side; nothing on the wire is
/// trusted as a clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReading {
    device_id: String,
    angle: f64,
    emg: i64,
    ecg: i64,
    received_at: DateTime<Utc>,
}

impl DeviceReading {
    pub fn new(
        device_id: impl Into<String>,
        angle: f64,
        emg: i64,
        ecg: i64,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            angle,
            emg,
            ecg,
            received_at,
        }
    }

    /// Placeholder reading held for a device before its first packet.
    pub fn zero(device_id: impl Into<String>) -> Self {
        Self::new(device_id, 0.0, 0, 0, DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Joint angle in degrees.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Raw EMG ADC value.
    pub fn emg(&self) -> i64 {
        self.emg
    }

    /// Raw ECG ADC value.
    pub fn ecg(&self) -> i64 {
        self.ecg
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

/// Seconds since the Unix epoch with sub-second precision.
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Inverse of [`epoch_seconds`], rounded to the microsecond.
///
/// Values outside chrono's range fall back to the epoch.
pub fn from_epoch_seconds(seconds: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

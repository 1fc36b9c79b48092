use chrono::{DateTime, Utc};
use neuropasso_telemetry::{epoch_seconds, DeviceReading};
use serde::{Deserialize, Serialize};

/// Messages pushed to viewers
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum PushMessage {
    /// Fresh reading from one leg node
    #[serde(rename = "data")]
    Data {
        id: String,
        timestamp: f64,
        values: ReadingValues,
    },
}

/// Reading payload carried by [`PushMessage::Data`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReadingValues {
    pub angle: f64,
    pub emg: i64,
    pub ecg: i64,
    pub last_seen: f64,
}

impl PushMessage {
    /// Build a data message for `reading`, observed at `observed_at`.
    pub fn data(reading: &DeviceReading, last_seen: DateTime<Utc>, observed_at: DateTime<Utc>) -> Self {
        PushMessage::Data {
            id: reading.device_id().to_string(),
            timestamp: epoch_seconds(observed_at),
            values: ReadingValues {
                angle: reading.angle(),
                emg: reading.emg(),
                ecg: reading.ecg(),
                last_seen: epoch_seconds(last_seen),
            },
        }
    }

    /// Convert message to JSON string with newline
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

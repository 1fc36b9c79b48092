use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::DeviceStateStore;

/// Default silence after which a node is reported as disconnected.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(1);

/// Link status of a node as judged from its last receive time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Connected,
    Disconnected,
}

impl DeviceStatus {
    /// A node is connected while less than `stale_after` has passed since it
    /// was last seen. A `last_seen` in the future counts as connected.
    pub fn from_last_seen(last_seen: DateTime<Utc>, now: DateTime<Utc>, stale_after: Duration) -> Self {
        match now.signed_duration_since(last_seen).to_std() {
            Ok(elapsed) if elapsed >= stale_after => DeviceStatus::Disconnected,
            _ => DeviceStatus::Connected,
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Connected => write!(f, "connected"),
            DeviceStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

impl DeviceStateStore {
    /// Status of every known device at `now`.
    pub fn statuses(&self, now: DateTime<Utc>, stale_after: Duration) -> BTreeMap<String, DeviceStatus> {
        self.snapshot_all()
            .into_iter()
            .map(|(id, reading)| {
                let status = DeviceStatus::from_last_seen(reading.received_at(), now, stale_after);
                (id, status)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::DeviceReading;

    #[test]
    fn test_threshold_boundary() {
        let seen = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let just_before = seen + chrono::Duration::milliseconds(999);
        let at_threshold = seen + chrono::Duration::milliseconds(1000);

        assert_eq!(
            DeviceStatus::from_last_seen(seen, just_before, DEFAULT_STALE_AFTER),
            DeviceStatus::Connected
        );
        assert_eq!(
            DeviceStatus::from_last_seen(seen, at_threshold, DEFAULT_STALE_AFTER),
            DeviceStatus::Disconnected
        );
    }

    #[test]
    fn test_future_last_seen_is_connected() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let seen = now + chrono::Duration::seconds(5);
        assert_eq!(
            DeviceStatus::from_last_seen(seen, now, DEFAULT_STALE_AFTER),
            DeviceStatus::Connected
        );
    }

    #[test]
    fn test_store_statuses() {
        let store = DeviceStateStore::with_default_devices();
        let now = Utc::now();
        store.update(DeviceReading::new("ESQ", 1.0, 1, 1, now));

        let statuses = store.statuses(now, DEFAULT_STALE_AFTER);
        assert_eq!(statuses["ESQ"], DeviceStatus::Connected);
        // never heard from, still at the epoch
        assert_eq!(statuses["DIR"], DeviceStatus::Disconnected);
        assert_eq!(statuses["DIR"].to_string(), "disconnected");
    }
}

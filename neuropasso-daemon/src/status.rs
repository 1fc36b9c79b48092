//! Periodic device and viewer status reporting

use chrono::Utc;
use neuropasso_broadcaster::ConnectionRegistry;
use neuropasso_telemetry::{DeviceStateStore, DeviceStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::ingest::{IngestCounters, IngestStats};

/// One-line summary of node links, viewers and ingestion totals
pub fn status_line(statuses: &BTreeMap<String, DeviceStatus>, viewers: usize, stats: &IngestStats) -> String {
    let devices: Vec<String> = statuses
        .iter()
        .map(|(id, status)| format!("{}={}", id, status))
        .collect();

    format!(
        "{} | viewers={} | received={} published={} unknown={} rejected={}",
        devices.join(" "),
        viewers,
        stats.received,
        stats.published,
        stats.unknown,
        stats.rejected
    )
}

/// Devices whose status differs between `before` and `after`
pub fn status_changes<'a>(
    before: &BTreeMap<String, DeviceStatus>,
    after: &'a BTreeMap<String, DeviceStatus>,
) -> Vec<(&'a str, DeviceStatus)> {
    after
        .iter()
        .filter(|(id, status)| before.get(*id) != Some(*status))
        .map(|(id, status)| (id.as_str(), *status))
        .collect()
}

/// Registered connections that are remote viewers
///
/// `internal` counts in-process subscribers such as the session recorder.
pub async fn viewer_count(registry: &ConnectionRegistry, internal: usize) -> usize {
    registry.len().await.saturating_sub(internal)
}

/// Log link changes as they are noticed and a status line every `every`
pub fn spawn_status_monitor(
    store: Arc<DeviceStateStore>,
    registry: ConnectionRegistry,
    internal_subscribers: usize,
    counters: Arc<IngestCounters>,
    every: Duration,
    stale_after: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        let mut previous = store.statuses(Utc::now(), stale_after);

        loop {
            ticker.tick().await;

            let current = store.statuses(Utc::now(), stale_after);
            for (id, status) in status_changes(&previous, &current) {
                match status {
                    DeviceStatus::Connected => info!("🟢 {} connected", id),
                    DeviceStatus::Disconnected => info!("🔴 {} disconnected", id),
                }
            }

            let viewers = viewer_count(&registry, internal_subscribers).await;
            info!("📊 {}", status_line(&current, viewers, &counters.snapshot()));
            previous = current;
        }
    })
}

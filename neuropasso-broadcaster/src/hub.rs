use std::sync::Arc;

use chrono::{DateTime, Utc};
use neuropasso_telemetry::DeviceReading;

use crate::connection::{ConnectionRegistry, SendOutcome};
use crate::events::PushMessage;

/// Per-publish delivery counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
    pub pruned: usize,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.dropped + self.pruned
    }
}

/// Fans device readings out to every registered viewer
///
/// Delivery failures never reach the caller. A viewer whose queue is full
/// misses that message; a viewer that has gone away is unregistered once
/// the pass is over.
#[derive(Clone)]
pub struct BroadcastHub {
    registry: ConnectionRegistry,
}

impl BroadcastHub {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Build one data message for `reading` and offer it to every viewer.
    pub async fn publish(&self, reading: &DeviceReading, last_seen: DateTime<Utc>) -> DeliveryReport {
        let message = PushMessage::data(reading, last_seen, Utc::now());
        let line: Arc<str> = match message.to_json_line() {
            Ok(line) => Arc::from(line),
            Err(e) => {
                tracing::error!("Failed to encode update for {}: {}", reading.device_id(), e);
                return DeliveryReport::default();
            }
        };

        self.send_line(line).await
    }

    async fn send_line(&self, line: Arc<str>) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut dead = Vec::new();

        self.registry
            .for_each(|conn| match conn.try_send(Arc::clone(&line)) {
                SendOutcome::Delivered => report.delivered += 1,
                SendOutcome::Dropped => {
                    tracing::debug!("Viewer {} is lagging, update skipped", conn.id());
                    report.dropped += 1;
                }
                SendOutcome::Closed => {
                    tracing::warn!("Failed to send to viewer {}: connection closed", conn.id());
                    dead.push(conn.clone());
                }
            })
            .await;

        for conn in &dead {
            if self.registry.unregister(conn).await {
                report.pruned += 1;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;

    fn reading(id: &str, angle: f64) -> DeviceReading {
        DeviceReading::new(id, angle, 1, 2, Utc::now())
    }

    #[tokio::test]
    async fn test_publish_skips_failing_connection() {
        let registry = ConnectionRegistry::new();
        let (first, mut rx1) = Connection::channel(8);
        let (second, rx2) = Connection::channel(8);
        let (third, mut rx3) = Connection::channel(8);
        registry.register(first).await;
        registry.register(second.clone()).await;
        registry.register(third).await;
        drop(rx2);

        let hub = BroadcastHub::new(registry.clone());
        let esq = reading("ESQ", 10.0);
        let report = hub.publish(&esq, esq.received_at()).await;

        assert_eq!(report, DeliveryReport { delivered: 2, dropped: 0, pruned: 1 });
        assert!(rx1.try_recv().unwrap().contains("\"id\":\"ESQ\""));
        assert!(rx3.try_recv().unwrap().contains("\"id\":\"ESQ\""));

        let remaining: Vec<_> = registry.snapshot().await.iter().map(Connection::id).collect();
        assert!(!remaining.contains(&second.id()));
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_lagging_viewer_is_kept() {
        let registry = ConnectionRegistry::new();
        let (slow, mut slow_rx) = Connection::channel(1);
        let (fast, mut fast_rx) = Connection::channel(8);
        registry.register(slow).await;
        registry.register(fast).await;
        let hub = BroadcastHub::new(registry.clone());

        let first = reading("DIR", 1.0);
        let second = reading("DIR", 2.0);
        hub.publish(&first, first.received_at()).await;
        let report = hub.publish(&second, second.received_at()).await;

        assert_eq!(report, DeliveryReport { delivered: 1, dropped: 1, pruned: 0 });
        assert_eq!(registry.len().await, 2);
        assert!(slow_rx.try_recv().unwrap().contains("\"angle\":1.0"));
        assert!(slow_rx.try_recv().is_err());
        assert!(fast_rx.try_recv().unwrap().contains("\"angle\":1.0"));
        assert!(fast_rx.try_recv().unwrap().contains("\"angle\":2.0"));
    }

    #[tokio::test]
    async fn test_publish_without_viewers() {
        let hub = BroadcastHub::new(ConnectionRegistry::new());
        let esq = reading("ESQ", 3.0);
        let report = hub.publish(&esq, esq.received_at()).await;
        assert_eq!(report.attempted(), 0);
    }
}

//! Live session recording
//!
//! The recorder subscribes to the broadcast like any other viewer, so it can
//! never slow ingestion down. When the session ends its samples are
//! summarized and stored for the patient.

use anyhow::{Context, Result};
use chrono::Utc;
use neuropasso_broadcaster::{Connection, ConnectionId, ConnectionRegistry, PushMessage};
use neuropasso_records::{RecordsDatabase, SessionAccumulator};
use neuropasso_telemetry::from_epoch_seconds;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Queue depth for the recorder's subscription
pub const RECORDER_QUEUE_CAPACITY: usize = 4096;

pub struct SessionRecorder {
    id: ConnectionId,
    registry: ConnectionRegistry,
    task: JoinHandle<SessionAccumulator>,
}

impl SessionRecorder {
    /// Subscribe to `registry` and start collecting samples
    pub async fn start(registry: ConnectionRegistry) -> Self {
        let (conn, mut rx) = Connection::channel(RECORDER_QUEUE_CAPACITY);
        let id = conn.id();
        registry.register(conn).await;

        let task = tokio::spawn(async move {
            let mut session = SessionAccumulator::new(Utc::now());
            while let Some(line) = rx.recv().await {
                match serde_json::from_str::<PushMessage>(line.trim_end()) {
                    Ok(PushMessage::Data { id, values, .. }) => session.record_values(
                        &id,
                        values.angle,
                        values.emg,
                        values.ecg,
                        from_epoch_seconds(values.last_seen),
                    ),
                    Err(e) => warn!("Recorder skipped unreadable update: {}", e),
                }
            }
            session
        });

        info!("⏺️ Session recording started");
        Self { id, registry, task }
    }

    /// Unsubscribe and hand back everything collected so far
    pub async fn stop(self) -> Result<SessionAccumulator> {
        self.registry.unregister_id(self.id).await;
        self.task.await.context("Session recorder task failed")
    }

    /// Stop recording and store the session for `patient_id`
    pub async fn finish(self, patient_id: i64, db: &RecordsDatabase) -> Result<i64> {
        let session = self.stop().await?;
        let samples = session.sample_count();
        let summary = session.finish(patient_id, Utc::now())?;
        let session_id = db.insert_session(&summary)?;
        info!("💾 Stored session {} ({} samples)", session_id, samples);
        Ok(session_id)
    }
}

//! SQLite storage for patients and session summaries

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use neuropasso_telemetry::{epoch_seconds, from_epoch_seconds};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::{Patient, SessionRecord, SessionSummary};

/// Thread-safe SQLite database for session records
pub struct RecordsDatabase {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl RecordsDatabase {
    /// Open (or create) the database at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = Self::expand_path(db_path)?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let conn = Connection::open(&db_path)
            .context("Failed to open records database")?;

        let db = Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;
        tracing::debug!("Records database ready at {}", db.db_path.display());

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Expand a leading `~` to the home directory
    fn expand_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
        let path_str = path.as_ref().to_str()
            .context("Invalid path encoding")?;

        let expanded = match (path_str.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(path_str),
        };

        Ok(expanded)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("Records database lock poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS patients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                patient_id INTEGER NOT NULL,
                timestamp REAL NOT NULL,
                duration_seconds REAL,
                max_angle_esq REAL,
                max_angle_dir REAL,
                avg_emg_esq REAL,
                avg_emg_dir REAL,
                raw_data_blob TEXT,
                FOREIGN KEY (patient_id) REFERENCES patients(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_patient_id ON sessions(patient_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_timestamp ON sessions(timestamp);",
        )
        .context("Failed to initialize records schema")?;

        Ok(())
    }

    /// Register a patient. Names must be non-empty and unique.
    pub fn create_patient(&self, name: &str) -> Result<Patient> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Patient name must not be empty");
        }

        let conn = self.conn()?;

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM patients WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        if exists {
            bail!("Patient {:?} already exists", name);
        }

        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO patients (name, created_at) VALUES (?1, ?2)",
            params![name, epoch_seconds(created_at)],
        )?;

        let patient = Patient {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            created_at,
        };
        tracing::info!("Created patient {} ({})", patient.id, patient.name);
        Ok(patient)
    }

    /// Page through patients in creation order
    pub fn list_patients(&self, skip: usize, limit: usize) -> Result<Vec<Patient>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, name, created_at FROM patients ORDER BY id LIMIT ?1 OFFSET ?2",
        )?;
        let patients = stmt
            .query_map(params![limit as i64, skip as i64], Self::row_to_patient)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(patients)
    }

    pub fn get_patient(&self, patient_id: i64) -> Result<Option<Patient>> {
        let conn = self.conn()?;

        let patient = conn
            .query_row(
                "SELECT id, name, created_at FROM patients WHERE id = ?1",
                params![patient_id],
                Self::row_to_patient,
            )
            .optional()?;

        Ok(patient)
    }

    /// Store a finished session, returning its id
    pub fn insert_session(&self, summary: &SessionSummary) -> Result<i64> {
        if self.get_patient(summary.patient_id)?.is_none() {
            bail!("Unknown patient {}", summary.patient_id);
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (
                patient_id, timestamp, duration_seconds,
                max_angle_esq, max_angle_dir, avg_emg_esq, avg_emg_dir, raw_data_blob
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                summary.patient_id,
                epoch_seconds(Utc::now()),
                summary.duration_seconds,
                summary.max_angle_esq,
                summary.max_angle_dir,
                summary.avg_emg_esq,
                summary.avg_emg_dir,
                summary.raw_data_blob,
            ],
        )?;

        let id = conn.last_insert_rowid();
        tracing::info!(
            "Stored session {} for patient {} ({:.1}s)",
            id,
            summary.patient_id,
            summary.duration_seconds
        );
        Ok(id)
    }

    /// All sessions of one patient, oldest first
    pub fn patient_history(&self, patient_id: i64) -> Result<Vec<SessionRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT * FROM sessions WHERE patient_id = ?1 ORDER BY timestamp, id",
        )?;
        let sessions = stmt
            .query_map(params![patient_id], Self::row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(sessions)
    }

    fn row_to_patient(row: &Row) -> rusqlite::Result<Patient> {
        Ok(Patient {
            id: row.get("id")?,
            name: row.get("name")?,
            created_at: from_epoch_seconds(row.get("created_at")?),
        })
    }

    fn row_to_session(row: &Row) -> rusqlite::Result<SessionRecord> {
        Ok(SessionRecord {
            id: row.get("id")?,
            timestamp: from_epoch_seconds(row.get("timestamp")?),
            summary: SessionSummary {
                patient_id: row.get("patient_id")?,
                duration_seconds: row.get::<_, Option<f64>>("duration_seconds")?.unwrap_or(0.0),
                max_angle_esq: row.get::<_, Option<f64>>("max_angle_esq")?.unwrap_or(0.0),
                max_angle_dir: row.get::<_, Option<f64>>("max_angle_dir")?.unwrap_or(0.0),
                avg_emg_esq: row.get::<_, Option<f64>>("avg_emg_esq")?.unwrap_or(0.0),
                avg_emg_dir: row.get::<_, Option<f64>>("avg_emg_dir")?.unwrap_or(0.0),
                raw_data_blob: row.get::<_, Option<String>>("raw_data_blob")?.unwrap_or_default(),
            },
        })
    }
}

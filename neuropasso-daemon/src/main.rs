//! NeuroPasso Daemon - real-time gait telemetry relay
//!
//! Receives UDP readings from the left and right leg nodes, keeps the latest
//! reading per node and pushes every accepted reading to connected viewers
//! as newline-delimited JSON. Patients and session summaries live in a
//! local SQLite database.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use neuropasso_broadcaster::{BroadcastHub, ConnectionRegistry, ViewerServer};
use neuropasso_daemon::status::spawn_status_monitor;
use neuropasso_daemon::{DaemonConfig, IngestionLoop, SessionRecorder};
use neuropasso_records::RecordsDatabase;
use neuropasso_telemetry::DeviceStateStore;

#[derive(Parser, Debug)]
#[command(name = "neuropasso-daemon", version, about = "NeuroPasso telemetry relay")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    serve: ServeArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Relay leg telemetry to viewers (default)
    Serve,

    /// Manage patients
    #[command(subcommand)]
    Patient(PatientCommand),

    /// Show stored sessions for a patient
    History { patient_id: i64 },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Override the UDP bind address
    #[arg(long, global = true)]
    udp_bind: Option<String>,

    /// Override the viewer bind address
    #[arg(long, global = true)]
    viewer_bind: Option<String>,

    /// Record this session for the given patient
    #[arg(long, global = true)]
    patient: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum PatientCommand {
    /// Register a new patient
    Add { name: String },

    /// List registered patients
    List {
        #[arg(long, default_value_t = 0)]
        skip: usize,

        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load_from(path),
        None => DaemonConfig::load(),
    }
    .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let args = cli.serve;
            if let Some(addr) = args.udp_bind {
                config.udp_bind = addr;
            }
            if let Some(addr) = args.viewer_bind {
                config.viewer_bind = addr;
            }
            serve(config, args.patient).await
        }
        Command::Patient(PatientCommand::Add { name }) => {
            let db = open_database(&config)?;
            let patient = db.create_patient(&name)?;
            println!("{}", serde_json::to_string_pretty(&patient)?);
            Ok(())
        }
        Command::Patient(PatientCommand::List { skip, limit }) => {
            let db = open_database(&config)?;
            let patients = db.list_patients(skip, limit)?;
            println!("{}", serde_json::to_string_pretty(&patients)?);
            Ok(())
        }
        Command::History { patient_id } => {
            let db = open_database(&config)?;
            if db.get_patient(patient_id)?.is_none() {
                bail!("Patient {} not found", patient_id);
            }
            let sessions = db.patient_history(patient_id)?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
            Ok(())
        }
    }
}

fn open_database(config: &DaemonConfig) -> Result<RecordsDatabase> {
    let path = config.database_path()?;
    RecordsDatabase::new(&path)
        .with_context(|| format!("Failed to open records database at {}", path.display()))
}

async fn serve(config: DaemonConfig, patient: Option<i64>) -> Result<()> {
    info!("🦵 Starting NeuroPasso daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("📋 Configuration loaded from {}", config.config_path.display());

    let store = Arc::new(DeviceStateStore::new(config.known_devices.iter().cloned()));
    info!("  - Devices: {}", store.known_devices().join(", "));

    let registry = ConnectionRegistry::new();
    let hub = BroadcastHub::new(registry.clone());

    let viewers = ViewerServer::new(&config.viewer_bind, registry.clone(), config.viewer_options());
    let viewer_addr = viewers
        .start()
        .await
        .context("Failed to start viewer server")?;
    info!("🔌 Viewers connect on TCP {}", viewer_addr);

    // Only record once the patient is known to exist
    let recording = match patient {
        Some(patient_id) => {
            let db = open_database(&config)?;
            let Some(found) = db.get_patient(patient_id)? else {
                bail!("Patient {} not found", patient_id);
            };
            info!("🧑 Recording session for {} (#{})", found.name, found.id);
            let recorder = SessionRecorder::start(registry.clone()).await;
            Some((recorder, db, patient_id))
        }
        None => None,
    };

    let ingest = IngestionLoop::bind(&config.udp_bind, Arc::clone(&store), hub)
        .await?
        .with_backoff(config.receive_backoff());

    let internal_subscribers = usize::from(recording.is_some());
    let status = config.status_interval().map(|every| {
        spawn_status_monitor(
            Arc::clone(&store),
            registry.clone(),
            internal_subscribers,
            ingest.counters(),
            every,
            config.stale_after(),
        )
    });

    info!("🚀 NeuroPasso daemon ready!");

    tokio::select! {
        _ = ingest.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Received shutdown signal");
        }
    }

    // Cleanup
    info!("🧹 Shutting down...");
    if let Some(handle) = status {
        handle.abort();
    }

    if let Some((recorder, db, patient_id)) = recording {
        if let Err(e) = recorder.finish(patient_id, &db).await {
            error!("Failed to store session: {:#}", e);
        }
    }

    if let Err(e) = viewers.stop().await {
        warn!("Viewer server did not stop cleanly: {}", e);
    }

    let stats = ingest.counters().snapshot();
    info!(
        "📊 Received {} datagrams, published {}, ignored {} unknown, rejected {}",
        stats.received, stats.published, stats.unknown, stats.rejected
    );
    info!("👋 NeuroPasso daemon stopped");

    Ok(())
}

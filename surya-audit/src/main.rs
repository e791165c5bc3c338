//! surya-audit - Rooftop solar verification
//!
//! **Subcommands:**
//! - `run`: batch audit over the images (or, with `--fetch`, the coordinate table)
//! - `audit`: audit a single site
//! - `serve`: HTTP API for auditor and citizen actions
//! - `show` / `report`: inspect one verified record
//! - `verify`: integrity scan of every stored record

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use surya_common::config::{self, RootLayout, TomlConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use surya_audit::config::resolve_maps_api_key;
use surya_audit::services::{
    write_report, AuditLifecycle, CoordinateTable, ImageSource, LocalImageSource,
    OverlayRenderer, RecordStore, SidecarDetector, StaticMapsSource, TextReport,
};
use surya_audit::workflow::{
    plan_jobs, BatchRunner, SiteJob, SiteOutcome, SitePipeline, DEFAULT_CONCURRENCY,
};
use surya_audit::AppState;

/// Command-line arguments for surya-audit
#[derive(Parser, Debug)]
#[command(name = "surya-audit")]
#[command(about = "Rooftop solar verification audit")]
#[command(version)]
struct Args {
    /// Config file (default: $SURYA_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root folder (default: $SURYA_ROOT_FOLDER, then TOML, then the OS data dir)
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Audit every site and write its record
    Run {
        /// Fetch imagery from the maps provider instead of reading images/
        #[arg(long)]
        fetch: bool,

        /// Skip report and overlay regeneration
        #[arg(long)]
        no_reports: bool,

        /// Sites processed concurrently
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
    },
    /// Audit one site and print its record
    Audit {
        sample_id: String,

        /// Latitude (default: stored record, then the coordinate table)
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        #[arg(long)]
        fetch: bool,
    },
    /// Serve the HTTP API
    Serve {
        /// Listen address (overrides [server] bind)
        #[arg(long, env = "SURYA_BIND")]
        bind: Option<String>,

        /// Single-site audits fetch from the maps provider
        #[arg(long)]
        fetch: bool,
    },
    /// Print a verified record as JSON
    Show { sample_id: String },
    /// Regenerate the audit report for a record
    Report { sample_id: String },
    /// Check the integrity hash of every record
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (toml_config, config_path) =
        TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml_config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("SURYA_COMMIT"),
        profile = env!("SURYA_PROFILE"),
        "Starting surya-audit"
    );
    match &config_path {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => warn!("No config file found, using defaults"),
    }

    let root = config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let layout = RootLayout::new(root);
    layout
        .ensure_directories()
        .context("Failed to initialize root folder")?;
    info!(root = %layout.root.display(), "Root folder");

    let store = Arc::new(RecordStore::open(layout.records_dir()).context("Failed to open record store")?);

    match args.command {
        Command::Run {
            fetch,
            no_reports,
            concurrency,
        } => run_batch(&toml_config, &layout, store, fetch, !no_reports, concurrency).await,
        Command::Audit {
            sample_id,
            lat,
            lon,
            fetch,
        } => audit_one(&toml_config, &layout, store, sample_id, lat.zip(lon), fetch).await,
        Command::Serve { bind, fetch } => {
            let bind = bind.unwrap_or_else(|| toml_config.server.bind.clone());
            let runner = build_runner(&toml_config, &layout, Arc::clone(&store), fetch, true)?;
            serve(&layout, store, runner, &bind).await
        }
        Command::Show { sample_id } => {
            let record = store.load(&sample_id)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Command::Report { sample_id } => {
            let record = store.load(&sample_id)?;
            let path = write_report(&TextReport, &record, &layout.reports_dir())?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Verify => verify(&store),
    }
}

fn load_table(layout: &RootLayout) -> Result<CoordinateTable> {
    let csv_path = layout.coordinates_csv();
    let table = if csv_path.exists() {
        CoordinateTable::from_path(&csv_path)
            .with_context(|| format!("Failed to read {}", csv_path.display()))?
    } else {
        warn!(path = %csv_path.display(), "Coordinate table not found");
        CoordinateTable::default()
    };
    info!(sites = table.len(), "Coordinate table loaded");
    Ok(table)
}

fn image_source(toml_config: &TomlConfig, layout: &RootLayout, fetch: bool) -> Result<Arc<dyn ImageSource>> {
    if !fetch {
        return Ok(Arc::new(LocalImageSource::new(layout.images_dir())));
    }
    let api_key = resolve_maps_api_key(toml_config).ok_or_else(|| {
        anyhow!(
            "Maps API key not configured. Set {} or [imagery] maps_api_key",
            surya_audit::config::MAPS_API_KEY_ENV
        )
    })?;
    Ok(Arc::new(StaticMapsSource::new(
        &toml_config.imagery,
        Some(api_key),
        layout.images_dir(),
    )?))
}

fn build_runner(
    toml_config: &TomlConfig,
    layout: &RootLayout,
    store: Arc<RecordStore>,
    fetch: bool,
    artifacts: bool,
) -> Result<BatchRunner> {
    let detector = Arc::new(SidecarDetector::new(layout.detections_dir()));
    let mut runner = BatchRunner::new(
        store,
        image_source(toml_config, layout, fetch)?,
        detector,
        SitePipeline::new(&toml_config.thresholds),
        toml_config.imagery.clone(),
    );
    if artifacts {
        runner = runner
            .with_reports(Arc::new(TextReport), layout.reports_dir())
            .with_overlays(
                OverlayRenderer::from_thresholds(&toml_config.thresholds),
                layout.audits_dir(),
            );
    }
    Ok(runner)
}

async fn run_batch(
    toml_config: &TomlConfig,
    layout: &RootLayout,
    store: Arc<RecordStore>,
    fetch: bool,
    artifacts: bool,
    concurrency: usize,
) -> Result<()> {
    let table = load_table(layout)?;
    let sample_ids: Vec<String> = if fetch {
        table.sample_ids().map(str::to_string).collect()
    } else {
        LocalImageSource::new(layout.images_dir()).list_sample_ids()?
    };

    let (jobs, plan_errors) = plan_jobs(sample_ids, &table, &toml_config.intake, &store);
    let runner = build_runner(toml_config, layout, store, fetch, artifacts)?
        .with_concurrency(concurrency);

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("Received Ctrl+C, cancelling batch after sites in flight");
                cancel.cancel();
            }
        })
    };

    let mut run = runner.run(jobs, cancel).await;
    watcher.abort();

    for e in plan_errors {
        run.add_error(e);
    }
    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}

async fn audit_one(
    toml_config: &TomlConfig,
    layout: &RootLayout,
    store: Arc<RecordStore>,
    sample_id: String,
    coordinates: Option<(f64, f64)>,
    fetch: bool,
) -> Result<()> {
    let job = match coordinates {
        Some((lat, lon)) => SiteJob {
            sample_id,
            lat,
            lon,
            fallback: false,
        },
        None => {
            let table = load_table(layout)?;
            let (jobs, errors) = plan_jobs([sample_id], &table, &toml_config.intake, &store);
            if let Some(e) = errors.into_iter().next() {
                return Err(anyhow!("{}: {}", e.error_code, e.error_message));
            }
            jobs.into_iter()
                .next()
                .ok_or_else(|| anyhow!("No site planned"))?
        }
    };

    let runner = build_runner(toml_config, layout, store, fetch, true)?;
    let outcome = runner
        .audit_site(job)
        .await
        .map_err(|e| anyhow!("{} {}: {}", e.sample_id, e.error_code, e.error_message))?;

    for w in outcome.warnings() {
        warn!(sample_id = %w.sample_id, code = %w.error_code, "{}", w.error_message);
    }
    if let SiteOutcome::Held { record, .. } = &outcome {
        println!("{} is {}; record left unchanged", record.sample_id, record.qc_status);
    }
    println!("{}", serde_json::to_string_pretty(outcome.record())?);
    Ok(())
}

async fn serve(layout: &RootLayout, store: Arc<RecordStore>, runner: BatchRunner, bind: &str) -> Result<()> {
    let lifecycle = AuditLifecycle::new(Arc::clone(&store), layout.citizen_uploads_dir());
    let state = AppState::new(store, lifecycle).with_auditor(Arc::new(runner));
    let app = surya_audit::build_router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn verify(store: &RecordStore) -> Result<()> {
    let (records, failures) = store.list_with_failures()?;
    for (sample_id, e) in &failures {
        error!(sample_id = %sample_id, error = %e, "Record failed verification");
        println!("FAIL {}: {}", sample_id, e);
    }
    println!("{} verified, {} failed", records.len(), failures.len());

    if failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{} record(s) failed verification", failures.len()))
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

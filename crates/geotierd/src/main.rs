//! geotierd — the geotier daemon.
//!
//! Single binary that assembles the geotier subsystems:
//! - Association store (redb)
//! - Cluster collaborators (`ceph` / `rados` CLI)
//! - Static geocoder
//! - Tier control loop
//! - REST API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! geotierd run --config /etc/geotier/geotier.toml --data-dir /var/lib/geotier --port 8480
//! geotierd tick --config /etc/geotier/geotier.toml --data-dir /var/lib/geotier
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use geotier_api::{AdminService, ApiState};
use geotier_cluster::{CephCli, StaticGeocoder};
use geotier_core::GeotierConfig;
use geotier_state::AssociationStore;
use geotier_tier::controller::epoch_secs;
use geotier_tier::{ControlLoopContext, DrainCoordinator, ProvisioningGateway, TierController};
use geotier_trigger::SampledTraffic;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(name = "geotierd", about = "Geography-driven cache tier daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop and serve the API until Ctrl-C.
    Run {
        /// Configuration file (defaults apply when omitted).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/geotier")]
        data_dir: PathBuf,

        /// Port to listen on.
        #[arg(long, default_value = "8480")]
        port: u16,

        /// Override `control.interval_secs`.
        #[arg(long)]
        interval: Option<u64>,

        /// Override `control.cooldown_secs` (0 disables teardown).
        #[arg(long)]
        cooldown: Option<u64>,
    },

    /// Run exactly one control-loop tick and print its report.
    Tick {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "/var/lib/geotier")]
        data_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Command::Run {
            config,
            data_dir,
            port,
            interval,
            cooldown,
        } => {
            let mut config = GeotierConfig::load(config.as_deref())?;
            apply_overrides(&mut config, interval, cooldown)?;
            let result = runtime.block_on(run_daemon(config, data_dir, port));
            // Cancelled drain workers may still sit in a blocking flush.
            runtime.shutdown_background();
            result
        }
        Command::Tick { config, data_dir } => {
            let config = GeotierConfig::load(config.as_deref())?;
            runtime.block_on(run_single_tick(config, data_dir))
        }
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,geotierd=debug,geotier=debug"))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

fn apply_overrides(
    config: &mut GeotierConfig,
    interval: Option<u64>,
    cooldown: Option<u64>,
) -> anyhow::Result<()> {
    if let Some(secs) = interval {
        if secs == 0 {
            anyhow::bail!("--interval must be greater than zero");
        }
        config.control.interval_secs = secs;
    }
    if let Some(secs) = cooldown {
        config.control.cooldown_secs = secs;
    }
    Ok(())
}

/// Everything built from the configuration and the data directory.
struct Daemon {
    store: AssociationStore,
    controller: TierController,
    ctx: ControlLoopContext,
    admin: AdminService,
    traffic: SampledTraffic,
}

fn assemble(config: &GeotierConfig, data_dir: &Path) -> anyhow::Result<Daemon> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("geotier.redb");

    // Association store.
    let store = AssociationStore::open(&db_path)?;
    info!(path = ?db_path, "association store opened");

    // Cluster collaborators.
    let ceph = Arc::new(CephCli::new(&config.cluster));
    let geocoder = Arc::new(StaticGeocoder::new(config.geocoder.places.clone()));
    info!(
        ceph = %config.cluster.ceph_bin,
        rados = %config.cluster.rados_bin,
        places = config.geocoder.places.len(),
        "cluster collaborators initialized"
    );

    // Traffic samples shared between the API and the control loop.
    let traffic = SampledTraffic::new(
        config.trigger.traffic_threshold_bytes,
        config.trigger.traffic_threshold_ratio,
    );

    // Tier controller.
    let gateway = ProvisioningGateway::new(ceph.clone(), ceph.clone(), config.tier.clone());
    let controller = TierController::new(store.clone(), gateway, config)
        .with_traffic(Arc::new(traffic.clone()));
    let ctx = ControlLoopContext::new(DrainCoordinator::new(
        Handle::current(),
        ceph.clone(),
        ceph.clone(),
    ));

    let admin = AdminService::new(
        store.clone(),
        ceph,
        geocoder,
        config.trigger.default_proximity_miles,
    );

    Ok(Daemon {
        store,
        controller,
        ctx,
        admin,
        traffic,
    })
}

/// Load every collection once so a corrupt or outdated store stops startup.
/// Returns the number of tier records.
fn verify_store(store: &AssociationStore) -> anyhow::Result<usize> {
    let snapshot = store.snapshot()?;
    Ok(snapshot.tiers.len())
}

async fn run_daemon(config: GeotierConfig, data_dir: PathBuf, port: u16) -> anyhow::Result<()> {
    info!("geotier daemon starting");

    let Daemon {
        store,
        controller,
        ctx,
        admin,
        traffic,
    } = assemble(&config, &data_dir)?;
    let records = verify_store(&store)?;
    info!(records, "association store verified");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start control loop ─────────────────────────────────────

    let interval = Duration::from_secs(config.control.interval_secs);
    let control_handle = tokio::spawn(async move {
        controller.run(ctx, interval, shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = geotier_api::build_router(ApiState {
        admin: Arc::new(admin),
        traffic,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // The loop cancels drain workers on its way out; they are not awaited.
    let _ = control_handle.await;

    info!("geotier daemon stopped");
    Ok(())
}

async fn run_single_tick(config: GeotierConfig, data_dir: PathBuf) -> anyhow::Result<()> {
    let Daemon {
        controller,
        mut ctx,
        ..
    } = assemble(&config, &data_dir)?;

    let now = epoch_secs();
    let report = tokio::task::block_in_place(|| controller.tick(&mut ctx, now))?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    // Dropping the runtime waits for drain workers started by this tick.
    Ok(())
}

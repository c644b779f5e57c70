use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use clawwatch::render_status;
use clawwatch_core::config::{default_config_path, WatchdogConfig};
use clawwatch_core::controller::RecoveryController;
use clawwatch_core::recovery::RecoveryPolicy;
use clawwatch_core::snapshot::SnapshotStore;
use clawwatch_scheduler::{Scheduler, Watchdog};
use clawwatch_system::{CommandProbe, SysinfoSampler};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
#[command(name = "clawwatch")]
#[command(version)]
#[command(about = "Watchdog for a gateway and the agents behind it")]
struct Cli {
    /// Config file (defaults to ~/.clawwatch/config.json when present)
    #[arg(long, short, global = true, env = "CLAWWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the watchdog until interrupted (default)
    Run,
    /// Print the state persisted by the last run
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(cli.config).await,
        Commands::Status => {
            run_status(cli.config);
            Ok(())
        }
    }
}

async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = WatchdogConfig::load(config_path.as_deref())
        .context("Failed to load watchdog config")?;

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log dir {}", config.log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "watchdog.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    // stdout and the rolling file get the same events
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking.and(std::io::stdout))
                .with_filter(filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    // registered before the first cycle so a failure here is fatal
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    info!(
        agents = ?config.agents,
        interval_ms = config.health_check_interval,
        max_failures = config.max_failures,
        cooldown_ms = config.restart_cooldown,
        "Watchdog starting"
    );

    let store = SnapshotStore::new(&config.state_file);
    match store.load() {
        Some(prev) => info!(
            total_checks = prev.total_checks,
            total_restarts = prev.total_restarts,
            agents = prev.agents,
            saved_at = %prev.saved_at,
            "Previous run had {} checks / {} restarts",
            prev.total_checks,
            prev.total_restarts
        ),
        None => info!(path = %store.path().display(), "No prior state"),
    }

    let probe = Arc::new(CommandProbe::from_config(&config));
    let controller = RecoveryController::new(
        probe,
        RecoveryPolicy::from(&config),
        config.agents.clone(),
        Utc::now(),
    );
    let watchdog = Watchdog::new(controller, store).with_sampler(Box::new(SysinfoSampler::new()));
    let scheduler = Scheduler::new(watchdog, config.health_check_interval());

    let shutdown = async move {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = signal::ctrl_c() => info!("Received Ctrl+C"),
                _ = terminate.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = signal::ctrl_c().await;
            info!("Received Ctrl+C");
        }
    };

    scheduler.run(shutdown).await;
    info!("Watchdog stopped");
    Ok(())
}

fn run_status(config_path: Option<PathBuf>) {
    let config = match WatchdogConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let shown = config_path.unwrap_or_else(default_config_path);
            println!("Error loading config {}: {}", shown.display(), e);
            return;
        }
    };

    let store = SnapshotStore::new(&config.state_file);
    println!("clawwatch status\n");
    println!("State file: {}", store.path().display());

    match store.read() {
        Ok(snapshot) => print!("{}", render_status(&snapshot)),
        Err(e) => println!("No state available: {}", e),
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use scrape_scheduler::config::AppConfig;
use scrape_scheduler::runner::HttpRunner;
use scrape_scheduler::scheduler::{self, SchedulerHandle};
use scrape_scheduler::store::{SqliteStore, Store};
use scrape_scheduler::web::{self, AppState};

#[derive(Parser)]
#[command(name = "scrape-scheduler")]
#[command(about = "Durable scheduler for recurring scrape/crawl/map/batch jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and its management HTTP API.
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Port to listen on.
    #[arg(short, long, default_value = "3000", env = "PORT")]
    port: u16,

    /// Host to bind to.
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    host: String,

    /// Path to the SQLite database file.
    #[arg(long, env = "DATABASE_PATH")]
    database_path: Option<PathBuf>,

    /// Path to a YAML config file.
    #[arg(long, env = "CONFIG_FILE")]
    config_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Serve(args) => serve(args).await?,
    }
    Ok(())
}

async fn serve(args: &ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config_file {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            AppConfig::from_file(path)?
        }
        None => AppConfig::default(),
    };

    config.server.host = args.host.clone();
    config.server.port = args.port;
    if let Some(path) = &args.database_path {
        config.database.path = path.clone();
    }

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    info!(path = %config.database.path.display(), "opening store");
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&config.database.path, config.database.busy_timeout_ms).await?,
    );

    let recovered = scheduler::recover_orphaned_runs(store.as_ref()).await?;
    if recovered > 0 {
        info!(count = recovered, "reconciled orphaned runs from a prior process");
    }

    let runner = Arc::new(HttpRunner::new()?);
    let sched = SchedulerHandle::new(
        store.clone(),
        runner,
        config.scheduler.cleanup_cron.clone(),
        config.database.retention_days,
    )
    .await?;
    sched.start().await?;

    let state = AppState {
        store,
        scheduler: sched.clone(),
        shutdown_timeout: config.scheduler.shutdown_timeout,
    };
    let app = web::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(%addr, "starting management HTTP API");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down scheduler");
    sched.stop(config.scheduler.shutdown_timeout).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

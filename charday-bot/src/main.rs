//! charday-bot - anime character birthday poster
//!
//! Daily batch process: prepare the day's posts from the birthday list, then
//! publish them at the configured slot times. `serve` exposes the persisted
//! state read-only over HTTP.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate};
use clap::{Parser, Subcommand};
use charday_bot::bootstrap::{build_components, open_state_store};
use charday_bot::{build_router, AppState, Housekeeper, SlotOutcome};
use charday_common::config::{resolve_root_folder, AppConfig, RootFolder, ROOT_FOLDER_ENV_VAR};
use charday_common::time::{parse_date_key, today_in};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for charday-bot
#[derive(Parser, Debug)]
#[command(name = "charday-bot")]
#[command(about = "Posts anime character birthday greetings at fixed daily slots")]
#[command(version)]
struct Cli {
    /// Config file (overrides CHARDAY_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder for state and downloads
    #[arg(short, long, env = ROOT_FOLDER_ENV_VAR)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve characters and images for a day and persist the slots
    Prepare {
        /// Day to prepare (YYYY-MM-DD, default today in the reference zone)
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },
    /// Publish one slot now (pending or error)
    Publish {
        #[arg(long)]
        slot: u32,
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },
    /// Recover or prepare the day, then publish each slot at its time
    Run {
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },
    /// Print the persisted state of a day as JSON
    Status {
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },
    /// Delete persisted days older than the retention window
    Prune,
    /// Serve the read-only status API
    Serve,
}

fn parse_date_arg(value: &str) -> std::result::Result<NaiveDate, String> {
    parse_date_key(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_source) =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    config_source.log();

    let root = RootFolder::new(resolve_root_folder(cli.root_folder.as_deref(), &config));
    let offset = config.reference_offset()?;
    let today = today_in(offset);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        root_folder = %root.path().display(),
        today = %today,
        "Starting charday-bot"
    );

    match cli.command {
        Command::Prepare { date } => {
            let components = build_components(&config, &root)
                .await
                .context("Failed to initialize components")?;
            let date = date.unwrap_or(today);
            let state = components
                .workflow
                .prepare(date)
                .await
                .with_context(|| format!("Preparation failed for {}", date))?;
            let (pending, posted, failed) = state.status_counts();
            info!(
                date = %date,
                pending,
                posted,
                error = failed,
                skipped = state.skipped.len(),
                "Preparation complete"
            );
        }
        Command::Publish { slot, date } => {
            let components = build_components(&config, &root)
                .await
                .context("Failed to initialize components")?;
            let date = date.unwrap_or(today);
            let outcome = components
                .workflow
                .publish_slot(date, slot)
                .await
                .with_context(|| format!("Publishing slot {} of {} failed", slot, date))?;
            match outcome {
                SlotOutcome::Posted { external_url, .. } => {
                    info!(date = %date, slot, url = %external_url, "Published")
                }
                SlotOutcome::AlreadyPosted => info!(date = %date, slot, "Already posted"),
                SlotOutcome::Failed(reason) => {
                    anyhow::bail!("Slot {} of {} failed: {}", slot, date, reason)
                }
            }
        }
        Command::Run { date } => {
            let components = build_components(&config, &root)
                .await
                .context("Failed to initialize components")?;
            let date = date.unwrap_or(today);

            if let Err(e) = components.housekeeper.prune(today).await {
                warn!(error = %e, "Housekeeping failed, continuing");
            }

            let catch_up = ChronoDuration::minutes(i64::from(config.schedule.catch_up_minutes));
            let summary = components
                .workflow
                .run_day(date, catch_up)
                .await
                .with_context(|| format!("Run failed for {}", date))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Status { date } => {
            let store = open_state_store(&config, &root)
                .await
                .context("Failed to open state store")?;
            let date = date.unwrap_or(today);
            match store.load(date).await? {
                Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
                None => anyhow::bail!("No state prepared for {}", date),
            }
        }
        Command::Prune => {
            let store = open_state_store(&config, &root)
                .await
                .context("Failed to open state store")?;
            let removed = Housekeeper::new(store, config.state.retention_days)
                .prune(today)
                .await?;
            info!(removed, "Prune complete");
        }
        Command::Serve => {
            root.ensure_directories()?;
            let store = open_state_store(&config, &root)
                .await
                .context("Failed to open state store")?;
            let app = build_router(AppState::new(store, offset));

            let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
                .parse()
                .context("Invalid server bind address")?;
            info!("Starting HTTP server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .context("Failed to bind to address")?;

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("Server error")?;

            info!("Server shutdown complete");
        }
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Terminate handler unavailable");
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

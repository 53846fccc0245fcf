mod config;
mod logging;
mod signals;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use node_registry::api::rest::router;
use node_registry::domain::file_storage::FileStorage;
use node_registry::domain::node_storage::NodeStorage;
use node_registry::domain::topics::SUBSCRIPTIONS;
use node_registry::infra::bus::{MqttBus, spawn_ingestion};
use node_registry::Service;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

/// Fleet dashboard server - live registry of embedded nodes
#[derive(Parser)]
#[command(name = "fleet-dashboard-server")]
#[command(version, about = "Fleet dashboard server - live registry of embedded nodes")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for the HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config
        && !path.is_file()
    {
        anyhow::bail!("config file does not exist: {}", path.display());
    }

    // defaults -> YAML -> env (FLEET__*) -> CLI
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(cli.port);

    logging::init(&config.logging, cli.verbose);

    if cli.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(&config),
    }
}

fn check_config(config: &AppConfig) -> Result<()> {
    config
        .bus
        .broker_address()
        .context("invalid bus configuration")?;
    println!("Configuration is valid");
    println!("{}", config.to_json()?);
    Ok(())
}

async fn run_server(config: AppConfig) -> Result<()> {
    let registry = &config.registry;
    tracing::info!("fleet dashboard starting");

    let files = Arc::new(FileStorage::new(
        &registry.uploads_dir,
        &registry.public_files_prefix,
    ));
    files.load_existing().await.with_context(|| {
        format!(
            "failed to prepare upload directory {}",
            registry.uploads_dir.display()
        )
    })?;

    let cancel = CancellationToken::new();
    let (bus, messages, connection) =
        MqttBus::start(&config.bus, &SUBSCRIPTIONS, cancel.child_token())
            .context("invalid bus configuration")?;
    let service = Service::new(
        Arc::new(NodeStorage::new()),
        files,
        Arc::new(bus),
        registry.service_config(),
    );

    let ingestion = spawn_ingestion(service.clone(), messages, cancel.child_token());

    let addr = config.server.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "HTTP server listening");

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = signals::wait_for_shutdown().await {
            tracing::error!(error = %e, "signal handling failed; shutting down");
        }
        on_signal.cancel();
    });

    let shutdown = cancel.clone();
    axum::serve(listener, router(Arc::new(service)))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")?;

    cancel.cancel();
    ingestion.await.context("ingestion task panicked")?;
    connection.await.context("bus connection task panicked")?;
    tracing::info!("fleet dashboard stopped");
    Ok(())
}

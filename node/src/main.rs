// Copyright (c) 2026 Blockfreight Contributors. MIT License.
// See LICENSE for details.

//! # BFTX Node
//!
//! Entry point for the `bftx` binary. Resolves settings, initializes
//! logging, wires the transaction service and dispatches one subcommand.
//!
//! One-shot commands talk to the consensus engine through a
//! `ScopedGateway`, a fresh RPC session per call. `serve` keeps a single
//! `PersistentGateway` session for the life of the process. With
//! `--local-engine` both use the in-process engine instead, which starts
//! empty on every invocation.

mod api;
mod cli;
mod logging;
mod metrics;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

use bftx_protocol::crypto::NodeKeypair;
use bftx_protocol::encoding::{KemKeyring, ParameterRegistry};
use bftx_protocol::{
    BftxDb, ConsensusGateway, EncodingPipeline, LocalEngine, PersistentGateway, ScopedGateway,
    SigningService, TransactionService,
};

use cli::{BftxCli, Commands};
use metrics::NodeMetrics;
use settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = BftxCli::parse();
    let settings = Settings::resolve(&cli)?;
    logging::init_logging(logging::DEFAULT_DIRECTIVES, settings.log_format);

    match cli.command {
        Commands::Init => init_node(&settings),
        Commands::Serve { port } => serve(&settings, port.unwrap_or(settings.api_port)).await,
        command => {
            let gateway: Arc<dyn ConsensusGateway> = if settings.local_engine {
                Arc::new(LocalEngine::new())
            } else {
                Arc::new(ScopedGateway::new(settings.gateway.clone()))
            };
            let service = open_service(&settings, gateway)?;
            run_command(&service, command).await
        }
    }
}

/// Open the store and keys under the data directory and build the service.
fn open_service(settings: &Settings, gateway: Arc<dyn ConsensusGateway>) -> Result<TransactionService> {
    let db_path = settings.db_path();
    let db = BftxDb::open(&db_path)
        .with_context(|| format!("failed to open transaction store at {}", db_path.display()))?;

    let key_path = settings.signing_key_path();
    let keypair = NodeKeypair::load_or_generate(&key_path)
        .with_context(|| format!("failed to load signing key {}", key_path.display()))?;

    let kem_dir = settings.kem_key_dir();
    let keyring = KemKeyring::load_or_generate(&kem_dir)
        .with_context(|| format!("failed to load KEM keys from {}", kem_dir.display()))?;

    Ok(TransactionService::new(
        Arc::new(db),
        gateway,
        SigningService::new(keypair),
        EncodingPipeline::new(ParameterRegistry::standard(), keyring),
    ))
}

/// Create the data directory and every key the node needs.
fn init_node(settings: &Settings) -> Result<()> {
    let data_dir = &settings.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = settings.signing_key_path();
    let keypair = NodeKeypair::load_or_generate(&key_path)
        .with_context(|| format!("failed to write signing key to {}", key_path.display()))?;
    KemKeyring::load_or_generate(&settings.kem_key_dir())
        .with_context(|| format!("failed to write KEM keys to {}", settings.kem_key_dir().display()))?;
    BftxDb::open(settings.db_path())
        .and_then(|db| db.flush())
        .with_context(|| format!("failed to create store at {}", settings.db_path().display()))?;

    println!("Node initialized.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Signing key    : {}", key_path.display());
    println!("  Public key     : {}", keypair.public_key());
    println!("  KEM keys       : {}", settings.kem_key_dir().display());
    Ok(())
}

fn read_payload(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read(path)
        .with_context(|| format!("failed to read payload file {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_command(service: &TransactionService, command: Commands) -> Result<()> {
    match command {
        Commands::Construct { file } => {
            let id = service.construct(read_payload(&file)?).await?;
            println!("{id}");
        }
        Commands::Validate { file } => {
            service.validate(&read_payload(&file)?)?;
            println!("valid");
        }
        Commands::Verify { file } => {
            let id = service.locate(&read_payload(&file)?).await?;
            println!("{id}");
        }
        Commands::Sign { id } => print_json(&service.sign(&id).await?)?,
        Commands::Encode { id, params } => {
            print_json(&service.encode(&id, params.as_deref()).await?)?
        }
        Commands::Decode { id, params } => {
            print_json(&service.decode(&id, params.as_deref()).await?)?
        }
        Commands::Broadcast { id } => print_json(&service.broadcast(&id).await?)?,
        Commands::Get { id } => print_json(&service.get(&id).await?)?,
        Commands::Query { id } => print_json(&service.query(&id).await?)?,
        Commands::Append { file, old_id } => {
            let id = service.append(read_payload(&file)?, &old_id).await?;
            println!("{id}");
        }
        Commands::State { id } => println!("{}", service.state(&id).await?),
        Commands::Total => println!("{}", service.total().await?),
        Commands::Info => print_json(&service.info().await?)?,
        Commands::Reconcile => {
            let repaired = service.reconcile_amendments().await?;
            println!("repaired {repaired} amendment link(s)");
        }
        Commands::Init | Commands::Serve { .. } => {
            anyhow::bail!("init and serve do not run against an opened service")
        }
    }
    Ok(())
}

/// Serve the HTTP API until SIGINT or SIGTERM.
async fn serve(settings: &Settings, port: u16) -> Result<()> {
    let (gateway, persistent): (Arc<dyn ConsensusGateway>, Option<Arc<PersistentGateway>>) =
        if settings.local_engine {
            let engine: Arc<dyn ConsensusGateway> = Arc::new(LocalEngine::new());
            (engine, None)
        } else {
            let persistent = Arc::new(PersistentGateway::new(settings.gateway.clone()));
            let gateway: Arc<dyn ConsensusGateway> = persistent.clone();
            (gateway, Some(persistent))
        };

    let service = Arc::new(open_service(settings, gateway)?);
    let metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    let state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        service,
        metrics,
    };
    let router = api::create_router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind API listener on {addr}"))?;
    tracing::info!(
        %addr,
        rpc_url = %settings.gateway.rpc_url,
        local_engine = settings.local_engine,
        data_dir = %settings.data_dir.display(),
        "API server listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")?;

    if let Some(gateway) = persistent {
        gateway.shutdown().await;
    }
    tracing::info!("bftx node stopped");
    Ok(())
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}

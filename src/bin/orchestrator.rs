//! Orchestrator process: webhook listener + Worker-Builder/Task Executor
//! drivers. Grounded in `original_source/cmd/orchestrator/main.go`'s flag
//! parsing and listener setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use conflowci::config::load_validated_config;
use conflowci::grpc::{TlsFlags, load_client_tls};
use conflowci::webhook::{self, AppState};

#[derive(Parser)]
struct Cli {
    /// Path to the pipeline YAML config.
    #[arg(long = "config", default_value = "conflow-ci.yaml")]
    config: PathBuf,

    #[command(flatten)]
    tls: TlsFlags,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an RSA keypair for provisioning a worker identity, then exit.
    GenerateKeys {
        #[arg(long, default_value_t = 2048)]
        bits: usize,
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    conflowci::trace::init();
    let cli = Cli::parse();

    if let Some(Command::GenerateKeys { bits, dir }) = cli.command {
        std::fs::create_dir_all(&dir)?;
        conflowci::crypto::generate_keypair_to_dir(&dir, bits)?;
        tracing::info!(dir = %dir.display(), "generated keypair");
        return Ok(());
    }

    let config = load_validated_config(&cli.config)?;
    let tls = load_client_tls(&cli.tls)?;
    let mq_uri = std::env::var(conflowci::broker::MQ_URI_ENV_VAR)
        .map_err(|_| anyhow::anyhow!("{} is not set", conflowci::broker::MQ_URI_ENV_VAR))?;

    let state = AppState {
        config: Arc::new(config),
        tls,
        mq_uri,
    };

    let listener = tokio::net::TcpListener::bind("0.0.0.0:7777").await?;
    tracing::info!("orchestrator listening on :7777");
    axum::serve(listener, webhook::router(state)).await?;

    Ok(())
}

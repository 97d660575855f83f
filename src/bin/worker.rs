//! Worker process: binds a TCP listener and registers Repository
//! Provider, Broker Consumer, and File Extractor (spec 4.2). Grounded in
//! `original_source/cmd/worker/main.go`'s flag parsing and listener setup.

use std::sync::Arc;

use clap::Parser;
use conflowci::broker::{BrokerHandle, MQ_URI_ENV_VAR};
use conflowci::grpc::{TlsFlags, load_server_tls};
use conflowci::proto::broker_consumer_server::BrokerConsumerServer;
use conflowci::proto::file_extractor_server::FileExtractorServer;
use conflowci::proto::repository_provider_server::RepositoryProviderServer;
use conflowci::worker_service::WorkerServices;
use tonic::transport::Server;

#[derive(Parser)]
struct Cli {
    #[arg(long = "port", default_value_t = 8918)]
    port: u16,

    #[arg(long = "addr", default_value = "0.0.0.0")]
    addr: String,

    #[command(flatten)]
    tls: TlsFlags,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    conflowci::trace::init();
    let cli = Cli::parse();

    let mq_uri = std::env::var(MQ_URI_ENV_VAR)
        .map_err(|_| anyhow::anyhow!("{MQ_URI_ENV_VAR} is not set"))?;
    let broker = Arc::new(BrokerHandle::connect(&mq_uri).await?);
    let services = WorkerServices::new(broker);

    let tls_config = load_server_tls(&cli.tls)?;
    let addr = format!("{}:{}", cli.addr, cli.port).parse()?;
    tracing::info!(%addr, tls = cli.tls.enabled, "worker listening");

    let builder = Server::builder();
    let builder = if let Some(tls_config) = tls_config {
        builder.tls_config(tls_config)?
    } else {
        builder
    };

    builder
        .add_service(RepositoryProviderServer::new(services.clone()))
        .add_service(BrokerConsumerServer::new(services.clone()))
        .add_service(FileExtractorServer::new(services))
        .serve(addr)
        .await?;

    Ok(())
}

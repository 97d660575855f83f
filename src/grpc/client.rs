//! Typed client wrapper for dialing a single worker's gRPC surface.

use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::config::EndpointInfo;
use crate::error::RpcError;
use crate::proto::broker_consumer_client::BrokerConsumerClient;
use crate::proto::file_extractor_client::FileExtractorClient;
use crate::proto::repository_provider_client::RepositoryProviderClient;

/// A dialed connection to one worker, bundling the three service stubs
/// that worker exposes (spec 4.1, 4.2, 4.5).
pub struct WorkerClient {
    pub repository: RepositoryProviderClient<Channel>,
    pub broker_consumer: BrokerConsumerClient<Channel>,
    pub file_extractor: FileExtractorClient<Channel>,
}

impl WorkerClient {
    pub async fn dial(
        endpoint: &EndpointInfo,
        tls: Option<&ClientTlsConfig>,
    ) -> Result<Self, RpcError> {
        let scheme = if tls.is_some() { "https" } else { "http" };
        let uri = format!("{scheme}://{}:{}", endpoint.host, endpoint.port);

        let mut builder = Endpoint::from_shared(uri.clone()).map_err(|e| RpcError::Transport {
            target: uri.clone(),
            cause: e.to_string(),
        })?;
        if let Some(tls) = tls {
            builder = builder.tls_config(tls.clone()).map_err(|e| RpcError::Transport {
                target: uri.clone(),
                cause: e.to_string(),
            })?;
        }

        let channel = builder.connect().await.map_err(|e| RpcError::Transport {
            target: uri.clone(),
            cause: e.to_string(),
        })?;

        Ok(Self {
            repository: RepositoryProviderClient::new(channel.clone()),
            broker_consumer: BrokerConsumerClient::new(channel.clone()),
            file_extractor: FileExtractorClient::new(channel),
        })
    }
}

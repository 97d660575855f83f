//! TLS flag parsing and credential loading for the worker<->orchestrator
//! gRPC channel.
//!
//! Ported from the original implementation's flag/loader contract
//! (`pkg/grpc/flag.go`, `pkg/grpc/util.go`): a boolean `-tls` switch plus
//! three path flags, loaded once at process start. When `-tls` is false
//! both loaders return `None` and callers bind/dial in plaintext — fine
//! for localhost/test topologies, per spec 4.2.

use std::path::PathBuf;

use clap::Args;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

use crate::error::RpcError;

#[derive(Debug, Clone, Args)]
pub struct TlsFlags {
    /// Enable mutual TLS on the gRPC channel.
    #[arg(long = "tls", default_value_t = false)]
    pub enabled: bool,

    #[arg(long = "tls-cert")]
    pub cert_path: Option<PathBuf>,

    #[arg(long = "tls-key")]
    pub key_path: Option<PathBuf>,

    #[arg(long = "tls-ca")]
    pub ca_path: Option<PathBuf>,
}

impl TlsFlags {
    fn require_paths(&self) -> Result<(&PathBuf, &PathBuf, &PathBuf), RpcError> {
        match (&self.cert_path, &self.key_path, &self.ca_path) {
            (Some(cert), Some(key), Some(ca)) => Ok((cert, key, ca)),
            _ => Err(RpcError::Transport {
                target: "tls-config".to_string(),
                cause: "-tls requires -tls-cert, -tls-key and -tls-ca".to_string(),
            }),
        }
    }
}

/// Build a [`ServerTlsConfig`] for the worker's gRPC listener, or `None` if
/// TLS is disabled.
pub fn load_server_tls(flags: &TlsFlags) -> Result<Option<ServerTlsConfig>, RpcError> {
    if !flags.enabled {
        return Ok(None);
    }
    let (cert_path, key_path, ca_path) = flags.require_paths()?;

    let cert = read_file(cert_path)?;
    let key = read_file(key_path)?;
    let ca = read_file(ca_path)?;

    let identity = Identity::from_pem(cert, key);
    let client_ca = Certificate::from_pem(ca);

    Ok(Some(
        ServerTlsConfig::new()
            .identity(identity)
            .client_ca_root(client_ca),
    ))
}

/// Build a [`ClientTlsConfig`] for the orchestrator to dial a worker, or
/// `None` if TLS is disabled.
pub fn load_client_tls(flags: &TlsFlags) -> Result<Option<ClientTlsConfig>, RpcError> {
    if !flags.enabled {
        return Ok(None);
    }
    let (cert_path, key_path, ca_path) = flags.require_paths()?;

    let cert = read_file(cert_path)?;
    let key = read_file(key_path)?;
    let ca = read_file(ca_path)?;

    let identity = Identity::from_pem(cert, key);
    let ca_cert = Certificate::from_pem(ca);

    Ok(Some(
        ClientTlsConfig::new()
            .identity(identity)
            .ca_certificate(ca_cert),
    ))
}

fn read_file(path: &PathBuf) -> Result<Vec<u8>, RpcError> {
    std::fs::read(path).map_err(|e| RpcError::Transport {
        target: path.display().to_string(),
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_tls_yields_no_config() {
        let flags = TlsFlags {
            enabled: false,
            cert_path: None,
            key_path: None,
            ca_path: None,
        };
        assert!(load_server_tls(&flags).unwrap().is_none());
        assert!(load_client_tls(&flags).unwrap().is_none());
    }

    #[test]
    fn enabled_tls_without_paths_is_an_error() {
        let flags = TlsFlags {
            enabled: true,
            cert_path: None,
            key_path: None,
            ca_path: None,
        };
        assert!(load_server_tls(&flags).is_err());
    }
}

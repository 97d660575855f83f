//! Error taxonomy.
//!
//! One variant family per row of the error-handling design: each carries
//! the fields needed to log and, where applicable, attribute the failure to
//! a single endpoint without reraising it.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection to {uri} failed: {cause}")]
    Connection { uri: String, cause: String },

    #[error("channel error on {uri}: {cause}")]
    Channel { uri: String, cause: String },

    #[error("exchange {exchange} error: {cause}")]
    Exchange { exchange: String, cause: String },

    #[error("queue {queue} error: {cause}")]
    Queue { queue: String, cause: String },

    #[error("binding {queue} -> {routing_key} error: {cause}")]
    Binding {
        queue: String,
        routing_key: String,
        cause: String,
    },

    #[error("publish to routing key {routing_key} exhausted retries: {cause}")]
    UnroutablePublish { routing_key: String, cause: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("rpc to {target} failed: {cause}")]
    Transport { target: String, cause: String },
}

impl From<tonic::Status> for RpcError {
    fn from(status: tonic::Status) -> Self {
        RpcError::Transport {
            target: "<worker>".to_string(),
            cause: status.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("clone/fetch of {url_or_dir} failed: {cause}")]
    Sync { url_or_dir: String, cause: String },

    #[error("worktree op on {repo_dir} (rel. path {relative_path}) failed: {cause}")]
    Worktree {
        repo_dir: String,
        relative_path: String,
        cause: String,
    },

    #[error("checksum computation failed: {shell_output}")]
    Checksum { shell_output: String },

    #[error("metadata encode failed: {cause}")]
    MetadataEncode { cause: String },

    #[error("command `{command}` failed: {combined_output}")]
    CommandExecution {
        command: String,
        combined_output: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config validation failed for field `{field}`: {reason}")]
    Validation { field: String, reason: String },

    #[error("unresolved environment variable `{var}` in {context}")]
    UnresolvedEnvVar { var: String, context: String },

    #[error("failed to read config file {path}: {cause}")]
    Read { path: PathBuf, cause: String },

    #[error("failed to parse config as YAML: {cause}")]
    Parse { cause: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGen(String),

    #[error("failed to write key material to {path}: {cause}")]
    Write { path: PathBuf, cause: String },
}

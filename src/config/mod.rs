//! Pipeline configuration: YAML load, environment expansion, endpoint
//! address parsing, and validation.
//!
//! Distinct from the metadata file in [`crate::metadata`], which is a
//! per-repo, per-worker TOML side-file and not user-authored.

mod parse;
mod types;
mod validate;

pub use parse::{DEFAULT_PROVIDER_PORT, load_config, parse_endpoint_address};
pub use types::{
    BuildStage, EndpointInfo, EnvironmentConfig, FileSelector, GithubAuthConfig,
    GithubProviderConfig, HostConfig, ProviderConfig, RawConfig, RawPipelineConfig, TaskConfig,
    ValidatedConfig,
};
pub use validate::validate;

use std::path::Path;

/// Load, expand, and validate a pipeline config file in one call.
pub fn load_validated_config(path: &Path) -> Result<ValidatedConfig, crate::error::ConfigError> {
    validate(load_config(path)?)
}

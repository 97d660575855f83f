//! Typed shape of the pipeline config file and the endpoint identity it
//! resolves to.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A worker identity: human name (unique within a run), host, port, user,
/// private-key path.
///
/// Invariant: `name` and `host` non-empty; `private_key_path` resolves to
/// a readable file (checked at config-validation time, not construction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub name: String,
    pub host: String,
    /// 0 means "use the default provider port"; resolved before dialing.
    pub port: u16,
    pub user: String,
    pub private_key_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    pub hosts: Vec<HostConfig>,
    pub pipeline: RawPipelineConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub github: GithubProviderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubProviderConfig {
    pub repository: String,
    pub branch: String,
    #[serde(default)]
    pub auth: Option<GithubAuthConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubAuthConfig {
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub global: BTreeMap<String, String>,
    #[serde(default)]
    pub local: BTreeMap<String, String>,
}

/// A host entry as written in YAML. `address` is `[user@]host[:port]`,
/// parsed into an [`EndpointInfo`] by [`super::parse::parse_endpoint_address`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    pub name: String,
    pub address: String,
    /// Accepted by the parser, never executed. See DESIGN.md "Open Question
    /// decisions".
    #[serde(default)]
    pub install: Vec<String>,
    pub private_key_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPipelineConfig {
    pub build: BuildStage,
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildStage {
    pub name: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskConfig {
    pub name: String,
    pub runs_on: Vec<String>,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    pub cmd: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

fn default_parallel() -> bool {
    true
}

/// A fully validated, endpoint-resolved pipeline ready to drive a run.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub provider: GithubProviderConfig,
    pub environment: EnvironmentConfig,
    pub endpoints: Vec<EndpointInfo>,
    pub build: BuildStage,
    pub tasks: Vec<TaskConfig>,
    /// Parsed but inert; see `HostConfig::install`.
    pub host_install_steps: BTreeMap<String, Vec<String>>,
}

/// Which of `{files, pattern}` a task resolved to selecting files with.
pub enum FileSelector<'a> {
    Explicit(&'a [String]),
    Pattern(&'a str),
}

impl TaskConfig {
    pub fn file_selector(&self) -> FileSelector<'_> {
        match (&self.files, &self.pattern) {
            (Some(files), _) => FileSelector::Explicit(files),
            (None, Some(pattern)) => FileSelector::Pattern(pattern),
            (None, None) => unreachable!("validated config guarantees exactly one is set"),
        }
    }
}

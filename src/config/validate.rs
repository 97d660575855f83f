//! Pipeline validation (spec 8's rejection table).

use std::collections::BTreeMap;

use crate::error::ConfigError;

use super::parse::parse_endpoint_address;
use super::types::{RawConfig, TaskConfig, ValidatedConfig};

/// Validate and resolve a [`RawConfig`] into a [`ValidatedConfig`], or the
/// first validation failure encountered.
pub fn validate(raw: RawConfig) -> Result<ValidatedConfig, ConfigError> {
    if raw.pipeline.build.name.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "pipeline.build.name".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if raw.pipeline.build.steps.is_empty() {
        return Err(ConfigError::Validation {
            field: "pipeline.build.steps".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if raw.pipeline.tasks.is_empty() {
        return Err(ConfigError::Validation {
            field: "pipeline.tasks".to_string(),
            reason: "must contain at least one task".to_string(),
        });
    }

    for task in &raw.pipeline.tasks {
        validate_task(task)?;
    }

    let mut endpoints = Vec::with_capacity(raw.hosts.len());
    let mut host_install_steps = BTreeMap::new();
    for host in &raw.hosts {
        endpoints.push(parse_endpoint_address(host)?);
        if !host.install.is_empty() {
            host_install_steps.insert(host.name.clone(), host.install.clone());
        }
    }

    Ok(ValidatedConfig {
        provider: raw.provider.github,
        environment: raw.environment,
        endpoints,
        build: raw.pipeline.build,
        tasks: raw.pipeline.tasks,
        host_install_steps,
    })
}

fn validate_task(task: &TaskConfig) -> Result<(), ConfigError> {
    let field = |suffix: &str| format!("pipeline.tasks[{}].{suffix}", task.name);

    if task.name.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "pipeline.tasks[].name".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if task.runs_on.is_empty() {
        return Err(ConfigError::Validation {
            field: field("runs_on"),
            reason: "must not be empty".to_string(),
        });
    }
    if task.cmd.is_empty() {
        return Err(ConfigError::Validation {
            field: field("cmd"),
            reason: "must not be empty".to_string(),
        });
    }
    match (&task.files, &task.pattern) {
        (None, None) => {
            return Err(ConfigError::Validation {
                field: field("files/pattern"),
                reason: "exactly one of `files` or `pattern` must be set".to_string(),
            });
        }
        (Some(_), Some(_)) => {
            return Err(ConfigError::Validation {
                field: field("files/pattern"),
                reason: "`files` and `pattern` are mutually exclusive".to_string(),
            });
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{
        BuildStage, EnvironmentConfig, GithubProviderConfig, HostConfig, ProviderConfig,
        RawPipelineConfig,
    };
    use std::path::PathBuf;

    fn base_config() -> RawConfig {
        RawConfig {
            provider: ProviderConfig {
                github: GithubProviderConfig {
                    repository: "octocat/hello-world".to_string(),
                    branch: "main".to_string(),
                    auth: None,
                },
            },
            environment: EnvironmentConfig::default(),
            hosts: vec![HostConfig {
                name: "test-node-1".to_string(),
                address: "host".to_string(),
                install: vec![],
                private_key_path: PathBuf::from("/dev/null"),
            }],
            pipeline: RawPipelineConfig {
                build: BuildStage {
                    name: "build".to_string(),
                    steps: vec!["make".to_string()],
                },
                tasks: vec![TaskConfig {
                    name: "lint".to_string(),
                    runs_on: vec!["test-node-1".to_string()],
                    parallel: true,
                    cmd: vec!["{file}".to_string()],
                    depends_on: vec![],
                    pattern: Some(".+_test.go".to_string()),
                    files: None,
                }],
            },
        }
    }

    #[test]
    fn accepts_minimal_valid_config() {
        assert!(validate(base_config()).is_ok());
    }

    #[test]
    fn rejects_empty_build_name() {
        let mut cfg = base_config();
        cfg.pipeline.build.name = String::new();
        assert!(validate(cfg).is_err());
    }

    #[test]
    fn rejects_empty_build_steps() {
        let mut cfg = base_config();
        cfg.pipeline.build.steps.clear();
        assert!(validate(cfg).is_err());
    }

    #[test]
    fn rejects_zero_tasks() {
        let mut cfg = base_config();
        cfg.pipeline.tasks.clear();
        assert!(validate(cfg).is_err());
    }

    #[test]
    fn rejects_empty_task_name() {
        let mut cfg = base_config();
        cfg.pipeline.tasks[0].name = String::new();
        assert!(validate(cfg).is_err());
    }

    #[test]
    fn rejects_empty_runs_on() {
        let mut cfg = base_config();
        cfg.pipeline.tasks[0].runs_on.clear();
        assert!(validate(cfg).is_err());
    }

    #[test]
    fn rejects_empty_cmd() {
        let mut cfg = base_config();
        cfg.pipeline.tasks[0].cmd.clear();
        assert!(validate(cfg).is_err());
    }

    #[test]
    fn rejects_neither_files_nor_pattern() {
        let mut cfg = base_config();
        cfg.pipeline.tasks[0].pattern = None;
        assert!(validate(cfg).is_err());
    }

    #[test]
    fn rejects_both_files_and_pattern() {
        let mut cfg = base_config();
        cfg.pipeline.tasks[0].files = Some(vec!["a.go".to_string()]);
        assert!(validate(cfg).is_err());
    }
}

//! Worker-Builder aggregate types (spec 3).

use crate::config::EndpointInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Starting,
    Running,
    Completed,
    Error,
    CompletedWithErrors,
}

/// Inputs to one pipeline invocation's Worker-Builder run.
#[derive(Debug, Clone)]
pub struct BuildSpec {
    pub run_id: String,
    pub clone_url: String,
    pub repo_name: String,
    pub remote_name: String,
    pub branch_name: String,
    /// `pull/<N>/head:pr-<M>`. Invariant: exactly two colon-separated
    /// halves when present.
    pub refspec: String,
    pub auth_token: Option<String>,
    pub build_steps: Vec<String>,
    pub build_path: String,
}

impl BuildSpec {
    /// The branch name a worktree should be created on: the suffix after
    /// the refspec's first `:` (spec 4.3 step 3).
    pub fn worktree_branch(&self) -> Result<&str, String> {
        self.refspec
            .split_once(':')
            .map(|(_, after)| after)
            .ok_or_else(|| format!("refspec `{}` is not of the form a:b", self.refspec))
    }

    pub fn repo_dir(&self) -> String {
        format!("{}/{}", self.build_path, self.repo_name)
    }

    /// Worktree directory: `<BuildPath>/<repo>-<branch>` (spec 3, Worktree
    /// key).
    pub fn worktree_dir(&self, branch: &str) -> String {
        format!("{}/{}-{}", self.build_path, self.repo_name, branch)
    }
}

/// Result of building on one endpoint. Exactly one of `output`/`error` is
/// populated.
#[derive(Debug, Clone)]
pub struct WorkerBuildOutput {
    pub endpoint: String,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// Per-pipeline-invocation aggregate.
pub struct WorkersBuilder {
    pub spec: BuildSpec,
    pub endpoints: Vec<EndpointInfo>,
    pub state: BuilderState,
}

impl WorkersBuilder {
    pub fn new(spec: BuildSpec, endpoints: Vec<EndpointInfo>) -> Self {
        Self {
            spec,
            endpoints,
            state: BuilderState::Starting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> BuildSpec {
        BuildSpec {
            run_id: "run-1".to_string(),
            clone_url: "https://github.com/octocat/hello-world".to_string(),
            repo_name: "hello-world".to_string(),
            remote_name: "origin".to_string(),
            branch_name: "another-change".to_string(),
            refspec: "pull/6/head:pr-6".to_string(),
            auth_token: None,
            build_steps: vec!["chmod +x whoami.sh".to_string()],
            build_path: "/home/ci/conflowci/build".to_string(),
        }
    }

    #[test]
    fn worktree_branch_is_refspec_suffix() {
        assert_eq!(spec().worktree_branch().unwrap(), "pr-6");
    }

    #[test]
    fn rejects_malformed_refspec() {
        let mut s = spec();
        s.refspec = "no-colon-here".to_string();
        assert!(s.worktree_branch().is_err());
    }

    #[test]
    fn worktree_dir_follows_repo_dash_branch_convention() {
        assert_eq!(
            spec().worktree_dir("pr-6"),
            "/home/ci/conflowci/build/hello-world-pr-6"
        );
    }
}

//! Per-endpoint sync algorithm (spec 4.3).

use tonic::transport::ClientTlsConfig;

use crate::config::EndpointInfo;
use crate::grpc::WorkerClient;
use crate::proto::{
    CloneRequest, CreateWorkTreeRequest, FetchRequest, RunShellRequest, SyncResponse,
};

use super::shell::quote as shell_quote;
use super::types::{BuildSpec, WorkerBuildOutput};

/// Drive the full sync + build sequence for one endpoint: metadata probe,
/// Clone-or-Fetch, CreateWorkTree, composed build-step shell line.
///
/// A failure in any step short-circuits subsequent steps for this endpoint
/// but is always reported as a [`WorkerBuildOutput`] rather than
/// propagated, per spec 4.3's invariant.
pub async fn sync_and_build(
    endpoint: &EndpointInfo,
    spec: &BuildSpec,
    tls: Option<&ClientTlsConfig>,
) -> WorkerBuildOutput {
    match sync_and_build_inner(endpoint, spec, tls).await {
        Ok(output) => WorkerBuildOutput {
            endpoint: endpoint.name.clone(),
            output: Some(output),
            error: None,
        },
        Err(error) => WorkerBuildOutput {
            endpoint: endpoint.name.clone(),
            output: None,
            error: Some(error),
        },
    }
}

async fn sync_and_build_inner(
    endpoint: &EndpointInfo,
    spec: &BuildSpec,
    tls: Option<&ClientTlsConfig>,
) -> Result<String, String> {
    let mut client = WorkerClient::dial(endpoint, tls)
        .await
        .map_err(|e| format!("dial {}: {e}", endpoint.name))?;

    let repo_dir = spec.repo_dir();
    let metadata_path = format!("{repo_dir}/{}", crate::metadata::METADATA_FILENAME);

    // Step 1: remote cat probe. A non-error response means metadata is
    // present (corrupt content still counts as present, per spec).
    let probe = client
        .repository
        .run_shell(RunShellRequest {
            working_dir: spec.build_path.clone(),
            shell_line: format!("cat {}", shell_quote(&metadata_path)),
        })
        .await
        .map(|r| r.into_inner())
        .map_err(|e| format!("metadata probe rpc error: {e}"))?;

    if probe.error.is_empty() {
        fetch(&mut client, spec).await?;
    } else {
        clone(&mut client, spec).await?;
        fetch(&mut client, spec).await?;
    }

    let worktree_branch = spec.worktree_branch()?;
    let worktree_dir = spec.worktree_dir(worktree_branch);
    let relative_path = format!("../{}-{}", spec.repo_name, worktree_branch);

    let resp = client
        .repository
        .create_work_tree(CreateWorkTreeRequest {
            repo_dir: repo_dir.clone(),
            branch: worktree_branch.to_string(),
            relative_path: relative_path.clone(),
        })
        .await
        .map(|r| r.into_inner())
        .map_err(|e| format!("create_work_tree rpc error: {e}"))?;
    fail_if_error(resp)?;

    let build_command = compose_build_command(&worktree_dir, &spec.build_steps);
    let resp = client
        .repository
        .run_shell(RunShellRequest {
            working_dir: repo_dir,
            shell_line: build_command,
        })
        .await
        .map(|r| r.into_inner())
        .map_err(|e| format!("run_shell rpc error: {e}"))?;

    if !resp.error.is_empty() {
        return Err(resp.error);
    }
    Ok(resp.output)
}

async fn clone(client: &mut WorkerClient, spec: &BuildSpec) -> Result<(), String> {
    let resp = client
        .repository
        .clone(CloneRequest {
            clone_url: spec.clone_url.clone(),
            target_dir: spec.repo_dir(),
            branch: spec.branch_name.clone(),
            auth_token: spec.auth_token.clone().unwrap_or_default(),
        })
        .await
        .map(|r| r.into_inner())
        .map_err(|e| format!("clone rpc error: {e}"))?;
    fail_if_error(resp)
}

async fn fetch(client: &mut WorkerClient, spec: &BuildSpec) -> Result<(), String> {
    let resp = client
        .repository
        .fetch(FetchRequest {
            repo_dir: spec.repo_dir(),
            remote_name: spec.remote_name.clone(),
            refspec: spec.refspec.clone(),
        })
        .await
        .map(|r| r.into_inner())
        .map_err(|e| format!("fetch rpc error: {e}"))?;
    fail_if_error(resp)
}

fn fail_if_error(resp: SyncResponse) -> Result<(), String> {
    if resp.error.is_empty() {
        Ok(())
    } else {
        Err(resp.error)
    }
}

/// `cd <worktree_dir> && step1 && step2 && ...` using only non-empty,
/// trimmed steps. If nothing remains after trimming, only the `cd` runs
/// (spec 4.3 step 4).
fn compose_build_command(worktree_dir: &str, steps: &[String]) -> String {
    let mut command = format!("cd {}", shell_quote(worktree_dir));
    for step in steps {
        let trimmed = step.trim();
        if !trimmed.is_empty() {
            command.push_str(" && ");
            command.push_str(trimmed);
        }
    }
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_build_command_skips_blank_steps() {
        let cmd = compose_build_command(
            "/build/repo pr-6",
            &["chmod +x whoami.sh".to_string(), "  ".to_string(), "./whoami.sh".to_string()],
        );
        assert_eq!(
            cmd,
            "cd '/build/repo pr-6' && chmod +x whoami.sh && ./whoami.sh"
        );
    }

    #[test]
    fn compose_build_command_with_no_steps_is_just_cd() {
        assert_eq!(compose_build_command("/build/x y", &[]), "cd '/build/x y'");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("a'b"), r"'a'\''b'");
    }
}

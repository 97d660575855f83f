//! Fan-out across every endpoint in a [`WorkersBuilder`] run (spec 4.3).
//!
//! Generalizes the teacher's `execution.rs` generate-dispatch-collect
//! `WorkItem` pattern (there: `rayon`+`crossbeam-channel` over worktrees;
//! here: `tokio::spawn`+`join_all` over remote gRPC endpoints).

use tonic::transport::ClientTlsConfig;

use crate::proto::RemoveWorkTreeRequest;

use super::sync::sync_and_build;
use super::types::{BuilderState, WorkerBuildOutput, WorkersBuilder};

/// Build on every endpoint in `builder.endpoints` concurrently, updating
/// `builder.state` to reflect the aggregate outcome, and return each
/// endpoint's [`WorkerBuildOutput`] in the order the endpoints were listed.
pub async fn build_all_endpoints(
    builder: &mut WorkersBuilder,
    tls: Option<ClientTlsConfig>,
) -> Vec<WorkerBuildOutput> {
    builder.state = BuilderState::Running;

    let tasks = builder.endpoints.iter().map(|endpoint| {
        let endpoint = endpoint.clone();
        let spec = builder.spec.clone();
        let tls = tls.clone();
        tokio::spawn(async move { sync_and_build(&endpoint, &spec, tls.as_ref()).await })
    });

    let mut outputs = Vec::with_capacity(builder.endpoints.len());
    for task in tasks {
        match task.await {
            Ok(output) => outputs.push(output),
            Err(join_err) => outputs.push(WorkerBuildOutput {
                endpoint: "<unknown>".to_string(),
                output: None,
                error: Some(format!("build task panicked: {join_err}")),
            }),
        }
    }

    builder.state = if outputs.iter().all(|o| o.error.is_none()) {
        BuilderState::Completed
    } else if outputs.iter().all(|o| o.error.is_some()) {
        BuilderState::Error
    } else {
        BuilderState::CompletedWithErrors
    };

    outputs
}

/// Tear down the worktree created for this run on every endpoint,
/// best-effort: a removal failure on one endpoint is logged but does not
/// stop the others.
pub async fn remove_all_repository_workspaces(builder: &WorkersBuilder, tls: Option<ClientTlsConfig>) {
    let Ok(branch) = builder.spec.worktree_branch() else {
        tracing::warn!("skipping workspace teardown: malformed refspec");
        return;
    };
    let relative_path = format!("../{}-{}", builder.spec.repo_name, branch);
    let repo_dir = builder.spec.repo_dir();

    let tasks = builder.endpoints.iter().map(|endpoint| {
        let endpoint = endpoint.clone();
        let repo_dir = repo_dir.clone();
        let relative_path = relative_path.clone();
        let tls = tls.clone();
        tokio::spawn(async move {
            let result = crate::grpc::WorkerClient::dial(&endpoint, tls.as_ref()).await;
            match result {
                Ok(mut client) => {
                    let resp = client
                        .repository
                        .remove_work_tree(RemoveWorkTreeRequest {
                            repo_dir,
                            relative_path,
                        })
                        .await;
                    if let Err(e) = resp {
                        tracing::warn!(endpoint = %endpoint.name, error = %e, "remove_work_tree rpc failed");
                    }
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint.name, error = %e, "dial failed during teardown");
                }
            }
        })
    });

    for task in tasks {
        let _ = task.await;
    }
}

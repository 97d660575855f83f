//! GitHub webhook HTTP endpoint (spec 6).
//!
//! Ported from `original_source/internal/orchestrator/controller/handler.go`
//! + `routes.go` (event-type check, payload unmarshal, refspec synthesis,
//! Worker-Builder → Task Executor → teardown sequence, always-200 once
//! parsing succeeded) and the payload shape from
//! `original_source/internal/producer/provider/github/types.go`, built on
//! `axum`/`tower-http` rather than `fiber` (spec 1's ambient-stack
//! justification; see SPEC_FULL.md).

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use serde::Deserialize;
use tonic::transport::ClientTlsConfig;

use crate::config::ValidatedConfig;
use crate::executor;
use crate::sync::{self, BuildSpec, WorkersBuilder};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ValidatedConfig>,
    pub tls: Option<ClientTlsConfig>,
    pub mq_uri: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/github/webhook", post(handle_webhook))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    number: u64,
    pull_request: PullRequest,
    repository: Repository,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    id: u64,
    head: Branch,
}

#[derive(Debug, Deserialize)]
struct Branch {
    #[serde(rename = "ref")]
    branch_ref: String,
    repo: Repo,
}

#[derive(Debug, Deserialize)]
struct Repo {
    clone_url: String,
}

#[derive(Debug, Deserialize)]
struct Repository {
    name: String,
}

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> StatusCode {
    let event = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if event != "pull_request" {
        tracing::warn!(event, "rejecting non-pull_request webhook event");
        return StatusCode::BAD_REQUEST;
    }

    let payload: PullRequestPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse webhook payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    run_pipeline(&state, payload).await;
    StatusCode::OK
}

async fn run_pipeline(state: &AppState, payload: PullRequestPayload) {
    let refspec = format!("pull/{}/head:pr-{}", payload.number, payload.pull_request.id);

    let spec = BuildSpec {
        run_id: format!("pr-{}", payload.pull_request.id),
        clone_url: payload.pull_request.head.repo.clone_url,
        repo_name: payload.repository.name,
        remote_name: "origin".to_string(),
        branch_name: payload.pull_request.head.branch_ref,
        refspec,
        auth_token: state
            .config
            .provider
            .auth
            .as_ref()
            .map(|a| a.token.clone()),
        build_steps: state.config.build.steps.clone(),
        build_path: crate::default_build_path().to_string_lossy().into_owned(),
    };

    let mut builder = WorkersBuilder::new(spec, state.config.endpoints.clone());
    let outputs = sync::build_all_endpoints(&mut builder, state.tls.clone()).await;
    tracing::info!(count = outputs.len(), "build fan-out complete");
    for output in &outputs {
        match &output.error {
            Some(e) => tracing::warn!(endpoint = %output.endpoint, error = %e, "build failed"),
            None => tracing::info!(endpoint = %output.endpoint, "build succeeded"),
        }
    }

    let worktree_name = match builder.spec.worktree_branch() {
        Ok(branch) => format!("{}-{}", builder.spec.repo_name, branch),
        Err(e) => {
            tracing::error!(error = %e, "cannot derive worktree name, skipping tasks");
            sync::remove_all_repository_workspaces(&builder, state.tls.clone()).await;
            return;
        }
    };

    for task in &state.config.tasks {
        tracing::info!(task = %task.name, "running task");
        let (task_state, result) = executor::run_task(
            task,
            &builder.endpoints,
            &builder.spec.build_path,
            &worktree_name,
            &state.mq_uri,
            state.tls.clone(),
        )
        .await;
        tracing::info!(
            task = %task.name,
            state = ?task_state,
            outputs = result.outputs.len(),
            errors = result.errors.len(),
            "task finished"
        );
    }

    sync::remove_all_repository_workspaces(&builder, state.tls.clone()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_decodes_refspec_fields() {
        let body = br#"{
            "action": "opened",
            "number": 6,
            "pull_request": {"id": 42, "head": {"ref": "feature-x", "repo": {"clone_url": "https://github.com/octocat/hello-world"}}},
            "repository": {"name": "hello-world"}
        }"#;
        let payload: PullRequestPayload = serde_json::from_slice(body).unwrap();
        assert_eq!(payload.number, 6);
        assert_eq!(payload.pull_request.id, 42);
        assert_eq!(payload.pull_request.head.branch_ref, "feature-x");
        assert_eq!(payload.repository.name, "hello-world");
    }
}

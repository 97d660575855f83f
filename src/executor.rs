//! Task Executor: per-task file resolution, endpoint fan-out over the
//! broker's command queue, and result collection (spec 4.5).
//!
//! The distribution protocol has no teacher analog (worktrunk has no
//! broker); the generate-dispatch-collect shape is grounded in
//! `original_source/internal/sync/executor.go`'s wait-group/channel
//! pattern, re-expressed with `tokio::spawn` and `tokio_util`'s
//! `CancellationToken`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::transport::ClientTlsConfig;

use crate::broker::{
    BrokerHandle, CMD_QUEUE, ERROR_CONSUMER_TAG, ERROR_QUEUE, EXCHANGE, OUTPUT_CONSUMER_TAG,
    OUTPUT_QUEUE, ROUTE_CMD_QUEUE,
};
use crate::config::{EndpointInfo, FileSelector, TaskConfig};
use crate::grpc::WorkerClient;
use crate::proto::consumer_command_response::Payload;
use crate::proto::{FindFilesRequest, StartConsumerRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Starting,
    Running,
    Completed,
    CompletedWithErrors,
    Error,
}

#[derive(Debug, Default)]
pub struct TaskResult {
    pub outputs: Vec<String>,
    pub errors: Vec<String>,
}

/// Resolve a task's `runs_on` names against the global endpoint list,
/// silently dropping names that don't match any configured endpoint.
pub fn resolve_fanout_set<'a>(task: &TaskConfig, endpoints: &'a [EndpointInfo]) -> Vec<&'a EndpointInfo> {
    task.runs_on
        .iter()
        .filter_map(|name| endpoints.iter().find(|e| &e.name == name))
        .collect()
}

/// Resolve a task's file list: explicit files are prefixed with
/// `<build_path>/<worktree_name>/`; a pattern is resolved against the
/// first target endpoint's File Extractor.
pub async fn resolve_files(
    task: &TaskConfig,
    build_path: &str,
    worktree_name: &str,
    first_endpoint: &EndpointInfo,
    tls: Option<&ClientTlsConfig>,
) -> Result<Vec<String>, String> {
    match task.file_selector() {
        FileSelector::Explicit(files) => Ok(files
            .iter()
            .map(|f| format!("{build_path}/{worktree_name}/{f}"))
            .collect()),
        FileSelector::Pattern(pattern) => {
            let mut client = WorkerClient::dial(first_endpoint, tls)
                .await
                .map_err(|e| format!("dial {}: {e}", first_endpoint.name))?;
            let resp = client
                .file_extractor
                .find_files(FindFilesRequest {
                    root_dir: format!("{build_path}/{worktree_name}"),
                    pattern: pattern.to_string(),
                })
                .await
                .map_err(|e| format!("find_files rpc error: {e}"))?
                .into_inner();
            Ok(resp.absolute_paths)
        }
    }
}

/// Cartesian join of `task.cmd` × `files`, commands-outer/files-inner,
/// substituting every literal `{file}` occurrence.
pub fn expand_commands(task: &TaskConfig, files: &[String]) -> Vec<String> {
    let mut expanded = Vec::with_capacity(task.cmd.len() * files.len());
    for cmd in &task.cmd {
        for file in files {
            expanded.push(cmd.replace("{file}", file));
        }
    }
    expanded
}

/// Drive one task's distribution protocol and result collection.
pub async fn run_task(
    task: &TaskConfig,
    endpoints: &[EndpointInfo],
    build_path: &str,
    worktree_name: &str,
    mq_uri: &str,
    tls: Option<ClientTlsConfig>,
) -> (ExecutorState, TaskResult) {
    let targets = resolve_fanout_set(task, endpoints);
    let Some(first) = targets.first() else {
        return (ExecutorState::Error, TaskResult::default());
    };

    let files = match resolve_files(task, build_path, worktree_name, first, tls.as_ref()).await {
        Ok(files) => files,
        Err(e) => {
            tracing::error!(task = %task.name, error = %e, "file resolution failed");
            return (ExecutorState::Error, TaskResult::default());
        }
    };
    let commands = expand_commands(task, &files);
    if commands.is_empty() {
        return (ExecutorState::Completed, TaskResult::default());
    }

    // Step 2+3: open one broker-consumer RPC stream per target endpoint,
    // in parallel; the call returning successfully IS readiness.
    let opens = targets.iter().map(|endpoint| {
        let endpoint = (*endpoint).clone();
        let tls = tls.clone();
        let mq_uri = mq_uri.to_string();
        tokio::spawn(async move {
            let mut client = WorkerClient::dial(&endpoint, tls.as_ref()).await?;
            let request = StartConsumerRequest {
                broker_url: mq_uri.clone(),
                exchange: EXCHANGE.to_string(),
                queue_routing_keys: [(CMD_QUEUE.to_string(), ROUTE_CMD_QUEUE.to_string())].into(),
                consumer_tag: endpoint.name.clone(),
            };
            let stream = client
                .broker_consumer
                .start_consumer(request)
                .await
                .map_err(crate::error::RpcError::from)?;
            Ok::<_, crate::error::RpcError>(stream.into_inner())
        })
    });

    let mut ready_streams = Vec::new();
    for open in opens {
        match open.await {
            Ok(Ok(stream)) => ready_streams.push(stream),
            Ok(Err(e)) => tracing::warn!(error = %e, "consumer stream failed to open"),
            Err(e) => tracing::warn!(error = %e, "consumer-open task panicked"),
        }
    }
    if ready_streams.is_empty() {
        return (ExecutorState::Error, TaskResult::default());
    }

    // Step 4: settle, then publish every expanded command via a pooled
    // Publisher.
    let broker = match BrokerHandle::connect(mq_uri).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "executor broker connect failed");
            return (ExecutorState::Error, TaskResult::default());
        }
    };

    tokio::time::sleep(crate::broker::CONSUMER_SETTLE_DELAY).await;

    for command in &commands {
        if let Err(e) = broker.publisher.publish(ROUTE_CMD_QUEUE, command.as_bytes()).await {
            tracing::error!(error = %e, "publish failed, aborting task");
            return (ExecutorState::Error, TaskResult::default());
        }
    }

    // Step 5+6: maintain a completion count across all consumer streams,
    // cancelling once every published command has been accounted for.
    let pending = Arc::new(AtomicUsize::new(commands.len()));
    let cancel = CancellationToken::new();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<()>();

    for mut stream in ready_streams {
        let pending = pending.clone();
        let cancel = cancel.clone();
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    next = stream.message() => {
                        match next {
                            Ok(Some(resp)) => match resp.payload {
                                Some(Payload::Output(_)) | Some(Payload::Error(_)) => {
                                    pending.fetch_sub(1, Ordering::SeqCst);
                                    let _ = event_tx.send(());
                                }
                                Some(Payload::Finished(_)) | None => return,
                            },
                            Ok(None) => return,
                            Err(e) => {
                                tracing::warn!(error = %e, "consumer stream error");
                                return;
                            }
                        }
                    }
                }
            }
        });
    }
    drop(event_tx);

    while pending.load(Ordering::SeqCst) > 0 {
        if event_rx.recv().await.is_none() {
            break;
        }
    }
    cancel.cancel();

    // Result collection: drain output-queue/error-queue until every
    // published command's outcome has been observed.
    let target_count = commands.len();
    let drain_cancel = CancellationToken::new();
    let output_rx = broker
        .consumer
        .drain_stream(OUTPUT_QUEUE, OUTPUT_CONSUMER_TAG, drain_cancel.clone())
        .await;
    let error_rx = broker
        .consumer
        .drain_stream(ERROR_QUEUE, ERROR_CONSUMER_TAG, drain_cancel.clone())
        .await;

    let (mut output_rx, mut error_rx) = match (output_rx, error_rx) {
        (Ok(o), Ok(e)) => (o, e),
        _ => {
            tracing::error!("result-collection drain failed to start");
            return (ExecutorState::Error, TaskResult::default());
        }
    };

    let mut result = TaskResult::default();
    while result.outputs.len() + result.errors.len() < target_count {
        tokio::select! {
            Some(body) = output_rx.recv() => result.outputs.push(body),
            Some(body) = error_rx.recv() => result.errors.push(body),
            else => break,
        }
    }
    drain_cancel.cancel();

    let state = if !result.errors.is_empty() {
        ExecutorState::CompletedWithErrors
    } else {
        ExecutorState::Completed
    };

    (state, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskConfig;

    fn task(files: Option<Vec<String>>, pattern: Option<String>, cmd: Vec<&str>) -> TaskConfig {
        TaskConfig {
            name: "test".to_string(),
            runs_on: vec!["w1".to_string()],
            parallel: true,
            cmd: cmd.into_iter().map(String::from).collect(),
            depends_on: vec![],
            pattern,
            files,
        }
    }

    #[test]
    fn expand_commands_is_commands_outer_files_inner() {
        let t = task(
            Some(vec!["a.rs".to_string(), "b.rs".to_string()]),
            None,
            vec!["lint {file}", "test {file}"],
        );
        let files = vec!["/build/a.rs".to_string(), "/build/b.rs".to_string()];
        let expanded = expand_commands(&t, &files);
        assert_eq!(
            expanded,
            vec![
                "lint /build/a.rs",
                "lint /build/b.rs",
                "test /build/a.rs",
                "test /build/b.rs",
            ]
        );
    }

    #[test]
    fn resolve_fanout_set_drops_unknown_names() {
        let endpoints = vec![
            EndpointInfo {
                name: "w1".to_string(),
                host: "h1".to_string(),
                port: 8918,
                user: "ci".to_string(),
                private_key_path: "/tmp/k".into(),
            },
        ];
        let t = task(Some(vec![]), None, vec!["echo {file}"]);
        let mut t = t;
        t.runs_on = vec!["w1".to_string(), "missing".to_string()];
        let fanout = resolve_fanout_set(&t, &endpoints);
        assert_eq!(fanout.len(), 1);
        assert_eq!(fanout[0].name, "w1");
    }
}

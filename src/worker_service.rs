//! Worker-side gRPC service implementations: Repository Provider, Broker
//! Consumer, File Extractor (spec 4.1, 4.2, 4.5).
//!
//! Grounded in the teacher's `src/git/repository/worktrees.rs`
//! (`git worktree add`/`remove` over subprocess calls) for the worktree
//! operations, and in `original_source/pkg/grpc`'s server-registration
//! shape for how the three services share one process-wide broker
//! connection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use crate::broker::{BrokerHandle, ConsumeEvent};
use crate::metadata::{self, BuildMetadata, RepositorySection, StateSection};
use crate::proto::broker_consumer_server::BrokerConsumer;
use crate::proto::file_extractor_server::FileExtractor;
use crate::proto::repository_provider_server::RepositoryProvider;
use crate::proto::{
    CloneRequest, ConsumerCommandResponse, CreateWorkTreeRequest, FetchRequest,
    FindFilesRequest, FindFilesResponse, RemoveWorkTreeRequest, RunShellRequest,
    StartConsumerRequest, SyncResponse, consumer_command_response::Payload,
};
use crate::sync::shell;

/// Root directory new clones and worktrees are materialized under on this
/// worker. Requests always carry absolute paths derived from it, but the
/// server trusts the caller (single-orchestrator trust model, spec 4.2).
#[derive(Clone)]
pub struct WorkerServices {
    broker: Arc<BrokerHandle>,
}

impl WorkerServices {
    pub fn new(broker: Arc<BrokerHandle>) -> Self {
        Self { broker }
    }
}

fn ok(output: String) -> Response<SyncResponse> {
    Response::new(SyncResponse {
        output,
        error: String::new(),
    })
}

fn failed(error: String) -> Response<SyncResponse> {
    Response::new(SyncResponse {
        output: String::new(),
        error,
    })
}

/// Record fresh metadata at `repo_dir`, preserving `cloned_at` across
/// fetches when prior metadata exists.
fn refresh_metadata(repo_dir: &Path, name: &str, source: &str, version: &str) -> Result<(), String> {
    let checksum = metadata::compute_checksum(repo_dir).map_err(|e| e.to_string())?;
    let cloned_at = metadata::read_metadata(repo_dir)
        .ok()
        .flatten()
        .map(|m| m.state.cloned_at)
        .unwrap_or_else(Utc::now);

    let fresh = BuildMetadata {
        repository: RepositorySection {
            name: name.to_string(),
            source: source.to_string(),
            version: version.to_string(),
        },
        state: StateSection {
            cloned_at,
            last_build: Utc::now(),
            checksum,
        },
    };
    metadata::write_metadata(repo_dir, &fresh).map_err(|e| e.to_string())
}

fn repo_name(target_dir: &str) -> String {
    Path::new(target_dir)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| target_dir.to_string())
}

#[tonic::async_trait]
impl RepositoryProvider for WorkerServices {
    async fn clone(
        &self,
        request: Request<CloneRequest>,
    ) -> Result<Response<SyncResponse>, Status> {
        let req = request.into_inner();
        let target = PathBuf::from(&req.target_dir);
        let parent = target.parent().unwrap_or(Path::new("."));

        let mut clone_url = req.clone_url.clone();
        if !req.auth_token.is_empty() {
            if let Some(stripped) = clone_url.strip_prefix("https://") {
                clone_url = format!("https://x-access-token:{}@{stripped}", req.auth_token);
            }
        }

        let shell_line = format!(
            "git clone --single-branch --depth 1 --branch {} -- {} {}",
            shell::quote(&req.branch),
            shell::quote(&clone_url),
            shell::quote(&req.target_dir),
        );
        let output = match shell::run(parent, &shell_line).await {
            Ok(out) if out.status.success() => shell::combined_output(&out),
            Ok(out) => return Ok(failed(shell::combined_output(&out))),
            Err(e) => return Ok(failed(e.to_string())),
        };

        let name = repo_name(&req.target_dir);
        if let Err(e) = refresh_metadata(&target, &name, &req.clone_url, &req.branch) {
            return Ok(failed(e));
        }

        Ok(ok(output))
    }

    async fn fetch(
        &self,
        request: Request<FetchRequest>,
    ) -> Result<Response<SyncResponse>, Status> {
        let req = request.into_inner();
        let repo_dir = PathBuf::from(&req.repo_dir);

        let shell_line = format!(
            "git fetch {} {}",
            shell::quote(&req.remote_name),
            shell::quote(&format!("+{}", req.refspec)),
        );
        let output = match shell::run(&repo_dir, &shell_line).await {
            Ok(out) if out.status.success() => shell::combined_output(&out),
            Ok(out) => return Ok(failed(shell::combined_output(&out))),
            Err(e) => return Ok(failed(e.to_string())),
        };

        let name = repo_name(&req.repo_dir);
        if let Err(e) = refresh_metadata(&repo_dir, &name, &req.remote_name, &req.refspec) {
            return Ok(failed(e));
        }

        Ok(ok(output))
    }

    async fn create_work_tree(
        &self,
        request: Request<CreateWorkTreeRequest>,
    ) -> Result<Response<SyncResponse>, Status> {
        let req = request.into_inner();
        let shell_line = format!(
            "git worktree add {} {}",
            shell::quote(&req.relative_path),
            shell::quote(&req.branch),
        );
        match shell::run(Path::new(&req.repo_dir), &shell_line).await {
            Ok(out) if out.status.success() => Ok(ok(shell::combined_output(&out))),
            Ok(out) => Ok(failed(shell::combined_output(&out))),
            Err(e) => Ok(failed(e.to_string())),
        }
    }

    async fn remove_work_tree(
        &self,
        request: Request<RemoveWorkTreeRequest>,
    ) -> Result<Response<SyncResponse>, Status> {
        let req = request.into_inner();
        let shell_line = format!("git worktree remove {}", shell::quote(&req.relative_path));
        match shell::run(Path::new(&req.repo_dir), &shell_line).await {
            Ok(out) if out.status.success() => Ok(ok(shell::combined_output(&out))),
            Ok(out) => Ok(failed(shell::combined_output(&out))),
            Err(e) => Ok(failed(e.to_string())),
        }
    }

    async fn run_shell(
        &self,
        request: Request<RunShellRequest>,
    ) -> Result<Response<SyncResponse>, Status> {
        let req = request.into_inner();
        match shell::run(Path::new(&req.working_dir), &req.shell_line).await {
            Ok(out) if out.status.success() => Ok(ok(shell::combined_output(&out))),
            Ok(out) => Ok(failed(shell::combined_output(&out))),
            Err(e) => Ok(failed(e.to_string())),
        }
    }
}

#[tonic::async_trait]
impl BrokerConsumer for WorkerServices {
    type StartConsumerStream = UnboundedReceiverStream<Result<ConsumerCommandResponse, Status>>;

    async fn start_consumer(
        &self,
        request: Request<StartConsumerRequest>,
    ) -> Result<Response<Self::StartConsumerStream>, Status> {
        let req = request.into_inner();

        let handler: crate::broker::CommandHandler = Arc::new(|body: String| {
            Box::pin(async move {
                let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                match shell::run(&working_dir, &body).await {
                    Ok(out) if out.status.success() => Some(Ok(shell::combined_output(&out))),
                    Ok(out) => Some(Err(shell::combined_output(&out))),
                    Err(_) => None,
                }
            })
        });

        let cancel = CancellationToken::new();
        let events = self
            .broker
            .consumer
            .clone()
            .consume_commands_streaming(req.consumer_tag, handler, self.broker.publisher.clone(), cancel)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut events = events;
            while let Some(event) = events.recv().await {
                let payload = match event {
                    ConsumeEvent::Output(s) => Payload::Output(s),
                    ConsumeEvent::Error(s) => Payload::Error(s),
                    ConsumeEvent::Finished => Payload::Finished(true),
                };
                if tx
                    .send(Ok(ConsumerCommandResponse {
                        payload: Some(payload),
                    }))
                    .is_err()
                {
                    return;
                }
            }
        });

        Ok(Response::new(UnboundedReceiverStream::new(rx)))
    }
}

#[tonic::async_trait]
impl FileExtractor for WorkerServices {
    async fn find_files(
        &self,
        request: Request<FindFilesRequest>,
    ) -> Result<Response<FindFilesResponse>, Status> {
        let req = request.into_inner();
        let re = regex::Regex::new(&req.pattern)
            .map_err(|e| Status::invalid_argument(format!("bad pattern: {e}")))?;

        let root = PathBuf::from(&req.root_dir);
        let mut matches = Vec::new();
        walk(&root, &root, &re, &mut matches);

        Ok(Response::new(FindFilesResponse {
            absolute_paths: matches,
        }))
    }
}

fn walk(root: &Path, dir: &Path, pattern: &regex::Regex, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
                continue;
            }
            walk(root, &path, pattern, out);
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        if pattern.is_match(&relative.to_string_lossy()) {
            out.push(path.to_string_lossy().into_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_matches_files_by_regex_ignoring_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["example_test.go", "diff_test.go", "another_test.go", "main.go"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let re = regex::Regex::new(".+_test.go").unwrap();
        let mut matches = Vec::new();
        walk(dir.path(), dir.path(), &re, &mut matches);

        let mut names: Vec<_> = matches
            .iter()
            .map(|p| Path::new(p).file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["another_test.go", "diff_test.go", "example_test.go"]
        );
    }

    #[test]
    fn walk_skips_git_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("ignored_test.go"), b"").unwrap();
        std::fs::write(dir.path().join("kept_test.go"), b"").unwrap();

        let re = regex::Regex::new(".+_test.go").unwrap();
        let mut matches = Vec::new();
        walk(dir.path(), dir.path(), &re, &mut matches);

        assert_eq!(matches.len(), 1);
        assert!(matches[0].ends_with("kept_test.go"));
    }
}

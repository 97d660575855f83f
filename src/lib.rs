//! Distributed CI orchestration.
//!
//! ConflowCI materializes an isolated build workspace on every configured
//! worker machine in response to a pull-request event, runs a pipeline's
//! build steps and tasks against that workspace, and collects outputs back
//! to the orchestrator through a non-durable AMQP broker.
//!
//! The library is split the way the two binaries in `src/bin/` use it:
//! orchestrator-side logic (`config`, `sync`, `executor`, `webhook`) and
//! worker-side logic (`worker_service`), with `grpc`, `broker`, `metadata`,
//! `crypto`, `error` and `trace` shared by both.

pub mod broker;
pub mod config;
pub mod crypto;
pub mod error;
pub mod executor;
pub mod grpc;
pub mod metadata;
pub mod sync;
pub mod trace;
pub mod webhook;
pub mod worker_service;

/// Generated protobuf types and service stubs.
pub mod proto {
    tonic::include_proto!("conflowci");
}

/// Default root directory on each worker where repos and worktrees live.
pub fn default_build_path() -> std::path::PathBuf {
    home::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("conflowci")
        .join("build")
}

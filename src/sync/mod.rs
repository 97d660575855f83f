//! Worker-Builder: per-endpoint sync/build driver plus the fan-out
//! aggregate that runs it across every configured endpoint (spec 3, 4.3).

mod builder;
pub mod shell;
mod sync;
pub mod types;

pub use builder::{build_all_endpoints, remove_all_repository_workspaces};
pub use sync::sync_and_build;
pub use types::{BuildSpec, BuilderState, WorkerBuildOutput, WorkersBuilder};

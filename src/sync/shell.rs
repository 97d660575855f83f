//! Async shell execution on the worker.
//!
//! Adapted from the teacher crate's `shell_exec::run` (timing + debug
//! logging around every external command) but `tokio::process::Command`
//! based and Unix-only, since spec 1's Non-goals rule out Windows
//! workers.

use std::path::Path;
use std::process::Output;
use std::time::Instant;

use tokio::process::Command;

/// Run `shell_line` as `sh -c <shell_line>` with its working directory set
/// to `working_dir`, logging the command and its timing the way the
/// teacher's `shell_exec::run` does.
pub async fn run(working_dir: &Path, shell_line: &str) -> std::io::Result<Output> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(shell_line).current_dir(working_dir);

    tracing::debug!(shell_line, dir = %working_dir.display(), "$ sh -c");

    let t0 = Instant::now();
    let result = cmd.output().await;
    let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;

    match &result {
        Ok(output) => tracing::debug!(
            shell_line,
            dur_ms = duration_ms,
            ok = output.status.success(),
            "command finished"
        ),
        Err(e) => tracing::warn!(shell_line, dur_ms = duration_ms, error = %e, "command failed to spawn"),
    }

    result
}

/// Combine stdout+stderr the way the Repository Provider's `RunShell`
/// response does: stdout first, then stderr, both lossily decoded.
pub fn combined_output(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

/// Shell-escape `value` for safe interpolation into a `sh -c` line.
pub fn quote(value: &str) -> String {
    shell_escape::escape(std::borrow::Cow::Borrowed(value)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_simple_command() {
        let dir = tempfile::tempdir().unwrap();
        let output = run(dir.path(), "echo hello").await.unwrap();
        assert!(output.status.success());
        assert!(combined_output(&output).contains("hello"));
    }

    #[tokio::test]
    async fn captures_stderr_in_combined_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = run(dir.path(), "echo err 1>&2").await.unwrap();
        assert!(combined_output(&output).contains("err"));
    }
}

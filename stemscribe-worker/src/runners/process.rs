//! Subprocess execution with a hard time limit

use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

use super::StageError;

/// Longest stderr excerpt carried into an error message
const STDERR_EXCERPT_CHARS: usize = 2000;

/// Run `program args...` to completion, killing it after `timeout`
///
/// - spawn failure → `EngineUnavailable`
/// - time limit hit → `Timeout` (child is killed on drop)
/// - non-zero exit → `NonZeroExit` with the tail of stderr
pub async fn run_engine(
    engine: &str,
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<Output, StageError> {
    tracing::debug!(engine, program, ?args, "Spawning engine");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| StageError::EngineUnavailable {
            engine: engine.to_string(),
            reason: if e.kind() == std::io::ErrorKind::NotFound {
                format!("'{}' not found in PATH", program)
            } else {
                e.to_string()
            },
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(StageError::NonZeroExit {
                engine: engine.to_string(),
                code: None,
                detail: format!("failed waiting for process: {}", e),
            })
        }
        // Dropping the wait future drops the child, and kill_on_drop reaps it
        Err(_) => {
            return Err(StageError::Timeout {
                engine: engine.to_string(),
                timeout_secs: timeout.as_secs(),
            })
        }
    };

    if !output.status.success() {
        return Err(StageError::NonZeroExit {
            engine: engine.to_string(),
            code: output.status.code(),
            detail: stderr_excerpt(&output.stderr),
        });
    }

    Ok(output)
}

/// Tail of stderr, trimmed to a readable size
fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return "no stderr output".to_string();
    }
    let count = text.chars().count();
    if count <= STDERR_EXCERPT_CHARS {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - STDERR_EXCERPT_CHARS).collect();
    format!("...{}", tail)
}

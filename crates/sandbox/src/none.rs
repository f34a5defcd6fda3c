//! `SandboxKind::None` backend: `exec` falls back to direct host execution,
//! gated by the Security Gate (spec §4.4, §4.5).

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use autoforge_core::{AppError, AppResult, ExecOutcome};
use tokio::process::Command;
use tokio::time::timeout;

pub async fn exec(command: &str, cwd: &Path, wall: Duration) -> AppResult<ExecOutcome> {
    if let autoforge_security::Verdict::Deny { reason } = autoforge_security::check(command) {
        return Err(AppError::security_denied(reason));
    }

    let mut child = Command::new("sh")
        .args(["-c", command])
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AppError::internal(format!("failed to spawn host command: {e}")))?;

    match timeout(wall, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ExecOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(AppError::internal(format!("host exec failed: {e}"))),
        Err(_) => Ok(ExecOutcome {
            stdout: String::new(),
            stderr: format!("command timed out after {:?}", wall),
            exit_code: -1,
            timed_out: true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn denies_blocked_command_without_spawning() {
        let err = exec("sudo rm -rf /", Path::new("."), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SecurityDenied(_)));
    }

    #[tokio::test]
    async fn allows_and_runs_ordinary_command() {
        let outcome = exec("echo hi", Path::new("."), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.stdout.trim(), "hi");
        assert!(outcome.success());
    }

    #[tokio::test]
    async fn enforces_wall_clock_timeout() {
        let outcome = exec("sleep 5", Path::new("."), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(outcome.timed_out);
    }
}

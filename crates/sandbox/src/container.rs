//! Container backend: shells out to a docker-compatible CLI (`docker` or
//! `podman`, configurable) to provision, run commands in, and tear down
//! per-project containers.
//!
//! Canonical in-sandbox mount path for the bind-mounted workspace.
pub const MOUNT_PATH: &str = "/workspace";

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use autoforge_core::{AppError, AppResult, ExecOutcome};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use autoforge_core::SandboxPolicy;

fn container_name(runtime_project_prefix: &str, project_id: &str) -> String {
    format!("{runtime_project_prefix}-{project_id}")
}

pub fn name_for(project_id: &str) -> String {
    container_name("project", project_id)
}

/// `docker inspect -f {{.State.Running}} <name>` — true if a container by
/// that name exists and is running.
pub async fn is_healthy(runtime_bin: &str, name: &str) -> bool {
    let output = Command::new(runtime_bin)
        .args(["inspect", "-f", "{{.State.Running}}", name])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            String::from_utf8_lossy(&out.stdout).trim() == "true"
        }
        _ => false,
    }
}

/// Create a fresh container: bind-mount the workspace, apply resource caps,
/// and run a long-lived idle process so `docker exec` has a target.
pub async fn create(
    runtime_bin: &str,
    name: &str,
    workspace_path: &Path,
    policy: &SandboxPolicy,
) -> AppResult<()> {
    let mount_arg = format!("{}:{}", workspace_path.display(), MOUNT_PATH);
    let memory_arg = format!("{}m", policy.memory_mb);
    let cpu_arg = format!("{}", policy.cpu_limit);

    let status = Command::new(runtime_bin)
        .args([
            "run",
            "-d",
            "--name",
            name,
            "-v",
            &mount_arg,
            "-w",
            MOUNT_PATH,
            "--memory",
            &memory_arg,
            "--cpus",
            &cpu_arg,
            &policy.image,
            "sleep",
            "infinity",
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| AppError::sandbox_unavailable(format!("failed to spawn {runtime_bin}: {e}")))?;

    if !status.status.success() {
        return Err(AppError::sandbox_unavailable(format!(
            "{runtime_bin} run failed: {}",
            String::from_utf8_lossy(&status.stderr)
        )));
    }

    for runtime in &policy.runtimes {
        // Best-effort: setup script failures are logged, not fatal
        // (spec §4.4 "Setup script failures are logged but not fatal").
        if let Err(e) = install_runtime(runtime_bin, name, runtime).await {
            tracing::warn!(container = name, runtime, error = %e, "sandbox setup step failed");
        }
    }

    Ok(())
}

async fn install_runtime(runtime_bin: &str, name: &str, tool: &str) -> AppResult<()> {
    let probe = format!("command -v {tool} >/dev/null 2>&1");
    let out = Command::new(runtime_bin)
        .args(["exec", name, "sh", "-c", &probe])
        .output()
        .await
        .map_err(|e| AppError::sandbox_unavailable(e.to_string()))?;
    if !out.status.success() {
        tracing::info!(container = name, tool, "pre-install step would run here (no-op image)");
    }
    Ok(())
}

/// Run `command` inside the container's idle process, enforcing `wall`.
/// On timeout, kills the in-sandbox process tree by stopping the exec'd
/// process group (best-effort: the outer container keeps running).
pub async fn exec(
    runtime_bin: &str,
    name: &str,
    command: &str,
    wall: Duration,
) -> AppResult<ExecOutcome> {
    let mut child = Command::new(runtime_bin)
        .args(["exec", "-i", name, "sh", "-c", command])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AppError::sandbox_unavailable(format!("failed to exec in {name}: {e}")))?;

    match timeout(wall, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ExecOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(AppError::sandbox_unavailable(format!(
            "exec in {name} failed: {e}"
        ))),
        Err(_) => {
            // Best-effort kill of the whole exec'd process tree via pkill
            // scoped to the container; we cannot kill `child` itself since
            // it's the `docker exec` client, not the in-container process.
            let _ = Command::new(runtime_bin)
                .args(["exec", name, "sh", "-c", "kill -9 -1 2>/dev/null || true"])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            Ok(ExecOutcome {
                stdout: String::new(),
                stderr: format!("command timed out after {:?}", wall),
                exit_code: -1,
                timed_out: true,
            })
        }
    }
}

pub async fn stop(runtime_bin: &str, name: &str) -> AppResult<()> {
    let _ = Command::new(runtime_bin)
        .args(["stop", name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    Ok(())
}

pub async fn remove(runtime_bin: &str, name: &str) -> AppResult<()> {
    let _ = Command::new(runtime_bin)
        .args(["rm", "-f", name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    Ok(())
}

/// Feed a setup script's contents to `sh` inside the container over stdin.
/// Used by [`crate::manager::SandboxManager`] for project-specific
/// bootstrap beyond the policy's runtime list.
pub async fn run_script(runtime_bin: &str, name: &str, script: &str) -> AppResult<ExecOutcome> {
    let mut child = Command::new(runtime_bin)
        .args(["exec", "-i", name, "sh"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AppError::sandbox_unavailable(e.to_string()))?;

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(script.as_bytes()).await;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| AppError::sandbox_unavailable(e.to_string()))?;

    Ok(ExecOutcome {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
        timed_out: false,
    })
}

//! Global configuration (spec §9 "Global configuration", §6 "Environment").
//!
//! A single immutable value constructed once at startup and threaded
//! explicitly into every component's constructor; nothing here is a
//! process-wide singleton.

use std::time::Duration;

use autoforge_core::{AppError, AppResult, SandboxKind, SandboxPolicy};

/// Process-wide configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the sqlite database file.
    pub database_path: String,
    /// Auth token handed to the external agent transport. Opaque to the
    /// core; never logged.
    pub agent_auth_token: String,
    pub initializer_model: String,
    pub coding_model: String,
    /// Path/name of the external agent CLI the Agent Driver spawns.
    pub agent_bin: String,
    pub auto_continue_delay: Duration,
    pub default_sandbox_policy: SandboxPolicy,
    /// Agent transport buffer cap (spec §4.6 "bounded buffer, e.g. 10 MiB").
    pub agent_buffer_cap_bytes: usize,
    pub exec_timeout: Duration,
    /// Consecutive `failed` sessions before auto-chain stops (spec §7).
    pub consecutive_failure_threshold: u32,
    /// CLI path to the container runtime (`docker` or `podman`).
    pub sandbox_runtime_bin: String,
    /// How often a running session checks the Task Store for a
    /// cross-process cancellation request (spec §5 "Cancellation").
    pub cancel_poll_interval: Duration,
}

impl Config {
    /// Load configuration from the environment, applying documented
    /// defaults for everything optional.
    pub fn load() -> AppResult<Self> {
        Ok(Self {
            database_path: env_or("AUTOFORGE_DATABASE_PATH", "./autoforge.db"),
            agent_auth_token: std::env::var("AUTOFORGE_AGENT_TOKEN")
                .map_err(|_| AppError::config("AUTOFORGE_AGENT_TOKEN is not set"))?,
            initializer_model: env_or("AUTOFORGE_INITIALIZER_MODEL", "claude-opus-4"),
            coding_model: env_or("AUTOFORGE_CODING_MODEL", "claude-sonnet-4"),
            agent_bin: env_or("AUTOFORGE_AGENT_BIN", "claude"),
            auto_continue_delay: Duration::from_secs(env_parse_or(
                "AUTOFORGE_AUTO_CONTINUE_DELAY_SECS",
                5,
            )?),
            default_sandbox_policy: SandboxPolicy {
                kind: env_sandbox_kind()?,
                ..SandboxPolicy::default()
            },
            agent_buffer_cap_bytes: env_parse_or("AUTOFORGE_AGENT_BUFFER_CAP_BYTES", 10 * 1024 * 1024)?,
            exec_timeout: Duration::from_secs(env_parse_or("AUTOFORGE_EXEC_TIMEOUT_SECS", 120)?),
            consecutive_failure_threshold: env_parse_or("AUTOFORGE_FAILURE_THRESHOLD", 2)?,
            sandbox_runtime_bin: env_or("AUTOFORGE_SANDBOX_RUNTIME", "docker"),
            cancel_poll_interval: Duration::from_secs(env_parse_or("AUTOFORGE_CANCEL_POLL_SECS", 2)?),
        })
    }

    /// Configuration suitable for tests: no real agent token needed, `none`
    /// sandbox policy so tests never shell out to a container runtime.
    #[cfg(any(test, feature = "test-fixtures"))]
    pub fn for_tests() -> Self {
        Self {
            database_path: ":memory:".to_string(),
            agent_auth_token: "test-token".to_string(),
            initializer_model: "claude-opus-4".to_string(),
            coding_model: "claude-sonnet-4".to_string(),
            agent_bin: "claude".to_string(),
            auto_continue_delay: Duration::from_millis(10),
            default_sandbox_policy: SandboxPolicy {
                kind: SandboxKind::None,
                ..SandboxPolicy::default()
            },
            agent_buffer_cap_bytes: 10 * 1024 * 1024,
            exec_timeout: Duration::from_secs(5),
            consecutive_failure_threshold: 2,
            sandbox_runtime_bin: "docker".to_string(),
            cancel_poll_interval: Duration::from_millis(20),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> AppResult<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::config(format!("{key} is not a valid value"))),
        Err(_) => Ok(default),
    }
}

fn env_sandbox_kind() -> AppResult<SandboxKind> {
    match std::env::var("AUTOFORGE_SANDBOX_KIND").as_deref() {
        Ok("none") => Ok(SandboxKind::None),
        Ok("container") | Err(_) => Ok(SandboxKind::Container),
        Ok("remote_cloud") => Ok(SandboxKind::RemoteCloud),
        Ok(other) => Err(AppError::config(format!("unknown sandbox kind: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_tests_config_uses_none_sandbox() {
        let config = Config::for_tests();
        assert_eq!(config.default_sandbox_policy.kind, SandboxKind::None);
    }
}

//! Workspace layout helpers (spec §6 "Workspace layout on host").

use std::path::{Path, PathBuf};

use autoforge_core::{AppError, AppResult, SessionKind};

pub const APP_SPEC_BASENAME: &str = "app_spec";
pub const INIT_SCRIPT: &str = "init.sh";
pub const PROGRESS_NOTES: &str = "claude-progress.md";

/// ~/.autoforge, the process-wide data directory (config, default db path).
pub fn autoforge_dir() -> AppResult<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".autoforge"))
        .ok_or_else(|| AppError::config("could not determine home directory"))
}

pub fn default_database_path() -> AppResult<PathBuf> {
    Ok(autoforge_dir()?.join("autoforge.db"))
}

pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

pub fn logs_dir(workspace: &Path) -> PathBuf {
    workspace.join("logs")
}

pub fn init_script_path(workspace: &Path) -> PathBuf {
    workspace.join(INIT_SCRIPT)
}

pub fn progress_notes_path(workspace: &Path) -> PathBuf {
    workspace.join(PROGRESS_NOTES)
}

/// `app_spec.<ext>` — preserved verbatim at project creation.
pub fn app_spec_path(workspace: &Path, ext: &str) -> PathBuf {
    workspace.join(format!("{APP_SPEC_BASENAME}.{ext}"))
}

fn padded(session_number: i64) -> String {
    format!("{session_number:03}")
}

fn kind_tag(kind: SessionKind) -> &'static str {
    kind.as_str()
}

pub fn session_log_jsonl(workspace: &Path, session_number: i64, kind: SessionKind) -> PathBuf {
    logs_dir(workspace).join(format!(
        "session_{}_{}.jsonl",
        padded(session_number),
        kind_tag(kind)
    ))
}

pub fn session_log_txt(workspace: &Path, session_number: i64, kind: SessionKind) -> PathBuf {
    logs_dir(workspace).join(format!(
        "session_{}_{}.txt",
        padded(session_number),
        kind_tag(kind)
    ))
}

pub fn session_review_md(workspace: &Path, session_number: i64) -> PathBuf {
    logs_dir(workspace).join(format!("session_{}_review.md", padded(session_number)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_log_paths_are_zero_padded_to_three_digits() {
        let ws = PathBuf::from("/tmp/ws");
        assert_eq!(
            session_log_jsonl(&ws, 3, SessionKind::Coding),
            ws.join("logs/session_003_coding.jsonl")
        );
        assert_eq!(
            session_log_jsonl(&ws, 1234, SessionKind::Coding),
            ws.join("logs/session_1234_coding.jsonl")
        );
    }

    #[test]
    fn review_path_has_no_kind_suffix() {
        let ws = PathBuf::from("/tmp/ws");
        assert_eq!(
            session_review_md(&ws, 0),
            ws.join("logs/session_000_review.md")
        );
    }
}

//! Quality Analyzer (C8, spec §4.8).
//!
//! The quick path is pure derivation, already implemented in
//! `autoforge_quality_gates::quick::analyze`; this module parses a
//! session's on-disk log artifact into the records that function expects,
//! stores the result, and decides + runs the conditional deep review.

use std::path::Path;
use std::sync::Arc;

use autoforge_core::{AppResult, QualityCheckKind, SessionId, SessionKind};
use autoforge_quality_gates::{analyze, LogRecord, QuickReviewResult};

use crate::storage::{QualityCounters, QualityIssues, TaskStore};

/// Reads a session's JSONL artifact and parses each line as a
/// [`LogRecord`], skipping lines that don't parse rather than failing the
/// whole analysis on one corrupt tail line (a crash can truncate the file
/// mid-write).
pub fn load_records(jsonl_path: &Path) -> AppResult<Vec<LogRecord>> {
    let content = std::fs::read_to_string(jsonl_path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<LogRecord>(l).ok())
        .collect())
}

/// Runs the quick path against an already-loaded record set and persists
/// it as a `QualityCheck(kind=quick)` row (spec §4.7 step 6, "always run
/// the quick path synchronously").
pub async fn run_quick(store: &TaskStore, session: SessionId, records: &[LogRecord], kind: SessionKind) -> AppResult<QuickReviewResult> {
    let result = analyze(records, kind);
    store
        .attach_quality_check(
            session,
            QualityCheckKind::Quick,
            Some(result.rating),
            QualityCounters {
                tool_uses: result.tool_uses as i64,
                errors: result.errors as i64,
                browser_verifications: result.browser_automation_calls as i64,
            },
            QualityIssues {
                critical: result.critical_issues.clone(),
                warnings: result.warnings.clone(),
            },
            None,
        )
        .await?;
    Ok(result)
}

/// Whether a deep review should be scheduled for this session (spec §4.8
/// "Deep (conditional)"): every 5th session (never session 0), a weak
/// quick rating, or staleness since the last deep review.
pub fn should_run_deep(session_number: i64, quick_rating: u8, sessions_since_last_deep: i64) -> bool {
    (session_number != 0 && session_number % 5 == 0) || quick_rating < 7 || sessions_since_last_deep >= 5
}

/// Extracts a `RATING: <n>` line per the review prompt's instructed
/// format (spec §4.8 "the rating is re-extracted from that text").
fn extract_rating(review_text: &str) -> Option<u8> {
    review_text.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("RATING:")?;
        rest.trim().parse::<u8>().ok().map(|n| n.clamp(1, 10))
    })
}

/// Runs the deep review: spawns a review-kind Agent Driver invocation
/// against the session's raw log, stores the resulting text verbatim, and
/// re-extracts a rating from it, falling back to the quick rating when
/// none can be parsed (spec §4.8). Intended to run detached on a
/// background task so it never delays auto-chaining (spec §4.7 step 7,
/// §4.7 "Cancellation").
pub async fn run_deep(
    store: Arc<TaskStore>,
    session: SessionId,
    quick_rating: u8,
    quick: &QuickReviewResult,
    review_text_result: AppResult<String>,
) -> AppResult<()> {
    match review_text_result {
        Ok(review_text) => {
            let rating = extract_rating(&review_text).or(Some(quick_rating));
            store
                .attach_quality_check(
                    session,
                    QualityCheckKind::Deep,
                    rating,
                    QualityCounters {
                        tool_uses: quick.tool_uses as i64,
                        errors: quick.errors as i64,
                        browser_verifications: quick.browser_automation_calls as i64,
                    },
                    QualityIssues {
                        critical: quick.critical_issues.clone(),
                        warnings: quick.warnings.clone(),
                    },
                    Some(review_text),
                )
                .await?;
        }
        Err(err) => {
            // Errors in the background review never affect session status
            // (spec §7 "Propagation policy"); attach a distinguished issue
            // instead of propagating.
            use autoforge_quality_gates::Issue;
            store
                .attach_quality_check(
                    session,
                    QualityCheckKind::Deep,
                    Some(quick_rating),
                    QualityCounters::default(),
                    QualityIssues {
                        critical: vec![Issue::new("review_error", err.to_string())],
                        warnings: vec![],
                    },
                    None,
                )
                .await?;
        }
    }
    Ok(())
}

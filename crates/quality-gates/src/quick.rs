//! The quick review path: a pure, deterministic function from a parsed log
//! to a 1–10 rating, counters, and issue lists (spec §4.8).

use autoforge_core::SessionKind;

use crate::models::{Issue, LogRecord, QuickReviewResult};

/// Tool names counted as browser-automation calls, mirroring
/// `autoforge_core::CounterSnapshot::is_browser_tool`.
pub fn is_browser_tool_name(name: &str) -> bool {
    name.starts_with("browser_") || name == "navigate" || name == "screenshot"
}

/// How many of the preceding events a passing test-result update is
/// searched for a browser-verification call against the same task
/// (spec §4.8 "whose preceding 10 events contain at least one
/// browser-automation tool use targeting the same task").
const VERIFICATION_LOOKBACK: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorRateBucket {
    Low,      // < 2%
    Medium,   // 2-5%
    High,     // 5-10%
    Critical, // > 10%
}

fn bucket_error_rate(rate: f64) -> ErrorRateBucket {
    if rate < 0.02 {
        ErrorRateBucket::Low
    } else if rate < 0.05 {
        ErrorRateBucket::Medium
    } else if rate < 0.10 {
        ErrorRateBucket::High
    } else {
        ErrorRateBucket::Critical
    }
}

fn error_rate_score(bucket: ErrorRateBucket) -> u8 {
    match bucket {
        ErrorRateBucket::Low => 4,
        ErrorRateBucket::Medium => 3,
        ErrorRateBucket::High => 1,
        ErrorRateBucket::Critical => 0,
    }
}

/// Whether any passing `update_test_result` event in `records` has a
/// same-task browser-automation call among its preceding
/// [`VERIFICATION_LOOKBACK`] events.
fn has_verification_before_completion(records: &[LogRecord]) -> bool {
    for (idx, record) in records.iter().enumerate() {
        if !record.is_passing_test_update() {
            continue;
        }
        let target_task = record.task_id();
        let lookback_start = idx.saturating_sub(VERIFICATION_LOOKBACK);
        let found = records[lookback_start..idx].iter().any(|prior| {
            prior.is_browser_tool()
                && match (target_task, prior.task_id()) {
                    (Some(t), Some(p)) => t == p,
                    // Be lenient when either side omits a task id: a
                    // browser call with no task context still counts as
                    // a verification signal for the session.
                    _ => true,
                }
        });
        if found {
            return true;
        }
    }
    false
}

/// Derive the quick `QualityCheck` payload for one session's parsed log.
///
/// Pure and deterministic: re-running on an unchanged `records` slice
/// yields a byte-identical (serialized) result (spec §8 invariant 6).
pub fn analyze(records: &[LogRecord], session_kind: SessionKind) -> QuickReviewResult {
    let tool_uses: u64 = records.iter().filter(|r| r.event == "tool_use").count() as u64;
    let errors: u64 = records
        .iter()
        .filter(|r| r.event == "error" || (r.event == "tool_result" && r.is_error == Some(true)))
        .count() as u64;
    let error_rate = if tool_uses == 0 {
        0.0
    } else {
        errors as f64 / tool_uses as f64
    };
    let browser_automation_calls = records.iter().filter(|r| r.is_browser_tool()).count() as u64;
    let screenshot_calls = records.iter().filter(|r| r.is_screenshot_tool()).count() as u64;
    let has_verification = has_verification_before_completion(records);

    let mut critical_issues = Vec::new();
    let mut warnings = Vec::new();

    let browser_score: u8 = match session_kind {
        SessionKind::Initializer => 4, // exempt
        _ => {
            if browser_automation_calls == 0 {
                critical_issues.push(Issue::new(
                    "no-browser-verification",
                    "session completed with zero browser-automation calls",
                ));
                0
            } else {
                4
            }
        }
    };

    let bucket = bucket_error_rate(error_rate);
    let error_score = error_rate_score(bucket);
    match bucket {
        ErrorRateBucket::Critical => critical_issues.push(Issue::new(
            "high-error-rate",
            format!("error rate {:.1}% exceeds 10%", error_rate * 100.0),
        )),
        ErrorRateBucket::High => warnings.push(Issue::new(
            "elevated-error-rate",
            format!("error rate {:.1}% is between 5% and 10%", error_rate * 100.0),
        )),
        ErrorRateBucket::Medium => warnings.push(Issue::new(
            "elevated-error-rate",
            format!("error rate {:.1}% is between 2% and 5%", error_rate * 100.0),
        )),
        ErrorRateBucket::Low => {}
    }

    let has_any_passing_test = records.iter().any(|r| r.is_passing_test_update());
    let verification_score: u8 = if has_verification {
        2
    } else {
        if has_any_passing_test {
            warnings.push(Issue::new(
                "no-pre-completion-verification",
                "a test was marked pass with no browser-verification call in the preceding events",
            ));
        }
        0
    };

    let raw_score = browser_score + error_score + verification_score;
    let rating = raw_score.clamp(1, 10);

    QuickReviewResult {
        rating,
        tool_uses,
        errors,
        error_rate,
        browser_automation_calls,
        screenshot_calls,
        has_verification_before_completion: has_verification,
        critical_issues,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_use(name: &str, input: serde_json::Value) -> LogRecord {
        LogRecord {
            event: "tool_use".to_string(),
            tool_name: Some(name.to_string()),
            is_error: None,
            content: None,
            duration_ms: None,
            subtype: None,
            input: Some(input),
            tool_use_count: None,
            error_count: None,
        }
    }

    fn error() -> LogRecord {
        LogRecord {
            event: "error".to_string(),
            tool_name: None,
            is_error: Some(true),
            content: None,
            duration_ms: None,
            subtype: None,
            input: None,
            tool_use_count: None,
            error_count: None,
        }
    }

    #[test]
    fn zero_browser_calls_caps_coding_session_rating_and_flags_critical() {
        let records = vec![tool_use("exec", json!({}))];
        let result = analyze(&records, SessionKind::Coding);
        assert!(result
            .critical_issues
            .iter()
            .any(|i| i.tag == "no-browser-verification"));
        assert!(result.rating <= 6); // error(4) + verification(0) + browser(0)
    }

    #[test]
    fn initializer_session_is_exempt_from_browser_penalty() {
        let records = vec![tool_use("create_epic", json!({}))];
        let result = analyze(&records, SessionKind::Initializer);
        assert!(!result
            .critical_issues
            .iter()
            .any(|i| i.tag == "no-browser-verification"));
    }

    #[test]
    fn high_error_rate_is_flagged_critical() {
        let mut records = vec![tool_use("exec", json!({}))];
        for _ in 0..5 {
            records.push(error());
        }
        let result = analyze(&records, SessionKind::Coding);
        assert!(result.error_rate > 0.10);
        assert!(result
            .critical_issues
            .iter()
            .any(|i| i.tag == "high-error-rate"));
    }

    #[test]
    fn verification_pattern_detected_within_lookback_window() {
        let records = vec![
            tool_use("browser_click", json!({"task_id": "task_1"})),
            tool_use(
                "update_test_result",
                json!({"task_id": "task_1", "outcome": "pass"}),
            ),
        ];
        let result = analyze(&records, SessionKind::Coding);
        assert!(result.has_verification_before_completion);
        assert!(result
            .warnings
            .iter()
            .all(|i| i.tag != "no-pre-completion-verification"));
    }

    #[test]
    fn missing_verification_pattern_is_warned_when_a_test_passed() {
        let records = vec![tool_use(
            "update_test_result",
            json!({"task_id": "task_1", "outcome": "pass"}),
        )];
        let result = analyze(&records, SessionKind::Coding);
        assert!(!result.has_verification_before_completion);
        assert!(result
            .warnings
            .iter()
            .any(|i| i.tag == "no-pre-completion-verification"));
    }

    #[test]
    fn analyze_is_deterministic_on_unchanged_input() {
        let records = vec![tool_use("exec", json!({}))];
        let first = analyze(&records, SessionKind::Coding);
        let second = analyze(&records, SessionKind::Coding);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}

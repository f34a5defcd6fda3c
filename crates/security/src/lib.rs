//! Security Gate (spec §4.2)
//!
//! A pure function, `check`, that denies shell fragments representing
//! destructive or privileged operations before the core itself issues any
//! shell execution (sandbox provisioning, the `none`-policy `exec`
//! fallback). Commands the agent issues *inside* a sandbox are out of scope
//! here — containment there is delegated to the Sandbox Manager.
//!
//! Per SPEC_FULL §2 (resolving spec's Open Question on gating scope), this
//! gate is applied unconditionally to every host-level exec, not only the
//! sandboxed path.

use regex::Regex;
use std::sync::OnceLock;

/// Outcome of a security check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny { reason: String },
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

struct DenyRule {
    name: &'static str,
    regex: Regex,
}

/// Default denylist: process elevation, host package-manager installs,
/// recursive deletes on root-ish paths, disk-clobbering, and fork bombs.
/// Grounded on the same families of pattern the codegen tool's own bash
/// tool and code-security guardrail block.
fn rules() -> &'static Vec<DenyRule> {
    static RULES: OnceLock<Vec<DenyRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let raw: &[(&str, &str)] = &[
            ("privilege-escalation", r"\bsudo\b|\bsu\s+-|\bdoas\b"),
            (
                "recursive-root-delete",
                r"rm\s+(-\w*r\w*f\w*|-\w*f\w*r\w*)\s+(/($|\*|[a-zA-Z]+/?$)|~/?$|~\*?$)",
            ),
            ("disk-clobber", r">\s*/dev/sd\w*|dd\s+if=/dev/(zero|random)\s"),
            ("filesystem-format", r"\bmkfs\.\w+"),
            ("recursive-chmod-root", r"chmod\s+-R\s+777\s+/"),
            ("recursive-chown-root", r"chown\s+-R\s+.+\s+/($|\s)"),
            ("fork-bomb", r":\(\)\s*\{\s*:\|:&\s*\}\s*;\s*:"),
            (
                "host-package-install",
                r"\b(apt(-get)?|yum|dnf|pacman|brew)\s+(install|remove|purge)\b",
            ),
            ("shutdown-or-reboot", r"\b(shutdown|reboot|halt|poweroff)\b"),
        ];
        raw.iter()
            .map(|(name, pattern)| DenyRule {
                name,
                regex: Regex::new(pattern).expect("denylist pattern is valid regex"),
            })
            .collect()
    })
}

/// Check `command` against the denylist. Returns `Verdict::Deny` with the
/// name of the violated rule on the first match; `Verdict::Allow` otherwise.
///
/// This function is pure and synchronous: it performs no I/O and never
/// blocks, so it is safe to call on every exec path regardless of caller.
pub fn check(command: &str) -> Verdict {
    for rule in rules() {
        if rule.regex.is_match(command) {
            return Verdict::Deny {
                reason: format!("blocked by rule `{}`", rule.name),
            };
        }
    }
    Verdict::Allow
}

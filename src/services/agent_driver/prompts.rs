//! Prompt composition (spec §4.6 "Prompt assembly", §9 "Prompt versioning").
//!
//! Every session's effective prompt is `base + per-kind template + sandbox
//! addendum`, and the composed version tag is recorded on the session row
//! so a later audit can tell which wording produced which transcript.

use autoforge_core::{SandboxKind, SessionKind};

/// Bumped whenever any constant in this module changes meaning, not just
/// wording. Stored verbatim on the session (spec §9).
pub const PROMPT_VERSION: &str = "2024-06.1";

const BASE_PROMPT: &str = "\
You are an autonomous software engineering agent working inside a single \
project workspace. You operate exclusively through the tools provided to \
you; you have no other means of observing or changing the project. Treat \
every tool result as ground truth about the project's current state. Do \
not assume a task is complete until its tests pass.";

const INITIALIZER_TEMPLATE: &str = "\
This is the project's first session. Read the application specification \
at `app_spec.md` in the workspace root, then use `create_epic`, \
`create_task`, and `create_test` to lay out the full epic/task/test \
breakdown before writing any code. Epics and tasks are ordered by the \
`ordinal` you assign; list them in the order they should be worked.";

const CODING_TEMPLATE: &str = "\
Call `get_next_task` to find the next unit of work. Before marking a task \
done with `update_task_status`, make sure every test under it has been \
run and recorded via `update_test_result`; a task with a failing or \
unrecorded test cannot be marked done. If you finish all available work, \
say so plainly instead of inventing new tasks.";

const REVIEW_TEMPLATE: &str = "\
You are reviewing the project's recent work, not extending it. Use \
`list_epics`, `list_tasks`, and `exec` to inspect the current state of \
the codebase and its test suite. Produce a rating from 1 (unusable) to \
10 (release quality) on the first line as `RATING: <n>`, followed by your \
reasoning.";

const SANDBOX_NONE_ADDENDUM: &str = "\
`exec` runs directly on the host workspace, subject to a command \
denylist. There is no isolation; destructive commands outside the \
workspace will be rejected, not sandboxed.";

const SANDBOX_CONTAINER_ADDENDUM: &str = "\
`exec` runs inside a disposable container with the workspace mounted. \
State outside the workspace mount does not persist between sessions.";

fn kind_template(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::Initializer => INITIALIZER_TEMPLATE,
        SessionKind::Coding => CODING_TEMPLATE,
        SessionKind::Review => REVIEW_TEMPLATE,
    }
}

fn sandbox_addendum(kind: SandboxKind) -> &'static str {
    match kind {
        SandboxKind::None => SANDBOX_NONE_ADDENDUM,
        SandboxKind::Container | SandboxKind::RemoteCloud => SANDBOX_CONTAINER_ADDENDUM,
    }
}

/// Composes the full system prompt for one session.
pub fn compose_prompt(session_kind: SessionKind, sandbox_kind: SandboxKind) -> String {
    format!(
        "{BASE_PROMPT}\n\n{}\n\n{}",
        kind_template(session_kind),
        sandbox_addendum(sandbox_kind)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializer_prompt_mentions_app_spec() {
        let prompt = compose_prompt(SessionKind::Initializer, SandboxKind::None);
        assert!(prompt.contains("app_spec.md"));
        assert!(prompt.contains(BASE_PROMPT));
    }

    #[test]
    fn review_prompt_asks_for_rating_line() {
        let prompt = compose_prompt(SessionKind::Review, SandboxKind::Container);
        assert!(prompt.contains("RATING:"));
        assert!(prompt.contains("disposable container"));
    }

    #[test]
    fn coding_prompt_differs_from_initializer() {
        let coding = compose_prompt(SessionKind::Coding, SandboxKind::None);
        let init = compose_prompt(SessionKind::Initializer, SandboxKind::None);
        assert_ne!(coding, init);
    }
}

//! Deterministic names derived from a task id and a start time.

/// Derive a run id: lower-cased task id, `-`, unix seconds.
///
/// Characters outside `[a-z0-9._-]` become `-` so the id is always a safe
/// single path segment. Never empty.
pub fn run_id(task_id: &str, unix_secs: u64) -> String {
    let mut id = sanitize_segment(&task_id.to_lowercase());
    if id.is_empty() {
        id.push_str("task");
    }
    format!("{id}-{unix_secs}")
}

/// Default branch name `<prefix>/<run id>` when no explicit branch is given.
pub fn default_branch_name(prefix: &str, run_id: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return run_id.to_string();
    }
    format!("{prefix}/{run_id}")
}

fn sanitize_segment(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '-',
        })
        .collect();
    // `.` and `..` alone would escape the evidence root.
    if mapped.chars().all(|c| c == '.') {
        return mapped.replace('.', "-");
    }
    mapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_lowercases_and_appends_seconds() {
        assert_eq!(run_id("TASK-1201", 1_700_000_000), "task-1201-1700000000");
    }

    #[test]
    fn run_id_replaces_unsafe_characters() {
        assert_eq!(run_id("Task 7/../x", 5), "task-7-..-x-5");
        assert_eq!(run_id("..", 5), "---5");
    }

    #[test]
    fn run_id_is_never_empty() {
        assert_eq!(run_id("", 9), "task-9");
    }

    #[test]
    fn branch_name_joins_prefix() {
        assert_eq!(default_branch_name("codex", "t-1"), "codex/t-1");
        assert_eq!(default_branch_name("codex/", "t-1"), "codex/t-1");
        assert_eq!(default_branch_name("", "t-1"), "t-1");
    }
}

//! Segment-aware path prefix matching for scope checks.

/// True if repo-relative `path` lies within the allowed `prefix`.
///
/// Matching is on whole path segments: `src/` and `src` both allow `src` and
/// `src/a.rs`, never `src-legacy/a.rs`. An empty prefix (or `.`) allows
/// everything.
pub fn within_prefix(path: &str, prefix: &str) -> bool {
    let prefix = normalize(prefix);
    if prefix.is_empty() {
        return true;
    }
    let path = normalize(path);
    path == prefix
        || path
            .strip_prefix(prefix.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Paths from `changed` that fall outside every allowed prefix, in input order.
pub fn scope_violations<'a>(changed: &'a [String], allowed: &[String]) -> Vec<&'a str> {
    changed
        .iter()
        .map(String::as_str)
        .filter(|path| !allowed.iter().any(|prefix| within_prefix(path, prefix)))
        .collect()
}

fn normalize(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches("./").trim_end_matches('/');
    if trimmed == "." {
        return String::new();
    }
    trimmed.to_string()
}

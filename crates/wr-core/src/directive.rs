//! Target directives embedded in descriptions.
//!
//! A description may name its targets in braces, e.g. `Fix login {jira,billing}`.
//! The directive is removed before the description is published.

use std::sync::LazyLock;

use regex::Regex;

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(.*)\}").unwrap());

/// Explicit targets parsed from a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDirective {
    /// Trimmed, non-empty target names in the order given.
    pub targets: Vec<String>,
    /// The description with the directive removed.
    pub description: String,
}

/// Extracts a `{name1,name2}` directive.
///
/// The match spans from the first `{` to the last `}`. A directive without
/// any non-blank name is treated as absent and the description is left alone.
pub fn extract_directive(description: &str) -> Option<TargetDirective> {
    let caps = DIRECTIVE_RE.captures(description)?;
    let whole = caps.get(0)?;

    let targets: Vec<String> = caps[1]
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect();
    if targets.is_empty() {
        return None;
    }

    let before = description[..whole.start()].trim();
    let after = description[whole.end()..].trim();
    let description = match (before.is_empty(), after.is_empty()) {
        (_, true) => before.to_string(),
        (true, false) => after.to_string(),
        (false, false) => format!("{before} {after}"),
    };

    Some(TargetDirective {
        targets,
        description,
    })
}

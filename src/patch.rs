//! Best-effort patch extraction from model output
//!
//! This is a bounded line scan, not a diff parser. It tolerates surrounding
//! prose and code-fence wrapping and returns `None` ("no candidate") when no
//! patch-shaped substring exists - absence and empty-but-present text are
//! distinct states downstream.
//!
//! Known failure modes, deliberately left as-is: a response containing
//! multiple diffs yields one span starting at the first marker, and a fenced
//! diff whose every line carries leading indentation is missed by the raw
//! scan (the fence pass usually catches it first).

use regex::Regex;

/// Extract a unified-diff substring from a model response.
///
/// Order: fenced ```diff blocks, then any fenced block that looks like a
/// diff, then a raw scan from the first `--- ` / `diff --git` line.
pub fn extract_patch(response: &str) -> Option<String> {
    if response.trim().is_empty() {
        return None;
    }

    let diff_fence = Regex::new(r"(?s)```diff\s*\n(.*?)```").expect("static regex");
    if let Some(m) = diff_fence.captures(response) {
        let body = m[1].trim();
        if !body.is_empty() {
            return Some(body.to_string());
        }
    }

    let any_fence = Regex::new(r"(?s)```[a-z]*\s*\n(.*?)```").expect("static regex");
    for m in any_fence.captures_iter(response) {
        let body = m[1].trim();
        if looks_like_diff(body) {
            return Some(body.to_string());
        }
    }

    if let Some(raw) = scan_raw_diff(response) {
        return Some(raw);
    }

    // Last resort: the whole response, if it carries diff markers.
    if response.contains("@@") && (response.contains("---") || response.contains("+++")) {
        return Some(response.trim().to_string());
    }

    None
}

/// Aggressive variant used by the retry pass: same scans, but fenced blocks
/// are accepted only when they carry hunk markers, and the raw scan result
/// must too. Matches the stricter retry prompt contract.
pub fn extract_patch_aggressive(response: &str) -> Option<String> {
    if response.trim().is_empty() {
        return None;
    }

    let diff_fence = Regex::new(r"(?s)```diff\s*\n(.*?)```").expect("static regex");
    if let Some(m) = diff_fence.captures(response) {
        let body = m[1].trim();
        if body.contains("@@") && (body.contains("---") || body.contains("+++")) {
            return Some(body.to_string());
        }
    }

    let any_fence = Regex::new(r"(?s)```[a-z]*\s*\n(.*?)```").expect("static regex");
    for m in any_fence.captures_iter(response) {
        let body = m[1].trim();
        if body.contains("@@") && body.contains("---") && body.contains("+++") {
            return Some(body.to_string());
        }
    }

    scan_raw_diff(response).filter(|p| p.contains("@@"))
}

fn looks_like_diff(text: &str) -> bool {
    text.lines().any(|l| l.starts_with("--- "))
        && text.lines().any(|l| l.starts_with("+++ "))
        && text.contains("@@")
}

/// A line that can legitimately appear inside a unified diff body.
fn is_diff_line(line: &str) -> bool {
    line.is_empty()
        || line.starts_with("--- ")
        || line.starts_with("+++ ")
        || line.starts_with("@@")
        || line.starts_with('+')
        || line.starts_with('-')
        || line.starts_with(' ')
        || line.starts_with("diff ")
        || line.starts_with("index ")
        || line.starts_with('\\')
}

/// Scan for a raw (unfenced) diff: start at the first `--- ` or
/// `diff --git` line that is followed by a `+++ ` line, collect while lines
/// stay diff-shaped, stop when prose resumes.
fn scan_raw_diff(response: &str) -> Option<String> {
    let lines: Vec<&str> = response.lines().collect();
    let start = lines
        .iter()
        .position(|l| l.starts_with("--- ") || l.starts_with("diff --git"))?;

    // A source marker without a later target marker is quoted prose.
    lines[start..].iter().find(|l| l.starts_with("+++ "))?;

    let mut collected: Vec<&str> = Vec::new();
    for line in &lines[start..] {
        if !is_diff_line(line) {
            break;
        }
        collected.push(line);
    }

    // Trim trailing blank lines left by the prose boundary.
    while collected.last().map(|l| l.is_empty()).unwrap_or(false) {
        collected.pop();
    }

    let patch = collected.join("\n");
    if patch.contains("@@") {
        Some(patch)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate;

    const WELL_FORMED: &str = "--- a/foo.py\n+++ b/foo.py\n@@ -1,1 +1,1 @@\n-old\n+new";

    #[test]
    fn test_extracts_from_diff_fence() {
        let response = format!("Here is the fix:\n```diff\n{}\n```\nHope that helps!", WELL_FORMED);
        let patch = extract_patch(&response).unwrap();
        assert!(patch.starts_with("--- a/foo.py"));
        assert!(patch.ends_with("+new"));
    }

    #[test]
    fn test_extracts_from_anonymous_fence() {
        let response = format!("```\n{}\n```", WELL_FORMED);
        assert_eq!(extract_patch(&response).unwrap(), WELL_FORMED);
    }

    #[test]
    fn test_extracts_raw_diff_embedded_in_prose() {
        let response = format!(
            "Sure, here's the fix:\n{}\nLet me know if you need anything else.",
            WELL_FORMED
        );
        let patch = extract_patch(&response).unwrap();
        assert!(patch.contains("@@ -1,1 +1,1 @@"));
        assert!(!patch.contains("Let me know"));
    }

    #[test]
    fn test_extraction_round_trips_through_validator() {
        let response = format!("Some analysis first.\n\n{}\n\nDone.", WELL_FORMED);
        let patch = extract_patch(&response).unwrap();
        assert!(validate(Some(&patch)).well_formed);
    }

    #[test]
    fn test_no_markers_yields_no_candidate() {
        assert_eq!(extract_patch("I think you should change the function."), None);
        assert_eq!(extract_patch(""), None);
        assert_eq!(extract_patch("   \n  "), None);
    }

    #[test]
    fn test_source_marker_without_target_is_not_a_candidate() {
        // Quoted prose mentioning "--- " alone must not produce a patch.
        assert_eq!(extract_patch("the line `--- a/x.py` was missing"), None);
    }

    #[test]
    fn test_aggressive_requires_hunk_markers() {
        let fenced_prose = "```diff\njust words, no hunks\n```";
        assert_eq!(extract_patch_aggressive(fenced_prose), None);

        let response = format!("```diff\n{}\n```", WELL_FORMED);
        assert!(extract_patch_aggressive(&response).is_some());
    }

    #[test]
    fn test_multiple_diffs_take_first_span() {
        let two = format!("{}\n\nand separately:\n\n--- a/bar.py\n+++ b/bar.py", WELL_FORMED);
        let patch = extract_patch(&two).unwrap();
        assert!(patch.contains("foo.py"));
        assert!(!patch.contains("and separately"));
    }
}

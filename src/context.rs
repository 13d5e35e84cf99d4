//! Keyword-relevance file ranking and prompt context assembly
//!
//! These are best-effort heuristics feeding the prompts, not analysis: a
//! stop-worded keyword scan of the issue text, a presence-count ranking of
//! repository files, and bounded snippet/context builders.

use crate::util::truncate_middle;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const MAX_KEYWORDS: usize = 10;
const MAX_FILE_BYTES: u64 = 512 * 1024;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "in", "on", "at", "to", "for", "of", "and", "or", "but", "not",
    "with", "this", "that", "when", "if", "it", "as", "be", "by", "from", "are", "was", "were",
    "will", "would", "could", "should", "have", "has", "had", "do", "does", "did", "been",
];

const SKIP_DIRS: &[&str] = &[
    "__pycache__", "node_modules", ".git", "venv", "env", ".tox", "dist", "build", "egg-info",
    "tests", "test", "testing",
];

/// Extract identifier-like keywords from an issue, longest first.
pub fn extract_keywords(problem_statement: &str) -> Vec<String> {
    let word_re = Regex::new(r"\b[a-zA-Z_][a-zA-Z0-9_]{3,}\b").expect("static regex");
    let mut seen = BTreeSet::new();
    for m in word_re.find_iter(problem_statement) {
        let word = m.as_str();
        if STOP_WORDS.contains(&word.to_lowercase().as_str()) {
            continue;
        }
        seen.insert(word.to_string());
    }
    // Longer identifiers are more specific; prefer them.
    let mut keywords: Vec<String> = seen.into_iter().collect();
    keywords.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    keywords.truncate(MAX_KEYWORDS);
    keywords
}

fn is_skipped(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.') || SKIP_DIRS.contains(&name))
        .unwrap_or(true)
}

fn source_files(repo_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(repo_dir)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(e))
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path().extension().map(|ext| ext == "py").unwrap_or(false)
                && e.metadata().map(|m| m.len() <= MAX_FILE_BYTES).unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Rank repository files by how many of the keywords appear in them.
/// Ties break on path so ranking is deterministic.
pub fn find_relevant_files(repo_dir: &Path, keywords: &[String], max_files: usize) -> Vec<PathBuf> {
    let mut scored: Vec<(usize, PathBuf)> = Vec::new();
    for path in source_files(repo_dir) {
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let score = keywords
            .iter()
            .take(5)
            .filter(|kw| content.contains(kw.as_str()))
            .count();
        if score > 0 {
            scored.push((score, path));
        }
    }
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    scored.into_iter().take(max_files).map(|(_, p)| p).collect()
}

/// Grep-style context: matching lines for the leading keywords, bounded.
pub fn grep_context(repo_dir: &Path, keywords: &[String], max_chars: usize) -> String {
    let mut sections = Vec::new();
    for kw in keywords.iter().take(4) {
        let mut lines = Vec::new();
        'files: for path in source_files(repo_dir) {
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let rel = path.strip_prefix(repo_dir).unwrap_or(&path).display().to_string();
            for (lineno, line) in content.lines().enumerate() {
                if line.contains(kw.as_str()) {
                    lines.push(format!("{}:{}: {}", rel, lineno + 1, line.trim_end()));
                    if lines.len() >= 5 {
                        break 'files;
                    }
                }
            }
        }
        if !lines.is_empty() {
            sections.push(format!("# grep '{}':\n{}", kw, lines.join("\n")));
        }
        if sections.len() >= 3 {
            break;
        }
    }
    truncate_middle(&sections.join("\n\n"), max_chars)
}

/// Build a code-context block from ranked files, bounded by `max_chars`.
pub fn build_code_context(repo_dir: &Path, files: &[PathBuf], max_chars: usize) -> String {
    let mut parts = Vec::new();
    let mut total = 0usize;
    for path in files {
        if total >= max_chars {
            break;
        }
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        let rel = path.strip_prefix(repo_dir).unwrap_or(path).display().to_string();
        let snippet = truncate_middle(&content, 3000);
        let part = format!("### File: {}\n```python\n{}\n```\n", rel, snippet);
        total += part.len();
        parts.push(part);
    }
    parts.join("\n")
}

/// Relative-path listing of the ranked files for prompt hints.
pub fn relative_listing(repo_dir: &Path, files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|p| p.strip_prefix(repo_dir).unwrap_or(p).display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read one file's content for a prompt, bounded.
pub fn read_file_bounded(path: &Path, max_chars: usize) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|content| truncate_middle(&content, max_chars))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(
            dir.path().join("pkg/frobnicate.py"),
            "def frobnicate(widget):\n    return widget.spin()\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("pkg/other.py"),
            "def unrelated():\n    pass\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        fs::write(
            dir.path().join("tests/test_frobnicate.py"),
            "def test_frobnicate():\n    assert frobnicate(None)\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_extract_keywords_drops_stop_words_and_sorts_by_length() {
        let keywords = extract_keywords("When the frobnicate function fails with widget");
        assert!(keywords.contains(&"frobnicate".to_string()));
        assert!(keywords.contains(&"widget".to_string()));
        assert!(!keywords.contains(&"when".to_string()));
        // longest first
        assert_eq!(keywords[0], "frobnicate");
    }

    #[test]
    fn test_find_relevant_files_ranks_matches_and_skips_tests() {
        let repo = fixture_repo();
        let keywords = vec!["frobnicate".to_string(), "widget".to_string()];
        let ranked = find_relevant_files(repo.path(), &keywords, 5);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].ends_with("pkg/frobnicate.py"));
    }

    #[test]
    fn test_build_code_context_includes_headers() {
        let repo = fixture_repo();
        let files = vec![repo.path().join("pkg/frobnicate.py")];
        let context = build_code_context(repo.path(), &files, 8000);
        assert!(context.contains("### File: pkg/frobnicate.py"));
        assert!(context.contains("def frobnicate"));
    }

    #[test]
    fn test_grep_context_reports_line_numbers() {
        let repo = fixture_repo();
        let snippets = grep_context(repo.path(), &["frobnicate".to_string()], 2000);
        assert!(snippets.contains("# grep 'frobnicate':"));
        assert!(snippets.contains("pkg/frobnicate.py:1:"));
    }
}

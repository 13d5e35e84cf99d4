/// Truncate a string to at most `max` characters (Unicode-safe).
pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }

    if max <= 3 {
        return s.chars().take(max).collect();
    }

    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

/// Truncate keeping beginning and end, for large file contents in prompts.
pub fn truncate_middle(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let head: String = content.chars().take(max_chars / 2).collect();
    let tail_rev: String = content.chars().rev().take(max_chars / 2).collect();
    let tail: String = tail_rev.chars().rev().collect();
    format!("{}\n\n... [truncated] ...\n\n{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_unicode_safe() {
        let input = "ééééé";
        assert_eq!(truncate(input, 4), "é...");
    }

    #[test]
    fn test_truncate_small_max() {
        assert_eq!(truncate("こんにちは", 3), "こんに");
        assert_eq!(truncate("こんにちは", 0), "");
    }

    #[test]
    fn test_truncate_middle_marks_cut() {
        let content = "abcdefghijklmnopqrstuvwxyz";
        let cut = truncate_middle(content, 10);
        assert!(cut.contains("truncated"));
        assert!(cut.starts_with("abcde"));
        assert!(cut.ends_with("vwxyz"));
    }
}

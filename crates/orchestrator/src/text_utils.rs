//! Small parsing helpers shared by the course and QCM orchestrators for
//! reading the line-oriented list formats their prompts ask the LLM for.

use std::collections::HashMap;

/// Parses `"LABEL: value"` lines (case-insensitive label match, one
/// label per line) into a map keyed by the label exactly as given in
/// `labels`.
pub fn parse_labeled_lines(text: &str, labels: &[&str]) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in text.lines() {
        let trimmed = line.trim();
        for label in labels {
            let prefix = format!("{label}:");
            if trimmed.len() >= prefix.len()
                && trimmed[..prefix.len()].eq_ignore_ascii_case(&prefix)
            {
                out.insert(label.to_string(), trimmed[prefix.len()..].trim().to_string());
                break;
            }
        }
    }
    out
}

/// Splits `text` into non-empty lines with any leading list marker
/// (`"1."`, `"1)"`, `"-"`, `"*"`) stripped.
pub fn numbered_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(strip_leading_marker)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_leading_marker(line: &str) -> &str {
    let trimmed = line.trim_start();
    let without_bullet = trimmed
        .strip_prefix('-')
        .or_else(|| trimmed.strip_prefix('*'))
        .unwrap_or(trimmed);
    let digits_end = without_bullet
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, c)| i + c.len_utf8());

    match digits_end {
        Some(end) => {
            let rest = &without_bullet[end..];
            rest.strip_prefix('.')
                .or_else(|| rest.strip_prefix(')'))
                .unwrap_or(rest)
        }
        None => without_bullet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_numeric_and_bullet_markers() {
        let text = "1. first query\n2) second query\n- third query\nfourth query\n\n";
        assert_eq!(
            numbered_lines(text),
            vec!["first query", "second query", "third query", "fourth query"]
        );
    }

    #[test]
    fn ignores_blank_lines() {
        assert_eq!(numbered_lines("\n\n  \n"), Vec::<String>::new());
    }

    #[test]
    fn parses_labeled_lines_case_insensitively() {
        let text = "answer: Paris\nDistractor1: Berlin\nDISTRACTOR2: Madrid\nSource: 2";
        let fields = parse_labeled_lines(text, &["ANSWER", "DISTRACTOR1", "DISTRACTOR2", "SOURCE"]);
        assert_eq!(fields["ANSWER"], "Paris");
        assert_eq!(fields["DISTRACTOR1"], "Berlin");
        assert_eq!(fields["DISTRACTOR2"], "Madrid");
        assert_eq!(fields["SOURCE"], "2");
    }
}

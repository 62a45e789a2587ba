//! Deterministic answer sanitization.
//!
//! The generation model is not contractually guaranteed to avoid
//! meta-narration ("Based on the provided context, ..."), so every
//! generated answer passes through this regex safety net before it
//! reaches the caller. The pass is an ordered list of pattern →
//! replacement rules, not a semantic rewrite; the same input always
//! produces the same output.

use once_cell::sync::Lazy;
use regex::Regex;

/// Meta-commentary rules, applied in order.
static META_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bbased on (the )?(provided )?(context|snippets|information)[^.\n]*[.\n]?", ""),
        (r"(?i)\baccording to (the )?(context|snippets)[^.\n]*[.\n]?", ""),
        (r"(?i)\bfrom the (context|snippets),?[^.\n]*[.\n]?", ""),
        (
            r"(?i)\bthese (features|details) are mentioned across (multiple|several) (context )?snippets[^.\n]*[.\n]?",
            "",
        ),
        (r"(?i)\bI can only conclude that[^.\n]*[.\n]?", ""),
        (r"(?i)\bthe snippets\b", ""),
        (r"(?i)\bthe context\b", ""),
    ]
    .into_iter()
    .map(|(pat, rep)| (Regex::new(pat).expect("invalid sanitize pattern"), rep))
    .collect()
});

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("invalid pattern"));
static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").expect("invalid pattern"));

/// Sanitize a generated answer: unwrap quotes and code fences, strip
/// meta-commentary, and collapse excess whitespace.
pub fn sanitize_answer(text: &str) -> String {
    let mut t = strip_code_fence(text.trim());
    t = strip_wrapping_quotes(&t);

    for (pattern, replacement) in META_RULES.iter() {
        t = pattern.replace_all(&t, *replacement).into_owned();
    }

    let t = BLANK_LINES.replace_all(&t, "\n\n");
    let t = SPACE_RUNS.replace_all(&t, " ");
    t.trim().to_string()
}

/// Remove a single wrapping layer of ```fences```, including an optional
/// language tag on the opening line.
fn strip_code_fence(text: &str) -> String {
    let t = text.trim();
    if !t.starts_with("```") || !t.ends_with("```") || t.len() < 6 {
        return t.to_string();
    }
    let inner = &t[3..t.len() - 3];
    // Drop the language tag line, if any ("```text\n...").
    let inner = match inner.split_once('\n') {
        Some((first, rest)) if !first.trim().contains(' ') => {
            if first.trim().is_empty() || first.trim().chars().all(char::is_alphanumeric) {
                rest
            } else {
                inner
            }
        }
        _ => inner,
    };
    inner.trim().to_string()
}

/// Remove one layer of matching straight or curly quotes.
fn strip_wrapping_quotes(text: &str) -> String {
    let t = text.trim();
    let mut chars = t.chars();
    let (first, last) = match (chars.next(), t.chars().last()) {
        (Some(f), Some(l)) if t.chars().count() >= 2 => (f, l),
        _ => return t.to_string(),
    };
    let quoted = matches!(
        (first, last),
        ('"', '"') | ('\'', '\'') | ('\u{201c}', '\u{201d}') | ('\u{2018}', '\u{2019}')
    );
    if quoted {
        let inner: String = t
            .chars()
            .skip(1)
            .take(t.chars().count() - 2)
            .collect();
        inner.trim().to_string()
    } else {
        t.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_based_on_context_preface() {
        let raw = "Based on the provided context, our bags are food-safe. They hold 20kg.";
        let clean = sanitize_answer(raw);
        assert!(!clean.to_lowercase().contains("based on"));
        assert!(clean.contains("They hold 20kg."));
    }

    #[test]
    fn test_strips_according_to_snippets() {
        // The rule eats the whole meta sentence, like the original did.
        let raw = "According to the snippets, yes. Shipping takes 5 days.";
        let clean = sanitize_answer(raw);
        assert!(!clean.to_lowercase().contains("according to"));
        assert!(clean.contains("Shipping takes 5 days."));
    }

    #[test]
    fn test_strips_literal_context_mentions() {
        let clean = sanitize_answer("As noted in the context earlier, yes.");
        assert!(!clean.to_lowercase().contains("the context"));
    }

    #[test]
    fn test_unwraps_quotes() {
        assert_eq!(sanitize_answer("\"Yes, we ship worldwide.\""), "Yes, we ship worldwide.");
        assert_eq!(
            sanitize_answer("\u{201c}Yes, we ship worldwide.\u{201d}"),
            "Yes, we ship worldwide."
        );
    }

    #[test]
    fn test_unwraps_code_fence() {
        assert_eq!(sanitize_answer("```\nPlain answer.\n```"), "Plain answer.");
        assert_eq!(sanitize_answer("```text\nPlain answer.\n```"), "Plain answer.");
    }

    #[test]
    fn test_collapses_blank_lines_and_spaces() {
        let clean = sanitize_answer("Line one.\n\n\n\n\nLine two.   End.");
        assert_eq!(clean, "Line one.\n\nLine two. End.");
    }

    #[test]
    fn test_interior_quote_untouched() {
        let clean = sanitize_answer("Our \"Heavy\" line holds 25kg.");
        assert_eq!(clean, "Our \"Heavy\" line holds 25kg.");
    }

    #[test]
    fn test_deterministic() {
        let raw = "Based on the context, A.\n\n\nB  C. [1]";
        assert_eq!(sanitize_answer(raw), sanitize_answer(raw));
    }

    #[test]
    fn test_keeps_citation_markers() {
        let clean = sanitize_answer("We offer three sizes [1] and custom prints [2].");
        assert!(clean.contains("[1]"));
        assert!(clean.contains("[2]"));
    }
}

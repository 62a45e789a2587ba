//! Overlapping sliding-window text chunker.
//!
//! Splits whitespace-normalized text into fixed-size spans with a
//! configurable overlap, so that retrieval never loses context at a
//! chunk boundary. Chunking is pure and deterministic: identical input
//! and parameters always yield an identical sequence.

/// Collapse runs of whitespace to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `text` into chunks of `size` characters, sliding the window by
/// `max(1, size - overlap)` each step. The final chunk may be shorter
/// than `size`; empty input yields an empty sequence.
///
/// `overlap >= size` is clamped so the window always advances. The
/// first window that reaches the end of the input is the last one, so
/// text already fully covered never re-emits as a trailing fragment.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() || size == 0 {
        return Vec::new();
    }

    // Windows are measured in characters, not bytes, so multi-byte
    // input never splits inside a code point.
    let chars: Vec<char> = normalized.chars().collect();
    let step = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_runs() {
        assert_eq!(normalize_whitespace("  a \t b\n\nc  "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
        assert_eq!(normalize_whitespace(" \n\t "), "");
    }

    #[test]
    fn test_spec_example_offsets() {
        // size 10, overlap 3 over 15 chars: step 7, windows at 0 and 7.
        let chunks = chunk_text("abcdefghijklmno", 10, 3);
        assert_eq!(chunks, vec!["abcdefghij", "hijklmno"]);
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_text("", 10, 3).is_empty());
        assert!(chunk_text("   ", 10, 3).is_empty());
    }

    #[test]
    fn test_short_input_single_chunk() {
        let chunks = chunk_text("hello", 10, 3);
        assert_eq!(chunks, vec!["hello"]);
    }

    #[test]
    fn test_overlap_ge_size_still_advances() {
        // step clamps to 1; must terminate and cover every position.
        let chunks = chunk_text("abcdef", 3, 5);
        assert_eq!(chunks, vec!["abc", "bcd", "cde", "def"]);
    }

    #[test]
    fn test_no_redundant_tail_after_full_coverage() {
        // size 4, overlap 2 over 6 chars: the second window already
        // reaches the end, so no shorter tail window follows it.
        let chunks = chunk_text("abcdef", 4, 2);
        assert_eq!(chunks, vec!["abcd", "cdef"]);
    }

    #[test]
    fn test_coverage_reconstructs_normalized_input() {
        let text = "The quick brown fox jumps over the lazy dog near the riverbank";
        let normalized = normalize_whitespace(text);
        let size = 10;
        let overlap = 4;
        let step = size - overlap;

        let chunks = chunk_text(text, size, overlap);

        // Concatenating each chunk's non-overlapping prefix reconstructs
        // the normalized input exactly.
        let mut rebuilt = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i + 1 < chunks.len() {
                rebuilt.extend(chunk.chars().take(step));
            } else {
                rebuilt.push_str(chunk);
            }
        }
        assert_eq!(rebuilt, normalized);
    }

    #[test]
    fn test_deterministic() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let a = chunk_text(text, 12, 5);
        let b = chunk_text(text, 12, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_multibyte_input_does_not_panic() {
        let chunks = chunk_text("héllo wörld émoji ✓ done", 7, 2);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() <= 7);
        }
    }
}

//! Grounded answer synthesis.
//!
//! Builds a citation-tagged prompt from the gated retrieval results,
//! invokes the generation capability once, and sanitizes the output.
//! Failure never propagates to the caller: the degradation chain is
//!
//! 1. generated answer (sanitized)
//! 2. best-matching chunk's raw body, truncated
//!
//! and the terminal case — retrieval produced nothing usable at all —
//! is the configured fallback message, handled by the caller before
//! synthesis is ever reached.

use crate::llm::Generator;
use crate::models::{RetrievedChunk, SourceRef};
use crate::sanitize::sanitize_answer;

/// Per-snippet character budget inside the prompt.
const SNIPPET_CHAR_BUDGET: usize = 700;

/// Character budget for the degraded raw-chunk answer.
const DEGRADED_CHAR_BUDGET: usize = 600;

/// Render the selected chunks as indexed, citation-tagged blocks.
///
/// Block `[i]` corresponds 1:1 to citation marker `[i]` in the
/// generated answer; the synthesizer never renumbers.
pub fn build_snippet_blocks(results: &[RetrievedChunk]) -> String {
    let mut blocks = Vec::with_capacity(results.len());
    for (i, result) in results.iter().enumerate() {
        let title = result.chunk.display_title();
        let body = truncate_chars(result.chunk.answer_body(), SNIPPET_CHAR_BUDGET);
        let block = match result.chunk.url {
            Some(ref url) => format!("[{}] {} — {} ({})", i + 1, title, body, url),
            None => format!("[{}] {} — {}", i + 1, title, body),
        };
        blocks.push(block);
    }
    blocks.join("\n\n")
}

/// Build the grounded generation prompt.
pub fn build_prompt(question: &str, snippet_blocks: &str) -> String {
    format!(
        "Answer the user's question using ONLY the provided context snippets.\n\
         Be concise and add in-line citation markers like [1], [2] that map to the snippets order.\n\
         Respond directly, without explaining how the answer was derived.\n\
         If the snippets are insufficient, say so and suggest visiting the contact page.\n\n\
         QUESTION:\n{question}\n\n\
         CONTEXT SNIPPETS:\n{snippet_blocks}\n\n\
         Final answer with citations:"
    )
}

/// Produce a grounded answer for `question` from the gated results.
///
/// Invokes the generator exactly once; on failure (unreachable model,
/// timeout, empty output) it degrades to the best chunk's raw body
/// rather than returning an error.
pub async fn synthesize(
    generator: &dyn Generator,
    question: &str,
    grounded: &[RetrievedChunk],
) -> String {
    let Some(best) = grounded.first() else {
        return String::new();
    };

    let blocks = build_snippet_blocks(grounded);
    let prompt = build_prompt(question, &blocks);

    match generator.generate(&prompt).await {
        Ok(raw) => {
            let clean = sanitize_answer(&raw);
            if clean.is_empty() {
                degraded_answer(best)
            } else {
                clean
            }
        }
        Err(e) => {
            eprintln!("[KB LLM ERROR] {e:#}");
            degraded_answer(best)
        }
    }
}

/// The degraded path: the top chunk's own text, truncated.
fn degraded_answer(best: &RetrievedChunk) -> String {
    truncate_chars(best.chunk.answer_body(), DEGRADED_CHAR_BUDGET)
}

/// Citation sources for the response payload, mirroring block order.
pub fn source_refs(grounded: &[RetrievedChunk]) -> Vec<SourceRef> {
    grounded
        .iter()
        .enumerate()
        .map(|(i, result)| SourceRef {
            index: i + 1,
            title: result.chunk.display_title().to_string(),
            url: result.chunk.url.clone(),
            score: result.similarity,
            source_type: Some(result.chunk.source_type.as_str().to_string()),
        })
        .collect()
}

fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let mut out: String = text.chars().take(budget).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KbChunk, SourceType};
    use anyhow::Result;
    use async_trait::async_trait;

    struct FixedGenerator(String);

    #[async_trait]
    impl Generator for FixedGenerator {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn generate(&self, _prompt: &str) -> Result<String> {
            anyhow::bail!("model unreachable")
        }
    }

    fn result(title: &str, content: &str, url: Option<&str>, similarity: f64) -> RetrievedChunk {
        RetrievedChunk {
            chunk: KbChunk {
                id: 0,
                source_type: SourceType::Web,
                url: url.map(String::from),
                title: title.to_string(),
                section_anchor: None,
                content: content.to_string(),
                answer: None,
                embedding: vec![],
                content_hash: String::new(),
            },
            similarity,
        }
    }

    #[test]
    fn test_blocks_are_indexed_in_order() {
        let results = vec![
            result("Shipping", "We ship in 5 days.", Some("https://x.test/ship"), 0.9),
            result("Pricing", "Bulk discounts apply.", None, 0.8),
        ];
        let blocks = build_snippet_blocks(&results);
        assert!(blocks.contains("[1] Shipping — We ship in 5 days. (https://x.test/ship)"));
        assert!(blocks.contains("[2] Pricing — Bulk discounts apply."));
    }

    #[test]
    fn test_block_body_truncated_at_budget() {
        let long = "x".repeat(1000);
        let results = vec![result("Long", &long, None, 0.9)];
        let blocks = build_snippet_blocks(&results);
        assert!(blocks.contains(&format!("{}...", "x".repeat(700))));
        assert!(!blocks.contains(&"x".repeat(701)));
    }

    #[test]
    fn test_prompt_embeds_question_and_blocks() {
        let prompt = build_prompt("How long is shipping?", "[1] Shipping — 5 days.");
        assert!(prompt.contains("QUESTION:\nHow long is shipping?"));
        assert!(prompt.contains("[1] Shipping — 5 days."));
    }

    #[tokio::test]
    async fn test_synthesize_sanitizes_generated_answer() {
        let generator = FixedGenerator("Based on the provided context, ok. Five days [1].".into());
        let results = vec![result("Shipping", "5 days.", None, 0.9)];
        let answer = synthesize(&generator, "how long?", &results).await;
        assert!(!answer.to_lowercase().contains("based on"));
        assert!(answer.contains("Five days [1]."));
    }

    #[tokio::test]
    async fn test_synthesize_degrades_to_top_chunk_on_failure() {
        let results = vec![
            result("Shipping", "We ship worldwide within 5 business days.", None, 0.9),
            result("Other", "Unrelated.", None, 0.5),
        ];
        let answer = synthesize(&FailingGenerator, "how long?", &results).await;
        assert_eq!(answer, "We ship worldwide within 5 business days.");
    }

    #[tokio::test]
    async fn test_synthesize_degrades_on_empty_generation() {
        let generator = FixedGenerator("\"\"".into());
        let results = vec![result("Shipping", "Five days.", None, 0.9)];
        let answer = synthesize(&generator, "how long?", &results).await;
        assert_eq!(answer, "Five days.");
    }

    #[test]
    fn test_source_refs_mirror_block_order() {
        let results = vec![
            result("A", "a", Some("https://x.test/a"), 0.9),
            result("B", "b", None, 0.7),
        ];
        let refs = source_refs(&results);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].index, 1);
        assert_eq!(refs[0].title, "A");
        assert_eq!(refs[1].index, 2);
        assert!(refs[1].url.is_none());
        assert!((refs[1].score - 0.7).abs() < 1e-9);
    }
}

//! Core data models used throughout RAG Bridge.
//!
//! These types represent the knowledge chunks, FAQ records, retrieval
//! results, and chat messages that flow through the ingestion and
//! answering pipeline.

use serde::{Deserialize, Serialize};

/// Provenance category of a stored chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Derived from the FAQ CSV; carries an out-of-band answer and no URL.
    Csv,
    /// Derived from pre-extracted web page text; carries the origin URL.
    Web,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Csv => "csv",
            SourceType::Web => "web",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(SourceType::Csv),
            "web" => Some(SourceType::Web),
            _ => None,
        }
    }
}

/// A unit of retrievable knowledge, persisted in the `kb_chunks` table.
///
/// Created during ingestion, never mutated, removed only by full rebuild.
/// No two stored chunks share the same
/// `(source_type, url-or-empty, content_hash)` triple.
#[derive(Debug, Clone)]
pub struct KbChunk {
    pub id: i64,
    pub source_type: SourceType,
    pub url: Option<String>,
    pub title: String,
    pub section_anchor: Option<String>,
    pub content: String,
    /// FAQ answer carried out-of-band; `None` for web-derived chunks.
    pub answer: Option<String>,
    pub embedding: Vec<f32>,
    pub content_hash: String,
}

impl KbChunk {
    /// Display label: title, falling back to the URL, then a generic label.
    pub fn display_title(&self) -> &str {
        if !self.title.is_empty() {
            &self.title
        } else if let Some(ref url) = self.url {
            url
        } else {
            "Untitled"
        }
    }

    /// The text a grounded answer should be built from: the out-of-band
    /// FAQ answer when present, otherwise the chunk content itself.
    pub fn answer_body(&self) -> &str {
        self.answer.as_deref().unwrap_or(&self.content)
    }
}

/// A validated FAQ row: question plus its answer, both non-empty.
///
/// The answer rides along as metadata rather than retrievable content —
/// only the question is embedded and matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaqRecord {
    pub question: String,
    pub answer: String,
}

/// A chunk returned by the retriever with its normalized similarity.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: KbChunk,
    /// Normalized similarity in `[0, 1]`, higher = more relevant.
    pub similarity: f64,
}

/// Role of a chat message within a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// A single entry in a conversation thread, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn bot(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Bot,
            content: content.into(),
        }
    }
}

/// Citation source attached to a grounded chat response.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    /// 1-based index matching the `[i]` markers in the prompt blocks.
    pub index: usize,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(title: &str, url: Option<&str>) -> KbChunk {
        KbChunk {
            id: 1,
            source_type: SourceType::Web,
            url: url.map(String::from),
            title: title.to_string(),
            section_anchor: None,
            content: "body".to_string(),
            answer: None,
            embedding: vec![],
            content_hash: String::new(),
        }
    }

    #[test]
    fn test_display_title_fallbacks() {
        assert_eq!(chunk("Pricing", None).display_title(), "Pricing");
        assert_eq!(
            chunk("", Some("https://example.com/a")).display_title(),
            "https://example.com/a"
        );
        assert_eq!(chunk("", None).display_title(), "Untitled");
    }

    #[test]
    fn test_answer_body_prefers_metadata_answer() {
        let mut c = chunk("t", None);
        assert_eq!(c.answer_body(), "body");
        c.answer = Some("the answer".to_string());
        assert_eq!(c.answer_body(), "the answer");
    }

    #[test]
    fn test_source_type_roundtrip() {
        assert_eq!(SourceType::parse("csv"), Some(SourceType::Csv));
        assert_eq!(SourceType::parse("web"), Some(SourceType::Web));
        assert_eq!(SourceType::parse("pdf"), None);
        assert_eq!(SourceType::Csv.as_str(), "csv");
    }
}

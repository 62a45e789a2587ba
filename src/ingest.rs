//! FAQ CSV ingestion pipeline.
//!
//! Reads a CSV with `Question` and `Answer` columns (header match is
//! case- and whitespace-insensitive), chunks each question, embeds the
//! chunks, and writes them to the knowledge store. The dedup constraint
//! makes repeated runs idempotent; a structurally broken CSV aborts the
//! run without touching previously committed chunks.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::llm::Embedder;
use crate::models::{FaqRecord, SourceType};
use crate::store::{KnowledgeStore, NewChunk};

/// Parse and validate the FAQ CSV.
///
/// Missing `Question`/`Answer` headers are a fatal ingestion error.
/// Rows where either field is empty are skipped, so every record
/// returned has a non-empty question and answer.
pub fn load_faq_csv(path: &Path) -> Result<Vec<FaqRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open FAQ CSV: {}", path.display()))?;

    let headers = reader.headers().context("Failed to read CSV headers")?;
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };
    let (Some(q_idx), Some(a_idx)) = (find("question"), find("answer")) else {
        bail!(
            "CSV must contain columns named 'Question' and 'Answer'. Found: {:?}",
            headers.iter().collect::<Vec<_>>()
        );
    };

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.context("Failed to read CSV row")?;
        let question = row.get(q_idx).unwrap_or("").trim();
        let answer = row.get(a_idx).unwrap_or("").trim();
        if question.is_empty() || answer.is_empty() {
            continue;
        }
        records.push(FaqRecord {
            question: question.to_string(),
            answer: answer.to_string(),
        });
    }

    Ok(records)
}

/// Chunk and embed FAQ records into store-ready rows.
///
/// Only the question text is embedded; the answer rides along as
/// out-of-band metadata on every chunk of its question.
pub async fn prepare_faq_chunks(
    config: &Config,
    embedder: &dyn Embedder,
    records: &[FaqRecord],
) -> Result<Vec<NewChunk>> {
    let mut chunks = Vec::new();
    for record in records {
        for piece in crate::chunk::chunk_text(
            &record.question,
            config.chunking.size,
            config.chunking.overlap,
        ) {
            let embedding = embedder
                .embed(&piece)
                .await
                .with_context(|| format!("Failed to embed FAQ chunk: {piece:.60}"))?;
            chunks.push(NewChunk {
                source_type: SourceType::Csv,
                url: None,
                title: "FAQ CSV".to_string(),
                section_anchor: None,
                content: piece,
                answer: Some(record.answer.clone()),
                embedding,
            });
        }
    }
    Ok(chunks)
}

/// Ingest the FAQ CSV into the store.
///
/// With `rebuild` the store contents are replaced wholesale and the
/// index swapped atomically; otherwise chunks are upserted individually
/// and duplicates are no-ops. Returns the number of chunks written.
pub async fn run_ingest(
    config: &Config,
    embedder: &dyn Embedder,
    store: &KnowledgeStore,
    csv_path: Option<&Path>,
    rebuild: bool,
) -> Result<usize> {
    let path = match csv_path.or(config.ingest.csv_path.as_deref()) {
        Some(p) => p,
        None => bail!("No FAQ CSV configured. Set ingest.csv_path or pass --csv."),
    };

    let records = load_faq_csv(path)?;
    let chunks = prepare_faq_chunks(config, embedder, &records).await?;
    let prepared = chunks.len();

    let written = if rebuild {
        store.rebuild(chunks).await?
    } else {
        let mut inserted = 0usize;
        for chunk in chunks {
            if store.upsert(chunk).await? {
                inserted += 1;
            }
        }
        inserted
    };

    println!("ingest {}", path.display());
    println!("  faq records: {}", records.len());
    println!("  chunks prepared: {prepared}");
    if rebuild {
        println!("  chunks stored after rebuild: {written}");
    } else {
        println!("  chunks inserted: {written}");
        println!("  duplicates skipped: {}", prepared - written);
    }
    println!("ok");

    Ok(written)
}

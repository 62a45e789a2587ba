use anyhow::Result;
use sqlx::SqlitePool;

/// Create the knowledge schema. Idempotent; safe to run on every start.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kb_chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_type TEXT NOT NULL,
            url TEXT,
            title TEXT NOT NULL DEFAULT '',
            section_anchor TEXT,
            content TEXT NOT NULL,
            answer TEXT,
            embedding BLOB NOT NULL,
            content_hash TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Dedup invariant: one row per (source_type, url-or-empty, content_hash).
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_kb_dedup
        ON kb_chunks (source_type, COALESCE(url, ''), content_hash)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_kb_source_type ON kb_chunks (source_type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_kb_url ON kb_chunks (url)")
        .execute(pool)
        .await?;

    Ok(())
}

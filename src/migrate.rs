use anyhow::Result;
use sqlx::SqlitePool;

/// Create the chunk table and its indexes. Idempotent.
///
/// One table holds every collection; `(collection, id)` is the key, so
/// re-adding a chunk id overwrites the row.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            source_document TEXT NOT NULL,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            page_numbers TEXT NOT NULL,
            token_count INTEGER NOT NULL,
            char_count INTEGER NOT NULL,
            has_overlap_before INTEGER NOT NULL,
            has_overlap_after INTEGER NOT NULL,
            overlap_with_previous TEXT,
            overlap_with_next TEXT,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            indexed_at TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(collection, source_document)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

//! Database initialization
//!
//! Creates the SQLite database on first run and applies the schema
//! idempotently. Three tables: `sessions` (one row per monitor call),
//! `transcript_chunks` (append-only, deduplicated by source event id)
//! and `cases` (slug → protected phone number).

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePool::connect(&db_url).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_sessions_table(&pool).await?;
    create_transcript_chunks_table(&pool).await?;
    create_cases_table(&pool).await?;

    Ok(pool)
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            call_id TEXT PRIMARY KEY,
            slug TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'unknown',
            assistant_muted INTEGER NOT NULL DEFAULT 1,
            analyzing INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            advice TEXT,
            last_advice_at INTEGER,
            updated_at INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_slug ON sessions(slug)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_transcript_chunks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transcript_chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            call_id TEXT NOT NULL,
            source_event_id TEXT NOT NULL,
            speaker TEXT NOT NULL DEFAULT 'unknown',
            text TEXT NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            is_final INTEGER NOT NULL DEFAULT 0,
            UNIQUE(call_id, source_event_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_call ON transcript_chunks(call_id, id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_cases_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cases (
            slug TEXT PRIMARY KEY,
            phone_number TEXT,
            created_at INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_schema_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coach.db");

        let pool = init_database(&path).await.unwrap();
        drop(pool);

        // Second open must succeed against the existing file
        let pool = init_database(&path).await.unwrap();
        sqlx::query("SELECT call_id FROM sessions LIMIT 1")
            .fetch_optional(&pool)
            .await
            .unwrap();
        sqlx::query("SELECT id FROM transcript_chunks LIMIT 1")
            .fetch_optional(&pool)
            .await
            .unwrap();
        sqlx::query("SELECT slug FROM cases LIMIT 1")
            .fetch_optional(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn chunk_dedup_constraint_holds() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("dedup.db")).await.unwrap();

        let insert = "INSERT INTO transcript_chunks \
                      (call_id, source_event_id, speaker, text, timestamp_ms, is_final) \
                      VALUES (?1, ?2, 'other', 'hello', 1, 1) \
                      ON CONFLICT(call_id, source_event_id) DO NOTHING";
        sqlx::query(insert)
            .bind("CA1")
            .bind("fp-1")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(insert)
            .bind("CA1")
            .bind("fp-1")
            .execute(&pool)
            .await
            .unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transcript_chunks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}

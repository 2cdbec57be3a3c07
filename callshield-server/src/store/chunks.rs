//! Transcript chunk persistence
//!
//! Append-only. The `(call_id, source_event_id)` unique key makes repeat
//! deliveries of the same provider event a no-op.

use super::{LiveStore, TranscriptChunk};
use callshield_common::events::CoachEvent;
use callshield_common::{Result, Speaker};
use crate::ingest::TranscriptFragment;
use tracing::debug;

impl LiveStore {
    /// Insert one transcript chunk; returns `false` when the fingerprint
    /// was already recorded.
    pub async fn append_chunk(&self, call_id: &str, fragment: &TranscriptFragment) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO transcript_chunks \
             (call_id, source_event_id, speaker, text, timestamp_ms, is_final) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(call_id, source_event_id) DO NOTHING",
        )
        .bind(call_id)
        .bind(&fragment.source_event_id)
        .bind(fragment.speaker.as_str())
        .bind(&fragment.text)
        .bind(fragment.timestamp_ms)
        .bind(fragment.is_final as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(call_id = %call_id, "Duplicate transcript chunk ignored");
            return Ok(false);
        }

        let _ = self.events.send(CoachEvent::TranscriptAppended {
            call_id: call_id.to_string(),
            chunk_id: result.last_insert_rowid(),
            speaker: fragment.speaker,
            text: fragment.text.clone(),
            timestamp_ms: fragment.timestamp_ms,
            is_final: fragment.is_final,
        });
        Ok(true)
    }

    /// Last `limit` chunks for a call, ordered by insertion id ascending.
    pub async fn get_chunks(&self, call_id: &str, limit: usize) -> Result<Vec<TranscriptChunk>> {
        let rows = sqlx::query_as::<_, (i64, String, String, i64, i64)>(
            "SELECT id, speaker, text, timestamp_ms, is_final FROM ( \
                 SELECT id, speaker, text, timestamp_ms, is_final \
                 FROM transcript_chunks WHERE call_id = ?1 \
                 ORDER BY id DESC LIMIT ?2 \
             ) ORDER BY id ASC",
        )
        .bind(call_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, speaker, text, timestamp_ms, is_final)| TranscriptChunk {
                id,
                speaker: Speaker::from_db(&speaker),
                text,
                timestamp_ms,
                is_final: is_final != 0,
            })
            .collect())
    }
}

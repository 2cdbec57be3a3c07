//! Live store: session rows, transcript chunks and change notifications
//!
//! All persisted state lives in SQLite. Every mutation bumps the row
//! version and publishes a [`CoachEvent`] on the broadcast channel so SSE
//! subscribers see the change without polling.

mod cases;
mod chunks;
mod sessions;

use callshield_common::events::CoachEvent;
use callshield_common::{CallStatus, CoachingAdvice, Result, Speaker};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::warn;

pub use cases::CaseRow;

/// Session row as read by the worker and the live view
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub call_id: String,
    pub slug: String,
    pub status: CallStatus,
    pub assistant_muted: bool,
    pub analyzing: bool,
    pub last_error: Option<String>,
    pub advice: Option<CoachingAdvice>,
    pub last_advice_at: Option<i64>,
    pub updated_at: i64,
    pub version: i64,
}

/// One transcript chunk, ordered by insertion id within a call
#[derive(Debug, Clone)]
pub struct TranscriptChunk {
    pub id: i64,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp_ms: i64,
    pub is_final: bool,
}

/// Session summary plus the recent transcript window
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub summary: SessionSummary,
    pub transcript: Vec<TranscriptChunk>,
}

/// Handle on the persistence layer plus the push channel
#[derive(Clone)]
pub struct LiveStore {
    pool: SqlitePool,
    events: broadcast::Sender<CoachEvent>,
}

type SessionTuple = (
    String,         // call_id
    String,         // slug
    String,         // status
    i64,            // assistant_muted
    i64,            // analyzing
    Option<String>, // last_error
    Option<String>, // advice JSON
    Option<i64>,    // last_advice_at
    i64,            // updated_at
    i64,            // version
);

const SESSION_COLUMNS: &str = "call_id, slug, status, assistant_muted, analyzing, \
                               last_error, advice, last_advice_at, updated_at, version";

impl LiveStore {
    pub fn new(pool: SqlitePool, events: broadcast::Sender<CoachEvent>) -> Self {
        Self { pool, events }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Subscribe to row-change events (all calls; filter by call id)
    pub fn subscribe(&self) -> broadcast::Receiver<CoachEvent> {
        self.events.subscribe()
    }

    /// Session summary, or `None` when the call id is unknown
    pub async fn get_summary(&self, call_id: &str) -> Result<Option<SessionSummary>> {
        let row = sqlx::query_as::<_, SessionTuple>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE call_id = ?1"
        ))
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(summary_from_tuple))
    }

    /// Snapshot for the live view; `None` when the row is absent or the
    /// slug does not match.
    pub async fn get_snapshot(
        &self,
        call_id: &str,
        slug: &str,
        transcript_limit: usize,
    ) -> Result<Option<SessionSnapshot>> {
        let Some(summary) = self.get_summary(call_id).await? else {
            return Ok(None);
        };
        if summary.slug != slug {
            return Ok(None);
        }
        let transcript = self.get_chunks(call_id, transcript_limit).await?;
        Ok(Some(SessionSnapshot {
            summary,
            transcript,
        }))
    }

    /// Publish the current row state to push subscribers.
    async fn publish_session(&self, call_id: &str) {
        match self.get_summary(call_id).await {
            Ok(Some(summary)) => {
                // No receivers is fine
                let _ = self.events.send(CoachEvent::SessionChanged {
                    call_id: summary.call_id,
                    status: summary.status,
                    analyzing: summary.analyzing,
                    last_error: summary.last_error,
                    advice: summary.advice,
                    version: summary.version,
                });
            }
            Ok(None) => {}
            Err(e) => warn!(call_id = %call_id, "Failed to read session for notification: {e}"),
        }
    }
}

fn summary_from_tuple(row: SessionTuple) -> SessionSummary {
    let advice = row.6.as_deref().and_then(|json| {
        serde_json::from_str::<CoachingAdvice>(json)
            .map_err(|e| warn!("Dropping unreadable advice JSON: {e}"))
            .ok()
    });
    SessionSummary {
        call_id: row.0,
        slug: row.1,
        status: CallStatus::from_db(&row.2),
        assistant_muted: row.3 != 0,
        analyzing: row.4 != 0,
        last_error: row.5,
        advice,
        last_advice_at: row.7,
        updated_at: row.8,
        version: row.9,
    }
}

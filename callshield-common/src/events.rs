//! Event types for the CallShield push channel
//!
//! Row-level change notifications published by the live store and fanned
//! out to SSE subscribers keyed by call id. Events are broadcast via a
//! `tokio::sync::broadcast` channel and serialized for SSE transmission.

use crate::{CoachingAdvice, CallStatus, Speaker};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Row-change events keyed by `call_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoachEvent {
    /// The session row mutated (status, advice, analyzing or last_error)
    #[serde(rename_all = "camelCase")]
    SessionChanged {
        call_id: String,
        status: CallStatus,
        analyzing: bool,
        last_error: Option<String>,
        advice: Option<CoachingAdvice>,
        version: i64,
    },

    /// A new transcript chunk was inserted
    #[serde(rename_all = "camelCase")]
    TranscriptAppended {
        call_id: String,
        chunk_id: i64,
        speaker: Speaker,
        text: String,
        timestamp_ms: i64,
        is_final: bool,
    },
}

impl CoachEvent {
    /// Call id the event belongs to, for per-subscriber filtering
    pub fn call_id(&self) -> &str {
        match self {
            CoachEvent::SessionChanged { call_id, .. } => call_id,
            CoachEvent::TranscriptAppended { call_id, .. } => call_id,
        }
    }

    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            CoachEvent::SessionChanged { .. } => "SessionChanged",
            CoachEvent::TranscriptAppended { .. } => "TranscriptAppended",
        }
    }
}

/// Create the shared broadcast channel for row-change events
pub fn event_channel(capacity: usize) -> broadcast::Sender<CoachEvent> {
    let (tx, _) = broadcast::channel(capacity);
    tx
}

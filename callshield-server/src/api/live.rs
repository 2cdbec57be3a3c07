//! Live view snapshot endpoint
//!
//! `GET /live?callId=&slug=` returns the session state plus the recent
//! transcript window. The browser polls this as a fallback when the SSE
//! channel is not connected, so responses are never cached.

use super::server::AppContext;
use crate::error::ApiError;
use crate::store::SessionSnapshot;
use callshield_common::{CoachingAdvice, Error};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveQuery {
    pub call_id: String,
    pub slug: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveResponse {
    pub ok: bool,
    pub call_id: String,
    pub slug: String,
    pub status: String,
    pub assistant_muted: bool,
    pub analyzing: bool,
    pub last_error: Option<String>,
    pub updated_at: i64,
    pub version: i64,
    pub advice: Option<CoachingAdvice>,
    pub transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub id: i64,
    pub speaker: String,
    pub text: String,
    pub timestamp_ms: i64,
    pub is_final: bool,
}

/// GET /live - session snapshot for the live view
pub async fn snapshot(
    State(ctx): State<AppContext>,
    Query(query): Query<LiveQuery>,
) -> Result<Response, ApiError> {
    let snapshot = ctx
        .store
        .get_snapshot(&query.call_id, &query.slug, ctx.config.live_transcript_limit)
        .await?
        .ok_or_else(|| Error::NotFound("call not found".into()))?;

    let body = to_response(snapshot);
    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(body),
    )
        .into_response())
}

fn to_response(snapshot: SessionSnapshot) -> LiveResponse {
    let summary = snapshot.summary;
    LiveResponse {
        ok: true,
        call_id: summary.call_id,
        slug: summary.slug,
        status: summary.status.as_str().to_string(),
        assistant_muted: summary.assistant_muted,
        analyzing: summary.analyzing,
        last_error: summary.last_error,
        updated_at: summary.updated_at,
        version: summary.version,
        advice: summary.advice,
        transcript: snapshot
            .transcript
            .into_iter()
            .map(|c| TranscriptEntry {
                id: c.id,
                speaker: c.speaker.as_str().to_string(),
                text: c.text,
                timestamp_ms: c.timestamp_ms,
                is_final: c.is_final,
            })
            .collect(),
    }
}

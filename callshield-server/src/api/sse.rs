//! Server-Sent Events push channel
//!
//! Streams row-change events for one call to the live view. The client
//! merges these with its polling fallback, deduplicating transcript
//! entries by chunk id.

use super::server::AppContext;
use callshield_common::events::CoachEvent;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub call_id: String,
}

/// GET /events - per-call SSE stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(call_id = %query.call_id, "SSE client connected");

    let mut rx = ctx.store.subscribe();

    // Current row state fetched before the stream starts so a client
    // that reconnects immediately sees where things stand.
    let initial = ctx.store.get_summary(&query.call_id).await.ok().flatten();

    let call_id = query.call_id;
    let stream = async_stream::stream! {
        if let Some(summary) = initial {
            let event = CoachEvent::SessionChanged {
                call_id: summary.call_id,
                status: summary.status,
                analyzing: summary.analyzing,
                last_error: summary.last_error,
                advice: summary.advice,
                version: summary.version,
            };
            if let Some(sse) = encode(&event) {
                yield Ok(sse);
            }
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.call_id() != call_id {
                        continue;
                    }
                    if let Some(sse) = encode(&event) {
                        yield Ok(sse);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    // The client will catch up via the snapshot poll
                    debug!(skipped = n, "SSE subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn encode(event: &CoachEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("Failed to serialize push event: {e}");
            None
        }
    }
}

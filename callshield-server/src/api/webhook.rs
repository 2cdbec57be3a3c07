//! Webhook ingest endpoint
//!
//! `POST /webhook?slug=...` receives call status and live transcription
//! events from the telephony provider. The body is read raw (the
//! signature covers the exact bytes), verified, parsed, persisted, and
//! acknowledged with 200 before any advice work runs; scoring failures
//! are the worker's problem, not the provider's.

use super::server::AppContext;
use crate::error::ApiError;
use crate::ingest::{self, signature};
use callshield_common::{slug, Error};
use axum::body::Bytes;
use axum::extract::{OriginalUri, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    pub slug: Option<String>,
    #[serde(rename = "bodySHA256")]
    pub body_sha256: Option<String>,
}

/// POST /webhook - ingest one provider event
pub async fn ingest(
    State(ctx): State<AppContext>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !ctx.config.skip_signature_validation {
        verify_signature(&ctx, &uri, &headers, content_type.as_deref(), &query, &body)?;
    }

    let event = ingest::event::parse_event(
        content_type.as_deref(),
        &body,
        query.slug.as_deref(),
    );

    // Account mismatch means the event is not ours.
    if let (Some(expected), Some(got)) =
        (ctx.config.provider.account_id.as_deref(), event.account_id.as_deref())
    {
        if expected != got {
            warn!("Webhook account mismatch");
            return Err(Error::Unauthorized("account mismatch".into()).into());
        }
    }

    // Events without a call id carry nothing we can anchor; acknowledge
    // and move on so the provider does not retry forever.
    let Some(call_id) = event.call_id.clone() else {
        debug!("Webhook event without call id acknowledged");
        return Ok(Json(json!({ "ok": true })));
    };

    let resolved_slug = match event.slug.clone() {
        Some(s) => slug::validate(&s).map(str::to_string)?,
        None => ctx
            .store
            .get_summary(&call_id)
            .await?
            .map(|summary| summary.slug)
            .ok_or_else(|| Error::BadRequest("case id required".into()))?,
    };

    ctx.store
        .upsert_session(&call_id, &resolved_slug, event.status)
        .await?;

    let mut force_model = event
        .status
        .map(|s| s.is_terminal())
        .unwrap_or(false);

    if let Some(fragment) = &event.transcript {
        ctx.store.append_chunk(&call_id, fragment).await?;
        force_model |= fragment.is_final;
    }

    ctx.dispatcher.enqueue(&call_id, force_model);

    Ok(Json(json!({ "ok": true })))
}

/// Verify the provider signature against the candidate URL set.
fn verify_signature(
    ctx: &AppContext,
    uri: &axum::http::Uri,
    headers: &HeaderMap,
    content_type: Option<&str>,
    query: &WebhookQuery,
    body: &[u8],
) -> Result<(), ApiError> {
    let Some(auth_token) = ctx.config.provider.auth_token.as_deref() else {
        warn!("Webhook received but no provider auth token configured");
        return Err(Error::Unauthorized("verification unavailable".into()).into());
    };

    let signature = headers
        .get("x-twilio-signature")
        .or_else(|| headers.get("x-provider-signature"))
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Unauthorized("missing signature".into()))?;

    let candidates = url_candidates(ctx, uri, headers);

    let is_json = content_type
        .map(|ct| ct.to_lowercase().contains("json"))
        .unwrap_or(false)
        || matches!(
            body.iter().find(|b| !b.is_ascii_whitespace()),
            Some(b'{') | Some(b'[')
        );

    let verified = if is_json {
        signature::verify(
            auth_token,
            signature,
            &candidates,
            None,
            body,
            query.body_sha256.as_deref(),
        )
    } else {
        let params: Vec<(String, String)> = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        signature::verify(auth_token, signature, &candidates, Some(&params), body, None)
    };

    if !verified {
        warn!("Webhook signature rejected");
        return Err(Error::Unauthorized("bad signature".into()).into());
    }
    Ok(())
}

/// URLs the signature may have been computed against: the request as
/// received (either scheme), the proxy-forwarded rewrite, and the
/// configured public base.
fn url_candidates(ctx: &AppContext, uri: &axum::http::Uri, headers: &HeaderMap) -> Vec<String> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let mut candidates = Vec::new();
    let mut push = |url: String| {
        if !candidates.contains(&url) {
            candidates.push(url);
        }
    };

    if let Some(host) = header_str(headers, "host") {
        push(format!("https://{host}{path_and_query}"));
        push(format!("http://{host}{path_and_query}"));
    }

    if let Some(fwd_host) = header_str(headers, "x-forwarded-host") {
        let proto = header_str(headers, "x-forwarded-proto").unwrap_or("https");
        push(format!("{proto}://{fwd_host}{path_and_query}"));
    }

    if let Some(base) = ctx.config.public_base_url.as_deref() {
        push(format!("{}{path_and_query}", base.trim_end_matches('/')));
    }

    candidates
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

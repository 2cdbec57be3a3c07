//! Case provisioning and outbound call placement
//!
//! Thin collaborators around the coaching core: create a case, store the
//! protected number, and trigger the monitor call that the provider
//! bridges into the user's conversation.

use super::server::AppContext;
use crate::error::ApiError;
use callshield_common::{phone, slug, Error};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

/// Call placement: 5 requests per IP per minute
const CALL_IP_LIMIT: u32 = 5;
const CALL_IP_WINDOW: Duration = Duration::from_secs(60);

/// Call placement: one per case every 30 seconds
const CALL_CASE_COOLDOWN: Duration = Duration::from_secs(30);

/// Phone save: 20 requests per IP per 10 minutes
const PHONE_IP_LIMIT: u32 = 20;
const PHONE_IP_WINDOW: Duration = Duration::from_secs(600);

#[derive(Debug, Deserialize)]
pub struct PlaceCallRequest {
    pub slug: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePhoneRequest {
    pub slug: String,
    pub phone_number: String,
    #[serde(default, rename = "override")]
    pub allow_override: bool,
}

/// GET /health - health check endpoint
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "module": "callshield",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET / - landing page
pub async fn landing() -> Html<&'static str> {
    Html(
        "<!doctype html><html><body>\
         <h1>CallShield</h1>\
         <p><a href=\"/start\">Start a new case</a></p>\
         </body></html>",
    )
}

/// GET /start - provision a fresh case and redirect to its page
pub async fn start_case(State(ctx): State<AppContext>) -> Result<Response, ApiError> {
    let case_slug = slug::generate();
    ctx.store.create_case(&case_slug).await?;
    info!(slug = %case_slug, "Case provisioned");
    Ok(Redirect::to(&format!("/t/{case_slug}")).into_response())
}

/// GET /t/:slug - live view shell for a case
pub async fn case_page(
    State(ctx): State<AppContext>,
    Path(case_slug): Path<String>,
) -> Result<Html<String>, ApiError> {
    slug::validate(&case_slug)?;
    ctx.store
        .get_case(&case_slug)
        .await?
        .ok_or_else(|| Error::NotFound("unknown case".into()))?;

    Ok(Html(format!(
        "<!doctype html><html><body data-slug=\"{case_slug}\">\
         <h1>CallShield case {case_slug}</h1>\
         <p>Save your number, then trigger the monitor call when a call feels wrong.</p>\
         </body></html>"
    )))
}

/// POST /call - place the outbound monitor call
pub async fn place_call(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<PlaceCallRequest>,
) -> Result<Json<Value>, ApiError> {
    slug::validate(&req.slug)?;

    let ip = client_ip(&headers);
    if !ctx
        .limiter
        .take(&format!("call:{ip}"), CALL_IP_LIMIT, CALL_IP_WINDOW)
    {
        return Err(Error::RateLimited { retry_after_secs: 60 }.into());
    }
    let remaining = ctx
        .limiter
        .take_cooldown(&format!("cooldown:{}", req.slug), CALL_CASE_COOLDOWN);
    if remaining > 0 {
        return Err(Error::RateLimited { retry_after_secs: remaining }.into());
    }

    let case = ctx
        .store
        .get_case(&req.slug)
        .await?
        .ok_or_else(|| Error::NotFound("unknown case".into()))?;
    let to = case
        .phone_number
        .ok_or_else(|| Error::BadRequest("no phone number on file for this case".into()))?;

    let telephony = ctx
        .telephony
        .as_ref()
        .ok_or_else(|| Error::Internal("telephony provider not configured".into()))?;

    let webhook_url = webhook_url(&ctx, &headers, &req.slug);
    let placed = telephony.place_monitor_call(&to, &webhook_url).await?;

    let status = callshield_common::CallStatus::normalize(&placed.status);
    ctx.store
        .upsert_session(&placed.call_id, &req.slug, Some(status))
        .await?;

    Ok(Json(json!({
        "ok": true,
        "callId": placed.call_id,
        "status": status.as_str(),
    })))
}

/// PUT /phone - set or confirm the protected number
pub async fn save_phone(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<SavePhoneRequest>,
) -> Result<Json<Value>, ApiError> {
    slug::validate(&req.slug)?;

    let ip = client_ip(&headers);
    if !ctx
        .limiter
        .take(&format!("phone:{ip}"), PHONE_IP_LIMIT, PHONE_IP_WINDOW)
    {
        return Err(Error::RateLimited { retry_after_secs: 600 }.into());
    }

    let normalized = phone::normalize_e164(&req.phone_number)?;
    ctx.store
        .set_phone(&req.slug, &normalized, req.allow_override)
        .await?;

    Ok(Json(json!({ "ok": true, "phoneNumber": normalized })))
}

/// Webhook callback URL for outbound call placement: the configured
/// public base wins, then forwarded headers, then the bare host.
fn webhook_url(ctx: &AppContext, headers: &HeaderMap, case_slug: &str) -> String {
    let base = ctx
        .config
        .public_base_url
        .clone()
        .or_else(|| {
            let host = headers
                .get("x-forwarded-host")
                .or_else(|| headers.get("host"))
                .and_then(|v| v.to_str().ok())?;
            let proto = headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("https");
            Some(format!("{proto}://{host}"))
        })
        .unwrap_or_else(|| "http://localhost:5760".to_string());

    format!("{}/webhook?slug={case_slug}", base.trim_end_matches('/'))
}

/// Client address for rate limiting: first forwarded hop, else direct.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "direct".to_string())
}

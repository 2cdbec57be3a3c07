//! Shared test helpers: in-memory server construction and request plumbing
#![allow(dead_code)]

use axum::http::StatusCode;
use axum::Router;
use callshield_common::events::event_channel;
use callshield_server::advice::ModelClient;
use callshield_server::api::{create_router, AppContext};
use callshield_server::config::{Config, ModelSettings, ProviderSettings};
use callshield_server::limiter::RateLimiter;
use callshield_server::store::LiveStore;
use callshield_server::worker::AdviceDispatcher;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Everything a test needs to drive the service
pub struct TestApp {
    pub router: Router,
    pub store: LiveStore,
    pub dispatcher: AdviceDispatcher,
    pub config: Arc<Config>,
    _dir: TempDir,
}

/// Base config: signature checks off, no model, no provider.
pub fn test_config() -> Config {
    Config {
        port: 0,
        db_path: PathBuf::from("unused"),
        model: ModelSettings {
            api_key: None,
            name: "test-model".into(),
            base_url: "http://127.0.0.1:1".into(),
            rpm_limit: 30,
            min_interval_ms: None,
        },
        provider: ProviderSettings {
            account_id: None,
            auth_token: None,
            from_number: None,
            base_url: "http://127.0.0.1:1".into(),
        },
        skip_signature_validation: true,
        public_base_url: None,
        live_transcript_limit: 200,
    }
}

/// Build a test app with the given config and optional model client.
pub async fn setup_app_with(config: Config, model: Option<ModelClient>) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = callshield_common::db::init_database(&dir.path().join("test.db"))
        .await
        .expect("db init");

    let store = LiveStore::new(pool, event_channel(64));
    let dispatcher = AdviceDispatcher::new(store.clone(), model, config.model_min_interval());
    let config = Arc::new(config);

    let ctx = AppContext {
        store: store.clone(),
        dispatcher: dispatcher.clone(),
        limiter: RateLimiter::new(),
        telephony: None,
        config: Arc::clone(&config),
    };

    TestApp {
        router: create_router(ctx),
        store,
        dispatcher,
        config,
        _dir: dir,
    }
}

/// Build a test app with signature checks disabled.
pub async fn setup_app() -> TestApp {
    setup_app_with(test_config(), None).await
}

/// Drive one request through the router.
pub async fn request(
    app: &Router,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<(&str, Vec<u8>)>,
) -> (StatusCode, Vec<(String, String)>, Option<Value>) {
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let mut builder = http::Request::builder().method(method).uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let request = match body {
        Some((content_type, bytes)) => builder
            .header("content-type", content_type)
            .body(axum::body::Body::from(bytes))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let header_pairs = response
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(&bytes).ok()
    };

    (status, header_pairs, json)
}

/// Post a form-encoded webhook event.
pub async fn post_webhook(app: &Router, slug: &str, form_body: &str) -> StatusCode {
    let (status, _, _) = request(
        app,
        "POST",
        &format!("/webhook?slug={slug}"),
        &[],
        Some((
            "application/x-www-form-urlencoded",
            form_body.as_bytes().to_vec(),
        )),
    )
    .await;
    status
}

/// Poll /live until `predicate` passes or the deadline expires.
pub async fn poll_live_until(
    app: &Router,
    call_id: &str,
    slug: &str,
    deadline: Duration,
    predicate: impl Fn(&Value) -> bool,
) -> Value {
    let start = std::time::Instant::now();
    loop {
        let (status, _, body) = request(
            app,
            "GET",
            &format!("/live?callId={call_id}&slug={slug}"),
            &[],
            None,
        )
        .await;
        if status == StatusCode::OK {
            let body = body.expect("live body");
            if predicate(&body) {
                return body;
            }
        }
        if start.elapsed() > deadline {
            panic!("live view never reached the expected state");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

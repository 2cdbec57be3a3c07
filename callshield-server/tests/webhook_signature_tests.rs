//! Webhook signature enforcement tests
//!
//! Signatures are computed with the real HMAC helper against the same
//! URL-candidate rules the handler applies.

mod helpers;

use axum::http::StatusCode;
use callshield_server::ingest::signature;
use helpers::{request, setup_app_with, test_config};
use sha2::{Digest, Sha256};

const AUTH_TOKEN: &str = "test-auth-token";
const ACCOUNT_ID: &str = "AC-test-account";

fn signed_config() -> callshield_server::config::Config {
    let mut config = test_config();
    config.skip_signature_validation = false;
    config.provider.auth_token = Some(AUTH_TOKEN.to_string());
    config.provider.account_id = Some(ACCOUNT_ID.to_string());
    config
}

fn form_pairs(body: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(body.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[tokio::test]
async fn valid_form_signature_is_accepted() {
    let app = setup_app_with(signed_config(), None).await;

    let body = "CallSid=CA1&CallStatus=ringing";
    let url = "https://coach.test/webhook?slug=sig-case";
    let sig = signature::compute(AUTH_TOKEN, url, &form_pairs(body));

    let (status, _, json) = request(
        &app.router,
        "POST",
        "/webhook?slug=sig-case",
        &[("host", "coach.test"), ("x-twilio-signature", sig.as_str())],
        Some((
            "application/x-www-form-urlencoded",
            body.as_bytes().to_vec(),
        )),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.unwrap()["ok"], true);
    assert!(app.store.get_summary("CA1").await.unwrap().is_some());
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let app = setup_app_with(signed_config(), None).await;
    let (status, _, _) = request(
        &app.router,
        "POST",
        "/webhook?slug=sig-case",
        &[("host", "coach.test")],
        Some((
            "application/x-www-form-urlencoded",
            b"CallSid=CA2&CallStatus=ringing".to_vec(),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(app.store.get_summary("CA2").await.unwrap().is_none());
}

#[tokio::test]
async fn signature_over_foreign_url_is_rejected() {
    let app = setup_app_with(signed_config(), None).await;

    let body = "CallSid=CA3&CallStatus=ringing";
    // Signed against a URL outside the candidate set
    let sig = signature::compute(
        AUTH_TOKEN,
        "https://attacker.example/webhook?slug=sig-case",
        &form_pairs(body),
    );

    let (status, _, _) = request(
        &app.router,
        "POST",
        "/webhook?slug=sig-case",
        &[("host", "coach.test"), ("x-twilio-signature", sig.as_str())],
        Some((
            "application/x-www-form-urlencoded",
            body.as_bytes().to_vec(),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tampered_body_is_rejected() {
    let app = setup_app_with(signed_config(), None).await;

    let url = "https://coach.test/webhook?slug=sig-case";
    let sig = signature::compute(
        AUTH_TOKEN,
        url,
        &form_pairs("CallSid=CA4&CallStatus=ringing"),
    );

    let (status, _, _) = request(
        &app.router,
        "POST",
        "/webhook?slug=sig-case",
        &[("host", "coach.test"), ("x-twilio-signature", sig.as_str())],
        Some((
            "application/x-www-form-urlencoded",
            b"CallSid=CA4&CallStatus=completed".to_vec(),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn proxy_forwarded_url_is_a_valid_candidate() {
    let app = setup_app_with(signed_config(), None).await;

    let body = "CallSid=CA5&CallStatus=ringing";
    let sig = signature::compute(
        AUTH_TOKEN,
        "https://public.coach.example/webhook?slug=sig-case",
        &form_pairs(body),
    );

    let (status, _, _) = request(
        &app.router,
        "POST",
        "/webhook?slug=sig-case",
        &[
            ("host", "10.0.0.5:5760"),
            ("x-forwarded-host", "public.coach.example"),
            ("x-forwarded-proto", "https"),
            ("x-twilio-signature", sig.as_str()),
        ],
        Some((
            "application/x-www-form-urlencoded",
            body.as_bytes().to_vec(),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn json_body_verified_through_body_sha256() {
    let app = setup_app_with(signed_config(), None).await;

    let body = serde_json::json!({
        "CallSid": "CA6",
        "CallStatus": "in-progress",
    })
    .to_string();
    let digest: String = Sha256::digest(body.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();

    let path = format!("/webhook?slug=sig-case&bodySHA256={digest}");
    let url = format!("https://coach.test{path}");
    let sig = signature::compute(AUTH_TOKEN, &url, &[]);

    let (status, _, _) = request(
        &app.router,
        "POST",
        &path,
        &[("host", "coach.test"), ("x-twilio-signature", sig.as_str())],
        Some(("application/json", body.clone().into_bytes())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Same signature with a different body fails the digest check
    let (status, _, _) = request(
        &app.router,
        "POST",
        &path,
        &[("host", "coach.test"), ("x-twilio-signature", sig.as_str())],
        Some((
            "application/json",
            br#"{"CallSid":"CA6","CallStatus":"completed"}"#.to_vec(),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn account_mismatch_is_rejected() {
    let app = setup_app_with(signed_config(), None).await;

    let body = "CallSid=CA7&AccountSid=AC-other&CallStatus=ringing";
    let url = "https://coach.test/webhook?slug=sig-case";
    let sig = signature::compute(AUTH_TOKEN, url, &form_pairs(body));

    let (status, _, _) = request(
        &app.router,
        "POST",
        "/webhook?slug=sig-case",
        &[("host", "coach.test"), ("x-twilio-signature", sig.as_str())],
        Some((
            "application/x-www-form-urlencoded",
            body.as_bytes().to_vec(),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn matching_account_is_accepted() {
    let app = setup_app_with(signed_config(), None).await;

    let body = format!("CallSid=CA8&AccountSid={ACCOUNT_ID}&CallStatus=ringing");
    let url = "https://coach.test/webhook?slug=sig-case";
    let sig = signature::compute(AUTH_TOKEN, url, &form_pairs(&body));

    let (status, _, _) = request(
        &app.router,
        "POST",
        "/webhook?slug=sig-case",
        &[("host", "coach.test"), ("x-twilio-signature", sig.as_str())],
        Some((
            "application/x-www-form-urlencoded",
            body.as_bytes().to_vec(),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

//! Webhook signature verification
//!
//! Provider callbacks carry an HMAC-SHA1 signature. For form-encoded
//! bodies the signed material is the full callback URL followed by the
//! sorted `key value` concatenation; for JSON bodies the URL must carry a
//! `bodySHA256` query parameter matching the raw body, and the signature
//! covers the URL alone. Because the service usually sits behind a proxy,
//! a small set of URL candidates is tried. Comparisons are constant-time.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;

/// Compute the provider signature for a URL + sorted form params.
///
/// Exposed so tests (and the outbound call placer) can produce valid
/// signatures.
pub fn compute(auth_token: &str, url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(url.as_bytes());
    for (k, v) in sorted {
        mac.update(k.as_bytes());
        mac.update(v.as_bytes());
    }
    BASE64.encode(mac.finalize().into_bytes())
}

/// Verify a signature against each candidate URL.
///
/// `form_params` must be `Some` for form-encoded bodies and `None` for
/// JSON bodies; in the JSON case `body_sha256_param` (the `bodySHA256`
/// query value) must hash-match `body`.
pub fn verify(
    auth_token: &str,
    signature: &str,
    url_candidates: &[String],
    form_params: Option<&[(String, String)]>,
    body: &[u8],
    body_sha256_param: Option<&str>,
) -> bool {
    match form_params {
        Some(params) => url_candidates.iter().any(|url| {
            let expected = compute(auth_token, url, params);
            constant_time_eq(expected.as_bytes(), signature.as_bytes())
        }),
        None => {
            // JSON body integrity is carried by the bodySHA256 parameter.
            let Some(declared) = body_sha256_param else {
                return false;
            };
            let actual = hex_sha256(body);
            if !constant_time_eq(actual.as_bytes(), declared.to_lowercase().as_bytes()) {
                return false;
            }
            url_candidates.iter().any(|url| {
                let expected = compute(auth_token, url, &[]);
                constant_time_eq(expected.as_bytes(), signature.as_bytes())
            })
        }
    }
}

fn hex_sha256(body: &[u8]) -> String {
    Sha256::digest(body)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

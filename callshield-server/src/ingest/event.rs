//! Transcript-event parser
//!
//! Telephony providers deliver speech-to-text callbacks as either
//! form-encoded or JSON bodies, with field names that vary per provider
//! ("CallSid" vs "call_sid" vs nested objects). The parser sniffs the
//! content type, resolves each semantic field through an alias set with
//! normalized key matching, and builds a deterministic deduplication
//! fingerprint for the transcript chunk.

use callshield_common::time::now_ms;
use callshield_common::{CallStatus, Speaker};
use regex::Regex;
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Maximum depth for the JSON tree walk
const MAX_JSON_DEPTH: usize = 4;

static FINAL_EVENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(final|complete|stopped)").unwrap());

/// One parsed provider event
#[derive(Debug, Clone, Default)]
pub struct ParsedEvent {
    pub call_id: Option<String>,
    pub account_id: Option<String>,
    pub slug: Option<String>,
    pub status: Option<CallStatus>,
    pub transcript: Option<TranscriptFragment>,
}

/// A transcript chunk extracted from one event
#[derive(Debug, Clone)]
pub struct TranscriptFragment {
    pub text: String,
    pub speaker: Speaker,
    pub is_final: bool,
    pub timestamp_ms: i64,
    /// Deduplication fingerprint; unique per `(call_id, source chunk)`
    pub source_event_id: String,
}

/// Field access over a loosely-typed provider payload
///
/// Backed by either a flat form map or a JSON tree. Lookup normalizes
/// keys (strip non-alphanumerics, lowercase) so `CallSid`, `callSid` and
/// `call_sid` all resolve through one alias.
pub enum FieldExtractor {
    Form(HashMap<String, String>),
    Json(Value),
}

impl FieldExtractor {
    /// Sniff the body: declared JSON, or a body starting with `{`/`[`,
    /// parses as JSON; anything else parses as form-encoded.
    pub fn from_body(content_type: Option<&str>, body: &[u8]) -> Self {
        let declared_json = content_type
            .map(|ct| ct.to_lowercase().contains("json"))
            .unwrap_or(false);
        let first = body.iter().find(|b| !b.is_ascii_whitespace());
        let looks_json = matches!(first, Some(b'{') | Some(b'['));

        if declared_json || looks_json {
            if let Ok(value) = serde_json::from_slice::<Value>(body) {
                return FieldExtractor::Json(value);
            }
        }

        let map = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        FieldExtractor::Form(map)
    }

    /// First value matching any of the aliases, searched in alias order.
    pub fn get(&self, aliases: &[&str]) -> Option<String> {
        for alias in aliases {
            let wanted = normalize_key(alias);
            match self {
                FieldExtractor::Form(map) => {
                    if let Some(v) = map
                        .iter()
                        .find(|(k, _)| normalize_key(k) == wanted)
                        .map(|(_, v)| v.clone())
                    {
                        if !v.trim().is_empty() {
                            return Some(v);
                        }
                    }
                }
                FieldExtractor::Json(root) => {
                    if let Some(v) = find_in_tree(root, &wanted, 0) {
                        let s = value_to_string(v);
                        if !s.trim().is_empty() {
                            return Some(s);
                        }
                    }
                }
            }
        }
        None
    }

    /// Raw value lookup, used for nested objects like `TranscriptionData`.
    /// Form values holding serialized JSON are parsed transparently.
    fn get_tree(&self, aliases: &[&str]) -> Option<Value> {
        for alias in aliases {
            let wanted = normalize_key(alias);
            match self {
                FieldExtractor::Form(map) => {
                    if let Some(raw) = map
                        .iter()
                        .find(|(k, _)| normalize_key(k) == wanted)
                        .map(|(_, v)| v)
                    {
                        if let Ok(v) = serde_json::from_str::<Value>(raw) {
                            return Some(v);
                        }
                    }
                }
                FieldExtractor::Json(root) => {
                    if let Some(v) = find_in_tree(root, &wanted, 0) {
                        if v.is_object() || v.is_array() {
                            return Some(v.clone());
                        }
                        // Nested object serialized as a string
                        if let Some(s) = v.as_str() {
                            if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                                return Some(parsed);
                            }
                        }
                    }
                }
            }
        }
        None
    }
}

/// Strip non-alphanumerics and lowercase, so `call_sid` == `CallSid`.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Depth-first search of the JSON tree for a normalized key.
fn find_in_tree<'a>(value: &'a Value, wanted: &str, depth: usize) -> Option<&'a Value> {
    if depth >= MAX_JSON_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if normalize_key(k) == wanted {
                    return Some(v);
                }
            }
            for v in map.values() {
                if let Some(found) = find_in_tree(v, wanted, depth + 1) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items
            .iter()
            .find_map(|v| find_in_tree(v, wanted, depth + 1)),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Parse one provider event body.
///
/// `slug_hint` is the `?slug=` query parameter, which wins over any slug
/// field inside the payload.
pub fn parse_event(
    content_type: Option<&str>,
    body: &[u8],
    slug_hint: Option<&str>,
) -> ParsedEvent {
    let fields = FieldExtractor::from_body(content_type, body);

    let call_id = fields.get(&["CallSid", "CallId"]);
    let account_id = fields.get(&["AccountSid", "AccountId"]);
    let slug = slug_hint
        .map(|s| s.to_string())
        .or_else(|| fields.get(&["Slug", "CaseSlug", "Case"]));
    let status = fields
        .get(&["CallStatus", "CallbackStatus", "Status"])
        .map(|s| CallStatus::normalize(&s));

    let transcript = extract_transcript(&fields, call_id.as_deref());

    ParsedEvent {
        call_id,
        account_id,
        slug,
        status,
        transcript,
    }
}

fn extract_transcript(fields: &FieldExtractor, call_id: Option<&str>) -> Option<TranscriptFragment> {
    let transcription_data = fields.get_tree(&["TranscriptionData"]);

    // Direct text fields first, then the nested TranscriptionData object
    // (first segment when the provider batches them).
    let text = fields
        .get(&["TranscriptionText", "Transcript", "Text", "SpeechResult"])
        .or_else(|| transcription_data.as_ref().and_then(extract_nested_text))?;
    let text = text.trim().to_string();
    if text.is_empty() {
        return None;
    }

    let speaker = Speaker::classify(
        fields
            .get(&["Track", "Channel", "ParticipantRole"])
            .as_deref(),
    );

    let is_final = fields
        .get(&["IsFinal", "Final"])
        .map(|v| parse_bool(&v))
        .or_else(|| {
            transcription_data
                .as_ref()
                .and_then(|d| find_in_tree(d, "isfinal", 0))
                .and_then(Value::as_bool)
        })
        .unwrap_or_else(|| {
            fields
                .get(&["TranscriptionEvent", "EventType", "Event"])
                .map(|e| FINAL_EVENT_RE.is_match(&e))
                .unwrap_or(false)
        });

    let timestamp_ms = fields
        .get(&["Timestamp", "EventTimestamp", "Time"])
        .and_then(|v| parse_timestamp_ms(&v))
        .unwrap_or_else(now_ms);

    let source_event_id = fingerprint(
        call_id.unwrap_or(""),
        &primary_id(fields, timestamp_ms, speaker),
        &text,
    );

    Some(TranscriptFragment {
        text,
        speaker,
        is_final,
        timestamp_ms,
        source_event_id,
    })
}

fn extract_nested_text(data: &Value) -> Option<String> {
    // Providers that batch segments put the text under segments[0].
    let segment = data
        .get("segments")
        .and_then(|s| s.get(0))
        .unwrap_or(data);
    find_in_tree(segment, "transcript", 0)
        .or_else(|| find_in_tree(segment, "text", 0))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Primary id for deduplication: segment sid, explicit source hint,
/// transcription sid + sequence, or a timestamp/speaker fallback.
fn primary_id(fields: &FieldExtractor, timestamp_ms: i64, speaker: Speaker) -> String {
    if let Some(sid) = fields.get(&["SegmentSid"]) {
        return sid;
    }
    if let Some(hint) = fields.get(&["SourceEventId", "EventSid"]) {
        return hint;
    }
    if let Some(tsid) = fields.get(&["TranscriptionSid"]) {
        let seq = fields
            .get(&["SequenceId", "SequenceNumber"])
            .unwrap_or_default();
        return format!("{tsid}:{seq}");
    }
    format!("{timestamp_ms}:{speaker}")
}

/// SHA-1 fingerprint of `call_id | primary_id | lowercased trimmed text`
pub fn fingerprint(call_id: &str, primary_id: &str, text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(call_id.as_bytes());
    hasher.update(b"|");
    hasher.update(primary_id.as_bytes());
    hasher.update(b"|");
    hasher.update(text.trim().to_lowercase().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Epoch ms integers pass through; RFC 3339 timestamps are converted;
/// second-resolution epochs are scaled up.
fn parse_timestamp_ms(v: &str) -> Option<i64> {
    let v = v.trim();
    if let Ok(n) = v.parse::<i64>() {
        // Heuristic: values below ~2001-09 in ms are epoch seconds.
        return Some(if n < 1_000_000_000_000 { n * 1000 } else { n });
    }
    chrono::DateTime::parse_from_rfc3339(v)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

//! Remote model scorer
//!
//! Sends the recent transcript plus the previous advice snapshot to a
//! chat-completions endpoint and parses the reply back into a
//! `CoachingAdvice`. Failures are classified so the per-call worker can
//! distinguish rate limiting (back off) from transient faults (retry on
//! the normal cadence).

use crate::config::ModelSettings;
use crate::store::TranscriptChunk;
use callshield_common::time::now_ms;
use callshield_common::CoachingAdvice;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Chunks included in the model prompt
const PROMPT_WINDOW: usize = 40;

/// Hard deadline for one model request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

const TEMPERATURE: f32 = 0.15;
const MAX_TOKENS: u32 = 240;

const SYSTEM_PROMPT: &str = "\
You are a real-time anti-scam call coach listening to a live phone call. \
Reply with ONLY a JSON object: {\"riskScore\": 0-100, \"feedback\": str, \
\"whatToSay\": str, \"whatToDo\": str, \"nextSteps\": [str, str], \
\"confidence\": 0.0-1.0}. Rules: never advise sharing personal data, codes, \
or account details; lead with the action the user should take right now; \
do not move the score sharply without concrete evidence from the \
transcript; keep every string under 220 characters.";

/// Model call failures
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model API returned status {status}")]
    Api {
        status: u16,
        retry_after_ms: Option<u64>,
    },

    #[error("model request failed: {0}")]
    Network(String),

    #[error("model reply unusable: {0}")]
    Parse(String),
}

impl ModelError {
    /// True when the worker should enter rate-limit backoff.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ModelError::Api { status: 429, .. })
    }

    /// Provider-requested wait, when one was given.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ModelError::Api { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Shape the model is asked to produce; camelCase with snake_case aliases
/// because models drift between the two.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAdvice {
    #[serde(alias = "risk_score")]
    risk_score: f64,
    #[serde(default)]
    feedback: String,
    #[serde(default, alias = "what_to_say")]
    what_to_say: String,
    #[serde(default, alias = "what_to_do")]
    what_to_do: String,
    #[serde(default, alias = "next_steps")]
    next_steps: Vec<String>,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    0.6
}

/// Chat-completions client for the advice model
pub struct ModelClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ModelClient {
    /// Build a client, or `None` when no API key is configured.
    pub fn from_settings(settings: &ModelSettings) -> Option<Self> {
        let api_key = settings.api_key.clone()?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("callshield/0.1")
            .build()
            .ok()?;
        Some(Self {
            http,
            api_key,
            model: settings.name.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Score the conversation. The transcript window and the previous
    /// advice snapshot give the model continuity between runs.
    pub async fn score(
        &self,
        chunks: &[TranscriptChunk],
        previous: Option<&CoachingAdvice>,
    ) -> Result<CoachingAdvice, ModelError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_user_message(chunks, previous),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = parse_retry_after(response.headers());
            return Err(ModelError::Api {
                status: status.as_u16(),
                retry_after_ms,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ModelError::Parse("empty choices".into()))?;

        debug!(len = content.len(), "Model reply received");
        parse_advice(content)
    }
}

/// Build the user message: continuity snapshot, then the transcript as
/// `Speaker: text` lines with the newest at the bottom.
fn build_user_message(chunks: &[TranscriptChunk], previous: Option<&CoachingAdvice>) -> String {
    let mut msg = String::new();
    match previous {
        Some(prev) => {
            let snapshot = serde_json::to_string(prev).unwrap_or_else(|_| "{}".to_string());
            msg.push_str("Previous advice (keep continuity):\n");
            msg.push_str(&snapshot);
        }
        None => msg.push_str("No previous advice."),
    }
    msg.push_str("\n\nTranscript (newest at the bottom):\n");
    let window_start = chunks.len().saturating_sub(PROMPT_WINDOW);
    for chunk in &chunks[window_start..] {
        msg.push_str(chunk.speaker.as_str());
        msg.push_str(": ");
        msg.push_str(&chunk.text);
        msg.push('\n');
    }
    msg
}

/// Accept a bare JSON object, a fenced ```json block, or the first
/// balanced `{...}` substring.
fn extract_json(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    if let Some(fence_start) = trimmed.find("```") {
        let after = &trimmed[fence_start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(fence_end) = after.find("```") {
            let inner = after[..fence_end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    // First balanced {...} substring
    let start = trimmed.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in trimmed[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&trimmed[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_advice(content: &str) -> Result<CoachingAdvice, ModelError> {
    let json = extract_json(content)
        .ok_or_else(|| ModelError::Parse("no JSON object in reply".into()))?;
    let raw: RawAdvice =
        serde_json::from_str(json).map_err(|e| ModelError::Parse(e.to_string()))?;

    Ok(CoachingAdvice::sanitized(
        raw.risk_score.round() as i64,
        raw.feedback,
        raw.what_to_say,
        raw.what_to_do,
        raw.next_steps,
        raw.confidence,
        now_ms(),
    ))
}

/// Retry-After in seconds (the common form) or milliseconds when the
/// value is implausibly large for seconds.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let value = headers.get("retry-after")?.to_str().ok()?;
    let n: u64 = value.trim().parse().ok()?;
    Some(if n < 1000 { n * 1000 } else { n })
}

#[cfg(test)]
mod tests {
    use super::*;
    use callshield_common::{RiskLevel, Speaker};

    fn chunk(speaker: Speaker, text: &str) -> TranscriptChunk {
        TranscriptChunk {
            id: 0,
            speaker,
            text: text.to_string(),
            timestamp_ms: 0,
            is_final: true,
        }
    }

    #[test]
    fn parses_bare_json_reply() {
        let advice = parse_advice(
            r#"{"riskScore": 72, "feedback": "f", "whatToSay": "s", "whatToDo": "d", "nextSteps": ["a"], "confidence": 0.8}"#,
        )
        .unwrap();
        assert_eq!(advice.risk_score, 72);
        assert_eq!(advice.risk_level, RiskLevel::High);
        assert_eq!(advice.confidence, 0.8);
    }

    #[test]
    fn parses_fenced_json_reply() {
        let content = "Here is my assessment:\n```json\n{\"riskScore\": 40, \"feedback\": \"f\", \"whatToSay\": \"s\", \"whatToDo\": \"d\"}\n```";
        let advice = parse_advice(content).unwrap();
        assert_eq!(advice.risk_score, 40);
    }

    #[test]
    fn parses_embedded_object() {
        let content = "I think {\"riskScore\": 55.6, \"feedback\": \"f\", \"whatToSay\": \"s\", \"whatToDo\": \"d\"} covers it";
        let advice = parse_advice(content).unwrap();
        assert_eq!(advice.risk_score, 56); // rounded
    }

    #[test]
    fn accepts_snake_case_fields() {
        let advice = parse_advice(
            r#"{"risk_score": 30, "what_to_do": "wait", "what_to_say": "ok", "next_steps": []}"#,
        )
        .unwrap();
        assert_eq!(advice.risk_score, 30);
        assert_eq!(advice.what_to_do, "wait");
    }

    #[test]
    fn sanitizes_out_of_range_values() {
        let advice =
            parse_advice(r#"{"riskScore": 400, "confidence": 3.0, "whatToDo": "x"}"#).unwrap();
        assert_eq!(advice.risk_score, 100);
        assert_eq!(advice.confidence, 1.0);
    }

    #[test]
    fn rejects_replies_without_json() {
        assert!(parse_advice("I cannot help with that").is_err());
        assert!(parse_advice("{broken json").is_err());
    }

    #[test]
    fn user_message_layout() {
        let chunks = vec![
            chunk(Speaker::Other, "read me the code"),
            chunk(Speaker::Caller, "why do you need it?"),
        ];
        let msg = build_user_message(&chunks, None);
        assert!(msg.starts_with("No previous advice."));
        let other_pos = msg.find("other: read me the code").unwrap();
        let caller_pos = msg.find("caller: why do you need it?").unwrap();
        assert!(other_pos < caller_pos, "newest line must be at the bottom");
    }

    #[test]
    fn user_message_includes_continuity_snapshot() {
        let prev = CoachingAdvice::sanitized(50, "f".into(), "s".into(), "d".into(), vec![], 0.5, 1);
        let msg = build_user_message(&[], Some(&prev));
        assert!(msg.contains("\"riskScore\":50"));
    }

    #[test]
    fn no_client_without_api_key() {
        let settings = ModelSettings {
            api_key: None,
            name: "m".into(),
            base_url: "http://localhost".into(),
            rpm_limit: 30,
            min_interval_ms: None,
        };
        assert!(ModelClient::from_settings(&settings).is_none());
    }

    #[test]
    fn error_classification() {
        let rate_limited = ModelError::Api {
            status: 429,
            retry_after_ms: Some(8000),
        };
        assert!(rate_limited.is_rate_limited());
        assert_eq!(rate_limited.retry_after_ms(), Some(8000));

        let server_err = ModelError::Api {
            status: 500,
            retry_after_ms: None,
        };
        assert!(!server_err.is_rate_limited());
    }
}

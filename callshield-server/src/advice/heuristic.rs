//! Heuristic risk scorer
//!
//! Pure regex scoring over the recent transcript window. Always available,
//! even when the remote model is unconfigured or rate-limited, so the user
//! never stares at a stale score. Each bank pattern counts once per run.

use crate::store::TranscriptChunk;
use callshield_common::time::now_ms;
use callshield_common::{CoachingAdvice, RiskLevel};
use regex::Regex;
use std::sync::LazyLock;

/// Chunks considered per heuristic run
const WINDOW: usize = 10;

const BASE_SCORE: i64 = 20;
const HIGH_WEIGHT: i64 = 15;
const MEDIUM_WEIGHT: i64 = 8;
const SCORE_FLOOR: i64 = 5;
const SCORE_CEIL: i64 = 95;

/// Strong scam indicators
static HIGH_BANK: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bgift\s*cards?\b",
        r"(?i)\bwire\s*transfers?\b",
        r"(?i)\b(crypto|bitcoin)\b",
        r"(?i)\b(one.?time\s*passcodes?|otp|verification\s*codes?)\b",
        r"(?i)\b(ssn|social\s*security)\b",
        r"(?i)\b(bank\s*accounts?|routing\s*numbers?)\b",
        r"(?i)\b(remote\s*access|screen\s*shar\w*|install\s*(an?\s*)?apps?)\b",
        r"(?i)\b(urgent\w*|immediately|act\s*now|final\s*warning)\b",
        r"(?i)\b(arrest\w*|warrants?|lawsuits?|jail)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Softer pressure tactics
static MEDIUM_BANK: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(keep\s*(this\s*)?confidential|don.?t\s*tell)\b",
        r"(?i)\bsuspicious\s*activity\b",
        r"(?i)\b(refund\s*department|tech\s*support)\b",
        r"(?i)\b(pay\s*now|security\s*hold)\b",
        r"(?i)\bconfirm\s*your\s*identity\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Score the recent transcript and produce provisional advice.
pub fn score(chunks: &[TranscriptChunk]) -> CoachingAdvice {
    let window_start = chunks.len().saturating_sub(WINDOW);
    let text: String = chunks[window_start..]
        .iter()
        .map(|c| c.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let high_hits = HIGH_BANK.iter().filter(|re| re.is_match(&text)).count() as i64;
    let medium_hits = MEDIUM_BANK.iter().filter(|re| re.is_match(&text)).count() as i64;

    let raw = BASE_SCORE + high_hits * HIGH_WEIGHT + medium_hits * MEDIUM_WEIGHT;
    let score = raw.clamp(SCORE_FLOOR, SCORE_CEIL);
    let level = RiskLevel::from_score(score as u8);
    let (feedback, what_to_say, what_to_do, next_steps, confidence) = template(level);

    CoachingAdvice::sanitized(
        score,
        feedback.to_string(),
        what_to_say.to_string(),
        what_to_do.to_string(),
        next_steps.iter().map(|s| s.to_string()).collect(),
        confidence,
        now_ms(),
    )
}

fn template(level: RiskLevel) -> (&'static str, &'static str, &'static str, &'static [&'static str], f32) {
    match level {
        RiskLevel::Low => (
            "No strong scam signals yet. Stay alert and verify anything unusual.",
            "Can I get your name and a number I can verify independently?",
            "Keep personal details to yourself for now.",
            &["Ask who is calling and why", "Write down any names or numbers given"],
            0.45,
        ),
        RiskLevel::Medium => (
            "Pressure tactics detected. Slow down and verify the caller before acting.",
            "I don't make decisions on the phone. I'll verify this through the official number first.",
            "Hang up and call the organization back on its official number.",
            &["Never read out codes or account numbers", "Check the story with someone you trust"],
            0.50,
        ),
        RiskLevel::High => (
            "Strong scam indicators. Legitimate organizations never demand payment or codes on a call.",
            "I'm ending this call and verifying through official channels.",
            "End the call now.",
            &["Report the call to your bank's fraud line", "Block this number"],
            0.55,
        ),
    }
}

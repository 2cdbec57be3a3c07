//! Coaching advice value types
//!
//! `CoachingAdvice` is the payload pushed to the live view: a bounded risk
//! score with its derived level, a terse feedback line, one thing to say,
//! one thing to do, and up to two queued follow-up actions.

use serde::{Deserialize, Serialize};

/// Maximum length of each free-text advice field
pub const MAX_TEXT_LEN: usize = 220;

/// Maximum number of queued follow-up actions
pub const MAX_NEXT_STEPS: usize = 2;

/// Risk band derived from the numeric score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Band cutoffs: `<40` low, `40..=69` medium, `>=70` high.
    pub fn from_score(score: u8) -> Self {
        if score >= 70 {
            RiskLevel::High
        } else if score >= 40 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// One coaching advice snapshot
///
/// Invariant: `risk_level` is always `RiskLevel::from_score(risk_score)`.
/// Construct through [`CoachingAdvice::sanitized`] to keep it that way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingAdvice {
    /// Risk score in [0, 100]
    pub risk_score: u8,
    /// Derived band, kept consistent with `risk_score`
    pub risk_level: RiskLevel,
    /// Terse assessment of the conversation so far
    pub feedback: String,
    /// One sentence the user can say right now
    pub what_to_say: String,
    /// One action the user should take right now
    pub what_to_do: String,
    /// Up to two queued follow-up actions
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// Scorer confidence in [0, 1]
    pub confidence: f32,
    /// Epoch milliseconds of the last update
    pub updated_at: i64,
}

impl CoachingAdvice {
    /// Build an advice value with every bound enforced: score clamped to
    /// [0, 100], confidence clamped to [0, 1], texts truncated to
    /// [`MAX_TEXT_LEN`], at most [`MAX_NEXT_STEPS`] actions, level derived.
    pub fn sanitized(
        risk_score: i64,
        feedback: String,
        what_to_say: String,
        what_to_do: String,
        next_steps: Vec<String>,
        confidence: f32,
        updated_at: i64,
    ) -> Self {
        let score = risk_score.clamp(0, 100) as u8;
        let mut steps: Vec<String> = next_steps
            .into_iter()
            .map(|s| truncate(s.trim()))
            .filter(|s| !s.is_empty())
            .collect();
        steps.truncate(MAX_NEXT_STEPS);
        Self {
            risk_score: score,
            risk_level: RiskLevel::from_score(score),
            feedback: truncate(feedback.trim()),
            what_to_say: truncate(what_to_say.trim()),
            what_to_do: truncate(what_to_do.trim()),
            next_steps: steps,
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            updated_at,
        }
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_TEXT_LEN {
        s.to_string()
    } else {
        s.chars().take(MAX_TEXT_LEN).collect()
    }
}

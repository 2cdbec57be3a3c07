//! Advice stabilization
//!
//! Raw scorer output whipsaws: the heuristic jumps when a keyword lands,
//! the model drifts between runs. This layer sits between any advice
//! source and persistence. It smooths the risk score (confidence-weighted
//! step caps, a dead-zone around the previous value, accelerated movement
//! when crossing into the high band) and maintains a deduplicated action
//! queue so the "do this now" line does not flicker.

use callshield_common::{CoachingAdvice, RiskLevel};

/// Dead-zone: score changes within this distance keep the previous value
const DEAD_ZONE: u8 = 3;

/// Score needed to enter the high band
const HIGH_BAND: u8 = 70;

/// Cap applied when crossing into the high band
const BAND_CROSS_CAP: u8 = 22;

/// Band-crossing acceleration requires at least this much confidence;
/// a low-confidence source cannot yank the score across the high band.
const BAND_CROSS_MIN_CONFIDENCE: f32 = 0.55;

/// Shown when no concrete action survives deduplication
const FALLBACK_ACTION: &str = "Stay on guard and verify through official channels.";

/// Per-confidence step caps.
///
/// Must be monotone non-decreasing in confidence. The defaults are the
/// wider caps; tighter variants (e.g. 11/9/6) are valid tunings.
#[derive(Debug, Clone, Copy)]
pub struct StepCaps {
    /// Applied when confidence ≥ 0.75
    pub high_confidence: u8,
    /// Applied when confidence ≥ 0.55
    pub mid_confidence: u8,
    /// Applied otherwise
    pub low_confidence: u8,
}

impl Default for StepCaps {
    fn default() -> Self {
        Self {
            high_confidence: 18,
            mid_confidence: 14,
            low_confidence: 10,
        }
    }
}

impl StepCaps {
    fn for_confidence(&self, confidence: f32) -> u8 {
        if confidence >= 0.75 {
            self.high_confidence
        } else if confidence >= 0.55 {
            self.mid_confidence
        } else {
            self.low_confidence
        }
    }
}

/// Stabilize `next` against the previously persisted advice.
pub fn stabilize(
    previous: Option<&CoachingAdvice>,
    next: CoachingAdvice,
    now_ms: i64,
) -> CoachingAdvice {
    stabilize_with(StepCaps::default(), previous, next, now_ms)
}

/// Stabilize with explicit step caps.
pub fn stabilize_with(
    caps: StepCaps,
    previous: Option<&CoachingAdvice>,
    next: CoachingAdvice,
    now_ms: i64,
) -> CoachingAdvice {
    let score = match previous {
        None => next.risk_score,
        Some(prev) => smooth_score(caps, prev.risk_score, next.risk_score, next.confidence),
    };

    let (what_to_do, next_steps) = merge_actions(previous, &next);

    CoachingAdvice {
        risk_score: score,
        risk_level: RiskLevel::from_score(score),
        feedback: next.feedback,
        what_to_say: next.what_to_say,
        what_to_do,
        next_steps,
        confidence: next.confidence,
        updated_at: now_ms,
    }
}

fn smooth_score(caps: StepCaps, prev: u8, next: u8, confidence: f32) -> u8 {
    let delta = (next as i16) - (prev as i16);
    if delta.unsigned_abs() <= DEAD_ZONE as u16 {
        return prev;
    }

    let mut cap = caps.for_confidence(confidence);
    if prev < HIGH_BAND && next >= HIGH_BAND && confidence >= BAND_CROSS_MIN_CONFIDENCE {
        cap = cap.max(BAND_CROSS_CAP);
    }

    let step = delta.unsigned_abs().min(cap as u16) as i16;
    let moved = prev as i16 + step * delta.signum();
    moved.clamp(0, 100) as u8
}

/// Merge the action queue: the incoming action first, then previously
/// queued actions, dropping case-insensitive duplicates.
fn merge_actions(
    previous: Option<&CoachingAdvice>,
    next: &CoachingAdvice,
) -> (String, Vec<String>) {
    let mut candidates: Vec<&str> = vec![next.what_to_do.as_str()];
    if let Some(prev) = previous {
        candidates.push(prev.what_to_do.as_str());
        candidates.extend(prev.next_steps.iter().map(String::as_str));
    }
    candidates.extend(next.next_steps.iter().map(String::as_str));

    let mut seen: Vec<String> = Vec::new();
    let mut actions: Vec<String> = Vec::new();
    for raw in candidates {
        let action = collapse_whitespace(raw);
        if action.is_empty() {
            continue;
        }
        let key = action.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        actions.push(action);
        if actions.len() == 3 {
            break;
        }
    }

    let mut iter = actions.into_iter();
    let what_to_do = iter
        .next()
        .unwrap_or_else(|| FALLBACK_ACTION.to_string());
    (what_to_do, iter.collect())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

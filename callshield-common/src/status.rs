//! Call session status state machine
//!
//! Telephony providers report call progress with loosely standardized
//! strings ("in-progress", "completed", "busy", ...). This module folds
//! them into the canonical status set and decides terminality.

use serde::{Deserialize, Serialize};

/// Canonical call session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Ended,
    Failed,
    Unknown,
}

impl CallStatus {
    /// Fold an arbitrary provider status string into the canonical set.
    ///
    /// Matching is substring-based on the lowercased input. Failure words
    /// are checked before completion words so "cancelled-by-error" style
    /// composites land on `Failed`.
    pub fn normalize(raw: &str) -> Self {
        let s = raw.trim().to_lowercase();
        if s.is_empty() {
            return CallStatus::Unknown;
        }
        if s.contains("queued") {
            CallStatus::Queued
        } else if s.contains("ring") {
            CallStatus::Ringing
        } else if s.contains("in progress") || s.contains("in-progress") || s.contains("active") {
            CallStatus::InProgress
        } else if s.contains("fail") || s.contains("error") || s.contains("busy") {
            CallStatus::Failed
        } else if s.contains("end") || s.contains("complete") || s.contains("cancel") {
            CallStatus::Ended
        } else {
            CallStatus::Unknown
        }
    }

    /// Terminal statuses absorb: no later transition may leave them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Ended | CallStatus::Failed)
    }

    /// Wire string used in the database and API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Queued => "queued",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in-progress",
            CallStatus::Ended => "ended",
            CallStatus::Failed => "failed",
            CallStatus::Unknown => "unknown",
        }
    }

    /// Parse a canonical wire string (as produced by [`CallStatus::as_str`])
    pub fn from_db(s: &str) -> Self {
        match s {
            "queued" => CallStatus::Queued,
            "ringing" => CallStatus::Ringing,
            "in-progress" => CallStatus::InProgress,
            "ended" => CallStatus::Ended,
            "failed" => CallStatus::Failed,
            _ => CallStatus::Unknown,
        }
    }

    /// Apply a transition, honoring terminal finality.
    ///
    /// Returns the status that should be persisted given the current one.
    pub fn transition(current: CallStatus, next: CallStatus) -> CallStatus {
        if current.is_terminal() {
            current
        } else {
            next
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the bridged conversation produced a transcript chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The protected user
    Caller,
    /// The counterparty (potential scammer)
    Other,
    Unknown,
}

impl Speaker {
    /// Classify a provider track/channel/role hint.
    pub fn classify(hint: Option<&str>) -> Self {
        let Some(hint) = hint else {
            return Speaker::Unknown;
        };
        let h = hint.to_lowercase();
        if h.contains("caller") || h.contains("customer") || h.contains("inbound") {
            Speaker::Caller
        } else if h.contains("outbound")
            || h.contains("callee")
            || h.contains("agent")
            || h.contains("recipient")
            || h.contains("other")
        {
            Speaker::Other
        } else {
            Speaker::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Caller => "caller",
            Speaker::Other => "other",
            Speaker::Unknown => "unknown",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "caller" => Speaker::Caller,
            "other" => Speaker::Other,
            _ => Speaker::Unknown,
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

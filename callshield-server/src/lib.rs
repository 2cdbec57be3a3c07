//! CallShield server
//!
//! Real-time anti-scam call coach. A telephony provider streams
//! speech-to-text events for a silently bridged monitor call into the
//! webhook endpoint; per-call workers turn the transcript into stabilized
//! coaching advice which the live view reads via snapshot + SSE push.

pub mod advice;
pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod limiter;
pub mod store;
pub mod telephony;
pub mod worker;

pub use config::Config;
pub use error::{ApiError, Error, Result};

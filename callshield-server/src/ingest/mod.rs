//! Provider event ingest: payload parsing and webhook signature checks

pub mod event;
pub mod signature;

pub use event::{FieldExtractor, ParsedEvent, TranscriptFragment};

//! HTTP API: webhook ingest, live view read path, call placement

pub mod calls;
pub mod live;
pub mod server;
pub mod sse;
pub mod webhook;

pub use server::{create_router, AppContext};

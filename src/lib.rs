// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::app::Radar;
pub use crate::config::RadarConfig;
pub use crate::engine::{Engine, SourceEntry, TickReport};

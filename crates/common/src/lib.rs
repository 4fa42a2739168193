//! RefNet Common Library
//!
//! Shared code for the RefNet citation graph including:
//! - Paper model, identifier normalization and record normalizer
//! - Record sources (OpenAlex, in-memory fixtures)
//! - Rate-limited, retrying, caching source adapter
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod adapter;
pub mod cache;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod source;

// Re-export commonly used types
pub use adapter::SourceAdapter;
pub use cache::PaperCache;
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use models::{Paper, PaperId};
pub use source::RecordSource;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Configuration management for RefNet
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard upper bound on ids per multi-id filter query
pub const MAX_BATCH_SIZE: usize = 200;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Record source (OpenAlex) configuration
    #[serde(default)]
    pub source: SourceConfig,

    /// Graph engine configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Contact email for the polite pool
    pub mailto: Option<String>,

    /// Minimum delay between outbound calls in milliseconds (0 disables)
    #[serde(default = "default_rate_limit_delay")]
    pub rate_limit_delay_ms: u64,

    /// Maximum attempts per call, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff interval in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Backoff interval ceiling in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Request timeout in seconds
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,

    /// Ids per multi-id filter query
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Individual lookups allowed when a batch query is refused
    #[serde(default = "default_fallback_limit")]
    pub fallback_limit: usize,

    /// Concurrent adapter calls per BFS round
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    #[serde(default = "default_iterations")]
    pub default_iterations: usize,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_limit")]
    pub default_cited_limit: usize,

    #[serde(default = "default_max_limit")]
    pub max_cited_limit: usize,

    #[serde(default = "default_limit")]
    pub default_ref_limit: usize,

    #[serde(default = "default_max_limit")]
    pub max_ref_limit: usize,

    /// Reject non-root papers without any named author
    #[serde(default = "default_strict_authors")]
    pub strict_authors: bool,

    /// Spring embedder iterations
    #[serde(default = "default_layout_iterations")]
    pub layout_iterations: usize,

    /// Optimal distance between nodes in the spring embedder
    #[serde(default = "default_layout_k")]
    pub layout_k: f64,

    /// Seed for initial node positions
    #[serde(default = "default_layout_seed")]
    pub layout_seed: u64,

    /// Wall-clock budget for one expansion call
    pub expansion_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_base_url() -> String { "https://api.openalex.org".to_string() }
fn default_rate_limit_delay() -> u64 { 100 }
fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 200 }
fn default_max_backoff() -> u64 { 5_000 }
fn default_source_timeout() -> u64 { 30 }
fn default_batch_size() -> usize { 50 }
fn default_fallback_limit() -> usize { 10 }
fn default_fetch_concurrency() -> usize { 4 }
fn default_iterations() -> usize { 3 }
fn default_max_iterations() -> usize { 5 }
fn default_limit() -> usize { 5 }
fn default_max_limit() -> usize { 20 }
fn default_strict_authors() -> bool { true }
fn default_layout_iterations() -> usize { 50 }
fn default_layout_k() -> f64 { 3.0 }
fn default_layout_seed() -> u64 { 42 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "refnet".to_string() }

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            mailto: None,
            rate_limit_delay_ms: default_rate_limit_delay(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            timeout_secs: default_source_timeout(),
            batch_size: default_batch_size(),
            fallback_limit: default_fallback_limit(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_iterations: default_iterations(),
            max_iterations: default_max_iterations(),
            default_cited_limit: default_limit(),
            max_cited_limit: default_max_limit(),
            default_ref_limit: default_limit(),
            max_ref_limit: default_max_limit(),
            strict_authors: default_strict_authors(),
            layout_iterations: default_layout_iterations(),
            layout_k: default_layout_k(),
            layout_seed: default_layout_seed(),
            expansion_timeout_secs: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: 0,
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__SOURCE__MAILTO=me@example.org
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl SourceConfig {
    /// Minimum spacing between outbound calls, if any
    pub fn rate_limit_delay(&self) -> Option<Duration> {
        (self.rate_limit_delay_ms > 0).then(|| Duration::from_millis(self.rate_limit_delay_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Batch size clamped to what the multi-id filter accepts
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }
}

impl GraphConfig {
    /// Clamp caller supplied (iterations, cited, ref) into the allowed ranges
    pub fn clamp_limits(
        &self,
        iterations: usize,
        cited_limit: usize,
        ref_limit: usize,
    ) -> (usize, usize, usize) {
        (
            iterations.clamp(1, self.max_iterations.max(1)),
            cited_limit.clamp(1, self.max_cited_limit.max(1)),
            ref_limit.clamp(1, self.max_ref_limit.max(1)),
        )
    }

    pub fn expansion_timeout(&self) -> Option<Duration> {
        self.expansion_timeout_secs.map(Duration::from_secs)
    }
}

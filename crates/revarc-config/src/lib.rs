//! Configuration management for revarc
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (REVARC_* prefix, highest precedence)
//! 2. revarc.toml (project config)
//! 3. Built-in defaults (lowest precedence)
//!
//! The configuration surface covers everything the pipeline consumes:
//! input archives, page filtering, task splitting, queue bounds, pool
//! sizes, transmission timeouts, and the surrogate-handling policy.

use serde::{Deserialize, Serialize};

use revarc_types::{ArchiveDescription, SurrogateMode};

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

/// Main revarc configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RevarcConfig {
    /// Input archives, processed in order.
    pub archives: Vec<ArchiveDescription>,
    pub filter: FilterConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

/// Page filtering rules applied by the article producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Namespaces to process; empty means all namespaces.
    pub namespaces: Vec<i32>,
    /// Pages whose name starts with one of these prefixes are skipped.
    pub banned_name_prefixes: Vec<String>,
    /// Policy for revisions with malformed character sequences.
    pub surrogate_mode: SurrogateMode,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            namespaces: vec![0],
            banned_name_prefixes: Vec::new(),
            surrogate_mode: SurrogateMode::DiscardRevision,
        }
    }
}

/// Worker pools, queue bounds, and task splitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of diff calculation workers.
    pub diff_workers: usize,
    /// Number of output consumers.
    pub consumers: usize,
    /// Articles above this many accumulated bytes are split into parts.
    pub split_threshold: usize,
    /// Per-queue item capacity.
    pub queue_capacity: usize,
    /// Per-queue byte budget.
    pub queue_bytes: usize,
    /// Deadline for a blocking task handoff, in milliseconds.
    pub transmit_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            diff_workers: 2,
            consumers: 1,
            split_threshold: 16 * 1024 * 1024,
            queue_capacity: 64,
            queue_bytes: 256 * 1024 * 1024,
            transmit_timeout_ms: 30_000,
        }
    }
}

/// Output sizing shared by the sinks and index builders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Upper bound on one emitted statement or index chunk, in bytes.
    pub max_allowed_packet: usize,
    /// Base64-encode diff payloads in textual sinks.
    pub base64_payloads: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_allowed_packet: 16 * 1024 * 1024,
            base64_payloads: true,
        }
    }
}

impl RevarcConfig {
    /// Validates cross-field constraints. Fatal at startup on failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.diff_workers == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.diff_workers must be at least 1".into(),
            ));
        }
        if self.pipeline.consumers == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.consumers must be at least 1".into(),
            ));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.queue_capacity must be at least 1".into(),
            ));
        }
        if self.output.max_allowed_packet == 0 {
            return Err(ConfigError::ValidationError(
                "output.max_allowed_packet must be positive".into(),
            ));
        }
        if self.pipeline.split_threshold > self.output.max_allowed_packet {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.split_threshold ({}) must not exceed output.max_allowed_packet ({})",
                self.pipeline.split_threshold, self.output.max_allowed_packet
            )));
        }
        if !self.filter.surrogate_mode.is_supported() {
            return Err(ConfigError::ValidationError(format!(
                "surrogate mode {:?} is not a verified policy; only discard_revision is supported",
                self.filter.surrogate_mode
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RevarcConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_consumers_fails_validation() {
        let mut config = RevarcConfig::default();
        config.pipeline.consumers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn split_threshold_above_packet_fails_validation() {
        let mut config = RevarcConfig::default();
        config.pipeline.split_threshold = config.output.max_allowed_packet + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unsupported_surrogate_mode_fails_validation() {
        let mut config = RevarcConfig::default();
        config.filter.surrogate_mode = SurrogateMode::ReplaceSequence;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}

//! # Pipeline Configuration
//!
//! Read-only numeric policy, loaded once at startup from TOML.
//!
//! ```toml
//! [streaming]
//! unload_delay_secs = 10.0
//! unload_distance = 50.0
//! staging_buffer_count = 2
//! fallback_retry = { mode = "after_ticks", ticks = 30 }
//!
//! [pump]
//! tick_interval_ms = 1
//! max_outstanding_fences = 3
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// When a texture stuck in `ForceFallback` is allowed to try again.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FallbackRetryPolicy {
    /// Only [`TextureManager::retry_fallback`](crate::TextureManager::retry_fallback) retries.
    Manual,
    /// Retry after this many extraction ticks.
    AfterTicks {
        /// Ticks spent in fallback before retrying.
        ticks: u64,
    },
    /// Retry after this much time.
    AfterDelay {
        /// Seconds spent in fallback before retrying.
        secs: f64,
    },
}

impl Default for FallbackRetryPolicy {
    fn default() -> Self {
        Self::AfterTicks { ticks: 30 }
    }
}

/// Texture streaming policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamingConfig {
    /// A texture unused for longer than this can be unloaded (seconds).
    pub unload_delay_secs: f64,
    /// A texture last seen farther than this can be unloaded (world units).
    pub unload_distance: f32,
    /// Mip bias decay toward full detail (mip levels per second).
    pub mip_bias_decay_per_sec: f32,
    /// Number of staging transfer buffers.
    pub staging_buffer_count: usize,
    /// Size of each staging buffer (bytes).
    pub staging_buffer_size: usize,
    /// Number of upload worker threads.
    pub upload_worker_count: usize,
    /// Maximum live backing textures per descriptor.
    pub pool_capacity_per_descriptor: usize,
    /// Soft cap on dynamic texture memory (bytes), counting storage attached
    /// to textures plus storage parked in the pool. `None` = unlimited.
    pub resident_budget_bytes: Option<u64>,
    /// Retry policy for `ForceFallback`.
    pub fallback_retry: FallbackRetryPolicy,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            unload_delay_secs: 10.0,
            unload_distance: 50.0,
            mip_bias_decay_per_sec: 1.0,
            staging_buffer_count: 2,
            staging_buffer_size: 4 * 1024 * 1024, // 4 MiB
            upload_worker_count: 2,
            pool_capacity_per_descriptor: 16,
            resident_budget_bytes: None,
            fallback_retry: FallbackRetryPolicy::default(),
        }
    }
}

impl StreamingConfig {
    /// Returns the unload delay as a `Duration`.
    #[must_use]
    pub fn unload_delay(&self) -> Duration {
        Duration::from_secs_f64(self.unload_delay_secs.max(0.0))
    }

    /// Checks every value for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> RenderResult<()> {
        if !self.unload_delay_secs.is_finite() || self.unload_delay_secs < 0.0 {
            return Err(RenderError::InvalidConfig(format!(
                "unload_delay_secs must be a non-negative number, got {}",
                self.unload_delay_secs
            )));
        }
        if self.unload_distance.is_nan() || self.unload_distance < 0.0 {
            return Err(RenderError::InvalidConfig(format!(
                "unload_distance must be non-negative, got {}",
                self.unload_distance
            )));
        }
        if !self.mip_bias_decay_per_sec.is_finite() || self.mip_bias_decay_per_sec < 0.0 {
            return Err(RenderError::InvalidConfig(format!(
                "mip_bias_decay_per_sec must be non-negative, got {}",
                self.mip_bias_decay_per_sec
            )));
        }
        if self.staging_buffer_count == 0 {
            return Err(RenderError::InvalidConfig("staging_buffer_count must be at least 1".into()));
        }
        if self.staging_buffer_size == 0 {
            return Err(RenderError::InvalidConfig("staging_buffer_size must be at least 1".into()));
        }
        if self.upload_worker_count == 0 {
            return Err(RenderError::InvalidConfig("upload_worker_count must be at least 1".into()));
        }
        if self.pool_capacity_per_descriptor == 0 {
            return Err(RenderError::InvalidConfig(
                "pool_capacity_per_descriptor must be at least 1".into(),
            ));
        }
        if let FallbackRetryPolicy::AfterDelay { secs } = self.fallback_retry {
            if !secs.is_finite() || secs < 0.0 {
                return Err(RenderError::InvalidConfig(format!(
                    "fallback_retry delay must be non-negative, got {secs}"
                )));
            }
        }
        Ok(())
    }
}

/// Frame pump pacing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PumpConfig {
    /// Idle wait between pump ticks when no blocking call arrives (ms).
    pub tick_interval_ms: u64,
    /// Submission is skipped while this many fences are still unsignaled.
    pub max_outstanding_fences: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1,
            max_outstanding_fences: 3,
        }
    }
}

impl PumpConfig {
    /// Returns the tick interval as a `Duration`.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Checks every value for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> RenderResult<()> {
        if self.max_outstanding_fences == 0 {
            return Err(RenderError::InvalidConfig(
                "max_outstanding_fences must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Complete configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrataConfig {
    /// Texture streaming policy.
    pub streaming: StreamingConfig,
    /// Frame pump pacing.
    pub pump: PumpConfig,
}

impl StrataConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::ConfigParse`] for malformed TOML and
    /// [`RenderError::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> RenderResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| RenderError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Io`] if the file cannot be read, otherwise as
    /// [`StrataConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RenderError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Validates both sections.
    ///
    /// # Errors
    ///
    /// Returns the first validation error.
    pub fn validate(&self) -> RenderResult<()> {
        self.streaming.validate()?;
        self.pump.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(StrataConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = StrataConfig::from_toml_str(
            r#"
            [streaming]
            unload_delay_secs = 2.5
            staging_buffer_count = 4
            fallback_retry = { mode = "after_delay", secs = 1.5 }

            [pump]
            max_outstanding_fences = 2
            "#,
        )
        .unwrap();

        assert!((config.streaming.unload_delay_secs - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.streaming.staging_buffer_count, 4);
        assert_eq!(config.streaming.fallback_retry, FallbackRetryPolicy::AfterDelay { secs: 1.5 });
        // Untouched fields keep their defaults.
        assert!((config.streaming.unload_distance - 50.0).abs() < f32::EPSILON);
        assert_eq!(config.pump.max_outstanding_fences, 2);
        assert_eq!(config.pump.tick_interval_ms, 1);
    }

    #[test]
    fn test_manual_retry_policy() {
        let config = StrataConfig::from_toml_str(
            r#"
            [streaming]
            fallback_retry = { mode = "manual" }
            "#,
        )
        .unwrap();
        assert_eq!(config.streaming.fallback_retry, FallbackRetryPolicy::Manual);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = StrataConfig::from_toml_str("[streaming]\nunload_dist = 3.0\n").unwrap_err();
        assert!(matches!(err, RenderError::ConfigParse(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = StrataConfig::from_toml_str("[streaming]\nstaging_buffer_count = 0\n").unwrap_err();
        assert!(matches!(err, RenderError::InvalidConfig(_)));

        let err = StrataConfig::from_toml_str("[streaming]\nunload_delay_secs = -1.0\n").unwrap_err();
        assert!(matches!(err, RenderError::InvalidConfig(_)));

        let err = StrataConfig::from_toml_str("[pump]\nmax_outstanding_fences = 0\n").unwrap_err();
        assert!(matches!(err, RenderError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = StrataConfig::from_file("/nonexistent/strata.toml").unwrap_err();
        assert!(matches!(err, RenderError::Io(_)));
    }
}

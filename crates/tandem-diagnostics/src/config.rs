//! Diagnostics configuration

use crate::measures::DEFAULT_LATENCY_DISTRIBUTION;
use serde::Deserialize;
use tandem_core::{TandemError, TandemResult};

/// Metrics configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Application id attached to every measurement as `app_id`
    pub app_id: String,
    /// Record metrics at all
    pub enabled: bool,
    /// Latency bucket bounds in milliseconds (None = default distribution)
    pub latency_buckets: Option<Vec<f64>>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            enabled: true,
            latency_buckets: None,
        }
    }
}

impl DiagnosticsConfig {
    /// Create a new config for `app_id` with default settings
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Self::default()
        }
    }

    /// Enable or disable recording
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Override the latency bucket bounds
    pub fn latency_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.latency_buckets = Some(buckets);
        self
    }

    /// Latency bucket bounds in effect
    pub fn latency_distribution(&self) -> &[f64] {
        self.latency_buckets.as_deref().unwrap_or(DEFAULT_LATENCY_DISTRIBUTION)
    }

    /// Bucket bounds must be non-empty, finite and strictly increasing
    pub fn validate(&self) -> TandemResult<()> {
        let buckets = self.latency_distribution();
        if buckets.is_empty() {
            return Err(TandemError::Registration("latency buckets are empty".to_string()));
        }
        if buckets.iter().any(|b| !b.is_finite()) || buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TandemError::Registration(format!(
                "latency buckets must be finite and strictly increasing: {:?}",
                buckets
            )));
        }
        Ok(())
    }
}

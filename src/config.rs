//! Runtime configuration, validated fail-fast before any packet is processed.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Duration;
use serde::Deserialize;
use thiserror::Error;

use crate::cascade::{AttackFamily, CascadeThresholds, DEFAULT_FAMILY_PRIORITY};
use crate::flow::table::FlowConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SentryConfig {
    /// Inactivity after which a flow expires, seconds.
    pub idle_timeout_secs: u64,
    /// Absolute cap on flow duration regardless of activity, seconds.
    pub max_flow_lifetime_secs: u64,
    /// Hard bound on concurrently tracked flows.
    pub max_flows: usize,
    /// Sweep period of the evaluation path, milliseconds.
    pub evaluation_period_ms: u64,
    /// Ingest channel depth between capture and the flow table.
    pub channel_capacity: usize,
    /// Stage-1 anomaly probability below this is accepted as normal.
    pub normal_acceptance_threshold: f64,
    /// Stage-2 fallback threshold for families without an override.
    pub default_attack_threshold: f64,
    /// Per-family stage-2 threshold overrides.
    pub attack_thresholds: BTreeMap<AttackFamily, f64>,
    /// Tie-break order for numerically equal stage-2 scores.
    pub family_priority: Vec<AttackFamily>,
    /// Demo/testing fixture only: enables the magic-port signature override.
    pub demo_override_enabled: bool,
    /// Optional reporting endpoint for detection records.
    pub report_url: Option<String>,
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 10,
            max_flow_lifetime_secs: 120,
            max_flows: 100_000,
            evaluation_period_ms: 1_000,
            channel_capacity: 4_096,
            normal_acceptance_threshold: 0.5,
            default_attack_threshold: 0.5,
            attack_thresholds: BTreeMap::new(),
            family_priority: DEFAULT_FAMILY_PRIORITY.to_vec(),
            demo_override_enabled: false,
            report_url: None,
        }
    }
}

impl SentryConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SentryConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid("idle_timeout_secs must be positive".into()));
        }
        if self.max_flow_lifetime_secs < self.idle_timeout_secs {
            return Err(ConfigError::Invalid(
                "max_flow_lifetime_secs must be >= idle_timeout_secs".into(),
            ));
        }
        if self.evaluation_period_ms == 0 {
            return Err(ConfigError::Invalid("evaluation_period_ms must be positive".into()));
        }
        if self.max_flows == 0 {
            return Err(ConfigError::Invalid("max_flows must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity must be positive".into()));
        }
        for (name, value) in [
            ("normal_acceptance_threshold", self.normal_acceptance_threshold),
            ("default_attack_threshold", self.default_attack_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{} must be within [0, 1]", name)));
            }
        }
        for (family, value) in &self.attack_thresholds {
            if !(0.0..=1.0).contains(value) {
                return Err(ConfigError::Invalid(format!(
                    "attack threshold for {} must be within [0, 1]",
                    family
                )));
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        for family in &self.family_priority {
            if !seen.insert(family) {
                return Err(ConfigError::Invalid(format!(
                    "family_priority lists {} twice",
                    family
                )));
            }
        }
        Ok(())
    }

    pub fn flow_config(&self) -> FlowConfig {
        FlowConfig {
            idle_timeout: Duration::seconds(self.idle_timeout_secs as i64),
            max_lifetime: Duration::seconds(self.max_flow_lifetime_secs as i64),
            max_flows: self.max_flows,
        }
    }

    pub fn cascade_thresholds(&self) -> CascadeThresholds {
        CascadeThresholds {
            normal_acceptance: self.normal_acceptance_threshold,
            default_attack: self.default_attack_threshold,
            per_family: self.attack_thresholds.clone(),
        }
    }

    pub fn evaluation_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.evaluation_period_ms)
    }
}

//! Polling configuration.

use crate::bucket::Interval;
use crate::counters::CounterState;
use crate::sample::DEFAULT_NAMESPACE;

/// Source label used when none is configured.
pub const DEFAULT_SOURCE: &str = "pg-stats-aggregator";

/// Error type for invalid polling configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Interval of zero seconds.
    ZeroInterval,
    /// Interval longer than a timestamp can hold.
    IntervalTooLarge(u64),
    /// Empty source label.
    EmptySource,
    /// Empty metric namespace.
    EmptyNamespace,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ZeroInterval => write!(f, "interval must be a positive number of seconds"),
            ConfigError::IntervalTooLarge(secs) => {
                write!(f, "interval of {} seconds is too large", secs)
            }
            ConfigError::EmptySource => write!(f, "source label must not be empty"),
            ConfigError::EmptyNamespace => write!(f, "metric namespace must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Settings of one polling context.
///
/// Defaults: 60 s interval, source `pg-stats-aggregator`, namespace
/// `postgres`, no seeded counters.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Bucketing and scheduling interval.
    pub interval: Interval,
    /// Tag attached to every sample.
    pub source: String,
    /// Prefix of every metric name.
    pub namespace: String,
    /// Baselines to start from, e.g. carried over from a previous context.
    pub initial_counters: CounterState,
}

impl PollerConfig {
    pub fn new(interval_secs: u64, source: impl Into<String>) -> Result<Self, ConfigError> {
        let interval = Interval::from_secs(interval_secs).ok_or(if interval_secs == 0 {
            ConfigError::ZeroInterval
        } else {
            ConfigError::IntervalTooLarge(interval_secs)
        })?;
        let config = Self {
            interval,
            source: source.into(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_initial_counters(mut self, counters: CounterState) -> Self {
        self.initial_counters = counters;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.trim().is_empty() {
            return Err(ConfigError::EmptySource);
        }
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        Ok(())
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Interval::default(),
            source: DEFAULT_SOURCE.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            initial_counters: CounterState::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PollerConfig::default();
        assert_eq!(config.interval.as_secs(), 60);
        assert_eq!(config.source, "pg-stats-aggregator");
        assert_eq!(config.namespace, "postgres");
        assert!(config.initial_counters.is_empty());
    }

    #[test]
    fn rejects_zero_interval() {
        assert_eq!(
            PollerConfig::new(0, "app").unwrap_err(),
            ConfigError::ZeroInterval
        );
    }

    #[test]
    fn rejects_interval_beyond_timestamp_range() {
        assert_eq!(
            PollerConfig::new(u64::MAX, "app").unwrap_err(),
            ConfigError::IntervalTooLarge(u64::MAX)
        );
    }

    #[test]
    fn rejects_blank_labels() {
        assert_eq!(
            PollerConfig::new(300, " ").unwrap_err(),
            ConfigError::EmptySource
        );
        let config = PollerConfig::new(300, "app").unwrap().with_namespace("");
        assert_eq!(config.validate().unwrap_err(), ConfigError::EmptyNamespace);
    }
}

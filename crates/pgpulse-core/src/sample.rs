//! Metric samples and their naming.

/// Default metric family prefix.
pub const DEFAULT_NAMESPACE: &str = "postgres";

/// One timestamped, source-tagged measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Fully qualified name, `<namespace>.<metric>`.
    pub name: String,
    pub value: f64,
    /// Bucket-aligned unix timestamp.
    pub timestamp: i64,
    pub source: String,
}

/// Builds samples under a fixed namespace.
#[derive(Debug, Clone)]
pub struct SampleFormatter {
    namespace: String,
}

impl SampleFormatter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn format(&self, metric: &str, value: f64, timestamp: i64, source: &str) -> MetricSample {
        MetricSample {
            name: format!("{}.{}", self.namespace, metric),
            value,
            timestamp,
            source: source.to_string(),
        }
    }
}

impl Default for SampleFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

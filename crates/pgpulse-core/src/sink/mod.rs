//! Remote metric sinks.
//!
//! A sink receives one non-empty batch per cycle. Delivery failures are
//! reported but never retried here.

mod librato;

pub use librato::{DEFAULT_LIBRATO_URL, LibratoSink};

use tracing::info;

use crate::sample::MetricSample;

/// Error type for batch submission.
#[derive(Debug)]
pub enum SinkError {
    /// Network or TLS failure before a response arrived.
    Transport(String),
    /// The remote end answered with a non-success status.
    Rejected { status: u16, body: String },
    /// The batch could not be serialized.
    Encode(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Transport(msg) => write!(f, "sink transport error: {}", msg),
            SinkError::Rejected { status, body } => {
                write!(f, "sink rejected batch (HTTP {}): {}", status, body)
            }
            SinkError::Encode(msg) => write!(f, "sink encode error: {}", msg),
        }
    }
}

impl std::error::Error for SinkError {}

/// Destination for a cycle's samples.
pub trait MetricSink {
    /// Transmits `samples` as a single unit. Never called with an empty slice.
    fn submit(&mut self, samples: &[MetricSample]) -> Result<(), SinkError>;
}

/// Logs samples instead of sending them.
#[derive(Debug, Default)]
pub struct LogSink;

impl MetricSink for LogSink {
    fn submit(&mut self, samples: &[MetricSample]) -> Result<(), SinkError> {
        for s in samples {
            info!(
                name = %s.name,
                value = s.value,
                measure_time = s.timestamp,
                source = %s.source,
                "sample"
            );
        }
        Ok(())
    }
}

/// Records every submitted batch.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    pub calls: Vec<Vec<MetricSample>>,
    fail: bool,
}

#[cfg(test)]
impl MemorySink {
    pub fn failing() -> Self {
        Self {
            calls: Vec::new(),
            fail: true,
        }
    }
}

#[cfg(test)]
impl MetricSink for MemorySink {
    fn submit(&mut self, samples: &[MetricSample]) -> Result<(), SinkError> {
        self.calls.push(samples.to_vec());
        if self.fail {
            return Err(SinkError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

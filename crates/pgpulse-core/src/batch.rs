//! Per-cycle submission batch.

use crate::sample::MetricSample;
use crate::sink::{MetricSink, SinkError};

/// What [`SubmissionBatch::flush`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to send; the sink was not called.
    Empty,
    /// One sink call carrying this many samples.
    Submitted(usize),
}

/// Samples accumulated during one cycle, handed to the sink as one unit.
///
/// Order is insertion order, but sinks must not depend on it.
#[derive(Debug, Default)]
pub struct SubmissionBatch {
    samples: Vec<MetricSample>,
}

impl SubmissionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sample: MetricSample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sends the whole batch in a single sink call. An empty batch performs no
    /// I/O. The batch is consumed either way; nothing is retried or split.
    pub fn flush(self, sink: &mut dyn MetricSink) -> Result<FlushOutcome, SinkError> {
        if self.samples.is_empty() {
            return Ok(FlushOutcome::Empty);
        }
        sink.submit(&self.samples)?;
        Ok(FlushOutcome::Submitted(self.samples.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleFormatter;
    use crate::sink::MemorySink;

    #[test]
    fn empty_batch_never_calls_sink() {
        let mut sink = MemorySink::default();
        let outcome = SubmissionBatch::new().flush(&mut sink).unwrap();
        assert_eq!(outcome, FlushOutcome::Empty);
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn non_empty_batch_is_one_call() {
        let fmt = SampleFormatter::default();
        let mut batch = SubmissionBatch::new();
        for (i, name) in ["inserts", "updates", "deletes"].iter().enumerate() {
            batch.add(fmt.format(name, i as f64, 900, "app"));
        }

        let mut sink = MemorySink::default();
        assert_eq!(batch.flush(&mut sink).unwrap(), FlushOutcome::Submitted(3));
        assert_eq!(sink.calls.len(), 1);
        assert_eq!(sink.calls[0].len(), 3);
    }

    #[test]
    fn sink_failure_is_propagated() {
        let mut batch = SubmissionBatch::new();
        batch.add(SampleFormatter::default().format("inserts", 1.0, 0, "app"));

        let mut sink = MemorySink::failing();
        assert!(batch.flush(&mut sink).is_err());
        assert_eq!(sink.calls.len(), 1);
    }
}

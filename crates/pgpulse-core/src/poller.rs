//! One polling context: counter baselines plus the cycle that samples the
//! five statistic categories and flushes them as one batch.
//!
//! A `Poller` belongs to exactly one source. Running several sources means
//! running several pollers; their counter state is never shared.

use tracing::{debug, info, warn};

use crate::batch::{FlushOutcome, SubmissionBatch};
use crate::bucket::Interval;
use crate::collector::{PgCollectError, StatSource};
use crate::config::{ConfigError, PollerConfig};
use crate::counters::{CounterState, Observation, parse_counter};
use crate::sample::SampleFormatter;
use crate::sink::{MetricSink, SinkError};

/// Why a cycle ended early.
#[derive(Debug)]
pub enum CycleError {
    /// A statistic query failed; the batch was discarded.
    Query(PgCollectError),
    /// The batch was handed to the sink and delivery failed.
    Sink(SinkError),
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleError::Query(e) => write!(f, "{}", e),
            CycleError::Sink(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CycleError::Query(e) => Some(e),
            CycleError::Sink(e) => Some(e),
        }
    }
}

impl From<PgCollectError> for CycleError {
    fn from(e: PgCollectError) -> Self {
        CycleError::Query(e)
    }
}

impl From<SinkError> for CycleError {
    fn from(e: SinkError) -> Self {
        CycleError::Sink(e)
    }
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Bucketed timestamp shared by every sample.
    pub timestamp: i64,
    /// Samples in the batch.
    pub samples: usize,
    /// Counters seen for the first time (baseline only).
    pub first_seen: usize,
    /// Counters that went backwards.
    pub resets: usize,
    /// Values skipped because they could not be parsed.
    pub invalid: usize,
    /// Whether the sink was called.
    pub submitted: bool,
}

/// Polling context for one source.
#[derive(Debug)]
pub struct Poller {
    interval: Interval,
    source: String,
    formatter: SampleFormatter,
    counters: CounterState,
}

impl Poller {
    pub fn new(config: PollerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            interval: config.interval,
            source: config.source,
            formatter: SampleFormatter::new(config.namespace),
            counters: config.initial_counters,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn counters(&self) -> &CounterState {
        &self.counters
    }

    /// Runs one cycle at unix time `now`.
    ///
    /// A query failure aborts the cycle without calling the sink. Counters
    /// observed before the failure keep their new baselines.
    pub fn poll(
        &mut self,
        stats: &mut dyn StatSource,
        sink: &mut dyn MetricSink,
        now: i64,
    ) -> Result<CycleReport, CycleError> {
        let timestamp = self.interval.floor(now);
        let mut batch = SubmissionBatch::new();
        let mut report = CycleReport {
            timestamp,
            ..CycleReport::default()
        };

        self.sample_counters(stats, &mut batch, &mut report)?;

        let index_hit_rate = stats.index_hit_rate()?;
        self.push_gauge(&mut batch, "index_hit_rate", index_hit_rate, timestamp);
        let cache_hit_rate = stats.cache_hit_rate()?;
        self.push_gauge(&mut batch, "cache_hit_rate", cache_hit_rate, timestamp);
        let total_index_size = stats.total_index_size()?;
        self.push_gauge(
            &mut batch,
            "total_index_size",
            total_index_size.map(|v| v as f64),
            timestamp,
        );

        for table in stats.tables_index_usage()? {
            let Some(percent) = parse_percent(&table.percent_of_times_index_used) else {
                warn!(
                    source = %self.source,
                    relation = %table.relname,
                    value = %table.percent_of_times_index_used,
                    "skipping unparsable index usage"
                );
                report.invalid += 1;
                continue;
            };
            let metric = format!("{}.percent_of_times_index_used", table.relname);
            batch.add(
                self.formatter
                    .format(&metric, percent, timestamp, &self.source),
            );
        }

        report.samples = batch.len();
        match batch.flush(sink)? {
            FlushOutcome::Empty => {
                debug!(source = %self.source, timestamp, "nothing to submit");
            }
            FlushOutcome::Submitted(n) => {
                report.submitted = true;
                info!(source = %self.source, timestamp, samples = n, "batch submitted");
            }
        }

        Ok(report)
    }

    fn sample_counters(
        &mut self,
        stats: &mut dyn StatSource,
        batch: &mut SubmissionBatch,
        report: &mut CycleReport,
    ) -> Result<(), PgCollectError> {
        let counters = stats.aggregate_counters()?;

        for (name, raw) in counters.columns() {
            let Some(raw) = raw else {
                debug!(source = %self.source, counter = name, "counter is NULL");
                continue;
            };
            let Some(current) = parse_counter(raw) else {
                warn!(source = %self.source, counter = name, value = %raw, "skipping unparsable counter");
                report.invalid += 1;
                continue;
            };

            match self.counters.observe(name, current) {
                Observation::FirstSeen => {
                    debug!(source = %self.source, counter = name, baseline = current, "baseline recorded");
                    report.first_seen += 1;
                }
                Observation::Delta(delta) => {
                    batch.add(self.formatter.format(
                        name,
                        delta as f64,
                        report.timestamp,
                        &self.source,
                    ));
                }
                Observation::Reset { previous } => {
                    warn!(
                        source = %self.source,
                        counter = name,
                        previous,
                        current,
                        "counter reset detected, skipping this interval"
                    );
                    report.resets += 1;
                }
            }
        }

        Ok(())
    }

    /// Adds a gauge unless it was not observed this cycle.
    fn push_gauge(
        &self,
        batch: &mut SubmissionBatch,
        name: &str,
        value: Option<f64>,
        timestamp: i64,
    ) {
        match value {
            Some(v) if v.is_finite() => {
                batch.add(self.formatter.format(name, v, timestamp, &self.source));
            }
            _ => debug!(source = %self.source, gauge = name, "gauge not observed"),
        }
    }
}

fn parse_percent(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockQuery, MockStatSource};
    use crate::sample::MetricSample;
    use crate::sink::MemorySink;

    fn poller(interval: u64, source: &str) -> Poller {
        Poller::new(PollerConfig::new(interval, source).unwrap()).unwrap()
    }

    fn names(batch: &[MetricSample]) -> Vec<&str> {
        batch.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn inserts_scenario() {
        let mut poller = poller(300, "app");
        let mut sink = MemorySink::default();
        let mut stats = MockStatSource::new();

        let mut run = |value: u64, stats: &mut MockStatSource, sink: &mut MemorySink| {
            stats.counters.inserts = Some(value.to_string());
            poller.poll(stats, sink, 1000).unwrap()
        };

        let first = run(100, &mut stats, &mut sink);
        assert_eq!(first.first_seen, 1);
        assert!(!first.submitted);
        assert!(sink.calls.is_empty());

        run(150, &mut stats, &mut sink);
        assert_eq!(sink.calls.len(), 1);
        assert_eq!(
            sink.calls[0],
            vec![MetricSample {
                name: "postgres.inserts".into(),
                value: 50.0,
                timestamp: 900,
                source: "app".into(),
            }]
        );

        let reset = run(140, &mut stats, &mut sink);
        assert_eq!(reset.resets, 1);
        assert_eq!(sink.calls.len(), 1);

        run(160, &mut stats, &mut sink);
        assert_eq!(sink.calls.len(), 2);
        assert_eq!(sink.calls[1][0].value, 20.0);
    }

    #[test]
    fn first_cycle_emits_only_gauges() {
        let mut poller = poller(300, "app");
        let mut sink = MemorySink::default();
        let mut stats = MockStatSource::new()
            .with_counters(10, 20, 30, 40, 50)
            .with_gauges(0.95, 0.99, 8192)
            .with_table("users", "97", 1000);

        let report = poller.poll(&mut stats, &mut sink, 1000).unwrap();

        assert_eq!(report.first_seen, 5);
        assert_eq!(report.samples, 4);
        assert_eq!(
            names(&sink.calls[0]),
            vec![
                "postgres.index_hit_rate",
                "postgres.cache_hit_rate",
                "postgres.total_index_size",
                "postgres.users.percent_of_times_index_used",
            ]
        );
        assert_eq!(poller.counters().baseline("deletes"), Some(50));
    }

    #[test]
    fn second_cycle_emits_all_counter_deltas() {
        let mut poller = poller(60, "app");
        let mut sink = MemorySink::default();
        let mut stats = MockStatSource::new().with_counters(10, 20, 30, 40, 50);

        poller.poll(&mut stats, &mut sink, 0).unwrap();
        stats.set_counters(11, 22, 33, 44, 55);
        poller.poll(&mut stats, &mut sink, 60).unwrap();

        let batch = &sink.calls[0];
        assert_eq!(
            names(batch),
            vec![
                "postgres.sequence_scans",
                "postgres.index_scans",
                "postgres.inserts",
                "postgres.updates",
                "postgres.deletes",
            ]
        );
        let values: Vec<f64> = batch.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn every_sample_shares_the_bucket() {
        let mut poller = poller(300, "orders");
        let mut sink = MemorySink::default();
        let mut stats = MockStatSource::new()
            .with_gauges(0.5, 0.5, 1)
            .with_table("a", "1", 1)
            .with_table("b", "2", 1);

        poller.poll(&mut stats, &mut sink, 1000).unwrap();

        assert!(
            sink.calls[0]
                .iter()
                .all(|s| s.timestamp == 900 && s.source == "orders")
        );
    }

    #[test]
    fn empty_cycle_does_not_call_sink() {
        let mut poller = poller(300, "app");
        let mut sink = MemorySink::default();
        let mut stats = MockStatSource::new().with_counters(1, 1, 1, 1, 1);

        let report = poller.poll(&mut stats, &mut sink, 1000).unwrap();

        assert_eq!(report.samples, 0);
        assert!(!report.submitted);
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn null_gauges_are_skipped() {
        let mut poller = poller(300, "app");
        let mut sink = MemorySink::default();
        let mut stats = MockStatSource::new();
        stats.cache_hit_rate = Some(0.75);

        poller.poll(&mut stats, &mut sink, 1000).unwrap();

        assert_eq!(names(&sink.calls[0]), vec!["postgres.cache_hit_rate"]);
    }

    #[test]
    fn null_counter_leaves_baseline_untouched() {
        let mut poller = poller(300, "app");
        let mut sink = MemorySink::default();
        let mut stats = MockStatSource::new();

        poller.poll(&mut stats, &mut sink, 1000).unwrap();

        assert!(poller.counters().is_empty());
    }

    #[test]
    fn malformed_values_are_skipped_per_metric() {
        let mut poller = poller(300, "app");
        let mut sink = MemorySink::default();
        let mut stats = MockStatSource::new()
            .with_counters(1, 1, 1, 1, 1)
            .with_table("good", "40", 10)
            .with_table("bad", "n/a", 10);

        poller.poll(&mut stats, &mut sink, 0).unwrap();
        stats.set_counters(2, 2, 2, 2, 2);
        stats.counters.updates = Some("garbage".into());
        let report = poller.poll(&mut stats, &mut sink, 300).unwrap();

        assert_eq!(report.invalid, 2);
        assert_eq!(poller.counters().baseline("updates"), Some(1));
        let batch = sink.calls.last().unwrap();
        assert!(batch.iter().all(|s| s.name != "postgres.updates"));
        assert!(
            batch
                .iter()
                .any(|s| s.name == "postgres.good.percent_of_times_index_used" && s.value == 40.0)
        );
        assert!(!batch.iter().any(|s| s.name.contains("bad")));
    }

    #[test]
    fn query_failure_aborts_cycle_but_keeps_processed_baselines() {
        let mut poller = poller(300, "app");
        let mut sink = MemorySink::default();
        let mut stats = MockStatSource::new()
            .with_counters(5, 5, 5, 5, 5)
            .with_gauges(0.9, 0.9, 100)
            .failing_on(MockQuery::CacheHitRate);

        let err = poller.poll(&mut stats, &mut sink, 1000).unwrap_err();

        assert!(matches!(err, CycleError::Query(_)));
        assert!(sink.calls.is_empty());
        assert_eq!(poller.counters().baseline("inserts"), Some(5));
    }

    #[test]
    fn counter_query_failure_touches_nothing() {
        let mut poller = poller(300, "app");
        let mut sink = MemorySink::default();
        let mut stats = MockStatSource::new()
            .with_counters(5, 5, 5, 5, 5)
            .failing_on(MockQuery::AggregateCounters);

        assert!(poller.poll(&mut stats, &mut sink, 1000).is_err());
        assert!(poller.counters().is_empty());
        assert_eq!(stats.queries, 1);
    }

    #[test]
    fn sink_failure_is_reported_and_next_cycle_proceeds() {
        let mut poller = poller(300, "app");
        let mut failing = MemorySink::failing();
        let mut stats = MockStatSource::new().with_gauges(0.9, 0.9, 100);

        let err = poller.poll(&mut stats, &mut failing, 1000).unwrap_err();
        assert!(matches!(err, CycleError::Sink(_)));

        let mut sink = MemorySink::default();
        assert!(poller.poll(&mut stats, &mut sink, 1300).unwrap().submitted);
    }

    #[test]
    fn pollers_do_not_share_baselines() {
        let mut a = poller(300, "a");
        let mut b = poller(300, "b");
        let mut sink = MemorySink::default();
        let mut stats_a = MockStatSource::new().with_counters(1000, 0, 0, 0, 0);
        let mut stats_b = MockStatSource::new().with_counters(10, 0, 0, 0, 0);

        a.poll(&mut stats_a, &mut sink, 0).unwrap();
        b.poll(&mut stats_b, &mut sink, 0).unwrap();
        stats_a.set_counters(1100, 0, 0, 0, 0);
        stats_b.set_counters(15, 0, 0, 0, 0);
        let report_a = a.poll(&mut stats_a, &mut sink, 300).unwrap();
        let report_b = b.poll(&mut stats_b, &mut sink, 300).unwrap();

        assert_eq!(report_a.resets + report_b.resets, 0);
        let seq: Vec<(String, f64)> = sink
            .calls
            .iter()
            .flatten()
            .filter(|s| s.name == "postgres.sequence_scans")
            .map(|s| (s.source.clone(), s.value))
            .collect();
        assert_eq!(seq, vec![("a".into(), 100.0), ("b".into(), 5.0)]);
    }

    #[test]
    fn seeded_counters_emit_on_first_cycle() {
        let config = PollerConfig::new(300, "app")
            .unwrap()
            .with_namespace("pg")
            .with_initial_counters([("inserts", 90u64)].into_iter().collect());
        let mut poller = Poller::new(config).unwrap();
        let mut sink = MemorySink::default();
        let mut stats = MockStatSource::new();
        stats.counters.inserts = Some("100".into());

        poller.poll(&mut stats, &mut sink, 1000).unwrap();

        assert_eq!(sink.calls[0][0].name, "pg.inserts");
        assert_eq!(sink.calls[0][0].value, 10.0);
    }

    #[test]
    fn parse_percent_values() {
        assert_eq!(parse_percent("0"), Some(0.0));
        assert_eq!(parse_percent(" 99 "), Some(99.0));
        assert_eq!(parse_percent(""), None);
        assert_eq!(parse_percent("NaN"), None);
    }
}

//! In-memory `StatSource` for testing.

use super::PgCollectError;
use super::traits::{AggregateCounters, StatSource, TableIndexUsage};

/// Statistic category, used to script failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockQuery {
    AggregateCounters,
    IndexHitRate,
    CacheHitRate,
    TotalIndexSize,
    TablesIndexUsage,
}

/// Serves fixed statistics; tests mutate the fields between cycles.
#[derive(Debug, Clone, Default)]
pub struct MockStatSource {
    pub counters: AggregateCounters,
    pub index_hit_rate: Option<f64>,
    pub cache_hit_rate: Option<f64>,
    pub total_index_size: Option<i64>,
    pub tables: Vec<TableIndexUsage>,
    /// Queries that fail with `QueryError`.
    pub failing: Vec<MockQuery>,
    /// Number of queries executed so far.
    pub queries: usize,
}

impl MockStatSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets all five counters from integers.
    pub fn with_counters(mut self, seq: u64, idx: u64, ins: u64, upd: u64, del: u64) -> Self {
        self.set_counters(seq, idx, ins, upd, del);
        self
    }

    pub fn set_counters(&mut self, seq: u64, idx: u64, ins: u64, upd: u64, del: u64) {
        self.counters = AggregateCounters {
            sequence_scans: Some(seq.to_string()),
            index_scans: Some(idx.to_string()),
            inserts: Some(ins.to_string()),
            updates: Some(upd.to_string()),
            deletes: Some(del.to_string()),
        };
    }

    pub fn with_gauges(mut self, index_hit: f64, cache_hit: f64, index_size: i64) -> Self {
        self.index_hit_rate = Some(index_hit);
        self.cache_hit_rate = Some(cache_hit);
        self.total_index_size = Some(index_size);
        self
    }

    pub fn with_table(mut self, relname: &str, percent: &str, rows: i64) -> Self {
        self.tables.push(TableIndexUsage {
            relname: relname.to_string(),
            percent_of_times_index_used: percent.to_string(),
            rows_in_table: rows,
        });
        self
    }

    pub fn failing_on(mut self, query: MockQuery) -> Self {
        self.failing.push(query);
        self
    }

    fn run(&mut self, query: MockQuery) -> Result<(), PgCollectError> {
        self.queries += 1;
        if self.failing.contains(&query) {
            return Err(PgCollectError::QueryError(format!(
                "{:?}: canceling statement due to statement timeout",
                query
            )));
        }
        Ok(())
    }
}

impl StatSource for MockStatSource {
    fn aggregate_counters(&mut self) -> Result<AggregateCounters, PgCollectError> {
        self.run(MockQuery::AggregateCounters)?;
        Ok(self.counters.clone())
    }

    fn index_hit_rate(&mut self) -> Result<Option<f64>, PgCollectError> {
        self.run(MockQuery::IndexHitRate)?;
        Ok(self.index_hit_rate)
    }

    fn cache_hit_rate(&mut self) -> Result<Option<f64>, PgCollectError> {
        self.run(MockQuery::CacheHitRate)?;
        Ok(self.cache_hit_rate)
    }

    fn total_index_size(&mut self) -> Result<Option<i64>, PgCollectError> {
        self.run(MockQuery::TotalIndexSize)?;
        Ok(self.total_index_size)
    }

    fn tables_index_usage(&mut self) -> Result<Vec<TableIndexUsage>, PgCollectError> {
        self.run(MockQuery::TablesIndexUsage)?;
        Ok(self.tables.clone())
    }
}

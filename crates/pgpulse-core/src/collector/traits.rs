//! Query contract consumed by the poller.
//!
//! Each method returns the documented columns of one statistic category.
//! Implementations decide how to fetch them; the poller only sees values.

use super::PgCollectError;

/// Cumulative activity counters summed over all user tables.
///
/// Values arrive as text (PostgreSQL `numeric`) and are parsed by the caller.
/// `None` means the server returned NULL (no user tables).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateCounters {
    pub sequence_scans: Option<String>,
    pub index_scans: Option<String>,
    pub inserts: Option<String>,
    pub updates: Option<String>,
    pub deletes: Option<String>,
}

impl AggregateCounters {
    /// Column names paired with their raw values, in query order.
    pub fn columns(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("sequence_scans", self.sequence_scans.as_deref()),
            ("index_scans", self.index_scans.as_deref()),
            ("inserts", self.inserts.as_deref()),
            ("updates", self.updates.as_deref()),
            ("deletes", self.deletes.as_deref()),
        ]
    }
}

/// How often lookups on one relation go through an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIndexUsage {
    pub relname: String,
    /// Integer percentage 0..100 as text.
    pub percent_of_times_index_used: String,
    pub rows_in_table: i64,
}

/// Source of the five statistic categories sampled each cycle.
pub trait StatSource {
    fn aggregate_counters(&mut self) -> Result<AggregateCounters, PgCollectError>;

    /// Fraction of index block reads served from shared buffers.
    fn index_hit_rate(&mut self) -> Result<Option<f64>, PgCollectError>;

    /// Fraction of heap block reads served from shared buffers.
    fn cache_hit_rate(&mut self) -> Result<Option<f64>, PgCollectError>;

    /// Total size of all indexes in bytes.
    fn total_index_size(&mut self) -> Result<Option<i64>, PgCollectError>;

    /// One row per table in the `public` schema, largest first.
    fn tables_index_usage(&mut self) -> Result<Vec<TableIndexUsage>, PgCollectError>;
}

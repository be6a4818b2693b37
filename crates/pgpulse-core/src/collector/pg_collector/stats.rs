//! `StatSource` implementation over a live connection.

use super::queries::{
    AGGREGATE_COUNTERS, CACHE_HIT_RATE, INDEX_HIT_RATE, TABLES_INDEX_USAGE, TOTAL_INDEX_SIZE,
};
use super::{PgCollectError, PostgresCollector, column_error};
use crate::collector::traits::{AggregateCounters, StatSource, TableIndexUsage};

impl StatSource for PostgresCollector {
    fn aggregate_counters(&mut self) -> Result<AggregateCounters, PgCollectError> {
        let row = self.query_first(AGGREGATE_COUNTERS)?;
        let text = |column: &str| {
            row.try_get::<_, Option<String>>(column)
                .map_err(|e| column_error(column, e))
        };

        Ok(AggregateCounters {
            sequence_scans: text("sequence_scans")?,
            index_scans: text("index_scans")?,
            inserts: text("inserts")?,
            updates: text("updates")?,
            deletes: text("deletes")?,
        })
    }

    fn index_hit_rate(&mut self) -> Result<Option<f64>, PgCollectError> {
        self.query_first(INDEX_HIT_RATE)?
            .try_get("index_hit_rate")
            .map_err(|e| column_error("index_hit_rate", e))
    }

    fn cache_hit_rate(&mut self) -> Result<Option<f64>, PgCollectError> {
        self.query_first(CACHE_HIT_RATE)?
            .try_get("cache_hit_rate")
            .map_err(|e| column_error("cache_hit_rate", e))
    }

    fn total_index_size(&mut self) -> Result<Option<i64>, PgCollectError> {
        self.query_first(TOTAL_INDEX_SIZE)?
            .try_get("total_index_size")
            .map_err(|e| column_error("total_index_size", e))
    }

    fn tables_index_usage(&mut self) -> Result<Vec<TableIndexUsage>, PgCollectError> {
        let rows = self.query(TABLES_INDEX_USAGE)?;
        let mut tables = Vec::with_capacity(rows.len());

        for row in &rows {
            let Ok(relname) = row.try_get::<_, String>("relname") else {
                continue; // skip rows that fail to deserialize
            };
            tables.push(TableIndexUsage {
                relname,
                percent_of_times_index_used: row
                    .try_get::<_, Option<String>>("percent_of_times_index_used")
                    .ok()
                    .flatten()
                    .unwrap_or_default(),
                rows_in_table: row.try_get("rows_in_table").unwrap_or(0),
            });
        }

        Ok(tables)
    }
}

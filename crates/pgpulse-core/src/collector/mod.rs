//! Statistic queries.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                    Poller                    │
//! └──────────────────────┬───────────────────────┘
//!                        │
//!                 ┌──────▼──────┐
//!                 │ StatSource  │ (trait)
//!                 └──────┬──────┘
//!              ┌─────────┴──────────┐
//!       ┌──────▼────────────┐ ┌─────▼──────────┐
//!       │ PostgresCollector │ │ MockStatSource │
//!       │ (postgres client) │ │ (Testing)      │
//!       └───────────────────┘ └────────────────┘
//! ```
//!
//! `PostgresCollector` additionally exposes diagnostic queries (bloat, locks,
//! long-running queries, ...) used by `pgpulse-report`.

pub mod mock;
mod pg_collector;
pub mod traits;

pub use mock::{MockQuery, MockStatSource};
pub use pg_collector::diagnostics::{
    BlockingQuery, BloatEntry, LongRunningQuery, TableLock, UnusedIndex, VacuumStats,
};
pub use pg_collector::{PgCollectError, PostgresCollector, source_label};
pub use traits::{AggregateCounters, StatSource, TableIndexUsage};

//! pgpulse-core — PostgreSQL statistics sampling pipeline.
//!
//! Provides:
//! - `collector` — the `StatSource` query contract, its PostgreSQL implementation
//!   and an in-memory mock
//! - `counters` — cumulative counter baselines and delta computation
//! - `bucket` — interval alignment of cycle timestamps
//! - `sample` — metric sample records and naming
//! - `batch` — per-cycle submission batch
//! - `sink` — remote metric sinks (Librato, log-only)
//! - `config` — validated polling configuration
//! - `poller` — one polling context per source, running whole cycles

pub mod batch;
pub mod bucket;
pub mod collector;
pub mod config;
pub mod counters;
pub mod poller;
pub mod sample;
pub mod sink;

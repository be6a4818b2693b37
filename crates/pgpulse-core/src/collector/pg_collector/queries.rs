//! SQL for the sampled statistic categories.
//!
//! Counters are cast to text so the caller parses them explicitly; ratios are
//! guarded with `nullif` so an idle server yields NULL rather than an error.

pub(super) const AGGREGATE_COUNTERS: &str = r#"
    SELECT
        sum(seq_scan)::text  AS sequence_scans,
        sum(idx_scan)::text  AS index_scans,
        sum(n_tup_ins)::text AS inserts,
        sum(n_tup_upd)::text AS updates,
        sum(n_tup_del)::text AS deletes
    FROM pg_stat_user_tables
"#;

pub(super) const INDEX_HIT_RATE: &str = r#"
    SELECT
        (sum(idx_blks_hit)::numeric
            / nullif(sum(idx_blks_hit + idx_blks_read), 0))::double precision AS index_hit_rate
    FROM pg_statio_user_indexes
"#;

pub(super) const CACHE_HIT_RATE: &str = r#"
    SELECT
        (sum(heap_blks_hit)::numeric
            / nullif(sum(heap_blks_hit) + sum(heap_blks_read), 0))::double precision AS cache_hit_rate
    FROM pg_statio_user_tables
"#;

/// Index size in bytes: pages times the 8 KiB block size.
pub(super) const TOTAL_INDEX_SIZE: &str = r#"
    SELECT sum(relpages::bigint * 8192)::bigint AS total_index_size
    FROM pg_class
    WHERE reltype = 0
"#;

pub(super) const TABLES_INDEX_USAGE: &str = r#"
    SELECT
        relname,
        CASE
            WHEN idx_scan > 0 THEN (100 * idx_scan / (seq_scan + idx_scan))::text
            ELSE '0'
        END AS percent_of_times_index_used,
        n_live_tup AS rows_in_table
    FROM pg_stat_user_tables
    WHERE schemaname = 'public'
    ORDER BY n_live_tup DESC
"#;

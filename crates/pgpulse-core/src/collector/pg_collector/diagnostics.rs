//! Diagnostic queries that are reported on demand, never submitted as metrics.

use postgres::Row;
use serde::Serialize;

use super::{PgCollectError, PostgresCollector};

const UNUSED_INDEXES: &str = r#"
    SELECT
        schemaname || '.' || relname AS table_name,
        indexrelname AS index_name,
        pg_size_pretty(pg_relation_size(i.indexrelid)) AS index_size,
        idx_scan AS index_scans
    FROM pg_stat_user_indexes ui
    JOIN pg_index i ON ui.indexrelid = i.indexrelid
    WHERE NOT indisunique AND idx_scan < 50 AND pg_relation_size(relid) > 5 * 8192
    ORDER BY pg_relation_size(i.indexrelid) / nullif(idx_scan, 0) DESC NULLS FIRST,
             pg_relation_size(i.indexrelid) DESC
"#;

const LONG_RUNNING_QUERIES: &str = r#"
    SELECT
        pid,
        (now() - query_start)::text AS duration,
        query
    FROM pg_stat_activity
    WHERE query <> ''::text
      AND state <> 'idle'
      AND now() - query_start > interval '5 minutes'
    ORDER BY now() - query_start DESC
"#;

const BLOCKING_QUERIES: &str = r#"
    SELECT
        bl.pid AS blocked_pid,
        a.usename::text AS blocked_user,
        kl.pid AS blocking_pid,
        ka.usename::text AS blocking_user,
        a.query AS blocked_statement
    FROM pg_catalog.pg_locks bl
    JOIN pg_catalog.pg_stat_activity a ON a.pid = bl.pid
    JOIN pg_catalog.pg_locks kl ON kl.transactionid = bl.transactionid AND kl.pid != bl.pid
    JOIN pg_catalog.pg_stat_activity ka ON ka.pid = kl.pid
    WHERE NOT bl.granted
"#;

const TABLE_LOCKS: &str = r#"
    SELECT
        pg_stat_activity.pid,
        pg_class.relname::text AS relname,
        pg_locks.transactionid::text AS transactionid,
        pg_locks.granted,
        substr(pg_stat_activity.query, 1, 30) AS query_snippet,
        age(now(), pg_stat_activity.query_start)::text AS age
    FROM pg_stat_activity, pg_locks
    LEFT OUTER JOIN pg_class ON pg_locks.relation = pg_class.oid
    WHERE pg_stat_activity.query <> '<insufficient privilege>'
      AND pg_locks.pid = pg_stat_activity.pid
      AND pg_locks.mode = 'ExclusiveLock'
      AND pg_stat_activity.pid <> pg_backend_pid()
    ORDER BY query_start
"#;

const VACUUM_STATS: &str = r#"
    WITH table_opts AS (
        SELECT pg_class.oid, relname, nspname, array_to_string(reloptions, '') AS relopts
        FROM pg_class INNER JOIN pg_namespace ns ON relnamespace = ns.oid
    ), vacuum_settings AS (
        SELECT
            oid, relname, nspname,
            CASE
                WHEN relopts LIKE '%autovacuum_vacuum_threshold%'
                THEN substring(relopts, 'autovacuum_vacuum_threshold=([0-9.]+)')::integer
                ELSE current_setting('autovacuum_vacuum_threshold')::integer
            END AS autovacuum_vacuum_threshold,
            CASE
                WHEN relopts LIKE '%autovacuum_vacuum_scale_factor%'
                THEN substring(relopts, 'autovacuum_vacuum_scale_factor=([0-9.]+)')::real
                ELSE current_setting('autovacuum_vacuum_scale_factor')::real
            END AS autovacuum_vacuum_scale_factor
        FROM table_opts
    )
    SELECT
        vacuum_settings.nspname::text AS schema_name,
        vacuum_settings.relname::text AS table_name,
        to_char(psut.last_vacuum, 'YYYY-MM-DD HH24:MI') AS last_vacuum,
        to_char(psut.last_autovacuum, 'YYYY-MM-DD HH24:MI') AS last_autovacuum,
        pg_class.reltuples::bigint AS rowcount,
        psut.n_dead_tup AS dead_rowcount,
        (autovacuum_vacuum_threshold
            + autovacuum_vacuum_scale_factor::numeric * pg_class.reltuples::numeric)::bigint
            AS autovacuum_threshold,
        autovacuum_vacuum_threshold
            + autovacuum_vacuum_scale_factor::numeric * pg_class.reltuples::numeric
            < psut.n_dead_tup AS expect_autovacuum
    FROM pg_stat_user_tables psut
    INNER JOIN pg_class ON psut.relid = pg_class.oid
    INNER JOIN vacuum_settings ON pg_class.oid = vacuum_settings.oid
    ORDER BY 1, 2
"#;

const BLOAT: &str = r#"
    WITH constants AS (
        SELECT current_setting('block_size')::numeric AS bs, 23 AS hdr, 4 AS ma
    ), bloat_info AS (
        SELECT
            ma, bs, schemaname, tablename,
            (datawidth + (hdr + ma - (CASE WHEN hdr % ma = 0 THEN ma ELSE hdr % ma END)))::numeric AS datahdr,
            (maxfracsum * (nullhdr + ma - (CASE WHEN nullhdr % ma = 0 THEN ma ELSE nullhdr % ma END))) AS nullhdr2
        FROM (
            SELECT
                schemaname, tablename, hdr, ma, bs,
                SUM((1 - null_frac) * avg_width) AS datawidth,
                MAX(null_frac) AS maxfracsum,
                hdr + (
                    SELECT 1 + count(*) / 8
                    FROM pg_stats s2
                    WHERE null_frac <> 0 AND s2.schemaname = s.schemaname AND s2.tablename = s.tablename
                ) AS nullhdr
            FROM pg_stats s, constants
            GROUP BY 1, 2, 3, 4, 5
        ) AS foo
    ), table_bloat AS (
        SELECT
            schemaname, tablename, cc.relpages, bs,
            CEIL((cc.reltuples * ((datahdr + ma -
                (CASE WHEN datahdr % ma = 0 THEN ma ELSE datahdr % ma END)) + nullhdr2 + 4)) / (bs - 20::float)) AS otta
        FROM bloat_info
        JOIN pg_class cc ON cc.relname = bloat_info.tablename
        JOIN pg_namespace nn ON cc.relnamespace = nn.oid
            AND nn.nspname = bloat_info.schemaname AND nn.nspname <> 'information_schema'
    ), index_bloat AS (
        SELECT
            schemaname, tablename, bs,
            COALESCE(c2.relname, '?') AS iname,
            COALESCE(c2.reltuples, 0) AS ituples,
            COALESCE(c2.relpages, 0) AS ipages,
            COALESCE(CEIL((c2.reltuples * (datahdr - 12)) / (bs - 20::float)), 0) AS iotta
        FROM bloat_info
        JOIN pg_class cc ON cc.relname = bloat_info.tablename
        JOIN pg_namespace nn ON cc.relnamespace = nn.oid
            AND nn.nspname = bloat_info.schemaname AND nn.nspname <> 'information_schema'
        JOIN pg_index i ON indrelid = cc.oid
        JOIN pg_class c2 ON c2.oid = i.indexrelid
    )
    SELECT
        type, schemaname::text AS schemaname, object_name::text AS object_name,
        bloat::double precision AS bloat,
        raw_waste::bigint AS waste_bytes,
        pg_size_pretty(raw_waste::bigint) AS waste
    FROM (
        SELECT
            'table' AS type,
            schemaname,
            tablename AS object_name,
            ROUND(CASE WHEN otta = 0 THEN 0.0 ELSE table_bloat.relpages / otta::numeric END, 1) AS bloat,
            CASE WHEN relpages < otta THEN 0 ELSE (bs * (table_bloat.relpages - otta)::bigint)::bigint END AS raw_waste
        FROM table_bloat
        UNION
        SELECT
            'index' AS type,
            schemaname,
            tablename || '::' || iname AS object_name,
            ROUND(CASE WHEN iotta = 0 OR ipages = 0 THEN 0.0 ELSE ipages / iotta::numeric END, 1) AS bloat,
            CASE WHEN ipages < iotta THEN 0 ELSE (bs * (ipages - iotta))::bigint END AS raw_waste
        FROM index_bloat
    ) bloat_summary
    ORDER BY raw_waste DESC, bloat DESC
"#;

/// Non-unique index scanned fewer than 50 times on a non-trivial table.
#[derive(Debug, Clone, Serialize)]
pub struct UnusedIndex {
    pub table: String,
    pub index: String,
    pub index_size: String,
    pub index_scans: i64,
}

/// Non-idle statement running longer than five minutes.
#[derive(Debug, Clone, Serialize)]
pub struct LongRunningQuery {
    pub pid: i32,
    pub duration: String,
    pub query: String,
}

/// A backend waiting on a transaction lock held by another backend.
#[derive(Debug, Clone, Serialize)]
pub struct BlockingQuery {
    pub blocked_pid: i32,
    pub blocked_user: String,
    pub blocking_pid: i32,
    pub blocking_user: String,
    pub blocked_statement: String,
}

/// Exclusive lock held or awaited by another backend.
#[derive(Debug, Clone, Serialize)]
pub struct TableLock {
    pub pid: i32,
    pub relname: Option<String>,
    pub transactionid: Option<String>,
    pub granted: bool,
    pub query_snippet: String,
    pub age: String,
}

/// Vacuum history and autovacuum threshold for one table.
#[derive(Debug, Clone, Serialize)]
pub struct VacuumStats {
    pub schema: String,
    pub table: String,
    pub last_vacuum: Option<String>,
    pub last_autovacuum: Option<String>,
    pub rowcount: i64,
    pub dead_rowcount: i64,
    pub autovacuum_threshold: i64,
    pub expect_autovacuum: bool,
}

/// Estimated bloat of a table or index.
#[derive(Debug, Clone, Serialize)]
pub struct BloatEntry {
    /// `table` or `index`.
    pub kind: String,
    pub schemaname: String,
    pub object_name: String,
    pub bloat: f64,
    pub waste_bytes: i64,
    pub waste: String,
}

impl PostgresCollector {
    pub fn unused_indexes(&mut self) -> Result<Vec<UnusedIndex>, PgCollectError> {
        self.collect_rows(UNUSED_INDEXES, |row| {
            Some(UnusedIndex {
                table: row.try_get("table_name").ok()?,
                index: row.try_get("index_name").ok()?,
                index_size: row.try_get("index_size").unwrap_or_default(),
                index_scans: row.try_get("index_scans").unwrap_or(0),
            })
        })
    }

    pub fn long_running_queries(&mut self) -> Result<Vec<LongRunningQuery>, PgCollectError> {
        self.collect_rows(LONG_RUNNING_QUERIES, |row| {
            Some(LongRunningQuery {
                pid: row.try_get("pid").ok()?,
                duration: row.try_get("duration").unwrap_or_default(),
                query: row.try_get("query").unwrap_or_default(),
            })
        })
    }

    pub fn blocking_queries(&mut self) -> Result<Vec<BlockingQuery>, PgCollectError> {
        self.collect_rows(BLOCKING_QUERIES, |row| {
            Some(BlockingQuery {
                blocked_pid: row.try_get("blocked_pid").ok()?,
                blocked_user: row.try_get("blocked_user").unwrap_or_default(),
                blocking_pid: row.try_get("blocking_pid").ok()?,
                blocking_user: row.try_get("blocking_user").unwrap_or_default(),
                blocked_statement: row.try_get("blocked_statement").unwrap_or_default(),
            })
        })
    }

    pub fn table_locks(&mut self) -> Result<Vec<TableLock>, PgCollectError> {
        self.collect_rows(TABLE_LOCKS, |row| {
            Some(TableLock {
                pid: row.try_get("pid").ok()?,
                relname: row.try_get("relname").ok().flatten(),
                transactionid: row.try_get("transactionid").ok().flatten(),
                granted: row.try_get("granted").unwrap_or(false),
                query_snippet: row.try_get("query_snippet").unwrap_or_default(),
                age: row.try_get("age").unwrap_or_default(),
            })
        })
    }

    pub fn vacuum_stats(&mut self) -> Result<Vec<VacuumStats>, PgCollectError> {
        self.collect_rows(VACUUM_STATS, |row| {
            Some(VacuumStats {
                schema: row.try_get("schema_name").ok()?,
                table: row.try_get("table_name").ok()?,
                last_vacuum: row.try_get("last_vacuum").ok().flatten(),
                last_autovacuum: row.try_get("last_autovacuum").ok().flatten(),
                rowcount: row.try_get("rowcount").unwrap_or(0),
                dead_rowcount: row.try_get("dead_rowcount").unwrap_or(0),
                autovacuum_threshold: row.try_get("autovacuum_threshold").unwrap_or(0),
                expect_autovacuum: row.try_get("expect_autovacuum").unwrap_or(false),
            })
        })
    }

    pub fn bloat(&mut self) -> Result<Vec<BloatEntry>, PgCollectError> {
        self.collect_rows(BLOAT, |row| {
            Some(BloatEntry {
                kind: row.try_get("type").ok()?,
                schemaname: row.try_get("schemaname").ok()?,
                object_name: row.try_get("object_name").ok()?,
                bloat: row.try_get("bloat").unwrap_or(0.0),
                waste_bytes: row.try_get("waste_bytes").unwrap_or(0),
                waste: row.try_get("waste").unwrap_or_default(),
            })
        })
    }

    /// Runs `sql` and keeps the rows `parse` accepts.
    fn collect_rows<T>(
        &mut self,
        sql: &str,
        parse: impl Fn(&Row) -> Option<T>,
    ) -> Result<Vec<T>, PgCollectError> {
        Ok(self.query(sql)?.iter().filter_map(parse).collect())
    }
}

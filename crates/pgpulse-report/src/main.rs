use std::collections::BTreeMap;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use pgpulse_core::collector::{PgCollectError, PostgresCollector};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "pgpulse-report", about = "One-shot PostgreSQL health report")]
struct Cli {
    /// Database to inspect
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Sections to include (all when omitted)
    #[arg(value_enum)]
    sections: Vec<Section>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Log connection details at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Section {
    UnusedIndexes,
    LongRunningQueries,
    BlockingQueries,
    TableLocks,
    VacuumStats,
    Bloat,
}

impl Section {
    const ALL: [Section; 6] = [
        Section::UnusedIndexes,
        Section::LongRunningQueries,
        Section::BlockingQueries,
        Section::TableLocks,
        Section::VacuumStats,
        Section::Bloat,
    ];

    fn key(self) -> &'static str {
        match self {
            Section::UnusedIndexes => "unused_indexes",
            Section::LongRunningQueries => "long_running_queries",
            Section::BlockingQueries => "blocking_queries",
            Section::TableLocks => "table_locks",
            Section::VacuumStats => "vacuum_stats",
            Section::Bloat => "bloat",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Section::UnusedIndexes => "Unused indexes",
            Section::LongRunningQueries => "Queries running longer than 5 minutes",
            Section::BlockingQueries => "Blocked queries",
            Section::TableLocks => "Exclusive locks",
            Section::VacuumStats => "Vacuum statistics",
            Section::Bloat => "Table and index bloat",
        }
    }

    fn collect(self, collector: &mut PostgresCollector) -> Result<Vec<Value>, PgCollectError> {
        match self {
            Section::UnusedIndexes => collector.unused_indexes().map(to_values),
            Section::LongRunningQueries => collector.long_running_queries().map(to_values),
            Section::BlockingQueries => collector.blocking_queries().map(to_values),
            Section::TableLocks => collector.table_locks().map(to_values),
            Section::VacuumStats => collector.vacuum_stats().map(to_values),
            Section::Bloat => collector.bloat().map(to_values),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut sections = if cli.sections.is_empty() {
        Section::ALL.to_vec()
    } else {
        cli.sections.clone()
    };
    sections.sort();
    sections.dedup();

    let mut collector = PostgresCollector::with_connection_string(cli.database_url.clone());
    if let Err(e) = collector.try_connect() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let mut report: BTreeMap<&'static str, Vec<Value>> = BTreeMap::new();
    let mut failed = false;
    for section in &sections {
        match section.collect(&mut collector) {
            Ok(rows) => {
                report.insert(section.key(), rows);
            }
            Err(e) => {
                eprintln!("{}: {e}", section.key());
                failed = true;
            }
        }
    }

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("failed to encode report: {e}");
                std::process::exit(1);
            }
        }
    } else {
        for section in &sections {
            if let Some(rows) = report.get(section.key()) {
                print!("{}", render_section(section.title(), rows));
            }
        }
    }

    if failed {
        std::process::exit(2);
    }
}

// ── Formatting helpers ───────────────────────────────────────────────────────

fn to_values<T: Serialize>(rows: Vec<T>) -> Vec<Value> {
    rows.iter()
        .filter_map(|row| serde_json::to_value(row).ok())
        .collect()
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_section(title: &str, rows: &[Value]) -> String {
    let mut out = format!("== {} ({})\n", title, rows.len());
    if rows.is_empty() {
        out.push_str("   none\n");
    }
    for row in rows {
        let Value::Object(fields) = row else {
            continue;
        };
        let line: Vec<String> = fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, render_value(v)))
            .collect();
        out.push_str("   ");
        out.push_str(&line.join("  "));
        out.push('\n');
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_rows_as_key_value_lines() {
        let rows = vec![json!({"pid": 42, "query": "select 1", "relname": null})];
        let out = render_section("Exclusive locks", &rows);
        assert!(out.starts_with("== Exclusive locks (1)\n"));
        assert!(out.contains("pid=42"));
        assert!(out.contains("query=select 1"));
        assert!(out.contains("relname=-"));
    }

    #[test]
    fn renders_empty_section() {
        assert_eq!(render_section("Bloat", &[]), "== Bloat (0)\n   none\n\n");
    }

    #[test]
    fn section_names_parse_from_cli() {
        let cli = Cli::try_parse_from([
            "pgpulse-report",
            "--database-url",
            "postgres://localhost/app",
            "bloat",
            "table-locks",
        ])
        .unwrap();
        assert_eq!(cli.sections, vec![Section::Bloat, Section::TableLocks]);
    }
}

//! pgpulsed - PostgreSQL statistics forwarder.
//!
//! Polls each configured database on a fixed interval and submits counter
//! deltas and gauges to Librato. Every database gets its own thread and its
//! own counter baselines.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use pgpulse_core::bucket::{Interval, Ticker};
use pgpulse_core::collector::{PostgresCollector, source_label};
use pgpulse_core::config::{DEFAULT_SOURCE, PollerConfig};
use pgpulse_core::poller::Poller;
use pgpulse_core::sink::{DEFAULT_LIBRATO_URL, LibratoSink, LogSink, MetricSink};

/// PostgreSQL statistics forwarder.
#[derive(Parser)]
#[command(name = "pgpulsed", about = "PostgreSQL statistics forwarder", version)]
struct Args {
    /// Collection interval in seconds. Also the timestamp bucket width.
    #[arg(short, long, default_value = "300", value_parser = clap::value_parser!(u64).range(1..=Interval::MAX_SECS))]
    interval: u64,

    /// Prefix for every metric name.
    #[arg(long, default_value = "postgres")]
    namespace: String,

    /// Database to poll (repeatable). Defaults to every environment variable
    /// whose name contains DATABASE_URL.
    #[arg(long = "database-url", value_name = "URL")]
    database_urls: Vec<String>,

    /// Librato account user.
    #[arg(long, env = "LIBRATO_USER", required_unless_present = "dry_run")]
    librato_user: Option<String>,

    /// Librato API token.
    #[arg(
        long,
        env = "LIBRATO_TOKEN",
        hide_env_values = true,
        required_unless_present = "dry_run"
    )]
    librato_token: Option<String>,

    /// Metrics API endpoint.
    #[arg(long, default_value = DEFAULT_LIBRATO_URL)]
    api_url: String,

    /// Log batches instead of sending them.
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["pgpulsed", "pgpulse_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Collects `*DATABASE_URL*` values from the environment, ordered by variable name.
fn database_urls_from_env() -> Vec<String> {
    let mut vars: Vec<(String, String)> = std::env::vars()
        .filter(|(key, _)| key.contains("DATABASE_URL"))
        .collect();
    vars.sort();
    vars.into_iter().map(|(_, url)| url).collect()
}

/// A database to poll and the label its samples carry.
struct Source {
    url: String,
    label: String,
}

fn resolve_sources(urls: Vec<String>) -> Vec<Source> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter_map(|url| {
            if !seen.insert(url.clone()) {
                return None;
            }
            let label = source_label(&url).unwrap_or_else(|| DEFAULT_SOURCE.to_string());
            Some(Source { url, label })
        })
        .collect()
}

fn build_sink(args: &Args) -> Box<dyn MetricSink + Send> {
    match (&args.librato_user, &args.librato_token) {
        (Some(user), Some(token)) if !args.dry_run => {
            Box::new(LibratoSink::with_url(&args.api_url, user, token))
        }
        _ => Box::new(LogSink),
    }
}

/// Polls one source until `running` is cleared.
///
/// Cycles run back to back on this thread, so they never overlap. Boundaries
/// that pass while a cycle is still running are skipped.
fn run_source(
    source: Source,
    mut poller: Poller,
    mut sink: Box<dyn MetricSink + Send>,
    running: Arc<AtomicBool>,
) {
    let mut collector = PostgresCollector::with_connection_string(source.url);
    match collector.try_connect() {
        Ok(()) => info!(source = %source.label, "connected"),
        Err(e) => warn!(source = %source.label, "initial connection failed ({}), will retry each cycle", e),
    }

    let mut ticker = Ticker::new(poller.interval());
    let check = Duration::from_millis(100);

    while running.load(Ordering::SeqCst) {
        let now = Utc::now().timestamp();
        if !ticker.is_due(now) {
            thread::sleep(ticker.wait(now).min(check));
            continue;
        }

        let tick = ticker.fire(now);
        if tick.skipped > 0 {
            warn!(
                source = %source.label,
                skipped = tick.skipped,
                "missed triggers since the previous cycle"
            );
        }

        match poller.poll(&mut collector, sink.as_mut(), now) {
            Ok(report) => debug!(
                source = %source.label,
                timestamp = report.timestamp,
                samples = report.samples,
                first_seen = report.first_seen,
                resets = report.resets,
                invalid = report.invalid,
                "cycle complete"
            ),
            Err(e) => error!(source = %source.label, "cycle failed: {}", e),
        }

        let overrun = ticker.complete(Utc::now().timestamp());
        if overrun > 0 {
            warn!(
                source = %source.label,
                skipped = overrun,
                "cycle overran the interval, skipping triggers that fired meanwhile"
            );
        }
    }

    debug!(source = %source.label, "poller stopped");
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!("pgpulsed {} starting", env!("CARGO_PKG_VERSION"));

    let urls = if args.database_urls.is_empty() {
        database_urls_from_env()
    } else {
        args.database_urls.clone()
    };
    let sources = resolve_sources(urls);
    if sources.is_empty() {
        error!("no databases configured: pass --database-url or set DATABASE_URL");
        std::process::exit(1);
    }

    let mut labels = HashSet::new();
    for source in &sources {
        if !labels.insert(source.label.as_str()) {
            warn!(source = %source.label, "several databases share this source label");
        }
    }

    if args.dry_run {
        info!("Config: interval={}s, namespace={}, sink=log (dry run)", args.interval, args.namespace);
    } else {
        info!("Config: interval={}s, namespace={}, sink={}", args.interval, args.namespace, args.api_url);
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut handles = Vec::with_capacity(sources.len());
    for source in sources {
        let config = match PollerConfig::new(args.interval, source.label.clone()) {
            Ok(config) => config.with_namespace(args.namespace.clone()),
            Err(e) => {
                error!("invalid configuration: {}", e);
                std::process::exit(1);
            }
        };
        let poller = match Poller::new(config) {
            Ok(poller) => poller,
            Err(e) => {
                error!("invalid configuration: {}", e);
                std::process::exit(1);
            }
        };

        info!(source = %source.label, interval = %poller.interval(), "starting poller");
        let sink = build_sink(&args);
        let flag = running.clone();
        let name = format!("poll-{}", source.label);
        match thread::Builder::new()
            .name(name)
            .spawn(move || run_source(source, poller, sink, flag))
        {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                error!("failed to spawn poller thread: {}", e);
                running.store(false, Ordering::SeqCst);
                break;
            }
        }
    }

    for handle in handles {
        if handle.join().is_err() {
            error!("poller thread panicked");
        }
    }

    info!("Shutdown complete");
}

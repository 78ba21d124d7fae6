//! JS8 Monitor CLI - bridge JS8Call's UDP API to loggers, maps and radios.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use js8_monitor::{
    CommandRelay, Config, Dispatcher, GridResolver, HostDirectory, Listener, Monitor,
    MonitorStats, Outcome, SmtpAlerter,
    hosts::HOSTS_FILE,
    lookup::{
        CallookLookup, FCC_DB_FILE, FlatFileDb, GridLookup, HAMCALL_CD_DB_FILE, HamcallLookup,
        LOCAL_DB_FILE, LocalDb, RAC_CD_DB_FILE, REJECTS_FILE, RejectLog,
    },
    metrics::start_metrics_server,
    sinks::{AdifLogSink, AprsLogSink, GeoServerSink, GridTrackerSink, N1mmSink, Sink, SinkError},
};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// JS8 Monitor - forward JS8Call traffic to N1MM, GridTracker, GeoServer and log files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, env = "JS8_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "JS8_MONITOR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Print statistics every N seconds (0 = never); overrides the config file
    #[arg(short, long)]
    stats_interval: Option<u64>,

    /// Maximum runtime in seconds (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_runtime: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(log_level, config.log_file.as_deref())?;
    config.validate()?;

    info!("JS8 Monitor starting...");
    info!("Operator: {}", config.station.operator);

    let stats = Arc::new(MonitorStats::new());

    // Create shutdown signal
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            return;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx_clone.send(true);
    });

    if args.max_runtime > 0 {
        let shutdown_tx_clone = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(args.max_runtime)).await;
            info!("Max runtime reached");
            let _ = shutdown_tx_clone.send(true);
        });
    }

    if config.metrics.enabled {
        let port = config.metrics.port;
        let stats_clone = Arc::clone(&stats);
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(port, stats_clone).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    let resolver = build_resolver(&config, &stats).await?;
    info!("Grid lookups: {}", resolver.backend_names().join(", "));

    let dispatcher = Dispatcher::new(build_sinks(&config).await, config.grids.effective_grid_length())
        .with_stats(Arc::clone(&stats));
    if dispatcher.is_empty() {
        warn!("No sinks enabled; records will only be logged");
    } else {
        info!("Sinks: {}", dispatcher.sink_names().join(", "));
    }

    let hosts_path = config.databases.location.join(HOSTS_FILE);
    let hosts = HostDirectory::load(&hosts_path).await.unwrap_or_else(|e| {
        debug!("No host directory at {}: {}", hosts_path.display(), e);
        HostDirectory::default()
    });

    let (relay_tx, relay_rx) = mpsc::unbounded_channel();
    let relay = CommandRelay::bind()
        .await
        .context("Failed to bind command relay socket")?
        .with_stats(Arc::clone(&stats));
    tokio::spawn(relay.run(relay_rx));

    let mut monitor = Monitor::new(&config, resolver, dispatcher, hosts, relay_tx)
        .with_stats(Arc::clone(&stats));
    if config.smtp.enabled {
        let alerter = SmtpAlerter::new(&config.smtp).context("Invalid SMTP settings")?;
        monitor = monitor.with_alerter(Arc::new(alerter));
    }

    let listener = Listener::bind(&config.listener.host, config.listener.port).await?;
    let mut events = listener.start();

    let stats_interval = args.stats_interval.unwrap_or(config.stats_interval);
    let mut stats_timer = tokio::time::interval(Duration::from_secs(stats_interval.max(1)));
    stats_timer.tick().await;

    // Main event loop
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = stats_timer.tick(), if stats_interval > 0 => {
                println!("\n{}", stats.summary());
            }

            line = events.recv() => {
                let Some(line) = line else {
                    warn!("Listener stopped");
                    break;
                };
                if let Outcome::Closed { exit: true } = monitor.handle(&line).await {
                    info!("JS8Call closed, shutting down");
                    break;
                }
            }
        }
    }

    // Print final statistics
    println!("\n\nFINAL STATISTICS");
    println!("{}", stats.summary());

    Ok(())
}

/// Console logging, plus a plain-text copy in `log_file` when set.
fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();
    Ok(())
}

/// Grid lookup backends in priority order: FCC, HamCall CD, RAC CD, local,
/// callook.info, hamcall.net.
///
/// A flat file that can't be loaded disables only that backend.
async fn build_resolver(config: &Config, stats: &Arc<MonitorStats>) -> Result<GridResolver> {
    let db = &config.databases;
    let mut backends: Vec<Arc<dyn GridLookup>> = Vec::new();

    for (enabled, name, file) in [
        (db.fcc, "fcc", FCC_DB_FILE),
        (db.hamcall_cd, "hamcall-cd", HAMCALL_CD_DB_FILE),
        (db.rac_cd, "rac-cd", RAC_CD_DB_FILE),
    ] {
        if !enabled {
            continue;
        }
        let path = db.location.join(file);
        match FlatFileDb::load(name, &path).await {
            Ok(flat) => backends.push(Arc::new(flat)),
            Err(e) => warn!("Disabling {} lookups, can't load {}: {}", name, path.display(), e),
        }
    }

    let local = if db.local {
        let local = Arc::new(LocalDb::open(db.location.join(LOCAL_DB_FILE)).await);
        backends.push(Arc::clone(&local) as Arc<dyn GridLookup>);
        Some(local)
    } else {
        None
    };

    if db.callook || db.hamcall_online {
        let client = reqwest::Client::builder()
            .user_agent(concat!("js8-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        if db.callook {
            backends.push(Arc::new(CallookLookup::new(client.clone())));
        }
        if db.hamcall_online {
            backends.push(Arc::new(HamcallLookup::new(
                client,
                db.hamcall_username.clone(),
                db.hamcall_password.clone(),
            )));
        }
    }

    let mut resolver =
        GridResolver::new(backends, db.lookup_timeout()).with_stats(Arc::clone(stats));
    if db.learning()
        && let Some(local) = local
    {
        resolver = resolver.with_learning(local);
    }
    if db.collect_rejects {
        resolver = resolver.with_rejects(RejectLog::new(db.location.join(REJECTS_FILE)));
    }
    Ok(resolver)
}

fn keep_sink<S: Sink + 'static>(
    sinks: &mut Vec<Box<dyn Sink>>,
    name: &str,
    sink: Result<S, SinkError>,
) {
    match sink {
        Ok(sink) => sinks.push(Box::new(sink)),
        Err(e) => error!("Disabling {} sink: {}", name, e),
    }
}

/// Every enabled sink. One that can't be set up is logged and left out.
async fn build_sinks(config: &Config) -> Vec<Box<dyn Sink>> {
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();

    if config.n1mm.enabled {
        let sink = N1mmSink::new(&config.n1mm.host, config.n1mm.port).await;
        keep_sink(&mut sinks, "n1mm", sink);
    }
    if config.gridtracker.enabled {
        let sink = GridTrackerSink::new(&config.gridtracker.host, config.gridtracker.port).await;
        keep_sink(&mut sinks, "gridtracker", sink);
    }
    if config.geoserver.enabled() {
        let geo = &config.geoserver;
        let sink = GeoServerSink::new(
            &geo.host,
            geo.port,
            geo.token.clone(),
            geo.enabled_spot,
            geo.enabled_msg,
        )
        .await;
        keep_sink(&mut sinks, "geoserver", sink);
    }
    if config.aprs.enabled {
        sinks.push(Box::new(AprsLogSink::new(config.aprs.logfile.clone())));
    }
    if config.adif.enabled {
        sinks.push(Box::new(AdifLogSink::new(config.adif.logfile.clone())));
    }
    sinks
}

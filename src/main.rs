//! iotopd - disk throughput sampling daemon.
//!
//! Supervises iotop, converts its periodic summary lines into bitrate
//! samples, and prints them as collectd exec-plugin `PUTVAL` lines on
//! stdout. Logs go to stderr so stdout stays machine-readable.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use iotopd::plugin::{self, Metric, MetricSink, PluginConfig};

/// Disk throughput sampling daemon.
#[derive(Parser)]
#[command(name = "iotopd", about = "Disk throughput sampling daemon", version)]
struct Args {
    /// Sampling interval in seconds.
    #[arg(short, long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Path to the iotop binary.
    #[arg(long, default_value = "iotop")]
    iotop_path: String,

    /// Hostname used in the PUTVAL identifier. Defaults to $HOSTNAME.
    #[arg(long)]
    hostname: Option<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
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

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("iotopd={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Writes metrics as collectd exec-plugin `PUTVAL` lines:
///
/// ```text
/// PUTVAL "host/iotopd/bitrate-actual_read" interval=5 1754474553:12000
/// ```
struct PutvalSink {
    hostname: String,
}

impl MetricSink for PutvalSink {
    fn dispatch(&mut self, metric: &Metric) {
        println!(
            "PUTVAL \"{}/{}/{}-{}\" interval={} {}:{}",
            self.hostname,
            metric.plugin,
            metric.type_name,
            metric.type_instance,
            metric.interval,
            metric.timestamp,
            metric.value
        );
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("iotopd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}s, iotop={}",
        args.interval, args.iotop_path
    );

    let config = PluginConfig {
        interval: args.interval,
        iotop_path: args.iotop_path,
    };

    let sampler = match plugin::init(&config) {
        Ok(sampler) => sampler,
        Err(e) => {
            error!("failed to start sampling worker: {}", e);
            std::process::exit(1);
        }
    };

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let hostname = args.hostname.unwrap_or_else(|| {
        std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
    });
    let mut sink = PutvalSink { hostname };
    let interval = Duration::from_secs(config.interval);

    info!("Starting poll loop");

    while running.load(Ordering::SeqCst) {
        plugin::read(&sampler, &mut sink);
        let _ = io::stdout().flush();

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutting down...");
    plugin::shutdown(sampler);
    info!("Shutdown complete");
}

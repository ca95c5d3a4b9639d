//! Plugin lifecycle and metric dispatch.
//!
//! The host drives four entry points, in order: [`configure`] turns
//! key/value options into a [`PluginConfig`], [`init`] starts the sampling
//! worker, [`read`] is polled on the host's own schedule and forwards every
//! queued sample to a [`MetricSink`], and [`shutdown`] stops the worker.

use tracing::{info, warn};

use crate::worker::{Sample, Sampler};

/// Plugin name stamped on every dispatched metric.
pub const PLUGIN_NAME: &str = "iotopd";

/// Metric type understood by the host for throughput values.
pub const TYPE_BITRATE: &str = "bitrate";

/// Configuration for the sampling worker. Built once by [`configure`],
/// immutable for the worker's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    /// Sampling interval handed to iotop, in seconds. Must be positive.
    pub interval: u64,
    /// Program to supervise. Overridable so tests can substitute a stub.
    pub iotop_path: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            interval: 5,
            iotop_path: "iotop".to_string(),
        }
    }
}

/// Error type for configuration failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Builds the worker configuration from host-supplied key/value options.
///
/// `interval` is the only recognized key (case-insensitive, positive
/// integer seconds). Unknown keys are logged and ignored so host-side
/// config extensions do not break the plugin; a malformed interval is an
/// error.
pub fn configure(options: &[(String, String)]) -> Result<PluginConfig, ConfigError> {
    let mut config = PluginConfig::default();

    for (key, value) in options {
        match key.to_lowercase().as_str() {
            "interval" => {
                let interval: u64 = value.parse().map_err(|_| {
                    ConfigError::new(format!("invalid interval '{}'", value))
                })?;
                if interval == 0 {
                    return Err(ConfigError::new("interval must be positive"));
                }
                info!("config: interval={}s", interval);
                config.interval = interval;
            }
            _ => warn!("config: ignoring unknown option '{}'", key),
        }
    }

    Ok(config)
}

/// One value ready for the host's ingestion interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    pub plugin: &'static str,
    pub type_name: &'static str,
    /// Distinguishes sub-metrics within one type: `actual_read` or
    /// `actual_write`.
    pub type_instance: &'static str,
    /// Unix seconds.
    pub timestamp: i64,
    /// Seconds between values of this series.
    pub interval: u64,
    pub value: u64,
}

/// Host-side metric ingestion interface.
pub trait MetricSink {
    fn dispatch(&mut self, metric: &Metric);
}

/// Starts the sampling worker. The monitor process begins emitting
/// immediately; samples queue until the first [`read`].
pub fn init(config: &PluginConfig) -> std::io::Result<Sampler> {
    Sampler::spawn(config)
}

/// Polled by the host: drains every queued sample and dispatches two
/// metrics per sample, read throughput then write throughput. Never
/// blocks; an empty queue dispatches nothing and is not an error.
pub fn read(sampler: &Sampler, sink: &mut dyn MetricSink) {
    for sample in sampler.drain() {
        dispatch_sample(&sample, sampler.interval(), sink);
    }
}

fn dispatch_sample(sample: &Sample, interval: u64, sink: &mut dyn MetricSink) {
    for (type_instance, value) in [
        ("actual_read", sample.read_bitrate),
        ("actual_write", sample.write_bitrate),
    ] {
        sink.dispatch(&Metric {
            plugin: PLUGIN_NAME,
            type_name: TYPE_BITRATE,
            type_instance,
            timestamp: sample.timestamp,
            interval,
            value,
        });
    }
}

/// Stops the worker and reaps the monitor process.
pub fn shutdown(mut sampler: Sampler) {
    sampler.shutdown();
}

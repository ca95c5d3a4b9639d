//! Sampling worker: drives iotop output through the parser and timestamp
//! reconstruction, handing finished samples to the reader over a channel.
//!
//! The worker runs on its own thread and blocks only on reading the
//! monitor process output, so cancellation is observed within one line
//! interval. The shutdown escalation in [`Sampler::shutdown`] kills the
//! monitor process, which closes the stream and unblocks the worker.

use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::parser::{self, ParseError};
use crate::plugin::PluginConfig;
use crate::supervisor::MonitorProcess;
use crate::timestamp::reconstruct;

/// One disk throughput measurement, ready for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Unix seconds.
    pub timestamp: i64,
    /// Bits per second.
    pub read_bitrate: u64,
    /// Bits per second.
    pub write_bitrate: u64,
}

/// Error type for worker failures.
#[derive(Debug)]
pub enum WorkerError {
    /// I/O error reading the monitor process output.
    Io(io::Error),
    /// Malformed summary line.
    Parse(ParseError),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::Io(e) => write!(f, "I/O error: {}", e),
            WorkerError::Parse(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for WorkerError {}

impl From<io::Error> for WorkerError {
    fn from(e: io::Error) -> Self {
        WorkerError::Io(e)
    }
}

impl From<ParseError> for WorkerError {
    fn from(e: ParseError) -> Self {
        WorkerError::Parse(e)
    }
}

/// Handle to a running sampling worker: the supervised process, the worker
/// thread, and the consuming end of the sample channel.
pub struct Sampler {
    rx: Receiver<Sample>,
    cancel: Arc<AtomicBool>,
    process: Arc<Mutex<MonitorProcess>>,
    thread: Option<JoinHandle<()>>,
    interval: u64,
}

impl Sampler {
    /// Starts the monitor process and the worker thread.
    pub fn spawn(config: &PluginConfig) -> io::Result<Self> {
        let mut process = MonitorProcess::start(config)?;
        let stdout = process
            .take_stdout()
            .ok_or_else(|| io::Error::other("monitor process has no stdout"))?;

        let process = Arc::new(Mutex::new(process));
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let thread = {
            let process = Arc::clone(&process);
            let cancel = Arc::clone(&cancel);
            thread::Builder::new()
                .name("iotop-sampler".to_string())
                .spawn(move || run(BufReader::new(stdout), &process, &cancel, tx))
        };
        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                // No worker to own the process; reap it here.
                process.lock().unwrap_or_else(|p| p.into_inner()).terminate();
                return Err(e);
            }
        };

        Ok(Self {
            rx,
            cancel,
            process,
            thread: Some(thread),
            interval: config.interval,
        })
    }

    /// Configured sampling interval in seconds.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Takes every sample currently queued, without blocking. An empty or
    /// already-closed channel yields an empty vec.
    pub fn drain(&self) -> Vec<Sample> {
        let mut samples = Vec::new();
        while let Ok(sample) = self.rx.try_recv() {
            samples.push(sample);
        }
        samples
    }

    /// Two-phase shutdown: request cancellation, give the worker
    /// `interval + 1` seconds to notice, then kill the monitor process to
    /// unblock its read and join with no further timeout. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.cancel.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + Duration::from_secs(self.interval + 1);
        while !thread.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(100));
        }

        if !thread.is_finished() {
            info!("sampling worker still blocked, terminating monitor process");
            let mut process = self.process.lock().unwrap_or_else(|e| e.into_inner());
            process.terminate();
        }

        if thread.join().is_err() {
            warn!("sampling worker panicked");
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker thread body. The drain steps (closing the channel, reaping the
/// monitor process) run on the error path too.
fn run(
    reader: impl BufRead,
    process: &Mutex<MonitorProcess>,
    cancel: &AtomicBool,
    tx: Sender<Sample>,
) {
    let result = sample_loop(reader, cancel, &tx);

    // Close the channel before reaping so the reader never observes a
    // half-shut worker.
    drop(tx);
    let mut process = process.lock().unwrap_or_else(|e| e.into_inner());
    process.terminate();

    match result {
        Ok(()) => info!("sampling worker exits"),
        Err(e) => error!("sampling worker failed: {}", e),
    }
}

fn sample_loop(
    mut reader: impl BufRead,
    cancel: &AtomicBool,
    tx: &Sender<Sample>,
) -> Result<(), WorkerError> {
    let mut line = String::new();

    // iotop's first reported statistic is often wrong; skip its two lines
    // regardless of content.
    for _ in 0..2 {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
    }

    loop {
        if cancel.load(Ordering::SeqCst) {
            debug!("cancellation requested");
            return Ok(());
        }

        line.clear();
        if reader.read_line(&mut line)? == 0 {
            info!("monitor process closed its output");
            return Ok(());
        }

        let Some(raw) = parser::parse_line(&line)? else {
            continue;
        };

        // `now` is captured at the moment the line is consumed so the
        // midnight rollback sees the same clock the line raced against.
        let now = Local::now();
        let Some(ts) = reconstruct(raw.time_of_day, now.naive_local()) else {
            debug!("discarding stale sample at {}", raw.time_of_day);
            continue;
        };
        let Some(local_ts) = ts.and_local_timezone(Local).earliest() else {
            debug!("discarding sample in nonexistent local time {}", ts);
            continue;
        };

        let sample = Sample {
            timestamp: local_ts.timestamp(),
            read_bitrate: parser::to_bits_per_sec(raw.read_kb_per_sec),
            write_bitrate: parser::to_bits_per_sec(raw.write_kb_per_sec),
        };

        debug!(
            "sample at {}: read={} write={} bit/s",
            sample.timestamp, sample.read_bitrate, sample.write_bitrate
        );

        if tx.send(sample).is_err() {
            // Receiver gone, nobody is listening anymore.
            return Ok(());
        }
    }
}

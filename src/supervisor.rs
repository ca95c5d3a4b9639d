//! Supervision of the external iotop process.
//!
//! The sampling worker owns exactly one [`MonitorProcess`] for the duration
//! of a run. Shutdown must never fail the caller, so termination is
//! best-effort: errors are logged and swallowed.

use std::io;
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::{debug, warn};

use crate::plugin::PluginConfig;

/// Handle to a running iotop process.
pub struct MonitorProcess {
    child: Child,
}

impl MonitorProcess {
    /// Spawns iotop with stdout piped.
    ///
    /// Flags: only processes doing I/O (`o`), double quiet so column
    /// headers are printed never rather than once per interval (`qq`),
    /// a time-of-day prefix on each line (`t`), kilobyte units (`k`), and
    /// one report every `interval` seconds (`d`).
    pub fn start(config: &PluginConfig) -> io::Result<Self> {
        let child = Command::new(&config.iotop_path)
            .arg("-oqqtkd")
            .arg(config.interval.to_string())
            .stdout(Stdio::piped())
            .spawn()?;
        debug!("started {} (pid {})", config.iotop_path, child.id());
        Ok(Self { child })
    }

    /// Takes the piped output stream. Yields `Some` exactly once.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Returns true once the process has exited, reaping it if needed.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Best-effort termination: no-op on an already-exited process,
    /// otherwise kill then wait with no further timeout. Idempotent, and
    /// never propagates OS errors to the caller.
    pub fn terminate(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("monitor process already exited: {}", status);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("could not poll monitor process: {}", e),
        }

        if let Err(e) = self.child.kill() {
            warn!("failed to kill monitor process: {}", e);
        }
        match self.child.wait() {
            Ok(status) => debug!("monitor process reaped: {}", status),
            Err(e) => warn!("failed to reap monitor process: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginConfig;
    use std::fs;
    use std::io::Read;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Writes an executable stub standing in for iotop, the same
    /// substitution tests make for `/proc` elsewhere.
    fn stub_config(dir: &TempDir, script: &str) -> PluginConfig {
        let path = dir.path().join("fake-iotop");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        PluginConfig {
            interval: 1,
            iotop_path: path.to_string_lossy().into_owned(),
        }
    }

    #[test]
    fn start_pipes_stdout() {
        let dir = TempDir::new().unwrap();
        let config = stub_config(&dir, "#!/bin/sh\necho hello\n");

        let mut process = MonitorProcess::start(&config).unwrap();
        let mut stdout = process.take_stdout().unwrap();
        assert!(process.take_stdout().is_none());

        let mut output = String::new();
        stdout.read_to_string(&mut output).unwrap();
        assert_eq!(output, "hello\n");

        process.terminate();
        assert!(process.has_exited());
    }

    #[test]
    fn start_propagates_spawn_errors() {
        let config = PluginConfig {
            interval: 1,
            iotop_path: "/nonexistent/iotop-binary".to_string(),
        };
        assert!(MonitorProcess::start(&config).is_err());
    }

    #[test]
    fn terminate_kills_a_running_process() {
        let dir = TempDir::new().unwrap();
        let config = stub_config(&dir, "#!/bin/sh\nexec sleep 600\n");

        let mut process = MonitorProcess::start(&config).unwrap();
        assert!(!process.has_exited());

        process.terminate();
        assert!(process.has_exited());
    }

    #[test]
    fn terminate_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = stub_config(&dir, "#!/bin/sh\nexec sleep 600\n");

        let mut process = MonitorProcess::start(&config).unwrap();
        process.terminate();
        process.terminate();
        assert!(process.has_exited());
    }
}

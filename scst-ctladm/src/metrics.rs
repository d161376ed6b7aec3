//! Prometheus metrics for `ctladm` runs
//!
//! The process lives for one command, so there is no scrape endpoint. When
//! enabled, the exposition is written to a file for the node_exporter
//! textfile collector.

use std::io::Write;
use std::path::Path;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tempfile::NamedTempFile;
use tracing::debug;

/// Metric names
pub mod names {
    /// Counter: Commands run by name and status
    pub const COMMANDS_TOTAL: &str = "ctladm_commands_total";
    /// Histogram: Duration of commands in seconds
    pub const COMMAND_DURATION_SECONDS: &str = "ctladm_command_duration_seconds";
    /// Gauge: LUNs reported by the last devlist
    pub const LUNS_TOTAL: &str = "ctladm_luns_total";
    /// Gauge: Ports reported by the last portlist
    pub const PORTS_TOTAL: &str = "ctladm_ports_total";
    /// Counter: Items skipped or degraded because a read failed
    pub const PARTIAL_RESULTS_TOTAL: &str = "ctladm_partial_results_total";
    /// Counter: Writes to SCST control files by file and status
    pub const CONTROL_WRITES_TOTAL: &str = "ctladm_control_writes_total";
}

/// Install a Prometheus recorder without an HTTP listener.
pub fn init_metrics() -> Result<PrometheusHandle, Box<dyn std::error::Error + Send + Sync>> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    debug!("Metrics recorder installed");
    Ok(handle)
}

/// Render the recorded metrics and atomically replace `path` with them.
pub fn write_textfile(handle: &PrometheusHandle, path: &Path) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(handle.render().as_bytes())?;
    temp_file.persist(path).map_err(|e| e.error)?;

    debug!(path = %path.display(), "Metrics written");
    Ok(())
}

/// Record a command with its result
pub fn record_command(command: &str, status: &str, duration_secs: f64) {
    counter!(names::COMMANDS_TOTAL, "command" => command.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(names::COMMAND_DURATION_SECONDS, "command" => command.to_string())
        .record(duration_secs);
}

pub fn set_luns_count(count: usize) {
    gauge!(names::LUNS_TOTAL).set(count as f64);
}

pub fn set_ports_count(count: usize) {
    gauge!(names::PORTS_TOTAL).set(count as f64);
}

/// Record an item that was skipped or reported with a degraded value
pub fn record_partial_result(kind: &str) {
    counter!(names::PARTIAL_RESULTS_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// Record a write to an SCST control file
pub fn record_control_write(file: &str, ok: bool) {
    let status = if ok { "success" } else { "error" };
    counter!(names::CONTROL_WRITES_TOTAL, "file" => file.to_string(), "status" => status)
        .increment(1);
}

/// Helper for timing commands
pub struct OperationTimer {
    command: String,
    start: Instant,
}

impl OperationTimer {
    /// Start timing a command
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            start: Instant::now(),
        }
    }

    /// Complete the command with success
    pub fn success(self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_command(&self.command, "success", duration);
    }

    /// Complete the command with failure
    pub fn failure(self, error_code: &str) {
        let duration = self.start.elapsed().as_secs_f64();
        record_command(&self.command, error_code, duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tempfile::TempDir;

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("devlist");
        std::thread::sleep(std::time::Duration::from_millis(10));
        // Without an installed recorder this is a no-op
        timer.success();
    }

    #[test]
    fn test_write_textfile() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            record_partial_result("exported_wwn");
            record_control_write("active", true);
        });

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ctladm.prom");
        write_textfile(&handle, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(names::PARTIAL_RESULTS_TOTAL), "got: {}", content);
        assert!(content.contains("kind=\"exported_wwn\""), "got: {}", content);
        assert!(content.contains(names::CONTROL_WRITES_TOTAL));
    }
}

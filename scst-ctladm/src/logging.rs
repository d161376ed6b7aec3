//! Log destination for the `ctladm` binary.
//!
//! Stdout belongs to the command output that scripts parse, so logs go to a
//! file and fall back to stderr.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Log file used in production.
pub const DEFAULT_LOG_FILE: &str = "/var/log/ctladm.log";
/// Log file used when `CTLADM_DEBUG=true`, relative to the working directory.
pub const DEBUG_LOG_FILE: &str = "ctladm.log";
/// Environment variable selecting the development log file.
pub const DEBUG_ENV: &str = "CTLADM_DEBUG";

/// Pick the log file: an explicit path wins, then the development file when
/// `debug_env` is `"true"`, then the production file.
pub fn log_file_path(explicit: Option<&Path>, debug_env: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if debug_env == Some("true") {
        return PathBuf::from(DEBUG_LOG_FILE);
    }
    PathBuf::from(DEFAULT_LOG_FILE)
}

/// Open the log file for appending, creating it if needed.
pub fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

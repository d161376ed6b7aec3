//! SCST compatibility layer for `ctladm`
//!
//! This library lets scripts written against the FreeBSD `ctladm` tool run on a
//! Linux host serving iSCSI with SCST. It reads and writes the SCST sysfs tree
//! and renders the result the way `ctladm devlist`/`portlist` do.
//!
//! The library is split into several modules:
//! - `scst`: sysfs reading, SCST object discovery and control writes
//! - `ctl`: LUN/port correlation and text/XML output
//! - `commands`: the `ctladm` commands
//! - `logging`: log file selection
//! - `metrics`: Prometheus metrics collection

pub mod commands;
pub mod ctl;
pub mod logging;
pub mod metrics;
pub mod scst;

pub use commands::{CommandError, Request, execute};
pub use ctl::{Lun, LunCorrelator, Port};
pub use scst::{Scst, ScstError};

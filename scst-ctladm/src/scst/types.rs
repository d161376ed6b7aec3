//! Value types shared by the SCST sysfs adapter.
//!
//! Attribute values are read from kernel-backed files that can vanish or
//! refuse reads at any time, so a read result is kept as [`Attr`] rather than
//! collapsed into a string.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::path::PathBuf;

use serde::Serialize;

use super::error::{Result, ScstError};

// ============================================================================
// Attr
// ============================================================================

/// The content of a single sysfs attribute file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attr {
    /// The file was read; holds the trimmed content.
    Value(String),
    /// The file could not be opened or read; holds the error text.
    Unavailable(String),
}

impl Attr {
    /// The value if it was read, `None` otherwise.
    pub fn value(&self) -> Option<&str> {
        match self {
            Attr::Value(v) => Some(v),
            Attr::Unavailable(_) => None,
        }
    }

    /// The value, or an empty string when it could not be read.
    pub fn as_str_or_empty(&self) -> &str {
        self.value().unwrap_or("")
    }

    /// The value if it was read and is not empty.
    pub fn non_empty(&self) -> Option<&str> {
        self.value().filter(|v| !v.is_empty())
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Attr::Value(_))
    }
}

impl Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attr::Value(v) => write!(f, "{}", v),
            Attr::Unavailable(reason) => write!(f, "<unavailable: {}>", reason),
        }
    }
}

// ============================================================================
// ParameterSet
// ============================================================================

/// Attribute files of one device or target directory, keyed by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet(HashMap<String, Attr>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, attr: Attr) {
        self.0.insert(name.into(), attr);
    }

    /// The typed value of an attribute, if the directory had such an entry.
    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.0.get(name)
    }

    /// The attribute text, `""` when it is missing or unreadable.
    pub fn value(&self, name: &str) -> &str {
        self.0.get(name).map(Attr::as_str_or_empty).unwrap_or("")
    }

    /// Entries that could not be read, with the reason.
    pub fn unavailable(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().filter_map(|(k, v)| match v {
            Attr::Unavailable(reason) => Some((k.as_str(), reason.as_str())),
            Attr::Value(_) => None,
        })
    }
}

impl FromIterator<(String, Attr)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, Attr)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// BlockDevice / ExportLink
// ============================================================================

/// A backing store registered with an SCST device handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockDevice {
    /// SCST device name (directory under `devices/`)
    pub name: String,
    /// Backing file or block device path, empty if unknown
    pub filename: String,
}

/// Where one entry of a device's `exported/` directory points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportLink {
    /// LUN of an iSCSI target, identified by the target WWN
    Iscsi { target: String },
    /// Anything else (another target driver, or an unexpected layout)
    Other(PathBuf),
}

// ============================================================================
// LUN provisioning
// ============================================================================

/// Steps of LUN provisioning, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateStep {
    FindTarget,
    AddDevice,
    ExportLun,
    SetVendorId,
}

impl Display for CreateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateStep::FindTarget => write!(f, "find_target"),
            CreateStep::AddDevice => write!(f, "add_device"),
            CreateStep::ExportLun => write!(f, "export_lun"),
            CreateStep::SetVendorId => write!(f, "set_vendor_id"),
        }
    }
}

/// Outcome of a provisioning run that got past the mandatory steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateLunReport {
    pub device: String,
    pub filename: String,
    /// WWN of the target that exports the new device as LUN 0
    pub target: String,
    pub completed: Vec<CreateStep>,
    pub vendor_id_set: bool,
}

// ============================================================================
// Validation helpers
// ============================================================================

/// Longest directory name sysfs can hold (`NAME_MAX`).
const MAX_NAME_LEN: usize = 255;

/// Validate a device name before it is used as a path component or spliced
/// into a management command.
///
/// SCST takes any name that makes a valid sysfs directory. Management commands
/// split on whitespace and `;`, so those are rejected along with `/`, control
/// characters and the `.`/`..` entries.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ScstError::InvalidName("name cannot be empty".into()));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(ScstError::InvalidName(format!(
            "name '{}' exceeds maximum length of {} bytes",
            name, MAX_NAME_LEN
        )));
    }

    if name == "." || name == ".." {
        return Err(ScstError::InvalidName(format!(
            "name '{}' is a directory reference",
            name
        )));
    }

    if name
        .chars()
        .any(|c| c == '/' || c == ';' || c.is_whitespace() || c.is_control())
    {
        return Err(ScstError::InvalidName(format!(
            "invalid characters in name '{}': '/', ';', whitespace and control characters are not allowed",
            name
        )));
    }

    Ok(())
}

/// Validate a backing file path for an `add_device` command.
///
/// Parameters in that command are separated by `;` and whitespace.
pub fn validate_backing_file(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ScstError::InvalidName("backing file cannot be empty".into()));
    }

    if !path.starts_with('/') {
        return Err(ScstError::InvalidName(format!(
            "backing file '{}' must be an absolute path",
            path
        )));
    }

    if path
        .chars()
        .any(|c| c == ';' || c.is_whitespace() || c.is_control())
    {
        return Err(ScstError::InvalidName(format!(
            "backing file '{}' contains invalid characters",
            path
        )));
    }

    Ok(())
}

//! Helpers for reading and writing a sysfs-style virtual tree.
//!
//! Reads return live kernel state and writes trigger actions, so nothing here
//! caches. Directory order is whatever the filesystem returns.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::{debug, trace};

use super::error::{Result, ScstError};
use super::types::{Attr, ParameterSet};

/// Marker SCST appends to attributes that differ from their default.
const KEY_MARKER: &str = "\n[key]";

/// List entry names of a directory.
pub fn list_entries(path: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(path).map_err(|e| ScstError::io(path, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScstError::io(path, e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// List entry names of a directory that are themselves directories.
///
/// Symlinks to directories count as directories.
pub fn list_dir_entries(path: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(path).map_err(|e| ScstError::io(path, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScstError::io(path, e))?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Read every entry of a directory into a [`ParameterSet`].
///
/// Only failing to list the directory is an error. An entry that cannot be
/// read (write-only `mgmt` files, subdirectories) is kept as
/// [`Attr::Unavailable`].
pub fn read_parameter_set(path: &Path) -> Result<ParameterSet> {
    let names = list_entries(path)?;
    let entries = names.len();

    let params: ParameterSet = names
        .into_iter()
        .map(|name| {
            let attr = match fs::read(path.join(&name)) {
                Ok(raw) => Attr::Value(trim_value(&String::from_utf8_lossy(&raw)).to_string()),
                Err(e) => {
                    trace!(entry = %name, error = %e, "Attribute not readable");
                    Attr::Unavailable(e.to_string())
                }
            };
            (name, attr)
        })
        .collect();

    debug!(path = %path.display(), entries, "Read parameter set");
    Ok(params)
}

/// Read the first line of an attribute file.
pub fn read_single_line(path: &Path) -> Attr {
    match fs::read(path) {
        Ok(raw) => {
            let content = String::from_utf8_lossy(&raw);
            Attr::Value(content.split('\n').next().unwrap_or("").to_string())
        }
        Err(e) => {
            trace!(path = %path.display(), error = %e, "Attribute not readable");
            Attr::Unavailable(e.to_string())
        }
    }
}

/// Write a single token to a control file.
///
/// The file is opened like a shell `>` redirect minus creation: a missing
/// control file is an error. The token goes out in one write since each write
/// is one command to SCST.
pub fn write_token(path: &Path, token: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| ScstError::io(path, e))?;

    file.write_all(token.as_bytes())
        .map_err(|e| ScstError::io(path, e))?;

    debug!(path = %path.display(), token, "Wrote control token");
    Ok(())
}

/// Strip the trailing newline and `[key]` marker from an attribute value.
fn trim_value(raw: &str) -> &str {
    let v = raw.strip_suffix('\n').unwrap_or(raw);
    let v = v.strip_suffix(KEY_MARKER).unwrap_or(v);
    let v = v.strip_suffix("\n[key]\n").unwrap_or(v);
    v.strip_suffix('\n').unwrap_or(v)
}

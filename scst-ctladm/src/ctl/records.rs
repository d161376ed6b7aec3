//! LUN and port records in the shape `ctladm devlist` / `ctladm portlist`
//! report them.

use std::path::Path;

/// Backend type of every LUN.
pub const BACKEND_BLOCK: &str = "block";
/// Transport type and port name of every port.
pub const TRANSPORT_ISCSI: &str = "iscsi";
/// Suffix turning a target WWN into its initiator-visible port WWPN.
pub const WWPN_SUFFIX: &str = ",t,0x0101";

/// A device exported as LUN 0 of an iSCSI target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lun {
    /// Relative target id of the exporting target
    pub id: String,
    pub backend_type: String,
    pub size: String,
    pub block_size: String,
    /// Unit serial number (`usn`)
    pub serial_number: String,
    /// Base name of the backing file
    pub device_name: String,
    pub filename: String,
    pub wwn: String,
    pub num_threads: String,
}

impl Lun {
    /// Columns of a `devlist` line, in output order.
    pub fn columns(&self) -> [&str; 9] {
        [
            &self.id,
            &self.backend_type,
            &self.size,
            &self.block_size,
            &self.serial_number,
            &self.device_name,
            &self.filename,
            &self.wwn,
            &self.num_threads,
        ]
    }

    /// `ctld_name` of the LUN as the BSD tool reports it.
    pub fn ctld_name(&self) -> String {
        format!("{},lun,0", self.wwn)
    }
}

/// The target side of the same join: one port per exported LUN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    /// Relative target id
    pub id: String,
    /// Backing device's `active` attribute is `1`
    pub active: bool,
    pub transport_type: String,
    pub port_name: String,
    pub initiator_wwpn: String,
    pub wwn: String,
    /// First connected initiator, if any
    pub initiator: Option<String>,
}

impl Port {
    pub fn new(id: String, active: bool, wwn: String, initiator: Option<String>) -> Self {
        Self {
            id,
            active,
            transport_type: TRANSPORT_ISCSI.to_string(),
            port_name: TRANSPORT_ISCSI.to_string(),
            initiator_wwpn: format!("{}{}", wwn, WWPN_SUFFIX),
            wwn,
            initiator,
        }
    }

    /// Columns of a `portlist` line, in output order.
    pub fn columns(&self) -> [&str; 6] {
        [
            &self.id,
            if self.active { "YES" } else { "NO" },
            &self.transport_type,
            &self.port_name,
            &self.initiator_wwpn,
            &self.wwn,
        ]
    }
}

/// Base name of a backing file path, empty for an empty path.
pub fn base_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Render records one per line.
pub fn to_text<'a, I, T>(records: I) -> String
where
    I: IntoIterator<Item = &'a T>,
    T: TextLine + 'a,
{
    records
        .into_iter()
        .map(|r| r.to_text())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A record with a tab-separated text form.
pub trait TextLine {
    fn to_text(&self) -> String;
}

impl TextLine for Lun {
    fn to_text(&self) -> String {
        self.columns().join("\t")
    }
}

impl TextLine for Port {
    fn to_text(&self) -> String {
        self.columns().join("\t")
    }
}

//! `ctladm` commands on top of the SCST adapter.
//!
//! Argument parsing lives in the binary; this module takes the parsed
//! [`Request`] and returns what the command prints on success.

use std::fmt::{self, Display};

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::ctl::records::{self, BACKEND_BLOCK};
use crate::ctl::{LunCorrelator, xml};
use crate::metrics::OperationTimer;
use crate::scst::{Scst, ScstError};

/// A parsed `ctladm` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `devlist [-x]`
    DevList { xml: bool },
    /// `portlist [-x]`
    PortList { xml: bool },
    /// `remove -b <backend> -l <lun>`
    Remove { backend: String, lun: String },
    /// `create -b <backend> [-o <opt>]... -d <device> [-l <lun>]`
    Create {
        backend: String,
        options: Vec<String>,
        device: String,
        lun: Option<String>,
    },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::DevList { .. } => "devlist",
            Request::PortList { .. } => "portlist",
            Request::Remove { .. } => "remove",
            Request::Create { .. } => "create",
        }
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("cannot get LUNs: {0}")]
    DevList(#[source] ScstError),

    #[error("cannot get ports: {0}")]
    PortList(#[source] ScstError),

    #[error("cannot find corresponding device for LUN {lun}: {source}")]
    LunLookup { lun: String, source: ScstError },

    #[error("failed to deactivate device {device} (LUN {lun}): {source}")]
    Deactivate {
        lun: String,
        device: String,
        source: ScstError,
    },

    #[error("failed to provision device {device}: {source}")]
    Provision { device: String, source: ScstError },

    #[error("failed to activate device {device}: {source}")]
    Activate { device: String, source: ScstError },

    #[error("unsupported backend '{0}': only \"block\" is accepted")]
    UnsupportedBackend(String),
}

impl CommandError {
    /// Short label for metrics.
    fn code(&self) -> &'static str {
        match self {
            CommandError::DevList(_) | CommandError::PortList(_) => "query_failed",
            CommandError::LunLookup { .. } => "not_found",
            CommandError::Deactivate { .. } | CommandError::Activate { .. } => "write_failed",
            CommandError::Provision { .. } => "provision_failed",
            CommandError::UnsupportedBackend(_) => "invalid_argument",
        }
    }
}

/// Run one request against an SCST tree.
///
/// On success returns the text to print, without a trailing newline. An empty
/// text list yields an empty string.
#[instrument(skip(scst, request), fields(command = %request))]
pub fn execute(scst: &Scst, request: &Request) -> Result<String, CommandError> {
    let timer = OperationTimer::new(request.name());
    let result = dispatch(scst, request);

    match &result {
        Ok(_) => timer.success(),
        Err(e) => {
            error!(error = %e, "Command failed");
            timer.failure(e.code());
        }
    }
    result
}

fn dispatch(scst: &Scst, request: &Request) -> Result<String, CommandError> {
    match request {
        Request::DevList { xml } => dev_list(scst, *xml),
        Request::PortList { xml } => port_list(scst, *xml),
        Request::Remove { backend, lun } => {
            check_backend(backend)?;
            remove_lun(scst, lun)
        }
        Request::Create {
            backend,
            options,
            device,
            lun,
        } => {
            check_backend(backend)?;
            debug!(options = ?options, lun = ?lun, "create arguments");
            if lun.is_some() {
                debug!("LUN id is ignored, devices are always exported as LUN 0");
            }
            create_lun(scst, device, options)
        }
    }
}

fn check_backend(backend: &str) -> Result<(), CommandError> {
    if backend != BACKEND_BLOCK {
        return Err(CommandError::UnsupportedBackend(backend.to_string()));
    }
    Ok(())
}

fn dev_list(scst: &Scst, as_xml: bool) -> Result<String, CommandError> {
    let luns = LunCorrelator::new(scst)
        .build_lun_records()
        .map_err(CommandError::DevList)?;
    debug!(count = luns.len(), "LUN records built");

    Ok(if as_xml {
        xml::lun_list(&luns)
    } else {
        records::to_text(&luns)
    })
}

fn port_list(scst: &Scst, as_xml: bool) -> Result<String, CommandError> {
    let ports = LunCorrelator::new(scst)
        .build_port_records()
        .map_err(CommandError::PortList)?;
    debug!(count = ports.len(), "Port records built");

    Ok(if as_xml {
        xml::port_list(&ports)
    } else {
        records::to_text(&ports)
    })
}

fn remove_lun(scst: &Scst, lun: &str) -> Result<String, CommandError> {
    let device = LunCorrelator::new(scst)
        .find_lun_device(lun)
        .map_err(|source| CommandError::LunLookup {
            lun: lun.to_string(),
            source,
        })?;

    scst.deactivate_device(&device)
        .map_err(|source| CommandError::Deactivate {
            lun: lun.to_string(),
            device: device.clone(),
            source,
        })?;

    let msg = format!("LUN {} ({}) deactivated", lun, device);
    info!("{}", msg);
    Ok(msg)
}

fn create_lun(scst: &Scst, device: &str, options: &[String]) -> Result<String, CommandError> {
    let mut lines = Vec::new();

    if let Some(filename) = backing_file(options) {
        let report = scst
            .create_lun(device, filename)
            .map_err(|source| CommandError::Provision {
                device: device.to_string(),
                source,
            })?;
        match serde_json::to_string(&report) {
            Ok(json) => info!(report = %json, "Device provisioned"),
            Err(e) => warn!(error = %e, "Cannot serialize provisioning report"),
        }
        lines.push(format!(
            "Device {} backed by {} exported as LUN 0 of {}",
            device, filename, report.target
        ));
    }

    scst.activate_device(device)
        .map_err(|source| CommandError::Activate {
            device: device.to_string(),
            source,
        })?;

    let msg = format!("Device {} activated", device);
    info!("{}", msg);
    lines.push(msg);
    Ok(lines.join("\n"))
}

/// Value of the first `file=<path>` option.
fn backing_file(options: &[String]) -> Option<&str> {
    options
        .iter()
        .find_map(|opt| opt.strip_prefix("file="))
        .filter(|path| !path.is_empty())
}

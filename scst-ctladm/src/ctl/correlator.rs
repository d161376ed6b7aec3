//! Joins SCST targets and devices into `ctladm` LUN and port records.
//!
//! The join key is the backing file name: a target's LUN 0 device link gives
//! `filename -> rel_tgt_id`, and every device with a matching `filename` becomes
//! one record. Devices without a matching export are left out.
//!
//! Everything is re-read on each call. Per-item read failures are logged and
//! the item is skipped or degraded; only an unreachable targets or devices
//! directory fails the whole query.

use std::collections::HashMap;

use tracing::{debug, instrument, trace, warn};

use super::records::{BACKEND_BLOCK, Lun, Port, base_name};
use crate::metrics;
use crate::scst::{Attr, ParameterSet, Result, Scst, ScstError};

/// Builds LUN and port records from one SCST tree.
#[derive(Debug, Clone, Copy)]
pub struct LunCorrelator<'a> {
    scst: &'a Scst,
}

/// Device attributes a LUN record is built from.
const LUN_ATTRS: [&str; 5] = ["filename", "size", "blocksize", "usn", "threads_num"];
/// Device attributes a port record is built from.
const PORT_ATTRS: [&str; 1] = ["active"];

/// A device with the relative id of the target exporting it.
struct Exported {
    device: String,
    rel_id: String,
    params: ParameterSet,
}

impl<'a> LunCorrelator<'a> {
    pub fn new(scst: &'a Scst) -> Self {
        Self { scst }
    }

    /// Map each target's LUN 0 backing file to the target's relative id.
    ///
    /// When several targets export the same file, the last one listed wins.
    #[instrument(skip(self))]
    pub fn build_lun_index(&self) -> Result<HashMap<String, String>> {
        let mut index = HashMap::new();

        for target in self.scst.list_iscsi_targets()? {
            let Some(device) = self.scst.lun0_device(&target) else {
                partial("lun0_device");
                warn!(wwn = %target, "Skipping target without a LUN 0 device");
                continue;
            };
            if device.filename.is_empty() {
                partial("lun0_device");
                warn!(wwn = %target, device = %device.name, "Skipping target whose LUN 0 device has no filename");
                continue;
            }

            let rel_id = match self.scst.relative_id(&target) {
                Attr::Value(id) if !id.is_empty() => id,
                other => {
                    partial("rel_tgt_id");
                    warn!(wwn = %target, rel_tgt_id = %other, "Skipping target without a relative id");
                    continue;
                }
            };

            trace!(wwn = %target, filename = %device.filename, rel_id = %rel_id, "Indexed LUN 0");
            if let Some(replaced) = index.insert(device.filename.clone(), rel_id.clone()) {
                warn!(
                    wwn = %target,
                    filename = %device.filename,
                    kept = %rel_id,
                    replaced = %replaced,
                    "Backing file exported by several targets"
                );
            }
        }

        debug!(entries = index.len(), "Built LUN index");
        Ok(index)
    }

    /// One record per device exported as LUN 0 of some target, in device
    /// enumeration order.
    #[instrument(skip(self))]
    pub fn build_lun_records(&self) -> Result<Vec<Lun>> {
        let luns: Vec<Lun> = self
            .exported_devices()?
            .into_iter()
            .map(|e| {
                report_unreadable(&e.device, &e.params, &LUN_ATTRS);
                let filename = e.params.value("filename").to_string();
                Lun {
                    id: e.rel_id,
                    backend_type: BACKEND_BLOCK.to_string(),
                    size: e.params.value("size").to_string(),
                    block_size: e.params.value("blocksize").to_string(),
                    serial_number: e.params.value("usn").to_string(),
                    device_name: base_name(&filename),
                    wwn: self.exported_wwn(&e.device),
                    num_threads: e.params.value("threads_num").to_string(),
                    filename,
                }
            })
            .collect();

        metrics::set_luns_count(luns.len());
        Ok(luns)
    }

    /// Port view of the same join as [`build_lun_records`](Self::build_lun_records).
    #[instrument(skip(self))]
    pub fn build_port_records(&self) -> Result<Vec<Port>> {
        let ports: Vec<Port> = self
            .exported_devices()?
            .into_iter()
            .map(|e| {
                report_unreadable(&e.device, &e.params, &PORT_ATTRS);
                let active = e.params.value("active") == "1";
                let wwn = self.exported_wwn(&e.device);
                let initiator = if wwn.is_empty() {
                    None
                } else {
                    self.scst.list_sessions(&wwn).into_iter().next()
                };
                Port::new(e.rel_id, active, wwn, initiator)
            })
            .collect();

        metrics::set_ports_count(ports.len());
        Ok(ports)
    }

    /// Name of the device exported as LUN 0 by the target whose `rel_tgt_id`
    /// is `rel_id`.
    #[instrument(skip(self))]
    pub fn find_lun_device(&self, rel_id: &str) -> Result<String> {
        let mut targets_by_id = HashMap::new();
        for target in self.scst.list_iscsi_targets()? {
            match self.scst.relative_id(&target) {
                Attr::Value(id) => {
                    if let Some(replaced) = targets_by_id.insert(id.clone(), target.clone()) {
                        warn!(wwn = %target, %replaced, rel_tgt_id = %id, "Relative id carried by several targets");
                    }
                }
                Attr::Unavailable(reason) => {
                    partial("rel_tgt_id");
                    warn!(wwn = %target, %reason, "Cannot read relative id");
                }
            }
        }

        let target = targets_by_id
            .get(rel_id)
            .ok_or_else(|| ScstError::LunNotFound(rel_id.to_string()))?;

        match self.scst.lun0_device(target) {
            Some(device) if !device.name.is_empty() => Ok(device.name),
            _ => {
                warn!(wwn = %target, rel_id, "Target has no LUN 0 device");
                Err(ScstError::LunNotFound(rel_id.to_string()))
            }
        }
    }

    /// Devices (excluding pass-through `h:c:i:l` devices) whose backing file is
    /// exported as some target's LUN 0.
    fn exported_devices(&self) -> Result<Vec<Exported>> {
        let index = self.build_lun_index()?;
        let devices = self.scst.list_devices()?;

        let mut exported = Vec::new();
        for device in devices.into_iter().filter(|d| !d.contains(':')) {
            let params = match self.scst.device_parameters(&device) {
                Ok(params) => params,
                Err(e) => {
                    partial("device_parameters");
                    warn!(device = %device, error = %e, "Skipping device with unreadable parameters");
                    continue;
                }
            };

            let Some(filename) = params.attr("filename").and_then(Attr::non_empty) else {
                trace!(device = %device, "Device has no backing file");
                continue;
            };

            let rel_id = match index.get(filename) {
                Some(rel_id) => rel_id.clone(),
                None => {
                    trace!(device = %device, filename, "Device not exported as LUN 0");
                    continue;
                }
            };
            exported.push(Exported {
                device,
                rel_id,
                params,
            });
        }
        Ok(exported)
    }

    /// Exported WWN of a device, empty when it cannot be determined.
    fn exported_wwn(&self, device: &str) -> String {
        match self.scst.find_exported_wwn(device) {
            Ok(wwn) => wwn,
            Err(e) => {
                partial("exported_wwn");
                warn!(device, error = %e, "Cannot determine exported WWN");
                String::new()
            }
        }
    }
}

fn partial(kind: &str) {
    metrics::record_partial_result(kind);
}

/// Log the attributes in `wanted` that exist but could not be read. They are
/// reported as empty fields.
fn report_unreadable(device: &str, params: &ParameterSet, wanted: &[&str]) {
    for (name, reason) in params.unavailable().filter(|(name, _)| wanted.contains(name)) {
        partial("device_attribute");
        warn!(device, attribute = name, %reason, "Attribute unreadable, reporting it empty");
    }
}

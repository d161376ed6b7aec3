//! State-changing writes to SCST control files.
//!
//! Each write is one command to the kernel and SCST offers no transactions,
//! so multi-step operations can stop half way. Nothing is rolled back; the
//! error says which steps already took effect.

use std::path::Path;

use tracing::{error, info, instrument, warn};

use super::error::{Result, ScstError};
use super::inventory::Scst;
use super::sysfs;
use super::types::{CreateLunReport, CreateStep, validate_backing_file, validate_name};
use crate::metrics;

/// T10 vendor id set on provisioned devices.
pub const VENDOR_ID: &str = "FREE_TT";

impl Scst {
    /// Activate a device by writing `1` to its `active` attribute.
    #[instrument(skip(self))]
    pub fn activate_device(&self, device: &str) -> Result<()> {
        validate_name(device)?;
        self.control_write(&self.device_dir(device).join("active"), "1", "active")?;
        info!(device, "Device activated");
        Ok(())
    }

    /// Deactivate a device by writing `0` to its `active` attribute.
    #[instrument(skip(self))]
    pub fn deactivate_device(&self, device: &str) -> Result<()> {
        validate_name(device)?;
        self.control_write(&self.device_dir(device).join("active"), "0", "active")?;
        info!(device, "Device deactivated");
        Ok(())
    }

    /// Remove a device from the vdisk_blockio handler.
    #[instrument(skip(self))]
    pub fn delete_device(&self, device: &str) -> Result<()> {
        validate_name(device)?;
        let cmd = format!("del_device {}", device);
        self.control_write(&self.handler_mgmt(), &cmd, "handler_mgmt")?;
        info!(device, "Device deleted");
        Ok(())
    }

    /// Register `filename` as device `device_id` and export it as LUN 0 of the
    /// first target whose WWN contains `device_id`.
    ///
    /// Steps: find the target, `add_device` on the handler, `add <id> 0` on the
    /// target's LUN table, then set the vendor id. A failure in the first three
    /// leaves earlier steps in place and returns [`ScstError::CreateLun`]. The
    /// vendor id is best effort.
    #[instrument(skip(self))]
    pub fn create_lun(&self, device_id: &str, filename: &str) -> Result<CreateLunReport> {
        validate_name(device_id)?;
        validate_backing_file(filename)?;

        let mut completed = Vec::new();
        let fail = |failed: CreateStep, completed: &[CreateStep], source: ScstError| {
            error!(device = device_id, step = %failed, completed = ?completed, error = %source, "LUN creation stopped");
            ScstError::CreateLun {
                device: device_id.to_string(),
                failed,
                completed: completed.to_vec(),
                source: Box::new(source),
            }
        };

        let target = match self.list_iscsi_targets() {
            Ok(targets) => targets.into_iter().find(|t| t.contains(device_id)),
            Err(e) => return Err(fail(CreateStep::FindTarget, &completed, e)),
        };
        let Some(target) = target else {
            return Err(fail(
                CreateStep::FindTarget,
                &completed,
                ScstError::NoTargetForDevice(device_id.to_string()),
            ));
        };
        completed.push(CreateStep::FindTarget);

        let add_device = format!(
            "add_device {} filename={}; nv_cache=1; rotational=0",
            device_id, filename
        );
        if let Err(e) = self.control_write(&self.handler_mgmt(), &add_device, "handler_mgmt") {
            return Err(fail(CreateStep::AddDevice, &completed, e));
        }
        completed.push(CreateStep::AddDevice);
        info!(device = device_id, filename, "Device added");

        let add_lun = format!("add {} 0", device_id);
        if let Err(e) = self.control_write(&self.luns_mgmt(&target), &add_lun, "luns_mgmt") {
            return Err(fail(CreateStep::ExportLun, &completed, e));
        }
        completed.push(CreateStep::ExportLun);
        info!(device = device_id, wwn = %target, "LUN 0 exported");

        let vendor_id = self.device_dir(device_id).join("t10_vend_id");
        let vendor_id_set = match self.control_write(&vendor_id, VENDOR_ID, "t10_vend_id") {
            Ok(()) => {
                completed.push(CreateStep::SetVendorId);
                true
            }
            Err(e) => {
                warn!(device = device_id, error = %e, "Cannot set vendor id");
                false
            }
        };

        Ok(CreateLunReport {
            device: device_id.to_string(),
            filename: filename.to_string(),
            target,
            completed,
            vendor_id_set,
        })
    }

    fn control_write(&self, path: &Path, token: &str, file: &str) -> Result<()> {
        let result = sysfs::write_token(path, token);
        metrics::record_control_write(file, result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const WWN: &str = "iqn.2024-01.com.example:disk1";

    fn fixture() -> (TempDir, Scst) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("handlers/vdisk_blockio")).unwrap();
        fs::write(root.join("handlers/vdisk_blockio/mgmt"), "").unwrap();

        let luns = root.join("targets/iscsi").join(WWN).join("ini_groups/allowed_ini/luns");
        fs::create_dir_all(&luns).unwrap();
        fs::write(luns.join("mgmt"), "").unwrap();

        fs::create_dir_all(root.join("devices/disk1")).unwrap();
        fs::write(root.join("devices/disk1/active"), "0\n").unwrap();
        fs::write(root.join("devices/disk1/t10_vend_id"), "SCST_BIO\n").unwrap();

        let scst = Scst::new(root);
        (dir, scst)
    }

    #[test]
    fn test_activate_then_deactivate() {
        let (_dir, scst) = fixture();

        scst.activate_device("disk1").unwrap();
        assert_eq!(scst.device_parameter("disk1", "active").value(), Some("1"));

        scst.deactivate_device("disk1").unwrap();
        assert_eq!(scst.device_parameter("disk1", "active").value(), Some("0"));
    }

    #[test]
    fn test_activate_missing_device() {
        let (_dir, scst) = fixture();
        assert!(matches!(
            scst.activate_device("disk9"),
            Err(ScstError::Io { .. })
        ));
    }

    #[test]
    fn test_activate_rejects_traversal() {
        let (_dir, scst) = fixture();
        assert!(matches!(
            scst.activate_device("../disk1"),
            Err(ScstError::InvalidName(_))
        ));
    }

    #[test]
    fn test_activate_device_with_punctuated_name() {
        let (dir, scst) = fixture();
        let device = dir.path().join("devices/tank+snap@2024..1");
        fs::create_dir_all(&device).unwrap();
        fs::write(device.join("active"), "0\n").unwrap();

        scst.activate_device("tank+snap@2024..1").unwrap();
        assert_eq!(
            scst.device_parameter("tank+snap@2024..1", "active").value(),
            Some("1")
        );
    }

    #[test]
    fn test_delete_device() {
        let (dir, scst) = fixture();
        scst.delete_device("disk1").unwrap();
        let cmd = fs::read_to_string(dir.path().join("handlers/vdisk_blockio/mgmt")).unwrap();
        assert_eq!(cmd, "del_device disk1");
    }

    #[test]
    fn test_create_lun_all_steps() {
        let (dir, scst) = fixture();
        let report = scst.create_lun("disk1", "/dev/zvol/tank/disk1").unwrap();

        assert_eq!(report.target, WWN);
        assert!(report.vendor_id_set);
        assert_eq!(
            report.completed,
            vec![
                CreateStep::FindTarget,
                CreateStep::AddDevice,
                CreateStep::ExportLun,
                CreateStep::SetVendorId
            ]
        );

        let add_device =
            fs::read_to_string(dir.path().join("handlers/vdisk_blockio/mgmt")).unwrap();
        assert_eq!(
            add_device,
            "add_device disk1 filename=/dev/zvol/tank/disk1; nv_cache=1; rotational=0"
        );
        let add_lun = fs::read_to_string(
            dir.path()
                .join("targets/iscsi")
                .join(WWN)
                .join("ini_groups/allowed_ini/luns/mgmt"),
        )
        .unwrap();
        assert_eq!(add_lun, "add disk1 0");
        assert_eq!(
            scst.device_parameter("disk1", "t10_vend_id").value(),
            Some("FREE_TT")
        );
    }

    #[test]
    fn test_create_lun_no_target() {
        let (_dir, scst) = fixture();
        match scst.create_lun("disk2", "/dev/zvol/tank/disk2") {
            Err(ScstError::CreateLun {
                failed, completed, ..
            }) => {
                assert_eq!(failed, CreateStep::FindTarget);
                assert!(completed.is_empty());
            }
            other => panic!("expected CreateLun error, got {:?}", other),
        }
    }

    #[test]
    fn test_create_lun_vendor_id_best_effort() {
        let (dir, scst) = fixture();
        fs::remove_file(dir.path().join("devices/disk1/t10_vend_id")).unwrap();

        let report = scst.create_lun("disk1", "/dev/zvol/tank/disk1").unwrap();
        assert!(!report.vendor_id_set);
        assert_eq!(report.completed.last(), Some(&CreateStep::ExportLun));
    }

    #[test]
    fn test_create_lun_rejects_bad_filename() {
        let (dir, scst) = fixture();
        assert!(matches!(
            scst.create_lun("disk1", "/dev/a; rotational=1"),
            Err(ScstError::InvalidName(_))
        ));
        let mgmt = fs::read_to_string(dir.path().join("handlers/vdisk_blockio/mgmt")).unwrap();
        assert!(mgmt.is_empty());
    }
}

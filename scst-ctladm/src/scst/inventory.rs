//! Queries against the SCST sysfs tree.
//!
//! SCST keeps devices and iSCSI targets in two separate namespaces:
//!
//! ```text
//! <root>/devices/<device>/{filename,size,active,exported/...}
//! <root>/targets/iscsi/<wwn>/{rel_tgt_id,sessions/,ini_groups/allowed_ini/luns/<n>/device}
//! ```
//!
//! The only links between them are the `luns/<n>/device` symlink on the target
//! side and the `exported/` symlinks on the device side.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument, warn};

use super::error::{Result, ScstError};
use super::sysfs;
use super::types::{Attr, BlockDevice, ExportLink, ParameterSet};

/// SCST sysfs root on current kernels.
pub const SCST_ROOT_NEW: &str = "/sys/devices/scst";
/// SCST sysfs root on older kernels.
pub const SCST_ROOT_OLD: &str = "/sys/kernel/scst_tgt";

const DEVICES_DIR: &str = "devices";
const ISCSI_TARGETS_DIR: &str = "targets/iscsi";
const BLOCKIO_MGMT: &str = "handlers/vdisk_blockio/mgmt";
const LUNS_DIR: &str = "ini_groups/allowed_ini/luns";
const SESSIONS_DIR: &str = "sessions";
const REL_TGT_ID: &str = "rel_tgt_id";

/// Matches the target component of a resolved export link.
static ISCSI_EXPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/targets/iscsi/(?P<target>[^/]+)(?:/|$)").expect("valid export link pattern")
});

/// Handle on one SCST sysfs tree.
#[derive(Debug, Clone)]
pub struct Scst {
    root: PathBuf,
}

impl Scst {
    /// Use the SCST tree at `root` without probing it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate the SCST tree of the running kernel.
    pub fn detect() -> Result<Self> {
        for candidate in [SCST_ROOT_NEW, SCST_ROOT_OLD] {
            if Path::new(candidate).is_dir() {
                debug!(root = candidate, "Found SCST sysfs root");
                return Ok(Self::new(candidate));
            }
        }
        Err(ScstError::RootNotFound(format!(
            "{}, {}",
            SCST_ROOT_NEW, SCST_ROOT_OLD
        )))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ------------------------------------------------------------------------
    // Path conventions
    // ------------------------------------------------------------------------

    pub(crate) fn devices_dir(&self) -> PathBuf {
        self.root.join(DEVICES_DIR)
    }

    pub(crate) fn device_dir(&self, device: &str) -> PathBuf {
        self.devices_dir().join(device)
    }

    pub(crate) fn targets_dir(&self) -> PathBuf {
        self.root.join(ISCSI_TARGETS_DIR)
    }

    pub(crate) fn target_dir(&self, target: &str) -> PathBuf {
        self.targets_dir().join(target)
    }

    pub(crate) fn handler_mgmt(&self) -> PathBuf {
        self.root.join(BLOCKIO_MGMT)
    }

    pub(crate) fn luns_mgmt(&self, target: &str) -> PathBuf {
        self.target_dir(target).join(LUNS_DIR).join("mgmt")
    }

    fn lun_device_link(&self, target: &str, lun: u32) -> PathBuf {
        self.target_dir(target)
            .join(LUNS_DIR)
            .join(lun.to_string())
            .join("device")
    }

    // ------------------------------------------------------------------------
    // Enumeration
    // ------------------------------------------------------------------------

    /// List iSCSI target WWNs.
    ///
    /// Fails when the targets directory is missing, which usually means the
    /// iscsi-scst module is not loaded.
    pub fn list_iscsi_targets(&self) -> Result<Vec<String>> {
        sysfs::list_dir_entries(&self.targets_dir())
    }

    /// List SCST device names.
    pub fn list_devices(&self) -> Result<Vec<String>> {
        sysfs::list_dir_entries(&self.devices_dir())
    }

    // ------------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------------

    pub fn device_parameters(&self, device: &str) -> Result<ParameterSet> {
        sysfs::read_parameter_set(&self.device_dir(device))
    }

    pub fn device_parameter(&self, device: &str, param: &str) -> Attr {
        sysfs::read_single_line(&self.device_dir(device).join(param))
    }

    pub fn target_parameter(&self, target: &str, param: &str) -> Attr {
        sysfs::read_single_line(&self.target_dir(target).join(param))
    }

    /// Relative target id of a target (`rel_tgt_id`).
    pub fn relative_id(&self, target: &str) -> Attr {
        self.target_parameter(target, REL_TGT_ID)
    }

    /// All attributes of the target whose WWN ends in `:<relative_id>`.
    ///
    /// The WWN itself is added under the `wwn` key.
    pub fn target_parameters(&self, relative_id: &str) -> Result<ParameterSet> {
        let wwn = self.find_wwn_by_relative_id(relative_id)?;
        let mut params = sysfs::read_parameter_set(&self.target_dir(&wwn))?;
        params.insert("wwn", Attr::Value(wwn));
        Ok(params)
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// Find the target whose WWN ends in `:<relative_id>`.
    ///
    /// This is a naming convention of the provisioning tooling, not the
    /// `rel_tgt_id` attribute.
    #[instrument(skip(self))]
    pub fn find_wwn_by_relative_id(&self, relative_id: &str) -> Result<String> {
        self.list_iscsi_targets()?
            .into_iter()
            .find(|wwn| wwn.rsplit(':').next() == Some(relative_id))
            .ok_or_else(|| ScstError::TargetNotFound(relative_id.to_string()))
    }

    /// Resolve the device mapped as `lun` of a target.
    ///
    /// Returns `None` when the LUN is not mapped or its device directory has no
    /// readable `filename`. A device with an empty `filename` is returned with
    /// an empty `filename`.
    pub fn lun_device(&self, target: &str, lun: u32) -> Option<BlockDevice> {
        let link = self.lun_device_link(target, lun);
        let device_dir = match fs::canonicalize(&link) {
            Ok(dir) => dir,
            Err(e) => {
                debug!(wwn = target, lun, error = %e, "Cannot resolve LUN device link");
                return None;
            }
        };

        let filename = match sysfs::read_single_line(&device_dir.join("filename")) {
            Attr::Value(filename) => filename,
            Attr::Unavailable(reason) => {
                debug!(wwn = target, lun, device = %device_dir.display(), %reason, "Cannot read LUN device filename");
                return None;
            }
        };

        let name = device_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Some(BlockDevice { name, filename })
    }

    pub fn lun0_device(&self, target: &str) -> Option<BlockDevice> {
        self.lun_device(target, 0)
    }

    /// Classify every entry of a device's `exported/` directory.
    pub fn export_links(&self, device: &str) -> Result<Vec<ExportLink>> {
        let exported = self.device_dir(device).join("exported");
        let entries = sysfs::list_entries(&exported)?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let link = exported.join(&entry);
                match fs::canonicalize(&link) {
                    Ok(resolved) => classify_export(&resolved),
                    Err(e) => {
                        debug!(device, export = %entry, error = %e, "Cannot resolve export link");
                        ExportLink::Other(link)
                    }
                }
            })
            .collect())
    }

    /// WWN of the first iSCSI target exporting `device`.
    #[instrument(skip(self))]
    pub fn find_exported_wwn(&self, device: &str) -> Result<String> {
        let links = self.export_links(device)?;
        let mut iscsi = links.into_iter().filter_map(|link| match link {
            ExportLink::Iscsi { target } => Some(target),
            ExportLink::Other(_) => None,
        });

        let wwn = iscsi
            .next()
            .ok_or_else(|| ScstError::NotIscsiExport(device.to_string()))?;
        let others = iscsi.count();
        if others > 0 {
            warn!(device, wwn = %wwn, others, "Device exported by several iSCSI targets, using the first");
        }
        Ok(wwn)
    }

    /// Initiator sessions of a target, empty when they cannot be listed.
    pub fn list_sessions(&self, target: &str) -> Vec<String> {
        match sysfs::list_dir_entries(&self.target_dir(target).join(SESSIONS_DIR)) {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(wwn = target, error = %e, "Cannot read sessions");
                Vec::new()
            }
        }
    }

    /// Initiator sessions of the target whose WWN ends in `:<relative_id>`.
    pub fn sessions_by_relative_id(&self, relative_id: &str) -> Result<Vec<String>> {
        let wwn = self.find_wwn_by_relative_id(relative_id)?;
        sysfs::list_entries(&self.target_dir(&wwn).join(SESSIONS_DIR))
    }
}

/// Classify a resolved export link by its path shape.
pub fn classify_export(resolved: &Path) -> ExportLink {
    let path = resolved.to_string_lossy();
    match ISCSI_EXPORT_RE.captures(&path) {
        Some(caps) => ExportLink::Iscsi {
            target: caps["target"].to_string(),
        },
        None => ExportLink::Other(resolved.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Minimal tree: one device `disk1` exported as LUN 0 of one target.
    fn fixture() -> (TempDir, Scst) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let wwn = "iqn.2024-01.com.example:1";

        let dev = root.join("devices/disk1");
        write(&dev.join("filename"), "/dev/zvol/tank/disk1\n");
        write(&dev.join("active"), "1\n");

        let tgt = root.join("targets/iscsi").join(wwn);
        write(&tgt.join("rel_tgt_id"), "1\n");
        fs::create_dir_all(tgt.join("sessions/iqn.1991-05.com.microsoft:host1")).unwrap();
        let lun0 = tgt.join("ini_groups/allowed_ini/luns/0");
        fs::create_dir_all(&lun0).unwrap();
        symlink(&dev, lun0.join("device")).unwrap();

        fs::create_dir_all(dev.join("exported")).unwrap();
        symlink(&lun0, dev.join("exported/export0")).unwrap();

        write(&root.join("targets/iscsi/enabled"), "1\n");
        (dir, Scst::new(root))
    }

    #[test]
    fn test_classify_export() {
        let iscsi = classify_export(Path::new(
            "/sys/kernel/scst_tgt/targets/iscsi/iqn.2024-01.com.example:7/ini_groups/allowed_ini/luns/0",
        ));
        assert_eq!(
            iscsi,
            ExportLink::Iscsi {
                target: "iqn.2024-01.com.example:7".to_string()
            }
        );

        let other = classify_export(Path::new(
            "/sys/kernel/scst_tgt/targets/qla2x00t/21:00:00:24:ff:00:00:01/luns/0",
        ));
        assert!(matches!(other, ExportLink::Other(_)));
    }

    #[test]
    fn test_classify_export_independent_of_depth() {
        let link = classify_export(Path::new("/tmp/x/y/z/targets/iscsi/iqn.a:2/luns/0"));
        assert_eq!(
            link,
            ExportLink::Iscsi {
                target: "iqn.a:2".to_string()
            }
        );
    }

    #[test]
    fn test_list_targets_skips_files() {
        let (_dir, scst) = fixture();
        assert_eq!(
            scst.list_iscsi_targets().unwrap(),
            vec!["iqn.2024-01.com.example:1".to_string()]
        );
    }

    #[test]
    fn test_list_targets_missing_root() {
        let dir = TempDir::new().unwrap();
        let scst = Scst::new(dir.path());
        assert!(matches!(
            scst.list_iscsi_targets(),
            Err(ScstError::Io { .. })
        ));
    }

    #[test]
    fn test_lun0_device() {
        let (_dir, scst) = fixture();
        let device = scst.lun0_device("iqn.2024-01.com.example:1").unwrap();
        assert_eq!(device.name, "disk1");
        assert_eq!(device.filename, "/dev/zvol/tank/disk1");

        assert!(scst.lun_device("iqn.2024-01.com.example:1", 1).is_none());
        assert!(scst.lun0_device("iqn.2024-01.com.example:9").is_none());
    }

    #[test]
    fn test_find_wwn_by_relative_id() {
        let (_dir, scst) = fixture();
        assert_eq!(
            scst.find_wwn_by_relative_id("1").unwrap(),
            "iqn.2024-01.com.example:1"
        );
        assert!(matches!(
            scst.find_wwn_by_relative_id("9"),
            Err(ScstError::TargetNotFound(id)) if id == "9"
        ));
    }

    #[test]
    fn test_find_exported_wwn() {
        let (_dir, scst) = fixture();
        assert_eq!(
            scst.find_exported_wwn("disk1").unwrap(),
            "iqn.2024-01.com.example:1"
        );
    }

    #[test]
    fn test_find_exported_wwn_not_exported() {
        let (_dir, scst) = fixture();
        fs::remove_file(scst.device_dir("disk1").join("exported/export0")).unwrap();
        assert!(matches!(
            scst.find_exported_wwn("disk1"),
            Err(ScstError::NotIscsiExport(_))
        ));
    }

    #[test]
    fn test_target_parameters_include_wwn() {
        let (_dir, scst) = fixture();
        let params = scst.target_parameters("1").unwrap();
        assert_eq!(params.value("wwn"), "iqn.2024-01.com.example:1");
        assert_eq!(params.value("rel_tgt_id"), "1");
    }

    #[test]
    fn test_sessions() {
        let (_dir, scst) = fixture();
        let sessions = scst.list_sessions("iqn.2024-01.com.example:1");
        assert_eq!(sessions, vec!["iqn.1991-05.com.microsoft:host1".to_string()]);
        assert!(scst.list_sessions("iqn.2024-01.com.example:9").is_empty());
        assert_eq!(scst.sessions_by_relative_id("1").unwrap(), sessions);
    }

    #[test]
    fn test_device_parameter() {
        let (_dir, scst) = fixture();
        assert_eq!(scst.device_parameter("disk1", "active").value(), Some("1"));
        assert!(!scst.device_parameter("disk1", "usn").is_available());
    }
}

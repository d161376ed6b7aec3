pub mod error;
pub mod inventory;
pub mod mgmt;
pub mod sysfs;
pub mod types;

pub use error::{Result, ScstError};
pub use inventory::{SCST_ROOT_NEW, SCST_ROOT_OLD, Scst};
pub use types::{Attr, BlockDevice, CreateLunReport, CreateStep, ExportLink, ParameterSet};

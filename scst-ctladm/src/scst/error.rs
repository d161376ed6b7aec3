use std::path::PathBuf;

use thiserror::Error;

use super::types::CreateStep;

#[derive(Error, Debug)]
pub enum ScstError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SCST sysfs root not found (tried {0})")]
    RootNotFound(String),

    #[error("target with id {0} not found")]
    TargetNotFound(String),

    #[error("LUN {0} not found")]
    LunNotFound(String),

    #[error("no iSCSI target matches device '{0}'")]
    NoTargetForDevice(String),

    #[error("device '{0}' is not exported via iSCSI")]
    NotIscsiExport(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("creating LUN for '{device}' failed at step {failed} (completed: {}): {source}", format_steps(completed))]
    CreateLun {
        device: String,
        failed: CreateStep,
        completed: Vec<CreateStep>,
        #[source]
        source: Box<ScstError>,
    },
}

impl ScstError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScstError::Io {
            path: path.into(),
            source,
        }
    }
}

fn format_steps(steps: &[CreateStep]) -> String {
    if steps.is_empty() {
        return "none".to_string();
    }
    steps
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, ScstError>;

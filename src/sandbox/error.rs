use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Errors from running one generated diagram script.
///
/// All of these are recovered by the pipeline and turned into a
/// placeholder block; none of them abort a document.
#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("script failed: code={code:?}, stderr={stderr}")]
    Crashed { code: Option<i32>, stderr: String },

    #[error("no artifact at {}: stderr={stderr}", path.display())]
    MissingArtifact { path: PathBuf, stderr: String },

    #[error("execution environment unavailable: {0}")]
    Environment(String),

    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl ExecutionError {
    /// Short stable label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::Timeout(_) => "timeout",
            ExecutionError::Crashed { .. } => "crashed",
            ExecutionError::MissingArtifact { .. } => "missing_artifact",
            ExecutionError::Environment(_) => "environment",
            ExecutionError::Io(_) => "io",
        }
    }

    /// Captured stderr of the script, when the script got far enough to run.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ExecutionError::Crashed { stderr, .. }
            | ExecutionError::MissingArtifact { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

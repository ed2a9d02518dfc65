use std::path::PathBuf;

/// One diagram script ready to run.
///
/// Owned by a single execution attempt; `id` is already restricted to
/// `[A-Za-z0-9_]` so it can be used in file names.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub id: String,
    pub source: String,
    pub artifact_path: PathBuf,
}

/// A successfully rendered diagram.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub script_path: PathBuf,
    pub started_at_unix_ms: i64,
    pub finished_at_unix_ms: i64,
}

impl Artifact {
    pub fn elapsed_ms(&self) -> i64 {
        self.finished_at_unix_ms - self.started_at_unix_ms
    }
}

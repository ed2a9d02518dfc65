use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const FILE_PREFIX: &str = "diag_";

/// Working directory for generated scripts and their rendered images.
///
/// Layout per execution id: `diag_{id}.py` holds the script and
/// `diag_img_{id}.png` the image it is expected to write. Nothing here is
/// removed automatically; `prune` is the only deletion path.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneReport {
    pub removed: usize,
    pub kept: usize,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    pub fn script_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{FILE_PREFIX}{id}.py"))
    }

    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{FILE_PREFIX}img_{id}.png"))
    }

    /// Delete scripts and images last modified at or before `now - older_than`.
    ///
    /// Files not following the `diag_` naming are never touched. A missing
    /// directory prunes nothing.
    pub fn prune(&self, older_than: Duration) -> io::Result<PruneReport> {
        let mut report = PruneReport::default();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e),
        };

        let cutoff = SystemTime::now()
            .checked_sub(older_than)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let is_ours = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX));
            let metadata = entry.metadata()?;
            if !is_ours || !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified()?;
            if modified <= cutoff {
                std::fs::remove_file(&path)?;
                tracing::debug!(path = %path.display(), "Pruned stale diagram file");
                report.removed += 1;
            } else {
                report.kept += 1;
            }
        }

        Ok(report)
    }
}

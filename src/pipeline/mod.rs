pub mod sanitize;
pub mod segments;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::inference::{InferenceClient, InferenceError};
use crate::sandbox::{CodeRunner, ExecutionRequest, WorkDir};

use sanitize::sanitize;
use segments::{Markers, Segment, split_segments};

/// Reason attached to placeholders for diagrams that could not be rendered.
pub const GENERATION_FAILED: &str = "generation failed";

/// Output unit handed to the document sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text(String),
    Image(PathBuf),
    Placeholder(String),
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("inference unavailable for {image}: {source}")]
    InferenceUnavailable {
        image: String,
        #[source]
        source: InferenceError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Fetching,
    Parsing,
    Executing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetching => "fetching",
            Stage::Parsing => "parsing",
            Stage::Executing => "executing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// File-name-safe execution id: `{image_name}_{position}` restricted to
/// ASCII alphanumerics and `_`.
pub fn execution_id(image_name: &str, position: usize) -> String {
    format!("{image_name}_{position}")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

fn display_name(image: &Path) -> String {
    image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| image.display().to_string())
}

/// Drives one image through transcription, segmentation and diagram
/// rendering.
///
/// Segments are handled strictly in order and a failed diagram only ever
/// costs its own block: every code segment yields exactly one `Image` or
/// `Placeholder`. Only an unusable transcription fails the image.
///
/// Execution ids are unique for the lifetime of a `Pipeline`: two images
/// whose names sanitize to the same id get a numeric suffix instead of
/// overwriting each other's diagrams.
pub struct Pipeline {
    inference: Arc<dyn InferenceClient>,
    runner: Arc<dyn CodeRunner>,
    work_dir: WorkDir,
    exec_timeout: Duration,
    issued_ids: Mutex<HashSet<String>>,
}

impl Pipeline {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        runner: Arc<dyn CodeRunner>,
        work_dir: WorkDir,
        exec_timeout: Duration,
    ) -> Self {
        Self {
            inference,
            runner,
            work_dir,
            exec_timeout,
            issued_ids: Mutex::new(HashSet::new()),
        }
    }

    fn reserve_id(&self, base: String) -> String {
        let mut issued = self.issued_ids.lock().unwrap_or_else(|e| e.into_inner());
        if issued.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if issued.insert(candidate.clone()) {
                tracing::debug!(base = %base, id = %candidate, "Execution id collision, using suffix");
                return candidate;
            }
            n += 1;
        }
    }

    pub async fn process_image(&self, image: &Path) -> Result<Vec<ContentBlock>, PipelineError> {
        let image_name = display_name(image);
        tracing::info!(image = %image_name, stage = %Stage::Fetching, "Processing image");

        let response = match self.inference.transcribe(image).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(
                    image = %image_name,
                    stage = %Stage::Failed,
                    error = %e,
                    "Transcription failed"
                );
                return Err(PipelineError::InferenceUnavailable {
                    image: image_name,
                    source: e,
                });
            }
        };

        tracing::debug!(image = %image_name, stage = %Stage::Parsing, len = response.len());
        let segments = split_segments(&response, Markers::DIAGRAM);

        let mut blocks = Vec::with_capacity(segments.len());
        for (position, segment) in segments.into_iter().enumerate() {
            let block = match segment {
                Segment::Prose(text) => ContentBlock::Text(text),
                Segment::CodeBlock(code) => self.render_diagram(&image_name, position, &code).await,
            };
            blocks.push(block);
        }

        tracing::info!(
            image = %image_name,
            stage = %Stage::Done,
            blocks = blocks.len(),
            "Image processed"
        );
        Ok(blocks)
    }

    async fn render_diagram(&self, image_name: &str, position: usize, code: &str) -> ContentBlock {
        let id = self.reserve_id(execution_id(image_name, position));
        let artifact_path = self.work_dir.artifact_path(&id);
        let request = ExecutionRequest {
            source: sanitize(code, &artifact_path),
            id,
            artifact_path,
        };

        tracing::debug!(id = %request.id, stage = %Stage::Executing);
        match self.runner.run(&request, self.exec_timeout).await {
            Ok(artifact) => {
                tracing::info!(
                    id = %request.id,
                    path = %artifact.path.display(),
                    script = %artifact.script_path.display(),
                    elapsed_ms = artifact.elapsed_ms(),
                    "Diagram generated"
                );
                ContentBlock::Image(artifact.path)
            }
            Err(e) => {
                tracing::error!(
                    id = %request.id,
                    kind = e.kind(),
                    script = %self.work_dir.script_path(&request.id).display(),
                    stderr = e.stderr().unwrap_or_default(),
                    error = %e,
                    "Diagram generation failed"
                );
                ContentBlock::Placeholder(GENERATION_FAILED.to_string())
            }
        }
    }
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::document::{Document, Sink};
use crate::pipeline::Pipeline;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub converted: usize,
    pub failed: usize,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn name_matches(path: &Path, name_filter: Option<&str>) -> bool {
    match name_filter {
        None => true,
        Some(filter) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains(filter)),
    }
}

/// Expand inputs into the list of images to convert.
///
/// Files are taken as given. Directories contribute their `.jpg`, `.jpeg`
/// and `.png` entries (non-recursive), sorted by file name.
pub fn collect_inputs(inputs: &[PathBuf], name_filter: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let entries = std::fs::read_dir(input)
                .with_context(|| format!("failed to read input dir: {}", input.display()))?;
            let mut found = Vec::new();
            for entry in entries {
                let path = entry?.path();
                if path.is_file() && is_image(&path) && name_matches(&path, name_filter) {
                    found.push(path);
                }
            }
            found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
            images.extend(found);
        } else if input.is_file() {
            if name_matches(input, name_filter) {
                images.push(input.clone());
            }
        } else {
            anyhow::bail!("input does not exist: {}", input.display());
        }
    }
    Ok(images)
}

/// Convert every image in order, saving the document after each success.
///
/// An image whose transcription fails is logged and skipped; the rest of
/// the batch carries on.
pub async fn run_batch(
    pipeline: &Pipeline,
    images: &[PathBuf],
    document: &mut Document,
    sink: &dyn Sink,
) -> Result<BatchReport> {
    let mut report = BatchReport::default();

    for image in images {
        match pipeline.process_image(image).await {
            Ok(blocks) => {
                let name = image
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| image.display().to_string());
                document.push_section(&name, blocks);
                sink.deliver(document)
                    .await
                    .context("failed to save document")?;
                report.converted += 1;
            }
            Err(e) => {
                tracing::warn!(image = %image.display(), error = %e, "Skipping image");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        converted = report.converted,
        failed = report.failed,
        "Batch finished"
    );
    Ok(report)
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{Document, Sink};
use crate::pipeline::ContentBlock;
use crate::pipeline::sanitize::portable_path;

/// 5 inches at 96 dpi.
pub const DEFAULT_IMAGE_WIDTH_PX: u32 = 480;
pub const PAGE_BREAK: &str = r#"<div style="page-break-after: always"></div>"#;
pub const MISSING_IMAGE_TEXT: &str = "[Diagram Generation Failed - See Logs]";

/// Writes the document as a single Markdown file, overwriting it each time.
pub struct MarkdownSink {
    path: PathBuf,
    image_width_px: u32,
}

impl MarkdownSink {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            image_width_px: DEFAULT_IMAGE_WIDTH_PX,
        }
    }

    pub fn with_image_width(mut self, image_width_px: u32) -> Self {
        self.image_width_px = image_width_px;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn image_src(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    portable_path(&absolute)
}

fn render_block(block: &ContentBlock, image_width_px: u32, out: &mut String) {
    match block {
        ContentBlock::Text(text) => out.push_str(text),
        ContentBlock::Image(path) => {
            if path.is_file() {
                out.push_str(&format!(
                    r#"<img src="{}" width="{image_width_px}">"#,
                    image_src(path)
                ));
            } else {
                tracing::error!(path = %path.display(), "Could not embed diagram, file is gone");
                out.push_str(MISSING_IMAGE_TEXT);
            }
        }
        ContentBlock::Placeholder(reason) => {
            out.push_str(&format!("[Diagram Generation Failed: {reason}]"));
        }
    }
    out.push_str("\n\n");
}

pub fn render(document: &Document, image_width_px: u32) -> String {
    let mut out = String::new();
    if let Some(title) = &document.title {
        out.push_str(&format!("# {title}\n\n"));
    }

    for section in document.sections() {
        out.push_str(&format!("## {}\n\n", section.title));
        for block in &section.blocks {
            render_block(block, image_width_px, &mut out);
        }
        out.push_str(PAGE_BREAK);
        out.push_str("\n\n");
    }

    out
}

#[async_trait]
impl Sink for MarkdownSink {
    async fn deliver(&self, document: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create output dir: {}", parent.display()))?;
        }

        let content = render(document, self.image_width_px);
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("failed to write document: {}", self.path.display()))?;

        tracing::debug!(
            path = %self.path.display(),
            sections = document.sections().len(),
            "Document saved"
        );
        Ok(())
    }
}

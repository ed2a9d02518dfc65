pub mod markdown;

use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::ContentBlock;

pub use markdown::MarkdownSink;

#[derive(Debug, Clone)]
pub struct Section {
    pub title: String,
    pub blocks: Vec<ContentBlock>,
}

/// Output accumulator. Sections are only ever appended, one per
/// successfully processed image, in processing order.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub title: Option<String>,
    sections: Vec<Section>,
}

impl Document {
    pub fn new(title: Option<String>) -> Self {
        Self {
            title,
            sections: Vec::new(),
        }
    }

    pub fn push_section(&mut self, source_name: &str, blocks: Vec<ContentBlock>) {
        self.sections.push(Section {
            title: format!("Source: {source_name}"),
            blocks,
        });
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }
}

#[async_trait]
pub trait Sink: Send + Sync {
    async fn deliver(&self, document: &Document) -> Result<()>;
}

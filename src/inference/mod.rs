pub mod gemini;
pub mod retry;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use gemini::GeminiClient;

/// Instruction sent alongside every image.
///
/// Generated code is asked to write `generated_diagram.png`; the sanitizer
/// rewrites that name to the real artifact path before execution.
pub const TRANSCRIPTION_PROMPT: &str = r#"
You are an expert OCR and technical diagram transcription system.

TASK:
1. Transcribe all text from the image accurately.
2. If you see any diagrams, charts, graphs, or technical illustrations:
   - DO NOT describe them in text.
   - Instead, write a Python script using `matplotlib` to RECREATE that diagram exactly.
   - Place the Python code inside these specific tags: [[DIAGRAM_CODE_START]] ... [[DIAGRAM_CODE_END]]
   - The Python code MUST save the figure to a file named 'generated_diagram.png' and close the plot.
   - Example code structure:
     ```python
     import matplotlib.pyplot as plt
     fig, ax = plt.subplots()
     # ... drawing commands ...
     plt.savefig('generated_diagram.png')
     plt.close()
     ```
   - Use ONLY `matplotlib` and `numpy`.

FORMATTING:
- Output the text normally.
- Insert the diagram code blocks in the natural flow where the diagrams appear in the document.
"#;

#[derive(thiserror::Error, Debug)]
pub enum InferenceError {
    #[error("failed to read image {}: {source}", path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("model overloaded after {attempts} attempts")]
    Overloaded { attempts: u32 },

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("no candidates returned")]
    EmptyResponse,

    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Remote multimodal model that turns one image into prose interleaved
/// with marker-delimited diagram scripts.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn transcribe(&self, image: &Path) -> Result<String, InferenceError>;
}

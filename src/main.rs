mod batch;
mod config;
mod document;
mod inference;
mod pipeline;
mod sandbox;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser};
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;
use crate::document::{Document, MarkdownSink};
use crate::inference::GeminiClient;
use crate::pipeline::Pipeline;
use crate::sandbox::{SubprocessRunner, WorkDir};

#[derive(Parser)]
#[command(
    name = "sketchdoc",
    about = "Transcribe note images into a document, redrawing diagrams as plots"
)]
enum Cli {
    /// Convert images (or directories of images) into one document
    Convert(ConvertArgs),
    /// Delete old generated scripts and diagrams from the working directory
    Prune {
        #[arg(long)]
        older_than_hours: u64,
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ConvertArgs {
    /// Image files or directories containing .jpg/.jpeg/.png files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    #[arg(short, long, default_value = "Converted_Smart_Output.md")]
    output: PathBuf,
    #[arg(long)]
    work_dir: Option<PathBuf>,
    /// Interpreter used to run generated diagram scripts
    #[arg(long)]
    interpreter: Option<PathBuf>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long)]
    model: Option<String>,
    /// Only convert files whose name contains this substring
    #[arg(long)]
    name_filter: Option<String>,
    /// Prune working-directory files older than this many hours before converting
    #[arg(long)]
    retain_hours: Option<u64>,
    /// Display width of embedded diagrams, in pixels
    #[arg(long, default_value_t = document::markdown::DEFAULT_IMAGE_WIDTH_PX)]
    image_width: u32,
}

fn hours(h: u64) -> Duration {
    Duration::from_secs(h.saturating_mul(3600))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sketchdoc=info,reqwest=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_tree::HierarchicalLayer::new(2).with_targets(true).with_bracketed_fields(false))
        .with(sentry::integrations::tracing::layer().event_filter(
            |metadata| match *metadata.level() {
                tracing::Level::ERROR => sentry::integrations::tracing::EventFilter::Event,
                tracing::Level::WARN | tracing::Level::INFO => {
                    sentry::integrations::tracing::EventFilter::Breadcrumb
                }
                _ => sentry::integrations::tracing::EventFilter::Ignore,
            },
        ))
        .init();

    let _guard = sentry::init((
        config.sentry_dsn.clone().unwrap_or_default(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(config.environment.clone().into()),
            enable_logs: true,
            ..Default::default()
        },
    ));

    match cli {
        Cli::Convert(args) => convert(config, args).await?,
        Cli::Prune {
            older_than_hours,
            work_dir,
        } => {
            let work_dir = WorkDir::new(work_dir.unwrap_or(config.work_dir));
            let report = work_dir
                .prune(hours(older_than_hours))
                .with_context(|| format!("failed to prune {}", work_dir.root().display()))?;
            tracing::info!(removed = report.removed, kept = report.kept, "Prune complete");
        }
    }

    Ok(())
}

async fn convert(mut config: Config, args: ConvertArgs) -> Result<()> {
    if let Some(dir) = args.work_dir {
        config.work_dir = dir;
    }
    if let Some(interpreter) = args.interpreter {
        config.interpreter = interpreter;
    }
    if let Some(secs) = args.timeout_secs.filter(|s| *s > 0) {
        config.exec_timeout = Duration::from_secs(secs);
    }
    if let Some(model) = args.model {
        config.model = model;
    }

    let api_key = config
        .api_key
        .clone()
        .context("GEMINI_API_KEY is not set")?;

    let images = batch::collect_inputs(&args.inputs, args.name_filter.as_deref())?;
    if images.is_empty() {
        anyhow::bail!("no images found in the given inputs");
    }

    let work_dir = WorkDir::new(config.work_dir.clone());
    if let Some(h) = args.retain_hours {
        let report = work_dir
            .prune(hours(h))
            .with_context(|| format!("failed to prune {}", work_dir.root().display()))?;
        tracing::info!(removed = report.removed, kept = report.kept, "Pruned working directory");
    }

    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;

    let inference = GeminiClient::new(http_client, config.api_base.clone(), config.model.clone(), api_key);
    let runner = SubprocessRunner::new(config.interpreter.clone(), work_dir.clone());
    let pipeline = Pipeline::new(
        Arc::new(inference),
        Arc::new(runner),
        work_dir,
        config.exec_timeout,
    );

    let sink = MarkdownSink::new(args.output.clone()).with_image_width(args.image_width);
    let mut document = Document::new(Some("Converted notes".to_string()));

    tracing::info!(
        images = images.len(),
        model = %config.model,
        output = %args.output.display(),
        "Starting conversion"
    );
    let report = batch::run_batch(&pipeline, &images, &mut document, &sink).await?;

    if report.converted == 0 {
        anyhow::bail!("all {} image(s) failed to convert", report.failed);
    }
    tracing::info!(output = %sink.path().display(), "Done");
    Ok(())
}

//! Template OCR command line
//!
//! Runs template field extraction or full-page OCR against local files and
//! prints the results as JSON.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use template_ocr::extract::{DocumentExtraction, ExtractionSummary};
use template_ocr::{Config, ExtractionOptions, OcrService, TemplateExtractor, TemplateField};

#[derive(Parser)]
#[command(name = "template-ocr", version, about = "Template field extraction and OCR structuring")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract template fields from an image or PDF
    Extract(ExtractArgs),
    /// OCR a whole image and print its structure
    Ocr(OcrArgs),
}

#[derive(Args)]
struct ExtractArgs {
    /// JSON array of template fields
    #[arg(short, long)]
    template: PathBuf,

    /// Tesseract language code(s), e.g. "eng" or "eng+deu"
    #[arg(short, long)]
    language: Option<String>,

    /// Use mild preprocessing instead of binarization
    #[arg(long)]
    mild: bool,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Image or PDF to extract from
    document: PathBuf,
}

#[derive(Args)]
struct OcrArgs {
    #[arg(short, long)]
    language: Option<String>,

    /// Send the image to the engine unchanged
    #[arg(long)]
    no_preprocess: bool,

    /// Download the image from this URL
    #[arg(long, conflicts_with = "image")]
    url: Option<String>,

    #[arg(required_unless_present = "url")]
    image: Option<PathBuf>,
}

#[derive(Serialize)]
struct ExtractOutput<'a> {
    #[serde(flatten)]
    extraction: &'a DocumentExtraction,
    summary: ExtractionSummary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "template_ocr=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing::info!("Starting template-ocr v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("OCR engine: {}", config.engine);

    let service = OcrService::from_config(&config);
    service.ensure_available().await?;

    match cli.command {
        Command::Extract(args) => run_extract(&config, &service, args).await,
        Command::Ocr(args) => run_ocr(&service, args).await,
    }
}

async fn run_extract(config: &Config, service: &OcrService, args: ExtractArgs) -> anyhow::Result<()> {
    let template = tokio::fs::read(&args.template)
        .await
        .with_context(|| format!("Failed to read template {}", args.template.display()))?;
    let fields: Vec<TemplateField> =
        serde_json::from_slice(&template).context("Template must be a JSON array of fields")?;
    let document = tokio::fs::read(&args.document)
        .await
        .with_context(|| format!("Failed to read document {}", args.document.display()))?;

    let mut options = ExtractionOptions::from(config);
    if let Some(language) = args.language {
        options.language = language;
    }
    if args.mild {
        options.aggressive = false;
    }
    if let Some(secs) = args.timeout {
        options.timeout = Some(Duration::from_secs(secs));
    }

    tracing::info!("Extracting {} fields from {}", fields.len(), args.document.display());

    let extraction = TemplateExtractor::from_service(service, config)
        .extract_document(document, &fields, &options)
        .await?;

    let output = ExtractOutput {
        summary: extraction.summary(),
        extraction: &extraction,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_ocr(service: &OcrService, args: OcrArgs) -> anyhow::Result<()> {
    let preprocess = !args.no_preprocess;
    let language = args.language.as_deref();

    let result = match (args.url, args.image) {
        (Some(url), _) => service.process_url(&url, language, preprocess).await?,
        (None, Some(path)) => {
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read image {}", path.display()))?;
            service.process_image(&data, language, preprocess).await?
        }
        (None, None) => anyhow::bail!("Either an image path or --url is required"),
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

//! One-shot extraction of a local PDF or DOCX.
//!
//! Runs the same pipeline as the HTTP service (the file is treated as an upload) and prints
//! the response JSON to stdout. No API key or server configuration is needed.
use anyhow::{Context, Result, bail};
use clap::Parser;
use docsift::{
    config::{DEFAULT_MAX_PAYLOAD_BYTES, default_expansion_limit},
    logging,
    processing::{
        DocumentSource, PipelineSettings, ProcessOptions, ProcessRequest, ProcessingService,
    },
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "docsift-extract",
    version,
    about = "Extract text, counts, and images from a local PDF or DOCX"
)]
struct Cli {
    /// Document to process.
    path: PathBuf,
    /// Format override (`pdf` or `docx`); inferred from the extension otherwise.
    #[arg(long)]
    format: Option<String>,
    /// Also emit `reduced_text` built from the longer sentences.
    #[arg(long)]
    reduce_tokens: bool,
    /// Skip image extraction.
    #[arg(long)]
    no_images: bool,
    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
    /// Payload size ceiling in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD_BYTES)]
    max_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_cli_tracing();
    let cli = Cli::parse();

    if !cli.path.is_file() {
        bail!("{} is not a file", cli.path.display());
    }
    let bytes = tokio::fs::read(&cli.path)
        .await
        .with_context(|| format!("failed to read {}", cli.path.display()))?;

    let settings = PipelineSettings {
        max_payload_bytes: cli.max_bytes,
        max_expanded_bytes: default_expansion_limit(cli.max_bytes),
        ..PipelineSettings::default()
    };
    let service =
        ProcessingService::with_settings(settings).context("failed to build processing service")?;

    let request = ProcessRequest {
        source: DocumentSource::Upload {
            filename: cli
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            bytes,
        },
        format_hint: cli.format,
        options: ProcessOptions {
            reduce_tokens: cli.reduce_tokens,
            include_images: !cli.no_images,
        },
    };
    let outcome = service
        .process(request)
        .await
        .with_context(|| format!("failed to process {}", cli.path.display()))?;

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&outcome)
    } else {
        serde_json::to_string(&outcome)
    }
    .context("failed to serialize outcome")?;
    println!("{rendered}");
    Ok(())
}

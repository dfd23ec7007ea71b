//! PDF Transform - Entry point
//!
//! Runs one transformation over one document, writes the artifact to disk and
//! prints a JSON summary on stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};
use pdf_transform::{
    ConfigError, OperationParams, OperationRequest, Pipeline, PipelineConfig,
    TransformationResult, UploadedDocument,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit status for startup/configuration problems
const EXIT_CONFIG: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "pdf-transform", version, about = "Transform a single PDF document")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Where to write the artifact (default: suggested filename in the current directory)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Root directory for per-request scratch files
    #[arg(long, env = "PDF_TRANSFORM_TEMP_DIR", global = true)]
    temp_dir: Option<PathBuf>,

    /// Ghostscript program
    #[arg(long, env = "PDF_TRANSFORM_GS", global = true)]
    gs: Option<PathBuf>,

    /// Poppler pdftoppm program
    #[arg(long, env = "PDF_TRANSFORM_PDFTOPPM", global = true)]
    pdftoppm: Option<PathBuf>,

    /// Rasterization engine: poppler or ghostscript
    #[arg(long, env = "PDF_TRANSFORM_RASTER_ENGINE", global = true)]
    raster_engine: Option<String>,

    /// Seconds an engine may run before it is killed
    #[arg(long, env = "PDF_TRANSFORM_ENGINE_TIMEOUT_SECS", global = true)]
    engine_timeout_secs: Option<u64>,

    /// Highest accepted rasterization resolution
    #[arg(long, env = "PDF_TRANSFORM_MAX_DPI", global = true)]
    max_dpi: Option<u32>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report whether the document requires a password
    CheckLock { input: PathBuf },
    /// Encrypt the document with a password
    Protect {
        input: PathBuf,
        #[arg(long)]
        password: String,
    },
    /// Replace the password of a protected document
    ResetPassword {
        input: PathBuf,
        #[arg(long)]
        old_password: String,
        #[arg(long)]
        new_password: String,
    },
    /// Compress the document with Ghostscript
    Compress {
        input: PathBuf,
        /// extreme, recommended or low
        #[arg(long)]
        mode: Option<String>,
    },
    /// Extract a page range such as 3-5
    Split {
        input: PathBuf,
        #[arg(long)]
        range: String,
    },
    /// Render every page to PNG and package them as a ZIP
    Rasterize {
        input: PathBuf,
        #[arg(long)]
        dpi: Option<u32>,
    },
}

impl Command {
    fn into_parts(self) -> (PathBuf, OperationParams) {
        match self {
            Command::CheckLock { input } => (input, OperationParams::CheckLock),
            Command::Protect { input, password } => (
                input,
                OperationParams::Protect {
                    password: Some(password),
                },
            ),
            Command::ResetPassword {
                input,
                old_password,
                new_password,
            } => (
                input,
                OperationParams::ResetPassword {
                    old_password: Some(old_password),
                    new_password: Some(new_password),
                },
            ),
            Command::Compress { input, mode } => (input, OperationParams::Compress { mode }),
            Command::Split { input, range } => (
                input,
                OperationParams::SplitRange { range: Some(range) },
            ),
            Command::Rasterize { input, dpi } => (input, OperationParams::Rasterize { dpi }),
        }
    }
}

impl Cli {
    fn build_config(&self) -> Result<PipelineConfig, ConfigError> {
        let mut config = PipelineConfig::default();
        if let Some(dir) = &self.temp_dir {
            config.temp_root = dir.clone();
        }
        if let Some(gs) = &self.gs {
            config.engines.ghostscript = gs.clone();
        }
        if let Some(pdftoppm) = &self.pdftoppm {
            config.engines.pdftoppm = pdftoppm.clone();
        }
        if let Some(engine) = &self.raster_engine {
            config.engines.raster_engine = engine.parse()?;
        }
        if let Some(secs) = self.engine_timeout_secs {
            config.engines.timeout = Duration::from_secs(secs);
        }
        if let Some(max_dpi) = self.max_dpi {
            config.max_dpi = max_dpi;
        }
        Ok(config)
    }
}

/// Resolve only what the requested operation needs
fn prepare(config: &mut PipelineConfig, params: &OperationParams) -> Result<(), ConfigError> {
    match params {
        OperationParams::Compress { .. } => {
            config.check_temp_root()?;
            config.check_compression_engine()
        }
        OperationParams::Rasterize { .. } => {
            config.check_temp_root()?;
            config.check_raster_engine()
        }
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_transform=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match cli.build_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };

    let output = cli.output;
    let (input, params) = cli.command.into_parts();

    if let Err(e) = prepare(&mut config, &params) {
        tracing::error!(error = %e, "Engine setup failed");
        return Ok(ExitCode::from(EXIT_CONFIG));
    }

    let data = tokio::fs::read(&input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let pipeline = Pipeline::with_config(config);
    let request = OperationRequest::new(UploadedDocument::new(filename, data), params);

    match pipeline.run(request).await {
        TransformationResult::Artifact(artifact) => {
            let path = output.unwrap_or_else(|| PathBuf::from(&artifact.suggested_filename));
            tokio::fs::write(&path, &artifact.bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;

            let summary = serde_json::json!({
                "status": "ok",
                "output": path.display().to_string(),
                "suggested_filename": artifact.suggested_filename,
                "mime_type": artifact.mime_type,
                "metadata": artifact.metadata,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(ExitCode::SUCCESS)
        }
        TransformationResult::Failure(failure) => {
            let summary = serde_json::json!({
                "status": "failed",
                "failure": failure,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(ExitCode::FAILURE)
        }
    }
}

//! Ghostscript-based PDF compression

use super::process::{run_engine, EngineCommand};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Caller-facing compression modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    /// Smallest output
    Extreme,
    /// Balanced size/quality
    #[default]
    Recommended,
    /// Highest fidelity
    Low,
}

impl CompressionMode {
    /// Parse a mode name. Unknown names fall back to `Recommended` rather
    /// than failing.
    pub fn parse_lenient(mode: &str) -> Self {
        match mode.trim().to_ascii_lowercase().as_str() {
            "extreme" => CompressionMode::Extreme,
            "recommended" => CompressionMode::Recommended,
            "low" => CompressionMode::Low,
            other => {
                tracing::warn!(mode = other, "Unknown compression mode, using recommended");
                CompressionMode::Recommended
            }
        }
    }

    /// Ghostscript `-dPDFSETTINGS` preset
    pub fn preset(self) -> &'static str {
        match self {
            CompressionMode::Extreme => "/screen",
            CompressionMode::Recommended => "/ebook",
            CompressionMode::Low => "/printer",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompressionMode::Extreme => "extreme",
            CompressionMode::Recommended => "recommended",
            CompressionMode::Low => "low",
        }
    }
}

/// Build the Ghostscript argument list. Flags keep it batch-only and silent.
pub fn compression_args(input: &Path, output: &Path, mode: CompressionMode) -> Vec<OsString> {
    let mut output_arg = OsString::from("-sOutputFile=");
    output_arg.push(output.as_os_str());

    vec![
        "-sDEVICE=pdfwrite".into(),
        "-dCompatibilityLevel=1.4".into(),
        format!("-dPDFSETTINGS={}", mode.preset()).into(),
        "-dNOPAUSE".into(),
        "-dQUIET".into(),
        "-dBATCH".into(),
        "-dSAFER".into(),
        output_arg,
        input.as_os_str().to_os_string(),
    ]
}

/// Compress `input` into `output` with Ghostscript.
///
/// Returns the output path once the engine has exited successfully and the
/// output file exists.
pub async fn run_compression(
    config: &EngineConfig,
    input: &Path,
    output: &Path,
    mode: CompressionMode,
) -> Result<PathBuf> {
    let command = EngineCommand {
        engine: "ghostscript",
        program: config.ghostscript.clone(),
        args: compression_args(input, output, mode),
        timeout: config.timeout,
        max_diagnostic_bytes: config.max_diagnostic_bytes,
    };

    let result = run_engine(&command).await?;

    if !output.is_file() {
        return Err(Error::EngineFailed {
            engine: command.engine.to_string(),
            status: result.status.to_string(),
            diagnostics: format!("no output produced. {}", result.diagnostics)
                .trim()
                .to_string(),
        });
    }

    tracing::info!(
        mode = mode.as_str(),
        elapsed_ms = result.elapsed.as_millis() as u64,
        "Compression finished"
    );
    Ok(output.to_path_buf())
}

//! Transformation dispatcher
//!
//! Takes an uploaded document plus operation parameters, validates them,
//! runs exactly one transformation and returns a single artifact or a
//! structured failure. Scratch files live in a per-request artifact scope
//! that is gone before the result is handed back.

use crate::archive::assemble_pages;
use crate::artifact::{ArtifactScope, ArtifactStore};
use crate::config::PipelineConfig;
use crate::engine::{run_compression, run_rasterization, CompressionMode};
use crate::error::{Error, Failure, Result};
use crate::pdf::{EncryptionState, PageRange, QpdfWrapper};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use unicode_normalization::UnicodeNormalization;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_ZIP: &str = "application/zip";
pub const MIME_JSON: &str = "application/json";

/// Content types accepted alongside a PDF upload
const ACCEPTED_CONTENT_TYPES: &[&str] = &["application/pdf", "application/x-pdf", "application/octet-stream"];

// ============================================================================
// Request types
// ============================================================================

/// A document as handed over by the transport layer
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    /// Client-supplied filename; only used to derive output names
    pub filename: String,
    /// Declared content type, if the transport provided one
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Operation parameters as received. Required fields are optional here so
/// that a missing value is reported as a validation error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum OperationParams {
    CheckLock,
    Protect {
        #[serde(default)]
        password: Option<String>,
    },
    ResetPassword {
        #[serde(default)]
        old_password: Option<String>,
        #[serde(default)]
        new_password: Option<String>,
    },
    Compress {
        #[serde(default)]
        mode: Option<String>,
    },
    SplitRange {
        #[serde(default)]
        range: Option<String>,
    },
    Rasterize {
        #[serde(default)]
        dpi: Option<u32>,
    },
}

impl OperationParams {
    pub fn name(&self) -> &'static str {
        match self {
            OperationParams::CheckLock => "check_lock",
            OperationParams::Protect { .. } => "protect",
            OperationParams::ResetPassword { .. } => "reset_password",
            OperationParams::Compress { .. } => "compress",
            OperationParams::SplitRange { .. } => "split_range",
            OperationParams::Rasterize { .. } => "rasterize",
        }
    }
}

/// One transformation request
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub document: UploadedDocument,
    pub params: OperationParams,
}

impl OperationRequest {
    pub fn new(document: UploadedDocument, params: OperationParams) -> Self {
        Self { document, params }
    }
}

/// Parameters after validation, with every required value present and typed
#[derive(Debug, Clone, PartialEq, Eq)]
enum Operation {
    CheckLock,
    Protect { password: String },
    ResetPassword { old_password: String, new_password: String },
    Compress { mode: CompressionMode },
    SplitRange { range: PageRange },
    Rasterize { dpi: u32 },
}

#[derive(Debug)]
struct ValidatedRequest {
    /// Sanitized upload filename
    filename: String,
    data: Vec<u8>,
    operation: Operation,
}

// ============================================================================
// Result types
// ============================================================================

/// A finished output handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub suggested_filename: String,
    pub mime_type: String,
    pub metadata: BTreeMap<String, String>,
}

impl Artifact {
    fn new(bytes: Vec<u8>, suggested_filename: impl Into<String>, mime_type: &str) -> Self {
        Self {
            bytes,
            suggested_filename: suggested_filename.into(),
            mime_type: mime_type.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    fn with_meta(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Outcome of one request: an artifact, or a failure with no partial output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformationResult {
    Artifact(Artifact),
    Failure(Failure),
}

impl TransformationResult {
    pub fn is_artifact(&self) -> bool {
        matches!(self, TransformationResult::Artifact(_))
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            TransformationResult::Artifact(a) => Some(a),
            TransformationResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            TransformationResult::Artifact(_) => None,
            TransformationResult::Failure(f) => Some(f),
        }
    }

    pub fn into_result(self) -> std::result::Result<Artifact, Failure> {
        match self {
            TransformationResult::Artifact(a) => Ok(a),
            TransformationResult::Failure(f) => Err(f),
        }
    }
}

/// Body of a CheckLock artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatus {
    pub locked: bool,
    pub message: String,
}

impl From<EncryptionState> for LockStatus {
    fn from(state: EncryptionState) -> Self {
        let locked = state.is_locked();
        let message = if locked {
            "This PDF is password protected."
        } else {
            "This PDF is not password protected."
        };
        Self {
            locked,
            message: message.to_string(),
        }
    }
}

/// Metadata keys attached to artifacts
pub mod meta {
    pub const LOCKED: &str = "locked";
    pub const PAGE_COUNT: &str = "page-count";
    pub const ORIGINAL_SIZE: &str = "original-size";
    pub const TRANSFORMED_SIZE: &str = "transformed-size";
    pub const ORIGINAL_SIZE_MB: &str = "original-size-mb";
    pub const COMPRESSED_SIZE_MB: &str = "compressed-size-mb";
    pub const COMPRESSION_MODE: &str = "compression-mode";
    pub const DPI: &str = "dpi";
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Validated,
    Executing,
    Completed,
    Failed,
}

impl RequestState {
    pub fn can_advance_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Received, Validated)
                | (Received, Failed)
                | (Validated, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }
}

fn advance(state: &mut RequestState, next: RequestState) {
    debug_assert!(
        state.can_advance_to(next),
        "illegal transition {:?} -> {:?}",
        state,
        next
    );
    tracing::debug!(from = ?state, to = ?next, "Request state changed");
    *state = next;
}

// ============================================================================
// Helpers
// ============================================================================

/// Strip directory components, fold accented letters to ASCII (`é` -> `e`),
/// drop other non-ASCII characters and replace anything left outside
/// `[A-Za-z0-9._-]`.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .trim()
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches(['.', '_']).to_string()
}

fn file_stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document")
}

fn megabytes(bytes: usize) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
}

fn non_empty(value: Option<String>, what: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::validation(format!("Missing {}", what))),
    }
}

/// Run CPU-bound qpdf work off the async executor
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin {
            reason: e.to_string(),
        })?
}

/// Release a scope explicitly so cleanup problems show up in the logs.
fn release(scope: ArtifactScope) {
    if let Err(e) = scope.close() {
        tracing::warn!(error = %e, "Failed to remove artifact scope");
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// PDF transformation pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    store: ArtifactStore,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    /// Create a pipeline with full configuration
    pub fn with_config(config: PipelineConfig) -> Self {
        let store = ArtifactStore::new(config.temp_root.clone());
        Self {
            config: Arc::new(config),
            store,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one request from `Received` to `Completed` or `Failed`.
    pub async fn run(&self, request: OperationRequest) -> TransformationResult {
        let request_id = uuid::Uuid::new_v4().simple().to_string();
        let operation = request.params.name();
        let span = tracing::info_span!("transform", request_id = %request_id, operation);

        async move {
            let started = Instant::now();
            let mut state = RequestState::Received;

            let validated = match self.validate(request) {
                Ok(v) => v,
                Err(e) => {
                    advance(&mut state, RequestState::Failed);
                    tracing::warn!(error = %e, "Request rejected");
                    return TransformationResult::Failure(e.into_failure());
                }
            };
            advance(&mut state, RequestState::Validated);

            advance(&mut state, RequestState::Executing);
            match self.execute(&request_id, validated).await {
                Ok(artifact) => {
                    advance(&mut state, RequestState::Completed);
                    tracing::info!(
                        bytes = artifact.bytes.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Transformation completed"
                    );
                    TransformationResult::Artifact(artifact)
                }
                Err(e) => {
                    advance(&mut state, RequestState::Failed);
                    tracing::warn!(
                        error = %e,
                        kind = %e.kind(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Transformation failed"
                    );
                    TransformationResult::Failure(e.into_failure())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Structural checks. Nothing here opens the document.
    fn validate(&self, request: OperationRequest) -> Result<ValidatedRequest> {
        let OperationRequest { document, params } = request;

        if document.data.is_empty() {
            return Err(Error::validation("No file uploaded"));
        }
        if document.data.len() > self.config.max_input_bytes {
            return Err(Error::validation(format!(
                "File too large (max {} bytes)",
                self.config.max_input_bytes
            )));
        }

        let filename = sanitize_filename(&document.filename);
        let extension = Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let allowed = extension
            .as_deref()
            .is_some_and(|ext| self.config.allowed_extensions.iter().any(|a| a == ext));
        if !allowed {
            return Err(Error::validation("Invalid file type"));
        }

        if let Some(content_type) = &document.content_type {
            let essence = content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            if !ACCEPTED_CONTENT_TYPES.contains(&essence.as_str()) {
                return Err(Error::validation(format!(
                    "Unsupported content type: {}",
                    essence
                )));
            }
        }

        let operation = match params {
            OperationParams::CheckLock => Operation::CheckLock,
            OperationParams::Protect { password } => Operation::Protect {
                password: non_empty(password, "password")?,
            },
            OperationParams::ResetPassword {
                old_password,
                new_password,
            } => Operation::ResetPassword {
                old_password: non_empty(old_password, "old password")?,
                new_password: non_empty(new_password, "new password")?,
            },
            OperationParams::Compress { mode } => Operation::Compress {
                mode: mode
                    .as_deref()
                    .map(CompressionMode::parse_lenient)
                    .unwrap_or_default(),
            },
            OperationParams::SplitRange { range } => Operation::SplitRange {
                range: PageRange::parse(&non_empty(range, "page range")?)?,
            },
            OperationParams::Rasterize { dpi } => {
                let dpi = dpi.unwrap_or(self.config.default_dpi);
                if dpi == 0 || dpi > self.config.max_dpi {
                    return Err(Error::validation(format!(
                        "dpi must be between 1 and {}, got {}",
                        self.config.max_dpi, dpi
                    )));
                }
                Operation::Rasterize { dpi }
            }
        };

        Ok(ValidatedRequest {
            filename,
            data: document.data,
            operation,
        })
    }

    /// Run the validated operation. Any scope acquired here is released
    /// before this returns, on success and on error.
    async fn execute(&self, request_id: &str, request: ValidatedRequest) -> Result<Artifact> {
        let ValidatedRequest {
            filename,
            data,
            operation,
        } = request;

        match operation {
            Operation::CheckLock => self.process_check_lock(data).await,
            Operation::Protect { password } => {
                self.process_protect(&filename, data, password).await
            }
            Operation::ResetPassword {
                old_password,
                new_password,
            } => {
                self.process_reset_password(&filename, data, old_password, new_password)
                    .await
            }
            Operation::Compress { mode } => {
                self.process_compress(request_id, &filename, data, mode).await
            }
            Operation::SplitRange { range } => self.process_split(data, range).await,
            Operation::Rasterize { dpi } => self.process_rasterize(request_id, data, dpi).await,
        }
    }

    async fn process_check_lock(&self, data: Vec<u8>) -> Result<Artifact> {
        let state = blocking(move || QpdfWrapper::inspect(&data)).await?;
        let status = LockStatus::from(state);
        let body = serde_json::to_vec(&status)?;

        Ok(Artifact::new(body, "lock_status.json", MIME_JSON).with_meta(meta::LOCKED, status.locked))
    }

    async fn process_protect(
        &self,
        filename: &str,
        data: Vec<u8>,
        password: String,
    ) -> Result<Artifact> {
        let (output_data, output_page_count) = blocking(move || {
            let output_data = QpdfWrapper::protect(&data, &password)?;
            let output_page_count = QpdfWrapper::get_page_count(&output_data, Some(&password))?;
            Ok((output_data, output_page_count))
        })
        .await?;

        let name = format!("{}_protected.pdf", file_stem(filename));
        Ok(Artifact::new(output_data, name, MIME_PDF).with_meta(meta::PAGE_COUNT, output_page_count))
    }

    async fn process_reset_password(
        &self,
        filename: &str,
        data: Vec<u8>,
        old_password: String,
        new_password: String,
    ) -> Result<Artifact> {
        let (output_data, output_page_count) = blocking(move || {
            let output_data = QpdfWrapper::reset_password(&data, &old_password, &new_password)?;
            let output_page_count =
                QpdfWrapper::get_page_count(&output_data, Some(&new_password))?;
            Ok((output_data, output_page_count))
        })
        .await?;

        let name = format!("{}_reset.pdf", file_stem(filename));
        Ok(Artifact::new(output_data, name, MIME_PDF).with_meta(meta::PAGE_COUNT, output_page_count))
    }

    async fn process_split(&self, data: Vec<u8>, range: PageRange) -> Result<Artifact> {
        let (output_data, output_page_count) = blocking(move || {
            let output_data = QpdfWrapper::extract_range(&data, &range)?;
            let output_page_count = QpdfWrapper::get_page_count(&output_data, None)?;
            Ok((output_data, output_page_count))
        })
        .await?;
        if output_page_count != range.page_count() {
            return Err(Error::Qpdf {
                reason: format!(
                    "extracted {} pages for range {}",
                    output_page_count, range
                ),
            });
        }

        let name = format!("split_{}.pdf", range);
        Ok(Artifact::new(output_data, name, MIME_PDF).with_meta(meta::PAGE_COUNT, output_page_count))
    }

    async fn process_compress(
        &self,
        request_id: &str,
        filename: &str,
        data: Vec<u8>,
        mode: CompressionMode,
    ) -> Result<Artifact> {
        let original_size = data.len();

        // Locked or broken input never reaches the engine
        let (state, data) = blocking(move || {
            let state = QpdfWrapper::inspect(&data)?;
            Ok((state, data))
        })
        .await?;
        if state.is_locked() {
            return Err(Error::PasswordRequired);
        }

        let scope = self.store.scope(request_id)?;
        let input = scope.write("input.pdf", &data)?;
        let output = scope.path_for("output.pdf")?;

        run_compression(&self.config.engines, &input, &output, mode).await?;
        let compressed = scope.read("output.pdf")?;
        release(scope);

        if !compressed.starts_with(b"%PDF") {
            return Err(Error::EngineFailed {
                engine: "ghostscript".to_string(),
                status: "unusable output".to_string(),
                diagnostics: "output is not a PDF".to_string(),
            });
        }

        let compressed_size = compressed.len();
        tracing::info!(
            original_size,
            compressed_size,
            mode = mode.as_str(),
            "Compressed document"
        );

        Ok(
            Artifact::new(compressed, format!("compressed_{}", filename), MIME_PDF)
                .with_meta(meta::ORIGINAL_SIZE, original_size)
                .with_meta(meta::TRANSFORMED_SIZE, compressed_size)
                .with_meta(meta::ORIGINAL_SIZE_MB, megabytes(original_size))
                .with_meta(meta::COMPRESSED_SIZE_MB, megabytes(compressed_size))
                .with_meta(meta::COMPRESSION_MODE, mode.as_str()),
        )
    }

    async fn process_rasterize(&self, request_id: &str, data: Vec<u8>, dpi: u32) -> Result<Artifact> {
        let (page_count, data) = blocking(move || {
            let page_count = QpdfWrapper::get_page_count(&data, None)?;
            Ok((page_count, data))
        })
        .await?;
        if page_count == 0 {
            return Err(Error::InvalidDocument {
                reason: "PDF has no pages".to_string(),
            });
        }

        let scope = self.store.scope(request_id)?;
        let input = scope.write("input.pdf", &data)?;
        let pages_dir = scope.subdir("pages")?;

        let images =
            run_rasterization(&self.config.engines, &input, &pages_dir, dpi, page_count).await?;
        release(scope);

        let archive =
            blocking(move || assemble_pages(images.into_iter().map(|img| img.data))).await?;

        Ok(Artifact::new(archive, "pdf_images.zip", MIME_ZIP)
            .with_meta(meta::PAGE_COUNT, page_count)
            .with_meta(meta::DPI, dpi))
    }
}

//! PDF Transformation Pipeline Library
//!
//! Single-document PDF transformations, one artifact or one failure per request:
//! - `check_lock`: Report whether a PDF requires a password
//! - `protect`: Encrypt an unlocked PDF with a password
//! - `reset_password`: Replace the password of a locked PDF
//! - `compress`: Shrink a PDF through Ghostscript presets
//! - `split_range`: Extract a contiguous page range into a new PDF
//! - `rasterize`: Render every page to PNG and return them as a ZIP archive

pub mod archive;
pub mod artifact;
pub mod config;
pub mod engine;
pub mod error;
pub mod pdf;
pub mod pipeline;

pub use config::{ConfigError, EngineConfig, PipelineConfig, RasterEngine};
pub use engine::CompressionMode;
pub use error::{Error, ErrorKind, Failure, Result};
pub use pdf::{EncryptionState, PageRange, QpdfWrapper};
pub use pipeline::{
    Artifact, LockStatus, OperationParams, OperationRequest, Pipeline, RequestState,
    TransformationResult, UploadedDocument,
};

//! Error types for the PDF transformation pipeline

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for the transformation pipeline
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the transformation pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed request input
    #[error("Invalid request: {reason}")]
    Validation { reason: String },

    /// Page range string is not of the form "<start>-<end>"
    #[error("Invalid page range format: {range}")]
    InvalidRangeFormat { range: String },

    /// Input is not a parseable PDF
    #[error("Invalid PDF file: {reason}")]
    InvalidDocument { reason: String },

    /// Protect was requested for a document that already carries a password
    #[error("PDF is already password protected")]
    AlreadyProtected,

    /// Document needs a password that was not supplied
    #[error("PDF is password protected")]
    PasswordRequired,

    /// Supplied password does not open the document
    #[error("Incorrect password")]
    IncorrectPassword,

    /// Password reset was requested for a document without a password
    #[error("PDF is not password protected")]
    NotProtected,

    /// Page range outside 1..=total
    #[error("Page range {start}-{end} out of bounds (1-{total})")]
    RangeOutOfBounds { start: u32, end: u32, total: u32 },

    /// External engine could not be started
    #[error("Failed to start {engine}: {source}")]
    EngineSpawn {
        engine: String,
        #[source]
        source: std::io::Error,
    },

    /// External engine exited unsuccessfully or produced unusable output
    #[error("{engine} failed ({status}): {diagnostics}")]
    EngineFailed {
        engine: String,
        status: String,
        diagnostics: String,
    },

    /// External engine exceeded its time budget and was killed
    #[error("{engine} timed out after {timeout:?}")]
    EngineTimeout {
        engine: String,
        timeout: Duration,
        diagnostics: String,
    },

    /// qpdf error outside of document parsing
    #[error("qpdf error: {reason}")]
    Qpdf { reason: String },

    /// Archive assembly error
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Two archive entries share a name
    #[error("Duplicate archive entry: {name}")]
    DuplicateArchiveEntry { name: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Blocking task panicked or was cancelled
    #[error("Task join error: {reason}")]
    TaskJoin { reason: String },
}

/// Caller-facing classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    ValidationError,
    InvalidDocument,
    AlreadyProtected,
    AuthorizationFailed,
    RangeOutOfBounds,
    EngineExecutionFailed,
    InternalError,
}

impl ErrorKind {
    /// Only engine execution failures may succeed on a second attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::EngineExecutionFailed)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::InvalidDocument => "InvalidDocument",
            ErrorKind::AlreadyProtected => "AlreadyProtected",
            ErrorKind::AuthorizationFailed => "AuthorizationFailed",
            ErrorKind::RangeOutOfBounds => "RangeOutOfBounds",
            ErrorKind::EngineExecutionFailed => "EngineExecutionFailed",
            ErrorKind::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

/// Engine-specific details attached to an `EngineExecutionFailed` failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineFailure {
    pub timed_out: bool,
    pub diagnostics: String,
}

/// Structured error returned to the caller. Never carries a partial artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineFailure>,
}

impl Failure {
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn timed_out(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| e.timed_out)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl Error {
    pub fn validation(reason: impl Into<String>) -> Self {
        Error::Validation {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } | Error::InvalidRangeFormat { .. } => {
                ErrorKind::ValidationError
            }
            Error::InvalidDocument { .. } => ErrorKind::InvalidDocument,
            Error::AlreadyProtected => ErrorKind::AlreadyProtected,
            Error::PasswordRequired | Error::IncorrectPassword | Error::NotProtected => {
                ErrorKind::AuthorizationFailed
            }
            Error::RangeOutOfBounds { .. } => ErrorKind::RangeOutOfBounds,
            Error::EngineSpawn { .. } | Error::EngineFailed { .. } | Error::EngineTimeout { .. } => {
                ErrorKind::EngineExecutionFailed
            }
            Error::Qpdf { .. }
            | Error::Archive(_)
            | Error::DuplicateArchiveEntry { .. }
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::TaskJoin { .. } => ErrorKind::InternalError,
        }
    }

    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::Validation { reason } => reason.clone(),
            Error::InvalidRangeFormat { range } => {
                format!("Invalid page range format: {:?} (expected \"start-end\")", range)
            }
            Error::InvalidDocument { .. } => "Not a valid PDF document".to_string(),
            Error::AlreadyProtected => "This PDF is already password protected.".to_string(),
            Error::PasswordRequired => "This PDF is password protected.".to_string(),
            Error::IncorrectPassword => "Incorrect password or cannot open PDF.".to_string(),
            Error::NotProtected => "This PDF is not password protected.".to_string(),
            Error::RangeOutOfBounds { total, .. } => {
                format!("Page range out of bounds (1-{})", total)
            }
            Error::EngineSpawn { engine, .. } => format!("Failed to start {}", engine),
            Error::EngineFailed { engine, status, .. } => {
                format!("{} failed ({})", engine, status)
            }
            Error::EngineTimeout { engine, timeout, .. } => {
                format!("{} timed out after {} seconds", engine, timeout.as_secs_f32())
            }
            Error::Qpdf { .. } => "PDF processing error".to_string(),
            Error::Archive(_) | Error::DuplicateArchiveEntry { .. } => {
                "Archive creation error".to_string()
            }
            Error::Io(_) => "I/O error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
            Error::TaskJoin { .. } => "Internal error".to_string(),
        }
    }

    /// Convert into the structured failure handed back to the caller.
    pub fn into_failure(self) -> Failure {
        let kind = self.kind();
        let message = self.client_message();
        let engine = match self {
            Error::EngineFailed { diagnostics, .. } => Some(EngineFailure {
                timed_out: false,
                diagnostics,
            }),
            Error::EngineTimeout { diagnostics, .. } => Some(EngineFailure {
                timed_out: true,
                diagnostics,
            }),
            Error::EngineSpawn { source, .. } => Some(EngineFailure {
                timed_out: false,
                diagnostics: source.to_string(),
            }),
            _ => None,
        };
        Failure {
            kind,
            message,
            engine,
        }
    }
}

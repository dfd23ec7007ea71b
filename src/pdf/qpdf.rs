//! qpdf FFI wrapper for PDF manipulation
//!
//! Lock inspection, password protection/reset and page range extraction,
//! all performed in memory using the qpdf crate (vendored FFI). Inputs are
//! never modified; every operation writes a fresh document.

use crate::error::{Error, Result};
use crate::pdf::PageRange;
use qpdf::{EncryptionParams, EncryptionParamsR6, PrintPermission, QPdf};
use serde::Serialize;

/// Wrapper for qpdf operations via FFI
pub struct QpdfWrapper;

/// Whether a document can be opened without a password.
///
/// Always derived from the bytes at hand, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EncryptionState {
    Unlocked,
    LockedWithUnknownPassword,
}

impl EncryptionState {
    pub fn is_locked(self) -> bool {
        matches!(self, EncryptionState::LockedWithUnknownPassword)
    }
}

/// Window in which the `%PDF` marker must appear. Leading bytes before the
/// header (BOMs, mail or transport prefixes) are tolerated by qpdf.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Reject bytes with no PDF header near the start
fn check_header(data: &[u8]) -> Result<()> {
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    if !window.windows(4).any(|w| w == b"%PDF") {
        return Err(Error::InvalidDocument {
            reason: "Not a valid PDF file".to_string(),
        });
    }
    Ok(())
}

/// Helper: open a QPdf from memory, optionally with password
fn open_qpdf(data: &[u8], password: Option<&str>) -> Result<QPdf> {
    check_header(data)?;
    match password {
        Some(pwd) => QPdf::read_from_memory_encrypted(data, pwd)
            .map_err(|e| map_open_error(e, true)),
        None => QPdf::read_from_memory(data).map_err(|e| map_open_error(e, false)),
    }
}

/// Map errors raised while parsing a document. A password failure is the
/// only way to get a lock-related error; everything else means the bytes
/// are not a usable PDF.
fn map_open_error(e: qpdf::QPdfError, with_password: bool) -> Error {
    match e.error_code() {
        qpdf::QPdfErrorCode::InvalidPassword if with_password => Error::IncorrectPassword,
        qpdf::QPdfErrorCode::InvalidPassword => Error::PasswordRequired,
        _ => Error::InvalidDocument {
            reason: e.to_string(),
        },
    }
}

/// Map errors raised after a document was opened successfully
fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    Error::Qpdf {
        reason: e.to_string(),
    }
}

/// Same password for owner and user, every permission granted
fn symmetric_encryption(password: &str) -> EncryptionParams {
    EncryptionParams::R6(EncryptionParamsR6 {
        user_password: password.to_string(),
        owner_password: password.to_string(),
        allow_accessibility: true,
        allow_extract: true,
        allow_assemble: true,
        allow_annotate_and_form: true,
        allow_form_filling: true,
        allow_modify_other: true,
        allow_print: PrintPermission::Full,
        encrypt_metadata: true,
    })
}

fn write_encrypted(qpdf: &QPdf, password: &str) -> Result<Vec<u8>> {
    let mut writer = qpdf.writer();
    writer
        .preserve_encryption(false)
        .encryption_params(symmetric_encryption(password));
    writer.write_to_memory().map_err(map_qpdf_error)
}

impl QpdfWrapper {
    /// Determine whether the document opens without a password.
    ///
    /// Unparseable input is reported as `Error::InvalidDocument`, never as
    /// locked.
    pub fn inspect(input_data: &[u8]) -> Result<EncryptionState> {
        match open_qpdf(input_data, None) {
            Ok(_) => Ok(EncryptionState::Unlocked),
            Err(Error::PasswordRequired) => Ok(EncryptionState::LockedWithUnknownPassword),
            Err(e) => Err(e),
        }
    }

    /// Encrypt an unlocked PDF with `password` as both owner and user password
    ///
    /// # Arguments
    /// * `input_data` - Raw PDF bytes
    /// * `password` - Password to apply
    ///
    /// # Returns
    /// The encrypted PDF as bytes
    pub fn protect(input_data: &[u8], password: &str) -> Result<Vec<u8>> {
        let qpdf = match open_qpdf(input_data, None) {
            Ok(qpdf) => qpdf,
            Err(Error::PasswordRequired) => return Err(Error::AlreadyProtected),
            Err(e) => return Err(e),
        };
        write_encrypted(&qpdf, password)
    }

    /// Replace the password of a locked PDF
    ///
    /// # Arguments
    /// * `input_data` - Raw PDF bytes
    /// * `old_password` - Password that currently opens the document
    /// * `new_password` - Password applied as both owner and user password
    ///
    /// # Returns
    /// The re-encrypted PDF as bytes
    pub fn reset_password(
        input_data: &[u8],
        old_password: &str,
        new_password: &str,
    ) -> Result<Vec<u8>> {
        // qpdf ignores the password for unencrypted files, so check explicitly
        if !Self::inspect(input_data)?.is_locked() {
            return Err(Error::NotProtected);
        }

        let qpdf = open_qpdf(input_data, Some(old_password))?;
        write_encrypted(&qpdf, new_password)
    }

    /// Copy pages `range.start..=range.end` into a new PDF
    ///
    /// # Arguments
    /// * `input_data` - Raw PDF bytes (must open without a password)
    /// * `range` - 1-indexed inclusive page range
    ///
    /// # Returns
    /// The extracted pages as a new PDF in bytes
    pub fn extract_range(input_data: &[u8], range: &PageRange) -> Result<Vec<u8>> {
        let source = open_qpdf(input_data, None)?;
        let num_pages = source.get_num_pages().map_err(map_qpdf_error)?;

        range.check_bounds(num_pages)?;

        let dest = QPdf::empty();

        for idx in range.indices() {
            let page = source.get_page(idx).ok_or(Error::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                total: num_pages,
            })?;
            let copied = dest.copy_from_foreign(&page);
            dest.add_page(&copied, false).map_err(map_qpdf_error)?;
        }

        let mut writer = dest.writer();
        writer.preserve_encryption(false);
        writer.write_to_memory().map_err(map_qpdf_error)
    }

    /// Get the page count of a PDF
    ///
    /// # Arguments
    /// * `input_data` - Raw PDF bytes
    /// * `password` - Optional password for encrypted PDFs
    ///
    /// # Returns
    /// The number of pages in the PDF
    pub fn get_page_count(input_data: &[u8], password: Option<&str>) -> Result<u32> {
        let qpdf = open_qpdf(input_data, password)?;
        qpdf.get_num_pages().map_err(map_qpdf_error)
    }
}

//! PDF processing layer
//!
//! In-process document operations backed by qpdf.

mod qpdf;
mod range;

pub use qpdf::{EncryptionState, QpdfWrapper};
pub use range::PageRange;

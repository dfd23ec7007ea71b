//! In-memory ZIP assembly for multi-file results

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Entry name for a 1-indexed page image
pub fn page_entry_name(page: u32) -> String {
    format!("page_{}.png", page)
}

/// Package `(name, bytes)` pairs into a ZIP archive.
///
/// Entries keep the input order, names must be unique, and every entry gets
/// the same fixed timestamp so identical inputs give identical bytes.
pub fn assemble<I, N>(entries: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (N, Vec<u8>)>,
    N: Into<String>,
{
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut seen = HashSet::new();

    for (name, data) in entries {
        let name: String = name.into();
        if !seen.insert(name.clone()) {
            return Err(Error::DuplicateArchiveEntry { name });
        }
        zip.start_file(name, options)?;
        zip.write_all(&data)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Archive page images as `page_1.png`, `page_2.png`, ... in the given order.
pub fn assemble_pages<I>(images: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = Vec<u8>>,
{
    assemble(
        images
            .into_iter()
            .zip(1u32..)
            .map(|(data, page)| (page_entry_name(page), data)),
    )
}

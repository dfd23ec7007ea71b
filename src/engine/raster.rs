//! Page rasterization through Poppler or Ghostscript

use super::process::{run_engine, EngineCommand};
use crate::config::{EngineConfig, RasterEngine};
use crate::error::{Error, Result};
use image::{ImageFormat, ImageReader};
use std::ffi::OsString;
use std::io::Cursor;
use std::path::Path;

/// Output files are named `page-<n>.png` by both engines
const PAGE_PREFIX: &str = "page";

/// A rendered page, 1-indexed
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page: u32,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

fn engine_name(engine: RasterEngine) -> &'static str {
    match engine {
        RasterEngine::Poppler => "pdftoppm",
        RasterEngine::Ghostscript => "ghostscript",
    }
}

/// Argument list for rendering every page of `input` into `out_dir`.
pub fn raster_args(engine: RasterEngine, input: &Path, out_dir: &Path, dpi: u32) -> Vec<OsString> {
    let prefix = out_dir.join(PAGE_PREFIX);
    match engine {
        RasterEngine::Poppler => vec![
            "-png".into(),
            "-r".into(),
            dpi.to_string().into(),
            input.as_os_str().to_os_string(),
            prefix.into_os_string(),
        ],
        RasterEngine::Ghostscript => {
            let mut output_arg = OsString::from("-sOutputFile=");
            output_arg.push(prefix.as_os_str());
            output_arg.push("-%d.png");
            vec![
                "-sDEVICE=png16m".into(),
                format!("-r{}", dpi).into(),
                "-dTextAlphaBits=4".into(),
                "-dGraphicsAlphaBits=4".into(),
                "-dNOPAUSE".into(),
                "-dQUIET".into(),
                "-dBATCH".into(),
                "-dSAFER".into(),
                output_arg,
                input.as_os_str().to_os_string(),
            ]
        }
    }
}

/// Parse `page-<n>.png` (pdftoppm zero-pads `n` depending on page count)
fn page_number(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(PAGE_PREFIX)?
        .strip_prefix('-')?
        .strip_suffix(".png")?
        .parse()
        .ok()
}

/// Read the engine's page images back in page order.
///
/// Exactly pages `1..=expected_pages` must be present and each must decode
/// as PNG; anything else fails the whole operation.
pub fn collect_page_images(
    engine: &str,
    out_dir: &Path,
    expected_pages: u32,
) -> Result<Vec<PageImage>> {
    let unusable = |diagnostics: String| Error::EngineFailed {
        engine: engine.to_string(),
        status: "unusable output".to_string(),
        diagnostics,
    };

    let mut pages: Vec<(u32, std::path::PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(out_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(page) = name.to_str().and_then(page_number) {
            pages.push((page, entry.path()));
        }
    }
    pages.sort_by_key(|(page, _)| *page);

    let found: Vec<u32> = pages.iter().map(|(page, _)| *page).collect();
    let expected: Vec<u32> = (1..=expected_pages).collect();
    if found != expected {
        return Err(unusable(format!(
            "expected {} page images, found {}",
            expected_pages,
            found.len()
        )));
    }

    pages
        .into_iter()
        .map(|(page, path)| {
            let data = std::fs::read(&path)?;
            let (width, height) = ImageReader::with_format(Cursor::new(&data), ImageFormat::Png)
                .into_dimensions()
                .map_err(|e| unusable(format!("page {} is not a valid PNG: {}", page, e)))?;
            Ok(PageImage {
                page,
                width,
                height,
                data,
            })
        })
        .collect()
}

/// Render every page of `input` at `dpi` into `out_dir` and read the images
/// back in page order.
pub async fn run_rasterization(
    config: &EngineConfig,
    input: &Path,
    out_dir: &Path,
    dpi: u32,
    expected_pages: u32,
) -> Result<Vec<PageImage>> {
    let engine = engine_name(config.raster_engine);
    let command = EngineCommand {
        engine,
        program: config.raster_program().to_path_buf(),
        args: raster_args(config.raster_engine, input, out_dir, dpi),
        timeout: config.timeout,
        max_diagnostic_bytes: config.max_diagnostic_bytes,
    };

    let result = run_engine(&command).await?;
    let images = collect_page_images(engine, out_dir, expected_pages)?;
    for image in &images {
        tracing::debug!(
            page = image.page,
            width = image.width,
            height = image.height,
            bytes = image.data.len(),
            "Page rendered"
        );
    }

    tracing::info!(
        engine,
        dpi,
        pages = images.len(),
        elapsed_ms = result.elapsed.as_millis() as u64,
        "Rasterization finished"
    );
    Ok(images)
}

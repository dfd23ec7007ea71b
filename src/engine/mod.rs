//! External engine invocation
//!
//! Compression (Ghostscript) and rasterization (Poppler or Ghostscript) run
//! as child processes over files in a request's artifact scope.

mod compress;
mod process;
mod raster;

pub use compress::{compression_args, run_compression, CompressionMode};
pub use process::{run_engine, EngineCommand, EngineOutput};
pub use raster::{collect_page_images, raster_args, run_rasterization, PageImage};

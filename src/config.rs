//! Process-wide configuration
//!
//! Built once at startup and shared read-only (behind `Arc`) by every request.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Startup/configuration failures. Distinct from per-request errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Engine binary could not be located
    #[error("{engine} not found: {program} (set it explicitly or add it to PATH)")]
    EngineNotFound { engine: String, program: String },

    /// Temporary artifact root is unusable
    #[error("Temp directory {path} is not usable: {source}")]
    TempRoot {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Unrecognized raster engine name
    #[error("Unknown raster engine: {0} (expected \"poppler\" or \"ghostscript\")")]
    UnknownRasterEngine(String),
}

/// External program used to turn pages into PNG images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterEngine {
    /// Poppler `pdftoppm`
    #[default]
    Poppler,
    /// Ghostscript `png16m` device
    Ghostscript,
}

impl FromStr for RasterEngine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poppler" | "pdftoppm" => Ok(RasterEngine::Poppler),
            "ghostscript" | "gs" => Ok(RasterEngine::Ghostscript),
            other => Err(ConfigError::UnknownRasterEngine(other.to_string())),
        }
    }
}

/// External engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ghostscript program (name resolved on PATH, or explicit path)
    pub ghostscript: PathBuf,
    /// Poppler pdftoppm program
    pub pdftoppm: PathBuf,
    /// Engine used for rasterization
    pub raster_engine: RasterEngine,
    /// Wall-clock budget for one engine run (default: 120s)
    pub timeout: Duration,
    /// Captured stdout/stderr kept for diagnostics (default: 8KiB)
    pub max_diagnostic_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let ghostscript = if cfg!(windows) { "gswin64c" } else { "gs" };
        Self {
            ghostscript: PathBuf::from(ghostscript),
            pdftoppm: PathBuf::from("pdftoppm"),
            raster_engine: RasterEngine::default(),
            timeout: Duration::from_secs(120),
            max_diagnostic_bytes: 8 * 1024,
        }
    }
}

impl EngineConfig {
    /// Program used for rasterization under the configured engine
    pub fn raster_program(&self) -> &Path {
        match self.raster_engine {
            RasterEngine::Poppler => &self.pdftoppm,
            RasterEngine::Ghostscript => &self.ghostscript,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory under which per-request scratch directories are created
    pub temp_root: PathBuf,
    /// External engines
    pub engines: EngineConfig,
    /// Rasterization resolution when the request omits one (default: 300)
    pub default_dpi: u32,
    /// Highest accepted rasterization resolution (default: 1200)
    pub max_dpi: u32,
    /// Largest accepted input document (default: 256MB)
    pub max_input_bytes: usize,
    /// Accepted upload extensions, lowercase without dot
    pub allowed_extensions: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir(),
            engines: EngineConfig::default(),
            default_dpi: 300,
            max_dpi: 1200,
            max_input_bytes: 256 * 1024 * 1024, // 256MB
            allowed_extensions: vec!["pdf".to_string()],
        }
    }
}

impl PipelineConfig {
    /// Ensure the temp root exists and is a directory.
    pub fn check_temp_root(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.temp_root).map_err(|e| ConfigError::TempRoot {
            path: self.temp_root.display().to_string(),
            source: e,
        })?;
        let meta = std::fs::metadata(&self.temp_root).map_err(|e| ConfigError::TempRoot {
            path: self.temp_root.display().to_string(),
            source: e,
        })?;
        if !meta.is_dir() {
            return Err(ConfigError::TempRoot {
                path: self.temp_root.display().to_string(),
                source: std::io::Error::other("not a directory"),
            });
        }
        Ok(())
    }

    /// Resolve the compression engine, replacing the configured program with
    /// its absolute path.
    pub fn check_compression_engine(&mut self) -> Result<(), ConfigError> {
        self.engines.ghostscript = locate_program("ghostscript", &self.engines.ghostscript)?;
        Ok(())
    }

    /// Resolve the configured rasterization engine.
    pub fn check_raster_engine(&mut self) -> Result<(), ConfigError> {
        match self.engines.raster_engine {
            RasterEngine::Poppler => {
                self.engines.pdftoppm = locate_program("pdftoppm", &self.engines.pdftoppm)?;
            }
            RasterEngine::Ghostscript => self.check_compression_engine()?,
        }
        Ok(())
    }

    /// Resolve every engine and validate the temp root.
    pub fn check_engines(&mut self) -> Result<(), ConfigError> {
        self.check_temp_root()?;
        self.check_compression_engine()?;
        self.check_raster_engine()
    }
}

/// Find a program: explicit paths must be executable files, bare names are
/// looked up on PATH.
pub fn locate_program(engine: &str, program: &Path) -> Result<PathBuf, ConfigError> {
    which::which(program).map_err(|e| {
        tracing::debug!(engine, program = %program.display(), error = %e, "Engine lookup failed");
        ConfigError::EngineNotFound {
            engine: engine.to_string(),
            program: program.display().to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.default_dpi, 300);
        assert_eq!(config.max_dpi, 1200);
        assert_eq!(config.allowed_extensions, vec!["pdf".to_string()]);
        assert_eq!(config.engines.timeout, Duration::from_secs(120));
        assert_eq!(config.engines.raster_engine, RasterEngine::Poppler);
        assert_eq!(config.engines.raster_program(), Path::new("pdftoppm"));
    }

    #[test]
    fn test_raster_engine_from_str() {
        assert_eq!("Poppler".parse::<RasterEngine>().unwrap(), RasterEngine::Poppler);
        assert_eq!("gs".parse::<RasterEngine>().unwrap(), RasterEngine::Ghostscript);
        assert!("mupdf".parse::<RasterEngine>().is_err());
    }

    #[test]
    fn test_locate_missing_program() {
        let result = locate_program("ghostscript", Path::new("definitely-not-a-real-engine-xyz"));
        assert!(matches!(result, Err(ConfigError::EngineNotFound { .. })));

        let result = locate_program("ghostscript", Path::new("/nonexistent/bin/gs"));
        assert!(matches!(result, Err(ConfigError::EngineNotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_program_on_path() {
        // `sh` is present on every Unix system
        let found = locate_program("shell", Path::new("sh")).unwrap();
        assert!(found.is_absolute());
        assert!(found.ends_with("sh"));
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_explicit_path_requires_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let engine = dir.path().join("gs");
        std::fs::write(&engine, "#!/bin/sh\nexit 0\n").unwrap();

        std::fs::set_permissions(&engine, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(
            locate_program("ghostscript", &engine),
            Err(ConfigError::EngineNotFound { .. })
        ));

        std::fs::set_permissions(&engine, std::fs::Permissions::from_mode(0o755)).unwrap();
        let found = locate_program("ghostscript", &engine).unwrap();
        assert!(found.is_absolute());
        assert!(found.ends_with("gs"));
    }

    #[test]
    fn test_check_temp_root_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            temp_root: dir.path().join("nested").join("scratch"),
            ..PipelineConfig::default()
        };
        config.check_temp_root().unwrap();
        assert!(config.temp_root.is_dir());
    }

    #[test]
    fn test_check_temp_root_rejects_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = PipelineConfig {
            temp_root: file.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.check_temp_root(),
            Err(ConfigError::TempRoot { .. })
        ));
    }
}

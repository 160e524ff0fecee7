use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the upscaling pipeline. Every variant is fatal to a run.
#[derive(Debug, Error)]
pub enum UpscaleError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("GeoTIFF error in {path}: {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("{path} has no georeferencing (ModelPixelScale/ModelTiepoint or ModelTransformation)")]
    MissingGeoreference { path: PathBuf },

    #[error("{path}: {reason}")]
    UnsupportedRaster { path: PathBuf, reason: String },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no raster in {dir} matches covariate(s): {}", names.join(", "))]
    MissingCovariate { dir: PathBuf, names: Vec<String> },

    #[error("covariate '{name}' matches several rasters: {}", candidates.join(", "))]
    AmbiguousCovariate { name: String, candidates: Vec<String> },

    #[error("column '{column}' not found in {source_name}")]
    MissingColumn { column: String, source_name: String },

    #[error("column '{column}' in {source_name} has {len} rows, expected {expected}")]
    RaggedColumn { column: String, source_name: String, len: usize, expected: usize },

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("feature matrix of {values} values is not {rows} rows × {columns} columns")]
    ShapeMismatch { values: usize, rows: usize, columns: usize },

    #[error("cannot build prediction thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, UpscaleError>;

impl UpscaleError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn tiff(path: impl Into<PathBuf>, source: tiff::TiffError) -> Self {
        Self::Tiff { path: path.into(), source }
    }
}

//! Spatial upscaling of a trained regression model.
//!
//! Covariate rasters are flattened to a per-pixel table over an
//! area-of-interest mask, the model is evaluated on calibration and
//! validation tables, every pixel is predicted, and the predictions are
//! written back as a georeferenced GeoTIFF.

pub mod config;
pub mod covariates;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod geotiff;
pub mod model;
pub mod pipeline;
pub mod raster;
pub mod table;

pub use config::UpscaleConfig;
pub use error::{Result, UpscaleError};
pub use evaluate::{EvaluationTable, Metrics};
pub use model::{load_model, Predictor, TrainedModel};
pub use pipeline::{run, run_with_model, RunReport};
pub use raster::{GridSpec, Raster};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, UpscaleError};

/// Swiss CH1903+ / LV95.
pub const DEFAULT_EPSG: u16 = 2056;

/// Inputs, outputs and settings of one upscaling run.
/// Defaults reproduce the fixed relative layout of the reference workflow;
/// missing JSON fields fall back to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpscaleConfig {
    /// Serialized trained model (JSON).
    pub model: PathBuf,
    /// Calibration table; evaluated and reported alongside validation.
    pub calibration: Option<PathBuf>,
    /// Held-out validation table.
    pub validation: PathBuf,
    /// Area-of-interest mask (GeoTIFF, 1 = predict).
    pub mask: PathBuf,
    /// Directory holding one GeoTIFF per covariate.
    pub covariate_dir: PathBuf,
    /// Name of the observed response column in the tables.
    pub response: String,
    /// Prediction raster; overwritten on every run.
    pub output: PathBuf,
    pub report: Option<PathBuf>,
    pub evaluation_csv: Option<PathBuf>,
    /// EPSG code stamped on the output raster.
    pub epsg: u16,
    /// Prediction threads; None = all cores but one.
    pub threads: Option<usize>,
}

impl Default for UpscaleConfig {
    fn default() -> Self {
        Self {
            model: "data/model.json".into(),
            calibration: Some("data/calibration.csv".into()),
            validation: "data/validation.csv".into(),
            mask: "data/mask.tif".into(),
            covariate_dir: "data/covariates".into(),
            response: "response".into(),
            output: "output/prediction.tif".into(),
            report: Some("output/report.json".into()),
            evaluation_csv: Some("output/evaluation.csv".into()),
            epsg: DEFAULT_EPSG,
            threads: None,
        }
    }
}

impl UpscaleConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| UpscaleError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| UpscaleError::Json { path: path.to_path_buf(), source: e })
    }

    /// Worker threads for prediction: the configured count, or all
    /// available cores minus one. Never less than one.
    pub fn prediction_threads(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .saturating_sub(1)
        })
        .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, r#"{"response": "soc_stock", "threads": 2, "calibration": null}"#).unwrap();

        let cfg = UpscaleConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.response, "soc_stock");
        assert_eq!(cfg.prediction_threads(), 2);
        assert_eq!(cfg.calibration, None);
        assert_eq!(cfg.mask, PathBuf::from("data/mask.tif"));
        assert_eq!(cfg.epsg, DEFAULT_EPSG);
    }

    #[test]
    fn thread_count_is_at_least_one() {
        let cfg = UpscaleConfig { threads: Some(0), ..UpscaleConfig::default() };
        assert_eq!(cfg.prediction_threads(), 1);
        assert!(UpscaleConfig::default().prediction_threads() >= 1);
    }
}

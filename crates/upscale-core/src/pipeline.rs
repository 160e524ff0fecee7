//! Pipeline orchestrator: runs every stage once, in order.
//!
//!   load rasters → raster-to-table → evaluate (calibration, validation)
//!   → predict pixels → table-to-raster → write GeoTIFF (+ report).
//!
//! Each stage receives its inputs as owned values or borrows; nothing is
//! shared through global state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::UpscaleConfig;
use crate::covariates::{resolve_covariates, CovariateSource, CovariateStack};
use crate::dataset::read_csv;
use crate::error::{Result, UpscaleError};
use crate::evaluate::{evaluate, EvaluationTable, Metrics};
use crate::geotiff::{read_geotiff, write_geotiff};
use crate::model::{load_model, Predictor};
use crate::raster::Extent;
use crate::table::{count_in_mask, predict_table, CovariateTable, PredictionSummary};

/// Everything a run produced, besides the raster itself.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub calibration: Option<Metrics>,
    pub validation: Metrics,
    pub mask_cells: usize,
    pub predicted_cells: usize,
    pub prediction: Option<PredictionSummary>,
    pub covariates: Vec<CovariateSource>,
    pub extent: Extent,
    pub epsg: u16,
    pub output: PathBuf,
}

impl RunReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| UpscaleError::Json { path: path.to_path_buf(), source: e })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| UpscaleError::io(parent, e))?;
        }
        fs::write(path, json).map_err(|e| UpscaleError::io(path, e))
    }
}

/// Load the model named in `config` and run the pipeline with it.
pub fn run(config: &UpscaleConfig) -> Result<RunReport> {
    let model = load_model(&config.model)?;
    run_with_model(config, &model)
}

/// Run the pipeline with an already constructed model.
pub fn run_with_model<P: Predictor + ?Sized>(
    config: &UpscaleConfig,
    model: &P,
) -> Result<RunReport> {
    // Raster loading.
    let sources = resolve_covariates(&config.covariate_dir, model.covariates())?;
    let mask = read_geotiff(&config.mask)?;
    let stack = CovariateStack::load(&sources)?;
    let grid = stack.grid().copied().unwrap_or(mask.grid);
    if !mask.grid.is_aligned_with(&grid) {
        log::warn!("mask grid differs from the covariate grid; unmatched cells will be dropped");
    }
    log::info!(
        "loaded mask {}×{} and {} covariate layers",
        mask.grid.width,
        mask.grid.height,
        stack.layers.len()
    );

    // Raster to table.
    let mask_cells = count_in_mask(&mask);
    let table = CovariateTable::from_rasters(&mask, &stack);
    log::info!("{} of {} mask cells have complete covariates", table.len(), mask_cells);
    drop(stack);

    let threads = config.prediction_threads();
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    log::debug!("prediction pool: {threads} threads");

    // Model evaluation.
    let calibration = match &config.calibration {
        Some(path) => {
            let ds = read_csv(path)?;
            let table = pool.install(|| evaluate(model, &ds, &config.response))?;
            let m = table.metrics();
            log_metrics("calibration", &m);
            Some(m)
        }
        None => None,
    };
    let validation_ds = read_csv(&config.validation)?;
    let evaluation: EvaluationTable =
        pool.install(|| evaluate(model, &validation_ds, &config.response))?;
    let validation = evaluation.metrics();
    log_metrics("validation", &validation);
    if let Some(path) = &config.evaluation_csv {
        evaluation.write_csv(path)?;
    }

    // Spatial prediction.
    let predictions = pool.install(|| predict_table(model, table))?;
    log::info!("predicted {} pixels", predictions.len());

    // Table to raster.
    let out_grid = grid.with_epsg(config.epsg);
    let raster = predictions.to_raster(out_grid);
    write_geotiff(&config.output, &raster)?;
    log::info!("wrote {}", config.output.display());

    let report = RunReport {
        calibration,
        validation,
        mask_cells,
        predicted_cells: predictions.len(),
        prediction: predictions.summary(),
        covariates: sources.sources,
        extent: out_grid.extent(),
        epsg: config.epsg,
        output: config.output.clone(),
    };
    if let Some(path) = &config.report {
        report.write_json(path)?;
    }
    Ok(report)
}

fn log_metrics(split: &str, m: &Metrics) {
    log::info!(
        "{split}: n={} bias={:.2} rmse={:.4} r2={:.2}",
        m.n,
        m.bias,
        m.rmse,
        m.r_squared
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinearModel, Node, RandomForest, RegressionTree, TrainedModel};
    use crate::raster::{GridSpec, Raster};
    use approx::assert_relative_eq;

    const N: usize = 4;

    fn grid() -> GridSpec {
        GridSpec::new(N, N, 2_600_000.0, 1_200_000.0, 25.0, 25.0).with_epsg(2056)
    }

    /// Writes a 4×4 study area: a mask with the left half set, two covariate
    /// layers (one with a hole), and calibration/validation tables.
    fn fixture(dir: &Path) -> UpscaleConfig {
        let g = grid();
        let cov_dir = dir.join("covariates");

        let mut mask = Raster::new(g, 0.0);
        for r in 0..N {
            mask.set(r, 0, 1.0);
            mask.set(r, 1, 1.0);
        }
        write_geotiff(&dir.join("mask.tif"), &mask).unwrap();

        let dem = Raster { grid: g, data: (0..N * N).map(|i| 400.0 + i as f32).collect() };
        let mut slope = Raster::new(g, 2.0);
        slope.set(3, 1, f32::NAN);
        write_geotiff(&cov_dir.join("ch_dem_25m.tif"), &dem).unwrap();
        write_geotiff(&cov_dir.join("ch_slope_25m.tif"), &slope).unwrap();

        fs::write(dir.join("cal.csv"), "id,dem,slope,soc\n1,400,2,801\n2,410,2,821\n").unwrap();
        fs::write(dir.join("val.csv"), "id,dem,slope,soc\n1,405,2,812\n2,420,1,842\n").unwrap();

        UpscaleConfig {
            model: dir.join("model.json"),
            calibration: Some(dir.join("cal.csv")),
            validation: dir.join("val.csv"),
            mask: dir.join("mask.tif"),
            covariate_dir: cov_dir,
            response: "soc".into(),
            output: dir.join("out/prediction.tif"),
            report: Some(dir.join("out/report.json")),
            evaluation_csv: Some(dir.join("out/evaluation.csv")),
            epsg: 2056,
            threads: Some(2),
        }
    }

    fn linear() -> LinearModel {
        LinearModel {
            covariates: vec!["dem".into(), "slope".into()],
            intercept: 0.0,
            coefficients: vec![2.0, 0.0],
        }
    }

    #[test]
    fn end_to_end_run_writes_raster_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = fixture(dir.path());
        let report = run_with_model(&cfg, &linear()).unwrap();

        assert_eq!(report.mask_cells, 8);
        // One masked cell sits on the slope hole.
        assert_eq!(report.predicted_cells, 7);
        assert_eq!(report.validation.n, 2);
        // Observed 812, 842 vs predicted 810, 840.
        assert_eq!(report.validation.bias, 2.0);
        assert_relative_eq!(report.validation.rmse, 2f64.sqrt());
        assert_eq!(report.validation.r_squared, 1.0);
        assert_eq!(report.calibration.unwrap().bias, 1.0);

        let out = read_geotiff(&cfg.output).unwrap();
        assert_eq!(out.grid, grid());
        assert_eq!(out.valid_count(), 7);
        assert_eq!(out.get(0, 0), 800.0);
        assert_eq!(out.get(2, 1), 2.0 * 409.0);
        assert!(out.get(3, 1).is_nan());
        assert!(out.get(0, 2).is_nan());

        assert!(cfg.report.as_ref().unwrap().exists());
        let back = EvaluationTable::read_csv(cfg.evaluation_csv.as_ref().unwrap()).unwrap();
        assert_eq!(back.predicted, vec![810.0, 840.0]);
    }

    #[test]
    fn run_loads_model_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = fixture(dir.path());
        let forest = TrainedModel::RandomForest(RandomForest {
            covariates: vec!["slope".into(), "dem".into()],
            trees: vec![RegressionTree {
                nodes: vec![
                    Node::Split { feature: 1, threshold: 405.5, left: 1, right: 2, default_left: false },
                    Node::Leaf { value: 1.0 },
                    Node::Leaf { value: 2.0 },
                ],
            }],
        });
        fs::write(&cfg.model, serde_json::to_string(&forest).unwrap()).unwrap();

        let report = run(&cfg).unwrap();
        assert_eq!(report.covariates[0].name, "slope");
        assert!(report.covariates[0].path.ends_with("ch_slope_25m.tif"));
        let s = report.prediction.unwrap();
        assert_eq!((s.min, s.max), (1.0, 2.0));
    }

    #[test]
    fn missing_covariate_aborts_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = fixture(dir.path());
        let model = LinearModel {
            covariates: vec!["dem".into(), "twi".into()],
            intercept: 0.0,
            coefficients: vec![1.0, 1.0],
        };
        let err = run_with_model(&cfg, &model).unwrap_err();
        assert!(matches!(err, UpscaleError::MissingCovariate { .. }));
        assert!(!cfg.output.exists());
    }

    #[test]
    fn empty_mask_writes_all_nodata_raster() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = UpscaleConfig { calibration: None, report: None, ..fixture(dir.path()) };
        write_geotiff(&cfg.mask, &Raster::new(grid(), 0.0)).unwrap();

        let report = run_with_model(&cfg, &linear()).unwrap();
        assert_eq!(report.mask_cells, 0);
        assert_eq!(report.predicted_cells, 0);
        assert!(report.prediction.is_none());
        assert!(report.calibration.is_none());
        assert_eq!(read_geotiff(&cfg.output).unwrap().valid_count(), 0);
    }
}

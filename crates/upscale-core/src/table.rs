//! Raster ↔ table conversion and per-pixel prediction.
//!
//! Mask cells equal to 1 become table rows keyed by their cell-centre
//! coordinate; predictions are scattered back onto a grid by coordinate.

use serde::Serialize;

use crate::covariates::CovariateStack;
use crate::error::Result;
use crate::model::{Features, Predictor};
use crate::raster::{GridSpec, Raster};

/// Value marking a mask cell as part of the area of interest.
pub const MASK_IN: f32 = 1.0;

/// Number of mask cells flagged as area of interest.
pub fn count_in_mask(mask: &Raster) -> usize {
    mask.data.iter().filter(|&&v| v == MASK_IN).count()
}

/// One row per area-of-interest pixel: coordinate plus one value per
/// covariate. Never holds a missing covariate value.
#[derive(Debug, Clone, Default)]
pub struct CovariateTable {
    pub names: Vec<String>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Row-major covariate values, `len() × names.len()`.
    pub values: Vec<f64>,
}

impl CovariateTable {
    /// Flatten `mask` to its cells equal to 1, sample every covariate layer at
    /// each cell centre and drop rows where any layer has no data there.
    pub fn from_rasters(mask: &Raster, stack: &CovariateStack) -> Self {
        let n_cols = stack.layers.len();
        let mut table = CovariateTable { names: stack.names.clone(), ..Default::default() };
        let mut row = Vec::with_capacity(n_cols);
        let mut dropped = 0usize;

        for r in 0..mask.grid.height {
            for c in 0..mask.grid.width {
                if mask.get(r, c) != MASK_IN {
                    continue;
                }
                let (x, y) = mask.grid.cell_center(r, c);
                row.clear();
                row.extend(stack.layers.iter().map_while(|layer| layer.sample(x, y)));
                if row.len() < n_cols {
                    dropped += 1;
                    continue;
                }
                table.x.push(x);
                table.y.push(y);
                table.values.extend(row.iter().map(|&v| f64::from(v)));
            }
        }

        if dropped > 0 {
            log::debug!("dropped {dropped} mask cells with missing covariate values");
        }
        table
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let n = self.names.len();
        &self.values[i * n..(i + 1) * n]
    }

    pub fn features(&self) -> Result<Features<'_>> {
        Features::new(&self.names, &self.values, self.len())
    }
}

/// A covariate table with one prediction per row.
#[derive(Debug, Clone)]
pub struct PredictionTable {
    pub covariates: CovariateTable,
    pub predictions: Vec<f64>,
}

/// Range and mean of the predicted values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Apply `model` to every pixel row. Order preserving.
pub fn predict_table<P: Predictor + ?Sized>(
    model: &P,
    covariates: CovariateTable,
) -> Result<PredictionTable> {
    let predictions = model.predict(&covariates.features()?)?;
    Ok(PredictionTable { covariates, predictions })
}

impl PredictionTable {
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    /// Scatter `(x, y, prediction)` rows onto `grid`. Cells without a row stay
    /// NaN; rows falling outside the grid are skipped.
    pub fn to_raster(&self, grid: GridSpec) -> Raster {
        let mut raster = Raster::empty(grid);
        let mut outside = 0usize;
        for ((&x, &y), &v) in self.covariates.x.iter().zip(&self.covariates.y).zip(&self.predictions) {
            match grid.cell_at(x, y) {
                Some((r, c)) => raster.set(r, c, v as f32),
                None => outside += 1,
            }
        }
        if outside > 0 {
            log::warn!("{outside} predicted pixels fall outside the output grid");
        }
        raster
    }

    /// None when no finite prediction exists.
    pub fn summary(&self) -> Option<PredictionSummary> {
        let finite: Vec<f64> = self.predictions.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        Some(PredictionSummary {
            count: finite.len(),
            min: finite.iter().copied().fold(f64::INFINITY, f64::min),
            max: finite.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean: finite.iter().sum::<f64>() / finite.len() as f64,
        })
    }
}

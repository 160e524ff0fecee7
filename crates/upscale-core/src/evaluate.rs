//! Accuracy of a model against observed values.
//!
//! Metrics follow the reference workflow exactly: bias and R² are rounded to
//! two decimals; the "RMSE" is the square root of the *mean signed error*
//! (the per-row error is not squared). Degenerate input yields NaN, never an
//! error.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{Result, UpscaleError};
use crate::model::{Features, Predictor};

/// Observed and predicted response per evaluation row, in dataset order.
#[derive(Debug, Clone, Default)]
pub struct EvaluationTable {
    pub observed: Vec<f64>,
    pub predicted: Vec<f64>,
}

/// Scalar accuracy metrics of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub n: usize,
    pub bias: f64,
    pub rmse: f64,
    pub r_squared: f64,
}

#[derive(Serialize, Deserialize)]
struct EvaluationRow {
    observed: f64,
    predicted: f64,
}

/// Predict every row of `dataset` and pair it with the `response` column.
pub fn evaluate<P: Predictor + ?Sized>(
    model: &P,
    dataset: &Dataset,
    response: &str,
) -> Result<EvaluationTable> {
    let observed = dataset.column(response)?.to_vec();
    let names = model.covariates();
    let matrix = dataset.select(names)?;
    let predicted = model.predict(&Features::new(names, &matrix, dataset.n_rows())?)?;
    Ok(EvaluationTable { observed, predicted })
}

impl EvaluationTable {
    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            n: self.len(),
            bias: bias(&self.observed, &self.predicted),
            rmse: rmse(&self.observed, &self.predicted),
            r_squared: r_squared(&self.observed, &self.predicted),
        }
    }

    /// Write `observed,predicted` rows; parent directories are created.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| UpscaleError::io(parent, e))?;
        }
        let csv_err = |e: csv::Error| UpscaleError::Csv { path: path.to_path_buf(), source: e };
        let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
        for (&observed, &predicted) in self.observed.iter().zip(&self.predicted) {
            writer.serialize(EvaluationRow { observed, predicted }).map_err(csv_err)?;
        }
        writer.flush().map_err(|e| UpscaleError::io(path, e))
    }

    /// Read a table written by [`write_csv`](Self::write_csv).
    pub fn read_csv(path: &Path) -> Result<Self> {
        let csv_err = |e: csv::Error| UpscaleError::Csv { path: path.to_path_buf(), source: e };
        let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
        let mut table = Self::default();
        for row in reader.deserialize::<EvaluationRow>() {
            let row = row.map_err(csv_err)?;
            table.observed.push(row.observed);
            table.predicted.push(row.predicted);
        }
        Ok(table)
    }
}

// ── Metric helpers ────────────────────────────────────────────────────────────

/// Round to two decimals, ties to even (IEC 60559), so 0.125 → 0.12.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

fn mean(v: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = v.len();
    v.sum::<f64>() / n as f64
}

fn errors<'a>(observed: &'a [f64], predicted: &'a [f64]) -> impl ExactSizeIterator<Item = f64> + 'a {
    observed.iter().zip(predicted).map(|(o, p)| o - p)
}

/// round(mean(observed − predicted), 2)
pub fn bias(observed: &[f64], predicted: &[f64]) -> f64 {
    round2(mean(errors(observed, predicted)))
}

/// sqrt(mean(observed − predicted)); NaN when the mean error is negative.
pub fn rmse(observed: &[f64], predicted: &[f64]) -> f64 {
    mean(errors(observed, predicted)).sqrt()
}

/// Pearson correlation; NaN for fewer than two rows or zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    let (x, y) = (&x[..n], &y[..n]);
    let mx = mean(x.iter().copied());
    let my = mean(y.iter().copied());
    let num: f64 = x.iter().zip(y).map(|(&a, &b)| (a - mx) * (b - my)).sum();
    let vx: f64 = x.iter().map(|&a| (a - mx).powi(2)).sum();
    let vy: f64 = y.iter().map(|&b| (b - my).powi(2)).sum();
    if vx == 0.0 || vy == 0.0 {
        return f64::NAN;
    }
    (num / (vx * vy).sqrt()).clamp(-1.0, 1.0)
}

/// round(pearson(observed, predicted)², 2)
pub fn r_squared(observed: &[f64], predicted: &[f64]) -> f64 {
    round2(pearson(observed, predicted).powi(2))
}

//! Trained models and the prediction contract the pipeline depends on.
//!
//! The pipeline only ever talks to [`Predictor`]; concrete model formats are
//! deserialized from JSON into [`TrainedModel`].

pub mod forest;
pub mod linear;

use std::fs;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UpscaleError};
pub use forest::{Node, RandomForest, RegressionTree};
pub use linear::LinearModel;

// ── Feature matrix ────────────────────────────────────────────────────────────

/// Borrowed row-major feature matrix with named columns.
#[derive(Debug, Clone, Copy)]
pub struct Features<'a> {
    names: &'a [String],
    values: &'a [f64],
    n_rows: usize,
}

impl<'a> Features<'a> {
    /// `values` must hold exactly `n_rows × names.len()` values. The row
    /// count is explicit so a matrix without columns still has rows.
    pub fn new(names: &'a [String], values: &'a [f64], n_rows: usize) -> Result<Self> {
        let n_cols = names.len();
        if values.len() != n_rows * n_cols {
            return Err(UpscaleError::ShapeMismatch { values: values.len(), rows: n_rows, columns: n_cols });
        }
        Ok(Self { names, values, n_rows })
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn names(&self) -> &'a [String] {
        self.names
    }

    #[inline]
    pub fn row(&self, i: usize) -> &'a [f64] {
        let n = self.names.len();
        &self.values[i * n..(i + 1) * n]
    }

    /// Position of each `wanted` column in this matrix.
    pub fn column_indices(&self, wanted: &[String]) -> Result<Vec<usize>> {
        wanted
            .iter()
            .map(|w| {
                self.names.iter().position(|n| n == w).ok_or_else(|| UpscaleError::MissingColumn {
                    column: w.clone(),
                    source_name: "feature matrix".into(),
                })
            })
            .collect()
    }
}

// ── Prediction contract ───────────────────────────────────────────────────────

/// A fitted regression model.
pub trait Predictor: Send + Sync {
    /// Covariate names the model expects, in the order `predict_row` reads them.
    fn covariates(&self) -> &[String];

    /// Predict one row; `row` holds one value per covariate in
    /// [`covariates`](Predictor::covariates) order.
    fn predict_row(&self, row: &[f64]) -> f64;

    /// Predict every row of `features`, selecting the model's columns by name.
    /// Returns exactly one value per row, in row order. Runs on the current
    /// rayon pool.
    fn predict(&self, features: &Features<'_>) -> Result<Vec<f64>> {
        let columns = features.column_indices(self.covariates())?;
        let preds = (0..features.n_rows())
            .into_par_iter()
            .map_init(
                || Vec::with_capacity(columns.len()),
                |buf: &mut Vec<f64>, i| {
                    let row = features.row(i);
                    buf.clear();
                    buf.extend(columns.iter().map(|&c| row[c]));
                    self.predict_row(buf)
                },
            )
            .collect();
        Ok(preds)
    }
}

// ── Serialized models ─────────────────────────────────────────────────────────

/// Every model format the pipeline can load, tagged by `"kind"` in JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedModel {
    RandomForest(RandomForest),
    Linear(LinearModel),
}

impl TrainedModel {
    /// Structural checks run once after loading.
    pub fn validate(&self) -> Result<()> {
        match self {
            TrainedModel::RandomForest(m) => m.validate(),
            TrainedModel::Linear(m) => m.validate(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TrainedModel::RandomForest(_) => "random_forest",
            TrainedModel::Linear(_) => "linear",
        }
    }
}

impl Predictor for TrainedModel {
    fn covariates(&self) -> &[String] {
        match self {
            TrainedModel::RandomForest(m) => m.covariates(),
            TrainedModel::Linear(m) => m.covariates(),
        }
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        match self {
            TrainedModel::RandomForest(m) => m.predict_row(row),
            TrainedModel::Linear(m) => m.predict_row(row),
        }
    }
}

/// Load and validate a model from a JSON file.
pub fn load_model(path: &Path) -> Result<TrainedModel> {
    let text = fs::read_to_string(path).map_err(|e| UpscaleError::io(path, e))?;
    let model: TrainedModel = serde_json::from_str(&text)
        .map_err(|e| UpscaleError::Json { path: path.to_path_buf(), source: e })?;
    model.validate()?;
    log::info!(
        "loaded {} model from {} ({} covariates)",
        model.kind(),
        path.display(),
        model.covariates().len()
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn features_rejects_ragged_matrix() {
        let cols = names(&["a", "b"]);
        assert!(Features::new(&cols, &[1.0, 2.0, 3.0], 2).is_err());
        assert!(Features::new(&cols, &[1.0, 2.0, 3.0, 4.0], 1).is_err());
        let f = Features::new(&cols, &[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert_eq!(f.n_rows(), 2);
        assert_eq!(f.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn column_free_matrix_keeps_its_rows() {
        let model = LinearModel { covariates: vec![], intercept: 3.5, coefficients: vec![] };
        model.validate().unwrap();
        let f = Features::new(&[], &[], 5).unwrap();
        assert_eq!(f.n_rows(), 5);
        assert_eq!(model.predict(&f).unwrap(), vec![3.5; 5]);
    }

    #[test]
    fn predict_selects_columns_by_name() {
        let model = LinearModel {
            covariates: names(&["b", "a"]),
            intercept: 0.0,
            coefficients: vec![10.0, 1.0],
        };
        // Extra column "c" is ignored; columns are reordered to the model's order.
        let cols = names(&["a", "c", "b"]);
        let values = [1.0, 99.0, 2.0, 3.0, 99.0, 4.0];
        let f = Features::new(&cols, &values, 2).unwrap();
        assert_eq!(model.predict(&f).unwrap(), vec![21.0, 43.0]);
    }

    #[test]
    fn predict_reports_missing_column() {
        let model = LinearModel {
            covariates: names(&["dem"]),
            intercept: 0.0,
            coefficients: vec![1.0],
        };
        let cols = names(&["slope"]);
        let f = Features::new(&cols, &[1.0], 1).unwrap();
        assert!(matches!(
            model.predict(&f),
            Err(UpscaleError::MissingColumn { ref column, .. }) if column == "dem"
        ));
    }

    #[test]
    fn predict_preserves_row_order_on_large_input() {
        let model = LinearModel {
            covariates: names(&["x"]),
            intercept: 0.5,
            coefficients: vec![2.0],
        };
        let cols = names(&["x"]);
        let values: Vec<f64> = (0..10_000).map(f64::from).collect();
        let f = Features::new(&cols, &values, values.len()).unwrap();
        let preds = model.predict(&f).unwrap();
        assert_eq!(preds.len(), values.len());
        assert!(preds.iter().zip(&values).all(|(p, v)| *p == 2.0 * v + 0.5));
    }

    #[test]
    fn model_json_is_tagged_by_kind() {
        let json = r#"{
            "kind": "linear",
            "covariates": ["dem", "slope"],
            "intercept": 1.0,
            "coefficients": [0.5, -2.0]
        }"#;
        let model: TrainedModel = serde_json::from_str(json).unwrap();
        model.validate().unwrap();
        assert_eq!(model.kind(), "linear");
        assert_eq!(model.predict_row(&[2.0, 1.0]), 0.0);
    }

    #[test]
    fn load_model_rejects_invalid_structure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(
            &path,
            r#"{"kind": "linear", "covariates": ["a", "b"], "intercept": 0.0, "coefficients": [1.0]}"#,
        )
        .unwrap();
        assert!(matches!(load_model(&path), Err(UpscaleError::InvalidModel(_))));

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_model(&path), Err(UpscaleError::Json { .. })));
    }
}

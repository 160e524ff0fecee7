//! Tabular calibration / validation data read from CSV.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, UpscaleError};

/// Column-oriented numeric table. Cells that are empty, `NA`, `NaN` or not
/// numeric are stored as NaN.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub path: PathBuf,
    pub columns: Vec<String>,
    data: Vec<Vec<f64>>,
}

fn parse_cell(cell: &str) -> f64 {
    match cell {
        "" | "NA" | "na" | "N/A" => f64::NAN,
        s => s.parse().unwrap_or(f64::NAN),
    }
}

impl Dataset {
    /// Build a dataset from named columns, which must all have the same length.
    pub fn from_columns(path: impl Into<PathBuf>, columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let path = path.into();
        let expected = columns.first().map_or(0, |(_, v)| v.len());
        if let Some((name, v)) = columns.iter().find(|(_, v)| v.len() != expected) {
            return Err(UpscaleError::RaggedColumn {
                column: name.clone(),
                source_name: path.display().to_string(),
                len: v.len(),
                expected,
            });
        }
        let (columns, data) = columns.into_iter().unzip();
        Ok(Self { path, columns, data })
    }

    pub fn n_rows(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.data[i].as_slice())
            .ok_or_else(|| UpscaleError::MissingColumn {
                column: name.to_owned(),
                source_name: self.path.display().to_string(),
            })
    }

    /// Row-major matrix of the named columns, in `names` order.
    pub fn select(&self, names: &[String]) -> Result<Vec<f64>> {
        let cols = names.iter().map(|n| self.column(n)).collect::<Result<Vec<_>>>()?;
        let n_rows = self.n_rows();
        let mut out = Vec::with_capacity(n_rows * cols.len());
        for r in 0..n_rows {
            out.extend(cols.iter().map(|c| c[r]));
        }
        Ok(out)
    }
}

/// Read a CSV file with a header row.
pub fn read_csv(path: &Path) -> Result<Dataset> {
    let csv_err = |e: csv::Error| UpscaleError::Csv { path: path.to_path_buf(), source: e };

    let file = fs::File::open(path).map_err(|e| UpscaleError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let columns: Vec<String> =
        reader.headers().map_err(csv_err)?.iter().map(str::to_owned).collect();
    let mut data = vec![Vec::new(); columns.len()];
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        for (col, cell) in data.iter_mut().zip(record.iter()) {
            col.push(parse_cell(cell));
        }
    }

    let ds = Dataset { path: path.to_path_buf(), columns, data };
    log::debug!("read {} rows × {} columns from {}", ds.n_rows(), ds.columns.len(), path.display());
    Ok(ds)
}

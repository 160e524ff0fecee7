//! Covariate discovery and loading.
//!
//! The model names the covariates it expects; the covariate directory holds
//! one GeoTIFF per layer whose file name contains the covariate name. The
//! join between the two is resolved once, up front, into an explicit
//! name → path mapping.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Result, UpscaleError};
use crate::geotiff::read_geotiff;
use crate::raster::{GridSpec, Raster};

/// One resolved covariate: model name and the raster file that provides it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CovariateSource {
    pub name: String,
    pub path: PathBuf,
}

/// Explicit mapping from every expected covariate to its raster file,
/// in the model's covariate order.
#[derive(Debug, Clone, Serialize)]
pub struct CovariateSources {
    pub sources: Vec<CovariateSource>,
}

fn is_geotiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

/// List the GeoTIFF files directly inside `dir`, sorted by path.
pub fn list_rasters(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| UpscaleError::io(dir, e))? {
        let path = entry.map_err(|e| UpscaleError::io(dir, e))?.path();
        if path.is_file() && is_geotiff(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Resolve `expected` covariate names against the rasters in `dir`.
pub fn resolve_covariates(dir: &Path, expected: &[String]) -> Result<CovariateSources> {
    let available = list_rasters(dir)?;
    resolve_against(dir, &available, expected)
}

/// Name-based join between expected covariates and candidate files.
///
/// A file stem equal to the name wins. Otherwise exactly one stem must
/// contain the name; several candidates are an ambiguity error. Every
/// unmatched name is reported together.
pub fn resolve_against(
    dir: &Path,
    available: &[PathBuf],
    expected: &[String],
) -> Result<CovariateSources> {
    let stems: Vec<(&PathBuf, String)> = available
        .iter()
        .filter_map(|p| {
            let stem = p.file_stem()?.to_str()?.to_owned();
            Some((p, stem))
        })
        .collect();

    let mut sources = Vec::with_capacity(expected.len());
    let mut missing = Vec::new();

    for name in expected {
        if let Some((path, _)) = stems.iter().find(|(_, stem)| stem == name) {
            sources.push(CovariateSource { name: name.clone(), path: (*path).clone() });
            continue;
        }
        let candidates: Vec<&PathBuf> = stems
            .iter()
            .filter(|(_, stem)| stem.contains(name.as_str()))
            .map(|(p, _)| *p)
            .collect();
        match candidates.as_slice() {
            [] => missing.push(name.clone()),
            [path] => sources.push(CovariateSource { name: name.clone(), path: (*path).clone() }),
            _ => {
                return Err(UpscaleError::AmbiguousCovariate {
                    name: name.clone(),
                    candidates: candidates.iter().map(|p| p.display().to_string()).collect(),
                })
            }
        }
    }

    if !missing.is_empty() {
        return Err(UpscaleError::MissingCovariate { dir: dir.to_path_buf(), names: missing });
    }
    Ok(CovariateSources { sources })
}

/// Covariate layers in model order.
#[derive(Debug, Clone)]
pub struct CovariateStack {
    pub names: Vec<String>,
    pub layers: Vec<Raster>,
}

impl CovariateStack {
    /// Read every resolved layer from disk.
    pub fn load(sources: &CovariateSources) -> Result<Self> {
        let mut names = Vec::with_capacity(sources.sources.len());
        let mut layers = Vec::with_capacity(sources.sources.len());
        for src in &sources.sources {
            log::debug!("reading covariate {} from {}", src.name, src.path.display());
            layers.push(read_geotiff(&src.path)?);
            names.push(src.name.clone());
        }
        let stack = Self { names, layers };
        stack.warn_misaligned();
        Ok(stack)
    }

    /// Grid of the first layer; the reference extent for the output raster.
    pub fn grid(&self) -> Option<&GridSpec> {
        self.layers.first().map(|l| &l.grid)
    }

    /// Names of layers whose grid differs from `reference`.
    pub fn misaligned_with(&self, reference: &GridSpec) -> Vec<&str> {
        self.names
            .iter()
            .zip(&self.layers)
            .filter(|(_, layer)| !layer.grid.is_aligned_with(reference))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn warn_misaligned(&self) {
        if let Some(reference) = self.grid() {
            let off = self.misaligned_with(reference);
            if !off.is_empty() {
                log::warn!(
                    "covariate grids differ from '{}': {}",
                    self.names[0],
                    off.join(", ")
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geotiff::write_geotiff;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn paths(v: &[&str]) -> Vec<PathBuf> {
        v.iter().map(|s| PathBuf::from(format!("cov/{s}"))).collect()
    }

    #[test]
    fn resolves_substring_matches_in_model_order() {
        let files = paths(&["ch_dem_25m.tif", "ch_slope_25m.tif", "landcover.tif"]);
        let out = resolve_against(Path::new("cov"), &files, &names(&["slope", "dem"])).unwrap();
        assert_eq!(out.sources.len(), 2);
        assert_eq!(out.sources[0].name, "slope");
        assert_eq!(out.sources[0].path, PathBuf::from("cov/ch_slope_25m.tif"));
        assert_eq!(out.sources[1].path, PathBuf::from("cov/ch_dem_25m.tif"));
    }

    #[test]
    fn exact_stem_beats_substring() {
        let files = paths(&["ndvi.tif", "ndvi_sd.tif"]);
        let out = resolve_against(Path::new("cov"), &files, &names(&["ndvi"])).unwrap();
        assert_eq!(out.sources[0].path, PathBuf::from("cov/ndvi.tif"));
    }

    #[test]
    fn several_substring_candidates_are_ambiguous() {
        let files = paths(&["ndvi_mean.tif", "ndvi_sd.tif"]);
        let err = resolve_against(Path::new("cov"), &files, &names(&["ndvi"])).unwrap_err();
        assert!(matches!(err, UpscaleError::AmbiguousCovariate { ref name, .. } if name == "ndvi"));
    }

    #[test]
    fn every_missing_covariate_is_reported() {
        let files = paths(&["dem.tif"]);
        let err =
            resolve_against(Path::new("cov"), &files, &names(&["dem", "twi", "precip"])).unwrap_err();
        match err {
            UpscaleError::MissingCovariate { names, .. } => assert_eq!(names, ["twi", "precip"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolve_covariates_lists_only_geotiffs() {
        let dir = tempfile::tempdir().unwrap();
        let grid = GridSpec::new(2, 2, 0.0, 2.0, 1.0, 1.0);
        write_geotiff(&dir.path().join("dem.tif"), &Raster::new(grid, 1.0)).unwrap();
        fs::write(dir.path().join("dem.tif.aux.xml"), "<x/>").unwrap();
        fs::write(dir.path().join("slope_notes.txt"), "").unwrap();

        let err = resolve_covariates(dir.path(), &names(&["slope"])).unwrap_err();
        assert!(matches!(err, UpscaleError::MissingCovariate { .. }));

        let ok = resolve_covariates(dir.path(), &names(&["dem"])).unwrap();
        let stack = CovariateStack::load(&ok).unwrap();
        assert_eq!(stack.names, ["dem"]);
        assert_eq!(stack.grid(), Some(&grid));
    }

    #[test]
    fn misaligned_layers_are_listed() {
        let a = GridSpec::new(2, 2, 0.0, 2.0, 1.0, 1.0);
        let b = GridSpec::new(2, 2, 0.5, 2.0, 1.0, 1.0);
        let stack = CovariateStack {
            names: names(&["a", "b"]),
            layers: vec![Raster::new(a, 0.0), Raster::new(b, 0.0)],
        };
        assert_eq!(stack.misaligned_with(&a), ["b"]);
    }
}

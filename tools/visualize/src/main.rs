//! Diagnostic visualizer: renders PNG previews of an upscaling run.
//!
//!   prediction.png  prediction raster on a colour ramp, nodata transparent
//!   scatter.png     observed vs predicted with the 1:1 line

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use upscale_core::geotiff::read_geotiff;
use upscale_core::{EvaluationTable, Raster};

const SCATTER_SIZE: u32 = 512;
const SCATTER_MARGIN: u32 = 24;

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Render PNG previews of an upscaling run")]
struct Args {
    /// Prediction GeoTIFF
    #[arg(long, default_value = "output/prediction.tif")]
    prediction: PathBuf,

    /// Evaluation CSV (observed,predicted)
    #[arg(long, default_value = "output/evaluation.csv")]
    evaluation: PathBuf,

    /// Output directory for PNGs (created if absent)
    #[arg(short, long, default_value = "output/debug")]
    output: PathBuf,
}

// ── Colour helpers ────────────────────────────────────────────────────────────

/// Dark blue → teal → yellow, sampled at t ∈ [0, 1].
const RAMP: [[f32; 3]; 4] = [
    [68.0, 1.0, 84.0],
    [49.0, 104.0, 142.0],
    [53.0, 183.0, 121.0],
    [253.0, 231.0, 37.0],
];

fn ramp(t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0) * (RAMP.len() - 1) as f32;
    let i = (t.floor() as usize).min(RAMP.len() - 2);
    let f = t - i as f32;
    let (a, b) = (RAMP[i], RAMP[i + 1]);
    [0, 1, 2].map(|k| (a[k] + (b[k] - a[k]) * f).round() as u8)
}

/// Finite min/max of the raster; None when every cell is nodata.
fn value_range(raster: &Raster) -> Option<(f32, f32)> {
    raster
        .data
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

fn render_prediction(raster: &Raster) -> RgbaImage {
    let (w, h) = (raster.grid.width, raster.grid.height);
    let mut img = RgbaImage::new(w as u32, h as u32);
    let Some((lo, hi)) = value_range(raster) else {
        return img;
    };
    let span = if hi > lo { hi - lo } else { 1.0 };
    for r in 0..h {
        for c in 0..w {
            let v = raster.get(r, c);
            let px = if v.is_finite() {
                let [rv, gv, bv] = ramp((v - lo) / span);
                Rgba([rv, gv, bv, 255])
            } else {
                Rgba([0, 0, 0, 0])
            };
            img.put_pixel(c as u32, r as u32, px);
        }
    }
    img
}

fn render_scatter(table: &EvaluationTable) -> RgbImage {
    let mut img = RgbImage::from_pixel(SCATTER_SIZE, SCATTER_SIZE, Rgb([255, 255, 255]));
    let pairs: Vec<(f64, f64)> = table
        .observed
        .iter()
        .zip(&table.predicted)
        .map(|(&o, &p)| (o, p))
        .filter(|(o, p)| o.is_finite() && p.is_finite())
        .collect();
    if pairs.is_empty() {
        return img;
    }

    // Shared axis range so the 1:1 line is the diagonal.
    let (lo, hi) = pairs
        .iter()
        .flat_map(|&(o, p)| [o, p])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let span = if hi > lo { hi - lo } else { 1.0 };
    let plot = (SCATTER_SIZE - 2 * SCATTER_MARGIN) as f64;
    let to_px = |v: f64| SCATTER_MARGIN as f64 + (v - lo) / span * plot;

    for i in 0..=(plot as u32) {
        let x = SCATTER_MARGIN + i;
        let y = SCATTER_SIZE - 1 - SCATTER_MARGIN - i;
        img.put_pixel(x, y, Rgb([160, 160, 160]));
    }

    for (o, p) in pairs {
        let cx = to_px(o).round() as i64;
        let cy = (SCATTER_SIZE - 1) as i64 - to_px(p).round() as i64;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (x, y) = (cx + dx, cy + dy);
                if (0..SCATTER_SIZE as i64).contains(&x) && (0..SCATTER_SIZE as i64).contains(&y) {
                    img.put_pixel(x as u32, y as u32, Rgb([31, 119, 180]));
                }
            }
        }
    }
    img
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;
    let mut written = 0usize;

    if args.prediction.exists() {
        let raster = read_geotiff(&args.prediction)?;
        match value_range(&raster) {
            Some((lo, hi)) => log::info!("prediction range {lo:.3} … {hi:.3}"),
            None => log::warn!("{} holds no data", args.prediction.display()),
        }
        let path = args.output.join("prediction.png");
        render_prediction(&raster)
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        eprintln!("[visualize] Wrote {}", path.display());
        written += 1;
    } else {
        log::warn!("{} not found, skipping prediction preview", args.prediction.display());
    }

    if args.evaluation.exists() {
        let table = EvaluationTable::read_csv(&args.evaluation)?;
        let path = args.output.join("scatter.png");
        render_scatter(&table)
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        eprintln!("[visualize] Wrote {} ({} points)", path.display(), table.len());
        written += 1;
    } else {
        log::warn!("{} not found, skipping scatter plot", args.evaluation.display());
    }

    if written == 0 {
        bail!("nothing to render");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use upscale_core::GridSpec;

    #[test]
    fn ramp_endpoints() {
        assert_eq!(ramp(0.0), [68, 1, 84]);
        assert_eq!(ramp(1.0), [253, 231, 37]);
        assert_eq!(ramp(-3.0), ramp(0.0));
    }

    #[test]
    fn nodata_pixels_are_transparent() {
        let grid = GridSpec::new(2, 1, 0.0, 0.0, 1.0, 1.0);
        let raster = Raster { grid, data: vec![f32::NAN, 5.0] };
        let img = render_prediction(&raster);
        assert_eq!(img.get_pixel(0, 0)[3], 0);
        assert_eq!(img.get_pixel(1, 0)[3], 255);
    }

    #[test]
    fn scatter_marks_points_on_the_diagonal() {
        let table = EvaluationTable { observed: vec![0.0, 10.0], predicted: vec![0.0, 10.0] };
        let img = render_scatter(&table);
        let lo = SCATTER_MARGIN;
        let hi = SCATTER_SIZE - SCATTER_MARGIN;
        assert_eq!(*img.get_pixel(lo, SCATTER_SIZE - 1 - lo), Rgb([31, 119, 180]));
        assert_eq!(*img.get_pixel(hi, SCATTER_SIZE - 1 - hi), Rgb([31, 119, 180]));
        assert_eq!(*img.get_pixel(SCATTER_SIZE / 2, 2), Rgb([255, 255, 255]));
    }
}

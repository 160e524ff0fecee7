/// Upscaling driver: evaluates a trained model on calibration / validation
/// tables and predicts it over every area-of-interest pixel of the
/// covariate rasters, writing a GeoTIFF.
///
/// Settings come from an optional JSON config; command-line flags override
/// individual fields.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use upscale_core::{run, Metrics, RunReport, UpscaleConfig};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "upscale",
    about = "Predict a trained regression model over covariate rasters and write a GeoTIFF"
)]
struct Args {
    /// JSON config file (fields not given fall back to defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serialized model (JSON)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Calibration CSV
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Skip calibration evaluation
    #[arg(long, conflicts_with = "calibration")]
    no_calibration: bool,

    /// Validation CSV
    #[arg(long)]
    validation: Option<PathBuf>,

    /// Area-of-interest mask GeoTIFF (1 = predict)
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Directory of covariate GeoTIFFs
    #[arg(long)]
    covariates: Option<PathBuf>,

    /// Response column name in the CSV tables
    #[arg(long)]
    response: Option<String>,

    /// Output prediction GeoTIFF (overwritten)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON run report
    #[arg(long)]
    report: Option<PathBuf>,

    /// Observed/predicted CSV for the validation table
    #[arg(long)]
    evaluation_csv: Option<PathBuf>,

    /// EPSG code written to the output raster
    #[arg(long)]
    epsg: Option<u16>,

    /// Prediction threads (default: all cores but one)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Print the effective config as JSON and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn into_config(self) -> Result<UpscaleConfig> {
        let mut cfg = match &self.config {
            Some(path) => UpscaleConfig::from_json_file(path)
                .with_context(|| format!("Cannot load config {}", path.display()))?,
            None => UpscaleConfig::default(),
        };
        if let Some(v) = self.model {
            cfg.model = v;
        }
        if self.no_calibration {
            cfg.calibration = None;
        } else if let Some(v) = self.calibration {
            cfg.calibration = Some(v);
        }
        if let Some(v) = self.validation {
            cfg.validation = v;
        }
        if let Some(v) = self.mask {
            cfg.mask = v;
        }
        if let Some(v) = self.covariates {
            cfg.covariate_dir = v;
        }
        if let Some(v) = self.response {
            cfg.response = v;
        }
        if let Some(v) = self.output {
            cfg.output = v;
        }
        if let Some(v) = self.report {
            cfg.report = Some(v);
        }
        if let Some(v) = self.evaluation_csv {
            cfg.evaluation_csv = Some(v);
        }
        if let Some(v) = self.epsg {
            cfg.epsg = v;
        }
        if self.threads.is_some() {
            cfg.threads = self.threads;
        }
        Ok(cfg)
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

fn metrics_row(split: &str, m: &Metrics) -> String {
    format!(
        "  {:<12} {:>6} {:>10.2} {:>10.4} {:>6.2}",
        split, m.n, m.bias, m.rmse, m.r_squared
    )
}

fn print_summary(report: &RunReport) {
    eprintln!("[upscale] Model accuracy");
    eprintln!("  {:<12} {:>6} {:>10} {:>10} {:>6}", "split", "n", "bias", "rmse", "r2");
    if let Some(cal) = &report.calibration {
        eprintln!("{}", metrics_row("calibration", cal));
    }
    eprintln!("{}", metrics_row("validation", &report.validation));

    eprintln!(
        "[upscale] {} of {} mask cells predicted",
        report.predicted_cells, report.mask_cells
    );
    if let Some(s) = &report.prediction {
        eprintln!("  range {:.3} … {:.3}, mean {:.3}", s.min, s.max, s.mean);
    }
    eprintln!("[upscale] Wrote {} (EPSG:{})", report.output.display(), report.epsg);
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let print_config = args.print_config;
    let config = args.into_config()?;

    if print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    log::debug!("effective config: {config:?}");
    let report = run(&config).context("Upscaling run failed")?;
    print_summary(&report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "upscale",
            "--response",
            "soc",
            "--no-calibration",
            "--epsg",
            "21781",
            "-j",
            "3",
        ]);
        let cfg = args.into_config().unwrap();
        assert_eq!(cfg.response, "soc");
        assert_eq!(cfg.calibration, None);
        assert_eq!(cfg.epsg, 21781);
        assert_eq!(cfg.threads, Some(3));
        assert_eq!(cfg.mask, UpscaleConfig::default().mask);
    }

    #[test]
    fn calibration_flags_conflict() {
        let res = Args::try_parse_from(["upscale", "--calibration", "c.csv", "--no-calibration"]);
        assert!(res.is_err());
    }
}

//! VIGIA CLI - deforestation anomaly detection and temporal analytics

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use vigia_algorithms::detection::{
    detect_deforestation, monthly_baselines, BaselinePair, BaselineSet, DetectionParams,
};
use vigia_algorithms::imagery::IndexKind;
use vigia_algorithms::spi::{compute_spi_3month, DroughtClass};
use vigia_algorithms::statistics::regional_statistics;
use vigia_algorithms::timeseries::{mann_kendall, sens_slope};
use vigia_algorithms::vectorize::{vectorize_alerts, VectorizeParams};
use vigia_store::{read_grid, AlertFileStore, BaselineStat, BaselineStore, Database,
    RegionalStatRecord};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vigia")]
#[command(author, version, about = "Deforestation monitoring engine", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a grid file
    Info {
        /// Input grid file (.grd)
        input: PathBuf,
    },
    /// Build monthly baselines from dated index grids
    Baseline {
        /// Spectral index the grids belong to
        index: String,
        /// Directory of {index}_{YYYY-MM-DD}.grd reference grids
        input_dir: PathBuf,
        /// Directory the baseline grids are written to
        #[arg(short, long, default_value = "baselines")]
        output_dir: PathBuf,
    },
    /// Run anomaly detection for one scene date
    Detect {
        /// Scene date (YYYY-MM-DD)
        date: NaiveDate,
        /// Directory of {index}_{date}.grd scene grids
        scene_dir: PathBuf,
        /// Indices to score, comma separated
        #[arg(short, long = "index", value_delimiter = ',', default_values_t =
            [String::from("ndmi"), String::from("nbr")])]
        indices: Vec<String>,
        /// Directory of baseline grids
        #[arg(short, long, default_value = "baselines")]
        baseline_dir: PathBuf,
        /// Directory the alert GeoJSON files are written to
        #[arg(short, long, default_value = "alerts")]
        alerts_dir: PathBuf,
        /// SQLite ledger path
        #[arg(long, default_value = "timeseries.db")]
        db: PathBuf,
        /// 3-month SPI for drought-aware thresholds
        #[arg(long)]
        spi: Option<f64>,
        /// Minimum alert polygon area in hectares
        #[arg(long, default_value = "1.0")]
        min_area_ha: f64,
        /// Minimum confidence level for alert pixels (1-3)
        #[arg(long, default_value = "1")]
        min_confidence: u8,
        /// Region label for the statistics ledger
        #[arg(long, default_value = "full_aoi")]
        region: String,
    },
    /// Trend analysis over the stored regional time series
    Trend {
        /// Spectral index
        index: String,
        /// SQLite ledger path
        #[arg(long, default_value = "timeseries.db")]
        db: PathBuf,
        /// Region label
        #[arg(long, default_value = "full_aoi")]
        region: String,
        /// Start date filter (inclusive)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// End date filter (inclusive)
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Compute the 3-month SPI from monthly precipitation
    Spi {
        /// Text file with one monthly precipitation total (mm) per line
        input: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

/// Collect `{index}_{YYYY-MM-DD}.grd` files from a directory.
fn dated_grids(dir: &Path, index: &str) -> Result<Vec<(NaiveDate, PathBuf)>> {
    let prefix = format!("{index}_");
    let mut found = Vec::new();

    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if path.extension().and_then(|e| e.to_str()) != Some("grd") {
            continue;
        }
        if let Some(date) = stem.strip_prefix(&prefix).and_then(|s| s.parse().ok()) {
            found.push((date, path));
        }
    }

    found.sort();
    Ok(found)
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let grid = read_grid(&input).context("failed to read grid")?;
            let (rows, cols) = grid.shape();
            let bounds = grid.bounds();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, grid.len());
            println!("Cell size: {}", grid.transform().cell_size());
            println!(
                "Bounds: ({:.2}, {:.2}) - ({:.2}, {:.2})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = grid.crs() {
                println!("CRS: {}", crs);
            }
            match regional_statistics(&grid) {
                Some(stats) => {
                    println!("\nStatistics:");
                    println!("  Min: {:.4}", stats.min);
                    println!("  Max: {:.4}", stats.max);
                    println!("  Mean: {:.4}", stats.mean);
                    println!("  Median: {:.4}", stats.median);
                    println!("  Std: {:.4}", stats.std);
                    println!("  Valid cells: {} ({:.1}%)", stats.n_pixels, stats.pct_valid);
                }
                None => println!("\nNo valid cells"),
            }
        }

        // ── Baseline ─────────────────────────────────────────────────
        Commands::Baseline {
            index,
            input_dir,
            output_dir,
        } => {
            let kind: IndexKind = index.parse()?;
            let grids = dated_grids(&input_dir, kind.name())?;
            if grids.is_empty() {
                bail!(
                    "no {}_YYYY-MM-DD.grd files in {}",
                    kind.name(),
                    input_dir.display()
                );
            }
            info!("Building baselines from {} reference grids", grids.len());

            let mut scenes = Vec::with_capacity(grids.len());
            for (date, path) in grids {
                let grid = read_grid(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                scenes.push((date, grid));
            }

            let store = BaselineStore::new(&output_dir)?;
            let baselines = monthly_baselines(&scenes)?;
            let months = baselines.len();
            for (month, pair) in baselines {
                store.save(kind.name(), month, BaselineStat::Mean, &pair.mean)?;
                store.save(kind.name(), month, BaselineStat::Std, &pair.std)?;
            }
            println!(
                "Baselines for {} written to {} ({} months covered)",
                kind.name(),
                output_dir.display(),
                months
            );
        }

        // ── Detect ───────────────────────────────────────────────────
        Commands::Detect {
            date,
            scene_dir,
            indices,
            baseline_dir,
            alerts_dir,
            db,
            spi,
            min_area_ha,
            min_confidence,
            region,
        } => {
            let month = date.month();
            let store = BaselineStore::new(&baseline_dir)?;

            let mut current = HashMap::new();
            let mut baselines = BaselineSet::new();
            for name in &indices {
                let kind: IndexKind = name.parse()?;
                let path = scene_dir.join(format!("{}_{date}.grd", kind.name()));
                let scene = read_grid(&path)
                    .with_context(|| format!("reading scene grid {}", path.display()))?;
                current.insert(kind, scene);

                let mean = store.load(kind.name(), month, BaselineStat::Mean);
                let std = store.load(kind.name(), month, BaselineStat::Std);
                match (mean, std) {
                    (Ok(mean), Ok(std)) => {
                        baselines.insert(kind, month, BaselinePair { mean, std });
                    }
                    _ => warn!("no stored baseline for {} month {}", kind.name(), month),
                }
            }

            // NoUsableIndices propagates here, so a scene with no
            // baselines exits non-zero instead of reporting "clean"
            let result = detect_deforestation(
                &current,
                &baselines,
                month,
                spi,
                &DetectionParams::default(),
            )?;

            let params = VectorizeParams {
                min_confidence,
                min_area_ha,
                ..VectorizeParams::default()
            };
            let alerts = vectorize_alerts(&result.confidence, &params)?;
            let summary = alerts.summarize();

            let file_store = AlertFileStore::new(&alerts_dir)?;
            let path = file_store.save(&alerts, date)?;

            let ledger = Database::open(&db)?;
            ledger.upsert_alert_summary(date, &summary)?;
            for (kind, scene) in &current {
                if let Some(stats) = regional_statistics(scene) {
                    ledger.upsert_regional_stats(&RegionalStatRecord {
                        date,
                        index_name: kind.name().to_string(),
                        region: region.clone(),
                        mean: stats.mean,
                        median: stats.median,
                        std: stats.std,
                        min: stats.min,
                        max: stats.max,
                        pct_valid: stats.pct_valid,
                        n_pixels: stats.n_pixels,
                    })?;
                }
            }
            ledger.close()?;

            println!("Detection for {date}:");
            println!("  Alert pixels: {}", result.alert_count());
            if result.drought_adjusted {
                println!("  Drought widening applied (SPI {:.2})", spi.unwrap_or(0.0));
            }
            println!(
                "  Polygons: {} ({:.2} ha total; high={}, medium={}, low={})",
                summary.total_alerts,
                summary.total_area_ha,
                summary.high_confidence,
                summary.medium_confidence,
                summary.low_confidence
            );
            println!("  Alerts written to {}", path.display());
        }

        // ── Trend ────────────────────────────────────────────────────
        Commands::Trend {
            index,
            db,
            region,
            start,
            end,
        } => {
            let kind: IndexKind = index.parse()?;
            let ledger = Database::open(&db)?;
            let series = ledger.load_timeseries(kind.name(), &region, start, end)?;
            if series.is_empty() {
                bail!("no stored time series for {} in {}", kind.name(), region);
            }

            let dates: Vec<NaiveDate> = series.iter().map(|r| r.date).collect();
            let values: Vec<f64> = series.iter().map(|r| r.mean).collect();

            let mk = mann_kendall(&values);
            let slope = sens_slope(&dates, &values);

            println!("Trend for {} ({}, {} observations):", kind.name(), region, mk.n);
            println!(
                "  Mann-Kendall: {} (tau={:.3}, p={:.4}{})",
                mk.trend.label(),
                mk.tau,
                mk.p_value,
                if mk.significant { ", significant" } else { "" }
            );
            println!(
                "  Sen's slope: {:.4}/yr (95% CI {:.4} to {:.4})",
                slope.slope_per_year, slope.lower_ci, slope.upper_ci
            );
        }

        // ── SPI ──────────────────────────────────────────────────────
        Commands::Spi { input } => {
            let text = fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let mut monthly = Vec::new();
            for (lineno, line) in text.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let value: f64 = line
                    .parse()
                    .with_context(|| format!("bad precipitation value on line {}", lineno + 1))?;
                monthly.push(value);
            }
            if monthly.len() < 3 {
                bail!("need at least 3 monthly values, got {}", monthly.len());
            }

            let spi = compute_spi_3month(&monthly);
            let class = DroughtClass::from_spi(spi);
            println!("SPI-3: {spi:.2}");
            println!("Drought class: {}", class.label());
        }
    }

    Ok(())
}

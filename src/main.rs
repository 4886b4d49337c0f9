use std::env;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

mod csv_export;
mod elevation_profile;
mod errors;
mod slope_estimator;
mod track_ingestor;

use errors::AnalysisError;

struct RunConfig {
    gpx_dir: PathBuf,
    csv_dir: PathBuf,
    performance: bool,
}

#[derive(Debug)]
struct FileSummary {
    filename: String,
    raw_points: usize,
    route_points: usize,
    total_distance_km: f64,
    elevation_range_m: (f64, f64),
    // Slope in degrees at the 25/50/75% distance marks
    checkpoint_slopes_deg: [f64; 3],
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = parse_args();

    println!("GPX SLOPE ANALYSIS");
    println!("==================");
    println!("Input folder:  {}", config.gpx_dir.display());
    println!("Output folder: {}", config.csv_dir.display());
    if config.performance {
        println!("Performance mode: hr/cadence columns enabled");
    }

    let gpx_files = collect_gpx_files(&config.gpx_dir);
    if gpx_files.is_empty() {
        println!("No GPX files found in {}", config.gpx_dir.display());
        return Ok(());
    }

    std::fs::create_dir_all(&config.csv_dir)?;

    println!(
        "\nProcessing {} files on {} cores",
        gpx_files.len(),
        num_cpus::get()
    );

    let results: Vec<(PathBuf, Result<FileSummary, AnalysisError>)> = gpx_files
        .par_iter()
        .map(|path| (path.clone(), process_gpx_file(path, &config)))
        .collect();

    let mut summaries = Vec::new();
    for (path, result) in results {
        match result {
            Ok(summary) => summaries.push(summary),
            Err(e) => eprintln!("Error processing {}: {}", path.display(), e),
        }
    }

    print_summary_table(&summaries);
    println!("\nProcessed {} of {} files", summaries.len(), gpx_files.len());

    Ok(())
}

fn parse_args() -> RunConfig {
    let mut performance = false;
    let mut positional = Vec::new();

    for arg in env::args().skip(1) {
        if arg == "--performance" {
            performance = true;
        } else {
            positional.push(arg);
        }
    }

    RunConfig {
        gpx_dir: positional
            .first()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/gpx")),
        csv_dir: positional
            .get(1)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/csv")),
        performance,
    }
}

fn collect_gpx_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            if let Some(extension) = entry.path().extension() {
                if extension.to_str().unwrap_or("").to_lowercase() == "gpx" {
                    files.push(entry.path().to_path_buf());
                }
            }
        }
    }

    files.sort();
    files
}

fn process_gpx_file(path: &Path, config: &RunConfig) -> Result<FileSummary, AnalysisError> {
    let points = track_ingestor::ingest_file(path, config.performance)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("track");
    let csv_name = if config.performance {
        format!("{stem}_full.csv")
    } else {
        format!("{stem}.csv")
    };
    csv_export::write_track_csv(&config.csv_dir.join(csv_name), &points, config.performance)?;

    let profile = elevation_profile::build_profile(&points)?;
    let route_points = profile.len();
    let total = profile.total_distance();

    let mut checkpoint_slopes_deg = [0.0; 3];
    for (i, fraction) in [0.25, 0.5, 0.75].iter().enumerate() {
        let slope = slope_estimator::slope_at(&profile, total * fraction)?;
        checkpoint_slopes_deg[i] = slope.degrees;
    }

    Ok(FileSummary {
        filename: path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string(),
        raw_points: points.len(),
        route_points,
        total_distance_km: total / 1000.0,
        elevation_range_m: profile.elevation_range(),
        checkpoint_slopes_deg,
    })
}

fn print_summary_table(summaries: &[FileSummary]) {
    if summaries.is_empty() {
        return;
    }

    println!(
        "\n{:<36} {:>7} {:>7} {:>9} {:>16} {:>24}",
        "File", "Points", "Route", "Dist km", "Elev min..max m", "Slope deg @25/50/75%"
    );

    for s in summaries {
        println!(
            "{:<36} {:>7} {:>7} {:>9.2} {:>7.1}..{:<7.1} {:>7.2} {:>7.2} {:>7.2}",
            s.filename,
            s.raw_points,
            s.route_points,
            s.total_distance_km,
            s.elevation_range_m.0,
            s.elevation_range_m.1,
            s.checkpoint_slopes_deg[0],
            s.checkpoint_slopes_deg[1],
            s.checkpoint_slopes_deg[2],
        );
    }
}

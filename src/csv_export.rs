use std::path::Path;

use csv::{Reader, Writer};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AnalysisError;
use crate::track_ingestor::TrackPoint;

#[derive(Debug, Serialize)]
struct BasicRecord {
    lat: f64,
    lon: f64,
    elevation: f64,
    time: i64,
}

#[derive(Debug, Serialize)]
struct PerformanceRecord {
    lat: f64,
    lon: f64,
    elevation: f64,
    time: i64,
    hr: f64,
    cadence: f64,
}

#[derive(Debug, Deserialize)]
struct TrackRecord {
    lat: f64,
    lon: f64,
    elevation: f64,
    time: i64,
    #[serde(default)]
    hr: Option<f64>,
    #[serde(default)]
    cadence: Option<f64>,
}

/// Write one row per ingested point. Performance mode adds the hr/cadence
/// columns and requires them on every point.
pub fn write_track_csv(
    path: &Path,
    points: &[TrackPoint],
    performance: bool,
) -> Result<(), AnalysisError> {
    let mut wtr = Writer::from_path(path)?;

    for (index, pt) in points.iter().enumerate() {
        if performance {
            let hr = pt.heart_rate.ok_or(AnalysisError::MissingExtension {
                index,
                field: "hr",
            })?;
            let cadence = pt.cadence.ok_or(AnalysisError::MissingExtension {
                index,
                field: "cad",
            })?;
            wtr.serialize(PerformanceRecord {
                lat: pt.latitude,
                lon: pt.longitude,
                elevation: pt.elevation,
                time: pt.timestamp,
                hr,
                cadence,
            })?;
        } else {
            wtr.serialize(BasicRecord {
                lat: pt.latitude,
                lon: pt.longitude,
                elevation: pt.elevation,
                time: pt.timestamp,
            })?;
        }
    }

    wtr.flush()?;
    debug!(path = %path.display(), rows = points.len(), "wrote interchange csv");
    Ok(())
}

/// Read an interchange file back into track points. The hr/cadence columns
/// are optional on read.
pub fn read_track_csv(path: &Path) -> Result<Vec<TrackPoint>, AnalysisError> {
    let mut rdr = Reader::from_path(path)?;
    let mut points = Vec::new();

    for result in rdr.deserialize::<TrackRecord>() {
        let record = result?;
        points.push(TrackPoint {
            latitude: record.lat,
            longitude: record.lon,
            elevation: record.elevation,
            timestamp: record.time,
            heart_rate: record.hr,
            cadence: record.cadence,
        });
    }

    Ok(points)
}

use std::collections::HashMap;

use geo::{point, HaversineDistance};
use tracing::debug;

use crate::errors::AnalysisError;
use crate::track_ingestor::TrackPoint;

/// One sample per distinct GPS position, in first-seen route order.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub timestamp: i64,
}

/// Index-aligned cumulative distances (meters) and elevations (meters).
#[derive(Debug, Clone, Default)]
pub struct ElevationProfile {
    pub distances: Vec<f64>,
    pub elevations: Vec<f64>,
}

impl ElevationProfile {
    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    pub fn total_distance(&self) -> f64 {
        self.distances.last().copied().unwrap_or(0.0)
    }

    pub fn elevation_range(&self) -> (f64, f64) {
        let min = self.elevations.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = self
            .elevations
            .iter()
            .fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        (min, max)
    }
}

/// Collapse points sharing an exact (latitude, longitude) position into one
/// RoutePoint each, keeping first-occurrence order of distinct positions.
/// Within a group the max elevation and max timestamp win, so a paused or
/// stationary fix reduces to its latest/highest reading.
pub fn dedup_route_points(points: &[TrackPoint]) -> Vec<RoutePoint> {
    let mut index_by_position: HashMap<(u64, u64), usize> = HashMap::new();
    let mut route_points: Vec<RoutePoint> = Vec::new();

    for pt in points {
        let key = (pt.latitude.to_bits(), pt.longitude.to_bits());
        match index_by_position.get(&key) {
            Some(&i) => {
                let existing = &mut route_points[i];
                existing.elevation = existing.elevation.max(pt.elevation);
                existing.timestamp = existing.timestamp.max(pt.timestamp);
            }
            None => {
                index_by_position.insert(key, route_points.len());
                route_points.push(RoutePoint {
                    latitude: pt.latitude,
                    longitude: pt.longitude,
                    elevation: pt.elevation,
                    timestamp: pt.timestamp,
                });
            }
        }
    }

    route_points
}

/// Build the distance/elevation profile: deduplicate positions, then prefix-sum
/// the pairwise great-circle distances. The first cumulative distance is
/// exactly 0.
pub fn build_profile(points: &[TrackPoint]) -> Result<ElevationProfile, AnalysisError> {
    let route_points = dedup_route_points(points);

    let mut distances = Vec::with_capacity(route_points.len());
    let mut elevations = Vec::with_capacity(route_points.len());

    for (i, rp) in route_points.iter().enumerate() {
        if i == 0 {
            distances.push(0.0);
        } else {
            let prev = &route_points[i - 1];
            let a = point!(x: prev.longitude, y: prev.latitude);
            let b = point!(x: rp.longitude, y: rp.latitude);
            let cumulative = distances[i - 1] + a.haversine_distance(&b);

            // A decrease here means the distance primitive or the grouping is
            // broken; never emit a malformed profile.
            if !(cumulative >= distances[i - 1]) {
                return Err(AnalysisError::ProfileConsistency { index: i });
            }
            distances.push(cumulative);
        }
        elevations.push(rp.elevation);
    }

    debug!(
        raw = points.len(),
        deduped = route_points.len(),
        "built elevation profile"
    );
    Ok(ElevationProfile {
        distances,
        elevations,
    })
}

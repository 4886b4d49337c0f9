use std::f64::consts::PI;

use tracing::trace;

use crate::elevation_profile::ElevationProfile;
use crate::errors::AnalysisError;

/// Default number of nodes for the uniform reconstruction grid.
pub const DEFAULT_RESOLUTION: usize = 10001;

const FLATNESS_TOLERANCE: f64 = 1e-9;

/// Instantaneous gradient at a queried distance, as rise/run tangent plus
/// its angular conversions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeResult {
    pub tangent: f64,
    pub radians: f64,
    pub degrees: f64,
}

impl SlopeResult {
    fn from_tangent(tangent: f64) -> Self {
        let radians = tangent.atan();
        SlopeResult {
            tangent,
            radians,
            degrees: radians * 180.0 / PI,
        }
    }
}

/// Piecewise-linear reconstruction over strictly ascending samples.
struct LinearInterpolator {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl LinearInterpolator {
    fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self, AnalysisError> {
        for i in 1..xs.len() {
            if !(xs[i] > xs[i - 1]) {
                return Err(AnalysisError::DuplicateAbscissa { index: i });
            }
        }
        Ok(LinearInterpolator { xs, ys })
    }

    /// Evaluate at `x`, clamped to the sampled domain.
    fn eval(&self, x: f64) -> f64 {
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[self.xs.len() - 1] {
            return self.ys[self.ys.len() - 1];
        }

        let i = self.xs.partition_point(|&v| v < x);
        let (x0, x1) = (self.xs[i - 1], self.xs[i]);
        let (y0, y1) = (self.ys[i - 1], self.ys[i]);
        let t = (x - x0) / (x1 - x0);
        y0 + t * (y1 - y0)
    }
}

/// Slope at `distance` meters along the route, using the default grid
/// resolution.
pub fn slope_at(profile: &ElevationProfile, distance: f64) -> Result<SlopeResult, AnalysisError> {
    slope_at_with_resolution(profile, distance, DEFAULT_RESOLUTION)
}

/// Slope at `distance` meters along the route.
///
/// The profile samples are reconstructed piecewise-linearly, resampled onto
/// `resolution` equally spaced nodes, and differentiated by central finite
/// differences with `eps` one tenth of the node spacing. Exactly at the route
/// endpoints the slope is 0: there is no gradient information before the
/// start or past the finish.
pub fn slope_at_with_resolution(
    profile: &ElevationProfile,
    distance: f64,
    resolution: usize,
) -> Result<SlopeResult, AnalysisError> {
    if profile.len() < 2 {
        return Err(AnalysisError::InsufficientSamples {
            count: profile.len(),
        });
    }
    if resolution < 3 {
        return Err(AnalysisError::InvalidResolution { resolution });
    }

    let min = profile.distances[0];
    let max = profile.distances[profile.len() - 1];

    if !distance.is_finite() || distance < min || distance > max {
        return Err(AnalysisError::OutOfRange { distance, min, max });
    }

    if distance == min || distance == max {
        return Ok(SlopeResult::from_tangent(0.0));
    }

    let samples =
        LinearInterpolator::new(profile.distances.clone(), profile.elevations.clone())?;

    // Uniform resampling decouples the finite differences from the raw,
    // unevenly spaced GPS sample spacing.
    let step = (max - min) / (resolution - 1) as f64;
    let mut grid_x = Vec::with_capacity(resolution);
    let mut grid_y = Vec::with_capacity(resolution);
    for i in 0..resolution {
        let x = min + step * i as f64;
        grid_x.push(x);
        grid_y.push(samples.eval(x));
    }
    let f = LinearInterpolator::new(grid_x, grid_y)?;

    let eps = step / 10.0;
    let delta_lower = (f.eval(distance) - f.eval(distance - eps)) / eps;
    let delta_upper = (f.eval(distance + eps) - f.eval(distance)) / eps;

    let tangent = if (delta_upper - delta_lower).abs() < FLATNESS_TOLERANCE {
        delta_lower
    } else {
        // A grid breakpoint sits between the two differences; fall back to a
        // two-step difference over the already-traversed side.
        (f.eval(distance - eps) - f.eval(distance - 2.0 * eps)) / eps
    };

    trace!(distance, tangent, "slope query");
    Ok(SlopeResult::from_tangent(tangent))
}

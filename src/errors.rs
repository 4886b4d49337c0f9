use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("track point {index} is missing required field `{field}`")]
    MalformedTrack { index: usize, field: &'static str },

    #[error("track point {index} has no `{field}` extension in performance mode")]
    MissingExtension { index: usize, field: &'static str },

    #[error("cumulative distance decreased at route point {index}")]
    ProfileConsistency { index: usize },

    #[error("duplicate interpolation abscissa at sample {index}")]
    DuplicateAbscissa { index: usize },

    #[error("distance {distance} outside sampled domain [{min}, {max}]")]
    OutOfRange { distance: f64, min: f64, max: f64 },

    #[error("profile needs at least two samples, got {count}")]
    InsufficientSamples { count: usize },

    #[error("interpolation resolution must be at least 3, got {resolution}")]
    InvalidResolution { resolution: usize },

    #[error("GPX parsing error: {0}")]
    Gpx(String),

    #[error("extension scan error: {0}")]
    Xml(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

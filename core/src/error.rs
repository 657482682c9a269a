//! Error type shared by every localization operation.
use thiserror::Error;

/// Localization errors
///
/// Every failure the core can hit is reported through this type; none of them abort the process.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MclError {
    #[error("{context} at ({x}, {y}) lies outside the grid")]
    OutOfBounds {
        context: &'static str,
        x: f64,
        y: f64,
    },

    #[error("no valid pose found after {attempts} sampling attempts")]
    SamplingExhausted { attempts: usize },

    #[error("bearing {0} cannot be cast")]
    DegenerateBearing(f64),

    #[error("scan length mismatch: expected {expected} readings, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid particle population: {0}")]
    InvalidPopulation(String),

    #[error("invalid occupancy grid: {0}")]
    InvalidGrid(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, MclError>;

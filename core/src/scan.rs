//! Range sensor model: simulated scans and scan similarity.
//!
//! A scan is an ordered list of ranges. Beam `i` is measured at bearing `min_angle + i * increment` relative
//! to the sensor heading, and every scan produced for a given [SensorConfig] has exactly `n_readings` beams.
use crate::error::{MclError, Result};
use crate::map::OccupancyGrid;
use crate::raycast::cast;
use crate::Pose;

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

/// Ordered beam ranges (m)
pub type ScanReading = Vec<f64>;

/// Geometry of a rotating range sensor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Bearing of the first beam relative to the sensor heading (rad)
    pub min_angle: f64,
    /// Angular step between consecutive beams (rad)
    pub increment: f64,
    /// Number of beams per scan
    pub n_readings: usize,
    /// Range reported when a beam hits nothing (m)
    pub max_range: f64,
}

impl Default for SensorConfig {
    /// A 180° scanner with one-degree beams and a 10 m range.
    fn default() -> Self {
        SensorConfig {
            min_angle: -FRAC_PI_2,
            increment: PI / 180.0,
            n_readings: 181,
            max_range: 10.0,
        }
    }
}

impl SensorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_readings == 0 {
            return Err(MclError::InvalidParameter(
                "sensor must produce at least one reading".to_string(),
            ));
        }
        if !(self.max_range.is_finite() && self.max_range > 0.0) {
            return Err(MclError::InvalidParameter(format!(
                "max_range must be positive, got {}",
                self.max_range
            )));
        }
        if !(self.min_angle.is_finite() && self.increment.is_finite()) {
            return Err(MclError::InvalidParameter(
                "sensor angles must be finite".to_string(),
            ));
        }
        Ok(())
    }
    /// Bearing of beam `index` relative to the sensor heading.
    pub fn beam_angle(&self, index: usize) -> f64 {
        self.min_angle + index as f64 * self.increment
    }
}

/// Ranges the sensor would report from `pose` in `grid`.
///
/// Each beam is cast from the cell containing the pose. A beam that hits nothing reports `max_range`; otherwise
/// the range is the Euclidean cell distance between the origin and the hit cell scaled by the grid
/// resolution, capped at `max_range`.
///
/// # Errors
/// [MclError::OutOfBounds] if the pose is not on the grid, or any ray casting error.
///
/// ```rust
/// use mcl::Pose;
/// use mcl::map::{CellState, OccupancyGrid};
/// use mcl::scan::{SensorConfig, simulate_scan};
///
/// let mut grid = OccupancyGrid::filled(5, 5, 1.0, (0.0, 0.0), CellState::Free).unwrap();
/// grid.set(4, 2, CellState::Occupied).unwrap();
/// let sensor = SensorConfig { min_angle: 0.0, increment: 0.0, n_readings: 1, max_range: 10.0 };
/// let scan = simulate_scan(&Pose::new(0.0, 2.0, 0.0), &sensor, &grid).unwrap();
/// assert!((scan[0] - 4.0).abs() < 0.5);
/// ```
pub fn simulate_scan(pose: &Pose, sensor: &SensorConfig, grid: &OccupancyGrid) -> Result<ScanReading> {
    let origin = grid.pose_cell(pose).ok_or(MclError::OutOfBounds {
        context: "pose",
        x: pose.x,
        y: pose.y,
    })?;
    (0..sensor.n_readings)
        .map(|i| {
            let bearing = pose.theta + sensor.beam_angle(i);
            let range = match cast(&origin, bearing, grid)? {
                None => sensor.max_range,
                Some(hit) => (origin.distance_to(&hit) * grid.resolution()).min(sensor.max_range),
            };
            Ok(range)
        })
        .collect()
}

/// Similarity between a simulated and an observed scan, in `[0, 1]`.
///
/// Each beam scores `(1 - d)²` where `d = |simulated - observed| / max_range` saturated at 1, and the result is
/// the mean over all beams. Identical scans score 1; scans whose every beam differs by at least `max_range`
/// score 0. Non-finite beam differences score 0.
///
/// # Errors
/// - [MclError::DimensionMismatch] when the scans have different lengths.
/// - [MclError::InvalidParameter] for empty scans or a non-positive `max_range`.
pub fn scan_similarity(simulated: &[f64], observed: &[f64], max_range: f64) -> Result<f64> {
    if simulated.len() != observed.len() {
        return Err(MclError::DimensionMismatch {
            expected: simulated.len(),
            actual: observed.len(),
        });
    }
    if simulated.is_empty() {
        return Err(MclError::InvalidParameter(
            "cannot score an empty scan".to_string(),
        ));
    }
    if !(max_range.is_finite() && max_range > 0.0) {
        return Err(MclError::InvalidParameter(format!(
            "max_range must be positive, got {}",
            max_range
        )));
    }
    let total: f64 = simulated
        .iter()
        .zip(observed.iter())
        .map(|(s, o)| {
            let normalized = (s - o).abs() / max_range;
            if normalized.is_nan() {
                0.0
            } else {
                (1.0 - normalized.min(1.0)).powi(2)
            }
        })
        .sum();
    Ok((total / simulated.len() as f64).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::CellState;
    use assert_approx_eq::assert_approx_eq;

    fn single_beam(max_range: f64) -> SensorConfig {
        SensorConfig {
            min_angle: 0.0,
            increment: 0.0,
            n_readings: 1,
            max_range,
        }
    }

    #[test]
    fn single_obstacle_east_of_pose() {
        let mut grid = OccupancyGrid::filled(5, 5, 1.0, (0.0, 0.0), CellState::Free).unwrap();
        grid.set(4, 2, CellState::Occupied).unwrap();
        let scan = simulate_scan(&Pose::new(0.0, 2.0, 0.0), &single_beam(10.0), &grid).unwrap();
        assert_eq!(scan.len(), 1);
        assert_approx_eq!(scan[0], 4.0, 0.5);
    }
    #[test]
    fn range_scales_with_resolution() {
        let mut grid = OccupancyGrid::filled(20, 3, 0.05, (-0.5, 0.0), CellState::Free).unwrap();
        grid.set(15, 1, CellState::Occupied).unwrap();
        // Cell (5, 1) holds the pose; the wall is 10 cells east
        let scan = simulate_scan(&Pose::new(-0.24, 0.07, 0.0), &single_beam(10.0), &grid).unwrap();
        assert_approx_eq!(scan[0], 0.5, 0.025);
    }
    #[test]
    fn misses_and_long_hits_report_max_range() {
        let mut grid = OccupancyGrid::filled(30, 1, 1.0, (0.0, 0.0), CellState::Free).unwrap();
        grid.set(25, 0, CellState::Occupied).unwrap();
        let sensor = SensorConfig {
            min_angle: 0.0,
            increment: PI,
            n_readings: 2,
            max_range: 8.0,
        };
        let scan = simulate_scan(&Pose::new(0.5, 0.5, 0.0), &sensor, &grid).unwrap();
        assert_eq!(scan, vec![8.0, 8.0]);
    }
    #[test]
    fn beam_order_follows_bearings() {
        let mut grid = OccupancyGrid::filled(9, 9, 1.0, (0.0, 0.0), CellState::Free).unwrap();
        grid.set(6, 4, CellState::Occupied).unwrap(); // east, 2 cells
        grid.set(4, 7, CellState::Occupied).unwrap(); // north, 3 cells
        grid.set(0, 4, CellState::Occupied).unwrap(); // west, 4 cells
        let sensor = SensorConfig {
            min_angle: 0.0,
            increment: FRAC_PI_2,
            n_readings: 4,
            max_range: 20.0,
        };
        let scan = simulate_scan(&Pose::new(4.5, 4.5, 0.0), &sensor, &grid).unwrap();
        assert_eq!(scan.len(), 4);
        assert_approx_eq!(scan[0], 2.0, 1e-12);
        assert_approx_eq!(scan[1], 3.0, 1e-12);
        assert_approx_eq!(scan[2], 4.0, 1e-12);
        assert_approx_eq!(scan[3], 20.0, 1e-12);
    }
    #[test]
    fn heading_rotates_the_scan() {
        let mut grid = OccupancyGrid::filled(9, 9, 1.0, (0.0, 0.0), CellState::Free).unwrap();
        grid.set(4, 7, CellState::Occupied).unwrap();
        let scan =
            simulate_scan(&Pose::new(4.5, 4.5, FRAC_PI_2), &single_beam(20.0), &grid).unwrap();
        assert_approx_eq!(scan[0], 3.0, 1e-12);
    }
    #[test]
    fn pose_off_grid_is_out_of_bounds() {
        let grid = OccupancyGrid::filled(5, 5, 1.0, (0.0, 0.0), CellState::Free).unwrap();
        let result = simulate_scan(&Pose::new(-1.0, 2.0, 0.0), &single_beam(10.0), &grid);
        assert!(matches!(result, Err(MclError::OutOfBounds { .. })));
    }
    #[test]
    fn identical_scans_score_one() {
        let scan = vec![2.0; 5];
        assert_approx_eq!(scan_similarity(&scan, &scan, 10.0).unwrap(), 1.0, 1e-12);
        let varied = vec![0.0, 3.5, 10.0, 7.25, 1.0];
        assert_approx_eq!(scan_similarity(&varied, &varied, 10.0).unwrap(), 1.0, 1e-12);
    }
    #[test]
    fn fully_divergent_scans_score_zero() {
        let simulated = vec![0.0, 0.0, 10.0];
        let observed = vec![10.0, 25.0, 0.0];
        assert_eq!(scan_similarity(&simulated, &observed, 10.0).unwrap(), 0.0);
    }
    #[test]
    fn partial_difference_scores_quadratically() {
        // |5 - 0| / 10 = 0.5 -> 0.25 ; exact beam -> 1.0
        let score = scan_similarity(&[5.0, 1.0], &[0.0, 1.0], 10.0).unwrap();
        assert_approx_eq!(score, 0.625, 1e-12);
    }
    #[test]
    fn non_finite_observations_score_zero() {
        let score = scan_similarity(&[1.0, 1.0], &[f64::INFINITY, f64::NAN], 10.0).unwrap();
        assert_eq!(score, 0.0);
    }
    #[test]
    fn mismatched_lengths_are_reported() {
        let result = scan_similarity(&[1.0; 5], &[1.0; 6], 10.0);
        assert_eq!(
            result,
            Err(MclError::DimensionMismatch {
                expected: 5,
                actual: 6
            })
        );
    }
    #[test]
    fn invalid_scoring_inputs() {
        assert!(scan_similarity(&[], &[], 10.0).is_err());
        assert!(scan_similarity(&[1.0], &[1.0], 0.0).is_err());
    }
    #[test]
    fn sensor_validation() {
        assert!(SensorConfig::default().validate().is_ok());
        let mut sensor = SensorConfig::default();
        sensor.n_readings = 0;
        assert!(sensor.validate().is_err());
        let mut sensor = SensorConfig::default();
        sensor.max_range = -1.0;
        assert!(sensor.validate().is_err());
    }
}

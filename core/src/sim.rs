//! Synthetic localization scenarios.
//!
//! This module builds a walled rectangular room, drives a ground-truth pose through it along an odometry
//! trajectory, generates the (optionally noisy) scans a sensor at the true pose would observe, and runs the
//! [MonteCarloLocalizer] against them. One [LocalizationRecord] is produced per filter cycle and can be written
//! to CSV for analysis.
//!
//! ```no_run
//! use mcl::sim::{LocalizationRecord, SimulationConfig, run_simulation};
//!
//! let config = SimulationConfig::default();
//! let records = run_simulation(&config).unwrap();
//! LocalizationRecord::to_csv(&records, "results.csv").unwrap();
//! ```
use crate::config::{ConfigFile, MclConfig};
use crate::error::{MclError, Result};
use crate::filter::MonteCarloLocalizer;
use crate::map::{CellState, OccupancyGrid};
use crate::scan::simulate_scan;
use crate::{OdometryDelta, Pose};

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Axis-aligned rectangular obstacle in world coordinates (m)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

fn default_wall_thickness() -> usize {
    1
}

/// A rectangular room with walls along its border and optional interior obstacles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Extent along x (m)
    pub width: f64,
    /// Extent along y (m)
    pub height: f64,
    /// Cell edge length (m)
    pub resolution: f64,
    /// Wall thickness in cells
    #[serde(default = "default_wall_thickness")]
    pub wall_thickness: usize,
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
}
impl Default for RoomConfig {
    fn default() -> Self {
        RoomConfig {
            width: 10.0,
            height: 8.0,
            resolution: 0.1,
            wall_thickness: default_wall_thickness(),
            obstacles: vec![
                Obstacle {
                    min_x: 6.5,
                    min_y: 1.5,
                    max_x: 7.5,
                    max_y: 3.0,
                },
                Obstacle {
                    min_x: 7.0,
                    min_y: 5.0,
                    max_x: 9.0,
                    max_y: 5.5,
                },
            ],
        }
    }
}
impl RoomConfig {
    /// Rasterize the room into an occupancy grid with its origin at `(0, 0)`.
    ///
    /// A cell is occupied when it lies in the wall band or its center falls inside an obstacle.
    pub fn build(&self) -> Result<OccupancyGrid> {
        if !(self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0) {
            return Err(MclError::InvalidGrid(format!(
                "room extent must be positive, got {} x {}",
                self.width, self.height
            )));
        }
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(MclError::InvalidGrid(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        let cols = (self.width / self.resolution).round() as usize;
        let rows = (self.height / self.resolution).round() as usize;
        let mut grid = OccupancyGrid::filled(cols, rows, self.resolution, (0.0, 0.0), CellState::Free)?;
        let wall = self.wall_thickness;
        for row in 0..rows {
            for col in 0..cols {
                let in_wall = col < wall || row < wall || col + wall >= cols || row + wall >= rows;
                let x = (col as f64 + 0.5) * self.resolution;
                let y = (row as f64 + 0.5) * self.resolution;
                let in_obstacle = self
                    .obstacles
                    .iter()
                    .any(|o| x >= o.min_x && x <= o.max_x && y >= o.min_y && y <= o.max_y);
                if in_wall || in_obstacle {
                    grid.set(col, row, CellState::Occupied)?;
                }
            }
        }
        Ok(grid)
    }
}

/// Initial particle spread around the start pose for tracking runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingStart {
    pub spatial_std: f64,
    pub angular_spread: f64,
}

fn default_iterations() -> usize {
    40
}

/// A complete scenario: filter settings, the room, and the ground-truth motion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of filter cycles to run
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Standard deviation of Gaussian noise added to every observed range (m)
    #[serde(default)]
    pub range_noise_std: f64,
    /// Ground-truth starting pose
    pub start: Pose,
    /// Start particles around `start` instead of uniformly over the map
    #[serde(default)]
    pub tracking: Option<TrackingStart>,
    #[serde(default)]
    pub room: RoomConfig,
    #[serde(default)]
    pub filter: MclConfig,
    /// Odometry applied before each cycle, repeated if shorter than `iterations`. Empty means stationary.
    #[serde(default)]
    pub trajectory: Vec<OdometryDelta>,
}
impl Default for SimulationConfig {
    /// A counter-clockwise arc through the default room.
    fn default() -> Self {
        SimulationConfig {
            iterations: default_iterations(),
            range_noise_std: 0.02,
            start: Pose::new(3.0, 2.0, 0.0),
            tracking: None,
            room: RoomConfig::default(),
            filter: MclConfig::default(),
            trajectory: vec![
                OdometryDelta {
                    forward: 0.2,
                    lateral: 0.0,
                    rotation: 0.1,
                };
                default_iterations()
            ],
        }
    }
}
impl ConfigFile for SimulationConfig {}

/// Outcome of one filter cycle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalizationRecord {
    pub iteration: usize,
    pub true_x: f64,
    pub true_y: f64,
    pub true_theta: f64,
    pub estimate_x: f64,
    pub estimate_y: f64,
    pub estimate_theta: f64,
    /// Planar distance between estimate and truth (m)
    pub position_error: f64,
    /// Absolute heading difference between estimate and truth (rad)
    pub heading_error: f64,
    /// Square root of the x/y covariance trace (m)
    pub position_spread: f64,
    pub best_score: f64,
    pub effective_sample_size: f64,
}
impl LocalizationRecord {
    /// Writes records to a CSV file with a header row.
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
    /// Reads records written by [LocalizationRecord::to_csv].
    pub fn from_csv<P: AsRef<Path>>(path: P) -> io::Result<Vec<Self>> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in reader.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }
}

/// Run a scenario and collect one record per cycle.
///
/// Each cycle moves the true pose by the next odometry increment, observes a scan from the true pose, then
/// predicts, scores, estimates and resamples the filter. Sensor noise is drawn from its own generator so the
/// filter's random stream does not depend on `range_noise_std`.
///
/// # Errors
/// - [MclError::OutOfBounds] if the true pose is off the map or on an occupied cell.
/// - [MclError::InvalidParameter] for negative or non-finite `range_noise_std`.
/// - Any filter error.
pub fn run_simulation(config: &SimulationConfig) -> Result<Vec<LocalizationRecord>> {
    if !(config.range_noise_std.is_finite() && config.range_noise_std >= 0.0) {
        return Err(MclError::InvalidParameter(format!(
            "range noise must be non-negative, got {}",
            config.range_noise_std
        )));
    }
    let grid = config.room.build()?;
    check_truth(&grid, &config.start)?;
    let mut filter = match &config.tracking {
        Some(spread) => MonteCarloLocalizer::new_around(
            config.filter.clone(),
            &grid,
            &config.start,
            spread.spatial_std,
            spread.angular_spread,
        )?,
        None => MonteCarloLocalizer::new(config.filter.clone(), &grid)?,
    };
    let sensor = &config.filter.sensor;
    let noise = Normal::new(0.0, config.range_noise_std)
        .map_err(|e| MclError::InvalidParameter(e.to_string()))?;
    let mut noise_rng = StdRng::seed_from_u64(config.filter.seed.wrapping_add(1));

    let mut truth = config.start;
    let mut records = Vec::with_capacity(config.iterations);
    for iteration in 0..config.iterations {
        let odometry = if config.trajectory.is_empty() {
            OdometryDelta::default()
        } else {
            config.trajectory[iteration % config.trajectory.len()]
        };
        truth = truth.apply(&odometry);
        check_truth(&grid, &truth)?;
        let observed: Vec<f64> = simulate_scan(&truth, sensor, &grid)?
            .into_iter()
            .map(|range| (range + noise.sample(&mut noise_rng)).clamp(0.0, sensor.max_range))
            .collect();

        filter.predict(&odometry);
        filter.update_weights(&observed, &grid)?;
        let estimate = filter.get_estimate()?;
        let best_score = filter.best_particle().map_or(0.0, |p| p.weight);
        let effective_sample_size = filter.effective_sample_size();
        filter.resample(&grid)?;

        let record = LocalizationRecord {
            iteration,
            true_x: truth.x,
            true_y: truth.y,
            true_theta: truth.theta,
            estimate_x: estimate.pose.x,
            estimate_y: estimate.pose.y,
            estimate_theta: estimate.pose.theta,
            position_error: estimate.pose.distance_to(&truth),
            heading_error: estimate.pose.heading_error(&truth).abs(),
            position_spread: (estimate.covariance[(0, 0)] + estimate.covariance[(1, 1)]).sqrt(),
            best_score,
            effective_sample_size,
        };
        debug!(
            "iteration {}: position error {:.3} m, heading error {:.3} rad, best score {:.3}",
            iteration, record.position_error, record.heading_error, record.best_score
        );
        records.push(record);
    }
    Ok(records)
}

fn check_truth(grid: &OccupancyGrid, pose: &Pose) -> Result<()> {
    match grid.pose_cell(pose) {
        Some(cell) if !grid.is_occupied(&cell) => Ok(()),
        _ => Err(MclError::OutOfBounds {
            context: "true pose",
            x: pose.x,
            y: pose.y,
        }),
    }
}

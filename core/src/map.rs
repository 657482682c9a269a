//! Occupancy grid map.
//!
//! The grid is loaded or built once and then only borrowed immutably by the localization code. Cells are
//! stored row-major as [CellState] values.
use crate::error::{MclError, Result};
use crate::geometry::{to_grid, to_index, to_world};
use crate::{GridCell, Pose};

use serde::{Deserialize, Serialize};

/// Occupancy value the original map format uses for a certainly occupied cell.
pub const DEFAULT_OCCUPIED_THRESHOLD: i8 = 100;

/// State of a single map cell
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellState {
    #[default]
    Free,
    Occupied,
    Unknown,
}
impl CellState {
    /// Convert a ROS-style occupancy value (-1 unknown, 0..=100 probability of occupancy).
    pub fn from_occupancy(value: i8, occupied_threshold: i8) -> CellState {
        if value < 0 {
            CellState::Unknown
        } else if value >= occupied_threshold {
            CellState::Occupied
        } else {
            CellState::Free
        }
    }
}

/// A static 2D occupancy grid.
#[derive(Clone, Debug, PartialEq)]
pub struct OccupancyGrid {
    width: usize,
    height: usize,
    resolution: f64,
    origin: (f64, f64),
    cells: Vec<CellState>,
}

impl OccupancyGrid {
    /// Create a grid from a row-major cell array.
    ///
    /// # Errors
    /// [MclError::InvalidGrid] if the grid is empty, the resolution is not a positive finite number, or
    /// `cells.len() != width * height`.
    pub fn new(
        width: usize,
        height: usize,
        resolution: f64,
        origin: (f64, f64),
        cells: Vec<CellState>,
    ) -> Result<OccupancyGrid> {
        if width == 0 || height == 0 {
            return Err(MclError::InvalidGrid(format!(
                "grid must have at least one cell, got {}x{}",
                width, height
            )));
        }
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(MclError::InvalidGrid(format!(
                "resolution must be positive, got {}",
                resolution
            )));
        }
        if !(origin.0.is_finite() && origin.1.is_finite()) {
            return Err(MclError::InvalidGrid("origin must be finite".to_string()));
        }
        let max_x = origin.0 + width as f64 * resolution;
        let max_y = origin.1 + height as f64 * resolution;
        if !(max_x.is_finite() && max_y.is_finite() && max_x > origin.0 && max_y > origin.1) {
            return Err(MclError::InvalidGrid(format!(
                "grid extent is not representable from origin ({}, {}) at resolution {}",
                origin.0, origin.1, resolution
            )));
        }
        if cells.len() != width * height {
            return Err(MclError::InvalidGrid(format!(
                "expected {} cells for a {}x{} grid, got {}",
                width * height,
                width,
                height,
                cells.len()
            )));
        }
        Ok(OccupancyGrid {
            width,
            height,
            resolution,
            origin,
            cells,
        })
    }
    /// Create a grid where every cell has the same state.
    pub fn filled(
        width: usize,
        height: usize,
        resolution: f64,
        origin: (f64, f64),
        state: CellState,
    ) -> Result<OccupancyGrid> {
        OccupancyGrid::new(
            width,
            height,
            resolution,
            origin,
            vec![state; width * height],
        )
    }
    /// Create a grid from ROS-style occupancy values.
    ///
    /// ```rust
    /// use mcl::map::{CellState, OccupancyGrid, DEFAULT_OCCUPIED_THRESHOLD};
    /// let grid = OccupancyGrid::from_occupancy(
    ///     2, 2, 0.5, (0.0, 0.0), &[0, 100, -1, 50], DEFAULT_OCCUPIED_THRESHOLD,
    /// ).unwrap();
    /// assert_eq!(grid.state(1, 0), Some(CellState::Occupied));
    /// assert_eq!(grid.state(0, 1), Some(CellState::Unknown));
    /// assert_eq!(grid.state(1, 1), Some(CellState::Free));
    /// ```
    pub fn from_occupancy(
        width: usize,
        height: usize,
        resolution: f64,
        origin: (f64, f64),
        data: &[i8],
        occupied_threshold: i8,
    ) -> Result<OccupancyGrid> {
        let cells = data
            .iter()
            .map(|&v| CellState::from_occupancy(v, occupied_threshold))
            .collect();
        OccupancyGrid::new(width, height, resolution, origin, cells)
    }

    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    /// Cell edge length (m)
    pub fn resolution(&self) -> f64 {
        self.resolution
    }
    /// World coordinates of the lower-left corner of cell (0, 0)
    pub fn origin(&self) -> (f64, f64) {
        self.origin
    }
    pub fn cells(&self) -> &[CellState] {
        &self.cells
    }

    /// Set the state of one cell. Out-of-range cells are reported, not ignored.
    pub fn set(&mut self, col: usize, row: usize, state: CellState) -> Result<()> {
        if col >= self.width || row >= self.height {
            return Err(MclError::OutOfBounds {
                context: "cell",
                x: col as f64,
                y: row as f64,
            });
        }
        let index = to_index(col, row, self.width);
        self.cells[index] = state;
        Ok(())
    }
    /// State of cell `(col, row)`, `None` outside the grid.
    pub fn state(&self, col: usize, row: usize) -> Option<CellState> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.cells.get(to_index(col, row, self.width)).copied()
    }
    /// State of a possibly out-of-range cell, `None` outside the grid.
    pub fn state_at(&self, cell: &GridCell) -> Option<CellState> {
        if !self.contains(cell) {
            return None;
        }
        self.state(cell.col as usize, cell.row as usize)
    }
    pub fn contains(&self, cell: &GridCell) -> bool {
        cell.col >= 0
            && cell.row >= 0
            && (cell.col as u64) < self.width as u64
            && (cell.row as u64) < self.height as u64
    }
    pub fn is_occupied(&self, cell: &GridCell) -> bool {
        self.state_at(cell) == Some(CellState::Occupied)
    }

    /// Cell containing the world point `(x, y)`, `None` outside the grid.
    pub fn world_to_cell(&self, x: f64, y: f64) -> Option<GridCell> {
        to_grid(
            x,
            y,
            self.origin.0,
            self.origin.1,
            self.width,
            self.height,
            self.resolution,
        )
        .map(|(col, row)| GridCell::new(col as i64, row as i64))
    }
    /// Cell containing the position of `pose`, `None` outside the grid.
    pub fn pose_cell(&self, pose: &Pose) -> Option<GridCell> {
        self.world_to_cell(pose.x, pose.y)
    }
    /// World coordinates of the center of an in-grid cell.
    pub fn cell_center(&self, cell: &GridCell) -> Option<(f64, f64)> {
        if !self.contains(cell) {
            return None;
        }
        Some(to_world(
            cell.col as usize,
            cell.row as usize,
            self.origin.0,
            self.origin.1,
            self.width,
            self.height,
            self.resolution,
        ))
    }
    /// World extent `(min_x, min_y, max_x, max_y)` of the grid
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        (
            self.origin.0,
            self.origin.1,
            self.origin.0 + self.width as f64 * self.resolution,
            self.origin.1 + self.height as f64 * self.resolution,
        )
    }
    /// Fraction of cells that are occupied
    pub fn occupied_fraction(&self) -> f64 {
        let occupied = self
            .cells
            .iter()
            .filter(|c| **c == CellState::Occupied)
            .count();
        occupied as f64 / self.cells.len() as f64
    }
}

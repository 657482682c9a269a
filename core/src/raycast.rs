//! Grid traversal and ray casting.
//!
//! Casting a ray is done in two steps. First the point where the ray leaves the rectangular grid is found
//! analytically. Then every cell on the segment between the origin cell and that exit cell is enumerated with
//! an integer traversal, and the first occupied cell wins.
//!
//! ## Traversal
//!
//! [GridTraversal] steps exactly one axis per iteration, so the segment from `a` to `b` always visits
//! `1 + |Δcol| + |Δrow|` cells and never skips a corner a ray could slip through:
//!
//! ```text
//! From (0,0) to (3,2):
//!
//!     2 │     ■ ■
//!     1 │   ■ ■
//!     0 │ ■ ■
//!       └────────
//!         0 1 2 3
//! ```
//!
//! ## Exit point
//!
//! Bearings are split into the four open quadrants bounded by 0, π/2, π and 3π/2. Inside a quadrant the ray
//! can only leave through one horizontal edge (top or bottom) and one vertical edge (left or right). Both
//! intersections are computed from the tangent of the bearing relative to the quadrant's reference axis; the
//! one that lands inside the other axis' extent is the exit. The four axis-aligned bearings are handled
//! explicitly before any tangent is taken.
use crate::error::{MclError, Result};
use crate::map::OccupancyGrid;
use crate::{GridCell, wrap_to_2pi};

use std::f64::consts::{FRAC_PI_2, PI};

const THREE_HALVES_PI: f64 = 3.0 * FRAC_PI_2;
/// Slack (in cells) allowed when checking an edge intersection against the grid extent.
const EDGE_TOLERANCE: f64 = 1e-9;

/// Iterator over the cells crossed by the segment between two cell centers.
///
/// Integer only: the error term starts at `Δcol - Δrow`; when it is non-negative the column advances and
/// `2·Δrow` is subtracted, otherwise the row advances and `2·Δcol` is added.
#[derive(Clone, Debug)]
pub struct GridTraversal {
    col: i64,
    row: i64,
    col_step: i64,
    row_step: i64,
    double_dcol: i64,
    double_drow: i64,
    error: i64,
    remaining: u64,
}

impl GridTraversal {
    pub fn new(start: GridCell, end: GridCell) -> GridTraversal {
        let dcol = (end.col - start.col).abs();
        let drow = (end.row - start.row).abs();
        GridTraversal {
            col: start.col,
            row: start.row,
            col_step: if end.col > start.col { 1 } else { -1 },
            row_step: if end.row > start.row { 1 } else { -1 },
            double_dcol: 2 * dcol,
            double_drow: 2 * drow,
            error: dcol - drow,
            remaining: 1 + dcol as u64 + drow as u64,
        }
    }
}

impl Iterator for GridTraversal {
    type Item = GridCell;

    fn next(&mut self) -> Option<GridCell> {
        if self.remaining == 0 {
            return None;
        }
        let cell = GridCell::new(self.col, self.row);
        self.remaining -= 1;
        if self.error >= 0 {
            self.col += self.col_step;
            self.error -= self.double_drow;
        } else {
            self.row += self.row_step;
            self.error += self.double_dcol;
        }
        Some(cell)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

/// All cells from `start` to `end` inclusive, in traversal order.
///
/// ```rust
/// use mcl::GridCell;
/// use mcl::raycast::traverse;
///
/// let cells = traverse(GridCell::new(0, 0), GridCell::new(2, 1));
/// assert_eq!(cells.len(), 4);
/// assert_eq!(cells.first(), Some(&GridCell::new(0, 0)));
/// assert_eq!(cells.last(), Some(&GridCell::new(2, 1)));
/// ```
pub fn traverse(start: GridCell, end: GridCell) -> Vec<GridCell> {
    GridTraversal::new(start, end).collect()
}

/// Point, in continuous cell coordinates, where a ray from the center of `origin` leaves a
/// `width` x `height` grid.
///
/// Cell coordinates put cell `(c, r)` at `[c, c+1) x [r, r+1)`, so the grid spans `[0, width] x [0, height]`.
///
/// # Errors
/// - [MclError::DegenerateBearing] for a non-finite bearing.
/// - [MclError::OutOfBounds] if `origin` is not inside the grid or no edge intersection lies on the grid
///   boundary.
pub fn exit_point(origin: &GridCell, bearing: f64, width: usize, height: usize) -> Result<(f64, f64)> {
    if !bearing.is_finite() {
        return Err(MclError::DegenerateBearing(bearing));
    }
    if origin.col < 0
        || origin.row < 0
        || origin.col as u64 >= width as u64
        || origin.row as u64 >= height as u64
    {
        return Err(MclError::OutOfBounds {
            context: "ray origin cell",
            x: origin.col as f64,
            y: origin.row as f64,
        });
    }
    let angle = wrap_to_2pi(bearing);
    let max_x = width as f64;
    let max_y = height as f64;
    let x0 = origin.col as f64 + 0.5;
    let y0 = origin.row as f64 + 0.5;

    // Axis-aligned rays have no usable tangent
    if angle == 0.0 {
        return Ok((max_x, y0));
    }
    if angle == FRAC_PI_2 {
        return Ok((x0, max_y));
    }
    if angle == PI {
        return Ok((0.0, y0));
    }
    if angle == THREE_HALVES_PI {
        return Ok((x0, 0.0));
    }

    // (reference angle, x direction, y direction, vertical edge x, horizontal edge y)
    let (reference, x_sign, y_sign, edge_x, edge_y) = if angle < FRAC_PI_2 {
        (angle, 1.0, 1.0, max_x, max_y)
    } else if angle < PI {
        (PI - angle, -1.0, 1.0, 0.0, max_y)
    } else if angle < THREE_HALVES_PI {
        (angle - PI, -1.0, -1.0, 0.0, 0.0)
    } else {
        (2.0 * PI - angle, 1.0, -1.0, max_x, 0.0)
    };
    let tangent = reference.tan();
    if !(tangent.is_finite() && tangent > 0.0) {
        return Err(MclError::DegenerateBearing(bearing));
    }

    let calc_x = x0 + x_sign * (edge_y - y0).abs() / tangent;
    if (-EDGE_TOLERANCE..=max_x + EDGE_TOLERANCE).contains(&calc_x) {
        return Ok((calc_x.clamp(0.0, max_x), edge_y));
    }
    let calc_y = y0 + y_sign * (edge_x - x0).abs() * tangent;
    if (-EDGE_TOLERANCE..=max_y + EDGE_TOLERANCE).contains(&calc_y) {
        return Ok((edge_x, calc_y.clamp(0.0, max_y)));
    }
    Err(MclError::OutOfBounds {
        context: "ray exit point",
        x: calc_x,
        y: calc_y,
    })
}

/// Last in-grid cell on a ray from the center of `origin`.
pub fn exit_cell(origin: &GridCell, bearing: f64, width: usize, height: usize) -> Result<GridCell> {
    let (x, y) = exit_point(origin, bearing, width, height)?;
    let col = (x.floor() as i64).clamp(0, width as i64 - 1);
    let row = (y.floor() as i64).clamp(0, height as i64 - 1);
    Ok(GridCell::new(col, row))
}

/// First occupied cell hit by a ray cast from `origin` along `bearing`, or `None` if the ray leaves the grid
/// without hitting anything. The origin cell itself is included in the search.
///
/// ```rust
/// use mcl::GridCell;
/// use mcl::map::{CellState, OccupancyGrid};
/// use mcl::raycast::cast;
///
/// let mut grid = OccupancyGrid::filled(5, 5, 1.0, (0.0, 0.0), CellState::Free).unwrap();
/// grid.set(4, 2, CellState::Occupied).unwrap();
/// assert_eq!(cast(&GridCell::new(0, 2), 0.0, &grid).unwrap(), Some(GridCell::new(4, 2)));
/// assert_eq!(cast(&GridCell::new(0, 2), std::f64::consts::PI, &grid).unwrap(), None);
/// ```
pub fn cast(origin: &GridCell, bearing: f64, grid: &OccupancyGrid) -> Result<Option<GridCell>> {
    let end = exit_cell(origin, bearing, grid.width(), grid.height())?;
    Ok(GridTraversal::new(*origin, end).find(|cell| grid.is_occupied(cell)))
}

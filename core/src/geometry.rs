//! World <-> grid coordinate conversions.
//!
//! Pure functions over the raw grid parameters (origin, size, resolution), kept separate from
//! [crate::map::OccupancyGrid] so callers holding only grid metadata can use them too.

/// Convert a world position to the `(col, row)` of the cell containing it.
///
/// Returns `None` when the position falls outside the `width` x `height` grid.
///
/// ```rust
/// use mcl::geometry::to_grid;
/// assert_eq!(to_grid(1.5, 0.2, 0.0, 0.0, 4, 4, 1.0), Some((1, 0)));
/// assert_eq!(to_grid(-0.1, 0.2, 0.0, 0.0, 4, 4, 1.0), None);
/// ```
pub fn to_grid(
    x: f64,
    y: f64,
    origin_x: f64,
    origin_y: f64,
    width: usize,
    height: usize,
    resolution: f64,
) -> Option<(usize, usize)> {
    let col = ((x - origin_x) / resolution).floor();
    let row = ((y - origin_y) / resolution).floor();
    if !col.is_finite() || !row.is_finite() {
        return None;
    }
    if col < 0.0 || row < 0.0 || col >= width as f64 || row >= height as f64 {
        return None;
    }
    Some((col as usize, row as usize))
}

/// World coordinates of the center of cell `(col, row)`.
pub fn to_world(
    col: usize,
    row: usize,
    origin_x: f64,
    origin_y: f64,
    _width: usize,
    _height: usize,
    resolution: f64,
) -> (f64, f64) {
    (
        origin_x + (col as f64 + 0.5) * resolution,
        origin_y + (row as f64 + 0.5) * resolution,
    )
}

/// Row-major linear index of cell `(col, row)`.
pub fn to_index(col: usize, row: usize, width: usize) -> usize {
    row * width + col
}

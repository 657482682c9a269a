//! Grid ray-casting and Monte Carlo Localization toolbox
//!
//! This crate simulates what a rotating range sensor (a 2D laser scanner, for example) would measure from a
//! hypothesised robot pose inside a known occupancy grid, and uses the similarity between simulated and real
//! readings to maintain and resample a population of pose hypotheses: a Monte Carlo Localization (MCL)
//! particle filter. The occupancy grid is treated as static and already built. This crate does not build or
//! refine maps, does not talk to sensor drivers, and does not fuse multiple sensors. Map and scan data are
//! handed to it in memory by the caller.
//!
//! Primarily built off of the following crate dependencies:
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): random
//!   number generation for pose sampling and perturbation.
//! - [`rayon`](https://crates.io/crates/rayon): per-particle scoring and perturbation on a worker pool.
//! - [`nalgebra`](https://crates.io/crates/nalgebra): covariance of the particle cloud.
//! - [`serde`](https://crates.io/crates/serde): configuration files (JSON, YAML, TOML) and CSV results.
//!
//! ## Crate overview
//!
//! - [geometry]: world <-> grid coordinate conversions and row-major indexing.
//! - [map]: the occupancy grid and its cell states.
//! - [raycast]: integer grid traversal and ray casting against the grid boundary and occupied cells.
//! - [scan]: range sensor configuration, simulated scans, and scan similarity scoring.
//! - [particle]: particles, rejection sampling of valid poses, and importance resampling.
//! - [filter]: the [filter::MonteCarloLocalizer] that ties the above into a predict/update/resample loop.
//! - [config]: serialisable filter configuration.
//! - [sim]: synthetic room scenarios for exercising the filter end to end.
//!
//! ## Coordinate conventions
//!
//! World coordinates are metric `(x, y)` with headings measured counter-clockwise from the +x axis and kept in
//! `[0, 2π)`. Grid cells are addressed as `(col, row)` where the column grows along +x and the row along +y.
//! Cell `(0, 0)` has its lower-left corner at the grid origin. Cell data is stored row-major, so the linear
//! index of `(col, row)` is `row * width + col`.
//!
//! ## Filter cycle
//!
//! ```text
//! sample/perturb poses ──> simulate scan per pose ──> score against observed scan
//!          ^                                                     │
//!          └──────────── resample (score, pose) population <─────┘
//! ```
//!
//! Within one cycle every particle is independent. Scoring and perturbation are spread across a `rayon` pool
//! with a per-task generator seeded from the filter's own seeded generator. The grid is only ever borrowed
//! immutably during a cycle.
pub mod config;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod map;
pub mod particle;
pub mod raycast;
pub mod scan;
pub mod sim;

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::fmt::{self, Display};

pub use error::{MclError, Result};

/// A continuous robot pose in world coordinates.
///
/// `theta` is always kept in `[0, 2π)`; use [Pose::new] to construct one from an arbitrary heading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// World x coordinate (m)
    pub x: f64,
    /// World y coordinate (m)
    pub y: f64,
    /// Heading (rad), counter-clockwise from +x
    pub theta: f64,
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pose")
            .field("x", &format_args!("{:.3}", self.x))
            .field("y", &format_args!("{:.3}", self.y))
            .field("theta", &format_args!("{:.4}", self.theta))
            .finish()
    }
}
impl Pose {
    /// Create a pose, wrapping the heading into `[0, 2π)`.
    pub fn new(x: f64, y: f64, theta: f64) -> Pose {
        Pose {
            x,
            y,
            theta: wrap_to_2pi(theta),
        }
    }
    /// Planar distance between the positions of two poses (m)
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
    /// Smallest signed heading difference `self - other`, in `(-π, π]`
    pub fn heading_error(&self, other: &Pose) -> f64 {
        wrap_to_pi(self.theta - other.theta)
    }
    /// Apply an odometry increment expressed in this pose's own heading frame.
    ///
    /// ```rust
    /// use mcl::{OdometryDelta, Pose};
    /// use std::f64::consts::FRAC_PI_2;
    ///
    /// let pose = Pose::new(1.0, 1.0, FRAC_PI_2);
    /// let moved = pose.apply(&OdometryDelta { forward: 2.0, lateral: 0.0, rotation: 0.0 });
    /// assert!((moved.x - 1.0).abs() < 1e-12);
    /// assert!((moved.y - 3.0).abs() < 1e-12);
    /// ```
    pub fn apply(&self, delta: &OdometryDelta) -> Pose {
        let (sin, cos) = self.theta.sin_cos();
        Pose::new(
            self.x + delta.forward * cos - delta.lateral * sin,
            self.y + delta.forward * sin + delta.lateral * cos,
            self.theta + delta.rotation,
        )
    }
}

/// Integer grid cell address, column along +x and row along +y.
///
/// Cells produced by [raycast::traverse] may lie outside a particular grid; [map::OccupancyGrid::contains]
/// decides validity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub col: i64,
    pub row: i64,
}
impl GridCell {
    pub fn new(col: i64, row: i64) -> GridCell {
        GridCell { col, row }
    }
    /// Euclidean distance between two cells, in cells
    pub fn distance_to(&self, other: &GridCell) -> f64 {
        ((self.col - other.col) as f64).hypot((self.row - other.row) as f64)
    }
}
impl Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// Relative motion between two consecutive filter cycles.
///
/// `forward` and `lateral` are expressed in the robot frame at the start of the motion; `rotation` is the
/// heading change in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OdometryDelta {
    pub forward: f64,
    pub lateral: f64,
    pub rotation: f64,
}

/// Wrap an angle in radians to the range `[0, 2π)`
///
/// # Example
/// ```rust
/// use mcl::wrap_to_2pi;
/// use std::f64::consts::PI;
/// assert!((wrap_to_2pi(5.0 * PI) - PI).abs() < 1e-12);
/// assert!((wrap_to_2pi(-PI / 2.0) - 1.5 * PI).abs() < 1e-12);
/// ```
pub fn wrap_to_2pi(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid rounds tiny negative inputs up to exactly 2π
    if wrapped >= TAU { 0.0 } else { wrapped }
}
/// Wrap an angle in radians to the range `(-π, π]`
pub fn wrap_to_pi(angle: f64) -> f64 {
    let wrapped = wrap_to_2pi(angle);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_wrap_to_2pi() {
        assert_approx_eq!(wrap_to_2pi(3.0 * PI), PI, 1e-12);
        assert_approx_eq!(wrap_to_2pi(-FRAC_PI_2), 3.0 * FRAC_PI_2, 1e-12);
        assert_eq!(wrap_to_2pi(0.0), 0.0);
        assert_eq!(wrap_to_2pi(TAU), 0.0);
        let tiny = wrap_to_2pi(-1e-20);
        assert!((0.0..TAU).contains(&tiny));
    }
    #[test]
    fn test_wrap_to_pi() {
        assert_approx_eq!(wrap_to_pi(3.0 * PI), PI, 1e-12);
        assert_approx_eq!(wrap_to_pi(1.5 * PI), -FRAC_PI_2, 1e-12);
        assert_eq!(wrap_to_pi(0.0), 0.0);
    }
    #[test]
    fn pose_new_wraps_heading() {
        let pose = Pose::new(1.0, 2.0, -FRAC_PI_2);
        assert_approx_eq!(pose.theta, 3.0 * FRAC_PI_2, 1e-12);
    }
    #[test]
    fn pose_apply_rotates_into_heading_frame() {
        let pose = Pose::new(0.0, 0.0, PI);
        let moved = pose.apply(&OdometryDelta {
            forward: 1.0,
            lateral: 1.0,
            rotation: PI,
        });
        assert_approx_eq!(moved.x, -1.0, 1e-12);
        assert_approx_eq!(moved.y, -1.0, 1e-12);
        assert_approx_eq!(moved.theta, 0.0, 1e-12);
    }
    #[test]
    fn heading_error_is_shortest_arc() {
        let a = Pose::new(0.0, 0.0, 0.1);
        let b = Pose::new(0.0, 0.0, TAU - 0.1);
        assert_approx_eq!(a.heading_error(&b), 0.2, 1e-12);
        assert_approx_eq!(b.heading_error(&a), -0.2, 1e-12);
    }
    #[test]
    fn grid_cell_distance() {
        let a = GridCell::new(0, 0);
        let b = GridCell::new(3, 4);
        assert_approx_eq!(a.distance_to(&b), 5.0, 1e-12);
    }
}

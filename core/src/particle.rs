//! Particles, valid-pose sampling, and importance resampling.
//!
//! A particle is a weighted pose hypothesis. New poses are only ever produced by [ParticleSampler], which
//! rejects any candidate landing off the map or on an occupied cell and gives up after a bounded number of
//! attempts. [ParticleResampler] draws a new population from a scored one and perturbs every draw through
//! the sampler, with the perturbation magnitude chosen by a [PerturbationStrategy].
use crate::error::{MclError, Result};
use crate::map::{CellState, OccupancyGrid};
use crate::{Pose, wrap_to_2pi, wrap_to_pi};

use log::{trace, warn};
use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Uniform};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt::{self, Display};

/// Default cap on rejection-sampling attempts per pose
pub const DEFAULT_MAX_ATTEMPTS: usize = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Particle {
    pub pose: Pose,
    /// Unnormalized, non-negative score
    pub weight: f64,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("x", &self.pose.x)
            .field("y", &self.pose.y)
            .field("theta", &self.pose.theta)
            .field("weight", &self.weight)
            .finish()
    }
}
impl Particle {
    pub fn new(pose: Pose, weight: f64) -> Particle {
        Particle { pose, weight }
    }
}

/// Draws valid poses by bounded rejection sampling.
#[derive(Clone, Debug)]
pub struct ParticleSampler {
    /// Attempts before giving up with [MclError::SamplingExhausted]
    pub max_attempts: usize,
    /// Treat UNKNOWN cells as invalid as well as OCCUPIED ones
    pub reject_unknown: bool,
}
impl Default for ParticleSampler {
    fn default() -> Self {
        ParticleSampler {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            reject_unknown: false,
        }
    }
}
impl ParticleSampler {
    pub fn new(max_attempts: usize, reject_unknown: bool) -> ParticleSampler {
        ParticleSampler {
            max_attempts,
            reject_unknown,
        }
    }
    /// Whether a robot could stand at world position `(x, y)`.
    pub fn is_valid_position(&self, grid: &OccupancyGrid, x: f64, y: f64) -> bool {
        match grid.world_to_cell(x, y).and_then(|cell| grid.state_at(&cell)) {
            Some(CellState::Free) => true,
            Some(CellState::Unknown) => !self.reject_unknown,
            Some(CellState::Occupied) | None => false,
        }
    }
    /// A uniformly random valid pose on the grid.
    ///
    /// Position is uniform over the grid's world extent and heading uniform over `[0, 2π)`.
    ///
    /// # Errors
    /// [MclError::SamplingExhausted] if no valid pose is found within `max_attempts` draws.
    pub fn sample_uniform<R: Rng + ?Sized>(&self, grid: &OccupancyGrid, rng: &mut R) -> Result<Pose> {
        let (min_x, min_y, max_x, max_y) = grid.bounds();
        for _ in 0..self.max_attempts {
            let x = rng.random_range(min_x..max_x);
            let y = rng.random_range(min_y..max_y);
            if self.is_valid_position(grid, x, y) {
                let theta = rng.random_range(0.0..TAU);
                return Ok(Pose::new(x, y, theta));
            }
            trace!("rejected uniform sample ({:.3}, {:.3})", x, y);
        }
        Err(MclError::SamplingExhausted {
            attempts: self.max_attempts,
        })
    }
    /// A valid pose near `parent`.
    ///
    /// Position is drawn from a Gaussian around the parent with standard deviation `spatial_std` per axis and
    /// redrawn until it lands on a valid cell. Heading is drawn uniformly from
    /// `[parent.theta - angle_spread, parent.theta + angle_spread]`.
    ///
    /// # Errors
    /// - [MclError::InvalidParameter] for negative or non-finite noise magnitudes.
    /// - [MclError::SamplingExhausted] if no valid position is found within `max_attempts` draws.
    pub fn perturb<R: Rng + ?Sized>(
        &self,
        parent: &Pose,
        spatial_std: f64,
        angle_spread: f64,
        grid: &OccupancyGrid,
        rng: &mut R,
    ) -> Result<Pose> {
        if !(spatial_std.is_finite() && spatial_std >= 0.0) {
            return Err(MclError::InvalidParameter(format!(
                "spatial noise must be non-negative, got {}",
                spatial_std
            )));
        }
        if !(angle_spread.is_finite() && angle_spread >= 0.0) {
            return Err(MclError::InvalidParameter(format!(
                "angular noise must be non-negative, got {}",
                angle_spread
            )));
        }
        let normal_x = Normal::new(parent.x, spatial_std)
            .map_err(|e| MclError::InvalidParameter(e.to_string()))?;
        let normal_y = Normal::new(parent.y, spatial_std)
            .map_err(|e| MclError::InvalidParameter(e.to_string()))?;
        let heading = Uniform::new_inclusive(parent.theta - angle_spread, parent.theta + angle_spread)
            .map_err(|e| MclError::InvalidParameter(e.to_string()))?;
        for _ in 0..self.max_attempts {
            let x = normal_x.sample(rng);
            let y = normal_y.sample(rng);
            if self.is_valid_position(grid, x, y) {
                return Ok(Pose::new(x, y, heading.sample(rng)));
            }
            trace!("rejected perturbed sample ({:.3}, {:.3}) around {}", x, y, parent);
        }
        Err(MclError::SamplingExhausted {
            attempts: self.max_attempts,
        })
    }
}

/// How much noise a resampled particle receives.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum PerturbationStrategy {
    /// `1 - normalized score` as both the spatial standard deviation (m) and the angular half-width (rad):
    /// the best-scoring particle is copied unperturbed, the worst receives unit noise.
    #[default]
    ScoreInverse,
    /// The same noise for every particle regardless of score.
    Fixed { spatial_std: f64, angular_spread: f64 },
}
impl PerturbationStrategy {
    /// `(spatial_std, angular_spread)` for a particle with normalized score in `[0, 1]`.
    pub fn noise(&self, normalized_score: f64) -> (f64, f64) {
        match self {
            PerturbationStrategy::ScoreInverse => {
                let spread = 1.0 - normalized_score.clamp(0.0, 1.0);
                (spread, spread)
            }
            PerturbationStrategy::Fixed {
                spatial_std,
                angular_spread,
            } => (*spatial_std, *angular_spread),
        }
    }
}

/// Min-max normalize scores into `[0, 1]`. When every score is equal all of them normalize to 1.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max > min {
        let range = max - min;
        scores.iter().map(|s| (s - min) / range).collect()
    } else {
        vec![1.0; scores.len()]
    }
}

/// Indices selected by an evenly spaced walk over the cumulative normalized scores.
///
/// The step is `sum / (n + 1)` and the walk starts at a uniform offset in `[0, step)`. For each of the `n`
/// draws the cursor advances until the running sum reaches the current target. Order of `normalized` is
/// preserved, so an index can be selected several times and zero-score entries are skipped.
///
/// # Errors
/// [MclError::InvalidPopulation] for `n == 0`, an empty input, or scores that do not sum to a positive
/// finite value.
pub fn select_indices<R: Rng + ?Sized>(normalized: &[f64], n: usize, rng: &mut R) -> Result<Vec<usize>> {
    if n == 0 {
        return Err(MclError::InvalidPopulation(
            "number of particles must be positive".to_string(),
        ));
    }
    if normalized.is_empty() {
        return Err(MclError::InvalidPopulation(
            "cannot select from an empty population".to_string(),
        ));
    }
    let total: f64 = normalized.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(MclError::InvalidPopulation(format!(
            "normalized scores must sum to a positive value, got {}",
            total
        )));
    }
    let gap = total / (n + 1) as f64;
    let start = rng.random_range(0.0..gap);

    let last = normalized.len() - 1;
    let mut cursor = 0;
    let mut cumulative = normalized[0];
    let mut clamped = false;
    let mut indices = Vec::with_capacity(n);
    for k in 0..n {
        let target = start + k as f64 * gap;
        while cumulative < target {
            if cursor == last {
                clamped = true;
                break;
            }
            cursor += 1;
            cumulative += normalized[cursor];
        }
        indices.push(cursor);
    }
    if clamped {
        warn!(
            "selection walk ran past the population (sum {:.6e}); clamped to the last particle",
            total
        );
    }
    Ok(indices)
}

/// Importance resampling with per-draw perturbation.
#[derive(Clone, Debug, Default)]
pub struct ParticleResampler {
    pub sampler: ParticleSampler,
    pub strategy: PerturbationStrategy,
    /// Replace a draw whose perturbation is exhausted with a uniformly sampled pose instead of failing
    pub reseed_exhausted: bool,
}
impl ParticleResampler {
    pub fn new(sampler: ParticleSampler, strategy: PerturbationStrategy) -> ParticleResampler {
        ParticleResampler {
            sampler,
            strategy,
            reseed_exhausted: false,
        }
    }
    pub fn with_reseed_exhausted(mut self, reseed_exhausted: bool) -> ParticleResampler {
        self.reseed_exhausted = reseed_exhausted;
        self
    }
    /// Draw `n_particles` new poses from a `(score, pose)` population.
    ///
    /// Scores are min-max normalized, indices are chosen with [select_indices], and every chosen pose is
    /// perturbed with the noise the [PerturbationStrategy] assigns to its normalized score. Perturbations run in
    /// parallel, each with its own generator seeded from `rng`.
    ///
    /// # Errors
    /// - [MclError::InvalidPopulation] for `n_particles == 0`, an empty population, or negative/non-finite
    ///   scores.
    /// - Any error from [ParticleSampler::perturb]. With `reseed_exhausted` set, an exhausted perturbation is
    ///   replaced by [ParticleSampler::sample_uniform] and only fails if that is exhausted too.
    pub fn resample<R: Rng + ?Sized>(
        &self,
        weighted: &[(f64, Pose)],
        n_particles: usize,
        grid: &OccupancyGrid,
        rng: &mut R,
    ) -> Result<Vec<Pose>> {
        if n_particles == 0 {
            return Err(MclError::InvalidPopulation(
                "number of particles must be positive".to_string(),
            ));
        }
        if weighted.is_empty() {
            return Err(MclError::InvalidPopulation(
                "cannot resample an empty population".to_string(),
            ));
        }
        if let Some((score, _)) = weighted
            .iter()
            .find(|(score, _)| !(score.is_finite() && *score >= 0.0))
        {
            return Err(MclError::InvalidPopulation(format!(
                "scores must be finite and non-negative, got {}",
                score
            )));
        }
        let scores: Vec<f64> = weighted.iter().map(|(score, _)| *score).collect();
        let normalized = normalize_scores(&scores);
        let indices = select_indices(&normalized, n_particles, rng)?;
        let seeds: Vec<u64> = (0..n_particles).map(|_| rng.random()).collect();
        let poses = indices
            .par_iter()
            .zip(seeds.par_iter())
            .map(|(&index, &seed)| {
                let mut local_rng = StdRng::seed_from_u64(seed);
                let (spatial_std, angle_spread) = self.strategy.noise(normalized[index]);
                let parent = &weighted[index].1;
                match self
                    .sampler
                    .perturb(parent, spatial_std, angle_spread, grid, &mut local_rng)
                {
                    Err(MclError::SamplingExhausted { .. }) if self.reseed_exhausted => {
                        warn!("no valid pose near {}; drawing a uniform replacement", parent);
                        self.sampler.sample_uniform(grid, &mut local_rng)
                    }
                    result => result,
                }
            })
            .collect::<Result<Vec<Pose>>>()?;
        Ok(poses)
    }
}

/// Effective number of particles, `(Σw)² / Σw²`. Zero when every weight is zero.
pub fn effective_sample_size(particles: &[Particle]) -> f64 {
    let sum: f64 = particles.iter().map(|p| p.weight).sum();
    let sum_of_squares: f64 = particles.iter().map(|p| p.weight * p.weight).sum();
    if sum_of_squares > 0.0 {
        sum * sum / sum_of_squares
    } else {
        0.0
    }
}

/// Single pose estimate of a particle cloud
#[derive(Clone, Debug, PartialEq)]
pub struct PoseEstimate {
    pub pose: Pose,
    /// Covariance of (x, y, theta); heading residuals are wrapped to `(-π, π]`
    pub covariance: Matrix3<f64>,
}

/// How the particle cloud is reduced to a single pose.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum ParticleAveragingStrategy {
    /// Weight-averaged position and circular mean heading. Falls back to the unweighted average when every
    /// weight is zero.
    #[default]
    WeightedAverage,
    UnweightedAverage,
    HighestWeight,
}
impl ParticleAveragingStrategy {
    pub fn estimate(&self, particles: &[Particle]) -> Result<PoseEstimate> {
        if particles.is_empty() {
            return Err(MclError::InvalidPopulation(
                "cannot estimate from an empty population".to_string(),
            ));
        }
        match self {
            ParticleAveragingStrategy::WeightedAverage => {
                let total: f64 = particles.iter().map(|p| p.weight).sum();
                if total > 0.0 && total.is_finite() {
                    let weights: Vec<f64> = particles.iter().map(|p| p.weight / total).collect();
                    Ok(Self::weighted_average_state(particles, &weights))
                } else {
                    Ok(Self::unweighted_average_state(particles))
                }
            }
            ParticleAveragingStrategy::UnweightedAverage => {
                Ok(Self::unweighted_average_state(particles))
            }
            ParticleAveragingStrategy::HighestWeight => Ok(Self::highest_weight_state(particles)),
        }
    }
    fn weighted_average_state(particles: &[Particle], weights: &[f64]) -> PoseEstimate {
        let mut x = 0.0;
        let mut y = 0.0;
        let mut sin = 0.0;
        let mut cos = 0.0;
        for (particle, w) in particles.iter().zip(weights) {
            x += w * particle.pose.x;
            y += w * particle.pose.y;
            sin += w * particle.pose.theta.sin();
            cos += w * particle.pose.theta.cos();
        }
        let mean = Pose::new(x, y, wrap_to_2pi(sin.atan2(cos)));
        let mut covariance = Matrix3::<f64>::zeros();
        for (particle, w) in particles.iter().zip(weights) {
            let diff = Vector3::new(
                particle.pose.x - mean.x,
                particle.pose.y - mean.y,
                wrap_to_pi(particle.pose.theta - mean.theta),
            );
            covariance += *w * diff * diff.transpose();
        }
        PoseEstimate {
            pose: mean,
            covariance,
        }
    }
    fn unweighted_average_state(particles: &[Particle]) -> PoseEstimate {
        let uniform = vec![1.0 / particles.len() as f64; particles.len()];
        Self::weighted_average_state(particles, &uniform)
    }
    fn highest_weight_state(particles: &[Particle]) -> PoseEstimate {
        let best = particles
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
            .map(|p| p.pose)
            .unwrap_or_default();
        PoseEstimate {
            pose: best,
            covariance: Matrix3::<f64>::zeros(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn open_grid(size: usize) -> OccupancyGrid {
        OccupancyGrid::filled(size, size, 1.0, (0.0, 0.0), CellState::Free).unwrap()
    }

    #[test]
    fn sample_uniform_stays_on_free_cells() {
        let mut rng = StdRng::seed_from_u64(3);
        let sampler = ParticleSampler::default();
        for density in [0.0, 0.3, 0.7, 0.95] {
            let mut grid = open_grid(20);
            for col in 0..20 {
                for row in 0..20 {
                    if rng.random::<f64>() < density {
                        grid.set(col, row, CellState::Occupied).unwrap();
                    }
                }
            }
            for _ in 0..200 {
                match sampler.sample_uniform(&grid, &mut rng) {
                    Ok(pose) => {
                        let cell = grid.pose_cell(&pose).unwrap();
                        assert!(!grid.is_occupied(&cell));
                        assert!((0.0..TAU).contains(&pose.theta));
                    }
                    Err(e) => assert!(matches!(e, MclError::SamplingExhausted { .. })),
                }
            }
        }
    }
    #[test]
    fn sample_uniform_on_full_grid_is_exhausted() {
        let grid = OccupancyGrid::filled(4, 4, 1.0, (0.0, 0.0), CellState::Occupied).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let result = ParticleSampler::default().sample_uniform(&grid, &mut rng);
        assert_eq!(result, Err(MclError::SamplingExhausted { attempts: 100 }));
    }
    #[test]
    fn reject_unknown_excludes_unknown_cells() {
        let mut grid = OccupancyGrid::filled(2, 1, 1.0, (0.0, 0.0), CellState::Unknown).unwrap();
        grid.set(1, 0, CellState::Free).unwrap();
        let sampler = ParticleSampler::new(500, true);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            let pose = sampler.sample_uniform(&grid, &mut rng).unwrap();
            assert!(pose.x >= 1.0);
        }
        assert!(ParticleSampler::default().is_valid_position(&grid, 0.5, 0.5));
    }
    #[test]
    fn perturb_with_zero_noise_copies_parent() {
        let grid = open_grid(5);
        let parent = Pose::new(2.5, 2.5, 1.0);
        let mut rng = StdRng::seed_from_u64(9);
        let child = ParticleSampler::default()
            .perturb(&parent, 0.0, 0.0, &grid, &mut rng)
            .unwrap();
        assert_approx_eq!(child.x, parent.x, 1e-12);
        assert_approx_eq!(child.y, parent.y, 1e-12);
        assert_approx_eq!(child.theta, parent.theta, 1e-12);
    }
    #[test]
    fn perturb_heading_stays_within_spread() {
        let grid = open_grid(10);
        let parent = Pose::new(5.0, 5.0, 0.05);
        let mut rng = StdRng::seed_from_u64(21);
        let sampler = ParticleSampler::default();
        for _ in 0..200 {
            let child = sampler.perturb(&parent, 0.5, 0.2, &grid, &mut rng).unwrap();
            assert!(child.heading_error(&parent).abs() <= 0.2 + 1e-12);
            assert!((0.0..TAU).contains(&child.theta));
            assert!(grid.pose_cell(&child).is_some());
        }
    }
    #[test]
    fn perturb_from_occupied_parent_without_noise_is_exhausted() {
        let mut grid = open_grid(3);
        grid.set(1, 1, CellState::Occupied).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let result =
            ParticleSampler::new(10, false).perturb(&Pose::new(1.5, 1.5, 0.0), 0.0, 0.1, &grid, &mut rng);
        assert_eq!(result, Err(MclError::SamplingExhausted { attempts: 10 }));
    }
    #[test]
    fn perturb_rejects_negative_noise() {
        let grid = open_grid(3);
        let mut rng = StdRng::seed_from_u64(2);
        let sampler = ParticleSampler::default();
        let parent = Pose::new(1.5, 1.5, 0.0);
        assert!(matches!(
            sampler.perturb(&parent, -1.0, 0.1, &grid, &mut rng),
            Err(MclError::InvalidParameter(_))
        ));
        assert!(matches!(
            sampler.perturb(&parent, 0.1, f64::NAN, &grid, &mut rng),
            Err(MclError::InvalidParameter(_))
        ));
    }
    #[test]
    fn normalize_scores_min_max() {
        let normalized = normalize_scores(&[0.1, 0.5, 0.9]);
        assert_approx_eq!(normalized[0], 0.0, 1e-12);
        assert_approx_eq!(normalized[1], 0.5, 1e-12);
        assert_approx_eq!(normalized[2], 1.0, 1e-12);
        assert_eq!(normalize_scores(&[0.3, 0.3]), vec![1.0, 1.0]);
    }
    #[test]
    fn select_indices_has_requested_length_and_is_ordered() {
        let mut rng = StdRng::seed_from_u64(17);
        let normalized = normalize_scores(&[0.2, 0.9, 0.4, 0.7, 0.1]);
        for n in [1, 2, 5, 13, 100] {
            let indices = select_indices(&normalized, n, &mut rng).unwrap();
            assert_eq!(indices.len(), n);
            assert!(indices.windows(2).all(|w| w[0] <= w[1]));
            assert!(indices.iter().all(|&i| i < normalized.len()));
        }
    }
    #[test]
    fn select_indices_skips_zero_weight_particles() {
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..100 {
            let indices = select_indices(&[0.0, 0.0, 1.0, 0.0], 10, &mut rng).unwrap();
            assert!(indices.iter().all(|&i| i == 2), "{:?}", indices);
        }
    }
    #[test]
    fn select_indices_rejects_invalid_input() {
        let mut rng = StdRng::seed_from_u64(4);
        assert!(matches!(
            select_indices(&[], 3, &mut rng),
            Err(MclError::InvalidPopulation(_))
        ));
        assert!(matches!(
            select_indices(&[1.0], 0, &mut rng),
            Err(MclError::InvalidPopulation(_))
        ));
        assert!(matches!(
            select_indices(&[0.0, 0.0], 2, &mut rng),
            Err(MclError::InvalidPopulation(_))
        ));
    }
    #[test]
    fn resample_preserves_population_size() {
        let grid = open_grid(10);
        let mut rng = StdRng::seed_from_u64(99);
        let resampler = ParticleResampler::default();
        let weighted: Vec<(f64, Pose)> = (0..7)
            .map(|i| (i as f64 * 0.1, Pose::new(1.0 + i as f64, 5.0, 0.0)))
            .collect();
        for n in [1, 3, 7, 50] {
            let poses = resampler.resample(&weighted, n, &grid, &mut rng).unwrap();
            assert_eq!(poses.len(), n);
            for pose in &poses {
                assert!(!grid.is_occupied(&grid.pose_cell(pose).unwrap()));
            }
        }
    }
    #[test]
    fn resample_with_equal_scores_keeps_everything() {
        let grid = open_grid(10);
        let mut rng = StdRng::seed_from_u64(8);
        let weighted = vec![(0.4, Pose::new(2.5, 2.5, 0.0)), (0.4, Pose::new(7.5, 7.5, 1.0))];
        // Equal scores normalize to 1, so every draw is copied without noise
        let poses = ParticleResampler::default()
            .resample(&weighted, 4, &grid, &mut rng)
            .unwrap();
        assert_eq!(poses.len(), 4);
        for pose in poses {
            assert!(pose == weighted[0].1 || pose == weighted[1].1);
        }
    }
    #[test]
    fn resample_from_occupied_parent_reports_or_reseeds() {
        let mut grid = open_grid(4);
        grid.set(1, 1, CellState::Occupied).unwrap();
        // A lone particle normalizes to 1 and is copied without noise, so every redraw lands on its occupied cell
        let weighted = vec![(0.7, Pose::new(1.5, 1.5, 0.0))];
        let mut rng = StdRng::seed_from_u64(12);
        let strict = ParticleResampler::default();
        assert!(matches!(
            strict.resample(&weighted, 2, &grid, &mut rng),
            Err(MclError::SamplingExhausted { .. })
        ));
        let recovering = ParticleResampler::default().with_reseed_exhausted(true);
        let poses = recovering.resample(&weighted, 2, &grid, &mut rng).unwrap();
        assert_eq!(poses.len(), 2);
        for pose in poses {
            assert!(!grid.is_occupied(&grid.pose_cell(&pose).unwrap()));
        }
    }
    #[test]
    fn resample_rejects_invalid_population() {
        let grid = open_grid(4);
        let mut rng = StdRng::seed_from_u64(8);
        let resampler = ParticleResampler::default();
        assert!(matches!(
            resampler.resample(&[], 3, &grid, &mut rng),
            Err(MclError::InvalidPopulation(_))
        ));
        let weighted = vec![(0.5, Pose::new(1.0, 1.0, 0.0))];
        assert!(matches!(
            resampler.resample(&weighted, 0, &grid, &mut rng),
            Err(MclError::InvalidPopulation(_))
        ));
        let weighted = vec![(f64::NAN, Pose::new(1.0, 1.0, 0.0))];
        assert!(matches!(
            resampler.resample(&weighted, 1, &grid, &mut rng),
            Err(MclError::InvalidPopulation(_))
        ));
    }
    #[test]
    fn resample_is_reproducible_for_a_seed() {
        let grid = open_grid(10);
        let weighted: Vec<(f64, Pose)> = (0..5)
            .map(|i| (0.2 * i as f64, Pose::new(2.0 + i as f64, 3.0, 0.5)))
            .collect();
        let resampler = ParticleResampler::default();
        let a = resampler
            .resample(&weighted, 20, &grid, &mut StdRng::seed_from_u64(1234))
            .unwrap();
        let b = resampler
            .resample(&weighted, 20, &grid, &mut StdRng::seed_from_u64(1234))
            .unwrap();
        assert_eq!(a, b);
    }
    #[test]
    fn fixed_strategy_ignores_score() {
        let strategy = PerturbationStrategy::Fixed {
            spatial_std: 0.2,
            angular_spread: 0.05,
        };
        assert_eq!(strategy.noise(0.0), (0.2, 0.05));
        assert_eq!(strategy.noise(1.0), (0.2, 0.05));
        assert_eq!(PerturbationStrategy::ScoreInverse.noise(0.25), (0.75, 0.75));
    }
    #[test]
    fn effective_sample_size_of_uniform_and_degenerate_weights() {
        let uniform: Vec<Particle> = (0..4)
            .map(|_| Particle::new(Pose::default(), 0.3))
            .collect();
        assert_approx_eq!(effective_sample_size(&uniform), 4.0, 1e-12);
        let mut degenerate = uniform.clone();
        for p in degenerate.iter_mut().skip(1) {
            p.weight = 0.0;
        }
        assert_approx_eq!(effective_sample_size(&degenerate), 1.0, 1e-12);
        let zero = vec![Particle::new(Pose::default(), 0.0); 3];
        assert_eq!(effective_sample_size(&zero), 0.0);
    }
    #[test]
    fn weighted_average_uses_circular_heading() {
        let particles = vec![
            Particle::new(Pose::new(0.0, 0.0, 0.1), 1.0),
            Particle::new(Pose::new(2.0, 4.0, TAU - 0.1), 1.0),
        ];
        let estimate = ParticleAveragingStrategy::WeightedAverage
            .estimate(&particles)
            .unwrap();
        assert_approx_eq!(estimate.pose.x, 1.0, 1e-12);
        assert_approx_eq!(estimate.pose.y, 2.0, 1e-12);
        assert!(estimate.pose.theta < 1e-9 || TAU - estimate.pose.theta < 1e-9);
        assert_approx_eq!(estimate.covariance[(0, 0)], 1.0, 1e-12);
        assert_approx_eq!(estimate.covariance[(1, 1)], 4.0, 1e-12);
        assert_approx_eq!(estimate.covariance[(2, 2)], 0.01, 1e-9);
    }
    #[test]
    fn weighted_average_follows_weights() {
        let particles = vec![
            Particle::new(Pose::new(0.0, 0.0, 0.0), 3.0),
            Particle::new(Pose::new(4.0, 0.0, 0.0), 1.0),
        ];
        let estimate = ParticleAveragingStrategy::WeightedAverage
            .estimate(&particles)
            .unwrap();
        assert_approx_eq!(estimate.pose.x, 1.0, 1e-12);
        let unweighted = ParticleAveragingStrategy::UnweightedAverage
            .estimate(&particles)
            .unwrap();
        assert_approx_eq!(unweighted.pose.x, 2.0, 1e-12);
    }
    #[test]
    fn zero_weights_fall_back_to_unweighted() {
        let particles = vec![
            Particle::new(Pose::new(0.0, 0.0, 0.0), 0.0),
            Particle::new(Pose::new(4.0, 2.0, 0.0), 0.0),
        ];
        let estimate = ParticleAveragingStrategy::WeightedAverage
            .estimate(&particles)
            .unwrap();
        assert_approx_eq!(estimate.pose.x, 2.0, 1e-12);
        assert_approx_eq!(estimate.pose.y, 1.0, 1e-12);
    }
    #[test]
    fn highest_weight_picks_best_particle() {
        let particles = vec![
            Particle::new(Pose::new(0.0, 0.0, 0.0), 0.2),
            Particle::new(Pose::new(4.0, 2.0, 1.0), 0.9),
            Particle::new(Pose::new(1.0, 1.0, 2.0), 0.5),
        ];
        let estimate = ParticleAveragingStrategy::HighestWeight
            .estimate(&particles)
            .unwrap();
        assert_eq!(estimate.pose, particles[1].pose);
        assert_eq!(estimate.covariance, Matrix3::zeros());
        assert!(ParticleAveragingStrategy::HighestWeight.estimate(&[]).is_err());
    }
}

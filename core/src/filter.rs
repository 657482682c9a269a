//! Monte Carlo Localization filter.
//!
//! [MonteCarloLocalizer] owns a fixed-size particle set and a seeded random number generator and runs the
//! classic predict/update/resample loop against a static [OccupancyGrid]:
//!
//! 1. **predict** moves every particle by the same odometry increment, expressed in its own heading frame.
//! 2. **update** simulates the range scan each particle would see and scores it against the observed scan.
//! 3. **resample** draws a new population from the scored one and perturbs every draw
//!    (see [crate::particle::ParticleResampler]).
//!
//! Scoring runs in parallel over the particle set. The grid is only borrowed immutably.
use crate::config::MclConfig;
use crate::error::{MclError, Result};
use crate::map::OccupancyGrid;
use crate::particle::{
    Particle, ParticleResampler, ParticleSampler, PoseEstimate, effective_sample_size,
};
use crate::scan::{scan_similarity, simulate_scan};
use crate::{OdometryDelta, Pose};

use log::{debug, info, warn};
use nalgebra::Matrix3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

/// Particle filter localizing a single range sensor in a known grid.
#[derive(Clone, Debug)]
pub struct MonteCarloLocalizer {
    config: MclConfig,
    particles: Vec<Particle>,
    resampler: ParticleResampler,
    rng: StdRng,
}

impl MonteCarloLocalizer {
    /// Create a filter with `config.n_particles` uniformly sampled valid poses, all with zero weight.
    ///
    /// # Errors
    /// Any [MclConfig::validate] failure, or [MclError::SamplingExhausted] if the grid has too little free space
    /// to place a particle.
    pub fn new(config: MclConfig, grid: &OccupancyGrid) -> Result<MonteCarloLocalizer> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let sampler = ParticleSampler::new(config.max_sampling_attempts, config.reject_unknown);
        let particles = (0..config.n_particles)
            .map(|_| {
                sampler
                    .sample_uniform(grid, &mut rng)
                    .map(|pose| Particle::new(pose, 0.0))
            })
            .collect::<Result<Vec<Particle>>>()?;
        debug!(
            "initialized {} particles on a {}x{} grid",
            particles.len(),
            grid.width(),
            grid.height()
        );
        let resampler = ParticleResampler::new(sampler, config.perturbation.clone())
            .with_reseed_exhausted(true);
        Ok(MonteCarloLocalizer {
            config,
            particles,
            resampler,
            rng,
        })
    }
    /// Create a filter for pose tracking, with every particle drawn near a known `pose`.
    ///
    /// Particles are perturbed from `pose` with the given noise through the same valid-pose sampler used during
    /// resampling.
    pub fn new_around(
        config: MclConfig,
        grid: &OccupancyGrid,
        pose: &Pose,
        spatial_std: f64,
        angle_spread: f64,
    ) -> Result<MonteCarloLocalizer> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let sampler = ParticleSampler::new(config.max_sampling_attempts, config.reject_unknown);
        let particles = (0..config.n_particles)
            .map(|_| {
                sampler
                    .perturb(pose, spatial_std, angle_spread, grid, &mut rng)
                    .map(|pose| Particle::new(pose, 0.0))
            })
            .collect::<Result<Vec<Particle>>>()?;
        debug!("initialized {} particles around {}", particles.len(), pose);
        let resampler = ParticleResampler::new(sampler, config.perturbation.clone())
            .with_reseed_exhausted(true);
        Ok(MonteCarloLocalizer {
            config,
            particles,
            resampler,
            rng,
        })
    }
    pub fn config(&self) -> &MclConfig {
        &self.config
    }
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    /// Move every particle by `odometry` in its own heading frame.
    ///
    /// Particles are not checked against the grid here; one that drifts into a wall or off the map simply scores
    /// poorly in the next update.
    pub fn predict(&mut self, odometry: &OdometryDelta) {
        self.particles
            .par_iter_mut()
            .for_each(|particle| particle.pose = particle.pose.apply(odometry));
    }
    /// Score every particle against an observed scan.
    ///
    /// Particles that are off the grid or inside an occupied cell score 0.
    ///
    /// # Errors
    /// [MclError::DimensionMismatch] if `observed` does not have `n_readings` beams.
    pub fn update_weights(&mut self, observed: &[f64], grid: &OccupancyGrid) -> Result<()> {
        let sensor = &self.config.sensor;
        if observed.len() != sensor.n_readings {
            return Err(MclError::DimensionMismatch {
                expected: sensor.n_readings,
                actual: observed.len(),
            });
        }
        self.particles
            .par_iter_mut()
            .try_for_each(|particle| -> Result<()> {
                let occupied = grid
                    .pose_cell(&particle.pose)
                    .is_some_and(|cell| grid.is_occupied(&cell));
                particle.weight = if occupied {
                    0.0
                } else {
                    match simulate_scan(&particle.pose, sensor, grid) {
                        Ok(simulated) => scan_similarity(&simulated, observed, sensor.max_range)?,
                        Err(MclError::OutOfBounds { .. }) => 0.0,
                        Err(e) => return Err(e),
                    }
                };
                Ok(())
            })?;
        let invalid = self
            .particles
            .iter()
            .filter(|p| grid.pose_cell(&p.pose).is_none_or(|cell| grid.is_occupied(&cell)))
            .count();
        if invalid > 0 {
            warn!(
                "{} of {} particles are off the grid or inside obstacles",
                invalid,
                self.particles.len()
            );
        }
        self.log_population();
        Ok(())
    }
    /// Replace the particle set with a resampled one. Weights of the new set are 0.
    ///
    /// A draw that cannot be perturbed onto a valid cell, such as a top-scoring particle that moved into a wall,
    /// is replaced by a uniformly sampled pose.
    pub fn resample(&mut self, grid: &OccupancyGrid) -> Result<()> {
        let weighted: Vec<_> = self.particles.iter().map(|p| (p.weight, p.pose)).collect();
        let poses =
            self.resampler
                .resample(&weighted, self.config.n_particles, grid, &mut self.rng)?;
        self.particles = poses
            .into_iter()
            .map(|pose| Particle::new(pose, 0.0))
            .collect();
        Ok(())
    }
    /// One full filter cycle: predict, update, estimate, resample.
    ///
    /// Returns the estimate of the scored population, before resampling. On error the particle set is left as it
    /// was before the call.
    pub fn step(
        &mut self,
        odometry: &OdometryDelta,
        observed: &[f64],
        grid: &OccupancyGrid,
    ) -> Result<PoseEstimate> {
        let previous = self.particles.clone();
        let result = self.cycle(odometry, observed, grid);
        if result.is_err() {
            self.particles = previous;
        }
        result
    }
    fn cycle(
        &mut self,
        odometry: &OdometryDelta,
        observed: &[f64],
        grid: &OccupancyGrid,
    ) -> Result<PoseEstimate> {
        self.predict(odometry);
        self.update_weights(observed, grid)?;
        let estimate = self.get_estimate()?;
        self.resample(grid)?;
        Ok(estimate)
    }
    /// Current pose estimate under the configured averaging strategy.
    pub fn get_estimate(&self) -> Result<PoseEstimate> {
        self.config.averaging.estimate(&self.particles)
    }
    /// Covariance of (x, y, theta) around the current estimate.
    pub fn get_certainty(&self) -> Result<Matrix3<f64>> {
        self.get_estimate().map(|estimate| estimate.covariance)
    }
    pub fn effective_sample_size(&self) -> f64 {
        effective_sample_size(&self.particles)
    }
    /// Highest-weighted particle
    pub fn best_particle(&self) -> Option<&Particle> {
        self.particles
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
    }

    fn log_population(&self) {
        let (min, max) = self
            .particles
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p.weight), hi.max(p.weight))
            });
        let ess = self.effective_sample_size();
        if self.config.diagnostics {
            match self.get_estimate() {
                Ok(estimate) => info!(
                    "weights [{:.4}, {:.4}], ess {:.1}, estimate {}",
                    min, max, ess, estimate.pose
                ),
                Err(e) => warn!("no estimate available: {}", e),
            }
        } else {
            debug!("weights [{:.4}, {:.4}], ess {:.1}", min, max, ess);
        }
    }
}

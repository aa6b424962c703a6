//! Fluid simulation driver.
//!
//! [`FluidSimulation`] owns the particles and the parameters and advances the
//! whole system by one fixed timestep per [`FluidSimulation::step`]:
//!
//! 1. predict positions from gravity and accumulated forces
//! 2. build the neighbor set from the predicted positions
//! 3. run the constraint solver (with the collision hook, if enabled)
//! 4. finalize velocities and commit positions
//!
//! A frame that produces a non-finite position or velocity marks the
//! simulation corrupted. Further steps fail until the particles are replaced.

use bevy::prelude::*;

use super::boundary::CollisionHook;
use super::error::{FluidError, FluidResult};
use super::integrator::Integrator;
use super::params::FluidParams;
use super::particle::{lattice_positions, lattice_positions_with_resolution, GpuParticle, Particle, ParticleSet};
use super::solver::ConstraintSolver;
use super::spatial::{NeighborSearch, NeighborSet};

/// Statistics of one completed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// Number of completed frames, this one included.
    pub frame: u64,
    pub particle_count: usize,
    /// Directed neighbor pairs in the frozen neighbor set.
    pub neighbor_pairs: usize,
    pub solver_iterations: u32,
    /// Mean `|ρ/ρ₀ - 1|` in the last solver iteration.
    pub average_density_error: f32,
    /// Largest `|Δp|` of the last solver iteration.
    pub max_correction: f32,
}

/// Main fluid simulation resource.
#[derive(Resource)]
pub struct FluidSimulation {
    params: FluidParams,
    particles: ParticleSet,
    solver: ConstraintSolver,
    integrator: Integrator,
    neighbor_search: Box<dyn NeighborSearch>,
    /// Neighbor set of the last frame.
    neighbors: NeighborSet,
    collision_hook: Option<Box<dyn CollisionHook>>,
    frame: u64,
    corrupted_at: Option<u64>,
    last_report: Option<FrameReport>,
}

impl Default for FluidSimulation {
    fn default() -> Self {
        Self::from_valid_params(FluidParams::default())
    }
}

impl FluidSimulation {
    /// Create an empty simulation. Fails on invalid parameters.
    pub fn new(params: FluidParams) -> FluidResult<Self> {
        params.validate()?;
        info!(
            "Fluid simulation created: dt={}, rest density={}, iterations={}, neighbor search={:?}",
            params.timestep, params.rest_density, params.solver_iterations, params.neighbor_strategy
        );
        Ok(Self::from_valid_params(params))
    }

    fn from_valid_params(params: FluidParams) -> Self {
        Self {
            solver: ConstraintSolver::new(&params),
            integrator: Integrator::new(&params),
            neighbor_search: params.neighbor_strategy.build_search(),
            params,
            particles: ParticleSet::default(),
            neighbors: NeighborSet::default(),
            collision_hook: None,
            frame: 0,
            corrupted_at: None,
            last_report: None,
        }
    }

    /// Replace the neighbor search with a custom implementation.
    pub fn with_neighbor_search(mut self, search: impl NeighborSearch + 'static) -> Self {
        self.neighbor_search = Box::new(search);
        self
    }

    pub fn with_collision_hook(mut self, hook: impl CollisionHook + 'static) -> Self {
        self.set_collision_hook(hook);
        self
    }

    /// Install the hook used when collisions are enabled.
    pub fn set_collision_hook(&mut self, hook: impl CollisionHook + 'static) {
        self.collision_hook = Some(Box::new(hook));
    }

    pub fn clear_collision_hook(&mut self) {
        self.collision_hook = None;
    }

    pub fn has_collision_hook(&self) -> bool {
        self.collision_hook.is_some()
    }

    /// Swap in new parameters between frames. Invalid parameters are rejected
    /// and the current ones stay in effect.
    pub fn set_params(&mut self, params: FluidParams) -> FluidResult<()> {
        params.validate()?;
        if params.neighbor_strategy != self.params.neighbor_strategy {
            self.neighbor_search = params.neighbor_strategy.build_search();
        }
        self.solver = ConstraintSolver::new(&params);
        self.integrator = Integrator::new(&params);
        self.params = params;
        debug!("Fluid parameters updated");
        Ok(())
    }

    /// Replace all particles and restart the run at frame zero.
    ///
    /// This is also the way out of a corrupted state.
    pub fn set_particles(&mut self, particles: impl IntoIterator<Item = Particle>) -> FluidResult<()> {
        let particles = ParticleSet::from_particles(particles);
        for (index, particle) in particles.iter().enumerate() {
            if !(particle.mass > 0.0) || !particle.mass.is_finite() {
                return Err(FluidError::invalid(
                    "particle_mass",
                    format!("must be positive and finite (particle {index} has {})", particle.mass),
                ));
            }
            if !particle.position.is_finite() || !particle.velocity.is_finite() {
                return Err(FluidError::invalid(
                    "particles",
                    format!("particle {index} has a non-finite position or velocity"),
                ));
            }
        }

        self.particles = particles;
        self.neighbors = NeighborSet::default();
        self.frame = 0;
        self.corrupted_at = None;
        self.last_report = None;
        Ok(())
    }

    /// Fill a box with a regular lattice of particles at rest.
    ///
    /// Points are `min + spacing * (i, j, k)`; the upper bound is inclusive.
    pub fn initialize(&mut self, min: Vec3, max: Vec3, spacing: f32) -> FluidResult<usize> {
        if !(spacing > 0.0) || !spacing.is_finite() {
            return Err(FluidError::invalid("spacing", format!("must be positive and finite, got {spacing}")));
        }
        if !min.is_finite() || !max.is_finite() {
            return Err(FluidError::invalid("bounds", "box corners must be finite"));
        }
        let count = self.fill(lattice_positions(min, max, spacing)?)?;
        info!("Initialized {count} particles at spacing {spacing} in box {min} - {max}");
        Ok(count)
    }

    /// Fill the box between two corners (any order) with `resolution³`
    /// particles at rest. The upper corner is excluded.
    pub fn initialize_with_resolution(
        &mut self,
        corner1: Vec3,
        corner2: Vec3,
        resolution: u32,
    ) -> FluidResult<usize> {
        if resolution == 0 {
            return Err(FluidError::invalid("resolution", "must be at least 1"));
        }
        if !corner1.is_finite() || !corner2.is_finite() {
            return Err(FluidError::invalid("bounds", "box corners must be finite"));
        }
        let count = self.fill(lattice_positions_with_resolution(corner1, corner2, resolution)?)?;
        info!("Initialized {count} particles ({resolution}³) between {corner1} and {corner2}");
        Ok(count)
    }

    fn fill(&mut self, positions: Vec<Vec3>) -> FluidResult<usize> {
        let mass = self.params.particle_mass;
        let count = positions.len();
        self.set_particles(positions.into_iter().map(|p| Particle::new(p).with_mass(mass)))?;
        Ok(count)
    }

    /// Advance the simulation by one timestep.
    pub fn step(&mut self) -> FluidResult<FrameReport> {
        if let Some(frame) = self.corrupted_at {
            return Err(FluidError::Corrupted { frame });
        }

        self.integrator.predict(&mut self.particles);

        self.neighbors = self
            .neighbor_search
            .find_neighbors(self.particles.predicted_positions(), self.params.neighbor_radius());

        let hook = if self.params.enable_collisions {
            self.collision_hook.as_deref()
        } else {
            None
        };
        let solver_report = self.solver.solve(&mut self.particles, &self.neighbors, hook);

        self.integrator.finalize(&mut self.particles, &self.neighbors);
        self.frame += 1;

        if let Err(err) = self.check_finite() {
            self.corrupted_at = Some(self.frame);
            error!("Fluid simulation corrupted: {err}");
            return Err(err);
        }

        let report = FrameReport {
            frame: self.frame,
            particle_count: self.particles.len(),
            neighbor_pairs: self.neighbors.total_pairs(),
            solver_iterations: solver_report.iterations,
            average_density_error: solver_report.average_density_error,
            max_correction: solver_report.max_correction,
        };
        debug!(
            "Frame {}: {} particles, {} neighbor pairs, density error {:.4}, max correction {:.6}",
            report.frame,
            report.particle_count,
            report.neighbor_pairs,
            report.average_density_error,
            report.max_correction
        );
        self.last_report = Some(report);
        Ok(report)
    }

    /// Run `frames` steps, stopping at the first failure.
    pub fn run(&mut self, frames: u32) -> FluidResult<Option<FrameReport>> {
        let mut last = None;
        for _ in 0..frames {
            last = Some(self.step()?);
        }
        Ok(last)
    }

    fn check_finite(&self) -> FluidResult<()> {
        let quantities = [
            ("position", self.particles.positions()),
            ("velocity", self.particles.velocities()),
        ];
        for (quantity, values) in quantities {
            if let Some(particle) = values.iter().position(|v| !v.is_finite()) {
                return Err(FluidError::NonFiniteState {
                    frame: self.frame,
                    particle,
                    quantity,
                });
            }
        }
        Ok(())
    }

    pub fn params(&self) -> &FluidParams {
        &self.params
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn positions(&self) -> &[Vec3] {
        self.particles.positions()
    }

    pub fn velocities(&self) -> &[Vec3] {
        self.particles.velocities()
    }

    pub fn position_of(&self, index: usize) -> Option<Vec3> {
        self.particles.positions().get(index).copied()
    }

    pub fn velocity_of(&self, index: usize) -> Option<Vec3> {
        self.particles.velocities().get(index).copied()
    }

    /// Densities of the last solver iteration (debug only).
    pub fn densities(&self) -> &[f32] {
        self.particles.densities()
    }

    /// Lambdas of the last solver iteration (debug only).
    pub fn lambdas(&self) -> &[f32] {
        self.particles.lambdas()
    }

    /// Neighbor set frozen for the last frame.
    pub fn neighbors(&self) -> &NeighborSet {
        &self.neighbors
    }

    pub fn neighbor_search_name(&self) -> &'static str {
        self.neighbor_search.name()
    }

    /// Completed frames since the particles were last set.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted_at.is_some()
    }

    fn check_index(&self, index: usize) -> FluidResult<()> {
        if index < self.particles.len() {
            Ok(())
        } else {
            Err(FluidError::ParticleOutOfRange {
                index,
                count: self.particles.len(),
            })
        }
    }

    /// Teleport a particle. Values are not validated; a non-finite value
    /// surfaces as [`FluidError::NonFiniteState`] on the next step.
    pub fn set_position(&mut self, index: usize, position: Vec3) -> FluidResult<()> {
        self.check_index(index)?;
        self.particles.set_position(index, position);
        Ok(())
    }

    pub fn set_velocity(&mut self, index: usize, velocity: Vec3) -> FluidResult<()> {
        self.check_index(index)?;
        self.particles.set_velocity(index, velocity);
        Ok(())
    }

    /// Accumulate a force, applied and cleared by the next step.
    pub fn apply_external_force(&mut self, index: usize, force: Vec3) -> FluidResult<()> {
        self.check_index(index)?;
        self.particles.add_external_force(index, force);
        Ok(())
    }

    /// Density of every particle at the committed positions.
    pub fn measure_densities(&mut self) -> Vec<f32> {
        let positions = self.particles.positions();
        let neighbors = self
            .neighbor_search
            .find_neighbors(positions, self.params.neighbor_radius());
        (0..positions.len())
            .map(|i| self.solver.density(i, positions, &neighbors))
            .collect()
    }

    pub fn average_density(&mut self) -> f32 {
        let densities = self.measure_densities();
        if densities.is_empty() {
            return 0.0;
        }
        densities.iter().sum::<f32>() / densities.len() as f32
    }

    /// Mean `|ρ/ρ₀ - 1|` at the committed positions.
    pub fn average_density_error(&mut self) -> f32 {
        let rest_density = self.params.rest_density;
        let densities = self.measure_densities();
        if densities.is_empty() {
            return 0.0;
        }
        densities
            .iter()
            .map(|&d| (d / rest_density - 1.0).abs())
            .sum::<f32>()
            / densities.len() as f32
    }

    /// Per-particle data for a renderer, ready to upload as bytes.
    pub fn render_snapshot(&self) -> Vec<GpuParticle> {
        let p = &self.particles;
        (0..p.len())
            .map(|i| GpuParticle::new(p.positions[i], p.velocities[i], p.densities[i], p.lambdas[i]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluid::params::NeighborStrategy;

    #[test]
    fn test_new_rejects_invalid_params() {
        let err = FluidSimulation::new(FluidParams::default().with_timestep(0.0)).err();
        assert!(matches!(err, Some(FluidError::InvalidConfiguration { field: "timestep", .. })));
    }

    #[test]
    fn test_initialize_rejects_bad_requests() {
        let mut sim = FluidSimulation::default();
        assert!(sim.initialize(Vec3::ZERO, Vec3::ONE, 0.0).is_err());
        assert!(sim.initialize(Vec3::ZERO, Vec3::splat(f32::INFINITY), 0.1).is_err());
        assert!(sim.initialize_with_resolution(Vec3::ZERO, Vec3::ONE, 0).is_err());
        assert_eq!(sim.particle_count(), 0);
    }

    #[test]
    fn test_initialize_rejects_oversized_lattice() {
        let mut sim = FluidSimulation::default();
        sim.initialize(Vec3::ZERO, Vec3::splat(0.1), 0.05).unwrap();

        let err = sim.initialize(Vec3::ZERO, Vec3::splat(2000.0), 1.0).err();
        assert!(matches!(err, Some(FluidError::InvalidConfiguration { field: "bounds", .. })));
        assert!(sim.initialize_with_resolution(Vec3::ZERO, Vec3::ONE, u32::MAX).is_err());
        assert_eq!(sim.particle_count(), 27);
    }

    #[test]
    fn test_initialize_uses_param_mass() {
        let mut sim = FluidSimulation::new(FluidParams::default().with_particle_mass(0.5)).unwrap();
        let count = sim.initialize_with_resolution(Vec3::ONE, Vec3::ZERO, 3).unwrap();

        assert_eq!(count, 27);
        assert!(sim.particles().masses().iter().all(|&m| m == 0.5));
        assert!(sim.velocities().iter().all(|&v| v == Vec3::ZERO));
    }

    #[test]
    fn test_set_particles_validates() {
        let mut sim = FluidSimulation::default();
        assert!(sim.set_particles([Particle::new(Vec3::ZERO).with_mass(0.0)]).is_err());
        assert!(sim.set_particles([Particle::new(Vec3::splat(f32::NAN))]).is_err());
        assert!(sim.set_particles([Particle::new(Vec3::ZERO)]).is_ok());
        assert_eq!(sim.particle_count(), 1);
    }

    #[test]
    fn test_accessors_check_index() {
        let mut sim = FluidSimulation::default();
        sim.set_particles([Particle::new(Vec3::ZERO)]).unwrap();

        assert!(sim.set_velocity(0, Vec3::X).is_ok());
        assert!(matches!(
            sim.set_position(3, Vec3::ZERO),
            Err(FluidError::ParticleOutOfRange { index: 3, count: 1 })
        ));
        assert_eq!(sim.position_of(1), None);
        assert_eq!(sim.velocity_of(0), Some(Vec3::X));
    }

    #[test]
    fn test_external_force_is_consumed() {
        let params = FluidParams::default().with_gravity(Vec3::ZERO);
        let mut sim = FluidSimulation::new(params).unwrap();
        sim.set_particles([Particle::new(Vec3::ZERO)]).unwrap();
        sim.apply_external_force(0, Vec3::new(0.0, 0.0, 10.0)).unwrap();

        sim.step().unwrap();
        let after_push = sim.velocity_of(0).unwrap();
        assert!((after_push.z - 10.0 * sim.params().timestep).abs() < 1e-4);

        sim.step().unwrap();
        let coasting = sim.velocity_of(0).unwrap();
        assert!((coasting - after_push).length() < 1e-4);
    }

    #[test]
    fn test_set_params_keeps_old_on_error() {
        let mut sim = FluidSimulation::default();
        assert!(sim.set_params(FluidParams::default().with_viscosity(2.0)).is_err());
        assert_eq!(sim.params(), &FluidParams::default());

        sim.set_params(FluidParams::default().with_neighbor_strategy(NeighborStrategy::BruteForce))
            .unwrap();
        assert_eq!(sim.neighbor_search_name(), "brute-force");
    }

    #[test]
    fn test_collisions_can_be_disabled() {
        let floor = |_: usize, p: Vec3| p.max(Vec3::new(f32::MIN, 0.0, f32::MIN));
        let params = FluidParams::default().with_collisions(false);
        let mut sim = FluidSimulation::new(params).unwrap().with_collision_hook(floor);
        sim.set_particles([Particle::new(Vec3::ZERO)]).unwrap();

        sim.step().unwrap();
        assert!(sim.position_of(0).unwrap().y < 0.0);

        sim.set_params(sim.params().clone().with_collisions(true)).unwrap();
        sim.set_particles([Particle::new(Vec3::ZERO)]).unwrap();
        sim.step().unwrap();
        assert!(sim.position_of(0).unwrap().y >= 0.0);
    }

    #[test]
    fn test_render_snapshot() {
        let mut sim = FluidSimulation::default();
        sim.initialize(Vec3::ZERO, Vec3::splat(0.05), 0.05).unwrap();
        sim.step().unwrap();

        let snapshot = sim.render_snapshot();
        assert_eq!(snapshot.len(), 8);
        for (gpu, &p) in snapshot.iter().zip(sim.positions()) {
            assert_eq!(gpu.position(), p);
        }
        assert_eq!(bytemuck::cast_slice::<GpuParticle, u8>(&snapshot).len(), 8 * 32);
    }

    #[test]
    fn test_empty_simulation_steps() {
        let mut sim = FluidSimulation::default();
        let report = sim.step().unwrap();
        assert_eq!(report.frame, 1);
        assert_eq!(report.particle_count, 0);
        assert_eq!(sim.average_density(), 0.0);
    }
}

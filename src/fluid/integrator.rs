//! Time integration around the constraint solve.
//!
//! [`Integrator::predict`] runs before the neighbor search and the solver,
//! [`Integrator::finalize`] after the last solver iteration. Finalization
//! derives velocities from the position change, then applies vorticity
//! confinement and XSPH viscosity. Both adjustments are computed from the
//! same velocity snapshot and written back together.

use bevy::prelude::*;
use rayon::prelude::*;

use super::kernels::SmoothingKernels;
use super::params::FluidParams;
use super::particle::ParticleSet;
use super::spatial::NeighborSet;

/// Below this `|η|` the vorticity location vector has no usable direction.
const VORTICITY_GRADIENT_EPSILON: f32 = 1.0e-6;

#[derive(Clone, Debug)]
pub struct Integrator {
    timestep: f32,
    gravity: Vec3,
    viscosity: f32,
    vorticity_epsilon: f32,
    inv_rest_density: f32,
    kernels: SmoothingKernels,
}

impl Integrator {
    pub fn new(params: &FluidParams) -> Self {
        Self {
            timestep: params.timestep,
            gravity: params.gravity,
            viscosity: params.viscosity,
            vorticity_epsilon: params.vorticity_epsilon,
            inv_rest_density: 1.0 / params.rest_density,
            kernels: SmoothingKernels::new(params.density_radius, params.gradient_radius),
        }
    }

    pub fn timestep(&self) -> f32 {
        self.timestep
    }

    /// Apply gravity and accumulated forces, then predict positions.
    ///
    /// `v += Δt (g + F/m)`, `p* = p + Δt v`. The force accumulator is cleared.
    pub fn predict(&self, particles: &mut ParticleSet) {
        let dt = self.timestep;
        let gravity = self.gravity;

        particles
            .velocities
            .par_iter_mut()
            .zip(particles.external_forces.par_iter_mut())
            .zip(particles.masses.par_iter())
            .for_each(|((velocity, force), &mass)| {
                *velocity += dt * (gravity + *force / mass);
                *force = Vec3::ZERO;
            });

        particles.predicted_positions = particles
            .positions
            .par_iter()
            .zip(particles.velocities.par_iter())
            .map(|(&position, &velocity)| position + dt * velocity)
            .collect();
    }

    /// Derive velocities, apply vorticity confinement and XSPH, commit
    /// positions.
    pub fn finalize(&self, particles: &mut ParticleSet, neighbors: &NeighborSet) {
        let inv_dt = 1.0 / self.timestep;
        let velocities: Vec<Vec3> = particles
            .predicted_positions
            .par_iter()
            .zip(particles.positions.par_iter())
            .map(|(&predicted, &position)| (predicted - position) * inv_dt)
            .collect();

        let positions = &particles.predicted_positions;
        particles.velocities = if self.vorticity_epsilon > 0.0 || self.viscosity > 0.0 {
            let vorticities = self.vorticity_field(positions, &velocities, neighbors);
            (0..velocities.len())
                .into_par_iter()
                .map(|i| {
                    velocities[i]
                        + self.confinement(i, positions, &vorticities, neighbors)
                        + self.xsph_correction(i, positions, &velocities, neighbors)
                })
                .collect()
        } else {
            velocities
        };

        particles.positions.clone_from(&particles.predicted_positions);
    }

    /// `ω_i = (1/ρ₀) Σ_j ∇W(p_i - p_j) × (v_j - v_i)`, the SPH curl of the
    /// velocity field.
    pub fn vorticity(
        &self,
        i: usize,
        positions: &[Vec3],
        velocities: &[Vec3],
        neighbors: &NeighborSet,
    ) -> Vec3 {
        let p_i = positions[i];
        let v_i = velocities[i];
        let curl: Vec3 = neighbors
            .neighbors_of(i)
            .iter()
            .map(|&j| self.kernels.spiky_gradient(p_i - positions[j]).cross(velocities[j] - v_i))
            .sum();
        curl * self.inv_rest_density
    }

    pub fn vorticity_field(
        &self,
        positions: &[Vec3],
        velocities: &[Vec3],
        neighbors: &NeighborSet,
    ) -> Vec<Vec3> {
        (0..positions.len())
            .into_par_iter()
            .map(|i| self.vorticity(i, positions, velocities, neighbors))
            .collect()
    }

    /// Velocity change from vorticity confinement: `Δt ε (N × ω_i)` with
    /// `N = η / |η|`, `η = (1/ρ₀) Σ_j (|ω_j| - |ω_i|) ∇W(p_i - p_j)`.
    fn confinement(
        &self,
        i: usize,
        positions: &[Vec3],
        vorticities: &[Vec3],
        neighbors: &NeighborSet,
    ) -> Vec3 {
        if self.vorticity_epsilon <= 0.0 {
            return Vec3::ZERO;
        }
        let p_i = positions[i];
        let omega_i = vorticities[i];
        let magnitude_i = omega_i.length();
        let eta: Vec3 = neighbors
            .neighbors_of(i)
            .iter()
            .map(|&j| (vorticities[j].length() - magnitude_i) * self.kernels.spiky_gradient(p_i - positions[j]))
            .sum::<Vec3>()
            * self.inv_rest_density;

        let eta_len = eta.length();
        if !(eta_len > VORTICITY_GRADIENT_EPSILON) {
            return Vec3::ZERO;
        }
        self.timestep * self.vorticity_epsilon * (eta / eta_len).cross(omega_i)
    }

    /// XSPH: `c (v̄_i - v_i)` where `v̄_i` is the poly6-weighted mean
    /// neighbor velocity.
    fn xsph_correction(
        &self,
        i: usize,
        positions: &[Vec3],
        velocities: &[Vec3],
        neighbors: &NeighborSet,
    ) -> Vec3 {
        if self.viscosity <= 0.0 {
            return Vec3::ZERO;
        }
        let p_i = positions[i];
        let (weighted, weight_sum) = neighbors.neighbors_of(i).iter().fold(
            (Vec3::ZERO, 0.0f32),
            |(weighted, weight_sum), &j| {
                let w = self.kernels.poly6(p_i - positions[j]);
                (weighted + w * velocities[j], weight_sum + w)
            },
        );
        if !(weight_sum > 0.0) {
            return Vec3::ZERO;
        }
        self.viscosity * (weighted / weight_sum - velocities[i])
    }
}

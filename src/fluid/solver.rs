//! PBF (Position Based Fluids) constraint solver.
//!
//! This module implements the density constraint projection described in
//! "Position Based Fluids" by Macklin & Müller (2013).
//!
//! Each iteration is a Jacobi sweep of three passes over all particles:
//!
//! 1. density / lambda: `C_i = ρ_i / ρ₀ - 1`, `λ_i = -C_i / (Σ_k |∇_k C_i|² + ε)`
//! 2. position correction: `Δp_i = (1/ρ₀) Σ_j (λ_i + λ_j + s_corr) ∇W(p_i - p_j)`
//! 3. commit: `p_i += Δp_i`
//!
//! Passes 1 and 2 read a frozen snapshot and write a fresh output buffer, so
//! the result of a pass never depends on the order particles are visited in.

use bevy::prelude::*;
use rayon::prelude::*;

use super::boundary::CollisionHook;
use super::kernels::SmoothingKernels;
use super::params::FluidParams;
use super::particle::ParticleSet;
use super::spatial::NeighborSet;

/// Which particle a constraint gradient is taken with respect to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GradientTarget {
    /// `∇_{p_i} C_i`: the particle owning the constraint.
    Own,
    /// `∇_{p_j} C_i` for a distinct neighbor `j`.
    Neighbor(usize),
}

/// Density constraint of one particle, evaluated in the density/lambda pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ConstraintState {
    pub density: f32,
    /// `ρ / ρ₀ - 1`.
    pub constraint: f32,
    pub lambda: f32,
}

/// Summary of one solve.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SolverReport {
    pub iterations: u32,
    /// Mean `|ρ/ρ₀ - 1|` measured in the last iteration. Zero when no
    /// iteration ran.
    pub average_density_error: f32,
    /// Largest `|Δp|` committed in the last iteration.
    pub max_correction: f32,
}

/// Density constraint solver with constants precomputed from [`FluidParams`].
#[derive(Clone, Debug)]
pub struct ConstraintSolver {
    kernels: SmoothingKernels,
    rest_density: f32,
    inv_rest_density: f32,
    relaxation_epsilon: f32,
    iterations: u32,
    tensile_strength: f32,
    tensile_exponent: i32,
    /// `W(Δq·h)`, the s_corr reference weight.
    w_delta_q: f32,
}

impl ConstraintSolver {
    pub fn new(params: &FluidParams) -> Self {
        let kernels = SmoothingKernels::new(params.density_radius, params.gradient_radius);
        let w_delta_q = kernels.poly6_at_distance(params.tensile_delta_q * params.density_radius);
        Self {
            kernels,
            rest_density: params.rest_density,
            inv_rest_density: 1.0 / params.rest_density,
            relaxation_epsilon: params.relaxation_epsilon,
            iterations: params.solver_iterations,
            tensile_strength: params.tensile_strength,
            tensile_exponent: params.tensile_exponent,
            w_delta_q,
        }
    }

    pub fn kernels(&self) -> &SmoothingKernels {
        &self.kernels
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn rest_density(&self) -> f32 {
        self.rest_density
    }

    /// `ρ_i = Σ_j W(p_i - p_j)` over the neighbors of `i`.
    pub fn density(&self, i: usize, positions: &[Vec3], neighbors: &NeighborSet) -> f32 {
        let p_i = positions[i];
        neighbors
            .neighbors_of(i)
            .iter()
            .map(|&j| self.kernels.poly6(p_i - positions[j]))
            .sum()
    }

    /// Gradient of `C_i` with respect to `target`.
    pub fn constraint_gradient(
        &self,
        i: usize,
        target: GradientTarget,
        positions: &[Vec3],
        neighbors: &NeighborSet,
    ) -> Vec3 {
        let p_i = positions[i];
        match target {
            GradientTarget::Own => {
                let sum: Vec3 = neighbors
                    .neighbors_of(i)
                    .iter()
                    .map(|&j| self.kernels.spiky_gradient(p_i - positions[j]))
                    .sum();
                sum * self.inv_rest_density
            }
            GradientTarget::Neighbor(j) => {
                -self.kernels.spiky_gradient(p_i - positions[j]) * self.inv_rest_density
            }
        }
    }

    /// Density, constraint value and lambda of particle `i`.
    pub fn constraint_state(
        &self,
        i: usize,
        positions: &[Vec3],
        neighbors: &NeighborSet,
    ) -> ConstraintState {
        let density = self.density(i, positions, neighbors);
        let constraint = density * self.inv_rest_density - 1.0;

        let targets = std::iter::once(GradientTarget::Own).chain(
            neighbors
                .neighbors_of(i)
                .iter()
                .map(|&j| GradientTarget::Neighbor(j)),
        );
        let gradient_sq_sum: f32 = targets
            .map(|target| {
                self.constraint_gradient(i, target, positions, neighbors)
                    .length_squared()
            })
            .sum();

        ConstraintState {
            density,
            constraint,
            lambda: -constraint / (gradient_sq_sum + self.relaxation_epsilon),
        }
    }

    /// Artificial pressure `s_corr = -k (W(r) / W(Δq·h))ⁿ`.
    #[inline]
    pub fn tensile_correction(&self, r: Vec3) -> f32 {
        if !(self.w_delta_q > 0.0) || self.tensile_strength == 0.0 {
            return 0.0;
        }
        -self.tensile_strength * (self.kernels.poly6(r) / self.w_delta_q).powi(self.tensile_exponent)
    }

    /// Uncollided position correction of particle `i`.
    pub fn position_correction(
        &self,
        i: usize,
        positions: &[Vec3],
        neighbors: &NeighborSet,
        lambdas: &[f32],
    ) -> Vec3 {
        let p_i = positions[i];
        let lambda_i = lambdas[i];
        let sum: Vec3 = neighbors
            .neighbors_of(i)
            .iter()
            .map(|&j| {
                let r = p_i - positions[j];
                (lambda_i + lambdas[j] + self.tensile_correction(r)) * self.kernels.spiky_gradient(r)
            })
            .sum();
        sum * self.inv_rest_density
    }

    /// Pass 1 over all particles.
    pub fn density_lambda_pass(
        &self,
        positions: &[Vec3],
        neighbors: &NeighborSet,
    ) -> Vec<ConstraintState> {
        (0..positions.len())
            .into_par_iter()
            .map(|i| self.constraint_state(i, positions, neighbors))
            .collect()
    }

    /// Pass 2 over all particles. With a hook, each corrected candidate is
    /// resolved against the colliders and the correction becomes the
    /// displacement to the adjusted position.
    pub fn position_correction_pass(
        &self,
        positions: &[Vec3],
        neighbors: &NeighborSet,
        lambdas: &[f32],
        hook: Option<&dyn CollisionHook>,
    ) -> Vec<Vec3> {
        (0..positions.len())
            .into_par_iter()
            .map(|i| {
                let delta = self.position_correction(i, positions, neighbors, lambdas);
                match hook {
                    Some(hook) => hook.resolve_collision(i, positions[i] + delta) - positions[i],
                    None => delta,
                }
            })
            .collect()
    }

    /// Run all iterations on the predicted positions.
    pub fn solve(
        &self,
        particles: &mut ParticleSet,
        neighbors: &NeighborSet,
        hook: Option<&dyn CollisionHook>,
    ) -> SolverReport {
        let mut report = SolverReport::default();

        for _ in 0..self.iterations {
            let states = self.density_lambda_pass(&particles.predicted_positions, neighbors);
            particles.densities = states.iter().map(|s| s.density).collect();
            particles.lambdas = states.iter().map(|s| s.lambda).collect();

            let corrections = self.position_correction_pass(
                &particles.predicted_positions,
                neighbors,
                &particles.lambdas,
                hook,
            );

            particles
                .predicted_positions
                .par_iter_mut()
                .zip(corrections.par_iter())
                .for_each(|(p, dp)| *p += *dp);

            report.iterations += 1;
            report.average_density_error = mean_abs_constraint(&states);
            report.max_correction = corrections
                .iter()
                .map(|dp| dp.length())
                .fold(0.0, f32::max);
            particles.position_corrections = corrections;
        }

        report
    }
}

fn mean_abs_constraint(states: &[ConstraintState]) -> f32 {
    if states.is_empty() {
        return 0.0;
    }
    states.iter().map(|s| s.constraint.abs()).sum::<f32>() / states.len() as f32
}

//! Fluid particle data structures and lattice generation.
//!
//! The solver works on a structure-of-arrays [`ParticleSet`] so that every
//! per-particle pass can read whole slices while writing a separate output
//! buffer. [`Particle`] is the array-of-structs view used to seed and inspect
//! individual particles.

use bevy::prelude::*;

use super::error::{FluidError, FluidResult};

/// Largest number of particles a lattice fill may produce.
pub const MAX_LATTICE_POINTS: usize = u32::MAX as usize;

/// One simulated fluid sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub mass: f32,
    /// Committed position.
    pub position: Vec3,
    /// Tentative position mutated during the solve.
    pub predicted_position: Vec3,
    pub velocity: Vec3,
    /// Force accumulator, consumed by the next prediction.
    pub external_force: Vec3,
    /// Constraint multiplier from the last solver iteration.
    pub lambda: f32,
    /// Position delta from the last solver iteration.
    pub position_correction: Vec3,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            mass: 1.0,
            position: Vec3::ZERO,
            predicted_position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            external_force: Vec3::ZERO,
            lambda: 0.0,
            position_correction: Vec3::ZERO,
        }
    }
}

impl Particle {
    /// Create a particle at rest at a given position.
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            predicted_position: position,
            ..default()
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }
}

/// Structure-of-arrays particle storage.
///
/// All vectors always have the same length. `densities`, `lambdas` and
/// `position_corrections` are scratch values of the last solver iteration.
#[derive(Clone, Debug, Default)]
pub struct ParticleSet {
    pub(crate) masses: Vec<f32>,
    pub(crate) positions: Vec<Vec3>,
    pub(crate) predicted_positions: Vec<Vec3>,
    pub(crate) velocities: Vec<Vec3>,
    pub(crate) external_forces: Vec<Vec3>,
    pub(crate) densities: Vec<f32>,
    pub(crate) lambdas: Vec<f32>,
    pub(crate) position_corrections: Vec<Vec3>,
}

impl ParticleSet {
    pub fn from_particles(particles: impl IntoIterator<Item = Particle>) -> Self {
        let mut set = Self::default();
        for particle in particles {
            set.push(particle);
        }
        set
    }

    /// Add a particle and return its index.
    pub fn push(&mut self, particle: Particle) -> usize {
        let index = self.positions.len();
        self.masses.push(particle.mass);
        self.positions.push(particle.position);
        self.predicted_positions.push(particle.predicted_position);
        self.velocities.push(particle.velocity);
        self.external_forces.push(particle.external_force);
        self.densities.push(0.0);
        self.lambdas.push(particle.lambda);
        self.position_corrections.push(particle.position_correction);
        index
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Snapshot of a single particle.
    pub fn get(&self, index: usize) -> Option<Particle> {
        if index >= self.len() {
            return None;
        }
        Some(Particle {
            mass: self.masses[index],
            position: self.positions[index],
            predicted_position: self.predicted_positions[index],
            velocity: self.velocities[index],
            external_force: self.external_forces[index],
            lambda: self.lambdas[index],
            position_correction: self.position_corrections[index],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Particle> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    pub fn masses(&self) -> &[f32] {
        &self.masses
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Only meaningful between prediction and finalization of a frame.
    pub fn predicted_positions(&self) -> &[Vec3] {
        &self.predicted_positions
    }

    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }

    pub fn external_forces(&self) -> &[Vec3] {
        &self.external_forces
    }

    pub fn densities(&self) -> &[f32] {
        &self.densities
    }

    pub fn lambdas(&self) -> &[f32] {
        &self.lambdas
    }

    pub fn position_corrections(&self) -> &[Vec3] {
        &self.position_corrections
    }

    /// Move a particle, discarding any pending prediction.
    pub(crate) fn set_position(&mut self, index: usize, position: Vec3) {
        self.positions[index] = position;
        self.predicted_positions[index] = position;
    }

    pub(crate) fn set_velocity(&mut self, index: usize, velocity: Vec3) {
        self.velocities[index] = velocity;
    }

    pub(crate) fn add_external_force(&mut self, index: usize, force: Vec3) {
        self.external_forces[index] += force;
    }
}

/// Total point count of a lattice, or an error when it does not fit.
fn lattice_point_count(counts: [usize; 3]) -> FluidResult<usize> {
    counts
        .into_iter()
        .try_fold(1usize, usize::checked_mul)
        .filter(|&total| total <= MAX_LATTICE_POINTS)
        .ok_or_else(|| {
            FluidError::invalid(
                "bounds",
                format!(
                    "lattice of {} x {} x {} points exceeds {MAX_LATTICE_POINTS} particles",
                    counts[0], counts[1], counts[2]
                ),
            )
        })
}

fn fill_lattice(origin: Vec3, step: Vec3, counts: [usize; 3]) -> FluidResult<Vec<Vec3>> {
    let mut positions = Vec::with_capacity(lattice_point_count(counts)?);
    for x in 0..counts[0] {
        for y in 0..counts[1] {
            for z in 0..counts[2] {
                positions.push(origin + Vec3::new(x as f32, y as f32, z as f32) * step);
            }
        }
    }
    Ok(positions)
}

/// Regular lattice of points `min + spacing * (i, j, k)` inside a box.
///
/// The upper bound is inclusive up to a small tolerance so that a box whose
/// size is an exact multiple of the spacing gets points on both faces.
/// Degenerate spacing or bounds give an empty lattice; a lattice with more
/// than [`MAX_LATTICE_POINTS`] points is an error.
pub fn lattice_positions(min: Vec3, max: Vec3, spacing: f32) -> FluidResult<Vec<Vec3>> {
    let lo = min.min(max);
    let hi = min.max(max);
    if !(spacing > 0.0) || !lo.is_finite() || !hi.is_finite() {
        return Ok(Vec::new());
    }

    let steps = ((hi - lo) / spacing + Vec3::splat(1.0e-4)).floor();
    let axis = |s: f32| (s.is_finite() && s < MAX_LATTICE_POINTS as f32).then(|| s as usize + 1);
    let counts = match (axis(steps.x), axis(steps.y), axis(steps.z)) {
        (Some(x), Some(y), Some(z)) => [x, y, z],
        _ => {
            return Err(FluidError::invalid(
                "spacing",
                format!("spacing {spacing} is too small for box {lo} - {hi}"),
            ));
        }
    };
    fill_lattice(lo, Vec3::splat(spacing), counts)
}

/// `resolution³` lattice points spanning the box between two corners given in
/// any order. The increment per axis is `(max - min) / resolution`; the upper
/// corner itself is excluded.
pub fn lattice_positions_with_resolution(
    corner1: Vec3,
    corner2: Vec3,
    resolution: u32,
) -> FluidResult<Vec<Vec3>> {
    let lo = corner1.min(corner2);
    let hi = corner1.max(corner2);
    if resolution == 0 || !lo.is_finite() || !hi.is_finite() {
        return Ok(Vec::new());
    }

    let step = (hi - lo) / resolution as f32;
    fill_lattice(lo, step, [resolution as usize; 3])
}

/// GPU-compatible particle layout for a rendering collaborator.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuParticle {
    /// Position (xyz) + density (w).
    pub position_density: [f32; 4],
    /// Velocity (xyz) + lambda (w).
    pub velocity_lambda: [f32; 4],
}

impl GpuParticle {
    pub fn new(position: Vec3, velocity: Vec3, density: f32, lambda: f32) -> Self {
        Self {
            position_density: position.extend(density).to_array(),
            velocity_lambda: velocity.extend(lambda).to_array(),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec4::from_array(self.position_density).truncate()
    }

    pub fn velocity(&self) -> Vec3 {
        Vec4::from_array(self.velocity_lambda).truncate()
    }
}

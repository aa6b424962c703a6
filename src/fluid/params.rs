//! Fluid simulation parameters.
//!
//! These parameters control the behavior of the PBF solver. They are passed
//! explicitly to every component that needs them, and can be modified at
//! runtime through the Bevy resource system when the plugin is used.

use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::{FluidError, FluidResult};
use super::kernels::poly6;

/// How the per-frame neighbor relation is constructed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Reflect, Serialize, Deserialize)]
pub enum NeighborStrategy {
    /// Uniform hashed grid with cells of the search radius.
    #[default]
    SpatialHash,
    /// Test every pair of particles. Quadratic, for reference and small scenes.
    BruteForce,
}

/// Parameters controlling the fluid simulation behavior.
///
/// These values are tuned for water-like behavior by default: a particle
/// spacing of half the smoothing radius puts interior particles close to the
/// rest density (see [`FluidParams::rest_density_for_spacing`]).
#[derive(Resource, Clone, Debug, PartialEq, Reflect, Serialize, Deserialize)]
#[reflect(Resource)]
#[serde(default)]
pub struct FluidParams {
    /// Fixed timestep of one frame, in seconds.
    pub timestep: f32,

    /// Gravity acceleration vector. Zero disables gravity.
    pub gravity: Vec3,

    /// Rest density the constraint drives particles towards.
    /// Measured as the poly6-weighted neighbor sum, so it depends on the
    /// smoothing radius and the particle spacing.
    pub rest_density: f32,

    /// Relaxation parameter added to the lambda denominator.
    /// Larger values make the fluid softer but keep sparse regions stable.
    pub relaxation_epsilon: f32,

    /// Smoothing radius of the poly6 (density) kernel.
    pub density_radius: f32,

    /// Smoothing radius of the spiky (gradient) kernel.
    pub gradient_radius: f32,

    /// Number of Jacobi iterations per frame. Zero turns the solver off.
    /// Typical range: 2 - 6
    pub solver_iterations: u32,

    /// Tensile instability correction strength (k).
    pub tensile_strength: f32,

    /// Tensile instability correction exponent (n).
    pub tensile_exponent: i32,

    /// Tensile reference distance as a fraction of the density radius (Δq).
    pub tensile_delta_q: f32,

    /// Vorticity confinement coefficient.
    /// Restores rotational motion lost due to numerical damping.
    pub vorticity_epsilon: f32,

    /// XSPH viscosity coefficient: fraction of the way each velocity is
    /// blended towards its neighborhood average. Must lie in `[0, 1]`.
    pub viscosity: f32,

    /// Mass given to particles created by lattice initialization.
    pub particle_mass: f32,

    /// Neighbor index used each frame.
    pub neighbor_strategy: NeighborStrategy,

    /// Whether the collision hook runs during the position-correction pass.
    pub enable_collisions: bool,
}

impl Default for FluidParams {
    fn default() -> Self {
        Self {
            timestep: 0.016,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            rest_density: 6378.0,
            relaxation_epsilon: 600.0,
            density_radius: 0.1,
            gradient_radius: 0.1,
            solver_iterations: 4,
            tensile_strength: 0.0001,
            tensile_exponent: 4,
            tensile_delta_q: 0.2,
            vorticity_epsilon: 0.0006,
            viscosity: 0.01,
            particle_mass: 1.0,
            neighbor_strategy: NeighborStrategy::SpatialHash,
            enable_collisions: true,
        }
    }
}

impl FluidParams {
    /// Creates parameters optimized for real-time water simulation.
    pub fn water() -> Self {
        Self::default()
    }

    /// Creates parameters for honey-like viscous fluid.
    pub fn honey() -> Self {
        Self {
            viscosity: 0.3,
            vorticity_epsilon: 0.0,
            solver_iterations: 6,
            ..Self::default()
        }
    }

    /// Creates parameters for fast, splashy water (games).
    pub fn splashy() -> Self {
        Self {
            viscosity: 0.001,
            vorticity_epsilon: 0.01,
            tensile_strength: 0.001,
            solver_iterations: 3,
            ..Self::default()
        }
    }

    pub fn with_timestep(mut self, timestep: f32) -> Self {
        self.timestep = timestep;
        self
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_rest_density(mut self, rest_density: f32) -> Self {
        self.rest_density = rest_density;
        self
    }

    pub fn with_relaxation_epsilon(mut self, epsilon: f32) -> Self {
        self.relaxation_epsilon = epsilon;
        self
    }

    /// Use the same radius for both kernels.
    pub fn with_smoothing_radius(mut self, radius: f32) -> Self {
        self.density_radius = radius;
        self.gradient_radius = radius;
        self
    }

    pub fn with_kernel_radii(mut self, density_radius: f32, gradient_radius: f32) -> Self {
        self.density_radius = density_radius;
        self.gradient_radius = gradient_radius;
        self
    }

    pub fn with_solver_iterations(mut self, iterations: u32) -> Self {
        self.solver_iterations = iterations;
        self
    }

    pub fn with_tensile_correction(mut self, strength: f32, exponent: i32, delta_q: f32) -> Self {
        self.tensile_strength = strength;
        self.tensile_exponent = exponent;
        self.tensile_delta_q = delta_q;
        self
    }

    pub fn with_vorticity(mut self, epsilon: f32) -> Self {
        self.vorticity_epsilon = epsilon;
        self
    }

    pub fn with_viscosity(mut self, viscosity: f32) -> Self {
        self.viscosity = viscosity;
        self
    }

    pub fn with_particle_mass(mut self, mass: f32) -> Self {
        self.particle_mass = mass;
        self
    }

    pub fn with_neighbor_strategy(mut self, strategy: NeighborStrategy) -> Self {
        self.neighbor_strategy = strategy;
        self
    }

    pub fn with_collisions(mut self, enabled: bool) -> Self {
        self.enable_collisions = enabled;
        self
    }

    /// Radius of the frozen neighbor search: the larger of the two kernels.
    pub fn neighbor_radius(&self) -> f32 {
        self.density_radius.max(self.gradient_radius)
    }

    /// Density an interior particle of an infinite cubic lattice with the
    /// given spacing would measure. Useful for calibrating `rest_density`.
    pub fn rest_density_for_spacing(&self, spacing: f32) -> f32 {
        let h = self.density_radius;
        if !(spacing > 0.0) || !(h > 0.0) {
            return 0.0;
        }
        let reach = (h / spacing).ceil() as i32;
        let mut density = 0.0;
        for x in -reach..=reach {
            for y in -reach..=reach {
                for z in -reach..=reach {
                    if x == 0 && y == 0 && z == 0 {
                        continue;
                    }
                    let r = Vec3::new(x as f32, y as f32, z as f32) * spacing;
                    density += poly6(r, h);
                }
            }
        }
        density
    }

    /// Check every parameter against its valid domain.
    pub fn validate(&self) -> FluidResult<()> {
        positive("timestep", self.timestep)?;
        positive("rest_density", self.rest_density)?;
        positive("relaxation_epsilon", self.relaxation_epsilon)?;
        positive("density_radius", self.density_radius)?;
        positive("gradient_radius", self.gradient_radius)?;
        positive("particle_mass", self.particle_mass)?;
        non_negative("tensile_strength", self.tensile_strength)?;
        non_negative("vorticity_epsilon", self.vorticity_epsilon)?;

        if !self.gravity.is_finite() {
            return Err(FluidError::invalid("gravity", "must be finite"));
        }
        if !(0.0..1.0).contains(&self.tensile_delta_q) {
            return Err(FluidError::invalid(
                "tensile_delta_q",
                format!("must lie in [0, 1), got {}", self.tensile_delta_q),
            ));
        }
        if self.tensile_exponent < 1 {
            return Err(FluidError::invalid(
                "tensile_exponent",
                format!("must be at least 1, got {}", self.tensile_exponent),
            ));
        }
        if !(0.0..=1.0).contains(&self.viscosity) {
            return Err(FluidError::invalid(
                "viscosity",
                format!("must lie in [0, 1], got {}", self.viscosity),
            ));
        }
        Ok(())
    }

    /// Parse parameters from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> FluidResult<Self> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> FluidResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> FluidResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn positive(field: &'static str, value: f32) -> FluidResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(FluidError::invalid(
            field,
            format!("must be positive and finite, got {value}"),
        ))
    }
}

fn non_negative(field: &'static str, value: f32) -> FluidResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(FluidError::invalid(
            field,
            format!("must be non-negative and finite, got {value}"),
        ))
    }
}

//! Position Based Fluids (PBF) simulation module for Bevy.
//!
//! Incompressibility is enforced by iteratively displacing particle positions
//! until each particle's SPH density matches the rest density, rather than by
//! solving a pressure equation.
//!
//! # Architecture
//!
//! The simulation is structured in the following components:
//!
//! - [`kernels`]: Poly6 and Spiky smoothing kernels
//! - [`params`]: Simulation parameters (density, viscosity, etc.)
//! - [`particle`]: Particle data structures and lattice generation
//! - [`spatial`]: Neighbor search (spatial hash and brute force)
//! - [`solver`]: PBF constraint solver (density constraints)
//! - [`integrator`]: Prediction, vorticity confinement, XSPH viscosity
//! - [`boundary`]: Collision hook and colliders
//! - [`simulation`]: Per-frame driver
//! - [`plugin`]: Bevy plugin for easy integration
//!
//! # Example
//!
//! ```rust,no_run
//! use bevy::prelude::*;
//! use pbfluid::fluid::prelude::*;
//!
//! fn main() -> Result<(), FluidError> {
//!     let mut simulation = FluidSimulation::new(FluidParams::default())?
//!         .with_collision_hook(BoundarySet::container(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 2.0, 1.0)));
//!     simulation.initialize(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(-0.5, 1.0, 0.0), 0.05)?;
//!
//!     for _ in 0..100 {
//!         simulation.step()?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod boundary;
pub mod error;
pub mod integrator;
pub mod kernels;
pub mod params;
pub mod particle;
pub mod plugin;
pub mod simulation;
pub mod solver;
pub mod spatial;

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::boundary::*;
    pub use super::error::*;
    pub use super::integrator::*;
    pub use super::kernels::*;
    pub use super::params::*;
    pub use super::particle::*;
    pub use super::plugin::*;
    pub use super::simulation::*;
    pub use super::solver::*;
    pub use super::spatial::*;
}

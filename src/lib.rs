//! pbfluid - Position Based Fluids simulation for Bevy
//!
//! This library provides a CPU Position Based Fluids (PBF) solver for the Bevy
//! game engine, parallelized with rayon.
//!
//! # Features
//!
//! - **PBF Simulation**: Jacobi density constraint projection with tensile
//!   instability correction
//! - **Vorticity Confinement and XSPH**: restores small-scale swirl, smooths noise
//! - **Pluggable Neighbor Search**: spatial hash or brute force
//! - **Boundary Handling**: Box, plane, and sphere colliders through a collision hook
//! - **Easy Integration**: Simple Bevy plugin interface
//! - **Render Export**: `bytemuck` particle snapshot for GPU upload
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use bevy::prelude::*;
//! use pbfluid::prelude::*;
//!
//! fn main() {
//!     let mut app = App::new();
//!     app.add_plugins(FluidPlugin::default())
//!         .add_systems(Startup, setup);
//!
//!     for _ in 0..100 {
//!         app.update();
//!     }
//! }
//!
//! fn setup(mut simulation: ResMut<FluidSimulation>) {
//!     simulation.set_collision_hook(BoundarySet::container(
//!         Vec3::new(-1.0, 0.0, -1.0),
//!         Vec3::new(1.0, 2.0, 1.0),
//!     ));
//!     if let Err(err) = simulation.initialize(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(-0.5, 1.0, 0.0), 0.05) {
//!         error!("Could not spawn fluid: {err}");
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`fluid`]: Core fluid simulation module
//!   - [`fluid::kernels`]: Smoothing kernels
//!   - [`fluid::params`]: Simulation parameters
//!   - [`fluid::particle`]: Particle data structures
//!   - [`fluid::spatial`]: Neighbor search
//!   - [`fluid::solver`]: PBF constraint solver
//!   - [`fluid::integrator`]: Prediction and velocity finalization
//!   - [`fluid::boundary`]: Boundary handling
//!   - [`fluid::simulation`]: Simulation driver
//!   - [`fluid::plugin`]: Bevy plugin

pub mod fluid;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::fluid::prelude::*;
}

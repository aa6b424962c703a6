//! Bevy plugin for fluid simulation.

use bevy::prelude::*;

use super::params::FluidParams;
use super::simulation::FluidSimulation;

/// Plugin that adds Position Based Fluids simulation to a Bevy app.
///
/// The simulation advances one fixed timestep per app update unless paused
/// through [`FluidState`].
///
/// # Example
///
/// ```rust,ignore
/// use bevy::prelude::*;
/// use pbfluid::prelude::*;
///
/// fn main() {
///     let mut app = App::new();
///     app.add_plugins(FluidPlugin::with_params(FluidParams::honey()));
///     app.update();
/// }
/// ```
#[derive(Default)]
pub struct FluidPlugin {
    params: FluidParams,
}

impl FluidPlugin {
    pub fn with_params(params: FluidParams) -> Self {
        Self { params }
    }
}

impl Plugin for FluidPlugin {
    fn build(&self, app: &mut App) {
        // Register types for reflection
        app.register_type::<FluidParams>()
            .register_type::<FluidState>();

        let simulation = match FluidSimulation::new(self.params.clone()) {
            Ok(simulation) => simulation,
            Err(err) => {
                error!("Invalid fluid parameters, falling back to defaults: {err}");
                FluidSimulation::default()
            }
        };

        app.insert_resource(simulation.params().clone())
            .insert_resource(simulation)
            .init_resource::<FluidState>();

        app.add_systems(Update, (apply_param_changes, run_simulation).chain());
    }
}

/// Run control and statistics exposed to the rest of the app.
#[derive(Resource, Clone, Debug, Default, Reflect)]
#[reflect(Resource)]
pub struct FluidState {
    pub paused: bool,
    step_requested: bool,
    pub particle_count: usize,
    /// Completed frames, as reported by the simulation.
    pub frame: u64,
    pub avg_density_error: f32,
}

impl FluidState {
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Advance exactly one frame while paused.
    pub fn request_step(&mut self) {
        self.step_requested = true;
    }
}

/// Push edited parameters into the simulation. Rejected edits are reverted
/// so the resource always shows the parameters in effect.
fn apply_param_changes(mut params: ResMut<FluidParams>, mut simulation: ResMut<FluidSimulation>) {
    if !params.is_changed() || params.is_added() {
        return;
    }
    if let Err(err) = simulation.set_params(params.clone()) {
        warn!("Ignoring fluid parameter change: {err}");
        *params.bypass_change_detection() = simulation.params().clone();
    }
}

/// System to run the fluid simulation.
fn run_simulation(mut state: ResMut<FluidState>, mut simulation: ResMut<FluidSimulation>) {
    if state.paused && !state.step_requested {
        return;
    }
    state.step_requested = false;

    match simulation.step() {
        Ok(report) => {
            state.particle_count = report.particle_count;
            state.frame = report.frame;
            state.avg_density_error = report.average_density_error;
        }
        Err(err) => {
            error!("Fluid step failed, pausing: {err}");
            state.paused = true;
        }
    }
}

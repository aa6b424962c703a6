//! pbfluid - Position Based Fluids simulation demo
//!
//! This demo runs a headless dam break scenario: a block of fluid on one side
//! of a closed box collapses under gravity. Progress is logged every few
//! frames.
//!
//! Usage: `pbfluid [params.json] [frames]`

use bevy::log::LogPlugin;
use bevy::prelude::*;
use pbfluid::prelude::*;

const CONTAINER_MIN: Vec3 = Vec3::new(-0.6, 0.0, -0.3);
const CONTAINER_MAX: Vec3 = Vec3::new(0.6, 1.0, 0.3);
const PARTICLE_SPACING: f32 = 0.05;
const DEFAULT_FRAMES: u32 = 300;
const LOG_EVERY: u64 = 30;

fn main() {
    let mut args = std::env::args().skip(1);
    let params = match args.next() {
        Some(path) => match FluidParams::from_json_file(&path) {
            Ok(params) => params,
            Err(err) => {
                eprintln!("Failed to load {path}: {err}");
                std::process::exit(1);
            }
        },
        None => FluidParams::default(),
    };
    let frames = args
        .next()
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_FRAMES);

    let mut app = App::new();
    app.add_plugins((LogPlugin::default(), FluidPlugin::with_params(params)))
        .add_systems(Startup, setup_scene)
        .add_systems(Update, report_progress);

    for _ in 0..frames {
        app.update();
        if app.world().resource::<FluidState>().paused {
            break;
        }
    }

    let mut simulation = app.world_mut().resource_mut::<FluidSimulation>();
    let density = simulation.average_density();
    let rest_density = simulation.params().rest_density;
    info!(
        "Finished after {} frames: {} particles, average density {:.1} ({:.1}% of rest density)",
        simulation.frame(),
        simulation.particle_count(),
        density,
        100.0 * density / rest_density
    );
}

/// Set up the container and the fluid block.
fn setup_scene(mut simulation: ResMut<FluidSimulation>) {
    simulation.set_collision_hook(BoundarySet::container(CONTAINER_MIN, CONTAINER_MAX));

    // Dam break: fluid fills the left third of the container.
    let block_min = CONTAINER_MIN + Vec3::splat(0.5 * PARTICLE_SPACING);
    let block_max = Vec3::new(-0.2, 0.5, CONTAINER_MAX.z - 0.5 * PARTICLE_SPACING);
    match simulation.initialize(block_min, block_max, PARTICLE_SPACING) {
        Ok(count) => info!("Dam break scene ready with {count} particles"),
        Err(err) => error!("Failed to spawn fluid: {err}"),
    }
}

/// Log statistics periodically.
fn report_progress(state: Res<FluidState>) {
    if state.frame > 0 && state.frame % LOG_EVERY == 0 {
        info!(
            "Frame {}: {} particles, density error {:.2}%",
            state.frame,
            state.particle_count,
            state.avg_density_error * 100.0
        );
    }
}

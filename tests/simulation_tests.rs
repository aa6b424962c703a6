//! End-to-end behavior of the fluid simulation.

use bevy::prelude::*;
use pbfluid::prelude::*;

const SPACING: f32 = 0.05;

fn two_by_two_block(sim: &mut FluidSimulation) {
    sim.initialize(Vec3::ZERO, Vec3::splat(SPACING), SPACING).unwrap();
}

#[test]
fn test_isolated_particles_fall_freely() {
    let params = FluidParams::default();
    let dt = params.timestep;
    let g = params.gravity;
    let mut sim = FluidSimulation::new(params).unwrap();
    let start = [Vec3::new(-0.5, 1.0, 0.0), Vec3::new(0.5, 1.0, 0.0)];
    sim.set_particles(start.map(Particle::new)).unwrap();

    let report = sim.step().unwrap();
    assert_eq!(report.neighbor_pairs, 0);

    for (i, &p0) in start.iter().enumerate() {
        let velocity = sim.velocity_of(i).unwrap();
        let position = sim.position_of(i).unwrap();
        assert!((velocity - dt * g).length() < 1e-4, "velocity {velocity}");
        assert!((position - p0 - dt * dt * g).length() < 1e-6, "position {position}");
    }
    assert_eq!(sim.velocity_of(0), sim.velocity_of(1));
}

#[test]
fn test_zero_iterations_is_explicit_euler() {
    let params = FluidParams::default().with_solver_iterations(0);
    let dt = params.timestep;
    let g = params.gravity;
    let mut sim = FluidSimulation::new(params).unwrap();
    sim.initialize(Vec3::ZERO, Vec3::splat(0.1), SPACING).unwrap();
    let start = sim.positions().to_vec();

    sim.step().unwrap();
    for (p, p0) in sim.positions().iter().zip(&start) {
        assert_eq!(*p, *p0 + dt * (dt * g));
    }

    for _ in 0..9 {
        sim.step().unwrap();
    }
    // After n frames: v = n dt g, p = p0 + dt² g n(n+1)/2.
    let n = 10.0;
    for ((p, v), p0) in sim.positions().iter().zip(sim.velocities()).zip(&start) {
        assert!((*v - n * dt * g).length() < 1e-3, "velocity {v}");
        assert!((*p - (*p0 + dt * dt * g * n * (n + 1.0) / 2.0)).length() < 1e-4, "position {p}");
    }
}

#[test]
fn test_small_block_converges_to_rest_density() {
    let mut probe = FluidSimulation::default();
    two_by_two_block(&mut probe);
    let initial_density = probe.average_density();
    assert!(initial_density > 0.0);

    // Packed tighter than the rest density implies.
    let params = FluidParams::default()
        .with_rest_density(0.8 * initial_density)
        .with_relaxation_epsilon(2500.0)
        .with_tensile_correction(1.0e-4, 4, 0.2)
        .with_viscosity(0.01)
        .with_vorticity(0.0006)
        .with_solver_iterations(4);
    let rest_density = params.rest_density;
    let mut sim = FluidSimulation::new(params).unwrap();
    two_by_two_block(&mut sim);
    assert!(sim.average_density_error() > 0.2);

    for _ in 0..10 {
        let report = sim.step().unwrap();
        assert_eq!(report.solver_iterations, 4);
    }

    let density = sim.average_density();
    assert!(
        (density / rest_density - 1.0).abs() < 0.1,
        "average density {density} vs rest density {rest_density}"
    );
}

#[test]
fn test_particle_count_is_invariant() {
    let mut sim = FluidSimulation::default()
        .with_collision_hook(BoundarySet::container(Vec3::new(-0.3, 0.0, -0.3), Vec3::new(0.3, 1.0, 0.3)));
    let count = sim
        .initialize(Vec3::new(-0.2, 0.2, -0.1), Vec3::new(0.0, 0.4, 0.1), SPACING)
        .unwrap();
    assert_eq!(count, 125);

    for _ in 0..25 {
        let report = sim.step().unwrap();
        assert_eq!(report.particle_count, count);
    }
    assert_eq!(sim.particle_count(), count);
    assert_eq!(sim.frame(), 25);
}

#[test]
fn test_box_container_keeps_particles_inside() {
    let min = Vec3::new(-0.2, 0.0, -0.2);
    let max = Vec3::new(0.2, 0.5, 0.2);
    let mut sim = FluidSimulation::default().with_collision_hook(BoundarySet::container(min, max));
    sim.initialize(Vec3::new(-0.15, 0.1, -0.15), Vec3::new(0.0, 0.25, 0.0), SPACING)
        .unwrap();
    // One particle is thrown at a wall.
    sim.set_velocity(0, Vec3::new(-20.0, 0.0, 0.0)).unwrap();

    let tolerance = Vec3::splat(1e-5);
    for _ in 0..60 {
        sim.step().unwrap();
        for p in sim.positions() {
            assert!(p.cmpge(min - tolerance).all() && p.cmple(max + tolerance).all(), "escaped: {p}");
        }
    }
}

#[test]
fn test_sphere_obstacle_is_avoided() {
    let obstacle = SphereBoundary::new(Vec3::new(0.0, 0.2, 0.0), 0.1).obstacle();
    let hook = BoundarySet::container(Vec3::new(-0.3, 0.0, -0.3), Vec3::new(0.3, 1.0, 0.3)).with(obstacle);
    let mut sim = FluidSimulation::default().with_collision_hook(hook);
    sim.initialize(Vec3::new(-0.05, 0.4, -0.05), Vec3::new(0.05, 0.5, 0.05), SPACING)
        .unwrap();

    for _ in 0..40 {
        sim.step().unwrap();
        for p in sim.positions() {
            assert!(obstacle.signed_distance(*p) > -1e-4, "inside obstacle: {p}");
        }
    }
}

#[test]
fn test_neighbor_strategies_agree() {
    let run = |strategy: NeighborStrategy| {
        let params = FluidParams::default().with_neighbor_strategy(strategy);
        let mut sim = FluidSimulation::new(params)
            .unwrap()
            .with_collision_hook(BoundarySet::container(Vec3::new(-0.3, 0.0, -0.3), Vec3::new(0.3, 1.0, 0.3)));
        sim.initialize(Vec3::new(-0.1, 0.0, -0.1), Vec3::new(0.1, 0.2, 0.1), SPACING)
            .unwrap();
        sim.run(10).unwrap();
        (sim.neighbor_search_name(), sim.positions().to_vec())
    };

    let (hash_name, hashed) = run(NeighborStrategy::SpatialHash);
    let (brute_name, brute) = run(NeighborStrategy::BruteForce);
    assert_eq!(hash_name, "spatial-hash");
    assert_eq!(brute_name, "brute-force");
    for (a, b) in hashed.iter().zip(&brute) {
        assert!((*a - *b).length() < 1e-6);
    }
}

#[test]
fn test_non_finite_state_corrupts_until_reset() {
    let mut sim = FluidSimulation::default();
    two_by_two_block(&mut sim);
    sim.step().unwrap();
    sim.set_velocity(3, Vec3::new(f32::NAN, 0.0, 0.0)).unwrap();

    match sim.step() {
        Err(FluidError::NonFiniteState { frame, particle, .. }) => {
            assert_eq!(frame, 2);
            assert_eq!(particle, 3);
        }
        other => panic!("expected NonFiniteState, got {other:?}"),
    }
    assert!(sim.is_corrupted());
    assert!(matches!(sim.step(), Err(FluidError::Corrupted { frame: 2 })));

    two_by_two_block(&mut sim);
    assert!(!sim.is_corrupted());
    assert_eq!(sim.step().unwrap().frame, 1);
}

#[test]
fn test_simulation_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("honey.json");
    std::fs::write(&path, r#"{ "viscosity": 0.3, "solver_iterations": 6, "neighbor_strategy": "BruteForce" }"#)
        .unwrap();

    let params = FluidParams::from_json_file(&path).unwrap();
    let mut sim = FluidSimulation::new(params).unwrap();
    two_by_two_block(&mut sim);

    let report = sim.step().unwrap();
    assert_eq!(report.solver_iterations, 6);
    assert_eq!(sim.neighbor_search_name(), "brute-force");
}

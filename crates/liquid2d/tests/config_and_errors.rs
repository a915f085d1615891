//! Configuration round-trips and typed error surfacing
//!
//! Configs must survive serde_json unchanged and fill missing fields from
//! defaults. Geometry, layout and solver failures must reach callers as
//! the matching `Error` variant.

use glam::DVec2;
use liquid2d::{
    EulerianLiquid, Error, IntegrationOrder, InterpolationOrder, LevelSet, LiquidConfig,
    MultiMaterialConfig, MultiMaterialLiquid, NonconvergencePolicy, SolverConfig, Transform,
    VectorGrid,
};

#[test]
fn test_liquid_config_round_trip() {
    let config = LiquidConfig {
        cfl: 3.0,
        solve_viscosity: true,
        interpolation: InterpolationOrder::Cubic,
        solver: SolverConfig::new(1e-6, 300).with_policy(NonconvergencePolicy::AcceptBestEffort),
        ..Default::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    let back: LiquidConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_multi_config_round_trip() {
    let config = MultiMaterialConfig {
        extrapolation_bandwidth: 3.5,
        surface_integration: IntegrationOrder::ForwardEuler,
        ..Default::default()
    };
    let json = serde_json::to_string_pretty(&config).unwrap();
    let back: MultiMaterialConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_partial_config_uses_defaults() {
    let json = r#"{ "cfl": 2.5, "solve_viscosity": true }"#;
    let config: LiquidConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.cfl, 2.5);
    assert!(config.solve_viscosity);
    assert_eq!(config.viscosity_samples, 3);
    assert_eq!(config.solver, SolverConfig::default());
}

#[test]
fn test_invalid_config_is_rejected_on_construction() {
    let config = LiquidConfig {
        cfl: -1.0,
        ..Default::default()
    };
    assert!(matches!(
        EulerianLiquid::new(Transform::unit(), [8, 8], config),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(Transform::new(0.0, DVec2::ZERO), Err(Error::InvalidConfig(_))));
}

#[test]
fn test_non_inverted_solid_is_invalid_geometry() {
    let mut sim = EulerianLiquid::new(Transform::unit(), [8, 8], LiquidConfig::default()).unwrap();
    let solid = LevelSet::from_fn(Transform::unit(), [8, 8], |p| p.y - 1.0);
    let err = sim.set_solid_surface(&solid).unwrap_err();
    assert!(matches!(err, Error::InvalidGeometry(_)));
    assert!(err.to_string().contains("inverted"));

    let multi_config = MultiMaterialConfig::default();
    let mut multi = MultiMaterialLiquid::new(Transform::unit(), [8, 8], 2, multi_config).unwrap();
    assert!(matches!(multi.set_solid_surface(&solid), Err(Error::InvalidGeometry(_))));
}

#[test]
fn test_layout_mismatch_is_dimension_mismatch() {
    let mut sim = EulerianLiquid::new(Transform::unit(), [8, 8], LiquidConfig::default()).unwrap();
    let other = LevelSet::from_fn(Transform::unit(), [8, 9], |p| p.y - 1.0);
    assert!(matches!(
        sim.union_liquid_surface(&other),
        Err(Error::DimensionMismatch { .. })
    ));
}

#[test]
fn test_solver_nonconvergence_surfaces_from_timestep() {
    let config = LiquidConfig {
        solver: SolverConfig::new(1e-12, 1),
        ..Default::default()
    };
    let xform = Transform::unit();
    let mut sim = EulerianLiquid::new(xform, [12, 12], config).unwrap();
    let blob = LevelSet::from_fn(xform, [12, 12], |p| (p - DVec2::new(6.0, 5.0)).length() - 3.5);
    sim.set_liquid_surface(&blob);
    let mut swirl = VectorGrid::staggered(xform, [12, 12], 0.0);
    for axis in 0..2 {
        let layout = swirl.grid(axis).clone();
        swirl.grid_mut(axis).par_fill_with(|idx| {
            let p = layout.sample_position(idx);
            if axis == 0 { (p.y * 0.8).sin() + p.x * 0.2 } else { (p.x * 0.6).cos() * p.y * 0.1 }
        });
    }
    sim.set_liquid_velocity(&swirl);
    sim.add_uniform_force(0.05, DVec2::new(0.0, -9.8));

    match sim.run_timestep(0.05) {
        Err(Error::SolverNonconvergence { iterations, residual }) => {
            assert_eq!(iterations, 1);
            assert!(residual > 0.0);
        }
        other => panic!("expected nonconvergence, got {:?}", other),
    }
}

#[test]
fn test_best_effort_policy_keeps_running() {
    let config = LiquidConfig {
        solver: SolverConfig::new(1e-12, 1).with_policy(NonconvergencePolicy::AcceptBestEffort),
        ..Default::default()
    };
    let xform = Transform::unit();
    let mut sim = EulerianLiquid::new(xform, [12, 12], config).unwrap();
    sim.set_liquid_surface(&LevelSet::from_fn(xform, [12, 12], |p| p.y - 6.3));
    sim.add_uniform_force(0.05, DVec2::new(0.0, -9.8));
    sim.run_timestep(0.05).unwrap();
    assert!(sim.velocity().max_magnitude().is_finite());
}

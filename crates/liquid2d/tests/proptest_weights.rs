//! Property-based tests for face weights and the integrator
//!
//! Invariants checked across random inputs:
//! - Length fractions stay in [0, 1] and complement under sign flip
//! - Normalized material weights plus solid partition every face
//! - RK3 is exact for velocities that depend only on time

use glam::DVec2;
use liquid2d::weights::{compute_cut_cell_weights, length_fraction, normalize_material_weights};
use liquid2d::{integrate, IntegrationOrder, LevelSet, Transform};
use proptest::prelude::*;

const CELLS: [usize; 2] = [12, 12];
const PARTITION_TOL: f64 = 1e-9;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn length_fraction_is_bounded(a in -10.0f64..10.0, b in -10.0f64..10.0) {
        let w = length_fraction(a, b);
        prop_assert!((0.0..=1.0).contains(&w), "w = {}", w);
        prop_assert_eq!(w, length_fraction(b, a));
    }

    #[test]
    fn length_fraction_complements(a in -10.0f64..10.0, b in -10.0f64..10.0) {
        prop_assume!(a != 0.0 && b != 0.0);
        let sum = length_fraction(a, b) + length_fraction(-a, -b);
        prop_assert!((sum - 1.0).abs() < 1e-12, "sum = {}", sum);
    }

    #[test]
    fn normalized_weights_partition_faces(
        height in 2.1f64..9.9,
        tilt in -0.4f64..0.4,
        cx in 4.0f64..8.0,
        cy in 4.0f64..8.0,
        radius in 3.0f64..6.0,
    ) {
        let xform = Transform::unit();
        let split = move |p: DVec2| p.y - (height + tilt * (p.x - 6.0));
        let lower = LevelSet::from_fn(xform, CELLS, split);
        let upper = LevelSet::from_fn(xform, CELLS, move |p| -split(p));
        let centre = DVec2::new(cx, cy);
        let mut solid = LevelSet::from_fn(xform, CELLS, move |p| radius - (p - centre).length());
        solid.set_inverted();

        let surfaces = vec![lower, upper];
        let solid_weights = compute_cut_cell_weights(&solid, false, 0.0);
        let mut weights: Vec<_> = surfaces
            .iter()
            .map(|s| compute_cut_cell_weights(s, false, 0.0))
            .collect();
        normalize_material_weights(&mut weights, &solid_weights, &surfaces).unwrap();

        for axis in 0..2 {
            let [sx, sy] = solid_weights.size(axis);
            for j in 0..sy {
                for i in 0..sx {
                    let face = [i, j];
                    let total = solid_weights[(face, axis)]
                        + weights.iter().map(|w| w[(face, axis)]).sum::<f64>();
                    prop_assert!(
                        (total - 1.0).abs() < PARTITION_TOL,
                        "face {:?} axis {} sums to {}", face, axis, total
                    );
                }
            }
        }
    }

    #[test]
    fn rk3_exact_for_time_dependent_velocity(
        x in -5.0f64..5.0,
        y in -5.0f64..5.0,
        h in 0.001f64..1.0,
        ax in -3.0f64..3.0,
        ay in -3.0f64..3.0,
        b in -2.0f64..2.0,
    ) {
        let a = DVec2::new(ax, ay);
        let start = DVec2::new(x, y);
        let velocity = |t: f64, _p: DVec2| a + DVec2::splat(b * t);
        let end = integrate(h, start, velocity, IntegrationOrder::Rk3);
        let exact = start + a * h + DVec2::splat(0.5 * b * h * h);
        prop_assert!((end - exact).length() < 1e-12, "{:?} vs {:?}", end, exact);
    }

    #[test]
    fn constant_velocity_is_exact_for_both_orders(
        x in -5.0f64..5.0,
        h in -1.0f64..1.0,
        c in -4.0f64..4.0,
    ) {
        for order in [IntegrationOrder::ForwardEuler, IntegrationOrder::Rk3] {
            let end: f64 = integrate(h, x, |_t: f64, _p: f64| c, order);
            prop_assert!((end - (x + h * c)).abs() < 1e-12, "{:?}: {}", order, end);
        }
    }
}

//! Implicit viscosity on the staggered grid.
//!
//! Backward Euler step of the variational form: the new face velocities
//! minimise
//!
//! ```text
//! ½ Σ_f A_f (u_f − u*_f)²
//!   + dt Σ_c μ_c V_c (u_x² + v_y²)
//!   + dt Σ_n μ_n V_n ½ (u_y + v_x)²
//! ```
//!
//! where `A` is the liquid fraction of each face control volume and `V` the
//! liquid fraction at cell centres (normal stress) and nodes (shear stress).
//! The stationarity conditions give a symmetric positive definite system.

use crate::error::{Error, Result};
use crate::grid::{Grid, MarkedCell, SampleType, VectorGrid};
use crate::solver::{LinearSolver, SolveReport, SparseMatrixBuilder};
use crate::surface::LevelSet;
use crate::weights::{compute_supersampled_areas, compute_supersampled_face_areas};

/// Liquid and solid coverage fractions consumed by the viscosity solve.
#[derive(Clone, Debug)]
pub struct ViscosityWeights {
    pub face_areas: VectorGrid<f64>,
    pub center_areas: Grid<f64>,
    pub node_areas: Grid<f64>,
    pub solid_center_areas: Grid<f64>,
    pub solid_node_areas: Grid<f64>,
}

impl ViscosityWeights {
    /// Supersample the liquid and solid surfaces with `samples`² points per
    /// control volume.
    pub fn compute(liquid: &LevelSet, solid: &LevelSet, samples: usize) -> Self {
        Self {
            face_areas: compute_supersampled_face_areas(liquid, samples),
            center_areas: compute_supersampled_areas(liquid, SampleType::Center, samples),
            node_areas: compute_supersampled_areas(liquid, SampleType::Node, samples),
            solid_center_areas: compute_supersampled_areas(solid, SampleType::Center, samples),
            solid_node_areas: compute_supersampled_areas(solid, SampleType::Node, samples),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum FaceLabel {
    Unknown(usize),
    /// Held at the solid velocity.
    Solid,
    /// Held at its current value.
    Air,
}

pub struct ViscositySolver<'a> {
    dt: f64,
    velocity: &'a VectorGrid<f64>,
    solid_surface: &'a LevelSet,
    solid_velocity: &'a VectorGrid<f64>,
    viscosity: &'a Grid<f64>,
}

impl<'a> ViscositySolver<'a> {
    pub fn new(
        dt: f64,
        surface: &LevelSet,
        velocity: &'a VectorGrid<f64>,
        solid_surface: &'a LevelSet,
        solid_velocity: &'a VectorGrid<f64>,
        viscosity: &'a Grid<f64>,
    ) -> Result<Self> {
        surface.phi().check_layout(solid_surface.phi(), "viscosity solid surface")?;
        surface.phi().check_layout(viscosity, "viscosity coefficients")?;
        velocity.check_layout(solid_velocity, "viscosity solid velocity")?;
        if velocity.cells() != surface.phi().cells()
            || velocity.transform() != surface.transform()
        {
            return Err(Error::mismatch(
                "viscosity velocity",
                (surface.phi().cells(), surface.transform()),
                (velocity.cells(), velocity.transform()),
            ));
        }
        if !(dt > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "viscosity timestep must be positive, got {}",
                dt
            )));
        }
        Ok(Self {
            dt,
            velocity,
            solid_surface,
            solid_velocity,
            viscosity,
        })
    }

    fn check_weights(&self, weights: &ViscosityWeights) -> Result<()> {
        self.velocity.check_layout(&weights.face_areas, "viscosity face areas")?;
        self.viscosity.check_layout(&weights.center_areas, "viscosity center areas")?;
        self.viscosity.check_layout(&weights.solid_center_areas, "viscosity solid center areas")?;
        weights
            .node_areas
            .check_layout(&weights.solid_node_areas, "viscosity node areas")?;
        if weights.node_areas.sample_type() != SampleType::Node
            || !weights.node_areas.same_domain(self.viscosity)
        {
            return Err(Error::mismatch(
                "viscosity node areas",
                SampleType::Node,
                weights.node_areas.sample_type(),
            ));
        }
        Ok(())
    }

    fn label_faces(&self, weights: &ViscosityWeights) -> ([Grid<FaceLabel>; 2], usize) {
        let cells = self.velocity.cells();
        let mut count = 0;
        let labels = [0, 1].map(|axis| {
            let mut labels = self.velocity.grid(axis).like(FaceLabel::Air);
            let [sx, sy] = labels.size();
            for j in 0..sy {
                for i in 0..sx {
                    let face = [i, j];
                    let position = self.velocity.sample_position(face, axis);
                    labels[face] = if face[axis] == 0
                        || face[axis] >= cells[axis]
                        || self.solid_surface.interp(position) <= 0.0
                    {
                        FaceLabel::Solid
                    } else if weights.face_areas[(face, axis)] > 0.0 {
                        count += 1;
                        FaceLabel::Unknown(count - 1)
                    } else {
                        FaceLabel::Air
                    };
                }
            }
            labels
        });
        (labels, count)
    }

    /// Solve for the viscous velocity. Solved faces are written into
    /// `velocity` and marked Finished in `valid`; the rest keep their values.
    pub fn solve(
        &self,
        weights: &ViscosityWeights,
        solver: &dyn LinearSolver,
        velocity: &mut VectorGrid<f64>,
        valid: &mut VectorGrid<MarkedCell>,
    ) -> Result<SolveReport> {
        self.check_weights(weights)?;
        self.velocity.check_layout(velocity, "viscosity output velocity")?;
        self.velocity.check_layout(valid, "viscosity validity")?;

        let (labels, count) = self.label_faces(weights);
        let cells = self.velocity.cells();
        let inv_dx = 1.0 / self.velocity.dx();

        let mut builder = SparseMatrixBuilder::new(count);
        let mut rhs = vec![0.0; count];

        for axis in 0..2 {
            for (flat, label) in labels[axis].values().iter().enumerate() {
                if let FaceLabel::Unknown(row) = *label {
                    let face = labels[axis].coords(flat);
                    let area = weights.face_areas[(face, axis)];
                    builder.add_to_element(row, row, area);
                    rhs[row] += area * self.velocity[(face, axis)];
                }
            }
        }

        let fixed_value = |face: [usize; 2], axis: usize| -> f64 {
            match labels[axis][face] {
                FaceLabel::Solid => self.solid_velocity[(face, axis)],
                _ => self.velocity[(face, axis)],
            }
        };

        let mut add_stress = |terms: &[([usize; 2], usize, f64)], factor: f64| {
            for &(face_m, axis_m, a_m) in terms {
                let FaceLabel::Unknown(row) = labels[axis_m][face_m] else { continue };
                for &(face_n, axis_n, a_n) in terms {
                    let value = factor * a_m * a_n;
                    match labels[axis_n][face_n] {
                        FaceLabel::Unknown(col) => builder.add_to_element(row, col, value),
                        _ => rhs[row] -= value * fixed_value(face_n, axis_n),
                    }
                }
            }
        };

        // Normal stress at cell centres.
        for j in 0..cells[1] {
            for i in 0..cells[0] {
                let volume = weights.center_areas[[i, j]];
                if volume <= 0.0 || weights.solid_center_areas[[i, j]] >= 1.0 {
                    continue;
                }
                let factor = 2.0 * self.dt * self.viscosity[[i, j]] * volume;
                add_stress(&[([i + 1, j], 0, inv_dx), ([i, j], 0, -inv_dx)], factor);
                add_stress(&[([i, j + 1], 1, inv_dx), ([i, j], 1, -inv_dx)], factor);
            }
        }

        // Shear stress at interior nodes.
        for j in 1..cells[1] {
            for i in 1..cells[0] {
                let volume = weights.node_areas[[i, j]];
                if volume <= 0.0 || weights.solid_node_areas[[i, j]] >= 1.0 {
                    continue;
                }
                let node = weights.node_areas.sample_position([i, j]);
                let mu = self.viscosity.interp_linear(node);
                let factor = self.dt * mu * volume;
                add_stress(
                    &[
                        ([i, j], 0, inv_dx),
                        ([i, j - 1], 0, -inv_dx),
                        ([i, j], 1, inv_dx),
                        ([i - 1, j], 1, -inv_dx),
                    ],
                    factor,
                );
            }
        }

        let matrix = builder.build();
        let mut solution = vec![0.0; count];
        for axis in 0..2 {
            for (flat, label) in labels[axis].values().iter().enumerate() {
                if let FaceLabel::Unknown(row) = *label {
                    solution[row] = self.velocity.grid(axis).values()[flat];
                }
            }
        }
        let report = solver.solve(&matrix, &rhs, &mut solution)?;

        *velocity = self.velocity.clone();
        for axis in 0..2 {
            for (flat, label) in labels[axis].values().iter().enumerate() {
                if let FaceLabel::Unknown(row) = *label {
                    velocity.grid_mut(axis).values_mut()[flat] = solution[row];
                    valid.grid_mut(axis).values_mut()[flat] = MarkedCell::Finished;
                }
            }
        }
        Ok(report)
    }
}

/// Kinetic energy weighted by face coverage; used to check dissipation.
pub fn weighted_kinetic_energy(velocity: &VectorGrid<f64>, face_areas: &VectorGrid<f64>) -> f64 {
    (0..2)
        .map(|axis| {
            velocity
                .grid(axis)
                .values()
                .iter()
                .zip(face_areas.grid(axis).values())
                .map(|(u, a)| 0.5 * a * u * u)
                .sum::<f64>()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{PcgSolver, SolverConfig};
    use crate::transform::Transform;
    use glam::DVec2;

    fn setup(cells: [usize; 2]) -> (LevelSet, LevelSet, Grid<f64>) {
        let xform = Transform::new(0.1, DVec2::ZERO).unwrap();
        let liquid = LevelSet::from_fn(xform, cells, |_| -10.0);
        let mut solid = LevelSet::from_fn(xform, cells, |_| 10.0);
        solid.set_inverted();
        let mu = liquid.phi().like(5.0);
        (liquid, solid, mu)
    }

    #[test]
    fn test_rigid_translation_is_unchanged() {
        let cells = [8, 8];
        let (liquid, solid, mu) = setup(cells);
        let mut velocity = VectorGrid::staggered(liquid.transform(), cells, 0.0);
        velocity.grid_mut(0).fill(1.0);
        velocity.grid_mut(1).fill(-0.5);
        let solid_velocity = velocity.clone();

        let weights = ViscosityWeights::compute(&liquid, &solid, 3);
        let solver =
            ViscositySolver::new(0.1, &liquid, &velocity, &solid, &solid_velocity, &mu).unwrap();
        let mut out = velocity.clone();
        let mut valid = velocity.like(MarkedCell::Unvisited);
        solver
            .solve(&weights, &PcgSolver::new(SolverConfig::new(1e-12, 500)), &mut out, &mut valid)
            .unwrap();

        for axis in 0..2 {
            for (a, b) in out.grid(axis).values().iter().zip(velocity.grid(axis).values()) {
                assert!((a - b).abs() < 1e-8, "{} vs {}", a, b);
            }
        }
        assert_eq!(valid[([4, 4], 0)], MarkedCell::Finished);
        assert_eq!(valid[([0, 4], 0)], MarkedCell::Unvisited, "wall faces are held fixed");
    }

    #[test]
    fn test_shear_is_dissipated() {
        let cells = [10, 10];
        let (liquid, solid, mu) = setup(cells);
        let mut velocity = VectorGrid::staggered(liquid.transform(), cells, 0.0);
        let layout = velocity.grid(0).clone();
        velocity
            .grid_mut(0)
            .par_fill_with(|idx| (layout.sample_position(idx).y * 6.0).sin());
        let solid_velocity = velocity.like(0.0);

        let weights = ViscosityWeights::compute(&liquid, &solid, 3);
        let solver =
            ViscositySolver::new(0.05, &liquid, &velocity, &solid, &solid_velocity, &mu).unwrap();
        let mut out = velocity.clone();
        let mut valid = velocity.like(MarkedCell::Unvisited);
        solver.solve(&weights, &PcgSolver::default(), &mut out, &mut valid).unwrap();

        let before = weighted_kinetic_energy(&velocity, &weights.face_areas);
        let after = weighted_kinetic_energy(&out, &weights.face_areas);
        assert!(after < before, "energy {} -> {}", before, after);
    }

    #[test]
    fn test_rejects_non_positive_dt() {
        let (liquid, solid, mu) = setup([4, 4]);
        let v = VectorGrid::staggered(liquid.transform(), [4, 4], 0.0);
        assert!(matches!(
            ViscositySolver::new(0.0, &liquid, &v, &solid, &v, &mu),
            Err(Error::InvalidConfig(_))
        ));
    }
}

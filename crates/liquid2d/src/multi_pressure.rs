//! Shared-pressure projection for several immiscible materials.
//!
//! Every open face is partitioned between materials by their normalized
//! cut-cell weights. One pressure acts on all of them; a face's coefficient
//! is the weight-averaged inverse density `Σ_m w_m / ρ_m`.

use crate::error::{Error, Result};
use crate::grid::{cell_to_face, Grid, MarkedCell, SampleType, VectorGrid};
use crate::solver::{LinearSolver, SolveReport, SparseMatrix, SparseMatrixBuilder};
use crate::surface::LevelSet;

/// Outflow of each cell with faces split between materials and solid.
/// Domain-boundary faces move at the solid velocity.
pub fn multi_material_divergence(
    velocities: &[VectorGrid<f64>],
    material_weights: &[VectorGrid<f64>],
    solid_weights: &VectorGrid<f64>,
    solid_velocity: &VectorGrid<f64>,
) -> Result<Grid<f64>> {
    if velocities.len() != material_weights.len() {
        return Err(Error::mismatch(
            "divergence materials",
            velocities.len(),
            material_weights.len(),
        ));
    }
    for (velocity, weights) in velocities.iter().zip(material_weights) {
        solid_velocity.check_layout(velocity, "divergence velocity")?;
        solid_velocity.check_layout(weights, "divergence weights")?;
    }
    solid_velocity.check_layout(solid_weights, "divergence solid weights")?;

    let cells = solid_velocity.cells();
    let mut divergence = Grid::new(solid_velocity.transform(), cells, SampleType::Center, 0.0);
    divergence.par_fill_with(|cell| {
        let mut flux = 0.0;
        for axis in 0..2 {
            for side in 0..2 {
                let face = cell_to_face(cell, axis, side);
                let sign = if side == 1 { 1.0 } else { -1.0 };
                flux += sign
                    * face_flux(
                        face,
                        axis,
                        cells,
                        velocities,
                        material_weights,
                        solid_weights,
                        solid_velocity,
                    );
            }
        }
        flux
    });
    Ok(divergence)
}

fn face_flux(
    face: [usize; 2],
    axis: usize,
    cells: [usize; 2],
    velocities: &[VectorGrid<f64>],
    material_weights: &[VectorGrid<f64>],
    solid_weights: &VectorGrid<f64>,
    solid_velocity: &VectorGrid<f64>,
) -> f64 {
    if face[axis] == 0 || face[axis] >= cells[axis] {
        return solid_velocity[(face, axis)];
    }
    let material: f64 = velocities
        .iter()
        .zip(material_weights)
        .map(|(u, w)| w[(face, axis)] * u[(face, axis)])
        .sum();
    material + solid_weights[(face, axis)] * solid_velocity[(face, axis)]
}

pub struct MultiMaterialPressureProjection<'a> {
    velocities: &'a [VectorGrid<f64>],
    densities: Vec<f64>,
    solid_velocity: &'a VectorGrid<f64>,
    pressure: Grid<f64>,
}

impl<'a> MultiMaterialPressureProjection<'a> {
    pub fn new(
        surfaces: &[LevelSet],
        velocities: &'a [VectorGrid<f64>],
        densities: &[f64],
        solid_surface: &LevelSet,
        solid_velocity: &'a VectorGrid<f64>,
    ) -> Result<Self> {
        if surfaces.is_empty() {
            return Err(Error::InvalidConfig(
                "multi-material projection needs at least one material".into(),
            ));
        }
        if velocities.len() != surfaces.len() || densities.len() != surfaces.len() {
            return Err(Error::mismatch(
                "material count",
                surfaces.len(),
                (velocities.len(), densities.len()),
            ));
        }
        if let Some(density) = densities.iter().find(|d| !(**d > 0.0)) {
            return Err(Error::InvalidConfig(format!(
                "material density must be positive, got {}",
                density
            )));
        }
        for (surface, velocity) in surfaces.iter().zip(velocities) {
            solid_surface.phi().check_layout(surface.phi(), "material surface")?;
            solid_velocity.check_layout(velocity, "material velocity")?;
        }
        if solid_velocity.cells() != solid_surface.phi().cells()
            || solid_velocity.transform() != solid_surface.transform()
        {
            return Err(Error::mismatch(
                "multi-material solid velocity",
                (solid_surface.phi().cells(), solid_surface.transform()),
                (solid_velocity.cells(), solid_velocity.transform()),
            ));
        }

        Ok(Self {
            velocities,
            densities: densities.to_vec(),
            solid_velocity,
            pressure: solid_surface.phi().like(0.0),
        })
    }

    pub fn pressure(&self) -> &Grid<f64> {
        &self.pressure
    }

    fn check_weights(&self, material_weights: &[VectorGrid<f64>]) -> Result<()> {
        if material_weights.len() != self.densities.len() {
            return Err(Error::mismatch(
                "material weights",
                self.densities.len(),
                material_weights.len(),
            ));
        }
        for weights in material_weights {
            self.solid_velocity.check_layout(weights, "material weights")?;
        }
        Ok(())
    }

    fn face_coefficient(
        &self,
        material_weights: &[VectorGrid<f64>],
        face: [usize; 2],
        axis: usize,
    ) -> f64 {
        material_weights
            .iter()
            .zip(&self.densities)
            .map(|(w, rho)| w[(face, axis)] / rho)
            .sum()
    }

    pub fn project(
        &mut self,
        material_weights: &[VectorGrid<f64>],
        solid_weights: &VectorGrid<f64>,
        solver: &dyn LinearSolver,
    ) -> Result<SolveReport> {
        self.check_weights(material_weights)?;
        self.solid_velocity.check_layout(solid_weights, "solid weights")?;

        let cells = self.pressure.cells();
        let dx = self.pressure.dx();
        let interior = |face: [usize; 2], axis: usize| face[axis] > 0 && face[axis] < cells[axis];

        let mut index: Grid<Option<usize>> = self.pressure.like(None);
        let mut count = 0;
        for j in 0..cells[1] {
            for i in 0..cells[0] {
                let open = (0..2).any(|axis| {
                    (0..2).any(|side| {
                        let face = cell_to_face([i, j], axis, side);
                        interior(face, axis)
                            && self.face_coefficient(material_weights, face, axis) > 0.0
                    })
                });
                if open {
                    index[[i, j]] = Some(count);
                    count += 1;
                }
            }
        }

        let mut builder = SparseMatrixBuilder::new(count);
        let mut rhs = vec![0.0; count];
        for j in 0..cells[1] {
            for i in 0..cells[0] {
                let Some(row) = index[[i, j]] else { continue };
                for axis in 0..2 {
                    for side in 0..2 {
                        let face = cell_to_face([i, j], axis, side);
                        let sign = if side == 1 { 1.0 } else { -1.0 };
                        rhs[row] -= sign
                            * dx
                            * face_flux(
                                face,
                                axis,
                                cells,
                                self.velocities,
                                material_weights,
                                solid_weights,
                                self.solid_velocity,
                            );

                        if !interior(face, axis) {
                            continue;
                        }
                        let beta = self.face_coefficient(material_weights, face, axis);
                        if beta <= 0.0 {
                            continue;
                        }
                        builder.add_to_element(row, row, beta);
                        let mut neighbour = [i, j];
                        if side == 1 {
                            neighbour[axis] += 1;
                        } else {
                            neighbour[axis] -= 1;
                        }
                        if let Some(col) = index[neighbour] {
                            builder.add_to_element(row, col, -beta);
                        }
                    }
                }
            }
        }

        let matrix = builder.build();
        remove_component_means(&matrix, &mut rhs);

        let mut solution = vec![0.0; count];
        let report = solver.solve(&matrix, &rhs, &mut solution)?;

        self.pressure.fill(0.0);
        for (value, slot) in self.pressure.values_mut().iter_mut().zip(index.values()) {
            if let Some(row) = slot {
                *value = solution[*row];
            }
        }
        Ok(report)
    }

    /// Subtract each material's pressure gradient on the faces it covers.
    /// Returns per-material validity: Finished where the material has weight.
    pub fn apply_solution(
        &self,
        velocities: &mut [VectorGrid<f64>],
        material_weights: &[VectorGrid<f64>],
    ) -> Result<Vec<VectorGrid<MarkedCell>>> {
        self.check_weights(material_weights)?;
        if velocities.len() != self.densities.len() {
            return Err(Error::mismatch(
                "material velocities",
                self.densities.len(),
                velocities.len(),
            ));
        }

        let cells = self.pressure.cells();
        let dx = self.pressure.dx();
        let pressure = &self.pressure;
        let mut validity = Vec::with_capacity(velocities.len());

        for ((velocity, weights), (source, rho)) in velocities
            .iter_mut()
            .zip(material_weights)
            .zip(self.velocities.iter().zip(&self.densities))
        {
            self.solid_velocity.check_layout(velocity, "material output velocity")?;
            let mut corrected = source.clone();
            let mut valid = source.like(MarkedCell::Unvisited);
            for axis in 0..2 {
                let weights = weights.grid(axis);
                let open = |face: [usize; 2]| {
                    face[axis] > 0 && face[axis] < cells[axis] && weights[face] > 0.0
                };
                corrected.grid_mut(axis).par_update(|face, value| {
                    if open(face) {
                        let mut backward = face;
                        backward[axis] -= 1;
                        *value -= (pressure[face] - pressure[backward]) / (rho * dx);
                    }
                });
                valid.grid_mut(axis).par_fill_with(|face| {
                    if open(face) {
                        MarkedCell::Finished
                    } else {
                        MarkedCell::Unvisited
                    }
                });
            }
            *velocity = corrected;
            validity.push(valid);
        }
        Ok(validity)
    }
}

/// Make the right-hand side compatible with a pure-Neumann operator by
/// removing its mean over every connected block of unknowns.
fn remove_component_means(matrix: &SparseMatrix, rhs: &mut [f64]) {
    let n = matrix.size();
    let mut component = vec![usize::MAX; n];
    let mut stack = Vec::new();
    let mut members = Vec::new();
    for seed in 0..n {
        if component[seed] != usize::MAX {
            continue;
        }
        component[seed] = seed;
        stack.push(seed);
        members.clear();
        while let Some(row) = stack.pop() {
            members.push(row);
            for (col, value) in matrix.row(row) {
                if value != 0.0 && component[col] == usize::MAX {
                    component[col] = seed;
                    stack.push(col);
                }
            }
        }
        let mean = members.iter().map(|&r| rhs[r]).sum::<f64>() / members.len() as f64;
        for &r in &members {
            rhs[r] -= mean;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{PcgSolver, SolverConfig};
    use crate::transform::Transform;
    use crate::weights::{compute_cut_cell_weights, normalize_material_weights};
    use glam::DVec2;

    struct Setup {
        surfaces: Vec<LevelSet>,
        solid: LevelSet,
        solid_weights: VectorGrid<f64>,
        material_weights: Vec<VectorGrid<f64>>,
    }

    fn two_layers(cells: [usize; 2]) -> Setup {
        let xform = Transform::unit();
        let heavy = LevelSet::from_fn(xform, cells, |p: DVec2| p.y - 4.3);
        let light = LevelSet::from_fn(xform, cells, |p: DVec2| 4.3 - p.y);
        let mut solid = LevelSet::from_fn(xform, cells, |_| 100.0);
        solid.set_inverted();
        let surfaces = vec![heavy, light];
        let solid_weights = compute_cut_cell_weights(&solid, false, 0.0);
        let mut material_weights: Vec<_> = surfaces
            .iter()
            .map(|s| compute_cut_cell_weights(s, false, 0.0))
            .collect();
        normalize_material_weights(&mut material_weights, &solid_weights, &surfaces).unwrap();
        Setup {
            surfaces,
            solid,
            solid_weights,
            material_weights,
        }
    }

    #[test]
    fn test_projection_removes_divergence() {
        let cells = [8, 10];
        let setup = two_layers(cells);
        let xform = Transform::unit();
        let solid_velocity = VectorGrid::staggered(xform, cells, 0.0);
        let velocities: Vec<VectorGrid<f64>> = (0..2)
            .map(|m| {
                let mut v = VectorGrid::staggered(xform, cells, 0.0);
                for axis in 0..2 {
                    let layout = v.grid(axis).clone();
                    v.grid_mut(axis).par_fill_with(|idx| {
                        let p = layout.sample_position(idx);
                        (p.x * 0.9 + m as f64).sin() * (p.y * 0.4).cos() + axis as f64 * 0.3
                    });
                }
                v
            })
            .collect();

        let densities = [1000.0, 1.0];
        let mut projection = MultiMaterialPressureProjection::new(
            &setup.surfaces,
            &velocities,
            &densities,
            &setup.solid,
            &solid_velocity,
        )
        .unwrap();
        let solver = PcgSolver::new(SolverConfig::new(1e-11, 1000));
        projection
            .project(&setup.material_weights, &setup.solid_weights, &solver)
            .unwrap();
        let mut out = velocities.clone();
        let valid = projection.apply_solution(&mut out, &setup.material_weights).unwrap();

        let div = multi_material_divergence(
            &out,
            &setup.material_weights,
            &setup.solid_weights,
            &solid_velocity,
        )
        .unwrap();
        for value in div.values() {
            assert!(value.abs() < 1e-6, "residual divergence {}", value);
        }
        assert_eq!(valid.len(), 2);
        assert_eq!(valid[0][([3, 2], 1)], MarkedCell::Finished);
        assert_eq!(valid[0][([3, 8], 1)], MarkedCell::Unvisited);
        assert_eq!(valid[1][([3, 8], 1)], MarkedCell::Finished);
    }

    #[test]
    fn test_still_layers_stay_still() {
        let cells = [6, 10];
        let setup = two_layers(cells);
        let zero = vec![VectorGrid::staggered(Transform::unit(), cells, 0.0); 2];
        let densities = [2.0, 1.0];
        let (surfaces, solid) = (&setup.surfaces, &setup.solid);
        let mut projection =
            MultiMaterialPressureProjection::new(surfaces, &zero, &densities, solid, &zero[0])
                .unwrap();
        let report = projection
            .project(&setup.material_weights, &setup.solid_weights, &PcgSolver::default())
            .unwrap();
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn test_rejects_bad_materials() {
        let setup = two_layers([4, 4]);
        let zero = vec![VectorGrid::staggered(Transform::unit(), [4, 4], 0.0); 2];
        let (surfaces, solid) = (&setup.surfaces, &setup.solid);
        assert!(matches!(
            MultiMaterialPressureProjection::new(surfaces, &zero, &[1.0, 0.0], solid, &zero[0]),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            MultiMaterialPressureProjection::new(surfaces, &zero[..1], &[1.0; 2], solid, &zero[0]),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}

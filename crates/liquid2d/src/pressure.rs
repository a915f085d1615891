//! Single-phase pressure projection.
//!
//! Free-surface boundaries use ghost-fluid weights (pressure is zero at the
//! interpolated interface); solid boundaries use cut-cell face fractions,
//! with the covered part of each face moving at the solid velocity.

use crate::error::{Error, Result};
use crate::grid::{cell_to_face, Grid, MarkedCell, SampleType, VectorGrid};
use crate::solver::{LinearSolver, SparseMatrixBuilder, SolveReport};
use crate::surface::LevelSet;

/// Default floor on the ghost-fluid weight when dividing by it.
pub const MIN_GHOST_WEIGHT: f64 = 0.01;

/// Net outflow of each cell through cut faces, with the closed part of a
/// face (and every domain-boundary face) moving at the solid velocity.
pub fn cut_cell_divergence(
    velocity: &VectorGrid<f64>,
    cut_weights: &VectorGrid<f64>,
    solid_velocity: &VectorGrid<f64>,
) -> Result<Grid<f64>> {
    velocity.check_layout(cut_weights, "divergence weights")?;
    velocity.check_layout(solid_velocity, "divergence solid velocity")?;
    let cells = velocity.cells();
    let mut divergence = Grid::new(velocity.transform(), cells, SampleType::Center, 0.0);
    divergence.par_fill_with(|cell| {
        let mut flux = 0.0;
        for axis in 0..2 {
            for side in 0..2 {
                let face = cell_to_face(cell, axis, side);
                let sign = if side == 1 { 1.0 } else { -1.0 };
                let w = if face[axis] == 0 || face[axis] >= cells[axis] {
                    0.0
                } else {
                    cut_weights[(face, axis)]
                };
                let through = w * velocity[(face, axis)] + (1.0 - w) * solid_velocity[(face, axis)];
                flux += sign * through;
            }
        }
        flux
    });
    Ok(divergence)
}

pub struct PressureProjection<'a> {
    surface: &'a LevelSet,
    solid_velocity: &'a VectorGrid<f64>,
    velocity: VectorGrid<f64>,
    min_ghost_weight: f64,
    cut_weights: Option<VectorGrid<f64>>,
    pressure: Grid<f64>,
    valid: VectorGrid<MarkedCell>,
}

impl<'a> PressureProjection<'a> {
    pub fn new(
        surface: &'a LevelSet,
        velocity: &VectorGrid<f64>,
        solid_surface: &LevelSet,
        solid_velocity: &'a VectorGrid<f64>,
        min_ghost_weight: f64,
    ) -> Result<Self> {
        surface.phi().check_layout(solid_surface.phi(), "pressure solid surface")?;
        velocity.check_layout(solid_velocity, "pressure solid velocity")?;
        if velocity.cells() != surface.phi().cells()
            || velocity.transform() != surface.transform()
        {
            return Err(Error::mismatch(
                "pressure velocity",
                (surface.phi().cells(), surface.transform()),
                (velocity.cells(), velocity.transform()),
            ));
        }
        Ok(Self {
            surface,
            solid_velocity,
            velocity: velocity.clone(),
            min_ghost_weight,
            cut_weights: None,
            pressure: surface.phi().like(0.0),
            valid: velocity.like(MarkedCell::Unvisited),
        })
    }

    pub fn pressure(&self) -> &Grid<f64> {
        &self.pressure
    }

    /// Assemble and solve for pressure in every liquid cell that touches an
    /// open face.
    pub fn project(
        &mut self,
        ghost_weights: &VectorGrid<f64>,
        cut_weights: &VectorGrid<f64>,
        solver: &dyn LinearSolver,
    ) -> Result<SolveReport> {
        self.velocity.check_layout(ghost_weights, "pressure ghost weights")?;
        self.velocity.check_layout(cut_weights, "pressure cut-cell weights")?;

        let cells = self.surface.phi().cells();
        let dx = self.surface.dx();

        // Number the unknowns.
        let mut index: Grid<Option<usize>> = self.pressure.like(None);
        let mut count = 0;
        for j in 0..cells[1] {
            for i in 0..cells[0] {
                if self.surface[[i, j]] >= 0.0 {
                    continue;
                }
                let open = (0..2).any(|axis| {
                    (0..2).any(|side| {
                        let face = cell_to_face([i, j], axis, side);
                        face[axis] > 0
                            && face[axis] < cells[axis]
                            && cut_weights[(face, axis)] > 0.0
                            && ghost_weights[(face, axis)] > 0.0
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
        let mut has_dirichlet = false;

        for j in 0..cells[1] {
            for i in 0..cells[0] {
                let Some(row) = index[[i, j]] else { continue };
                for axis in 0..2 {
                    for side in 0..2 {
                        let face = cell_to_face([i, j], axis, side);
                        let sign = if side == 1 { 1.0 } else { -1.0 };
                        let boundary = face[axis] == 0 || face[axis] >= cells[axis];
                        let w = if boundary { 0.0 } else { cut_weights[(face, axis)] };

                        rhs[row] -= sign
                            * dx
                            * (w * self.velocity[(face, axis)]
                                + (1.0 - w) * self.solid_velocity[(face, axis)]);

                        if w <= 0.0 {
                            continue;
                        }
                        let theta = ghost_weights[(face, axis)].max(self.min_ghost_weight);
                        let coeff = w / theta;
                        builder.add_to_element(row, row, coeff);

                        let mut neighbour = [i as isize, j as isize];
                        neighbour[axis] += if side == 1 { 1 } else { -1 };
                        let [ni, nj] = neighbour;
                        match index[[ni as usize, nj as usize]] {
                            Some(col) => builder.add_to_element(row, col, -coeff),
                            _ => has_dirichlet = true,
                        }
                    }
                }
            }
        }

        if !has_dirichlet && count > 0 {
            let mean = rhs.iter().sum::<f64>() / count as f64;
            rhs.iter_mut().for_each(|b| *b -= mean);
        }

        let matrix = builder.build();
        let mut solution = vec![0.0; count];
        let report = solver.solve(&matrix, &rhs, &mut solution)?;

        self.pressure.fill(0.0);
        for (value, slot) in self.pressure.values_mut().iter_mut().zip(index.values()) {
            if let Some(row) = slot {
                *value = solution[*row];
            }
        }
        self.cut_weights = Some(cut_weights.clone());
        Ok(report)
    }

    /// Write the pressure-corrected velocity into `velocity`. Corrected faces
    /// are remembered as valid; every other face keeps its value.
    pub fn apply_solution(
        &mut self,
        velocity: &mut VectorGrid<f64>,
        ghost_weights: &VectorGrid<f64>,
    ) -> Result<()> {
        self.velocity.check_layout(velocity, "pressure output velocity")?;
        self.velocity.check_layout(ghost_weights, "pressure ghost weights")?;
        let Some(cut_weights) = self.cut_weights.as_ref() else {
            *velocity = self.velocity.clone();
            self.valid.fill(MarkedCell::Unvisited);
            return Ok(());
        };

        let cells = self.velocity.cells();
        let dx = self.surface.dx();
        let min_ghost_weight = self.min_ghost_weight;
        let (surface, pressure) = (self.surface, &self.pressure);
        let mut corrected = self.velocity.clone();
        let mut valid = self.velocity.like(MarkedCell::Unvisited);

        for axis in 0..2 {
            let (ghost, cut) = (ghost_weights.grid(axis), cut_weights.grid(axis));
            let open = |face: [usize; 2]| {
                face[axis] > 0 && face[axis] < cells[axis] && cut[face] > 0.0 && ghost[face] > 0.0
            };
            corrected.grid_mut(axis).par_update(|face, value| {
                if !open(face) {
                    return;
                }
                let mut backward = face;
                backward[axis] -= 1;
                let p_backward = if surface[backward] < 0.0 { pressure[backward] } else { 0.0 };
                let p_forward = if surface[face] < 0.0 { pressure[face] } else { 0.0 };
                let theta = ghost[face].max(min_ghost_weight);
                *value -= (p_forward - p_backward) / (dx * theta);
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
        self.valid = valid;
        Ok(())
    }

    /// Copy the faces corrected by the last `apply_solution` into `valid`.
    pub fn apply_valid(&self, valid: &mut VectorGrid<MarkedCell>) -> Result<()> {
        self.valid.check_layout(valid, "pressure validity")?;
        *valid = self.valid.clone();
        Ok(())
    }
}

//! Fractional face and cell weights derived from level sets.
//!
//! Ghost-fluid weights place the free surface between two cell centres.
//! Cut-cell weights measure how much of a face lies inside a surface.
//! Supersampled areas estimate the covered fraction of a sample's control
//! volume and feed the viscosity solve.

use glam::DVec2;

use crate::error::{Error, Result};
use crate::grid::{face_to_cell, Grid, SampleType, VectorGrid};
use crate::surface::LevelSet;
use crate::transform::Transform;

/// Fraction of the segment between two samples lying inside (φ < 0).
#[inline]
pub fn length_fraction(phi0: f64, phi1: f64) -> f64 {
    match (phi0 < 0.0, phi1 < 0.0) {
        (true, true) => 1.0,
        (true, false) => phi0 / (phi0 - phi1),
        (false, true) => phi1 / (phi1 - phi0),
        (false, false) => 0.0,
    }
}

/// Liquid fraction between the two cell centres adjacent to each face.
/// Faces on the domain boundary get zero.
pub fn compute_ghost_fluid_weights(surface: &LevelSet) -> VectorGrid<f64> {
    let cells = surface.phi().cells();
    let mut weights = VectorGrid::staggered(surface.transform(), cells, 0.0);
    for axis in 0..2 {
        weights.grid_mut(axis).par_fill_with(|face| {
            if face[axis] == 0 || face[axis] >= cells[axis] {
                return 0.0;
            }
            let [bi, bj] = face_to_cell(face, axis, 0);
            let [fi, fj] = face_to_cell(face, axis, 1);
            length_fraction(
                surface[[bi as usize, bj as usize]],
                surface[[fi as usize, fj as usize]],
            )
        });
    }
    weights
}

/// Interface end points of a face: half a cell either side along the
/// transverse axis.
#[inline]
fn face_endpoints(transform: Transform, face: [usize; 2], axis: usize) -> (DVec2, DVec2) {
    let mut offset = DVec2::ZERO;
    offset[1 - axis] = 0.5;
    let index = DVec2::new(face[0] as f64, face[1] as f64) + SampleType::face(axis).offset();
    (
        transform.index_to_world(index - offset),
        transform.index_to_world(index + offset),
    )
}

/// Fraction of each face inside `surface`, or outside it with `invert`.
/// Non-zero weights below `min_weight` are raised to `min_weight`.
pub fn compute_cut_cell_weights(
    surface: &LevelSet,
    invert: bool,
    min_weight: f64,
) -> VectorGrid<f64> {
    let transform = surface.transform();
    let mut weights = VectorGrid::staggered(transform, surface.phi().cells(), 0.0);
    for axis in 0..2 {
        weights.grid_mut(axis).par_fill_with(|face| {
            let (p0, p1) = face_endpoints(transform, face, axis);
            let mut weight = length_fraction(surface.interp(p0), surface.interp(p1));
            if invert {
                weight = 1.0 - weight;
            }
            weight = weight.clamp(0.0, 1.0);
            if weight > 0.0 && weight < min_weight {
                weight = min_weight;
            }
            weight
        });
    }
    weights
}

/// Covered fraction of the unit control volume around one sample.
fn supersample(
    surface: &LevelSet,
    sample_type: SampleType,
    index: [usize; 2],
    samples: usize,
) -> f64 {
    let transform = surface.transform();
    let dx = transform.dx();
    let center = DVec2::new(index[0] as f64, index[1] as f64) + sample_type.offset();
    let phi = surface.interp(transform.index_to_world(center));
    if phi > 2.0 * dx {
        return 0.0;
    }
    if phi < -2.0 * dx {
        return 1.0;
    }

    let step = 1.0 / samples as f64;
    let mut inside = 0usize;
    for ky in 0..samples {
        for kx in 0..samples {
            let offset = DVec2::new(
                -0.5 + (kx as f64 + 0.5) * step,
                -0.5 + (ky as f64 + 0.5) * step,
            );
            if surface.interp(transform.index_to_world(center + offset)) <= 0.0 {
                inside += 1;
            }
        }
    }
    inside as f64 / (samples * samples) as f64
}

/// Supersampled coverage for every sample of a `sample_type` grid.
pub fn compute_supersampled_areas(
    surface: &LevelSet,
    sample_type: SampleType,
    samples: usize,
) -> Grid<f64> {
    let samples = samples.max(1);
    let mut areas = Grid::new(surface.transform(), surface.phi().cells(), sample_type, 0.0);
    areas.par_fill_with(|index| supersample(surface, sample_type, index, samples));
    areas
}

/// Supersampled coverage for both staggered face grids.
pub fn compute_supersampled_face_areas(surface: &LevelSet, samples: usize) -> VectorGrid<f64> {
    let samples = samples.max(1);
    let mut areas = VectorGrid::staggered(surface.transform(), surface.phi().cells(), 0.0);
    for axis in 0..2 {
        areas
            .grid_mut(axis)
            .par_fill_with(|index| supersample(surface, SampleType::face(axis), index, samples));
    }
    areas
}

/// Rescale per-material face weights so materials and solid partition
/// every face.
///
/// The open fraction of a face is `1 - solid`. Material weights are scaled
/// to sum to it. A face that is open but carries no material weight has a
/// material boundary lying exactly on it; the lowest-index material whose
/// `surfaces` entry touches the face takes the whole open fraction. If
/// fewer than two materials touch it the face cannot be resolved.
pub fn normalize_material_weights(
    material_weights: &mut [VectorGrid<f64>],
    solid_weights: &VectorGrid<f64>,
    surfaces: &[LevelSet],
) -> Result<()> {
    if material_weights.len() != surfaces.len() {
        return Err(Error::mismatch(
            "material weights vs surfaces",
            material_weights.len(),
            surfaces.len(),
        ));
    }
    for (weights, surface) in material_weights.iter().zip(surfaces) {
        weights.check_layout(solid_weights, "material weights")?;
        if surface.transform() != solid_weights.transform()
            || surface.phi().cells() != solid_weights.cells()
        {
            return Err(Error::mismatch(
                "material surface",
                (solid_weights.cells(), solid_weights.transform()),
                (surface.phi().cells(), surface.transform()),
            ));
        }
    }

    for axis in 0..2 {
        let solid = solid_weights.grid(axis);
        let transform = solid.transform();
        let grids: Vec<&Grid<f64>> = material_weights.iter().map(|w| w.grid(axis)).collect();
        let mut resolved: Grid<std::result::Result<Vec<f64>, usize>> =
            solid.like(Ok(Vec::new()));
        resolved.par_fill_with(|face| {
            resolve_face(face, axis, transform, solid[face], &grids, surfaces)
        });

        for (flat, outcome) in resolved.values().iter().enumerate() {
            match outcome {
                Ok(values) => {
                    for (weights, &value) in material_weights.iter_mut().zip(values) {
                        weights.grid_mut(axis).values_mut()[flat] = value;
                    }
                }
                Err(candidates) => {
                    return Err(Error::DegenerateWeight {
                        axis,
                        face: resolved.coords(flat),
                        candidates: *candidates,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Normalized material weights for one face, or the number of materials
/// aligned with it when a degenerate face cannot be resolved.
fn resolve_face(
    face: [usize; 2],
    axis: usize,
    transform: Transform,
    solid: f64,
    weights: &[&Grid<f64>],
    surfaces: &[LevelSet],
) -> std::result::Result<Vec<f64>, usize> {
    let open = (1.0 - solid).max(0.0);
    if open <= 0.0 {
        return Ok(vec![0.0; weights.len()]);
    }

    let total: f64 = weights.iter().map(|w| w[face]).sum();
    if total > 0.0 {
        let scale = open / total;
        return Ok(weights.iter().map(|w| w[face] * scale).collect());
    }

    let (p0, p1) = face_endpoints(transform, face, axis);
    let aligned: Vec<usize> = surfaces
        .iter()
        .enumerate()
        .filter(|(_, s)| length_fraction(s.interp(p0), s.interp(p1)) == 0.0)
        .map(|(m, _)| m)
        .collect();
    if aligned.len() < 2 {
        return Err(aligned.len());
    }
    log::trace!(
        "face {:?} axis {} lies on a material boundary, assigned to material {}",
        face,
        axis,
        aligned[0]
    );
    let mut values = vec![0.0; weights.len()];
    values[aligned[0]] = open;
    Ok(values)
}

//! Sampled fields on a uniform 2D grid.
//!
//! Every field is a flat row-major array tagged with where its samples live
//! relative to the cells of the simulation grid:
//! - `Center`: one sample per cell, at (i+½, j+½)
//! - `Node`: cell corners, at (i, j)
//! - `XFace`: left edges, at (i, j+½), where horizontal velocity lives
//! - `YFace`: bottom edges, at (i+½, j), where vertical velocity lives
//!
//! The logical size follows from the cell count and the tag, so a staggered
//! component grid is one sample longer in its normal direction.

mod interp;
mod vector;

pub use interp::InterpolationOrder;
pub use vector::{VectorGrid, VectorSampleType};

use std::ops::{Index, IndexMut};

use glam::DVec2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transform::Transform;

/// Where a grid's samples sit inside a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    Center,
    Node,
    XFace,
    YFace,
}

impl SampleType {
    /// Staggered face layout for a velocity component.
    #[inline]
    pub fn face(axis: usize) -> Self {
        if axis == 0 {
            SampleType::XFace
        } else {
            SampleType::YFace
        }
    }

    /// Index-space offset of sample (0, 0) from the grid origin.
    #[inline]
    pub fn offset(self) -> DVec2 {
        match self {
            SampleType::Center => DVec2::new(0.5, 0.5),
            SampleType::Node => DVec2::ZERO,
            SampleType::XFace => DVec2::new(0.0, 0.5),
            SampleType::YFace => DVec2::new(0.5, 0.0),
        }
    }

    /// Sample counts per axis for a grid of `cells`.
    #[inline]
    pub fn size(self, cells: [usize; 2]) -> [usize; 2] {
        match self {
            SampleType::Center => cells,
            SampleType::Node => [cells[0] + 1, cells[1] + 1],
            SampleType::XFace => [cells[0] + 1, cells[1]],
            SampleType::YFace => [cells[0], cells[1] + 1],
        }
    }
}

/// Per-sample solve state used to drive extrapolation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarkedCell {
    #[default]
    Unvisited,
    Visited,
    Finished,
}

/// Typed array of samples with its own transform and sample layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    values: Vec<T>,
    cells: [usize; 2],
    size: [usize; 2],
    sample_type: SampleType,
    transform: Transform,
}

impl<T: Clone> Grid<T> {
    pub fn new(transform: Transform, cells: [usize; 2], sample_type: SampleType, fill: T) -> Self {
        let size = sample_type.size(cells);
        Self {
            values: vec![fill; size[0] * size[1]],
            cells,
            size,
            sample_type,
            transform,
        }
    }

    pub fn fill(&mut self, value: T) {
        self.values.fill(value);
    }

    /// Same layout, every sample set to `fill`.
    pub fn like<U: Clone>(&self, fill: U) -> Grid<U> {
        Grid::new(self.transform, self.cells, self.sample_type, fill)
    }
}

impl<T> Grid<T> {
    pub fn from_fn(
        transform: Transform,
        cells: [usize; 2],
        sample_type: SampleType,
        f: impl Fn([usize; 2]) -> T,
    ) -> Self {
        let size = sample_type.size(cells);
        let mut values = Vec::with_capacity(size[0] * size[1]);
        for j in 0..size[1] {
            for i in 0..size[0] {
                values.push(f([i, j]));
            }
        }
        Self {
            values,
            cells,
            size,
            sample_type,
            transform,
        }
    }

    #[inline]
    pub fn size(&self) -> [usize; 2] {
        self.size
    }

    /// Cell counts of the simulation grid this field belongs to.
    #[inline]
    pub fn cells(&self) -> [usize; 2] {
        self.cells
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    #[inline]
    pub fn transform(&self) -> Transform {
        self.transform
    }

    #[inline]
    pub fn dx(&self) -> f64 {
        self.transform.dx()
    }

    #[inline]
    pub fn flat_index(&self, index: [usize; 2]) -> usize {
        debug_assert!(index[0] < self.size[0] && index[1] < self.size[1]);
        index[1] * self.size[0] + index[0]
    }

    #[inline]
    pub fn coords(&self, flat: usize) -> [usize; 2] {
        [flat % self.size[0], flat / self.size[0]]
    }

    #[inline]
    pub fn in_bounds(&self, i: isize, j: isize) -> bool {
        i >= 0 && j >= 0 && (i as usize) < self.size[0] && (j as usize) < self.size[1]
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// World position of a (possibly fractional) sample index.
    #[inline]
    pub fn index_to_world(&self, index: DVec2) -> DVec2 {
        self.transform.index_to_world(index + self.sample_type.offset())
    }

    /// Fractional sample index of a world position.
    #[inline]
    pub fn world_to_index(&self, world: DVec2) -> DVec2 {
        self.transform.world_to_index(world) - self.sample_type.offset()
    }

    /// World position of an integer sample.
    #[inline]
    pub fn sample_position(&self, index: [usize; 2]) -> DVec2 {
        self.index_to_world(DVec2::new(index[0] as f64, index[1] as f64))
    }

    /// True when both grids cover the same cells with the same transform.
    pub fn same_domain<U>(&self, other: &Grid<U>) -> bool {
        self.cells == other.cells && self.transform == other.transform
    }

    /// True when both grids also sample the same locations.
    pub fn same_layout<U>(&self, other: &Grid<U>) -> bool {
        self.same_domain(other) && self.sample_type == other.sample_type
    }

    pub fn check_layout<U>(&self, other: &Grid<U>, context: &'static str) -> Result<()> {
        if self.same_layout(other) {
            Ok(())
        } else {
            Err(Error::mismatch(
                context,
                (self.cells, self.sample_type, self.transform),
                (other.cells, other.sample_type, other.transform),
            ))
        }
    }

    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Grid<U> {
        Grid {
            values: self.values.iter().map(f).collect(),
            cells: self.cells,
            size: self.size,
            sample_type: self.sample_type,
            transform: self.transform,
        }
    }
}

impl<T: Send> Grid<T> {
    /// Overwrite every sample from its index, in parallel.
    pub fn par_fill_with(&mut self, f: impl Fn([usize; 2]) -> T + Sync) {
        let nx = self.size[0];
        self.values
            .par_iter_mut()
            .enumerate()
            .for_each(|(flat, value)| *value = f([flat % nx, flat / nx]));
    }

    /// Update every sample in place from its index and current value, in parallel.
    pub fn par_update(&mut self, f: impl Fn([usize; 2], &mut T) + Sync) {
        let nx = self.size[0];
        self.values
            .par_iter_mut()
            .enumerate()
            .for_each(|(flat, value)| f([flat % nx, flat / nx], value));
    }
}

impl<T> Index<[usize; 2]> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: [usize; 2]) -> &T {
        &self.values[self.flat_index(index)]
    }
}

impl<T> IndexMut<[usize; 2]> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, index: [usize; 2]) -> &mut T {
        let flat = self.flat_index(index);
        &mut self.values[flat]
    }
}

/// Cell on the backward (`side == 0`) or forward side of a staggered face.
/// May fall outside the cell grid at the domain boundary.
#[inline]
pub fn face_to_cell(face: [usize; 2], axis: usize, side: usize) -> [isize; 2] {
    let mut cell = [face[0] as isize, face[1] as isize];
    if side == 0 {
        cell[axis] -= 1;
    }
    cell
}

/// Face on the backward (`side == 0`) or forward side of a cell along `axis`.
#[inline]
pub fn cell_to_face(cell: [usize; 2], axis: usize, side: usize) -> [usize; 2] {
    let mut face = cell;
    face[axis] += side;
    face
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staggered_sizes() {
        let cells = [4, 3];
        assert_eq!(SampleType::Center.size(cells), [4, 3]);
        assert_eq!(SampleType::Node.size(cells), [5, 4]);
        assert_eq!(SampleType::XFace.size(cells), [5, 3]);
        assert_eq!(SampleType::YFace.size(cells), [4, 4]);
    }

    #[test]
    fn test_sample_positions() {
        let xform = Transform::new(0.5, DVec2::new(1.0, 1.0)).unwrap();
        let center = Grid::new(xform, [2, 2], SampleType::Center, 0.0);
        let xface = Grid::new(xform, [2, 2], SampleType::XFace, 0.0);
        assert_eq!(center.sample_position([0, 0]), DVec2::new(1.25, 1.25));
        assert_eq!(xface.sample_position([2, 1]), DVec2::new(2.0, 1.75));
        let idx = xface.world_to_index(DVec2::new(2.0, 1.75));
        assert!((idx - DVec2::new(2.0, 1.0)).length() < 1e-12);
    }

    #[test]
    fn test_face_cell_adjacency() {
        assert_eq!(face_to_cell([0, 3], 0, 0), [-1, 3]);
        assert_eq!(face_to_cell([0, 3], 0, 1), [0, 3]);
        assert_eq!(face_to_cell([2, 5], 1, 0), [2, 4]);
        assert_eq!(cell_to_face([2, 5], 1, 1), [2, 6]);
    }

    #[test]
    fn test_layout_check() {
        let a = Grid::new(Transform::unit(), [3, 3], SampleType::Center, 0.0);
        let b = Grid::new(Transform::unit(), [3, 4], SampleType::Center, 0.0);
        let c = Grid::new(Transform::unit(), [3, 3], SampleType::Node, 0.0);
        assert!(a.check_layout(&a.like(0u8), "test").is_ok());
        assert!(matches!(a.check_layout(&b, "test"), Err(Error::DimensionMismatch { .. })));
        assert!(a.same_domain(&c) && !a.same_layout(&c));
    }

    #[test]
    fn test_par_fill_matches_from_fn() {
        let f = |[i, j]: [usize; 2]| (i * 10 + j) as f64;
        let serial = Grid::from_fn(Transform::unit(), [5, 4], SampleType::YFace, f);
        let mut parallel = serial.like(0.0);
        parallel.par_fill_with(f);
        assert_eq!(serial, parallel);
    }
}

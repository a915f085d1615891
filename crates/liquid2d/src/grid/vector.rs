//! Two-component fields. The staggered (MAC) layout stores the x component
//! on `XFace` samples and the y component on `YFace` samples.

use std::ops::{Index, IndexMut};

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::{Grid, InterpolationOrder, SampleType};
use crate::error::{Error, Result};
use crate::transform::Transform;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorSampleType {
    #[default]
    Staggered,
    Center,
    Node,
}

impl VectorSampleType {
    #[inline]
    pub fn component(self, axis: usize) -> SampleType {
        match self {
            VectorSampleType::Staggered => SampleType::face(axis),
            VectorSampleType::Center => SampleType::Center,
            VectorSampleType::Node => SampleType::Node,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VectorGrid<T> {
    grids: [Grid<T>; 2],
    sample_type: VectorSampleType,
}

impl<T: Clone> VectorGrid<T> {
    pub fn new(
        transform: Transform,
        cells: [usize; 2],
        sample_type: VectorSampleType,
        fill: T,
    ) -> Self {
        Self {
            grids: [
                Grid::new(transform, cells, sample_type.component(0), fill.clone()),
                Grid::new(transform, cells, sample_type.component(1), fill),
            ],
            sample_type,
        }
    }

    /// Staggered grid filled with `fill`.
    pub fn staggered(transform: Transform, cells: [usize; 2], fill: T) -> Self {
        Self::new(transform, cells, VectorSampleType::Staggered, fill)
    }

    pub fn like<U: Clone>(&self, fill: U) -> VectorGrid<U> {
        VectorGrid::new(self.transform(), self.cells(), self.sample_type, fill)
    }

    pub fn fill(&mut self, value: T) {
        self.grids[0].fill(value.clone());
        self.grids[1].fill(value);
    }
}

impl<T> VectorGrid<T> {
    /// Builds from two component grids, which must share a domain and match `sample_type`.
    pub fn from_components(x: Grid<T>, y: Grid<T>, sample_type: VectorSampleType) -> Result<Self> {
        if !x.same_domain(&y)
            || x.sample_type() != sample_type.component(0)
            || y.sample_type() != sample_type.component(1)
        {
            return Err(Error::mismatch(
                "vector grid components",
                (sample_type.component(0), sample_type.component(1)),
                (x.sample_type(), y.sample_type()),
            ));
        }
        Ok(Self {
            grids: [x, y],
            sample_type,
        })
    }

    #[inline]
    pub fn grid(&self, axis: usize) -> &Grid<T> {
        &self.grids[axis]
    }

    #[inline]
    pub fn grid_mut(&mut self, axis: usize) -> &mut Grid<T> {
        &mut self.grids[axis]
    }

    pub fn into_components(self) -> [Grid<T>; 2] {
        self.grids
    }

    #[inline]
    pub fn size(&self, axis: usize) -> [usize; 2] {
        self.grids[axis].size()
    }

    #[inline]
    pub fn cells(&self) -> [usize; 2] {
        self.grids[0].cells()
    }

    #[inline]
    pub fn transform(&self) -> Transform {
        self.grids[0].transform()
    }

    #[inline]
    pub fn dx(&self) -> f64 {
        self.grids[0].dx()
    }

    #[inline]
    pub fn sample_type(&self) -> VectorSampleType {
        self.sample_type
    }

    #[inline]
    pub fn index_to_world(&self, index: DVec2, axis: usize) -> DVec2 {
        self.grids[axis].index_to_world(index)
    }

    #[inline]
    pub fn sample_position(&self, index: [usize; 2], axis: usize) -> DVec2 {
        self.grids[axis].sample_position(index)
    }

    pub fn same_layout<U>(&self, other: &VectorGrid<U>) -> bool {
        self.sample_type == other.sample_type && self.grids[0].same_layout(&other.grids[0])
    }

    pub fn check_layout<U>(&self, other: &VectorGrid<U>, context: &'static str) -> Result<()> {
        if self.same_layout(other) {
            Ok(())
        } else {
            Err(Error::mismatch(
                context,
                (self.cells(), self.sample_type, self.transform()),
                (other.cells(), other.sample_type, other.transform()),
            ))
        }
    }
}

impl VectorGrid<f64> {
    /// Linearly interpolated vector at a world position.
    pub fn interp(&self, world: DVec2) -> DVec2 {
        DVec2::new(self.grids[0].interp_linear(world), self.grids[1].interp_linear(world))
    }

    pub fn interp_with(&self, world: DVec2, order: InterpolationOrder) -> DVec2 {
        DVec2::new(self.grids[0].interp(world, order), self.grids[1].interp(world, order))
    }

    pub fn interp_axis(&self, world: DVec2, axis: usize, order: InterpolationOrder) -> f64 {
        self.grids[axis].interp(world, order)
    }

    /// Largest absolute component value.
    pub fn max_magnitude(&self) -> f64 {
        self.grids
            .iter()
            .flat_map(|g| g.values().iter())
            .fold(0.0f64, |acc, v| acc.max(v.abs()))
    }
}

impl<T> Index<([usize; 2], usize)> for VectorGrid<T> {
    type Output = T;

    #[inline]
    fn index(&self, (index, axis): ([usize; 2], usize)) -> &T {
        &self.grids[axis][index]
    }
}

impl<T> IndexMut<([usize; 2], usize)> for VectorGrid<T> {
    #[inline]
    fn index_mut(&mut self, (index, axis): ([usize; 2], usize)) -> &mut T {
        &mut self.grids[axis][index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staggered_components() {
        let v = VectorGrid::staggered(Transform::unit(), [4, 3], 0.0);
        assert_eq!(v.size(0), [5, 3]);
        assert_eq!(v.size(1), [4, 4]);
        assert_eq!(v.sample_position([0, 0], 0), DVec2::new(0.0, 0.5));
        assert_eq!(v.sample_position([0, 0], 1), DVec2::new(0.5, 0.0));
    }

    #[test]
    fn test_uniform_field_interp() {
        let mut v = VectorGrid::staggered(Transform::unit(), [4, 4], 0.0);
        v.grid_mut(0).fill(1.5);
        v.grid_mut(1).fill(-2.0);
        let s = v.interp(DVec2::new(1.3, 2.7));
        assert_eq!(s, DVec2::new(1.5, -2.0));
        assert_eq!(v.max_magnitude(), 2.0);
    }

    #[test]
    fn test_from_components_rejects_wrong_layout() {
        let x = Grid::new(Transform::unit(), [3, 3], SampleType::XFace, 0.0);
        let y = Grid::new(Transform::unit(), [3, 3], SampleType::XFace, 0.0);
        assert!(VectorGrid::from_components(x, y, VectorSampleType::Staggered).is_err());
    }
}

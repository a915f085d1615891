//! Interpolation of scalar grids at arbitrary world positions.
//!
//! Sample indices are clamped to the grid, so positions outside the domain
//! read the nearest boundary samples.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::Grid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpolationOrder {
    #[default]
    Linear,
    /// Catmull-Rom, clamped to the two bracketing samples.
    Cubic,
}

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[inline]
fn cubic(p: [f64; 4], t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    let value = 0.5
        * (2.0 * p[1]
            + (p[2] - p[0]) * t
            + (2.0 * p[0] - 5.0 * p[1] + 4.0 * p[2] - p[3]) * t2
            + (3.0 * p[1] - p[0] - 3.0 * p[2] + p[3]) * t3);
    value.clamp(p[1].min(p[2]), p[1].max(p[2]))
}

/// Lower bracketing index and fraction along one axis.
#[inline]
fn bracket(x: f64, n: usize) -> (usize, f64) {
    if n < 2 {
        return (0, 0.0);
    }
    let x = x.clamp(0.0, (n - 1) as f64);
    let i = (x.floor() as usize).min(n - 2);
    (i, x - i as f64)
}

impl Grid<f64> {
    pub fn interp(&self, world: DVec2, order: InterpolationOrder) -> f64 {
        match order {
            InterpolationOrder::Linear => self.interp_linear(world),
            InterpolationOrder::Cubic => self.interp_cubic(world),
        }
    }

    /// Bilinear interpolation.
    pub fn interp_linear(&self, world: DVec2) -> f64 {
        let index = self.world_to_index(world);
        let [nx, ny] = self.size();
        let (i, tx) = bracket(index.x, nx);
        let (j, ty) = bracket(index.y, ny);
        let i1 = (i + 1).min(nx - 1);
        let j1 = (j + 1).min(ny - 1);

        let v0 = lerp(self[[i, j]], self[[i1, j]], tx);
        let v1 = lerp(self[[i, j1]], self[[i1, j1]], tx);
        lerp(v0, v1, ty)
    }

    fn interp_cubic(&self, world: DVec2) -> f64 {
        let index = self.world_to_index(world);
        let [nx, ny] = self.size();
        let (i, tx) = bracket(index.x, nx);
        let (j, ty) = bracket(index.y, ny);

        let clamp_x = |d: isize| (i as isize + d).clamp(0, nx as isize - 1) as usize;
        let clamp_y = |d: isize| (j as isize + d).clamp(0, ny as isize - 1) as usize;

        let mut rows = [0.0; 4];
        for (r, dj) in (-1..=2).enumerate() {
            let jj = clamp_y(dj);
            let samples = [
                self[[clamp_x(-1), jj]],
                self[[clamp_x(0), jj]],
                self[[clamp_x(1), jj]],
                self[[clamp_x(2), jj]],
            ];
            rows[r] = cubic(samples, tx);
        }
        cubic(rows, ty)
    }
}

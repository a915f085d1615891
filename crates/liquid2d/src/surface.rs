//! Signed distance level sets sampled at cell centres.
//!
//! Negative inside, positive outside. An inverted surface has a negative
//! background, which is how solids are described: the solid occupies
//! everything outside the explicit boundary mesh.

use std::ops::{Index, IndexMut};

use glam::DVec2;

use crate::advection::{advect_field, VelocitySampler};
use crate::error::{Error, Result};
use crate::grid::{Grid, InterpolationOrder, SampleType};
use crate::integrator::IntegrationOrder;
use crate::mesh::{point_segment_distance, Mesh2};
use crate::transform::Transform;

/// Cells around the mesh that get exact segment distances.
pub const MESH_BAND: f64 = 3.0;

#[derive(Clone, Debug, PartialEq)]
pub struct LevelSet {
    phi: Grid<f64>,
    inverted: bool,
}

impl LevelSet {
    /// Empty surface: every cell far outside.
    pub fn new(transform: Transform, cells: [usize; 2]) -> Self {
        let far = far_distance(cells, transform.dx());
        Self {
            phi: Grid::new(transform, cells, SampleType::Center, far),
            inverted: false,
        }
    }

    /// Sample `f` at every cell centre.
    pub fn from_fn(
        transform: Transform,
        cells: [usize; 2],
        f: impl Fn(DVec2) -> f64 + Sync,
    ) -> Self {
        let mut phi = Grid::new(transform, cells, SampleType::Center, 0.0);
        let offset = SampleType::Center.offset();
        phi.par_fill_with(|[i, j]| {
            f(transform.index_to_world(DVec2::new(i as f64, j as f64) + offset))
        });
        Self { phi, inverted: false }
    }

    /// Wrap an existing cell-centred grid.
    pub fn from_grid(phi: Grid<f64>) -> Result<Self> {
        if phi.sample_type() != SampleType::Center {
            return Err(Error::mismatch("level set samples", SampleType::Center, phi.sample_type()));
        }
        Ok(Self { phi, inverted: false })
    }

    pub fn set_inverted(&mut self) {
        self.inverted = true;
    }

    #[inline]
    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Sign of the region outside every contour.
    #[inline]
    pub fn background_sign(&self) -> f64 {
        if self.inverted {
            -1.0
        } else {
            1.0
        }
    }

    #[inline]
    pub fn phi(&self) -> &Grid<f64> {
        &self.phi
    }

    #[inline]
    pub fn phi_mut(&mut self) -> &mut Grid<f64> {
        &mut self.phi
    }

    #[inline]
    pub fn size(&self) -> [usize; 2] {
        self.phi.size()
    }

    #[inline]
    pub fn transform(&self) -> Transform {
        self.phi.transform()
    }

    #[inline]
    pub fn dx(&self) -> f64 {
        self.phi.dx()
    }

    #[inline]
    pub fn get(&self, cell: [usize; 2]) -> f64 {
        self.phi[cell]
    }

    #[inline]
    pub fn set(&mut self, cell: [usize; 2], value: f64) {
        self.phi[cell] = value;
    }

    #[inline]
    pub fn interp(&self, world: DVec2) -> f64 {
        self.phi.interp_linear(world)
    }

    #[inline]
    pub fn interp_with(&self, world: DVec2, order: InterpolationOrder) -> f64 {
        self.phi.interp(world, order)
    }

    /// Pointwise minimum with another surface on the same grid.
    /// The result is no longer a distance field until `reinit`.
    pub fn union_surface(&mut self, other: &LevelSet) -> Result<()> {
        self.phi.check_layout(&other.phi, "surface union")?;
        for (a, b) in self.phi.values_mut().iter_mut().zip(other.phi.values()) {
            *a = a.min(*b);
        }
        Ok(())
    }

    /// Restore the signed distance property from the current zero set.
    pub fn reinit(&mut self) {
        let mesh = self.build_mesh();
        self.init_from_mesh(&mesh);
    }

    /// Rebuild the field from a closed mesh: exact distances near the mesh,
    /// fast sweeping elsewhere, sign by crossing parity along each row.
    pub fn init_from_mesh(&mut self, mesh: &Mesh2) {
        let background = self.background_sign();
        let [nx, _] = self.size();
        if mesh.is_empty() {
            let far = background * far_distance(self.phi.cells(), self.dx());
            self.phi.fill(far);
            return;
        }

        let distance = self.unsigned_distance(mesh);
        let odd = self.crossing_parity(mesh);
        self.phi.par_update(|[i, j], value| {
            let flat = j * nx + i;
            let sign = if odd[flat] { -background } else { background };
            *value = sign * distance[flat];
        });
    }

    /// Semi-Lagrangian transport of the samples. Call `reinit` afterwards.
    pub fn advect(&mut self, dt: f64, velocity: &impl VelocitySampler, order: IntegrationOrder) {
        self.phi = advect_field(dt, &self.phi, velocity, order, InterpolationOrder::Linear);
    }

    /// Transport through the explicit boundary: contour, move the vertices,
    /// then re-sign from the moved mesh.
    pub fn advect_boundary(
        &mut self,
        dt: f64,
        velocity: &impl VelocitySampler,
        order: IntegrationOrder,
    ) {
        let mut mesh = self.build_mesh();
        mesh.advect(dt, velocity, order);
        self.init_from_mesh(&mesh);
    }

    fn unsigned_distance(&self, mesh: &Mesh2) -> Vec<f64> {
        let [nx, ny] = self.size();
        let dx = self.dx();
        let band = MESH_BAND * dx;
        let mut distance = vec![f64::INFINITY; nx * ny];
        let last = DVec2::new((nx - 1) as f64, (ny - 1) as f64);

        for (a, b) in mesh.segments() {
            let ia = self.phi.world_to_index(a);
            let ib = self.phi.world_to_index(b);
            // Segments closing a contour around the outermost samples are not
            // part of the interface.
            if beyond_samples(ia, ib, last) {
                continue;
            }
            let lo = ia.min(ib) - DVec2::splat(MESH_BAND);
            let hi = ia.max(ib) + DVec2::splat(MESH_BAND);
            if hi.x < 0.0 || hi.y < 0.0 || lo.x > (nx - 1) as f64 || lo.y > (ny - 1) as f64 {
                continue;
            }
            let i0 = lo.x.ceil().max(0.0) as usize;
            let j0 = lo.y.ceil().max(0.0) as usize;
            let i1 = (hi.x.floor() as usize).min(nx - 1);
            let j1 = (hi.y.floor() as usize).min(ny - 1);
            for j in j0..=j1 {
                for i in i0..=i1 {
                    let d = point_segment_distance(self.phi.sample_position([i, j]), a, b);
                    let slot = &mut distance[j * nx + i];
                    if d < *slot {
                        *slot = d;
                    }
                }
            }
        }

        // Only samples inside the band are exact; the rest are swept.
        let fixed: Vec<bool> = distance.iter().map(|&d| d <= band).collect();
        for (d, &keep) in distance.iter_mut().zip(&fixed) {
            if !keep {
                *d = f64::INFINITY;
            }
        }
        fast_sweep(&mut distance, &fixed, [nx, ny], dx);

        let far = far_distance(self.phi.cells(), dx);
        for d in distance.iter_mut() {
            if !d.is_finite() {
                *d = far;
            }
        }
        distance
    }

    /// Odd number of mesh crossings to the left of each cell centre.
    fn crossing_parity(&self, mesh: &Mesh2) -> Vec<bool> {
        let [nx, ny] = self.size();
        let mut rows: Vec<Vec<f64>> = vec![Vec::new(); ny];

        for (a, b) in mesh.segments() {
            let ia = self.phi.world_to_index(a);
            let ib = self.phi.world_to_index(b);
            if ia.y == ib.y {
                continue;
            }
            let j0 = ia.y.min(ib.y).ceil().max(0.0) as usize;
            let j1 = ia.y.max(ib.y).floor().min((ny - 1) as f64);
            if j1 < 0.0 {
                continue;
            }
            for j in j0..=(j1 as usize) {
                let y = j as f64;
                if (ia.y > y) != (ib.y > y) {
                    rows[j].push(ia.x + (y - ia.y) * (ib.x - ia.x) / (ib.y - ia.y));
                }
            }
        }

        let mut odd = vec![false; nx * ny];
        for (j, row) in rows.iter_mut().enumerate() {
            row.sort_by(f64::total_cmp);
            let mut crossed = 0;
            for i in 0..nx {
                while crossed < row.len() && row[crossed] < i as f64 {
                    crossed += 1;
                }
                odd[j * nx + i] = crossed % 2 == 1;
            }
        }
        odd
    }
}

impl Index<[usize; 2]> for LevelSet {
    type Output = f64;

    #[inline]
    fn index(&self, cell: [usize; 2]) -> &f64 {
        &self.phi[cell]
    }
}

impl IndexMut<[usize; 2]> for LevelSet {
    #[inline]
    fn index_mut(&mut self, cell: [usize; 2]) -> &mut f64 {
        &mut self.phi[cell]
    }
}

/// Both endpoints on or past the same side of the sample hull (index space).
#[inline]
fn beyond_samples(a: DVec2, b: DVec2, last: DVec2) -> bool {
    const EPS: f64 = 1e-6;
    let lo = DVec2::splat(EPS);
    let hi = last - lo;
    (a.x <= lo.x && b.x <= lo.x)
        || (a.y <= lo.y && b.y <= lo.y)
        || (a.x >= hi.x && b.x >= hi.x)
        || (a.y >= hi.y && b.y >= hi.y)
}

fn far_distance(cells: [usize; 2], dx: f64) -> f64 {
    (cells[0] + cells[1] + 2) as f64 * dx
}

/// First-order Eikonal update from the smaller neighbour along each axis.
#[inline]
fn eikonal(a: f64, b: f64, dx: f64) -> f64 {
    let (a, b) = if a <= b { (a, b) } else { (b, a) };
    if !a.is_finite() {
        return f64::INFINITY;
    }
    if !b.is_finite() || b - a >= dx {
        return a + dx;
    }
    0.5 * (a + b + (2.0 * dx * dx - (a - b) * (a - b)).sqrt())
}

/// Gauss-Seidel sweeps in the four diagonal orderings, twice.
fn fast_sweep(distance: &mut [f64], fixed: &[bool], [nx, ny]: [usize; 2], dx: f64) {
    let at = |d: &[f64], i: isize, j: isize| -> f64 {
        if i < 0 || j < 0 || i >= nx as isize || j >= ny as isize {
            f64::INFINITY
        } else {
            d[j as usize * nx + i as usize]
        }
    };

    for _ in 0..2 {
        for (reverse_i, reverse_j) in [(false, false), (true, false), (false, true), (true, true)] {
            for jj in 0..ny {
                let j = if reverse_j { ny - 1 - jj } else { jj };
                for ii in 0..nx {
                    let i = if reverse_i { nx - 1 - ii } else { ii };
                    let flat = j * nx + i;
                    if fixed[flat] {
                        continue;
                    }
                    let (si, sj) = (i as isize, j as isize);
                    let a = at(distance, si - 1, sj).min(at(distance, si + 1, sj));
                    let b = at(distance, si, sj - 1).min(at(distance, si, sj + 1));
                    let candidate = eikonal(a, b, dx);
                    if candidate < distance[flat] {
                        distance[flat] = candidate;
                    }
                }
            }
        }
    }
}

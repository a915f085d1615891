//! Explicit boundary polylines paired with a level set.
//!
//! `LevelSet::build_mesh` contours the zero set with marching squares over
//! the cell-centre lattice. The lattice is padded with one ring of samples
//! carrying the background sign, so every contour closes even where the
//! interface leaves the grid.

use glam::DVec2;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::advection::VelocitySampler;
use crate::integrator::{integrate, IntegrationOrder};
use crate::surface::LevelSet;

/// Closed polyline mesh: vertices plus undirected edges.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh2 {
    vertices: Vec<DVec2>,
    edges: Vec<[usize; 2]>,
}

impl Mesh2 {
    pub fn new(vertices: Vec<DVec2>, edges: Vec<[usize; 2]>) -> Self {
        Self { vertices, edges }
    }

    /// Regular polygon approximating a circle.
    pub fn circle(center: DVec2, radius: f64, segments: usize) -> Self {
        let segments = segments.max(3);
        let vertices = (0..segments)
            .map(|k| {
                let theta = std::f64::consts::TAU * k as f64 / segments as f64;
                center + radius * DVec2::new(theta.cos(), theta.sin())
            })
            .collect();
        let edges = (0..segments).map(|k| [k, (k + 1) % segments]).collect();
        Self { vertices, edges }
    }

    /// Axis-aligned rectangle.
    pub fn rectangle(min: DVec2, max: DVec2) -> Self {
        let vertices = vec![
            min,
            DVec2::new(max.x, min.y),
            max,
            DVec2::new(min.x, max.y),
        ];
        Self {
            vertices,
            edges: vec![[0, 1], [1, 2], [2, 3], [3, 0]],
        }
    }

    pub fn vertices(&self) -> &[DVec2] {
        &self.vertices
    }

    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = (DVec2, DVec2)> + '_ {
        self.edges
            .iter()
            .map(move |&[a, b]| (self.vertices[a], self.vertices[b]))
    }

    /// Append another mesh, re-indexing its edges.
    pub fn insert(&mut self, other: &Mesh2) {
        let offset = self.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);
        self.edges
            .extend(other.edges.iter().map(|&[a, b]| [a + offset, b + offset]));
    }

    /// Every vertex has exactly two incident edges and no edge is degenerate.
    pub fn is_closed(&self) -> bool {
        let mut degree = vec![0u32; self.vertices.len()];
        for &[a, b] in &self.edges {
            if a == b || a >= self.vertices.len() || b >= self.vertices.len() {
                return false;
            }
            degree[a] += 1;
            degree[b] += 1;
        }
        degree.iter().all(|&d| d == 2)
    }

    /// Move every vertex through the velocity field.
    pub fn advect(&mut self, dt: f64, velocity: &impl VelocitySampler, order: IntegrationOrder) {
        self.vertices.par_iter_mut().for_each(|vertex| {
            *vertex = integrate(dt, *vertex, |t, p| velocity.sample(t, p), order);
        });
    }
}

#[inline]
pub(crate) fn point_segment_distance(p: DVec2, a: DVec2, b: DVec2) -> f64 {
    let ab = b - a;
    let len2 = ab.length_squared();
    let t = if len2 > 0.0 {
        ((p - a).dot(ab) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (p - (a + ab * t)).length()
}

// Marching-squares edge ids around a lattice quad.
const BOTTOM: u8 = 0;
const RIGHT: u8 = 1;
const TOP: u8 = 2;
const LEFT: u8 = 3;

/// Segments (as quad edge ids) for each inside/outside corner pattern.
/// Corner bits: 1 = (i,j), 2 = (i+1,j), 4 = (i+1,j+1), 8 = (i,j+1).
/// Saddles (5, 10) are resolved separately.
fn case_segments(case: u8) -> &'static [[u8; 2]] {
    match case {
        1 | 14 => &[[LEFT, BOTTOM]],
        2 | 13 => &[[BOTTOM, RIGHT]],
        3 | 12 => &[[LEFT, RIGHT]],
        4 | 11 => &[[RIGHT, TOP]],
        6 | 9 => &[[BOTTOM, TOP]],
        7 | 8 => &[[LEFT, TOP]],
        _ => &[],
    }
}

impl LevelSet {
    /// Lattice value with background padding outside the grid.
    #[inline]
    fn padded(&self, i: isize, j: isize) -> f64 {
        let [nx, ny] = self.size();
        if i < 0 || j < 0 || i >= nx as isize || j >= ny as isize {
            self.background_sign() * self.dx()
        } else {
            self[[i as usize, j as usize]]
        }
    }

    /// Contour the zero set into a closed mesh.
    pub fn build_mesh(&self) -> Mesh2 {
        let [nx, ny] = self.size();
        let mut vertices = Vec::new();
        let mut edges = Vec::new();
        let mut lookup: FxHashMap<(u8, isize, isize), usize> = FxHashMap::default();

        let phi = self.phi();
        let position = |i: isize, j: isize| phi.index_to_world(DVec2::new(i as f64, j as f64));

        for j in -1..ny as isize {
            for i in -1..nx as isize {
                let corners = [
                    (i, j),
                    (i + 1, j),
                    (i + 1, j + 1),
                    (i, j + 1),
                ];
                let values = corners.map(|(ci, cj)| self.padded(ci, cj));
                let case = values
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (bit, &v)| if v < 0.0 { acc | (1 << bit) } else { acc });
                if case == 0 || case == 15 {
                    continue;
                }

                // Quad edge id -> lattice edge key and endpoint corners.
                let edge_ends = |edge: u8| -> ((u8, isize, isize), usize, usize) {
                    match edge {
                        BOTTOM => ((0, i, j), 0, 1),
                        RIGHT => ((1, i + 1, j), 1, 2),
                        TOP => ((0, i, j + 1), 3, 2),
                        _ => ((1, i, j), 0, 3),
                    }
                };

                let mut vertex_on = |edge: u8| -> usize {
                    let (key, a, b) = edge_ends(edge);
                    *lookup.entry(key).or_insert_with(|| {
                        let (va, vb) = (values[a], values[b]);
                        let t = va / (va - vb);
                        let pa = position(corners[a].0, corners[a].1);
                        let pb = position(corners[b].0, corners[b].1);
                        vertices.push(pa + (pb - pa) * t);
                        vertices.len() - 1
                    })
                };

                let center_inside = values.iter().sum::<f64>() < 0.0;
                let saddle: &[[u8; 2]] = match (case, center_inside) {
                    (5, true) | (10, false) => &[[BOTTOM, RIGHT], [TOP, LEFT]],
                    (5, false) | (10, true) => &[[LEFT, BOTTOM], [RIGHT, TOP]],
                    _ => case_segments(case),
                };
                for &[e0, e1] in saddle {
                    let a = vertex_on(e0);
                    let b = vertex_on(e1);
                    if a != b {
                        edges.push([a, b]);
                    }
                }
            }
        }

        Mesh2 { vertices, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Transform;

    fn circle_surface(radius: f64) -> LevelSet {
        let xform = Transform::new(0.1, DVec2::ZERO).unwrap();
        let center = DVec2::new(1.0, 1.0);
        LevelSet::from_fn(xform, [20, 20], |p| (p - center).length() - radius)
    }

    #[test]
    fn test_circle_contour_is_closed_and_on_surface() {
        let surface = circle_surface(0.55);
        let mesh = surface.build_mesh();
        assert!(!mesh.is_empty());
        assert!(mesh.is_closed(), "marching squares mesh must be closed");
        for v in mesh.vertices() {
            let r = (*v - DVec2::new(1.0, 1.0)).length();
            assert!((r - 0.55).abs() < 0.02, "vertex off surface: r = {}", r);
        }
    }

    #[test]
    fn test_interface_leaving_grid_still_closes() {
        let xform = Transform::new(0.1, DVec2::ZERO).unwrap();
        // Liquid pool filling the bottom of the domain.
        let surface = LevelSet::from_fn(xform, [16, 12], |p| p.y - 0.43);
        let mesh = surface.build_mesh();
        assert!(mesh.is_closed());
    }

    #[test]
    fn test_saddle_produces_two_segments() {
        let xform = Transform::unit();
        let mut surface = LevelSet::from_fn(xform, [2, 2], |_| 1.0);
        surface[[0, 0]] = -1.0;
        surface[[1, 1]] = -1.0;
        let mesh = surface.build_mesh();
        assert!(mesh.is_closed());
    }

    #[test]
    fn test_mesh_insert_and_advect() {
        let mut mesh = Mesh2::circle(DVec2::ZERO, 1.0, 16);
        mesh.insert(&Mesh2::rectangle(DVec2::splat(3.0), DVec2::splat(4.0)));
        assert_eq!(mesh.vertices().len(), 20);
        assert!(mesh.is_closed());

        let before = mesh.vertices().to_vec();
        mesh.advect(0.5, &|_t: f64, _p: DVec2| DVec2::new(2.0, 0.0), IntegrationOrder::Rk3);
        for (a, b) in before.iter().zip(mesh.vertices()) {
            assert!((*b - *a - DVec2::new(1.0, 0.0)).length() < 1e-12);
        }
    }

    #[test]
    fn test_point_segment_distance() {
        let a = DVec2::ZERO;
        let b = DVec2::new(2.0, 0.0);
        assert!((point_segment_distance(DVec2::new(1.0, 1.0), a, b) - 1.0).abs() < 1e-12);
        assert!((point_segment_distance(DVec2::new(3.0, 0.0), a, b) - 1.0).abs() < 1e-12);
        assert!((point_segment_distance(DVec2::new(-1.0, 0.0), a, a) - 1.0).abs() < 1e-12);
    }
}

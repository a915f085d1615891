//! Several immiscible materials filling a container.
//!
//! Each material has its own surface, velocity and density; they share one
//! pressure. Surfaces are kept from overlapping after every transport step.

use glam::DVec2;

use crate::advection::advect_vector_field;
use crate::config::MultiMaterialConfig;
use crate::error::{Error, Result};
use crate::extrapolation::extrapolate_vector_field;
use crate::grid::VectorGrid;
use crate::liquid::{apply_force, open_solid, rebuild_solid, resample_velocity};
use crate::multi_pressure::MultiMaterialPressureProjection;
use crate::solver::{LinearSolver, PcgSolver};
use crate::surface::LevelSet;
use crate::timing::{LogObserver, StageClock, StageObserver};
use crate::transform::Transform;
use crate::weights::{compute_cut_cell_weights, normalize_material_weights};

/// Remove overlaps between material surfaces.
///
/// At every cell the two smallest values among the materials and the solid
/// are averaged, and the average is subtracted from each material. At most
/// one material stays negative per cell afterwards. Call `reinit` on each
/// surface when done.
pub fn resolve_material_overlaps(surfaces: &mut [LevelSet], solid: &LevelSet) -> Result<()> {
    for surface in surfaces.iter() {
        solid.phi().check_layout(surface.phi(), "material overlap")?;
    }
    let mut shift = solid.phi().like(0.0);
    {
        let surfaces = &*surfaces;
        shift.par_fill_with(|cell| {
            let mut first = solid[cell];
            let mut second = f64::INFINITY;
            for surface in surfaces {
                let value = surface[cell];
                if value < first {
                    second = first;
                    first = value;
                } else if value < second {
                    second = value;
                }
            }
            0.5 * (first + second)
        });
    }
    for surface in surfaces.iter_mut() {
        surface.phi_mut().par_update(|cell, value| *value -= shift[cell]);
    }
    Ok(())
}

pub struct MultiMaterialLiquid {
    config: MultiMaterialConfig,
    transform: Transform,
    cells: [usize; 2],
    surfaces: Vec<LevelSet>,
    velocities: Vec<VectorGrid<f64>>,
    densities: Vec<f64>,
    solid_surface: LevelSet,
    solid_velocity: VectorGrid<f64>,
    solver: Box<dyn LinearSolver>,
    observer: Box<dyn StageObserver + Send>,
}

impl MultiMaterialLiquid {
    pub fn new(
        transform: Transform,
        cells: [usize; 2],
        material_count: usize,
        config: MultiMaterialConfig,
    ) -> Result<Self> {
        config.validate()?;
        if material_count == 0 {
            return Err(Error::InvalidConfig("at least one material is required".into()));
        }
        if cells[0] == 0 || cells[1] == 0 {
            return Err(Error::InvalidConfig(format!(
                "grid must have at least one cell per axis, got {:?}",
                cells
            )));
        }
        let solver = Box::new(PcgSolver::new(config.solver.clone()));
        Ok(Self {
            config,
            transform,
            cells,
            surfaces: vec![LevelSet::new(transform, cells); material_count],
            velocities: vec![VectorGrid::staggered(transform, cells, 0.0); material_count],
            densities: vec![1.0; material_count],
            solid_surface: open_solid(transform, cells),
            solid_velocity: VectorGrid::staggered(transform, cells, 0.0),
            solver,
            observer: Box::new(LogObserver),
        })
    }

    #[inline]
    pub fn material_count(&self) -> usize {
        self.surfaces.len()
    }

    fn check_material(&self, material: usize) -> Result<()> {
        if material >= self.surfaces.len() {
            return Err(Error::InvalidMaterial {
                index: material,
                count: self.surfaces.len(),
            });
        }
        Ok(())
    }

    pub fn config(&self) -> &MultiMaterialConfig {
        &self.config
    }

    pub fn set_solver(&mut self, solver: Box<dyn LinearSolver>) {
        self.solver = solver;
    }

    pub fn set_observer(&mut self, observer: Box<dyn StageObserver + Send>) {
        self.observer = observer;
    }

    pub fn set_material_surface(&mut self, material: usize, surface: &LevelSet) -> Result<()> {
        self.check_material(material)?;
        let mesh = surface.build_mesh();
        let mut resampled = LevelSet::new(self.transform, self.cells);
        resampled.init_from_mesh(&mesh);
        self.surfaces[material] = resampled;
        Ok(())
    }

    pub fn set_material_velocity(
        &mut self,
        material: usize,
        velocity: &VectorGrid<f64>,
    ) -> Result<()> {
        self.check_material(material)?;
        resample_velocity(&mut self.velocities[material], velocity);
        Ok(())
    }

    pub fn set_material_density(&mut self, material: usize, density: f64) -> Result<()> {
        self.check_material(material)?;
        if !(density > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "material density must be positive, got {}",
                density
            )));
        }
        self.densities[material] = density;
        Ok(())
    }

    /// Replace the solid. The surface must be inverted and share our grid.
    pub fn set_solid_surface(&mut self, surface: &LevelSet) -> Result<()> {
        self.solid_surface = rebuild_solid(surface, self.transform, self.cells)?;
        Ok(())
    }

    pub fn set_solid_velocity(&mut self, velocity: &VectorGrid<f64>) {
        resample_velocity(&mut self.solid_velocity, velocity);
    }

    pub fn add_force(
        &mut self,
        dt: f64,
        material: usize,
        force: impl Fn(DVec2, usize) -> f64 + Sync,
    ) -> Result<()> {
        self.check_material(material)?;
        apply_force(&mut self.velocities[material], dt, &force);
        Ok(())
    }

    pub fn add_uniform_force(&mut self, dt: f64, material: usize, force: DVec2) -> Result<()> {
        self.add_force(dt, material, move |_, axis| force[axis])
    }

    pub fn run_timestep(&mut self, dt: f64) -> Result<()> {
        if !(dt > 0.0) {
            return Err(Error::InvalidConfig(format!("timestep must be positive, got {}", dt)));
        }
        log::info!("multi-material timestep: dt = {:.4e}, {} materials", dt, self.material_count());
        let mut clock = StageClock::start();
        let dx = self.transform.dx();

        let solid = &self.solid_surface;
        let mut extrapolated = self.surfaces.clone();
        for surface in extrapolated.iter_mut() {
            surface.phi_mut().par_update(|cell, value| {
                let wall = solid[cell];
                if wall <= 0.0 || (wall <= dx && *value <= 0.0) {
                    *value -= dx;
                }
            });
            surface.reinit();
        }
        clock.lap(self.observer.as_mut(), "extrapolate into solids");

        let solid_weights = compute_cut_cell_weights(&self.solid_surface, false, 0.0);
        let mut material_weights: Vec<_> = extrapolated
            .iter()
            .map(|surface| {
                compute_cut_cell_weights(surface, false, self.config.min_cut_cell_weight)
            })
            .collect();
        normalize_material_weights(&mut material_weights, &solid_weights, &self.surfaces)?;
        clock.lap(self.observer.as_mut(), "compute cut-cell weights");

        let mut updated = self.velocities.clone();
        let mut validity = {
            let mut projection = MultiMaterialPressureProjection::new(
                &extrapolated,
                &self.velocities,
                &self.densities,
                &self.solid_surface,
                &self.solid_velocity,
            )?;
            let report =
                projection.project(&material_weights, &solid_weights, self.solver.as_ref())?;
            log::debug!("multi-material pressure: {} iterations", report.iterations);
            projection.apply_solution(&mut updated, &material_weights)?
        };
        self.velocities = updated;
        clock.lap(self.observer.as_mut(), "solve for multi-material pressure");

        for (velocity, valid) in self.velocities.iter_mut().zip(validity.iter_mut()) {
            extrapolate_vector_field(velocity, valid, self.config.extrapolation_bandwidth)?;
        }
        clock.lap(self.observer.as_mut(), "extrapolate velocity");

        for (surface, velocity) in self.surfaces.iter_mut().zip(&self.velocities) {
            surface.advect_boundary(dt, velocity, self.config.surface_integration);
        }
        resolve_material_overlaps(&mut self.surfaces, &self.solid_surface)?;
        for surface in self.surfaces.iter_mut() {
            surface.reinit();
        }
        for velocity in self.velocities.iter_mut() {
            let advected = advect_vector_field(
                dt,
                &*velocity,
                &*velocity,
                self.config.velocity_integration,
                self.config.interpolation,
            );
            *velocity = advected;
        }
        clock.lap(self.observer.as_mut(), "advect simulation");
        Ok(())
    }

    pub fn material_surfaces(&self) -> &[LevelSet] {
        &self.surfaces
    }

    pub fn material_velocities(&self) -> &[VectorGrid<f64>] {
        &self.velocities
    }

    pub fn densities(&self) -> &[f64] {
        &self.densities
    }

    pub fn solid_surface(&self) -> &LevelSet {
        &self.solid_surface
    }

    pub fn solid_velocity(&self) -> &VectorGrid<f64> {
        &self.solid_velocity
    }

    pub fn sample_velocity(&self, material: usize, world: DVec2) -> Result<DVec2> {
        self.check_material(material)?;
        Ok(self.velocities[material].interp(world))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers(cells: [usize; 2], height: f64) -> MultiMaterialLiquid {
        let xform = Transform::unit();
        let config = MultiMaterialConfig::default();
        let mut sim = MultiMaterialLiquid::new(xform, cells, 2, config).unwrap();
        sim.set_material_surface(0, &LevelSet::from_fn(xform, cells, move |p| p.y - height))
            .unwrap();
        sim.set_material_surface(1, &LevelSet::from_fn(xform, cells, move |p| height - p.y))
            .unwrap();
        sim.set_material_density(0, 2.0).unwrap();
        sim
    }

    #[test]
    fn test_material_index_is_checked() {
        let mut sim = layers([6, 6], 3.3);
        assert!(matches!(
            sim.set_material_density(2, 1.0),
            Err(Error::InvalidMaterial { index: 2, count: 2 })
        ));
        assert!(matches!(sim.set_material_density(0, -1.0), Err(Error::InvalidConfig(_))));
        assert!(sim.sample_velocity(5, DVec2::ONE).is_err());
        assert!(matches!(
            MultiMaterialLiquid::new(Transform::unit(), [4, 4], 0, MultiMaterialConfig::default()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_overlap_resolution_separates_materials() {
        let xform = Transform::unit();
        let mut surfaces = vec![
            LevelSet::from_fn(xform, [10, 10], |p| p.x - 6.0),
            LevelSet::from_fn(xform, [10, 10], |p| 4.0 - p.x),
        ];
        let solid = open_solid(xform, [10, 10]);
        resolve_material_overlaps(&mut surfaces, &solid).unwrap();
        for j in 0..10 {
            for i in 0..10 {
                let overlap = surfaces[0][[i, j]] < 0.0 && surfaces[1][[i, j]] < 0.0;
                assert!(!overlap, "overlap at {:?}", [i, j]);
                assert!((surfaces[0][[i, j]] + surfaces[1][[i, j]]).abs() < 1e-12);
            }
        }
        assert!(surfaces[0][[2, 5]] < 0.0 && surfaces[1][[8, 5]] < 0.0);
    }

    #[test]
    fn test_interface_on_face_column_steps() {
        let xform = Transform::unit();
        let cells = [8, 6];
        let config = MultiMaterialConfig::default();
        let mut sim = MultiMaterialLiquid::new(xform, cells, 2, config).unwrap();
        sim.set_material_surface(0, &LevelSet::from_fn(xform, cells, |p| p.x - 4.0))
            .unwrap();
        sim.set_material_surface(1, &LevelSet::from_fn(xform, cells, |p| 4.0 - p.x))
            .unwrap();
        sim.run_timestep(0.05).unwrap();

        for velocity in sim.material_velocities() {
            assert_eq!(velocity.max_magnitude(), 0.0);
        }
        let surfaces = sim.material_surfaces();
        assert!(surfaces[0][[1, 3]] < 0.0 && surfaces[1][[6, 3]] < 0.0);
        for j in 0..cells[1] {
            for i in 0..cells[0] {
                let overlap = surfaces[0][[i, j]] < 0.0 && surfaces[1][[i, j]] < 0.0;
                assert!(!overlap, "overlap at {:?}", [i, j]);
            }
        }
    }

    #[test]
    fn test_stable_layers_stay_still() {
        let mut sim = layers([10, 10], 4.3);
        for _ in 0..2 {
            for m in 0..2 {
                sim.add_uniform_force(0.05, m, DVec2::new(0.0, -9.8)).unwrap();
            }
            sim.run_timestep(0.05).unwrap();
        }
        for i in 0..10 {
            let below = DVec2::new(i as f64 + 0.5, 2.5);
            let above = DVec2::new(i as f64 + 0.5, 6.5);
            assert!(sim.sample_velocity(0, below).unwrap().length() < 1e-4);
            assert!(sim.sample_velocity(1, above).unwrap().length() < 1e-4);
        }
        assert!(sim.material_surfaces()[0].interp(DVec2::new(5.0, 2.0)) < 0.0);
        assert!(sim.material_surfaces()[1].interp(DVec2::new(5.0, 7.0)) < 0.0);
    }
}

//! Free-surface liquid driver.
//!
//! Owns the liquid and solid surfaces, the staggered velocity, the solid
//! velocity and an optional viscosity field, and advances them one timestep
//! at a time: pressure projection (optionally with implicit viscosity),
//! velocity extrapolation, then transport.

use glam::DVec2;

use crate::advection::{advect_field, advect_vector_field};
use crate::config::LiquidConfig;
use crate::error::{Error, Result};
use crate::extrapolation::extrapolate_vector_field;
use crate::grid::{Grid, InterpolationOrder, MarkedCell, VectorGrid};
use crate::pressure::PressureProjection;
use crate::solver::{LinearSolver, PcgSolver};
use crate::surface::LevelSet;
use crate::timing::{LogObserver, StageClock, StageObserver};
use crate::transform::Transform;
use crate::viscosity::{ViscositySolver, ViscosityWeights};
use crate::weights::{compute_cut_cell_weights, compute_ghost_fluid_weights};

/// Resample `source` at every face of `target`.
pub(crate) fn resample_velocity(target: &mut VectorGrid<f64>, source: &VectorGrid<f64>) {
    for axis in 0..2 {
        let grid = target.grid(axis);
        let (transform, offset) = (grid.transform(), grid.sample_type().offset());
        target.grid_mut(axis).par_fill_with(|[i, j]| {
            let world = transform.index_to_world(DVec2::new(i as f64, j as f64) + offset);
            source.interp_axis(world, axis, InterpolationOrder::Linear)
        });
    }
}

/// Add `dt * force(position, axis)` to every face.
pub(crate) fn apply_force(
    velocity: &mut VectorGrid<f64>,
    dt: f64,
    force: &(impl Fn(DVec2, usize) -> f64 + Sync),
) {
    for axis in 0..2 {
        let grid = velocity.grid(axis);
        let (transform, offset) = (grid.transform(), grid.sample_type().offset());
        velocity.grid_mut(axis).par_update(|[i, j], value| {
            let world = transform.index_to_world(DVec2::new(i as f64, j as f64) + offset);
            *value += dt * force(world, axis);
        });
    }
}

/// Re-sign a solid from its contour onto a fresh inverted grid.
pub(crate) fn rebuild_solid(
    surface: &LevelSet,
    transform: Transform,
    cells: [usize; 2],
) -> Result<LevelSet> {
    if !surface.is_inverted() {
        return Err(Error::InvalidGeometry(
            "solid surfaces must use the inverted sign convention".into(),
        ));
    }
    if surface.transform() != transform || surface.phi().cells() != cells {
        return Err(Error::mismatch(
            "solid surface",
            (cells, transform),
            (surface.phi().cells(), surface.transform()),
        ));
    }
    let mesh = surface.build_mesh();
    let mut solid = LevelSet::new(transform, cells);
    solid.set_inverted();
    solid.init_from_mesh(&mesh);
    Ok(solid)
}

/// Open solid: no obstacles apart from the domain walls.
pub(crate) fn open_solid(transform: Transform, cells: [usize; 2]) -> LevelSet {
    let mut solid = LevelSet::new(transform, cells);
    solid.set_inverted();
    solid
}

pub struct EulerianLiquid {
    config: LiquidConfig,
    transform: Transform,
    cells: [usize; 2],
    liquid_surface: LevelSet,
    solid_surface: LevelSet,
    velocity: VectorGrid<f64>,
    solid_velocity: VectorGrid<f64>,
    viscosity: Grid<f64>,
    solver: Box<dyn LinearSolver>,
    observer: Box<dyn StageObserver + Send>,
}

impl EulerianLiquid {
    pub fn new(transform: Transform, cells: [usize; 2], config: LiquidConfig) -> Result<Self> {
        config.validate()?;
        if cells[0] == 0 || cells[1] == 0 {
            return Err(Error::InvalidConfig(format!(
                "grid must have at least one cell per axis, got {:?}",
                cells
            )));
        }
        let liquid_surface = LevelSet::new(transform, cells);
        let viscosity = liquid_surface.phi().like(0.0);
        let solver = Box::new(PcgSolver::new(config.solver.clone()));
        Ok(Self {
            config,
            transform,
            cells,
            solid_surface: open_solid(transform, cells),
            liquid_surface,
            velocity: VectorGrid::staggered(transform, cells, 0.0),
            solid_velocity: VectorGrid::staggered(transform, cells, 0.0),
            viscosity,
            solver,
            observer: Box::new(LogObserver),
        })
    }

    pub fn config(&self) -> &LiquidConfig {
        &self.config
    }

    pub fn set_solver(&mut self, solver: Box<dyn LinearSolver>) {
        self.solver = solver;
    }

    pub fn set_observer(&mut self, observer: Box<dyn StageObserver + Send>) {
        self.observer = observer;
    }

    /// Replace the solid. The surface must be inverted (negative inside the
    /// solid) and share our grid.
    pub fn set_solid_surface(&mut self, surface: &LevelSet) -> Result<()> {
        self.solid_surface = rebuild_solid(surface, self.transform, self.cells)?;
        Ok(())
    }

    /// Replace the liquid with the zero set of `surface`, which may live on
    /// any grid.
    pub fn set_liquid_surface(&mut self, surface: &LevelSet) {
        let mesh = surface.build_mesh();
        self.liquid_surface = LevelSet::new(self.transform, self.cells);
        self.liquid_surface.init_from_mesh(&mesh);
    }

    pub fn set_liquid_velocity(&mut self, velocity: &VectorGrid<f64>) {
        resample_velocity(&mut self.velocity, velocity);
    }

    pub fn set_solid_velocity(&mut self, velocity: &VectorGrid<f64>) {
        resample_velocity(&mut self.solid_velocity, velocity);
    }

    pub fn set_viscosity(&mut self, value: f64) -> Result<()> {
        if !(value >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "viscosity must be non-negative, got {}",
                value
            )));
        }
        self.viscosity.fill(value);
        Ok(())
    }

    pub fn set_viscosity_field(&mut self, viscosity: &Grid<f64>) -> Result<()> {
        if viscosity.values().iter().any(|v| !(*v >= 0.0)) {
            return Err(Error::InvalidConfig("viscosity must be non-negative".into()));
        }
        let transform = self.viscosity.transform();
        let offset = self.viscosity.sample_type().offset();
        self.viscosity.par_fill_with(|[i, j]| {
            let index = DVec2::new(i as f64, j as f64) + offset;
            viscosity.interp_linear(transform.index_to_world(index))
        });
        Ok(())
    }

    /// Add liquid. Faces newly covered start at rest so they do not inherit
    /// extrapolated velocities.
    pub fn union_liquid_surface(&mut self, added: &LevelSet) -> Result<()> {
        self.liquid_surface.phi().check_layout(added.phi(), "added liquid surface")?;
        let liquid = &self.liquid_surface;
        for axis in 0..2 {
            let grid = self.velocity.grid(axis);
            let (transform, offset) = (grid.transform(), grid.sample_type().offset());
            self.velocity.grid_mut(axis).par_update(|[i, j], value| {
                let world = transform.index_to_world(DVec2::new(i as f64, j as f64) + offset);
                if added.interp(world) <= 0.0 && liquid.interp(world) > 0.0 {
                    *value = 0.0;
                }
            });
        }
        self.liquid_surface.union_surface(added)?;
        self.liquid_surface.reinit();
        Ok(())
    }

    pub fn add_force(&mut self, dt: f64, force: impl Fn(DVec2, usize) -> f64 + Sync) {
        apply_force(&mut self.velocity, dt, &force);
    }

    pub fn add_uniform_force(&mut self, dt: f64, force: DVec2) {
        self.add_force(dt, move |_, axis| force[axis]);
    }

    /// Largest step that keeps the fastest sample within `cfl` cells.
    pub fn max_timestep(&self) -> f64 {
        let speed = self.velocity.max_magnitude();
        if speed > 0.0 {
            self.config.cfl * self.transform.dx() / speed
        } else {
            f64::INFINITY
        }
    }

    pub fn run_timestep(&mut self, dt: f64) -> Result<()> {
        if !(dt > 0.0) {
            return Err(Error::InvalidConfig(format!("timestep must be positive, got {}", dt)));
        }
        log::info!("liquid timestep: dt = {:.4e}", dt);
        let mut clock = StageClock::start();
        let dx = self.transform.dx();

        // Push the liquid into adjacent solid so the cut-cell faces see it.
        let mut extrapolated = self.liquid_surface.clone();
        let reach = self.config.solid_extrapolation * dx;
        let solid = &self.solid_surface;
        extrapolated.phi_mut().par_update(|cell, value| {
            if solid[cell] <= 0.0 {
                *value -= reach;
            }
        });
        extrapolated.reinit();
        clock.lap(self.observer.as_mut(), "extrapolate into solids");

        let ghost_weights = compute_ghost_fluid_weights(&extrapolated);
        let cut_weights =
            compute_cut_cell_weights(&self.solid_surface, true, self.config.min_cut_cell_weight);
        clock.lap(self.observer.as_mut(), "compute weights");

        let mut projection = PressureProjection::new(
            &extrapolated,
            &self.velocity,
            &self.solid_surface,
            &self.solid_velocity,
            self.config.min_ghost_weight,
        )?;
        let report = projection.project(&ghost_weights, &cut_weights, self.solver.as_ref())?;
        projection.apply_solution(&mut self.velocity, &ghost_weights)?;
        log::debug!("pressure: {} iterations", report.iterations);

        let mut valid = self.velocity.like(MarkedCell::Unvisited);
        if self.config.solve_viscosity {
            clock.lap(self.observer.as_mut(), "solve pressure");

            let weights = ViscosityWeights::compute(
                &extrapolated,
                &self.solid_surface,
                self.config.viscosity_samples,
            );
            clock.lap(self.observer.as_mut(), "compute viscosity weights");

            let mut viscous = self.velocity.clone();
            let mut solved = self.velocity.like(MarkedCell::Unvisited);
            let viscosity = ViscositySolver::new(
                dt,
                &extrapolated,
                &self.velocity,
                &self.solid_surface,
                &self.solid_velocity,
                &self.viscosity,
            )?;
            let report =
                viscosity.solve(&weights, self.solver.as_ref(), &mut viscous, &mut solved)?;
            log::debug!("viscosity: {} iterations", report.iterations);
            self.velocity = viscous;
            clock.lap(self.observer.as_mut(), "solve viscosity");

            let mut reprojection = PressureProjection::new(
                &extrapolated,
                &self.velocity,
                &self.solid_surface,
                &self.solid_velocity,
                self.config.min_ghost_weight,
            )?;
            reprojection.project(&ghost_weights, &cut_weights, self.solver.as_ref())?;
            reprojection.apply_solution(&mut self.velocity, &ghost_weights)?;
            reprojection.apply_valid(&mut valid)?;
            clock.lap(self.observer.as_mut(), "solve pressure after viscosity");
        } else {
            projection.apply_valid(&mut valid)?;
            clock.lap(self.observer.as_mut(), "solve pressure");
        }

        extrapolate_vector_field(&mut self.velocity, &mut valid, self.config.velocity_bandwidth())?;
        clock.lap(self.observer.as_mut(), "extrapolate velocity");

        self.advect_liquid_surface(dt);
        self.velocity = advect_vector_field(
            dt,
            &self.velocity,
            &self.velocity,
            self.config.velocity_integration,
            self.config.interpolation,
        );
        if self.config.solve_viscosity {
            self.viscosity = advect_field(
                dt,
                &self.viscosity,
                &self.velocity,
                self.config.viscosity_integration,
                self.config.interpolation,
            );
        }
        clock.lap(self.observer.as_mut(), "advect simulation");
        Ok(())
    }

    fn advect_liquid_surface(&mut self, dt: f64) {
        self.liquid_surface
            .advect_boundary(dt, &self.velocity, self.config.surface_integration);
        // Liquid carried into a solid is removed.
        let solid = &self.solid_surface;
        self.liquid_surface
            .phi_mut()
            .par_update(|cell, value| *value = value.max(-solid[cell]));
        self.liquid_surface.reinit();
    }

    pub fn liquid_surface(&self) -> &LevelSet {
        &self.liquid_surface
    }

    pub fn solid_surface(&self) -> &LevelSet {
        &self.solid_surface
    }

    pub fn velocity(&self) -> &VectorGrid<f64> {
        &self.velocity
    }

    pub fn solid_velocity(&self) -> &VectorGrid<f64> {
        &self.solid_velocity
    }

    pub fn viscosity(&self) -> &Grid<f64> {
        &self.viscosity
    }

    pub fn sample_velocity(&self, world: DVec2) -> DVec2 {
        self.velocity.interp(world)
    }

    /// Number of cells inside the liquid.
    pub fn liquid_cell_count(&self) -> usize {
        self.liquid_surface.phi().values().iter().filter(|&&v| v < 0.0).count()
    }
}

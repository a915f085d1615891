//! liquid2d - Eulerian liquid simulation on a 2D staggered grid
//!
//! Level-set surfaces with cut-cell solids:
//! - Ghost-fluid free surface and cut-cell solid boundaries in the pressure solve
//! - Implicit variational viscosity
//! - Multi-material projection with a shared pressure
//! - Explicit contour meshes for surface transport and redistancing
//!
//! Framework-agnostic: rendering and interactive drivers live outside the
//! crate and read state through the samplers on each driver.

pub mod advection;
pub mod config;
pub mod error;
pub mod extrapolation;
pub mod grid;
pub mod integrator;
pub mod liquid;
pub mod mesh;
pub mod multi_liquid;
pub mod multi_pressure;
pub mod pressure;
pub mod solver;
pub mod surface;
pub mod timing;
pub mod transform;
pub mod viscosity;
pub mod weights;

pub use advection::{advect_field, advect_vector_field, VelocitySampler};
pub use config::{LiquidConfig, MultiMaterialConfig};
pub use error::{Error, Result};
pub use grid::{Grid, InterpolationOrder, MarkedCell, SampleType, VectorGrid, VectorSampleType};
pub use integrator::{integrate, IntegrationOrder};
pub use liquid::EulerianLiquid;
pub use mesh::Mesh2;
pub use multi_liquid::{resolve_material_overlaps, MultiMaterialLiquid};
pub use solver::{LinearSolver, NonconvergencePolicy, PcgSolver, SolveReport, SolverConfig};
pub use surface::LevelSet;
pub use timing::{LogObserver, StageObserver, StageTimings};
pub use transform::Transform;

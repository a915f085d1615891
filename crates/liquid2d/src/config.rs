//! Driver configuration.
//!
//! All fields have defaults, so a partial document deserializes.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::InterpolationOrder;
use crate::integrator::IntegrationOrder;
use crate::pressure::MIN_GHOST_WEIGHT;
use crate::solver::SolverConfig;

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidConfig(format!("{} must lie in [0, 1], got {}", name, value)));
    }
    Ok(())
}

/// Settings for [`crate::EulerianLiquid`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidConfig {
    /// Expected maximum travel per step, in cells. Velocities are
    /// extrapolated `1.5 * cfl` cells past the liquid.
    pub cfl: f64,
    pub solve_viscosity: bool,
    /// Supersamples per axis for viscosity control volumes.
    pub viscosity_samples: usize,
    pub min_cut_cell_weight: f64,
    pub min_ghost_weight: f64,
    /// How far the liquid is pushed into solid cells before weights are built, in cells.
    pub solid_extrapolation: f64,
    pub surface_integration: IntegrationOrder,
    pub velocity_integration: IntegrationOrder,
    pub viscosity_integration: IntegrationOrder,
    pub interpolation: InterpolationOrder,
    pub solver: SolverConfig,
}

impl Default for LiquidConfig {
    fn default() -> Self {
        Self {
            cfl: 5.0,
            solve_viscosity: false,
            viscosity_samples: 3,
            min_cut_cell_weight: 0.0,
            min_ghost_weight: MIN_GHOST_WEIGHT,
            solid_extrapolation: 1.0,
            surface_integration: IntegrationOrder::Rk3,
            velocity_integration: IntegrationOrder::Rk3,
            viscosity_integration: IntegrationOrder::ForwardEuler,
            interpolation: InterpolationOrder::Linear,
            solver: SolverConfig::default(),
        }
    }
}

impl LiquidConfig {
    pub fn velocity_bandwidth(&self) -> f64 {
        1.5 * self.cfl
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.cfl > 0.0) {
            return Err(Error::InvalidConfig(format!("cfl must be positive, got {}", self.cfl)));
        }
        if self.viscosity_samples == 0 {
            return Err(Error::InvalidConfig("viscosity_samples must be at least 1".into()));
        }
        check_fraction("min_cut_cell_weight", self.min_cut_cell_weight)?;
        check_fraction("min_ghost_weight", self.min_ghost_weight)?;
        if self.min_ghost_weight == 0.0 {
            return Err(Error::InvalidConfig("min_ghost_weight must be positive".into()));
        }
        if !(self.solid_extrapolation >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "solid_extrapolation must be non-negative, got {}",
                self.solid_extrapolation
            )));
        }
        self.solver.validate()
    }
}

/// Settings for [`crate::MultiMaterialLiquid`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiMaterialConfig {
    /// Velocity extrapolation distance past each material, in cells.
    pub extrapolation_bandwidth: f64,
    pub min_cut_cell_weight: f64,
    pub surface_integration: IntegrationOrder,
    pub velocity_integration: IntegrationOrder,
    pub interpolation: InterpolationOrder,
    pub solver: SolverConfig,
}

impl Default for MultiMaterialConfig {
    fn default() -> Self {
        Self {
            extrapolation_bandwidth: 5.0,
            min_cut_cell_weight: 0.0,
            surface_integration: IntegrationOrder::Rk3,
            velocity_integration: IntegrationOrder::Rk3,
            interpolation: InterpolationOrder::Linear,
            solver: SolverConfig::default(),
        }
    }
}

impl MultiMaterialConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.extrapolation_bandwidth >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "extrapolation_bandwidth must be non-negative, got {}",
                self.extrapolation_bandwidth
            )));
        }
        check_fraction("min_cut_cell_weight", self.min_cut_cell_weight)?;
        self.solver.validate()
    }
}

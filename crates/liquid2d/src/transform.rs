//! Index <-> world mapping shared by every grid in a simulation.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Uniform cell size plus origin. Index space is continuous: integer index
/// `i` maps to `origin + i * dx`; per-sample offsets are added by the grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    dx: f64,
    origin: DVec2,
}

impl Transform {
    pub fn new(dx: f64, origin: DVec2) -> Result<Self> {
        if !(dx > 0.0) || !dx.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "cell size must be positive and finite, got {}",
                dx
            )));
        }
        Ok(Self { dx, origin })
    }

    /// Unit cells at the world origin.
    pub fn unit() -> Self {
        Self {
            dx: 1.0,
            origin: DVec2::ZERO,
        }
    }

    #[inline]
    pub fn dx(&self) -> f64 {
        self.dx
    }

    #[inline]
    pub fn origin(&self) -> DVec2 {
        self.origin
    }

    #[inline]
    pub fn index_to_world(&self, index: DVec2) -> DVec2 {
        self.origin + index * self.dx
    }

    #[inline]
    pub fn world_to_index(&self, world: DVec2) -> DVec2 {
        (world - self.origin) / self.dx
    }
}

//! Fixed-step ODE stepping for Lagrangian tracing.
//!
//! Used both to move explicit surface vertices forward and to trace grid
//! samples backward for semi-Lagrangian advection.

use std::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationOrder {
    ForwardEuler,
    #[default]
    Rk3,
}

/// Advance `x` by step `h` through `f(time_offset, position)`.
#[inline]
pub fn integrate<T, F>(h: f64, x: T, f: F, order: IntegrationOrder) -> T
where
    T: Copy + Add<Output = T> + Sub<Output = T> + Mul<f64, Output = T> + Div<f64, Output = T>,
    F: Fn(f64, T) -> T,
{
    match order {
        IntegrationOrder::ForwardEuler => x + f(0.0, x) * h,
        IntegrationOrder::Rk3 => {
            let k1 = f(0.0, x) * h;
            let k2 = f(0.5 * h, x + k1 / 2.0) * h;
            let k3 = f(h, x - k1 + k2) * h;
            x + (k1 + k2 * 4.0 + k3) / 6.0
        }
    }
}

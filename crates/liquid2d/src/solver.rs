//! Sparse symmetric positive (semi-)definite solves.
//!
//! Systems are assembled row by row into a [`SparseMatrixBuilder`], frozen
//! into CSR form and handed to a [`LinearSolver`]. The built-in solver is
//! Jacobi-preconditioned conjugate gradient.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Row-wise accumulator of matrix entries. Repeated `(row, col)` entries sum.
#[derive(Clone, Debug, Default)]
pub struct SparseMatrixBuilder {
    rows: Vec<Vec<(usize, f64)>>,
}

impl SparseMatrixBuilder {
    pub fn new(size: usize) -> Self {
        Self {
            rows: vec![Vec::new(); size],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn add_to_element(&mut self, row: usize, col: usize, value: f64) {
        self.rows[row].push((col, value));
    }

    pub fn build(self) -> SparseMatrix {
        let n = self.rows.len();
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);

        for mut row in self.rows {
            row.sort_by_key(|&(col, _)| col);
            let mut last: Option<usize> = None;
            for (col, value) in row {
                if last == Some(col) {
                    if let Some(v) = values.last_mut() {
                        *v += value;
                    }
                } else {
                    col_idx.push(col);
                    values.push(value);
                    last = Some(col);
                }
            }
            row_ptr.push(col_idx.len());
        }

        SparseMatrix {
            size: n,
            row_ptr,
            col_idx,
            values,
        }
    }
}

/// Square matrix in compressed sparse row form.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseMatrix {
    size: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        self.col_idx[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.row(row).find(|&(c, _)| c == col).map_or(0.0, |(_, v)| v)
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.size).map(|r| self.get(r, r)).collect()
    }

    /// `y = A x`, parallel over rows.
    pub fn mul_vec(&self, x: &[f64], y: &mut [f64]) {
        y.par_iter_mut().enumerate().for_each(|(r, out)| {
            *out = self.row(r).map(|(c, v)| v * x[c]).sum();
        });
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        (0..self.size).all(|r| self.row(r).all(|(c, v)| (self.get(c, r) - v).abs() <= tol))
    }
}

/// What to do when the iteration limit is hit before the tolerance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonconvergencePolicy {
    #[default]
    Fail,
    /// Keep the last iterate and log a warning.
    AcceptBestEffort,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Tolerance relative to the right-hand side norm.
    pub rtol: f64,
    pub atol: f64,
    pub max_iter: usize,
    pub policy: NonconvergencePolicy,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-14,
            max_iter: 2000,
            policy: NonconvergencePolicy::Fail,
        }
    }
}

impl SolverConfig {
    pub fn new(rtol: f64, max_iter: usize) -> Self {
        Self {
            rtol,
            max_iter,
            ..Default::default()
        }
    }

    pub fn with_policy(mut self, policy: NonconvergencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.rtol > 0.0) || !(self.atol >= 0.0) || self.max_iter == 0 {
            return Err(Error::InvalidConfig(format!(
                "solver tolerances must be positive with at least one iteration, got {:?}",
                self
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveReport {
    pub iterations: usize,
    /// Final residual norm over the right-hand side norm.
    pub relative_residual: f64,
    pub converged: bool,
}

pub trait LinearSolver: Send + Sync {
    /// Solve `matrix * x = rhs`, starting from the contents of `x`.
    fn solve(&self, matrix: &SparseMatrix, rhs: &[f64], x: &mut [f64]) -> Result<SolveReport>;
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.par_iter().zip(b.par_iter()).map(|(x, y)| x * y).sum()
}

#[inline]
fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Conjugate gradient with a Jacobi preconditioner.
#[derive(Clone, Debug, Default)]
pub struct PcgSolver {
    config: SolverConfig,
}

impl PcgSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
}

impl LinearSolver for PcgSolver {
    fn solve(&self, matrix: &SparseMatrix, rhs: &[f64], x: &mut [f64]) -> Result<SolveReport> {
        let n = matrix.size();
        if rhs.len() != n || x.len() != n {
            return Err(Error::mismatch("linear system", n, (rhs.len(), x.len())));
        }

        let rhs_norm = norm(rhs);
        if rhs_norm == 0.0 {
            x.fill(0.0);
            return Ok(SolveReport {
                iterations: 0,
                relative_residual: 0.0,
                converged: true,
            });
        }
        let tolerance = (self.config.rtol * rhs_norm).max(self.config.atol);

        let inv_diag: Vec<f64> = matrix
            .diagonal()
            .into_iter()
            .map(|d| if d > 0.0 { 1.0 / d } else { 1.0 })
            .collect();

        let mut r = vec![0.0; n];
        matrix.mul_vec(x, &mut r);
        r.par_iter_mut().zip(rhs.par_iter()).for_each(|(r, b)| *r = b - *r);

        let mut z: Vec<f64> = r.iter().zip(&inv_diag).map(|(r, d)| r * d).collect();
        let mut p = z.clone();
        let mut ap = vec![0.0; n];
        let mut rz = dot(&r, &z);
        let mut residual = norm(&r);
        let mut iterations = 0;

        while residual > tolerance && iterations < self.config.max_iter {
            matrix.mul_vec(&p, &mut ap);
            let pap = dot(&p, &ap);
            if !(pap > 0.0) {
                break;
            }
            let alpha = rz / pap;
            x.par_iter_mut().zip(p.par_iter()).for_each(|(x, p)| *x += alpha * p);
            r.par_iter_mut().zip(ap.par_iter()).for_each(|(r, ap)| *r -= alpha * ap);
            iterations += 1;

            residual = norm(&r);
            if residual <= tolerance {
                break;
            }

            z.par_iter_mut()
                .zip(r.par_iter().zip(inv_diag.par_iter()))
                .for_each(|(z, (r, d))| *z = r * d);
            let rz_next = dot(&r, &z);
            let beta = rz_next / rz;
            rz = rz_next;
            p.par_iter_mut().zip(z.par_iter()).for_each(|(p, z)| *p = z + beta * *p);
        }

        let report = SolveReport {
            iterations,
            relative_residual: residual / rhs_norm,
            converged: residual <= tolerance,
        };
        log::debug!(
            "pcg: {} unknowns, {} iterations, relative residual {:.3e}",
            n,
            report.iterations,
            report.relative_residual
        );

        if report.converged {
            return Ok(report);
        }
        match self.config.policy {
            NonconvergencePolicy::Fail => Err(Error::SolverNonconvergence {
                iterations: report.iterations,
                residual: report.relative_residual,
            }),
            NonconvergencePolicy::AcceptBestEffort => {
                log::warn!(
                    "pcg stopped after {} iterations at residual {:.3e}; keeping best effort",
                    report.iterations,
                    report.relative_residual
                );
                Ok(report)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1D Poisson matrix with Dirichlet ends.
    fn laplacian(n: usize) -> SparseMatrix {
        let mut builder = SparseMatrixBuilder::new(n);
        for i in 0..n {
            builder.add_to_element(i, i, 2.0);
            if i > 0 {
                builder.add_to_element(i, i - 1, -1.0);
            }
            if i + 1 < n {
                builder.add_to_element(i, i + 1, -1.0);
            }
        }
        builder.build()
    }

    #[test]
    fn test_builder_merges_duplicates() {
        let mut builder = SparseMatrixBuilder::new(2);
        builder.add_to_element(0, 1, 1.5);
        builder.add_to_element(0, 0, 1.0);
        builder.add_to_element(0, 1, 0.5);
        let m = builder.build();
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.get(0, 1), 2.0);
        assert_eq!(m.get(1, 1), 0.0);
    }

    #[test]
    fn test_pcg_solves_poisson() {
        let n = 50;
        let m = laplacian(n);
        assert!(m.is_symmetric(0.0));
        let rhs = vec![1.0; n];
        let mut x = vec![0.0; n];
        let report = PcgSolver::default().solve(&m, &rhs, &mut x).unwrap();
        assert!(report.converged);

        let mut check = vec![0.0; n];
        m.mul_vec(&x, &mut check);
        for (a, b) in check.iter().zip(&rhs) {
            assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_zero_rhs_returns_zero() {
        let m = laplacian(4);
        let mut x = vec![3.0; 4];
        let report = PcgSolver::default().solve(&m, &[0.0; 4], &mut x).unwrap();
        assert_eq!(report.iterations, 0);
        assert_eq!(x, vec![0.0; 4]);
    }

    #[test]
    fn test_nonconvergence_policy() {
        let m = laplacian(100);
        let rhs = vec![1.0; 100];
        let strict = PcgSolver::new(SolverConfig::new(1e-12, 2));
        let mut x = vec![0.0; 100];
        assert!(matches!(
            strict.solve(&m, &rhs, &mut x),
            Err(Error::SolverNonconvergence { iterations: 2, .. })
        ));

        let config =
            SolverConfig::new(1e-12, 2).with_policy(NonconvergencePolicy::AcceptBestEffort);
        let lenient = PcgSolver::new(config);
        let mut x = vec![0.0; 100];
        let report = lenient.solve(&m, &rhs, &mut x).unwrap();
        assert!(!report.converged);
        assert!(x.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_dimension_mismatch() {
        let m = laplacian(3);
        let mut x = vec![0.0; 2];
        assert!(matches!(
            PcgSolver::default().solve(&m, &[1.0; 3], &mut x),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}

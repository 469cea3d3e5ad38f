//! Constraint projections and the Kalman update
//!
//! A constraint linearised at some state is a [`Projection`]: the residual
//! r = h(x) - m, the Jacobian H = dh/dx over the full state vector, and the
//! covariance V of the measurement. [`kalman_update`] folds one projection
//! into the global state:
//!
//! ```text
//! R = H C H^T + V
//! K = C H^T R^-1
//! x <- x - K r
//! C <- (I - K H) C (I - K H)^T + K V K^T
//! chi2 += r^T R^-1 r
//! ```
//!
//! The covariance update uses the Joseph form, which stays symmetric and
//! positive semi-definite under rounding even for exact (V = 0) constraints.

use log::trace;
use nalgebra::{DMatrix, DVector};

use super::params::FitParams;
use crate::types::ErrCode;

/// A linearised constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Residual h(x) - m
    pub residual: DVector<f64>,
    /// Jacobian of the residual with respect to the state vector
    pub h: DMatrix<f64>,
    /// Measurement covariance (zero for exact constraints)
    pub v: DMatrix<f64>,
}

impl Projection {
    /// Creates a zeroed projection with `rows` equations over a state of
    /// dimension `dim`.
    pub fn new(rows: usize, dim: usize) -> Self {
        Self {
            residual: DVector::zeros(rows),
            h: DMatrix::zeros(rows, dim),
            v: DMatrix::zeros(rows, rows),
        }
    }

    /// Number of constraint equations.
    #[inline]
    pub fn rows(&self) -> usize {
        self.residual.len()
    }

    /// Moves the residual from the linearisation point `reference` to the
    /// state `current`: r <- r + H (x - x_ref).
    pub fn shift_to(&mut self, current: &DVector<f64>, reference: &DVector<f64>) {
        self.residual += &self.h * (current - reference);
    }

    /// Rows whose Jacobian row and variance are both zero.
    fn empty_rows(&self) -> Vec<usize> {
        (0..self.rows())
            .filter(|&row| {
                self.h.row(row).iter().all(|&v| v == 0.0)
                    && self.v.row(row).iter().all(|&v| v == 0.0)
            })
            .collect()
    }

    /// Copy of this projection restricted to `rows`.
    fn select_rows(&self, rows: &[usize]) -> Self {
        let n = rows.len();
        let mut reduced = Projection::new(n, self.h.ncols());
        for (i, &row) in rows.iter().enumerate() {
            reduced.residual[i] = self.residual[row];
            reduced.h.set_row(i, &self.h.row(row));
            for (j, &col) in rows.iter().enumerate() {
                reduced.v[(i, j)] = self.v[(row, col)];
            }
        }
        reduced
    }
}

/// Computes the innovation covariance R = H C H^T + V and C H^T.
fn innovation(params: &FitParams, projection: &Projection) -> (DMatrix<f64>, DMatrix<f64>) {
    let ch_t = params.covariance() * projection.h.transpose();
    let r = &projection.h * &ch_t + &projection.v;
    (r, ch_t)
}

/// Joseph-form covariance update.
fn joseph_update(params: &mut FitParams, gain: &DMatrix<f64>, projection: &Projection) {
    let dim = params.dim();
    let i_kh = DMatrix::<f64>::identity(dim, dim) - gain * &projection.h;
    let term1 = &i_kh * params.covariance() * i_kh.transpose();
    let term2 = gain * &projection.v * gain.transpose();
    *params.covariance_mut() = term1 + term2;
    params.symmetrize_covariance();
}

/// Applies one projection to the fit state.
///
/// All rows count towards the constraint total; rows that carry no
/// information are dropped from the update and added to the reduction.
/// A singular innovation covariance yields [`ErrCode::InversionError`]
/// and leaves the state untouched.
pub fn kalman_update(params: &mut FitParams, projection: &Projection) -> ErrCode {
    let rows = projection.rows();
    let empty = projection.empty_rows();
    let reduced;
    let active = if empty.is_empty() {
        projection
    } else {
        let keep: Vec<usize> = (0..rows).filter(|r| !empty.contains(r)).collect();
        reduced = projection.select_rows(&keep);
        &reduced
    };

    if active.rows() == 0 {
        params.add_chi_square(0.0, rows);
        params.add_reduction(empty.len());
        return ErrCode::Success;
    }

    let (r_cov, ch_t) = innovation(params, active);
    let Some(cholesky) = r_cov.cholesky() else {
        trace!("innovation covariance is not positive definite");
        return ErrCode::InversionError;
    };
    let r_inv = cholesky.inverse();
    let gain = &ch_t * &r_inv;
    let chi_square = (active.residual.transpose() * &r_inv * &active.residual)[(0, 0)];

    let correction = &gain * &active.residual;
    if !chi_square.is_finite() || correction.iter().any(|v| !v.is_finite()) {
        return ErrCode::DivergingConstraint;
    }

    *params.state_mut() -= correction;
    joseph_update(params, &gain, active);

    params.add_chi_square(chi_square, rows);
    params.add_reduction(empty.len());
    ErrCode::Success
}

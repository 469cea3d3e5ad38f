//! Global fit state
//!
//! [`FitParams`] owns the state vector shared by every node of a decay tree,
//! its covariance, and the chi-square bookkeeping of the most recent filter
//! pass. The dimension is fixed when the decay chain is built.

use nalgebra::{DMatrix, DVector};

/// State vector, covariance and chi-square of one decay-tree fit.
///
/// Cloning deep-copies the vector and matrix; the fit loop relies on this
/// to keep the previous iteration as a linearisation reference.
#[derive(Debug, Clone, PartialEq)]
pub struct FitParams {
    /// Global state vector
    state: DVector<f64>,
    /// Covariance of the state vector
    covariance: DMatrix<f64>,
    /// Chi-square accumulated during the current pass
    chi_square: f64,
    /// Constraint equations applied during the current pass
    n_constraints: usize,
    /// Constraint equations that carried no information
    reduction: usize,
}

impl FitParams {
    /// Creates a zeroed state of the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            state: DVector::zeros(dim),
            covariance: DMatrix::zeros(dim, dim),
            chi_square: 0.0,
            n_constraints: 0,
            reduction: 0,
        }
    }

    /// Number of state components.
    #[inline]
    pub fn dim(&self) -> usize {
        self.state.len()
    }

    #[inline]
    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut DVector<f64> {
        &mut self.state
    }

    #[inline]
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    #[inline]
    pub fn covariance_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.covariance
    }

    /// Chi-square of the most recent filter pass.
    #[inline]
    pub fn chi_square(&self) -> f64 {
        self.chi_square
    }

    /// Number of constraint equations applied in the most recent pass.
    #[inline]
    pub fn n_constraints(&self) -> usize {
        self.n_constraints
    }

    /// Constraint equations that were applied but carried no information.
    #[inline]
    pub fn reduction(&self) -> usize {
        self.reduction
    }

    /// Degrees of freedom: constraints - state components - reduction.
    ///
    /// May be negative for an under-constrained tree.
    #[inline]
    pub fn n_dof(&self) -> i64 {
        self.n_constraints as i64 - self.dim() as i64 - self.reduction as i64
    }

    /// Adds the result of one constraint update.
    #[inline]
    pub fn add_chi_square(&mut self, chi_square: f64, n_constraints: usize) {
        self.chi_square += chi_square;
        self.n_constraints += n_constraints;
    }

    /// Counts constraint equations dropped from an update.
    #[inline]
    pub fn add_reduction(&mut self, n: usize) {
        self.reduction += n;
    }

    /// Zeroes the reduction counter.
    #[inline]
    pub fn reset_reduction(&mut self) {
        self.reduction = 0;
    }

    /// Zeroes the chi-square and the constraint counter.
    #[inline]
    pub fn reset_chi_square(&mut self) {
        self.chi_square = 0.0;
        self.n_constraints = 0;
    }

    /// Zeroes the covariance.
    #[inline]
    pub fn reset_covariance(&mut self) {
        self.covariance.fill(0.0);
    }

    /// Returns false if the covariance is not usable: any diagonal element
    /// that is not strictly positive or not finite, or any non-finite entry.
    pub fn test_covariance(&self) -> bool {
        let diagonal_ok = (0..self.dim()).all(|i| {
            let v = self.covariance[(i, i)];
            v.is_finite() && v > 0.0
        });
        diagonal_ok && self.covariance.iter().all(|v| v.is_finite())
    }

    /// Symmetrises the covariance in place.
    pub fn symmetrize_covariance(&mut self) {
        let n = self.dim();
        for row in 0..n {
            for col in 0..row {
                let avg = 0.5 * (self.covariance[(row, col)] + self.covariance[(col, row)]);
                self.covariance[(row, col)] = avg;
                self.covariance[(col, row)] = avg;
            }
        }
    }
}

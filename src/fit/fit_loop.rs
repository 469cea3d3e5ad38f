//! Iteration and convergence control
//!
//! The fit is an iterated extended Kalman filter: every pass re-linearises
//! all constraints and runs them through the filter again. [`FitLoop`] owns
//! the decision of when to stop, independently of what is being fitted,
//! through the [`FitModel`] trait.
//!
//! Per pass, with delta = chi2 - previous chi2:
//! - a failing [`ErrCode`] from the pass ends the fit as `Failed`;
//! - from the second pass on, |delta| below the precision is `Success`;
//! - from the third pass on, delta above max(3 ndof, 3 previous chi2) is a
//!   fast divergence and ends the fit as `Failed`;
//! - `max_diverging` increases in a row without an intervening decrease is
//!   a slow divergence and ends the fit as `NonConverged`.
//!
//! Running out of passes is `NonConverged`. A converged fit with negative
//! ndof is underconstrained and ends as `Failed`, as does any outcome whose
//! covariance fails [`FitParams::test_covariance`].

use log::debug;

use super::config::FitConfig;
use super::params::FitParams;
use crate::types::{ErrCode, VertexStatus};

/// Something the fit loop can drive.
pub trait FitModel {
    /// Dimension of the state vector.
    fn dim(&self) -> usize;

    /// Writes a starting point into `params`.
    fn initialize(&self, params: &mut FitParams) -> ErrCode;

    /// One filter pass linearised at the running state.
    fn filter(&self, params: &mut FitParams) -> ErrCode;

    /// One filter pass linearised at `reference` while updating `params`.
    fn filter_with_reference(&self, params: &mut FitParams, reference: &FitParams) -> ErrCode;
}

/// Result of one run of the fit loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOutcome {
    /// Terminal status
    pub status: VertexStatus,
    /// Worst code seen by the final pass, or the reason for stopping
    pub err_code: ErrCode,
    /// Chi-square of the last pass, -1 when no pass ran
    pub chi_square: f64,
    /// Degrees of freedom of the last pass
    pub n_dof: i64,
    /// Number of filter passes run
    pub iterations: usize,
}

impl FitOutcome {
    fn bad_input(err_code: ErrCode) -> Self {
        Self {
            status: VertexStatus::BadInput,
            err_code,
            chi_square: -1.0,
            n_dof: 0,
            iterations: 0,
        }
    }
}

/// Convergence settings of the iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitLoop {
    /// Convergence threshold on the chi-square change
    pub precision: f64,
    /// Maximum number of passes
    pub max_iterations: usize,
    /// Consecutive chi-square increases before the fit is abandoned
    pub max_diverging: usize,
}

impl Default for FitLoop {
    fn default() -> Self {
        Self {
            precision: 0.01,
            max_iterations: 10,
            max_diverging: 3,
        }
    }
}

impl FitLoop {
    pub fn new(precision: f64) -> Self {
        Self {
            precision,
            ..Self::default()
        }
    }

    /// Takes the iteration settings of a fit configuration.
    pub fn from_config(config: &FitConfig) -> Self {
        Self {
            precision: config.precision,
            max_iterations: config.max_iterations,
            max_diverging: config.max_diverging,
        }
    }

    /// Runs the fit.
    ///
    /// With `initialize` set the model seeds `params` first and a failing
    /// seed ends the fit as `BadInput`; otherwise the current contents of
    /// `params` are the starting point.
    pub fn run<M: FitModel + ?Sized>(&self, model: &M, params: &mut FitParams, initialize: bool) -> FitOutcome {
        if initialize {
            let err_code = model.initialize(params);
            if err_code.is_failure() {
                debug!("initialisation failed: {}", err_code);
                return FitOutcome::bad_input(err_code);
            }
        }

        let mut status = VertexStatus::UnFitted;
        let mut err_code = ErrCode::Success;
        let mut chi_square = -1.0;
        let mut n_dof = 0;
        let mut n_diverging = 0;
        let mut iterations = 0;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;
            params.reset_reduction();
            err_code = if iteration == 0 {
                model.filter(params)
            } else {
                let reference = params.clone();
                model.filter_with_reference(params, &reference)
            };

            n_dof = params.n_dof();
            let previous = chi_square;
            chi_square = params.chi_square();
            let delta = chi_square - previous;
            debug!(
                "iteration {}: chi2 {:.6} delta {:.6} ndof {} ({})",
                iteration, chi_square, delta, n_dof, err_code
            );

            if err_code.is_failure() {
                status = VertexStatus::Failed;
                break;
            }
            if iteration > 0 {
                let quit = (3.0 * n_dof as f64).max(3.0 * previous);
                if delta.abs() < self.precision {
                    status = VertexStatus::Success;
                    break;
                } else if iteration > 1 && delta > quit {
                    status = VertexStatus::Failed;
                    err_code = ErrCode::FastDivergingFit;
                    break;
                } else if delta > 0.0 {
                    n_diverging += 1;
                    if n_diverging >= self.max_diverging {
                        status = VertexStatus::NonConverged;
                        err_code = ErrCode::SlowDivergingFit;
                        break;
                    }
                }
            }
            if delta < 0.0 {
                n_diverging = 0;
            }
        }

        if status == VertexStatus::UnFitted {
            status = VertexStatus::NonConverged;
        }
        if status == VertexStatus::Success && n_dof < 0 {
            debug!("underconstrained tree: {} degrees of freedom", n_dof);
            status = VertexStatus::Failed;
        }
        if !params.test_covariance() {
            debug!("covariance failed the sanity check");
            status = VertexStatus::Failed;
        }
        debug!("fit finished after {} passes: {}", iterations, status);

        FitOutcome {
            status,
            err_code,
            chi_square,
            n_dof,
            iterations,
        }
    }
}

//! Fit status codes
//!
//! Every graph-wide operation of the fitter (`initialize`, `filter`,
//! `filter_with_reference`) reports one [`ErrCode`]: the most severe code
//! returned by any node or constraint visited during the pass.

use ::core::ops::{BitOr, BitOrAssign};

/// Status of a fit operation, ordered by severity.
///
/// Composition with `|` keeps the more severe of the two codes, so a pass
/// can start from [`ErrCode::Success`] and fold in each node's result:
///
/// ```
/// use treefit::types::ErrCode;
///
/// let mut status = ErrCode::Success;
/// status |= ErrCode::SlowDivergingFit;
/// status |= ErrCode::InversionError;
/// status |= ErrCode::Success;
/// assert_eq!(status, ErrCode::InversionError);
/// assert!(status.is_failure());
/// ```
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrCode {
    /// Nothing went wrong.
    #[default]
    #[error("success")]
    Success,
    /// Chi-square kept growing for several consecutive iterations.
    #[error("slowly diverging fit")]
    SlowDivergingFit,
    /// No point of closest approach could be computed for a seed vertex.
    #[error("point of closest approach failed")]
    PocaFailure,
    /// Seed tracks are too far apart to share a vertex.
    #[error("tracks too far apart for a common vertex")]
    BadDistance,
    /// A residual covariance could not be inverted.
    #[error("matrix inversion failed")]
    InversionError,
    /// A node cannot be linearised at the current state (zero momentum, NaN).
    #[error("bad setup or undefined linearisation")]
    BadSetup,
    /// A constraint produced a non-finite update.
    #[error("diverging constraint")]
    DivergingConstraint,
    /// Chi-square jumped by more than the divergence threshold.
    #[error("fast diverging fit")]
    FastDivergingFit,
    /// The filter pass itself could not be run.
    #[error("filter error")]
    FilterError,
}

impl ErrCode {
    /// Returns true for codes that abort a fit.
    ///
    /// [`ErrCode::SlowDivergingFit`] is a warning: the fit ends as
    /// non-converged rather than failed.
    #[inline]
    pub fn is_failure(self) -> bool {
        self > ErrCode::SlowDivergingFit
    }
}

impl BitOr for ErrCode {
    type Output = ErrCode;

    #[inline]
    fn bitor(self, rhs: ErrCode) -> ErrCode {
        self.max(rhs)
    }
}

impl BitOrAssign for ErrCode {
    #[inline]
    fn bitor_assign(&mut self, rhs: ErrCode) {
        *self = *self | rhs;
    }
}

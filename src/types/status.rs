// ============================================================================
// Fit Outcome
// ============================================================================

/// Outcome of a decay-tree fit.
///
/// A fit starts [`VertexStatus::UnFitted`] and ends in exactly one of the
/// other states. All terminal states stay until `fit()` is called again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VertexStatus {
    /// Not fitted yet, or iterating.
    #[default]
    UnFitted,
    /// Converged and the covariance passed its sanity check.
    Success,
    /// A filter pass failed, the fit diverged fast, or the covariance is broken.
    Failed,
    /// Ran out of iterations or diverged slowly; results may still be usable.
    NonConverged,
    /// No sensible seed could be built from the input.
    BadInput,
}

impl ::core::fmt::Display for VertexStatus {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        match self {
            VertexStatus::UnFitted => write!(f, "UnFitted"),
            VertexStatus::Success => write!(f, "Success"),
            VertexStatus::Failed => write!(f, "Failed"),
            VertexStatus::NonConverged => write!(f, "NonConverged"),
            VertexStatus::BadInput => write!(f, "BadInput"),
        }
    }
}

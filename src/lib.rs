//! TreeFit: global decay-tree vertex fitting
//!
//! Fits a whole particle decay tree at once. Every vertex position,
//! momentum and flight length of the tree lives in one state vector that
//! is refined by an iterated extended Kalman filter over track, photon,
//! kinematic, geometric and mass constraints.
//!
//! # Features
//!
//! - **Whole-tree fits**: all vertices and momenta are fitted jointly with
//!   their full correlations
//! - **Mass constraints**: nominal masses for resonances or any listed species
//! - **Origin constraints**: beam spot or a custom production vertex
//! - **Flight information**: decay length and lifetime with uncertainties
//!
//! # Example
//!
//! ```no_run
//! use treefit::prelude::*;
//! # fn candidate() -> Particle { unimplemented!() }
//!
//! let config = FitConfig::new(0.01).with_mass_constraints([443]);
//! let mut manager = FitManager::new(candidate(), config)?;
//! manager.fit();
//! println!("{} chi2 {:.2} / {}", manager.status(), manager.chi_square(), manager.n_dof());
//! # Ok::<(), treefit::Error>(())
//! ```

pub mod fit;
pub mod types;

pub mod prelude {
    pub use crate::fit::{FitConfig, FitManager, MassConstraintType};
    pub use crate::types::*;
    pub use crate::{Error, Result};
}

use types::ParticleId;

/// Errors raised while setting up a fit.
///
/// Problems found during the fit itself are reported through
/// [`types::ErrCode`] and [`types::VertexStatus`] instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The candidate has no daughters to fit
    #[error("{name} has no daughters")]
    EmptyDecay { name: String },

    /// An internal particle has neither daughters nor a measurement
    #[error("{name} has neither daughters nor a measurement")]
    MissingMeasurement { name: String },

    /// The origin covariance is not positive definite
    #[error("origin covariance is not positive definite")]
    InvalidOrigin,

    /// The same particle appears twice in the tree
    #[error("particle {0:?} appears twice in the decay tree")]
    DuplicateParticle(ParticleId),
}

pub type Result<T> = ::core::result::Result<T, Error>;

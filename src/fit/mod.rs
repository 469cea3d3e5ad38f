//! Decay-tree fitting
//!
//! The candidate is translated into a [`DecayChain`] of fit nodes sharing
//! one global state vector ([`FitParams`]). Each node contributes
//! constraints; [`FitLoop`] iterates Kalman passes over them until the
//! chi-square settles, and [`FitManager`] writes the result back.
//!
//! # Building blocks
//!
//! - [`particle_base`]: node kinds, parameter layout, seeding and projections
//! - [`constraint`]: constraint kinds and their filter order
//! - [`projection`]: linearised constraints and the Kalman update
//! - [`fit_loop`]: convergence control
//! - [`manager`]: orchestration and result export

pub mod config;
pub mod constraint;
pub mod decay_chain;
pub mod fit_loop;
pub mod manager;
pub mod params;
pub mod particle_base;
pub mod projection;

pub use config::{CustomOrigin, FitConfig, MassConstraintType};
pub use constraint::{Constraint, ConstraintKind};
pub use decay_chain::DecayChain;
pub use fit_loop::{FitLoop, FitModel, FitOutcome};
pub use manager::{FitManager, UNDEFINED};
pub use params::FitParams;
pub use particle_base::{NodeId, ParticleBase, ParticleKind};
pub use projection::{kalman_update, Projection};

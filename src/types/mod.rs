//! Value types shared by the fitter and its callers

pub mod err_code;
pub mod helix;
pub mod kinematics;
pub mod particle;
pub mod pdg;
pub mod status;

pub use err_code::ErrCode;
pub use helix::{Helix, TrackFitResult};
pub use kinematics::{FourMomentum, Matrix3, Matrix5, Matrix7, Vector3};
pub use particle::{Cluster, Particle, ParticleId, ParticleSource};
pub use status::VertexStatus;

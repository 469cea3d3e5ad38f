//! Fixed-size kinematic vectors and matrices
//!
//! Aliases over nalgebra's static types for the small blocks the fitter
//! moves between the external particle model and the global state vector.
//! Four-momenta are ordered (px, py, pz, E); momentum-vertex matrices are
//! ordered (px, py, pz, E, x, y, z).

use nalgebra::{SMatrix, SVector};

/// A 3-vector (position or 3-momentum).
pub type Vector3 = SVector<f64, 3>;

/// A four-momentum (px, py, pz, E).
pub type FourMomentum = SVector<f64, 4>;

/// A 3x3 matrix.
pub type Matrix3 = SMatrix<f64, 3, 3>;

/// A 5x5 matrix (helix covariance).
pub type Matrix5 = SMatrix<f64, 5, 5>;

/// A 7x7 momentum-vertex matrix in (px, py, pz, E, x, y, z) order.
pub type Matrix7 = SMatrix<f64, 7, 7>;

/// Energy of a particle with 3-momentum `p` and mass `mass`.
#[inline]
pub fn energy(p: &Vector3, mass: f64) -> f64 {
    (p.norm_squared() + mass * mass).sqrt()
}

/// Builds a four-momentum from a 3-momentum and a mass.
#[inline]
pub fn four_momentum(p: &Vector3, mass: f64) -> FourMomentum {
    FourMomentum::new(p.x, p.y, p.z, energy(p, mass))
}

/// Invariant mass of a four-momentum; negative mass-squared maps to
/// a negative value so off-shell inputs stay visible.
#[inline]
pub fn invariant_mass(p4: &FourMomentum) -> f64 {
    let m2 = p4[3] * p4[3] - p4.fixed_rows::<3>(0).norm_squared();
    if m2 >= 0.0 {
        m2.sqrt()
    } else {
        -(-m2).sqrt()
    }
}

/// Symmetrises a square matrix in place: A = (A + A^T) / 2.
#[inline]
pub fn symmetrize<const N: usize>(m: &mut SMatrix<f64, N, N>) {
    let t = m.transpose();
    *m = (&*m + t) * 0.5;
}

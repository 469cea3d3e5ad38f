//! Perigee helix track model
//!
//! A charged particle in a uniform magnetic field along z moves on a helix.
//! Tracks are described by their perigee parameters with respect to the
//! origin:
//!
//! | index | name        | meaning                                         |
//! |-------|-------------|-------------------------------------------------|
//! | 0     | `d0`        | signed transverse distance of the perigee       |
//! | 1     | `phi0`      | azimuth of the momentum at the perigee          |
//! | 2     | `omega`     | signed curvature, positive bends anticlockwise  |
//! | 3     | `z0`        | z of the perigee                                |
//! | 4     | `tan_lambda`| p_z / p_T                                       |
//!
//! The perigee point is (-d0 sin phi0, d0 cos phi0, z0). The field enters
//! only through the curvature, omega = -q * c * B / p_T; at zero field the
//! helix degenerates into a straight line with omega = 0.

use ::core::f64::consts::PI;

use nalgebra::{SMatrix, SVector};

use super::kinematics::{Matrix5, Vector3};
use super::pdg::CURVATURE_CONSTANT;

/// Helix parameters as a 5-vector.
pub type HelixVector = SVector<f64, 5>;

/// Jacobian of the helix parameters with respect to (x, y, z, px, py, pz).
pub type HelixJacobian = SMatrix<f64, 5, 6>;

/// Index of the azimuth among the helix parameters.
pub const PHI0_INDEX: usize = 1;

/// Wraps an angle into (-pi, pi].
#[inline]
pub fn wrap_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

/// Perigee parameters of a helical track.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Helix {
    /// Signed transverse impact parameter (cm)
    pub d0: f64,
    /// Azimuth of the momentum at the perigee
    pub phi0: f64,
    /// Signed curvature (1/cm)
    pub omega: f64,
    /// Longitudinal impact parameter (cm)
    pub z0: f64,
    /// Dip angle tangent
    pub tan_lambda: f64,
}

impl Helix {
    /// Creates a helix from its five perigee parameters.
    pub fn new(d0: f64, phi0: f64, omega: f64, z0: f64, tan_lambda: f64) -> Self {
        Self {
            d0,
            phi0,
            omega,
            z0,
            tan_lambda,
        }
    }

    /// Computes the helix passing through `position` with `momentum` there.
    ///
    /// Returns `None` when the transverse momentum vanishes, since the
    /// azimuth and dip are then undefined.
    pub fn from_cartesian(
        position: &Vector3,
        momentum: &Vector3,
        charge: f64,
        b_field: f64,
    ) -> Option<Self> {
        let pt = momentum.x.hypot(momentum.y);
        if pt <= 0.0 || !pt.is_finite() {
            return None;
        }
        let (x, y, z) = (position.x, position.y, position.z);
        let phi = momentum.y.atan2(momentum.x);
        let (sin_phi, cos_phi) = phi.sin_cos();
        let omega = -charge * CURVATURE_CONSTANT * b_field / pt;

        // Centre of the circle scaled by omega: (A, B) = omega * (xc, yc)
        let a = omega * x - sin_phi;
        let b = omega * y + cos_phi;
        let d = a.hypot(b);

        let phi0 = (-a).atan2(b);
        // d0 = (D - 1) / omega, written without cancellation at small omega
        let d0 = (omega * (x * x + y * y) + 2.0 * (y * cos_phi - x * sin_phi)) / (d + 1.0);

        // Signed transverse arc length from the point to the perigee
        let along = -(x * cos_phi + y * sin_phi);
        let across = 1.0 + omega * (y * cos_phi - x * sin_phi);
        let s = if omega.abs() < 1e-12 {
            along / across
        } else {
            (omega * along).atan2(across) / omega
        };

        let tan_lambda = momentum.z / pt;
        let z0 = z + s * tan_lambda;

        Some(Self {
            d0,
            phi0,
            omega,
            z0,
            tan_lambda,
        })
    }

    /// Returns the parameters as a 5-vector.
    #[inline]
    pub fn to_vector(&self) -> HelixVector {
        HelixVector::new(self.d0, self.phi0, self.omega, self.z0, self.tan_lambda)
    }

    /// Builds a helix from a 5-vector.
    #[inline]
    pub fn from_vector(v: &HelixVector) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4])
    }

    /// Point of closest approach to the z axis.
    #[inline]
    pub fn perigee(&self) -> Vector3 {
        let (sin_phi0, cos_phi0) = self.phi0.sin_cos();
        Vector3::new(-self.d0 * sin_phi0, self.d0 * cos_phi0, self.z0)
    }

    /// Momentum at the perigee.
    ///
    /// Returns `None` for a straight track (zero curvature or field), whose
    /// momentum magnitude the helix does not carry.
    pub fn momentum(&self, charge: f64, b_field: f64) -> Option<Vector3> {
        if self.omega == 0.0 {
            return None;
        }
        let pt = (charge * CURVATURE_CONSTANT * b_field / self.omega).abs();
        if pt == 0.0 || !pt.is_finite() {
            return None;
        }
        let (sin_phi0, cos_phi0) = self.phi0.sin_cos();
        Some(Vector3::new(
            pt * cos_phi0,
            pt * sin_phi0,
            pt * self.tan_lambda,
        ))
    }

    /// Difference `self - other` with the azimuth wrapped into (-pi, pi].
    pub fn residual(&self, other: &Helix) -> HelixVector {
        let mut r = self.to_vector() - other.to_vector();
        r[PHI0_INDEX] = wrap_angle(r[PHI0_INDEX]);
        r
    }

    /// Jacobian of [`Helix::from_cartesian`] with respect to the position and
    /// momentum, by central differences.
    pub fn jacobian(
        position: &Vector3,
        momentum: &Vector3,
        charge: f64,
        b_field: f64,
    ) -> Option<HelixJacobian> {
        let mut jac = HelixJacobian::zeros();
        for col in 0..6 {
            let (mut pos_hi, mut mom_hi) = (*position, *momentum);
            let (mut pos_lo, mut mom_lo) = (*position, *momentum);
            let value = if col < 3 { position[col] } else { momentum[col - 3] };
            let step = 1e-6 * value.abs().max(1.0);
            if col < 3 {
                pos_hi[col] += step;
                pos_lo[col] -= step;
            } else {
                mom_hi[col - 3] += step;
                mom_lo[col - 3] -= step;
            }
            let hi = Helix::from_cartesian(&pos_hi, &mom_hi, charge, b_field)?;
            let lo = Helix::from_cartesian(&pos_lo, &mom_lo, charge, b_field)?;
            let derivative = hi.residual(&lo) / (2.0 * step);
            jac.set_column(col, &derivative);
        }
        Some(jac)
    }
}

/// Result of a track fit: a helix and its covariance.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackFitResult {
    /// Fitted perigee parameters
    pub helix: Helix,
    /// Covariance of (d0, phi0, omega, z0, tan_lambda)
    pub covariance: Matrix5,
}

impl TrackFitResult {
    /// Creates a track fit result.
    pub fn new(helix: Helix, covariance: Matrix5) -> Self {
        Self { helix, covariance }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle(2.0 * PI + 0.3), 0.3, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(PI + 0.5), -PI + 0.5, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(-PI), PI, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(0.5), 0.5);
        assert_relative_eq!(wrap_angle(-2.0 * PI + 0.1), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_straight_line_limit() {
        let pos = Vector3::new(1.0, 2.0, 3.0);
        let mom = Vector3::new(1.0, 0.0, 0.5);
        let helix = Helix::from_cartesian(&pos, &mom, 1.0, 0.0).unwrap();

        // Line along x through y = 2: perigee at (0, 2)
        assert_relative_eq!(helix.omega, 0.0);
        assert_relative_eq!(helix.phi0, 0.0, epsilon = 1e-12);
        assert_relative_eq!(helix.d0, 2.0, epsilon = 1e-12);
        assert_relative_eq!(helix.z0, 3.0 - 0.5, epsilon = 1e-12);
        assert_relative_eq!(helix.tan_lambda, 0.5);
        let perigee = helix.perigee();
        assert_relative_eq!(perigee.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(perigee.y, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_prompt_track_has_zero_impact_parameter() {
        let origin = Vector3::zeros();
        let mom = Vector3::new(0.8, -0.6, 0.3);
        let helix = Helix::from_cartesian(&origin, &mom, -1.0, 1.5).unwrap();
        assert_relative_eq!(helix.d0, 0.0, epsilon = 1e-12);
        assert_relative_eq!(helix.z0, 0.0, epsilon = 1e-12);
        assert_relative_eq!(helix.phi0, (-0.6_f64).atan2(0.8), epsilon = 1e-12);

        let back = helix.momentum(-1.0, 1.5).unwrap();
        assert_relative_eq!(back, mom, epsilon = 1e-10);
    }

    #[test]
    fn test_curvature_sign() {
        let origin = Vector3::zeros();
        let mom = Vector3::new(1.0, 0.0, 0.0);
        let positive = Helix::from_cartesian(&origin, &mom, 1.0, 1.5).unwrap();
        let negative = Helix::from_cartesian(&origin, &mom, -1.0, 1.5).unwrap();
        // Positive charges bend clockwise in a field along +z
        assert!(positive.omega < 0.0);
        assert!(negative.omega > 0.0);
        assert_relative_eq!(positive.omega, -negative.omega);
    }

    #[test]
    fn test_helix_is_invariant_along_trajectory() {
        // Move a point along the circle and check the perigee is unchanged
        let charge = 1.0;
        let b = 1.5;
        let pos = Vector3::new(0.1, -0.05, 0.2);
        let mom = Vector3::new(0.4, 0.3, 0.2);
        let helix = Helix::from_cartesian(&pos, &mom, charge, b).unwrap();

        let pt = mom.x.hypot(mom.y);
        let omega = helix.omega;
        let phi = mom.y.atan2(mom.x);
        let s = 3.0;
        let moved_pos = Vector3::new(
            pos.x + ((phi + omega * s).sin() - phi.sin()) / omega,
            pos.y - ((phi + omega * s).cos() - phi.cos()) / omega,
            pos.z + s * mom.z / pt,
        );
        let moved_mom = Vector3::new(pt * (phi + omega * s).cos(), pt * (phi + omega * s).sin(), mom.z);
        let moved = Helix::from_cartesian(&moved_pos, &moved_mom, charge, b).unwrap();

        assert_relative_eq!(moved.d0, helix.d0, epsilon = 1e-9);
        assert_relative_eq!(wrap_angle(moved.phi0 - helix.phi0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(moved.omega, helix.omega, epsilon = 1e-12);
        assert_relative_eq!(moved.z0, helix.z0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_transverse_momentum_is_rejected() {
        let origin = Vector3::zeros();
        let mom = Vector3::new(0.0, 0.0, 1.0);
        assert!(Helix::from_cartesian(&origin, &mom, 1.0, 1.5).is_none());
        assert!(Helix::jacobian(&origin, &mom, 1.0, 1.5).is_none());
    }

    #[test]
    fn test_jacobian_matches_straight_line_derivatives() {
        let pos = Vector3::new(0.0, 1.0, 0.0);
        let mom = Vector3::new(2.0, 0.0, 1.0);
        let jac = Helix::jacobian(&pos, &mom, 1.0, 0.0).unwrap();
        // d0 = y cos(phi) - x sin(phi) with phi = 0
        assert_relative_eq!(jac[(0, 1)], 1.0, epsilon = 1e-6);
        // z0 = z - (x cos phi + y sin phi) tan(lambda)
        assert_relative_eq!(jac[(3, 0)], -0.5, epsilon = 1e-6);
        assert_relative_eq!(jac[(3, 2)], 1.0, epsilon = 1e-6);
        // tan(lambda) = pz / pt
        assert_relative_eq!(jac[(4, 5)], 0.5, epsilon = 1e-6);
        assert_relative_eq!(jac[(4, 3)], -0.25, epsilon = 1e-6);
    }
}

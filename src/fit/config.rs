//! Fit configuration
//!
//! Everything that tunes a decay-tree fit lives in [`FitConfig`]: the
//! convergence precision, which external constraints apply, the magnetic
//! field used to interpret track helices, and the iteration guards.

use crate::types::{Matrix3, Vector3};

/// A caller-supplied production vertex with its covariance, used in place
/// of the beam spot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CustomOrigin {
    /// Vertex position (cm)
    pub vertex: Vector3,
    /// Vertex covariance (cm^2); must be positive definite
    pub covariance: Matrix3,
}

impl CustomOrigin {
    /// Creates a custom origin.
    pub fn new(vertex: Vector3, covariance: Matrix3) -> Self {
        Self { vertex, covariance }
    }
}

/// How a mass constraint is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MassConstraintType {
    /// On the particle's own four-momentum: E^2 - p^2 - m^2 = 0.
    #[default]
    Particle,
    /// On the summed four-momenta of its daughters, so the constraint also
    /// acts directly on the daughter momenta.
    Daughters,
}

/// Configuration of a [`FitManager`](crate::fit::FitManager).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FitConfig {
    /// Convergence threshold on the chi-square change between passes
    pub precision: f64,
    /// Constrain the head's production vertex to the beam spot
    pub ip_constraint: bool,
    /// Use this vertex instead of the beam spot as the production vertex
    pub custom_origin: Option<CustomOrigin>,
    /// Write fitted momenta and covariances into every daughter, not just the head
    pub update_daughters: bool,
    /// Beam spot position (cm)
    pub beam_spot: Vector3,
    /// Beam spot covariance (cm^2)
    pub beam_spot_covariance: Matrix3,
    /// Solenoid field along z (T)
    pub b_field: f64,
    /// PDG codes (either sign) that receive a mass constraint
    pub mass_constraint_list: Vec<i32>,
    /// PDG codes (either sign) whose decay vertex is their production vertex
    pub fixed_to_mother_vertex_list: Vec<i32>,
    /// Mass constraint formulation
    pub mass_constraint_type: MassConstraintType,
    /// Maximum number of filter passes
    pub max_iterations: usize,
    /// Consecutive chi-square increases tolerated before giving up
    pub max_diverging: usize,
    /// Largest distance (cm) between two seed tracks that still seeds a vertex
    pub max_seed_distance: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            precision: 0.01,
            ip_constraint: false,
            custom_origin: None,
            update_daughters: false,
            beam_spot: Vector3::zeros(),
            beam_spot_covariance: Matrix3::from_diagonal(&Vector3::new(1e-4, 1e-4, 2.5e-3)),
            b_field: 1.5,
            mass_constraint_list: Vec::new(),
            fixed_to_mother_vertex_list: Vec::new(),
            mass_constraint_type: MassConstraintType::Particle,
            max_iterations: 10,
            max_diverging: 3,
            max_seed_distance: 10.0,
        }
    }
}

impl FitConfig {
    /// Creates a default configuration with the given convergence precision.
    pub fn new(precision: f64) -> Self {
        Self {
            precision,
            ..Self::default()
        }
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_ip_constraint(mut self, ip_constraint: bool) -> Self {
        self.ip_constraint = ip_constraint;
        self
    }

    /// Replaces the beam spot by a custom production vertex.
    pub fn with_custom_origin(mut self, vertex: Vector3, covariance: Matrix3) -> Self {
        self.custom_origin = Some(CustomOrigin::new(vertex, covariance));
        self
    }

    pub fn with_update_daughters(mut self, update_daughters: bool) -> Self {
        self.update_daughters = update_daughters;
        self
    }

    pub fn with_beam_spot(mut self, position: Vector3, covariance: Matrix3) -> Self {
        self.beam_spot = position;
        self.beam_spot_covariance = covariance;
        self
    }

    pub fn with_b_field(mut self, b_field: f64) -> Self {
        self.b_field = b_field;
        self
    }

    pub fn with_mass_constraints(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.mass_constraint_list.extend(codes);
        self
    }

    pub fn with_fixed_to_mother_vertex(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.fixed_to_mother_vertex_list.extend(codes);
        self
    }

    pub fn with_mass_constraint_type(mut self, kind: MassConstraintType) -> Self {
        self.mass_constraint_type = kind;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_seed_distance(mut self, distance: f64) -> Self {
        self.max_seed_distance = distance;
        self
    }

    /// True when the tree gets an origin node.
    pub fn has_origin(&self) -> bool {
        self.ip_constraint || self.custom_origin.is_some()
    }

    /// Position and covariance of the production vertex of the head.
    pub fn origin(&self) -> (Vector3, Matrix3) {
        match &self.custom_origin {
            Some(custom) => (custom.vertex, custom.covariance),
            None => (self.beam_spot, self.beam_spot_covariance),
        }
    }

    /// True when `pdg_code` (either sign) requests a mass constraint.
    pub fn is_mass_constrained(&self, pdg_code: i32) -> bool {
        contains_abs(&self.mass_constraint_list, pdg_code)
    }

    /// True when `pdg_code` (either sign) shares its mother's vertex.
    pub fn is_fixed_to_mother_vertex(&self, pdg_code: i32) -> bool {
        contains_abs(&self.fixed_to_mother_vertex_list, pdg_code)
    }
}

fn contains_abs(list: &[i32], pdg_code: i32) -> bool {
    list.iter().any(|c| c.unsigned_abs() == pdg_code.unsigned_abs())
}

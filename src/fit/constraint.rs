//! Constraint kinds and the filter schedule
//!
//! Every node of the decay chain contributes one or more constraints. They
//! are collected once when the chain is built and sorted into a fixed
//! schedule: deepest nodes first, and within one depth measurements before
//! origin, kinematic, geometric and mass constraints. Final-state
//! measurements are therefore applied before the momentum sums that use
//! them, and a resonance's kinematic constraint precedes its mass
//! constraint.

use ::core::cmp::Reverse;
use ::core::fmt;

use super::particle_base::NodeId;

/// What a constraint ties together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintKind {
    /// Track helix measurement (5 rows)
    Track,
    /// Calorimeter energy and direction (3 rows)
    Photon,
    /// Pre-fitted four-momentum and vertex (7 rows)
    Measured,
    /// Beam spot or custom production vertex (3 rows)
    Origin,
    /// Four-momentum conservation at a vertex (4 rows)
    Kinematic,
    /// Decay vertex on the flight line from the production vertex (3 rows)
    Geometric,
    /// Invariant mass fixed to the nominal value (1 row)
    Mass,
}

impl ConstraintKind {
    /// Position within one depth of the schedule.
    pub fn rank(self) -> u8 {
        match self {
            ConstraintKind::Track | ConstraintKind::Photon | ConstraintKind::Measured => 0,
            ConstraintKind::Origin => 1,
            ConstraintKind::Kinematic => 2,
            ConstraintKind::Geometric => 3,
            ConstraintKind::Mass => 4,
        }
    }

    /// Number of constraint equations.
    pub fn dim(self) -> usize {
        match self {
            ConstraintKind::Track => 5,
            ConstraintKind::Photon => 3,
            ConstraintKind::Measured => 7,
            ConstraintKind::Origin => 3,
            ConstraintKind::Kinematic => 4,
            ConstraintKind::Geometric => 3,
            ConstraintKind::Mass => 1,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Track => "track",
            ConstraintKind::Photon => "photon",
            ConstraintKind::Measured => "measured",
            ConstraintKind::Origin => "origin",
            ConstraintKind::Kinematic => "kinematic",
            ConstraintKind::Geometric => "geometric",
            ConstraintKind::Mass => "mass",
        };
        f.write_str(name)
    }
}

/// One scheduled constraint of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    /// Node the constraint belongs to
    pub node: NodeId,
    /// Kind of constraint
    pub kind: ConstraintKind,
    /// Depth of the node in the tree (root = 0)
    pub depth: usize,
}

impl Constraint {
    pub fn new(node: NodeId, kind: ConstraintKind, depth: usize) -> Self {
        Self { node, kind, depth }
    }

    /// Number of constraint equations.
    #[inline]
    pub fn dim(&self) -> usize {
        self.kind.dim()
    }

    /// Sort key of the filter schedule. Constraints of different nodes at
    /// the same depth and rank share a key, so a stable sort keeps their
    /// collection order.
    pub fn schedule_key(&self) -> (Reverse<usize>, u8) {
        (Reverse(self.depth), self.kind.rank())
    }
}

/// Sorts constraints into filter order.
pub fn schedule(constraints: &mut [Constraint]) {
    constraints.sort_by_key(Constraint::schedule_key);
}

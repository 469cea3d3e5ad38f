//! Decay-tree nodes
//!
//! A [`ParticleBase`] is one node of the fit tree. Its [`ParticleKind`]
//! decides which block of the global state vector it owns and which
//! constraints it contributes:
//!
//! | kind                | block                         | constraints                       |
//! |---------------------|-------------------------------|-----------------------------------|
//! | `Origin`            | x, y, z                       | origin                            |
//! | `Composite`         | x, y, z, [tau], px, py, pz, E | kinematic, [geometric], [mass]    |
//! | `Resonance`         | px, py, pz, E                 | kinematic, [mass]                 |
//! | `Track`             | px, py, pz                    | track                             |
//! | `Photon`            | px, py, pz                    | photon                            |
//! | `MeasuredComposite` | x, y, z, [tau], px, py, pz, E | measured, [geometric], [mass]     |
//!
//! Nodes without a position use the vertex of their nearest ancestor that
//! has one. Tracks and photons carry no energy parameter; their energy is
//! sqrt(p^2 + m^2) with the nominal mass (zero for photons).
//!
//! Nodes live in the arena of a [`DecayChain`](super::DecayChain) and refer
//! to each other by [`NodeId`]; every method that needs a relative takes the
//! arena slice.

use ::core::fmt;

use nalgebra::{DVector, SMatrix};

use super::config::MassConstraintType;
use super::constraint::ConstraintKind;
use super::params::FitParams;
use super::projection::Projection;
use crate::types::helix::Helix;
use crate::types::{Cluster, ErrCode, FourMomentum, Matrix3, Matrix7, ParticleId, TrackFitResult, Vector3};

/// Index of a node in the decay-chain arena.
pub type NodeId = usize;

/// Prior variance of a position component (cm^2).
const POSITION_PRIOR: f64 = 50.0;
/// Prior variance of a momentum or energy component (GeV^2).
const MOMENTUM_PRIOR: f64 = 0.5;
/// Prior variance of a flight length (cm^2).
const TAU_PRIOR: f64 = 1000.0;

/// Node variant together with its measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum ParticleKind {
    /// Production point of the head: beam spot or custom vertex.
    Origin {
        vertex: Vector3,
        covariance: Matrix3,
    },
    /// A decaying particle with its own decay vertex.
    Composite,
    /// A short-lived particle decaying at its production vertex.
    Resonance,
    /// A charged final-state track.
    Track {
        fit: TrackFitResult,
        momentum: Vector3,
        b_field: f64,
    },
    /// A neutral calorimeter cluster.
    Photon { cluster: Cluster },
    /// A pre-fitted candidate used as a measurement.
    MeasuredComposite {
        momentum: FourMomentum,
        vertex: Vector3,
        error_matrix: Matrix7,
    },
}

impl ParticleKind {
    /// Short name of the variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParticleKind::Origin { .. } => "Origin",
            ParticleKind::Composite => "Composite",
            ParticleKind::Resonance => "Resonance",
            ParticleKind::Track { .. } => "Track",
            ParticleKind::Photon { .. } => "Photon",
            ParticleKind::MeasuredComposite { .. } => "MeasuredComposite",
        }
    }
}

impl fmt::Display for ParticleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// One node of the decay tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleBase {
    pub(crate) kind: ParticleKind,
    pub(crate) particle: Option<ParticleId>,
    pub(crate) pdg_code: i32,
    pub(crate) name: String,
    pub(crate) mass: f64,
    pub(crate) charge: f64,
    pub(crate) mother: Option<NodeId>,
    pub(crate) daughters: Vec<NodeId>,
    pub(crate) depth: usize,
    pub(crate) index: usize,
    pub(crate) has_tau: bool,
    pub(crate) mass_constraint: Option<MassConstraintType>,
}

impl ParticleBase {
    pub(crate) fn new(kind: ParticleKind, name: String) -> Self {
        Self {
            kind,
            particle: None,
            pdg_code: 0,
            name,
            mass: 0.0,
            charge: 0.0,
            mother: None,
            daughters: Vec::new(),
            depth: 0,
            index: 0,
            has_tau: false,
            mass_constraint: None,
        }
    }

    pub fn kind(&self) -> &ParticleKind {
        &self.kind
    }

    /// Variant name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity of the external particle, `None` for the origin.
    pub fn particle_id(&self) -> Option<ParticleId> {
        self.particle
    }

    pub fn pdg_code(&self) -> i32 {
        self.pdg_code
    }

    /// Nominal mass used when the energy is not a fit parameter.
    pub fn pdg_mass(&self) -> f64 {
        self.mass
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn mother(&self) -> Option<NodeId> {
        self.mother
    }

    pub fn daughters(&self) -> &[NodeId] {
        &self.daughters
    }

    /// Distance from the root (root = 0).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True when the node owns a vertex position.
    pub fn has_position(&self) -> bool {
        matches!(
            self.kind,
            ParticleKind::Origin { .. } | ParticleKind::Composite | ParticleKind::MeasuredComposite { .. }
        )
    }

    /// True when the energy is an independent fit parameter.
    pub fn has_energy(&self) -> bool {
        matches!(
            self.kind,
            ParticleKind::Composite | ParticleKind::Resonance | ParticleKind::MeasuredComposite { .. }
        )
    }

    /// True when the node owns a flight-length parameter.
    pub fn has_tau(&self) -> bool {
        self.has_tau
    }

    /// Mass constraint formulation, if the node is mass constrained.
    pub fn mass_constraint(&self) -> Option<MassConstraintType> {
        self.mass_constraint
    }

    fn momentum_dim(&self) -> usize {
        match self.kind {
            ParticleKind::Origin { .. } => 0,
            _ if self.has_energy() => 4,
            _ => 3,
        }
    }

    /// Number of state components owned by this node.
    pub fn dim(&self) -> usize {
        let position = if self.has_position() { 3 } else { 0 };
        position + usize::from(self.has_tau) + self.momentum_dim()
    }

    /// Offset of (x, y, z), `None` when the vertex is inherited.
    pub fn pos_index(&self) -> Option<usize> {
        self.has_position().then_some(self.index)
    }

    /// Offset of the flight length, `None` without one.
    pub fn tau_index(&self) -> Option<usize> {
        self.has_tau.then(|| self.index + 3)
    }

    /// Offset of (px, py, pz[, E]), `None` for the origin.
    pub fn mom_index(&self) -> Option<usize> {
        if self.momentum_dim() == 0 {
            return None;
        }
        let position = if self.has_position() { 3 } else { 0 };
        Some(self.index + position + usize::from(self.has_tau))
    }

    /// Constraints this node contributes, in no particular order.
    pub fn constraint_kinds(&self) -> Vec<ConstraintKind> {
        let mut kinds = Vec::with_capacity(3);
        match self.kind {
            ParticleKind::Origin { .. } => kinds.push(ConstraintKind::Origin),
            ParticleKind::Track { .. } => kinds.push(ConstraintKind::Track),
            ParticleKind::Photon { .. } => kinds.push(ConstraintKind::Photon),
            ParticleKind::MeasuredComposite { .. } => kinds.push(ConstraintKind::Measured),
            ParticleKind::Composite | ParticleKind::Resonance => kinds.push(ConstraintKind::Kinematic),
        }
        if self.has_tau {
            kinds.push(ConstraintKind::Geometric);
        }
        if self.mass_constraint.is_some() {
            kinds.push(ConstraintKind::Mass);
        }
        kinds
    }

    /// Writes the prior variances of this node's block onto the diagonal.
    pub fn init_covariance(&self, params: &mut FitParams) {
        let cov = params.covariance_mut();
        if let Some(pos) = self.pos_index() {
            for i in 0..3 {
                cov[(pos + i, pos + i)] = POSITION_PRIOR;
            }
        }
        if let Some(tau) = self.tau_index() {
            cov[(tau, tau)] = TAU_PRIOR;
        }
        if let Some(mom) = self.mom_index() {
            for i in 0..self.momentum_dim() {
                cov[(mom + i, mom + i)] = MOMENTUM_PRIOR;
            }
        }
    }

    /// Seeds the node's own vertex.
    ///
    /// Must run before the daughters are seeded, since they take their
    /// production vertex from here.
    pub fn init_vertex(&self, nodes: &[ParticleBase], params: &mut FitParams, max_seed_distance: f64) -> ErrCode {
        let Some(pos) = self.pos_index() else {
            return ErrCode::Success;
        };
        let (vertex, status) = match &self.kind {
            ParticleKind::Origin { vertex, .. } => (*vertex, ErrCode::Success),
            ParticleKind::MeasuredComposite { vertex, .. } => (*vertex, ErrCode::Success),
            _ => self.seed_vertex(nodes, params.state(), max_seed_distance),
        };
        set_vec3(params.state_mut(), pos, &vertex);
        status
    }

    fn seed_vertex(&self, nodes: &[ParticleBase], state: &DVector<f64>, max_seed_distance: f64) -> (Vector3, ErrCode) {
        let mut tracks = Vec::new();
        collect_vertex_tracks(nodes, &self.daughters, &mut tracks);
        let lines: Vec<(Vector3, Vector3)> = tracks
            .iter()
            .filter_map(|&id| match &nodes[id].kind {
                ParticleKind::Track { fit, .. } if nodes[id].charge != 0.0 => Some(straight_line(&fit.helix)),
                _ => None,
            })
            .take(2)
            .collect();

        match lines.as_slice() {
            [first, second] => match line_poca(first, second) {
                Some((point, distance)) if distance > max_seed_distance => {
                    log::warn!(
                        "{}: seed tracks are {:.3} cm apart (limit {:.3} cm)",
                        self.name,
                        distance,
                        max_seed_distance
                    );
                    (point, ErrCode::BadDistance)
                }
                Some((point, _)) => (point, ErrCode::Success),
                None => ((first.0 + second.0) * 0.5, ErrCode::Success),
            },
            [only] => (only.0, ErrCode::Success),
            _ => {
                let fallback = self
                    .mother
                    .and_then(|m| vertex_index(nodes, m))
                    .map_or_else(Vector3::zeros, |i| vec3(state, i));
                (fallback, ErrCode::Success)
            }
        }
    }

    /// Seeds the momentum block and the flight length.
    ///
    /// Must run after the daughters are seeded.
    pub fn init_par(&self, nodes: &[ParticleBase], params: &mut FitParams) -> ErrCode {
        let Some(mom) = self.mom_index() else {
            return ErrCode::Success;
        };
        match &self.kind {
            ParticleKind::Origin { .. } => {}
            ParticleKind::Track { momentum, .. } => {
                if !momentum.iter().all(|v| v.is_finite()) || momentum.norm() == 0.0 {
                    log::warn!("{}: track momentum {:?} cannot seed the fit", self.name, momentum);
                    return ErrCode::BadSetup;
                }
                set_vec3(params.state_mut(), mom, momentum);
            }
            ParticleKind::Photon { cluster } => {
                let Some(vtx) = self.production_vertex_index(nodes) else {
                    return ErrCode::BadSetup;
                };
                let flight = cluster.position - vec3(params.state(), vtx);
                let Some(direction) = flight.try_normalize(0.0) else {
                    log::warn!("{}: cluster coincides with its production vertex", self.name);
                    return ErrCode::BadSetup;
                };
                set_vec3(params.state_mut(), mom, &(direction * cluster.energy));
            }
            ParticleKind::MeasuredComposite { momentum, .. } => {
                for i in 0..4 {
                    params.state_mut()[mom + i] = momentum[i];
                }
            }
            ParticleKind::Composite | ParticleKind::Resonance => {
                let mut sum = FourMomentum::zeros();
                for &d in &self.daughters {
                    match nodes[d].four_momentum(params.state()) {
                        Some(p4) => sum += p4,
                        None => return ErrCode::BadSetup,
                    }
                }
                for i in 0..4 {
                    params.state_mut()[mom + i] = sum[i];
                }
            }
        }
        self.init_tau(nodes, params);
        ErrCode::Success
    }

    /// Seeds tau as the projection of the flight vector on the momentum.
    fn init_tau(&self, nodes: &[ParticleBase], params: &mut FitParams) {
        let (Some(tau), Some(pos), Some(mom), Some(vtx)) = (
            self.tau_index(),
            self.pos_index(),
            self.mom_index(),
            self.production_vertex_index(nodes),
        ) else {
            return;
        };
        let state = params.state();
        let flight = vec3(state, pos) - vec3(state, vtx);
        let value = vec3(state, mom).try_normalize(0.0).map_or(0.0, |dir| flight.dot(&dir));
        params.state_mut()[tau] = value;
    }

    /// Offset of the vertex this particle was produced at.
    pub fn production_vertex_index(&self, nodes: &[ParticleBase]) -> Option<usize> {
        self.mother.and_then(|m| vertex_index(nodes, m))
    }

    /// Four-momentum of the node at `state`, `None` when a derived energy is
    /// zero or undefined.
    pub fn four_momentum(&self, state: &DVector<f64>) -> Option<FourMomentum> {
        let mom = self.mom_index()?;
        if self.has_energy() {
            return Some(FourMomentum::new(state[mom], state[mom + 1], state[mom + 2], state[mom + 3]));
        }
        let p = vec3(state, mom);
        let energy = (p.norm_squared() + self.mass * self.mass).sqrt();
        (energy > 0.0 && energy.is_finite()).then(|| FourMomentum::new(p.x, p.y, p.z, energy))
    }

    /// Linearises one of this node's constraints at `params`.
    pub fn project_constraint(
        &self,
        kind: ConstraintKind,
        nodes: &[ParticleBase],
        params: &FitParams,
    ) -> Result<Projection, ErrCode> {
        match kind {
            ConstraintKind::Origin => self.project_origin(params),
            ConstraintKind::Track => self.project_track(nodes, params),
            ConstraintKind::Photon => self.project_photon(nodes, params),
            ConstraintKind::Measured => self.project_measured(params),
            ConstraintKind::Kinematic => self.project_kinematic(nodes, params),
            ConstraintKind::Geometric => self.project_geometric(nodes, params),
            ConstraintKind::Mass => match self.mass_constraint {
                Some(MassConstraintType::Daughters) if !self.daughters.is_empty() => {
                    self.project_mass_daughters(nodes, params)
                }
                _ => self.project_mass(params),
            },
        }
    }

    fn project_origin(&self, params: &FitParams) -> Result<Projection, ErrCode> {
        let (ParticleKind::Origin { vertex, covariance }, Some(pos)) = (&self.kind, self.pos_index()) else {
            return Err(ErrCode::FilterError);
        };
        let mut p = Projection::new(3, params.dim());
        let residual = vec3(params.state(), pos) - vertex;
        for row in 0..3 {
            p.residual[row] = residual[row];
            p.h[(row, pos + row)] = 1.0;
        }
        set_block(&mut p.v, 0, 0, covariance);
        Ok(p)
    }

    fn project_track(&self, nodes: &[ParticleBase], params: &FitParams) -> Result<Projection, ErrCode> {
        let (ParticleKind::Track { fit, b_field, .. }, Some(mom)) = (&self.kind, self.mom_index()) else {
            return Err(ErrCode::FilterError);
        };
        let vtx = self.production_vertex_index(nodes).ok_or(ErrCode::BadSetup)?;
        let state = params.state();
        let position = vec3(state, vtx);
        let momentum = vec3(state, mom);

        let predicted = Helix::from_cartesian(&position, &momentum, self.charge, *b_field).ok_or(ErrCode::BadSetup)?;
        let jacobian = Helix::jacobian(&position, &momentum, self.charge, *b_field).ok_or(ErrCode::BadSetup)?;

        let mut p = Projection::new(5, params.dim());
        let residual = predicted.residual(&fit.helix);
        for row in 0..5 {
            p.residual[row] = residual[row];
            for col in 0..3 {
                p.h[(row, vtx + col)] = jacobian[(row, col)];
                p.h[(row, mom + col)] = jacobian[(row, col + 3)];
            }
        }
        set_block(&mut p.v, 0, 0, &fit.covariance);
        Ok(p)
    }

    /// Energy row |p| - E, then two direction rows
    /// r_j = d_j - (p_j / p_k) d_k with d = cluster - vertex and k the
    /// dominant momentum component.
    fn project_photon(&self, nodes: &[ParticleBase], params: &FitParams) -> Result<Projection, ErrCode> {
        let (ParticleKind::Photon { cluster }, Some(mom)) = (&self.kind, self.mom_index()) else {
            return Err(ErrCode::FilterError);
        };
        let vtx = self.production_vertex_index(nodes).ok_or(ErrCode::BadSetup)?;
        let state = params.state();
        let momentum = vec3(state, mom);
        let flight = cluster.position - vec3(state, vtx);
        let norm = momentum.norm();
        if norm == 0.0 || !norm.is_finite() {
            return Err(ErrCode::BadSetup);
        }

        let mut p = Projection::new(3, params.dim());
        p.residual[0] = norm - cluster.energy;
        for i in 0..3 {
            p.h[(0, mom + i)] = momentum[i] / norm;
        }
        p.v[(0, 0)] = cluster.energy_variance;

        let k = momentum.iamax();
        let pk = momentum[k];
        let mut jac_cluster = SMatrix::<f64, 2, 3>::zeros();
        for (row, j) in (0..3).filter(|&j| j != k).enumerate() {
            let ratio = momentum[j] / pk;
            p.residual[row + 1] = flight[j] - ratio * flight[k];
            p.h[(row + 1, vtx + j)] = -1.0;
            p.h[(row + 1, vtx + k)] = ratio;
            p.h[(row + 1, mom + j)] = -flight[k] / pk;
            p.h[(row + 1, mom + k)] = ratio * flight[k] / pk;
            jac_cluster[(row, j)] = 1.0;
            jac_cluster[(row, k)] = -ratio;
        }
        let v_direction = jac_cluster * cluster.position_covariance * jac_cluster.transpose();
        set_block(&mut p.v, 1, 1, &v_direction);
        Ok(p)
    }

    /// Seven rows (p4, x) - measured, in error-matrix order.
    fn project_measured(&self, params: &FitParams) -> Result<Projection, ErrCode> {
        let (
            ParticleKind::MeasuredComposite {
                momentum,
                vertex,
                error_matrix,
            },
            Some(pos),
            Some(mom),
        ) = (&self.kind, self.pos_index(), self.mom_index())
        else {
            return Err(ErrCode::FilterError);
        };
        let state = params.state();
        let mut p = Projection::new(7, params.dim());
        for i in 0..4 {
            p.residual[i] = state[mom + i] - momentum[i];
            p.h[(i, mom + i)] = 1.0;
        }
        for i in 0..3 {
            p.residual[4 + i] = state[pos + i] - vertex[i];
            p.h[(4 + i, pos + i)] = 1.0;
        }
        set_block(&mut p.v, 0, 0, error_matrix);
        Ok(p)
    }

    /// p4(mother) - sum of p4(daughters) = 0.
    fn project_kinematic(&self, nodes: &[ParticleBase], params: &FitParams) -> Result<Projection, ErrCode> {
        let mom = self.mom_index().ok_or(ErrCode::FilterError)?;
        let state = params.state();
        let mut p = Projection::new(4, params.dim());
        for i in 0..4 {
            p.residual[i] = state[mom + i];
            p.h[(i, mom + i)] = 1.0;
        }
        for &d in &self.daughters {
            let daughter = &nodes[d];
            let dmom = daughter.mom_index().ok_or(ErrCode::FilterError)?;
            let p4 = daughter.four_momentum(state).ok_or(ErrCode::BadSetup)?;
            for i in 0..4 {
                p.residual[i] -= p4[i];
            }
            if daughter.has_energy() {
                for i in 0..4 {
                    p.h[(i, dmom + i)] = -1.0;
                }
            } else {
                for i in 0..3 {
                    p.h[(i, dmom + i)] = -1.0;
                    p.h[(3, dmom + i)] = -p4[i] / p4[3];
                }
            }
        }
        Ok(p)
    }

    /// x(production) + tau * p / |p| - x(decay) = 0.
    fn project_geometric(&self, nodes: &[ParticleBase], params: &FitParams) -> Result<Projection, ErrCode> {
        let (Some(pos), Some(tau_index), Some(mom)) = (self.pos_index(), self.tau_index(), self.mom_index()) else {
            return Err(ErrCode::FilterError);
        };
        let vtx = self.production_vertex_index(nodes).ok_or(ErrCode::FilterError)?;
        let state = params.state();
        let momentum = vec3(state, mom);
        let norm = momentum.norm();
        if norm == 0.0 || !norm.is_finite() {
            return Err(ErrCode::BadSetup);
        }
        let direction = momentum / norm;
        let tau = state[tau_index];
        let residual = vec3(state, vtx) + direction * tau - vec3(state, pos);
        let d_direction = (Matrix3::identity() - direction * direction.transpose()) * (tau / norm);

        let mut p = Projection::new(3, params.dim());
        for row in 0..3 {
            p.residual[row] = residual[row];
            p.h[(row, vtx + row)] = 1.0;
            p.h[(row, pos + row)] = -1.0;
            p.h[(row, tau_index)] = direction[row];
            for col in 0..3 {
                p.h[(row, mom + col)] = d_direction[(row, col)];
            }
        }
        Ok(p)
    }

    /// E^2 - p^2 - m^2 = 0 on the node's own four-momentum.
    fn project_mass(&self, params: &FitParams) -> Result<Projection, ErrCode> {
        let mom = self.mom_index().ok_or(ErrCode::FilterError)?;
        if !self.has_energy() {
            return Err(ErrCode::FilterError);
        }
        let state = params.state();
        let (px, py, pz, e) = (state[mom], state[mom + 1], state[mom + 2], state[mom + 3]);
        let mut p = Projection::new(1, params.dim());
        p.residual[0] = e * e - px * px - py * py - pz * pz - self.mass * self.mass;
        p.h[(0, mom)] = -2.0 * px;
        p.h[(0, mom + 1)] = -2.0 * py;
        p.h[(0, mom + 2)] = -2.0 * pz;
        p.h[(0, mom + 3)] = 2.0 * e;
        Ok(p)
    }

    /// m^2 - E^2 + p^2 = 0 on the summed daughter four-momenta.
    fn project_mass_daughters(&self, nodes: &[ParticleBase], params: &FitParams) -> Result<Projection, ErrCode> {
        let state = params.state();
        let mut total = FourMomentum::zeros();
        let mut moments = Vec::with_capacity(self.daughters.len());
        for &d in &self.daughters {
            let daughter = &nodes[d];
            let dmom = daughter.mom_index().ok_or(ErrCode::FilterError)?;
            let p4 = daughter.four_momentum(state).ok_or(ErrCode::BadSetup)?;
            total += p4;
            moments.push((daughter.has_energy(), dmom, p4));
        }
        let (px, py, pz, e) = (total[0], total[1], total[2], total[3]);

        let mut p = Projection::new(1, params.dim());
        p.residual[0] = self.mass * self.mass - e * e + px * px + py * py + pz * pz;
        for (has_energy, dmom, p4) in moments {
            for i in 0..3 {
                p.h[(0, dmom + i)] = 2.0 * total[i];
            }
            if has_energy {
                p.h[(0, dmom + 3)] = -2.0 * e;
            } else {
                let ratio = e / p4[3];
                for i in 0..3 {
                    p.h[(0, dmom + i)] -= 2.0 * ratio * p4[i];
                }
            }
        }
        Ok(p)
    }
}

/// Offset of the vertex of `id`: its own position or that of the nearest
/// ancestor with one.
pub fn vertex_index(nodes: &[ParticleBase], id: NodeId) -> Option<usize> {
    let mut current = Some(id);
    while let Some(node) = current.map(|i| &nodes[i]) {
        if let Some(pos) = node.pos_index() {
            return Some(pos);
        }
        current = node.mother;
    }
    None
}

/// Tracks that originate from the vertex owning `daughters`, looking
/// through resonances that share it.
fn collect_vertex_tracks(nodes: &[ParticleBase], daughters: &[NodeId], tracks: &mut Vec<NodeId>) {
    for &d in daughters {
        match nodes[d].kind {
            ParticleKind::Track { .. } => tracks.push(d),
            ParticleKind::Resonance => collect_vertex_tracks(nodes, &nodes[d].daughters, tracks),
            _ => {}
        }
    }
}

/// Straight-line approximation of a track at its perigee: a point and a
/// direction.
fn straight_line(helix: &Helix) -> (Vector3, Vector3) {
    let (sin_phi0, cos_phi0) = helix.phi0.sin_cos();
    (helix.perigee(), Vector3::new(cos_phi0, sin_phi0, helix.tan_lambda))
}

/// Midpoint and distance of the closest approach of two lines, `None` for
/// parallel lines.
fn line_poca(first: &(Vector3, Vector3), second: &(Vector3, Vector3)) -> Option<(Vector3, f64)> {
    let (p1, d1) = first;
    let (p2, d2) = second;
    let w = p1 - p2;
    let a = d1.dot(d1);
    let b = d1.dot(d2);
    let c = d2.dot(d2);
    let d = d1.dot(&w);
    let e = d2.dot(&w);
    let denominator = a * c - b * b;
    if denominator.abs() < 1e-12 * a * c {
        return None;
    }
    let s = (b * e - c * d) / denominator;
    let t = (a * e - b * d) / denominator;
    let q1 = p1 + d1 * s;
    let q2 = p2 + d2 * t;
    Some(((q1 + q2) * 0.5, (q1 - q2).norm()))
}

#[inline]
pub(crate) fn vec3(state: &DVector<f64>, index: usize) -> Vector3 {
    Vector3::new(state[index], state[index + 1], state[index + 2])
}

#[inline]
fn set_vec3(state: &mut DVector<f64>, index: usize, value: &Vector3) {
    for i in 0..3 {
        state[index + i] = value[i];
    }
}

fn set_block<const R: usize, const C: usize>(
    target: &mut nalgebra::DMatrix<f64>,
    row: usize,
    col: usize,
    block: &SMatrix<f64, R, C>,
) {
    for i in 0..R {
        for j in 0..C {
            target[(row + i, col + j)] = block[(i, j)];
        }
    }
}

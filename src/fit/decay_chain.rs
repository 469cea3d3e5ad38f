//! The decay chain
//!
//! [`DecayChain`] mirrors an external [`Particle`] tree as an arena of
//! [`ParticleBase`] nodes, lays out the global state vector and drives the
//! tree-wide passes:
//!
//! - layout: indices are assigned depth first, daughters before their
//!   mother, so the root's block comes last;
//! - seeding: vertices top-down (a daughter's production vertex must exist
//!   before it is seeded), momenta bottom-up (a mother starts as the sum of
//!   its daughters);
//! - filtering: one Kalman update per scheduled constraint, see
//!   [`constraint`](super::constraint) for the order.

use std::collections::HashMap;

use log::trace;

use super::config::FitConfig;
use super::constraint::{schedule, Constraint};
use super::fit_loop::FitModel;
use super::params::FitParams;
use super::particle_base::{NodeId, ParticleBase, ParticleKind};
use super::projection::kalman_update;
use crate::types::{pdg, ErrCode, Particle, ParticleId, ParticleSource};
use crate::{Error, Result};

/// Fit tree built from one candidate.
#[derive(Debug, Clone)]
pub struct DecayChain {
    nodes: Vec<ParticleBase>,
    root: NodeId,
    head: NodeId,
    origin: Option<NodeId>,
    constraints: Vec<Constraint>,
    lookup: HashMap<ParticleId, NodeId>,
    dim: usize,
    max_seed_distance: f64,
}

impl DecayChain {
    /// Builds the fit tree for `particle`.
    ///
    /// # Errors
    /// - [`Error::EmptyDecay`] if the candidate has no daughters
    /// - [`Error::MissingMeasurement`] if an internal particle has neither
    ///   daughters nor a measurement
    /// - [`Error::InvalidOrigin`] if the origin covariance is not positive
    ///   definite
    /// - [`Error::DuplicateParticle`] if a particle identity occurs twice
    pub fn new(particle: &Particle, config: &FitConfig) -> Result<Self> {
        if particle.daughters().is_empty() {
            return Err(Error::EmptyDecay { name: particle.name() });
        }

        let mut chain = Self {
            nodes: Vec::new(),
            root: 0,
            head: 0,
            origin: None,
            constraints: Vec::new(),
            lookup: HashMap::new(),
            dim: 0,
            max_seed_distance: config.max_seed_distance,
        };

        if config.has_origin() {
            let (vertex, covariance) = config.origin();
            let finite = vertex.iter().chain(covariance.iter()).all(|v| v.is_finite());
            if !finite || covariance.cholesky().is_none() {
                return Err(Error::InvalidOrigin);
            }
            let name = if config.custom_origin.is_some() { "origin" } else { "beamspot" };
            chain
                .nodes
                .push(ParticleBase::new(ParticleKind::Origin { vertex, covariance }, name.to_string()));
            chain.origin = Some(0);
        }

        let depth = usize::from(chain.origin.is_some());
        let head = chain.add_particle(particle, chain.origin, depth, config)?;
        if let Some(origin) = chain.origin {
            chain.nodes[origin].daughters.push(head);
        }
        chain.head = head;
        chain.root = chain.origin.unwrap_or(head);

        let mut offset = 0;
        chain.assign_indices(chain.root, &mut offset);
        chain.dim = offset;

        let mut constraints = Vec::new();
        chain.collect_constraints(chain.root, &mut constraints);
        schedule(&mut constraints);
        chain.constraints = constraints;

        log::debug!(
            "decay chain for {}: {} nodes, dimension {}, {} constraints",
            particle.name(),
            chain.nodes.len(),
            chain.dim,
            chain.constraints.len()
        );
        Ok(chain)
    }

    fn add_particle(
        &mut self,
        particle: &Particle,
        mother: Option<NodeId>,
        depth: usize,
        config: &FitConfig,
    ) -> Result<NodeId> {
        let is_head = depth == usize::from(self.origin.is_some());
        let pdg_code = particle.pdg_code();
        let genuine_resonance = pdg::is_resonance(pdg_code);

        let kind = match particle.source() {
            _ if is_head => ParticleKind::Composite,
            ParticleSource::Track(fit) => ParticleKind::Track {
                fit: fit.clone(),
                momentum: particle.p3(),
                b_field: config.b_field,
            },
            ParticleSource::Cluster(cluster) => ParticleKind::Photon {
                cluster: cluster.clone(),
            },
            ParticleSource::Measured => ParticleKind::MeasuredComposite {
                momentum: *particle.momentum(),
                vertex: *particle.vertex(),
                error_matrix: *particle.momentum_vertex_error_matrix(),
            },
            ParticleSource::Composite if genuine_resonance || config.is_fixed_to_mother_vertex(pdg_code) => {
                ParticleKind::Resonance
            }
            ParticleSource::Composite => ParticleKind::Composite,
        };

        let internal = matches!(kind, ParticleKind::Composite | ParticleKind::Resonance);
        if internal && particle.daughters().is_empty() {
            return Err(Error::MissingMeasurement { name: particle.name() });
        }

        let mass_constrained = match kind {
            ParticleKind::Resonance => genuine_resonance || config.is_mass_constrained(pdg_code),
            ParticleKind::Composite | ParticleKind::MeasuredComposite { .. } => config.is_mass_constrained(pdg_code),
            _ => false,
        };
        let has_tau = matches!(kind, ParticleKind::Composite | ParticleKind::MeasuredComposite { .. }) && mother.is_some();

        let mut node = ParticleBase::new(kind, particle.name());
        node.particle = Some(particle.id());
        node.pdg_code = pdg_code;
        node.mass = particle.pdg_mass();
        node.charge = particle.charge();
        node.mother = mother;
        node.depth = depth;
        node.has_tau = has_tau;
        node.mass_constraint = mass_constrained.then_some(config.mass_constraint_type);

        let id = self.nodes.len();
        self.nodes.push(node);
        if self.lookup.insert(particle.id(), id).is_some() {
            return Err(Error::DuplicateParticle(particle.id()));
        }

        if internal {
            for daughter in particle.daughters() {
                let child = self.add_particle(daughter, Some(id), depth + 1, config)?;
                self.nodes[id].daughters.push(child);
            }
        }
        Ok(id)
    }

    fn assign_indices(&mut self, id: NodeId, offset: &mut usize) {
        for i in 0..self.nodes[id].daughters.len() {
            let daughter = self.nodes[id].daughters[i];
            self.assign_indices(daughter, offset);
        }
        self.nodes[id].index = *offset;
        *offset += self.nodes[id].dim();
    }

    fn collect_constraints(&self, id: NodeId, constraints: &mut Vec<Constraint>) {
        let node = &self.nodes[id];
        constraints.extend(
            node.constraint_kinds()
                .into_iter()
                .map(|kind| Constraint::new(id, kind, node.depth)),
        );
        for &daughter in &node.daughters {
            self.collect_constraints(daughter, constraints);
        }
    }

    /// Length of the global state vector.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// All nodes; indices are [`NodeId`]s.
    pub fn nodes(&self) -> &[ParticleBase] {
        &self.nodes
    }

    /// Node by arena index.
    ///
    /// # Panics
    /// Panics if `id` is out of range.
    pub fn node(&self, id: NodeId) -> &ParticleBase {
        &self.nodes[id]
    }

    /// The fitted candidate.
    pub fn cand(&self) -> &ParticleBase {
        &self.nodes[self.head]
    }

    pub fn cand_id(&self) -> NodeId {
        self.head
    }

    /// The origin node, when an IP constraint or custom origin is in use.
    pub fn origin(&self) -> Option<&ParticleBase> {
        self.origin.map(|id| &self.nodes[id])
    }

    /// Constraints in filter order.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Finds the node fitting the particle with this identity.
    pub fn locate(&self, particle: ParticleId) -> Option<&ParticleBase> {
        self.locate_id(particle).map(|id| &self.nodes[id])
    }

    pub fn locate_id(&self, particle: ParticleId) -> Option<NodeId> {
        self.lookup.get(&particle).copied()
    }

    pub fn pos_index(&self, particle: ParticleId) -> Option<usize> {
        self.locate(particle).and_then(ParticleBase::pos_index)
    }

    pub fn mom_index(&self, particle: ParticleId) -> Option<usize> {
        self.locate(particle).and_then(ParticleBase::mom_index)
    }

    pub fn tau_index(&self, particle: ParticleId) -> Option<usize> {
        self.locate(particle).and_then(ParticleBase::tau_index)
    }

    /// Seeds the state vector and the prior covariance.
    pub fn initialize(&self, params: &mut FitParams) -> ErrCode {
        let status = self.init_node(self.root, params);
        self.init_covariance(params);
        status
    }

    fn init_node(&self, id: NodeId, params: &mut FitParams) -> ErrCode {
        let node = &self.nodes[id];
        let mut status = node.init_vertex(&self.nodes, params, self.max_seed_distance);
        for &daughter in &node.daughters {
            status |= self.init_node(daughter, params);
        }
        status | node.init_par(&self.nodes, params)
    }

    fn init_covariance(&self, params: &mut FitParams) {
        params.reset_covariance();
        for node in &self.nodes {
            node.init_covariance(params);
        }
    }

    /// One Kalman pass over all constraints, linearised at the running state.
    pub fn filter(&self, params: &mut FitParams) -> ErrCode {
        self.run_pass(params, None)
    }

    /// One Kalman pass over all constraints, linearised at `reference`.
    pub fn filter_with_reference(&self, params: &mut FitParams, reference: &FitParams) -> ErrCode {
        self.run_pass(params, Some(reference))
    }

    fn run_pass(&self, params: &mut FitParams, reference: Option<&FitParams>) -> ErrCode {
        self.init_covariance(params);
        params.reset_chi_square();

        let mut status = ErrCode::Success;
        for constraint in &self.constraints {
            let node = &self.nodes[constraint.node];
            let projection = match reference {
                Some(reference) => node
                    .project_constraint(constraint.kind, &self.nodes, reference)
                    .map(|mut p| {
                        p.shift_to(params.state(), reference.state());
                        p
                    }),
                None => node.project_constraint(constraint.kind, &self.nodes, params),
            };
            let before = params.chi_square();
            status |= match projection {
                Ok(projection) => kalman_update(params, &projection),
                Err(code) => code,
            };
            trace!(
                "{} {} constraint: chi2 {:+.4} ({})",
                node.name(),
                constraint.kind,
                params.chi_square() - before,
                status
            );
            if status.is_failure() {
                break;
            }
        }
        status
    }
}

impl FitModel for DecayChain {
    fn dim(&self) -> usize {
        self.dim
    }

    fn initialize(&self, params: &mut FitParams) -> ErrCode {
        DecayChain::initialize(self, params)
    }

    fn filter(&self, params: &mut FitParams) -> ErrCode {
        DecayChain::filter(self, params)
    }

    fn filter_with_reference(&self, params: &mut FitParams, reference: &FitParams) -> ErrCode {
        DecayChain::filter_with_reference(self, params, reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::constraint::ConstraintKind;
    use crate::types::{Cluster, FourMomentum, Helix, Matrix3, Matrix5, Matrix7, TrackFitResult, Vector3};

    fn track(pdg_code: i32, momentum: Vector3) -> Particle {
        let charge = f64::from(pdg::lookup(pdg_code).map_or(0, |p| p.charge));
        let helix = Helix::from_cartesian(&Vector3::zeros(), &momentum, charge, 1.5).unwrap();
        Particle::track(pdg_code, momentum, TrackFitResult::new(helix, Matrix5::identity() * 1e-4))
    }

    fn photon(position: Vector3, energy: f64) -> Particle {
        Particle::photon(Cluster::new(position, Matrix3::identity() * 0.1, energy, 0.01))
    }

    /// B0 -> K+ pi- J/psi(mu+ mu-)
    fn b_decay() -> Particle {
        let jpsi = Particle::composite(
            443,
            vec![
                track(-13, Vector3::new(1.2, 0.3, 0.4)),
                track(13, Vector3::new(-0.2, 1.1, 0.2)),
            ],
        );
        Particle::composite(
            511,
            vec![
                track(321, Vector3::new(0.5, -0.4, 0.1)),
                track(-211, Vector3::new(0.3, 0.2, -0.3)),
                jpsi,
            ],
        )
    }

    #[test]
    fn test_layout_and_dimension() {
        let b = b_decay();
        let chain = DecayChain::new(&b, &FitConfig::default()).unwrap();
        // B0: 7, tracks: 4 x 3, J/psi: 4
        assert_eq!(chain.dim(), 23);
        assert_eq!(chain.nodes().len(), 6);
        assert!(chain.origin().is_none());
        assert_eq!(chain.cand().type_name(), "Composite");
        // Post-order: the head block comes last
        assert_eq!(chain.pos_index(b.id()), Some(16));
        assert_eq!(chain.mom_index(b.id()), Some(19));
        assert_eq!(chain.tau_index(b.id()), None);

        let jpsi = &b.daughters()[2];
        let node = chain.locate(jpsi.id()).unwrap();
        assert_eq!(node.type_name(), "Resonance");
        assert!(node.mass_constraint().is_some());
        assert_eq!(chain.pos_index(jpsi.id()), None);

        let mut ranges: Vec<(usize, usize)> = chain.nodes().iter().map(|n| (n.index, n.dim())).collect();
        ranges.sort();
        let mut next = 0;
        for (start, len) in ranges {
            assert_eq!(start, next);
            next += len;
        }
        assert_eq!(next, chain.dim());
    }

    #[test]
    fn test_schedule_visits_measurements_first() {
        let chain = DecayChain::new(&b_decay(), &FitConfig::default()).unwrap();
        let kinds: Vec<ConstraintKind> = chain.constraints().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ConstraintKind::Track,
                ConstraintKind::Track,
                ConstraintKind::Track,
                ConstraintKind::Track,
                ConstraintKind::Kinematic,
                ConstraintKind::Mass,
                ConstraintKind::Kinematic,
            ]
        );
        let rows: usize = chain.constraints().iter().map(Constraint::dim).sum();
        assert_eq!(rows, 29);
    }

    #[test]
    fn test_origin_adds_node_and_tau() {
        let b = b_decay();
        let chain = DecayChain::new(&b, &FitConfig::default().with_ip_constraint(true)).unwrap();
        assert_eq!(chain.dim(), 23 + 3 + 1);
        assert!(chain.origin().is_some());
        assert!(chain.tau_index(b.id()).is_some());
        assert_eq!(chain.cand().depth(), 1);
        let kinds: Vec<ConstraintKind> = chain.constraints().iter().map(|c| c.kind).collect();
        assert!(kinds.contains(&ConstraintKind::Geometric));
        assert_eq!(kinds.last(), Some(&ConstraintKind::Origin));
    }

    #[test]
    fn test_node_selection() {
        let ks = Particle::composite(
            310,
            vec![track(211, Vector3::new(0.4, 0.1, 0.0)), track(-211, Vector3::new(0.3, -0.1, 0.1))],
        );
        let pi0 = Particle::composite(
            111,
            vec![photon(Vector3::new(100.0, 20.0, 5.0), 0.3), photon(Vector3::new(90.0, 40.0, 0.0), 0.2)],
        );
        let measured = Particle::measured(
            421,
            FourMomentum::new(0.5, 0.5, 0.1, 2.0),
            Vector3::new(0.1, 0.0, 0.0),
            Matrix7::identity() * 1e-3,
        );
        let head = Particle::composite(300553, vec![ks.clone(), pi0.clone(), measured.clone()]);
        let config = FitConfig::default().with_mass_constraints([421]);
        let chain = DecayChain::new(&head, &config).unwrap();

        let ks_node = chain.locate(ks.id()).unwrap();
        assert_eq!(ks_node.type_name(), "Composite");
        assert!(ks_node.has_tau());
        assert!(ks_node.mass_constraint().is_none());

        let pi0_node = chain.locate(pi0.id()).unwrap();
        assert_eq!(pi0_node.type_name(), "Resonance");
        assert!(pi0_node.mass_constraint().is_some());
        assert_eq!(chain.locate(pi0.daughters()[0].id()).unwrap().type_name(), "Photon");

        let measured_node = chain.locate(measured.id()).unwrap();
        assert_eq!(measured_node.type_name(), "MeasuredComposite");
        assert!(measured_node.has_tau());
        assert!(measured_node.mass_constraint().is_some());

        let fixed = DecayChain::new(&head, &FitConfig::default().with_fixed_to_mother_vertex([310])).unwrap();
        let ks_fixed = fixed.locate(ks.id()).unwrap();
        assert_eq!(ks_fixed.type_name(), "Resonance");
        assert!(ks_fixed.mass_constraint().is_none());
    }

    #[test]
    fn test_construction_errors() {
        let lonely = Particle::composite(511, Vec::new());
        assert!(matches!(
            DecayChain::new(&lonely, &FitConfig::default()),
            Err(Error::EmptyDecay { .. })
        ));

        let hollow = Particle::composite(511, vec![Particle::composite(310, Vec::new())]);
        assert!(matches!(
            DecayChain::new(&hollow, &FitConfig::default()),
            Err(Error::MissingMeasurement { .. })
        ));

        let pion = track(211, Vector3::new(0.4, 0.1, 0.0));
        let twice = Particle::composite(113, vec![pion.clone(), pion]);
        assert!(matches!(
            DecayChain::new(&twice, &FitConfig::default()),
            Err(Error::DuplicateParticle(_))
        ));

        let singular = FitConfig::default().with_custom_origin(Vector3::zeros(), Matrix3::zeros());
        assert_eq!(DecayChain::new(&b_decay(), &singular).unwrap_err(), Error::InvalidOrigin);
    }

    #[test]
    fn test_initialize_seeds_sums() {
        let b = b_decay();
        let chain = DecayChain::new(&b, &FitConfig::default()).unwrap();
        let mut params = FitParams::new(chain.dim());
        assert_eq!(chain.initialize(&mut params), ErrCode::Success);

        let mom = chain.mom_index(b.id()).unwrap();
        let expected = b.momentum();
        for i in 0..4 {
            assert!((params.state()[mom + i] - expected[i]).abs() < 1e-9);
        }
        // Prompt tracks seed a vertex at the origin
        let pos = chain.pos_index(b.id()).unwrap();
        for i in 0..3 {
            assert!(params.state()[pos + i].abs() < 1e-6);
        }
        assert_eq!(params.covariance()[(pos, pos)], 50.0);
        assert_eq!(params.covariance()[(mom, mom)], 0.5);
    }

    #[test]
    fn test_distant_tracks_are_bad_distance() {
        let far = |z0: f64, momentum: Vector3, pdg_code: i32| {
            let charge = f64::from(pdg::lookup(pdg_code).map_or(0, |p| p.charge));
            let helix = Helix::from_cartesian(&Vector3::new(0.0, 0.0, z0), &momentum, charge, 1.5).unwrap();
            Particle::track(pdg_code, momentum, TrackFitResult::new(helix, Matrix5::identity() * 1e-4))
        };
        let ks = Particle::composite(
            310,
            vec![
                far(-40.0, Vector3::new(0.4, 0.1, 0.0), 211),
                far(40.0, Vector3::new(0.1, 0.4, 0.0), -211),
            ],
        );
        let chain = DecayChain::new(&ks, &FitConfig::default()).unwrap();
        let mut params = FitParams::new(chain.dim());
        assert_eq!(chain.initialize(&mut params), ErrCode::BadDistance);
    }
}

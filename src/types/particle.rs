//! External particle data model
//!
//! The fitter reads reconstructed candidates from, and writes fit results
//! back into, an owned tree of [`Particle`]s. Each particle carries a
//! four-momentum, a vertex, a 7x7 momentum-vertex error matrix in
//! (px, py, pz, E, x, y, z) order, a string-keyed extra-info store and
//! its daughters. Its [`ParticleSource`] tells what was measured.

use ::core::sync::atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;

use super::helix::TrackFitResult;
use super::kinematics::{four_momentum, FourMomentum, Matrix3, Matrix7, Vector3};
use super::pdg;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a particle, stable under moves and clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParticleId(u64);

impl ParticleId {
    /// Allocates a fresh process-unique id.
    pub fn next() -> Self {
        ParticleId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a caller-chosen raw id.
    pub const fn from_raw(raw: u64) -> Self {
        ParticleId(raw)
    }
}

/// A calorimeter cluster: a measured position and energy.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cluster {
    /// Cluster centroid (cm)
    pub position: Vector3,
    /// Covariance of the centroid
    pub position_covariance: Matrix3,
    /// Deposited energy (GeV)
    pub energy: f64,
    /// Variance of the energy
    pub energy_variance: f64,
}

impl Cluster {
    /// Creates a cluster.
    pub fn new(position: Vector3, position_covariance: Matrix3, energy: f64, energy_variance: f64) -> Self {
        Self {
            position,
            position_covariance,
            energy,
            energy_variance,
        }
    }
}

/// What a particle was reconstructed from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParticleSource {
    /// Combined from its daughters.
    Composite,
    /// A charged track.
    Track(TrackFitResult),
    /// A neutral calorimeter cluster.
    Cluster(Cluster),
    /// A pre-fitted candidate whose momentum, vertex and error matrix are
    /// taken as a measurement.
    Measured,
}

/// A reconstructed particle candidate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Particle {
    id: ParticleId,
    pdg_code: i32,
    mass: f64,
    charge: f64,
    momentum: FourMomentum,
    vertex: Vector3,
    error_matrix: Matrix7,
    p_value: f64,
    extra_info: BTreeMap<String, f64>,
    daughters: Vec<Particle>,
    source: ParticleSource,
}

impl Particle {
    fn with_source(pdg_code: i32, momentum: FourMomentum, vertex: Vector3, source: ParticleSource) -> Self {
        let properties = pdg::lookup(pdg_code);
        Self {
            id: ParticleId::next(),
            pdg_code,
            mass: properties.map_or(0.0, |p| p.mass),
            charge: properties.map_or(0.0, |p| f64::from(p.charge)),
            momentum,
            vertex,
            error_matrix: Matrix7::zeros(),
            p_value: -1.0,
            extra_info: BTreeMap::new(),
            daughters: Vec::new(),
            source,
        }
    }

    /// Combines daughters into a composite; its momentum is their sum.
    pub fn composite(pdg_code: i32, daughters: Vec<Particle>) -> Self {
        let momentum = daughters
            .iter()
            .fold(FourMomentum::zeros(), |acc, d| acc + d.momentum);
        let mut particle = Self::with_source(pdg_code, momentum, Vector3::zeros(), ParticleSource::Composite);
        particle.daughters = daughters;
        particle
    }

    /// A charged track with its momentum at the perigee.
    ///
    /// The vertex is set to the perigee point of the helix.
    pub fn track(pdg_code: i32, momentum: Vector3, track: TrackFitResult) -> Self {
        let vertex = track.helix.perigee();
        let mass = pdg::mass(pdg_code);
        Self::with_source(pdg_code, four_momentum(&momentum, mass), vertex, ParticleSource::Track(track))
    }

    /// A photon pointing from the origin to the cluster.
    pub fn photon(cluster: Cluster) -> Self {
        let direction = cluster.position.try_normalize(0.0).unwrap_or_else(Vector3::z);
        let p = direction * cluster.energy;
        Self::with_source(22, four_momentum(&p, 0.0), Vector3::zeros(), ParticleSource::Cluster(cluster))
    }

    /// A pre-fitted candidate measured as a whole.
    pub fn measured(pdg_code: i32, momentum: FourMomentum, vertex: Vector3, error_matrix: Matrix7) -> Self {
        let mut particle = Self::with_source(pdg_code, momentum, vertex, ParticleSource::Measured);
        particle.error_matrix = error_matrix;
        particle
    }

    /// Overrides the nominal mass taken from the PDG table.
    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    /// Sets the vertex, builder style.
    pub fn with_vertex(mut self, vertex: Vector3) -> Self {
        self.vertex = vertex;
        self
    }

    pub fn id(&self) -> ParticleId {
        self.id
    }

    pub fn pdg_code(&self) -> i32 {
        self.pdg_code
    }

    /// Nominal (PDG) mass.
    pub fn pdg_mass(&self) -> f64 {
        self.mass
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    /// Human readable name from the PDG table.
    pub fn name(&self) -> String {
        pdg::lookup(self.pdg_code).map_or_else(|| format!("pdg{}", self.pdg_code), |p| p.name.to_string())
    }

    pub fn momentum(&self) -> &FourMomentum {
        &self.momentum
    }

    /// The 3-momentum part of the four-momentum.
    pub fn p3(&self) -> Vector3 {
        self.momentum.fixed_rows::<3>(0).into_owned()
    }

    pub fn vertex(&self) -> &Vector3 {
        &self.vertex
    }

    /// 7x7 error matrix in (px, py, pz, E, x, y, z) order.
    pub fn momentum_vertex_error_matrix(&self) -> &Matrix7 {
        &self.error_matrix
    }

    /// Fit probability, -1 until a fit has set it.
    pub fn p_value(&self) -> f64 {
        self.p_value
    }

    pub fn source(&self) -> &ParticleSource {
        &self.source
    }

    /// Track fit result for track-based particles.
    pub fn track_fit(&self) -> Option<&TrackFitResult> {
        match &self.source {
            ParticleSource::Track(track) => Some(track),
            _ => None,
        }
    }

    pub fn daughters(&self) -> &[Particle] {
        &self.daughters
    }

    pub fn daughters_mut(&mut self) -> &mut [Particle] {
        &mut self.daughters
    }

    pub fn n_daughters(&self) -> usize {
        self.daughters.len()
    }

    /// Appends a daughter.
    pub fn add_daughter(&mut self, daughter: Particle) {
        self.daughters.push(daughter);
    }

    pub fn set_momentum(&mut self, momentum: FourMomentum) {
        self.momentum = momentum;
    }

    pub fn set_vertex(&mut self, vertex: Vector3) {
        self.vertex = vertex;
    }

    pub fn set_momentum_vertex_error_matrix(&mut self, error_matrix: Matrix7) {
        self.error_matrix = error_matrix;
    }

    pub fn set_p_value(&mut self, p_value: f64) {
        self.p_value = p_value;
    }

    /// Stores a named value, replacing any previous one.
    pub fn set_extra_info(&mut self, name: &str, value: f64) {
        self.extra_info.insert(name.to_string(), value);
    }

    pub fn extra_info(&self, name: &str) -> Option<f64> {
        self.extra_info.get(name).copied()
    }

    pub fn has_extra_info(&self, name: &str) -> bool {
        self.extra_info.contains_key(name)
    }

    /// Finds a particle by identity in this subtree.
    pub fn find(&self, id: ParticleId) -> Option<&Particle> {
        if self.id == id {
            return Some(self);
        }
        self.daughters.iter().find_map(|d| d.find(id))
    }

    /// Mutable variant of [`Particle::find`].
    pub fn find_mut(&mut self, id: ParticleId) -> Option<&mut Particle> {
        if self.id == id {
            return Some(self);
        }
        self.daughters.iter_mut().find_map(|d| d.find_mut(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::helix::Helix;
    use crate::types::kinematics::{invariant_mass, Matrix5};
    use approx::assert_relative_eq;

    fn pion(px: f64, charge_sign: i32) -> Particle {
        let mom = Vector3::new(px, 0.1, 0.0);
        let helix = Helix::from_cartesian(&Vector3::zeros(), &mom, f64::from(charge_sign), 1.5).unwrap();
        Particle::track(211 * charge_sign, mom, TrackFitResult::new(helix, Matrix5::identity() * 1e-4))
    }

    #[test]
    fn test_composite_sums_daughters() {
        let k = Particle::composite(310, vec![pion(0.5, 1), pion(-0.3, -1)]);
        assert_eq!(k.n_daughters(), 2);
        assert_relative_eq!(k.momentum()[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(k.momentum()[1], 0.2, epsilon = 1e-12);
        assert!(invariant_mass(k.momentum()) > 2.0 * 0.139);
        assert_relative_eq!(k.pdg_mass(), 0.497_611);
    }

    #[test]
    fn test_track_charge_and_vertex() {
        let p = pion(1.0, -1);
        assert_relative_eq!(p.charge(), -1.0);
        assert_eq!(p.name(), "pi-");
        assert!(p.track_fit().is_some());
        assert_relative_eq!(p.vertex().norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_photon_direction() {
        let cluster = Cluster::new(Vector3::new(0.0, 100.0, 0.0), Matrix3::identity(), 2.0, 0.01);
        let gamma = Particle::photon(cluster);
        assert_relative_eq!(gamma.momentum()[1], 2.0);
        assert_relative_eq!(gamma.momentum()[3], 2.0);
        assert_relative_eq!(gamma.pdg_mass(), 0.0);
    }

    #[test]
    fn test_extra_info_overwrites() {
        let mut p = pion(1.0, 1);
        assert!(!p.has_extra_info("decayLength"));
        p.set_extra_info("decayLength", 1.0);
        p.set_extra_info("decayLength", 2.0);
        assert_eq!(p.extra_info("decayLength"), Some(2.0));
    }

    #[test]
    fn test_find_by_identity() {
        let d1 = pion(0.5, 1);
        let d2 = pion(-0.3, -1);
        let id2 = d2.id();
        let mut k = Particle::composite(310, vec![d1, d2]);
        assert_eq!(k.find(id2).map(|p| p.pdg_code()), Some(-211));
        assert!(k.find(ParticleId::from_raw(u64::MAX)).is_none());
        k.find_mut(id2).unwrap().set_p_value(0.5);
        assert_relative_eq!(k.daughters()[1].p_value(), 0.5);
    }

    #[test]
    fn test_clone_keeps_identity() {
        let p = pion(1.0, 1);
        assert_eq!(p.clone().id(), p.id());
        assert_ne!(pion(1.0, 1).id(), p.id());
    }
}

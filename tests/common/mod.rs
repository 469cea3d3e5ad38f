//! Common test helpers for decay-tree fit integration tests

#![allow(dead_code)]

use nalgebra::SVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, StandardNormal};
use treefit::types::kinematics::{four_momentum, invariant_mass};
use treefit::types::{pdg, Cluster, FourMomentum, Helix, Matrix3, Matrix5, Particle, TrackFitResult, Vector3};

/// Solenoid field of the detector (T)
pub const B_FIELD: f64 = 1.5;

/// Helix variances (d0, phi0, omega, z0, tan lambda)
pub const HELIX_VARIANCES: [f64; 5] = [4e-6, 1e-6, 1e-8, 9e-6, 1e-6];

/// Distance from the decay vertex to a photon's cluster (cm)
pub const CLUSTER_DISTANCE: f64 = 150.0;

/// Cluster position resolution (cm)
pub const CLUSTER_POSITION_SIGMA: f64 = 0.5;

/// Relative cluster energy resolution
pub const CLUSTER_ENERGY_RESOLUTION: f64 = 0.02;

/// Creates a reproducible random generator
pub fn make_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Draws an isotropic unit vector
pub fn random_direction(rng: &mut StdRng) -> Vector3 {
    loop {
        let v = Vector3::new(
            rng.sample::<f64, _>(StandardNormal),
            rng.sample::<f64, _>(StandardNormal),
            rng.sample::<f64, _>(StandardNormal),
        );
        if let Some(unit) = v.try_normalize(1e-6) {
            return unit;
        }
    }
}

/// Splits `parent` into two daughters of masses `m1` and `m2`, the first
/// emitted along `direction` in the parent rest frame.
pub fn two_body(parent: &FourMomentum, m1: f64, m2: f64, direction: &Vector3) -> (Vector3, Vector3) {
    let mass = invariant_mass(parent);
    let q = ((mass * mass - (m1 + m2).powi(2)) * (mass * mass - (m1 - m2).powi(2))).sqrt() / (2.0 * mass);
    let rest = direction.normalize() * q;
    let rest_energy = (q * q + m1 * m1).sqrt();

    let total = parent.fixed_rows::<3>(0).into_owned();
    let beta = total / parent[3];
    let gamma = parent[3] / mass;
    let first = match beta.try_normalize(0.0) {
        Some(axis) => rest + axis * ((gamma - 1.0) * rest.dot(&axis) + gamma * beta.norm() * rest_energy),
        None => rest,
    };
    (first, total - first)
}

/// Decays a particle of type `pdg_code` with momentum `p` isotropically
pub fn decay(rng: &mut StdRng, pdg_code: i32, p: &Vector3, m1: f64, m2: f64) -> (Vector3, Vector3) {
    let parent = four_momentum(p, pdg::mass(pdg_code));
    let direction = random_direction(rng);
    two_body(&parent, m1, m2, &direction)
}

/// Helix covariance used for all simulated tracks
pub fn helix_covariance() -> Matrix5 {
    Matrix5::from_diagonal(&SVector::from(HELIX_VARIANCES))
}

/// A track produced at `vertex` with its helix smeared by the helix
/// covariance; the seed momentum is the true one
pub fn smeared_track(rng: &mut StdRng, pdg_code: i32, vertex: &Vector3, momentum: Vector3) -> Particle {
    let charge = pdg::lookup(pdg_code).map_or(0.0, |p| f64::from(p.charge));
    let helix = Helix::from_cartesian(vertex, &momentum, charge, B_FIELD).expect("track needs transverse momentum");
    let mut params = helix.to_vector();
    for (i, variance) in HELIX_VARIANCES.iter().enumerate() {
        params[i] += Normal::new(0.0, variance.sqrt()).unwrap().sample(rng);
    }
    Particle::track(
        pdg_code,
        momentum,
        TrackFitResult::new(Helix::from_vector(&params), helix_covariance()),
    )
}

/// A track whose helix passes exactly through `vertex`
pub fn exact_track(pdg_code: i32, vertex: &Vector3, momentum: Vector3) -> Particle {
    let charge = pdg::lookup(pdg_code).map_or(0.0, |p| f64::from(p.charge));
    let helix = Helix::from_cartesian(vertex, &momentum, charge, B_FIELD).expect("track needs transverse momentum");
    Particle::track(pdg_code, momentum, TrackFitResult::new(helix, helix_covariance()))
}

/// A photon from `vertex` whose cluster is smeared in position and energy
pub fn smeared_photon(rng: &mut StdRng, vertex: &Vector3, momentum: &Vector3) -> Particle {
    let energy = momentum.norm();
    let sigma_e = CLUSTER_ENERGY_RESOLUTION * energy;
    let position_noise = Normal::new(0.0, CLUSTER_POSITION_SIGMA).unwrap();
    let mut position = vertex + momentum.normalize() * CLUSTER_DISTANCE;
    for i in 0..3 {
        position[i] += position_noise.sample(rng);
    }
    let measured_energy = energy + Normal::new(0.0, sigma_e).unwrap().sample(rng);
    let cluster = Cluster::new(
        position,
        Matrix3::identity() * CLUSTER_POSITION_SIGMA.powi(2),
        measured_energy,
        sigma_e * sigma_e,
    );
    Particle::photon(cluster)
}

/// B0 -> K+ pi- J/psi(-> mu+ mu-), all produced at `vertex`
pub fn b_to_jpsi_k_pi(rng: &mut StdRng, vertex: &Vector3) -> Particle {
    let jpsi_p = Vector3::new(0.9, 0.4, 0.6);
    let (mu_plus, mu_minus) = decay(rng, 443, &jpsi_p, pdg::mass(13), pdg::mass(13));
    let jpsi = Particle::composite(
        443,
        vec![
            smeared_track(rng, -13, vertex, mu_plus),
            smeared_track(rng, 13, vertex, mu_minus),
        ],
    );
    let kaon = smeared_track(rng, 321, vertex, Vector3::new(-0.8, 0.3, 0.4));
    let pion = smeared_track(rng, -211, vertex, Vector3::new(-0.2, -0.9, 0.1));
    Particle::composite(511, vec![kaon, pion, jpsi])
}

/// B0 -> J/psi(-> mu+ mu-) K_S0(-> pi+ pi-) with the K_S0 decaying
/// `flight` cm downstream. Returns the candidate and the K_S0 vertex.
pub fn b_to_jpsi_ks(rng: &mut StdRng, vertex: &Vector3, flight: f64) -> (Particle, Vector3) {
    let jpsi_p = Vector3::new(-0.7, 0.8, 0.3);
    let (mu_plus, mu_minus) = decay(rng, 443, &jpsi_p, pdg::mass(13), pdg::mass(13));
    let jpsi = Particle::composite(
        443,
        vec![
            smeared_track(rng, -13, vertex, mu_plus),
            smeared_track(rng, 13, vertex, mu_minus),
        ],
    );

    let ks_p = Vector3::new(1.1, 0.5, 0.2);
    let ks_vertex = vertex + ks_p.normalize() * flight;
    let (pi_plus, pi_minus) = two_body(
        &four_momentum(&ks_p, pdg::mass(310)),
        pdg::mass(211),
        pdg::mass(211),
        &Vector3::new(0.1, 0.3, 0.9),
    );
    let ks = Particle::composite(
        310,
        vec![
            smeared_track(rng, 211, &ks_vertex, pi_plus),
            smeared_track(rng, -211, &ks_vertex, pi_minus),
        ],
    );
    (Particle::composite(511, vec![jpsi, ks]), ks_vertex)
}

/// D0 -> K- pi+ pi0(-> gamma gamma), all produced at `vertex`
pub fn d0_to_k_pi_pi0(rng: &mut StdRng, vertex: &Vector3) -> Particle {
    let kaon = smeared_track(rng, -321, vertex, Vector3::new(0.7, -0.4, 0.5));
    let pion = smeared_track(rng, 211, vertex, Vector3::new(-0.3, 0.8, 0.2));
    let pi0_p = Vector3::new(0.5, 0.6, -0.3);
    let (g1, g2) = decay(rng, 111, &pi0_p, 0.0, 0.0);
    let pi0 = Particle::composite(
        111,
        vec![smeared_photon(rng, vertex, &g1), smeared_photon(rng, vertex, &g2)],
    );
    Particle::composite(421, vec![kaon, pion, pi0])
}

/// Normalised residual of a fitted value
pub fn pull(fitted: f64, truth: f64, variance: f64) -> f64 {
    (fitted - truth) / variance.sqrt()
}

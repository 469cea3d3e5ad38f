//! Fit orchestration and result export
//!
//! [`FitManager`] owns the candidate, its [`DecayChain`] and the
//! [`FitParams`], runs the [`FitLoop`] and, on success, writes the fitted
//! vertices, momenta, covariances and flight information back into the
//! particle tree.
//!
//! Derived quantities are returned as (value, variance) pairs; undefined
//! ones as the sentinel (-999, -999). The rest-frame lifetime is
//! t = L m / (|p| c) with L the flight length (cm), m the nominal mass and
//! c in cm/ns, so t is in ns.

use log::{debug, error};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::config::FitConfig;
use super::decay_chain::DecayChain;
use super::fit_loop::FitLoop;
use super::params::FitParams;
use super::particle_base::{vec3, ParticleBase};
use crate::types::pdg::SPEED_OF_LIGHT;
use crate::types::{ErrCode, Matrix7, Particle, ParticleId, VertexStatus};
use crate::Result;

/// Value returned for lengths and lifetimes that are not defined.
pub const UNDEFINED: (f64, f64) = (-999.0, -999.0);

/// Fits one decay tree.
///
/// ```no_run
/// use treefit::prelude::*;
/// # fn candidate() -> Particle { unimplemented!() }
///
/// let mut manager = FitManager::new(candidate(), FitConfig::new(0.01))?;
/// if manager.fit() {
///     let head = manager.particle();
///     println!("p-value {:.3}, vertex {:?}", head.p_value(), head.vertex());
/// }
/// # Ok::<(), treefit::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct FitManager {
    particle: Particle,
    config: FitConfig,
    chain: DecayChain,
    params: FitParams,
    status: VertexStatus,
    err_code: ErrCode,
    chi_square: f64,
    n_dof: i64,
    iterations: usize,
}

impl FitManager {
    /// Builds the decay chain for `particle`.
    pub fn new(particle: Particle, config: FitConfig) -> Result<Self> {
        let chain = DecayChain::new(&particle, &config)?;
        let params = FitParams::new(chain.dim());
        Ok(Self {
            particle,
            config,
            chain,
            params,
            status: VertexStatus::UnFitted,
            err_code: ErrCode::Success,
            chi_square: -1.0,
            n_dof: 0,
            iterations: 0,
        })
    }

    /// Runs the fit and, on success, writes the results into the particle
    /// tree. Returns true on success.
    ///
    /// The first call seeds the state from the input. Later calls start
    /// from the previous result, so refitting a converged tree reproduces
    /// it; a call after `BadInput` seeds again.
    pub fn fit(&mut self) -> bool {
        let initialize = matches!(self.status, VertexStatus::UnFitted | VertexStatus::BadInput);
        self.status = VertexStatus::UnFitted;

        let outcome = FitLoop::from_config(&self.config).run(&self.chain, &mut self.params, initialize);
        self.status = outcome.status;
        self.err_code = outcome.err_code;
        self.chi_square = outcome.chi_square;
        self.n_dof = outcome.n_dof;
        self.iterations = outcome.iterations;
        debug!(
            "{}: {} after {} passes, chi2 {:.4} / {} ({})",
            self.particle.name(),
            self.status,
            self.iterations,
            self.chi_square,
            self.n_dof,
            self.err_code
        );

        if self.status == VertexStatus::Success {
            self.update_tree();
        }
        self.status == VertexStatus::Success
    }

    pub fn status(&self) -> VertexStatus {
        self.status
    }

    /// Worst error code of the last fit.
    pub fn err_code(&self) -> ErrCode {
        self.err_code
    }

    /// Chi-square of the last pass, -1 before any pass.
    pub fn chi_square(&self) -> f64 {
        self.chi_square
    }

    pub fn n_dof(&self) -> i64 {
        self.n_dof
    }

    /// Number of filter passes of the last fit.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// The candidate, with fit results once a fit succeeded.
    pub fn particle(&self) -> &Particle {
        &self.particle
    }

    /// Releases the candidate.
    pub fn into_particle(self) -> Particle {
        self.particle
    }

    pub fn decay_chain(&self) -> &DecayChain {
        &self.chain
    }

    pub fn fit_params(&self) -> &FitParams {
        &self.params
    }

    pub fn pos_index(&self, particle: ParticleId) -> Option<usize> {
        self.chain.pos_index(particle)
    }

    pub fn mom_index(&self, particle: ParticleId) -> Option<usize> {
        self.chain.mom_index(particle)
    }

    pub fn tau_index(&self, particle: ParticleId) -> Option<usize> {
        self.chain.tau_index(particle)
    }

    /// 7x7 (px, py, pz, E, x, y, z) covariance of a node.
    pub fn cov_from_node(&self, node: &ParticleBase) -> Matrix7 {
        self.exporter().cov_from_node(node)
    }

    /// Flight length (cm) and its variance.
    pub fn decay_length(&self, particle: ParticleId) -> (f64, f64) {
        self.exporter().decay_length(particle)
    }

    /// Rest-frame lifetime (ns) and its variance.
    pub fn life_time(&self, particle: ParticleId) -> (f64, f64) {
        self.exporter().life_time(particle)
    }

    /// Writes the current fit state into the whole particle tree.
    pub fn update_tree(&mut self) {
        let exporter = Exporter::new(&self.chain, &self.params, &self.config, self.chi_square, self.n_dof);
        exporter.update_tree(&mut self.particle, true);
    }

    /// Writes the current fit state into one particle of the tree. Returns
    /// false when the particle is not part of the fit.
    pub fn update_cand(&mut self, particle: ParticleId) -> bool {
        let is_head = particle == self.particle.id();
        let exporter = Exporter::new(&self.chain, &self.params, &self.config, self.chi_square, self.n_dof);
        match self.particle.find_mut(particle) {
            Some(target) => exporter.update_cand(target, is_head),
            None => false,
        }
    }

    fn exporter(&self) -> Exporter<'_> {
        Exporter::new(&self.chain, &self.params, &self.config, self.chi_square, self.n_dof)
    }
}

// ============================================================================
// Result Export
// ============================================================================

/// Reads results out of a fitted chain; borrows nothing from the particle
/// tree it writes into.
struct Exporter<'a> {
    chain: &'a DecayChain,
    params: &'a FitParams,
    update_daughters: bool,
    chi_square: f64,
    n_dof: i64,
}

impl<'a> Exporter<'a> {
    fn new(chain: &'a DecayChain, params: &'a FitParams, config: &FitConfig, chi_square: f64, n_dof: i64) -> Self {
        Self {
            chain,
            params,
            update_daughters: config.update_daughters,
            chi_square,
            n_dof,
        }
    }

    fn update_tree(&self, particle: &mut Particle, is_head: bool) {
        if !self.update_cand(particle, is_head) {
            return;
        }
        let internal = self
            .chain
            .locate(particle.id())
            .is_some_and(|node| !node.daughters().is_empty());
        if internal {
            for daughter in particle.daughters_mut() {
                self.update_tree(daughter, false);
            }
        }
    }

    fn update_cand(&self, particle: &mut Particle, is_head: bool) -> bool {
        let Some(id) = self.chain.locate_id(particle.id()) else {
            error!(
                "cannot find {} in the decay tree of {}",
                particle.name(),
                self.chain.cand().name()
            );
            return false;
        };
        let node = self.chain.node(id);
        let state = self.params.state();

        if let Some(pos) = node.pos_index() {
            particle.set_vertex(vec3(state, pos));
            if id == self.chain.cand_id() {
                if let Some(p_value) = self.p_value() {
                    particle.set_p_value(p_value);
                }
            }
        }

        if self.update_daughters || is_head {
            if let Some(p4) = node.four_momentum(state) {
                particle.set_momentum(p4);
            }
            particle.set_momentum_vertex_error_matrix(self.cov_from_node(node));
        }

        if node.tau_index().is_some() {
            let particle_id = particle.id();
            let (length, length_var) = self.decay_length(particle_id);
            let (time, time_var) = self.life_time(particle_id);
            particle.set_extra_info("decayLength", length);
            particle.set_extra_info("decayLengthErr", length_var.max(0.0).sqrt());
            particle.set_extra_info("lifeTime", time);
            particle.set_extra_info("lifeTimeErr", time_var.max(0.0).sqrt());
        }
        true
    }

    fn p_value(&self) -> Option<f64> {
        if self.n_dof <= 0 || self.chi_square < 0.0 {
            return None;
        }
        ChiSquared::new(self.n_dof as f64)
            .ok()
            .map(|distribution| distribution.sf(self.chi_square))
    }

    fn cov_from_node(&self, node: &ParticleBase) -> Matrix7 {
        let cov = self.params.covariance();
        let state = self.params.state();
        let pos = node
            .pos_index()
            .or_else(|| node.production_vertex_index(self.chain.nodes()));
        let mut result = Matrix7::zeros();

        // Rows 0..4 momentum (energy derived below when not fitted), 4..7 position
        let mut rows: [Option<usize>; 7] = [None; 7];
        if let Some(mom) = node.mom_index() {
            let n = if node.has_energy() { 4 } else { 3 };
            for (i, row) in rows.iter_mut().take(n).enumerate() {
                *row = Some(mom + i);
            }
        }
        if let Some(pos) = pos {
            for i in 0..3 {
                rows[4 + i] = Some(pos + i);
            }
        }
        for i in 0..7 {
            for j in 0..7 {
                if let (Some(a), Some(b)) = (rows[i], rows[j]) {
                    result[(i, j)] = cov[(a, b)];
                }
            }
        }

        if node.has_energy() {
            return result;
        }
        let Some(mom) = node.mom_index() else {
            return result;
        };
        // E = sqrt(p^2 + m^2): the energy row is dE/dp = p / E
        let p = vec3(state, mom);
        let energy = (p.norm_squared() + node.pdg_mass() * node.pdg_mass()).sqrt();
        let mut jacobian = Matrix7::identity();
        jacobian[(3, 3)] = 0.0;
        if energy > 0.0 {
            for i in 0..3 {
                jacobian[(3, i)] = p[i] / energy;
            }
        }
        let mut propagated = jacobian * result * jacobian.transpose();
        crate::types::kinematics::symmetrize(&mut propagated);
        propagated
    }

    fn decay_length(&self, particle: ParticleId) -> (f64, f64) {
        let Some(node) = self.chain.locate(particle) else {
            return UNDEFINED;
        };
        match (node.tau_index(), node.mother()) {
            (Some(tau), Some(_)) => (self.params.state()[tau], self.params.covariance()[(tau, tau)]),
            _ => UNDEFINED,
        }
    }

    fn life_time(&self, particle: ParticleId) -> (f64, f64) {
        let Some(node) = self.chain.locate(particle) else {
            return UNDEFINED;
        };
        let (Some(tau), Some(_), Some(mom)) = (node.tau_index(), node.mother(), node.mom_index()) else {
            return UNDEFINED;
        };
        let state = self.params.state();
        let cov = self.params.covariance();
        let p = vec3(state, mom);
        let norm = p.norm();
        if norm == 0.0 {
            return UNDEFINED;
        }
        let m_over_c = node.pdg_mass() / SPEED_OF_LIGHT;
        let length = state[tau];
        let time = length / norm * m_over_c;

        // Jacobian over (tau, px, py, pz)
        let indices = [tau, mom, mom + 1, mom + 2];
        let mut jacobian = [0.0; 4];
        jacobian[0] = m_over_c / norm;
        for i in 0..3 {
            jacobian[i + 1] = -length * p[i] / norm.powi(3) * m_over_c;
        }
        let mut variance = 0.0;
        for (a, ja) in indices.iter().zip(jacobian) {
            for (b, jb) in indices.iter().zip(jacobian) {
                variance += ja * cov[(*a, *b)] * jb;
            }
        }
        (time, variance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Helix, Matrix3, Matrix5, TrackFitResult, Vector3};
    use approx::assert_relative_eq;

    fn track(pdg_code: i32, momentum: Vector3) -> Particle {
        let charge = f64::from(crate::types::pdg::lookup(pdg_code).map_or(0, |p| p.charge));
        let helix = Helix::from_cartesian(&Vector3::zeros(), &momentum, charge, 1.5).unwrap();
        let covariance = Matrix5::from_diagonal(&nalgebra::SVector::<f64, 5>::new(4e-6, 1e-6, 1e-8, 9e-6, 1e-6));
        Particle::track(pdg_code, momentum, TrackFitResult::new(helix, covariance))
    }

    fn rho() -> Particle {
        Particle::composite(
            113,
            vec![track(211, Vector3::new(0.6, 0.2, 0.1)), track(-211, Vector3::new(-0.1, 0.5, 0.3))],
        )
    }

    #[test]
    fn test_sentinels_before_fit() {
        let manager = FitManager::new(rho(), FitConfig::default()).unwrap();
        let head = manager.particle().id();
        assert_eq!(manager.status(), VertexStatus::UnFitted);
        assert_eq!(manager.chi_square(), -1.0);
        assert_eq!(manager.decay_length(head), UNDEFINED);
        assert_eq!(manager.life_time(head), UNDEFINED);
        assert_eq!(manager.decay_length(ParticleId::from_raw(u64::MAX)), UNDEFINED);
        assert_eq!(manager.tau_index(head), None);
    }

    #[test]
    fn test_unlocatable_particle_is_skipped() {
        let mut manager = FitManager::new(rho(), FitConfig::default().with_update_daughters(true)).unwrap();
        assert!(manager.fit());

        let mut modified = manager.particle().clone();
        let stranger = Particle::composite(310, vec![track(211, Vector3::new(0.2, 0.2, 0.0))])
            .with_vertex(Vector3::new(7.0, 7.0, 7.0));
        modified.add_daughter(stranger);
        for daughter in modified.daughters_mut() {
            daughter.set_p_value(0.25);
            daughter.set_vertex(Vector3::new(1.0, 1.0, 1.0));
        }
        let unfitted = modified.daughters()[2].momentum_vertex_error_matrix().clone();

        let exporter = Exporter::new(
            &manager.chain,
            &manager.params,
            &manager.config,
            manager.chi_square,
            manager.n_dof,
        );
        exporter.update_tree(&mut modified, true);

        // The unknown subtree is untouched, its siblings are updated
        let stranger = &modified.daughters()[2];
        assert_eq!(stranger.vertex(), &Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(stranger.momentum_vertex_error_matrix(), &unfitted);
        assert_relative_eq!(stranger.daughters()[0].p_value(), -1.0);
        let pion = &modified.daughters()[0];
        assert!(pion.momentum_vertex_error_matrix()[(0, 0)] > 0.0);
        assert!(manager.update_cand(manager.particle().daughters()[1].id()));
        assert!(!manager.update_cand(ParticleId::from_raw(u64::MAX)));
    }

    #[test]
    fn test_energy_row_of_track_covariance() {
        let mut manager = FitManager::new(rho(), FitConfig::default()).unwrap();
        assert!(manager.fit());
        let pion_id = manager.particle().daughters()[0].id();
        let node = manager.decay_chain().locate(pion_id).unwrap().clone();
        let cov = manager.cov_from_node(&node);

        let scale = (0..7).map(|i| cov[(i, i)]).fold(0.0, f64::max);
        assert!(scale > 0.0);
        assert_relative_eq!(cov, cov.transpose(), epsilon = 1e-15);
        let smallest = cov.symmetric_eigen().eigenvalues.min();
        assert!(smallest >= -1e-12 * scale, "smallest eigenvalue {}", smallest);

        // Energy row from a central difference of E(p) = sqrt(p^2 + m^2)
        let mom = node.mom_index().unwrap();
        let p = vec3(manager.fit_params().state(), mom);
        let mass = node.pdg_mass();
        let energy = |p: &Vector3| (p.norm_squared() + mass * mass).sqrt();
        let step = 1e-6;
        let mut gradient = Vector3::zeros();
        for i in 0..3 {
            let mut hi = p;
            hi[i] += step;
            let mut lo = p;
            lo[i] -= step;
            gradient[i] = (energy(&hi) - energy(&lo)) / (2.0 * step);
        }
        let c3: Matrix3 = manager.fit_params().covariance().fixed_view::<3, 3>(mom, mom).into_owned();
        let variance = (gradient.transpose() * c3 * gradient)[(0, 0)];
        assert!(variance > 0.0);
        assert_relative_eq!(cov[(3, 3)], variance, max_relative = 1e-6);
        let cross = c3 * gradient;
        for i in 0..3 {
            let tolerance = 1e-6 * (variance * c3[(i, i)]).sqrt();
            assert_relative_eq!(cov[(3, i)], cross[i], epsilon = tolerance, max_relative = 1e-6);
        }
    }
}

//! Example usage of the TreeFit library
//!
//! Fits a synthetic B0 -> K+ pi- J/psi(-> mu+ mu-) candidate with a J/psi
//! mass constraint and prints the fitted vertex and flight information.

use nalgebra::SVector;
use treefit::prelude::*;
use treefit::types::pdg;

const B_FIELD: f64 = 1.5;

/// Helix variances (d0, phi0, omega, z0, tan lambda)
const HELIX_VARIANCES: [f64; 5] = [4e-6, 1e-6, 1e-8, 9e-6, 1e-6];

/// Splits `parent` into two daughters of masses `m1` and `m2`, the first
/// emitted along `direction` in the parent rest frame.
fn two_body(parent: &FourMomentum, m1: f64, m2: f64, direction: &Vector3) -> (Vector3, Vector3) {
    let mass = kinematics::invariant_mass(parent);
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

/// A track produced at `vertex`, its helix shifted by `pulls` standard
/// deviations.
fn track(pdg_code: i32, vertex: &Vector3, momentum: Vector3, pulls: [f64; 5]) -> Particle {
    let charge = pdg::lookup(pdg_code).map_or(0.0, |p| f64::from(p.charge));
    let covariance = Matrix5::from_diagonal(&SVector::from(HELIX_VARIANCES));
    let mut helix = Helix::from_cartesian(vertex, &momentum, charge, B_FIELD)
        .map(|h| h.to_vector())
        .unwrap_or_else(SVector::zeros);
    for (i, pull) in pulls.iter().enumerate() {
        helix[i] += pull * HELIX_VARIANCES[i].sqrt();
    }
    Particle::track(pdg_code, momentum, TrackFitResult::new(Helix::from_vector(&helix), covariance))
}

fn main() -> treefit::Result<()> {
    env_logger::init();

    println!("TreeFit: Decay-Tree Vertex Fitting");
    println!("==================================\n");

    let vertex = Vector3::new(0.012, -0.008, 0.035);

    // J/psi with a nominal mass, decaying back to back in its rest frame
    let jpsi_p = Vector3::new(0.9, 0.4, 0.6);
    let jpsi_p4 = kinematics::four_momentum(&jpsi_p, pdg::mass(443));
    let (mu_plus, mu_minus) = two_body(&jpsi_p4, pdg::mass(13), pdg::mass(13), &Vector3::new(0.3, 0.8, -0.2));

    let jpsi = Particle::composite(
        443,
        vec![
            track(-13, &vertex, mu_plus, [0.5, -1.0, 0.3, 0.8, -0.4]),
            track(13, &vertex, mu_minus, [-0.7, 0.2, -1.1, 0.1, 0.9]),
        ],
    );
    let kaon = track(321, &vertex, Vector3::new(-0.8, 0.3, 0.4), [1.2, 0.4, -0.3, -0.6, 0.2]);
    let pion = track(-211, &vertex, Vector3::new(-0.2, -0.9, 0.1), [-0.3, -0.8, 0.6, 1.0, -1.2]);
    let candidate = Particle::composite(511, vec![kaon, pion, jpsi]);

    let config = FitConfig::new(0.01)
        .with_b_field(B_FIELD)
        .with_mass_constraints([443])
        .with_update_daughters(true);
    let mut manager = FitManager::new(candidate, config)?;

    let chain = manager.decay_chain();
    println!(
        "Decay chain: {} nodes, {} parameters, {} constraints\n",
        chain.nodes().len(),
        chain.dim(),
        chain.constraints().len()
    );

    let converged = manager.fit();
    println!("Status:     {} ({})", manager.status(), manager.err_code());
    println!("Passes:     {}", manager.iterations());
    println!("Chi2/ndof:  {:.3} / {}", manager.chi_square(), manager.n_dof());

    if converged {
        let head = manager.into_particle();
        let fitted = head.vertex();
        let error = head.momentum_vertex_error_matrix();
        println!("p-value:    {:.3}", head.p_value());
        println!(
            "Vertex:     ({:.4}, {:.4}, {:.4}) +- ({:.4}, {:.4}, {:.4}) cm",
            fitted.x,
            fitted.y,
            fitted.z,
            error[(4, 4)].sqrt(),
            error[(5, 5)].sqrt(),
            error[(6, 6)].sqrt()
        );
        println!(
            "True:       ({:.4}, {:.4}, {:.4}) cm",
            vertex.x, vertex.y, vertex.z
        );
        println!("B mass:     {:.4} GeV", kinematics::invariant_mass(head.momentum()));
        for daughter in head.daughters() {
            println!(
                "  {:>8}: m = {:.4} GeV, p = {:.4} GeV",
                daughter.name(),
                kinematics::invariant_mass(daughter.momentum()),
                daughter.p3().norm()
            );
        }
    }

    println!("\nFit complete!");
    Ok(())
}

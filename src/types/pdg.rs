//! Particle property table
//!
//! Masses, lifetimes and charges for the particles that commonly appear in
//! decay trees. Units: GeV for masses, ns for lifetimes, elementary charge.
//! Values follow the PDG review; widths of strong resonances are converted to
//! lifetimes via tau = hbar / Gamma.

/// Speed of light in cm/ns.
pub const SPEED_OF_LIGHT: f64 = 29.979_245_8;

/// Curvature constant: p_T [GeV] = `CURVATURE_CONSTANT` * B [T] * R [cm].
pub const CURVATURE_CONSTANT: f64 = 0.002_997_924_58;

/// Lifetime (ns) below which an internal particle is treated as a resonance
/// without its own resolvable decay vertex.
pub const RESONANCE_LIFETIME_CUT: f64 = 1e-5;

/// Static properties of one particle species.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdgEntry {
    /// PDG Monte Carlo code of the particle (positive code).
    pub code: i32,
    /// Name of the particle.
    pub name: &'static str,
    /// Name of the antiparticle.
    pub anti_name: &'static str,
    /// Nominal mass in GeV.
    pub mass: f64,
    /// Mean lifetime in ns (`f64::INFINITY` for stable particles).
    pub lifetime: f64,
    /// Charge of the particle with the positive code.
    pub charge: i32,
}

macro_rules! pdg {
    ($code:expr, $name:expr, $anti:expr, $mass:expr, $lifetime:expr, $charge:expr) => {
        PdgEntry {
            code: $code,
            name: $name,
            anti_name: $anti,
            mass: $mass,
            lifetime: $lifetime,
            charge: $charge,
        }
    };
}

static TABLE: &[PdgEntry] = &[
    pdg!(11, "e-", "e+", 0.000_510_999, f64::INFINITY, -1),
    pdg!(13, "mu-", "mu+", 0.105_658_4, 2_196.98, -1),
    pdg!(15, "tau-", "tau+", 1.776_86, 2.903e-4, -1),
    pdg!(22, "gamma", "gamma", 0.0, f64::INFINITY, 0),
    pdg!(111, "pi0", "pi0", 0.134_976_8, 8.43e-8, 0),
    pdg!(113, "rho0", "rho0", 0.775_26, 4.4e-15, 0),
    pdg!(130, "K_L0", "K_L0", 0.497_611, 51.16, 0),
    pdg!(211, "pi+", "pi-", 0.139_570_39, 26.033, 1),
    pdg!(213, "rho+", "rho-", 0.775_11, 4.4e-15, 1),
    pdg!(221, "eta", "eta", 0.547_862, 5.0e-10, 0),
    pdg!(223, "omega", "omega", 0.782_66, 7.75e-14, 0),
    pdg!(310, "K_S0", "K_S0", 0.497_611, 0.089_54, 0),
    pdg!(313, "K*0", "anti-K*0", 0.895_55, 1.39e-14, 0),
    pdg!(321, "K+", "K-", 0.493_677, 12.38, 1),
    pdg!(323, "K*+", "K*-", 0.891_67, 1.28e-14, 1),
    pdg!(333, "phi", "phi", 1.019_461, 1.55e-13, 0),
    pdg!(411, "D+", "D-", 1.869_66, 1.033e-3, 1),
    pdg!(413, "D*+", "D*-", 2.010_26, 7.89e-12, 1),
    pdg!(421, "D0", "anti-D0", 1.864_84, 4.101e-4, 0),
    pdg!(423, "D*0", "anti-D*0", 2.006_85, 3.1e-13, 0),
    pdg!(431, "D_s+", "D_s-", 1.968_35, 5.04e-4, 1),
    pdg!(443, "J/psi", "J/psi", 3.096_900, 7.1e-12, 0),
    pdg!(511, "B0", "anti-B0", 5.279_65, 1.519e-3, 0),
    pdg!(521, "B+", "B-", 5.279_34, 1.638e-3, 1),
    pdg!(531, "B_s0", "anti-B_s0", 5.366_88, 1.52e-3, 0),
    pdg!(2112, "n0", "anti-n0", 0.939_565, 8.794e11, 0),
    pdg!(2212, "p+", "anti-p-", 0.938_272, f64::INFINITY, 1),
    pdg!(3122, "Lambda0", "anti-Lambda0", 1.115_683, 0.263_2, 0),
    pdg!(3222, "Sigma+", "anti-Sigma-", 1.189_37, 0.080_18, 1),
    pdg!(3312, "Xi-", "anti-Xi+", 1.321_71, 0.163_9, -1),
    pdg!(4122, "Lambda_c+", "anti-Lambda_c-", 2.286_46, 2.02e-4, 1),
    pdg!(100443, "psi(2S)", "psi(2S)", 3.686_10, 2.24e-12, 0),
    pdg!(300553, "Upsilon(4S)", "Upsilon(4S)", 10.579_4, 3.2e-14, 0),
];

/// Properties of a particle as seen from a signed PDG code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleProperties {
    /// Signed PDG code.
    pub code: i32,
    /// Name including the antiparticle convention.
    pub name: &'static str,
    /// Nominal mass in GeV.
    pub mass: f64,
    /// Mean lifetime in ns.
    pub lifetime: f64,
    /// Charge with the sign of the code applied.
    pub charge: i32,
}

/// Looks up a signed PDG code.
///
/// Antiparticles (negative codes) share mass and lifetime with the
/// particle and carry the opposite charge.
pub fn lookup(code: i32) -> Option<ParticleProperties> {
    let abs = code.checked_abs()?;
    let entry = TABLE.iter().find(|e| e.code == abs)?;
    let anti = code < 0;
    Some(ParticleProperties {
        code,
        name: if anti { entry.anti_name } else { entry.name },
        mass: entry.mass,
        lifetime: entry.lifetime,
        charge: if anti { -entry.charge } else { entry.charge },
    })
}

/// Nominal mass for a PDG code, zero when unknown.
pub fn mass(code: i32) -> f64 {
    lookup(code).map_or(0.0, |p| p.mass)
}

/// Returns true when an internal particle with this code decays too fast
/// for its decay vertex to be separated from its production vertex.
///
/// Photons are excluded (an internal photon is a conversion with its own
/// vertex), electrons are included (bremsstrahlung recovery), and D*
/// mesons are kept as composites. Unknown codes are never resonances.
pub fn is_resonance(code: i32) -> bool {
    match code.unsigned_abs() {
        0 => false,
        22 => false,
        11 => true,
        413 | 423 => false,
        _ => lookup(code).is_some_and(|p| p.lifetime < RESONANCE_LIFETIME_CUT),
    }
}

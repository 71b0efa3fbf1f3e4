//! Force field energies and geometry minimization.
//!
//! Both force fields share the same term kinds: bond stretch, angle bend,
//! torsion, out-of-plane bend, van der Waals and electrostatics.
//!
//! - [`ForceField::Uff`]: harmonic stretch and bend, Lennard-Jones 12-6,
//!   Coulomb with a distance-dependent dielectric.
//! - [`ForceField::Mmff94`]: MMFF quartic stretch, cubic bend, buffered 14-7
//!   van der Waals and buffered Coulomb.
//!
//! Parameters are assigned per element and hybridization rather than from
//! the full typed tables. Charges come from [`gasteiger_charges`].

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use marsi_core::{MarsiError, Result};

use crate::element::{element_by_number, vdw_radius};
use crate::gasteiger::gasteiger_charges;
use crate::linalg::{self, Vec3};
use crate::molecule::{BondOrder, Hybridization, Molecule};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Force field used to relax embedded geometries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ForceField {
    Mmff94,
    Uff,
}

impl ForceField {
    /// Every supported force field.
    pub const ALL: [ForceField; 2] = [ForceField::Mmff94, ForceField::Uff];

    pub fn name(self) -> &'static str {
        match self {
            ForceField::Mmff94 => "mmff94",
            ForceField::Uff => "uff",
        }
    }
}

impl fmt::Display for ForceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ForceField {
    type Err = MarsiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mmff94" => Ok(ForceField::Mmff94),
            "uff" => Ok(ForceField::Uff),
            other => Err(MarsiError::InvalidFormat(format!(
                "unknown force field '{other}', expected one of: mmff94, uff"
            ))),
        }
    }
}

/// Energy contributions from each force field term (kcal/mol).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnergyComponents {
    pub bond_stretch: f64,
    pub angle_bend: f64,
    pub torsion: f64,
    pub out_of_plane: f64,
    pub van_der_waals: f64,
    pub electrostatic: f64,
    pub total: f64,
}

/// Minimization method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MinimizeMethod {
    SteepestDescent,
    ConjugateGradient,
}

/// Minimization configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MinimizeConfig {
    pub max_steps: usize,
    /// RMS gradient (kcal/mol/Å) below which minimization stops.
    pub gradient_threshold: f64,
    pub method: MinimizeMethod,
}

impl Default for MinimizeConfig {
    fn default() -> Self {
        MinimizeConfig {
            max_steps: 500,
            gradient_threshold: 0.1,
            method: MinimizeMethod::ConjugateGradient,
        }
    }
}

/// Result of energy minimization.
#[derive(Debug, Clone)]
pub struct MinimizeResult {
    pub coords: Vec<[f64; 3]>,
    pub initial_energy: f64,
    pub final_energy: f64,
    pub n_steps: usize,
    pub converged: bool,
}

// ---------------------------------------------------------------------------
// Terms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Stretch {
    a: usize,
    b: usize,
    r0: f64,
    k: f64,
}

#[derive(Debug, Clone, Copy)]
struct Bend {
    atoms: [usize; 3],
    theta0: f64,
    k: f64,
}

/// `E = ½[V1(1 + cos φ) + V2(1 − cos 2φ) + V3(1 + cos 3φ)]`.
#[derive(Debug, Clone, Copy)]
struct Torsion {
    atoms: [usize; 4],
    v: [f64; 3],
}

/// Wilson angle of `atoms[0]` out of the plane of the other three.
#[derive(Debug, Clone, Copy)]
struct Inversion {
    atoms: [usize; 4],
    k: f64,
}

#[derive(Debug, Clone, Copy)]
enum Vdw {
    LennardJones { x: f64, d: f64 },
    Buffered147 { r_star: f64, eps: f64 },
}

#[derive(Debug, Clone, Copy)]
struct Pair {
    a: usize,
    b: usize,
    vdw: Vdw,
    /// `332.0637 · qᵢ · qⱼ`, already scaled for 1-4 pairs.
    qq: f64,
}

const COULOMB: f64 = 332.0637;
const MMFF_STRETCH_CUBIC: f64 = -2.0;
const MMFF_BEND_CUBIC: f64 = -0.4;
const DIFF_STEP: f64 = 1e-5;

/// Force field terms for one molecule, built once and evaluated many times.
#[derive(Debug, Clone)]
pub struct ForceFieldModel {
    forcefield: ForceField,
    n_atoms: usize,
    stretches: Vec<Stretch>,
    bends: Vec<Bend>,
    torsions: Vec<Torsion>,
    inversions: Vec<Inversion>,
    pairs: Vec<Pair>,
}

impl ForceFieldModel {
    /// Assign parameters for every term in `mol`. Only explicit atoms take
    /// part; call [`Molecule::add_hydrogens`] first for all-atom energies.
    pub fn new(mol: &Molecule, forcefield: ForceField) -> Self {
        let n = mol.atom_count();
        let hybrid: Vec<Hybridization> = (0..n).map(|i| mol.hybridization(i)).collect();

        let stretches = mol
            .bonds
            .iter()
            .map(|bond| {
                let (za, zb) = (mol.atoms[bond.atom1].atomic_number, mol.atoms[bond.atom2].atomic_number);
                let r0 = rest_length(za, zb, bond.order, forcefield);
                Stretch {
                    a: bond.atom1,
                    b: bond.atom2,
                    r0,
                    k: stretch_constant(za, zb, r0, bond.order, forcefield),
                }
            })
            .collect();

        let mut bends = Vec::new();
        for center in 0..n {
            let nbs = mol.neighbors(center);
            let theta0 = ideal_angle(mol.atoms[center].atomic_number, hybrid[center], nbs.len());
            for x in 0..nbs.len() {
                for y in (x + 1)..nbs.len() {
                    let (a, b) = (nbs[x], nbs[y]);
                    let with_h = mol.atoms[a].is_hydrogen() || mol.atoms[b].is_hydrogen();
                    let k = match (forcefield, with_h) {
                        (ForceField::Uff, false) => 100.0,
                        (ForceField::Uff, true) => 70.0,
                        (ForceField::Mmff94, false) => 143.9325 * 0.75,
                        (ForceField::Mmff94, true) => 143.9325 * 0.55,
                    };
                    bends.push(Bend { atoms: [a, center, b], theta0, k });
                }
            }
        }

        let mut torsions = Vec::new();
        for bond in &mol.bonds {
            let (b, c) = (bond.atom1, bond.atom2);
            let Some(v) = torsion_barrier(hybrid[b], hybrid[c], bond.order, forcefield) else {
                continue;
            };
            let outer_b: Vec<usize> = mol.neighbors(b).into_iter().filter(|&a| a != c).collect();
            let outer_c: Vec<usize> = mol.neighbors(c).into_iter().filter(|&d| d != b).collect();
            if outer_b.is_empty() || outer_c.is_empty() {
                continue;
            }
            // UFF barriers are per bond and shared among its torsions.
            let share = match forcefield {
                ForceField::Uff => 1.0 / (outer_b.len() * outer_c.len()) as f64,
                ForceField::Mmff94 => 1.0,
            };
            for &a in &outer_b {
                for &d in &outer_c {
                    if a != d {
                        torsions.push(Torsion {
                            atoms: [a, b, c, d],
                            v: [v[0] * share, v[1] * share, v[2] * share],
                        });
                    }
                }
            }
        }

        let inversions = (0..n)
            .filter(|&i| hybrid[i] == Hybridization::Sp2 && mol.degree(i) == 3)
            .map(|i| {
                let nbs = mol.neighbors(i);
                let k = match forcefield {
                    ForceField::Uff => 6.0,
                    ForceField::Mmff94 => 15.0,
                };
                Inversion { atoms: [i, nbs[0], nbs[1], nbs[2]], k }
            })
            .collect();

        let charges = gasteiger_charges(mol);
        let mut pairs = Vec::new();
        for a in 0..n {
            let separation = bond_separation(mol, a, 3);
            for b in (a + 1)..n {
                let scale = match separation[b] {
                    Some(1 | 2) => continue,
                    Some(3) if forcefield == ForceField::Mmff94 => 0.75,
                    _ => 1.0,
                };
                let (za, zb) = (mol.atoms[a].atomic_number, mol.atoms[b].atomic_number);
                pairs.push(Pair {
                    a,
                    b,
                    vdw: vdw_pair(za, zb, forcefield),
                    qq: COULOMB * charges[a] * charges[b] * scale,
                });
            }
        }

        ForceFieldModel {
            forcefield,
            n_atoms: n,
            stretches,
            bends,
            torsions,
            inversions,
            pairs,
        }
    }

    pub fn forcefield(&self) -> ForceField {
        self.forcefield
    }

    fn check_len(&self, coords: &[Vec3]) -> Result<()> {
        if coords.len() != self.n_atoms {
            return Err(MarsiError::InvalidInput(format!(
                "{} coordinates for a molecule with {} atoms",
                coords.len(),
                self.n_atoms
            )));
        }
        Ok(())
    }

    /// Energy breakdown at `coords`.
    pub fn energy(&self, coords: &[[f64; 3]]) -> Result<EnergyComponents> {
        self.check_len(coords)?;
        Ok(self.evaluate(coords))
    }

    fn evaluate(&self, x: &[Vec3]) -> EnergyComponents {
        let mut e = EnergyComponents::default();
        for t in &self.stretches {
            e.bond_stretch += self.stretch_energy(t, linalg::distance(x[t.a], x[t.b]));
        }
        for t in &self.bends {
            let [a, c, b] = t.atoms;
            e.angle_bend += self.bend_energy(t, linalg::angle(x[a], x[c], x[b]));
        }
        for t in &self.torsions {
            let [a, b, c, d] = t.atoms;
            e.torsion += torsion_energy(&t.v, linalg::dihedral(x[a], x[b], x[c], x[d]));
        }
        for t in &self.inversions {
            let [c, a, b, d] = t.atoms;
            let chi = wilson_angle(x[c], x[a], x[b], x[d]);
            e.out_of_plane += 0.5 * t.k * chi * chi;
        }
        for t in &self.pairs {
            let r = linalg::distance(x[t.a], x[t.b]);
            e.van_der_waals += vdw_energy(t.vdw, r);
            e.electrostatic += self.coulomb_energy(t.qq, r);
        }
        e.total = e.bond_stretch + e.angle_bend + e.torsion + e.out_of_plane + e.van_der_waals + e.electrostatic;
        e
    }

    fn stretch_energy(&self, t: &Stretch, r: f64) -> f64 {
        let dr = r - t.r0;
        let harmonic = 0.5 * t.k * dr * dr;
        match self.forcefield {
            ForceField::Uff => harmonic,
            ForceField::Mmff94 => {
                let cs = MMFF_STRETCH_CUBIC;
                harmonic * (1.0 + cs * dr + 7.0 / 12.0 * cs * cs * dr * dr)
            }
        }
    }

    fn bend_energy(&self, t: &Bend, theta: f64) -> f64 {
        let d = theta - t.theta0;
        let harmonic = 0.5 * t.k * d * d;
        match self.forcefield {
            ForceField::Uff => harmonic,
            ForceField::Mmff94 => harmonic * (1.0 + MMFF_BEND_CUBIC * d).max(0.0),
        }
    }

    fn coulomb_energy(&self, qq: f64, r: f64) -> f64 {
        match self.forcefield {
            ForceField::Uff => qq / (r * r).max(1e-6),
            ForceField::Mmff94 => qq / (r + 0.05),
        }
    }

    /// Numerical gradient, term by term.
    fn gradient(&self, x: &[Vec3]) -> Vec<Vec3> {
        let mut g = vec![[0.0; 3]; x.len()];
        for t in &self.stretches {
            radial_gradient(&mut g, x, t.a, t.b, |r| self.stretch_energy(t, r));
        }
        for t in &self.pairs {
            radial_gradient(&mut g, x, t.a, t.b, |r| vdw_energy(t.vdw, r) + self.coulomb_energy(t.qq, r));
        }
        for t in &self.bends {
            local_gradient(&mut g, x, t.atoms, |p| self.bend_energy(t, linalg::angle(p[0], p[1], p[2])));
        }
        for t in &self.torsions {
            local_gradient(&mut g, x, t.atoms, |p| torsion_energy(&t.v, linalg::dihedral(p[0], p[1], p[2], p[3])));
        }
        for t in &self.inversions {
            local_gradient(&mut g, x, t.atoms, |p| {
                let chi = wilson_angle(p[0], p[1], p[2], p[3]);
                0.5 * t.k * chi * chi
            });
        }
        g
    }

    /// Relax `coords` for at most `config.max_steps` iterations.
    ///
    /// Each iteration moves along the (conjugate) negative gradient with a
    /// backtracking line search that caps the largest atomic displacement.
    /// Fails with [`MarsiError::Embedding`] if the energy or gradient stops
    /// being finite.
    pub fn minimize(&self, coords: &[[f64; 3]], config: &MinimizeConfig) -> Result<MinimizeResult> {
        self.check_len(coords)?;
        let mut current = coords.to_vec();
        let initial_energy = self.evaluate(&current).total;
        if !initial_energy.is_finite() {
            return Err(MarsiError::Embedding("start geometry has non-finite energy".into()));
        }

        let n = current.len().max(1);
        let mut energy = initial_energy;
        let mut direction = vec![[0.0; 3]; current.len()];
        let mut prev_norm2 = 0.0;
        let mut converged = false;
        let mut n_steps = 0;

        for step in 0..config.max_steps {
            let grad = self.gradient(&current);
            let norm2: f64 = grad.iter().map(|&v| linalg::dot(v, v)).sum();
            if !norm2.is_finite() {
                return Err(MarsiError::Embedding(format!(
                    "non-finite gradient at minimization step {step}"
                )));
            }
            if (norm2 / n as f64).sqrt() < config.gradient_threshold {
                converged = true;
                break;
            }
            n_steps = step + 1;

            let beta = match config.method {
                MinimizeMethod::ConjugateGradient if step > 0 && prev_norm2 > 1e-30 => (norm2 / prev_norm2).min(2.0),
                _ => 0.0,
            };
            for (d, &gi) in direction.iter_mut().zip(&grad) {
                *d = linalg::add(linalg::scale(gi, -1.0), linalg::scale(*d, beta));
            }
            let slope: f64 = direction.iter().zip(&grad).map(|(&d, &gi)| linalg::dot(d, gi)).sum();
            if slope >= 0.0 {
                // Not a descent direction: restart from steepest descent.
                for (d, &gi) in direction.iter_mut().zip(&grad) {
                    *d = linalg::scale(gi, -1.0);
                }
            }
            prev_norm2 = norm2;

            let longest = direction.iter().map(|&d| linalg::norm(d)).fold(0.0, f64::max);
            if longest < 1e-12 {
                converged = true;
                break;
            }
            let mut accepted = false;
            for max_move in [0.3, 0.1, 0.03, 0.01, 0.003] {
                let factor = max_move / longest;
                let trial: Vec<Vec3> = current
                    .iter()
                    .zip(&direction)
                    .map(|(&p, &d)| linalg::add(p, linalg::scale(d, factor)))
                    .collect();
                let e = self.evaluate(&trial).total;
                if e < energy {
                    current = trial;
                    energy = e;
                    accepted = true;
                    break;
                }
            }
            if !accepted {
                break;
            }
        }

        tracing::debug!(
            forcefield = %self.forcefield,
            steps = n_steps,
            initial_energy,
            final_energy = energy,
            converged,
            "minimization finished"
        );
        Ok(MinimizeResult {
            coords: current,
            initial_energy,
            final_energy: energy,
            n_steps,
            converged,
        })
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

fn covalent_radius(z: u8) -> f64 {
    element_by_number(z)
        .map(|e| e.covalent_radius)
        .filter(|&r| r > 0.0)
        .unwrap_or(0.77)
}

fn rest_length(za: u8, zb: u8, order: BondOrder, forcefield: ForceField) -> f64 {
    let correction = match (forcefield, order) {
        (_, BondOrder::Single) => 0.0,
        (ForceField::Uff, BondOrder::Aromatic) => -0.0332 * 3.0,
        (ForceField::Uff, BondOrder::Double) => -0.0668 * 3.0,
        (ForceField::Uff, BondOrder::Triple) => -0.0997 * 3.0,
        (ForceField::Mmff94, BondOrder::Aromatic) => -0.12,
        (ForceField::Mmff94, BondOrder::Double) => -0.20,
        (ForceField::Mmff94, BondOrder::Triple) => -0.34,
    };
    covalent_radius(za) + covalent_radius(zb) + correction
}

/// UFF effective nuclear charges used in the bond force constant.
fn uff_effective_charge(z: u8) -> f64 {
    match z {
        1 => 0.712,
        5 => 1.755,
        6 => 1.912,
        7 => 2.544,
        8 => 2.300,
        9 => 1.735,
        14 => 2.323,
        15 => 2.863,
        16 => 2.703,
        17 => 2.348,
        34 => 2.764,
        35 => 2.519,
        53 => 2.650,
        _ => 2.0,
    }
}

fn stretch_constant(za: u8, zb: u8, r0: f64, order: BondOrder, forcefield: ForceField) -> f64 {
    match forcefield {
        ForceField::Uff => 664.12 * uff_effective_charge(za) * uff_effective_charge(zb) / (r0 * r0 * r0),
        ForceField::Mmff94 => {
            let kb = match order {
                BondOrder::Single => 4.5,
                BondOrder::Aromatic => 6.0,
                BondOrder::Double => 9.5,
                BondOrder::Triple => 15.0,
            };
            let softness = |z: u8| match z {
                1 => 1.05,
                6 => 1.0,
                7 | 8 | 9 => 1.1,
                _ => 0.8,
            };
            143.9325 * kb * softness(za) * softness(zb)
        }
    }
}

/// Equilibrium angle in radians at a center with `degree` neighbors.
fn ideal_angle(z: u8, hybrid: Hybridization, degree: usize) -> f64 {
    let degrees = match hybrid {
        Hybridization::Sp => 180.0,
        Hybridization::Sp2 => 120.0,
        Hybridization::Sp3 if degree >= 4 => 109.47,
        Hybridization::Sp3 => match z {
            7 => 106.7,
            8 => 104.51,
            15 => 93.8,
            16 => 92.2,
            34 => 90.6,
            _ => 109.47,
        },
    };
    f64::to_radians(degrees)
}

/// Fourier torsion amplitudes `[V1, V2, V3]` for a central bond, or `None`
/// when the bond has no torsional barrier.
fn torsion_barrier(hb: Hybridization, hc: Hybridization, order: BondOrder, forcefield: ForceField) -> Option<[f64; 3]> {
    use Hybridization::*;
    if hb == Sp || hc == Sp || order == BondOrder::Triple {
        return None;
    }
    let v = match (forcefield, order, hb, hc) {
        (ForceField::Uff, BondOrder::Double, _, _) => [0.0, 19.5, 0.0],
        (ForceField::Uff, BondOrder::Aromatic, _, _) => [0.0, 13.5, 0.0],
        (ForceField::Uff, _, Sp3, Sp3) => [0.0, 0.0, 2.0],
        (ForceField::Uff, _, Sp2, Sp2) => [0.0, 5.0, 0.0],
        (ForceField::Uff, _, _, _) => [0.0, 0.0, 0.5],
        (ForceField::Mmff94, BondOrder::Double, _, _) => [0.0, 12.0, 0.0],
        (ForceField::Mmff94, BondOrder::Aromatic, _, _) => [0.0, 7.0, 0.0],
        (ForceField::Mmff94, _, Sp3, Sp3) => [0.1, 0.5, 0.3],
        (ForceField::Mmff94, _, Sp2, Sp2) => [0.0, 1.8, 0.0],
        (ForceField::Mmff94, _, _, _) => [0.0, 0.0, 0.05],
    };
    Some(v)
}

fn torsion_energy(v: &[f64; 3], phi: f64) -> f64 {
    0.5 * (v[0] * (1.0 + phi.cos()) + v[1] * (1.0 - (2.0 * phi).cos()) + v[2] * (1.0 + (3.0 * phi).cos()))
}

/// UFF van der Waals distance (Å) and well depth (kcal/mol).
fn uff_vdw(z: u8) -> (f64, f64) {
    match z {
        1 => (2.886, 0.044),
        5 => (4.083, 0.180),
        6 => (3.851, 0.105),
        7 => (3.660, 0.069),
        8 => (3.500, 0.060),
        9 => (3.364, 0.050),
        14 => (4.295, 0.402),
        15 => (4.147, 0.305),
        16 => (4.035, 0.274),
        17 => (3.947, 0.227),
        34 => (4.205, 0.291),
        35 => (4.189, 0.251),
        53 => (4.500, 0.339),
        _ => (2.26 * vdw_radius(z), 0.1),
    }
}

/// MMFF polarizability α, effective electrons N, scale A and factor G.
fn mmff_vdw(z: u8) -> (f64, f64, f64, f64) {
    match z {
        1 => (0.250, 0.800, 4.200, 1.209),
        6 => (1.050, 2.490, 3.890, 1.282),
        7 => (1.150, 2.820, 3.890, 1.282),
        8 => (0.700, 3.150, 3.890, 1.282),
        9 => (1.350, 5.100, 3.480, 1.282),
        14 => (4.500, 4.200, 3.320, 1.345),
        15 => (3.000, 4.800, 3.320, 1.345),
        16 => (3.900, 4.800, 3.320, 1.345),
        17 => (4.000, 5.100, 3.320, 1.345),
        35 => (5.000, 6.000, 3.190, 1.359),
        53 => (7.000, 6.950, 3.080, 1.404),
        _ => (1.050, 2.490, 3.890, 1.282),
    }
}

fn vdw_pair(za: u8, zb: u8, forcefield: ForceField) -> Vdw {
    match forcefield {
        ForceField::Uff => {
            let (xa, da) = uff_vdw(za);
            let (xb, db) = uff_vdw(zb);
            Vdw::LennardJones { x: (xa * xb).sqrt(), d: (da * db).sqrt() }
        }
        ForceField::Mmff94 => {
            let (aa, na, sa, ga) = mmff_vdw(za);
            let (ab, nb, sb, gb) = mmff_vdw(zb);
            let ra = sa * aa.powf(0.25);
            let rb = sb * ab.powf(0.25);
            let gamma = (ra - rb) / (ra + rb);
            let r_star = 0.5 * (ra + rb) * (1.0 + 0.2 * (1.0 - (-12.0 * gamma * gamma).exp()));
            let eps = 181.16 * ga * gb * aa * ab / ((aa / na).sqrt() + (ab / nb).sqrt()) / r_star.powi(6);
            Vdw::Buffered147 { r_star, eps }
        }
    }
}

fn vdw_energy(vdw: Vdw, r: f64) -> f64 {
    let r = r.max(1e-3);
    match vdw {
        Vdw::LennardJones { x, d } => {
            let r6 = (x / r).powi(6);
            d * (r6 * r6 - 2.0 * r6)
        }
        Vdw::Buffered147 { r_star, eps } => {
            let rep = (1.07 * r_star / (r + 0.07 * r_star)).powi(7);
            let r7 = r.powi(7);
            let s7 = r_star.powi(7);
            eps * rep * (1.12 * s7 / (r7 + 0.12 * s7) - 2.0)
        }
    }
}

fn wilson_angle(center: Vec3, a: Vec3, b: Vec3, c: Vec3) -> f64 {
    let va = linalg::sub(a, center);
    let n = linalg::cross(linalg::sub(b, center), linalg::sub(c, center));
    let denom = linalg::norm(va) * linalg::norm(n);
    if denom < 1e-12 {
        return 0.0;
    }
    (linalg::dot(va, n) / denom).clamp(-1.0, 1.0).asin()
}

/// Bond separation from `start` to every atom within `max_depth` bonds.
fn bond_separation(mol: &Molecule, start: usize, max_depth: usize) -> Vec<Option<usize>> {
    let mut depth = vec![None; mol.atom_count()];
    depth[start] = Some(0);
    let mut queue = VecDeque::from([start]);
    while let Some(atom) = queue.pop_front() {
        let d = depth[atom].unwrap_or(0);
        if d == max_depth {
            continue;
        }
        for &(nb, _) in &mol.adjacency[atom] {
            if depth[nb].is_none() {
                depth[nb] = Some(d + 1);
                queue.push_back(nb);
            }
        }
    }
    depth
}

// ---------------------------------------------------------------------------
// Numerical derivatives
// ---------------------------------------------------------------------------

fn radial_gradient(g: &mut [Vec3], x: &[Vec3], a: usize, b: usize, energy: impl Fn(f64) -> f64) {
    let d = linalg::sub(x[a], x[b]);
    let r = linalg::norm(d);
    if r < 1e-9 {
        return;
    }
    let de_dr = (energy(r + DIFF_STEP) - energy(r - DIFF_STEP)) / (2.0 * DIFF_STEP);
    let f = linalg::scale(d, de_dr / r);
    g[a] = linalg::add(g[a], f);
    g[b] = linalg::sub(g[b], f);
}

fn local_gradient<const N: usize>(
    g: &mut [Vec3],
    x: &[Vec3],
    atoms: [usize; N],
    energy: impl Fn(&[Vec3; N]) -> f64,
) {
    let mut p: [Vec3; N] = atoms.map(|i| x[i]);
    for k in 0..N {
        for dim in 0..3 {
            let orig = p[k][dim];
            p[k][dim] = orig + DIFF_STEP;
            let plus = energy(&p);
            p[k][dim] = orig - DIFF_STEP;
            let minus = energy(&p);
            p[k][dim] = orig;
            g[atoms[k]][dim] += (plus - minus) / (2.0 * DIFF_STEP);
        }
    }
}

//! 3D coordinate embedding via distance geometry.
//!
//! 1. Bounds matrix from covalent radii, ideal bond angles and van der Waals
//!    contact distances, smoothed with the triangle inequality.
//! 2. Random distances within the bounds, a double-centred metric matrix and
//!    its three dominant eigenvectors give the start geometry.
//! 3. A short pass on the bounds error removes gross violations.
//! 4. Force field minimization for the requested number of steps.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use marsi_core::{MarsiError, Result};

use crate::element::{element_by_number, vdw_radius};
use crate::forcefield::{ForceField, ForceFieldModel, MinimizeConfig, MinimizeMethod};
use crate::linalg::{self, Vec3};
use crate::molecule::{BondOrder, Hybridization, Molecule};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for 3D embedding.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmbedConfig {
    /// Force field for post-embedding optimization.
    pub forcefield: ForceField,
    /// Max minimization steps (0 = keep the distance geometry result).
    pub steps: usize,
    /// Random seed for distance sampling.
    pub seed: u64,
    /// RMS gradient at which minimization stops early.
    pub gradient_threshold: f64,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        EmbedConfig {
            forcefield: ForceField::Mmff94,
            steps: 500,
            seed: 42,
            gradient_threshold: 0.1,
        }
    }
}

/// Unconstrained upper bound before smoothing.
const FAR: f64 = 1000.0;
/// Energies above this (kcal/mol per atom) after minimization count as a blow-up.
const ENERGY_CEILING_PER_ATOM: f64 = 1.0e5;
const REFINE_ITERATIONS: usize = 300;

// ---------------------------------------------------------------------------
// Embedding
// ---------------------------------------------------------------------------

/// Give `mol` 3D coordinates, minimized with `forcefield` for up to `steps`
/// iterations.
///
/// Implicit hydrogens are made explicit first. The result is deterministic
/// for a given molecule; use [`embed_with_config`] to change the seed.
pub fn embed_3d(mol: &mut Molecule, forcefield: ForceField, steps: usize) -> Result<()> {
    let config = EmbedConfig {
        forcefield,
        steps,
        ..EmbedConfig::default()
    };
    embed_with_config(mol, &config)
}

/// [`embed_3d`] with every parameter explicit.
pub fn embed_with_config(mol: &mut Molecule, config: &EmbedConfig) -> Result<()> {
    if mol.is_empty() {
        return Err(MarsiError::EmptyMolecule("cannot embed a molecule with no atoms".into()));
    }
    if mol.has_implicit_hydrogens() {
        mol.add_hydrogens();
    }
    let n = mol.atom_count();
    if n == 1 {
        return mol.set_coordinates(&[[0.0; 3]]);
    }

    let (lower, upper) = build_bounds_matrix(mol);
    let (lower, upper) = smooth_bounds(lower, upper);

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut coords = embed_from_bounds(&lower, &upper, &mut rng);
    refine_to_bounds(&mut coords, &lower, &upper);
    check_finite(&coords, "distance geometry")?;

    if config.steps > 0 {
        let model = ForceFieldModel::new(mol, config.forcefield);
        let min_config = MinimizeConfig {
            max_steps: config.steps,
            gradient_threshold: config.gradient_threshold,
            method: MinimizeMethod::ConjugateGradient,
        };
        let result = model.minimize(&coords, &min_config)?;
        check_finite(&result.coords, "minimization")?;
        if !result.final_energy.is_finite() || result.final_energy > ENERGY_CEILING_PER_ATOM * n as f64 {
            return Err(MarsiError::Embedding(format!(
                "{} energy did not converge to a sane value ({:.3e} kcal/mol)",
                config.forcefield, result.final_energy
            )));
        }
        tracing::debug!(
            atoms = n,
            forcefield = %config.forcefield,
            steps = result.n_steps,
            energy = result.final_energy,
            converged = result.converged,
            "embedded molecule"
        );
        coords = result.coords;
    }

    mol.set_coordinates(&coords)
}

fn check_finite(coords: &[Vec3], stage: &str) -> Result<()> {
    if coords.iter().flatten().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(MarsiError::Embedding(format!("non-finite coordinates after {stage}")))
    }
}

// ---------------------------------------------------------------------------
// Bounds matrix construction
// ---------------------------------------------------------------------------

fn covalent_radius(z: u8) -> f64 {
    element_by_number(z)
        .map(|e| e.covalent_radius)
        .filter(|&r| r > 0.0)
        .unwrap_or(0.77)
}

fn build_bounds_matrix(mol: &Molecule) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let n = mol.atom_count();
    let mut lower = vec![vec![0.0_f64; n]; n];
    let mut upper = vec![vec![FAR; n]; n];
    for i in 0..n {
        upper[i][i] = 0.0;
    }

    // 1-2 distances
    for bond in &mol.bonds {
        let (a, b) = (bond.atom1, bond.atom2);
        let correction = match bond.order {
            BondOrder::Single => 0.0,
            BondOrder::Aromatic => -0.12,
            BondOrder::Double => -0.20,
            BondOrder::Triple => -0.34,
        };
        let d = covalent_radius(mol.atoms[a].atomic_number) + covalent_radius(mol.atoms[b].atomic_number) + correction;
        set_bounds(&mut lower, &mut upper, a, b, d - 0.03, d + 0.03);
    }

    // 1-3 distances from the ideal angle at the shared neighbor
    for j in 0..n {
        let neighbors = mol.neighbors(j);
        if neighbors.len() < 2 {
            continue;
        }
        let angle = match mol.hybridization(j) {
            Hybridization::Sp => 180.0_f64,
            Hybridization::Sp2 => 120.0,
            Hybridization::Sp3 => 109.5,
        }
        .to_radians();
        for x in 0..neighbors.len() {
            for y in (x + 1)..neighbors.len() {
                let (i, k) = (neighbors[x], neighbors[y]);
                let d_ij = 0.5 * (lower[i][j] + upper[i][j]);
                let d_jk = 0.5 * (lower[j][k] + upper[j][k]);
                let d13 = (d_ij * d_ij + d_jk * d_jk - 2.0 * d_ij * d_jk * angle.cos()).sqrt();
                // Ring closures may already have tightened the pair.
                if upper[i][k] < FAR {
                    continue;
                }
                set_bounds(&mut lower, &mut upper, i, k, d13 - 0.08, d13 + 0.08);
            }
        }
    }

    // Everything else keeps van der Waals contact.
    for i in 0..n {
        for j in (i + 1)..n {
            if upper[i][j] >= FAR {
                let contact = 0.7 * (vdw_radius(mol.atoms[i].atomic_number) + vdw_radius(mol.atoms[j].atomic_number));
                lower[i][j] = contact;
                lower[j][i] = contact;
            }
        }
    }

    (lower, upper)
}

fn set_bounds(lower: &mut [Vec<f64>], upper: &mut [Vec<f64>], a: usize, b: usize, lo: f64, hi: f64) {
    lower[a][b] = lo;
    lower[b][a] = lo;
    upper[a][b] = hi;
    upper[b][a] = hi;
}

/// Floyd-Warshall triangle inequality smoothing.
///
/// Pairs in different fragments keep no useful upper bound, so they are
/// capped a few Ångström beyond contact to keep fragments together.
fn smooth_bounds(mut lower: Vec<Vec<f64>>, mut upper: Vec<Vec<f64>>) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let n = lower.len();
    for k in 0..n {
        for i in 0..n {
            for j in 0..n {
                if i == j || i == k || j == k {
                    continue;
                }
                let sum = upper[i][k] + upper[k][j];
                if sum < upper[i][j] {
                    upper[i][j] = sum;
                }
                let diff = (lower[i][k] - upper[k][j]).max(lower[j][k] - upper[k][i]);
                if diff > lower[i][j] {
                    lower[i][j] = diff;
                }
            }
        }
    }

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if upper[i][j] >= FAR {
                upper[i][j] = lower[i][j] + 4.0;
            }
            if lower[i][j] > upper[i][j] {
                let avg = 0.5 * (lower[i][j] + upper[i][j]);
                lower[i][j] = avg;
                upper[i][j] = avg;
            }
            lower[i][j] = lower[i][j].max(0.0);
        }
    }

    (lower, upper)
}

// ---------------------------------------------------------------------------
// Metric matrix embedding
// ---------------------------------------------------------------------------

fn embed_from_bounds(lower: &[Vec<f64>], upper: &[Vec<f64>], rng: &mut ChaCha8Rng) -> Vec<Vec3> {
    let n = lower.len();
    let mut d2 = vec![vec![0.0_f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let lo = lower[i][j].max(0.001);
            let hi = upper[i][j].max(lo);
            let d = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
            d2[i][j] = d * d;
            d2[j][i] = d * d;
        }
    }

    // G = -1/2 · J · D² · J with J the centring projector.
    let row_mean: Vec<f64> = d2.iter().map(|row| row.iter().sum::<f64>() / n as f64).collect();
    let grand_mean = row_mean.iter().sum::<f64>() / n as f64;
    let mut g = vec![vec![0.0_f64; n]; n];
    for i in 0..n {
        for j in 0..n {
            g[i][j] = -0.5 * (d2[i][j] - row_mean[i] - row_mean[j] + grand_mean);
        }
    }

    let mut coords = vec![[0.0_f64; 3]; n];
    for dim in 0..3 {
        let (value, vector) = dominant_eigenpair(&g, rng);
        if value > 1e-6 {
            let s = value.sqrt();
            for i in 0..n {
                coords[i][dim] = vector[i] * s;
            }
        } else {
            // Flat or degenerate: a little noise lifts the plane.
            for c in coords.iter_mut() {
                c[dim] = rng.gen_range(-0.1..0.1);
            }
        }
        for i in 0..n {
            for j in 0..n {
                g[i][j] -= value * vector[i] * vector[j];
            }
        }
    }
    coords
}

/// Largest eigenvalue and unit eigenvector of a symmetric matrix.
///
/// Power iteration on `G + cI`, with `c` a Gershgorin bound so every
/// shifted eigenvalue is non-negative.
fn dominant_eigenpair(g: &[Vec<f64>], rng: &mut ChaCha8Rng) -> (f64, Vec<f64>) {
    let n = g.len();
    let shift = g
        .iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max);
    let mut v: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    normalize(&mut v);

    let mut value = 0.0;
    for _ in 0..500 {
        let mut mv = vec![0.0_f64; n];
        for i in 0..n {
            mv[i] = shift * v[i] + (0..n).map(|j| g[i][j] * v[j]).sum::<f64>();
        }
        let rayleigh: f64 = mv.iter().zip(&v).map(|(a, b)| a * b).sum();
        if normalize(&mut mv) < 1e-15 {
            break;
        }
        let change: f64 = mv.iter().zip(&v).map(|(a, b)| (a - b).abs()).sum();
        v = mv;
        value = rayleigh - shift;
        if change < 1e-10 {
            break;
        }
    }
    (value, v)
}

fn normalize(v: &mut [f64]) -> f64 {
    let len = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if len > 1e-15 {
        for x in v.iter_mut() {
            *x /= len;
        }
    }
    len
}

/// Gradient descent on the squared bounds violations.
fn refine_to_bounds(coords: &mut [Vec3], lower: &[Vec<f64>], upper: &[Vec<f64>]) {
    let n = coords.len();
    for _ in 0..REFINE_ITERATIONS {
        let mut grad = vec![[0.0_f64; 3]; n];
        let mut error = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let diff = linalg::sub(coords[i], coords[j]);
                let d = linalg::norm(diff).max(1e-6);
                let violation = if d > upper[i][j] {
                    d - upper[i][j]
                } else if d < lower[i][j] {
                    d - lower[i][j]
                } else {
                    continue;
                };
                error += violation * violation;
                let f = linalg::scale(diff, violation / d);
                grad[i] = linalg::add(grad[i], f);
                grad[j] = linalg::sub(grad[j], f);
            }
        }
        if error < 1e-6 {
            break;
        }
        for (c, g) in coords.iter_mut().zip(&grad) {
            *c = linalg::sub(*c, linalg::scale(*g, 0.1));
        }
    }
}

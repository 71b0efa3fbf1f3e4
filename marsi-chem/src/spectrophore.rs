//! Spectrophores: 48 rotation-sampled interaction energies between a
//! molecule's atomic properties and a cage of point probes.
//!
//! The molecule is centred on its centroid and turned onto its principal
//! axes. Twelve unit probes sit on the edge midpoints of a cube that encloses
//! every atom with `resolution` Å to spare. For each of twelve ±1 charge
//! patterns over the probes, the interaction energy
//!
//! ```text
//! E = Σ_probes Σ_atoms charge_probe · property_atom / distance
//! ```
//!
//! is minimised over cage orientations sampled every `accuracy` degrees
//! around each axis. The twelve minima of one property form a block, sorted
//! ascending. Blocks are, in order: Gasteiger partial charge, Crippen logP
//! contribution, shape deviation and electrophilicity.

use marsi_core::{MarsiError, Result};

use crate::element::element_by_number;
use crate::gasteiger::gasteiger_charges;
use crate::linalg::{centroid, distance, sub, symmetric_eigen, Matrix3x3, Vec3};
use crate::molecule::Molecule;
use crate::properties::crippen_contributions;

/// Number of values in a spectrophore.
pub const SPECTROPHORE_LENGTH: usize = 48;

const PROBES: usize = 12;
const PROPERTIES: usize = 4;

/// Per-block scaling applied after the energies are sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Normalization {
    #[default]
    None,
    ZeroMean,
    UnitStd,
    ZeroMeanAndUnitStd,
}

/// Finest rotation increment accepted, in degrees.
pub const MIN_ACCURACY: f64 = 1.0;

/// Spectrophore parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpectrophoreConfig {
    /// Clearance in Å between the outermost atom and the probe cage.
    pub resolution: f64,
    /// Rotation increment in degrees, at least [`MIN_ACCURACY`].
    pub accuracy: f64,
    pub normalization: Normalization,
}

impl Default for SpectrophoreConfig {
    fn default() -> Self {
        Self {
            resolution: 3.0,
            accuracy: 30.0,
            normalization: Normalization::None,
        }
    }
}

/// Spectrophore of a 3-D molecule with default parameters.
pub fn spectrophore(mol: &Molecule) -> Result<[f64; SPECTROPHORE_LENGTH]> {
    spectrophore_with_config(mol, &SpectrophoreConfig::default())
}

/// Spectrophore of a 3-D molecule.
///
/// Fails with [`MarsiError::EmptyMolecule`] for a molecule without atoms and
/// with [`MarsiError::InvalidInput`] when it has no 3-D coordinates or the
/// parameters are out of range.
pub fn spectrophore_with_config(mol: &Molecule, config: &SpectrophoreConfig) -> Result<[f64; SPECTROPHORE_LENGTH]> {
    if mol.is_empty() {
        return Err(MarsiError::EmptyMolecule(format!("molecule '{}' has no atoms", mol.name)));
    }
    if !mol.has_3d {
        return Err(MarsiError::InvalidInput(format!(
            "molecule '{}' has no 3-D coordinates; embed it first",
            mol.name
        )));
    }
    if !(config.resolution > 0.0 && config.resolution.is_finite()) {
        return Err(MarsiError::InvalidInput(format!("resolution must be positive, got {}", config.resolution)));
    }
    if !(MIN_ACCURACY..=360.0).contains(&config.accuracy) {
        return Err(MarsiError::InvalidInput(format!(
            "accuracy must be in [{MIN_ACCURACY}, 360] degrees, got {}",
            config.accuracy
        )));
    }

    let coords = principal_frame(&mol.coordinates());
    let properties = atom_properties(mol, &coords);
    let radius = coords.iter().map(|p| distance(*p, [0.0; 3])).fold(0.0, f64::max);
    let probes = probe_cage(radius + config.resolution);
    let patterns = charge_patterns();

    let steps = ((360.0 / config.accuracy).round() as usize).max(1);
    let increment = (360.0 / steps as f64).to_radians();
    tracing::debug!(atoms = coords.len(), steps, "spectrophore");

    let mut minima = [[f64::INFINITY; PROBES]; PROPERTIES];
    for ix in 0..steps {
        for iy in 0..steps {
            for iz in 0..steps {
                let rotation = euler_rotation(ix as f64 * increment, iy as f64 * increment, iz as f64 * increment);
                let mut probe_sums = [[0.0f64; PROBES]; PROPERTIES];
                for (k, probe) in probes.iter().enumerate() {
                    let p = rotation.apply(*probe);
                    for (atom, pos) in coords.iter().enumerate() {
                        let inv = 1.0 / distance(p, *pos);
                        for (prop, sums) in probe_sums.iter_mut().enumerate() {
                            sums[k] += properties[prop][atom] * inv;
                        }
                    }
                }
                for (prop, sums) in probe_sums.iter().enumerate() {
                    for (c, pattern) in patterns.iter().enumerate() {
                        let energy: f64 = pattern.iter().zip(sums).map(|(q, s)| q * s).sum();
                        if energy < minima[prop][c] {
                            minima[prop][c] = energy;
                        }
                    }
                }
            }
        }
    }

    let mut out = [0.0; SPECTROPHORE_LENGTH];
    for (prop, block) in minima.iter_mut().enumerate() {
        block.sort_by(f64::total_cmp);
        normalize(block, config.normalization);
        out[prop * PROBES..(prop + 1) * PROBES].copy_from_slice(block);
    }
    Ok(out)
}

/// Coordinates centred on the centroid and expressed in the principal axes
/// of the atom positions, largest spread first.
fn principal_frame(coords: &[Vec3]) -> Vec<Vec3> {
    let center = centroid(coords);
    let centred: Vec<Vec3> = coords.iter().map(|p| sub(*p, center)).collect();
    let mut covariance = Matrix3x3::zeros();
    for p in &centred {
        for i in 0..3 {
            for j in 0..3 {
                covariance.data[i][j] += p[i] * p[j];
            }
        }
    }
    let (axes, _) = symmetric_eigen(&covariance);
    let to_frame = axes.transpose();
    centred.iter().map(|p| to_frame.apply(*p)).collect()
}

/// Per-atom property columns in block order.
fn atom_properties(mol: &Molecule, coords: &[Vec3]) -> [Vec<f64>; PROPERTIES] {
    let charges = gasteiger_charges(mol);
    let lipophilicity: Vec<f64> = crippen_contributions(mol).into_iter().map(|(logp, _)| logp).collect();

    let radial: Vec<f64> = coords.iter().map(|p| distance(*p, [0.0; 3])).collect();
    let mean = radial.iter().sum::<f64>() / radial.len() as f64;
    let shape: Vec<f64> = radial.iter().map(|r| r - mean).collect();

    let electrophilicity: Vec<f64> = mol
        .atoms
        .iter()
        .zip(&charges)
        .map(|(a, &q)| electrophilicity_index(a.atomic_number) * (1.0 + q))
        .collect();

    [charges, lipophilicity, shape, electrophilicity]
}

/// Parr electrophilicity ω = χ² / 2η (eV) from absolute electronegativity and
/// hardness; other elements fall back to a Pauling-scale estimate.
fn electrophilicity_index(z: u8) -> f64 {
    let (chi, eta) = match z {
        1 => (7.18, 6.43),
        5 => (4.29, 4.01),
        6 => (6.27, 5.00),
        7 => (7.30, 7.23),
        8 => (7.54, 6.08),
        9 => (10.41, 7.01),
        14 => (4.77, 3.38),
        15 => (5.62, 4.88),
        16 => (6.22, 4.14),
        17 => (8.30, 4.68),
        35 => (7.59, 4.22),
        53 => (6.76, 3.69),
        _ => {
            let pauling = element_by_number(z).map_or(0.0, |e| e.electronegativity);
            (2.8 * pauling, 5.0)
        }
    };
    chi * chi / (2.0 * eta)
}

/// Edge midpoints of a cube with half-side `half`.
fn probe_cage(half: f64) -> [Vec3; PROBES] {
    [
        [half, half, 0.0],
        [half, 0.0, half],
        [0.0, half, half],
        [-half, half, 0.0],
        [-half, 0.0, half],
        [0.0, -half, half],
        [-half, -half, 0.0],
        [-half, 0.0, -half],
        [0.0, -half, -half],
        [half, -half, 0.0],
        [half, 0.0, -half],
        [0.0, half, -half],
    ]
}

/// Twelve ±1 assignments: pattern `j` charges probes `j..j+6` (cyclic)
/// positive and the rest negative.
fn charge_patterns() -> [[f64; PROBES]; PROBES] {
    let mut patterns = [[0.0; PROBES]; PROBES];
    for (j, pattern) in patterns.iter_mut().enumerate() {
        for (k, q) in pattern.iter_mut().enumerate() {
            *q = if (k + PROBES - j) % PROBES < PROBES / 2 { 1.0 } else { -1.0 };
        }
    }
    patterns
}

/// `Rz(c) · Ry(b) · Rx(a)`.
fn euler_rotation(a: f64, b: f64, c: f64) -> Matrix3x3 {
    let (sa, ca) = a.sin_cos();
    let (sb, cb) = b.sin_cos();
    let (sc, cc) = c.sin_cos();
    let rx = Matrix3x3 { data: [[1.0, 0.0, 0.0], [0.0, ca, -sa], [0.0, sa, ca]] };
    let ry = Matrix3x3 { data: [[cb, 0.0, sb], [0.0, 1.0, 0.0], [-sb, 0.0, cb]] };
    let rz = Matrix3x3 { data: [[cc, -sc, 0.0], [sc, cc, 0.0], [0.0, 0.0, 1.0]] };
    rz.multiply(&ry).multiply(&rx)
}

fn normalize(block: &mut [f64], mode: Normalization) {
    let n = block.len() as f64;
    let mean = block.iter().sum::<f64>() / n;
    let std = (block.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    let (shift, scale) = match mode {
        Normalization::None => return,
        Normalization::ZeroMean => (mean, 1.0),
        Normalization::UnitStd => (0.0, std),
        Normalization::ZeroMeanAndUnitStd => (mean, std),
    };
    let scale = if scale > 1e-12 { scale } else { 1.0 };
    for v in block.iter_mut() {
        *v = (*v - shift) / scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::embed_3d;
    use crate::forcefield::ForceField;
    use crate::smiles::parse_smiles;

    fn embedded(smiles: &str) -> Molecule {
        let mut mol = parse_smiles(smiles).unwrap();
        embed_3d(&mut mol, ForceField::Mmff94, 200).unwrap();
        mol
    }

    fn block(values: &[f64; SPECTROPHORE_LENGTH], b: usize) -> &[f64] {
        &values[b * PROBES..(b + 1) * PROBES]
    }

    #[test]
    fn blocks_are_sorted_and_finite() {
        let s = spectrophore(&embedded("CC(=O)O")).unwrap();
        assert_eq!(s.len(), 48);
        assert!(s.iter().all(|v| v.is_finite()));
        for b in 0..PROPERTIES {
            assert!(block(&s, b).windows(2).all(|w| w[0] <= w[1]), "block {b} not sorted");
        }
    }

    #[test]
    fn deterministic_and_translation_invariant() {
        let mol = embedded("CCN");
        let a = spectrophore(&mol).unwrap();
        assert_eq!(a, spectrophore(&mol).unwrap());

        let mut shifted = mol.clone();
        let moved: Vec<[f64; 3]> = mol.coordinates().iter().map(|p| [p[0] + 5.0, p[1] - 2.0, p[2] + 1.0]).collect();
        shifted.set_coordinates(&moved).unwrap();
        let b = spectrophore(&shifted).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6, "{x} vs {y}");
        }
    }

    #[test]
    fn normalization_modes() {
        let mol = embedded("OCC(=O)N");
        let zero_mean = spectrophore_with_config(
            &mol,
            &SpectrophoreConfig { normalization: Normalization::ZeroMean, ..Default::default() },
        )
        .unwrap();
        let both = spectrophore_with_config(
            &mol,
            &SpectrophoreConfig { normalization: Normalization::ZeroMeanAndUnitStd, ..Default::default() },
        )
        .unwrap();
        for b in 0..PROPERTIES {
            let mean: f64 = block(&zero_mean, b).iter().sum::<f64>() / 12.0;
            assert!(mean.abs() < 1e-9);
            let values = block(&both, b);
            let mean: f64 = values.iter().sum::<f64>() / 12.0;
            let var: f64 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 12.0;
            assert!(mean.abs() < 1e-9);
            assert!((var.sqrt() - 1.0).abs() < 1e-9 || var < 1e-12);
        }
    }

    #[test]
    fn coarser_sampling_never_finds_lower_minima() {
        // 90° orientations are a subset of the 30° ones.
        let mol = embedded("CCO");
        let fine = spectrophore(&mol).unwrap();
        let coarse = spectrophore_with_config(&mol, &SpectrophoreConfig { accuracy: 90.0, ..Default::default() }).unwrap();
        let sum = |s: &[f64; 48]| s.iter().sum::<f64>();
        assert!(sum(&fine) <= sum(&coarse) + 1e-9);
    }

    #[test]
    fn requires_coordinates_and_atoms() {
        let flat = parse_smiles("CCO").unwrap();
        assert!(matches!(spectrophore(&flat), Err(MarsiError::InvalidInput(_))));
        let empty = Molecule::new(String::new(), vec![], vec![]);
        assert!(matches!(spectrophore(&empty), Err(MarsiError::EmptyMolecule(_))));
        let mol = embedded("C");
        for accuracy in [0.0, 1e-30, 0.5, f64::NAN, 361.0] {
            let bad = SpectrophoreConfig { accuracy, ..Default::default() };
            assert!(
                matches!(spectrophore_with_config(&mol, &bad), Err(MarsiError::InvalidInput(_))),
                "{accuracy}"
            );
        }
    }

    #[test]
    fn charge_patterns_are_balanced() {
        for pattern in charge_patterns() {
            assert_eq!(pattern.iter().sum::<f64>(), 0.0);
        }
    }
}

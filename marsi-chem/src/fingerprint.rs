//! Molecular fingerprints and similarity.
//!
//! A [`Fingerprint`] is the sparse set of 1-based bit indices a format turns
//! on. [`fingerprint_to_bits`] expands it into a dense [`BitArray`].
//!
//! | format  | content                                        | width |
//! |---------|------------------------------------------------|-------|
//! | `maccs` | MACCS 166 structural keys                      | 166   |
//! | `fp2`   | hashed linear paths of 1 to 7 atoms            | 1024  |
//! | `ecfp4` | hashed Morgan environments up to radius 2      | 1024  |

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use marsi_core::hash::sha256;
use marsi_core::{BitArray, ContentAddressable, MarsiError, Result};

use crate::maccs::maccs_keys;
use crate::molecule::Molecule;
use crate::ring;

/// Names accepted by [`fingerprint`].
pub const FINGERPRINT_FORMATS: [&str; 3] = ["maccs", "fp2", "ecfp4"];

/// Dense length used when no width is requested.
pub const DEFAULT_FINGERPRINT_BITS: usize = 1024;

const HASHED_WIDTH: usize = 1024;
const FP2_MAX_PATH_ATOMS: usize = 7;
const ECFP4_RADIUS: usize = 2;

/// Fingerprint format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FingerprintFormat {
    Maccs,
    Fp2,
    Ecfp4,
}

impl FingerprintFormat {
    pub fn name(self) -> &'static str {
        match self {
            FingerprintFormat::Maccs => "maccs",
            FingerprintFormat::Fp2 => "fp2",
            FingerprintFormat::Ecfp4 => "ecfp4",
        }
    }

    /// Number of distinct bit positions the format can produce.
    pub fn width(self) -> usize {
        match self {
            FingerprintFormat::Maccs => 166,
            FingerprintFormat::Fp2 | FingerprintFormat::Ecfp4 => HASHED_WIDTH,
        }
    }
}

impl fmt::Display for FingerprintFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FingerprintFormat {
    type Err = MarsiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "maccs" => Ok(FingerprintFormat::Maccs),
            "fp2" => Ok(FingerprintFormat::Fp2),
            "ecfp4" => Ok(FingerprintFormat::Ecfp4),
            other => Err(MarsiError::InvalidFormat(format!(
                "unknown fingerprint format '{other}', expected one of: {}",
                FINGERPRINT_FORMATS.join(", ")
            ))),
        }
    }
}

/// Sparse fingerprint: set bits are 1-based indices below or at `width`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fingerprint {
    format: FingerprintFormat,
    bits: BTreeSet<usize>,
}

impl Fingerprint {
    pub(crate) fn new(format: FingerprintFormat, bits: BTreeSet<usize>) -> Self {
        Fingerprint { format, bits }
    }

    pub fn format(&self) -> FingerprintFormat {
        self.format
    }

    pub fn width(&self) -> usize {
        self.format.width()
    }

    /// Set bit indices in ascending order.
    pub fn bits(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().copied()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.bits.contains(&index)
    }

    pub fn count_ones(&self) -> usize {
        self.bits.len()
    }
}

impl ContentAddressable for Fingerprint {
    fn content_hash(&self) -> String {
        let mut bytes = self.format.name().as_bytes().to_vec();
        for &b in &self.bits {
            bytes.extend_from_slice(&(b as u64).to_le_bytes());
        }
        sha256(&bytes)
    }
}

/// Fingerprint of `mol` in the named format (`maccs`, `fp2` or `ecfp4`).
///
/// Hydrogens are folded into their parents first, so the result does not
/// depend on whether hydrogens are explicit.
///
/// ```
/// use marsi_chem::{fingerprint, parse_smiles};
///
/// let aspirin = parse_smiles("CC(=O)Oc1ccccc1C(=O)O").unwrap();
/// let fp = fingerprint(&aspirin, "maccs").unwrap();
/// assert!(fp.bits().all(|b| (1..=166).contains(&b)));
/// assert!(fingerprint(&aspirin, "morgan").is_err());
/// ```
pub fn fingerprint(mol: &Molecule, fp_format: &str) -> Result<Fingerprint> {
    let format: FingerprintFormat = fp_format.parse()?;
    let (skeleton, _) = mol.heavy_skeleton();
    let bits = match format {
        FingerprintFormat::Maccs => maccs_keys(&skeleton),
        FingerprintFormat::Fp2 => path_bits(&skeleton),
        FingerprintFormat::Ecfp4 => morgan_bits(&skeleton, ECFP4_RADIUS),
    };
    Ok(Fingerprint::new(format, bits))
}

/// Dense bit array of length `bits`: index `i` sets position `i - 1`.
///
/// Indices above `bits` are dropped.
pub fn fingerprint_to_bits(fp: &Fingerprint, bits: usize) -> BitArray {
    let mut dense = BitArray::zeros(bits);
    for i in fp.bits().filter(|&i| i >= 1) {
        // Indices ascend, so the first one out of range ends the expansion.
        if dense.set(i - 1).is_err() {
            break;
        }
    }
    dense
}

/// Tanimoto similarity coefficient between two fingerprints.
///
/// Returns 1.0 for identical fingerprints (including two empty ones) and 0.0
/// for disjoint ones.
pub fn tanimoto(fp1: &Fingerprint, fp2: &Fingerprint) -> f64 {
    let common = fp1.bits.intersection(&fp2.bits).count();
    let union = fp1.bits.len() + fp2.bits.len() - common;
    if union == 0 {
        return 1.0;
    }
    common as f64 / union as f64
}

// ---------------------------------------------------------------------------
// FP2: linear paths
// ---------------------------------------------------------------------------

/// Hash every simple path of up to seven atoms. Lone C and N atoms are
/// skipped.
fn path_bits(mol: &Molecule) -> BTreeSet<usize> {
    let mut bits = BTreeSet::new();
    let mut path = Vec::with_capacity(FP2_MAX_PATH_ATOMS);
    let mut on_path = vec![false; mol.atom_count()];
    for start in 0..mol.atom_count() {
        path.push(start);
        on_path[start] = true;
        extend_path(mol, &mut path, &mut on_path, &mut bits);
        on_path[start] = false;
        path.pop();
    }
    bits
}

fn extend_path(mol: &Molecule, path: &mut Vec<usize>, on_path: &mut [bool], bits: &mut BTreeSet<usize>) {
    let z = mol.atoms[path[0]].atomic_number;
    if !(path.len() == 1 && (z == 6 || z == 7)) {
        bits.insert(fold(path_hash(mol, path), HASHED_WIDTH));
    }
    if path.len() == FP2_MAX_PATH_ATOMS {
        return;
    }
    let last = path[path.len() - 1];
    for &(nb, _) in &mol.adjacency[last] {
        if on_path[nb] {
            continue;
        }
        path.push(nb);
        on_path[nb] = true;
        extend_path(mol, path, on_path, bits);
        on_path[nb] = false;
        path.pop();
    }
}

/// Hash of a path that is the same read in either direction.
fn path_hash(mol: &Molecule, path: &[usize]) -> u64 {
    let tokens = |atoms: &mut dyn Iterator<Item = usize>| -> Vec<u64> {
        let atoms: Vec<usize> = atoms.collect();
        let mut out = Vec::with_capacity(atoms.len() * 2);
        for (k, &a) in atoms.iter().enumerate() {
            let atom = &mol.atoms[a];
            out.push(u64::from(atom.atomic_number) << 1 | u64::from(atom.is_aromatic));
            if let Some(&next) = atoms.get(k + 1) {
                let order = mol.get_bond(a, next).map_or(0, |b| b.order as u64 + 1);
                out.push(order);
            }
        }
        out
    };
    let forward = tokens(&mut path.iter().copied());
    let backward = tokens(&mut path.iter().rev().copied());
    let canonical = forward.min(backward);
    canonical.iter().fold(fnv1a_init(), |h, &t| fnv1a_update(h, t))
}

// ---------------------------------------------------------------------------
// ECFP: Morgan environments
// ---------------------------------------------------------------------------

fn morgan_bits(mol: &Molecule, radius: usize) -> BTreeSet<usize> {
    let n = mol.atom_count();
    let mut bits = BTreeSet::new();
    if n == 0 {
        return bits;
    }
    let in_ring = ring::ring_atoms(mol);

    let mut identifiers: Vec<u64> = mol
        .atoms
        .iter()
        .enumerate()
        .map(|(i, atom)| {
            [
                u64::from(atom.atomic_number),
                mol.degree(i) as u64,
                u64::from(atom.implicit_hydrogens),
                atom.formal_charge as u64,
                u64::from(in_ring[i]),
                u64::from(atom.is_aromatic),
            ]
            .iter()
            .fold(fnv1a_init(), |h, &v| fnv1a_update(h, v))
        })
        .collect();
    bits.extend(identifiers.iter().map(|&id| fold(id, HASHED_WIDTH)));

    for _ in 0..radius {
        let next: Vec<u64> = (0..n)
            .map(|i| {
                let mut neighbors: Vec<(u64, u64)> = mol.adjacency[i]
                    .iter()
                    .map(|&(nb, bi)| (identifiers[nb], mol.bonds[bi].order as u64))
                    .collect();
                neighbors.sort_unstable();
                neighbors
                    .iter()
                    .fold(fnv1a_update(fnv1a_init(), identifiers[i]), |h, &(id, order)| {
                        fnv1a_update(fnv1a_update(h, id), order)
                    })
            })
            .collect();
        bits.extend(next.iter().map(|&id| fold(id, HASHED_WIDTH)));
        identifiers = next;
    }
    bits
}

// FNV-1a over little-endian u64 words.
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv1a_init() -> u64 {
    FNV_OFFSET
}

fn fnv1a_update(hash: u64, value: u64) -> u64 {
    value
        .to_le_bytes()
        .iter()
        .fold(hash, |h, &b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

/// 1-based bit index for a hash.
fn fold(hash: u64, width: usize) -> usize {
    (hash % width as u64) as usize + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    #[test]
    fn format_names() {
        for name in FINGERPRINT_FORMATS {
            let format: FingerprintFormat = name.parse().unwrap();
            assert_eq!(format.name(), name);
        }
        let err = "morgan".parse::<FingerprintFormat>().unwrap_err();
        assert!(matches!(err, MarsiError::InvalidFormat(_)));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let mol = parse_smiles("CCO").unwrap();
        assert!(matches!(fingerprint(&mol, "fp4"), Err(MarsiError::InvalidFormat(_))));
    }

    #[test]
    fn bits_stay_within_width() {
        let mol = parse_smiles("CC(=O)Oc1ccccc1C(=O)O").unwrap();
        for name in FINGERPRINT_FORMATS {
            let fp = fingerprint(&mol, name).unwrap();
            assert!(fp.count_ones() > 0, "{name}");
            assert!(fp.bits().all(|b| b >= 1 && b <= fp.width()), "{name}");
        }
    }

    #[test]
    fn deterministic_and_hydrogen_independent() {
        let mut mol = parse_smiles("c1ccccc1O").unwrap();
        let before: Vec<_> = FINGERPRINT_FORMATS.iter().map(|f| fingerprint(&mol, f).unwrap()).collect();
        mol.add_hydrogens();
        for (name, expected) in FINGERPRINT_FORMATS.iter().zip(&before) {
            let fp = fingerprint(&mol, name).unwrap();
            assert_eq!(&fp, expected, "{name}");
            assert_eq!(fp.content_hash(), expected.content_hash());
        }
    }

    #[test]
    fn truncation_to_ten_bits() {
        let mol = parse_smiles("CC(=O)Oc1ccccc1C(=O)O").unwrap();
        let fp = fingerprint(&mol, "maccs").unwrap();
        let dense = fingerprint_to_bits(&fp, 10);
        assert_eq!(dense.len(), 10);
        for i in 0..10 {
            assert_eq!(dense.get(i), Some(fp.contains(i + 1)));
        }
        assert_eq!(dense.get(10), None);
    }

    #[test]
    fn default_width_expansion() {
        let mol = parse_smiles("CCN").unwrap();
        let fp = fingerprint(&mol, "ecfp4").unwrap();
        let dense = fingerprint_to_bits(&fp, DEFAULT_FINGERPRINT_BITS);
        assert_eq!(dense.len(), 1024);
        assert_eq!(dense.count_ones(), fp.count_ones());
        assert_eq!(dense.ones(), fp.bits().map(|b| b - 1).collect::<Vec<_>>());
    }

    #[test]
    fn path_fingerprint_reads_both_directions() {
        // Same paths regardless of atom order.
        let a = fingerprint(&parse_smiles("OCCN").unwrap(), "fp2").unwrap();
        let b = fingerprint(&parse_smiles("NCCO").unwrap(), "fp2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tanimoto_values() {
        let ethanol = fingerprint(&parse_smiles("CCO").unwrap(), "ecfp4").unwrap();
        let propanol = fingerprint(&parse_smiles("CCCO").unwrap(), "ecfp4").unwrap();
        assert!((tanimoto(&ethanol, &ethanol) - 1.0).abs() < 1e-12);
        let sim = tanimoto(&ethanol, &propanol);
        assert!(sim > 0.0 && sim < 1.0, "tanimoto = {sim}");
        let empty = Fingerprint::new(FingerprintFormat::Fp2, BTreeSet::new());
        assert_eq!(tanimoto(&empty, &empty), 1.0);
        assert_eq!(tanimoto(&empty, &ethanol), 0.0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn dense_form_never_exceeds_length(n in 0usize..200, chain in 1usize..15) {
                let mol = parse_smiles(&"CO".repeat(chain)).unwrap();
                for name in FINGERPRINT_FORMATS {
                    let fp = fingerprint(&mol, name).unwrap();
                    let dense = fingerprint_to_bits(&fp, n);
                    prop_assert_eq!(dense.len(), n);
                    prop_assert!(dense.ones().iter().all(|&i| i < n));
                    let expected = fp.bits().filter(|&b| b <= n).count();
                    prop_assert_eq!(dense.count_ones(), expected);
                }
            }
        }
    }
}

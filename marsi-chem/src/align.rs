//! Rigid alignment of molecules onto a reference by Kabsch superposition.

use marsi_core::{MarsiError, Result, Scored};

use crate::linalg::{add, centroid, dot, sub, svd_3x3, Matrix3x3, Vec3};
use crate::molecule::Molecule;

/// Alignment options.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlignConfig {
    /// Include hydrogen atoms in the fit.
    pub include_h: bool,
    /// Try atom correspondences from graph symmetry and keep the best.
    pub symmetry: bool,
    /// Largest number of correspondences tried when `symmetry` is on.
    pub max_mappings: usize,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            include_h: true,
            symmetry: true,
            max_mappings: 1000,
        }
    }
}

/// Best superposition of one molecule onto the reference.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlignmentResult {
    /// RMSD over the fitted atom pairs.
    pub rmsd: f64,
    /// Rotation applied to the molecule (row-major).
    pub rotation: [[f64; 3]; 3],
    /// Translation applied after the rotation.
    pub translation: [f64; 3],
    /// Every atom of the molecule after the transform, in atom order.
    pub coords: Vec<[f64; 3]>,
    /// Fitted pairs as `(reference atom, molecule atom)`.
    pub mapping: Vec<(usize, usize)>,
}

impl Scored for AlignmentResult {
    fn score(&self) -> f64 {
        -self.rmsd
    }
}

/// Align each of `molecules` onto `reference`; results keep input order.
///
/// Both sides need 3-D coordinates and the same number of fitted atoms
/// (after dropping hydrogens when `include_h` is false), otherwise
/// [`MarsiError::InvalidInput`].
pub fn align(reference: &Molecule, molecules: &[Molecule], include_h: bool, symmetry: bool) -> Result<Vec<AlignmentResult>> {
    let config = AlignConfig {
        include_h,
        symmetry,
        ..AlignConfig::default()
    };
    align_with_config(reference, molecules, &config)
}

/// [`align`] with every option explicit.
pub fn align_with_config(reference: &Molecule, molecules: &[Molecule], config: &AlignConfig) -> Result<Vec<AlignmentResult>> {
    require_coordinates(reference)?;
    let ref_atoms = fitted_atoms(reference, config.include_h);
    molecules
        .iter()
        .map(|mol| align_one(reference, &ref_atoms, mol, config))
        .collect()
}

fn align_one(reference: &Molecule, ref_atoms: &[usize], mol: &Molecule, config: &AlignConfig) -> Result<AlignmentResult> {
    require_coordinates(mol)?;
    let mol_atoms = fitted_atoms(mol, config.include_h);
    if mol_atoms.len() != ref_atoms.len() {
        return Err(MarsiError::InvalidInput(format!(
            "cannot align '{}' ({} atoms) onto '{}' ({} atoms)",
            mol.name,
            mol_atoms.len(),
            reference.name,
            ref_atoms.len()
        )));
    }
    if ref_atoms.is_empty() {
        return Err(MarsiError::InvalidInput("no atoms to align".into()));
    }

    let identity: Vec<usize> = mol_atoms.clone();
    let candidates = if config.symmetry {
        let found = isomorphisms(reference, ref_atoms, mol, &mol_atoms, config.max_mappings.max(1));
        if found.is_empty() {
            tracing::warn!(
                molecule = %mol.name,
                "no element- and bond-preserving correspondence; pairing atoms by index"
            );
            vec![identity]
        } else {
            found
        }
    } else {
        vec![identity]
    };
    tracing::debug!(molecule = %mol.name, mappings = candidates.len(), "aligning");

    let ref_points: Vec<Vec3> = ref_atoms.iter().map(|&i| reference.atoms[i].position).collect();
    let mut best: Option<(Superposition, Vec<usize>)> = None;
    for image in candidates {
        let mobile: Vec<Vec3> = image.iter().map(|&i| mol.atoms[i].position).collect();
        let fit = kabsch(&ref_points, &mobile)?;
        if best.as_ref().map_or(true, |(b, _)| fit.rmsd < b.rmsd) {
            best = Some((fit, image));
        }
    }
    let (fit, image) = best.ok_or_else(|| MarsiError::InvalidInput("no atom correspondence".into()))?;

    let coords = mol.atoms.iter().map(|a| fit.transform(a.position)).collect();
    Ok(AlignmentResult {
        rmsd: fit.rmsd,
        rotation: fit.rotation.data,
        translation: fit.translation,
        coords,
        mapping: ref_atoms.iter().copied().zip(image).collect(),
    })
}

fn require_coordinates(mol: &Molecule) -> Result<()> {
    if mol.has_3d {
        Ok(())
    } else {
        Err(MarsiError::InvalidInput(format!("molecule '{}' has no 3-D coordinates", mol.name)))
    }
}

fn fitted_atoms(mol: &Molecule, include_h: bool) -> Vec<usize> {
    (0..mol.atom_count())
        .filter(|&i| include_h || !mol.atoms[i].is_hydrogen())
        .collect()
}

// ---------------------------------------------------------------------------
// Kabsch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Superposition {
    rmsd: f64,
    rotation: Matrix3x3,
    translation: Vec3,
}

impl Superposition {
    fn transform(&self, p: Vec3) -> Vec3 {
        add(self.rotation.apply(p), self.translation)
    }
}

/// Rotation and translation taking `mobile` onto `reference` with least
/// RMSD; the two slices are paired by position.
fn kabsch(reference: &[Vec3], mobile: &[Vec3]) -> Result<Superposition> {
    if reference.len() != mobile.len() || reference.is_empty() {
        return Err(MarsiError::InvalidInput(format!(
            "point set sizes differ: {} vs {}",
            reference.len(),
            mobile.len()
        )));
    }
    let com_ref = centroid(reference);
    let com_mob = centroid(mobile);

    // H = Σ mobileᵀ · reference over centred points.
    let mut h = Matrix3x3::zeros();
    for (q, p) in reference.iter().zip(mobile) {
        let q = sub(*q, com_ref);
        let p = sub(*p, com_mob);
        for i in 0..3 {
            for j in 0..3 {
                h.data[i][j] += p[i] * q[j];
            }
        }
    }

    let svd = svd_3x3(&h);
    let v = svd.vt.transpose();
    let ut = svd.u.transpose();
    let mut r = v.multiply(&ut);
    if r.determinant() < 0.0 {
        let mut v_fixed = v;
        for row in 0..3 {
            v_fixed.data[row][2] = -v_fixed.data[row][2];
        }
        r = v_fixed.multiply(&ut);
    }

    let translation = sub(com_ref, r.apply(com_mob));
    let fit = Superposition { rmsd: 0.0, rotation: r, translation };
    let sum_sq: f64 = reference
        .iter()
        .zip(mobile)
        .map(|(q, p)| {
            let d = sub(fit.transform(*p), *q);
            dot(d, d)
        })
        .sum();
    Ok(Superposition {
        rmsd: (sum_sq / reference.len() as f64).sqrt(),
        ..fit
    })
}

// ---------------------------------------------------------------------------
// Correspondences
// ---------------------------------------------------------------------------

/// Element- and bond-preserving maps from the fitted reference atoms onto
/// the fitted molecule atoms, at most `limit` of them. Entry `k` of each map
/// is the molecule atom paired with `ref_atoms[k]`.
fn isomorphisms(reference: &Molecule, ref_atoms: &[usize], mol: &Molecule, mol_atoms: &[usize], limit: usize) -> Vec<Vec<usize>> {
    let mut in_ref = vec![None; reference.atom_count()];
    for (k, &a) in ref_atoms.iter().enumerate() {
        in_ref[a] = Some(k);
    }
    let mut in_mol = vec![false; mol.atom_count()];
    for &a in mol_atoms {
        in_mol[a] = true;
    }
    let degree = |m: &Molecule, a: usize, keep: &dyn Fn(usize) -> bool| m.adjacency[a].iter().filter(|&&(n, _)| keep(n)).count();
    let ref_degree: Vec<usize> = ref_atoms.iter().map(|&a| degree(reference, a, &|n| in_ref[n].is_some())).collect();
    let mol_degree: Vec<usize> = (0..mol.atom_count()).map(|a| degree(mol, a, &|n| in_mol[n])).collect();

    // Visit reference atoms so each one after the first in its fragment
    // already has a mapped neighbour.
    let mut order = Vec::with_capacity(ref_atoms.len());
    let mut queued = vec![false; ref_atoms.len()];
    for start in 0..ref_atoms.len() {
        if queued[start] {
            continue;
        }
        queued[start] = true;
        let mut queue = std::collections::VecDeque::from([start]);
        while let Some(k) = queue.pop_front() {
            order.push(k);
            for &(n, _) in &reference.adjacency[ref_atoms[k]] {
                if let Some(kn) = in_ref[n] {
                    if !queued[kn] {
                        queued[kn] = true;
                        queue.push_back(kn);
                    }
                }
            }
        }
    }

    let search = MappingSearch {
        reference,
        ref_atoms,
        in_ref: &in_ref,
        ref_degree: &ref_degree,
        mol,
        mol_atoms,
        mol_degree: &mol_degree,
        order: &order,
        limit,
    };
    let mut image = vec![usize::MAX; ref_atoms.len()];
    let mut used = vec![false; mol.atom_count()];
    let mut found = Vec::new();
    search.extend(0, &mut image, &mut used, &mut found);
    found
}

struct MappingSearch<'a> {
    reference: &'a Molecule,
    ref_atoms: &'a [usize],
    in_ref: &'a [Option<usize>],
    ref_degree: &'a [usize],
    mol: &'a Molecule,
    mol_atoms: &'a [usize],
    mol_degree: &'a [usize],
    order: &'a [usize],
    limit: usize,
}

impl MappingSearch<'_> {
    fn extend(&self, depth: usize, image: &mut [usize], used: &mut [bool], found: &mut Vec<Vec<usize>>) {
        if found.len() >= self.limit {
            return;
        }
        if depth == self.order.len() {
            found.push(image.to_vec());
            return;
        }
        let k = self.order[depth];
        let ra = self.ref_atoms[k];
        for &ma in self.mol_atoms {
            if used[ma] || !self.compatible(k, ra, ma, image) {
                continue;
            }
            image[k] = ma;
            used[ma] = true;
            self.extend(depth + 1, image, used, found);
            used[ma] = false;
            image[k] = usize::MAX;
            if found.len() >= self.limit {
                return;
            }
        }
    }

    fn compatible(&self, k: usize, ra: usize, ma: usize, image: &[usize]) -> bool {
        let (r, m) = (&self.reference.atoms[ra], &self.mol.atoms[ma]);
        if r.atomic_number != m.atomic_number || self.ref_degree[k] != self.mol_degree[ma] {
            return false;
        }
        // Every mapped reference neighbour must be bonded the same way.
        for &(rn, _) in &self.reference.adjacency[ra] {
            let Some(kn) = self.in_ref[rn] else { continue };
            let mn = image[kn];
            if mn == usize::MAX {
                continue;
            }
            let same = match (self.reference.get_bond(ra, rn), self.mol.get_bond(ma, mn)) {
                (Some(rb), Some(mb)) => rb.order == mb.order,
                _ => false,
            };
            if !same {
                return false;
            }
        }
        true
    }
}

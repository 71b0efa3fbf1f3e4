//! Molecular property calculation.
//!
//! Weight and formula count implicit hydrogens. Wildman–Crippen logP is
//! assigned per atom so the same contributions can feed the lipophilicity
//! block of the spectrophore; an explicit hydrogen contributes exactly what
//! it would have contributed as an implicit one, so `add_hydrogens` leaves
//! logP unchanged.

use std::collections::BTreeMap;

use marsi_core::Summarizable;

use crate::element::element_by_number;
use crate::molecule::{BondOrder, Molecule};
use crate::ring;

/// Computed molecular properties.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MolecularProperties {
    pub molecular_weight: f64,
    pub formula: String,
    pub atom_count: usize,
    pub heavy_atom_count: usize,
    pub hydrogen_bond_donors: usize,
    pub hydrogen_bond_acceptors: usize,
    pub rotatable_bonds: usize,
    pub ring_count: usize,
    pub aromatic_ring_count: usize,
    pub logp: f64,
    pub molar_refractivity: f64,
    pub aromatic_proportion: f64,
}

impl Summarizable for MolecularProperties {
    fn summary(&self) -> String {
        format!(
            "MW={:.2} Formula={} logP={:.2} RotBonds={} Rings={} AP={:.2}",
            self.molecular_weight,
            self.formula,
            self.logp,
            self.rotatable_bonds,
            self.ring_count,
            self.aromatic_proportion,
        )
    }
}

/// Compute all molecular properties at once.
pub fn compute_properties(mol: &Molecule) -> MolecularProperties {
    let rings = ring::find_sssr(mol);
    let aromatic_ring_count = rings
        .iter()
        .filter(|r| r.iter().all(|&i| mol.atoms[i].is_aromatic))
        .count();
    let (logp, molar_refractivity) = wildman_crippen_logp(mol);

    MolecularProperties {
        molecular_weight: molecular_weight(mol),
        formula: molecular_formula(mol),
        atom_count: mol.atom_count(),
        heavy_atom_count: mol.heavy_atom_count(),
        hydrogen_bond_donors: hbd_count(mol),
        hydrogen_bond_acceptors: hba_count(mol),
        rotatable_bonds: rotatable_bond_count(mol),
        ring_count: rings.len(),
        aromatic_ring_count,
        logp,
        molar_refractivity,
        aromatic_proportion: aromatic_proportion(mol),
    }
}

/// Calculate the molecular weight (sum of atomic weights including implicit H).
pub fn molecular_weight(mol: &Molecule) -> f64 {
    let h_weight = 1.008;
    let mut mw = 0.0;
    for atom in &mol.atoms {
        if let Some(elem) = element_by_number(atom.atomic_number) {
            mw += elem.atomic_weight;
        }
        mw += atom.implicit_hydrogens as f64 * h_weight;
    }
    mw
}

/// Element counts including implicit hydrogens. Dummy atoms are skipped.
pub fn element_counts(mol: &Molecule) -> BTreeMap<&'static str, usize> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for atom in &mol.atoms {
        match element_by_number(atom.atomic_number) {
            Some(elem) if elem.atomic_number > 0 => {
                *counts.entry(elem.symbol).or_insert(0) += 1;
            }
            _ => {}
        }
        if atom.implicit_hydrogens > 0 {
            *counts.entry("H").or_insert(0) += atom.implicit_hydrogens as usize;
        }
    }
    counts
}

/// Element symbols in Hill order: C, then H, then alphabetical. Without
/// carbon every element, H included, is alphabetical.
pub fn hill_order(counts: &BTreeMap<&'static str, usize>) -> Vec<(&'static str, usize)> {
    let mut ordered = Vec::with_capacity(counts.len());
    let has_carbon = counts.contains_key("C");
    if has_carbon {
        ordered.push(("C", counts["C"]));
        if let Some(&h) = counts.get("H") {
            ordered.push(("H", h));
        }
    }
    for (&symbol, &count) in counts {
        if has_carbon && (symbol == "C" || symbol == "H") {
            continue;
        }
        ordered.push((symbol, count));
    }
    ordered
}

/// Generate the molecular formula in Hill system order.
pub fn molecular_formula(mol: &Molecule) -> String {
    let mut formula = String::new();
    for (symbol, count) in hill_order(&element_counts(mol)) {
        formula.push_str(symbol);
        if count > 1 {
            formula.push_str(&count.to_string());
        }
    }
    formula
}

/// Count hydrogen bond donors (N or O atoms with at least one attached H).
pub fn hbd_count(mol: &Molecule) -> usize {
    (0..mol.atom_count())
        .filter(|&i| matches!(mol.atoms[i].atomic_number, 7 | 8) && mol.hydrogen_count(i) > 0)
        .count()
}

/// Count hydrogen bond acceptors (N or O atoms).
pub fn hba_count(mol: &Molecule) -> usize {
    mol.atoms
        .iter()
        .filter(|a| a.atomic_number == 7 || a.atomic_number == 8)
        .count()
}

/// Count rotatable bonds: single bonds outside rings whose atoms both have
/// at least one other heavy neighbor.
pub fn rotatable_bond_count(mol: &Molecule) -> usize {
    let in_ring = ring::ring_bonds(mol);
    mol.bonds
        .iter()
        .enumerate()
        .filter(|&(bi, bond)| {
            bond.order == BondOrder::Single
                && !in_ring[bi]
                && !mol.atoms[bond.atom1].is_hydrogen()
                && !mol.atoms[bond.atom2].is_hydrogen()
                && mol.heavy_degree(bond.atom1) > 1
                && mol.heavy_degree(bond.atom2) > 1
        })
        .count()
}

/// Fraction of graph atoms flagged aromatic; 0.0 for an empty molecule.
pub fn aromatic_proportion(mol: &Molecule) -> f64 {
    if mol.is_empty() {
        return 0.0;
    }
    let aromatic = mol.atoms.iter().filter(|a| a.is_aromatic).count();
    aromatic as f64 / mol.atom_count() as f64
}

// ---------------------------------------------------------------------------
// Wildman-Crippen
// ---------------------------------------------------------------------------

const H_ON_CARBON: (f64, f64) = (0.1230, 1.057);
const H_ON_HETERO: (f64, f64) = (-0.2677, 1.057);

/// Wildman-Crippen LogP and MR estimation.
///
/// Returns (logP, molar_refractivity).
pub fn wildman_crippen_logp(mol: &Molecule) -> (f64, f64) {
    crippen_contributions(mol)
        .into_iter()
        .fold((0.0, 0.0), |(lp, mr), (a, b)| (lp + a, mr + b))
}

/// Per-atom (logP, MR) contributions; each heavy atom's share includes its
/// implicit hydrogens.
pub fn crippen_contributions(mol: &Molecule) -> Vec<(f64, f64)> {
    let ring_membership = ring::ring_atoms(mol);

    (0..mol.atom_count())
        .map(|i| {
            let atom = &mol.atoms[i];
            if atom.is_hydrogen() {
                let on_carbon = mol
                    .neighbors(i)
                    .first()
                    .is_some_and(|&p| mol.atoms[p].atomic_number == 6);
                return if on_carbon { H_ON_CARBON } else { H_ON_HETERO };
            }
            let (mut lp, mut mr) = crippen_atom_contribution(mol, i, &ring_membership);
            let h = atom.implicit_hydrogens as f64;
            let (hl, hm) = if atom.atomic_number == 6 { H_ON_CARBON } else { H_ON_HETERO };
            lp += h * hl;
            mr += h * hm;
            (lp, mr)
        })
        .collect()
}

/// Simplified Wildman-Crippen atom type classification.
fn crippen_atom_contribution(mol: &Molecule, atom_idx: usize, ring_membership: &[bool]) -> (f64, f64) {
    let atom = &mol.atoms[atom_idx];
    let degree = mol.heavy_degree(atom_idx);
    let in_ring = ring_membership[atom_idx];
    let has_double_bond = mol.adjacency[atom_idx]
        .iter()
        .any(|&(_, bi)| mol.bonds[bi].order == BondOrder::Double);
    let has_hetero_neighbor = mol.adjacency[atom_idx]
        .iter()
        .any(|&(n, _)| !matches!(mol.atoms[n].atomic_number, 1 | 6));

    match atom.atomic_number {
        6 => {
            if atom.is_aromatic {
                if has_hetero_neighbor { (-0.14, 3.509) } else { (0.296, 3.509) }
            } else if has_double_bond {
                if has_hetero_neighbor { (-0.03, 3.509) } else { (0.08, 3.509) }
            } else if in_ring {
                (0.1441, 3.509)
            } else {
                match degree {
                    0..=2 => (0.1441, 3.509),
                    3 => (0.0, 3.509),
                    _ => (-0.04, 3.509),
                }
            }
        }
        7 => {
            if atom.is_aromatic { (-0.3187, 2.188) }
            else if atom.formal_charge > 0 { (-1.0190, 2.188) }
            else if has_double_bond { (-0.5262, 2.188) }
            else { (-0.4458, 2.262) }
        }
        8 => {
            if atom.formal_charge < 0 { (-1.189, 1.476) }
            else if has_double_bond { (-0.3339, 1.476) }
            else if degree >= 2 { (-0.2893, 1.476) }
            else { (-0.3567, 1.476) }
        }
        9 => (0.4118, 1.108),
        15 => (0.2836, 6.920),
        16 => {
            if has_double_bond { (-0.1084, 7.365) }
            else if atom.formal_charge != 0 { (-0.5188, 7.365) }
            else { (0.6237, 7.365) }
        }
        17 => (0.6895, 5.853),
        35 => (0.8813, 8.927),
        53 => (1.050, 13.940),
        _ => (0.0, 0.0),
    }
}

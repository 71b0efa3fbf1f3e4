//! Gasteiger-Marsili partial charges.
//!
//! Partial equalization of orbital electronegativity over six damped
//! iterations. Implicit hydrogens take part as virtual atoms and their
//! charge is folded back into the parent, so a molecule gives the same
//! heavy-atom charge totals before and after `add_hydrogens`.

use crate::molecule::{Hybridization as Hybrid, Molecule};

/// Coefficients of `χ(q) = a + b·q + c·q²`.
///
/// Source: Gasteiger & Marsili, Tetrahedron 36, 3219 (1980).
#[derive(Debug, Clone, Copy)]
struct ElectroParams {
    a: f64,
    b: f64,
    c: f64,
}

impl ElectroParams {
    fn chi(&self, q: f64) -> f64 {
        self.a + self.b * q + self.c * q * q
    }

    /// Electronegativity of the cation, the normaliser for charge flowing
    /// away from this atom. Hydrogen uses the fixed value 20.02.
    fn chi_plus(&self, is_hydrogen: bool) -> f64 {
        if is_hydrogen {
            20.02
        } else {
            self.a + self.b + self.c
        }
    }
}

const HYDROGEN: ElectroParams = ElectroParams { a: 7.17, b: 6.24, c: -0.56 };

const ITERATIONS: i32 = 6;

fn electro_params(atomic_number: u8, hybrid: Hybrid) -> ElectroParams {
    let (a, b, c) = match (atomic_number, hybrid) {
        (1, _) => return HYDROGEN,
        (6, Hybrid::Sp) => (10.39, 9.45, 0.73),
        (6, Hybrid::Sp2) => (8.79, 9.32, 1.51),
        (6, Hybrid::Sp3) => (7.98, 9.18, 1.88),
        (7, Hybrid::Sp) => (15.68, 11.70, -0.27),
        (7, Hybrid::Sp2) => (12.87, 11.15, 0.85),
        (7, Hybrid::Sp3) => (11.54, 10.82, 1.36),
        (8, Hybrid::Sp3) => (14.18, 12.92, 1.39),
        (8, _) => (17.07, 13.79, 0.47),
        (9, _) => (14.66, 13.85, 2.31),
        (14, _) => (7.30, 6.56, 0.66),
        (15, _) => (8.90, 8.24, 0.96),
        (16, Hybrid::Sp3) => (10.14, 9.13, 1.38),
        (16, _) => (10.88, 9.49, 1.33),
        (17, _) => (11.00, 9.69, 1.35),
        (34, _) => (10.00, 8.80, 1.20),
        (35, _) => (10.08, 8.47, 1.16),
        (53, _) => (9.90, 7.96, 0.96),
        // Unparameterised elements behave like sp3 carbon.
        _ => (7.98, 9.18, 1.88),
    };
    ElectroParams { a, b, c }
}

/// Gasteiger-Marsili charges, one per atom of `mol`.
///
/// Implicit hydrogen charge is added to the parent atom. Formal charges seed
/// the iteration, so the charges sum to the net formal charge.
///
/// ```
/// use marsi_chem::{gasteiger_charges, parse_smiles};
///
/// let mol = parse_smiles("CCO").unwrap();
/// let charges = gasteiger_charges(&mol);
/// assert!(charges[2] < 0.0);
/// ```
pub fn gasteiger_charges(mol: &Molecule) -> Vec<f64> {
    let n = mol.atom_count();
    if n == 0 {
        return Vec::new();
    }

    // Working graph: real atoms, then one virtual H per implicit hydrogen.
    let mut params: Vec<ElectroParams> = (0..n)
        .map(|i| electro_params(mol.atoms[i].atomic_number, mol.hybridization(i)))
        .collect();
    let mut is_h: Vec<bool> = mol.atoms.iter().map(|a| a.is_hydrogen()).collect();
    let mut charges: Vec<f64> = mol.atoms.iter().map(|a| a.formal_charge as f64).collect();
    let mut edges: Vec<(usize, usize)> = mol.bonds.iter().map(|b| (b.atom1, b.atom2)).collect();
    let mut parent = Vec::new();
    for (i, atom) in mol.atoms.iter().enumerate() {
        for _ in 0..atom.implicit_hydrogens {
            edges.push((i, params.len()));
            params.push(HYDROGEN);
            is_h.push(true);
            charges.push(0.0);
            parent.push(i);
        }
    }

    for iteration in 0..ITERATIONS {
        let damping = 0.5_f64.powi(iteration + 1);
        let chi: Vec<f64> = params.iter().zip(&charges).map(|(p, &q)| p.chi(q)).collect();
        let mut delta = vec![0.0_f64; params.len()];
        for &(a, b) in &edges {
            let diff = chi[b] - chi[a];
            // Electrons move toward the more electronegative end.
            let donor = if diff > 0.0 { a } else { b };
            let norm = params[donor].chi_plus(is_h[donor]);
            if norm.abs() < 1e-12 {
                continue;
            }
            let transfer = damping * diff / norm;
            delta[a] += transfer;
            delta[b] -= transfer;
        }
        for (q, d) in charges.iter_mut().zip(&delta) {
            *q += d;
        }
    }

    let mut result = charges[..n].to_vec();
    for (k, &p) in parent.iter().enumerate() {
        result[p] += charges[n + k];
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    #[test]
    fn neutral_molecule_sums_to_zero() {
        let mol = parse_smiles("CCO").unwrap();
        let sum: f64 = gasteiger_charges(&mol).iter().sum();
        assert!(sum.abs() < 1e-9, "charge sum = {sum}");
    }

    #[test]
    fn ions_sum_to_formal_charge() {
        let mol = parse_smiles("CC(=O)[O-]").unwrap();
        let sum: f64 = gasteiger_charges(&mol).iter().sum();
        assert!((sum + 1.0).abs() < 1e-9, "charge sum = {sum}");
    }

    #[test]
    fn oxygen_is_negative() {
        let mol = parse_smiles("CCO").unwrap();
        let charges = gasteiger_charges(&mol);
        assert!(charges[2] < 0.0, "O charge = {}", charges[2]);
    }

    #[test]
    fn methane_is_nearly_neutral() {
        let mol = parse_smiles("C").unwrap();
        let charges = gasteiger_charges(&mol);
        assert_eq!(charges.len(), 1);
        assert!(charges[0].abs() < 1e-9);
    }

    #[test]
    fn explicit_hydrogens_preserve_heavy_totals() {
        let mut mol = parse_smiles("CC(=O)O").unwrap();
        let before = gasteiger_charges(&mol);
        mol.add_hydrogens();
        let after = gasteiger_charges(&mol);
        assert_eq!(after.len(), mol.atom_count());
        // Carbonyl oxygen carries no hydrogens, so it is directly comparable.
        assert!((before[2] - after[2]).abs() < 1e-9);
        let h_sum: f64 = (4..mol.atom_count()).map(|i| after[i]).sum();
        assert!(h_sum > 0.0);
    }

    #[test]
    fn empty_molecule() {
        let mol = Molecule::new("empty".into(), vec![], vec![]);
        assert!(gasteiger_charges(&mol).is_empty());
    }
}

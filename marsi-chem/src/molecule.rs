//! Molecular graph representation.
//!
//! A [`Molecule`] is an owned value: atoms with optional 3-D positions, bonds,
//! an adjacency index, and free-form record metadata (SDF data items such as
//! `DRUGBANK_ID`). Only [`Molecule::add_hydrogens`] and
//! [`crate::embed::embed_3d`] mutate a molecule in place.

use std::collections::BTreeMap;

use marsi_core::hash::sha256;
use marsi_core::{Annotated, ContentAddressable, MarsiError, Result, Summarizable};

use crate::element::element_by_number;

/// Bond order classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Numeric bond order for valence calculations.
    pub fn as_f64(self) -> f64 {
        match self {
            BondOrder::Single => 1.0,
            BondOrder::Double => 2.0,
            BondOrder::Triple => 3.0,
            BondOrder::Aromatic => 1.5,
        }
    }
}

/// Orbital hybridization inferred from bond orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Hybridization {
    Sp,
    Sp2,
    Sp3,
}

/// An atom in a molecular graph.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MolAtom {
    pub atomic_number: u8,
    pub formal_charge: i8,
    pub isotope: Option<u16>,
    pub is_aromatic: bool,
    pub implicit_hydrogens: u8,
    /// Cartesian position in Å. All zeros until coordinates are read or embedded.
    pub position: [f64; 3],
}

impl MolAtom {
    /// A neutral, non-aromatic atom at the origin.
    pub fn new(atomic_number: u8) -> Self {
        MolAtom {
            atomic_number,
            formal_charge: 0,
            isotope: None,
            is_aromatic: false,
            implicit_hydrogens: 0,
            position: [0.0; 3],
        }
    }

    pub fn is_hydrogen(&self) -> bool {
        self.atomic_number == 1
    }
}

/// A bond between two atoms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bond {
    pub atom1: usize,
    pub atom2: usize,
    pub order: BondOrder,
    pub is_aromatic: bool,
}

impl Bond {
    pub fn new(atom1: usize, atom2: usize, order: BondOrder) -> Self {
        Bond {
            atom1,
            atom2,
            order,
            is_aromatic: order == BondOrder::Aromatic,
        }
    }

    /// The atom on the other end of this bond from `atom`.
    pub fn other(&self, atom: usize) -> usize {
        if self.atom1 == atom {
            self.atom2
        } else {
            self.atom1
        }
    }
}

/// A molecular graph with atoms, bonds, adjacency information and record metadata.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Molecule {
    pub name: String,
    pub atoms: Vec<MolAtom>,
    pub bonds: Vec<Bond>,
    /// adjacency[atom_idx] = Vec<(neighbor_atom_idx, bond_idx)>
    pub adjacency: Vec<Vec<(usize, usize)>>,
    /// Record data fields (e.g. `PUBCHEM_COMPOUND_CID`), values stored untrimmed.
    pub metadata: BTreeMap<String, String>,
    /// Whether atom positions hold a real 3-D geometry.
    pub has_3d: bool,
}

impl Molecule {
    /// Create a new molecule, building the adjacency list from atoms and bonds.
    pub fn new(name: String, atoms: Vec<MolAtom>, bonds: Vec<Bond>) -> Self {
        let mut adjacency = vec![Vec::new(); atoms.len()];
        for (bi, bond) in bonds.iter().enumerate() {
            adjacency[bond.atom1].push((bond.atom2, bi));
            adjacency[bond.atom2].push((bond.atom1, bi));
        }
        Molecule {
            name,
            atoms,
            bonds,
            adjacency,
            metadata: BTreeMap::new(),
            has_3d: false,
        }
    }

    /// Number of atoms (graph nodes; implicit hydrogens are not counted).
    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Number of bonds.
    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    /// Number of non-hydrogen atoms.
    pub fn heavy_atom_count(&self) -> usize {
        self.atoms.iter().filter(|a| !a.is_hydrogen()).count()
    }

    /// Neighbor atom indices for a given atom.
    pub fn neighbors(&self, atom_idx: usize) -> Vec<usize> {
        self.adjacency[atom_idx].iter().map(|&(n, _)| n).collect()
    }

    /// Graph degree of an atom (number of explicit bonds).
    pub fn degree(&self, atom_idx: usize) -> usize {
        self.adjacency[atom_idx].len()
    }

    /// Number of non-hydrogen neighbors.
    pub fn heavy_degree(&self, atom_idx: usize) -> usize {
        self.adjacency[atom_idx]
            .iter()
            .filter(|&&(n, _)| !self.atoms[n].is_hydrogen())
            .count()
    }

    /// Find the bond between two atoms, if any.
    pub fn get_bond(&self, a1: usize, a2: usize) -> Option<&Bond> {
        self.adjacency[a1]
            .iter()
            .find(|&&(n, _)| n == a2)
            .map(|&(_, bi)| &self.bonds[bi])
    }

    /// Hydrogens attached to one atom: implicit count plus explicit H neighbors.
    pub fn hydrogen_count(&self, atom_idx: usize) -> usize {
        let explicit = self.adjacency[atom_idx]
            .iter()
            .filter(|&&(n, _)| self.atoms[n].is_hydrogen())
            .count();
        self.atoms[atom_idx].implicit_hydrogens as usize + explicit
    }

    /// Total hydrogen count (implicit + explicit H atoms).
    pub fn total_hydrogen_count(&self) -> usize {
        let explicit = self.atoms.iter().filter(|a| a.is_hydrogen()).count();
        let implicit: usize = self.atoms.iter().map(|a| a.implicit_hydrogens as usize).sum();
        explicit + implicit
    }

    /// Sum of bond orders at an atom, rounded; aromatic bonds count 1.5.
    pub fn bond_order_sum(&self, atom_idx: usize) -> usize {
        let v: f64 = self.adjacency[atom_idx]
            .iter()
            .map(|&(_, bi)| self.bonds[bi].order.as_f64())
            .sum();
        v.round() as usize
    }

    /// Append an atom and return its index.
    pub fn add_atom(&mut self, atom: MolAtom) -> usize {
        self.atoms.push(atom);
        self.adjacency.push(Vec::new());
        self.atoms.len() - 1
    }

    /// Append a bond and keep the adjacency index in sync.
    pub fn add_bond(&mut self, bond: Bond) -> usize {
        let bi = self.bonds.len();
        self.adjacency[bond.atom1].push((bond.atom2, bi));
        self.adjacency[bond.atom2].push((bond.atom1, bi));
        self.bonds.push(bond);
        bi
    }

    /// Atom positions in atom order.
    pub fn coordinates(&self) -> Vec<[f64; 3]> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    /// Replace every atom position; `coords` must match the atom count.
    pub fn set_coordinates(&mut self, coords: &[[f64; 3]]) -> Result<()> {
        if coords.len() != self.atoms.len() {
            return Err(MarsiError::InvalidInput(format!(
                "{} coordinates for {} atoms",
                coords.len(),
                self.atoms.len()
            )));
        }
        for (atom, &p) in self.atoms.iter_mut().zip(coords) {
            atom.position = p;
        }
        self.has_3d = true;
        Ok(())
    }

    /// Trimmed metadata value for `key`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|v| v.trim())
    }

    /// Hybridization of an atom: aromatic atoms and atoms with one double
    /// bond are sp2; a triple bond or two double bonds make it sp.
    pub fn hybridization(&self, atom_idx: usize) -> Hybridization {
        if self.atoms[atom_idx].is_aromatic {
            return Hybridization::Sp2;
        }
        let mut doubles = 0;
        for &(_, bi) in &self.adjacency[atom_idx] {
            match self.bonds[bi].order {
                BondOrder::Triple => return Hybridization::Sp,
                BondOrder::Aromatic => return Hybridization::Sp2,
                BondOrder::Double => doubles += 1,
                BondOrder::Single => {}
            }
        }
        match doubles {
            0 => Hybridization::Sp3,
            1 => Hybridization::Sp2,
            _ => Hybridization::Sp,
        }
    }

    /// Whether any atom still carries implicit hydrogens.
    pub fn has_implicit_hydrogens(&self) -> bool {
        self.atoms.iter().any(|a| a.implicit_hydrogens > 0)
    }

    /// Turn every implicit hydrogen into an explicit H atom bonded to its parent.
    ///
    /// New hydrogens are placed one covalent bond length from the parent,
    /// pointing away from its existing neighbors. Calling this twice is a no-op
    /// the second time.
    pub fn add_hydrogens(&mut self) {
        let heavy = self.atoms.len();
        for parent in 0..heavy {
            let n_h = self.atoms[parent].implicit_hydrogens;
            if n_h == 0 {
                continue;
            }
            self.atoms[parent].implicit_hydrogens = 0;
            let parent_radius = element_by_number(self.atoms[parent].atomic_number)
                .map_or(0.76, |e| e.covalent_radius);
            let bond_length = parent_radius + 0.31;
            for _ in 0..n_h {
                let dir = self.free_direction(parent);
                let origin = self.atoms[parent].position;
                let mut h = MolAtom::new(1);
                h.position = [
                    origin[0] + dir[0] * bond_length,
                    origin[1] + dir[1] * bond_length,
                    origin[2] + dir[2] * bond_length,
                ];
                let hi = self.add_atom(h);
                self.add_bond(Bond::new(parent, hi, BondOrder::Single));
            }
        }
    }

    /// Copy of the molecule with every removable explicit hydrogen folded back
    /// into its parent's implicit count.
    ///
    /// A hydrogen is removable when it is bonded to exactly one non-hydrogen
    /// atom and carries no isotope or charge. Returns the new molecule and,
    /// for each of its atoms, the index of the atom it came from.
    pub fn heavy_skeleton(&self) -> (Molecule, Vec<usize>) {
        let removable: Vec<bool> = (0..self.atoms.len())
            .map(|i| {
                let a = &self.atoms[i];
                a.is_hydrogen()
                    && a.isotope.is_none()
                    && a.formal_charge == 0
                    && self.adjacency[i].len() == 1
                    && !self.atoms[self.adjacency[i][0].0].is_hydrogen()
            })
            .collect();
        let kept: Vec<usize> = (0..self.atoms.len()).filter(|&i| !removable[i]).collect();
        let mut new_index = vec![usize::MAX; self.atoms.len()];
        for (ni, &oi) in kept.iter().enumerate() {
            new_index[oi] = ni;
        }
        let mut atoms: Vec<MolAtom> = kept.iter().map(|&i| self.atoms[i].clone()).collect();
        for i in (0..self.atoms.len()).filter(|&i| removable[i]) {
            let parent = new_index[self.adjacency[i][0].0];
            atoms[parent].implicit_hydrogens = atoms[parent].implicit_hydrogens.saturating_add(1);
        }
        let bonds: Vec<Bond> = self
            .bonds
            .iter()
            .filter(|b| !removable[b.atom1] && !removable[b.atom2])
            .map(|b| Bond {
                atom1: new_index[b.atom1],
                atom2: new_index[b.atom2],
                ..b.clone()
            })
            .collect();
        let mut mol = Molecule::new(self.name.clone(), atoms, bonds);
        mol.metadata = self.metadata.clone();
        mol.has_3d = self.has_3d;
        (mol, kept)
    }

    /// Unit vector from `atom` that best avoids its current neighbors.
    fn free_direction(&self, atom: usize) -> [f64; 3] {
        const S: f64 = 0.577_350_269_189_625_8; // 1/sqrt(3)
        const CANDIDATES: [[f64; 3]; 8] = [
            [S, S, S],
            [S, -S, -S],
            [-S, S, -S],
            [-S, -S, S],
            [-S, -S, -S],
            [-S, S, S],
            [S, -S, S],
            [S, S, -S],
        ];
        let origin = self.atoms[atom].position;
        let bonded: Vec<[f64; 3]> = self.adjacency[atom]
            .iter()
            .filter_map(|&(n, _)| {
                let p = self.atoms[n].position;
                let d = [p[0] - origin[0], p[1] - origin[1], p[2] - origin[2]];
                let len = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
                (len > 1e-6).then(|| [d[0] / len, d[1] / len, d[2] / len])
            })
            .collect();
        let mut best = CANDIDATES[0];
        let mut best_score = f64::INFINITY;
        for c in CANDIDATES {
            let score = bonded
                .iter()
                .map(|b| b[0] * c[0] + b[1] * c[1] + b[2] * c[2])
                .fold(-1.0f64, f64::max);
            if score < best_score - 1e-9 {
                best_score = score;
                best = c;
            }
        }
        best
    }
}

impl Annotated for Molecule {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Summarizable for Molecule {
    fn summary(&self) -> String {
        format!(
            "{}: {} atoms, {} bonds",
            if self.name.is_empty() { "Molecule" } else { &self.name },
            self.atom_count(),
            self.bond_count()
        )
    }
}

impl ContentAddressable for Molecule {
    fn content_hash(&self) -> String {
        let mut bytes = Vec::with_capacity(self.atoms.len() * 6 + self.bonds.len() * 17);
        for atom in &self.atoms {
            bytes.push(atom.atomic_number);
            bytes.extend_from_slice(&atom.formal_charge.to_le_bytes());
            bytes.push(atom.implicit_hydrogens);
            if let Some(iso) = atom.isotope {
                bytes.extend_from_slice(&iso.to_le_bytes());
            }
            bytes.push(atom.is_aromatic as u8);
        }
        // Sort bonds by (min_atom, max_atom, order)
        let mut sorted_bonds: Vec<_> = self
            .bonds
            .iter()
            .map(|b| (b.atom1.min(b.atom2), b.atom1.max(b.atom2), b.order))
            .collect();
        sorted_bonds.sort();
        for (a, c, order) in &sorted_bonds {
            bytes.extend_from_slice(&a.to_le_bytes());
            bytes.extend_from_slice(&c.to_le_bytes());
            bytes.push(*order as u8);
        }
        sha256(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_water() -> Molecule {
        let mut o = MolAtom::new(8);
        o.implicit_hydrogens = 2;
        Molecule::new("water".into(), vec![o], vec![])
    }

    fn make_ethane() -> Molecule {
        let mut c = MolAtom::new(6);
        c.implicit_hydrogens = 3;
        let atoms = vec![c.clone(), c];
        let bonds = vec![Bond::new(0, 1, BondOrder::Single)];
        Molecule::new("ethane".into(), atoms, bonds)
    }

    #[test]
    fn construction_and_adjacency() {
        let mol = make_ethane();
        assert_eq!(mol.atom_count(), 2);
        assert_eq!(mol.bond_count(), 1);
        assert_eq!(mol.adjacency[0].len(), 1);
        assert_eq!(mol.adjacency[1].len(), 1);
    }

    #[test]
    fn neighbors_and_degree() {
        let mol = make_ethane();
        assert_eq!(mol.neighbors(0), vec![1]);
        assert_eq!(mol.degree(0), 1);
        assert_eq!(mol.bond_order_sum(1), 1);
    }

    #[test]
    fn heavy_atom_count() {
        let mol = make_water();
        assert_eq!(mol.heavy_atom_count(), 1);
        assert_eq!(mol.total_hydrogen_count(), 2);
    }

    #[test]
    fn add_hydrogens_makes_them_explicit() {
        let mut mol = make_ethane();
        mol.add_hydrogens();
        assert_eq!(mol.atom_count(), 8);
        assert_eq!(mol.bond_count(), 7);
        assert_eq!(mol.heavy_atom_count(), 2);
        assert_eq!(mol.total_hydrogen_count(), 6);
        assert_eq!(mol.hydrogen_count(0), 3);
        assert!(!mol.has_implicit_hydrogens());
    }

    #[test]
    fn add_hydrogens_is_idempotent() {
        let mut mol = make_water();
        mol.add_hydrogens();
        let once = mol.clone();
        mol.add_hydrogens();
        assert_eq!(mol, once);
    }

    #[test]
    fn added_hydrogens_do_not_overlap() {
        let mut mol = make_water();
        mol.add_hydrogens();
        let p1 = mol.atoms[1].position;
        let p2 = mol.atoms[2].position;
        let d = ((p1[0] - p2[0]).powi(2) + (p1[1] - p2[1]).powi(2) + (p1[2] - p2[2]).powi(2)).sqrt();
        assert!(d > 1.0, "H atoms {d} Å apart");
    }

    #[test]
    fn heavy_skeleton_folds_hydrogens_back() {
        let mut mol = make_ethane();
        let original = mol.clone();
        mol.add_hydrogens();
        let (skeleton, mapping) = mol.heavy_skeleton();
        assert_eq!(mapping, vec![0, 1]);
        assert_eq!(skeleton.atoms, original.atoms);
        assert_eq!(skeleton.bonds, original.bonds);
    }

    #[test]
    fn set_coordinates_checks_length() {
        let mut mol = make_ethane();
        assert!(mol.set_coordinates(&[[0.0; 3]]).is_err());
        mol.set_coordinates(&[[0.0; 3], [1.5, 0.0, 0.0]]).unwrap();
        assert!(mol.has_3d);
        assert_eq!(mol.coordinates()[1], [1.5, 0.0, 0.0]);
    }

    #[test]
    fn field_is_trimmed() {
        let mut mol = make_water();
        mol.metadata.insert("DRUGBANK_ID".into(), "  DB00001 \n".into());
        assert_eq!(mol.field("DRUGBANK_ID"), Some("DB00001"));
        assert_eq!(mol.field("ChEBI ID"), None);
    }

    #[test]
    fn summarizable_and_content_addressable() {
        let mol = make_ethane();
        assert!(mol.summary().contains("2 atoms"));
        let hash = mol.content_hash();
        assert_eq!(hash.len(), 64);
        // Deterministic
        assert_eq!(hash, mol.content_hash());
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

        let mut charged = make_ethane();
        charged.atoms[0].formal_charge = 1;
        assert_ne!(charged.content_hash(), hash);
    }
}

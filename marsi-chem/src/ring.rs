//! Ring perception: ring bonds, smallest set of smallest rings (SSSR) and
//! aromaticity of Kekulé rings.

use std::collections::VecDeque;

use crate::molecule::{BondOrder, Molecule};

/// Smallest set of smallest rings, each as a cycle of atom indices.
///
/// Candidate cycles are the shortest cycle through every ring bond. They are
/// taken shortest first and kept when independent (over GF(2)) of the rings
/// already chosen, until there are as many rings as the cycle rank
/// `bonds - atoms + components`. Each ring starts at its lowest atom index
/// and runs toward the lower of its two neighbours.
pub fn find_sssr(mol: &Molecule) -> Vec<Vec<usize>> {
    let in_ring = ring_bonds(mol);
    let rank = (mol.bond_count() + count_components(mol)).saturating_sub(mol.atom_count());
    if rank == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<Vec<usize>> = Vec::new();
    for (bi, bond) in mol.bonds.iter().enumerate() {
        if !in_ring[bi] {
            continue;
        }
        if let Some(mut cycle) = shortest_path(mol, bond.atom1, bond.atom2, bi, &in_ring) {
            canonical_rotation(&mut cycle);
            if !candidates.contains(&cycle) {
                candidates.push(cycle);
            }
        }
    }
    candidates.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

    let words = mol.bond_count().div_ceil(64);
    let mut basis = Vec::new();
    let mut rings = Vec::new();
    for cycle in candidates {
        let mut edges = vec![0u64; words];
        for (k, &a) in cycle.iter().enumerate() {
            let b = cycle[(k + 1) % cycle.len()];
            if let Some(&(_, bi)) = mol.adjacency[a].iter().find(|&&(n, _)| n == b) {
                edges[bi / 64] |= 1u64 << (bi % 64);
            }
        }
        if reduce(&mut basis, edges) {
            rings.push(cycle);
            if rings.len() == rank {
                break;
            }
        }
    }
    rings
}

/// Ring membership for every atom: an atom is in a ring when one of its
/// bonds is.
pub fn ring_atoms(mol: &Molecule) -> Vec<bool> {
    let in_ring = ring_bonds(mol);
    let mut atoms = vec![false; mol.atom_count()];
    for (bond, _) in mol.bonds.iter().zip(&in_ring).filter(|(_, r)| **r) {
        atoms[bond.atom1] = true;
        atoms[bond.atom2] = true;
    }
    atoms
}

/// Ring membership for every bond: every bond that is not a bridge.
///
/// Bridges are found with an iterative low-link depth-first search, so a
/// chain linking two rings is never a ring bond.
pub fn ring_bonds(mol: &Molecule) -> Vec<bool> {
    let n = mol.atom_count();
    let mut in_ring = vec![true; mol.bond_count()];
    let mut order = vec![usize::MAX; n];
    let mut low = vec![0usize; n];
    let mut counter = 0;

    for root in 0..n {
        if order[root] != usize::MAX {
            continue;
        }
        order[root] = counter;
        low[root] = counter;
        counter += 1;
        // (atom, bond used to reach it, next adjacency slot)
        let mut stack = vec![(root, usize::MAX, 0usize)];
        while let Some(top) = stack.last_mut() {
            let (atom, via, slot) = *top;
            if let Some(&(next, bi)) = mol.adjacency[atom].get(slot) {
                top.2 += 1;
                if bi == via {
                    continue;
                }
                if order[next] == usize::MAX {
                    order[next] = counter;
                    low[next] = counter;
                    counter += 1;
                    stack.push((next, bi, 0));
                } else {
                    low[atom] = low[atom].min(order[next]);
                }
            } else {
                stack.pop();
                if let Some(&(parent, _, _)) = stack.last() {
                    low[parent] = low[parent].min(low[atom]);
                    if low[atom] > order[parent] {
                        in_ring[via] = false;
                    }
                }
            }
        }
    }
    in_ring
}

/// Flag aromatic rings in a Kekulé structure.
///
/// A smallest ring is aromatic when every atom is sp2-like and the ring holds
/// 4n+2 π electrons. An atom contributes one electron for a double bond to
/// any ring atom, two for a lone pair (neutral N/O/S without a double bond,
/// or a carbanion), and none for an exocyclic double bond to a non-ring
/// atom. Aromatic rings get aromatic atoms and [`BondOrder::Aromatic`] bonds;
/// hydrogen counts are left untouched.
pub fn perceive_aromaticity(mol: &mut Molecule) {
    let rings = find_sssr(mol);
    if rings.is_empty() {
        return;
    }
    let ring_atoms = ring_atoms(mol);
    let mut aromatic_rings = Vec::new();
    for ring in &rings {
        let mut electrons = 0usize;
        let mut ok = true;
        for &a in ring {
            match pi_electrons(mol, a, &ring_atoms) {
                Some(e) => electrons += e,
                None => {
                    ok = false;
                    break;
                }
            }
        }
        if ok && electrons % 4 == 2 {
            aromatic_rings.push(ring);
        }
    }
    for ring in aromatic_rings {
        for (k, &a) in ring.iter().enumerate() {
            let b = ring[(k + 1) % ring.len()];
            mol.atoms[a].is_aromatic = true;
            if let Some(&(_, bi)) = mol.adjacency[a].iter().find(|&&(n, _)| n == b) {
                mol.bonds[bi].order = BondOrder::Aromatic;
                mol.bonds[bi].is_aromatic = true;
            }
        }
    }
}

fn pi_electrons(mol: &Molecule, atom_idx: usize, ring_atoms: &[bool]) -> Option<usize> {
    let atom = &mol.atoms[atom_idx];
    let mut double_in_ring = false;
    let mut double_exo = false;
    for &(n, bi) in &mol.adjacency[atom_idx] {
        match mol.bonds[bi].order {
            BondOrder::Double | BondOrder::Aromatic => {
                if ring_atoms[n] {
                    double_in_ring = true;
                } else {
                    double_exo = true;
                }
            }
            BondOrder::Triple => return None,
            BondOrder::Single => {}
        }
    }
    if double_in_ring {
        return Some(1);
    }
    if double_exo {
        return Some(0);
    }
    match (atom.atomic_number, atom.formal_charge) {
        (7 | 8 | 15 | 16 | 34, 0) => Some(2),
        (6, -1) => Some(2),
        (6, 1) => Some(0),
        _ => None,
    }
}

fn count_components(mol: &Molecule) -> usize {
    let n = mol.atom_count();
    let mut seen = vec![false; n];
    let mut components = 0;
    for start in 0..n {
        if seen[start] {
            continue;
        }
        components += 1;
        seen[start] = true;
        let mut queue = VecDeque::from([start]);
        while let Some(atom) = queue.pop_front() {
            for &(next, _) in &mol.adjacency[atom] {
                if !seen[next] {
                    seen[next] = true;
                    queue.push_back(next);
                }
            }
        }
    }
    components
}

/// Shortest path `from -> to` over ring bonds other than `skip`, as the
/// atoms visited in order.
fn shortest_path(mol: &Molecule, from: usize, to: usize, skip: usize, in_ring: &[bool]) -> Option<Vec<usize>> {
    let mut came_from = vec![None; mol.atom_count()];
    came_from[from] = Some(from);
    let mut queue = VecDeque::from([from]);
    while let Some(atom) = queue.pop_front() {
        if atom == to {
            let mut path = vec![to];
            let mut cur = to;
            while cur != from {
                cur = came_from[cur]?;
                path.push(cur);
            }
            path.reverse();
            return Some(path);
        }
        for &(next, bi) in &mol.adjacency[atom] {
            if bi != skip && in_ring[bi] && came_from[next].is_none() {
                came_from[next] = Some(atom);
                queue.push_back(next);
            }
        }
    }
    None
}

fn canonical_rotation(cycle: &mut [usize]) {
    let Some(start) = (0..cycle.len()).min_by_key(|&i| cycle[i]) else {
        return;
    };
    cycle.rotate_left(start);
    if cycle.len() > 2 && cycle[cycle.len() - 1] < cycle[1] {
        cycle[1..].reverse();
    }
}

/// Gaussian elimination step over GF(2). `basis` is kept sorted by
/// descending pivot bit; `row` is reduced by it and inserted when something
/// is left. Returns whether `row` was independent.
fn reduce(basis: &mut Vec<(usize, Vec<u64>)>, mut row: Vec<u64>) -> bool {
    for (pivot, pivot_row) in basis.iter() {
        if row[pivot / 64] >> (pivot % 64) & 1 == 1 {
            for (r, b) in row.iter_mut().zip(pivot_row) {
                *r ^= b;
            }
        }
    }
    let Some(lead) = leading_bit(&row) else {
        return false;
    };
    let at = basis.partition_point(|(p, _)| *p > lead);
    basis.insert(at, (lead, row));
    true
}

fn leading_bit(row: &[u64]) -> Option<usize> {
    row.iter()
        .enumerate()
        .rev()
        .find(|(_, w)| **w != 0)
        .map(|(i, w)| i * 64 + 63 - w.leading_zeros() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    #[test]
    fn benzene_one_ring() {
        let mol = parse_smiles("c1ccccc1").unwrap();
        let rings = find_sssr(&mol);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].len(), 6);
    }

    #[test]
    fn naphthalene_two_rings() {
        // Naphthalene: c1ccc2ccccc2c1
        let mol = parse_smiles("c1ccc2ccccc2c1").unwrap();
        let rings = find_sssr(&mol);
        assert_eq!(rings.len(), 2);
        for ring in &rings {
            assert_eq!(ring.len(), 6);
        }
    }

    #[test]
    fn biphenyl_linker_is_not_a_ring_bond() {
        let mol = parse_smiles("c1ccccc1-c1ccccc1").unwrap();
        let in_ring = ring_bonds(&mol);
        let linker = mol
            .bonds
            .iter()
            .position(|b| (b.atom1, b.atom2) == (5, 6))
            .unwrap();
        assert!(!in_ring[linker]);
        assert_eq!(in_ring.iter().filter(|&&r| r).count(), 12);
        let atoms = ring_atoms(&mol);
        assert!(atoms[5] && atoms[6]);
    }

    #[test]
    fn kekule_benzene_becomes_aromatic() {
        let mut mol = parse_smiles("C1=CC=CC=C1").unwrap();
        perceive_aromaticity(&mut mol);
        assert!(mol.atoms.iter().all(|a| a.is_aromatic));
        assert!(mol.bonds.iter().all(|b| b.order == BondOrder::Aromatic));
        assert!(mol.atoms.iter().all(|a| a.implicit_hydrogens == 1));
    }

    #[test]
    fn pyrrole_and_cyclohexene() {
        let mut pyrrole = parse_smiles("C1=CNC=C1").unwrap();
        perceive_aromaticity(&mut pyrrole);
        assert!(pyrrole.atoms.iter().all(|a| a.is_aromatic));

        let mut cyclohexene = parse_smiles("C1=CCCCC1").unwrap();
        perceive_aromaticity(&mut cyclohexene);
        assert!(cyclohexene.atoms.iter().all(|a| !a.is_aromatic));
    }

    #[test]
    fn kekule_naphthalene() {
        let mut mol = parse_smiles("C1=CC=C2C=CC=CC2=C1").unwrap();
        perceive_aromaticity(&mut mol);
        assert!(mol.atoms.iter().all(|a| a.is_aromatic));
    }

    #[test]
    fn acyclic_no_rings() {
        let mol = parse_smiles("CCCC").unwrap();
        let rings = find_sssr(&mol);
        assert_eq!(rings.len(), 0);
        assert!(ring_atoms(&mol).iter().all(|&r| !r));
    }
}

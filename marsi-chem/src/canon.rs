//! Canonical atom ranking.
//!
//! Ranks depend only on the constitution of the molecule (element,
//! heavy-atom connectivity and hydrogen count), never on the input atom
//! order. Bond orders, aromaticity and charges are deliberately left out so
//! that Kekulé and aromatic spellings, or different charge placements, of
//! the same skeleton rank identically.
//!
//! The algorithm:
//! 1. Assign initial classes from atom invariants.
//! 2. Refine classes by the sorted classes of neighbors until stable.
//! 3. While two atoms still share a class, split the lowest shared class by
//!    promoting one member and refine again.

use crate::molecule::Molecule;

/// Canonical rank (0-based, all distinct) for every atom in `mol`.
pub fn canonical_ranks(mol: &Molecule) -> Vec<usize> {
    let n = mol.atom_count();
    if n == 0 {
        return Vec::new();
    }

    let invariants: Vec<(u8, usize, usize, usize)> = (0..n)
        .map(|i| {
            let atom = &mol.atoms[i];
            (
                atom.atomic_number,
                mol.degree(i),
                mol.hydrogen_count(i),
                atom.isotope.unwrap_or(0) as usize,
            )
        })
        .collect();
    let mut ranks = refine(mol, dense_ranks(&invariants));

    // Break remaining ties one class at a time.
    loop {
        let Some(tied) = lowest_tied_class(&ranks) else {
            break;
        };
        let chosen = (0..n)
            .find(|&i| ranks[i] == tied)
            .unwrap_or_default();
        let split: Vec<usize> = ranks
            .iter()
            .enumerate()
            .map(|(i, &r)| if i == chosen { 2 * r } else { 2 * r + 1 })
            .collect();
        ranks = refine(mol, dense_ranks(&split));
    }

    ranks
}

/// Iteratively refine classes by neighbor classes until the number of
/// distinct classes stops growing.
fn refine(mol: &Molecule, mut ranks: Vec<usize>) -> Vec<usize> {
    let n = ranks.len();
    let mut distinct = count_distinct(&ranks);
    for _ in 0..n {
        let keys: Vec<(usize, Vec<usize>)> = (0..n)
            .map(|i| {
                let mut neighbor_ranks: Vec<usize> =
                    mol.adjacency[i].iter().map(|&(nb, _)| ranks[nb]).collect();
                neighbor_ranks.sort_unstable();
                (ranks[i], neighbor_ranks)
            })
            .collect();
        let next = dense_ranks(&keys);
        let next_distinct = count_distinct(&next);
        ranks = next;
        if next_distinct <= distinct {
            break; // Convergence: no more discrimination
        }
        distinct = next_distinct;
    }
    ranks
}

/// Map each key to its position among the sorted distinct keys.
fn dense_ranks<T: Ord + Clone>(keys: &[T]) -> Vec<usize> {
    let mut sorted: Vec<T> = keys.to_vec();
    sorted.sort();
    sorted.dedup();
    keys.iter()
        .map(|k| sorted.binary_search(k).unwrap_or_default())
        .collect()
}

fn count_distinct(values: &[usize]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

fn lowest_tied_class(ranks: &[usize]) -> Option<usize> {
    let mut sorted = ranks.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).find(|w| w[0] == w[1]).map(|w| w[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    fn is_permutation(ranks: &[usize]) -> bool {
        let mut sorted = ranks.to_vec();
        sorted.sort_unstable();
        sorted.iter().enumerate().all(|(i, &r)| i == r)
    }

    #[test]
    fn ranks_are_a_permutation() {
        for smi in ["CCO", "c1ccccc1", "CC(C)(C)C", "OC(=O)CC(O)(CC(=O)O)C(=O)O"] {
            let mol = parse_smiles(smi).unwrap();
            let ranks = canonical_ranks(&mol);
            assert!(is_permutation(&ranks), "{smi}: {ranks:?}");
        }
    }

    #[test]
    fn ranks_follow_atoms_not_input_order() {
        let a = parse_smiles("CCO").unwrap();
        let b = parse_smiles("OCC").unwrap();
        let ra = canonical_ranks(&a);
        let rb = canonical_ranks(&b);
        // methyl carbon, methylene carbon, oxygen
        assert_eq!((ra[0], ra[1], ra[2]), (rb[2], rb[1], rb[0]));
    }

    #[test]
    fn kekule_and_aromatic_rank_alike() {
        let a = canonical_ranks(&parse_smiles("c1ccccc1O").unwrap());
        let b = canonical_ranks(&parse_smiles("C1=CC=CC=C1O").unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn empty_molecule() {
        let mol = crate::molecule::Molecule::new(String::new(), vec![], vec![]);
        assert!(canonical_ranks(&mol).is_empty());
    }
}

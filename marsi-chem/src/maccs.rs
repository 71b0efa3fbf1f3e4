//! MACCS 166-key structural fingerprints.
//!
//! Each key is a SMARTS query, optionally with a minimum number of distinct
//! matches, or one of a few graph-level checks (isotopes, element ranges,
//! ring sizes, fragment count). Keys are evaluated on the hydrogen-suppressed
//! graph, so `*` never matches a hydrogen atom.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::molecule::Molecule;
use crate::ring;
use crate::smarts::{parse_smarts, QueryTarget, SmartsPattern};

/// How a key is decided.
#[derive(Debug, Clone, Copy)]
enum Rule {
    /// Pattern occurs at all.
    Smarts(&'static str),
    /// Pattern has at least `n` matches with distinct atom sets.
    AtLeast(&'static str, usize),
    /// At least `n` distinct atoms start a match of one of the patterns.
    Anchored(&'static [&'static str], usize),
    Isotope,
    /// Any atom with atomic number in the inclusive range.
    AtomicNumber(u8, u8),
    /// At least `count` SSSR rings of `size` atoms, optionally containing a
    /// heteroatom.
    Ring { size: usize, hetero: bool, count: usize },
    /// Any SSSR ring of at least this many atoms.
    LargeRing(usize),
    AromaticRings(usize),
    Fragments(usize),
}

#[rustfmt::skip]
const KEYS: [(usize, Rule); 166] = [
    (1, Rule::Isotope),
    (2, Rule::AtomicNumber(104, u8::MAX)),
    (3, Rule::Smarts("[#32,#33,#34,#50,#51,#52,#82,#83,#84]")),
    (4, Rule::AtomicNumber(89, 103)),
    (5, Rule::Smarts("[#21,#22,#39,#40,#72]")),
    (6, Rule::AtomicNumber(57, 71)),
    (7, Rule::Smarts("[#23,#24,#25,#41,#42,#43,#73,#74,#75]")),
    (8, Rule::Ring { size: 4, hetero: true, count: 1 }),
    (9, Rule::Smarts("[#26,#27,#28,#44,#45,#46,#76,#77,#78]")),
    (10, Rule::Smarts("[#4,#12,#20,#38,#56,#88]")),
    (11, Rule::Ring { size: 4, hetero: false, count: 1 }),
    (12, Rule::Smarts("[#29,#30,#47,#48,#79,#80]")),
    (13, Rule::Smarts("[#8]~[#7](~[#6])~[#6]")),
    (14, Rule::Smarts("[#16]-[#16]")),
    (15, Rule::Smarts("[#8]~[#6](~[#8])~[#8]")),
    (16, Rule::Ring { size: 3, hetero: true, count: 1 }),
    (17, Rule::Smarts("[#6]#[#6]")),
    (18, Rule::Smarts("[#5,#13,#31,#49,#81]")),
    (19, Rule::Ring { size: 7, hetero: false, count: 1 }),
    (20, Rule::Smarts("[#14]")),
    (21, Rule::Smarts("[#6]=[#6](~[!#6;!#1])~[!#6;!#1]")),
    (22, Rule::Ring { size: 3, hetero: false, count: 1 }),
    (23, Rule::Smarts("[#7]~[#6](~[#8])~[#8]")),
    (24, Rule::Smarts("[#7]-[#8]")),
    (25, Rule::Smarts("[#7]~[#6](~[#7])~[#7]")),
    (26, Rule::Smarts("[#6]=;@[#6](@*)@*")),
    (27, Rule::Smarts("[I]")),
    (28, Rule::Smarts("[!#6;!#1]~[CH2]~[!#6;!#1]")),
    (29, Rule::Smarts("[#15]")),
    (30, Rule::Smarts("[#6]~[!#6;!#1](~[#6])(~[#6])~*")),
    (31, Rule::Smarts("[!#6;!#1]~[F,Cl,Br,I]")),
    (32, Rule::Smarts("[#6]~[#16]~[#7]")),
    (33, Rule::Smarts("[#7]~[#16]")),
    (34, Rule::Smarts("[CH2]=*")),
    (35, Rule::Smarts("[#3,#11,#19,#37,#55,#87]")),
    (36, Rule::Smarts("[#16R]")),
    (37, Rule::Smarts("[#7]~[#6](~[#8])~[#7]")),
    (38, Rule::Smarts("[#7]~[#6](~[#6])~[#7]")),
    (39, Rule::Smarts("[#8]~[#16](~[#8])~[#8]")),
    (40, Rule::Smarts("[#16]-[#8]")),
    (41, Rule::Smarts("[#6]#[#7]")),
    (42, Rule::Smarts("F")),
    (43, Rule::Smarts("[!#6;!#1;!H0]~*~[!#6;!#1;!H0]")),
    (44, Rule::Smarts("[!#1;!#6;!#7;!#8;!#9;!#14;!#15;!#16;!#17;!#35;!#53]")),
    (45, Rule::Smarts("[#6]=[#6]~[#7]")),
    (46, Rule::Smarts("Br")),
    (47, Rule::Smarts("[#16]~*~[#7]")),
    (48, Rule::Smarts("[#8]~[!#6;!#1](~[#8])(~[#8])")),
    (49, Rule::Smarts("[!+0]")),
    (50, Rule::Smarts("[#6]=[#6](~[#6])~[#6]")),
    (51, Rule::Smarts("[#6]~[#16]~[#8]")),
    (52, Rule::Smarts("[#7]~[#7]")),
    (53, Rule::Smarts("[!#6;!#1;!H0]~*~*~*~[!#6;!#1;!H0]")),
    (54, Rule::Smarts("[!#6;!#1;!H0]~*~*~[!#6;!#1;!H0]")),
    (55, Rule::Smarts("[#8]~[#16]~[#8]")),
    (56, Rule::Smarts("[#8]~[#7](~[#8])~[#6]")),
    (57, Rule::Smarts("[O;R]")),
    (58, Rule::Smarts("[!#6;!#1]~[#16]~[!#6;!#1]")),
    (59, Rule::Smarts("[#16]!:*:*")),
    (60, Rule::Smarts("[#16]=[#8]")),
    (61, Rule::Smarts("*~[#16](~*)~*")),
    (62, Rule::Smarts("*@*!@*@*")),
    (63, Rule::Smarts("[#7]=[#8]")),
    (64, Rule::Smarts("*@*!@[#16]")),
    (65, Rule::Smarts("c:n")),
    (66, Rule::Smarts("[#6]~[#6](~[#6])(~[#6])~*")),
    (67, Rule::Smarts("[!#6;!#1]~[#16]")),
    (68, Rule::Smarts("[!#6;!#1;!H0]~[!#6;!#1;!H0]")),
    (69, Rule::Smarts("[!#6;!#1]~[!#6;!#1;!H0]")),
    (70, Rule::Smarts("[!#6;!#1]~[#7]~[!#6;!#1]")),
    (71, Rule::Smarts("[#7]~[#8]")),
    (72, Rule::Smarts("[#8]~*~*~[#8]")),
    (73, Rule::Smarts("[#16]=*")),
    (74, Rule::Smarts("[CH3]~*~[CH3]")),
    (75, Rule::Smarts("*!@[#7]@*")),
    (76, Rule::Smarts("[#6]=[#6](~*)~*")),
    (77, Rule::Smarts("[#7]~*~[#7]")),
    (78, Rule::Smarts("[#6]=[#7]")),
    (79, Rule::Smarts("[#7]~*~*~[#7]")),
    (80, Rule::Smarts("[#7]~*~*~*~[#7]")),
    (81, Rule::Smarts("[#16]~*(~*)~*")),
    (82, Rule::Smarts("*~[CH2]~[!#6;!#1;!H0]")),
    (83, Rule::Ring { size: 5, hetero: true, count: 1 }),
    (84, Rule::Smarts("[NH2]")),
    (85, Rule::Smarts("[#6]~[#7](~[#6])~[#6]")),
    (86, Rule::Smarts("[C;H2,H3][!#6;!#1][C;H2,H3]")),
    (87, Rule::Smarts("[F,Cl,Br,I]!@*@*")),
    (88, Rule::Smarts("[#16]")),
    (89, Rule::Smarts("[#8]~*~*~*~[#8]")),
    (90, Rule::Anchored(&[
        "[!#6;!#1;!H0]~*~*~[CH2]~*",
        "[!#6;!#1;!H0;R]1@[R]@[CH2;R]1",
        "[!#6;!#1;!H0]~[R]1@[R]@[CH2;R]1",
    ], 1)),
    (91, Rule::Anchored(&[
        "[!#6;!#1;!H0]~*~*~*~[CH2]~*",
        "[!#6;!#1;!H0;R]1@[R]@[R]@[CH2;R]1",
        "[!#6;!#1;!H0]~[R]1@[R]@[R]@[CH2;R]1",
        "[!#6;!#1;!H0]~*~[R]1@[R]@[CH2;R]1",
    ], 1)),
    (92, Rule::Smarts("[#8]~[#6](~[#7])~[#6]")),
    (93, Rule::Smarts("[!#6;!#1]~[CH3]")),
    (94, Rule::Smarts("[!#6;!#1]~[#7]")),
    (95, Rule::Smarts("[#7]~*~*~[#8]")),
    (96, Rule::Ring { size: 5, hetero: false, count: 1 }),
    (97, Rule::Smarts("[#7]~*~*~*~[#8]")),
    (98, Rule::Ring { size: 6, hetero: true, count: 1 }),
    (99, Rule::Smarts("[#6]=[#6]")),
    (100, Rule::Smarts("*~[CH2]~[#7]")),
    (101, Rule::LargeRing(8)),
    (102, Rule::Smarts("[!#6;!#1]~[#8]")),
    (103, Rule::Smarts("Cl")),
    (104, Rule::Smarts("[!#6;!#1;!H0]~*~[CH2]~*")),
    (105, Rule::Smarts("*@*(@*)@*")),
    (106, Rule::Smarts("[!#6;!#1]~*(~[!#6;!#1])~[!#6;!#1]")),
    (107, Rule::Smarts("[F,Cl,Br,I]~*(~*)~*")),
    (108, Rule::Smarts("[CH3]~*~*~*~[CH2]~*")),
    (109, Rule::Smarts("*~[CH2]~[#8]")),
    (110, Rule::Smarts("[#7]~[#6]~[#8]")),
    (111, Rule::Smarts("[#7]~*~[CH2]~*")),
    (112, Rule::Smarts("*~*(~*)(~*)~*")),
    (113, Rule::Smarts("[#8]!:*:*")),
    (114, Rule::Smarts("[CH3]~[CH2]~*")),
    (115, Rule::Smarts("[CH3]~*~[CH2]~*")),
    (116, Rule::Anchored(&["[CH3]~*~*~[CH2]~*", "[CH3]~*1~*~[CH2]1"], 1)),
    (117, Rule::Smarts("[#7]~*~[#8]")),
    (118, Rule::Anchored(&["*~[CH2]~[CH2]~*", "*1~[CH2]~[CH2]1"], 2)),
    (119, Rule::Smarts("[#7]=*")),
    (120, Rule::AtLeast("[!#6;R]", 2)),
    (121, Rule::Smarts("[#7;R]")),
    (122, Rule::Smarts("*~[#7](~*)~*")),
    (123, Rule::Smarts("[#8]~[#6]~[#8]")),
    (124, Rule::Smarts("[!#6;!#1]~[!#6;!#1]")),
    (125, Rule::AromaticRings(2)),
    (126, Rule::Smarts("*!@[#8]!@*")),
    (127, Rule::AtLeast("*@*!@[#8]", 2)),
    (128, Rule::Anchored(&[
        "*~[CH2]~*~*~*~[CH2]~*",
        "[R]1@[CH2;R]@[R]@[R]@[CH2;R]1",
        "*~[CH2]~[R]1@[R]@[R]@[CH2;R]1",
        "*~[CH2]~*~[R]1@[R]@[CH2;R]1",
    ], 1)),
    (129, Rule::Anchored(&[
        "*~[CH2]~*~*~[CH2]~*",
        "[R]1@[CH2]@[R]@[CH2;R]1",
        "*~[CH2]~[R]1@[R]@[CH2;R]1",
    ], 1)),
    (130, Rule::AtLeast("[!#6;!#1]~[!#6;!#1]", 2)),
    (131, Rule::AtLeast("[!#6;!#1;!H0]", 2)),
    (132, Rule::Smarts("[#8]~*~[CH2]~*")),
    (133, Rule::Smarts("*@*!@[#7]")),
    (134, Rule::Smarts("[F,Cl,Br,I]")),
    (135, Rule::Smarts("[#7]!:*:*")),
    (136, Rule::AtLeast("[#8]=*", 2)),
    (137, Rule::Smarts("[!C;!c;R]")),
    (138, Rule::AtLeast("[!#6;!#1]~[CH2]~*", 2)),
    (139, Rule::Smarts("[O;!H0]")),
    (140, Rule::AtLeast("[#8]", 4)),
    (141, Rule::AtLeast("[CH3]", 3)),
    (142, Rule::AtLeast("[#7]", 2)),
    (143, Rule::Smarts("*@*!@[#8]")),
    (144, Rule::Smarts("*!:*:*!:*")),
    (145, Rule::Ring { size: 6, hetero: false, count: 2 }),
    (146, Rule::AtLeast("[#8]", 3)),
    (147, Rule::Anchored(&["*~[CH2]~[CH2]~*", "*1~[CH2]~[CH2]1"], 1)),
    (148, Rule::Smarts("*~[!#6;!#1](~*)~*")),
    (149, Rule::AtLeast("[C;H3,H4]", 2)),
    (150, Rule::Smarts("*!@*@*!@*")),
    (151, Rule::Smarts("[#7;!H0]")),
    (152, Rule::Smarts("[#8]~[#6](~[#6])~[#6]")),
    (153, Rule::Smarts("[!#6;!#1]~[CH2]~*")),
    (154, Rule::Smarts("[#6]=[#8]")),
    (155, Rule::Smarts("*!@[CH2]!@*")),
    (156, Rule::Smarts("[#7]~*(~*)~*")),
    (157, Rule::Smarts("[#6]-[#8]")),
    (158, Rule::Smarts("[#6]-[#7]")),
    (159, Rule::AtLeast("[#8]", 2)),
    (160, Rule::Smarts("[C;H3,H4]")),
    (161, Rule::Smarts("[#7]")),
    (162, Rule::Smarts("a")),
    (163, Rule::Ring { size: 6, hetero: false, count: 1 }),
    (164, Rule::Smarts("[#8]")),
    (165, Rule::Smarts("[R]")),
    (166, Rule::Fragments(2)),
];

/// A key with its SMARTS compiled.
enum Check {
    Pattern(SmartsPattern, usize),
    Anchored(Vec<SmartsPattern>, usize),
    Graph(Rule),
}

fn compiled_keys() -> &'static [(usize, Check)] {
    static COMPILED: OnceLock<Vec<(usize, Check)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        KEYS.iter()
            .filter_map(|&(key, rule)| compile(key, rule).map(|check| (key, check)))
            .collect()
    })
}

fn compile(key: usize, rule: Rule) -> Option<Check> {
    let parse = |smarts: &str| match parse_smarts(smarts) {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::error!(key, smarts, error = %e, "MACCS key pattern does not parse");
            None
        }
    };
    match rule {
        Rule::Smarts(s) => parse(s).map(|p| Check::Pattern(p, 1)),
        Rule::AtLeast(s, n) => parse(s).map(|p| Check::Pattern(p, n)),
        Rule::Anchored(list, n) => list
            .iter()
            .map(|s| parse(s))
            .collect::<Option<Vec<_>>>()
            .map(|ps| Check::Anchored(ps, n)),
        other => Some(Check::Graph(other)),
    }
}

/// Set MACCS keys (1-based) of a hydrogen-suppressed molecule.
pub(crate) fn maccs_keys(mol: &Molecule) -> BTreeSet<usize> {
    let mut keys = BTreeSet::new();
    if mol.is_empty() {
        return keys;
    }
    let target = QueryTarget::new(mol);
    let rings = ring::find_sssr(mol);
    for (key, check) in compiled_keys() {
        let on = match check {
            Check::Pattern(p, 1) => target.matches(p),
            Check::Pattern(p, n) => target.count_unique(p) >= *n,
            Check::Anchored(ps, n) => {
                let anchors: BTreeSet<usize> = ps.iter().flat_map(|p| target.anchors(p)).collect();
                anchors.len() >= *n
            }
            Check::Graph(rule) => graph_key(mol, &rings, *rule),
        };
        if on {
            keys.insert(*key);
        }
    }
    tracing::trace!(keys = keys.len(), atoms = mol.atom_count(), "maccs keys");
    keys
}

fn graph_key(mol: &Molecule, rings: &[Vec<usize>], rule: Rule) -> bool {
    let hetero = |r: &Vec<usize>| r.iter().any(|&a| !matches!(mol.atoms[a].atomic_number, 1 | 6));
    match rule {
        Rule::Isotope => mol.atoms.iter().any(|a| a.isotope.is_some()),
        Rule::AtomicNumber(lo, hi) => mol.atoms.iter().any(|a| (lo..=hi).contains(&a.atomic_number)),
        Rule::Ring { size, hetero: h, count } => {
            rings.iter().filter(|r| r.len() == size && (!h || hetero(r))).count() >= count
        }
        Rule::LargeRing(size) => rings.iter().any(|r| r.len() >= size),
        Rule::AromaticRings(count) => {
            rings.iter().filter(|r| r.iter().all(|&a| mol.atoms[a].is_aromatic)).count() >= count
        }
        Rule::Fragments(count) => fragment_count(mol) >= count,
        Rule::Smarts(_) | Rule::AtLeast(..) | Rule::Anchored(..) => false,
    }
}

fn fragment_count(mol: &Molecule) -> usize {
    let mut seen = vec![false; mol.atom_count()];
    let mut fragments = 0;
    for start in 0..mol.atom_count() {
        if seen[start] {
            continue;
        }
        fragments += 1;
        seen[start] = true;
        let mut stack = vec![start];
        while let Some(a) = stack.pop() {
            for &(nb, _) in &mol.adjacency[a] {
                if !seen[nb] {
                    seen[nb] = true;
                    stack.push(nb);
                }
            }
        }
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    fn keys(smiles: &str) -> BTreeSet<usize> {
        let mol = parse_smiles(smiles).unwrap();
        maccs_keys(&mol.heavy_skeleton().0)
    }

    #[test]
    fn every_key_pattern_parses() {
        for (key, rule) in KEYS {
            let patterns: Vec<&str> = match rule {
                Rule::Smarts(s) | Rule::AtLeast(s, _) => vec![s],
                Rule::Anchored(list, _) => list.to_vec(),
                _ => vec![],
            };
            for smarts in patterns {
                if let Err(e) = parse_smarts(smarts) {
                    panic!("key {key} pattern {smarts:?} does not parse: {e}");
                }
            }
        }
    }

    #[test]
    fn every_key_compiles() {
        assert_eq!(compiled_keys().len(), 166);
        let numbers: Vec<usize> = compiled_keys().iter().map(|(k, _)| *k).collect();
        assert_eq!(numbers, (1..=166).collect::<Vec<_>>());
    }

    #[test]
    fn empty_molecule_has_no_keys() {
        assert!(maccs_keys(&Molecule::new(String::new(), vec![], vec![])).is_empty());
    }

    #[test]
    fn ethanol_keys() {
        let k = keys("CCO");
        for key in [114, 139, 157, 160, 164] {
            assert!(k.contains(&key), "missing key {key} in {k:?}");
        }
        for key in [125, 162, 163, 165, 166] {
            assert!(!k.contains(&key), "unexpected key {key}");
        }
    }

    #[test]
    fn benzene_keys() {
        let k = keys("c1ccccc1");
        assert!(k.contains(&162));
        assert!(k.contains(&163));
        assert!(k.contains(&165));
        assert!(!k.contains(&125));
        assert!(!k.contains(&145));
    }

    #[test]
    fn naphthalene_has_two_aromatic_rings() {
        let k = keys("c1ccc2ccccc2c1");
        assert!(k.contains(&125));
        assert!(k.contains(&145));
    }

    #[test]
    fn ring_size_keys() {
        assert!(keys("C1CC1").contains(&22));
        assert!(keys("C1CO1").contains(&16));
        assert!(keys("C1CCC1").contains(&11));
        assert!(keys("C1CCCCCC1").contains(&19));
        assert!(keys("C1CCCCCCC1").contains(&101));
        assert!(keys("c1ccoc1").contains(&83));
        assert!(keys("c1ccncc1").contains(&98));
    }

    #[test]
    fn count_thresholds() {
        assert!(!keys("CO").contains(&159));
        assert!(keys("OCCO").contains(&159));
        assert!(!keys("OCCO").contains(&146));
        assert!(keys("OC(O)CO").contains(&146));
        assert!(keys("CC(C)C").contains(&141));
        assert!(!keys("CCC").contains(&141));
    }

    #[test]
    fn element_and_charge_keys() {
        assert!(keys("CF").contains(&42));
        assert!(keys("CCl").contains(&103));
        assert!(keys("CBr").contains(&46));
        assert!(keys("CI").contains(&27));
        assert!(keys("C[Si](C)C").contains(&20));
        assert!(keys("[Na+].[Cl-]").contains(&35));
        assert!(keys("[Na+].[Cl-]").contains(&49));
        assert!(keys("[Na+].[Cl-]").contains(&166));
        assert!(keys("[13CH4]").contains(&1));
        assert!(!keys("C").contains(&1));
    }

    #[test]
    fn anchored_keys() {
        // Two distinct CH2 anchors along a CH2-CH2 chain.
        assert!(keys("CCCCCC").contains(&147));
        assert!(keys("CCCC").contains(&118));
        assert!(!keys("CCC").contains(&118));
        assert!(!keys("CCC").contains(&147));
        assert!(keys("OCCCC").contains(&90));
    }

    #[test]
    fn explicit_hydrogens_do_not_change_keys() {
        let mut mol = parse_smiles("CC(=O)Oc1ccccc1C(=O)O").unwrap();
        let implicit = maccs_keys(&mol.heavy_skeleton().0);
        mol.add_hydrogens();
        assert_eq!(maccs_keys(&mol.heavy_skeleton().0), implicit);
    }
}

//! SMILES reader.
//!
//! Covers the organic subset, bracket atoms (isotope, charge, explicit H),
//! branches, ring closures including `%nn`, dot-disconnected fragments and
//! `*` dummy atoms. Stereo markers are accepted and discarded.
//!
//! Reading happens in two passes: `Lexer` turns the text into tokens and
//! `GraphBuilder` turns the tokens into atoms and bonds.

use std::collections::BTreeMap;

use marsi_core::{MarsiError, Result};

use crate::element::{allowed_valences, element_by_symbol, implied_hydrogens};
use crate::molecule::{Bond, BondOrder, MolAtom, Molecule};

/// Parse a SMILES string into a `Molecule`.
pub fn parse_smiles(smiles: &str) -> Result<Molecule> {
    parse_smiles_named(smiles, "")
}

/// Parse a SMILES string into a `Molecule` with a given name.
pub fn parse_smiles_named(smiles: &str, name: &str) -> Result<Molecule> {
    let mut builder = GraphBuilder::default();
    for token in Lexer::new(smiles) {
        builder.push(token?)?;
    }
    let (atoms, bonds) = builder.finish()?;
    Ok(Molecule::new(name.to_string(), atoms, bonds))
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// An atom; `bracket` atoms state their hydrogen count.
    Atom { atom: MolAtom, bracket: bool },
    Bond(BondOrder),
    Open,
    Close,
    Ring(u16),
    Dot,
}

struct Lexer<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Lexer { text: text.as_bytes(), pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.text.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn bump_if(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, what: &str) -> MarsiError {
        MarsiError::Parse(format!("{what} at position {}", self.pos))
    }

    fn digits(&mut self) -> Option<u32> {
        let start = self.pos;
        let mut n: u32 = 0;
        while let Some(c @ b'0'..=b'9') = self.peek() {
            n = n.saturating_mul(10).saturating_add(u32::from(c - b'0'));
            self.pos += 1;
        }
        (self.pos > start).then_some(n)
    }

    fn next_token(&mut self, c: u8) -> Result<Option<Token>> {
        let token = match c {
            b'(' => Token::Open,
            b')' => Token::Close,
            b'.' => Token::Dot,
            b'-' => Token::Bond(BondOrder::Single),
            b'=' => Token::Bond(BondOrder::Double),
            b'#' => Token::Bond(BondOrder::Triple),
            b':' => Token::Bond(BondOrder::Aromatic),
            // Directional single bonds; the plain single bond is implied.
            b'/' | b'\\' => return Ok(None),
            b'0'..=b'9' => Token::Ring(u16::from(c - b'0')),
            b'%' => {
                let hi = self.bump().filter(u8::is_ascii_digit);
                let lo = self.bump().filter(u8::is_ascii_digit);
                match (hi, lo) {
                    (Some(h), Some(l)) => Token::Ring(u16::from(h - b'0') * 10 + u16::from(l - b'0')),
                    _ => return Err(self.error("expected two digits after '%'")),
                }
            }
            b'*' => Token::Atom {
                atom: MolAtom::new(0),
                bracket: false,
            },
            b'[' => Token::Atom {
                atom: self.bracket_atom()?,
                bracket: true,
            },
            _ => Token::Atom {
                atom: self.organic_atom(c)?,
                bracket: false,
            },
        };
        Ok(Some(token))
    }

    fn organic_atom(&mut self, c: u8) -> Result<MolAtom> {
        let aromatic = c.is_ascii_lowercase();
        let symbol = match c {
            b'B' if self.bump_if(b'r') => "Br",
            b'C' if self.bump_if(b'l') => "Cl",
            b'S' if self.bump_if(b'i') => "Si",
            b'S' if self.bump_if(b'e') => "Se",
            b'B' | b'b' => "B",
            b'C' | b'c' => "C",
            b'N' | b'n' => "N",
            b'O' | b'o' => "O",
            b'P' | b'p' => "P",
            b'S' | b's' => "S",
            b'F' => "F",
            b'I' => "I",
            _ => {
                self.pos -= 1;
                return Err(self.error(&format!("unexpected character '{}'", c as char)));
            }
        };
        let element = element_by_symbol(symbol).ok_or_else(|| self.error(&format!("unknown element '{symbol}'")))?;
        let mut atom = MolAtom::new(element.atomic_number);
        atom.is_aromatic = aromatic;
        Ok(atom)
    }

    /// Everything after `[` up to and including `]`.
    fn bracket_atom(&mut self) -> Result<MolAtom> {
        let isotope = self.digits();
        let first = self.bump().ok_or_else(|| self.error("unterminated bracket atom"))?;
        let aromatic = first.is_ascii_lowercase();

        let symbol = if first == b'*' {
            "*".to_string()
        } else {
            let one = (first.to_ascii_uppercase() as char).to_string();
            match self.peek() {
                Some(second) if second.is_ascii_lowercase() => {
                    let two = format!("{one}{}", second as char);
                    if element_by_symbol(&two).is_some() {
                        self.pos += 1;
                        two
                    } else {
                        one
                    }
                }
                _ => one,
            }
        };
        let element = element_by_symbol(&symbol).ok_or_else(|| self.error(&format!("unknown element '{symbol}'")))?;

        while self.bump_if(b'@') {}

        let hydrogens = if self.bump_if(b'H') {
            self.digits().map_or(1, |n| n.min(u32::from(u8::MAX)) as u8)
        } else {
            0
        };

        let charge = match self.peek() {
            Some(sign @ (b'+' | b'-')) => {
                self.pos += 1;
                let unit: i8 = if sign == b'+' { 1 } else { -1 };
                let magnitude = match self.digits() {
                    Some(n) => n.min(9) as i8,
                    None => {
                        let mut n: i8 = 1;
                        while self.bump_if(sign) {
                            n = n.saturating_add(1);
                        }
                        n
                    }
                };
                unit * magnitude
            }
            _ => 0,
        };

        if !self.bump_if(b']') {
            return Err(self.error("expected ']'"));
        }

        Ok(MolAtom {
            atomic_number: element.atomic_number,
            formal_charge: charge,
            isotope: isotope.and_then(|n| u16::try_from(n).ok()),
            is_aromatic: aromatic,
            implicit_hydrogens: hydrogens,
            position: [0.0; 3],
        })
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let c = self.bump()?;
            match self.next_token(c) {
                Ok(None) => continue,
                Ok(Some(token)) => return Some(Ok(token)),
                Err(e) => {
                    // Stop after the first error.
                    self.pos = self.text.len();
                    return Some(Err(e));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Graph construction
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GraphBuilder {
    atoms: Vec<MolAtom>,
    bracket: Vec<bool>,
    bonds: Vec<Bond>,
    /// Open ring bonds by label: (atom, bond symbol written at the opening).
    open_rings: BTreeMap<u16, (usize, Option<BondOrder>)>,
    branches: Vec<usize>,
    previous: Option<usize>,
    pending: Option<BondOrder>,
}

impl GraphBuilder {
    fn push(&mut self, token: Token) -> Result<()> {
        match token {
            Token::Atom { atom, bracket } => {
                let idx = self.atoms.len();
                self.atoms.push(atom);
                self.bracket.push(bracket);
                if let Some(prev) = self.previous {
                    let order = self.pending.take();
                    self.connect(prev, idx, order);
                }
                self.pending = None;
                self.previous = Some(idx);
            }
            Token::Bond(order) => self.pending = Some(order),
            Token::Open => {
                let prev = self
                    .previous
                    .ok_or_else(|| MarsiError::Parse("branch opened before any atom".into()))?;
                self.branches.push(prev);
            }
            Token::Close => {
                let prev = self
                    .branches
                    .pop()
                    .ok_or_else(|| MarsiError::Parse("unmatched ')'".into()))?;
                self.previous = Some(prev);
                self.pending = None;
            }
            Token::Ring(label) => self.ring(label)?,
            Token::Dot => {
                self.previous = None;
                self.pending = None;
            }
        }
        Ok(())
    }

    fn ring(&mut self, label: u16) -> Result<()> {
        let here = self
            .previous
            .ok_or_else(|| MarsiError::Parse(format!("ring bond {label} before any atom")))?;
        match self.open_rings.remove(&label) {
            None => {
                self.open_rings.insert(label, (here, self.pending.take()));
            }
            Some((there, written)) => {
                let bonded = self
                    .bonds
                    .iter()
                    .any(|b| (b.atom1, b.atom2) == (here, there) || (b.atom1, b.atom2) == (there, here));
                if there == here || bonded {
                    return Err(MarsiError::Parse(format!("ring bond {label} duplicates an existing bond")));
                }
                let order = self.pending.take().or(written);
                self.connect(there, here, order);
            }
        }
        Ok(())
    }

    /// Bond two atoms; with no written symbol the bond is aromatic between
    /// aromatic atoms and single otherwise.
    fn connect(&mut self, a: usize, b: usize, written: Option<BondOrder>) {
        let both_aromatic = self.atoms[a].is_aromatic && self.atoms[b].is_aromatic;
        let order = match written {
            Some(order) => order,
            None if both_aromatic => BondOrder::Aromatic,
            None => BondOrder::Single,
        };
        let mut bond = Bond::new(a, b, order);
        bond.is_aromatic = both_aromatic && order == BondOrder::Aromatic;
        self.bonds.push(bond);
    }

    fn finish(mut self) -> Result<(Vec<MolAtom>, Vec<Bond>)> {
        if let Some(label) = self.open_rings.keys().next() {
            return Err(MarsiError::Parse(format!("ring bond {label} is never closed")));
        }
        if !self.branches.is_empty() {
            return Err(MarsiError::Parse(format!("{} unmatched '('", self.branches.len())));
        }
        if self.atoms.is_empty() {
            return Err(MarsiError::Parse("SMILES contains no atoms".into()));
        }
        self.fill_hydrogens();
        Ok((self.atoms, self.bonds))
    }

    /// Implicit hydrogens for organic-subset atoms. Aromatic atoms give one
    /// valence to the ring and count each ring bond once.
    fn fill_hydrogens(&mut self) {
        let mut degree = vec![0usize; self.atoms.len()];
        let mut order_sum = vec![0.0f64; self.atoms.len()];
        for bond in &self.bonds {
            for end in [bond.atom1, bond.atom2] {
                degree[end] += 1;
                order_sum[end] += bond.order.as_f64();
            }
        }
        for (i, atom) in self.atoms.iter_mut().enumerate() {
            if self.bracket[i] || atom.atomic_number == 0 {
                continue;
            }
            atom.implicit_hydrogens = if atom.is_aromatic {
                allowed_valences(atom.atomic_number, 0)
                    .first()
                    .map_or(0, |&v| (v as usize).saturating_sub(1 + degree[i]) as u8)
            } else {
                implied_hydrogens(atom.atomic_number, 0, order_sum[i].round() as usize, false)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methane_and_ethanol_hydrogens() {
        let mol = parse_smiles("C").unwrap();
        assert_eq!(mol.atom_count(), 1);
        assert_eq!(mol.bond_count(), 0);
        assert_eq!(mol.atoms[0].implicit_hydrogens, 4);

        let mol = parse_smiles("CCO").unwrap();
        let h: Vec<u8> = mol.atoms.iter().map(|a| a.implicit_hydrogens).collect();
        assert_eq!(h, [3, 2, 1]);
        assert_eq!(mol.bond_count(), 2);
    }

    #[test]
    fn aromatic_ring() {
        let mol = parse_smiles("c1ccccc1").unwrap();
        assert_eq!(mol.bond_count(), 6);
        assert!(mol.bonds.iter().all(|b| b.order == BondOrder::Aromatic && b.is_aromatic));
        assert!(mol.atoms.iter().all(|a| a.is_aromatic && a.implicit_hydrogens == 1));
        let thiophene = parse_smiles("c1ccsc1").unwrap();
        assert_eq!(thiophene.atoms[3].implicit_hydrogens, 0);
        let pyridine = parse_smiles("c1ccncc1").unwrap();
        assert_eq!(pyridine.atoms[3].implicit_hydrogens, 0);
    }

    #[test]
    fn branches_and_bond_symbols() {
        let mol = parse_smiles("CC(C)C").unwrap();
        assert_eq!(mol.degree(1), 3);
        let mol = parse_smiles("C=C").unwrap();
        assert_eq!(mol.bonds[0].order, BondOrder::Double);
        assert_eq!(mol.atoms[0].implicit_hydrogens, 2);
        let mol = parse_smiles("C#N").unwrap();
        assert_eq!(mol.bonds[0].order, BondOrder::Triple);
        assert_eq!(mol.atoms[0].implicit_hydrogens, 1);
        // Explicit single bond between aromatic atoms stays single.
        let biphenyl = parse_smiles("c1ccccc1-c1ccccc1").unwrap();
        assert_eq!(biphenyl.get_bond(5, 6).unwrap().order, BondOrder::Single);
    }

    #[test]
    fn bracket_atoms() {
        let mol = parse_smiles("[NH4+]").unwrap();
        assert_eq!(mol.atoms[0].atomic_number, 7);
        assert_eq!(mol.atoms[0].formal_charge, 1);
        assert_eq!(mol.atoms[0].implicit_hydrogens, 4);

        let mol = parse_smiles("[13CH3][O-]").unwrap();
        assert_eq!(mol.atoms[0].isotope, Some(13));
        assert_eq!(mol.atoms[0].implicit_hydrogens, 3);
        assert_eq!(mol.atoms[1].formal_charge, -1);
        assert_eq!(mol.atoms[1].implicit_hydrogens, 0);

        assert_eq!(parse_smiles("[Fe++]").unwrap().atoms[0].formal_charge, 2);
        assert_eq!(parse_smiles("[Cl-]").unwrap().atoms[0].atomic_number, 17);
        assert_eq!(parse_smiles("[C]").unwrap().atoms[0].implicit_hydrogens, 0);
        assert_eq!(parse_smiles("c1cc[nH]c1").unwrap().atoms[3].implicit_hydrogens, 1);
    }

    #[test]
    fn two_digit_ring_labels() {
        let mol = parse_smiles("C%10CCCCCCCCC%10").unwrap();
        assert_eq!(mol.atom_count(), 10);
        assert_eq!(mol.bond_count(), 10);
        let mol = parse_smiles("C1CC=1").unwrap();
        assert_eq!(mol.get_bond(0, 2).unwrap().order, BondOrder::Double);
    }

    #[test]
    fn dummy_atoms_and_fragments() {
        let mol = parse_smiles("*CC").unwrap();
        assert_eq!(mol.atoms[0].atomic_number, 0);
        assert_eq!(mol.atoms[0].implicit_hydrogens, 0);
        assert_eq!(mol.atoms[1].implicit_hydrogens, 2);
        assert_eq!(parse_smiles("[*]O").unwrap().atoms[0].atomic_number, 0);

        let salt = parse_smiles("[Na+].[Cl-]").unwrap();
        assert_eq!(salt.atom_count(), 2);
        assert_eq!(salt.bond_count(), 0);
    }

    #[test]
    fn hypervalent_atoms() {
        let mol = parse_smiles("OP(=O)(O)O").unwrap();
        assert_eq!(mol.atoms[1].implicit_hydrogens, 0);
        assert_eq!(mol.total_hydrogen_count(), 3);
        let dmso = parse_smiles("CS(=O)C").unwrap();
        assert_eq!(dmso.atoms[1].implicit_hydrogens, 0);
        let sulfate = parse_smiles("OS(=O)(=O)O").unwrap();
        assert_eq!(sulfate.atoms[1].implicit_hydrogens, 0);
    }

    #[test]
    fn stereo_markers_are_ignored() {
        assert_eq!(parse_smiles("F/C=C/F").unwrap().atom_count(), 4);
        let alanine = parse_smiles("N[C@@H](C)C(=O)O").unwrap();
        assert_eq!(alanine.atoms[1].implicit_hydrogens, 1);
    }

    #[test]
    fn malformed_input() {
        for bad in ["", "C11", "C(", "C)", "(C)", "C1CC", "[", "[C", "[Zz]", "C%1", "CX"] {
            assert!(matches!(parse_smiles(bad), Err(MarsiError::Parse(_))), "{bad}");
        }
        // A bond symbol written at the ring opening carries to the closure.
        let mol = parse_smiles("C=1CC1").unwrap();
        assert_eq!(mol.get_bond(0, 2).unwrap().order, BondOrder::Double);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::properties::molecular_formula;
    use proptest::prelude::*;

    fn chain_smiles() -> impl Strategy<Value = String> {
        let atoms = prop_oneof![Just("C"), Just("N"), Just("O"), Just("S"), Just("Cl"), Just("[NH3+]")];
        proptest::collection::vec(atoms, 1..=20).prop_map(|parts| parts.join(""))
    }

    proptest! {
        #[test]
        fn arbitrary_text_never_panics(s in "\\PC{0,100}") {
            let _ = parse_smiles(&s);
        }

        #[test]
        fn chains_parse_to_one_atom_per_symbol(smi in chain_smiles()) {
            let mol = parse_smiles(&smi).unwrap();
            // `[NH3+]` has two capitals for one atom.
            let expected = smi.matches(|c: char| c.is_ascii_uppercase()).count() - smi.matches("[NH3+]").count();
            prop_assert_eq!(mol.atom_count(), expected);
            prop_assert_eq!(mol.bond_count(), mol.atom_count() - 1);
            prop_assert!(!molecular_formula(&mol).is_empty());
        }
    }
}

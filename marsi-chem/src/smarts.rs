//! SMARTS queries for structural keys.
//!
//! Supports the subset the key definitions use: bracket atoms with `#n`,
//! element symbols, `a`/`A`, `H<n>` (total hydrogens), `R`, `r<n>`, `D<n>`,
//! `X<n>`, charges and `!` `&` `,` `;` operators; bonds `-` `=` `#` `:` `~`
//! `@` with `!` `&` `,` `;`; branches and ring closures. An omitted bond is
//! single or aromatic. Recursive SMARTS is not supported.

use std::collections::{BTreeMap, BTreeSet};

use marsi_core::{MarsiError, Result};

use crate::element::element_by_symbol;
use crate::molecule::{BondOrder, Molecule};
use crate::ring;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AtomPrimitive {
    AtomicNum(u8),
    Aromatic,
    Aliphatic,
    Degree(u8),
    /// Implicit plus explicit hydrogens.
    TotalHCount(u8),
    Charge(i8),
    RingMember,
    RingSize(u8),
    /// Degree plus implicit hydrogens.
    Connectivity(u8),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AtomExpr {
    Prim(AtomPrimitive),
    And(Vec<AtomExpr>),
    Or(Vec<AtomExpr>),
    Not(Box<AtomExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BondExpr {
    Single,
    Double,
    Triple,
    Aromatic,
    Ring,
    Any,
    SingleOrAromatic,
    Not(Box<BondExpr>),
    And(Vec<BondExpr>),
    Or(Vec<BondExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SmartsBond {
    pub atom1: usize,
    pub atom2: usize,
    pub expr: BondExpr,
}

/// A parsed SMARTS query.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SmartsPattern {
    pub atoms: Vec<AtomExpr>,
    pub bonds: Vec<SmartsBond>,
    adjacency: Vec<Vec<(usize, usize)>>,
}

impl SmartsPattern {
    fn new(atoms: Vec<AtomExpr>, bonds: Vec<SmartsBond>) -> Self {
        let mut adjacency = vec![Vec::new(); atoms.len()];
        for (bi, bond) in bonds.iter().enumerate() {
            adjacency[bond.atom1].push((bond.atom2, bi));
            adjacency[bond.atom2].push((bond.atom1, bi));
        }
        SmartsPattern { atoms, bonds, adjacency }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct SmartsParser<'a> {
    input: &'a [u8],
    pos: usize,
    atoms: Vec<AtomExpr>,
    bonds: Vec<SmartsBond>,
    stack: Vec<usize>,
    prev_atom: Option<usize>,
    pending_bond: Option<BondExpr>,
    ring_closures: BTreeMap<u16, (usize, Option<BondExpr>)>,
}

impl<'a> SmartsParser<'a> {
    fn new(input: &'a str) -> Self {
        SmartsParser {
            input: input.as_bytes(),
            pos: 0,
            atoms: Vec::new(),
            bonds: Vec::new(),
            stack: Vec::new(),
            prev_atom: None,
            pending_bond: None,
            ring_closures: BTreeMap::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn error(&self, what: &str) -> MarsiError {
        MarsiError::Parse(format!("{what} at position {} in SMARTS", self.pos))
    }

    fn parse(&mut self) -> Result<()> {
        while let Some(ch) = self.peek() {
            match ch {
                b'(' => {
                    self.advance();
                    let prev = self.prev_atom.ok_or_else(|| self.error("branch without preceding atom"))?;
                    self.stack.push(prev);
                }
                b')' => {
                    self.advance();
                    self.prev_atom = Some(self.stack.pop().ok_or_else(|| self.error("unmatched ')'"))?);
                    self.pending_bond = None;
                }
                b'-' | b'=' | b'#' | b':' | b'~' | b'@' | b'!' => {
                    self.pending_bond = Some(self.parse_bond_or()?);
                }
                b'%' => {
                    self.advance();
                    let tens = self.digit()?;
                    let ones = self.digit()?;
                    self.ring_closure(tens * 10 + ones)?;
                }
                b'0'..=b'9' => {
                    self.advance();
                    self.ring_closure(u16::from(ch - b'0'))?;
                }
                b'[' => {
                    self.advance();
                    let expr = self.parse_atom_low()?;
                    if self.advance() != Some(b']') {
                        return Err(self.error("expected ']'"));
                    }
                    self.push_atom(expr);
                }
                b'*' => {
                    self.advance();
                    self.push_atom(AtomExpr::Prim(AtomPrimitive::Wildcard));
                }
                b'.' => {
                    self.advance();
                    self.prev_atom = None;
                    self.pending_bond = None;
                }
                _ => {
                    let expr = self.parse_organic()?;
                    self.push_atom(expr);
                }
            }
        }
        if !self.ring_closures.is_empty() {
            let open: Vec<_> = self.ring_closures.keys().collect();
            return Err(MarsiError::Parse(format!("unmatched ring closure(s) in SMARTS: {open:?}")));
        }
        if !self.stack.is_empty() {
            return Err(self.error("unclosed branch"));
        }
        Ok(())
    }

    fn digit(&mut self) -> Result<u16> {
        match self.advance() {
            Some(d) if d.is_ascii_digit() => Ok(u16::from(d - b'0')),
            _ => Err(self.error("expected digit")),
        }
    }

    fn push_atom(&mut self, expr: AtomExpr) {
        let idx = self.atoms.len();
        self.atoms.push(expr);
        if let Some(prev) = self.prev_atom {
            let expr = self.pending_bond.take().unwrap_or(BondExpr::SingleOrAromatic);
            self.bonds.push(SmartsBond { atom1: prev, atom2: idx, expr });
        }
        self.pending_bond = None;
        self.prev_atom = Some(idx);
    }

    fn ring_closure(&mut self, number: u16) -> Result<()> {
        let current = self.prev_atom.ok_or_else(|| self.error("ring closure without preceding atom"))?;
        if let Some((open_atom, open_bond)) = self.ring_closures.remove(&number) {
            let expr = self
                .pending_bond
                .take()
                .or(open_bond)
                .unwrap_or(BondExpr::SingleOrAromatic);
            self.bonds.push(SmartsBond { atom1: open_atom, atom2: current, expr });
        } else {
            let pending = self.pending_bond.take();
            self.ring_closures.insert(number, (current, pending));
        }
        Ok(())
    }

    /// Unbracketed organic-subset atom or bare `a`/`A`: uppercase is aliphatic.
    fn parse_organic(&mut self) -> Result<AtomExpr> {
        let ch = self.advance().ok_or_else(|| self.error("unexpected end"))?;
        let aromatic = ch.is_ascii_lowercase();
        let z = match (ch, self.peek()) {
            (b'C', Some(b'l')) => {
                self.advance();
                return Ok(element(17));
            }
            (b'B', Some(b'r')) => {
                self.advance();
                return Ok(element(35));
            }
            (b'B' | b'b', _) => 5,
            (b'C' | b'c', _) => 6,
            (b'N' | b'n', _) => 7,
            (b'O' | b'o', _) => 8,
            (b'P' | b'p', _) => 15,
            (b'S' | b's', _) => 16,
            (b'F', _) => return Ok(element(9)),
            (b'I', _) => return Ok(element(53)),
            (b'a', _) => return Ok(AtomExpr::Prim(AtomPrimitive::Aromatic)),
            (b'A', _) => return Ok(AtomExpr::Prim(AtomPrimitive::Aliphatic)),
            _ => {
                self.pos -= 1;
                return Err(self.error(&format!("unexpected '{}'", ch as char)));
            }
        };
        Ok(organic(z, aromatic))
    }

    // Atom expression precedence, loosest first:
    //   low  = or  (';' or)*
    //   or   = and (',' and)*
    //   and  = not (('&' | juxtaposition) not)*
    //   not  = '!'* primitive

    fn parse_atom_low(&mut self) -> Result<AtomExpr> {
        let mut terms = vec![self.parse_atom_or()?];
        while self.peek() == Some(b';') {
            self.advance();
            terms.push(self.parse_atom_or()?);
        }
        Ok(collapse(terms, AtomExpr::And))
    }

    fn parse_atom_or(&mut self) -> Result<AtomExpr> {
        let mut terms = vec![self.parse_atom_and()?];
        while self.peek() == Some(b',') {
            self.advance();
            terms.push(self.parse_atom_and()?);
        }
        Ok(collapse(terms, AtomExpr::Or))
    }

    fn parse_atom_and(&mut self) -> Result<AtomExpr> {
        let mut terms = vec![self.parse_atom_not()?];
        loop {
            match self.peek() {
                Some(b'&') => {
                    self.advance();
                    terms.push(self.parse_atom_not()?);
                }
                Some(b']' | b',' | b';') | None => break,
                Some(_) => terms.push(self.parse_atom_not()?),
            }
        }
        Ok(collapse(terms, AtomExpr::And))
    }

    fn parse_atom_not(&mut self) -> Result<AtomExpr> {
        if self.peek() == Some(b'!') {
            self.advance();
            Ok(AtomExpr::Not(Box::new(self.parse_atom_not()?)))
        } else {
            self.parse_atom_primitive()
        }
    }

    fn parse_atom_primitive(&mut self) -> Result<AtomExpr> {
        let ch = self.peek().ok_or_else(|| self.error("unexpected end"))?;
        let prim = match ch {
            b'#' => {
                self.advance();
                let n = self.number().ok_or_else(|| self.error("expected atomic number"))?;
                AtomPrimitive::AtomicNum(u8::try_from(n).map_err(|_| self.error("atomic number out of range"))?)
            }
            b'*' => {
                self.advance();
                AtomPrimitive::Wildcard
            }
            b'a' if !self.peek_at(1).is_some_and(|c| c.is_ascii_lowercase()) => {
                self.advance();
                AtomPrimitive::Aromatic
            }
            b'A' if !self.peek_at(1).is_some_and(|c| c.is_ascii_lowercase()) => {
                self.advance();
                AtomPrimitive::Aliphatic
            }
            b'H' => {
                self.advance();
                AtomPrimitive::TotalHCount(self.count_or_one()?)
            }
            b'D' => {
                self.advance();
                AtomPrimitive::Degree(self.count_or_one()?)
            }
            b'X' => {
                self.advance();
                AtomPrimitive::Connectivity(self.count_or_one()?)
            }
            b'R' if !self.peek_at(1).is_some_and(|c| c.is_ascii_lowercase()) => {
                self.advance();
                match self.number() {
                    Some(0) => return Ok(AtomExpr::Not(Box::new(AtomExpr::Prim(AtomPrimitive::RingMember)))),
                    _ => AtomPrimitive::RingMember,
                }
            }
            b'r' => {
                self.advance();
                match self.number() {
                    Some(n) => AtomPrimitive::RingSize(u8::try_from(n).map_err(|_| self.error("ring size out of range"))?),
                    None => AtomPrimitive::RingMember,
                }
            }
            b'+' | b'-' => {
                self.advance();
                let sign: i8 = if ch == b'+' { 1 } else { -1 };
                let mut magnitude = 1i8;
                if let Some(n) = self.number() {
                    magnitude = i8::try_from(n).map_err(|_| self.error("charge out of range"))?;
                } else {
                    while self.peek() == Some(ch) {
                        self.advance();
                        magnitude += 1;
                    }
                }
                AtomPrimitive::Charge(sign * magnitude)
            }
            c if c.is_ascii_alphabetic() => return self.parse_element_symbol(),
            c => return Err(self.error(&format!("unexpected '{}'", c as char))),
        };
        Ok(AtomExpr::Prim(prim))
    }

    /// Element symbol inside brackets; two-letter symbols win when valid.
    fn parse_element_symbol(&mut self) -> Result<AtomExpr> {
        let first = self.advance().ok_or_else(|| self.error("unexpected end"))?;
        if first.is_ascii_lowercase() {
            let z = match first {
                b'b' => 5,
                b'c' => 6,
                b'n' => 7,
                b'o' => 8,
                b'p' => 15,
                b's' => 16,
                _ => return Err(self.error(&format!("unknown aromatic symbol '{}'", first as char))),
            };
            return Ok(organic(z, true));
        }
        if let Some(second) = self.peek().filter(|c| c.is_ascii_lowercase()) {
            let two = [first, second];
            let symbol = std::str::from_utf8(&two).unwrap_or_default();
            if let Some(e) = element_by_symbol(symbol).filter(|e| e.atomic_number > 0) {
                self.advance();
                return Ok(element(e.atomic_number));
            }
        }
        let one = [first];
        let symbol = std::str::from_utf8(&one).unwrap_or_default();
        match element_by_symbol(symbol).filter(|e| e.atomic_number > 0) {
            Some(e) if matches!(e.atomic_number, 5 | 6 | 7 | 8 | 15 | 16) => Ok(organic(e.atomic_number, false)),
            Some(e) => Ok(element(e.atomic_number)),
            None => Err(self.error(&format!("unknown element '{symbol}'"))),
        }
    }

    fn number(&mut self) -> Option<u32> {
        let start = self.pos;
        let mut n = 0u32;
        while let Some(d) = self.peek().filter(u8::is_ascii_digit) {
            self.advance();
            n = n.saturating_mul(10).saturating_add(u32::from(d - b'0'));
        }
        (self.pos > start).then_some(n)
    }

    fn count_or_one(&mut self) -> Result<u8> {
        match self.number() {
            Some(n) => u8::try_from(n).map_err(|_| self.error("count out of range")),
            None => Ok(1),
        }
    }

    fn parse_bond_or(&mut self) -> Result<BondExpr> {
        let mut terms = vec![self.parse_bond_and()?];
        while self.peek() == Some(b',') {
            self.advance();
            terms.push(self.parse_bond_and()?);
        }
        Ok(collapse(terms, BondExpr::Or))
    }

    fn parse_bond_and(&mut self) -> Result<BondExpr> {
        let mut terms = vec![self.parse_bond_not()?];
        loop {
            match self.peek() {
                Some(b'&' | b';') => {
                    self.advance();
                    terms.push(self.parse_bond_not()?);
                }
                Some(b'-' | b'=' | b'#' | b':' | b'~' | b'@' | b'!') => terms.push(self.parse_bond_not()?),
                _ => break,
            }
        }
        Ok(collapse(terms, BondExpr::And))
    }

    fn parse_bond_not(&mut self) -> Result<BondExpr> {
        let ch = self.advance().ok_or_else(|| self.error("expected bond"))?;
        Ok(match ch {
            b'!' => BondExpr::Not(Box::new(self.parse_bond_not()?)),
            b'-' => BondExpr::Single,
            b'=' => BondExpr::Double,
            b'#' => BondExpr::Triple,
            b':' => BondExpr::Aromatic,
            b'~' => BondExpr::Any,
            b'@' => BondExpr::Ring,
            other => {
                self.pos -= 1;
                return Err(self.error(&format!("unexpected '{}' in bond", other as char)));
            }
        })
    }
}

fn element(z: u8) -> AtomExpr {
    AtomExpr::Prim(AtomPrimitive::AtomicNum(z))
}

fn organic(z: u8, aromatic: bool) -> AtomExpr {
    let flag = if aromatic { AtomPrimitive::Aromatic } else { AtomPrimitive::Aliphatic };
    AtomExpr::And(vec![element(z), AtomExpr::Prim(flag)])
}

fn collapse<T>(mut terms: Vec<T>, join: impl FnOnce(Vec<T>) -> T) -> T {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        join(terms)
    }
}

/// Parse a SMARTS string.
pub(crate) fn parse_smarts(smarts: &str) -> Result<SmartsPattern> {
    if smarts.is_empty() {
        return Err(MarsiError::Parse("empty SMARTS string".into()));
    }
    let mut parser = SmartsParser::new(smarts);
    parser.parse()?;
    Ok(SmartsPattern::new(parser.atoms, parser.bonds))
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Per-molecule data shared by every query against it.
pub(crate) struct QueryTarget<'a> {
    mol: &'a Molecule,
    ring_atoms: Vec<bool>,
    ring_bonds: Vec<bool>,
    ring_sizes: Vec<Vec<u8>>,
    total_h: Vec<u8>,
}

impl<'a> QueryTarget<'a> {
    pub fn new(mol: &'a Molecule) -> Self {
        let rings = ring::find_sssr(mol);
        let mut ring_sizes = vec![Vec::new(); mol.atom_count()];
        for r in &rings {
            let size = u8::try_from(r.len()).unwrap_or(u8::MAX);
            for &a in r {
                if !ring_sizes[a].contains(&size) {
                    ring_sizes[a].push(size);
                }
            }
        }
        let total_h = (0..mol.atom_count())
            .map(|i| {
                let explicit = mol.adjacency[i].iter().filter(|&&(n, _)| mol.atoms[n].is_hydrogen()).count();
                mol.atoms[i].implicit_hydrogens.saturating_add(explicit as u8)
            })
            .collect();
        QueryTarget {
            mol,
            ring_atoms: ring::ring_atoms(mol),
            ring_bonds: ring::ring_bonds(mol),
            ring_sizes,
            total_h,
        }
    }

    /// Whether `pattern` occurs at least once.
    pub fn matches(&self, pattern: &SmartsPattern) -> bool {
        let mut search = Search::new(self, pattern, true);
        search.run();
        !search.found.is_empty()
    }

    /// Number of matches with distinct atom sets.
    pub fn count_unique(&self, pattern: &SmartsPattern) -> usize {
        let mut search = Search::new(self, pattern, false);
        search.run();
        let sets: BTreeSet<Vec<usize>> = search
            .found
            .into_iter()
            .map(|mut atoms| {
                atoms.sort_unstable();
                atoms
            })
            .collect();
        sets.len()
    }

    /// Target atoms that the first pattern atom maps to in some match.
    pub fn anchors(&self, pattern: &SmartsPattern) -> BTreeSet<usize> {
        let mut search = Search::new(self, pattern, false);
        search.run();
        search.found.iter().filter_map(|m| m.first().copied()).collect()
    }

    fn atom_matches(&self, expr: &AtomExpr, idx: usize) -> bool {
        match expr {
            AtomExpr::Prim(prim) => self.primitive_matches(prim, idx),
            AtomExpr::And(terms) => terms.iter().all(|t| self.atom_matches(t, idx)),
            AtomExpr::Or(terms) => terms.iter().any(|t| self.atom_matches(t, idx)),
            AtomExpr::Not(inner) => !self.atom_matches(inner, idx),
        }
    }

    fn primitive_matches(&self, prim: &AtomPrimitive, idx: usize) -> bool {
        let atom = &self.mol.atoms[idx];
        match *prim {
            AtomPrimitive::AtomicNum(z) => atom.atomic_number == z,
            AtomPrimitive::Aromatic => atom.is_aromatic,
            AtomPrimitive::Aliphatic => !atom.is_aromatic,
            AtomPrimitive::Degree(d) => self.mol.degree(idx) == usize::from(d),
            AtomPrimitive::TotalHCount(h) => self.total_h[idx] == h,
            AtomPrimitive::Charge(c) => atom.formal_charge == c,
            AtomPrimitive::RingMember => self.ring_atoms[idx],
            AtomPrimitive::RingSize(s) => self.ring_sizes[idx].contains(&s),
            AtomPrimitive::Connectivity(x) => {
                self.mol.degree(idx) + usize::from(atom.implicit_hydrogens) == usize::from(x)
            }
            AtomPrimitive::Wildcard => true,
        }
    }

    fn bond_matches(&self, expr: &BondExpr, bond_idx: usize) -> bool {
        let bond = &self.mol.bonds[bond_idx];
        let aromatic = bond.is_aromatic || bond.order == BondOrder::Aromatic;
        match expr {
            BondExpr::Single => bond.order == BondOrder::Single && !aromatic,
            BondExpr::Double => bond.order == BondOrder::Double && !aromatic,
            BondExpr::Triple => bond.order == BondOrder::Triple,
            BondExpr::Aromatic => aromatic,
            BondExpr::SingleOrAromatic => aromatic || bond.order == BondOrder::Single,
            BondExpr::Ring => self.ring_bonds[bond_idx],
            BondExpr::Any => true,
            BondExpr::Not(inner) => !self.bond_matches(inner, bond_idx),
            BondExpr::And(terms) => terms.iter().all(|t| self.bond_matches(t, bond_idx)),
            BondExpr::Or(terms) => terms.iter().any(|t| self.bond_matches(t, bond_idx)),
        }
    }
}

/// Backtracking subgraph search in pattern atom order.
struct Search<'q, 'm> {
    target: &'q QueryTarget<'m>,
    pattern: &'q SmartsPattern,
    first_only: bool,
    core_target: Vec<bool>,
    core_pattern: Vec<Option<usize>>,
    /// Complete mappings in pattern atom order.
    found: BTreeSet<Vec<usize>>,
}

impl<'q, 'm> Search<'q, 'm> {
    fn new(target: &'q QueryTarget<'m>, pattern: &'q SmartsPattern, first_only: bool) -> Self {
        Search {
            target,
            pattern,
            first_only,
            core_target: vec![false; target.mol.atom_count()],
            core_pattern: vec![None; pattern.atoms.len()],
            found: BTreeSet::new(),
        }
    }

    fn run(&mut self) {
        if self.pattern.atoms.is_empty() || self.pattern.atoms.len() > self.target.mol.atom_count() {
            return;
        }
        self.extend(0);
    }

    fn done(&self) -> bool {
        self.first_only && !self.found.is_empty()
    }

    fn extend(&mut self, depth: usize) {
        if depth == self.pattern.atoms.len() {
            self.found.insert(self.core_pattern.iter().flatten().copied().collect());
            return;
        }
        for candidate in self.candidates(depth) {
            if self.core_target[candidate] || !self.feasible(depth, candidate) {
                continue;
            }
            self.core_pattern[depth] = Some(candidate);
            self.core_target[candidate] = true;
            self.extend(depth + 1);
            self.core_pattern[depth] = None;
            self.core_target[candidate] = false;
            if self.done() {
                return;
            }
        }
    }

    fn candidates(&self, pattern_atom: usize) -> Vec<usize> {
        let anchor = self.pattern.adjacency[pattern_atom]
            .iter()
            .find_map(|&(p, _)| self.core_pattern[p]);
        match anchor {
            Some(t) => self.target.mol.adjacency[t].iter().map(|&(n, _)| n).collect(),
            None => (0..self.target.mol.atom_count()).collect(),
        }
    }

    fn feasible(&self, pattern_atom: usize, target_atom: usize) -> bool {
        if !self.target.atom_matches(&self.pattern.atoms[pattern_atom], target_atom) {
            return false;
        }
        self.pattern.adjacency[pattern_atom].iter().all(|&(p_nb, p_bond)| {
            let Some(t_nb) = self.core_pattern[p_nb] else {
                return true;
            };
            self.target.mol.adjacency[target_atom]
                .iter()
                .find(|&&(n, _)| n == t_nb)
                .is_some_and(|&(_, tb)| self.target.bond_matches(&self.pattern.bonds[p_bond].expr, tb))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    fn hit(smarts: &str, smiles: &str) -> bool {
        let pattern = parse_smarts(smarts).unwrap();
        let mol = parse_smiles(smiles).unwrap();
        QueryTarget::new(&mol).matches(&pattern)
    }

    fn count(smarts: &str, smiles: &str) -> usize {
        let pattern = parse_smarts(smarts).unwrap();
        let mol = parse_smiles(smiles).unwrap();
        QueryTarget::new(&mol).count_unique(&pattern)
    }

    #[test]
    fn atomic_number_and_negation() {
        assert!(hit("[#6]", "C"));
        assert!(!hit("[#6]", "N"));
        assert!(hit("[!#6;!#1]", "CN"));
        assert!(!hit("[!#6;!#1]", "CC"));
    }

    #[test]
    fn aliphatic_and_aromatic_symbols() {
        assert!(hit("[C]", "CC"));
        assert!(!hit("[C]", "c1ccccc1"));
        assert!(hit("[c]", "c1ccccc1"));
        assert!(hit("[!C;!c;R]", "C1CCNCC1"));
        assert!(!hit("[!C;!c;R]", "C1CCCCC1"));
    }

    #[test]
    fn bare_aromaticity_atoms() {
        assert!(hit("a", "c1ccncc1"));
        assert!(!hit("a", "C1CCCCC1"));
        assert!(hit("A", "CCO"));
        assert!(!hit("A", "c1ccccc1"));
        assert!(hit("a:a", "c1ccccc1"));
    }

    #[test]
    fn hydrogen_counts() {
        assert!(hit("[CH3]", "CC"));
        assert!(!hit("[CH3]", "C1CC1"));
        assert_eq!(count("[CH3]", "CC(C)C"), 3);
        assert!(hit("[O;!H0]", "CO"));
        assert!(!hit("[O;!H0]", "COC"));
        assert_eq!(count("[C;H3,H4]", "C"), 1);
    }

    #[test]
    fn bond_primitives() {
        assert!(hit("[#6]=[#8]", "CC=O"));
        assert!(!hit("[#6]=[#8]", "CCO"));
        assert!(hit("[#6]#[#7]", "CC#N"));
        assert!(hit("[#6]:[#7]", "c1ccncc1"));
        assert!(hit("[#8]!:*:*", "Oc1ccccc1"));
        assert!(!hit("[#8]!:*:*", "OCCCCC"));
        assert!(hit("*@*!@[#8]", "OC1CCCCC1"));
        assert!(!hit("*@*!@[#8]", "OCCCCC"));
        // Ring fusion atom on a ring double bond.
        assert!(hit("[#6]=;@[#6](@*)@*", "C1=C2CCCC2CC1"));
        assert!(!hit("[#6]=;@[#6](@*)@*", "C1=CCCC1C"));
    }

    #[test]
    fn ring_closure_patterns() {
        assert!(hit("*1~*~*~*~*~*~1", "c1ccccc1"));
        assert!(!hit("*1~*~*~*~*~*~1", "C1CCCC1"));
        assert!(hit("[!#6;!#1]1~*~*~1", "C1CO1"));
    }

    #[test]
    fn charge_primitive() {
        assert!(hit("[!+0]", "CC(=O)[O-]"));
        assert!(!hit("[!+0]", "CC(=O)O"));
        assert!(hit("[+1]", "C[NH3+]"));
    }

    #[test]
    fn unique_counts_ignore_permutations() {
        // Three C-O single bonds around the carbonate center.
        assert_eq!(count("[#8]~[#6]~[#8]", "OC(=O)O"), 3);
        assert_eq!(count("[#6]", "CCO"), 2);
    }

    #[test]
    fn anchors_are_first_pattern_atoms() {
        let pattern = parse_smarts("[#8]~[#6]").unwrap();
        let mol = parse_smiles("OCCO").unwrap();
        let anchors = QueryTarget::new(&mol).anchors(&pattern);
        assert_eq!(anchors.into_iter().collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn invalid_patterns() {
        assert!(parse_smarts("").is_err());
        assert!(parse_smarts("[").is_err());
        assert!(parse_smarts("*1**").is_err());
        assert!(parse_smarts("[Qq]").is_err());
        assert!(parse_smarts("C)").is_err());
    }
}

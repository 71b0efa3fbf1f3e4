//! InChI writer, reader and InChIKey hashing.
//!
//! The writer emits the standard InChI main layers:
//!
//! ```text
//! InChI=1S/<formula>/c<connections>/h<hydrogens>[/q<charge>]
//! ```
//!
//! Heavy atoms of each component are numbered in Hill formula order, and by
//! canonical rank within an element. `/c` is a depth-first walk from atom 1
//! visiting neighbors in ascending order; branches go in parentheses and a
//! number seen before closes a ring. `/h` lists fixed hydrogens grouped by
//! count. Stereo, isotopic and mobile-hydrogen layers are not produced, so
//! strings and keys agree with IUPAC software only for molecules those layers
//! do not affect.
//!
//! The reader accepts the same layers (plus mobile-H groups and `/p`), rebuilds
//! bond orders by saturating free valences and places charges heuristically.
//! Problems the reader can work around are logged with `tracing::warn!` and
//! never returned as errors.

use std::collections::{BTreeMap, BTreeSet};

use marsi_core::hash::sha256_digest;
use marsi_core::{MarsiError, Result};

use crate::canon::canonical_ranks;
use crate::element::{allowed_valences, element_by_number, element_by_symbol};
use crate::molecule::{Bond, BondOrder, MolAtom, Molecule};
use crate::properties::hill_order;
use crate::ring;

/// Prefix of every standard InChI produced here.
pub const INCHI_PREFIX: &str = "InChI=1S/";

/// Search budget for bond-order reconstruction.
const KEKULIZE_STEP_CAP: usize = 20_000;

/// Largest heavy-atom count the reader will build.
const MAX_INCHI_ATOMS: usize = 4_096;

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Layer strings for one connected component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ComponentLayers {
    /// Sort key: more heavy atoms first.
    heavy_rev: std::cmp::Reverse<usize>,
    formula: String,
    connections: String,
    hydrogens: String,
    charge: i32,
}

/// Write the standard InChI for `mol`.
///
/// Fails with [`MarsiError::Conversion`] for an empty molecule or one that
/// contains dummy atoms.
pub fn to_inchi(mol: &Molecule) -> Result<String> {
    if mol.is_empty() {
        return Err(MarsiError::Conversion(
            "cannot write InChI for a molecule with no atoms".into(),
        ));
    }
    if mol.atoms.iter().any(|a| a.atomic_number == 0) {
        return Err(MarsiError::Conversion(
            "dummy atoms have no InChI representation".into(),
        ));
    }

    let (skeleton, _) = mol.heavy_skeleton();
    let ranks = canonical_ranks(&skeleton);
    let mut components: Vec<ComponentLayers> = connected_components(&skeleton)
        .iter()
        .map(|atoms| component_layers(&skeleton, atoms, &ranks))
        .collect();
    components.sort();

    let mut inchi = String::from(INCHI_PREFIX);
    let formulas: Vec<&str> = components.iter().map(|c| c.formula.as_str()).collect();
    inchi.push_str(&formulas.join("."));

    if components.iter().any(|c| !c.connections.is_empty()) {
        let layer: Vec<&str> = components.iter().map(|c| c.connections.as_str()).collect();
        inchi.push_str("/c");
        inchi.push_str(&layer.join(";"));
    }
    if components.iter().any(|c| !c.hydrogens.is_empty()) {
        let layer: Vec<&str> = components.iter().map(|c| c.hydrogens.as_str()).collect();
        inchi.push_str("/h");
        inchi.push_str(&layer.join(";"));
    }
    if components.iter().any(|c| c.charge != 0) {
        let layer: Vec<String> = components
            .iter()
            .map(|c| match c.charge {
                0 => String::new(),
                q => format!("{q:+}"),
            })
            .collect();
        inchi.push_str("/q");
        inchi.push_str(&layer.join(";"));
    }
    Ok(inchi)
}

fn connected_components(mol: &Molecule) -> Vec<Vec<usize>> {
    let n = mol.atom_count();
    let mut seen = vec![false; n];
    let mut components = Vec::new();
    for start in 0..n {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut stack = vec![start];
        let mut atoms = Vec::new();
        while let Some(a) = stack.pop() {
            atoms.push(a);
            for &(nb, _) in &mol.adjacency[a] {
                if !seen[nb] {
                    seen[nb] = true;
                    stack.push(nb);
                }
            }
        }
        atoms.sort_unstable();
        components.push(atoms);
    }
    components
}

fn symbol_of(mol: &Molecule, atom: usize) -> &'static str {
    element_by_number(mol.atoms[atom].atomic_number).map_or("*", |e| e.symbol)
}

fn component_layers(mol: &Molecule, atoms: &[usize], ranks: &[usize]) -> ComponentLayers {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for &i in atoms {
        *counts.entry(symbol_of(mol, i)).or_insert(0) += 1;
        let h = mol.atoms[i].implicit_hydrogens as usize;
        if h > 0 {
            *counts.entry("H").or_insert(0) += h;
        }
    }
    let order = hill_order(&counts);
    let mut formula = String::new();
    for &(symbol, count) in &order {
        formula.push_str(symbol);
        if count > 1 {
            formula.push_str(&count.to_string());
        }
    }

    let hill_pos = |symbol: &str| order.iter().position(|&(s, _)| s == symbol).unwrap_or(usize::MAX);
    let mut numbered: Vec<usize> = atoms
        .iter()
        .copied()
        .filter(|&i| !mol.atoms[i].is_hydrogen())
        .collect();
    numbered.sort_by_key(|&i| (hill_pos(symbol_of(mol, i)), ranks[i]));

    let mut local = vec![usize::MAX; mol.atom_count()];
    for (li, &i) in numbered.iter().enumerate() {
        local[i] = li;
    }
    let neighbors: Vec<Vec<usize>> = numbered
        .iter()
        .map(|&i| {
            let mut nbs: Vec<usize> = mol.adjacency[i]
                .iter()
                .map(|&(nb, _)| local[nb])
                .filter(|&l| l != usize::MAX)
                .collect();
            nbs.sort_unstable();
            nbs
        })
        .collect();

    let connections = if numbered.len() > 1 {
        connection_layer(&neighbors)
    } else {
        String::new()
    };
    let h_counts: Vec<usize> = numbered.iter().map(|&i| mol.hydrogen_count(i)).collect();
    let charge = atoms.iter().map(|&i| mol.atoms[i].formal_charge as i32).sum();

    ComponentLayers {
        heavy_rev: std::cmp::Reverse(numbered.len()),
        formula,
        connections,
        hydrogens: hydrogen_layer(&h_counts),
        charge,
    }
}

/// Depth-first connection string over locally numbered atoms.
fn connection_layer(neighbors: &[Vec<usize>]) -> String {
    let n = neighbors.len();
    let mut visited = vec![false; n];
    let mut children = vec![Vec::new(); n];
    let mut closures = vec![Vec::new(); n];
    let mut closed: BTreeSet<(usize, usize)> = BTreeSet::new();
    let mut parts = Vec::new();

    for root in 0..n {
        if visited[root] {
            continue;
        }
        spanning_tree(root, None, neighbors, &mut visited, &mut children, &mut closures, &mut closed);
        parts.push(render(root, &children, &closures));
    }
    parts.join(",")
}

fn spanning_tree(
    v: usize,
    parent: Option<usize>,
    neighbors: &[Vec<usize>],
    visited: &mut [bool],
    children: &mut [Vec<usize>],
    closures: &mut [Vec<usize>],
    closed: &mut BTreeSet<(usize, usize)>,
) {
    visited[v] = true;
    for &w in &neighbors[v] {
        if Some(w) == parent {
            continue;
        }
        if visited[w] {
            if closed.insert((v.min(w), v.max(w))) {
                closures[v].push(w);
            }
        } else {
            closed.insert((v.min(w), v.max(w)));
            children[v].push(w);
            spanning_tree(w, Some(v), neighbors, visited, children, closures, closed);
        }
    }
}

fn render(v: usize, children: &[Vec<usize>], closures: &[Vec<usize>]) -> String {
    let mut out = (v + 1).to_string();
    let mut items: Vec<String> = closures[v].iter().map(|&w| (w + 1).to_string()).collect();
    items.extend(children[v].iter().map(|&c| render(c, children, closures)));
    match items.len() {
        0 => {}
        1 => {
            out.push('-');
            out.push_str(&items[0]);
        }
        _ => {
            let last = items.pop().unwrap_or_default();
            out.push('(');
            out.push_str(&items.join(","));
            out.push(')');
            out.push_str(&last);
        }
    }
    out
}

/// `/h` body: atoms grouped by hydrogen count, ascending.
fn hydrogen_layer(h_counts: &[usize]) -> String {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &h) in h_counts.iter().enumerate() {
        if h > 0 {
            groups.entry(h).or_default().push(i + 1);
        }
    }
    groups
        .iter()
        .map(|(&h, atoms)| {
            let mut s = compress_ranges(atoms);
            s.push('H');
            if h > 1 {
                s.push_str(&h.to_string());
            }
            s
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// `[1, 2, 3, 5]` → `"1-3,5"`.
fn compress_ranges(sorted: &[usize]) -> String {
    let mut parts = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let start = sorted[i];
        let mut end = start;
        while i + 1 < sorted.len() && sorted[i + 1] == end + 1 {
            i += 1;
            end = sorted[i];
        }
        parts.push(if end > start {
            format!("{start}-{end}")
        } else {
            start.to_string()
        });
        i += 1;
    }
    parts.join(",")
}

// ---------------------------------------------------------------------------
// InChIKey
// ---------------------------------------------------------------------------

const FIRST_LETTERS: &[u8; 25] = b"ABCDFGHIJKLMNOPQRSTUVWXYZ";

/// Hash an InChI string into a 27-character key.
///
/// Layout `XXXXXXXXXXXXXX-YYYYYYYYSA-P`: 14 letters from SHA-256 of the
/// formula, `/c`, `/h` and `/q` layers; 8 letters from SHA-256 of the
/// remaining layers; `S` for a standard InChI (`N` otherwise), `A` for
/// version 1; and a protonation letter (`N` neutral, `O`/`P`/… for added
/// protons, `M`/`L`/… for removed ones).
pub fn inchi_key_from_inchi(inchi: &str) -> Result<String> {
    let inchi = inchi.trim();
    let body = inchi
        .strip_prefix("InChI=")
        .ok_or_else(|| MarsiError::Conversion(format!("not an InChI: '{inchi}'")))?;
    let mut layers = body.split('/');
    let version = layers.next().unwrap_or_default();
    if !version.starts_with('1') {
        return Err(MarsiError::Conversion(format!("unsupported InChI version '{version}'")));
    }
    let formula = layers
        .next()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| MarsiError::Conversion("InChI has no formula layer".into()))?;

    let mut main = String::from(formula);
    let mut rest = String::new();
    let mut protons = 0i32;
    for layer in layers {
        match layer.as_bytes().first() {
            Some(b'c' | b'h' | b'q') if rest.is_empty() => {
                main.push('/');
                main.push_str(layer);
            }
            Some(b'p') => protons = parse_signed(&layer[1..]).unwrap_or(0),
            _ => {
                rest.push('/');
                rest.push_str(layer);
            }
        }
    }

    let block1 = encode_letters(&sha256_digest(main.as_bytes()), 14);
    let block2 = encode_letters(&sha256_digest(rest.as_bytes()), 8);
    let standard = if version == "1S" { 'S' } else { 'N' };
    Ok(format!("{block1}-{block2}{standard}A-{}", protonation_letter(protons)))
}

fn protonation_letter(protons: i32) -> char {
    let offset = protons.clamp(-12, 12);
    (b'N' as i32 + offset) as u8 as char
}

/// Letters from a digest: 14-bit chunks become triplets, a trailing 9-bit
/// chunk becomes a doublet. No letter group starts with `E`.
fn encode_letters(digest: &[u8; 32], len: usize) -> String {
    let mut bits = BitReader { bytes: digest, pos: 0 };
    let mut out = String::with_capacity(len);
    let triplets = len / 3;
    for _ in 0..triplets {
        let t = bits.take(14);
        out.push(FIRST_LETTERS[t / 676] as char);
        out.push((b'A' + (t / 26 % 26) as u8) as char);
        out.push((b'A' + (t % 26) as u8) as char);
    }
    if len % 3 == 2 {
        let d = bits.take(9);
        out.push(FIRST_LETTERS[d / 26] as char);
        out.push((b'A' + (d % 26) as u8) as char);
    }
    out
}

struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl BitReader<'_> {
    fn take(&mut self, n: usize) -> usize {
        let mut v = 0usize;
        for _ in 0..n {
            let byte = self.bytes[(self.pos / 8) % self.bytes.len()];
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            v = (v << 1) | bit as usize;
            self.pos += 1;
        }
        v
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Parse an InChI string into a molecule with implicit hydrogens.
///
/// Only malformed text is an error. Unsupported layers, hydrogen-count
/// mismatches and valences that cannot be satisfied are logged and skipped.
pub fn parse_inchi(text: &str) -> Result<Molecule> {
    let text = text.trim();
    let body = text
        .strip_prefix("InChI=")
        .ok_or_else(|| MarsiError::Parse(format!("InChI must start with 'InChI=': '{text}'")))?;
    let mut layers = body.split('/');
    let version = layers.next().unwrap_or_default();
    if !version.starts_with('1') {
        return Err(MarsiError::Parse(format!("unsupported InChI version '{version}'")));
    }
    let formula = layers
        .next()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| MarsiError::Parse("InChI has no formula layer".into()))?;
    let components = parse_formula(formula)?;
    let n = components.len();

    let mut connections = vec![""; n];
    let mut hydrogens = vec![""; n];
    let mut charges = vec![0i32; n];
    let mut protons = 0i32;
    for layer in layers {
        let mut chars = layer.chars();
        let tag = chars.next().unwrap_or_default();
        let content = chars.as_str();
        match tag {
            'c' => connections = split_layer(content, n)?,
            'h' => hydrogens = split_layer(content, n)?,
            'q' => {
                charges = split_layer(content, n)?
                    .into_iter()
                    .map(|q| if q.is_empty() { Ok(0) } else { parse_signed(q) })
                    .collect::<Result<_>>()?;
            }
            'p' => protons = parse_signed(content)?,
            'f' | 'r' | 'i' => {
                tracing::warn!(layer = %tag, "InChI layer not supported, ignoring it and what follows");
                break;
            }
            _ => tracing::debug!(layer = %tag, "InChI layer ignored"),
        }
    }

    let sizes: Vec<usize> = components
        .iter()
        .map(|elements| elements.iter().map(|&(_, c)| c).sum())
        .collect();
    for (k, &q) in charges.iter().enumerate() {
        check_magnitude("charge", q, sizes[k])?;
    }
    check_magnitude("proton count", protons, sizes.iter().sum())?;

    let mut mol = Molecule::new(String::new(), Vec::new(), Vec::new());
    for (k, elements) in components.iter().enumerate() {
        let mut part = build_component(elements, connections[k], hydrogens[k])?;
        let extra = if k == 0 { protons } else { 0 };
        apply_protons(&mut part, extra);
        let charge = charges[k]
            .checked_add(extra)
            .ok_or_else(|| MarsiError::Parse(format!("charge {} with /p{extra} overflows", charges[k])))?;
        resolve_valences(&mut part, charge);
        append(&mut mol, part);
    }
    ring::perceive_aromaticity(&mut mol);
    Ok(mol)
}

/// Element counts per component, expanding `2H2O`-style multipliers.
fn parse_formula(formula: &str) -> Result<Vec<Vec<(&'static str, usize)>>> {
    let mut components = Vec::new();
    let mut total = 0usize;
    for part in formula.split('.') {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        let repeat: usize = if digits.is_empty() {
            1
        } else {
            digits
                .parse()
                .map_err(|_| MarsiError::Parse(format!("bad multiplier in '{part}'")))?
        };
        let elements = parse_formula_part(&part[digits.len()..])?;
        let size: usize = elements.iter().map(|&(_, c)| c).sum();
        total = total.saturating_add(size.saturating_mul(repeat));
        if total > MAX_INCHI_ATOMS {
            return Err(MarsiError::Parse(format!(
                "formula '{formula}' has more than {MAX_INCHI_ATOMS} atoms"
            )));
        }
        for _ in 0..repeat {
            components.push(elements.clone());
        }
    }
    Ok(components)
}

fn parse_formula_part(part: &str) -> Result<Vec<(&'static str, usize)>> {
    let bytes = part.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_uppercase() {
            return Err(MarsiError::Parse(format!("bad formula '{part}'")));
        }
        let start = i;
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_lowercase() {
            i += 1;
        }
        let symbol = &part[start..i];
        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let count = if digits_start == i {
            1
        } else {
            part[digits_start..i]
                .parse()
                .map_err(|_| MarsiError::Parse(format!("bad count in formula '{part}'")))?
        };
        let elem = element_by_symbol(symbol)
            .filter(|e| e.atomic_number > 0)
            .ok_or_else(|| MarsiError::Parse(format!("unknown element '{symbol}' in formula")))?;
        out.push((elem.symbol, count));
    }
    if out.is_empty() {
        return Err(MarsiError::Parse("empty formula component".into()));
    }
    Ok(out)
}

/// Split a layer on `;` into one entry per component, expanding `n*` prefixes.
fn split_layer(content: &str, components: usize) -> Result<Vec<&str>> {
    let mut out = Vec::with_capacity(components);
    for part in content.split(';') {
        match part.split_once('*') {
            Some((count, rest)) if !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit()) => {
                let count: usize = count
                    .parse()
                    .map_err(|_| MarsiError::Parse(format!("bad multiplier '{count}*'")))?;
                out.extend(std::iter::repeat(rest).take(count));
            }
            _ => out.push(part),
        }
    }
    if out.len() > components {
        tracing::warn!(
            layer_parts = out.len(),
            components,
            "InChI layer has more parts than the formula has components"
        );
        out.truncate(components);
    }
    out.resize(components, "");
    Ok(out)
}

/// A charge or proton shift cannot exceed the atoms that would carry it.
fn check_magnitude(what: &str, value: i32, atoms: usize) -> Result<()> {
    if value.unsigned_abs() as usize > atoms {
        return Err(MarsiError::Parse(format!(
            "InChI {what} {value} is larger than the {atoms} atoms it applies to"
        )));
    }
    Ok(())
}

fn parse_signed(text: &str) -> Result<i32> {
    let text = text.strip_prefix('+').unwrap_or(text);
    text.parse()
        .map_err(|_| MarsiError::Parse(format!("bad charge value '{text}'")))
}

fn parse_atom_number(token: &str, n_atoms: usize) -> Result<usize> {
    let k: usize = token
        .parse()
        .map_err(|_| MarsiError::Parse(format!("bad atom number '{token}'")))?;
    if k == 0 || k > n_atoms {
        return Err(MarsiError::Parse(format!(
            "atom number {k} outside 1..={n_atoms}"
        )));
    }
    Ok(k - 1)
}

fn build_component(elements: &[(&'static str, usize)], connections: &str, hydrogens: &str) -> Result<Molecule> {
    let mut atoms = Vec::new();
    let mut formula_h = 0usize;
    for &(symbol, count) in elements {
        if symbol == "H" {
            formula_h += count;
            continue;
        }
        let z = element_by_symbol(symbol).map_or(0, |e| e.atomic_number);
        atoms.extend(std::iter::repeat_with(|| MolAtom::new(z)).take(count));
    }

    if atoms.is_empty() {
        // Bare hydrogen component (H2, H+).
        let mut mol = Molecule::new(String::new(), vec![MolAtom::new(1); formula_h], Vec::new());
        if formula_h == 2 {
            mol.add_bond(Bond::new(0, 1, BondOrder::Single));
        }
        return Ok(mol);
    }

    let n = atoms.len();
    let edges = parse_connections(connections, n)?;
    let h_counts = parse_hydrogens(hydrogens, n)?;
    let assigned: usize = h_counts.iter().map(|&h| h as usize).sum();
    if assigned != formula_h {
        tracing::warn!(formula_h, assigned, "InChI hydrogen layer disagrees with formula");
    }
    for (atom, h) in atoms.iter_mut().zip(h_counts) {
        atom.implicit_hydrogens = h;
    }
    let bonds = edges
        .into_iter()
        .map(|(a, b)| Bond::new(a, b, BondOrder::Single))
        .collect();
    Ok(Molecule::new(String::new(), atoms, bonds))
}

fn parse_connections(text: &str, n_atoms: usize) -> Result<Vec<(usize, usize)>> {
    let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
    let mut current: Option<usize> = None;
    let mut stack: Vec<Option<usize>> = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let atom = parse_atom_number(&text[start..i], n_atoms)?;
                if let Some(prev) = current {
                    if prev == atom {
                        return Err(MarsiError::Parse(format!("atom {} bonded to itself", atom + 1)));
                    }
                    edges.insert((prev.min(atom), prev.max(atom)));
                }
                current = Some(atom);
                continue;
            }
            b'-' => {}
            b'(' => stack.push(current),
            b',' => {
                current = *stack
                    .last()
                    .ok_or_else(|| MarsiError::Parse("',' outside a branch in /c layer".into()))?;
            }
            b')' => {
                current = stack
                    .pop()
                    .ok_or_else(|| MarsiError::Parse("unbalanced ')' in /c layer".into()))?;
            }
            other => {
                return Err(MarsiError::Parse(format!(
                    "unexpected '{}' in /c layer",
                    other as char
                )));
            }
        }
        i += 1;
    }
    if !stack.is_empty() {
        return Err(MarsiError::Parse("unbalanced '(' in /c layer".into()));
    }
    Ok(edges.into_iter().collect())
}

/// Split on commas outside parentheses.
fn top_level_items(text: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                items.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&text[start..]);
    items.into_iter().filter(|s| !s.is_empty()).collect()
}

fn parse_h_count(text: &str) -> Result<u8> {
    if text.is_empty() || text == "-" {
        return Ok(1);
    }
    let text = text.trim_end_matches('-');
    text.parse()
        .map_err(|_| MarsiError::Parse(format!("bad hydrogen count '{text}'")))
}

fn parse_hydrogens(text: &str, n_atoms: usize) -> Result<Vec<u8>> {
    let mut counts = vec![0u8; n_atoms];
    let mut pending: Vec<usize> = Vec::new();
    for item in top_level_items(text) {
        if let Some(inner) = item.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            // Mobile group (H2,3,4): hydrogens go to the first listed atoms.
            let mut parts = inner.split(',');
            let head = parts.next().unwrap_or_default();
            let count = parse_h_count(head.strip_prefix('H').ok_or_else(|| {
                MarsiError::Parse(format!("bad mobile-H group '({inner})'"))
            })?)?;
            let members: Vec<usize> = parts
                .map(|p| parse_atom_number(p, n_atoms))
                .collect::<Result<_>>()?;
            if members.is_empty() {
                return Err(MarsiError::Parse(format!("empty mobile-H group '({inner})'")));
            }
            for k in 0..count as usize {
                let target = members[k % members.len()];
                counts[target] = counts[target].saturating_add(1);
            }
            continue;
        }
        let (atoms_part, h_part) = match item.split_once('H') {
            Some((a, h)) => (a, Some(h)),
            None => (item, None),
        };
        if let Some((a, b)) = atoms_part.split_once('-') {
            let a = parse_atom_number(a, n_atoms)?;
            let b = parse_atom_number(b, n_atoms)?;
            if b < a {
                return Err(MarsiError::Parse(format!("descending range '{atoms_part}'")));
            }
            pending.extend(a..=b);
        } else if !atoms_part.is_empty() {
            pending.push(parse_atom_number(atoms_part, n_atoms)?);
        }
        if let Some(h) = h_part {
            let count = parse_h_count(h)?;
            for atom in pending.drain(..) {
                counts[atom] = count;
            }
        }
    }
    if !pending.is_empty() {
        return Err(MarsiError::Parse(format!("atoms without hydrogen count in /h{text}")));
    }
    Ok(counts)
}

/// `/p` adds or removes protons on heteroatoms.
fn apply_protons(mol: &mut Molecule, protons: i32) {
    for _ in 0..protons.unsigned_abs() {
        let site = if protons > 0 {
            [7u8, 8, 16, 15]
                .iter()
                .find_map(|&z| mol.atoms.iter().position(|a| a.atomic_number == z))
        } else {
            [8u8, 16, 7]
                .iter()
                .find_map(|&z| {
                    mol.atoms
                        .iter()
                        .position(|a| a.atomic_number == z && a.implicit_hydrogens > 0)
                })
        };
        match site {
            Some(i) if protons > 0 => {
                let atom = &mut mol.atoms[i];
                atom.implicit_hydrogens = atom.implicit_hydrogens.saturating_add(1);
            }
            Some(i) => mol.atoms[i].implicit_hydrogens -= 1,
            None => {
                tracing::warn!(protons, "no site for InChI protonation layer");
                return;
            }
        }
    }
}

fn append(target: &mut Molecule, part: Molecule) {
    let offset = target.atom_count();
    for atom in part.atoms {
        target.add_atom(atom);
    }
    for bond in part.bonds {
        target.add_bond(Bond {
            atom1: bond.atom1 + offset,
            atom2: bond.atom2 + offset,
            ..bond
        });
    }
}

/// Place `charge` on atoms and raise bond orders so every atom reaches an
/// allowed valence.
fn resolve_valences(mol: &mut Molecule, charge: i32) {
    let n = mol.atom_count();
    let used0: Vec<usize> = (0..n)
        .map(|i| mol.degree(i) + mol.atoms[i].implicit_hydrogens as usize)
        .collect();

    // Over-connected atoms can only be ions.
    let mut budget = charge;
    for i in 0..n {
        let z = mol.atoms[i].atomic_number;
        let cation = matches!((z, used0[i]), (7 | 15, 4) | (8 | 16, 3));
        if cation && !allowed_valences(z, 0).contains(&(used0[i] as u8)) {
            mol.atoms[i].formal_charge = 1;
            budget -= 1;
        } else if z == 5 && used0[i] == 4 {
            mol.atoms[i].formal_charge = -1;
            budget += 1;
        }
    }

    let target = |mol: &Molecule, i: usize, used: usize| -> usize {
        allowed_valences(mol.atoms[i].atomic_number, mol.atoms[i].formal_charge)
            .iter()
            .map(|&v| v as usize)
            .find(|&v| v >= used)
            .unwrap_or(used)
    };
    let mut free: Vec<u8> = (0..n)
        .map(|i| (target(mol, i, used0[i]) - used0[i]) as u8)
        .collect();

    let mut search = Kekulizer::new(mol, free.clone());
    search.run();
    let orders = search.best_orders;
    for (bi, &order) in orders.iter().enumerate() {
        mol.bonds[bi].order = match order {
            1 => BondOrder::Single,
            2 => BondOrder::Double,
            _ => BondOrder::Triple,
        };
    }
    for (bi, bond) in mol.bonds.iter().enumerate() {
        let extra = orders[bi].saturating_sub(1);
        free[bond.atom1] = free[bond.atom1].saturating_sub(extra);
        free[bond.atom2] = free[bond.atom2].saturating_sub(extra);
    }

    // Terminal atoms left over may pull a hypervalent neighbor up (S=O, P=O, N=O).
    for i in 0..n {
        while free[i] > 0 {
            let raised = mol.adjacency[i].clone().into_iter().find(|&(nb, bi)| {
                let max = allowed_valences(mol.atoms[nb].atomic_number, mol.atoms[nb].formal_charge)
                    .iter()
                    .copied()
                    .max()
                    .unwrap_or(0) as usize;
                free[nb] == 0
                    && mol.bonds[bi].order == BondOrder::Single
                    && mol.bond_order_sum(nb) + mol.atoms[nb].implicit_hydrogens as usize + 1 <= max
            });
            let Some((_, bi)) = raised else { break };
            mol.bonds[bi].order = BondOrder::Double;
            free[i] -= 1;
        }
    }

    // Remaining unsaturated atoms absorb negative charge.
    for i in 0..n {
        if budget >= 0 {
            break;
        }
        if free[i] > 0 && matches!(mol.atoms[i].atomic_number, 6 | 7 | 8 | 16) {
            mol.atoms[i].formal_charge -= 1;
            free[i] -= 1;
            budget += 1;
        }
    }

    // Metal counter-ions take whatever positive charge is left.
    for atom in mol.atoms.iter_mut() {
        if budget <= 0 {
            break;
        }
        if atom.formal_charge == 0 && allowed_valences(atom.atomic_number, 0).is_empty() {
            let share = budget.min(3);
            atom.formal_charge = share as i8;
            budget -= share;
        }
    }

    if budget != 0 {
        tracing::warn!(budget, "InChI charge could not be placed on a matching atom");
        let preferred: &[u8] = if budget > 0 { &[7, 15, 8, 16] } else { &[8, 16, 7] };
        let site = preferred
            .iter()
            .find_map(|&z| mol.atoms.iter().position(|a| a.atomic_number == z))
            .unwrap_or(0);
        if let Some(atom) = mol.atoms.get_mut(site) {
            atom.formal_charge = atom.formal_charge.saturating_add(budget.clamp(-8, 8) as i8);
        }
    }

    let unresolved = free.iter().filter(|&&f| f > 0).count();
    if unresolved > 0 {
        tracing::warn!(unresolved, "InChI atoms left with unsatisfied valence");
    }
}

/// Backtracking search that raises bond orders between atoms with free
/// valence, keeping the assignment that leaves the least valence unsatisfied.
struct Kekulizer<'a> {
    mol: &'a Molecule,
    free: Vec<u8>,
    orders: Vec<u8>,
    skipped: Vec<bool>,
    steps: usize,
    best_left: usize,
    best_orders: Vec<u8>,
}

impl<'a> Kekulizer<'a> {
    fn new(mol: &'a Molecule, free: Vec<u8>) -> Self {
        let orders = vec![1u8; mol.bond_count()];
        Kekulizer {
            mol,
            skipped: vec![false; free.len()],
            best_left: usize::MAX,
            best_orders: orders.clone(),
            orders,
            free,
            steps: 0,
        }
    }

    fn run(&mut self) {
        self.search();
        if self.steps > KEKULIZE_STEP_CAP {
            tracing::warn!(steps = self.steps, "bond order search hit its step cap");
        }
    }

    fn open_bonds(&self, i: usize) -> Vec<(usize, usize)> {
        self.mol.adjacency[i]
            .iter()
            .copied()
            .filter(|&(j, bi)| self.free[j] > 0 && !self.skipped[j] && self.orders[bi] < 3)
            .collect()
    }

    /// Returns true once a perfect assignment is found or the budget is spent.
    fn search(&mut self) -> bool {
        self.steps += 1;
        let left: usize = self.free.iter().map(|&f| f as usize).sum();
        let candidate = (0..self.free.len())
            .filter(|&i| self.free[i] > 0 && !self.skipped[i])
            .min_by_key(|&i| self.open_bonds(i).len());

        let Some(i) = candidate else {
            if left < self.best_left {
                self.best_left = left;
                self.best_orders = self.orders.clone();
            }
            return left == 0;
        };
        if self.steps > KEKULIZE_STEP_CAP {
            if left < self.best_left {
                self.best_left = left;
                self.best_orders = self.orders.clone();
            }
            return true;
        }

        for (j, bi) in self.open_bonds(i) {
            self.orders[bi] += 1;
            self.free[i] -= 1;
            self.free[j] -= 1;
            let done = self.search();
            self.orders[bi] -= 1;
            self.free[i] += 1;
            self.free[j] += 1;
            if done {
                return true;
            }
        }

        self.skipped[i] = true;
        let done = self.search();
        self.skipped[i] = false;
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    fn inchi_of(smiles: &str) -> String {
        to_inchi(&parse_smiles(smiles).unwrap()).unwrap()
    }

    #[test]
    fn ethanol() {
        assert_eq!(inchi_of("CCO"), "InChI=1S/C2H6O/c1-2-3/h3H,2H2,1H3");
        assert_eq!(inchi_of("OCC"), inchi_of("CCO"));
    }

    #[test]
    fn methane_and_water() {
        assert_eq!(inchi_of("C"), "InChI=1S/CH4/h1H4");
        assert_eq!(inchi_of("O"), "InChI=1S/H2O/h1H2");
    }

    #[test]
    fn acetic_acid_branches() {
        assert_eq!(inchi_of("CC(=O)O"), "InChI=1S/C2H4O2/c1-2(3)4/h4H,1H3");
    }

    #[test]
    fn benzene_ring_closure() {
        let inchi = inchi_of("c1ccccc1");
        assert!(inchi.starts_with("InChI=1S/C6H6/c1-2-"), "{inchi}");
        assert!(inchi.ends_with("/h1-6H"), "{inchi}");
        assert_eq!(inchi, inchi_of("C1=CC=CC=C1"));
    }

    #[test]
    fn explicit_hydrogens_do_not_change_inchi() {
        let mut mol = parse_smiles("CC(=O)Oc1ccccc1C(=O)O").unwrap();
        let before = to_inchi(&mol).unwrap();
        mol.add_hydrogens();
        assert_eq!(to_inchi(&mol).unwrap(), before);
    }

    #[test]
    fn charges_and_components() {
        assert_eq!(inchi_of("[NH4+]"), "InChI=1S/H4N/h1H4/q+1");
        let salt = inchi_of("CC(=O)[O-].[Na+]");
        assert!(salt.starts_with("InChI=1S/C2H3O2.Na/c1-2(3)4;/h1H3;/q-1;+1"), "{salt}");
    }

    #[test]
    fn empty_and_dummy_rejected() {
        let empty = Molecule::new(String::new(), vec![], vec![]);
        assert!(matches!(to_inchi(&empty), Err(MarsiError::Conversion(_))));
        let dummy = parse_smiles("*C").unwrap();
        assert!(matches!(to_inchi(&dummy), Err(MarsiError::Conversion(_))));
    }

    #[test]
    fn key_shape() {
        let key = inchi_key_from_inchi("InChI=1S/C2H6O/c1-2-3/h3H,2H2,1H3").unwrap();
        assert_eq!(key.len(), 27);
        let (a, rest) = key.split_once('-').unwrap();
        assert_eq!(a.len(), 14);
        assert!(a.bytes().all(|b| b.is_ascii_uppercase()));
        assert!(rest.ends_with("SA-N"));
        assert_eq!(&rest[8..], "SA-N");
    }

    #[test]
    fn key_is_deterministic_and_discriminating() {
        let a = inchi_key_from_inchi(&inchi_of("CCO")).unwrap();
        let b = inchi_key_from_inchi(&inchi_of("OCC")).unwrap();
        let c = inchi_key_from_inchi(&inchi_of("COC")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a[..14], c[..14]);
    }

    #[test]
    fn key_protonation_flag() {
        let key = inchi_key_from_inchi("InChI=1S/H3N/h1H3/p+1").unwrap();
        assert!(key.ends_with("-O"));
        assert!(inchi_key_from_inchi("not an inchi").is_err());
    }

    #[test]
    fn parse_ethanol() {
        let mol = parse_inchi("InChI=1S/C2H6O/c1-2-3/h3H,2H2,1H3").unwrap();
        assert_eq!(mol.atom_count(), 3);
        assert_eq!(mol.bond_count(), 2);
        assert_eq!(mol.total_hydrogen_count(), 6);
        assert_eq!(mol.atoms[2].atomic_number, 8);
    }

    #[test]
    fn parse_rebuilds_double_bonds() {
        let mol = parse_inchi("InChI=1S/C2H4O2/c1-2(3)4/h4H,1H3").unwrap();
        let doubles = mol.bonds.iter().filter(|b| b.order == BondOrder::Double).count();
        assert_eq!(doubles, 1);
        let mol = parse_inchi(&inchi_of("c1ccccc1")).unwrap();
        assert!(mol.atoms.iter().all(|a| a.is_aromatic));
    }

    #[test]
    fn parse_mobile_hydrogen_and_protonation() {
        let acid = parse_inchi("InChI=1S/C2H4O2/c1-2(3)4/h1H3,(H,3,4)").unwrap();
        assert_eq!(acid.total_hydrogen_count(), 4);
        let ammonium = parse_inchi("InChI=1S/H3N/h1H3/p+1").unwrap();
        assert_eq!(ammonium.atoms[0].implicit_hydrogens, 4);
        assert_eq!(ammonium.atoms[0].formal_charge, 1);
    }

    #[test]
    fn oversized_charge_and_proton_layers_are_rejected() {
        crate::init_test_tracing();
        for bad in [
            "InChI=1S/CH5N/c1-2/h2H2,1H3/p+300",
            "InChI=1S/CH5N/c1-2/h2H2,1H3/p-2000000000",
            "InChI=1S/CH5N/c1-2/h2H2,1H3/q+2147483647/p+1",
            "InChI=1S/CH5N/c1-2/h2H2,1H3/q-8",
        ] {
            assert!(matches!(parse_inchi(bad), Err(MarsiError::Parse(_))), "{bad}");
        }
        let methylammonium = parse_inchi("InChI=1S/CH5N/c1-2/h2H2,1H3/p+1").unwrap();
        let n = methylammonium.atoms.iter().position(|a| a.atomic_number == 7).unwrap();
        assert_eq!(methylammonium.atoms[n].implicit_hydrogens, 3);
        assert_eq!(methylammonium.atoms[n].formal_charge, 1);
    }

    #[test]
    fn parse_sulfate_is_hypervalent() {
        let mol = parse_inchi(&inchi_of("OS(=O)(=O)O")).unwrap();
        let s = mol.atoms.iter().position(|a| a.atomic_number == 16).unwrap();
        assert_eq!(mol.bond_order_sum(s), 6);
        assert!(mol.atoms.iter().all(|a| a.formal_charge == 0));
    }

    #[test]
    fn parse_carboxylate_gets_negative_charge() {
        let mol = parse_inchi(&inchi_of("CC(=O)[O-]")).unwrap();
        let total: i32 = mol.atoms.iter().map(|a| a.formal_charge as i32).sum();
        assert_eq!(total, -1);
        let charged = mol.atoms.iter().position(|a| a.formal_charge == -1).unwrap();
        assert_eq!(mol.atoms[charged].atomic_number, 8);
    }

    #[test]
    fn parse_multiplied_components() {
        let mol = parse_inchi("InChI=1S/2H2O/h2*1H2").unwrap();
        assert_eq!(mol.atom_count(), 2);
        assert!(mol.atoms.iter().all(|a| a.implicit_hydrogens == 2));
    }

    #[test]
    fn round_trip_is_stable() {
        for smi in [
            "CCO",
            "CC(=O)Oc1ccccc1C(=O)O",
            "[NH3+]CC(=O)[O-]",
            "OC(=O)CC(O)(CC(=O)O)C(=O)O",
            "c1ccc2ccccc2c1",
            "Cn1cnc2c1c(=O)n(C)c(=O)n2C",
            "CC(=O)[O-].[Na+]",
            "OP(=O)(O)OCC1OC(O)C(O)C1O",
        ] {
            let first = inchi_of(smi);
            let again = to_inchi(&parse_inchi(&first).unwrap()).unwrap();
            assert_eq!(first, again, "{smi}");
        }
    }

    #[test]
    fn malformed_inchi_is_a_parse_error() {
        for bad in [
            "",
            "InChI=",
            "InChI=1S/",
            "InChI=1S/C2H6O/c1-2-9",
            "InChI=1S/C2H6O/c1-2(3",
            "InChI=1S/Xx2/h1H",
            "InChI=1S/C2H6O/c1-2-3/h3Hx",
            "SMILES=CCO",
        ] {
            assert!(matches!(parse_inchi(bad), Err(MarsiError::Parse(_))), "{bad}");
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn parse_inchi_does_not_panic(s in "InChI=1S/[A-Za-z0-9().,;*/+-]{0,60}") {
            let _ = parse_inchi(&s);
        }

        #[test]
        fn alkane_round_trip(n in 1usize..12) {
            let smi = "C".repeat(n);
            let mol = crate::smiles::parse_smiles(&smi).unwrap();
            let inchi = to_inchi(&mol).unwrap();
            let back = to_inchi(&parse_inchi(&inchi).unwrap()).unwrap();
            prop_assert_eq!(inchi, back);
        }
    }
}

//! SDF and MOL V2000/V3000 parser.
//!
//! Coordinates, `M  CHG` / `M  ISO` properties and SDF data items
//! (`> <FIELD>` followed by value lines) are kept. Data items land in
//! [`Molecule::metadata`] so identifiers such as `DRUGBANK_ID` stay attached
//! to the structure they describe.

use marsi_core::{MarsiError, Result};

use crate::element::{element_by_symbol, implied_hydrogens};
use crate::molecule::{Bond, BondOrder, MolAtom, Molecule};
use crate::ring;

/// Parse a single MOL block (V2000 or V3000, auto-detected), including any
/// trailing SDF data items. Text after the first `$$$$` is ignored.
pub fn parse_mol_block(input: &str) -> Result<Molecule> {
    let record = input.split("$$$$").next().unwrap_or(input);
    if record.trim().is_empty() {
        return Err(MarsiError::Parse("empty MOL block".into()));
    }
    parse_record(strip_leading_newline(record))
}

/// Parse a MOL V2000 block into a `Molecule`.
pub fn parse_mol_v2000(input: &str) -> Result<Molecule> {
    let lines: Vec<&str> = input.lines().collect();
    let [title, _, _, counts, ..] = lines.as_slice() else {
        return Err(MarsiError::Parse("MOL block has no counts line".into()));
    };
    let n_atoms: usize = column(counts, 0..3, "atom count")?;
    let n_bonds: usize = column(counts, 3..6, "bond count")?;
    let body = &lines[4..];
    if body.len() < n_atoms + n_bonds {
        return Err(MarsiError::Parse(format!(
            "MOL block declares {n_atoms} atoms and {n_bonds} bonds but has {} lines after the header",
            body.len()
        )));
    }
    let (atom_lines, rest) = body.split_at(n_atoms);
    let (bond_lines, rest) = rest.split_at(n_bonds);

    let mut atoms = atom_lines.iter().map(|l| v2000_atom(l)).collect::<Result<Vec<_>>>()?;
    let bonds = bond_lines
        .iter()
        .map(|l| v2000_bond(l, n_atoms))
        .collect::<Result<Vec<_>>>()?;

    let mut consumed = rest.len();
    for (i, line) in rest.iter().enumerate() {
        if line.starts_with("M  END") {
            consumed = i + 1;
            break;
        }
        if let Some(entries) = line.strip_prefix("M  CHG") {
            for (atom, value) in property_entries(entries, atoms.len())? {
                atoms[atom].formal_charge = i8::try_from(value).unwrap_or(0);
            }
        } else if let Some(entries) = line.strip_prefix("M  ISO") {
            for (atom, value) in property_entries(entries, atoms.len())? {
                atoms[atom].isotope = u16::try_from(value).ok();
            }
        }
    }

    let mut mol = finish(title.trim().to_string(), atoms, bonds);
    read_data_items(&rest[consumed..], &mut mol);
    Ok(mol)
}

/// Parse a MOL V3000 block into a `Molecule`.
///
/// The connection table sits between `M  V30 BEGIN CTAB` and
/// `M  V30 END CTAB`, one whitespace-separated record per `M  V30` line.
/// Atom and bond indices are 1-based.
pub fn parse_mol_v3000(input: &str) -> Result<Molecule> {
    let lines: Vec<&str> = input.lines().collect();
    if lines.len() < 4 {
        return Err(MarsiError::Parse("V3000 block has no header".into()));
    }

    #[derive(PartialEq)]
    enum Section {
        Outside,
        Atoms,
        Bonds,
    }
    let mut section = Section::Outside;
    let mut declared: Option<(usize, usize)> = None;
    let mut saw_atom_block = false;
    let mut atoms = Vec::new();
    let mut raw_bonds: Vec<(usize, usize, u8)> = Vec::new();
    let mut consumed = lines.len();

    for (i, line) in lines.iter().enumerate().skip(3) {
        if line.starts_with("M  END") {
            consumed = i + 1;
            break;
        }
        let Some(record) = line.trim().strip_prefix("M  V30") else {
            continue;
        };
        let fields: Vec<&str> = record.split_whitespace().collect();
        match (fields.as_slice(), &section) {
            (["COUNTS", a, b, ..], _) => {
                declared = Some((number(a, "V3000 atom count")?, number(b, "V3000 bond count")?));
            }
            (["BEGIN", "ATOM"], _) => {
                section = Section::Atoms;
                saw_atom_block = true;
            }
            (["BEGIN", "BOND"], _) => section = Section::Bonds,
            (["END", "ATOM" | "BOND"], _) => section = Section::Outside,
            (_, Section::Atoms) => atoms.push(v3000_atom(&fields, line)?),
            (_, Section::Bonds) => raw_bonds.push(v3000_bond(&fields, line)?),
            _ => {}
        }
    }

    let (n_atoms, n_bonds) = declared.ok_or_else(|| MarsiError::Parse("V3000: missing COUNTS line".into()))?;
    if !saw_atom_block || section != Section::Outside {
        return Err(MarsiError::Parse("V3000: atom or bond block not closed".into()));
    }
    if atoms.len() != n_atoms || raw_bonds.len() != n_bonds {
        return Err(MarsiError::Parse(format!(
            "V3000: COUNTS declares {n_atoms} atoms and {n_bonds} bonds, found {} and {}",
            atoms.len(),
            raw_bonds.len()
        )));
    }
    let bonds = raw_bonds
        .into_iter()
        .map(|(a, b, kind)| Ok(Bond::new(atom_index(a, n_atoms)?, atom_index(b, n_atoms)?, bond_order(kind))))
        .collect::<Result<Vec<_>>>()?;

    let mut mol = finish(lines[0].trim().to_string(), atoms, bonds);
    read_data_items(&lines[consumed..], &mut mol);
    Ok(mol)
}

/// Parse a multi-record SDF string, returning one result per record.
///
/// Auto-detects V2000 vs V3000 format for each record.
pub fn parse_sdf(input: &str) -> Vec<Result<Molecule>> {
    input
        .split("$$$$")
        .filter(|block| !block.trim().is_empty())
        .map(|block| parse_record(strip_leading_newline(block)))
        .collect()
}

fn parse_record(block: &str) -> Result<Molecule> {
    if is_v3000(block) {
        parse_mol_v3000(block)
    } else {
        parse_mol_v2000(block)
    }
}

/// Drop the line break that follows a `$$$$` delimiter without eating an
/// empty title line.
fn strip_leading_newline(block: &str) -> &str {
    block
        .strip_prefix("\r\n")
        .or_else(|| block.strip_prefix('\n'))
        .unwrap_or(block)
}

/// Detect whether a MOL block uses V3000 format.
fn is_v3000(block: &str) -> bool {
    block.lines().take(5).any(|line| line.contains("V3000"))
        || block.contains("M  V30 BEGIN CTAB")
}

/// Build the molecule, derive implicit hydrogens, perceive aromaticity and
/// decide whether the coordinates are 3-D.
fn finish(name: String, mut atoms: Vec<MolAtom>, bonds: Vec<Bond>) -> Molecule {
    for bond in &bonds {
        if bond.is_aromatic {
            atoms[bond.atom1].is_aromatic = true;
            atoms[bond.atom2].is_aromatic = true;
        }
    }
    let mut mol = Molecule::new(name, atoms, bonds);
    for i in 0..mol.atom_count() {
        let used: usize = mol.adjacency[i]
            .iter()
            .map(|&(_, bi)| match mol.bonds[bi].order {
                BondOrder::Aromatic => 1,
                other => other.as_f64() as usize,
            })
            .sum();
        let atom = &mol.atoms[i];
        let h = implied_hydrogens(atom.atomic_number, atom.formal_charge, used, atom.is_aromatic);
        mol.atoms[i].implicit_hydrogens = h;
    }
    ring::perceive_aromaticity(&mut mol);
    mol.has_3d = mol.atoms.iter().any(|a| a.position[2].abs() > 1e-4);
    mol
}

/// SDF data items: a header line `>  <NAME>` then value lines up to a blank line.
fn read_data_items(lines: &[&str], mol: &mut Molecule) {
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        i += 1;
        let Some(field) = data_header_field(line) else {
            continue;
        };
        let mut value: Vec<&str> = Vec::new();
        while i < lines.len() && !lines[i].trim().is_empty() {
            value.push(lines[i]);
            i += 1;
        }
        mol.metadata.insert(field.to_string(), value.join("\n"));
    }
}

fn data_header_field(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('>')?;
    let open = rest.find('<')?;
    let close = rest[open + 1..].find('>')? + open + 1;
    Some(&rest[open + 1..close])
}

fn resolve_symbol(symbol: &str) -> Result<u8> {
    let symbol = match symbol {
        "R#" | "A" | "Q" | "L" => "*",
        other => other,
    };
    element_by_symbol(symbol)
        .map(|e| e.atomic_number)
        .ok_or_else(|| MarsiError::Parse(format!("unknown element '{symbol}' in MOL atom block")))
}

fn number<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
    text.trim()
        .parse()
        .map_err(|_| MarsiError::Parse(format!("invalid {what} '{}'", text.trim())))
}

/// A fixed-width field of an ASCII line.
fn column<T: std::str::FromStr>(line: &str, range: std::ops::Range<usize>, what: &str) -> Result<T> {
    let text = line
        .get(range)
        .ok_or_else(|| MarsiError::Parse(format!("line too short for {what}: '{line}'")))?;
    number(text, what)
}

/// `xxxxx.xxxxyyyyy.yyyyzzzzz.zzzz aaaddccc...`: coordinates in three
/// 10-wide columns, the symbol at 31..34 and the legacy charge code at 36..39.
fn v2000_atom(line: &str) -> Result<MolAtom> {
    let mut atom = MolAtom::new(resolve_symbol(line.get(31..34).map(str::trim).unwrap_or_default())?);
    atom.position = [
        column(line, 0..10, "x coordinate")?,
        column(line, 10..20, "y coordinate")?,
        column(line, 20..30, "z coordinate")?,
    ];
    // 1..3 are +3..+1, 4 is a doublet radical, 5..7 are -1..-3.
    atom.formal_charge = match line.get(36..39).and_then(|c| c.trim().parse::<i8>().ok()) {
        Some(code @ (1..=3 | 5..=7)) => 4 - code,
        _ => 0,
    };
    Ok(atom)
}

fn bond_order(kind: u8) -> BondOrder {
    match kind {
        2 => BondOrder::Double,
        3 => BondOrder::Triple,
        4 => BondOrder::Aromatic,
        _ => BondOrder::Single,
    }
}

/// 1-based atom reference to an index.
fn atom_index(raw: usize, n_atoms: usize) -> Result<usize> {
    if (1..=n_atoms).contains(&raw) {
        Ok(raw - 1)
    } else {
        Err(MarsiError::Parse(format!("bond references atom {raw}, block has {n_atoms}")))
    }
}

/// `111222ttt...`: two atom references and the bond type.
fn v2000_bond(line: &str, n_atoms: usize) -> Result<Bond> {
    let a: usize = column(line, 0..3, "bond atom")?;
    let b: usize = column(line, 3..6, "bond atom")?;
    let kind: u8 = column(line, 6..9, "bond type")?;
    Ok(Bond::new(atom_index(a, n_atoms)?, atom_index(b, n_atoms)?, bond_order(kind)))
}

/// Entries of an `M  CHG`/`M  ISO` line after the tag: a count followed by
/// `atom value` pairs. Atoms outside the block are skipped.
fn property_entries(entries: &str, n_atoms: usize) -> Result<Vec<(usize, i32)>> {
    let mut fields = entries.split_whitespace();
    let Some(count) = fields.next() else {
        return Ok(Vec::new());
    };
    let count: usize = number(count, "property entry count")?;
    let values: Vec<&str> = fields.collect();
    let mut out = Vec::with_capacity(count);
    for pair in values.chunks_exact(2).take(count) {
        let atom: usize = number(pair[0], "property atom")?;
        let value: i32 = number(pair[1], "property value")?;
        if (1..=n_atoms).contains(&atom) {
            out.push((atom - 1, value));
        }
    }
    Ok(out)
}

/// `idx symbol x y z aamap [CHG=..] [MASS=..]`
fn v3000_atom(fields: &[&str], line: &str) -> Result<MolAtom> {
    let [_, symbol, x, y, z, _, options @ ..] = fields else {
        return Err(MarsiError::Parse(format!("V3000: short atom record '{line}'")));
    };
    let mut atom = MolAtom::new(resolve_symbol(symbol)?);
    atom.position = [number(x, "x coordinate")?, number(y, "y coordinate")?, number(z, "z coordinate")?];
    for option in options {
        match option.split_once('=') {
            Some(("CHG", v)) => atom.formal_charge = number(v, "V3000 CHG")?,
            Some(("MASS", v)) => atom.isotope = v.parse().ok(),
            _ => {}
        }
    }
    Ok(atom)
}

/// `idx type atom1 atom2 [options]`, returned with 1-based atom references.
fn v3000_bond(fields: &[&str], line: &str) -> Result<(usize, usize, u8)> {
    let [_, kind, a, b, ..] = fields else {
        return Err(MarsiError::Parse(format!("V3000: short bond record '{line}'")));
    };
    Ok((number(a, "bond atom")?, number(b, "bond atom")?, number(kind, "bond type")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use marsi_core::Annotated;

    const METHANE_V2000: &str = "\
Methane
     marsi          2D

  1  0  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
M  END";

    const METHANE_V3000: &str = "\
Methane
     marsi          2D

  0  0  0  0  0  0  0  0  0  0  0 V3000
M  V30 BEGIN CTAB
M  V30 COUNTS 1 0 0 0 0
M  V30 BEGIN ATOM
M  V30 1 C 0.0000 0.0000 0.0000 0
M  V30 END ATOM
M  V30 END CTAB
M  END";

    const ETHANOL_RECORD: &str = "\
ethanol
     marsi          3D

  3  2  0  0  0  0  0  0  0  0999 V2000
   -0.8883    0.1670    0.1026 C   0  0  0  0  0  0  0  0  0  0  0  0
    0.5162   -0.3542   -0.1157 C   0  0  0  0  0  0  0  0  0  0  0  0
    1.2850    0.5680    0.5930 O   0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0
  2  3  1  0
M  END
> <DRUGBANK_ID>
DB00898

> <PUBCHEM_COMPOUND_CID>
702

>  <ChEBI ID>
CHEBI:16236

";

    #[test]
    fn flat_methane_gets_four_hydrogens() {
        for block in [METHANE_V2000, METHANE_V3000] {
            let mol = parse_mol_block(block).unwrap();
            assert_eq!(mol.name(), "Methane");
            assert_eq!((mol.atom_count(), mol.bond_count()), (1, 0));
            assert_eq!(mol.atoms[0].atomic_number, 6);
            assert_eq!(mol.atoms[0].implicit_hydrogens, 4);
            assert!(!mol.has_3d);
        }
    }

    #[test]
    fn record_keeps_coordinates_and_fields() {
        let mol = parse_mol_block(ETHANOL_RECORD).unwrap();
        assert!(mol.has_3d);
        assert_eq!(mol.atoms[2].position, [1.285, 0.568, 0.593]);
        assert_eq!(mol.atoms[2].implicit_hydrogens, 1);
        assert_eq!(mol.field("DRUGBANK_ID"), Some("DB00898"));
        assert_eq!(mol.field("PUBCHEM_COMPOUND_CID"), Some("702"));
        assert_eq!(mol.field("ChEBI ID"), Some("CHEBI:16236"));
    }

    #[test]
    fn charge_and_isotope_properties() {
        let block = "\
nitrosyl
     marsi          2D

  2  1  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 N   0  0  0  0  0  0  0  0  0  0  0  0
    1.0000    0.0000    0.0000 O   0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0
M  CHG  2   1   1   2  -1
M  ISO  1   1  15
M  END";
        let mol = parse_mol_v2000(block).unwrap();
        assert_eq!(mol.atoms[0].formal_charge, 1);
        assert_eq!(mol.atoms[0].isotope, Some(15));
        assert_eq!(mol.atoms[0].implicit_hydrogens, 3);
        assert_eq!(mol.atoms[1].formal_charge, -1);
        assert_eq!(mol.atoms[1].implicit_hydrogens, 0);
    }

    #[test]
    fn legacy_charge_column() {
        let cation = METHANE_V2000.replace(" C   0  0  0", " N   0  3  0");
        assert_eq!(parse_mol_v2000(&cation).unwrap().atoms[0].formal_charge, 1);
        let anion = METHANE_V2000.replace(" C   0  0  0", " O   0  5  0");
        assert_eq!(parse_mol_v2000(&anion).unwrap().atoms[0].formal_charge, -1);
    }

    #[test]
    fn sdf_splits_records() {
        let sdf = format!("{METHANE_V2000}\n$$$$\n{ETHANOL_RECORD}$$$$\n{METHANE_V3000}\n$$$$\n");
        let results = parse_sdf(&sdf);
        assert_eq!(results.len(), 3);
        let names: Vec<String> = results.iter().map(|r| r.as_ref().unwrap().name.clone()).collect();
        assert_eq!(names, ["Methane", "ethanol", "Methane"]);
        assert_eq!(results[1].as_ref().unwrap().field("DRUGBANK_ID"), Some("DB00898"));
    }

    #[test]
    fn untitled_record_after_delimiter() {
        let untitled = METHANE_V2000.replacen("Methane", "", 1);
        let results = parse_sdf(&format!("{METHANE_V2000}\n$$$$\n{untitled}\n$$$$\n"));
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].as_ref().unwrap().name, "");
    }

    #[test]
    fn malformed_v2000() {
        assert!(parse_mol_v2000("too\nshort").is_err());
        assert!(parse_mol_v2000("name\nprog\ncomment\nabc  0").is_err());
        assert!(parse_mol_block("   \n").is_err());
        let truncated = METHANE_V2000.replace("  1  0  0  0", "  2  0  0  0");
        assert!(parse_mol_v2000(&truncated).is_err());
        let dangling = METHANE_V2000
            .replace("M  END", "  1  2  1  0\nM  END")
            .replace("  1  0  0", "  1  1  0");
        assert!(matches!(parse_mol_v2000(&dangling), Err(MarsiError::Parse(_))));
    }

    #[test]
    fn query_symbols_become_dummy_atoms() {
        for symbol in [" R#  0", " A   0", " *   0"] {
            let block = METHANE_V2000.replace(" C   0", symbol);
            assert_eq!(parse_mol_v2000(&block).unwrap().atoms[0].atomic_number, 0, "{symbol}");
        }
    }

    #[test]
    fn v3000_water_with_bonds_and_fields() {
        let block = "\
Water
     marsi          3D

  0  0  0  0  0  0  0  0  0  0  0 V3000
M  V30 BEGIN CTAB
M  V30 COUNTS 3 2 0 0 0
M  V30 BEGIN ATOM
M  V30 1 O 0.0000 0.0000 0.1000 0 MASS=18
M  V30 2 H 0.7572 0.5866 0.0000 0
M  V30 3 H -0.7572 0.5866 0.0000 0 CHG=0
M  V30 END ATOM
M  V30 BEGIN BOND
M  V30 1 1 1 2
M  V30 2 1 1 3
M  V30 END BOND
M  V30 END CTAB
M  END
> <ChEBI ID>
CHEBI:15377
";
        let mol = parse_mol_v3000(block).unwrap();
        assert_eq!((mol.atom_count(), mol.bond_count()), (3, 2));
        assert_eq!((mol.bonds[1].atom1, mol.bonds[1].atom2), (0, 2));
        assert_eq!(mol.atoms[0].isotope, Some(18));
        assert_eq!(mol.atoms[0].implicit_hydrogens, 0);
        assert!(mol.has_3d);
        assert_eq!(mol.field("ChEBI ID"), Some("CHEBI:15377"));
    }

    #[test]
    fn malformed_v3000() {
        let no_atoms = METHANE_V3000
            .replace("M  V30 BEGIN ATOM\n", "")
            .replace("M  V30 1 C 0.0000 0.0000 0.0000 0\n", "")
            .replace("M  V30 END ATOM\n", "");
        assert!(parse_mol_v3000(&no_atoms).is_err());
        assert!(parse_mol_v3000("too\nshort").is_err());
        let miscounted = METHANE_V3000.replace("COUNTS 1 0", "COUNTS 2 0");
        assert!(parse_mol_v3000(&miscounted).is_err());
        let unclosed = METHANE_V3000.replace("M  V30 END ATOM\n", "");
        assert!(parse_mol_v3000(&unclosed).is_err());
    }
}

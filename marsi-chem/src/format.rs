//! Input format dispatch.

use std::fmt;
use std::str::FromStr;

use marsi_core::{MarsiError, Result};

use crate::inchi::parse_inchi;
use crate::molecule::Molecule;
use crate::sdf::parse_mol_block;
use crate::smiles::parse_smiles;

/// Text formats accepted by [`parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InputFormat {
    Smiles,
    Inchi,
    /// MOL block, V2000 or V3000, with optional SDF data items.
    Mol,
}

impl InputFormat {
    pub const ALL: [InputFormat; 3] = [InputFormat::Smiles, InputFormat::Inchi, InputFormat::Mol];

    pub fn name(self) -> &'static str {
        match self {
            InputFormat::Smiles => "smiles",
            InputFormat::Inchi => "inchi",
            InputFormat::Mol => "mol",
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InputFormat {
    type Err = MarsiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smiles" | "smi" => Ok(InputFormat::Smiles),
            "inchi" => Ok(InputFormat::Inchi),
            "mol" | "sdf" => Ok(InputFormat::Mol),
            other => Err(MarsiError::InvalidFormat(format!(
                "unknown input format '{other}', expected one of: smiles, inchi, mol"
            ))),
        }
    }
}

/// Parse `text` in the given format.
///
/// InChI input comes back with explicit hydrogens; the other formats keep
/// hydrogens implicit unless the input spells them out.
///
/// ```
/// use marsi_chem::{parse, InputFormat};
///
/// let mol = parse("InChI=1S/CH4/h1H4", InputFormat::Inchi).unwrap();
/// assert_eq!(mol.atom_count(), 5);
/// ```
pub fn parse(text: &str, format: InputFormat) -> Result<Molecule> {
    match format {
        InputFormat::Smiles => parse_smiles(text.trim()),
        InputFormat::Inchi => {
            let mut mol = parse_inchi(text.trim())?;
            mol.add_hydrogens();
            Ok(mol)
        }
        InputFormat::Mol => parse_mol_block(text),
    }
}

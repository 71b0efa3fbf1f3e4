//! Identifiers: InChI conversions with memoisation, radicals and database
//! cross-reference fields.

use std::sync::OnceLock;

use marsi_core::{MarsiError, MemoCache, Result};

use crate::format::{parse, InputFormat};
use crate::inchi::{inchi_key_from_inchi, to_inchi};
use crate::molecule::Molecule;

/// Entries kept by each process-wide identifier cache.
pub const IDENTIFIER_CACHE_CAPACITY: usize = 256;

/// Record field holding the DrugBank accession.
pub const DRUGBANK_ID_FIELD: &str = "DRUGBANK_ID";
/// Record field holding the PubChem compound id.
pub const PUBCHEM_ID_FIELD: &str = "PUBCHEM_COMPOUND_CID";
/// Record field holding the ChEBI id.
pub const CHEBI_ID_FIELD: &str = "ChEBI ID";

/// Memoised InChI conversions keyed on the exact input string.
///
/// Both tables are strict LRU. Failed conversions are not stored.
#[derive(Debug)]
pub struct IdentifierCache {
    keys: MemoCache<String, String>,
    molecules: MemoCache<String, Molecule>,
}

impl IdentifierCache {
    pub fn new(capacity: usize) -> Self {
        IdentifierCache {
            keys: MemoCache::new(capacity),
            molecules: MemoCache::new(capacity),
        }
    }

    /// The cache behind [`inchi_to_inchi_key`] and [`inchi_to_molecule`].
    pub fn global() -> &'static IdentifierCache {
        static GLOBAL: OnceLock<IdentifierCache> = OnceLock::new();
        GLOBAL.get_or_init(|| IdentifierCache::new(IDENTIFIER_CACHE_CAPACITY))
    }

    /// InChIKey of the molecule an InChI describes.
    pub fn inchi_to_inchi_key(&self, inchi: &str) -> Result<String> {
        self.keys.get_or_try_insert_with(&inchi.to_owned(), || {
            tracing::debug!(inchi, "computing InChIKey");
            to_inchi_key(&self.inchi_to_molecule(inchi)?)
        })
    }

    /// Molecule with explicit hydrogens. Each call returns its own copy.
    pub fn inchi_to_molecule(&self, inchi: &str) -> Result<Molecule> {
        self.molecules
            .get_or_try_insert_with(&inchi.to_owned(), || parse(inchi, InputFormat::Inchi))
    }

    pub fn key_cache(&self) -> &MemoCache<String, String> {
        &self.keys
    }

    pub fn molecule_cache(&self) -> &MemoCache<String, Molecule> {
        &self.molecules
    }
}

/// InChIKey of `mol`.
pub fn to_inchi_key(mol: &Molecule) -> Result<String> {
    inchi_key_from_inchi(&to_inchi(mol)?)
}

/// InChIKey for an InChI string, memoised process-wide.
///
/// ```
/// use marsi_chem::inchi_to_inchi_key;
///
/// let key = inchi_to_inchi_key("InChI=1S/C2H6O/c1-2-3/h3H,2H2,1H3").unwrap();
/// assert_eq!(key.len(), 27);
/// assert!(key.ends_with("SA-N"));
/// ```
pub fn inchi_to_inchi_key(inchi: &str) -> Result<String> {
    IdentifierCache::global().inchi_to_inchi_key(inchi)
}

/// Molecule for an InChI string, hydrogens added, memoised process-wide.
pub fn inchi_to_molecule(inchi: &str) -> Result<Molecule> {
    IdentifierCache::global().inchi_to_molecule(inchi)
}

/// InChI of a MOL block.
pub fn mol_block_to_inchi(mol_block: &str) -> Result<String> {
    to_inchi(&parse(mol_block, InputFormat::Mol)?)
}

/// Whether any atom is a dummy (atomic number 0).
pub fn has_radical(mol: &Molecule) -> bool {
    mol.atoms.iter().any(|a| a.atomic_number == 0)
}

fn required_field<'a>(mol: &'a Molecule, key: &str) -> Result<&'a str> {
    mol.field(key)
        .ok_or_else(|| MarsiError::MissingField(format!("{key} (molecule '{}')", mol.name)))
}

/// DrugBank accession stored on the record.
pub fn drugbank_id(mol: &Molecule) -> Result<&str> {
    required_field(mol, DRUGBANK_ID_FIELD)
}

/// PubChem compound id stored on the record.
pub fn pubchem_id(mol: &Molecule) -> Result<&str> {
    required_field(mol, PUBCHEM_ID_FIELD)
}

/// ChEBI id stored on the record.
pub fn chebi_id(mol: &Molecule) -> Result<&str> {
    required_field(mol, CHEBI_ID_FIELD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdf::parse_mol_block;
    use crate::smiles::parse_smiles;

    const ETHANOL: &str = "InChI=1S/C2H6O/c1-2-3/h3H,2H2,1H3";

    const RECORD: &str = "aspirin-ish
  test

  2  1  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    1.5000    0.0000    0.0000 O   0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0  0  0  0
M  END
> <DRUGBANK_ID>
  DB00945

> <PUBCHEM_COMPOUND_CID>
2244

$$$$
";

    #[test]
    fn inchi_round_trip_gives_stable_key() {
        for smiles in ["CCO", "CC(=O)Oc1ccccc1C(=O)O", "c1ccncc1", "OC(=O)CC(O)(CC(O)=O)C(O)=O"] {
            let mol = parse_smiles(smiles).unwrap();
            let inchi = to_inchi(&mol).unwrap();
            let back = inchi_to_molecule(&inchi).unwrap();
            assert_eq!(to_inchi_key(&back).unwrap(), to_inchi_key(&mol).unwrap(), "{smiles}");
            assert_eq!(inchi_to_inchi_key(&inchi).unwrap(), to_inchi_key(&mol).unwrap(), "{smiles}");
        }
    }

    #[test]
    fn inchi_to_molecule_adds_hydrogens() {
        let mol = inchi_to_molecule(ETHANOL).unwrap();
        assert_eq!(mol.atom_count(), 9);
        assert!(!mol.has_implicit_hydrogens());
    }

    #[test]
    fn cached_molecule_is_an_independent_copy() {
        let cache = IdentifierCache::new(4);
        let mut first = cache.inchi_to_molecule(ETHANOL).unwrap();
        first.atoms.clear();
        let second = cache.inchi_to_molecule(ETHANOL).unwrap();
        assert_eq!(second.atom_count(), 9);
        assert_eq!(cache.molecule_cache().hits(), 1);
    }

    #[test]
    fn repeated_lookups_hit_the_cache() {
        let cache = IdentifierCache::new(8);
        let a = cache.inchi_to_inchi_key(ETHANOL).unwrap();
        let b = cache.inchi_to_inchi_key(ETHANOL).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.key_cache().misses(), 1);
        assert_eq!(cache.key_cache().hits(), 1);
    }

    #[test]
    fn first_entry_evicted_after_257_inputs() {
        crate::init_test_tracing();
        let cache = IdentifierCache::new(IDENTIFIER_CACHE_CAPACITY);
        let inchis: Vec<String> = (1..=257)
            .map(|n| to_inchi(&parse_smiles(&"C".repeat(n)).unwrap()).unwrap())
            .collect();
        let first_key = cache.inchi_to_inchi_key(&inchis[0]).unwrap();
        for inchi in &inchis[1..] {
            cache.inchi_to_inchi_key(inchi).unwrap();
        }
        let keys = cache.key_cache();
        assert_eq!(keys.len(), 256);
        assert!(!keys.contains(&inchis[0]));
        assert!(keys.contains(&inchis[1]));
        assert!(keys.contains(&inchis[256]));

        // The evicted entry is recomputed, which in turn pushes out the oldest survivor.
        let (hits, misses) = (keys.hits(), keys.misses());
        let again = cache.inchi_to_inchi_key(&inchis[0]).unwrap();
        assert_eq!(again, first_key);
        assert_eq!(keys.misses(), misses + 1);
        assert_eq!(keys.hits(), hits);
        assert!(keys.contains(&inchis[0]));
        assert!(!keys.contains(&inchis[1]));
    }

    #[test]
    fn failures_are_errors_not_cached() {
        let cache = IdentifierCache::new(4);
        assert!(matches!(cache.inchi_to_inchi_key("InChI=garbage"), Err(MarsiError::Parse(_))));
        assert!(cache.key_cache().is_empty());
        assert!(cache.molecule_cache().is_empty());
    }

    #[test]
    fn mol_block_inchi() {
        let inchi = mol_block_to_inchi(RECORD).unwrap();
        assert_eq!(inchi, "InChI=1S/CH4O/c1-2/h2H,1H3");
        assert!(mol_block_to_inchi("").is_err());
    }

    #[test]
    fn radicals() {
        assert!(has_radical(&parse_smiles("*CC").unwrap()));
        assert!(!has_radical(&parse_smiles("CC").unwrap()));
    }

    #[test]
    fn record_fields_are_trimmed() {
        let mol = parse_mol_block(RECORD).unwrap();
        assert_eq!(drugbank_id(&mol).unwrap(), "DB00945");
        assert_eq!(pubchem_id(&mol).unwrap(), "2244");
        let err = chebi_id(&mol).unwrap_err();
        assert!(matches!(err, MarsiError::MissingField(ref m) if m.contains("ChEBI ID")));
    }
}

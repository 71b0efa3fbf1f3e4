//! Molecular descriptor engine for antimetabolite screening.
//!
//! Parses SMILES, InChI and MOL records into an owned [`Molecule`], derives
//! identifiers (InChI, InChIKey, SVG depictions, record IDs) and fingerprints,
//! and computes geometric and physicochemical descriptors: convex hull and
//! Monte-Carlo volumes, ESOL solubility, spectrophores and rigid alignments.
//!
//! # Example
//!
//! ```
//! use marsi_chem::{embed_3d, fingerprint, molecule_convex_hull_volume, parse, tanimoto, ForceField, InputFormat};
//!
//! let ethanol = parse("CCO", InputFormat::Smiles).unwrap();
//! assert_eq!(ethanol.atom_count(), 3);
//!
//! let fp = fingerprint(&ethanol, "ecfp4").unwrap();
//! assert!((tanimoto(&fp, &fp) - 1.0).abs() < 1e-12);
//!
//! let mut mol = ethanol.clone();
//! let volume = molecule_convex_hull_volume(&mut mol, ForceField::Mmff94, 100).unwrap();
//! assert!(volume > 0.0);
//!
//! let mut again = ethanol;
//! embed_3d(&mut again, ForceField::Uff, 0).unwrap();
//! assert!(again.has_3d);
//! ```
//!
//! All operations are synchronous. The only shared state is the pair of
//! identifier caches behind [`IdentifierCache::global`].

pub mod align;
pub mod depict;
pub mod descriptor;
pub mod element;
pub mod embed;
pub mod fingerprint;
pub mod forcefield;
pub mod format;
pub mod gasteiger;
pub mod identifiers;
pub mod inchi;
pub mod molecule;
pub mod properties;
pub mod sdf;
pub mod smiles;
pub mod solubility;
pub mod spectrophore;
pub mod volume;

mod canon;
mod linalg;
mod maccs;
mod ring;
mod smarts;

/// Route `tracing` output from this crate to the test harness, at every level.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("marsi_chem=trace,marsi_core=trace"))
        .with_test_writer()
        .try_init();
}

pub use align::{align, align_with_config, AlignConfig, AlignmentResult};
pub use depict::to_svg;
pub use descriptor::{
    convex_hull_descriptor, monte_carlo_descriptor, solubility_descriptor, spectrophore_descriptor,
    DescriptorMethod, DescriptorResult, DescriptorValue,
};
pub use element::{element_by_number, element_by_symbol, vdw_radius, Element};
pub use embed::{embed_3d, embed_with_config, EmbedConfig};
pub use fingerprint::{
    fingerprint, fingerprint_to_bits, tanimoto, Fingerprint, FingerprintFormat, DEFAULT_FINGERPRINT_BITS,
    FINGERPRINT_FORMATS,
};
pub use forcefield::ForceField;
pub use format::{parse, InputFormat};
pub use gasteiger::gasteiger_charges;
pub use identifiers::{
    chebi_id, drugbank_id, has_radical, inchi_to_inchi_key, inchi_to_molecule, mol_block_to_inchi, pubchem_id,
    to_inchi_key, IdentifierCache, IDENTIFIER_CACHE_CAPACITY,
};
pub use inchi::{inchi_key_from_inchi, parse_inchi, to_inchi};
pub use molecule::{Bond, BondOrder, Hybridization, MolAtom, Molecule};
pub use properties::{compute_properties, molecular_formula, molecular_weight, MolecularProperties};
pub use sdf::{parse_mol_block, parse_mol_v2000, parse_mol_v3000, parse_sdf};
pub use smiles::{parse_smiles, parse_smiles_named};
pub use solubility::{esol_log_solubility, solubility, ESOL_LOGP_COEFFICIENT, ESOL_LOGP_COEFFICIENT_PUBLISHED};
pub use spectrophore::{spectrophore, spectrophore_with_config, Normalization, SpectrophoreConfig, SPECTROPHORE_LENGTH};
pub use volume::{
    convex_hull_volume, molecule_convex_hull_volume, molecule_monte_carlo_volume, monte_carlo_volume,
    MonteCarloConfig, VolumeEstimate,
};

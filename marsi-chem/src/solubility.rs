//! Aqueous solubility by ESOL (Delaney, J. Chem. Inf. Comput. Sci. 2004).
//!
//! ```text
//! log Sw = 0.16 - c·logP - 0.0062·MW + 0.066·RB - 0.74·AP
//! ```
//!
//! logP is the Wildman-Crippen estimate, MW includes implicit hydrogens, RB
//! counts rotatable bonds and AP is the fraction of graph atoms that are
//! aromatic.

use marsi_core::{MarsiError, Result};

use crate::molecule::Molecule;
use crate::properties::{aromatic_proportion, molecular_weight, rotatable_bond_count, wildman_crippen_logp};

/// logP coefficient used by [`solubility`].
pub const ESOL_LOGP_COEFFICIENT: f64 = 0.62;

/// logP coefficient as printed in the ESOL paper's abstract.
pub const ESOL_LOGP_COEFFICIENT_PUBLISHED: f64 = 0.63;

const INTERCEPT: f64 = 0.16;
const MW_COEFFICIENT: f64 = 0.0062;
const RB_COEFFICIENT: f64 = 0.066;
const AP_COEFFICIENT: f64 = 0.74;

/// ESOL solubility of `mol`: log Sw (mol/L) when `log_value`, otherwise
/// `exp(log Sw)`.
///
/// ```
/// use marsi_chem::{parse_smiles, solubility};
///
/// let benzene = parse_smiles("c1ccccc1").unwrap();
/// let log_s = solubility(&benzene, true).unwrap();
/// assert!(log_s < 0.0);
/// ```
pub fn solubility(mol: &Molecule, log_value: bool) -> Result<f64> {
    let log_sw = esol_log_solubility(mol, ESOL_LOGP_COEFFICIENT)?;
    Ok(if log_value { log_sw } else { log_sw.exp() })
}

/// ESOL log Sw with an explicit logP coefficient.
pub fn esol_log_solubility(mol: &Molecule, logp_coefficient: f64) -> Result<f64> {
    if mol.is_empty() {
        return Err(MarsiError::EmptyMolecule(format!(
            "cannot estimate solubility of '{}' without atoms",
            mol.name
        )));
    }
    let (logp, _) = wildman_crippen_logp(mol);
    let mw = molecular_weight(mol);
    let rb = rotatable_bond_count(mol) as f64;
    let ap = aromatic_proportion(mol);
    Ok(INTERCEPT - logp_coefficient * logp - MW_COEFFICIENT * mw + RB_COEFFICIENT * rb - AP_COEFFICIENT * ap)
}

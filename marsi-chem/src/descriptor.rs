//! Named descriptor values with the method that produced them.
//!
//! Each `*_descriptor` function runs one computation and records how it was
//! run, so stored values can be traced back to force field, iteration count
//! and seed.

use marsi_core::{Result, Summarizable};

use crate::forcefield::ForceField;
use crate::molecule::Molecule;
use crate::solubility::solubility;
use crate::spectrophore::{spectrophore_with_config, SpectrophoreConfig};
use crate::volume::{molecule_convex_hull_volume, molecule_monte_carlo_volume, MonteCarloConfig};

/// A scalar or a fixed-length vector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DescriptorValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl DescriptorValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            DescriptorValue::Scalar(v) => Some(*v),
            DescriptorValue::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            DescriptorValue::Scalar(_) => None,
            DescriptorValue::Vector(v) => Some(v),
        }
    }
}

/// How a descriptor value was obtained.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DescriptorMethod {
    /// Algorithm name, e.g. `"quickhull"` or `"esol"`.
    pub method: String,
    pub forcefield: Option<ForceField>,
    /// Minimisation steps or sampling batches, where applicable.
    pub iterations: Option<usize>,
    pub tolerance: Option<f64>,
    pub seed: Option<u64>,
    /// False only for a sampled value that stopped at its iteration cap.
    pub converged: bool,
}

impl DescriptorMethod {
    /// A deterministic method with no tunable parameters.
    pub fn new(method: &str) -> Self {
        DescriptorMethod {
            method: method.to_string(),
            forcefield: None,
            iterations: None,
            tolerance: None,
            seed: None,
            converged: true,
        }
    }
}

/// One computed descriptor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DescriptorResult {
    pub name: String,
    pub value: DescriptorValue,
    pub method: DescriptorMethod,
}

impl DescriptorResult {
    pub fn scalar(name: &str, value: f64, method: DescriptorMethod) -> Self {
        DescriptorResult {
            name: name.to_string(),
            value: DescriptorValue::Scalar(value),
            method,
        }
    }

    pub fn vector(name: &str, values: Vec<f64>, method: DescriptorMethod) -> Self {
        DescriptorResult {
            name: name.to_string(),
            value: DescriptorValue::Vector(values),
            method,
        }
    }
}

impl Summarizable for DescriptorResult {
    fn summary(&self) -> String {
        let value = match &self.value {
            DescriptorValue::Scalar(v) => format!("{v:.4}"),
            DescriptorValue::Vector(v) => format!("[{} values]", v.len()),
        };
        let mut text = format!("{} = {} ({}", self.name, value, self.method.method);
        if let Some(ff) = self.method.forcefield {
            text.push_str(&format!(", {ff}"));
        }
        if !self.method.converged {
            text.push_str(", not converged");
        }
        text.push(')');
        text
    }
}

// ---------------------------------------------------------------------------
// Wrappers
// ---------------------------------------------------------------------------

/// Convex hull volume after embedding; see [`molecule_convex_hull_volume`].
pub fn convex_hull_descriptor(mol: &mut Molecule, forcefield: ForceField, steps: usize) -> Result<DescriptorResult> {
    let volume = molecule_convex_hull_volume(mol, forcefield, steps)?;
    let method = DescriptorMethod {
        forcefield: Some(forcefield),
        iterations: Some(steps),
        ..DescriptorMethod::new("quickhull")
    };
    Ok(DescriptorResult::scalar("convex_hull_volume", volume, method))
}

/// Van der Waals volume by sampling; see [`molecule_monte_carlo_volume`].
pub fn monte_carlo_descriptor(
    mol: &Molecule,
    coords: Option<&[[f64; 3]]>,
    config: &MonteCarloConfig,
) -> Result<DescriptorResult> {
    let estimate = molecule_monte_carlo_volume(mol, coords, config)?;
    let method = DescriptorMethod {
        iterations: Some(estimate.iterations),
        tolerance: Some(config.tolerance),
        seed: Some(config.seed),
        converged: estimate.converged,
        ..DescriptorMethod::new("monte_carlo")
    };
    Ok(DescriptorResult::scalar("monte_carlo_volume", estimate.volume, method))
}

pub fn solubility_descriptor(mol: &Molecule, log_value: bool) -> Result<DescriptorResult> {
    let value = solubility(mol, log_value)?;
    let name = if log_value { "log_solubility" } else { "solubility" };
    Ok(DescriptorResult::scalar(name, value, DescriptorMethod::new("esol")))
}

pub fn spectrophore_descriptor(mol: &Molecule, config: &SpectrophoreConfig) -> Result<DescriptorResult> {
    let values = spectrophore_with_config(mol, config)?;
    Ok(DescriptorResult::vector(
        "spectrophore",
        values.to_vec(),
        DescriptorMethod::new("spectrophore"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::embed_3d;
    use crate::smiles::parse_smiles;
    use crate::spectrophore::SPECTROPHORE_LENGTH;

    #[test]
    fn hull_descriptor_records_embedding() {
        let mut mol = parse_smiles("CCO").unwrap();
        let d = convex_hull_descriptor(&mut mol, ForceField::Uff, 50).unwrap();
        assert_eq!(d.name, "convex_hull_volume");
        assert!(d.value.as_scalar().unwrap() > 0.0);
        assert_eq!(d.method.method, "quickhull");
        assert_eq!(d.method.forcefield, Some(ForceField::Uff));
        assert_eq!(d.method.iterations, Some(50));
        assert!(d.method.converged);
    }

    #[test]
    fn monte_carlo_descriptor_records_sampling() {
        let mut mol = parse_smiles("O").unwrap();
        embed_3d(&mut mol, ForceField::Mmff94, 50).unwrap();
        let config = MonteCarloConfig::new(7);
        let d = monte_carlo_descriptor(&mol, None, &config).unwrap();
        assert_eq!(d.method.seed, Some(7));
        assert_eq!(d.method.tolerance, Some(0.01));
        assert!(d.method.iterations.unwrap() >= 1);
        assert!(d.value.as_scalar().unwrap() > 0.0);
        assert!(d.value.as_vector().is_none());
    }

    #[test]
    fn solubility_names_follow_scale() {
        let mol = parse_smiles("CCO").unwrap();
        let log = solubility_descriptor(&mol, true).unwrap();
        let lin = solubility_descriptor(&mol, false).unwrap();
        assert_eq!(log.name, "log_solubility");
        assert_eq!(lin.name, "solubility");
        let (l, s) = (log.value.as_scalar().unwrap(), lin.value.as_scalar().unwrap());
        assert!((s - l.exp()).abs() < 1e-12);
        assert_eq!(log.summary(), format!("log_solubility = {l:.4} (esol)"));
    }

    #[test]
    fn spectrophore_is_a_vector() {
        let mut mol = parse_smiles("CC(=O)O").unwrap();
        embed_3d(&mut mol, ForceField::Mmff94, 100).unwrap();
        let d = spectrophore_descriptor(&mol, &SpectrophoreConfig::default()).unwrap();
        assert_eq!(d.value.as_vector().unwrap().len(), SPECTROPHORE_LENGTH);
        assert!(d.summary().contains("[48 values]"));
    }

    #[test]
    fn failures_propagate() {
        let empty = Molecule::new(String::new(), vec![], vec![]);
        assert!(solubility_descriptor(&empty, true).is_err());
        let flat = parse_smiles("CCO").unwrap();
        assert!(spectrophore_descriptor(&flat, &SpectrophoreConfig::default()).is_err());
    }
}

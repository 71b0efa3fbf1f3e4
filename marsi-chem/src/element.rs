//! Periodic table data and element lookup.
//!
//! Atomic number 0 is the dummy atom (`*` in SMILES, `R` in MOL blocks). It
//! marks an open valence and is how radicals and R-groups are recorded.

/// A chemical element from the periodic table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub atomic_number: u8,
    pub symbol: &'static str,
    pub name: &'static str,
    pub atomic_weight: f64,
    pub valence: u8,
    pub max_bonds: u8,
    /// Single-bond covalent radius in Å.
    pub covalent_radius: f64,
    /// Van der Waals radius in Å.
    pub vdw_radius: f64,
    /// Pauling electronegativity (0.0 where undefined).
    pub electronegativity: f64,
}

/// Dummy atom plus elements 1–54 (H through Xe), indexed by atomic number.
static ELEMENTS: [Element; 55] = [
    Element { atomic_number: 0, symbol: "*", name: "Dummy", atomic_weight: 0.0, valence: 0, max_bonds: 8, covalent_radius: 0.0, vdw_radius: 0.0, electronegativity: 0.0 },
    Element { atomic_number: 1, symbol: "H", name: "Hydrogen", atomic_weight: 1.008, valence: 1, max_bonds: 1, covalent_radius: 0.31, vdw_radius: 1.10, electronegativity: 2.20 },
    Element { atomic_number: 2, symbol: "He", name: "Helium", atomic_weight: 4.003, valence: 0, max_bonds: 0, covalent_radius: 0.28, vdw_radius: 1.40, electronegativity: 0.0 },
    Element { atomic_number: 3, symbol: "Li", name: "Lithium", atomic_weight: 6.941, valence: 1, max_bonds: 1, covalent_radius: 1.28, vdw_radius: 1.81, electronegativity: 0.98 },
    Element { atomic_number: 4, symbol: "Be", name: "Beryllium", atomic_weight: 9.012, valence: 2, max_bonds: 2, covalent_radius: 0.96, vdw_radius: 1.53, electronegativity: 1.57 },
    Element { atomic_number: 5, symbol: "B", name: "Boron", atomic_weight: 10.81, valence: 3, max_bonds: 4, covalent_radius: 0.84, vdw_radius: 1.92, electronegativity: 2.04 },
    Element { atomic_number: 6, symbol: "C", name: "Carbon", atomic_weight: 12.011, valence: 4, max_bonds: 4, covalent_radius: 0.76, vdw_radius: 1.70, electronegativity: 2.55 },
    Element { atomic_number: 7, symbol: "N", name: "Nitrogen", atomic_weight: 14.007, valence: 3, max_bonds: 4, covalent_radius: 0.71, vdw_radius: 1.55, electronegativity: 3.04 },
    Element { atomic_number: 8, symbol: "O", name: "Oxygen", atomic_weight: 15.999, valence: 2, max_bonds: 3, covalent_radius: 0.66, vdw_radius: 1.52, electronegativity: 3.44 },
    Element { atomic_number: 9, symbol: "F", name: "Fluorine", atomic_weight: 18.998, valence: 1, max_bonds: 1, covalent_radius: 0.57, vdw_radius: 1.47, electronegativity: 3.98 },
    Element { atomic_number: 10, symbol: "Ne", name: "Neon", atomic_weight: 20.180, valence: 0, max_bonds: 0, covalent_radius: 0.58, vdw_radius: 1.54, electronegativity: 0.0 },
    Element { atomic_number: 11, symbol: "Na", name: "Sodium", atomic_weight: 22.990, valence: 1, max_bonds: 1, covalent_radius: 1.66, vdw_radius: 2.27, electronegativity: 0.93 },
    Element { atomic_number: 12, symbol: "Mg", name: "Magnesium", atomic_weight: 24.305, valence: 2, max_bonds: 2, covalent_radius: 1.41, vdw_radius: 1.73, electronegativity: 1.31 },
    Element { atomic_number: 13, symbol: "Al", name: "Aluminum", atomic_weight: 26.982, valence: 3, max_bonds: 4, covalent_radius: 1.21, vdw_radius: 1.84, electronegativity: 1.61 },
    Element { atomic_number: 14, symbol: "Si", name: "Silicon", atomic_weight: 28.086, valence: 4, max_bonds: 4, covalent_radius: 1.11, vdw_radius: 2.10, electronegativity: 1.90 },
    Element { atomic_number: 15, symbol: "P", name: "Phosphorus", atomic_weight: 30.974, valence: 3, max_bonds: 6, covalent_radius: 1.07, vdw_radius: 1.80, electronegativity: 2.19 },
    Element { atomic_number: 16, symbol: "S", name: "Sulfur", atomic_weight: 32.06, valence: 2, max_bonds: 6, covalent_radius: 1.05, vdw_radius: 1.80, electronegativity: 2.58 },
    Element { atomic_number: 17, symbol: "Cl", name: "Chlorine", atomic_weight: 35.45, valence: 1, max_bonds: 1, covalent_radius: 1.02, vdw_radius: 1.75, electronegativity: 3.16 },
    Element { atomic_number: 18, symbol: "Ar", name: "Argon", atomic_weight: 39.948, valence: 0, max_bonds: 0, covalent_radius: 1.06, vdw_radius: 1.88, electronegativity: 0.0 },
    Element { atomic_number: 19, symbol: "K", name: "Potassium", atomic_weight: 39.098, valence: 1, max_bonds: 1, covalent_radius: 2.03, vdw_radius: 2.75, electronegativity: 0.82 },
    Element { atomic_number: 20, symbol: "Ca", name: "Calcium", atomic_weight: 40.078, valence: 2, max_bonds: 2, covalent_radius: 1.76, vdw_radius: 2.31, electronegativity: 1.00 },
    Element { atomic_number: 21, symbol: "Sc", name: "Scandium", atomic_weight: 44.956, valence: 3, max_bonds: 6, covalent_radius: 1.70, vdw_radius: 2.30, electronegativity: 1.36 },
    Element { atomic_number: 22, symbol: "Ti", name: "Titanium", atomic_weight: 47.867, valence: 4, max_bonds: 6, covalent_radius: 1.60, vdw_radius: 2.15, electronegativity: 1.54 },
    Element { atomic_number: 23, symbol: "V", name: "Vanadium", atomic_weight: 50.942, valence: 5, max_bonds: 6, covalent_radius: 1.53, vdw_radius: 2.05, electronegativity: 1.63 },
    Element { atomic_number: 24, symbol: "Cr", name: "Chromium", atomic_weight: 51.996, valence: 3, max_bonds: 6, covalent_radius: 1.39, vdw_radius: 2.05, electronegativity: 1.66 },
    Element { atomic_number: 25, symbol: "Mn", name: "Manganese", atomic_weight: 54.938, valence: 2, max_bonds: 6, covalent_radius: 1.39, vdw_radius: 2.05, electronegativity: 1.55 },
    Element { atomic_number: 26, symbol: "Fe", name: "Iron", atomic_weight: 55.845, valence: 3, max_bonds: 6, covalent_radius: 1.32, vdw_radius: 2.05, electronegativity: 1.83 },
    Element { atomic_number: 27, symbol: "Co", name: "Cobalt", atomic_weight: 58.933, valence: 3, max_bonds: 6, covalent_radius: 1.26, vdw_radius: 2.00, electronegativity: 1.88 },
    Element { atomic_number: 28, symbol: "Ni", name: "Nickel", atomic_weight: 58.693, valence: 2, max_bonds: 6, covalent_radius: 1.24, vdw_radius: 2.00, electronegativity: 1.91 },
    Element { atomic_number: 29, symbol: "Cu", name: "Copper", atomic_weight: 63.546, valence: 2, max_bonds: 6, covalent_radius: 1.32, vdw_radius: 2.00, electronegativity: 1.90 },
    Element { atomic_number: 30, symbol: "Zn", name: "Zinc", atomic_weight: 65.38, valence: 2, max_bonds: 4, covalent_radius: 1.22, vdw_radius: 2.10, electronegativity: 1.65 },
    Element { atomic_number: 31, symbol: "Ga", name: "Gallium", atomic_weight: 69.723, valence: 3, max_bonds: 4, covalent_radius: 1.22, vdw_radius: 1.87, electronegativity: 1.81 },
    Element { atomic_number: 32, symbol: "Ge", name: "Germanium", atomic_weight: 72.63, valence: 4, max_bonds: 4, covalent_radius: 1.20, vdw_radius: 2.11, electronegativity: 2.01 },
    Element { atomic_number: 33, symbol: "As", name: "Arsenic", atomic_weight: 74.922, valence: 3, max_bonds: 5, covalent_radius: 1.19, vdw_radius: 1.85, electronegativity: 2.18 },
    Element { atomic_number: 34, symbol: "Se", name: "Selenium", atomic_weight: 78.96, valence: 2, max_bonds: 6, covalent_radius: 1.20, vdw_radius: 1.90, electronegativity: 2.55 },
    Element { atomic_number: 35, symbol: "Br", name: "Bromine", atomic_weight: 79.904, valence: 1, max_bonds: 1, covalent_radius: 1.20, vdw_radius: 1.85, electronegativity: 2.96 },
    Element { atomic_number: 36, symbol: "Kr", name: "Krypton", atomic_weight: 83.798, valence: 0, max_bonds: 0, covalent_radius: 1.16, vdw_radius: 2.02, electronegativity: 3.00 },
    Element { atomic_number: 37, symbol: "Rb", name: "Rubidium", atomic_weight: 85.468, valence: 1, max_bonds: 1, covalent_radius: 2.20, vdw_radius: 3.03, electronegativity: 0.82 },
    Element { atomic_number: 38, symbol: "Sr", name: "Strontium", atomic_weight: 87.62, valence: 2, max_bonds: 2, covalent_radius: 1.95, vdw_radius: 2.49, electronegativity: 0.95 },
    Element { atomic_number: 39, symbol: "Y", name: "Yttrium", atomic_weight: 88.906, valence: 3, max_bonds: 6, covalent_radius: 1.90, vdw_radius: 2.40, electronegativity: 1.22 },
    Element { atomic_number: 40, symbol: "Zr", name: "Zirconium", atomic_weight: 91.224, valence: 4, max_bonds: 6, covalent_radius: 1.75, vdw_radius: 2.30, electronegativity: 1.33 },
    Element { atomic_number: 41, symbol: "Nb", name: "Niobium", atomic_weight: 92.906, valence: 5, max_bonds: 6, covalent_radius: 1.64, vdw_radius: 2.15, electronegativity: 1.60 },
    Element { atomic_number: 42, symbol: "Mo", name: "Molybdenum", atomic_weight: 95.95, valence: 6, max_bonds: 6, covalent_radius: 1.54, vdw_radius: 2.10, electronegativity: 2.16 },
    Element { atomic_number: 43, symbol: "Tc", name: "Technetium", atomic_weight: 98.0, valence: 7, max_bonds: 7, covalent_radius: 1.47, vdw_radius: 2.05, electronegativity: 1.90 },
    Element { atomic_number: 44, symbol: "Ru", name: "Ruthenium", atomic_weight: 101.07, valence: 4, max_bonds: 8, covalent_radius: 1.46, vdw_radius: 2.05, electronegativity: 2.20 },
    Element { atomic_number: 45, symbol: "Rh", name: "Rhodium", atomic_weight: 102.906, valence: 3, max_bonds: 6, covalent_radius: 1.42, vdw_radius: 2.00, electronegativity: 2.28 },
    Element { atomic_number: 46, symbol: "Pd", name: "Palladium", atomic_weight: 106.42, valence: 2, max_bonds: 6, covalent_radius: 1.39, vdw_radius: 2.05, electronegativity: 2.20 },
    Element { atomic_number: 47, symbol: "Ag", name: "Silver", atomic_weight: 107.868, valence: 1, max_bonds: 4, covalent_radius: 1.45, vdw_radius: 2.10, electronegativity: 1.93 },
    Element { atomic_number: 48, symbol: "Cd", name: "Cadmium", atomic_weight: 112.414, valence: 2, max_bonds: 4, covalent_radius: 1.44, vdw_radius: 2.20, electronegativity: 1.69 },
    Element { atomic_number: 49, symbol: "In", name: "Indium", atomic_weight: 114.818, valence: 3, max_bonds: 4, covalent_radius: 1.42, vdw_radius: 2.20, electronegativity: 1.78 },
    Element { atomic_number: 50, symbol: "Sn", name: "Tin", atomic_weight: 118.710, valence: 4, max_bonds: 4, covalent_radius: 1.39, vdw_radius: 1.93, electronegativity: 1.96 },
    Element { atomic_number: 51, symbol: "Sb", name: "Antimony", atomic_weight: 121.760, valence: 3, max_bonds: 5, covalent_radius: 1.39, vdw_radius: 2.17, electronegativity: 2.05 },
    Element { atomic_number: 52, symbol: "Te", name: "Tellurium", atomic_weight: 127.60, valence: 2, max_bonds: 6, covalent_radius: 1.38, vdw_radius: 2.06, electronegativity: 2.10 },
    Element { atomic_number: 53, symbol: "I", name: "Iodine", atomic_weight: 126.904, valence: 1, max_bonds: 1, covalent_radius: 1.39, vdw_radius: 1.98, electronegativity: 2.66 },
    Element { atomic_number: 54, symbol: "Xe", name: "Xenon", atomic_weight: 131.293, valence: 0, max_bonds: 0, covalent_radius: 1.40, vdw_radius: 2.16, electronegativity: 2.60 },
];

/// Look up an element by its symbol (e.g. "C", "Fe"). `*` and `R` resolve to
/// the dummy atom.
pub fn element_by_symbol(symbol: &str) -> Option<&'static Element> {
    if symbol == "R" {
        return Some(&ELEMENTS[0]);
    }
    ELEMENTS.iter().find(|e| e.symbol == symbol)
}

/// Look up an element by its atomic number (0 is the dummy atom).
pub fn element_by_number(n: u8) -> Option<&'static Element> {
    ELEMENTS.get(n as usize)
}

/// Van der Waals radius for an atomic number, falling back to carbon's 1.7 Å
/// for elements outside the table.
pub fn vdw_radius(n: u8) -> f64 {
    element_by_number(n).map_or(1.7, |e| e.vdw_radius)
}

/// Allowed valences for an atom, adjusted for formal charge by isoelectronic
/// shift (N+ behaves like C, O- like F). Empty for elements without a
/// conventional valence model.
pub fn allowed_valences(atomic_number: u8, charge: i8) -> &'static [u8] {
    match (atomic_number, charge) {
        (1, 0) => &[1],
        (1, _) => &[0],
        (5, 0) => &[3],
        (5, -1) => &[4],
        (6 | 14, 0) => &[4],
        (6 | 14, 1 | -1) => &[3],
        (7 | 15 | 33, 0) => &[3, 5],
        (7 | 15 | 33, 1) => &[4],
        (7 | 15 | 33, -1) => &[2],
        (8, 0) => &[2],
        (8, 1) => &[3],
        (8, -1) => &[1],
        (16 | 34, 0) => &[2, 4, 6],
        (16 | 34, 1) => &[3, 5],
        (16 | 34, -1) => &[1, 3, 5],
        (9 | 17 | 35 | 53, 0) => &[1],
        (9 | 17 | 35 | 53, -1) => &[0],
        (9 | 17 | 35 | 53, 1) => &[2],
        _ => &[],
    }
}

/// Hydrogens needed to bring an atom with bond-order sum `used` up to its
/// lowest allowed valence. Aromatic atoms lend one electron to the ring.
pub fn implied_hydrogens(atomic_number: u8, charge: i8, used: usize, aromatic: bool) -> u8 {
    let used = if aromatic { used + 1 } else { used };
    allowed_valences(atomic_number, charge)
        .iter()
        .map(|&v| v as usize)
        .find(|&v| v >= used)
        .map_or(0, |v| (v - used) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_carbon_by_symbol() {
        let c = element_by_symbol("C").unwrap();
        assert_eq!(c.atomic_number, 6);
        assert_eq!(c.name, "Carbon");
        assert!((c.atomic_weight - 12.011).abs() < 0.001);
        assert_eq!(c.valence, 4);
        assert!((c.vdw_radius - 1.70).abs() < 1e-9);
    }

    #[test]
    fn lookup_nitrogen_by_number() {
        let n = element_by_number(7).unwrap();
        assert_eq!(n.symbol, "N");
        assert_eq!(n.name, "Nitrogen");
        assert_eq!(n.valence, 3);
    }

    #[test]
    fn table_is_indexed_by_atomic_number() {
        for z in 0..=54u8 {
            assert_eq!(element_by_number(z).unwrap().atomic_number, z);
        }
    }

    #[test]
    fn dummy_atom() {
        assert_eq!(element_by_symbol("*").unwrap().atomic_number, 0);
        assert_eq!(element_by_symbol("R").unwrap().atomic_number, 0);
        assert_eq!(vdw_radius(0), 0.0);
    }

    #[test]
    fn charge_shifts_valence() {
        assert_eq!(implied_hydrogens(7, 0, 0, false), 3);
        assert_eq!(implied_hydrogens(7, 1, 0, false), 4);
        assert_eq!(implied_hydrogens(8, -1, 1, false), 0);
        assert_eq!(implied_hydrogens(16, 0, 4, false), 0);
        assert_eq!(implied_hydrogens(15, 0, 5, false), 0);
        // aromatic carbon with two ring bonds
        assert_eq!(implied_hydrogens(6, 0, 2, true), 1);
        assert_eq!(implied_hydrogens(26, 0, 0, false), 0);
    }

    #[test]
    fn unknown_returns_none() {
        assert!(element_by_symbol("Zz").is_none());
        assert!(element_by_number(55).is_none());
        assert!((vdw_radius(92) - 1.7).abs() < 1e-12);
    }
}

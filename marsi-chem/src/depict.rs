//! 2-D depiction as SVG.
//!
//! Atoms are placed with a seeded spring-electrical layout over the
//! hydrogen-suppressed graph, scaled so the mean bond is [`BOND_LENGTH_PX`]
//! long. Carbon atoms are drawn as bare vertices; every other atom, and any
//! charged or isotopic carbon, gets a label with its attached hydrogens.

use std::fmt::Write;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use marsi_core::{MarsiError, Result};

use crate::element::element_by_number;
use crate::molecule::{BondOrder, Molecule};

/// Target on-screen bond length.
pub const BOND_LENGTH_PX: f64 = 30.0;

const MARGIN_PX: f64 = 20.0;
const LAYOUT_SEED: u64 = 0x6d61_7273;
const LAYOUT_ITERATIONS: usize = 300;
const FONT_SIZE_PX: f64 = 12.0;

/// Render `mol` as a standalone SVG document.
///
/// The drawing is deterministic for a given molecule. Fails with
/// [`MarsiError::Conversion`] when there is nothing to draw.
pub fn to_svg(mol: &Molecule) -> Result<String> {
    let (skeleton, _) = mol.heavy_skeleton();
    if skeleton.is_empty() {
        return Err(MarsiError::Conversion("cannot depict a molecule with no atoms".into()));
    }
    let points = layout(&skeleton);
    render(&skeleton, &points).map_err(|e| MarsiError::Conversion(format!("svg output: {e}")))
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Fruchterman-Reingold with unit ideal edge length, seeded so repeated
/// calls agree.
fn layout(mol: &Molecule) -> Vec<[f64; 2]> {
    let n = mol.atom_count();
    if n == 1 {
        return vec![[0.0, 0.0]];
    }
    let mut rng = ChaCha8Rng::seed_from_u64(LAYOUT_SEED);
    let side = (n as f64).sqrt();
    let mut pos: Vec<[f64; 2]> = (0..n)
        .map(|_| [rng.gen_range(-side..side), rng.gen_range(-side..side)])
        .collect();

    let k = 1.0;
    let mut temperature = side;
    for _ in 0..LAYOUT_ITERATIONS {
        let mut force = vec![[0.0f64; 2]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = pos[j][0] - pos[i][0];
                let dy = pos[j][1] - pos[i][1];
                let dist = (dx * dx + dy * dy).sqrt().max(0.01);
                let repulsion = k * k / dist;
                force[i][0] -= dx / dist * repulsion;
                force[i][1] -= dy / dist * repulsion;
                force[j][0] += dx / dist * repulsion;
                force[j][1] += dy / dist * repulsion;
            }
        }
        for bond in &mol.bonds {
            let (i, j) = (bond.atom1, bond.atom2);
            let dx = pos[j][0] - pos[i][0];
            let dy = pos[j][1] - pos[i][1];
            let dist = (dx * dx + dy * dy).sqrt().max(0.01);
            let attraction = dist * dist / k;
            force[i][0] += dx / dist * attraction;
            force[i][1] += dy / dist * attraction;
            force[j][0] -= dx / dist * attraction;
            force[j][1] -= dy / dist * attraction;
        }
        for (p, f) in pos.iter_mut().zip(&force) {
            let magnitude = (f[0] * f[0] + f[1] * f[1]).sqrt().max(1e-9);
            let step = magnitude.min(temperature);
            p[0] += f[0] / magnitude * step;
            p[1] += f[1] / magnitude * step;
        }
        temperature = (temperature * 0.97).max(0.002);
    }

    // Scale to the target bond length.
    let mean_bond = if mol.bonds.is_empty() {
        1.0
    } else {
        mol.bonds
            .iter()
            .map(|b| {
                let (p, q) = (pos[b.atom1], pos[b.atom2]);
                ((p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2)).sqrt()
            })
            .sum::<f64>()
            / mol.bonds.len() as f64
    };
    let factor = BOND_LENGTH_PX / mean_bond.max(1e-6);
    pos.iter().map(|p| [p[0] * factor, p[1] * factor]).collect()
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(mol: &Molecule, points: &[[f64; 2]]) -> std::result::Result<String, std::fmt::Error> {
    let min_x = points.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min);
    let min_y = points.iter().map(|p| p[1]).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p[0]).fold(f64::NEG_INFINITY, f64::max);
    let max_y = points.iter().map(|p| p[1]).fold(f64::NEG_INFINITY, f64::max);
    let width = max_x - min_x + 2.0 * MARGIN_PX;
    let height = max_y - min_y + 2.0 * MARGIN_PX;
    let at = |i: usize| [points[i][0] - min_x + MARGIN_PX, points[i][1] - min_y + MARGIN_PX];
    let labels: Vec<Option<String>> = (0..mol.atom_count()).map(|i| atom_label(mol, i)).collect();

    let mut svg = String::new();
    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" version="1.1" width="{width:.1}" height="{height:.1}" viewBox="0 0 {width:.1} {height:.1}">"#
    )?;
    if !mol.name.is_empty() {
        writeln!(svg, "  <title>{}</title>", escape(&mol.name))?;
    }
    writeln!(svg, r#"  <rect width="100%" height="100%" fill="white"/>"#)?;
    writeln!(svg, r#"  <g stroke="black" stroke-width="1.5" stroke-linecap="round">"#)?;
    for bond in &mol.bonds {
        let mut a = at(bond.atom1);
        let mut b = at(bond.atom2);
        // Pull line ends back from labels.
        let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
        let len = (dx * dx + dy * dy).sqrt().max(1e-9);
        let (ux, uy) = (dx / len, dy / len);
        if labels[bond.atom1].is_some() {
            a = [a[0] + ux * FONT_SIZE_PX * 0.6, a[1] + uy * FONT_SIZE_PX * 0.6];
        }
        if labels[bond.atom2].is_some() {
            b = [b[0] - ux * FONT_SIZE_PX * 0.6, b[1] - uy * FONT_SIZE_PX * 0.6];
        }
        let offsets: &[f64] = match bond.order {
            BondOrder::Single => &[0.0],
            BondOrder::Double => &[-2.0, 2.0],
            BondOrder::Triple => &[-3.0, 0.0, 3.0],
            BondOrder::Aromatic => &[0.0, 3.0],
        };
        for (k, &off) in offsets.iter().enumerate() {
            let (ox, oy) = (-uy * off, ux * off);
            let dash = if bond.order == BondOrder::Aromatic && k == 1 {
                r#" stroke-dasharray="3,2""#
            } else {
                ""
            };
            writeln!(
                svg,
                r#"    <line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}"{dash}/>"#,
                a[0] + ox,
                a[1] + oy,
                b[0] + ox,
                b[1] + oy
            )?;
        }
    }
    writeln!(svg, "  </g>")?;
    writeln!(
        svg,
        r#"  <g font-family="sans-serif" font-size="{FONT_SIZE_PX}" text-anchor="middle" dominant-baseline="central">"#
    )?;
    for (i, label) in labels.iter().enumerate() {
        if let Some(text) = label {
            let [x, y] = at(i);
            let color = atom_color(mol.atoms[i].atomic_number);
            writeln!(svg, r#"    <text x="{x:.2}" y="{y:.2}" fill="{color}">{}</text>"#, escape(text))?;
        }
    }
    writeln!(svg, "  </g>")?;
    write!(svg, "</svg>")?;
    Ok(svg)
}

fn atom_label(mol: &Molecule, i: usize) -> Option<String> {
    let atom = &mol.atoms[i];
    let plain_carbon = atom.atomic_number == 6
        && atom.formal_charge == 0
        && atom.isotope.is_none()
        && mol.degree(i) > 0;
    if plain_carbon {
        return None;
    }
    let symbol = match atom.atomic_number {
        0 => "*",
        z => element_by_number(z).map_or("?", |e| e.symbol),
    };
    let mut label = String::new();
    if let Some(iso) = atom.isotope {
        label.push_str(&iso.to_string());
    }
    label.push_str(symbol);
    match atom.implicit_hydrogens {
        0 => {}
        1 => label.push('H'),
        h => label.push_str(&format!("H{h}")),
    }
    match atom.formal_charge {
        0 => {}
        1 => label.push('+'),
        -1 => label.push('-'),
        c if c > 0 => label.push_str(&format!("{c}+")),
        c => label.push_str(&format!("{}-", -c)),
    }
    Some(label)
}

fn atom_color(z: u8) -> &'static str {
    match z {
        7 => "#3050f8",
        8 => "#ff0d0d",
        9 | 17 => "#1ff01f",
        15 => "#ff8000",
        16 => "#c8a000",
        35 => "#a62929",
        53 => "#940094",
        _ => "black",
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    #[test]
    fn svg_document_shape() {
        let svg = to_svg(&parse_smiles("CC(=O)O").unwrap()).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg, svg.trim());
        // 3 bonds, one of them double.
        assert_eq!(svg.matches("<line").count(), 4);
        assert!(svg.contains(">OH</text>"));
        assert!(svg.contains(">O</text>"));
    }

    #[test]
    fn deterministic_and_hydrogen_independent() {
        let mut mol = parse_smiles("c1ccccc1N").unwrap();
        let first = to_svg(&mol).unwrap();
        assert_eq!(first, to_svg(&mol).unwrap());
        mol.add_hydrogens();
        assert_eq!(first, to_svg(&mol).unwrap());
    }

    #[test]
    fn lone_atoms_and_charges_are_labelled() {
        let svg = to_svg(&parse_smiles("[NH4+]").unwrap()).unwrap();
        assert!(svg.contains(">NH4+</text>"));
        let svg = to_svg(&parse_smiles("C").unwrap()).unwrap();
        assert!(svg.contains(">CH4</text>"));
    }

    #[test]
    fn empty_molecule_fails() {
        let empty = Molecule::new(String::new(), vec![], vec![]);
        assert!(matches!(to_svg(&empty), Err(MarsiError::Conversion(_))));
    }

    #[test]
    fn layout_bonds_have_target_length() {
        let mol = parse_smiles("CCCCCC").unwrap();
        let points = layout(&mol);
        for b in &mol.bonds {
            let (p, q) = (points[b.atom1], points[b.atom2]);
            let d = ((p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2)).sqrt();
            assert!(d > BOND_LENGTH_PX * 0.5 && d < BOND_LENGTH_PX * 1.5, "bond {d}");
        }
    }
}

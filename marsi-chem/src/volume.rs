//! Molecular volumes: convex hull of the atom centres and a Monte-Carlo
//! estimate of the van der Waals volume.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use marsi_core::{MarsiError, Result};

use crate::element::vdw_radius;
use crate::embed::embed_3d;
use crate::forcefield::ForceField;
use crate::linalg::{cross, dot, sub, Vec3};
use crate::molecule::Molecule;

// ---------------------------------------------------------------------------
// Convex hull
// ---------------------------------------------------------------------------

/// Volume (Å³) of the convex hull of `coords`, by quickhull.
///
/// Fewer than four points, or points that are all (nearly) coplanar, fail
/// with [`MarsiError::DegenerateGeometry`].
///
/// ```
/// use marsi_chem::convex_hull_volume;
///
/// let cube: Vec<[f64; 3]> = (0..8)
///     .map(|i| [(i & 1) as f64, ((i >> 1) & 1) as f64, ((i >> 2) & 1) as f64])
///     .collect();
/// assert!((convex_hull_volume(&cube).unwrap() - 1.0).abs() < 1e-9);
/// ```
pub fn convex_hull_volume(coords: &[[f64; 3]]) -> Result<f64> {
    if coords.len() < 4 {
        return Err(MarsiError::DegenerateGeometry(format!(
            "convex hull needs at least 4 points, got {}",
            coords.len()
        )));
    }
    if coords.iter().flatten().any(|v| !v.is_finite()) {
        return Err(MarsiError::InvalidInput("non-finite coordinate".into()));
    }
    let scale = bounding_extent(coords).max(1.0);
    let epsilon = 1e-9 * scale;

    let (p0, p1) = farthest_pair(coords);
    let p2 = farthest_from_line(coords, p0, p1, epsilon * scale)
        .ok_or_else(|| MarsiError::DegenerateGeometry("all points are collinear".into()))?;
    let p3 = farthest_from_plane(coords, p0, p1, p2, 1e-7 * scale)
        .ok_or_else(|| MarsiError::DegenerateGeometry("all points are coplanar".into()))?;

    // The initial tetrahedron's centroid stays inside every later hull.
    let interior = {
        let s = [p0, p1, p2, p3]
            .iter()
            .fold([0.0; 3], |acc, &i| [acc[0] + coords[i][0], acc[1] + coords[i][1], acc[2] + coords[i][2]]);
        [s[0] / 4.0, s[1] / 4.0, s[2] / 4.0]
    };
    let mut faces: Vec<Face> = [[p0, p1, p2], [p0, p1, p3], [p0, p2, p3], [p1, p2, p3]]
        .into_iter()
        .map(|verts| Face::outward(verts, coords, interior))
        .collect();

    for (idx, point) in coords.iter().enumerate() {
        if [p0, p1, p2, p3].contains(&idx) {
            continue;
        }
        let visible: Vec<bool> = faces.iter().map(|f| f.distance(*point) > epsilon).collect();
        if !visible.contains(&true) {
            continue;
        }
        let mut edge_uses: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        for f in faces.iter().zip(&visible).filter(|&(_, &v)| v).map(|(f, _)| f) {
            let [a, b, c] = f.verts;
            for (u, v) in [(a, b), (b, c), (c, a)] {
                *edge_uses.entry((u.min(v), u.max(v))).or_default() += 1;
            }
        }
        faces = faces
            .into_iter()
            .zip(&visible)
            .filter(|&(_, &v)| !v)
            .map(|(f, _)| f)
            .collect();
        for ((a, b), uses) in edge_uses {
            if uses == 1 {
                let face = Face::outward([a, b, idx], coords, interior);
                if face.area2 > epsilon {
                    faces.push(face);
                }
            }
        }
    }

    let volume: f64 = faces
        .iter()
        .map(|f| {
            let [a, b, c] = f.verts.map(|i| sub(coords[i], interior));
            dot(a, cross(b, c)) / 6.0
        })
        .sum();
    Ok(volume.abs())
}

#[derive(Debug, Clone)]
struct Face {
    verts: [usize; 3],
    normal: Vec3,
    offset: f64,
    /// Twice the face area.
    area2: f64,
}

impl Face {
    /// Face whose normal points away from `interior`.
    fn outward(verts: [usize; 3], points: &[[f64; 3]], interior: Vec3) -> Face {
        let face = Face::new(verts, points);
        if face.distance(interior) > 0.0 {
            Face::new([verts[1], verts[0], verts[2]], points)
        } else {
            face
        }
    }

    fn new(verts: [usize; 3], points: &[[f64; 3]]) -> Face {
        let [a, b, c] = verts.map(|i| points[i]);
        let n = cross(sub(b, a), sub(c, a));
        let area2 = dot(n, n).sqrt();
        let normal = if area2 > 0.0 { [n[0] / area2, n[1] / area2, n[2] / area2] } else { [0.0; 3] };
        Face {
            verts,
            normal,
            offset: -dot(normal, a),
            area2,
        }
    }

    fn distance(&self, p: Vec3) -> f64 {
        dot(self.normal, p) + self.offset
    }
}

fn bounding_extent(points: &[[f64; 3]]) -> f64 {
    (0..3)
        .map(|k| {
            let lo = points.iter().map(|p| p[k]).fold(f64::INFINITY, f64::min);
            let hi = points.iter().map(|p| p[k]).fold(f64::NEG_INFINITY, f64::max);
            hi - lo
        })
        .fold(0.0, f64::max)
}

fn farthest_pair(points: &[[f64; 3]]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut best_d2 = -1.0;
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let d = sub(points[i], points[j]);
            let d2 = dot(d, d);
            if d2 > best_d2 {
                best_d2 = d2;
                best = (i, j);
            }
        }
    }
    best
}

fn farthest_from_line(points: &[[f64; 3]], a: usize, b: usize, min_area: f64) -> Option<usize> {
    let ab = sub(points[b], points[a]);
    let mut best = None;
    let mut best_area = min_area;
    for (i, p) in points.iter().enumerate() {
        if i == a || i == b {
            continue;
        }
        let c = cross(ab, sub(*p, points[a]));
        let area = dot(c, c).sqrt();
        if area > best_area {
            best_area = area;
            best = Some(i);
        }
    }
    best
}

fn farthest_from_plane(points: &[[f64; 3]], a: usize, b: usize, c: usize, min_dist: f64) -> Option<usize> {
    let face = Face::new([a, b, c], points);
    let mut best = None;
    let mut best_dist = min_dist;
    for (i, p) in points.iter().enumerate() {
        if i == a || i == b || i == c {
            continue;
        }
        let d = face.distance(*p).abs();
        if d > best_dist {
            best_dist = d;
            best = Some(i);
        }
    }
    best
}

/// Embed `mol` in 3-D (adding hydrogens) and return the hull volume of all
/// its atoms.
pub fn molecule_convex_hull_volume(mol: &mut Molecule, forcefield: ForceField, steps: usize) -> Result<f64> {
    embed_3d(mol, forcefield, steps)?;
    convex_hull_volume(&mol.coordinates())
}

// ---------------------------------------------------------------------------
// Monte Carlo
// ---------------------------------------------------------------------------

/// Parameters of [`monte_carlo_volume`].
///
/// There is no `Default`: the seed has to be chosen by the caller, or taken
/// from the clock with [`MonteCarloConfig::clock_seeded`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonteCarloConfig {
    /// Stop once two consecutive running estimates differ by less than this (Å³).
    pub tolerance: f64,
    /// Maximum number of batches.
    pub max_iterations: usize,
    /// Points sampled per batch.
    pub step_size: usize,
    pub seed: u64,
    /// Log every batch and warn when the batch limit is reached.
    pub verbose: bool,
}

impl MonteCarloConfig {
    /// Standard parameters (tolerance 0.01, 10 000 batches of 1 000 points)
    /// with the given seed.
    pub fn new(seed: u64) -> Self {
        MonteCarloConfig {
            tolerance: 0.01,
            max_iterations: 10_000,
            step_size: 1_000,
            seed,
            verbose: false,
        }
    }

    /// Standard parameters seeded from the system clock.
    pub fn clock_seeded() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        MonteCarloConfig::new(seed)
    }
}

/// Result of [`monte_carlo_volume`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VolumeEstimate {
    /// Estimated volume in Å³.
    pub volume: f64,
    /// Batches evaluated.
    pub iterations: usize,
    /// Points sampled in total.
    pub samples: usize,
    /// False when the batch limit was reached before the tolerance.
    pub converged: bool,
}

/// Monte-Carlo estimate of the volume covered by spheres of `vdw_radii`
/// centred on `coords`.
///
/// Uniform points are drawn in batches of `step_size` from the bounding box
/// of the spheres. After each batch the running estimate is the box volume
/// times the fraction of points that fell inside any sphere. Sampling stops
/// when two consecutive estimates differ by less than `tolerance`, or after
/// `max_iterations` batches with `converged = false`.
pub fn monte_carlo_volume(coords: &[[f64; 3]], vdw_radii: &[f64], config: &MonteCarloConfig) -> Result<VolumeEstimate> {
    if coords.is_empty() {
        return Err(MarsiError::EmptyMolecule("no atoms to sample".into()));
    }
    if coords.len() != vdw_radii.len() {
        return Err(MarsiError::InvalidInput(format!(
            "{} coordinates but {} radii",
            coords.len(),
            vdw_radii.len()
        )));
    }
    if config.step_size == 0 || config.max_iterations == 0 {
        return Err(MarsiError::InvalidInput(
            "step_size and max_iterations must be positive".into(),
        ));
    }
    if vdw_radii.iter().any(|r| !r.is_finite() || *r < 0.0) || coords.iter().flatten().any(|v| !v.is_finite()) {
        return Err(MarsiError::InvalidInput("radii and coordinates must be finite, radii non-negative".into()));
    }

    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for (p, &r) in coords.iter().zip(vdw_radii) {
        for k in 0..3 {
            lo[k] = lo[k].min(p[k] - r);
            hi[k] = hi[k].max(p[k] + r);
        }
    }
    let box_volume = (hi[0] - lo[0]) * (hi[1] - lo[1]) * (hi[2] - lo[2]);
    if box_volume <= 0.0 {
        return Ok(VolumeEstimate {
            volume: 0.0,
            iterations: 0,
            samples: 0,
            converged: true,
        });
    }
    let radii2: Vec<f64> = vdw_radii.iter().map(|r| r * r).collect();

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut inside = 0usize;
    let mut total = 0usize;
    let mut previous: Option<f64> = None;
    for iteration in 1..=config.max_iterations {
        for _ in 0..config.step_size {
            let p = [
                rng.gen_range(lo[0]..=hi[0]),
                rng.gen_range(lo[1]..=hi[1]),
                rng.gen_range(lo[2]..=hi[2]),
            ];
            let hit = coords.iter().zip(&radii2).any(|(c, &r2)| {
                let d = sub(p, *c);
                dot(d, d) <= r2
            });
            inside += usize::from(hit);
        }
        total += config.step_size;
        let estimate = box_volume * inside as f64 / total as f64;
        if config.verbose {
            tracing::debug!(iteration, estimate, samples = total, "monte carlo volume");
        }
        if let Some(prev) = previous {
            if (estimate - prev).abs() < config.tolerance {
                return Ok(VolumeEstimate {
                    volume: estimate,
                    iterations: iteration,
                    samples: total,
                    converged: true,
                });
            }
        }
        previous = Some(estimate);
    }

    let volume = previous.unwrap_or_default();
    if config.verbose {
        tracing::warn!(
            max_iterations = config.max_iterations,
            volume,
            tolerance = config.tolerance,
            "monte carlo volume did not converge"
        );
    }
    Ok(VolumeEstimate {
        volume,
        iterations: config.max_iterations,
        samples: total,
        converged: false,
    })
}

/// [`monte_carlo_volume`] over a molecule's atoms with element van der Waals
/// radii.
///
/// `coords`, when given, replaces the molecule's own positions and must list
/// one point per atom in atom order.
pub fn molecule_monte_carlo_volume(
    mol: &Molecule,
    coords: Option<&[[f64; 3]]>,
    config: &MonteCarloConfig,
) -> Result<VolumeEstimate> {
    if mol.is_empty() {
        return Err(MarsiError::EmptyMolecule(format!("molecule '{}' has no atoms", mol.name)));
    }
    let own;
    let coords = match coords {
        Some(c) => {
            if c.len() != mol.atom_count() {
                return Err(MarsiError::InvalidInput(format!(
                    "{} coordinates for {} atoms",
                    c.len(),
                    mol.atom_count()
                )));
            }
            c
        }
        None => {
            own = mol.coordinates();
            &own
        }
    };
    let radii: Vec<f64> = mol.atoms.iter().map(|a| vdw_radius(a.atomic_number)).collect();
    monte_carlo_volume(coords, &radii, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;
    use std::f64::consts::PI;

    fn cube(side: f64) -> Vec<[f64; 3]> {
        (0..8)
            .map(|i| {
                [
                    side * (i & 1) as f64,
                    side * ((i >> 1) & 1) as f64,
                    side * ((i >> 2) & 1) as f64,
                ]
            })
            .collect()
    }

    #[test]
    fn hull_of_tetrahedron() {
        let pts = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert!((convex_hull_volume(&pts).unwrap() - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn hull_ignores_interior_points() {
        let mut pts = cube(2.0);
        pts.push([1.0, 1.0, 1.0]);
        pts.push([0.5, 1.5, 0.2]);
        pts.insert(0, [1.0, 0.3, 1.7]);
        assert!((convex_hull_volume(&pts).unwrap() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn hull_of_sphere_samples_approaches_sphere() {
        let mut pts = Vec::new();
        for i in 0..20 {
            let theta = PI * (i as f64 + 0.5) / 20.0;
            for j in 0..40 {
                let phi = 2.0 * PI * j as f64 / 40.0;
                pts.push([theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos()]);
            }
        }
        let v = convex_hull_volume(&pts).unwrap();
        assert!(v < 4.0 / 3.0 * PI && v > 3.9, "volume = {v}");
    }

    #[test]
    fn coplanar_points_are_degenerate() {
        let square = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0], [0.5, 0.5, 0.0]];
        assert!(matches!(convex_hull_volume(&square), Err(MarsiError::DegenerateGeometry(_))));
        let line = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0], [3.0, 3.0, 3.0]];
        assert!(matches!(convex_hull_volume(&line), Err(MarsiError::DegenerateGeometry(_))));
        assert!(matches!(convex_hull_volume(&square[..3]), Err(MarsiError::DegenerateGeometry(_))));
    }

    #[test]
    fn single_sphere_volume_within_five_percent() {
        let est = monte_carlo_volume(&[[0.0, 0.0, 0.0]], &[1.0], &MonteCarloConfig::new(42)).unwrap();
        let exact = 4.0 / 3.0 * PI;
        assert!((est.volume - exact).abs() / exact < 0.05, "volume = {}", est.volume);
        assert!(est.converged);
        assert_eq!(est.samples, est.iterations * 1000);
    }

    #[test]
    fn same_seed_same_estimate() {
        let coords = [[0.0, 0.0, 0.0], [1.2, 0.0, 0.0]];
        let radii = [1.7, 1.52];
        let config = MonteCarloConfig::new(7);
        assert_eq!(
            monte_carlo_volume(&coords, &radii, &config).unwrap(),
            monte_carlo_volume(&coords, &radii, &config).unwrap()
        );
    }

    #[test]
    fn iteration_cap_reports_not_converged() {
        crate::init_test_tracing();
        let config = MonteCarloConfig {
            tolerance: 0.0,
            max_iterations: 3,
            verbose: true,
            ..MonteCarloConfig::new(1)
        };
        let est = monte_carlo_volume(&[[0.0, 0.0, 0.0]], &[1.0], &config).unwrap();
        assert!(!est.converged);
        assert_eq!(est.iterations, 3);
        assert!(est.volume > 3.0 && est.volume < 5.5);
    }

    #[test]
    fn invalid_monte_carlo_input() {
        let config = MonteCarloConfig::new(1);
        assert!(matches!(
            monte_carlo_volume(&[[0.0; 3]], &[1.0, 2.0], &config),
            Err(MarsiError::InvalidInput(_))
        ));
        assert!(matches!(monte_carlo_volume(&[], &[], &config), Err(MarsiError::EmptyMolecule(_))));
        let zero_step = MonteCarloConfig { step_size: 0, ..config.clone() };
        assert!(matches!(
            monte_carlo_volume(&[[0.0; 3]], &[1.0], &zero_step),
            Err(MarsiError::InvalidInput(_))
        ));
        let zero_iter = MonteCarloConfig { max_iterations: 0, ..config };
        assert!(matches!(
            monte_carlo_volume(&[[0.0; 3]], &[1.0], &zero_iter),
            Err(MarsiError::InvalidInput(_))
        ));
    }

    #[test]
    fn clock_seeded_uses_standard_parameters() {
        let config = MonteCarloConfig::clock_seeded();
        assert_eq!(config.step_size, 1000);
        assert_eq!(config.max_iterations, 10_000);
        assert!(!config.verbose);
    }

    #[test]
    fn ethanol_hull_after_embedding() {
        let mut mol = parse_smiles("CCO").unwrap();
        let v = molecule_convex_hull_volume(&mut mol, ForceField::Mmff94, 100).unwrap();
        assert!(v > 0.0);
        assert_eq!(mol.atom_count(), 9);

        let mut mol = parse_smiles("CCO").unwrap();
        match molecule_convex_hull_volume(&mut mol, ForceField::Mmff94, 0) {
            Ok(v) => assert!(v > 0.0),
            Err(e) => assert!(matches!(e, MarsiError::Embedding(_)), "{e}"),
        }
    }

    #[test]
    fn molecule_monte_carlo_with_own_and_given_coordinates() {
        let mut mol = parse_smiles("O").unwrap();
        embed_3d(&mut mol, ForceField::Uff, 50).unwrap();
        let config = MonteCarloConfig::new(3);
        let own = molecule_monte_carlo_volume(&mol, None, &config).unwrap();
        let coords = mol.coordinates();
        let given = molecule_monte_carlo_volume(&mol, Some(&coords), &config).unwrap();
        assert_eq!(own, given);
        // Oxygen sphere alone is about 14 Å³.
        assert!(own.volume > 12.0 && own.volume < 30.0, "volume = {}", own.volume);

        assert!(matches!(
            molecule_monte_carlo_volume(&mol, Some(&coords[..1]), &config),
            Err(MarsiError::InvalidInput(_))
        ));
        let empty = Molecule::new(String::new(), vec![], vec![]);
        assert!(matches!(
            molecule_monte_carlo_volume(&empty, None, &config),
            Err(MarsiError::EmptyMolecule(_))
        ));
    }
}

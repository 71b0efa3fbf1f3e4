use criterion::{black_box, criterion_group, criterion_main, Criterion};
use marsi_chem::{
    convex_hull_volume, embed_3d, fingerprint, monte_carlo_volume, parse_smiles, solubility, spectrophore, tanimoto,
    to_inchi, vdw_radius, ForceField, MonteCarloConfig,
};

/// Antimetabolites and a few common reference compounds.
const SMILES_SET: &[&str] = &[
    "CCO",                                   // ethanol
    "CC(=O)Oc1ccccc1C(=O)O",                 // aspirin
    "CN1C=NC2=C1C(=O)N(C(=O)N2C)C",          // caffeine
    "CC(C)CC1=CC=C(C=C1)C(C)C(=O)O",         // ibuprofen
    "C1=C(C(=O)NC(=O)N1)F",                  // 5-fluorouracil
    "C1=CN(C(=O)N=C1N)C2C(C(C(O2)CO)O)O",    // cytarabine
    "NC1=NC(=S)C2=C(N1)N=CN2",               // thioguanine
    "S=C1N=CNC2=C1NC=N2",                    // mercaptopurine
    "OC(=O)CCC(NC(=O)c1ccc(NCc2cnc3nc(N)nc(N)c3n2)cc1)C(O)=O", // aminopterin
    "NC(=O)c1ncn[nH]1",                      // ribavirin base
    "c1ccc2ccccc2c1",                        // naphthalene
    "C(C(=O)O)N",                            // glycine
];

fn bench_parse(c: &mut Criterion) {
    let smiles_1k: Vec<&str> = SMILES_SET.iter().copied().cycle().take(1000).collect();
    c.bench_function("smiles_parse_1k", |b| {
        b.iter(|| {
            for &smi in black_box(&smiles_1k) {
                let _ = parse_smiles(smi);
            }
        })
    });
}

fn bench_identifiers(c: &mut Criterion) {
    let mols: Vec<_> = SMILES_SET.iter().filter_map(|s| parse_smiles(s).ok()).collect();
    c.bench_function("to_inchi", |b| {
        b.iter(|| {
            for mol in black_box(&mols) {
                let _ = to_inchi(mol);
            }
        })
    });
}

fn bench_fingerprints(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    let mols: Vec<_> = SMILES_SET.iter().filter_map(|s| parse_smiles(s).ok()).collect();
    for format in ["maccs", "fp2", "ecfp4"] {
        group.bench_function(format, |b| {
            b.iter(|| {
                for mol in black_box(&mols) {
                    let _ = fingerprint(mol, format);
                }
            })
        });
    }
    let fps: Vec<_> = mols.iter().filter_map(|m| fingerprint(m, "ecfp4").ok()).collect();
    group.bench_function("tanimoto_all_pairs", |b| {
        b.iter(|| {
            let mut total = 0.0;
            for a in &fps {
                for q in &fps {
                    total += tanimoto(a, q);
                }
            }
            black_box(total)
        })
    });
    group.finish();
}

fn bench_descriptors(c: &mut Criterion) {
    let mut group = c.benchmark_group("descriptors");
    group.sample_size(10);

    let mut aspirin = parse_smiles("CC(=O)Oc1ccccc1C(=O)O").unwrap();
    group.bench_function("embed_3d_aspirin", |b| {
        b.iter(|| {
            let mut mol = aspirin.clone();
            embed_3d(&mut mol, ForceField::Mmff94, 200).unwrap();
            black_box(mol)
        })
    });

    embed_3d(&mut aspirin, ForceField::Mmff94, 200).unwrap();
    let coords = aspirin.coordinates();
    let radii: Vec<f64> = aspirin.atoms.iter().map(|a| vdw_radius(a.atomic_number)).collect();

    group.bench_function("convex_hull", |b| b.iter(|| convex_hull_volume(black_box(&coords))));
    group.bench_function("monte_carlo_volume", |b| {
        let config = MonteCarloConfig::new(42);
        b.iter(|| monte_carlo_volume(black_box(&coords), &radii, &config))
    });
    group.bench_function("solubility", |b| b.iter(|| solubility(black_box(&aspirin), true)));
    group.bench_function("spectrophore", |b| b.iter(|| spectrophore(black_box(&aspirin))));
    group.finish();
}

criterion_group!(benches, bench_parse, bench_identifiers, bench_fingerprints, bench_descriptors);
criterion_main!(benches);

#![no_main]
use libfuzzer_sys::fuzz_target;
use marsi_chem::{parse, InputFormat};

fuzz_target!(|data: &str| {
    let _ = parse(data, InputFormat::Smiles);
    let _ = parse(data, InputFormat::Inchi);
    let _ = parse(data, InputFormat::Mol);
});

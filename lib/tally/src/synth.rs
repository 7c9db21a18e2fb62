//! Synthetic `city_code,temperature` datasets with an explicit seed.

use crate::constants::{DEFAULT_KEY_COLUMN, DEFAULT_VALUE_COLUMN};
use crate::error::{PipelineError, Result};
use crate::io::ensure_dir;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CITY_CODES: [&str; 10] = ["LAX", "JFK", "ORD", "LHR", "CDG", "HND", "DXB", "ATL", "PEK", "SYD"];
pub const MIN_TEMPERATURE: f64 = -10.0;
pub const MAX_TEMPERATURE: f64 = 35.0;

pub const DEFAULT_SAMPLES: usize = 100_000;
pub const DEFAULT_FILES: usize = 1000;
pub const DEFAULT_SEED: u64 = 42;

const NAME_LEN: usize = 8;

/// Writes `n_samples` rows drawn from `seed` to `path`.
pub fn generate_file(path: &Path, n_samples: usize, seed: u64) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let file = File::create(path).map_err(|e| PipelineError::output_write(path, e))?;
    let mut w = BufWriter::new(file);
    write_samples(&mut w, n_samples, &mut rng).map_err(|e| PipelineError::output_write(path, e))
}

fn write_samples<W: Write>(w: &mut W, n_samples: usize, rng: &mut StdRng) -> std::io::Result<()> {
    writeln!(w, "{DEFAULT_KEY_COLUMN},{DEFAULT_VALUE_COLUMN}")?;
    for _ in 0..n_samples {
        let city = CITY_CODES.choose(rng).copied().unwrap_or(CITY_CODES[0]);
        let temperature = (rng.gen_range(MIN_TEMPERATURE..MAX_TEMPERATURE) * 100.0).round() / 100.0;
        writeln!(w, "{city},{temperature}")?;
    }
    w.flush()
}

/// Writes `n_files` files of `n_samples` rows each into `dir`.
///
/// File names (8 lowercase letters + `.csv`) come from an RNG seeded with
/// `seed`; file `i`'s contents use `seed + i`, so the whole dataset is a pure
/// function of its arguments.
pub fn generate_dataset(dir: &Path, n_samples: usize, n_files: usize, seed: u64) -> Result<Vec<PathBuf>> {
    ensure_dir(dir).map_err(|e| PipelineError::output_write(dir, e))?;
    let mut name_rng = StdRng::seed_from_u64(seed);
    let mut used = HashSet::with_capacity(n_files);
    let mut paths = Vec::with_capacity(n_files);
    for i in 0..n_files {
        let name = loop {
            let name: String = (0..NAME_LEN).map(|_| name_rng.gen_range(b'a'..=b'z') as char).collect();
            if used.insert(name.clone()) { break name; }
        };
        let path = dir.join(format!("{name}.csv"));
        generate_file(&path, n_samples, seed.wrapping_add(i as u64))?;
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{load_batch, Schema};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_same_seed_same_dataset() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let pa = generate_dataset(a.path(), 50, 3, 7).unwrap();
        let pb = generate_dataset(b.path(), 50, 3, 7).unwrap();
        for (x, y) in pa.iter().zip(&pb) {
            assert_eq!(x.file_name(), y.file_name());
            assert_eq!(fs::read(x).unwrap(), fs::read(y).unwrap());
        }
    }

    #[test]
    fn test_files_differ_and_parse() {
        let dir = TempDir::new().unwrap();
        let paths = generate_dataset(dir.path(), 200, 2, 42).unwrap();
        assert_ne!(fs::read(&paths[0]).unwrap(), fs::read(&paths[1]).unwrap());
        let batch = load_batch(&paths[0], &Schema::default()).unwrap();
        assert_eq!(batch.len(), 200);
        for r in &batch.records {
            assert!(CITY_CODES.contains(&r.key.as_str()));
            assert!(r.value >= MIN_TEMPERATURE && r.value <= MAX_TEMPERATURE);
        }
    }
}

//! Writes a synthetic `perturb_processed.parquet` into a dataset directory.
//!
//! ```text
//! generate_sample <dataset_dir> [seed]
//! ```
//!
//! e.g. `generate_sample data/norman2019/norman` gives the Norman2019 loader
//! something to read without downloading anything.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use pertdata::data::container;
use pertdata::data::filter::{CONDITION_COLUMN, CONTROL, GENE_NAME_COLUMN};
use pertdata::data::loader::PROCESSED_STEM;
use pertdata::data::model::{AnnotatedMatrix, Frame, MetadataValue};

const GENES: [&str; 16] = [
    "KLF1", "BAK1", "CEBPE", "ETS2", "FOXA1", "SET", "MAP2K6", "CBL", "TBX3", "ZBTB10", "SLC4A1",
    "HES7", "IRF1", "JUN", "MAPK1", "UBASH3B",
];
/// Targets that are perturbed but not measured.
const UNMEASURED: [&str; 2] = ["POLR2A", "RPL3"];
const CELLS_PER_CONDITION: usize = 12;
const KNOCKDOWN: f64 = 0.15;

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut ChaCha8Rng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

fn conditions() -> Vec<String> {
    let mut conds = vec![CONTROL.to_string()];
    conds.extend(GENES[..10].iter().map(|g| format!("{g}+{CONTROL}")));
    conds.extend(GENES[..8].windows(2).map(|p| format!("{}+{}", p[0], p[1])));
    conds.extend(UNMEASURED.iter().map(|g| format!("{g}+{CONTROL}")));
    conds
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| "sample".to_string()));
    let seed: u64 = match args.next() {
        Some(s) => s.parse().with_context(|| format!("seed '{s}' is not an integer"))?,
        None => 42,
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let baseline: Vec<f64> = GENES.iter().map(|_| rng.gen_range(1.0..8.0)).collect();

    let mut x = Vec::new();
    let mut names = Vec::new();
    let mut labels = Vec::new();
    for cond in conditions() {
        let targets: Vec<&str> = cond.split('+').filter(|g| *g != CONTROL).collect();
        for _ in 0..CELLS_PER_CONDITION {
            let row: Vec<f64> = GENES
                .iter()
                .zip(&baseline)
                .map(|(gene, base)| {
                    let level = if targets.contains(gene) { base * KNOCKDOWN } else { *base };
                    gauss(&mut rng, level, 0.1 * base).max(0.0)
                })
                .collect();
            x.push(row);
            names.push(format!("cell{:05}", names.len()));
            labels.push(MetadataValue::from(cond.as_str()));
        }
    }

    let mut obs = Frame::new(names);
    obs.insert(CONDITION_COLUMN, labels)?;
    let mut var = Frame::new(GENES.iter().map(|g| format!("ENSG_{g}")).collect());
    var.insert(
        GENE_NAME_COLUMN,
        GENES.iter().map(|g| MetadataValue::from(*g)).collect(),
    )?;
    let adata = AnnotatedMatrix::new(x, obs, var)?;

    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let path = out_dir.join(format!("{PROCESSED_STEM}.parquet"));
    container::write(&adata, &path)?;

    info!(
        "wrote {} cells ({} genes) to {}",
        adata.n_obs(),
        adata.n_vars(),
        path.display()
    );
    Ok(())
}

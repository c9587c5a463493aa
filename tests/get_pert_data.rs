use std::path::Path;

use pertdata::data::container;
use pertdata::data::filter::{CONDITION_COLUMN, GENE_NAME_COLUMN};
use pertdata::data::model::{AnnotatedMatrix, Frame, MetadataValue};
use pertdata::{get_pert_data, Dataset, LoadOptions, PertDataError, SplitSet};

fn write_processed(dir: &Path, conditions: &[&str], genes: &[&str]) {
    let mut obs = Frame::new((0..conditions.len()).map(|i| format!("cell{i}")).collect());
    obs.insert(
        CONDITION_COLUMN,
        conditions.iter().map(|c| MetadataValue::from(*c)).collect(),
    )
    .unwrap();
    let mut var = Frame::new(genes.iter().map(|g| g.to_lowercase()).collect());
    var.insert(
        GENE_NAME_COLUMN,
        genes.iter().map(|g| MetadataValue::from(*g)).collect(),
    )
    .unwrap();
    let x = (0..conditions.len())
        .map(|i| genes.iter().enumerate().map(|(j, _)| (i * j) as f64).collect::<Vec<f64>>())
        .collect();
    let adata = AnnotatedMatrix::new(x, obs, var).unwrap();
    std::fs::create_dir_all(dir).unwrap();
    container::write(&adata, &dir.join("perturb_processed.parquet")).unwrap();
}

const NORMAN_CONDITIONS: [&str; 10] = [
    "ctrl",
    "KLF1+ctrl",
    "BAK1+ctrl",
    "CEBPE+ctrl",
    "ETS2+ctrl",
    "KLF1+BAK1",
    "CEBPE+ETS2",
    "ctrl",
    "KLF1+ctrl",
    "SET+ctrl",
];

#[test]
fn norman_split_is_stable_across_calls() {
    let root = tempfile::tempdir().unwrap();
    write_processed(
        &root.path().join("norman2019/norman"),
        &NORMAN_CONDITIONS,
        &["KLF1", "BAK1", "CEBPE", "ETS2", "SET"],
    );
    let opts = LoadOptions::from_kwargs(serde_json::json!({
        "data_dir": root.path().to_str().unwrap()
    }))
    .unwrap();

    let first = get_pert_data("Norman2019", 7, &opts).unwrap();
    let cache = Dataset::Norman2019.cache_path(root.path(), 7);
    let bytes = std::fs::read(&cache).unwrap();

    let second = get_pert_data("Norman2019", 7, &opts).unwrap();
    assert_eq!(std::fs::read(&cache).unwrap(), bytes);
    assert_eq!(first.cell_splits(), second.cell_splits());
    assert_eq!(first, second);

    // Cells of one condition share a set.
    let splits = first.cell_splits();
    assert_eq!(splits[1], splits[8]);
    assert_eq!(splits[0], Some(SplitSet::Train));
}

#[test]
fn replogle_rpe1_drops_unmeasured_targets() {
    let root = tempfile::tempdir().unwrap();
    write_processed(
        &root.path().join("replogle_rpe1_2022/replogle_rpe1_essential"),
        &["ctrl", "geneA", "geneB+geneC", "geneX"],
        &["geneA", "geneB", "geneC"],
    );
    let opts = LoadOptions::with_data_dir(root.path());

    let pd = get_pert_data("ReplogleRPE1", 0, &opts).unwrap();
    assert_eq!(
        pd.adata.obs.str_column(CONDITION_COLUMN).unwrap(),
        vec![Some("ctrl"), Some("geneA"), Some("geneB+geneC")]
    );
}

#[test]
fn missing_dataset_is_an_upstream_error() {
    let root = tempfile::tempdir().unwrap();
    let err = get_pert_data("Adamson2016", 0, &LoadOptions::with_data_dir(root.path())).unwrap_err();
    assert!(matches!(err, PertDataError::Upstream(_)));
    assert!(root.path().join("adamson2016").is_dir());
}

#[test]
fn unknown_identifier_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let data_dir = root.path().join("data");
    let err = get_pert_data("NotARealDataset", 0, &LoadOptions::with_data_dir(&data_dir)).unwrap_err();
    assert!(matches!(err, PertDataError::UnsupportedDataset(ref id) if id == "NotARealDataset"));
    assert!(!data_dir.exists());
}

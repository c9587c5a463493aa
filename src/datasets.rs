//! Per-dataset loaders and the identifier dispatch.
//!
//! Every loader runs the same recipe:
//!
//! ```text
//!  <data_dir>/<subdir>/             create if missing
//!        │
//!        ▼
//!   PertData::new(context)          bind the handle
//!        │
//!        ▼
//!   load / new_data_process         via the PerturbationSource
//!        │
//!        ▼
//!   prepare_split(simulation, seed)
//!        │
//!        ▼
//!   <stem>_<seed>.parquet           write on first run, restore afterwards
//!        │
//!        ▼
//!   out-of-panel filter             Replogle cell lines only
//! ```
//!
//! Sources do not keep split labels in the matrix they hand back when they
//! restore a split they computed before, so the cache file is the only
//! reliable record of a seed's partition. Once it exists, it replaces the
//! freshly computed matrix.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};

use crate::data::filter::discard_out_of_panel;
use crate::data::loader;
use crate::error::{PertDataError, Result};
use crate::options::LoadOptions;
use crate::pert_data::PertData;
use crate::source::{LocalSource, PerturbationSource};
use crate::split::SplitKind;

/// Extension of the per-seed cache files.
pub const CACHE_EXTENSION: &str = "parquet";

// ---------------------------------------------------------------------------
// Dataset identifiers
// ---------------------------------------------------------------------------

/// The supported datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Norman2019,
    Adamson2016,
    Dixit2016,
    ReplogleK562,
    ReplogleK562V2,
    ReplogleK562V3,
    ReplogleRpe1,
    Joung2023,
    Joung2023V2,
}

impl Dataset {
    pub const ALL: [Dataset; 9] = [
        Dataset::Norman2019,
        Dataset::Adamson2016,
        Dataset::Dixit2016,
        Dataset::ReplogleK562,
        Dataset::ReplogleK562V2,
        Dataset::ReplogleK562V3,
        Dataset::ReplogleRpe1,
        Dataset::Joung2023,
        Dataset::Joung2023V2,
    ];

    /// Identifier accepted by [`get_pert_data`].
    pub fn as_str(self) -> &'static str {
        self.recipe().id
    }

    fn recipe(self) -> &'static Recipe {
        match self {
            Dataset::Norman2019 => &NORMAN_2019,
            Dataset::Adamson2016 => &ADAMSON_2016,
            Dataset::Dixit2016 => &DIXIT_2016,
            Dataset::ReplogleK562 => &REPLOGLE_K562,
            Dataset::ReplogleK562V2 => &REPLOGLE_K562_V2,
            Dataset::ReplogleK562V3 => &REPLOGLE_K562_V3,
            Dataset::ReplogleRpe1 => &REPLOGLE_RPE1,
            Dataset::Joung2023 => &JOUNG_2023,
            Dataset::Joung2023V2 => &JOUNG_2023_V2,
        }
    }

    /// Cache file of this dataset for `seed` under `data_dir`.
    pub fn cache_path(self, data_dir: &Path, seed: u64) -> PathBuf {
        self.recipe().cache_path(data_dir, seed)
    }

    /// Load the dataset through `source` and split it with `seed`.
    pub fn load(self, source: &dyn PerturbationSource, seed: u64, options: &LoadOptions) -> Result<PertData> {
        run_recipe(self.recipe(), source, seed, options)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = PertDataError;

    fn from_str(s: &str) -> Result<Self> {
        Dataset::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| PertDataError::UnsupportedDataset(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Recipes
// ---------------------------------------------------------------------------

/// Directory the handle is bound to, relative to the dataset directory `d`.
#[derive(Debug, Clone, Copy)]
enum Context {
    /// `d` followed by the `suffix` option.
    Suffixed,
    /// `d` itself.
    Dataset,
    /// `d/<data_name>`.
    Named,
}

/// How the raw data reaches the handle.
#[derive(Debug, Clone, Copy)]
enum Raw {
    /// `load(data_name, path)` with a fixed symbolic path.
    Symbolic { data_name: &'static str, data_path: &'static str },
    /// `load(data_name, d)`.
    InDataset { data_name: &'static str },
    /// `load(data_name, d/<data_name>)`.
    Named { data_name: &'static str },
    /// Symbolic path until the seed cache exists, `d/<data_name>` after.
    // TODO: confirm the routed path is still needed once the seed cache exists;
    // it was added for a downstream consumer that re-derives these datasets.
    CacheRouted { data_name: &'static str, data_path: &'static str },
    /// Read `d/perturb_processed.*` and register it as `dataset_name`.
    Process { dataset_name: &'static str },
}

#[derive(Debug)]
struct Recipe {
    id: &'static str,
    subdir: &'static str,
    cache_stem: &'static str,
    context: Context,
    raw: Raw,
    /// Offers the out-of-panel filter.
    panel_filter: bool,
    /// Clears the handle's dataset name after splitting.
    anonymous: bool,
}

impl Recipe {
    fn dataset_dir(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.subdir)
    }

    fn cache_path(&self, data_dir: &Path, seed: u64) -> PathBuf {
        self.dataset_dir(data_dir)
            .join(format!("{}_{seed}.{CACHE_EXTENSION}", self.cache_stem))
    }

    fn accepts_suffix(&self) -> bool {
        matches!(self.context, Context::Suffixed)
    }

    /// Reject options this loader does not take.
    fn check_options(&self, options: &LoadOptions) -> Result<()> {
        if options.suffix.is_some() && !self.accepts_suffix() {
            return Err(PertDataError::InvalidArgument(format!(
                "{} does not accept option `suffix`",
                self.id
            )));
        }
        if options.discard_perts_not_in_var.is_some() && !self.panel_filter {
            return Err(PertDataError::InvalidArgument(format!(
                "{} does not accept option `discard_perts_not_in_var`",
                self.id
            )));
        }
        Ok(())
    }

    fn context_dir(&self, dir: &Path, options: &LoadOptions) -> PathBuf {
        match self.context {
            Context::Suffixed => {
                let mut name = dir.as_os_str().to_owned();
                name.push(options.suffix());
                PathBuf::from(name)
            }
            Context::Dataset => dir.to_path_buf(),
            Context::Named => dir.join(self.raw.name()),
        }
    }
}

impl Raw {
    fn name(self) -> &'static str {
        match self {
            Raw::Symbolic { data_name, .. }
            | Raw::InDataset { data_name }
            | Raw::Named { data_name }
            | Raw::CacheRouted { data_name, .. } => data_name,
            Raw::Process { dataset_name } => dataset_name,
        }
    }
}

static NORMAN_2019: Recipe = Recipe {
    id: "Norman2019",
    subdir: "norman2019",
    cache_stem: "norman2019",
    context: Context::Suffixed,
    raw: Raw::Symbolic { data_name: "norman", data_path: "norman2019" },
    panel_filter: false,
    anonymous: false,
};

static ADAMSON_2016: Recipe = Recipe {
    id: "Adamson2016",
    subdir: "adamson2016",
    cache_stem: "adamson2016",
    context: Context::Suffixed,
    raw: Raw::Symbolic { data_name: "adamson", data_path: "adamson2016" },
    panel_filter: false,
    anonymous: false,
};

static DIXIT_2016: Recipe = Recipe {
    id: "Dixit2016",
    subdir: "dixit2016",
    cache_stem: "dixit2016",
    context: Context::Suffixed,
    raw: Raw::Symbolic { data_name: "dixit", data_path: "dixit2016" },
    panel_filter: false,
    anonymous: false,
};

static REPLOGLE_K562: Recipe = Recipe {
    id: "ReplogleK562",
    subdir: "replogle_k562_2022",
    cache_stem: "replogle_k562_2022",
    context: Context::Suffixed,
    raw: Raw::CacheRouted {
        data_name: "replogle_k562_essential",
        data_path: "replogle_k562_2022",
    },
    panel_filter: true,
    anonymous: false,
};

static REPLOGLE_K562_V2: Recipe = Recipe {
    id: "ReplogleK562_v2",
    subdir: "replogle_k562_v2_2022",
    cache_stem: "replogle_k562_v2_2022",
    context: Context::Dataset,
    raw: Raw::InDataset { data_name: "replogle_k562_v2_2022" },
    panel_filter: false,
    anonymous: false,
};

static REPLOGLE_K562_V3: Recipe = Recipe {
    id: "ReplogleK562_v3",
    subdir: "replogle_k562_v3_2022",
    cache_stem: "replogle_k562_v3_2022",
    context: Context::Named,
    raw: Raw::Named { data_name: "k562" },
    panel_filter: false,
    anonymous: true,
};

/// K562 as preprocessed for scGPT; shares its directory with v3.
static REPLOGLE_K562_SCGPT: Recipe = Recipe {
    id: "ReplogleK562_v2_scgpt",
    subdir: "replogle_k562_v3_2022",
    cache_stem: "replogle_k562_v3_2022",
    context: Context::Named,
    raw: Raw::Named { data_name: "K562_1900_100" },
    panel_filter: false,
    anonymous: false,
};

static REPLOGLE_RPE1: Recipe = Recipe {
    id: "ReplogleRPE1",
    subdir: "replogle_rpe1_2022",
    cache_stem: "replogle_rpe1_2022",
    context: Context::Suffixed,
    raw: Raw::CacheRouted {
        data_name: "replogle_rpe1_essential",
        data_path: "replogle_rpe1_2022",
    },
    panel_filter: true,
    anonymous: false,
};

static JOUNG_2023: Recipe = Recipe {
    id: "Joung2023",
    subdir: "joung2023",
    cache_stem: "joung2023",
    context: Context::Dataset,
    raw: Raw::InDataset { data_name: "joung" },
    panel_filter: false,
    anonymous: false,
};

static JOUNG_2023_V2: Recipe = Recipe {
    id: "Joung2023_v2",
    subdir: "joung_v2_2023",
    cache_stem: "joung2023_v2",
    context: Context::Dataset,
    raw: Raw::Process { dataset_name: "joung_v2" },
    panel_filter: false,
    anonymous: false,
};

// ---------------------------------------------------------------------------
// The shared procedure
// ---------------------------------------------------------------------------

fn run_recipe(
    recipe: &Recipe,
    source: &dyn PerturbationSource,
    seed: u64,
    options: &LoadOptions,
) -> Result<PertData> {
    recipe.check_options(options)?;

    let dir = recipe.dataset_dir(&options.data_dir);
    let cache = recipe.cache_path(&options.data_dir, seed);
    std::fs::create_dir_all(&dir).map_err(|err| PertDataError::Io {
        path: dir.clone(),
        source: err,
    })?;

    let mut pert_data = PertData::new(recipe.context_dir(&dir, options))?;
    match recipe.raw {
        Raw::Symbolic { data_name, data_path } => pert_data.load(source, data_name, data_path)?,
        Raw::InDataset { data_name } => pert_data.load(source, data_name, &dir)?,
        Raw::Named { data_name } => pert_data.load(source, data_name, dir.join(data_name))?,
        Raw::CacheRouted { data_name, data_path } => {
            let path = if cache.exists() {
                dir.join(data_name)
            } else {
                PathBuf::from(data_path)
            };
            debug!("{}: loading '{data_name}' from {}", recipe.id, path.display());
            pert_data.load(source, data_name, path)?
        }
        Raw::Process { dataset_name } => {
            let raw = loader::find_processed(&dir)
                .and_then(|file| loader::load_file(&file))?;
            pert_data.new_data_process(source, dataset_name, raw)?
        }
    }

    pert_data.prepare_split(source, SplitKind::Simulation, seed)?;
    if recipe.anonymous {
        pert_data.dataset_name.clear();
    }

    if cache.exists() {
        info!("{}: restoring seed {seed} split from {}", recipe.id, cache.display());
        pert_data.restore_cache(&cache)?;
    } else {
        info!("{}: caching seed {seed} split to {}", recipe.id, cache.display());
        pert_data.write_cache(&cache)?;
    }

    if recipe.panel_filter && options.discard_perts_not_in_var() {
        // TODO: check whether preprocessing itself can leave perturbations
        // outside the gene panel; if not, this filter is a no-op.
        pert_data.adata = discard_out_of_panel(&pert_data.adata)?;
    }

    Ok(pert_data)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Load `dataset` split with `seed`, reading data through [`LocalSource`].
///
/// Fails with [`PertDataError::UnsupportedDataset`] before touching the
/// filesystem when the identifier is unknown.
pub fn get_pert_data(dataset: &str, seed: u64, options: &LoadOptions) -> Result<PertData> {
    get_pert_data_with(&LocalSource, dataset, seed, options)
}

/// Like [`get_pert_data`] with an explicit source.
pub fn get_pert_data_with(
    source: &dyn PerturbationSource,
    dataset: &str,
    seed: u64,
    options: &LoadOptions,
) -> Result<PertData> {
    let dataset: Dataset = dataset.parse()?;
    dataset.load(source, seed, options)
}

pub fn norman2019(seed: u64, options: &LoadOptions) -> Result<PertData> {
    Dataset::Norman2019.load(&LocalSource, seed, options)
}

pub fn adamson2016(seed: u64, options: &LoadOptions) -> Result<PertData> {
    Dataset::Adamson2016.load(&LocalSource, seed, options)
}

pub fn dixit2016(seed: u64, options: &LoadOptions) -> Result<PertData> {
    Dataset::Dixit2016.load(&LocalSource, seed, options)
}

pub fn replogle_k562_2022(seed: u64, options: &LoadOptions) -> Result<PertData> {
    Dataset::ReplogleK562.load(&LocalSource, seed, options)
}

pub fn replogle_k562_2022_v2(seed: u64, options: &LoadOptions) -> Result<PertData> {
    Dataset::ReplogleK562V2.load(&LocalSource, seed, options)
}

pub fn replogle_k562_2022_v3(seed: u64, options: &LoadOptions) -> Result<PertData> {
    Dataset::ReplogleK562V3.load(&LocalSource, seed, options)
}

/// K562 in the scGPT preprocessing (`K562_1900_100`). Not reachable by
/// identifier; it writes to the same cache files as `ReplogleK562_v3`.
pub fn replogle_k562_2022_v2_scgpt_processing(seed: u64, options: &LoadOptions) -> Result<PertData> {
    run_recipe(&REPLOGLE_K562_SCGPT, &LocalSource, seed, options)
}

pub fn replogle_rpe1_2022(seed: u64, options: &LoadOptions) -> Result<PertData> {
    Dataset::ReplogleRpe1.load(&LocalSource, seed, options)
}

pub fn joung2023(seed: u64, options: &LoadOptions) -> Result<PertData> {
    Dataset::Joung2023.load(&LocalSource, seed, options)
}

pub fn joung2023_v2(seed: u64, options: &LoadOptions) -> Result<PertData> {
    Dataset::Joung2023V2.load(&LocalSource, seed, options)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::data::filter::{CONDITION_COLUMN, GENE_NAME_COLUMN};
    use crate::data::model::{AnnotatedMatrix, Frame, MetadataValue};
    use crate::split::{SplitAssignment, SplitSet};

    /// Serves a fixed matrix and a split that changes on every call.
    #[derive(Default)]
    struct Scripted {
        loads: RefCell<Vec<(PathBuf, String, PathBuf)>>,
        splits: RefCell<u64>,
    }

    const CONDITIONS: [&str; 6] = ["ctrl", "geneA", "geneB+geneC", "geneX", "ctrl", "geneX+geneA"];

    fn matrix() -> AnnotatedMatrix {
        let mut obs = Frame::new((0..CONDITIONS.len()).map(|i| format!("cell{i}")).collect());
        obs.insert(
            CONDITION_COLUMN,
            CONDITIONS.iter().map(|c| MetadataValue::from(*c)).collect(),
        )
        .unwrap();
        let genes = ["geneA", "geneB", "geneC"];
        let mut var = Frame::new(genes.iter().map(|g| format!("ENSG_{g}")).collect());
        var.insert(
            GENE_NAME_COLUMN,
            genes.iter().map(|g| MetadataValue::from(*g)).collect(),
        )
        .unwrap();
        let x = (0..CONDITIONS.len()).map(|i| vec![i as f64, 0.5, 1.0]).collect();
        AnnotatedMatrix::new(x, obs, var).unwrap()
    }

    impl PerturbationSource for Scripted {
        fn load(&self, context: &Path, data_name: &str, data_path: &Path) -> anyhow::Result<AnnotatedMatrix> {
            self.loads.borrow_mut().push((
                context.to_path_buf(),
                data_name.to_string(),
                data_path.to_path_buf(),
            ));
            Ok(matrix())
        }

        fn new_data_process(
            &self,
            _context: &Path,
            _dataset_name: &str,
            adata: AnnotatedMatrix,
        ) -> anyhow::Result<AnnotatedMatrix> {
            Ok(adata)
        }

        fn prepare_split(&self, adata: &AnnotatedMatrix, _kind: SplitKind, seed: u64) -> anyhow::Result<SplitAssignment> {
            let mut calls = self.splits.borrow_mut();
            *calls += 1;
            let conditions = crate::split::conditions(adata)?;
            let rotate = (seed + *calls) as usize;
            let mut assignment = SplitAssignment::new();
            for (i, cond) in conditions.into_iter().enumerate() {
                let set = [SplitSet::Train, SplitSet::Val, SplitSet::Test][(i + rotate) % 3];
                assignment.entry(set).or_default().push(cond);
            }
            Ok(assignment)
        }
    }

    struct Failing;

    impl PerturbationSource for Failing {
        fn load(&self, _: &Path, data_name: &str, _: &Path) -> anyhow::Result<AnnotatedMatrix> {
            anyhow::bail!("network unreachable while fetching {data_name}")
        }

        fn new_data_process(&self, _: &Path, _: &str, adata: AnnotatedMatrix) -> anyhow::Result<AnnotatedMatrix> {
            Ok(adata)
        }

        fn prepare_split(&self, _: &AnnotatedMatrix, _: SplitKind, _: u64) -> anyhow::Result<SplitAssignment> {
            Ok(SplitAssignment::new())
        }
    }

    #[test]
    fn identifiers_round_trip() {
        for d in Dataset::ALL {
            assert_eq!(d.to_string().parse::<Dataset>().unwrap(), d);
        }
        assert_eq!("ReplogleK562_v2".parse::<Dataset>().unwrap(), Dataset::ReplogleK562V2);
        assert_eq!("Joung2023_v2".parse::<Dataset>().unwrap(), Dataset::Joung2023V2);
    }

    #[test]
    fn unsupported_dataset_fails_without_io() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("never-created");
        let source = Scripted::default();
        let err = get_pert_data_with(&source, "NotARealDataset", 0, &LoadOptions::with_data_dir(&data_dir))
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(err.to_string(), "Dataset NotARealDataset not supported");
        assert!(!data_dir.exists());
        assert!(source.loads.borrow().is_empty());
    }

    #[test]
    fn cache_is_written_once_and_wins_afterwards() {
        let dir = tempfile::tempdir().unwrap();
        let opts = LoadOptions::with_data_dir(dir.path());
        let source = Scripted::default();

        let first = Dataset::Norman2019.load(&source, 3, &opts).unwrap();
        let cache = Dataset::Norman2019.cache_path(dir.path(), 3);
        assert_eq!(cache, dir.path().join("norman2019/norman2019_3.parquet"));
        let written = std::fs::read(&cache).unwrap();

        let second = Dataset::Norman2019.load(&source, 3, &opts).unwrap();
        assert_eq!(*source.splits.borrow(), 2);
        assert_eq!(second.cell_splits(), first.cell_splits());
        assert_eq!(second.set2conditions, first.set2conditions);
        assert_eq!(second.adata, first.adata);
        assert_eq!(std::fs::read(&cache).unwrap(), written);
    }

    /// Serves `matrix()` with condition lists in reverse order.
    struct Descending;

    impl PerturbationSource for Descending {
        fn load(&self, _: &Path, _: &str, _: &Path) -> anyhow::Result<AnnotatedMatrix> {
            Ok(matrix())
        }

        fn new_data_process(&self, _: &Path, _: &str, adata: AnnotatedMatrix) -> anyhow::Result<AnnotatedMatrix> {
            Ok(adata)
        }

        fn prepare_split(&self, _: &AnnotatedMatrix, _: SplitKind, _: u64) -> anyhow::Result<SplitAssignment> {
            let mut assignment = SplitAssignment::new();
            assignment.insert(SplitSet::Train, vec!["geneX".into(), "geneA".into(), "ctrl".into()]);
            assignment.insert(SplitSet::Val, vec!["geneX+geneA".into()]);
            assignment.insert(SplitSet::Test, vec!["geneB+geneC".into()]);
            Ok(assignment)
        }
    }

    #[test]
    fn unordered_condition_lists_are_cached_with_every_label() {
        let dir = tempfile::tempdir().unwrap();
        let opts = LoadOptions::with_data_dir(dir.path());

        let first = Dataset::Norman2019.load(&Descending, 0, &opts).unwrap();
        let expected = vec![
            Some(SplitSet::Train),
            Some(SplitSet::Train),
            Some(SplitSet::Test),
            Some(SplitSet::Train),
            Some(SplitSet::Train),
            Some(SplitSet::Val),
        ];
        assert_eq!(first.cell_splits(), expected);

        let second = Dataset::Norman2019.load(&Descending, 0, &opts).unwrap();
        assert_eq!(second.cell_splits(), expected);
        assert_eq!(second.set2conditions[&SplitSet::Train], vec!["ctrl", "geneA", "geneX"]);
    }

    #[test]
    fn seeds_get_separate_cache_files() {
        let dir = tempfile::tempdir().unwrap();
        let opts = LoadOptions::with_data_dir(dir.path());
        let source = Scripted::default();
        Dataset::Adamson2016.load(&source, 1, &opts).unwrap();
        Dataset::Adamson2016.load(&source, 2, &opts).unwrap();
        assert!(dir.path().join("adamson2016/adamson2016_1.parquet").is_file());
        assert!(dir.path().join("adamson2016/adamson2016_2.parquet").is_file());
    }

    #[test]
    fn existing_directory_and_unrelated_files_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let dataset_dir = dir.path().join("dixit2016");
        std::fs::create_dir_all(&dataset_dir).unwrap();
        let notes = dataset_dir.join("notes.txt");
        std::fs::write(&notes, "keep me").unwrap();

        Dataset::Dixit2016
            .load(&Scripted::default(), 0, &LoadOptions::with_data_dir(dir.path()))
            .unwrap();
        assert_eq!(std::fs::read_to_string(&notes).unwrap(), "keep me");
    }

    #[test]
    fn dispatch_matches_direct_loader() {
        let via_dispatch = tempfile::tempdir().unwrap();
        let direct = tempfile::tempdir().unwrap();

        let a = get_pert_data_with(
            &Scripted::default(),
            "Joung2023",
            5,
            &LoadOptions::with_data_dir(via_dispatch.path()),
        )
        .unwrap();
        let b = Dataset::Joung2023
            .load(&Scripted::default(), 5, &LoadOptions::with_data_dir(direct.path()))
            .unwrap();
        assert_eq!(a.adata, b.adata);
        assert_eq!(a.set2conditions, b.set2conditions);
        assert_eq!(a.dataset_name, b.dataset_name);
    }

    #[test]
    fn replogle_filters_out_of_panel_cells_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let pd = Dataset::ReplogleK562
            .load(&Scripted::default(), 0, &LoadOptions::with_data_dir(dir.path()))
            .unwrap();
        assert_eq!(
            pd.adata.obs.str_column(CONDITION_COLUMN).unwrap(),
            vec![Some("ctrl"), Some("geneA"), Some("geneB+geneC"), Some("ctrl")]
        );

        // The cache keeps every cell; only the returned handle is filtered.
        let cached = crate::data::container::read(&Dataset::ReplogleK562.cache_path(dir.path(), 0)).unwrap();
        assert_eq!(cached.n_obs(), CONDITIONS.len());
    }

    #[test]
    fn replogle_filter_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let opts = LoadOptions {
            discard_perts_not_in_var: Some(false),
            ..LoadOptions::with_data_dir(dir.path())
        };
        let pd = Dataset::ReplogleRpe1.load(&Scripted::default(), 0, &opts).unwrap();
        assert_eq!(pd.len(), CONDITIONS.len());
    }

    #[test]
    fn replogle_load_path_switches_once_cached() {
        let dir = tempfile::tempdir().unwrap();
        let opts = LoadOptions::with_data_dir(dir.path());
        let source = Scripted::default();
        Dataset::ReplogleK562.load(&source, 0, &opts).unwrap();
        Dataset::ReplogleK562.load(&source, 0, &opts).unwrap();

        let loads = source.loads.borrow();
        let dataset_dir = dir.path().join("replogle_k562_2022");
        assert_eq!(loads[0].1, "replogle_k562_essential");
        assert_eq!(loads[0].2, PathBuf::from("replogle_k562_2022"));
        assert_eq!(loads[1].2, dataset_dir.join("replogle_k562_essential"));
        assert_eq!(loads[0].0, dataset_dir);
    }

    #[test]
    fn suffix_extends_the_context_directory() {
        let dir = tempfile::tempdir().unwrap();
        let opts = LoadOptions {
            suffix: Some("_gears".into()),
            ..LoadOptions::with_data_dir(dir.path())
        };
        let source = Scripted::default();
        let pd = Dataset::Norman2019.load(&source, 0, &opts).unwrap();
        assert_eq!(pd.data_path, dir.path().join("norman2019_gears"));
        assert!(pd.data_path.is_dir());
        assert!(dir.path().join("norman2019/norman2019_0.parquet").is_file());
        assert_eq!(source.loads.borrow()[0].2, PathBuf::from("norman2019"));
    }

    #[test]
    fn unaccepted_options_are_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let opts = LoadOptions {
            suffix: Some("_x".into()),
            ..LoadOptions::with_data_dir(&data_dir)
        };
        let err = Dataset::Joung2023.load(&Scripted::default(), 0, &opts).unwrap_err();
        assert!(matches!(err, PertDataError::InvalidArgument(_)));

        let opts = LoadOptions {
            discard_perts_not_in_var: Some(true),
            ..LoadOptions::with_data_dir(&data_dir)
        };
        assert!(Dataset::Norman2019.load(&Scripted::default(), 0, &opts).is_err());
        assert!(!data_dir.exists());
    }

    #[test]
    fn v3_binds_to_named_directory_and_clears_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = Scripted::default();
        let pd = Dataset::ReplogleK562V3
            .load(&source, 0, &LoadOptions::with_data_dir(dir.path()))
            .unwrap();
        let named = dir.path().join("replogle_k562_v3_2022/k562");
        assert_eq!(pd.data_path, named);
        assert_eq!(pd.dataset_name, "");
        assert_eq!(source.loads.borrow()[0].2, named);
    }

    #[test]
    fn joung_v2_processes_the_raw_file() {
        let dir = tempfile::tempdir().unwrap();
        let dataset_dir = dir.path().join("joung_v2_2023");
        std::fs::create_dir_all(&dataset_dir).unwrap();
        crate::data::container::write(&matrix(), &dataset_dir.join("perturb_processed.parquet")).unwrap();

        let source = Scripted::default();
        let pd = Dataset::Joung2023V2
            .load(&source, 2, &LoadOptions::with_data_dir(dir.path()))
            .unwrap();
        assert!(source.loads.borrow().is_empty());
        assert_eq!(pd.dataset_name, "joung_v2");
        assert_eq!(pd.len(), CONDITIONS.len());
        assert!(dataset_dir.join("joung2023_v2_2.parquet").is_file());
    }

    #[test]
    fn upstream_failures_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let opts = LoadOptions::with_data_dir(dir.path());
        let err = Dataset::Adamson2016.load(&Failing, 0, &opts).unwrap_err();
        assert!(matches!(err, PertDataError::Upstream(_)));
        assert!(err.to_string().contains("network unreachable"));
        assert!(!Dataset::Adamson2016.cache_path(dir.path(), 0).exists());
    }

    #[test]
    fn corrupt_cache_is_not_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let opts = LoadOptions::with_data_dir(dir.path());
        let cache = Dataset::Dixit2016.cache_path(dir.path(), 9);
        std::fs::create_dir_all(cache.parent().unwrap()).unwrap();
        std::fs::write(&cache, b"not a container").unwrap();

        let err = Dataset::Dixit2016.load(&Scripted::default(), 9, &opts).unwrap_err();
        assert!(matches!(err, PertDataError::Cache { .. }));
        assert_eq!(std::fs::read(&cache).unwrap(), b"not a container");
    }
}

use std::path::{Path, PathBuf};

use log::info;

use crate::data::container;
use crate::data::model::AnnotatedMatrix;
use crate::error::{PertDataError, Result};
use crate::source::PerturbationSource;
use crate::split::{self, SplitAssignment, SplitKind, SplitSet, SPLIT_COLUMN};

/// A loaded perturbation dataset together with its seeded split.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PertData {
    /// Directory the handle is bound to.
    pub data_path: PathBuf,
    /// Name the dataset was loaded or processed under.
    pub dataset_name: String,
    /// Path the dataset was requested from.
    pub dataset_path: Option<PathBuf>,
    pub adata: AnnotatedMatrix,
    pub split: Option<SplitKind>,
    pub seed: Option<u64>,
    /// Conditions of each split set.
    pub set2conditions: SplitAssignment,
}

impl PertData {
    /// Bind a new, empty handle to `data_path`, creating the directory.
    pub fn new(data_path: impl Into<PathBuf>) -> Result<Self> {
        let data_path = data_path.into();
        std::fs::create_dir_all(&data_path).map_err(|source| PertDataError::Io {
            path: data_path.clone(),
            source,
        })?;
        Ok(PertData {
            data_path,
            ..PertData::default()
        })
    }

    pub fn load(
        &mut self,
        source: &dyn PerturbationSource,
        data_name: &str,
        data_path: impl AsRef<Path>,
    ) -> Result<()> {
        let data_path = data_path.as_ref();
        self.adata = source.load(&self.data_path, data_name, data_path)?;
        self.dataset_name = data_name.to_string();
        self.dataset_path = Some(data_path.to_path_buf());
        Ok(())
    }

    pub fn new_data_process(
        &mut self,
        source: &dyn PerturbationSource,
        dataset_name: &str,
        adata: AnnotatedMatrix,
    ) -> Result<()> {
        self.adata = source.new_data_process(&self.data_path, dataset_name, adata)?;
        self.dataset_name = dataset_name.to_string();
        self.dataset_path = Some(self.data_path.join(dataset_name));
        Ok(())
    }

    /// Compute a seeded split and label every cell with its set.
    pub fn prepare_split(&mut self, source: &dyn PerturbationSource, kind: SplitKind, seed: u64) -> Result<()> {
        let assignment = source.prepare_split(&self.adata, kind, seed)?;
        let labels = split::cell_labels(&self.adata, &assignment)?;
        self.adata.obs.insert(SPLIT_COLUMN, labels)?;
        self.set2conditions = assignment;
        self.split = Some(kind);
        self.seed = Some(seed);
        Ok(())
    }

    /// Persist the matrix, split labels included, to `path`.
    ///
    /// The in-memory matrix is then normalised to the stored column types, so
    /// it equals what a later [`restore_cache`](Self::restore_cache) returns.
    pub fn write_cache(&mut self, path: &Path) -> Result<()> {
        container::write(&self.adata, path).map_err(|source| PertDataError::Cache {
            path: path.to_path_buf(),
            source,
        })?;
        container::normalize(&mut self.adata);
        info!("wrote {} cells to {}", self.adata.n_obs(), path.display());
        Ok(())
    }

    /// Replace the matrix with the one stored at `path`.
    ///
    /// The split assignment is rebuilt from the stored labels so that both
    /// halves of the handle describe the same partition.
    pub fn restore_cache(&mut self, path: &Path) -> Result<()> {
        let cache_err = |source| PertDataError::Cache {
            path: path.to_path_buf(),
            source,
        };
        let adata = container::read(path).map_err(cache_err)?;
        if let Some(assignment) = split::assignment_from_labels(&adata).map_err(cache_err)? {
            self.set2conditions = assignment;
        }
        self.adata = adata;
        info!("restored {} cells from {}", self.adata.n_obs(), path.display());
        Ok(())
    }

    /// Split set of every cell, in cell order.
    pub fn cell_splits(&self) -> Vec<Option<SplitSet>> {
        match self.adata.obs.str_column(SPLIT_COLUMN) {
            Some(labels) => labels
                .into_iter()
                .map(|l| l.and_then(|l| l.parse().ok()))
                .collect(),
            None => vec![None; self.adata.n_obs()],
        }
    }

    pub fn len(&self) -> usize {
        self.adata.n_obs()
    }

    pub fn is_empty(&self) -> bool {
        self.adata.n_obs() == 0
    }
}

//! The dataset-management collaborator behind every loader.
//!
//! Loaders only ever talk to a [`PerturbationSource`]: it turns a dataset
//! name into an annotated matrix and computes seeded splits. [`LocalSource`]
//! serves preprocessed datasets that already sit on disk.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, info};

use crate::data::container;
use crate::data::filter::{CONDITION_COLUMN, GENE_NAME_COLUMN};
use crate::data::loader::{self, PROCESSED_STEM};
use crate::data::model::{AnnotatedMatrix, MetadataValue};
use crate::split::{self, SplitAssignment, SplitKind};

pub trait PerturbationSource {
    /// Load a preprocessed dataset by name.
    ///
    /// `context` is the directory the dataset handle is bound to; `data_path`
    /// may be symbolic, the source decides how to resolve it.
    fn load(&self, context: &Path, data_name: &str, data_path: &Path) -> Result<AnnotatedMatrix>;

    /// Register a raw matrix as a new dataset called `dataset_name`.
    fn new_data_process(
        &self,
        context: &Path,
        dataset_name: &str,
        adata: AnnotatedMatrix,
    ) -> Result<AnnotatedMatrix>;

    /// Compute a seeded split over the dataset's conditions.
    ///
    /// Condition lists may be returned in any order.
    fn prepare_split(&self, adata: &AnnotatedMatrix, kind: SplitKind, seed: u64) -> Result<SplitAssignment>;
}

/// Serves datasets stored as `perturb_processed.*` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSource;

impl LocalSource {
    /// Directory a dataset is read from.
    ///
    /// `data_path` is used when it names an existing directory by location:
    /// an absolute path, a path of several components, or the context itself.
    /// A bare name such as `norman2019` is symbolic and never looked up in the
    /// working directory; it resolves to `<context>/<data_name>`.
    pub fn resolve(context: &Path, data_name: &str, data_path: &Path) -> PathBuf {
        let located = data_path.is_absolute()
            || data_path.components().count() > 1
            || data_path == context;
        if located && data_path.is_dir() {
            data_path.to_path_buf()
        } else {
            context.join(data_name)
        }
    }
}

impl PerturbationSource for LocalSource {
    fn load(&self, context: &Path, data_name: &str, data_path: &Path) -> Result<AnnotatedMatrix> {
        let dir = Self::resolve(context, data_name, data_path);
        debug!(
            "dataset '{data_name}' requested at {}, reading from {}",
            data_path.display(),
            dir.display()
        );
        let file = loader::find_processed(&dir)
            .with_context(|| format!("dataset '{data_name}' is not available locally"))?;
        let adata = loader::load_file(&file).with_context(|| format!("loading {}", file.display()))?;
        info!(
            "loaded '{data_name}': {} cells x {} genes",
            adata.n_obs(),
            adata.n_vars()
        );
        Ok(adata)
    }

    fn new_data_process(
        &self,
        context: &Path,
        dataset_name: &str,
        mut adata: AnnotatedMatrix,
    ) -> Result<AnnotatedMatrix> {
        if adata.obs.column(CONDITION_COLUMN).is_none() {
            bail!("obs of '{dataset_name}' has no '{CONDITION_COLUMN}' column");
        }
        if adata.var.column(GENE_NAME_COLUMN).is_none() {
            let names = adata
                .var
                .index
                .iter()
                .map(|g| MetadataValue::from(g.as_str()))
                .collect();
            adata.var.insert(GENE_NAME_COLUMN, names)?;
        }

        let dir = context.join(dataset_name);
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let out = dir.join(format!("{PROCESSED_STEM}.parquet"));
        container::write(&adata, &out).with_context(|| format!("writing {}", out.display()))?;
        info!("processed '{dataset_name}' into {}", out.display());
        Ok(adata)
    }

    fn prepare_split(&self, adata: &AnnotatedMatrix, kind: SplitKind, seed: u64) -> Result<SplitAssignment> {
        let conditions = split::conditions(adata)?;
        Ok(split::simulation_split(&conditions, kind, seed))
    }
}

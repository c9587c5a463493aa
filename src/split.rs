//! Seeded train/validation/test splits over perturbation conditions.
//!
//! Splits are made per *condition*, never per cell: every cell of a
//! condition lands in the same set. The simulation split holds out genes
//! first and then assigns single and combinatorial perturbations depending
//! on how many of their genes were seen during training.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::data::filter::{CONDITION_COLUMN, CONTROL};
use crate::data::model::{AnnotatedMatrix, MetadataValue};

/// obs column holding the split set of each cell.
pub const SPLIT_COLUMN: &str = "split";

/// Share of genes kept for training.
pub const TRAIN_GENE_FRACTION: f64 = 0.75;
/// Share of fully seen combinations kept for training.
pub const SEEN_COMBO_TRAIN_FRACTION: f64 = 0.75;
/// Share of training conditions moved to validation.
pub const VAL_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitKind {
    /// Hold out genes; combinations are split by how many genes were seen.
    Simulation,
    /// Like `Simulation`, but every combination is held out.
    SimulationSingle,
}

impl fmt::Display for SplitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitKind::Simulation => write!(f, "simulation"),
            SplitKind::SimulationSingle => write!(f, "simulation_single"),
        }
    }
}

impl FromStr for SplitKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simulation" => Ok(SplitKind::Simulation),
            "simulation_single" => Ok(SplitKind::SimulationSingle),
            other => bail!("unknown split kind '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SplitSet {
    Train,
    Val,
    Test,
}

impl SplitSet {
    pub fn as_str(self) -> &'static str {
        match self {
            SplitSet::Train => "train",
            SplitSet::Val => "val",
            SplitSet::Test => "test",
        }
    }
}

impl fmt::Display for SplitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitSet {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(SplitSet::Train),
            "val" => Ok(SplitSet::Val),
            "test" => Ok(SplitSet::Test),
            other => bail!("unknown split set '{other}'"),
        }
    }
}

/// Conditions of each split set. Lists may come in any order.
pub type SplitAssignment = BTreeMap<SplitSet, Vec<String>>;

/// Condition to set lookup for an assignment.
fn set_index(assignment: &SplitAssignment) -> HashMap<&str, SplitSet> {
    assignment
        .iter()
        .flat_map(|(set, conds)| conds.iter().map(move |c| (c.as_str(), *set)))
        .collect()
}

/// Look up the set a condition was assigned to.
pub fn set_of(assignment: &SplitAssignment, condition: &str) -> Option<SplitSet> {
    assignment
        .iter()
        .find(|(_, conds)| conds.iter().any(|c| c == condition))
        .map(|(set, _)| *set)
}

/// Non-control genes of a condition label.
fn genes_of(condition: &str) -> Vec<&str> {
    condition
        .split('+')
        .filter(|g| !g.is_empty() && *g != CONTROL)
        .collect()
}

fn take_count(n: usize, fraction: f64) -> usize {
    ((n as f64) * fraction).round() as usize
}

/// Seeded split of the given conditions.
pub fn simulation_split(conditions: &BTreeSet<String>, kind: SplitKind, seed: u64) -> SplitAssignment {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut genes: Vec<&str> = conditions
        .iter()
        .flat_map(|c| genes_of(c))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    genes.shuffle(&mut rng);
    let train_genes: BTreeSet<&str> = genes
        .iter()
        .take(take_count(genes.len(), TRAIN_GENE_FRACTION))
        .copied()
        .collect();

    let mut assignment: SplitAssignment = BTreeMap::new();
    let mut candidates: Vec<&str> = Vec::new();
    let mut seen_combos: Vec<&str> = Vec::new();

    for cond in conditions {
        let genes = genes_of(cond);
        let seen = genes.iter().filter(|g| train_genes.contains(*g)).count();
        match genes.len() {
            0 => assignment.entry(SplitSet::Train).or_default().push(cond.clone()),
            1 if seen == 1 => candidates.push(cond.as_str()),
            1 => assignment.entry(SplitSet::Test).or_default().push(cond.clone()),
            _ if kind == SplitKind::Simulation && seen == genes.len() => seen_combos.push(cond.as_str()),
            _ => assignment.entry(SplitSet::Test).or_default().push(cond.clone()),
        }
    }

    seen_combos.shuffle(&mut rng);
    let n_train_combos = take_count(seen_combos.len(), SEEN_COMBO_TRAIN_FRACTION);
    for (i, cond) in seen_combos.into_iter().enumerate() {
        if i < n_train_combos {
            candidates.push(cond);
        } else {
            assignment.entry(SplitSet::Test).or_default().push(cond.to_string());
        }
    }

    candidates.sort_unstable();
    candidates.shuffle(&mut rng);
    let mut n_val = take_count(candidates.len(), VAL_FRACTION);
    if n_val == 0 && candidates.len() >= 2 {
        n_val = 1;
    }
    for (i, cond) in candidates.into_iter().enumerate() {
        let set = if i < n_val { SplitSet::Val } else { SplitSet::Train };
        assignment.entry(set).or_default().push(cond.to_string());
    }

    for conds in assignment.values_mut() {
        conds.sort();
    }
    assignment
}

/// Unique condition labels of a dataset.
///
/// Missing labels are skipped; any other non-string label is an error.
pub fn conditions(adata: &AnnotatedMatrix) -> Result<BTreeSet<String>> {
    if adata.obs.column(CONDITION_COLUMN).is_none() {
        bail!("obs has no '{CONDITION_COLUMN}' column");
    }
    adata
        .obs
        .unique_values(CONDITION_COLUMN)
        .into_iter()
        .filter(|v| !matches!(v, MetadataValue::Null))
        .map(|v| match v {
            MetadataValue::String(s) => Ok(s),
            other => bail!("condition label {other} is not a string"),
        })
        .collect()
}

/// Per-cell split labels for a dataset, from a condition assignment.
pub fn cell_labels(adata: &AnnotatedMatrix, assignment: &SplitAssignment) -> Result<Vec<MetadataValue>> {
    let column = adata
        .obs
        .str_column(CONDITION_COLUMN)
        .with_context(|| format!("obs has no '{CONDITION_COLUMN}' column"))?;
    let index = set_index(assignment);
    Ok(column
        .into_iter()
        .map(|c| {
            c.and_then(|c| index.get(c))
                .map_or(MetadataValue::Null, |s| MetadataValue::from(s.as_str()))
        })
        .collect())
}

/// Rebuild a condition assignment from a dataset's `split` column.
///
/// Returns `None` when the dataset carries no split labels.
pub fn assignment_from_labels(adata: &AnnotatedMatrix) -> Result<Option<SplitAssignment>> {
    let Some(labels) = adata.obs.str_column(SPLIT_COLUMN) else {
        return Ok(None);
    };
    let conditions = adata
        .obs
        .str_column(CONDITION_COLUMN)
        .with_context(|| format!("obs has no '{CONDITION_COLUMN}' column"))?;

    let mut sets: BTreeMap<SplitSet, BTreeSet<String>> = BTreeMap::new();
    for (cond, label) in conditions.into_iter().zip(labels) {
        if let (Some(cond), Some(label)) = (cond, label) {
            let set: SplitSet = label.parse()?;
            sets.entry(set).or_default().insert(cond.to_string());
        }
    }
    Ok(Some(
        sets.into_iter()
            .map(|(set, conds)| (set, conds.into_iter().collect()))
            .collect(),
    ))
}

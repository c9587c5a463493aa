use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MetadataValue – a single cell in an obs/var column
// ---------------------------------------------------------------------------

/// A dynamically-typed metadata value mirroring common AnnData column dtypes.
/// Using `BTreeMap` / `BTreeSet` downstream so `MetadataValue` must be `Ord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Eq for MetadataValue {}

impl PartialOrd for MetadataValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetadataValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use MetadataValue::*;
        fn rank(v: &MetadataValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl MetadataValue {
    /// Borrow the value as text, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Frame – obs / var annotation table
// ---------------------------------------------------------------------------

/// Row annotations: an index of row names plus named, equally long columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub index: Vec<String>,
    pub columns: BTreeMap<String, Vec<MetadataValue>>,
}

impl Frame {
    pub fn new(index: Vec<String>) -> Self {
        Frame {
            index,
            columns: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Insert or replace a column. Its length must match the index.
    pub fn insert(&mut self, name: &str, values: Vec<MetadataValue>) -> Result<()> {
        if values.len() != self.index.len() {
            bail!(
                "column '{name}' has {} values but the frame has {} rows",
                values.len(),
                self.index.len()
            );
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&[MetadataValue]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// String view of a column; non-string entries come back as `None`.
    pub fn str_column(&self, name: &str) -> Option<Vec<Option<&str>>> {
        self.column(name)
            .map(|vals| vals.iter().map(MetadataValue::as_str).collect())
    }

    /// Sorted set of unique values of a column.
    pub fn unique_values(&self, name: &str) -> BTreeSet<MetadataValue> {
        self.column(name)
            .map(|vals| vals.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// New frame holding only the given rows, in the given order.
    pub fn take(&self, rows: &[usize]) -> Frame {
        Frame {
            index: rows.iter().map(|&r| self.index[r].clone()).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, vals)| (name.clone(), rows.iter().map(|&r| vals[r].clone()).collect()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// AnnotatedMatrix – expression matrix with cell and gene annotations
// ---------------------------------------------------------------------------

/// Cells × genes expression matrix with obs (cell) and var (gene) frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotatedMatrix {
    /// One expression row per cell, each `var.len()` long.
    pub x: Vec<Vec<f64>>,
    pub obs: Frame,
    pub var: Frame,
}

impl AnnotatedMatrix {
    /// Assemble a matrix, checking that `x` agrees with both frames.
    pub fn new(x: Vec<Vec<f64>>, obs: Frame, var: Frame) -> Result<Self> {
        if x.len() != obs.len() {
            bail!("matrix has {} rows but obs has {} cells", x.len(), obs.len());
        }
        for (i, row) in x.iter().enumerate() {
            if row.len() != var.len() {
                bail!("row {i}: {} values but var has {} genes", row.len(), var.len());
            }
        }
        Ok(AnnotatedMatrix { x, obs, var })
    }

    /// Number of cells.
    pub fn n_obs(&self) -> usize {
        self.obs.len()
    }

    /// Number of genes.
    pub fn n_vars(&self) -> usize {
        self.var.len()
    }

    /// Keep only the cells whose mask entry is `true`.
    pub fn select_cells(&self, keep: &[bool]) -> AnnotatedMatrix {
        let rows: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter(|(_, k)| **k)
            .map(|(i, _)| i)
            .collect();
        AnnotatedMatrix {
            x: rows.iter().map(|&r| self.x[r].clone()).collect(),
            obs: self.obs.take(&rows),
            var: self.var.clone(),
        }
    }
}

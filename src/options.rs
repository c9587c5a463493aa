use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{PertDataError, Result};

/// Base directory used when none is given.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Keyword configuration forwarded to a dataset loader.
///
/// `suffix` and `discard_perts_not_in_var` are only understood by some
/// loaders; setting them for any other dataset is an error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadOptions {
    /// Base storage directory.
    pub data_dir: PathBuf,
    /// Appended to the dataset directory to form the handle's context.
    pub suffix: Option<String>,
    /// Drop cells whose perturbation target is not in the gene panel.
    pub discard_perts_not_in_var: Option<bool>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            suffix: None,
            discard_perts_not_in_var: None,
        }
    }
}

impl LoadOptions {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Parse Python-style keyword arguments given as a JSON object.
    pub fn from_kwargs(kwargs: serde_json::Value) -> Result<Self> {
        serde_json::from_value(kwargs).map_err(|e| PertDataError::InvalidArgument(e.to_string()))
    }

    pub fn suffix(&self) -> &str {
        self.suffix.as_deref().unwrap_or("")
    }

    pub fn discard_perts_not_in_var(&self) -> bool {
        self.discard_perts_not_in_var.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_kwargs_use_defaults() {
        let opts = LoadOptions::from_kwargs(json!({})).unwrap();
        assert_eq!(opts, LoadOptions::default());
        assert_eq!(opts.data_dir, PathBuf::from("data"));
        assert_eq!(opts.suffix(), "");
        assert!(opts.discard_perts_not_in_var());
    }

    #[test]
    fn kwargs_are_read() {
        let opts = LoadOptions::from_kwargs(json!({
            "data_dir": "/tmp/perturb",
            "suffix": "_scgpt",
            "discard_perts_not_in_var": false
        }))
        .unwrap();
        assert_eq!(opts.data_dir, PathBuf::from("/tmp/perturb"));
        assert_eq!(opts.suffix(), "_scgpt");
        assert!(!opts.discard_perts_not_in_var());
    }

    #[test]
    fn unknown_kwargs_are_rejected() {
        let err = LoadOptions::from_kwargs(json!({ "split": "simulation" })).unwrap_err();
        assert!(err.is_invalid_argument());
    }
}

//! Seeded, cache-backed loaders for single-cell genetic perturbation
//! datasets (Norman 2019, Adamson 2016, Dixit 2016, Replogle 2022,
//! Joung 2023).
//!
//! ```no_run
//! use pertdata::{get_pert_data, LoadOptions};
//!
//! let pert_data = get_pert_data("Norman2019", 1, &LoadOptions::default())?;
//! println!("{} cells", pert_data.len());
//! # Ok::<(), pertdata::PertDataError>(())
//! ```

pub mod data;
pub mod datasets;
pub mod error;
pub mod options;
pub mod pert_data;
pub mod source;
pub mod split;

pub use datasets::{get_pert_data, get_pert_data_with, Dataset};
pub use error::PertDataError;
pub use options::LoadOptions;
pub use pert_data::PertData;
pub use source::{LocalSource, PerturbationSource};
pub use split::{SplitKind, SplitSet};

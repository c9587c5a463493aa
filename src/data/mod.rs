/// Data layer: annotated matrices, on-disk formats, and filtering.
///
/// Architecture:
/// ```text
///  perturb_processed.parquet / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → AnnotatedMatrix
///   └──────────┘
///        │
///        ▼
///   ┌────────────────┐
///   │ AnnotatedMatrix │  X, obs frame, var frame
///   └────────────────┘
///        │            │
///        ▼            ▼
///   ┌──────────┐ ┌───────────┐
///   │  filter   │ │ container │  <stem>_<seed>.parquet
///   └──────────┘ └───────────┘
/// ```

pub mod container;
pub mod filter;
pub mod loader;
pub mod model;

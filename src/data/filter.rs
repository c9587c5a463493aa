use std::collections::BTreeSet;

use anyhow::{Context, Result};
use log::info;

use super::model::AnnotatedMatrix;

/// obs column holding the perturbation label of each cell.
pub const CONDITION_COLUMN: &str = "condition";
/// var column holding the measured gene symbols.
pub const GENE_NAME_COLUMN: &str = "gene_name";
/// Perturbation label of control cells.
pub const CONTROL: &str = "ctrl";

/// First perturbed gene of a label: the text before the first `+`.
pub fn primary_target(condition: &str) -> &str {
    condition.split('+').next().unwrap_or(condition)
}

/// Non-control primary targets that are not part of the gene panel.
pub fn targets_not_in_panel<'a>(
    conditions: &[&'a str],
    panel: &BTreeSet<&str>,
) -> BTreeSet<&'a str> {
    conditions
        .iter()
        .map(|c| primary_target(*c))
        .filter(|t| *t != CONTROL && !panel.contains(t))
        .collect()
}

/// `true` for every cell whose primary target is out of panel.
///
/// Cells with a missing (non-string) condition are never masked.
pub fn out_of_panel_mask(adata: &AnnotatedMatrix) -> Result<Vec<bool>> {
    let conditions = adata
        .obs
        .str_column(CONDITION_COLUMN)
        .with_context(|| format!("obs has no '{CONDITION_COLUMN}' column"))?;
    let panel: BTreeSet<&str> = adata
        .var
        .str_column(GENE_NAME_COLUMN)
        .with_context(|| format!("var has no '{GENE_NAME_COLUMN}' column"))?
        .into_iter()
        .flatten()
        .collect();

    let present: Vec<&str> = conditions.iter().flatten().copied().collect();
    let discard = targets_not_in_panel(&present, &panel);

    Ok(conditions
        .iter()
        .map(|c| matches!(c, Some(c) if discard.contains(primary_target(c))))
        .collect())
}

/// Drop cells of perturbations whose primary target is not measured.
pub fn discard_out_of_panel(adata: &AnnotatedMatrix) -> Result<AnnotatedMatrix> {
    let mask = out_of_panel_mask(adata)?;
    let discarded = mask.iter().filter(|m| **m).count();
    let pct = if mask.is_empty() {
        0.0
    } else {
        100.0 * discarded as f64 / mask.len() as f64
    };

    info!("cells before panel filter: {}", adata.n_obs());
    info!("{pct}% of cells belong to perturbations not in gene panel, discarding them");
    let keep: Vec<bool> = mask.iter().map(|m| !m).collect();
    let filtered = adata.select_cells(&keep);
    info!("cells after panel filter: {}", filtered.n_obs());
    Ok(filtered)
}

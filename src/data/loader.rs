use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::Value as JsonValue;

use super::container;
use super::model::{AnnotatedMatrix, Frame, MetadataValue};

/// File stem of a preprocessed perturbation dataset inside its directory.
pub const PROCESSED_STEM: &str = "perturb_processed";

/// Extensions probed by [`find_processed`], in order of preference.
pub const PROCESSED_EXTENSIONS: [&str; 3] = ["parquet", "json", "csv"];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Locate `perturb_processed.<ext>` inside `dir`.
pub fn find_processed(dir: &Path) -> Result<PathBuf> {
    PROCESSED_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{PROCESSED_STEM}.{ext}")))
        .find(|p| p.is_file())
        .with_context(|| {
            format!(
                "no {PROCESSED_STEM}.{{{}}} found in {}",
                PROCESSED_EXTENSIONS.join(","),
                dir.display()
            )
        })
}

/// Load an annotated matrix from a file. Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – the annotated-matrix container (recommended)
/// * `.json`    – `{ "var_names": [...], "var": {...}, "obs": [{ "X": [...], ...meta }] }`
/// * `.csv`     – one cell per row, `X` holds semicolon-separated floats;
///   genes come from a sibling `genes.csv`
pub fn load_file(path: &Path) -> Result<AnnotatedMatrix> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => container::read(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema:
///
/// ```json
/// {
///   "var_names": ["ENSG01", "ENSG02"],
///   "var": { "gene_name": ["KLF1", "BAK1"] },
///   "obs": [
///     { "obs_name": "AAAC-1", "X": [0.0, 1.5], "condition": "ctrl" },
///     ...
///   ]
/// }
/// ```
///
/// `obs_name` is optional; missing names become the row number.
fn load_json(path: &Path) -> Result<AnnotatedMatrix> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let var_names: Vec<String> = serde_json::from_value(
        root.get("var_names")
            .cloned()
            .context("missing 'var_names' array")?,
    )
    .context("'var_names' must be an array of strings")?;

    let mut var = Frame::new(var_names);
    if let Some(cols) = root.get("var") {
        let cols: BTreeMap<String, Vec<MetadataValue>> =
            serde_json::from_value(cols.clone()).context("'var' must map names to arrays")?;
        for (name, values) in cols {
            var.insert(&name, values)?;
        }
    }

    let records = root
        .get("obs")
        .and_then(|v| v.as_array())
        .context("missing 'obs' array")?;

    let mut x = Vec::with_capacity(records.len());
    let mut names = Vec::with_capacity(records.len());
    let mut rows: Vec<BTreeMap<String, MetadataValue>> = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        x.push(json_array_to_f64(obj.get("X"), i)?);
        names.push(
            obj.get("obs_name")
                .and_then(|v| v.as_str())
                .map_or_else(|| i.to_string(), str::to_string),
        );

        let mut metadata = BTreeMap::new();
        for (key, val) in obj {
            if key == "X" || key == "obs_name" {
                continue;
            }
            metadata.insert(key.clone(), json_to_metadata(val));
        }
        rows.push(metadata);
    }

    AnnotatedMatrix::new(x, rows_to_frame(names, rows)?, var)
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid 'X' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, X[{j}]: not a number"))
        })
        .collect()
}

fn json_to_metadata(val: &JsonValue) -> MetadataValue {
    match val {
        JsonValue::String(s) => MetadataValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                MetadataValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                MetadataValue::Float(f)
            } else {
                MetadataValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => MetadataValue::Bool(*b),
        JsonValue::Null => MetadataValue::Null,
        other => MetadataValue::String(other.to_string()),
    }
}

/// Pivot per-row metadata maps into columns; absent keys become `Null`.
fn rows_to_frame(index: Vec<String>, rows: Vec<BTreeMap<String, MetadataValue>>) -> Result<Frame> {
    let mut columns: BTreeMap<String, Vec<MetadataValue>> = BTreeMap::new();
    for row in &rows {
        for key in row.keys() {
            columns.entry(key.clone()).or_default();
        }
    }
    for row in rows {
        for (name, values) in columns.iter_mut() {
            values.push(row.get(name).cloned().unwrap_or(MetadataValue::Null));
        }
    }
    let mut frame = Frame::new(index);
    for (name, values) in columns {
        frame.insert(&name, values)?;
    }
    Ok(frame)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Companion file holding the gene panel of a CSV dataset.
pub const GENES_CSV: &str = "genes.csv";

/// CSV layout: header row with column names, one cell per row.
/// The `X` column contains semicolon-separated floats: `"0.0;1.5;0.0"`.
/// An optional `obs_name` column names the cell; all other columns are
/// treated as obs metadata. Genes are read from `genes.csv` next to the file:
/// a `gene_id` column (the var index) plus var metadata columns.
fn load_csv(path: &Path) -> Result<AnnotatedMatrix> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let x_idx = headers
        .iter()
        .position(|h| h == "X")
        .context("CSV missing 'X' column")?;
    let name_idx = headers.iter().position(|h| h == "obs_name");

    let mut x = Vec::new();
    let mut names = Vec::new();
    let mut rows = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        x.push(parse_semicolon_floats(record.get(x_idx).unwrap_or(""), row_no)?);
        names.push(
            name_idx
                .and_then(|i| record.get(i))
                .map_or_else(|| row_no.to_string(), str::to_string),
        );

        let mut metadata = BTreeMap::new();
        for (col_idx, value) in record.iter().enumerate() {
            if col_idx == x_idx || Some(col_idx) == name_idx {
                continue;
            }
            metadata.insert(headers[col_idx].clone(), guess_metadata_type(value));
        }
        rows.push(metadata);
    }

    let genes_path = path.with_file_name(GENES_CSV);
    let var = load_genes_csv(&genes_path)
        .with_context(|| format!("reading gene panel {}", genes_path.display()))?;

    AnnotatedMatrix::new(x, rows_to_frame(names, rows)?, var)
}

fn load_genes_csv(path: &Path) -> Result<Frame> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let id_idx = headers
        .iter()
        .position(|h| h == "gene_id")
        .context("genes CSV missing 'gene_id' column")?;

    let mut ids = Vec::new();
    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        ids.push(record.get(id_idx).unwrap_or("").to_string());
        let metadata: BTreeMap<String, MetadataValue> = record
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id_idx)
            .map(|(i, v)| (headers[i].clone(), guess_metadata_type(v)))
            .collect();
        rows.push(metadata);
    }
    rows_to_frame(ids, rows)
}

fn parse_semicolon_floats(s: &str, row: usize) -> Result<Vec<f64>> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, X[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

fn guess_metadata_type(s: &str) -> MetadataValue {
    if s.is_empty() {
        return MetadataValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return MetadataValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return MetadataValue::Float(f);
    }
    if s == "true" || s == "false" {
        return MetadataValue::Bool(s == "true");
    }
    MetadataValue::String(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_dataset_fills_missing_fields_with_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perturb_processed.json");
        std::fs::write(
            &path,
            r#"{
                "var_names": ["ENSG01", "ENSG02"],
                "var": { "gene_name": ["KLF1", "BAK1"] },
                "obs": [
                    { "obs_name": "c0", "X": [0.0, 1.0], "condition": "ctrl", "dose": 1 },
                    { "X": [2.0, 3.0], "condition": "KLF1+ctrl" }
                ]
            }"#,
        )
        .unwrap();

        let adata = load_file(&path).unwrap();
        assert_eq!(adata.obs.index, vec!["c0", "1"]);
        assert_eq!(
            adata.obs.column("dose").unwrap(),
            &[MetadataValue::Integer(1), MetadataValue::Null]
        );
        assert_eq!(
            adata.var.str_column("gene_name").unwrap(),
            vec![Some("KLF1"), Some("BAK1")]
        );
        assert_eq!(find_processed(dir.path()).unwrap(), path);
    }

    #[test]
    fn csv_dataset_reads_gene_panel_from_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perturb_processed.csv");
        std::fs::write(
            &path,
            "obs_name,X,condition\nc0,0.5;1.0,ctrl\nc1,2;3,BAK1+ctrl\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(GENES_CSV),
            "gene_id,gene_name\nENSG01,KLF1\nENSG02,BAK1\n",
        )
        .unwrap();

        let adata = load_file(&path).unwrap();
        assert_eq!(adata.x, vec![vec![0.5, 1.0], vec![2.0, 3.0]]);
        assert_eq!(adata.var.index, vec!["ENSG01", "ENSG02"]);
        assert_eq!(
            adata.obs.str_column("condition").unwrap(),
            vec![Some("ctrl"), Some("BAK1+ctrl")]
        );
    }

    #[test]
    fn row_length_must_match_gene_panel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perturb_processed.json");
        std::fs::write(
            &path,
            r#"{ "var_names": ["g1", "g2"], "obs": [ { "X": [1.0] } ] }"#,
        )
        .unwrap();
        assert!(load_file(&path).is_err());
    }

    #[test]
    fn missing_processed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_processed(dir.path()).unwrap_err();
        assert!(err.to_string().contains("perturb_processed"));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(load_file(Path::new("data.h5ad")).is_err());
    }
}

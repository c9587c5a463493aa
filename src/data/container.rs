use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanBuilder, Float64Builder, Int64Builder, LargeListArray,
    ListArray, ListBuilder, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Float32Type, Float64Type, Int32Type, Int64Type, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::model::{AnnotatedMatrix, Frame, MetadataValue};

/// Column holding the cell names.
pub const OBS_NAMES_COLUMN: &str = "obs_names";
/// Column holding one expression row per cell.
pub const MATRIX_COLUMN: &str = "X";

const VAR_NAMES_KEY: &str = "pertdata.var_names";
const VAR_COLUMNS_KEY: &str = "pertdata.var";

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Write an annotated matrix to a Parquet container.
///
/// Layout:
/// - `obs_names`: Utf8 – cell names
/// - `X`: List<Float64> – one expression row per cell
/// - one nullable column per obs field (Utf8 / Int64 / Float64 / Boolean)
/// - var index and var columns as JSON in the Arrow schema metadata
///
/// Obs columns are stored with a single type each, so a column mixing
/// integers and floats reads back as floats and any other mix as strings.
/// [`normalize`] gives the in-memory matrix that same shape.
pub fn write(adata: &AnnotatedMatrix, path: &Path) -> Result<()> {
    let mut fields = vec![
        Field::new(OBS_NAMES_COLUMN, DataType::Utf8, false),
        Field::new(
            MATRIX_COLUMN,
            DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
            false,
        ),
    ];

    let mut names = StringBuilder::new();
    for name in &adata.obs.index {
        names.append_value(name);
    }
    let mut x_builder = ListBuilder::new(Float64Builder::new());
    for row in &adata.x {
        x_builder.values().append_slice(row);
        x_builder.append(true);
    }
    let mut columns: Vec<ArrayRef> = vec![Arc::new(names.finish()), Arc::new(x_builder.finish())];

    for (name, values) in &adata.obs.columns {
        if name == OBS_NAMES_COLUMN || name == MATRIX_COLUMN {
            bail!("obs column name '{name}' is reserved");
        }
        let (data_type, array) = build_column(values);
        fields.push(Field::new(name, data_type, true));
        columns.push(array);
    }

    let mut metadata = HashMap::new();
    metadata.insert(
        VAR_NAMES_KEY.to_string(),
        serde_json::to_string(&adata.var.index).context("encoding var names")?,
    );
    metadata.insert(
        VAR_COLUMNS_KEY.to_string(),
        serde_json::to_string(&adata.var.columns).context("encoding var columns")?,
    );

    let schema = Arc::new(Schema::new_with_metadata(fields, metadata));
    let batch = RecordBatch::try_new(schema.clone(), columns).context("assembling record batch")?;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("finalizing parquet file")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Null,
    Bool,
    Integer,
    Float,
    String,
}

/// Pick the narrowest Arrow type that holds every value of the column.
/// Mixed numeric columns widen to Float64, anything else mixed becomes Utf8.
fn column_kind(values: &[MetadataValue]) -> ColumnKind {
    let mut kind = ColumnKind::Null;
    for v in values {
        let k = match v {
            MetadataValue::Null => continue,
            MetadataValue::Bool(_) => ColumnKind::Bool,
            MetadataValue::Integer(_) => ColumnKind::Integer,
            MetadataValue::Float(_) => ColumnKind::Float,
            MetadataValue::String(_) => ColumnKind::String,
        };
        kind = match (kind, k) {
            (ColumnKind::Null, k) => k,
            (a, b) if a == b => a,
            (ColumnKind::Integer, ColumnKind::Float) | (ColumnKind::Float, ColumnKind::Integer) => {
                ColumnKind::Float
            }
            _ => ColumnKind::String,
        };
    }
    kind
}

/// Convert every obs value to the type [`read`] returns it as.
pub fn normalize(adata: &mut AnnotatedMatrix) {
    for values in adata.obs.columns.values_mut() {
        match column_kind(values) {
            ColumnKind::Float => {
                for v in values.iter_mut() {
                    if let MetadataValue::Integer(x) = *v {
                        *v = MetadataValue::Float(x as f64);
                    }
                }
            }
            ColumnKind::String => {
                for v in values.iter_mut() {
                    if !matches!(v, MetadataValue::String(_) | MetadataValue::Null) {
                        *v = MetadataValue::String(v.to_string());
                    }
                }
            }
            ColumnKind::Null | ColumnKind::Bool | ColumnKind::Integer => {}
        }
    }
}

fn build_column(values: &[MetadataValue]) -> (DataType, ArrayRef) {
    match column_kind(values) {
        ColumnKind::Bool => {
            let mut b = BooleanBuilder::with_capacity(values.len());
            for v in values {
                match v {
                    MetadataValue::Bool(x) => b.append_value(*x),
                    _ => b.append_null(),
                }
            }
            (DataType::Boolean, Arc::new(b.finish()))
        }
        ColumnKind::Integer => {
            let mut b = Int64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    MetadataValue::Integer(x) => b.append_value(*x),
                    _ => b.append_null(),
                }
            }
            (DataType::Int64, Arc::new(b.finish()))
        }
        ColumnKind::Float => {
            let mut b = Float64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    MetadataValue::Float(x) => b.append_value(*x),
                    MetadataValue::Integer(x) => b.append_value(*x as f64),
                    _ => b.append_null(),
                }
            }
            (DataType::Float64, Arc::new(b.finish()))
        }
        ColumnKind::String | ColumnKind::Null => {
            let mut b = StringBuilder::new();
            for v in values {
                match v {
                    MetadataValue::Null => b.append_null(),
                    MetadataValue::String(s) => b.append_value(s),
                    other => b.append_value(other.to_string()),
                }
            }
            (DataType::Utf8, Arc::new(b.finish()))
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Read a Parquet container written by [`write`].
pub fn read(path: &Path) -> Result<AnnotatedMatrix> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let schema = builder.schema().clone();
    let reader = builder.build().context("building parquet reader")?;

    let metadata = schema.metadata();
    let var_names: Vec<String> = match metadata.get(VAR_NAMES_KEY) {
        Some(json) => serde_json::from_str(json).context("decoding var names")?,
        None => bail!("container is missing '{VAR_NAMES_KEY}' metadata"),
    };
    let var_columns: BTreeMap<String, Vec<MetadataValue>> = match metadata.get(VAR_COLUMNS_KEY) {
        Some(json) => serde_json::from_str(json).context("decoding var columns")?,
        None => BTreeMap::new(),
    };

    let obs_fields: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .filter(|n| n != OBS_NAMES_COLUMN && n != MATRIX_COLUMN)
        .collect();
    schema
        .index_of(OBS_NAMES_COLUMN)
        .map_err(|_| anyhow::anyhow!("container missing '{OBS_NAMES_COLUMN}' column"))?;
    schema
        .index_of(MATRIX_COLUMN)
        .map_err(|_| anyhow::anyhow!("container missing '{MATRIX_COLUMN}' column"))?;

    let mut obs_names = Vec::new();
    let mut x = Vec::new();
    let mut obs_columns: BTreeMap<String, Vec<MetadataValue>> =
        obs_fields.iter().map(|n| (n.clone(), Vec::new())).collect();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let names = batch
            .column_by_name(OBS_NAMES_COLUMN)
            .and_then(|c| c.as_string_opt::<i32>())
            .context("'obs_names' is not a Utf8 column")?;
        for i in 0..names.len() {
            obs_names.push(names.value(i).to_string());
        }

        let x_col = batch
            .column_by_name(MATRIX_COLUMN)
            .context("record batch missing 'X'")?;
        for row in 0..batch.num_rows() {
            x.push(extract_f64_list(x_col, row).with_context(|| format!("row {row}: failed to read 'X'"))?);
        }

        for name in &obs_fields {
            let col = batch
                .column_by_name(name)
                .with_context(|| format!("record batch missing '{name}'"))?;
            let values = column_values(col).with_context(|| format!("obs column '{name}'"))?;
            if let Some(target) = obs_columns.get_mut(name) {
                target.extend(values);
            }
        }
    }

    let mut var = Frame::new(var_names);
    for (name, values) in var_columns {
        var.insert(&name, values)?;
    }
    let mut obs = Frame::new(obs_names);
    for (name, values) in obs_columns {
        obs.insert(&name, values)?;
    }
    AnnotatedMatrix::new(x, obs, var)
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &ArrayRef, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => col
            .as_any()
            .downcast_ref::<ListArray>()
            .context("expected ListArray")?
            .value(row),
        DataType::LargeList(_) => col
            .as_any()
            .downcast_ref::<LargeListArray>()
            .context("expected LargeListArray")?
            .value(row),
        other => bail!("expected List or LargeList column, got {other:?}"),
    };

    if let Some(arr) = values_array.as_primitive_opt::<Float64Type>() {
        Ok(arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(arr) = values_array.as_primitive_opt::<Float32Type>() {
        Ok(arr.iter().map(|v| v.map_or(f64::NAN, f64::from)).collect())
    } else {
        bail!(
            "list inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

/// Convert a whole Arrow column into metadata values.
fn column_values(col: &ArrayRef) -> Result<Vec<MetadataValue>> {
    let n = col.len();
    let values = match col.data_type() {
        DataType::Utf8 => {
            let arr = col.as_string::<i32>();
            (0..n)
                .map(|i| (!arr.is_null(i)).then(|| MetadataValue::String(arr.value(i).to_string())))
                .collect::<Vec<_>>()
        }
        DataType::LargeUtf8 => {
            let arr = col.as_string::<i64>();
            (0..n)
                .map(|i| (!arr.is_null(i)).then(|| MetadataValue::String(arr.value(i).to_string())))
                .collect()
        }
        DataType::Int32 => col
            .as_primitive::<Int32Type>()
            .iter()
            .map(|v| v.map(|i| MetadataValue::Integer(i64::from(i))))
            .collect(),
        DataType::Int64 => col
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.map(MetadataValue::Integer))
            .collect(),
        DataType::Float32 => col
            .as_primitive::<Float32Type>()
            .iter()
            .map(|v| v.map(|f| MetadataValue::Float(f64::from(f))))
            .collect(),
        DataType::Float64 => col
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| v.map(MetadataValue::Float))
            .collect(),
        DataType::Boolean => col
            .as_boolean()
            .iter()
            .map(|v| v.map(MetadataValue::Bool))
            .collect(),
        other => bail!("unsupported metadata column type {other:?}"),
    };
    Ok(values
        .into_iter()
        .map(|v| v.unwrap_or(MetadataValue::Null))
        .collect())
}

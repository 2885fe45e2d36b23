//! Parquet wire format for batches
//!
//! Decoding keeps column names, declared numeric precision and null markers:
//! `float32` stays `float32`, `float64` stays `float64`, every integer width
//! widens losslessly to `int64`, and dictionary-encoded strings (pandas
//! `category` columns) decode to plain text. Columns of any other type
//! (nulls, timestamps, decimals) are dropped; selection reports them as
//! missing if a model needs one.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, DictionaryArray, Float32Array, Float64Array, Int64Array, StringArray,
};
use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::{DataType, Field, Int32Type, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use tracing::debug;

use crate::batch::{Batch, Column, ColumnValues};
use crate::error::{PredictionError, Result};

/// Decode a Parquet file held in memory into a batch
pub fn decode_parquet(data: impl Into<Bytes>) -> Result<Batch> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data.into())?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    // (record batch position, column) for every column of a supported type
    let mut columns: Vec<(usize, Column)> = Vec::with_capacity(schema.fields().len());
    for (index, field) in schema.fields().iter().enumerate() {
        match empty_column(field) {
            Some(column) => columns.push((index, column)),
            None => debug!(
                column = %field.name(),
                data_type = %field.data_type(),
                "Skipping column of unsupported type"
            ),
        }
    }

    let mut record_batches = 0usize;
    for record_batch in reader {
        let record_batch = record_batch?;
        for (index, column) in columns.iter_mut() {
            append_array(column, record_batch.column(*index))?;
        }
        record_batches += 1;
    }

    let columns = columns.into_iter().map(|(_, column)| column).collect();
    let batch = Batch::new(columns)?;
    debug!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        record_batches,
        "Decoded parquet batch"
    );
    Ok(batch)
}

/// Encode a batch as a single-row-group Parquet file
pub fn encode_parquet(batch: &Batch) -> Result<Vec<u8>> {
    if batch.num_columns() == 0 {
        return Err(PredictionError::Encode(
            "Cannot encode a batch without columns".to_string(),
        ));
    }

    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());

    for column in batch.columns() {
        let array: ArrayRef = match &column.values {
            ColumnValues::Int64(v) => Arc::new(Int64Array::from(v.clone())),
            ColumnValues::Float32(v) => Arc::new(Float32Array::from(v.clone())),
            ColumnValues::Float64(v) => Arc::new(Float64Array::from(v.clone())),
            ColumnValues::Utf8(v) => Arc::new(v.iter().map(|s| s.as_deref()).collect::<StringArray>()),
            ColumnValues::Categorical(v) => Arc::new(
                v.iter()
                    .map(|s| s.as_deref())
                    .collect::<DictionaryArray<Int32Type>>(),
            ),
        };
        fields.push(Field::new(&column.name, array.data_type().clone(), true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    let record_batch = RecordBatch::try_new(Arc::clone(&schema), arrays)
        .map_err(|e| PredictionError::Encode(e.to_string()))?;

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, None)
        .map_err(|e| PredictionError::Encode(e.to_string()))?;
    writer
        .write(&record_batch)
        .map_err(|e| PredictionError::Encode(e.to_string()))?;
    writer
        .close()
        .map_err(|e| PredictionError::Encode(e.to_string()))?;

    Ok(buffer)
}

/// Arrow type each supported input type is normalized to; `None` for the rest
fn target_type(data_type: &DataType) -> Option<DataType> {
    match data_type {
        DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Some(DataType::Int64),
        DataType::Float16 | DataType::Float32 => Some(DataType::Float32),
        DataType::Float64 => Some(DataType::Float64),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Some(DataType::Utf8),
        DataType::Dictionary(_, value)
            if matches!(
                value.as_ref(),
                DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
            ) =>
        {
            Some(DataType::Utf8)
        }
        _ => None,
    }
}

fn empty_column(field: &Field) -> Option<Column> {
    let values = match target_type(field.data_type())? {
        DataType::Int64 => ColumnValues::Int64(Vec::new()),
        DataType::Float32 => ColumnValues::Float32(Vec::new()),
        DataType::Float64 => ColumnValues::Float64(Vec::new()),
        _ => ColumnValues::Utf8(Vec::new()),
    };
    Some(Column::new(field.name().clone(), values))
}

fn append_array(column: &mut Column, array: &ArrayRef) -> Result<()> {
    // Unsafe casts fail instead of silently nulling out-of-range values
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };

    let name = column.name.clone();
    let type_error = |expected: &str| {
        PredictionError::Decode(format!("Column '{}' could not be read as {}", name, expected))
    };

    match &mut column.values {
        ColumnValues::Int64(values) => {
            let cast = cast_with_options(array, &DataType::Int64, &options)?;
            let typed = cast
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| type_error("int64"))?;
            values.extend(typed.iter());
        }
        ColumnValues::Float32(values) => {
            let cast = cast_with_options(array, &DataType::Float32, &options)?;
            let typed = cast
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| type_error("float32"))?;
            values.extend(typed.iter());
        }
        ColumnValues::Float64(values) => {
            let cast = cast_with_options(array, &DataType::Float64, &options)?;
            let typed = cast
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| type_error("float64"))?;
            values.extend(typed.iter());
        }
        ColumnValues::Utf8(values) | ColumnValues::Categorical(values) => {
            let cast = cast_with_options(array, &DataType::Utf8, &options)?;
            let typed = cast
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| type_error("utf8"))?;
            values.extend(typed.iter().map(|v| v.map(str::to_string)));
        }
    }
    Ok(())
}

//! Feature preprocessing pipeline
//!
//! Turns a raw batch of flow records into exactly the columns, value domains
//! and dtypes a trained model consumes. It must match the transformation used
//! at training time.
//!
//! Steps, in order:
//! 1. derived ratio/sum features
//! 2. projection onto the model's feature schema (when one is known)
//! 3. categorical whitelist canonicalization
//! 4. `log1p` of the configured log features
//! 5. categorical columns to `Categorical`, everything else to `Float32`

use std::sync::Arc;

use tracing::{debug, trace};

use crate::batch::{Batch, ColumnValues};
use crate::catalog::CategoryCatalog;
use crate::error::{PipelineStep, PredictionError, Result};

/// Ordered column names a model requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Deterministic column-wise transform chain
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    catalog: Arc<CategoryCatalog>,
    /// Absent when no model is loaded; selection is then a passthrough
    schema: Option<FeatureSchema>,
}

impl FeaturePipeline {
    pub fn new(catalog: Arc<CategoryCatalog>, schema: Option<FeatureSchema>) -> Self {
        Self { catalog, schema }
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    pub fn schema(&self) -> Option<&FeatureSchema> {
        self.schema.as_ref()
    }

    /// Run every step on a copy of the batch
    pub fn process(&self, batch: &Batch) -> Result<Batch> {
        let mut processed = batch.clone();

        self.add_derived_features(&mut processed)?;
        self.select_features(&mut processed)?;
        self.canonicalize_categories(&mut processed)?;
        self.apply_log_transform(&mut processed)?;
        self.normalize_types(&mut processed)?;

        debug!(
            rows = processed.num_rows(),
            input_columns = batch.num_columns(),
            output_columns = processed.num_columns(),
            "Batch preprocessed"
        );
        Ok(processed)
    }

    /// Step 1: append derived features whose source columns are all present
    pub fn add_derived_features(&self, batch: &mut Batch) -> Result<()> {
        let step = PipelineStep::DerivedFeatures;

        for feature in &self.catalog.derived {
            let sources = feature.sources();
            if let Some(missing) = sources.iter().find(|s| !batch.contains(s)) {
                trace!(feature = feature.name(), missing = *missing, "Skipping derived feature");
                continue;
            }

            let mut inputs = Vec::with_capacity(sources.len());
            for source in &sources {
                inputs.push(numeric_values(batch, source, step)?);
            }

            let values = (0..batch.num_rows())
                .map(|row| {
                    let row_values: Option<Vec<f64>> =
                        inputs.iter().map(|column| column[row]).collect();
                    row_values.map(|v| feature.compute(&v))
                })
                .collect();

            replace_column(batch, feature.name(), ColumnValues::Float64(values), step)?;
        }
        Ok(())
    }

    /// Step 2: project onto the schema's columns, in schema order
    pub fn select_features(&self, batch: &mut Batch) -> Result<()> {
        let Some(schema) = &self.schema else {
            return Ok(());
        };

        *batch = batch
            .select(schema.columns())
            .map_err(|columns| PredictionError::Schema {
                step: PipelineStep::FeatureSelection,
                columns,
            })?;
        Ok(())
    }

    /// Step 3: replace values outside each whitelist with the catch-all marker
    pub fn canonicalize_categories(&self, batch: &mut Batch) -> Result<()> {
        let step = PipelineStep::CategoryCanonicalization;

        for whitelist in &self.catalog.categorical {
            let Some(column) = batch.column(&whitelist.column) else {
                continue;
            };
            let raw = column.values.as_text().ok_or_else(|| PredictionError::Preprocessing {
                step,
                column: whitelist.column.clone(),
                reason: format!("expected text values, found {}", column.values.kind()),
            })?;

            let canonical: Vec<Option<String>> = raw
                .iter()
                .map(|v| Some(self.catalog.canonicalize(whitelist, v.as_deref()).to_string()))
                .collect();

            let values = match column.values {
                ColumnValues::Categorical(_) => ColumnValues::Categorical(canonical),
                _ => ColumnValues::Utf8(canonical),
            };
            replace_column(batch, &whitelist.column, values, step)?;
        }
        Ok(())
    }

    /// Step 4: replace each present log feature by `log1p(value)`, in f64
    pub fn apply_log_transform(&self, batch: &mut Batch) -> Result<()> {
        let step = PipelineStep::LogTransform;

        for name in &self.catalog.log_features {
            if !batch.contains(name) {
                continue;
            }
            let values = numeric_values(batch, name, step)?
                .into_iter()
                .map(|v| v.map(f64::ln_1p))
                .collect();
            replace_column(batch, name, ColumnValues::Float64(values), step)?;
        }
        Ok(())
    }

    /// Step 5: categorical columns become `Categorical`, the rest `Float32`
    pub fn normalize_types(&self, batch: &mut Batch) -> Result<()> {
        let step = PipelineStep::TypeNormalization;
        let names: Vec<String> = batch.column_names().iter().map(|n| n.to_string()).collect();

        for name in names {
            let Some(column) = batch.column(&name) else {
                continue;
            };

            let values = if self.catalog.is_categorical(&name) {
                let text = column.values.as_text().ok_or_else(|| PredictionError::Preprocessing {
                    step,
                    column: name.clone(),
                    reason: format!("expected text values, found {}", column.values.kind()),
                })?;
                ColumnValues::Categorical(text.to_vec())
            } else {
                match column.values.to_f64() {
                    Some(wide) => {
                        ColumnValues::Float32(wide.into_iter().map(|v| v.map(|x| x as f32)).collect())
                    }
                    None => ColumnValues::Float32(parse_numbers(&column.values, &name, step)?),
                }
            };
            replace_column(batch, &name, values, step)?;
        }
        Ok(())
    }
}

/// Write a step's output back into the batch
fn replace_column(
    batch: &mut Batch,
    name: &str,
    values: ColumnValues,
    step: PipelineStep,
) -> Result<()> {
    batch
        .set_column(name, values)
        .map_err(|reason| PredictionError::Preprocessing {
            step,
            column: name.to_string(),
            reason,
        })
}

/// Numeric values of a column widened to f64, or a preprocessing error
fn numeric_values(batch: &Batch, name: &str, step: PipelineStep) -> Result<Vec<Option<f64>>> {
    let column = batch.column(name).ok_or_else(|| PredictionError::Schema {
        step,
        columns: vec![name.to_string()],
    })?;
    column
        .values
        .to_f64()
        .ok_or_else(|| PredictionError::Preprocessing {
            step,
            column: name.to_string(),
            reason: format!("expected numeric values, found {}", column.values.kind()),
        })
}

/// Parse textual cells as numbers, the way a dtype cast would
fn parse_numbers(values: &ColumnValues, name: &str, step: PipelineStep) -> Result<Vec<Option<f32>>> {
    let text = values.as_text().unwrap_or_default();
    text.iter()
        .map(|cell| match cell {
            None => Ok(None),
            Some(s) => s
                .trim()
                .parse::<f64>()
                .map(|x| Some(x as f32))
                .map_err(|_| PredictionError::Preprocessing {
                    step,
                    column: name.to_string(),
                    reason: format!("cannot parse '{}' as a number", s),
                }),
        })
        .collect()
}

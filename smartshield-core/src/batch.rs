//! In-memory tabular batch of network flow records
//!
//! A batch is an ordered set of uniquely named columns of identical length.
//! Every cell may be null; numeric precision is kept as decoded.

use crate::error::{PredictionError, Result};

/// Values of a single column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Int64(Vec<Option<i64>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    Utf8(Vec<Option<String>>),
    /// Textual values restricted to a bounded category set
    Categorical(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::Float32(v) => v.len(),
            ColumnValues::Float64(v) => v.len(),
            ColumnValues::Utf8(v) | ColumnValues::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the value kind, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            ColumnValues::Int64(_) => "int64",
            ColumnValues::Float32(_) => "float32",
            ColumnValues::Float64(_) => "float64",
            ColumnValues::Utf8(_) => "utf8",
            ColumnValues::Categorical(_) => "categorical",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnValues::Int64(_) | ColumnValues::Float32(_) | ColumnValues::Float64(_)
        )
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnValues::Utf8(_) | ColumnValues::Categorical(_))
    }

    /// Widen numeric values to f64; `None` for textual columns
    pub fn to_f64(&self) -> Option<Vec<Option<f64>>> {
        match self {
            ColumnValues::Int64(v) => Some(v.iter().map(|x| x.map(|x| x as f64)).collect()),
            ColumnValues::Float32(v) => Some(v.iter().map(|x| x.map(f64::from)).collect()),
            ColumnValues::Float64(v) => Some(v.clone()),
            ColumnValues::Utf8(_) | ColumnValues::Categorical(_) => None,
        }
    }

    /// Borrow textual values; `None` for numeric columns
    pub fn as_text(&self) -> Option<&[Option<String>]> {
        match self {
            ColumnValues::Utf8(v) | ColumnValues::Categorical(v) => Some(v),
            _ => None,
        }
    }

    /// Reorder (or subset) the values by row index
    fn take(&self, indices: &[usize]) -> ColumnValues {
        fn pick<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
            indices.iter().map(|&i| values[i].clone()).collect()
        }

        match self {
            ColumnValues::Int64(v) => ColumnValues::Int64(pick(v, indices)),
            ColumnValues::Float32(v) => ColumnValues::Float32(pick(v, indices)),
            ColumnValues::Float64(v) => ColumnValues::Float64(pick(v, indices)),
            ColumnValues::Utf8(v) => ColumnValues::Utf8(pick(v, indices)),
            ColumnValues::Categorical(v) => ColumnValues::Categorical(pick(v, indices)),
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn int64(name: impl Into<String>, values: Vec<Option<i64>>) -> Self {
        Self::new(name, ColumnValues::Int64(values))
    }

    pub fn float32(name: impl Into<String>, values: Vec<Option<f32>>) -> Self {
        Self::new(name, ColumnValues::Float32(values))
    }

    pub fn float64(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnValues::Float64(values))
    }

    pub fn utf8<S: Into<String>>(name: impl Into<String>, values: Vec<Option<S>>) -> Self {
        Self::new(
            name,
            ColumnValues::Utf8(values.into_iter().map(|v| v.map(Into::into)).collect()),
        )
    }
}

/// A table of flow records, one row per observation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    columns: Vec<Column>,
    num_rows: usize,
}

impl Batch {
    /// Build a batch, checking that names are unique and lengths agree
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let num_rows = columns.first().map(|c| c.values.len()).unwrap_or(0);

        for (i, column) in columns.iter().enumerate() {
            if column.values.len() != num_rows {
                return Err(PredictionError::Decode(format!(
                    "Column '{}' has {} rows, expected {}",
                    column.name,
                    column.values.len(),
                    num_rows
                )));
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(PredictionError::Decode(format!(
                    "Duplicate column '{}'",
                    column.name
                )));
            }
        }

        Ok(Self { columns, num_rows })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Replace the values of an existing column, or append a new one
    ///
    /// Fails with a description when the length disagrees with the batch.
    pub fn set_column(&mut self, name: &str, values: ColumnValues) -> std::result::Result<(), String> {
        if !self.columns.is_empty() && values.len() != self.num_rows {
            return Err(format!(
                "column '{}' has {} rows, expected {}",
                name,
                values.len(),
                self.num_rows
            ));
        }
        if self.columns.is_empty() {
            self.num_rows = values.len();
        }

        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) => column.values = values,
            None => self.columns.push(Column::new(name, values)),
        }
        Ok(())
    }

    /// Project onto the given columns, in the given order.
    ///
    /// Returns the names of every requested column that is absent.
    pub fn select(&self, names: &[String]) -> std::result::Result<Batch, Vec<String>> {
        let missing: Vec<String> = names
            .iter()
            .filter(|n| !self.contains(n))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }

        let columns = names
            .iter()
            .filter_map(|n| self.column(n).cloned())
            .collect();
        Ok(Batch {
            columns,
            num_rows: self.num_rows,
        })
    }

    /// Rows reordered (or subset) by index; panics on out-of-range indices
    pub fn take_rows(&self, indices: &[usize]) -> Batch {
        Batch {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.values.take(indices)))
                .collect(),
            num_rows: indices.len(),
        }
    }

    /// Columns reordered by name; unknown names are ignored
    pub fn reorder_columns(&self, names: &[&str]) -> Batch {
        Batch {
            columns: names
                .iter()
                .filter_map(|n| self.column(n).cloned())
                .collect(),
            num_rows: self.num_rows,
        }
    }
}

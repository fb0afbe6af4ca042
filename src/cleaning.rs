//! Column classification and null normalization.
//!
//! Before a dataset is frozen into an extract, every column is put in one of
//! two buckets and its missing values are filled:
//!
//! | bucket    | declared types                  | missing value becomes |
//! |-----------|---------------------------------|-----------------------|
//! | numeric   | fixed-width integers            | `0`                   |
//! | textual   | strings, and everything else    | `""`                  |
//!
//! Floating point, boolean and temporal columns land in the textual bucket
//! on purpose. When such a column holds a missing value it is rendered as
//! text so the empty string can be stored; columns without missing values
//! are left exactly as they were.

use anyhow::{Context as _, Result};
use polars::prelude::*;

/// Semantic class of a column for null handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnBucket {
    Numeric,
    Textual,
}

/// Buckets a declared column type.
///
/// Only fixed-width integers are numeric. The default arm sends every other
/// type, floats included, to [`ColumnBucket::Textual`].
#[allow(clippy::match_same_arms)]
pub fn classify(dtype: &DataType) -> ColumnBucket {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnBucket::Numeric,
        DataType::String => ColumnBucket::Textual,
        // Fallback bucket: floats, booleans, dates, nested, ...
        _ => ColumnBucket::Textual,
    }
}

/// Column names partitioned by bucket, in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnClassification {
    pub numeric_cols: Vec<String>,
    pub string_cols: Vec<String>,
}

impl ColumnClassification {
    pub fn of(df: &DataFrame) -> Self {
        let mut classification = Self::default();
        for (name, dtype) in df.schema().iter() {
            match classify(dtype) {
                ColumnBucket::Numeric => classification.numeric_cols.push(name.to_string()),
                ColumnBucket::Textual => classification.string_cols.push(name.to_string()),
            }
        }
        classification
    }

    pub fn plan(&self) -> NormalizationPlan {
        match (self.numeric_cols.is_empty(), self.string_cols.is_empty()) {
            (false, false) => NormalizationPlan::Both,
            (false, true) => NormalizationPlan::NumericOnly,
            (true, false) => NormalizationPlan::TextualOnly,
            (true, true) => NormalizationPlan::Empty,
        }
    }
}

/// Which fill passes a dataset needs, checked in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationPlan {
    /// Zeros for numeric columns and empty strings for textual ones, in one pass
    Both,
    NumericOnly,
    TextualOnly,
    /// Zero columns: nothing to do
    Empty,
}

/// Fills missing values according to each column's bucket.
///
/// The input is left untouched; the returned frame has the same columns (same
/// names, same order) and the same row count.
///
/// # Errors
///
/// Returns error if Polars fails to evaluate the fill expressions
pub fn normalize(df: &DataFrame) -> Result<DataFrame> {
    let classification = ColumnClassification::of(df);
    let plan = classification.plan();
    tracing::debug!(
        ?plan,
        numeric = classification.numeric_cols.len(),
        textual = classification.string_cols.len(),
        "Normalizing dataset"
    );

    let exprs = match plan {
        NormalizationPlan::Empty => return Ok(df.clone()),
        NormalizationPlan::Both => {
            let mut exprs = fill_numeric(df, &classification.numeric_cols)?;
            exprs.extend(fill_textual(df, &classification.string_cols)?);
            exprs
        }
        NormalizationPlan::NumericOnly => fill_numeric(df, &classification.numeric_cols)?,
        NormalizationPlan::TextualOnly => fill_textual(df, &classification.string_cols)?,
    };

    if exprs.is_empty() {
        return Ok(df.clone());
    }

    df.clone()
        .lazy()
        .with_columns(exprs)
        .collect()
        .context("Failed to fill missing values")
}

fn fill_numeric(df: &DataFrame, names: &[String]) -> Result<Vec<Expr>> {
    let mut exprs = Vec::new();
    for name in names {
        let column = df.column(name)?;
        if column.null_count() == 0 {
            continue;
        }
        // Keep the column's own width instead of widening to the literal's type
        let zero = lit(0).cast(column.dtype().clone());
        exprs.push(col(name.as_str()).fill_null(zero));
    }
    Ok(exprs)
}

fn fill_textual(df: &DataFrame, names: &[String]) -> Result<Vec<Expr>> {
    let mut exprs = Vec::new();
    for name in names {
        let column = df.column(name)?;
        if !has_missing(column)? {
            continue;
        }
        let mut expr = col(name.as_str());
        if column.dtype().is_float() {
            expr = expr.fill_nan(lit(NULL));
        }
        if column.dtype() != &DataType::String {
            expr = expr.cast(DataType::String);
        }
        exprs.push(expr.fill_null(lit("")));
    }
    Ok(exprs)
}

/// Null, or NaN for floating point columns.
fn has_missing(column: &Column) -> Result<bool> {
    if column.null_count() > 0 {
        return Ok(true);
    }
    if column.dtype().is_float() {
        let has_nan = column
            .as_materialized_series()
            .is_nan()
            .context("Failed to check for NaN values")?
            .any();
        return Ok(has_nan);
    }
    Ok(false)
}

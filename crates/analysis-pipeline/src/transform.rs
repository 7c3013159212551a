//! Preprocessing operations over tabular data
//!
//! Operations are applied in order to an owned [`Table`]. Numeric work
//! parses cells on the fly; cells that do not parse are treated as missing,
//! and results that are not finite become missing.

use std::collections::BTreeMap;

use capabilities::{parse_number, Table};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingHow {
    /// Drop a row when any checked cell is missing
    #[default]
    Any,
    /// Drop a row only when every checked cell is missing
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeMethod {
    Mean,
    Median,
    Mode,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMethod {
    /// Zero mean, unit population standard deviation
    Standardize,
    /// Min-max to the unit interval
    Normalize,
}

/// One preprocessing step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PreprocessOperation {
    /// Drop rows with missing cells; all columns are checked when `columns` is empty
    DropMissing {
        #[serde(default)]
        columns: Vec<String>,
        #[serde(default)]
        how: MissingHow,
    },
    Impute {
        columns: Vec<String>,
        method: ImputeMethod,
        /// Fill value for `value`, and the fallback for `mode` on an empty column
        #[serde(default)]
        value: Option<serde_json::Value>,
    },
    /// Drop columns; unknown names are ignored
    DropColumns { columns: Vec<String> },
    /// Rename pairwise; unknown source names are ignored
    RenameColumns {
        #[serde(default)]
        rename_from: Vec<String>,
        #[serde(default)]
        rename_to: Vec<String>,
    },
    Scale {
        columns: Vec<String>,
        method: ScaleMethod,
    },
    /// New column from `operand op operand`, operands being columns or numbers
    DerivedColumn { name: String, expression: String },
}

impl PreprocessOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DropMissing { .. } => "drop_missing",
            Self::Impute { .. } => "impute",
            Self::DropColumns { .. } => "drop_columns",
            Self::RenameColumns { .. } => "rename_columns",
            Self::Scale { .. } => "scale",
            Self::DerivedColumn { .. } => "derived_column",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("Column not found: {0}")]
    UnknownColumn(String),

    #[error("Invalid {op} operation: {reason}")]
    InvalidOperation { op: &'static str, reason: String },

    #[error("Invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },
}

impl TransformError {
    fn invalid(op: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            op,
            reason: reason.into(),
        }
    }
}

/// Apply `operations` in order
pub fn apply_operations(
    mut table: Table,
    operations: &[PreprocessOperation],
) -> Result<Table, TransformError> {
    for operation in operations {
        log::debug!("Applying {} to {} rows", operation.name(), table.row_count());
        table = apply_operation(table, operation)?;
    }
    Ok(table)
}

fn apply_operation(mut table: Table, operation: &PreprocessOperation) -> Result<Table, TransformError> {
    match operation {
        PreprocessOperation::DropMissing { columns, how } => {
            let indices = if columns.is_empty() {
                (0..table.column_count()).collect()
            } else {
                column_indices(&table, columns)?
            };
            table.rows.retain(|row| {
                let mut checked = indices.iter().map(|&i| row[i].is_none());
                match how {
                    MissingHow::Any => !checked.any(|missing| missing),
                    MissingHow::All => indices.is_empty() || !checked.all(|missing| missing),
                }
            });
        }
        PreprocessOperation::Impute {
            columns,
            method,
            value,
        } => {
            if columns.is_empty() {
                return Err(TransformError::invalid("impute", "requires 'columns'"));
            }
            let fallback = value.as_ref().and_then(json_to_cell);
            for index in column_indices(&table, columns)? {
                let fill = match method {
                    ImputeMethod::Mean => mean(&numeric_column(&table, index)).map(format_number),
                    ImputeMethod::Median => {
                        median(&numeric_column(&table, index)).map(format_number)
                    }
                    ImputeMethod::Mode => mode(&table, index).or_else(|| fallback.clone()),
                    ImputeMethod::Value => fallback.clone(),
                };
                if let Some(fill) = fill {
                    for row in &mut table.rows {
                        if row[index].is_none() {
                            row[index] = Some(fill.clone());
                        }
                    }
                }
            }
        }
        PreprocessOperation::DropColumns { columns } => {
            let keep: Vec<usize> = (0..table.column_count())
                .filter(|&i| !columns.contains(&table.columns[i]))
                .collect();
            table = project(&table, &keep);
        }
        PreprocessOperation::RenameColumns {
            rename_from,
            rename_to,
        } => {
            if rename_from.len() != rename_to.len() {
                return Err(TransformError::invalid(
                    "rename_columns",
                    format!(
                        "{} source names but {} target names",
                        rename_from.len(),
                        rename_to.len()
                    ),
                ));
            }
            let mapping: BTreeMap<&str, &str> = rename_from
                .iter()
                .map(String::as_str)
                .zip(rename_to.iter().map(String::as_str))
                .collect();
            for column in &mut table.columns {
                if let Some(to) = mapping.get(column.as_str()) {
                    *column = to.to_string();
                }
            }
        }
        PreprocessOperation::Scale { columns, method } => {
            if columns.is_empty() {
                return Err(TransformError::invalid("scale", "requires 'columns'"));
            }
            for index in column_indices(&table, columns)? {
                let values = numeric_column(&table, index);
                let scaled = scale(&values, *method);
                for (row, value) in table.rows.iter_mut().zip(scaled) {
                    row[index] = value.and_then(finite).map(format_number);
                }
            }
        }
        PreprocessOperation::DerivedColumn { name, expression } => {
            if name.trim().is_empty() || expression.trim().is_empty() {
                return Err(TransformError::invalid(
                    "derived_column",
                    "requires 'name' and 'expression'",
                ));
            }
            let derived = evaluate(&table, expression)?;
            match table.column_index(name) {
                Some(index) => {
                    for (row, value) in table.rows.iter_mut().zip(derived) {
                        row[index] = value;
                    }
                }
                None => {
                    table.columns.push(name.clone());
                    for (row, value) in table.rows.iter_mut().zip(derived) {
                        row.push(value);
                    }
                }
            }
        }
    }
    Ok(table)
}

fn column_indices(table: &Table, columns: &[String]) -> Result<Vec<usize>, TransformError> {
    columns
        .iter()
        .map(|c| {
            table
                .column_index(c)
                .ok_or_else(|| TransformError::UnknownColumn(c.clone()))
        })
        .collect()
}

fn project(table: &Table, keep: &[usize]) -> Table {
    Table {
        columns: keep.iter().map(|&i| table.columns[i].clone()).collect(),
        rows: table
            .rows
            .iter()
            .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
            .collect(),
    }
}

fn numeric_column(table: &Table, index: usize) -> Vec<Option<f64>> {
    table
        .rows
        .iter()
        .map(|row| row[index].as_deref().and_then(parse_number))
        .collect()
}

fn json_to_cell(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Render a number the way it is written back to CSV
pub fn format_number(value: f64) -> String {
    value.to_string()
}

pub(crate) fn mean(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

pub(crate) fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(f64::total_cmp);
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        Some((present[mid - 1] + present[mid]) / 2.0)
    } else {
        Some(present[mid])
    }
}

/// Most frequent value; ties go to the smallest value
fn mode(table: &Table, index: usize) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in table.rows.iter().filter_map(|row| row[index].as_deref()) {
        *counts.entry(value).or_default() += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}

fn scale(values: &[Option<f64>], method: ScaleMethod) -> Vec<Option<f64>> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let (offset, divisor) = match method {
        ScaleMethod::Standardize => {
            let Some(mu) = mean(values) else {
                return values.to_vec();
            };
            let variance =
                present.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / present.len() as f64;
            (mu, variance.sqrt())
        }
        ScaleMethod::Normalize => {
            let min = present.iter().copied().fold(f64::INFINITY, f64::min);
            let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (min, max - min)
        }
    };
    if divisor == 0.0 || !divisor.is_finite() {
        return values.to_vec();
    }
    values
        .iter()
        .map(|v| v.map(|v| (v - offset) / divisor))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    fn parse(symbol: char) -> Option<Self> {
        match symbol {
            '+' => Some(Self::Add),
            '-' => Some(Self::Sub),
            '*' => Some(Self::Mul),
            '/' => Some(Self::Div),
            _ => None,
        }
    }

    fn apply(self, left: f64, right: f64) -> Option<f64> {
        let value = match self {
            Self::Add => left + right,
            Self::Sub => left - right,
            Self::Mul => left * right,
            Self::Div if right == 0.0 => return None,
            Self::Div => left / right,
        };
        finite(value)
    }
}

enum Operand {
    Column(usize),
    Number(f64),
}

impl Operand {
    fn value(&self, row: &[Option<String>]) -> Option<f64> {
        match self {
            Self::Column(index) => row[*index].as_deref().and_then(parse_number),
            Self::Number(value) => Some(*value),
        }
    }
}

/// Split `left op right`; the operator is the first one after a non-empty left side
fn split_expression(expression: &str) -> Option<(&str, Operator, &str)> {
    let trimmed = expression.trim();
    // Whitespace-separated form first, so column names may contain operator characters
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if let [left, op, right] = tokens.as_slice() {
        let mut chars = op.chars();
        if let (Some(symbol), None) = (chars.next(), chars.next()) {
            if let Some(operator) = Operator::parse(symbol) {
                return Some((*left, operator, *right));
            }
        }
    }
    trimmed.char_indices().skip(1).find_map(|(i, c)| {
        let operator = Operator::parse(c)?;
        let left = trimmed[..i].trim();
        let right = trimmed[i + c.len_utf8()..].trim();
        (!left.is_empty() && !right.is_empty()).then_some((left, operator, right))
    })
}

fn evaluate(table: &Table, expression: &str) -> Result<Vec<Option<String>>, TransformError> {
    let invalid = |reason: String| TransformError::InvalidExpression {
        expression: expression.to_string(),
        reason,
    };
    let (left, operator, right) = split_expression(expression)
        .ok_or_else(|| invalid("expected 'operand op operand' with + - * /".to_string()))?;

    let operand = |token: &str| -> Result<Operand, TransformError> {
        if let Some(index) = table.column_index(token) {
            Ok(Operand::Column(index))
        } else if let Some(value) = parse_number(token) {
            Ok(Operand::Number(value))
        } else {
            Err(invalid(format!("unknown column '{}'", token)))
        }
    };
    let left = operand(left)?;
    let right = operand(right)?;

    Ok(table
        .rows
        .iter()
        .map(|row| {
            let (l, r) = (left.value(row)?, right.value(row)?);
            operator.apply(l, r).map(format_number)
        })
        .collect())
}

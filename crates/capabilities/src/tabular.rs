//! Tabular samples
//!
//! Values are kept as optional strings exactly as read; an empty (or
//! whitespace-only) cell is `None`. Typed interpretation is left to callers.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PortError;

/// A rectangular block of rows under named columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    /// Every row has exactly `columns.len()` cells
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    /// Build a table, padding or truncating rows to the column count
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cells of one column, top to bottom
    pub fn column_values(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].as_deref()).collect())
    }

    /// Cells of one column parsed as numbers; unparseable cells are `None`
    pub fn numeric_values(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let values = self.column_values(name)?;
        Some(values.into_iter().map(|v| v.and_then(parse_number)).collect())
    }

    /// Number of null cells in one column
    pub fn null_count(&self, name: &str) -> usize {
        self.column_values(name)
            .map(|values| values.iter().filter(|v| v.is_none()).count())
            .unwrap_or(0)
    }
}

/// Parse a cell as a finite number
pub fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Bounded read of a tabular file
#[async_trait]
pub trait ReadTabularSample: Send + Sync {
    /// Read the header and at most `max_rows` data rows.
    async fn read_sample(&self, path: &Path, max_rows: usize) -> Result<Table, PortError>;
}

/// CSV implementation of [`ReadTabularSample`]
///
/// Rows may be ragged; short rows are padded with nulls.
#[derive(Debug, Clone, Copy)]
pub struct CsvSampleReader {
    delimiter: u8,
}

impl Default for CsvSampleReader {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvSampleReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    fn read_blocking(&self, path: &Path, max_rows: usize) -> Result<Table, PortError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_path(path)?;

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
                h.trim().to_string()
            })
            .collect();

        let mut rows = Vec::new();
        for record in reader.records().take(max_rows) {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|cell| {
                        let cell = cell.trim();
                        (!cell.is_empty()).then(|| cell.to_string())
                    })
                    .collect(),
            );
        }

        log::debug!(
            "Read {} rows x {} columns from {}",
            rows.len(),
            columns.len(),
            path.display()
        );
        Ok(Table::new(columns, rows))
    }
}

#[async_trait]
impl ReadTabularSample for CsvSampleReader {
    async fn read_sample(&self, path: &Path, max_rows: usize) -> Result<Table, PortError> {
        let reader = *self;
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || reader.read_blocking(&path, max_rows)).await?
    }
}

/// Write a table as CSV, creating parent directories. Nulls become empty cells.
pub async fn write_csv(path: &Path, table: &Table) -> Result<(), PortError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let path = path.to_path_buf();
    let table = table.clone();
    tokio::task::spawn_blocking(move || -> Result<(), PortError> {
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&table.columns)?;
        for row in &table.rows {
            writer.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(())
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cell(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[tokio::test]
    async fn test_read_sample_respects_limit_and_nulls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "\u{feff}a,b\n1,x\n,y\n3\n4,z\n").unwrap();

        let table = CsvSampleReader::new().read_sample(&path, 3).await.unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.rows[1], vec![None, cell("y")]);
        assert_eq!(table.rows[2], vec![cell("3"), None]);
        assert_eq!(table.null_count("a"), 1);
    }

    #[tokio::test]
    async fn test_read_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let result = CsvSampleReader::new()
            .read_sample(&dir.path().join("nope.csv"), 10)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        let table = Table::new(
            vec!["x".to_string(), "label".to_string()],
            vec![vec![cell("1.5"), None], vec![cell("2"), cell("b")]],
        );
        write_csv(&path, &table).await.unwrap();

        let read = CsvSampleReader::new().read_sample(&path, 100).await.unwrap();
        assert_eq!(read, table);
    }

    #[test]
    fn test_numeric_values() {
        let table = Table::new(
            vec!["v".to_string()],
            vec![vec![cell("1")], vec![cell("abc")], vec![None], vec![cell("NaN")]],
        );
        assert_eq!(
            table.numeric_values("v").unwrap(),
            vec![Some(1.0), None, None, None]
        );
        assert!(table.numeric_values("missing").is_none());
    }
}

//! Column classification for chart planning

use capabilities::{parse_number, Table};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Share of rows that must parse as dates for a column to count as temporal
const TEMPORAL_RATIO: f64 = 0.7;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%m/%d/%Y", "%Y%m%d"];

/// Column names grouped by inferred type, in table order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSets {
    pub numeric: Vec<String>,
    pub temporal: Vec<String>,
    pub categorical: Vec<String>,
}

impl ColumnSets {
    pub fn is_empty(&self) -> bool {
        self.numeric.is_empty() && self.temporal.is_empty() && self.categorical.is_empty()
    }
}

/// Parse a cell as a date or timestamp
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Classify every column of a sample
///
/// - numeric: at least one non-null value and every non-null value parses
/// - temporal: not numeric, and at least 70% of all rows parse as dates
/// - categorical: everything else, including all-null columns
pub fn classify_columns(table: &Table) -> ColumnSets {
    let mut sets = ColumnSets::default();
    let rows = table.row_count();

    for (idx, name) in table.columns.iter().enumerate() {
        let values: Vec<&str> = table
            .rows
            .iter()
            .filter_map(|row| row[idx].as_deref())
            .collect();

        if !values.is_empty() && values.iter().all(|v| parse_number(v).is_some()) {
            sets.numeric.push(name.clone());
            continue;
        }

        let parsed = values.iter().filter(|v| parse_datetime(v).is_some()).count();
        if rows > 0 && parsed as f64 / rows as f64 >= TEMPORAL_RATIO {
            sets.temporal.push(name.clone());
        } else {
            sets.categorical.push(name.clone());
        }
    }

    sets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|row| {
                    row.iter()
                        .map(|v| (!v.is_empty()).then(|| v.to_string()))
                        .collect()
                })
                .collect(),
        )
    }

    #[test]
    fn test_classify_mixed_columns() {
        let sample = table(
            &["date", "sales", "region", "note"],
            &[
                &["2024-01-01", "10", "north", ""],
                &["2024-01-02", "12.5", "south", ""],
                &["2024/01/03", "", "north", ""],
            ],
        );
        let sets = classify_columns(&sample);
        assert_eq!(sets.numeric, vec!["sales"]);
        assert_eq!(sets.temporal, vec!["date"]);
        assert_eq!(sets.categorical, vec!["region", "note"]);
    }

    #[test]
    fn test_temporal_threshold_counts_all_rows() {
        let sample = table(
            &["when"],
            &[&["2024-01-01"], &["2024-01-02"], &["soon"], &[""]],
        );
        let sets = classify_columns(&sample);
        assert_eq!(sets.categorical, vec!["when"]);
    }

    #[test]
    fn test_one_bad_value_makes_column_non_numeric() {
        let sample = table(&["v"], &[&["1"], &["2"], &["n/a"]]);
        assert_eq!(classify_columns(&sample).categorical, vec!["v"]);
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert!(parse_datetime("2024-03-01").is_some());
        assert!(parse_datetime("2024-03-01 12:30:00").is_some());
        assert!(parse_datetime("2024-03-01T12:30:00Z").is_some());
        assert!(parse_datetime("03/01/2024").is_some());
        assert!(parse_datetime("north").is_none());
        assert!(parse_datetime("").is_none());
    }
}

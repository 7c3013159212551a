//! Quantitative dataset summary used by reports

use capabilities::Table;
use chart_sandbox::classify_columns;
use serde::{Deserialize, Serialize};

use crate::constants::limits;
use crate::transform::{mean, median};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMissing {
    pub column: String,
    pub missing_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissingSummary {
    pub missing_cells: usize,
    pub total_cells: usize,
    pub missing_rate: f64,
    /// Highest missing rates first, only columns with something missing
    pub top_missing_columns: Vec<ColumnMissing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub column: String,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; absent for a single value
    pub std: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub column_1: String,
    pub column_2: String,
    pub correlation: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportMetrics {
    pub source_id: Option<String>,
    pub row_count: usize,
    pub column_count: usize,
    pub missing: MissingSummary,
    pub numeric_stats: Vec<NumericStats>,
    pub top_correlations: Vec<Correlation>,
}

impl ReportMetrics {
    /// Metrics for a dataset that could not be read
    pub fn empty(source_id: Option<String>) -> Self {
        Self {
            source_id,
            ..Default::default()
        }
    }
}

fn round(value: f64) -> f64 {
    let factor = 10f64.powi(limits::METRIC_DIGITS);
    (value * factor).round() / factor
}

/// Summarize a table: size, missing values, numeric stats and correlations
pub fn build_metrics(table: &Table, source_id: Option<String>) -> ReportMetrics {
    let row_count = table.row_count();
    let column_count = table.column_count();
    let total_cells = row_count * column_count;

    let mut by_column: Vec<ColumnMissing> = table
        .columns
        .iter()
        .map(|column| ColumnMissing {
            column: column.clone(),
            missing_rate: if row_count > 0 {
                table.null_count(column) as f64 / row_count as f64
            } else {
                0.0
            },
        })
        .collect();
    let missing_cells: usize = table.columns.iter().map(|c| table.null_count(c)).sum();

    by_column.sort_by(|a, b| b.missing_rate.total_cmp(&a.missing_rate));
    let top_missing_columns = by_column
        .into_iter()
        .take(limits::TOP_MISSING_COLUMNS)
        .filter(|c| c.missing_rate > 0.0)
        .map(|c| ColumnMissing {
            missing_rate: round(c.missing_rate),
            ..c
        })
        .collect();

    let numeric: Vec<(String, Vec<Option<f64>>)> = classify_columns(table)
        .numeric
        .into_iter()
        .filter_map(|name| table.numeric_values(&name).map(|values| (name, values)))
        .collect();

    let numeric_stats = numeric
        .iter()
        .take(limits::NUMERIC_STATS_COLUMNS)
        .filter_map(|(name, values)| column_stats(name, values))
        .collect();

    ReportMetrics {
        source_id,
        row_count,
        column_count,
        missing: MissingSummary {
            missing_cells,
            total_cells,
            missing_rate: if total_cells > 0 {
                round(missing_cells as f64 / total_cells as f64)
            } else {
                0.0
            },
            top_missing_columns,
        },
        numeric_stats,
        top_correlations: top_correlations(&numeric),
    }
}

fn column_stats(column: &str, values: &[Option<f64>]) -> Option<NumericStats> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let mean = mean(values)?;
    let median = median(values)?;
    let min = present.iter().copied().fold(f64::INFINITY, f64::min);
    let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let std = (present.len() > 1).then(|| {
        let variance =
            present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (present.len() - 1) as f64;
        round(variance.sqrt())
    });
    Some(NumericStats {
        column: column.to_string(),
        min: round(min),
        max: round(max),
        mean: round(mean),
        median: round(median),
        std,
    })
}

/// Pearson correlation over rows where both values are present
fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then_some(r)
}

fn top_correlations(numeric: &[(String, Vec<Option<f64>>)]) -> Vec<Correlation> {
    let mut pairs = Vec::new();
    for (i, (name_1, values_1)) in numeric.iter().enumerate() {
        for (name_2, values_2) in &numeric[i + 1..] {
            if let Some(r) = pearson(values_1, values_2) {
                pairs.push(Correlation {
                    column_1: name_1.clone(),
                    column_2: name_2.clone(),
                    correlation: r,
                });
            }
        }
    }
    pairs.sort_by(|a, b| b.correlation.abs().total_cmp(&a.correlation.abs()));
    pairs
        .into_iter()
        .take(limits::TOP_CORRELATIONS)
        .map(|c| Correlation {
            correlation: round(c.correlation),
            ..c
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| {
                    r.iter()
                        .map(|v| (!v.is_empty()).then(|| v.to_string()))
                        .collect()
                })
                .collect(),
        )
    }

    #[test]
    fn test_missing_summary() {
        let t = table(
            &["a", "b", "c"],
            &[&["1", "", "x"], &["2", "", ""], &["3", "4", "z"], &["4", "5", "w"]],
        );
        let m = build_metrics(&t, Some("src".to_string()));
        assert_eq!(m.row_count, 4);
        assert_eq!(m.column_count, 3);
        assert_eq!(m.missing.missing_cells, 3);
        assert_eq!(m.missing.total_cells, 12);
        assert_eq!(m.missing.missing_rate, 0.25);
        let names: Vec<&str> = m
            .missing
            .top_missing_columns
            .iter()
            .map(|c| c.column.as_str())
            .collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(m.missing.top_missing_columns[0].missing_rate, 0.5);
    }

    #[test]
    fn test_numeric_stats_are_rounded() {
        let t = table(&["v", "label"], &[&["1"], &["2"], &["4"]]);
        let m = build_metrics(&t, None);
        assert_eq!(m.numeric_stats.len(), 1);
        let stats = &m.numeric_stats[0];
        assert_eq!(stats.column, "v");
        assert_eq!((stats.min, stats.max), (1.0, 4.0));
        assert_eq!(stats.mean, 2.3333);
        assert_eq!(stats.median, 2.0);
        assert_eq!(stats.std, Some(1.5275));
    }

    #[test]
    fn test_correlations_sorted_by_magnitude() {
        let t = table(
            &["x", "up", "down", "noise"],
            &[
                &["1", "2", "10", "5"],
                &["2", "4", "8", "1"],
                &["3", "6", "7", "4"],
                &["4", "8", "1", "2"],
            ],
        );
        let m = build_metrics(&t, None);
        let first = &m.top_correlations[0];
        assert_eq!((first.column_1.as_str(), first.column_2.as_str()), ("x", "up"));
        assert_eq!(first.correlation, 1.0);
        assert!(m.top_correlations.len() <= 5);
        assert!(m
            .top_correlations
            .windows(2)
            .all(|w| w[0].correlation.abs() >= w[1].correlation.abs()));
    }

    #[test]
    fn test_constant_column_has_no_correlation() {
        let t = table(&["a", "b"], &[&["1", "7"], &["2", "7"], &["3", "7"]]);
        let m = build_metrics(&t, None);
        assert!(m.top_correlations.is_empty());
        assert_eq!(m.numeric_stats[1].std, Some(0.0));
    }
}

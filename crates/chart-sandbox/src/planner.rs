//! Rule-based chart planning
//!
//! The same sample, requested type and query always produce the same plan.

use std::path::Path;

use capabilities::Table;

use crate::columns::{classify_columns, ColumnSets};
use crate::defaults;
use crate::template::{build_script, ScriptParams};
use crate::types::{ChartType, PlanMode, PlanStatus, VisualizationPlan};

/// Keywords checked in order; ASCII ones match case-insensitively
const CHART_KEYWORDS: &[(ChartType, &[&str])] = &[
    (ChartType::Scatter, &["scatter", "산점도", "점그래프"]),
    (ChartType::Line, &["line", "라인", "선그래프", "시계열"]),
    (ChartType::Bar, &["bar", "막대"]),
    (ChartType::Hist, &["hist", "histogram", "히스토그램"]),
    (ChartType::Box, &["box", "boxplot", "박스플롯"]),
];

/// Detect a chart type named in a free-text request
pub fn detect_requested_chart_type(query: &str) -> Option<ChartType> {
    let lowered = query.to_lowercase();
    CHART_KEYWORDS
        .iter()
        .find(|(_, keywords)| {
            keywords.iter().any(|keyword| {
                if keyword.is_ascii() {
                    lowered.contains(keyword)
                } else {
                    query.contains(keyword)
                }
            })
        })
        .map(|(chart_type, _)| *chart_type)
}

/// Columns and reason picked for a chart
struct Selection {
    chart_type: ChartType,
    x_key: String,
    y_key: String,
    x_is_temporal: bool,
    reason: String,
}

impl Selection {
    fn new(chart_type: ChartType, x_key: &str, y_key: &str, reason: &str) -> Self {
        Self {
            chart_type,
            x_key: x_key.to_string(),
            y_key: y_key.to_string(),
            x_is_temporal: false,
            reason: reason.to_string(),
        }
    }

    fn temporal(mut self) -> Self {
        self.x_is_temporal = true;
        self
    }
}

/// Builds visualization plans from a sample
#[derive(Debug, Clone)]
pub struct ChartPlanner {
    max_points: usize,
}

impl Default for ChartPlanner {
    fn default() -> Self {
        Self {
            max_points: defaults::MAX_POINTS,
        }
    }
}

impl ChartPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points;
        self
    }

    /// Plan a chart for a sample of the dataset at `dataset_path`
    ///
    /// An explicit `requested` type wins over one detected in `query`.
    pub fn plan(
        &self,
        sample: &Table,
        requested: Option<ChartType>,
        query: &str,
        dataset_path: &Path,
    ) -> VisualizationPlan {
        let requested = requested.or_else(|| detect_requested_chart_type(query));
        if sample.is_empty() {
            return VisualizationPlan::unavailable(
                mode_for(requested),
                requested,
                "The dataset sample is empty, so no chart can be planned.",
            );
        }
        self.plan_with_columns(&classify_columns(sample), requested, dataset_path)
    }

    /// Plan from already classified columns
    pub fn plan_with_columns(
        &self,
        columns: &ColumnSets,
        requested: Option<ChartType>,
        dataset_path: &Path,
    ) -> VisualizationPlan {
        let mode = mode_for(requested);
        let selection = match requested {
            Some(chart_type) => select_requested(chart_type, columns),
            None => select_automatic(columns),
        };

        let selection = match selection {
            Ok(selection) => selection,
            Err(reason) => return VisualizationPlan::unavailable(mode, requested, reason),
        };

        let dataset_path = std::path::absolute(dataset_path)
            .unwrap_or_else(|_| dataset_path.to_path_buf());
        let output_filename = format!("viz_{}.png", selection.chart_type);
        let python_code = build_script(&ScriptParams {
            dataset_path: &dataset_path,
            chart_type: selection.chart_type,
            x_key: &selection.x_key,
            y_key: &selection.y_key,
            output_filename: &output_filename,
            max_points: self.max_points,
            x_is_temporal: selection.x_is_temporal,
        });

        log::debug!(
            "Planned {} chart ({:?}): x='{}' y='{}'",
            selection.chart_type,
            mode,
            selection.x_key,
            selection.y_key
        );

        VisualizationPlan {
            status: PlanStatus::Planned,
            mode,
            chart_type: Some(selection.chart_type),
            x_key: selection.x_key,
            y_key: selection.y_key,
            reason: selection.reason,
            python_code,
            output_filename,
            x_is_temporal: selection.x_is_temporal,
        }
    }
}

fn mode_for(requested: Option<ChartType>) -> PlanMode {
    if requested.is_some() {
        PlanMode::Specified
    } else {
        PlanMode::Auto
    }
}

fn select_requested(chart_type: ChartType, c: &ColumnSets) -> Result<Selection, &'static str> {
    match chart_type {
        ChartType::Scatter => match c.numeric.as_slice() {
            [x, y, ..] => Ok(Selection::new(
                ChartType::Scatter,
                x,
                y,
                "Scatter chart requested; using the first two numeric columns.",
            )),
            _ => Err("A scatter chart was requested but fewer than two numeric columns exist."),
        },
        ChartType::Line => {
            if let (Some(x), Some(y)) = (c.temporal.first(), c.numeric.first()) {
                Ok(Selection::new(
                    ChartType::Line,
                    x,
                    y,
                    "Line chart requested; using a date column against a numeric column.",
                )
                .temporal())
            } else if let [x, y, ..] = c.numeric.as_slice() {
                Ok(Selection::new(
                    ChartType::Line,
                    x,
                    y,
                    "Line chart requested without a date column; using two numeric columns.",
                ))
            } else {
                Err("A line chart was requested but no usable column pair exists.")
            }
        }
        ChartType::Bar => match (c.categorical.first(), c.numeric.first()) {
            (Some(x), Some(y)) => Ok(Selection::new(
                ChartType::Bar,
                x,
                y,
                "Bar chart requested; using a categorical column against a numeric column.",
            )),
            _ => Err("A bar chart was requested but no categorical and numeric column pair exists."),
        },
        ChartType::Hist => match c.numeric.first() {
            Some(x) => Ok(Selection::new(
                ChartType::Hist,
                x,
                "",
                "Histogram requested; using the first numeric column.",
            )),
            None => Err("A histogram was requested but there is no numeric column."),
        },
        ChartType::Box => match (c.categorical.first(), c.numeric.first()) {
            (Some(x), Some(y)) => Ok(Selection::new(
                ChartType::Box,
                x,
                y,
                "Box plot requested; grouping a numeric column by a categorical column.",
            )),
            _ => Err("A box plot was requested but no categorical and numeric column pair exists."),
        },
    }
}

fn select_automatic(c: &ColumnSets) -> Result<Selection, &'static str> {
    if let (Some(x), Some(y)) = (c.temporal.first(), c.numeric.first()) {
        return Ok(Selection::new(
            ChartType::Line,
            x,
            y,
            "Detected a date column and a numeric column; chose a line chart.",
        )
        .temporal());
    }
    match c.numeric.as_slice() {
        [x, y, ..] => Ok(Selection::new(
            ChartType::Scatter,
            x,
            y,
            "Detected two or more numeric columns; chose a scatter chart.",
        )),
        [x] => Ok(Selection::new(
            ChartType::Hist,
            x,
            "",
            "Detected a single numeric column; chose a histogram.",
        )),
        // With no numeric column the categorical + numeric bar rule cannot apply.
        [] => Err("No column combination suitable for a chart was found."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sets(numeric: &[&str], temporal: &[&str], categorical: &[&str]) -> ColumnSets {
        let own = |v: &[&str]| -> Vec<String> { v.iter().map(|s| s.to_string()).collect() };
        ColumnSets {
            numeric: own(numeric),
            temporal: own(temporal),
            categorical: own(categorical),
        }
    }

    fn planner() -> ChartPlanner {
        ChartPlanner::new()
    }

    #[test]
    fn test_detect_keywords() {
        assert_eq!(detect_requested_chart_type("Show a SCATTER plot"), Some(ChartType::Scatter));
        assert_eq!(detect_requested_chart_type("매출 시계열 보여줘"), Some(ChartType::Line));
        assert_eq!(detect_requested_chart_type("히스토그램 그려줘"), Some(ChartType::Hist));
        assert_eq!(detect_requested_chart_type("boxplot please"), Some(ChartType::Box));
        assert_eq!(detect_requested_chart_type("what is the average?"), None);
    }

    #[test]
    fn test_single_numeric_column_gives_histogram() {
        let plan = planner().plan_with_columns(&sets(&["price"], &[], &[]), None, Path::new("/d.csv"));
        assert!(plan.is_planned());
        assert_eq!(plan.mode, PlanMode::Auto);
        assert_eq!(plan.chart_type, Some(ChartType::Hist));
        assert_eq!(plan.x_key, "price");
        assert_eq!(plan.y_key, "");
        assert_eq!(plan.output_filename, "viz_hist.png");
        assert!(plan.python_code.contains("plt.hist"));
    }

    #[test]
    fn test_automatic_prefers_temporal_line() {
        let plan = planner().plan_with_columns(
            &sets(&["a", "b"], &["day"], &["region"]),
            None,
            Path::new("/d.csv"),
        );
        assert_eq!(plan.chart_type, Some(ChartType::Line));
        assert_eq!((plan.x_key.as_str(), plan.y_key.as_str()), ("day", "a"));
        assert!(plan.x_is_temporal);

        let plan = planner().plan_with_columns(&sets(&["a", "b"], &[], &["r"]), None, Path::new("/d.csv"));
        assert_eq!(plan.chart_type, Some(ChartType::Scatter));
    }

    #[test]
    fn test_requested_type_rules() {
        let columns = sets(&["v"], &[], &["group"]);
        let path = Path::new("/d.csv");

        let scatter = planner().plan_with_columns(&columns, Some(ChartType::Scatter), path);
        assert_eq!(scatter.status, PlanStatus::Unavailable);
        assert_eq!(scatter.mode, PlanMode::Specified);
        assert!(scatter.python_code.is_empty());
        assert!(!scatter.reason.is_empty());

        let bar = planner().plan_with_columns(&columns, Some(ChartType::Bar), path);
        assert_eq!((bar.x_key.as_str(), bar.y_key.as_str()), ("group", "v"));

        let boxed = planner().plan_with_columns(&sets(&["v"], &[], &[]), Some(ChartType::Box), path);
        assert_eq!(boxed.status, PlanStatus::Unavailable);

        let line = planner().plan_with_columns(&sets(&["a", "b"], &[], &[]), Some(ChartType::Line), path);
        assert_eq!(line.chart_type, Some(ChartType::Line));
        assert!(!line.x_is_temporal);
    }

    #[test]
    fn test_only_categorical_is_unavailable() {
        let plan = planner().plan_with_columns(&sets(&[], &[], &["name"]), None, Path::new("/d.csv"));
        assert_eq!(plan.status, PlanStatus::Unavailable);
        assert_eq!(plan.chart_type, None);
    }

    #[test]
    fn test_plan_is_deterministic_and_uses_query() {
        let sample = Table::new(
            vec!["x".to_string(), "y".to_string()],
            vec![
                vec![Some("1".to_string()), Some("2".to_string())],
                vec![Some("3".to_string()), Some("5".to_string())],
            ],
        );
        let path = Path::new("/data/sample.csv");
        let first = planner().plan(&sample, None, "draw a histogram", path);
        let second = planner().plan(&sample, None, "draw a histogram", path);
        assert_eq!(first, second);
        assert_eq!(first.chart_type, Some(ChartType::Hist));
        assert_eq!(first.mode, PlanMode::Specified);

        let explicit = planner().plan(&sample, Some(ChartType::Scatter), "draw a histogram", path);
        assert_eq!(explicit.chart_type, Some(ChartType::Scatter));
    }

    #[test]
    fn test_empty_sample_is_unavailable() {
        let sample = Table::new(vec!["x".to_string()], vec![]);
        let plan = planner().plan(&sample, None, "", Path::new("/d.csv"));
        assert_eq!(plan.status, PlanStatus::Unavailable);
    }
}

//! Chart script template
//!
//! Only validated column names, the resolved dataset path and the output
//! filename are interpolated, always as quoted string literals.

use std::path::Path;

use crate::types::ChartType;

/// Inputs of [`build_script`]
pub struct ScriptParams<'a> {
    pub dataset_path: &'a Path,
    pub chart_type: ChartType,
    pub x_key: &'a str,
    pub y_key: &'a str,
    pub output_filename: &'a str,
    pub max_points: usize,
    pub x_is_temporal: bool,
}

/// Quote a value as a Python string literal
///
/// JSON string escapes are a subset of Python's, so the JSON encoding of a
/// string is a valid Python literal with the same value.
fn py(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Render a standalone matplotlib script that writes the chart next to itself
pub fn build_script(params: &ScriptParams<'_>) -> String {
    let x = py(params.x_key);
    let y = py(params.y_key);

    let mut script = format!(
        "from pathlib import Path\n\
         import pandas as pd\n\
         import matplotlib\n\
         matplotlib.use('Agg')\n\
         import matplotlib.pyplot as plt\n\
         \n\
         dataset_path = Path({dataset})\n\
         output_path = Path(__file__).resolve().parent / {output}\n\
         max_points = {max_points}\n\
         \n\
         df = pd.read_csv(dataset_path)\n\
         plt.figure(figsize=(8, 5))\n",
        dataset = py(&params.dataset_path.to_string_lossy()),
        output = py(params.output_filename),
        max_points = params.max_points,
    );

    let body = match params.chart_type {
        ChartType::Scatter => format!(
            "data = df[[{x}, {y}]].dropna().head(max_points)\n\
             plt.scatter(data[{x}], data[{y}], alpha=0.7, s=25)\n\
             plt.xlabel({x})\n\
             plt.ylabel({y})\n\
             plt.title({title})\n",
            title = py(&format!("Scatter: {} vs {}", params.x_key, params.y_key)),
        ),
        ChartType::Line => {
            let select = if params.x_is_temporal {
                format!(
                    "data = df[[{x}, {y}]].dropna().copy()\n\
                     data[{x}] = pd.to_datetime(data[{x}], errors='coerce')\n\
                     data = data.dropna().sort_values({x}).head(max_points)\n"
                )
            } else {
                format!("data = df[[{x}, {y}]].dropna().head(max_points)\n")
            };
            format!(
                "{select}\
                 plt.plot(data[{x}], data[{y}], linewidth=1.8)\n\
                 plt.xlabel({x})\n\
                 plt.ylabel({y})\n\
                 plt.title({title})\n",
                title = py(&format!("Line: {} vs {}", params.x_key, params.y_key)),
            )
        }
        ChartType::Hist => format!(
            "series = df[{x}].dropna().head(max_points)\n\
             plt.hist(series, bins=20, edgecolor='white')\n\
             plt.xlabel({x})\n\
             plt.ylabel('count')\n\
             plt.title({title})\n",
            title = py(&format!("Histogram: {}", params.x_key)),
        ),
        ChartType::Bar => format!(
            "data = df[[{x}, {y}]].dropna().copy()\n\
             data[{x}] = data[{x}].astype(str)\n\
             grouped = data.groupby({x}, as_index=False)[{y}].mean().head(20)\n\
             plt.bar(grouped[{x}], grouped[{y}])\n\
             plt.xlabel({x})\n\
             plt.ylabel({y})\n\
             plt.title({title})\n\
             plt.xticks(rotation=45, ha='right')\n",
            title = py(&format!("Bar(mean): {} vs {}", params.x_key, params.y_key)),
        ),
        ChartType::Box => format!(
            "data = df[[{x}, {y}]].dropna().copy()\n\
             data[{x}] = data[{x}].astype(str)\n\
             labels = []\n\
             groups = []\n\
             for label, group in data.groupby({x}):\n\
             \x20   labels.append(label)\n\
             \x20   groups.append(group[{y}].values)\n\
             plt.boxplot(groups[:20], labels=labels[:20], showfliers=True)\n\
             plt.xticks(rotation=45, ha='right')\n\
             plt.ylabel({y})\n\
             plt.title({title})\n",
            title = py(&format!("Boxplot: {} by {}", params.y_key, params.x_key)),
        ),
    };

    script.push_str(&body);
    script.push_str("plt.tight_layout()\nplt.savefig(output_path, dpi=150)\n");
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(chart_type: ChartType, x_key: &'static str, y_key: &'static str) -> ScriptParams<'static> {
        ScriptParams {
            dataset_path: Path::new("/data/sales.csv"),
            chart_type,
            x_key,
            y_key,
            output_filename: "viz_test.png",
            max_points: 120,
            x_is_temporal: false,
        }
    }

    #[test]
    fn test_script_header() {
        let script = build_script(&params(ChartType::Scatter, "a", "b"));
        assert!(script.contains("dataset_path = Path(\"/data/sales.csv\")\n"));
        assert!(script.contains("/ \"viz_test.png\"\n"));
        assert!(script.contains("max_points = 120\n"));
        assert!(script.contains("plt.scatter(data[\"a\"], data[\"b\"], alpha=0.7, s=25)"));
        assert!(script.ends_with("plt.savefig(output_path, dpi=150)\n"));
    }

    #[test]
    fn test_column_names_are_quoted() {
        let script = build_script(&params(ChartType::Hist, "x\"]); import os; (\"", ""));
        assert!(script.contains(r#"df["x\"]); import os; (\""]"#));
        assert!(!script.contains("\nimport os"));
    }

    #[test]
    fn test_temporal_line_converts_dates() {
        let mut p = params(ChartType::Line, "day", "sales");
        p.x_is_temporal = true;
        let script = build_script(&p);
        assert!(script.contains("pd.to_datetime(data[\"day\"], errors='coerce')"));
        assert!(script.contains("sort_values(\"day\")"));
    }

    #[test]
    fn test_box_loop_is_indented() {
        let script = build_script(&params(ChartType::Box, "group", "v"));
        assert!(script.contains("for label, group in data.groupby(\"group\"):\n    labels.append(label)\n    groups.append"));
    }

    #[test]
    fn test_non_ascii_names_survive() {
        let script = build_script(&params(ChartType::Bar, "지역", "매출"));
        assert!(script.contains("data.groupby(\"지역\", as_index=False)[\"매출\"]"));
    }
}

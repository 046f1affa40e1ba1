use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tabled::Tabled;

/// One row of tabular survey/initiative data: attribute key to scalar value,
/// in source column order.
pub type Record = Map<String, Value>;

/// Attribute label to target value. `"All"` means "no constraint".
pub type FilterSet = BTreeMap<String, String>;

pub const FILTER_ALL: &str = "All";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = "contains")]
    Contains,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Operator> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Some(Operator::Eq),
            "!=" => Some(Operator::NotEq),
            ">" => Some(Operator::Gt),
            "<" => Some(Operator::Lt),
            ">=" => Some(Operator::GtEq),
            "<=" => Some(Operator::LtEq),
            "contains" => Some(Operator::Contains),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connector {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub attribute: String,
    pub operator: Operator,
    pub value: String,
    /// Always `None` on the first expression of a chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<Connector>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub attribute: String,
    pub direction: SortDirection,
}

pub const MAX_TREND_VARIABLES: usize = 5;
pub const TREND_METHOD_HALF_SPLIT: &str = "half_split";
pub const DEFAULT_THRESHOLD_PCT: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendConfig {
    pub variables: Vec<String>,
    pub enabled_calc: bool,
    pub enabled_display: bool,
    pub method: String,
    pub threshold_pct: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            variables: Vec::new(),
            enabled_calc: false,
            enabled_display: true,
            method: TREND_METHOD_HALF_SPLIT.to_string(),
            threshold_pct: DEFAULT_THRESHOLD_PCT,
        }
    }
}

/// What a report is being generated for. Record sources use it to scope
/// their rows and it is part of the trend identifier digest, so two reports
/// over the same rows still get distinct trend ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportContext {
    pub initiative_id: Option<i64>,
    pub initiative_name: Option<String>,
    pub report_name: Option<String>,
    pub time_period: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrendDirection::Up => "up",
            TrendDirection::Down => "down",
            TrendDirection::Stable => "stable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendResult {
    pub trend_id: String,
    pub attributes: Vec<String>,
    pub direction: TrendDirection,
    pub magnitude: f64,
    pub confidence_score: u8,
    pub time_period: String,
    pub description: String,
    pub enabled_display: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_rows: usize,
    pub total_rows_unfiltered: usize,
    pub filter_match_rate: f64,
    pub numeric_averages: BTreeMap<String, f64>,
    pub category_counts: BTreeMap<String, BTreeMap<String, usize>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedByStep {
    pub filters: usize,
    pub expressions: usize,
    pub sorting: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explainability {
    pub input_row_count: usize,
    pub after_filter_count: usize,
    pub after_expression_count: usize,
    pub output_row_count: usize,
    pub dropped_by_step: DroppedByStep,
}

impl Explainability {
    pub fn from_counts(input: usize, after_filter: usize, after_expression: usize, output: usize) -> Self {
        Self {
            input_row_count: input,
            after_filter_count: after_filter,
            after_expression_count: after_expression,
            output_row_count: output,
            dropped_by_step: DroppedByStep {
                filters: input.saturating_sub(after_filter),
                expressions: after_filter.saturating_sub(after_expression),
                sorting: after_expression.saturating_sub(output),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Average,
    Distribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub attribute: String,
    pub kind: ChartKind,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub headline: String,
    pub highlights: Vec<String>,
}

// Console preview rows.

#[derive(Debug, Tabled, Clone)]
pub struct StageRow {
    #[tabled(rename = "Stage")]
    pub stage: String,
    #[tabled(rename = "RowsIn")]
    pub rows_in: String,
    #[tabled(rename = "RowsOut")]
    pub rows_out: String,
    #[tabled(rename = "Dropped")]
    pub dropped: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct MetricRow {
    #[tabled(rename = "Attribute")]
    pub attribute: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct TrendRow {
    #[tabled(rename = "TrendId")]
    pub trend_id: String,
    #[tabled(rename = "Attributes")]
    pub attributes: String,
    #[tabled(rename = "Direction")]
    pub direction: String,
    #[tabled(rename = "Magnitude")]
    pub magnitude: String,
    #[tabled(rename = "Confidence")]
    pub confidence: String,
}

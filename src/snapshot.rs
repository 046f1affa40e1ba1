//! Persisted report snapshots and their read-time upgrade.
//!
//! Snapshots are written once as JSON and never edited. Readers pass the
//! stored blob through [`normalize_snapshot`], which understands every
//! schema version that has been written and returns the current shape. The
//! stored value is only borrowed; upgrading never rewrites it.

use crate::error::{ReportError, ReportResult};
use crate::types::{
    ChartSeries, Explainability, Expression, FilterSet, Metrics, Record, ReportSummary, SortSpec,
    TrendConfig, TrendResult,
};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

pub const CURRENT_SNAPSHOT_VERSION: u32 = 2;

/// Fallback confidence for trend entries written before confidence existed.
pub const LEGACY_CONFIDENCE_SCORE: u8 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConfig {
    pub initiative_id: i64,
    pub filters: FilterSet,
    pub expressions: Vec<Expression>,
    pub sorts: Vec<SortSpec>,
    pub trend_config: TrendConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResults {
    pub metrics: Metrics,
    pub filtered_table_data: Vec<Record>,
    pub trend_data: Vec<TrendResult>,
    pub explainability: Explainability,
    pub chart_data: Vec<ChartSeries>,
    pub summary: ReportSummary,
    pub report_id: String,
    pub generated_date: String,
    pub initiative_name: Option<String>,
}

/// A report as written at generation time (current schema).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSnapshot {
    pub version: u32,
    pub config: SnapshotConfig,
    pub results: SnapshotResults,
    pub generated_at: String,
}

/// Configuration half of a stored snapshot after normalization. Values are
/// kept as stored; only their container shapes are guaranteed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredConfig {
    pub initiative_id: Value,
    pub filters: Map<String, Value>,
    pub expressions: Vec<Value>,
    pub sorts: Vec<Value>,
    pub trend_config: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResults {
    pub metrics: Map<String, Value>,
    pub filtered_table_data: Vec<Value>,
    pub trend_data: Vec<Value>,
    pub explainability: Map<String, Value>,
    pub chart_data: Vec<Value>,
    pub summary: Value,
    pub report_id: Value,
    pub generated_date: Value,
    pub initiative_name: Value,
}

/// Any stored snapshot, upgraded in memory to the current schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSnapshot {
    pub version: u32,
    pub config: StoredConfig,
    pub results: StoredResults,
    pub generated_at: Value,
}

impl CurrentSnapshot {
    /// Typed explainability trace, if the stored block has the full shape.
    pub fn explainability(&self) -> Option<Explainability> {
        serde_json::from_value(Value::Object(self.results.explainability.clone())).ok()
    }

    /// Trend entries that still parse as trend results.
    pub fn trend_results(&self) -> Vec<TrendResult> {
        self.results
            .trend_data
            .iter()
            .filter_map(|t| serde_json::from_value(t.clone()).ok())
            .collect()
    }
}

/// Schema version of a stored snapshot, borrowed from the raw value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapshotVersion<'a> {
    V1(&'a Map<String, Value>),
    V2(&'a Map<String, Value>),
}

impl<'a> SnapshotVersion<'a> {
    /// `None` for anything that is not a JSON object. A missing or
    /// unreadable version tag means the first schema.
    pub fn classify(raw: &'a Value) -> Option<SnapshotVersion<'a>> {
        let obj = raw.as_object()?;
        let version = match obj.get("version") {
            Some(Value::Number(n)) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .map(|f| f as u64)
            }),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        Some(match version {
            Some(v) if v >= 2 => SnapshotVersion::V2(obj),
            _ => SnapshotVersion::V1(obj),
        })
    }

    pub fn upgrade(self) -> CurrentSnapshot {
        match self {
            SnapshotVersion::V1(obj) => upgrade_v1(obj),
            SnapshotVersion::V2(obj) => coerce_v2(obj),
        }
    }
}

fn object_field(obj: Option<&Map<String, Value>>, key: &str) -> Map<String, Value> {
    match obj.and_then(|o| o.get(key)) {
        Some(Value::Object(m)) => m.clone(),
        _ => Map::new(),
    }
}

fn array_field(obj: Option<&Map<String, Value>>, key: &str) -> Vec<Value> {
    match obj.and_then(|o| o.get(key)) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn value_field(obj: Option<&Map<String, Value>>, key: &str) -> Value {
    obj.and_then(|o| o.get(key)).cloned().unwrap_or(Value::Null)
}

fn coerce_v2(obj: &Map<String, Value>) -> CurrentSnapshot {
    let config = obj.get("config").and_then(Value::as_object);
    let results = obj.get("results").and_then(Value::as_object);

    let summary = match results.and_then(|r| r.get("summary")) {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(v) => v.clone(),
    };

    CurrentSnapshot {
        version: CURRENT_SNAPSHOT_VERSION,
        config: StoredConfig {
            initiative_id: value_field(config, "initiativeId"),
            filters: object_field(config, "filters"),
            expressions: array_field(config, "expressions"),
            sorts: array_field(config, "sorts"),
            trend_config: object_field(config, "trendConfig"),
        },
        results: StoredResults {
            metrics: object_field(results, "metrics"),
            filtered_table_data: array_field(results, "filteredTableData"),
            trend_data: array_field(results, "trendData"),
            explainability: object_field(results, "explainability"),
            chart_data: array_field(results, "chartData"),
            summary,
            report_id: value_field(results, "reportId"),
            generated_date: value_field(results, "generatedDate"),
            initiative_name: value_field(results, "initiativeName"),
        },
        generated_at: value_field(Some(obj), "generatedAt"),
    }
}

fn legacy_count(metrics: &Map<String, Value>, key: &str, fallback: usize) -> usize {
    metrics
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(fallback)
}

/// Version 1 had no trend config, no per-trend confidence and no
/// explainability trace. Fill them in from what the legacy blob does carry.
fn upgrade_v1(obj: &Map<String, Value>) -> CurrentSnapshot {
    let mut snapshot = coerce_v2(obj);

    if snapshot.config.trend_config.is_empty() {
        if let Ok(Value::Object(defaults)) = serde_json::to_value(TrendConfig::default()) {
            snapshot.config.trend_config = defaults;
        }
    }

    for entry in snapshot.results.trend_data.iter_mut() {
        if let Value::Object(trend) = entry {
            trend
                .entry("confidenceScore")
                .or_insert(Value::from(LEGACY_CONFIDENCE_SCORE));
        }
    }

    let rows = snapshot.results.filtered_table_data.len();
    let metrics = &snapshot.results.metrics;
    let output = legacy_count(metrics, "totalRows", rows);
    let input = legacy_count(metrics, "totalRowsUnfiltered", output).max(output);
    // Legacy snapshots kept no per-stage counts; attribute all drops to filters.
    let trace = Explainability::from_counts(input, output, output, output);
    if let Ok(Value::Object(block)) = serde_json::to_value(trace) {
        snapshot.results.explainability = block;
    }

    debug!("upgraded v1 snapshot: {} input rows, {} output rows", input, output);
    snapshot
}

/// Upgrade a stored snapshot to the current schema. Returns `None` only for
/// values that are not JSON objects.
pub fn normalize_snapshot(raw: &Value) -> Option<CurrentSnapshot> {
    SnapshotVersion::classify(raw).map(SnapshotVersion::upgrade)
}

/// Read and normalize a snapshot JSON file.
pub fn read_snapshot(path: &Path) -> ReportResult<CurrentSnapshot> {
    let text = fs::read_to_string(path)?;
    let raw: Value = serde_json::from_str(&text)?;
    normalize_snapshot(&raw).ok_or(ReportError::UnreadableSnapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_objects_are_rejected() {
        assert!(normalize_snapshot(&Value::Null).is_none());
        assert!(normalize_snapshot(&json!("not an object")).is_none());
        assert!(normalize_snapshot(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_empty_v1_gets_explainability() {
        let snap = normalize_snapshot(&json!({"version": 1, "config": {}, "results": {}})).unwrap();
        assert_eq!(snap.version, CURRENT_SNAPSHOT_VERSION);
        let block = &snap.results.explainability;
        for key in ["inputRowCount", "afterFilterCount", "afterExpressionCount", "outputRowCount"] {
            assert!(block[key].is_number(), "{} should be numeric", key);
        }
        assert_eq!(snap.config.trend_config["enabledCalc"], json!(false));
        assert_eq!(snap.config.trend_config["enabledDisplay"], json!(true));
        assert_eq!(snap.config.trend_config["variables"], json!([]));
    }

    #[test]
    fn test_v1_counts_come_from_legacy_metrics() {
        let raw = json!({
            "config": {"initiativeId": 3, "filters": {"Grade": "7th"}},
            "results": {
                "metrics": {"totalRows": 2, "totalRowsUnfiltered": 4},
                "filteredTableData": [{"grade": "7th"}, {"grade": "7th"}],
                "trendData": [{"trendId": "t1", "direction": "up"}, {"trendId": "t2", "confidenceScore": 80}]
            }
        });
        let snap = normalize_snapshot(&raw).unwrap();
        let trace = snap.explainability().unwrap();
        assert_eq!(trace.input_row_count, 4);
        assert_eq!(trace.output_row_count, 2);
        assert_eq!(trace.dropped_by_step.filters, 2);
        assert_eq!(snap.results.trend_data[0]["confidenceScore"], json!(50));
        assert_eq!(snap.results.trend_data[1]["confidenceScore"], json!(80));
        assert_eq!(snap.config.filters["Grade"], json!("7th"));
    }

    #[test]
    fn test_v1_falls_back_to_table_length() {
        let raw = json!({"version": 1, "results": {"filteredTableData": [{}, {}, {}]}});
        let trace = normalize_snapshot(&raw).unwrap().explainability().unwrap();
        assert_eq!(trace.input_row_count, 3);
        assert_eq!(trace.output_row_count, 3);
    }

    #[test]
    fn test_v2_is_coerced_not_rewritten() {
        let raw = json!({
            "version": 2,
            "config": {"initiativeId": 9, "expressions": "oops", "trendConfig": {"variables": ["Score"]}},
            "results": {
                "explainability": {"inputRowCount": 10, "custom": true},
                "trendData": [{"trendId": "keep"}],
                "summary": "legacy text"
            },
            "generatedAt": "2024-01-01T00:00:00Z"
        });
        let before = raw.clone();
        let snap = normalize_snapshot(&raw).unwrap();
        assert_eq!(raw, before);
        assert!(snap.config.expressions.is_empty());
        assert!(snap.config.sorts.is_empty());
        assert!(snap.results.metrics.is_empty());
        assert_eq!(snap.results.explainability["custom"], json!(true));
        assert!(snap.results.trend_data[0].get("confidenceScore").is_none());
        assert_eq!(snap.results.summary, json!("legacy text"));
        assert_eq!(snap.config.trend_config["variables"], json!(["Score"]));
        assert_eq!(snap.generated_at, json!("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_integral_float_version_keeps_stored_trace() {
        let raw = json!({
            "version": 2.0,
            "results": {
                "explainability": {
                    "inputRowCount": 10,
                    "afterFilterCount": 8,
                    "afterExpressionCount": 6,
                    "outputRowCount": 6,
                    "droppedByStep": {"filters": 2, "expressions": 2, "sorting": 0}
                }
            }
        });
        assert!(matches!(SnapshotVersion::classify(&raw), Some(SnapshotVersion::V2(_))));
        let trace = normalize_snapshot(&raw).unwrap().explainability().unwrap();
        assert_eq!(trace.input_row_count, 10);
        assert_eq!(trace.after_filter_count, 8);
        assert_eq!(trace.output_row_count, 6);

        let v = json!({"version": 1.5});
        assert!(matches!(SnapshotVersion::classify(&v), Some(SnapshotVersion::V1(_))));
    }

    #[test]
    fn test_version_tag_classification() {
        let v = json!({"version": "2"});
        assert!(matches!(SnapshotVersion::classify(&v), Some(SnapshotVersion::V2(_))));
        let v = json!({"version": 3});
        assert!(matches!(SnapshotVersion::classify(&v), Some(SnapshotVersion::V2(_))));
        let v = json!({});
        assert!(matches!(SnapshotVersion::classify(&v), Some(SnapshotVersion::V1(_))));
    }
}

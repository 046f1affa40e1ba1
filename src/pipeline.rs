//! Filter, expression and sort stages plus the explainability trace.
//!
//! Every stage takes a slice of records and returns a new collection; input
//! records are never mutated. Attributes that cannot be resolved on a record
//! fail open in the filter and expression stages so one misnamed attribute
//! cannot hide a whole report.

use crate::metrics::calculate_metrics;
use crate::resolver::resolve_value;
use crate::types::{
    Connector, Explainability, Expression, FilterSet, Metrics, Operator, Record, SortDirection,
    SortSpec, FILTER_ALL,
};
use crate::util::{value_as_number, value_to_text};
use log::debug;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedReport {
    pub filtered_data: Vec<Record>,
    pub metrics: Metrics,
    pub explainability: Explainability,
}

fn is_unconstrained(target: &str) -> bool {
    target.eq_ignore_ascii_case(FILTER_ALL)
}

/// Keep records whose value for every constrained attribute contains the
/// filter value (case-insensitive substring).
pub fn apply_filters(records: &[Record], filters: &FilterSet) -> Vec<Record> {
    let active: Vec<(&str, String)> = filters
        .iter()
        .filter(|(_, target)| !is_unconstrained(target))
        .map(|(label, target)| (label.as_str(), target.to_lowercase()))
        .collect();
    if active.is_empty() {
        return records.to_vec();
    }

    records
        .iter()
        .filter(|record| {
            active.iter().all(|(label, target)| match resolve_value(label, record) {
                Some(v) => value_to_text(v).to_lowercase().contains(target.as_str()),
                None => true,
            })
        })
        .cloned()
        .collect()
}

/// Truth value of a single expression against one record.
pub fn evaluate_expression(record: &Record, expr: &Expression) -> bool {
    let Some(actual) = resolve_value(&expr.attribute, record) else {
        return true;
    };
    let actual_text = value_to_text(actual);
    let expected = Value::String(expr.value.clone());

    let ord = match (value_as_number(actual), value_as_number(&expected)) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ if matches!(expr.operator, Operator::Eq | Operator::NotEq) => actual_text
            .to_lowercase()
            .cmp(&expr.value.to_lowercase()),
        _ => actual_text.as_str().cmp(expr.value.as_str()),
    };

    match expr.operator {
        Operator::Contains => actual_text
            .to_lowercase()
            .contains(&expr.value.to_lowercase()),
        Operator::Eq => ord == Ordering::Equal,
        Operator::NotEq => ord != Ordering::Equal,
        Operator::Gt => ord == Ordering::Greater,
        Operator::Lt => ord == Ordering::Less,
        Operator::GtEq => ord != Ordering::Less,
        Operator::LtEq => ord != Ordering::Greater,
    }
}

/// Evaluate the chain left to right: `acc = acc <connector> expr_i`.
///
/// There is no precedence and no grouping; `a OR b AND c` is `(a OR b) AND c`.
pub fn evaluate_chain(record: &Record, expressions: &[Expression]) -> bool {
    let mut iter = expressions.iter();
    let Some(first) = iter.next() else {
        return true;
    };
    iter.fold(evaluate_expression(record, first), |acc, expr| {
        match expr.connector.unwrap_or_default() {
            Connector::And => acc && evaluate_expression(record, expr),
            Connector::Or => acc || evaluate_expression(record, expr),
        }
    })
}

pub fn apply_expressions(records: &[Record], expressions: &[Expression]) -> Vec<Record> {
    if expressions.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|record| evaluate_chain(record, expressions))
        .cloned()
        .collect()
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Total order over one sort key: numbers before text, numeric within
/// numbers, case-folded within text. Missing values are the empty string.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Some(Value::Number(_)), _) => Ordering::Less,
        (_, Some(Value::Number(_))) => Ordering::Greater,
        _ => {
            let a = a.map(value_to_text).unwrap_or_default();
            let b = b.map(value_to_text).unwrap_or_default();
            compare_text(&a, &b)
        }
    }
}

pub fn compare_records(a: &Record, b: &Record, sorts: &[SortSpec]) -> Ordering {
    for spec in sorts {
        let ord = compare_values(
            resolve_value(&spec.attribute, a),
            resolve_value(&spec.attribute, b),
        );
        let ord = match spec.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Stable multi-key sort. The first sort entry is the primary key.
pub fn apply_sorts(records: &[Record], sorts: &[SortSpec]) -> Vec<Record> {
    let mut out = records.to_vec();
    if !sorts.is_empty() {
        out.sort_by(|a, b| compare_records(a, b, sorts));
    }
    out
}

/// Run filters, expressions and sorts, then compute metrics and the
/// explainability trace. `catalog` lists the attribute labels metrics are
/// computed for; when absent the record keys are used.
pub fn process_report_data(
    records: &[Record],
    filters: &FilterSet,
    expressions: &[Expression],
    sorts: &[SortSpec],
    catalog: Option<&[String]>,
) -> ProcessedReport {
    let filtered = apply_filters(records, filters);
    debug!("filter stage: {} -> {} rows", records.len(), filtered.len());
    let matched = apply_expressions(&filtered, expressions);
    debug!("expression stage: {} -> {} rows", filtered.len(), matched.len());
    let sorted = apply_sorts(&matched, sorts);
    debug!("sort stage: {} keys over {} rows", sorts.len(), sorted.len());

    let explainability =
        Explainability::from_counts(records.len(), filtered.len(), matched.len(), sorted.len());
    let metrics = calculate_metrics(&sorted, records, catalog);

    ProcessedReport {
        filtered_data: sorted,
        metrics,
        explainability,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<Record> {
        let rows = json!([
            {"grade": "7th", "score": 10},
            {"grade": "7th", "score": 20},
            {"grade": "8th", "score": 30},
            {"grade": "8th", "score": 40}
        ]);
        serde_json::from_value(rows).unwrap()
    }

    fn expr(attribute: &str, operator: Operator, value: &str, connector: Option<Connector>) -> Expression {
        Expression {
            attribute: attribute.to_string(),
            operator,
            value: value.to_string(),
            connector,
        }
    }

    fn scores(records: &[Record]) -> Vec<i64> {
        records.iter().map(|r| r["score"].as_i64().unwrap()).collect()
    }

    #[test]
    fn test_filter_substring_match() {
        let mut filters = FilterSet::new();
        filters.insert("Grade".into(), "7th".into());
        let out = apply_filters(&sample(), &filters);
        assert_eq!(scores(&out), vec![10, 20]);
    }

    #[test]
    fn test_empty_filters_are_noop() {
        let out = apply_filters(&sample(), &FilterSet::new());
        assert_eq!(out, sample());
    }

    #[test]
    fn test_all_sentinel_and_empty_value_match_everything() {
        let mut filters = FilterSet::new();
        filters.insert("Grade".into(), "All".into());
        filters.insert("Score".into(), "".into());
        assert_eq!(apply_filters(&sample(), &filters).len(), 4);
    }

    #[test]
    fn test_filter_missing_attribute_fails_open() {
        let mut filters = FilterSet::new();
        filters.insert("School".into(), "North".into());
        assert_eq!(apply_filters(&sample(), &filters).len(), 4);
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let mut filters = FilterSet::new();
        filters.insert("grade".into(), "8TH".into());
        assert_eq!(scores(&apply_filters(&sample(), &filters)), vec![30, 40]);
    }

    #[test]
    fn test_expression_or_chain() {
        let chain = vec![
            expr("Grade", Operator::Eq, "7th", None),
            expr("Score", Operator::Gt, "15", Some(Connector::Or)),
        ];
        assert_eq!(apply_expressions(&sample(), &chain).len(), 4);
    }

    #[test]
    fn test_expression_chain_is_positional() {
        // (grade = 8th OR score < 15) AND score != 40
        let chain = vec![
            expr("Grade", Operator::Eq, "8th", None),
            expr("Score", Operator::Lt, "15", Some(Connector::Or)),
            expr("Score", Operator::NotEq, "40", Some(Connector::And)),
        ];
        assert_eq!(scores(&apply_expressions(&sample(), &chain)), vec![10, 30]);
    }

    #[test]
    fn test_missing_connector_defaults_to_and() {
        let chain = vec![
            expr("Grade", Operator::Eq, "7th", None),
            expr("Score", Operator::GtEq, "20", None),
        ];
        assert_eq!(scores(&apply_expressions(&sample(), &chain)), vec![20]);
    }

    #[test]
    fn test_expression_numeric_vs_string_comparison() {
        let rows: Vec<Record> =
            serde_json::from_value(json!([{"v": "9"}, {"v": "10"}, {"v": "abc"}])).unwrap();
        let numeric = apply_expressions(&rows, &[expr("V", Operator::Gt, "9.5", None)]);
        assert_eq!(numeric.len(), 2); // "10" numerically, "abc" lexicographically > "9.5"
        assert_eq!(numeric[0]["v"], json!("10"));
        let eq = apply_expressions(&rows, &[expr("V", Operator::Eq, "ABC", None)]);
        assert_eq!(eq.len(), 1);
    }

    #[test]
    fn test_contains_and_missing_attribute() {
        let rows: Vec<Record> =
            serde_json::from_value(json!([{"name": "Lincoln Middle"}, {"other": 1}])).unwrap();
        let out = apply_expressions(&rows, &[expr("Name", Operator::Contains, "middle", None)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_multi_key_sort() {
        let sorts = vec![
            SortSpec { attribute: "Grade".into(), direction: SortDirection::Desc },
            SortSpec { attribute: "Score".into(), direction: SortDirection::Asc },
        ];
        let out = apply_sorts(&sample(), &sorts);
        assert_eq!(scores(&out), vec![30, 40, 10, 20]);
    }

    #[test]
    fn test_sort_is_idempotent_and_stable() {
        let sorts = vec![SortSpec { attribute: "Grade".into(), direction: SortDirection::Asc }];
        let once = apply_sorts(&sample(), &sorts);
        let twice = apply_sorts(&once, &sorts);
        assert_eq!(once, twice);
        assert_eq!(scores(&once), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_sort_mixed_number_and_text_column() {
        let rows: Vec<Record> = (0..300)
            .map(|i| {
                let score = if i % 3 == 0 {
                    json!(format!("{}", (i * 37) % 500))
                } else {
                    json!((i * 53) % 500)
                };
                let mut r = Record::new();
                r.insert("score".into(), score);
                r
            })
            .collect();
        let sorts = vec![SortSpec { attribute: "Score".into(), direction: SortDirection::Asc }];
        let once = apply_sorts(&rows, &sorts);
        let twice = apply_sorts(&once, &sorts);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 300);
        // All JSON numbers first, in numeric order, then the text cells.
        let first_text = once.iter().position(|r| r["score"].is_string()).unwrap();
        assert_eq!(first_text, 200);
        let numbers: Vec<f64> = once[..200].iter().map(|r| r["score"].as_f64().unwrap()).collect();
        assert!(numbers.windows(2).all(|w| w[0] <= w[1]));
        assert!(once[200..].iter().all(|r| r["score"].is_string()));
    }

    #[test]
    fn test_sort_missing_values_come_after_numbers() {
        let rows: Vec<Record> =
            serde_json::from_value(json!([{"score": "n/a"}, {"other": 1}, {"score": 5}, {"score": null}])).unwrap();
        let sorts = vec![SortSpec { attribute: "Score".into(), direction: SortDirection::Asc }];
        let out = apply_sorts(&rows, &sorts);
        assert_eq!(out[0]["score"], json!(5));
        // missing/null sort as "" ahead of "n/a", stable among themselves
        assert!(out[1].contains_key("other"));
        assert_eq!(out[2]["score"], Value::Null);
        assert_eq!(out[3]["score"], json!("n/a"));
    }

    #[test]
    fn test_no_sorts_keeps_order() {
        assert_eq!(apply_sorts(&sample(), &[]), sample());
    }

    #[test]
    fn test_process_report_data_trace() {
        let mut filters = FilterSet::new();
        filters.insert("Grade".into(), "7th".into());
        let chain = vec![expr("Score", Operator::Gt, "15", None)];
        let out = process_report_data(&sample(), &filters, &chain, &[], None);
        assert_eq!(out.filtered_data.len(), 1);
        let e = out.explainability;
        assert_eq!(e.input_row_count, 4);
        assert_eq!(e.after_filter_count, 2);
        assert_eq!(e.after_expression_count, 1);
        assert_eq!(e.output_row_count, 1);
        assert_eq!(e.dropped_by_step.filters, 2);
        assert_eq!(e.dropped_by_step.expressions, 1);
        assert_eq!(e.dropped_by_step.sorting, 0);
    }
}

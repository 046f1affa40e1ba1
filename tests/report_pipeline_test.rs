use serde_json::{json, Value};
use survey_report::types::{
    Connector, Expression, FilterSet, Operator, Record, ReportContext, SortDirection, SortSpec,
    TrendConfig, TrendDirection,
};
use survey_report::{
    compute_trend_data, generate_report, normalize_snapshot, process_report_data,
    validate_report_create_payload, validate_trend_config, InMemoryRecordSource, RecordSource,
};

fn sample_records() -> Vec<Record> {
    serde_json::from_value(json!([
        {"grade": "7th", "score": 10},
        {"grade": "7th", "score": 20},
        {"grade": "8th", "score": 30},
        {"grade": "8th", "score": 40}
    ]))
    .unwrap()
}

fn score_trend() -> TrendConfig {
    validate_trend_config(&json!({"variables": ["Score"], "enabledCalc": true}), None).unwrap()
}

#[test]
fn test_grade_filter_halves_the_sample() {
    let mut filters = FilterSet::new();
    filters.insert("Grade".to_string(), "7th".to_string());
    let out = process_report_data(&sample_records(), &filters, &[], &[], None);
    assert_eq!(out.filtered_data.len(), 2);
    assert_eq!(out.metrics.filter_match_rate, 50.0);
    assert!(out.explainability.after_filter_count <= out.explainability.input_row_count);
}

#[test]
fn test_empty_filter_set_returns_everything() {
    let out = process_report_data(&sample_records(), &FilterSet::new(), &[], &[], None);
    assert_eq!(out.filtered_data, sample_records());
    assert_eq!(out.metrics.filter_match_rate, 100.0);
    assert_eq!(out.explainability.dropped_by_step.filters, 0);
}

#[test]
fn test_or_chain_keeps_all_sample_rows() {
    let chain = vec![
        Expression {
            attribute: "Grade".into(),
            operator: Operator::Eq,
            value: "7th".into(),
            connector: None,
        },
        Expression {
            attribute: "Score".into(),
            operator: Operator::Gt,
            value: "15".into(),
            connector: Some(Connector::Or),
        },
    ];
    let out = process_report_data(&sample_records(), &FilterSet::new(), &chain, &[], None);
    assert_eq!(out.filtered_data.len(), 4);
    assert_eq!(out.explainability.dropped_by_step.expressions, 0);
}

#[test]
fn test_sorting_twice_is_stable() {
    let sorts = vec![
        SortSpec {
            attribute: "Grade".into(),
            direction: SortDirection::Desc,
        },
        SortSpec {
            attribute: "Score".into(),
            direction: SortDirection::Desc,
        },
    ];
    let once = process_report_data(&sample_records(), &FilterSet::new(), &[], &sorts, None);
    let twice = process_report_data(&once.filtered_data, &FilterSet::new(), &[], &sorts, None);
    assert_eq!(once.filtered_data, twice.filtered_data);
    assert_eq!(once.filtered_data[0]["score"], json!(40));
}

#[test]
fn test_score_trend_is_up_and_capped() {
    let trends = compute_trend_data(&sample_records(), &score_trend(), &ReportContext::default());
    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0].direction, TrendDirection::Up);
    assert_eq!(trends[0].magnitude, 100.0);
    assert!(trends[0].confidence_score <= 100);
}

#[test]
fn test_three_rows_is_insufficient() {
    let records = &sample_records()[..3];
    let trends = compute_trend_data(records, &score_trend(), &ReportContext::default());
    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0].direction, TrendDirection::Stable);
    assert_eq!(trends[0].magnitude, 0.0);
    assert!(trends[0].description.contains("received 3"));
}

#[test]
fn test_trend_id_and_confidence_are_reproducible() {
    let ctx = ReportContext {
        initiative_id: Some(11),
        report_name: Some("Attendance".into()),
        ..ReportContext::default()
    };
    let first = compute_trend_data(&sample_records(), &score_trend(), &ctx);
    let second = compute_trend_data(&sample_records(), &score_trend(), &ctx);
    assert_eq!(first[0].trend_id, second[0].trend_id);
    assert_eq!(first[0].confidence_score, second[0].confidence_score);
}

#[test]
fn test_normalizer_contract() {
    assert!(normalize_snapshot(&Value::Null).is_none());
    assert!(normalize_snapshot(&json!("not an object")).is_none());
    let snap = normalize_snapshot(&json!({"version": 1, "config": {}, "results": {}})).unwrap();
    let trace = snap.explainability().expect("complete trace");
    assert_eq!(trace.input_row_count, 0);
    assert_eq!(trace.output_row_count, 0);
}

#[test]
fn test_generated_snapshot_round_trips_through_normalizer() {
    let request = validate_report_create_payload(&json!({
        "initiativeId": 3,
        "name": "Upper grades",
        "filters": {"Grade": "All"},
        "sorts": [{"attribute": "Score", "direction": "desc"}],
        "trendConfig": {"variables": ["score"], "enabledCalc": true}
    }))
    .unwrap();
    let catalog = vec!["Grade".to_string(), "Score".to_string()];
    let trend = validate_trend_config(&request.trend_config, Some(catalog.as_slice())).unwrap();
    assert_eq!(trend.variables, vec!["Score"]);

    let context = ReportContext {
        initiative_id: Some(request.initiative_id),
        ..ReportContext::default()
    };
    let records = InMemoryRecordSource::new(sample_records())
        .fetch_records(&context)
        .unwrap();
    let snapshot = generate_report(&records, &request, &trend, &context, Some(catalog.as_slice()));

    let stored = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(stored["version"], json!(2));
    let read_back = normalize_snapshot(&stored).unwrap();
    assert_eq!(read_back.explainability(), Some(snapshot.results.explainability));
    assert_eq!(read_back.trend_results(), snapshot.results.trend_data);
    assert_eq!(read_back.results.filtered_table_data[0]["score"], json!(40));
    assert_eq!(read_back.config.trend_config["variables"], json!(["Score"]));
}

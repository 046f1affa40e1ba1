use crate::error::ReportResult;
use crate::metrics::infer_attributes;
use crate::types::{Explainability, MetricRow, Metrics, Record, StageRow, TrendResult, TrendRow};
use crate::util::{format_int, format_number, value_to_text};
use serde::Serialize;
use std::path::Path;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

/// Write records as CSV. Columns are the union of record keys in
/// first-seen order; missing cells are left blank.
pub fn write_records_csv(path: &Path, records: &[Record]) -> ReportResult<()> {
    let columns = infer_attributes(records);
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&columns)?;
    for r in records {
        wtr.write_record(
            columns
                .iter()
                .map(|c| r.get(c).map(value_to_text).unwrap_or_default()),
        )?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> ReportResult<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

/// Markdown preview of the first `max_rows` records.
pub fn preview_records(records: &[Record], max_rows: usize) {
    let shown = &records[..records.len().min(max_rows)];
    if shown.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let columns = infer_attributes(shown);
    let mut builder = Builder::default();
    builder.push_record(columns.clone());
    for r in shown {
        builder.push_record(
            columns
                .iter()
                .map(|c| r.get(c).map(value_to_text).unwrap_or_default()),
        );
    }
    let table_str = builder.build().with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

pub fn stage_rows(trace: &Explainability) -> Vec<StageRow> {
    let stage = |name: &str, rows_in: usize, rows_out: usize, dropped: usize| StageRow {
        stage: name.to_string(),
        rows_in: format_int(rows_in),
        rows_out: format_int(rows_out),
        dropped: format_int(dropped),
    };
    vec![
        stage(
            "Filters",
            trace.input_row_count,
            trace.after_filter_count,
            trace.dropped_by_step.filters,
        ),
        stage(
            "Expressions",
            trace.after_filter_count,
            trace.after_expression_count,
            trace.dropped_by_step.expressions,
        ),
        stage(
            "Sorting",
            trace.after_expression_count,
            trace.output_row_count,
            trace.dropped_by_step.sorting,
        ),
    ]
}

pub fn metric_rows(metrics: &Metrics) -> Vec<MetricRow> {
    let mut rows: Vec<MetricRow> = metrics
        .numeric_averages
        .iter()
        .map(|(attribute, avg)| MetricRow {
            attribute: attribute.clone(),
            kind: "average".to_string(),
            value: format_number(*avg, 2),
        })
        .collect();
    for (attribute, counts) in &metrics.category_counts {
        let tally: Vec<String> = counts
            .iter()
            .map(|(label, n)| format!("{}: {}", label, format_int(*n)))
            .collect();
        rows.push(MetricRow {
            attribute: attribute.clone(),
            kind: "categories".to_string(),
            value: tally.join(", "),
        });
    }
    rows
}

pub fn trend_rows(trends: &[TrendResult]) -> Vec<TrendRow> {
    trends
        .iter()
        .map(|t| TrendRow {
            trend_id: t.trend_id.clone(),
            attributes: t.attributes.join(", "),
            direction: t.direction.to_string(),
            magnitude: format_number(t.magnitude, 1),
            confidence: t.confidence_score.to_string(),
        })
        .collect()
}

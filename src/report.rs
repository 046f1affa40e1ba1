use crate::hash::short_id;
use crate::pipeline::{process_report_data, ProcessedReport};
use crate::snapshot::{ReportSnapshot, SnapshotConfig, SnapshotResults, CURRENT_SNAPSHOT_VERSION};
use crate::trend::compute_trend_data;
use crate::types::{
    ChartKind, ChartPoint, ChartSeries, Explainability, Metrics, Record, ReportContext,
    ReportSummary, TrendConfig, TrendResult,
};
use crate::util::{format_int, format_number};
use crate::validation::CreateReportRequest;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use std::cmp::Ordering;

/// Chart-ready series derived from metrics: one single-point series per
/// numeric average and one distribution per categorical attribute, largest
/// category first.
pub fn build_chart_data(metrics: &Metrics) -> Vec<ChartSeries> {
    let mut series: Vec<ChartSeries> = metrics
        .numeric_averages
        .iter()
        .map(|(attribute, avg)| ChartSeries {
            attribute: attribute.clone(),
            kind: ChartKind::Average,
            points: vec![ChartPoint {
                label: "mean".to_string(),
                value: *avg,
            }],
        })
        .collect();

    for (attribute, counts) in &metrics.category_counts {
        let mut points: Vec<ChartPoint> = counts
            .iter()
            .map(|(label, count)| ChartPoint {
                label: label.clone(),
                value: *count as f64,
            })
            .collect();
        points.sort_by(|a, b| {
            b.value
                .partial_cmp(&a.value)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.label.cmp(&b.label))
        });
        series.push(ChartSeries {
            attribute: attribute.clone(),
            kind: ChartKind::Distribution,
            points,
        });
    }
    series
}

pub fn build_summary(metrics: &Metrics, trace: &Explainability, trends: &[TrendResult]) -> ReportSummary {
    let headline = format!(
        "{} of {} rows matched ({}%)",
        format_int(metrics.total_rows),
        format_int(metrics.total_rows_unfiltered),
        format_number(metrics.filter_match_rate, 1)
    );

    let mut highlights = Vec::new();
    if trace.dropped_by_step.filters > 0 {
        highlights.push(format!(
            "Filters removed {} rows",
            format_int(trace.dropped_by_step.filters)
        ));
    }
    if trace.dropped_by_step.expressions > 0 {
        highlights.push(format!(
            "Conditions removed {} rows",
            format_int(trace.dropped_by_step.expressions)
        ));
    }
    for (attribute, avg) in &metrics.numeric_averages {
        highlights.push(format!("Average {}: {}", attribute, format_number(*avg, 2)));
    }
    highlights.extend(
        trends
            .iter()
            .filter(|t| t.enabled_display)
            .map(|t| t.description.clone()),
    );

    ReportSummary {
        headline,
        highlights,
    }
}

/// Context for a create request, filling gaps from the request itself.
pub fn context_for(request: &CreateReportRequest, base: &ReportContext) -> ReportContext {
    ReportContext {
        initiative_id: base.initiative_id.or(Some(request.initiative_id)),
        initiative_name: base.initiative_name.clone(),
        report_name: base.report_name.clone().or_else(|| request.name.clone()),
        time_period: base.time_period.clone(),
    }
}

/// Run the full pipeline and assemble the snapshot that gets persisted.
pub fn generate_report_at(
    records: &[Record],
    request: &CreateReportRequest,
    trend_config: &TrendConfig,
    context: &ReportContext,
    catalog: Option<&[String]>,
    generated_at: DateTime<Utc>,
) -> ReportSnapshot {
    let ProcessedReport {
        filtered_data,
        metrics,
        explainability,
    } = process_report_data(
        records,
        &request.filters,
        &request.expressions,
        &request.sorts,
        catalog,
    );
    let trend_data = compute_trend_data(&filtered_data, trend_config, context);
    let chart_data = build_chart_data(&metrics);
    let summary = build_summary(&metrics, &explainability, &trend_data);

    let config = SnapshotConfig {
        initiative_id: request.initiative_id,
        filters: request.filters.clone(),
        expressions: request.expressions.clone(),
        sorts: request.sorts.clone(),
        trend_config: trend_config.clone(),
    };
    let stamp = generated_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let report_id = match short_id("rpt", &(&config, context, &stamp)) {
        Ok(id) => id,
        Err(e) => {
            warn!("could not derive report id: {}", e);
            format!("rpt_{}", generated_at.timestamp_millis())
        }
    };
    info!(
        "report {} generated: {} rows, {} trend result(s)",
        report_id,
        filtered_data.len(),
        trend_data.len()
    );

    ReportSnapshot {
        version: CURRENT_SNAPSHOT_VERSION,
        config,
        results: SnapshotResults {
            metrics,
            filtered_table_data: filtered_data,
            trend_data,
            explainability,
            chart_data,
            summary,
            report_id,
            generated_date: generated_at.format("%Y-%m-%d").to_string(),
            initiative_name: context.initiative_name.clone(),
        },
        generated_at: stamp,
    }
}

pub fn generate_report(
    records: &[Record],
    request: &CreateReportRequest,
    trend_config: &TrendConfig,
    context: &ReportContext,
    catalog: Option<&[String]>,
) -> ReportSnapshot {
    generate_report_at(records, request, trend_config, context, catalog, Utc::now())
}

//! Half-split trend detection.
//!
//! Each configured variable is read in record order, split at `floor(n/2)`
//! and the two halves compared: by mean for numeric series, by share of the
//! dominant category otherwise. Per-variable changes are averaged into a
//! single trend signal. Sparse data is a normal outcome here, not an error.

use crate::hash::short_id;
use crate::resolver::resolve_value;
use crate::types::{
    Record, ReportContext, TrendConfig, TrendDirection, TrendResult, MAX_TREND_VARIABLES,
    TREND_METHOD_HALF_SPLIT,
};
use crate::util::{average, parse_measure, round_to, value_to_text};
use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Two points per half.
pub const MIN_TREND_ROWS: usize = 4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrendConfigError {
    #[error("trend config must be an object")]
    NotAnObject,

    #[error("trend config field '{field}' {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("at most {max} trend variables are allowed, received {count}")]
    TooManyVariables { max: usize, count: usize },

    #[error("trend calculation is enabled but no variables were selected")]
    NoVariables,

    #[error("unknown trend variable '{0}'")]
    UnknownAttribute(String),

    #[error("unsupported trend method '{0}'")]
    UnsupportedMethod(String),
}

fn invalid(field: &'static str, reason: &str) -> TrendConfigError {
    TrendConfigError::InvalidField {
        field,
        reason: reason.to_string(),
    }
}

fn read_bool(obj: &Map<String, Value>, field: &'static str, default: bool) -> Result<bool, TrendConfigError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(invalid(field, "must be a boolean")),
    }
}

/// Check a raw trend configuration and return its normalized form.
///
/// Variables are trimmed and de-duplicated case-insensitively. When a
/// catalog is supplied every variable must name one of its attributes and
/// is rewritten to the catalog's spelling.
pub fn validate_trend_config(raw: &Value, catalog: Option<&[String]>) -> Result<TrendConfig, TrendConfigError> {
    let defaults = TrendConfig::default();
    let obj = match raw {
        Value::Null => return Ok(defaults),
        Value::Object(obj) => obj,
        _ => return Err(TrendConfigError::NotAnObject),
    };

    let mut variables: Vec<String> = Vec::new();
    match obj.get("variables") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                let Value::String(s) = item else {
                    return Err(invalid("variables", "must contain only strings"));
                };
                let s = s.trim();
                if s.is_empty() || variables.iter().any(|v| v.eq_ignore_ascii_case(s)) {
                    continue;
                }
                variables.push(s.to_string());
            }
        }
        Some(_) => return Err(invalid("variables", "must be an array")),
    }
    if variables.len() > MAX_TREND_VARIABLES {
        return Err(TrendConfigError::TooManyVariables {
            max: MAX_TREND_VARIABLES,
            count: variables.len(),
        });
    }

    let enabled_calc = read_bool(obj, "enabledCalc", defaults.enabled_calc)?;
    let enabled_display = read_bool(obj, "enabledDisplay", defaults.enabled_display)?;
    if enabled_calc && variables.is_empty() {
        return Err(TrendConfigError::NoVariables);
    }

    if let Some(catalog) = catalog.filter(|c| !c.is_empty()) {
        for v in variables.iter_mut() {
            match catalog.iter().find(|c| c.trim().eq_ignore_ascii_case(v.as_str())) {
                Some(known) => *v = known.trim().to_string(),
                None => return Err(TrendConfigError::UnknownAttribute(v.clone())),
            }
        }
    }

    let method = match obj.get("method") {
        None | Some(Value::Null) => defaults.method,
        Some(Value::String(m)) if m.trim().eq_ignore_ascii_case(TREND_METHOD_HALF_SPLIT) => {
            TREND_METHOD_HALF_SPLIT.to_string()
        }
        Some(Value::String(m)) => return Err(TrendConfigError::UnsupportedMethod(m.clone())),
        Some(_) => return Err(invalid("method", "must be a string")),
    };

    let threshold_pct = match obj.get("thresholdPct") {
        None | Some(Value::Null) => defaults.threshold_pct,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(t) if t.is_finite() && (0.0..=100.0).contains(&t) => t,
            _ => return Err(invalid("thresholdPct", "must be between 0 and 100")),
        },
        Some(_) => return Err(invalid("thresholdPct", "must be a number")),
    };

    Ok(TrendConfig {
        variables,
        enabled_calc,
        enabled_display,
        method,
        threshold_pct,
    })
}

/// Strict on both sides: a change of exactly `threshold` is stable.
pub fn classify_direction(change: f64, threshold: f64) -> TrendDirection {
    if change > threshold {
        TrendDirection::Up
    } else if change < -threshold {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    }
}

fn split_half<T>(series: &[T]) -> (&[T], &[T]) {
    series.split_at(series.len() / 2)
}

/// Signed percent change between half means. The baseline is floored at 1
/// so near-zero first halves do not blow up.
pub fn numeric_change(series: &[f64]) -> Option<f64> {
    if series.len() < MIN_TREND_ROWS {
        return None;
    }
    let (first, second) = split_half(series);
    let (m1, m2) = (average(first), average(second));
    Some((m2 - m1) / m1.abs().max(1.0) * 100.0)
}

/// Change in the dominant category's share between halves, in points.
pub fn categorical_change(series: &[String]) -> Option<f64> {
    if series.len() < MIN_TREND_ROWS {
        return None;
    }
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for v in series {
        match counts.iter_mut().find(|(k, _)| *k == v.as_str()) {
            Some((_, c)) => *c += 1,
            None => counts.push((v.as_str(), 1)),
        }
    }
    // First-seen category wins ties.
    let mut dominant = counts[0];
    for entry in &counts[1..] {
        if entry.1 > dominant.1 {
            dominant = *entry;
        }
    }

    let share = |half: &[String]| {
        half.iter().filter(|v| v.as_str() == dominant.0).count() as f64 / half.len() as f64
    };
    let (first, second) = split_half(series);
    Some((share(second) - share(first)) * 100.0)
}

fn score_variable(records: &[Record], variable: &str) -> Option<f64> {
    let values: Vec<&Value> = records
        .iter()
        .filter_map(|r| resolve_value(variable, r))
        .collect();

    let numeric: Vec<f64> = values.iter().filter_map(|v| parse_measure(v)).collect();
    if let Some(change) = numeric_change(&numeric) {
        return Some(change);
    }

    let categories: Vec<String> = values
        .iter()
        .map(|v| value_to_text(v).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    categorical_change(&categories)
}

#[derive(Serialize)]
struct TrendFingerprint<'a> {
    records: &'a [Record],
    config: &'a TrendConfig,
    context: &'a ReportContext,
}

fn trend_id(records: &[Record], config: &TrendConfig, context: &ReportContext) -> String {
    let fingerprint = TrendFingerprint {
        records,
        config,
        context,
    };
    match short_id("trend", &fingerprint) {
        Ok(id) => id,
        Err(e) => {
            warn!("could not fingerprint trend inputs: {}", e);
            "trend_unhashed".to_string()
        }
    }
}

/// Confidence from sample size, how many variables produced a score and how
/// many of those agree with the aggregate direction.
pub fn confidence_score(row_count: usize, total_vars: usize, scored: &[f64], direction: TrendDirection, threshold: f64) -> u8 {
    if scored.is_empty() || total_vars == 0 {
        return 0;
    }
    let sample = (row_count as f64 / 20.0).min(1.0) * 50.0;
    let coverage = scored.len() as f64 / total_vars as f64 * 30.0;
    let agreeing = scored
        .iter()
        .filter(|c| classify_direction(**c, threshold) == direction)
        .count();
    let agreement = agreeing as f64 / scored.len() as f64 * 20.0;
    (sample + coverage + agreement).round().clamp(0.0, 100.0) as u8
}

fn describe(attributes: &str, direction: TrendDirection, magnitude: f64, row_count: usize, skipped: usize) -> String {
    let movement = match direction {
        TrendDirection::Up => format!("trending up by {:.1}%", magnitude),
        TrendDirection::Down => format!("trending down by {:.1}%", magnitude),
        TrendDirection::Stable => format!("stable ({:.1}% change)", magnitude),
    };
    let mut text = format!(
        "{} {} comparing the first and second half of {} records.",
        attributes, movement, row_count
    );
    if skipped > 0 {
        text.push_str(&format!(
            " {} variable(s) skipped: fewer than {} usable values.",
            skipped, MIN_TREND_ROWS
        ));
    }
    text
}

fn flat_result(id: String, config: &TrendConfig, time_period: String, description: String) -> TrendResult {
    TrendResult {
        trend_id: id,
        attributes: config.variables.clone(),
        direction: TrendDirection::Stable,
        magnitude: 0.0,
        confidence_score: 0,
        time_period,
        description,
        enabled_display: config.enabled_display,
    }
}

/// Compute the trend signal for `records` under `config`.
///
/// Returns an empty list when calculation is disabled, otherwise exactly
/// one result. Identical inputs always yield the same `trend_id` and
/// `confidence_score`.
pub fn compute_trend_data(records: &[Record], config: &TrendConfig, context: &ReportContext) -> Vec<TrendResult> {
    if !config.enabled_calc || config.variables.is_empty() {
        return Vec::new();
    }

    let id = trend_id(records, config, context);
    let attributes = config.variables.join(", ");
    let n = records.len();
    let time_period = context
        .time_period
        .clone()
        .unwrap_or_else(|| format!("First half vs second half ({} records)", n));

    if n < MIN_TREND_ROWS {
        let description = format!(
            "Insufficient data for trend analysis of {}: at least {} rows required, received {}.",
            attributes, MIN_TREND_ROWS, n
        );
        return vec![flat_result(id, config, time_period, description)];
    }

    let mut scored: Vec<f64> = Vec::new();
    let mut skipped = 0usize;
    for variable in &config.variables {
        match score_variable(records, variable) {
            Some(change) => scored.push(change),
            None => {
                debug!("trend variable '{}' skipped: not enough usable values", variable);
                skipped += 1;
            }
        }
    }

    if scored.is_empty() {
        let description = format!(
            "Insufficient data for trend analysis of {}: {} of {} variable(s) skipped, each needs at least {} usable values.",
            attributes,
            skipped,
            config.variables.len(),
            MIN_TREND_ROWS
        );
        return vec![flat_result(id, config, time_period, description)];
    }

    let signed = average(&scored);
    let magnitudes: Vec<f64> = scored.iter().map(|c| c.abs()).collect();
    let magnitude = round_to(average(&magnitudes).min(100.0), 1);
    let direction = classify_direction(signed, config.threshold_pct);
    let confidence = confidence_score(n, config.variables.len(), &scored, direction, config.threshold_pct);

    vec![TrendResult {
        trend_id: id,
        attributes: config.variables.clone(),
        direction,
        magnitude,
        confidence_score: confidence,
        time_period,
        description: describe(&attributes, direction, magnitude, n, skipped),
        enabled_display: config.enabled_display,
    }]
}

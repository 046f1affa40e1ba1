//! Request payload validation.
//!
//! Each validator inspects an untyped JSON payload and either returns the
//! typed request or a `PayloadError` describing the first problem found.
//! Nothing here touches records or storage.

use crate::types::{Connector, Expression, FilterSet, Operator, SortDirection, SortSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("'{0}' must be a positive number")]
    InvalidId(&'static str),

    #[error("'{field}' {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("expression #{index}: {reason}")]
    InvalidExpression { index: usize, reason: String },

    #[error("sort #{index}: {reason}")]
    InvalidSort { index: usize, reason: String },

    #[error("update requires at least one of 'name', 'description' or 'status'")]
    NothingToUpdate,

    #[error("status must be one of generating, completed, failed (got '{0}')")]
    InvalidStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Generating,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn parse(s: &str) -> Option<ReportStatus> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generating" => Some(ReportStatus::Generating),
            "completed" => Some(ReportStatus::Completed),
            "failed" => Some(ReportStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportStatus::Generating => "generating",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateReportRequest {
    pub initiative_id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub filters: FilterSet,
    pub expressions: Vec<Expression>,
    pub sorts: Vec<SortSpec>,
    /// Raw trend configuration; checked later against the attribute catalog.
    pub trend_config: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReportRequest {
    pub id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ReportStatus>,
}

fn as_object(input: &Value) -> Result<&Map<String, Value>, PayloadError> {
    input.as_object().ok_or(PayloadError::NotAnObject)
}

/// Positive integer identifier, given either as a JSON number or as a
/// numeric string (query parameters arrive as strings).
pub fn positive_id(value: Option<&Value>, field: &'static str) -> Result<i64, PayloadError> {
    let id = match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match id {
        Some(id) if id > 0 => Ok(id),
        _ => Err(PayloadError::InvalidId(field)),
    }
}

fn optional_string(obj: &Map<String, Value>, field: &'static str) -> Result<Option<String>, PayloadError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(PayloadError::InvalidField {
            field,
            reason: "must be a string".to_string(),
        }),
    }
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_filters(value: Option<&Value>) -> Result<FilterSet, PayloadError> {
    let mut filters = FilterSet::new();
    let obj = match value {
        None | Some(Value::Null) => return Ok(filters),
        Some(Value::Object(obj)) => obj,
        Some(_) => {
            return Err(PayloadError::InvalidField {
                field: "filters",
                reason: "must be a key/value object".to_string(),
            })
        }
    };
    for (label, target) in obj {
        if target.is_null() {
            continue;
        }
        let Some(text) = scalar_text(target) else {
            return Err(PayloadError::InvalidField {
                field: "filters",
                reason: format!("value for '{}' must be a single scalar", label),
            });
        };
        filters.insert(label.clone(), text);
    }
    Ok(filters)
}

fn parse_expressions(value: Option<&Value>) -> Result<Vec<Expression>, PayloadError> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(PayloadError::InvalidField {
                field: "expressions",
                reason: "must be an array".to_string(),
            })
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let bad = |reason: &str| PayloadError::InvalidExpression {
            index,
            reason: reason.to_string(),
        };
        let obj = item.as_object().ok_or_else(|| bad("must be an object"))?;
        let attribute = non_empty_str(obj, "attribute")
            .ok_or_else(|| bad("'attribute' must be a non-empty string"))?;
        let operator_text = non_empty_str(obj, "operator")
            .ok_or_else(|| bad("'operator' must be a non-empty string"))?;
        let operator = Operator::parse(operator_text)
            .ok_or_else(|| bad(&format!("unknown operator '{}'", operator_text)))?;
        let value = obj.get("value").and_then(scalar_text).unwrap_or_default();

        // The first expression never carries a connector.
        let connector = if index == 0 {
            None
        } else {
            match obj.get("connector").and_then(Value::as_str).map(str::trim) {
                Some(c) if c.eq_ignore_ascii_case("or") => Some(Connector::Or),
                _ => Some(Connector::And),
            }
        };

        out.push(Expression {
            attribute: attribute.to_string(),
            operator,
            value,
            connector,
        });
    }
    Ok(out)
}

fn parse_sorts(value: Option<&Value>) -> Result<Vec<SortSpec>, PayloadError> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(PayloadError::InvalidField {
                field: "sorts",
                reason: "must be an array".to_string(),
            })
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let bad = |reason: &str| PayloadError::InvalidSort {
            index,
            reason: reason.to_string(),
        };
        let obj = item.as_object().ok_or_else(|| bad("must be an object"))?;
        let attribute = non_empty_str(obj, "attribute")
            .ok_or_else(|| bad("'attribute' must be a non-empty string"))?;
        let direction = match obj.get("direction").and_then(Value::as_str) {
            Some(d) if d.eq_ignore_ascii_case("asc") => SortDirection::Asc,
            Some(d) if d.eq_ignore_ascii_case("desc") => SortDirection::Desc,
            _ => return Err(bad("'direction' must be 'asc' or 'desc'")),
        };
        out.push(SortSpec {
            attribute: attribute.to_string(),
            direction,
        });
    }
    Ok(out)
}

pub fn validate_report_create_payload(input: &Value) -> Result<CreateReportRequest, PayloadError> {
    let obj = as_object(input)?;
    let initiative_id = positive_id(obj.get("initiativeId"), "initiativeId")?;
    let name = optional_string(obj, "name")?;
    let description = optional_string(obj, "description")?;
    let filters = parse_filters(obj.get("filters"))?;
    let expressions = parse_expressions(obj.get("expressions"))?;
    let sorts = parse_sorts(obj.get("sorts"))?;

    let trend_config = match obj.get("trendConfig") {
        None | Some(Value::Null) => Value::Null,
        Some(v @ Value::Object(_)) => v.clone(),
        Some(_) => {
            return Err(PayloadError::InvalidField {
                field: "trendConfig",
                reason: "must be an object".to_string(),
            })
        }
    };

    Ok(CreateReportRequest {
        initiative_id,
        name,
        description,
        filters,
        expressions,
        sorts,
        trend_config,
    })
}

pub fn validate_report_update_payload(input: &Value) -> Result<UpdateReportRequest, PayloadError> {
    let obj = as_object(input)?;
    let id = positive_id(obj.get("id"), "id")?;
    let name = optional_string(obj, "name")?;
    let description = optional_string(obj, "description")?;
    let status = match optional_string(obj, "status")? {
        None => None,
        Some(s) => Some(ReportStatus::parse(&s).ok_or(PayloadError::InvalidStatus(s))?),
    };
    if name.is_none() && description.is_none() && status.is_none() {
        return Err(PayloadError::NothingToUpdate);
    }
    Ok(UpdateReportRequest {
        id,
        name,
        description,
        status,
    })
}

pub fn validate_report_query_params(input: &Value) -> Result<i64, PayloadError> {
    positive_id(as_object(input)?.get("id"), "id")
}

pub fn validate_report_delete_params(input: &Value) -> Result<i64, PayloadError> {
    positive_id(as_object(input)?.get("id"), "id")
}

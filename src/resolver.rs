//! Attribute label to record key resolution.
//!
//! Configuration talks about attributes by their human label ("Attendance
//! Rate") while records carry whatever key the data source produced
//! (`attendanceRate`, `Attendance Rate`, `ATTENDANCE_RATE`, ...). Resolution
//! never fails loudly: a `None` result means "absent" and each stage decides
//! what absence means for it.

use crate::types::Record;
use inflector::Inflector;
use serde_json::Value;

/// Canonical in-data key for a label: first word lower-cased, following
/// words title-cased, whitespace removed. `"Attendance Rate"` becomes
/// `"attendanceRate"`.
pub fn canonical_key(label: &str) -> String {
    label.trim().to_camel_case()
}

fn compact(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Find the key in `record` that `label` refers to.
pub fn resolve_attribute<'a>(label: &str, record: &'a Record) -> Option<&'a str> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    if let Some(key) = record.keys().find(|k| k.as_str() == label) {
        return Some(key.as_str());
    }

    let canonical = canonical_key(label);
    if let Some(key) = record.keys().find(|k| k.eq_ignore_ascii_case(&canonical)) {
        return Some(key.as_str());
    }
    if let Some(key) = record.keys().find(|k| k.trim().eq_ignore_ascii_case(label)) {
        return Some(key.as_str());
    }

    let wanted = compact(label);
    if wanted.is_empty() {
        return None;
    }
    record
        .keys()
        .find(|k| compact(k) == wanted)
        .map(|k| k.as_str())
}

/// Resolved value for `label`, treating explicit `null` the same as an
/// absent attribute.
pub fn resolve_value<'a>(label: &str, record: &'a Record) -> Option<&'a Value> {
    let key = resolve_attribute(label, record)?;
    record.get(key).filter(|v| !v.is_null())
}

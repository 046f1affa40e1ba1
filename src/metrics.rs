use crate::resolver::resolve_value;
use crate::types::{Metrics, Record};
use crate::util::{average, round_to, value_as_number, value_to_text};
use std::collections::BTreeMap;

/// Attribute labels to compute metrics for when no catalog is supplied:
/// every key seen in `records`, first-seen order.
pub fn infer_attributes(records: &[Record]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for r in records {
        for key in r.keys() {
            if !seen.iter().any(|s| s == key) {
                seen.push(key.clone());
            }
        }
    }
    seen
}

pub fn filter_match_rate(total_rows: usize, total_rows_unfiltered: usize) -> f64 {
    if total_rows_unfiltered == 0 {
        return 0.0;
    }
    (total_rows as f64 / total_rows_unfiltered as f64 * 1000.0).round() / 10.0
}

/// Summary statistics over the final row set.
///
/// An attribute whose sampled values are all numeric gets a rounded mean;
/// otherwise its distinct values are tallied. Attributes absent from every
/// row appear in neither map.
pub fn calculate_metrics(rows: &[Record], unfiltered: &[Record], catalog: Option<&[String]>) -> Metrics {
    let attributes = match catalog {
        Some(c) if !c.is_empty() => c.to_vec(),
        _ => infer_attributes(unfiltered),
    };

    let mut numeric_averages = BTreeMap::new();
    let mut category_counts = BTreeMap::new();

    for attribute in &attributes {
        let sampled: Vec<_> = rows
            .iter()
            .filter_map(|r| resolve_value(attribute, r))
            .collect();
        if sampled.is_empty() {
            continue;
        }

        let numbers: Vec<f64> = sampled.iter().filter_map(|v| value_as_number(v)).collect();
        if numbers.len() == sampled.len() {
            numeric_averages.insert(attribute.clone(), round_to(average(&numbers), 2));
        } else {
            let mut tally: BTreeMap<String, usize> = BTreeMap::new();
            for v in sampled {
                *tally.entry(value_to_text(v)).or_default() += 1;
            }
            category_counts.insert(attribute.clone(), tally);
        }
    }

    Metrics {
        total_rows: rows.len(),
        total_rows_unfiltered: unfiltered.len(),
        filter_match_rate: filter_match_rate(rows.len(), unfiltered.len()),
        numeric_averages,
        category_counts,
    }
}

use crate::error::{ReportError, ReportResult};
use crate::resolver::resolve_value;
use crate::types::{Record, ReportContext};
use crate::util::{number_value, parse_f64_safe, value_as_number};
use csv::{ReaderBuilder, StringRecord};
use log::{info, warn};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Supplies the raw rows a report is generated from.
pub trait RecordSource {
    fn fetch_records(&self, context: &ReportContext) -> ReportResult<Vec<Record>>;
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub parse_errors: usize,
}

/// Turn a raw CSV cell into a record value: blank cells become `null`,
/// numeric-looking cells become numbers, everything else stays text.
pub fn infer_cell(raw: &str) -> Value {
    let s = raw.trim();
    if s.is_empty() {
        return Value::Null;
    }
    match parse_f64_safe(Some(s)) {
        Some(n) => number_value(n),
        None => Value::String(s.to_string()),
    }
}

fn to_record(headers: &StringRecord, row: &StringRecord) -> Record {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_string(), infer_cell(row.get(i).unwrap_or(""))))
        .collect()
}

/// Read every row of a CSV file into records keyed by its header row.
pub fn load_records(path: &Path) -> ReportResult<(Vec<Record>, LoadReport)> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = rdr.headers()?.clone();
    if headers.is_empty() {
        return Err(ReportError::MissingHeader(path.display().to_string()));
    }

    let mut report = LoadReport::default();
    let mut records: Vec<Record> = Vec::new();
    for result in rdr.records() {
        report.total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping unreadable row {}: {}", report.total_rows, e);
                report.parse_errors += 1;
                continue;
            }
        };
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        records.push(to_record(&headers, &row));
    }
    report.loaded_rows = records.len();
    Ok((records, report))
}

/// Attribute catalog of a CSV file: its trimmed, non-empty header names.
pub fn read_catalog(path: &Path) -> ReportResult<Vec<String>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    Ok(rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect())
}

/// Keep rows belonging to the context's initiative. Rows without an
/// initiative column are kept.
fn scope_to_initiative(records: Vec<Record>, context: &ReportContext) -> Vec<Record> {
    let Some(id) = context.initiative_id else {
        return records;
    };
    records
        .into_iter()
        .filter(|r| match resolve_value("Initiative Id", r).and_then(value_as_number) {
            Some(v) => v == id as f64,
            None => true,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct CsvRecordSource {
    path: PathBuf,
}

impl CsvRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn catalog(&self) -> ReportResult<Vec<String>> {
        read_catalog(&self.path)
    }
}

impl RecordSource for CsvRecordSource {
    fn fetch_records(&self, context: &ReportContext) -> ReportResult<Vec<Record>> {
        let (records, report) = load_records(&self.path)?;
        info!(
            "loaded {} of {} rows from {} ({} unreadable)",
            report.loaded_rows,
            report.total_rows,
            self.path.display(),
            report.parse_errors
        );
        Ok(scope_to_initiative(records, context))
    }
}

/// Rows already held in memory, e.g. loaded once by the CLI or built in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordSource {
    records: Vec<Record>,
}

impl InMemoryRecordSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl RecordSource for InMemoryRecordSource {
    fn fetch_records(&self, context: &ReportContext) -> ReportResult<Vec<Record>> {
        Ok(scope_to_initiative(self.records.clone(), context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_infer_cell() {
        assert_eq!(infer_cell("  "), Value::Null);
        assert_eq!(infer_cell("1,200"), json!(1200));
        assert_eq!(infer_cell("92.5"), json!(92.5));
        assert_eq!(infer_cell(" 7th "), json!("7th"));
    }

    #[test]
    fn test_load_records_from_csv() {
        let path = std::env::temp_dir().join("survey_report_loader_test.csv");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "Grade,Score,Initiative Id").unwrap();
            writeln!(f, "7th,10,1").unwrap();
            writeln!(f, ",,").unwrap();
            writeln!(f, "8th,30,2").unwrap();
        }
        let (records, report) = load_records(&path).unwrap();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.loaded_rows, 2);
        assert_eq!(records[0]["Score"], json!(10));
        assert_eq!(read_catalog(&path).unwrap(), vec!["Grade", "Score", "Initiative Id"]);

        let source = CsvRecordSource::new(path.clone());
        assert_eq!(source.path(), path.as_path());
        assert_eq!(source.catalog().unwrap(), vec!["Grade", "Score", "Initiative Id"]);
        let ctx = ReportContext {
            initiative_id: Some(2),
            ..ReportContext::default()
        };
        let scoped = source.fetch_records(&ctx).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0]["Grade"], json!("8th"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_in_memory_source_keeps_unscoped_rows() {
        let rows: Vec<Record> = serde_json::from_value(json!([{"a": 1}, {"a": 2}])).unwrap();
        let source = InMemoryRecordSource::new(rows);
        let ctx = ReportContext {
            initiative_id: Some(9),
            ..ReportContext::default()
        };
        assert_eq!(source.fetch_records(&ctx).unwrap().len(), 2);
    }
}

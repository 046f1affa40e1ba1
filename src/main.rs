// Entry point and high-level CLI flow.
//
// - Option [1] loads the survey CSV once and keeps it in memory.
// - Option [2] reads the report request, validates it, runs the pipeline and
//   writes the snapshot plus a CSV of the filtered rows.
// - Option [3] reads a stored snapshot back through the normalizer.
use once_cell::sync::Lazy;
use serde_json::Value;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use survey_report::loader::{self, CsvRecordSource, InMemoryRecordSource, RecordSource};
use survey_report::output;
use survey_report::report::{context_for, generate_report};
use survey_report::settings::{Settings, DEFAULT_SETTINGS_FILE};
use survey_report::snapshot::{read_snapshot, ReportSnapshot};
use survey_report::types::{Record, ReportContext};
use survey_report::util::format_int;
use survey_report::{logging, validate_report_create_payload, validate_trend_config, ReportResult};

// Loaded once, reused for every report generated in this run.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| {
    Mutex::new(AppState {
        data: None,
        catalog: Vec::new(),
    })
});

struct AppState {
    data: Option<Vec<Record>>,
    catalog: Vec<String>,
}

fn app_state() -> MutexGuard<'static, AppState> {
    APP_STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
fn read_choice() -> String {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to Report Selection (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        io::stdin().read_line(&mut buf).ok();
        match buf.trim().to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn handle_load(settings: &Settings) {
    let source = CsvRecordSource::new(settings.data_path.clone());
    let loaded = loader::load_records(source.path()).and_then(|(data, report)| {
        let catalog = source.catalog()?;
        Ok((data, report, catalog))
    });
    match loaded {
        Ok((data, load_report, catalog)) => {
            println!(
                "Processing dataset... ({} rows read, {} records kept, {} attributes)",
                format_int(load_report.total_rows),
                format_int(load_report.loaded_rows),
                format_int(catalog.len())
            );
            if load_report.parse_errors > 0 {
                println!(
                    "Note: {} rows skipped due to parse errors.",
                    format_int(load_report.parse_errors)
                );
            }
            println!();
            let mut state = app_state();
            state.data = Some(data);
            state.catalog = catalog;
        }
        Err(e) => {
            eprintln!("Failed to load file: {}\n", e);
        }
    }
}

/// The request's trend config, with the configured default threshold filled
/// in when the request does not set one.
fn trend_config_with_defaults(raw: &Value, settings: &Settings) -> Value {
    match raw {
        Value::Object(obj) if !obj.contains_key("thresholdPct") => {
            let mut obj = obj.clone();
            obj.insert("thresholdPct".to_string(), Value::from(settings.trend.threshold_pct));
            Value::Object(obj)
        }
        other => other.clone(),
    }
}

fn run_report(settings: &Settings, data: Vec<Record>, catalog: &[String]) -> ReportResult<ReportSnapshot> {
    let text = std::fs::read_to_string(&settings.request_path)?;
    let payload: Value = serde_json::from_str(&text)?;
    let request = validate_report_create_payload(&payload)?;
    let raw_trend = trend_config_with_defaults(&request.trend_config, settings);
    let trend_config = validate_trend_config(&raw_trend, Some(catalog))?;

    let context = context_for(&request, &ReportContext::default());
    let records = InMemoryRecordSource::new(data).fetch_records(&context)?;
    let snapshot = generate_report(&records, &request, &trend_config, &context, Some(catalog));

    output::write_json(&settings.snapshot_path, &snapshot)?;
    output::write_records_csv(&settings.filtered_csv_path, &snapshot.results.filtered_table_data)?;
    Ok(snapshot)
}

fn handle_generate_report(settings: &Settings) {
    let (data, catalog) = {
        let state = app_state();
        (state.data.clone(), state.catalog.clone())
    };
    let Some(data) = data else {
        println!("Error: No data loaded. Please load the data file first (option 1).\n");
        return;
    };

    println!("Generating report...");
    let snapshot = match run_report(settings, data, &catalog) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Report not generated: {}\n", e);
            return;
        }
    };
    let results = &snapshot.results;

    println!("Report {} ({})\n", results.report_id, results.summary.headline);
    println!("Filtered Rows");
    output::preview_records(&results.filtered_table_data, settings.preview_rows);
    println!("Pipeline Stages");
    output::preview_table_rows(&output::stage_rows(&results.explainability), 3);
    println!("Metrics");
    output::preview_table_rows(&output::metric_rows(&results.metrics), usize::MAX);
    if !results.trend_data.is_empty() {
        println!("Trends");
        output::preview_table_rows(&output::trend_rows(&results.trend_data), usize::MAX);
        for t in results.trend_data.iter().filter(|t| t.enabled_display) {
            println!("{}", t.description);
        }
        println!();
    }
    println!(
        "(Snapshot saved to {}, rows exported to {})\n",
        settings.snapshot_path.display(),
        settings.filtered_csv_path.display()
    );
}

fn handle_inspect_snapshot(settings: &Settings) {
    let snapshot = match read_snapshot(&settings.snapshot_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read snapshot: {}\n", e);
            return;
        }
    };
    println!(
        "Snapshot {} (schema v{}, {} rows)\n",
        snapshot.results.report_id,
        snapshot.version,
        format_int(snapshot.results.filtered_table_data.len())
    );
    match snapshot.explainability() {
        Some(trace) => output::preview_table_rows(&output::stage_rows(&trace), 3),
        None => println!("(no pipeline trace recorded)\n"),
    }
    let trends = snapshot.trend_results();
    if !trends.is_empty() {
        output::preview_table_rows(&output::trend_rows(&trends), usize::MAX);
    }
}

fn main() {
    let settings = match Settings::load(Path::new(DEFAULT_SETTINGS_FILE)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid {}: {}. Using defaults.", DEFAULT_SETTINGS_FILE, e);
            Settings::default()
        }
    };
    if let Err(e) = logging::init(settings.level_filter()) {
        eprintln!("Logger unavailable: {}", e);
    }

    loop {
        println!("Select Option:");
        println!("[1] Load the data file");
        println!("[2] Generate Report");
        println!("[3] Inspect Stored Snapshot\n");
        match read_choice().as_str() {
            "1" => handle_load(&settings),
            "2" => {
                println!();
                handle_generate_report(&settings);
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            "3" => handle_inspect_snapshot(&settings),
            _ => println!("Invalid choice. Please enter 1, 2 or 3.\n"),
        }
    }
}

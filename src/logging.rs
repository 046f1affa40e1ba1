use chrono::{DateTime, Utc};
use log::{LevelFilter, Metadata, Record, SetLoggerError};

/// Writes `[timestamp] LEVEL - message` lines to stderr so they do not mix
/// with the report previews on stdout.
pub struct ReportLogger;

pub static REPORT_LOGGER: ReportLogger = ReportLogger;

impl log::Log for ReportLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now: DateTime<Utc> = Utc::now();
            eprintln!("[{}] {} - {}", now.to_rfc3339(), record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&REPORT_LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

//! Report generation and trend engine for tabular survey/initiative data.
//!
//! Records flow through filters, boolean conditions and a multi-key sort,
//! then metrics, trend signals and an explainability trace are computed
//! and assembled into a versioned snapshot. Stored snapshots from older
//! schema versions are upgraded on read by [`snapshot::normalize_snapshot`].

pub mod error;
pub mod hash;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod settings;
pub mod snapshot;
pub mod trend;
pub mod types;
pub mod util;
pub mod validation;

pub use error::{ReportError, ReportResult};
pub use loader::{CsvRecordSource, InMemoryRecordSource, RecordSource};
pub use pipeline::{process_report_data, ProcessedReport};
pub use report::generate_report;
pub use resolver::resolve_attribute;
pub use snapshot::{normalize_snapshot, CurrentSnapshot, ReportSnapshot};
pub use trend::{compute_trend_data, validate_trend_config};
pub use validation::{
    validate_report_create_payload, validate_report_delete_params, validate_report_query_params,
    validate_report_update_payload,
};

pub mod config;
pub mod database;
pub mod extract;
pub mod header;
pub mod models;
pub mod reconcile;
pub mod remap;
pub mod report;
pub mod source;
pub mod stats;
pub mod validate;

// Re-export commonly used types
pub use config::{get_config_dir, Config, CONFIG_ENV, LOCAL_CONFIG_FILE};
pub use database::{Database, DatabaseFile, MalformedRecord, DELIMITER, FIELD_COUNT};
pub use extract::{extract, format_message, Extraction};
pub use header::{render_header, write_header};
pub use models::{
    DatabaseRecord, EntryId, EntrySet, IdParseError, RequirementEntry, TestName, MAX_SEQUENCE,
    SEQUENCE_WIDTH,
};
pub use reconcile::{
    reconcile, Assignment, MatchKind, ReconcileWarning, Reconciler, Reconciliation, Tier,
};
pub use remap::{RemapError, RemapTable};
pub use report::ReconcileReport;
pub use source::{load_document, Document, DocumentRequest, Origin, SourceError};
pub use stats::{analyze, Stats};
pub use validate::{validate, Validation};

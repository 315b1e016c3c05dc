// Student ID Cards - Core Library
// Exposes all modules for use in the CLI and tests

pub mod error;
pub mod config;
pub mod temporal;       // Date normalization and display
pub mod numerals;       // Class label → Roman numeral
pub mod schema;         // Required-field validation
pub mod db;             // Record store (JSON file + backup)
pub mod photos;         // Photo crop and storage
pub mod card;           // Two-page PDF card renderer
pub mod archive;        // Batch render + zip
pub mod parser;         // Import table reader
pub mod reconciliation; // Import merge policies
pub mod export;         // Export projection
pub mod roster;         // Operator actions over all of the above

// Re-export commonly used types
pub use error::{CardError, ErrorKind, Result};
pub use config::Config;
pub use db::{
    LoadOutcome, RecordFilter, RecordStore, SaveOutcome, StudentForm, StudentRecord,
    card_file_name, next_id, sanitize_roll,
};
pub use temporal::{normalize_date, format_card_date, format_export_date, DateValue};
pub use numerals::{to_roman, format_class_label};
pub use schema::{
    SchemaValidator, Context, RequiredFields, ValidationError, ValidationResult,
};
pub use card::{CardRenderer, qr_payload};
pub use archive::{BatchFailure, BatchReport, ARCHIVE_NAME};
pub use parser::{CandidateRow, read_candidates};
pub use reconciliation::{
    MergeMode, ReconciliationEngine, ReconciliationReport, Reconciliation, RowFailure,
};
pub use export::{ExportRow, EXPORT_COLUMNS};
pub use roster::{Roster, StudentSaved, BatchOutcome, ImportOutcome, DELETE_ALL_CONFIRMATION};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

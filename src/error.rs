// ⚠️ Error taxonomy
// Every failure carries a machine-checkable kind so the shell can decide
// whether to show a form error, a recovery notice or an I/O failure.

use crate::schema::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`CardError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed field, duplicate key, unknown record
    Validation,
    /// Durable file or import table could not be understood
    DataFormat,
    /// Disk read/write failure
    Io,
    /// PDF, image or archive encoding failure
    Render,
}

#[derive(Error, Debug)]
pub enum CardError {
    #[error("{}", format_validation(.0))]
    Validation(Vec<ValidationError>),

    #[error("A student with roll number {0} already exists")]
    DuplicateRoll(String),

    #[error("Roll number {roll_no} would share card and photo files with roll number {existing}")]
    FileNameClash { roll_no: String, existing: String },

    #[error("No student with id {0}")]
    NotFound(u64),

    #[error("Invalid data format in {path}: {message}")]
    DataFormat { path: PathBuf, message: String },

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl CardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CardError::Validation(_)
            | CardError::DuplicateRoll(_)
            | CardError::FileNameClash { .. }
            | CardError::NotFound(_) => ErrorKind::Validation,
            CardError::DataFormat { .. } | CardError::MissingColumns(_) => ErrorKind::DataFormat,
            CardError::Io { .. } => ErrorKind::Io,
            CardError::Render(_) | CardError::Archive(_) => ErrorKind::Render,
        }
    }

    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CardError::Io {
            path: path.into(),
            source,
        }
    }

    /// Single-field validation failure
    pub fn invalid(field: &str, message: &str, context: &str) -> Self {
        CardError::Validation(vec![ValidationError::new(field, message, context)])
    }
}

impl From<printpdf::Error> for CardError {
    fn from(err: printpdf::Error) -> Self {
        CardError::Render(err.to_string())
    }
}

impl From<image::ImageError> for CardError {
    fn from(err: image::ImageError) -> Self {
        CardError::Render(err.to_string())
    }
}

fn format_validation(errors: &[ValidationError]) -> String {
    let missing: Vec<&str> = errors
        .iter()
        .filter(|e| e.is_missing())
        .map(|e| e.field.as_str())
        .collect();

    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("Missing required fields: {}", missing.join(", ")));
    }
    parts.extend(
        errors
            .iter()
            .filter(|e| !e.is_missing())
            .map(|e| e.message.clone()),
    );
    parts.join("; ")
}

pub type Result<T> = std::result::Result<T, CardError>;

// 📤 Export Formatter
// Read-only projection of the roster into display rows.

use crate::db::{write_atomic, StudentRecord};
use crate::error::{CardError, Result};
use crate::temporal::format_export_date;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const EXPORT_COLUMNS: [&str; 10] = [
    "Name",
    "Father Name",
    "Roll Number",
    "Class",
    "GR Number",
    "Phone",
    "Date of Birth",
    "Date of Issue",
    "Date of Expiry",
    "Photo Path",
];

/// One exported row; serde names are the column headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Father Name")]
    pub father_name: String,

    #[serde(rename = "Roll Number")]
    pub roll_no: String,

    #[serde(rename = "Class")]
    pub class_level: String,

    #[serde(rename = "GR Number")]
    pub gr_number: String,

    #[serde(rename = "Phone")]
    pub phone: String,

    #[serde(rename = "Date of Birth")]
    pub date_of_birth: String,

    #[serde(rename = "Date of Issue")]
    pub date_of_issue: String,

    #[serde(rename = "Date of Expiry")]
    pub date_of_expiry: String,

    #[serde(rename = "Photo Path")]
    pub photo_path: String,
}

impl From<&StudentRecord> for ExportRow {
    fn from(record: &StudentRecord) -> Self {
        ExportRow {
            name: record.name.clone(),
            father_name: record.father_name.clone(),
            roll_no: record.roll_no.clone(),
            class_level: record.class_level.clone(),
            gr_number: record.gr_number.clone(),
            phone: record.phone.clone(),
            date_of_birth: format_export_date(record.birth_date()),
            date_of_issue: format_export_date(record.issue_date()),
            date_of_expiry: format_export_date(record.expiry_date()),
            photo_path: record
                .photo_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }
}

pub fn export_rows(records: &[StudentRecord]) -> Vec<ExportRow> {
    records.iter().map(ExportRow::from).collect()
}

/// Write rows as CSV with a header line, even when there are no rows
pub fn write_csv<W: Write>(rows: &[ExportRow], target: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(target);
    if rows.is_empty() {
        writer.write_record(EXPORT_COLUMNS).map_err(export_error)?;
    }
    for row in rows {
        writer.serialize(row).map_err(export_error)?;
    }
    writer
        .flush()
        .map_err(|e| CardError::io("<export>", e))?;
    Ok(())
}

/// Export the whole roster to a CSV file
pub fn export_csv(records: &[StudentRecord], path: &Path) -> Result<usize> {
    let rows = export_rows(records);

    let mut buffer = Vec::new();
    write_csv(&rows, &mut buffer)?;
    write_atomic(path, &buffer)?;

    info!(rows = rows.len(), path = %path.display(), "Exported student records");
    Ok(rows.len())
}

fn export_error(err: csv::Error) -> CardError {
    CardError::DataFormat {
        path: "<export>".into(),
        message: err.to_string(),
    }
}

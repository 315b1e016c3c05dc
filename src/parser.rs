// 🏗️ Import Parser
// Reads a bulk import table into candidate rows for the reconciler.

use crate::error::{CardError, Result};
use crate::schema::RequiredFields;
use crate::temporal::is_empty_marker;
use csv::{ByteRecord, ReaderBuilder};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Columns an import table must carry, in the documented order
pub const REQUIRED_COLUMNS: [&str; 10] = [
    "name",
    "father_name",
    "roll_no",
    "class",
    "phone",
    "gr_number",
    "date_of_birth",
    "date_of_issue",
    "date_of_expiry",
    "photo_path",
];

/// One row of an import table, before reconciliation
///
/// Dates stay raw here; the reconciler decides how to read them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateRow {
    pub name: String,
    pub father_name: String,
    pub roll_no: String,
    pub class_level: String,
    pub phone: String,
    pub gr_number: String,
    pub date_of_birth: Option<String>,
    pub date_of_issue: Option<String>,
    pub date_of_expiry: Option<String>,
    pub photo_path: Option<PathBuf>,
    /// 1-based line in the source file, header included
    pub line_number: usize,
}

impl CandidateRow {
    pub fn required_fields(&self) -> RequiredFields<'_> {
        RequiredFields {
            name: &self.name,
            father_name: &self.father_name,
            roll_no: &self.roll_no,
            class_level: &self.class_level,
            gr_number: &self.gr_number,
            phone: &self.phone,
        }
    }
}

/// Read candidate rows from a CSV file
pub fn read_candidates(file_path: &Path) -> Result<Vec<CandidateRow>> {
    let file = File::open(file_path).map_err(|e| CardError::io(file_path, e))?;
    let rows = read_candidates_from(file)?;

    info!(rows = rows.len(), path = %file_path.display(), "Read import table");
    Ok(rows)
}

/// Read candidate rows from any CSV source
///
/// The whole table is rejected if a required column is missing.
/// Extra columns are ignored. Cells that are not UTF-8 are read as Latin-1.
pub fn read_candidates_from<R: Read>(source: R) -> Result<Vec<CandidateRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(csv_error)?
        .iter()
        .map(decode_cell)
        .collect();
    let columns: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(index, name)| (name.as_str(), index))
        .collect();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !columns.contains_key(*column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CardError::MissingColumns(missing));
    }

    let mut rows = Vec::new();
    for (line_num, result) in reader.byte_records().enumerate() {
        let record = result.map_err(csv_error)?;
        let cell = |column: &str| -> String {
            columns
                .get(column)
                .and_then(|index| record.get(*index))
                .map(decode_cell)
                .unwrap_or_default()
        };

        if is_blank_line(&record) {
            continue;
        }

        rows.push(CandidateRow {
            name: text_cell(cell("name")),
            father_name: text_cell(cell("father_name")),
            roll_no: text_cell(cell("roll_no")),
            class_level: text_cell(cell("class")),
            phone: text_cell(cell("phone")),
            gr_number: text_cell(cell("gr_number")),
            date_of_birth: optional_cell(cell("date_of_birth")),
            date_of_issue: optional_cell(cell("date_of_issue")),
            date_of_expiry: optional_cell(cell("date_of_expiry")),
            photo_path: optional_cell(cell("photo_path")).map(PathBuf::from),
            line_number: line_num + 2, // +2 because: 1-indexed + header row
        });
    }

    Ok(rows)
}

fn is_blank_line(record: &ByteRecord) -> bool {
    record
        .iter()
        .all(|value| value.iter().all(u8::is_ascii_whitespace))
}

/// UTF-8 when valid, otherwise Latin-1 ("CSV (Windows)" exports)
fn decode_cell(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let text: String = bytes.iter().map(|&b| b as char).collect();
            warn!(cell = %text, "Import cell is not UTF-8, read as Latin-1");
            text
        }
    };
    text.trim().to_string()
}

/// Spreadsheet exports write whole numbers as "101.0"; strip that
fn text_cell(value: String) -> String {
    if is_empty_marker(&value) {
        return String::new();
    }
    match value.strip_suffix(".0") {
        Some(whole) if !whole.is_empty() && whole.chars().all(|c| c.is_ascii_digit()) => {
            whole.to_string()
        }
        _ => value,
    }
}

fn optional_cell(value: String) -> Option<String> {
    if is_empty_marker(&value) {
        None
    } else {
        Some(value)
    }
}

/// Cells are read as bytes, so only a failing reader reaches here
fn csv_error(err: csv::Error) -> CardError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    let message = format!("line {}: {}", line, err);
    match err.into_kind() {
        csv::ErrorKind::Io(source) => CardError::io("<import>", source),
        _ => CardError::DataFormat {
            path: PathBuf::from("<import>"),
            message,
        },
    }
}

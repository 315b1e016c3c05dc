use crate::error::{CardError, ErrorKind, Result};
use crate::schema::{RequiredFields, SchemaValidator};
use crate::temporal::{normalize_date, to_iso};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Student record - the only persisted entity
///
/// Dates are kept as the text that was stored so that older files (and
/// imports whose dates did not parse) survive a load/save cycle untouched.
/// Use the typed accessors to read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: u64,
    pub name: String,
    pub father_name: String,
    pub roll_no: String,

    #[serde(rename = "class")]
    pub class_level: String,

    pub phone: String,
    pub gr_number: String,

    #[serde(default)]
    pub date_of_birth: Option<String>,

    #[serde(default)]
    pub date_of_issue: Option<String>,

    #[serde(default)]
    pub date_of_expiry: Option<String>,

    /// Reference only; the store never creates or removes the photo file
    #[serde(default)]
    pub photo_path: Option<PathBuf>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl StudentRecord {
    pub fn birth_date(&self) -> Option<NaiveDate> {
        normalize_date(&self.date_of_birth)
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        normalize_date(&self.date_of_issue)
    }

    pub fn expiry_date(&self) -> Option<NaiveDate> {
        normalize_date(&self.date_of_expiry)
    }

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

    /// File name of this record's rendered card
    pub fn card_file_name(&self) -> String {
        card_file_name(&self.roll_no)
    }
}

/// Validated field values as collected by the entry/edit form
#[derive(Debug, Clone, PartialEq)]
pub struct StudentForm {
    pub name: String,
    pub father_name: String,
    pub roll_no: String,
    pub class_level: String,
    pub gr_number: String,
    pub phone: String,
    pub date_of_birth: NaiveDate,
    pub date_of_issue: NaiveDate,
    pub date_of_expiry: NaiveDate,
    /// New photo; `None` on edit keeps the current one
    pub photo_path: Option<PathBuf>,
}

impl StudentForm {
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

    fn into_record(self, id: u64) -> StudentRecord {
        StudentRecord {
            id,
            name: self.name.trim().to_string(),
            father_name: self.father_name.trim().to_string(),
            roll_no: self.roll_no.trim().to_string(),
            class_level: self.class_level.trim().to_string(),
            phone: self.phone.trim().to_string(),
            gr_number: self.gr_number.trim().to_string(),
            date_of_birth: Some(to_iso(self.date_of_birth)),
            date_of_issue: Some(to_iso(self.date_of_issue)),
            date_of_expiry: Some(to_iso(self.date_of_expiry)),
            photo_path: self.photo_path,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Filters offered by the manage screen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Case-insensitive substring of the name
    pub name: Option<String>,
    /// Exact class label
    pub class_level: Option<String>,
    /// Substring of the roll number
    pub roll_no: Option<String>,
}

impl RecordFilter {
    pub fn matches(&self, record: &StudentRecord) -> bool {
        if let Some(name) = active(&self.name) {
            if !record.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(class_level) = active(&self.class_level) {
            if record.class_level != class_level {
                return false;
            }
        }
        if let Some(roll_no) = active(&self.roll_no) {
            if !record.roll_no.contains(roll_no) {
                return false;
            }
        }
        true
    }

    pub fn apply<'a>(&self, records: &'a [StudentRecord]) -> Vec<&'a StudentRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

fn active(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Roll number made safe for a file name: whitespace and path separators become `_`
pub fn sanitize_roll(roll_no: &str) -> String {
    roll_no
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

/// Why `roll_no` cannot be used by record `except_id` (None for a new record)
///
/// Catches exact duplicates and distinct roll numbers such as "10 A" and
/// "10/A" that would share one card and photo file.
pub fn roll_conflict(
    records: &[StudentRecord],
    roll_no: &str,
    except_id: Option<u64>,
) -> Option<CardError> {
    let roll_no = roll_no.trim();
    let mut others = records.iter().filter(|r| Some(r.id) != except_id);

    if others.clone().any(|r| r.roll_no == roll_no) {
        return Some(CardError::DuplicateRoll(roll_no.to_string()));
    }

    let file_key = sanitize_roll(roll_no);
    others
        .find(|r| sanitize_roll(&r.roll_no) == file_key)
        .map(|r| CardError::FileNameClash {
            roll_no: roll_no.to_string(),
            existing: r.roll_no.clone(),
        })
}

pub fn card_file_name(roll_no: &str) -> String {
    format!("{}_card.pdf", sanitize_roll(roll_no))
}

/// Next free id: one above the largest id in use
pub fn next_id(records: &[StudentRecord]) -> u64 {
    records.iter().map(|r| r.id).max().map_or(1, |max| max + 1)
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

// ============================================================================
// RECORD STORE
// ============================================================================

/// Result of a load; never an error
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub records: Vec<StudentRecord>,
    /// Set when the primary file could not be read
    pub advisory: Option<String>,
    /// Kind of the primary file's failure, alongside `advisory`
    pub failure: Option<ErrorKind>,
    pub recovered_from_backup: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub message: String,
    pub record_count: usize,
    /// False when no backup was taken (first save, or unreadable current file)
    pub backed_up: bool,
}

/// Durable record file plus its `.backup` sibling
#[derive(Debug, Clone)]
pub struct RecordStore {
    data_file: PathBuf,
    backup_file: PathBuf,
    validator: SchemaValidator,
}

impl RecordStore {
    pub fn new(data_file: impl Into<PathBuf>) -> Self {
        let data_file = data_file.into();
        let mut backup_name = data_file.clone().into_os_string();
        backup_name.push(".backup");

        RecordStore {
            data_file,
            backup_file: PathBuf::from(backup_name),
            validator: SchemaValidator::new(),
        }
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    pub fn backup_file(&self) -> &Path {
        &self.backup_file
    }

    /// Read the whole collection
    ///
    /// Missing file → empty. Unreadable file → backup, else empty, with an advisory.
    pub fn load(&self) -> LoadOutcome {
        if !self.data_file.exists() {
            return LoadOutcome::default();
        }

        let primary_err = match read_collection(&self.data_file) {
            Ok(records) => {
                return LoadOutcome {
                    records,
                    advisory: None,
                    failure: None,
                    recovered_from_backup: false,
                }
            }
            Err(err) => err,
        };

        warn!(path = %self.data_file.display(), error = %primary_err, "Error reading data file, trying backup");
        let failure = Some(primary_err.kind());

        if !self.backup_file.exists() {
            return LoadOutcome {
                records: Vec::new(),
                advisory: Some(format!("{}; no backup available, starting empty", primary_err)),
                failure,
                recovered_from_backup: false,
            };
        }

        match read_collection(&self.backup_file) {
            Ok(records) => {
                info!(count = records.len(), "Recovered student records from backup");
                LoadOutcome {
                    records,
                    advisory: Some(format!("{}; loaded backup instead", primary_err)),
                    failure,
                    recovered_from_backup: true,
                }
            }
            Err(backup_err) => {
                warn!(error = %backup_err, "Backup unreadable too, starting empty");
                LoadOutcome {
                    records: Vec::new(),
                    advisory: Some(format!(
                        "{}; backup also unreadable ({}), starting empty",
                        primary_err, backup_err
                    )),
                    failure,
                    recovered_from_backup: false,
                }
            }
        }
    }

    /// Replace the durable file with `records`, backing up the previous version first
    pub fn save(&self, records: &[StudentRecord]) -> Result<SaveOutcome> {
        let backed_up = self.backup_current();

        let json = serde_json::to_string_pretty(records).map_err(|e| CardError::DataFormat {
            path: self.data_file.clone(),
            message: e.to_string(),
        })?;

        write_atomic(&self.data_file, json.as_bytes())?;

        info!(count = records.len(), path = %self.data_file.display(), "Saved student records");

        Ok(SaveOutcome {
            message: "Data saved successfully!".to_string(),
            record_count: records.len(),
            backed_up,
        })
    }

    /// Best-effort copy of the current file to the backup location
    ///
    /// A current file that no longer parses is not copied, so the backup it
    /// was recovered from stays intact.
    fn backup_current(&self) -> bool {
        if !self.data_file.exists() {
            return false;
        }

        if let Err(err) = read_collection(&self.data_file) {
            warn!(error = %err, "Current data file unreadable, keeping existing backup");
            return false;
        }

        match fs::copy(&self.data_file, &self.backup_file) {
            Ok(_) => true,
            Err(err) => {
                warn!(path = %self.backup_file.display(), error = %err, "Backup failed, saving anyway");
                false
            }
        }
    }

    pub fn find_by_roll(&self, roll_no: &str) -> Option<StudentRecord> {
        let roll_no = roll_no.trim();
        self.load().records.into_iter().find(|r| r.roll_no == roll_no)
    }

    pub fn find_by_id(&self, id: u64) -> Option<StudentRecord> {
        self.load().records.into_iter().find(|r| r.id == id)
    }

    /// Append a new record; rejects a roll number already in the store
    pub fn insert(&self, form: StudentForm) -> Result<StudentRecord> {
        self.validator.validate_form(&form).map_err(CardError::Validation)?;

        let mut records = self.load_for_write();
        if let Some(conflict) = roll_conflict(&records, &form.roll_no, None) {
            return Err(conflict);
        }

        let mut record = form.into_record(next_id(&records));
        record.created_at = Some(now_timestamp());

        records.push(record.clone());
        self.save(&records)?;

        info!(id = record.id, roll_no = %record.roll_no, "Inserted student");
        Ok(record)
    }

    /// Overwrite the editable fields of record `id`
    ///
    /// Keeps id and created_at, keeps photo_path when the form has none,
    /// stamps updated_at. Returns (previous, updated).
    pub fn update(&self, id: u64, form: StudentForm) -> Result<(StudentRecord, StudentRecord)> {
        self.validator.validate_form(&form).map_err(CardError::Validation)?;

        let mut records = self.load_for_write();
        let index = records
            .iter()
            .position(|r| r.id == id)
            .ok_or(CardError::NotFound(id))?;

        if let Some(conflict) = roll_conflict(&records, &form.roll_no, Some(id)) {
            return Err(conflict);
        }

        let previous = records[index].clone();
        let mut updated = form.into_record(id);
        if updated.photo_path.is_none() {
            updated.photo_path = previous.photo_path.clone();
        }
        updated.created_at = previous.created_at.clone();
        updated.updated_at = Some(now_timestamp());

        records[index] = updated.clone();
        self.save(&records)?;

        info!(id, roll_no = %updated.roll_no, "Updated student");
        Ok((previous, updated))
    }

    /// Remove record `id` and persist; returns the removed record
    pub fn delete(&self, id: u64) -> Result<StudentRecord> {
        let mut records = self.load_for_write();
        let index = records
            .iter()
            .position(|r| r.id == id)
            .ok_or(CardError::NotFound(id))?;

        let removed = records.remove(index);
        self.save(&records)?;

        info!(id, roll_no = %removed.roll_no, "Deleted student");
        Ok(removed)
    }

    /// Persist an empty collection
    pub fn clear(&self) -> Result<SaveOutcome> {
        self.save(&[])
    }

    fn load_for_write(&self) -> Vec<StudentRecord> {
        let outcome = self.load();
        if let Some(advisory) = &outcome.advisory {
            warn!(%advisory, "Writing on top of a degraded read");
        }
        outcome.records
    }
}

fn read_collection(path: &Path) -> Result<Vec<StudentRecord>> {
    let text = fs::read_to_string(path).map_err(|e| CardError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| CardError::DataFormat {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Write through a sibling temp file and rename, so readers see old or new, never half
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CardError::io(parent, e))?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    if let Err(err) = fs::write(&tmp_path, bytes) {
        let _ = fs::remove_file(&tmp_path);
        return Err(CardError::io(&tmp_path, err));
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        CardError::io(path, e)
    })
}

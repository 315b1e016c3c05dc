// ⚖️ Reconciliation Engine - Merge imported rows into the roster
//
// Three policies, all keyed by roll number:
//   AddNewOnly      existing roll → skipped, new roll → appended
//   ReplaceAll      roster discarded, every row appended
//   UpdateExisting  existing roll → overwritten in place, new roll → appended
//
// Roll numbers stay unique under every policy, including duplicates
// inside the imported table itself.

use crate::db::{next_id, now_timestamp, sanitize_roll, StudentRecord};
use crate::parser::CandidateRow;
use crate::schema::SchemaValidator;
use crate::temporal::{parse_import_date, to_iso};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

// ============================================================================
// MERGE MODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeMode {
    /// Skip rows whose roll number is already present
    AddNewOnly,
    /// Discard the roster (and its photos and cards) first
    ReplaceAll,
    /// Overwrite matching rows, append the rest
    UpdateExisting,
}

impl MergeMode {
    pub fn name(&self) -> &str {
        match self {
            MergeMode::AddNewOnly => "Add new students only",
            MergeMode::ReplaceAll => "Replace all data",
            MergeMode::UpdateExisting => "Update existing + add new",
        }
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

/// A row that could not be merged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFailure {
    pub line_number: usize,
    pub roll_no: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub mode: MergeMode,
    pub candidate_count: usize,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failures: Vec<RowFailure>,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    fn new(mode: MergeMode, candidate_count: usize) -> Self {
        ReconciliationReport {
            mode,
            candidate_count,
            added: 0,
            updated: 0,
            skipped: 0,
            failures: Vec::new(),
            reconciled_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> String {
        let mut summary = match self.mode {
            MergeMode::ReplaceAll => format!(
                "Data replaced successfully! Imported {} students.",
                self.added
            ),
            MergeMode::UpdateExisting => format!(
                "Import completed! Added {} new students, updated {} existing students.",
                self.added, self.updated
            ),
            MergeMode::AddNewOnly => format!(
                "Import completed! Added {} new students (skipped {} duplicates).",
                self.added, self.skipped
            ),
        };

        if !self.failures.is_empty() {
            summary.push_str(&format!(" {} rows failed validation.", self.failures.len()));
        }
        summary
    }
}

/// Merged collection plus what happened to each row
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub records: Vec<StudentRecord>,
    pub report: ReconciliationReport,
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Debug, Default)]
pub struct ReconciliationEngine {
    validator: SchemaValidator,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            validator: SchemaValidator::new(),
        }
    }

    /// Merge `candidates` into `existing` under `mode`
    ///
    /// Pure: the caller persists the result and handles file side effects.
    pub fn reconcile(
        &self,
        existing: Vec<StudentRecord>,
        candidates: &[CandidateRow],
        mode: MergeMode,
    ) -> Reconciliation {
        let mut records = match mode {
            MergeMode::ReplaceAll => Vec::new(),
            MergeMode::AddNewOnly | MergeMode::UpdateExisting => existing,
        };
        let mut report = ReconciliationReport::new(mode, candidates.len());

        let mut by_roll: HashMap<String, usize> = records
            .iter()
            .enumerate()
            .map(|(index, record)| (record.roll_no.clone(), index))
            .collect();
        // Roll numbers by the card/photo file name they map to
        let mut by_file: HashMap<String, String> = records
            .iter()
            .map(|record| (sanitize_roll(&record.roll_no), record.roll_no.clone()))
            .collect();

        for candidate in candidates {
            if let Err(errors) = self.validator.validate_candidate(candidate) {
                let reason = errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!(line = candidate.line_number, %reason, "Import row rejected");
                report.failures.push(RowFailure {
                    line_number: candidate.line_number,
                    roll_no: candidate.roll_no.clone(),
                    reason,
                });
                continue;
            }

            let roll_no = candidate.roll_no.trim();
            match (mode, by_roll.get(roll_no).copied()) {
                (MergeMode::UpdateExisting, Some(index)) => {
                    records[index] = merge_into(&records[index], candidate);
                    report.updated += 1;
                }
                (_, Some(_)) => {
                    report.skipped += 1;
                }
                (_, None) if by_file.contains_key(&sanitize_roll(roll_no)) => {
                    let existing = &by_file[&sanitize_roll(roll_no)];
                    let reason = format!(
                        "Roll number {} would share card and photo files with roll number {}",
                        roll_no, existing
                    );
                    warn!(line = candidate.line_number, %reason, "Import row rejected");
                    report.failures.push(RowFailure {
                        line_number: candidate.line_number,
                        roll_no: roll_no.to_string(),
                        reason,
                    });
                }
                (_, None) => {
                    let mut record = candidate_to_record(candidate, next_id(&records));
                    record.created_at = Some(now_timestamp());
                    by_roll.insert(record.roll_no.clone(), records.len());
                    by_file.insert(sanitize_roll(&record.roll_no), record.roll_no.clone());
                    records.push(record);
                    report.added += 1;
                }
            }
        }

        info!(
            mode = mode.name(),
            added = report.added,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failures.len(),
            "Reconciled import"
        );

        Reconciliation { records, report }
    }
}

/// Overwrite `existing` with the candidate's fields, keeping identity
fn merge_into(existing: &StudentRecord, candidate: &CandidateRow) -> StudentRecord {
    let mut merged = candidate_to_record(candidate, existing.id);
    if merged.photo_path.is_none() {
        merged.photo_path = existing.photo_path.clone();
    }
    merged.created_at = existing.created_at.clone();
    merged.updated_at = Some(now_timestamp());
    merged
}

fn candidate_to_record(candidate: &CandidateRow, id: u64) -> StudentRecord {
    let import_date = |raw: &Option<String>| {
        raw.as_deref()
            .and_then(parse_import_date)
            .map(to_iso)
    };

    StudentRecord {
        id,
        name: candidate.name.trim().to_string(),
        father_name: candidate.father_name.trim().to_string(),
        roll_no: candidate.roll_no.trim().to_string(),
        class_level: candidate.class_level.trim().to_string(),
        phone: candidate.phone.trim().to_string(),
        gr_number: candidate.gr_number.trim().to_string(),
        date_of_birth: import_date(&candidate.date_of_birth),
        date_of_issue: import_date(&candidate.date_of_issue),
        date_of_expiry: import_date(&candidate.date_of_expiry),
        photo_path: candidate.photo_path.clone(),
        created_at: None,
        updated_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn create_test_candidate(roll_no: &str, name: &str) -> CandidateRow {
        CandidateRow {
            name: name.to_string(),
            father_name: "Father".to_string(),
            roll_no: roll_no.to_string(),
            class_level: "6".to_string(),
            phone: "0321-7654321".to_string(),
            gr_number: format!("GR-{}", roll_no),
            date_of_birth: Some("03/04/2013".to_string()),
            date_of_issue: Some("2024-04-01".to_string()),
            date_of_expiry: Some("31/03/2025".to_string()),
            photo_path: None,
            line_number: 2,
        }
    }

    fn create_test_roster() -> Vec<StudentRecord> {
        let mut record = candidate_to_record(&create_test_candidate("101", "A"), 1);
        record.photo_path = Some(PathBuf::from("photos/101.png"));
        record.created_at = Some("2024-01-01T00:00:00+00:00".to_string());
        vec![record]
    }

    #[test]
    fn test_candidate_dates_read_day_first() {
        let record = candidate_to_record(&create_test_candidate("1", "X"), 1);
        assert_eq!(record.date_of_birth.as_deref(), Some("2013-04-03"));
        assert_eq!(record.date_of_issue.as_deref(), Some("2024-04-01"));
        assert_eq!(record.date_of_expiry.as_deref(), Some("2025-03-31"));
    }

    #[test]
    fn test_add_new_only_skips_existing() {
        let engine = ReconciliationEngine::new();
        let existing = create_test_roster();

        let result = engine.reconcile(
            existing.clone(),
            &[create_test_candidate("101", "B"), create_test_candidate("102", "C")],
            MergeMode::AddNewOnly,
        );

        assert_eq!(result.report.added, 1);
        assert_eq!(result.report.skipped, 1);
        assert_eq!(result.report.updated, 0);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0], existing[0]);
        assert_eq!(result.records[1].roll_no, "102");
        assert_eq!(result.records[1].id, 2);
        assert!(result.records[1].created_at.is_some());

        println!("✅ {}", result.report.summary());
    }

    #[test]
    fn test_update_existing_preserves_identity() {
        let engine = ReconciliationEngine::new();
        let existing = create_test_roster();

        let result = engine.reconcile(
            existing.clone(),
            &[create_test_candidate("101", "B")],
            MergeMode::UpdateExisting,
        );

        assert_eq!(result.report.updated, 1);
        assert_eq!(result.report.added, 0);
        assert_eq!(result.records.len(), 1);

        let updated = &result.records[0];
        assert_eq!(updated.name, "B");
        assert_eq!(updated.id, existing[0].id);
        assert_eq!(updated.photo_path, existing[0].photo_path);
        assert_eq!(updated.created_at, existing[0].created_at);
        assert!(updated.updated_at.is_some());
    }

    #[test]
    fn test_update_existing_takes_supplied_photo() {
        let engine = ReconciliationEngine::new();
        let mut candidate = create_test_candidate("101", "B");
        candidate.photo_path = Some(PathBuf::from("new/101.jpg"));

        let result = engine.reconcile(create_test_roster(), &[candidate], MergeMode::UpdateExisting);
        assert_eq!(result.records[0].photo_path, Some(PathBuf::from("new/101.jpg")));
    }

    #[test]
    fn test_update_existing_appends_new() {
        let engine = ReconciliationEngine::new();

        let result = engine.reconcile(
            create_test_roster(),
            &[create_test_candidate("102", "C"), create_test_candidate("102", "C2")],
            MergeMode::UpdateExisting,
        );

        // Second 102 updates the row added by the first
        assert_eq!(result.report.added, 1);
        assert_eq!(result.report.updated, 1);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[1].name, "C2");
        assert_eq!(result.records[1].id, 2);
    }

    #[test]
    fn test_replace_all() {
        let engine = ReconciliationEngine::new();

        let result = engine.reconcile(
            create_test_roster(),
            &[
                create_test_candidate("101", "New A"),
                create_test_candidate("300", "D"),
                create_test_candidate("300", "D again"),
            ],
            MergeMode::ReplaceAll,
        );

        assert_eq!(result.report.added, 2);
        assert_eq!(result.report.skipped, 1);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].name, "New A");
        assert_eq!(result.records[0].id, 1);
        assert_eq!(result.records[0].photo_path, None);
        assert_eq!(result.records[1].id, 2);
    }

    #[test]
    fn test_invalid_rows_recorded_batch_continues() {
        let engine = ReconciliationEngine::new();
        let mut bad = create_test_candidate("", "Nameless roll");
        bad.line_number = 5;
        let mut bad_phone = create_test_candidate("104", "E");
        bad_phone.phone = "n/a".to_string();

        let result = engine.reconcile(
            Vec::new(),
            &[bad, create_test_candidate("103", "D"), bad_phone],
            MergeMode::AddNewOnly,
        );

        assert_eq!(result.report.added, 1);
        assert_eq!(result.report.failures.len(), 2);
        assert_eq!(result.report.failures[0].line_number, 5);
        assert!(result.report.failures[0].reason.contains("roll_no"));
        assert!(result.report.summary().contains("2 rows failed validation"));
    }

    #[test]
    fn test_rolls_sharing_a_file_name_rejected() {
        let engine = ReconciliationEngine::new();
        let existing = vec![candidate_to_record(&create_test_candidate("10 A", "A"), 1)];
        let mut slash = create_test_candidate("10/A", "B");
        slash.line_number = 3;

        let result = engine.reconcile(
            existing,
            &[slash, create_test_candidate("10_B", "C"), create_test_candidate("10 B", "D")],
            MergeMode::UpdateExisting,
        );

        assert_eq!(result.report.added, 1);
        assert_eq!(result.report.failures.len(), 2);
        assert_eq!(result.report.failures[0].line_number, 3);
        assert!(result.report.failures[0].reason.contains("10 A"));
        assert_eq!(result.report.failures[1].roll_no, "10 B");
        assert_eq!(result.records.len(), 2);
    }

    #[test]
    fn test_unparseable_import_date_stored_empty() {
        let engine = ReconciliationEngine::new();
        let mut candidate = create_test_candidate("105", "F");
        candidate.date_of_birth = Some("sometime".to_string());

        let result = engine.reconcile(Vec::new(), &[candidate], MergeMode::AddNewOnly);
        assert_eq!(result.records[0].date_of_birth, None);
    }
}

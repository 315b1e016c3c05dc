// 🗂️ Roster - every operator action, from load to save
//
// Each call loads the collection, applies one change, saves, and then
// handles the files that hang off the records (photos and cards).
// Nothing here is concurrent; one operator at a time.

use crate::archive::{render_batch, write_archive, BatchReport};
use crate::card::CardRenderer;
use crate::config::Config;
use crate::db::{
    roll_conflict, LoadOutcome, RecordFilter, RecordStore, SaveOutcome, StudentForm, StudentRecord,
};
use crate::error::{CardError, Result};
use crate::export::export_csv;
use crate::parser::read_candidates;
use crate::photos::import_photo;
use crate::reconciliation::{MergeMode, ReconciliationEngine, ReconciliationReport};
use crate::schema::SchemaValidator;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Literal the operator must type before everything is wiped
pub const DELETE_ALL_CONFIRMATION: &str = "DELETE";

/// A saved record and the card rendered for it
///
/// The record is stored even when the card fails; `card_error` then says why
/// and nothing exists at `card_path`.
#[derive(Debug, Clone)]
pub struct StudentSaved {
    pub record: StudentRecord,
    pub card_path: PathBuf,
    pub card_error: Option<String>,
}

/// Result of a batch render, with the archive when any card was produced
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub report: BatchReport,
    pub archive_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub report: ReconciliationReport,
    pub save: SaveOutcome,
}

pub struct Roster {
    config: Config,
    store: RecordStore,
    renderer: CardRenderer,
    engine: ReconciliationEngine,
    validator: SchemaValidator,
}

impl Roster {
    /// Open the roster described by `config`, creating its directories
    pub fn open(config: Config) -> Result<Self> {
        config.ensure_dirs()?;

        Ok(Roster {
            store: RecordStore::new(&config.data_file),
            renderer: CardRenderer::new(&config.pdf_dir, &config.assets_dir),
            engine: ReconciliationEngine::new(),
            validator: SchemaValidator::new(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn renderer(&self) -> &CardRenderer {
        &self.renderer
    }

    /// Full load, including any recovery advisory
    pub fn load(&self) -> LoadOutcome {
        self.store.load()
    }

    pub fn list(&self, filter: &RecordFilter) -> Vec<StudentRecord> {
        let records = self.store.load().records;
        filter.apply(&records).into_iter().cloned().collect()
    }

    // ========================================================================
    // SINGLE RECORD
    // ========================================================================

    /// Add a student, store their photo and render their card
    ///
    /// Nothing is written (not even the photo) when the form is rejected.
    pub fn add_student(&self, mut form: StudentForm, photo: Option<&Path>) -> Result<StudentSaved> {
        self.validator.validate_form(&form).map_err(CardError::Validation)?;

        let roll_no = form.roll_no.trim().to_string();
        if let Some(conflict) = roll_conflict(&self.store.load().records, &roll_no, None) {
            return Err(conflict);
        }

        if let Some(source) = photo {
            form.photo_path = Some(import_photo(&self.config.photo_dir, &roll_no, source)?);
        }

        let record = self.store.insert(form)?;
        Ok(self.render_saved(record))
    }

    /// Replace the editable fields of record `id` and re-render its card
    pub fn edit_student(&self, id: u64, mut form: StudentForm, photo: Option<&Path>) -> Result<StudentSaved> {
        self.validator.validate_form(&form).map_err(CardError::Validation)?;

        let records = self.store.load().records;
        if !records.iter().any(|r| r.id == id) {
            return Err(CardError::NotFound(id));
        }
        let roll_no = form.roll_no.trim().to_string();
        if let Some(conflict) = roll_conflict(&records, &roll_no, Some(id)) {
            return Err(conflict);
        }

        if let Some(source) = photo {
            form.photo_path = Some(import_photo(&self.config.photo_dir, &roll_no, source)?);
        }

        let (previous, record) = self.store.update(id, form)?;
        if previous.roll_no != record.roll_no {
            self.renderer.remove_card(&previous.roll_no)?;
        }
        Ok(self.render_saved(record))
    }

    fn render_saved(&self, record: StudentRecord) -> StudentSaved {
        match self.renderer.render(&record, record.photo_path.as_deref()) {
            Ok(card_path) => StudentSaved {
                record,
                card_path,
                card_error: None,
            },
            Err(err) => {
                warn!(roll_no = %record.roll_no, error = %err, "Student saved but card failed");
                StudentSaved {
                    card_path: self.renderer.card_path(&record.roll_no),
                    card_error: Some(err.to_string()),
                    record,
                }
            }
        }
    }

    /// Remove record `id` and its card; the photo file stays where it is
    pub fn delete_student(&self, id: u64) -> Result<StudentRecord> {
        let removed = self.store.delete(id)?;
        if self.renderer.remove_card(&removed.roll_no)? {
            info!(roll_no = %removed.roll_no, "Removed ID card");
        }
        Ok(removed)
    }

    /// Wipe every record, photo and card
    pub fn delete_all(&self, confirmation: &str) -> Result<SaveOutcome> {
        if confirmation != DELETE_ALL_CONFIRMATION {
            return Err(CardError::invalid(
                "confirmation",
                "Type DELETE to confirm",
                "delete_all",
            ));
        }

        self.clear_files()?;
        let outcome = self.store.clear()?;

        info!("Deleted all student records, photos and cards");
        Ok(outcome)
    }

    /// Render one record's card from what is stored
    pub fn render_card(&self, id: u64) -> Result<PathBuf> {
        let record = self.store.find_by_id(id).ok_or(CardError::NotFound(id))?;
        self.renderer.render(&record, record.photo_path.as_deref())
    }

    // ========================================================================
    // BULK
    // ========================================================================

    /// Render cards for every record matching `filter` and zip them into `archive_path`
    pub fn render_filtered<F>(&self, filter: &RecordFilter, archive_path: &Path, progress: F) -> Result<BatchOutcome>
    where
        F: FnMut(usize, usize),
    {
        let records = self.store.load().records;
        let selected = filter.apply(&records);
        let report = render_batch(&self.renderer, &selected, progress);

        let archive_path = if report.rendered.is_empty() {
            None
        } else {
            Some(write_archive(&report.rendered, archive_path)?)
        };

        Ok(BatchOutcome { report, archive_path })
    }

    /// Merge a CSV of students into the roster
    ///
    /// A table missing required columns changes nothing. Replace-all also
    /// clears the photo and card directories.
    pub fn import(&self, csv_path: &Path, mode: MergeMode) -> Result<ImportOutcome> {
        let candidates = read_candidates(csv_path)?;
        let existing = self.store.load().records;

        if mode == MergeMode::ReplaceAll {
            self.clear_files()?;
        }

        let merged = self.engine.reconcile(existing, &candidates, mode);
        let save = self.store.save(&merged.records)?;

        Ok(ImportOutcome {
            report: merged.report,
            save,
        })
    }

    pub fn export(&self, csv_path: &Path) -> Result<usize> {
        let records = self.store.load().records;
        export_csv(&records, csv_path)
    }

    /// Empty the photo and card directories, leaving them in place
    fn clear_files(&self) -> Result<()> {
        for dir in [&self.config.photo_dir, &self.config.pdf_dir] {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(|e| CardError::io(dir, e))?;
            }
            fs::create_dir_all(dir).map_err(|e| CardError::io(dir, e))?;
        }
        warn!(
            photos = %self.config.photo_dir.display(),
            cards = %self.config.pdf_dir.display(),
            "Cleared photo and card directories"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::NaiveDate;
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::TempDir;

    fn create_test_roster() -> (TempDir, Roster) {
        let temp = TempDir::new().unwrap();
        let roster = Roster::open(Config::rooted_at(temp.path())).unwrap();
        (temp, roster)
    }

    fn create_test_form(roll_no: &str, name: &str) -> StudentForm {
        StudentForm {
            name: name.to_string(),
            father_name: "Tariq Mehmood".to_string(),
            roll_no: roll_no.to_string(),
            class_level: "5".to_string(),
            gr_number: format!("GR-{}", roll_no),
            phone: "0300-1234567".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2014, 6, 2).unwrap(),
            date_of_issue: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            date_of_expiry: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            photo_path: None,
        }
    }

    fn create_test_photo(dir: &Path) -> PathBuf {
        let path = dir.join("upload.png");
        DynamicImage::ImageRgb8(RgbImage::from_pixel(60, 80, Rgb([200, 150, 100])))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_add_student_renders_card() {
        let (temp, roster) = create_test_roster();
        let upload = create_test_photo(temp.path());

        let saved = roster
            .add_student(create_test_form("101", "Ali Khan"), Some(upload.as_path()))
            .unwrap();

        assert_eq!(saved.record.id, 1);
        assert!(saved.card_error.is_none());
        assert!(saved.card_path.ends_with("101_card.pdf"));
        assert!(saved.card_path.exists());
        assert_eq!(
            saved.record.photo_path.as_deref(),
            Some(roster.config().photo_dir.join("101.png").as_path())
        );

        println!("✅ Add student test passed");
    }

    #[test]
    fn test_add_keeps_student_when_card_fails() {
        let (_temp, roster) = create_test_roster();
        // Too much text for a QR code
        let form = create_test_form("101", &"a".repeat(5000));

        let saved = roster.add_student(form, None).unwrap();

        assert!(saved.card_error.is_some());
        assert!(!saved.card_path.exists());
        assert_eq!(roster.store().find_by_roll("101").unwrap().id, saved.record.id);
    }

    #[test]
    fn test_add_duplicate_roll_writes_nothing() {
        let (temp, roster) = create_test_roster();
        roster.add_student(create_test_form("101", "Ali Khan"), None).unwrap();
        let upload = create_test_photo(temp.path());

        let err = roster
            .add_student(create_test_form("101", "Someone Else"), Some(upload.as_path()))
            .unwrap_err();

        assert!(matches!(err, CardError::DuplicateRoll(ref roll) if roll == "101"));
        assert!(!roster.config().photo_dir.join("101.png").exists());
        assert_eq!(roster.list(&RecordFilter::default()).len(), 1);
    }

    #[test]
    fn test_edit_moves_card_on_roll_change() {
        let (_temp, roster) = create_test_roster();
        let saved = roster.add_student(create_test_form("101", "Ali Khan"), None).unwrap();
        let old_card = saved.card_path.clone();

        let edited = roster
            .edit_student(saved.record.id, create_test_form("102", "Ali Khan"), None)
            .unwrap();

        assert!(!old_card.exists());
        assert!(edited.card_path.ends_with("102_card.pdf"));
        assert!(edited.card_path.exists());
        assert_eq!(edited.record.id, saved.record.id);
        assert_eq!(edited.record.created_at, saved.record.created_at);
        assert!(edited.record.updated_at.is_some());
    }

    #[test]
    fn test_edit_rejects_taken_roll() {
        let (_temp, roster) = create_test_roster();
        roster.add_student(create_test_form("101", "Ali"), None).unwrap();
        let second = roster.add_student(create_test_form("102", "Bilal"), None).unwrap();

        let err = roster
            .edit_student(second.record.id, create_test_form("101", "Bilal"), None)
            .unwrap_err();
        assert!(matches!(err, CardError::DuplicateRoll(_)));

        let err = roster.edit_student(99, create_test_form("103", "Nobody"), None).unwrap_err();
        assert!(matches!(err, CardError::NotFound(99)));
    }

    #[test]
    fn test_delete_only_record_keeps_photo() {
        let (temp, roster) = create_test_roster();
        let upload = create_test_photo(temp.path());
        let saved = roster
            .add_student(create_test_form("101", "Ali Khan"), Some(upload.as_path()))
            .unwrap();
        let photo = saved.record.photo_path.clone().unwrap();

        let removed = roster.delete_student(saved.record.id).unwrap();

        assert_eq!(removed.roll_no, "101");
        assert!(roster.list(&RecordFilter::default()).is_empty());
        assert!(!saved.card_path.exists());
        assert!(photo.exists());

        println!("✅ Delete keeps photo test passed");
    }

    #[test]
    fn test_delete_all_requires_confirmation() {
        let (temp, roster) = create_test_roster();
        let upload = create_test_photo(temp.path());
        roster
            .add_student(create_test_form("101", "Ali Khan"), Some(upload.as_path()))
            .unwrap();

        let err = roster.delete_all("delete").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(roster.list(&RecordFilter::default()).len(), 1);

        let outcome = roster.delete_all(DELETE_ALL_CONFIRMATION).unwrap();
        assert_eq!(outcome.record_count, 0);
        assert!(roster.list(&RecordFilter::default()).is_empty());
        assert!(roster.config().photo_dir.is_dir());
        assert_eq!(fs::read_dir(&roster.config().photo_dir).unwrap().count(), 0);
        assert_eq!(fs::read_dir(&roster.config().pdf_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_render_filtered_archives_subset() {
        let (temp, roster) = create_test_roster();
        roster.add_student(create_test_form("101", "Ali Khan"), None).unwrap();
        roster.add_student(create_test_form("102", "Bilal Ahmed"), None).unwrap();

        let filter = RecordFilter {
            name: Some("bilal".to_string()),
            ..Default::default()
        };
        let archive = temp.path().join("cards.zip");
        let outcome = roster.render_filtered(&filter, &archive, |_, _| {}).unwrap();

        assert_eq!(outcome.report.requested, 1);
        assert_eq!(outcome.report.rendered.len(), 1);
        assert_eq!(outcome.archive_path.as_deref(), Some(archive.as_path()));
        assert!(archive.exists());

        let nobody = RecordFilter {
            roll_no: Some("999".to_string()),
            ..Default::default()
        };
        let empty = roster
            .render_filtered(&nobody, &temp.path().join("none.zip"), |_, _| {})
            .unwrap();
        assert!(empty.archive_path.is_none());
    }

    #[test]
    fn test_import_and_export() {
        let (temp, roster) = create_test_roster();
        roster.add_student(create_test_form("101", "Ali Khan"), None).unwrap();

        let csv_path = temp.path().join("students.csv");
        fs::write(
            &csv_path,
            "name,father_name,roll_no,class,gr_number,phone,date_of_birth,date_of_issue,date_of_expiry,photo_path\n\
             Ali Changed,Tariq,101,5,GR-101,0300-1234567,02/06/2014,01/04/2024,31/03/2025,\n\
             Sana Malik,Malik,102,6,GR-102,0301-7654321,15/09/2013,01/04/2024,31/03/2025,\n",
        )
        .unwrap();

        let outcome = roster.import(&csv_path, MergeMode::AddNewOnly).unwrap();
        assert_eq!(outcome.report.added, 1);
        assert_eq!(outcome.report.skipped, 1);
        assert_eq!(outcome.save.record_count, 2);

        let outcome = roster.import(&csv_path, MergeMode::UpdateExisting).unwrap();
        assert_eq!(outcome.report.updated, 2);
        let ali = roster.store().find_by_roll("101").unwrap();
        assert_eq!(ali.name, "Ali Changed");

        let exported = roster.export(&temp.path().join("out.csv")).unwrap();
        assert_eq!(exported, 2);
    }

    #[test]
    fn test_replace_all_import_clears_files() {
        let (temp, roster) = create_test_roster();
        let saved = roster.add_student(create_test_form("101", "Ali Khan"), None).unwrap();

        let csv_path = temp.path().join("students.csv");
        fs::write(
            &csv_path,
            "name,father_name,roll_no,class,gr_number,phone,date_of_birth,date_of_issue,date_of_expiry,photo_path\n\
             Sana Malik,Malik,201,6,GR-201,0301-7654321,15/09/2013,01/04/2024,31/03/2025,\n",
        )
        .unwrap();

        let outcome = roster.import(&csv_path, MergeMode::ReplaceAll).unwrap();
        assert_eq!(outcome.report.added, 1);
        assert!(!saved.card_path.exists());

        let records = roster.list(&RecordFilter::default());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].roll_no, "201");
    }

    #[test]
    fn test_import_missing_columns_changes_nothing() {
        let (temp, roster) = create_test_roster();
        let saved = roster.add_student(create_test_form("101", "Ali Khan"), None).unwrap();

        let csv_path = temp.path().join("bad.csv");
        fs::write(&csv_path, "name,roll_no\nSana,201\n").unwrap();

        let err = roster.import(&csv_path, MergeMode::ReplaceAll).unwrap_err();
        assert!(matches!(err, CardError::MissingColumns(_)));
        assert!(saved.card_path.exists());
        assert_eq!(roster.list(&RecordFilter::default()).len(), 1);
    }
}

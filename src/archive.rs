// 📦 Batch rendering and card archive
// Renders cards one by one, keeps going past failures, then zips whatever
// was produced. There is no cancellation once a batch has started.

use crate::card::CardRenderer;
use crate::db::{write_atomic, StudentRecord};
use crate::error::{CardError, Result};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const ARCHIVE_NAME: &str = "Generated_ID_Cards.zip";

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub roll_no: String,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub requested: usize,
    pub rendered: Vec<PathBuf>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn summary(&self) -> String {
        format!(
            "Generated {} out of {} ID cards successfully!",
            self.rendered.len(),
            self.requested
        )
    }
}

/// Render a card for every record, reporting `(done, total)` after each one
pub fn render_batch<F>(renderer: &CardRenderer, records: &[&StudentRecord], mut progress: F) -> BatchReport
where
    F: FnMut(usize, usize),
{
    let mut report = BatchReport {
        requested: records.len(),
        ..Default::default()
    };

    for (index, record) in records.iter().enumerate() {
        match renderer.render(record, record.photo_path.as_deref()) {
            Ok(path) => report.rendered.push(path),
            Err(err) => {
                warn!(roll_no = %record.roll_no, error = %err, "Failed to generate card");
                report.failures.push(BatchFailure {
                    roll_no: record.roll_no.clone(),
                    name: record.name.clone(),
                    reason: err.to_string(),
                });
            }
        }
        progress(index + 1, records.len());
    }

    info!(
        rendered = report.rendered.len(),
        failed = report.failures.len(),
        "Batch render finished"
    );
    report
}

/// Zip the given card files into an in-memory archive, named by file name
pub fn archive_bytes(card_paths: &[PathBuf]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in card_paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CardError::Render(format!("Bad card path: {}", path.display())))?;
        let bytes = fs::read(path).map_err(|e| CardError::io(path, e))?;

        zip.start_file(name, options)?;
        zip.write_all(&bytes).map_err(|e| CardError::io(path, e))?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Write the archive for `card_paths` to `archive_path`
pub fn write_archive(card_paths: &[PathBuf], archive_path: &Path) -> Result<PathBuf> {
    let bytes = archive_bytes(card_paths)?;
    write_atomic(archive_path, &bytes)?;

    info!(cards = card_paths.len(), path = %archive_path.display(), "Wrote card archive");
    Ok(archive_path.to_path_buf())
}

use crate::error::{CardError, Result};
use dotenvy::dotenv;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Where records, photos, cards and card artwork live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_file: PathBuf,
    pub photo_dir: PathBuf,
    pub pdf_dir: PathBuf,
    pub assets_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config::rooted_at(Path::new(""))
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = Config::default();
        Config {
            data_file: path_var("CARDS_DATA_FILE").unwrap_or(defaults.data_file),
            photo_dir: path_var("CARDS_PHOTO_DIR").unwrap_or(defaults.photo_dir),
            pdf_dir: path_var("CARDS_PDF_DIR").unwrap_or(defaults.pdf_dir),
            assets_dir: path_var("CARDS_ASSETS_DIR").unwrap_or(defaults.assets_dir),
        }
    }

    /// Default layout under `root`
    pub fn rooted_at(root: &Path) -> Self {
        Config {
            data_file: root.join("student_data.json"),
            photo_dir: root.join("photos"),
            pdf_dir: root.join("pdfs"),
            assets_dir: root.join("assets"),
        }
    }

    /// Create the photo, card and artwork directories
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.photo_dir, &self.pdf_dir, &self.assets_dir] {
            fs::create_dir_all(dir).map_err(|e| CardError::io(dir, e))?;
        }
        Ok(())
    }
}

fn path_var(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

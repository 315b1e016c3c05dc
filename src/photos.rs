// 📸 Photo intake
// Uploaded photos are cropped to a centred square and stored as
// `<roll>.png` in the photo directory. Records only reference the file.

use crate::db::sanitize_roll;
use crate::error::{CardError, Result};
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Largest centred square inside `image`
pub fn crop_square(image: &DynamicImage) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;
    image.crop_imm(x, y, side, side)
}

/// Where the photo for `roll_no` lives
pub fn photo_path_for(photo_dir: &Path, roll_no: &str) -> PathBuf {
    photo_dir.join(format!("{}.png", sanitize_roll(roll_no)))
}

/// Crop and store a photo for `roll_no`, replacing any previous one
pub fn store_photo(photo_dir: &Path, roll_no: &str, image: &DynamicImage) -> Result<PathBuf> {
    fs::create_dir_all(photo_dir).map_err(|e| CardError::io(photo_dir, e))?;

    let path = photo_path_for(photo_dir, roll_no);
    crop_square(image).save(&path)?;

    info!(path = %path.display(), "Stored student photo");
    Ok(path)
}

/// Load an image file from disk and store it as the photo for `roll_no`
pub fn import_photo(photo_dir: &Path, roll_no: &str, source: &Path) -> Result<PathBuf> {
    let image = image::open(source)?;
    store_photo(photo_dir, roll_no, &image)
}

/// Open a stored photo; missing or unreadable files count as "no photo"
pub fn open_photo(path: Option<&Path>) -> Option<DynamicImage> {
    let path = path?;
    if !path.exists() {
        return None;
    }
    match image::open(path) {
        Ok(image) => Some(image),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Photo unreadable, rendering without it");
            None
        }
    }
}

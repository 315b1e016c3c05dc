// 🪪 Card Renderer - two-page identity card
//
// Front: artwork, photo in a circle, name / father name / level, roll, GR, DOB
// Back:  artwork, QR payload, issue / expiry dates, phone
//
// Coordinates are PDF points with the origin at the bottom-left corner.

use crate::db::{card_file_name, write_atomic, StudentRecord};
use crate::error::{CardError, Result};
use crate::numerals::format_class_label;
use crate::photos::{crop_square, open_photo};
use crate::schema::SchemaValidator;
use crate::temporal::format_card_date;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use printpdf::{
    BuiltinFont, Color, Image as PdfImage, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfLayerReference, Pt,
};
use qrcode::{EcLevel, QrCode};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// LAYOUT
// ============================================================================

pub const CARD_WIDTH: f32 = 189.0;
pub const CARD_HEIGHT: f32 = 321.0;

pub const FRONT_ARTWORK: &str = "1.jpeg";
pub const BACK_ARTWORK: &str = "2.jpeg";

const NAVY: (u8, u8, u8) = (0x23, 0x1f, 0x55);
const WHITE: (u8, u8, u8) = (0xff, 0xff, 0xff);

const PHOTO_X: f32 = CARD_WIDTH - 149.0;
const PHOTO_Y: f32 = CARD_HEIGHT - 161.5;
const PHOTO_SIZE: f32 = 103.0;
/// Raster resolution of the photo circle (4 px per point)
const PHOTO_PIXELS: u32 = 412;

const QR_X: f32 = 50.0;
const QR_Y: f32 = 125.0;
const QR_SIZE: f32 = 80.0;
const QR_MODULE_PIXELS: u32 = 8;
const QR_QUIET_ZONE: usize = 4;

/// Helvetica-Bold advance widths for printable ASCII, in 1/1000 em
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    333, 333, 584, 584, 584, 611, 975, // ':'..'@'
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    333, 278, 333, 584, 556, 333, // '['..'`'
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, // 'a'..'m'
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, // 'n'..'z'
    389, 280, 389, 584, // '{'..'~'
];
const DEFAULT_GLYPH_WIDTH: u16 = 556;

/// Rendered width of `text` in Helvetica-Bold at `size` points
pub fn bold_text_width(text: &str, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| {
            let code = c as u32;
            if (32..127).contains(&code) {
                HELVETICA_BOLD_WIDTHS[(code - 32) as usize] as u32
            } else {
                DEFAULT_GLYPH_WIDTH as u32
            }
        })
        .sum();
    units as f32 * size / 1000.0
}

/// Canonical multi-line text encoded into the back-side QR code
pub fn qr_payload(record: &StudentRecord) -> String {
    format!(
        "Name: {}\nFather Name: {}\nRoll No: {}\nGR NO: {}\nDOB: {}\nIssue: {}\nExpiry: {}\nPhone: {}",
        record.name,
        record.father_name,
        record.roll_no,
        record.gr_number,
        format_card_date(record.birth_date()),
        format_card_date(record.issue_date()),
        format_card_date(record.expiry_date()),
        record.phone,
    )
}

// ============================================================================
// CARD RENDERER
// ============================================================================

#[derive(Debug, Clone)]
pub struct CardRenderer {
    output_dir: PathBuf,
    front_artwork: PathBuf,
    back_artwork: PathBuf,
    validator: SchemaValidator,
}

impl CardRenderer {
    pub fn new(output_dir: impl Into<PathBuf>, assets_dir: &Path) -> Self {
        CardRenderer {
            output_dir: output_dir.into(),
            front_artwork: assets_dir.join(FRONT_ARTWORK),
            back_artwork: assets_dir.join(BACK_ARTWORK),
            validator: SchemaValidator::new(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn card_path(&self, roll_no: &str) -> PathBuf {
        self.output_dir.join(card_file_name(roll_no))
    }

    /// Render the card for `record` into the output directory
    ///
    /// Validation runs first; a rejected record leaves no file behind.
    /// Re-rendering the same roll number overwrites the previous card.
    pub fn render(&self, record: &StudentRecord, photo: Option<&Path>) -> Result<PathBuf> {
        let bytes = self.render_to_bytes(record, photo)?;

        let path = self.card_path(&record.roll_no);
        write_atomic(&path, &bytes)?;

        info!(roll_no = %record.roll_no, path = %path.display(), "Rendered ID card");
        Ok(path)
    }

    /// Render the card as PDF bytes without touching the output directory
    pub fn render_to_bytes(&self, record: &StudentRecord, photo: Option<&Path>) -> Result<Vec<u8>> {
        self.validator
            .validate_card(record)
            .map_err(CardError::Validation)?;

        let width = Mm::from(Pt(CARD_WIDTH));
        let height = Mm::from(Pt(CARD_HEIGHT));
        let (doc, front_page, front_layer) = PdfDocument::new(
            format!("ID Card {}", record.roll_no),
            width,
            height,
            "Front",
        );
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;

        let front = doc.get_page(front_page).get_layer(front_layer);
        self.draw_front(&front, record, photo, &regular, &bold);

        let (back_page, back_layer) = doc.add_page(width, height, "Back");
        let back = doc.get_page(back_page).get_layer(back_layer);
        self.draw_back(&back, record, &bold)?;

        Ok(doc.save_to_bytes()?)
    }

    /// Delete the rendered card for `roll_no`; returns whether one existed
    pub fn remove_card(&self, roll_no: &str) -> Result<bool> {
        let path = self.card_path(roll_no);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| CardError::io(&path, e))?;
        Ok(true)
    }

    fn draw_front(
        &self,
        layer: &PdfLayerReference,
        record: &StudentRecord,
        photo: Option<&Path>,
        regular: &IndirectFontRef,
        bold: &IndirectFontRef,
    ) {
        let artwork = load_artwork(&self.front_artwork);
        if let Some(artwork) = &artwork {
            place_image(layer, artwork, 0.0, 0.0, CARD_WIDTH, CARD_HEIGHT);
        }

        if let Some(face) = open_photo(photo) {
            let circle = circular_photo(&face, artwork.as_ref());
            place_image(
                layer,
                &DynamicImage::ImageRgb8(circle),
                PHOTO_X,
                PHOTO_Y,
                PHOTO_SIZE,
                PHOTO_SIZE,
            );
        }

        set_fill(layer, NAVY);
        draw_centered(layer, &record.name.to_uppercase(), 94.5, 140.0, 9.0, bold);
        draw_centered(layer, &record.father_name.to_uppercase(), 94.5, 113.0, 9.0, bold);

        set_fill(layer, WHITE);
        let level = format!("Level-{}", format_class_label(&record.class_level));
        draw_centered(layer, &level, 90.5, 95.0, 9.0, bold);

        set_fill(layer, NAVY);
        draw_text(layer, &record.roll_no, 65.0, 67.0, 9.0, regular);
        draw_text(layer, &record.gr_number, 65.0, 52.0, 9.0, regular);
        draw_text(layer, &format_card_date(record.birth_date()), 65.0, 37.0, 9.0, regular);
    }

    fn draw_back(
        &self,
        layer: &PdfLayerReference,
        record: &StudentRecord,
        bold: &IndirectFontRef,
    ) -> Result<()> {
        if let Some(artwork) = load_artwork(&self.back_artwork) {
            place_image(layer, &artwork, 0.0, 0.0, CARD_WIDTH, CARD_HEIGHT);
        }

        let qr = qr_image(&qr_payload(record))?;
        place_image(layer, &DynamicImage::ImageRgb8(qr), QR_X, QR_Y, QR_SIZE, QR_SIZE);

        set_fill(layer, NAVY);
        draw_text(layer, &format_card_date(record.issue_date()), 95.0, 104.0, 8.0, bold);
        draw_text(layer, &format_card_date(record.expiry_date()), 95.0, 93.0, 8.0, bold);

        set_fill(layer, WHITE);
        draw_text(layer, &record.phone, 85.5, 62.5, 8.5, bold);

        Ok(())
    }
}

// ============================================================================
// DRAWING HELPERS
// ============================================================================

fn set_fill(layer: &PdfLayerReference, (r, g, b): (u8, u8, u8)) {
    layer.set_fill_color(Color::Rgb(printpdf::Rgb::new(
        r as f32 / 255.0,
        g as f32 / 255.0,
        b as f32 / 255.0,
        None,
    )));
}

fn draw_text(layer: &PdfLayerReference, text: &str, x: f32, y: f32, size: f32, font: &IndirectFontRef) {
    if text.is_empty() {
        return;
    }
    layer.use_text(text, size, Mm::from(Pt(x)), Mm::from(Pt(y)), font);
}

fn draw_centered(
    layer: &PdfLayerReference,
    text: &str,
    center_x: f32,
    y: f32,
    size: f32,
    font: &IndirectFontRef,
) {
    let x = center_x - bold_text_width(text, size) / 2.0;
    draw_text(layer, text, x, y, size, font);
}

/// Stretch `image` to fill the box at (x, y) with the given size in points
fn place_image(layer: &PdfLayerReference, image: &DynamicImage, x: f32, y: f32, width: f32, height: f32) {
    // At 72 dpi one pixel is one point, so the scale is the target size over the pixel size
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let transform = ImageTransform {
        translate_x: Some(Mm::from(Pt(x))),
        translate_y: Some(Mm::from(Pt(y))),
        scale_x: Some(width / rgb.width() as f32),
        scale_y: Some(height / rgb.height() as f32),
        dpi: Some(72.0),
        ..Default::default()
    };
    PdfImage::from_dynamic_image(&rgb).add_to_layer(layer.clone(), transform);
}

/// Artwork is optional; a missing or broken file just leaves the page plain
fn load_artwork(path: &Path) -> Option<DynamicImage> {
    if !path.exists() {
        return None;
    }
    match image::open(path) {
        Ok(image) => Some(image),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Card artwork unreadable, skipping");
            None
        }
    }
}

/// Photo inside a circle, the corners filled with the artwork it sits on
fn circular_photo(photo: &DynamicImage, artwork: Option<&DynamicImage>) -> RgbImage {
    let side = PHOTO_PIXELS;
    let face = crop_square(photo)
        .resize_exact(side, side, FilterType::Lanczos3)
        .to_rgb8();

    let backdrop = match artwork {
        Some(artwork) => artwork_region(artwork, PHOTO_X, PHOTO_Y, PHOTO_SIZE, PHOTO_SIZE)
            .resize_exact(side, side, FilterType::Triangle)
            .to_rgb8(),
        None => RgbImage::from_pixel(side, side, Rgb([255, 255, 255])),
    };

    let radius = side as f32 / 2.0;
    RgbImage::from_fn(side, side, |x, y| {
        let dx = x as f32 + 0.5 - radius;
        let dy = y as f32 + 0.5 - radius;
        if dx * dx + dy * dy <= radius * radius {
            *face.get_pixel(x, y)
        } else {
            *backdrop.get_pixel(x, y)
        }
    })
}

/// The part of the page-filling artwork under a box given in page points
fn artwork_region(artwork: &DynamicImage, x: f32, y: f32, width: f32, height: f32) -> DynamicImage {
    let px_per_pt_x = artwork.width() as f32 / CARD_WIDTH;
    let px_per_pt_y = artwork.height() as f32 / CARD_HEIGHT;

    // Image rows run top-down, page points bottom-up
    let left = (x * px_per_pt_x).round() as u32;
    let top = ((CARD_HEIGHT - y - height) * px_per_pt_y).round() as u32;
    let left = left.min(artwork.width().saturating_sub(1));
    let top = top.min(artwork.height().saturating_sub(1));
    let region_width = ((width * px_per_pt_x).round() as u32).clamp(1, artwork.width() - left);
    let region_height = ((height * px_per_pt_y).round() as u32).clamp(1, artwork.height() - top);

    artwork.crop_imm(left, top, region_width, region_height)
}

/// QR bitmap with a white quiet zone
fn qr_image(payload: &str) -> Result<RgbImage> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)
        .map_err(|e| CardError::Render(format!("QR encoding failed: {}", e)))?;

    let modules = code.width();
    let colors = code.to_colors();
    let side = ((modules + 2 * QR_QUIET_ZONE) as u32) * QR_MODULE_PIXELS;
    let dark = Rgb([0, 0, 0]);
    let light = Rgb([255, 255, 255]);

    Ok(RgbImage::from_fn(side, side, |x, y| {
        let column = (x / QR_MODULE_PIXELS) as usize;
        let row = (y / QR_MODULE_PIXELS) as usize;
        let inside = (QR_QUIET_ZONE..QR_QUIET_ZONE + modules).contains(&column)
            && (QR_QUIET_ZONE..QR_QUIET_ZONE + modules).contains(&row);

        if inside
            && colors[(row - QR_QUIET_ZONE) * modules + (column - QR_QUIET_ZONE)]
                == qrcode::Color::Dark
        {
            dark
        } else {
            light
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn create_test_record() -> StudentRecord {
        StudentRecord {
            id: 1,
            name: "Ali Raza".to_string(),
            father_name: "Raza Khan".to_string(),
            roll_no: "101".to_string(),
            class_level: "8".to_string(),
            phone: "0300-1234567".to_string(),
            gr_number: "GR-55".to_string(),
            date_of_birth: Some("2012-05-14".to_string()),
            date_of_issue: Some("2024-04-01".to_string()),
            date_of_expiry: Some("2025-03-31".to_string()),
            photo_path: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn create_test_renderer(temp: &TempDir) -> CardRenderer {
        CardRenderer::new(temp.path().join("pdfs"), &temp.path().join("assets"))
    }

    #[test]
    fn test_render_writes_two_page_pdf() {
        let temp = TempDir::new().unwrap();
        let renderer = create_test_renderer(&temp);

        let path = renderer.render(&create_test_record(), None).unwrap();

        assert_eq!(path, temp.path().join("pdfs").join("101_card.pdf"));
        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));

        println!("✅ Card rendered: {} bytes", bytes.len());
    }

    #[test]
    fn test_render_with_artwork_and_photo() {
        let temp = TempDir::new().unwrap();
        let assets = temp.path().join("assets");
        fs::create_dir_all(&assets).unwrap();
        RgbImage::from_pixel(189, 321, Rgb([200, 220, 240]))
            .save(assets.join(FRONT_ARTWORK))
            .unwrap();
        RgbImage::from_pixel(189, 321, Rgb([240, 220, 200]))
            .save(assets.join(BACK_ARTWORK))
            .unwrap();
        let photo = temp.path().join("face.png");
        RgbImage::from_pixel(60, 80, Rgb([90, 60, 30])).save(&photo).unwrap();

        let renderer = create_test_renderer(&temp);
        let path = renderer
            .render(&create_test_record(), Some(photo.as_path()))
            .unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_missing_photo_file_renders_without_it() {
        let temp = TempDir::new().unwrap();
        let renderer = create_test_renderer(&temp);
        let ghost = temp.path().join("photos").join("ghost.png");

        assert!(renderer.render(&create_test_record(), Some(ghost.as_path())).is_ok());
    }

    #[test]
    fn test_invalid_record_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let renderer = create_test_renderer(&temp);

        let mut record = create_test_record();
        record.gr_number = String::new();
        let err = renderer.render(&record, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("gr_number"));

        let mut record = create_test_record();
        record.phone = "0300 123".to_string();
        assert!(renderer.render(&record, None).is_err());

        assert!(!renderer.card_path("101").exists());
    }

    #[test]
    fn test_rerender_overwrites() {
        let temp = TempDir::new().unwrap();
        let renderer = create_test_renderer(&temp);
        let mut record = create_test_record();
        record.roll_no = "A 7".to_string();

        let first = renderer.render(&record, None).unwrap();
        let second = renderer.render(&record, None).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.file_name().unwrap(), "A_7_card.pdf");
        assert_eq!(fs::read_dir(renderer.output_dir()).unwrap().count(), 1);
    }

    #[test]
    fn test_unparseable_birth_date_is_blank() {
        let temp = TempDir::new().unwrap();
        let renderer = create_test_renderer(&temp);
        let mut record = create_test_record();
        record.date_of_birth = Some("someday".to_string());

        let payload = qr_payload(&record);
        assert!(payload.contains("\nDOB: \n"));
        assert!(renderer.render(&record, None).is_ok());
    }

    #[test]
    fn test_qr_payload() {
        let payload = qr_payload(&create_test_record());
        assert_eq!(
            payload,
            "Name: Ali Raza\n\
             Father Name: Raza Khan\n\
             Roll No: 101\n\
             GR NO: GR-55\n\
             DOB: 14 May, 2012\n\
             Issue: 01 April, 2024\n\
             Expiry: 31 March, 2025\n\
             Phone: 0300-1234567"
        );
    }

    #[test]
    fn test_qr_image_is_square_with_quiet_zone() {
        let image = qr_image("Name: Test").unwrap();
        assert_eq!(image.width(), image.height());
        assert_eq!(image.width() % QR_MODULE_PIXELS, 0);
        assert_eq!(*image.get_pixel(0, 0), Rgb([255, 255, 255]));
        // Finder pattern corner just inside the quiet zone is dark
        let edge = QR_QUIET_ZONE as u32 * QR_MODULE_PIXELS;
        assert_eq!(*image.get_pixel(edge, edge), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_circular_photo_keeps_artwork_in_corners() {
        let face = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, Rgb([255, 0, 0])));
        let artwork = DynamicImage::ImageRgb8(RgbImage::from_pixel(189, 321, Rgb([0, 0, 255])));

        let circle = circular_photo(&face, Some(&artwork));
        let mid = PHOTO_PIXELS / 2;
        assert_eq!(*circle.get_pixel(mid, mid), Rgb([255, 0, 0]));
        assert_eq!(*circle.get_pixel(0, 0), Rgb([0, 0, 255]));

        let plain = circular_photo(&face, None);
        assert_eq!(*plain.get_pixel(0, PHOTO_PIXELS - 1), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_bold_text_width() {
        assert!((bold_text_width("I", 10.0) - 2.78).abs() < 1e-4);
        assert!((bold_text_width("AB", 9.0) - 12.996).abs() < 1e-3);
        assert!(bold_text_width("ALI RAZA", 9.0) < CARD_WIDTH);
    }

    #[test]
    fn test_remove_card() {
        let temp = TempDir::new().unwrap();
        let renderer = create_test_renderer(&temp);

        assert!(!renderer.remove_card("101").unwrap());
        renderer.render(&create_test_record(), None).unwrap();
        assert!(renderer.remove_card("101").unwrap());
        assert!(!renderer.card_path("101").exists());
    }
}

// 📐 Shape Layer - Field Validation
// Validates student fields before they are stored, imported or rendered.

use crate::db::{StudentForm, StudentRecord};
use crate::parser::CandidateRow;

const REQUIRED_MESSAGE: &str = "Required field is empty";

// ============================================================================
// CONTEXT TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// Manual entry or edit - requires valid dates in order
    Entry,
    /// Bulk import row
    Import,
    /// Card rendering
    Card,
}

impl Context {
    pub fn name(&self) -> &str {
        match self {
            Context::Entry => "Entry",
            Context::Import => "Import",
            Context::Card => "Card",
        }
    }
}

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub context: String,
}

impl ValidationError {
    pub fn new(field: &str, message: &str, context: &str) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.to_string(),
            context: context.to_string(),
        }
    }

    pub fn missing(field: &str, context: &str) -> Self {
        ValidationError::new(field, REQUIRED_MESSAGE, context)
    }

    pub fn is_missing(&self) -> bool {
        self.message == REQUIRED_MESSAGE
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.context, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// The six fields every record must carry, borrowed from whichever shape holds them
#[derive(Debug, Clone, Copy)]
pub struct RequiredFields<'a> {
    pub name: &'a str,
    pub father_name: &'a str,
    pub roll_no: &'a str,
    pub class_level: &'a str,
    pub gr_number: &'a str,
    pub phone: &'a str,
}

impl<'a> RequiredFields<'a> {
    fn entries(&self) -> [(&'static str, &'a str); 6] {
        [
            ("name", self.name),
            ("father_name", self.father_name),
            ("roll_no", self.roll_no),
            ("class", self.class_level),
            ("gr_number", self.gr_number),
            ("phone", self.phone),
        ]
    }
}

/// Digits and hyphens only, with at least one digit
pub fn is_valid_phone(phone: &str) -> bool {
    let phone = phone.trim();
    phone.chars().any(|c| c.is_ascii_digit()) && phone.chars().all(|c| c.is_ascii_digit() || c == '-')
}

// ============================================================================
// SCHEMA VALIDATOR
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        SchemaValidator
    }

    /// Required fields present, phone well-formed
    pub fn validate_fields(&self, fields: &RequiredFields<'_>, context: Context) -> ValidationResult {
        let mut errors = Vec::new();

        for (field, value) in fields.entries() {
            if value.trim().is_empty() {
                errors.push(ValidationError::missing(field, context.name()));
            }
        }

        if !fields.phone.trim().is_empty() && !is_valid_phone(fields.phone) {
            errors.push(ValidationError::new(
                "phone",
                "Invalid phone number format",
                context.name(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Entry rules: required fields plus expiry on or after issue
    pub fn validate_form(&self, form: &StudentForm) -> ValidationResult {
        let mut errors = self
            .validate_fields(&form.required_fields(), Context::Entry)
            .err()
            .unwrap_or_default();

        if form.date_of_expiry < form.date_of_issue {
            errors.push(ValidationError::new(
                "date_of_expiry",
                "Date of expiry must not be before date of issue",
                Context::Entry.name(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn validate_candidate(&self, row: &CandidateRow) -> ValidationResult {
        self.validate_fields(&row.required_fields(), Context::Import)
    }

    pub fn validate_card(&self, record: &StudentRecord) -> ValidationResult {
        self.validate_fields(&record.required_fields(), Context::Card)
    }
}

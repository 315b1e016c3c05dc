// 🏛️ Numeral Formatter
// Class labels are shown as Roman numerals on the card ("Level-VIII").
// Labels that are not whole numbers are shown as they are.

/// Largest value with a standard Roman numeral
pub const MAX_ROMAN: u64 = 3999;

const ROMAN_TABLE: [(u64, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

/// Roman numeral for a whole number, greedy largest-symbol-first
pub fn to_roman(mut value: u64) -> String {
    let mut roman = String::new();
    for (amount, symbol) in ROMAN_TABLE {
        while value >= amount {
            roman.push_str(symbol);
            value -= amount;
        }
    }
    roman
}

/// Format a class label for display
///
/// Digit-only labels from 1 to 3999 become Roman numerals. Zero, larger
/// numbers and anything non-numeric ("Nursery", "KG-2", "") come back unchanged.
pub fn format_class_label(label: &str) -> String {
    let trimmed = label.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return label.to_string();
    }

    match trimmed.parse::<u64>() {
        Ok(value @ 1..=MAX_ROMAN) => to_roman(value),
        _ => label.to_string(),
    }
}

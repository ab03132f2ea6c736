//! Conversion between the compact record date (`yyyyMMdd`) and the display
//! form (`dd/MM/yyyy`). Both directions are total: anything that is not a
//! valid date passes through.

use chrono::NaiveDate;

fn eight_digits(value: &str) -> bool {
    value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit())
}

fn parse_parts(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// `20231231` -> `31/12/2023`. Empty, short or invalid input is returned as is.
pub fn format_dicom_date(compact: &str) -> String {
    if !eight_digits(compact) {
        return compact.to_string();
    }
    match parse_parts(&compact[0..4], &compact[4..6], &compact[6..8]) {
        Some(date) => date.format("%d/%m/%Y").to_string(),
        None => compact.to_string(),
    }
}

/// `31/12/2023` (or `31-12-2023`, `31.12.2023`, `31122023`) -> `20231231`.
/// Blank input yields an empty string; otherwise the separator-stripped input
/// is returned when it is not a valid day-month-year date.
pub fn to_dicom_date(display: &str) -> String {
    if display.trim().is_empty() {
        return String::new();
    }

    let stripped: String = display
        .chars()
        .filter(|c| !matches!(c, '/' | '-' | '.'))
        .collect();

    if !eight_digits(&stripped) {
        return stripped;
    }
    match parse_parts(&stripped[4..8], &stripped[2..4], &stripped[0..2]) {
        Some(date) => date.format("%Y%m%d").to_string(),
        None => stripped,
    }
}

//! Date and filename normalization.
//!
//! Everything here is pure: localized dates become `YYYY-MM-DD`, free text
//! becomes something a filesystem accepts and sorts sensibly.

use crate::portal::models::{PurchaseRecord, UNKNOWN};

/// Maximum length of a generated filename, in characters.
pub const MAX_FILENAME_CHARS: usize = 150;

/// Maximum length of a product label before sanitizing, in characters.
pub const MAX_PRODUCT_CHARS: usize = 40;

/// Characters that are not allowed in filenames on at least one platform.
const UNSAFE_CHARS: [char; 10] = ['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>'];

/// Umlauts and ß survive product-name sanitizing next to ASCII alphanumerics.
const KEPT_DIACRITICS: &str = "äöüÄÖÜß";

/// Maps a German month name or abbreviation (with or without trailing dot) to `01`..`12`.
pub fn month_number(name: &str) -> Option<&'static str> {
    let month = match name.trim().trim_end_matches('.') {
        "Jan" | "Januar" => "01",
        "Feb" | "Februar" => "02",
        "März" | "Mär" | "Mrz" => "03",
        "Apr" | "April" => "04",
        "Mai" => "05",
        "Jun" | "Juni" => "06",
        "Jul" | "Juli" => "07",
        "Aug" | "August" => "08",
        "Sep" | "Sept" | "September" => "09",
        "Okt" | "Oktober" => "10",
        "Nov" | "November" => "11",
        "Dez" | "Dezember" => "12",
        _ => return None,
    };
    Some(month)
}

/// Converts `"5. Mai 2023"` into `"2023-05-05"`.
///
/// An unknown month becomes `00`. Input without at least three parts is
/// returned with every `.` and whitespace character replaced by `-`.
pub fn parse_german_date(date: &str) -> String {
    let parts: Vec<&str> = date.split_whitespace().collect();

    if parts.len() >= 3 {
        let day = parts[0].replacen('.', "", 1);
        let month = month_number(parts[1]).unwrap_or("00");
        return format!("{}-{}-{:0>2}", parts[2], month, day);
    }

    date.chars().map(|c| if c == '.' || c.is_whitespace() { '-' } else { c }).collect()
}

/// Makes `name` safe to use as a filename.
///
/// Path-unsafe characters become `-`, whitespace runs become `_`, the euro
/// sign becomes `EUR`, and the result is cut to [`MAX_FILENAME_CHARS`].
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_whitespace = false;

    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;

        if UNSAFE_CHARS.contains(&c) {
            out.push('-');
        } else if c == '€' {
            out.push_str("EUR");
        } else {
            out.push(c);
        }
    }

    out.chars().take(MAX_FILENAME_CHARS).collect()
}

/// Builds a product label from up to two product titles.
///
/// Titles are joined, cut to [`MAX_PRODUCT_CHARS`], stripped to
/// alphanumerics and umlauts, and spaces become `_`. Falls back to `unknown`.
pub fn product_label<S: AsRef<str>>(titles: &[S]) -> String {
    let joined = titles
        .iter()
        .take(2)
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let kept: String = joined
        .chars()
        .take(MAX_PRODUCT_CHARS)
        .filter(|c| c.is_ascii_alphanumeric() || KEPT_DIACRITICS.contains(*c) || c.is_whitespace())
        .collect();

    let label = kept.split_whitespace().collect::<Vec<_>>().join("_");
    if label.is_empty() {
        UNKNOWN.to_string()
    } else {
        label
    }
}

/// Filename of the exported receipt for `record`.
pub fn invoice_filename(record: &PurchaseRecord) -> String {
    sanitize_filename(&format!(
        "{}_Apple_{}EUR_{}_{}.pdf",
        record.date, record.amount, record.product_name, record.order_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_german_date() {
        assert_eq!(parse_german_date("5. Mai 2023"), "2023-05-05");
        assert_eq!(parse_german_date("17. Okt. 2024"), "2024-10-17");
        assert_eq!(parse_german_date("1. März 2025"), "2025-03-01");
        assert_eq!(parse_german_date("30. Sept. 2022"), "2022-09-30");
        assert_eq!(parse_german_date("3. Dez. 2021"), "2021-12-03");
    }

    #[test]
    fn test_parse_german_date_unknown_month() {
        assert_eq!(parse_german_date("5. May 2023"), "2023-00-05");
    }

    #[test]
    fn test_parse_german_date_fallback() {
        assert_eq!(parse_german_date("garbage"), "garbage");
        assert_eq!(parse_german_date("12.03 x"), "12-03-x");
        assert_eq!(parse_german_date(""), "");
    }

    #[test]
    fn test_month_number() {
        assert_eq!(month_number("Jan."), Some("01"));
        assert_eq!(month_number("Jan"), Some("01"));
        assert_eq!(month_number("Juni"), Some("06"));
        assert_eq!(month_number("Juli"), Some("07"));
        assert_eq!(month_number("Nov."), Some("11"));
        assert_eq!(month_number("Foo"), None);
    }

    #[test]
    fn test_sanitize_filename_replacements() {
        assert_eq!(sanitize_filename("a/b\\c?d%e*f:g|h\"i<j>k"), "a-b-c-d-e-f-g-h-i-j-k");
        assert_eq!(sanitize_filename("one  two\tthree"), "one_two_three");
        assert_eq!(sanitize_filename("9,99 €"), "9,99_EUR");
    }

    #[test]
    fn test_sanitize_filename_properties() {
        let long = "x".repeat(400);
        let euros = "€ ".repeat(200);
        let inputs: [&str; 5] = [
            "2024-05-01_Apple_0.99EUR_Some App: Pro / Max_MX12345678.pdf",
            "  leading and trailing  ",
            "€€€ <>|?* \"quoted\" \\ back",
            long.as_str(),
            euros.as_str(),
        ];

        for input in inputs {
            let out = sanitize_filename(input);
            assert!(!out.chars().any(|c| UNSAFE_CHARS.contains(&c)), "unsafe char in {out}");
            assert!(!out.contains('€'), "euro sign in {out}");
            assert!(!out.chars().any(char::is_whitespace), "whitespace in {out}");
            assert!(out.chars().count() <= MAX_FILENAME_CHARS);
        }
    }

    #[test]
    fn test_sanitize_filename_truncates_by_chars() {
        let out = sanitize_filename(&"ä".repeat(200));
        assert_eq!(out.chars().count(), 150);
    }

    #[test]
    fn test_product_label() {
        assert_eq!(product_label(&["Pages"]), "Pages");
        assert_eq!(product_label(&["iCloud+ 50 GB", "Monatlich"]), "iCloud_50_GB_Monatlich");
        assert_eq!(product_label(&["Größe ändern – Übung"]), "Größe_ändern_Übung");
    }

    #[test]
    fn test_product_label_uses_two_titles_at_most() {
        assert_eq!(product_label(&["A", "B", "C"]), "A_B");
    }

    #[test]
    fn test_product_label_truncates() {
        let label = product_label(&["Abcdefghij Klmnopqrst Uvwxyzabcd Efghijklmn Opqrst"]);
        assert_eq!(label, "Abcdefghij_Klmnopqrst_Uvwxyzabcd_Efghijk");
    }

    #[test]
    fn test_product_label_unknown() {
        let empty: [&str; 0] = [];
        assert_eq!(product_label(&empty), "unknown");
        assert_eq!(product_label(&["  ", "!!!"]), "unknown");
    }

    #[test]
    fn test_invoice_filename() {
        let record = PurchaseRecord {
            order_id: "MT2XJ4K9LQ".to_string(),
            date: "2024-11-05".to_string(),
            amount: "4.99".to_string(),
            product_name: "Procreate".to_string(),
            has_invoice: true,
        };
        assert_eq!(invoice_filename(&record), "2024-11-05_Apple_4.99EUR_Procreate_MT2XJ4K9LQ.pdf");
    }
}

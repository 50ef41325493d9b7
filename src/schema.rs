// 📐 Header Schema
// Sanitizes raw header rows and checks them against a parser's required set
// before any data row is touched.

use crate::error::{Result, UnificationError};
use crate::fields::RawRow;

// ============================================================================
// SANITIZATION
// ============================================================================

/// Canonical column name for a raw header cell
///
/// "Cust #" → "custnumber", "Zip 4" → "zip4", "" → "col3" (for idx 3).
pub fn sanitize_header(raw: &str, idx: usize) -> String {
    let cleaned: String = raw
        .replace('#', "Number")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();

    if cleaned.is_empty() {
        format!("col{}", idx)
    } else {
        cleaned
    }
}

pub fn sanitize_headers<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .enumerate()
        .map(|(idx, h)| sanitize_header(h.as_ref(), idx))
        .collect()
}

/// Zip sanitized headers with one row of values
///
/// Short rows leave trailing columns absent; on duplicate headers the first
/// column wins.
pub fn to_raw_row<I, S>(headers: &[String], values: I) -> RawRow
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut row = RawRow::new();
    for (header, value) in headers.iter().zip(values) {
        row.entry(header.clone())
            .or_insert_with(|| value.as_ref().to_string());
    }
    row
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Required headers absent from `headers`, in required order
pub fn missing_headers(required: &[&str], headers: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|r| !headers.iter().any(|h| h == *r))
        .map(|r| r.to_string())
        .collect()
}

/// Fail fast with the full list of missing headers
pub fn validate_required(parser: &str, required: &[&str], headers: &[String]) -> Result<()> {
    let missing = missing_headers(required, headers);

    if missing.is_empty() {
        Ok(())
    } else {
        Err(UnificationError::MissingHeaders {
            parser: parser.to_string(),
            missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_header() {
        assert_eq!(sanitize_header("Cust #", 0), "custnumber");
        assert_eq!(sanitize_header("Zip 4", 1), "zip4");
        assert_eq!(sanitize_header("Dlvry_Addrs", 2), "dlvryaddrs");
        assert_eq!(sanitize_header("\u{feff}FullName", 3), "fullname");
        assert_eq!(sanitize_header("  ", 4), "col4");
    }

    #[test]
    fn test_sanitize_headers_keeps_positions() {
        let headers = sanitize_headers(["Full Name", "", "City"]);
        assert_eq!(headers, vec!["fullname", "col1", "city"]);
    }

    #[test]
    fn test_to_raw_row() {
        let headers = sanitize_headers(["City", "State", "city"]);
        let row = to_raw_row(&headers, ["Mesa", "AZ", "Tempe"]);

        assert_eq!(row.get("city").map(String::as_str), Some("Mesa"));
        assert_eq!(row.get("state").map(String::as_str), Some("AZ"));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_to_raw_row_short_record() {
        let headers = sanitize_headers(["City", "State"]);
        let row = to_raw_row(&headers, ["Mesa"]);
        assert!(!row.contains_key("state"));
    }

    #[test]
    fn test_validate_required() {
        let headers = sanitize_headers(["Full Name", "City"]);

        assert!(validate_required("p", &["fullname"], &headers).is_ok());

        let err = validate_required("p", &["fullname", "state", "zip"], &headers).unwrap_err();
        assert!(matches!(
            err,
            UnificationError::MissingHeaders { ref missing, .. } if missing == &vec!["state".to_string(), "zip".to_string()]
        ));
    }
}

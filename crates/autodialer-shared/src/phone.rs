//! Phone number normalization.
//!
//! Numbers arrive as free text pasted into the dashboard, one per line.
//! Anything that is not an ASCII digit is stripped; lines that keep fewer
//! than the minimum number of digits are not dialable but are still kept
//! for audit.

/// Strip every non-digit character.
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Whether `raw` normalizes to at least `min_digits` digits.
pub fn is_valid(raw: &str, min_digits: usize) -> bool {
    normalize(raw).len() >= min_digits
}

/// Result of splitting raw input lines into dialable and rejected numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedNumbers {
    /// Normalized numbers, in input order.
    pub valid: Vec<String>,
    /// Trimmed raw lines that did not normalize to a dialable number.
    pub invalid: Vec<String>,
    /// Every non-blank input line, trimmed, in input order.
    pub original: Vec<String>,
}

/// Split `lines` into dialable and rejected numbers. Blank lines are ignored.
pub fn parse_numbers<I, S>(lines: I, min_digits: usize) -> ParsedNumbers
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed = ParsedNumbers::default();

    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        parsed.original.push(line.to_string());

        let number = normalize(line);
        if number.len() >= min_digits {
            parsed.valid.push(number);
        } else {
            parsed.invalid.push(line.to_string());
        }
    }

    parsed
}

/// Render an 11-digit number as `+CC (AA) NNNNN-NN`; anything else is
/// returned unchanged.
pub fn format_display(phone: &str) -> String {
    let cleaned = normalize(phone);
    if cleaned.len() == 11 {
        format!(
            "+{} ({}) {}-{}",
            &cleaned[0..2],
            &cleaned[2..4],
            &cleaned[4..9],
            &cleaned[9..]
        )
    } else {
        phone.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize("(11) 99999-9999"), "11999999999");
        assert_eq!(normalize("+55 11 9.8888 7777"), "5511988887777");
        assert_eq!(normalize("abc"), "");
    }

    #[test]
    fn test_is_valid_threshold() {
        assert!(is_valid("1234-5678", 8));
        assert!(!is_valid("123-4567", 8));
    }

    #[test]
    fn test_parse_numbers_keeps_originals() {
        let parsed = parse_numbers(["11999999999", " 1188888888 ", "", "abc"], 8);
        assert_eq!(parsed.valid, vec!["11999999999", "1188888888"]);
        assert_eq!(parsed.invalid, vec!["abc"]);
        assert_eq!(parsed.original, vec!["11999999999", "1188888888", "abc"]);
    }

    #[test]
    fn test_format_display() {
        assert_eq!(format_display("11999998888"), "+11 (99) 99988-88");
        assert_eq!(format_display("12345"), "12345");
    }
}

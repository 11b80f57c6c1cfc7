//! Registration-number extraction from decoded text.

use regex::Regex;
use std::sync::OnceLock;

/// Two digits, three letters, four digits (e.g. `23BCS0022`), as a whole word.
///
/// Digits are ASCII only: `[0-9]` rather than `\d`, which in this regex
/// engine also accepts other Unicode decimal digits.
const REGNO_PATTERN: &str = r"\b[0-9]{2}[A-Z]{3}[0-9]{4}\b";

/// Find the first registration number in `text`, case-insensitively.
///
/// The match is returned upper-cased, which is also how roster keys are stored.
pub fn extract_regno(text: &str) -> Option<String> {
    static REGNO_RE: OnceLock<Regex> = OnceLock::new();
    let re = REGNO_RE.get_or_init(|| Regex::new(REGNO_PATTERN).unwrap());
    let upper = text.to_uppercase();
    re.find(&upper).map(|m| m.as_str().to_string())
}

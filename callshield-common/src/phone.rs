//! Phone number normalization
//!
//! Folds user-entered phone numbers into E.164 before they are stored or
//! handed to the telephony provider. NANP (US/Canada) numbers are the
//! default for bare 10/11 digit input.

use crate::{Error, Result};

/// Normalize a user-entered phone number to E.164.
///
/// Accepted forms:
/// - already `+`-prefixed international numbers (8-15 digits)
/// - `00` international prefix (rewritten to `+`)
/// - bare 10-digit NANP numbers (prefixed with `+1`)
/// - 11-digit numbers starting with `1` (prefixed with `+`)
pub fn normalize_e164(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::BadRequest("phone number is required".into()));
    }

    let has_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if has_plus {
        if (8..=15).contains(&digits.len()) {
            return Ok(format!("+{digits}"));
        }
        return Err(Error::BadRequest("invalid international number".into()));
    }

    if let Some(rest) = digits.strip_prefix("00") {
        if (8..=15).contains(&rest.len()) {
            return Ok(format!("+{rest}"));
        }
        return Err(Error::BadRequest("invalid international number".into()));
    }

    match digits.len() {
        10 => Ok(format!("+1{digits}")),
        11 if digits.starts_with('1') => Ok(format!("+{digits}")),
        _ => Err(Error::BadRequest(
            "enter a 10-digit US number or full international format".into(),
        )),
    }
}

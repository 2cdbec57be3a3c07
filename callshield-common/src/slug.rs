//! Case slug validation and generation
//!
//! A case (one protected phone number + its monitor sessions) is addressed
//! by a slug: 3-64 lowercase alphanumeric-or-hyphen characters.

use crate::{Error, Result};
use uuid::Uuid;

/// Validate a case slug, returning it borrowed on success.
pub fn validate(slug: &str) -> Result<&str> {
    let len = slug.len();
    if !(3..=64).contains(&len) {
        return Err(Error::BadRequest("invalid case id".into()));
    }
    if !slug
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(Error::BadRequest("invalid case id".into()));
    }
    Ok(slug)
}

/// Generate a fresh random case slug.
pub fn generate() -> String {
    format!("case-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_slugs() {
        assert!(validate("abc").is_ok());
        assert!(validate("case-123-x").is_ok());
        assert!(validate(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn rejects_invalid_slugs() {
        assert!(validate("ab").is_err());
        assert!(validate(&"a".repeat(65)).is_err());
        assert!(validate("Has-Upper").is_err());
        assert!(validate("under_score").is_err());
        assert!(validate("spa ce").is_err());
    }

    #[test]
    fn generated_slugs_validate() {
        let slug = generate();
        assert!(validate(&slug).is_ok());
    }
}

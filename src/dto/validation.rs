//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest chat username accepted on ingest.
const MAX_USERNAME_LEN: usize = 64;

/// Validates that a chat username is non-empty, within length bounds, and
/// made of word characters only (letters, digits, underscore), matching the
/// `@target` shape the vote pattern can reference.
pub fn validate_username(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_USERNAME_LEN {
        let mut err = ValidationError::new("username_length");
        err.message =
            Some(format!("username must be 1..={} bytes (got {})", MAX_USERNAME_LEN, name.len()).into());
        return Err(err);
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        let mut err = ValidationError::new("username_format");
        err.message = Some("username may contain only letters, digits, and underscores".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username_valid() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("Alice_42").is_ok());
        assert!(validate_username("a").is_ok());
    }

    #[test]
    fn test_validate_username_invalid_length() {
        assert!(validate_username("").is_err());
        assert!(validate_username(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_username_invalid_format() {
        assert!(validate_username("alice smith").is_err()); // space
        assert!(validate_username("@alice").is_err()); // sigil
        assert!(validate_username("alice!").is_err()); // punctuation
    }
}

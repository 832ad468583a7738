//! Organization name rules shared by the step predicate and the submit path.

use crate::error::ValidationError;

pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 100;

/// Validate an organization name, returning the trimmed name on success.
///
/// Length is counted in characters after trimming.
pub fn validate_organization_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    let len = trimmed.chars().count();
    if len < NAME_MIN_LEN {
        return Err(ValidationError::TooShort { min: NAME_MIN_LEN });
    }
    if len > NAME_MAX_LEN {
        return Err(ValidationError::TooLong { max: NAME_MAX_LEN });
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_trims() {
        assert_eq!(validate_organization_name("  Acme IoT ").unwrap(), "Acme IoT");
        assert_eq!(validate_organization_name("ab").unwrap(), "ab");
        assert!(validate_organization_name(&"x".repeat(100)).is_ok());
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert_eq!(validate_organization_name(""), Err(ValidationError::Empty));
        assert_eq!(validate_organization_name(" "), Err(ValidationError::Empty));
        assert_eq!(validate_organization_name("\t\n "), Err(ValidationError::Empty));
    }

    #[test]
    fn rejects_out_of_range_lengths() {
        assert_eq!(
            validate_organization_name("a"),
            Err(ValidationError::TooShort { min: 2 })
        );
        assert_eq!(
            validate_organization_name(" a "),
            Err(ValidationError::TooShort { min: 2 })
        );
        assert_eq!(
            validate_organization_name(&"x".repeat(101)),
            Err(ValidationError::TooLong { max: 100 })
        );
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 50 two-byte characters = 100 bytes, 50 chars
        assert!(validate_organization_name(&"é".repeat(50)).is_ok());
        assert!(validate_organization_name(&"é".repeat(100)).is_ok());
        assert!(validate_organization_name(&"é".repeat(101)).is_err());
    }
}

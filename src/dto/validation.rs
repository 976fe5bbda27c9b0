//! Validation helpers for DTOs.

use validator::ValidationError;

/// Length of a room code.
pub const ROOM_CODE_LEN: usize = 5;

/// Uppercase and trim a user-supplied room code.
pub fn normalize_room_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Validates that a room code is exactly five uppercase alphanumerics.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("K3F9Q") // Ok
/// validate_room_code("k3f9q") // Err - lowercase
/// validate_room_code("K3F9")  // Err - too short
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != ROOM_CODE_LEN {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be exactly {ROOM_CODE_LEN} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only uppercase letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Rejects strings that are empty once trimmed.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_room_code_valid() {
        assert!(validate_room_code("K3F9Q").is_ok());
        assert!(validate_room_code("00000").is_ok());
        assert!(validate_room_code(&normalize_room_code(" ab12c ")).is_ok());
    }

    #[test]
    fn test_validate_room_code_invalid_length() {
        assert!(validate_room_code("K3F9").is_err());
        assert!(validate_room_code("K3F9QQ").is_err());
        assert!(validate_room_code("").is_err());
    }

    #[test]
    fn test_validate_room_code_invalid_format() {
        assert!(validate_room_code("k3f9q").is_err());
        assert!(validate_room_code("K3-9Q").is_err());
        assert!(validate_room_code("K3 9Q").is_err());
    }

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank(" hi ").is_ok());
        assert!(validate_not_blank("   ").is_err());
    }
}

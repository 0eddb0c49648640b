//! Contact data normalization shared by the adapters.

use validator::ValidateEmail;

use herald_entity::DeliveryError;

/// Normalize a chat-app phone number: keep digits only, prepend
/// `default_country_code` to numbers of 10 or 11 digits, and require 10 to
/// 13 digits in the input.
pub fn normalize_chat_phone(raw: &str, default_country_code: &str) -> Result<String, DeliveryError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if !(10..=13).contains(&digits.len()) {
        return Err(DeliveryError::validation(
            "INVALID_PHONE",
            format!("phone '{raw}' must have 10 to 13 digits, found {}", digits.len()),
        ));
    }
    if digits.len() <= 11 {
        return Ok(format!("{default_country_code}{digits}"));
    }
    Ok(digits)
}

/// Normalize to an E.164-like `+<digits>` number of 8 to 15 digits. Numbers
/// without a leading `+` and at most 11 digits get `default_country_code`.
pub fn normalize_e164(raw: &str, default_country_code: &str) -> Result<String, DeliveryError> {
    let trimmed = raw.trim();
    let explicit = trimmed.starts_with('+');
    let separators = |c: &char| matches!(c, ' ' | '-' | '(' | ')' | '.');
    let body: String = trimmed
        .trim_start_matches('+')
        .chars()
        .filter(|c| !separators(c))
        .collect();

    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit()) {
        return Err(DeliveryError::validation(
            "INVALID_PHONE",
            format!("phone '{raw}' contains characters other than digits"),
        ));
    }

    let digits = if !explicit && body.len() <= 11 {
        format!("{default_country_code}{body}")
    } else {
        body
    };

    if !(8..=15).contains(&digits.len()) || digits.starts_with('0') {
        return Err(DeliveryError::validation(
            "INVALID_PHONE",
            format!("phone '{raw}' is not a valid international number"),
        ));
    }
    Ok(format!("+{digits}"))
}

/// Trim and syntactically validate an email address.
pub fn normalize_email(raw: &str) -> Result<String, DeliveryError> {
    let address = raw.trim().to_string();
    if !address.validate_email() {
        return Err(DeliveryError::validation(
            "INVALID_EMAIL",
            format!("'{raw}' is not a valid email address"),
        ));
    }
    Ok(address)
}

/// Check a push device token against the minimum length.
pub fn normalize_push_token(raw: &str, min_length: usize) -> Result<String, DeliveryError> {
    let token = raw.trim();
    if token.is_empty() || token.len() < min_length || token.chars().any(char::is_whitespace) {
        return Err(DeliveryError::validation(
            "INVALID_TOKEN",
            format!(
                "device token must be at least {min_length} characters without spaces, got {}",
                token.len()
            ),
        ));
    }
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_entity::ErrorClass;

    #[test]
    fn test_chat_phone_adds_country_code() {
        assert_eq!(
            normalize_chat_phone("11999999999", "55").unwrap(),
            "5511999999999"
        );
        assert_eq!(
            normalize_chat_phone("(11) 99999-9999", "55").unwrap(),
            "5511999999999"
        );
        assert_eq!(
            normalize_chat_phone("+55 11 99999-9999", "55").unwrap(),
            "5511999999999"
        );
    }

    #[test]
    fn test_chat_phone_rejects_short() {
        let err = normalize_chat_phone("123", "55").unwrap_err();
        assert_eq!(err.class, ErrorClass::Validation);
        assert_eq!(err.code, "INVALID_PHONE");
        assert!(normalize_chat_phone("12345678901234", "55").is_err());
    }

    #[test]
    fn test_e164() {
        assert_eq!(normalize_e164("+1 (415) 555-0100", "55").unwrap(), "+14155550100");
        assert_eq!(normalize_e164("11999999999", "55").unwrap(), "+5511999999999");
        assert!(normalize_e164("+12", "55").is_err());
        assert!(normalize_e164("call me", "55").is_err());
    }

    #[test]
    fn test_email() {
        assert_eq!(normalize_email(" ana@example.com ").unwrap(), "ana@example.com");
        assert!(normalize_email("ana@").is_err());
        assert!(normalize_email("not an email").is_err());
    }

    #[test]
    fn test_push_token() {
        let token = "a".repeat(32);
        assert_eq!(normalize_push_token(&token, 32).unwrap(), token);
        assert!(normalize_push_token("short", 32).is_err());
        assert!(normalize_push_token("", 1).is_err());
    }
}

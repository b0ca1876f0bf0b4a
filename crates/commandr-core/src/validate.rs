use crate::error::ValidationError;

const ERROR_INDICATORS: [&str; 4] = ["error:", "exception:", "failed:", "invalid:"];

/// Collapse whitespace and reject responses that are effectively empty.
///
/// A response that looks like it contains an error message is still
/// returned unchanged; the caller is told via [`error_indicator`].
pub fn validate(raw: &str) -> Result<String, ValidationError> {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.chars().count() < 2 {
        return Err(ValidationError::EmptyResponse);
    }

    if let Some(indicator) = error_indicator(&cleaned) {
        tracing::warn!(indicator, "potential error in response: {}", cleaned);
    }

    Ok(cleaned)
}

/// First error-like marker found in the text, case-insensitive
pub fn error_indicator(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    ERROR_INDICATORS
        .iter()
        .copied()
        .find(|indicator| lower.contains(indicator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_blank_rejected() {
        assert_eq!(validate(""), Err(ValidationError::EmptyResponse));
        assert_eq!(validate("   "), Err(ValidationError::EmptyResponse));
        assert_eq!(validate(" \n\t a \n"), Err(ValidationError::EmptyResponse));
    }

    #[test]
    fn test_short_valid_unchanged() {
        assert_eq!(validate("ok").unwrap(), "ok");
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(
            validate("  Here   is\n\nmy   response.\t ").unwrap(),
            "Here is my response."
        );
    }

    #[test]
    fn test_error_indicator_does_not_reject() {
        let text = "Exception: the model could not answer";
        assert_eq!(validate(text).unwrap(), text);
        assert_eq!(error_indicator(text), Some("exception:"));
        assert_eq!(error_indicator("INVALID: input"), Some("invalid:"));
        assert_eq!(error_indicator("all good"), None);
    }
}

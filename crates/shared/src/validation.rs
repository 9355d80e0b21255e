//! Common validation utilities.

use validator::ValidationError;

/// Maximum accepted length of a webhook URL.
pub const MAX_URL_LENGTH: usize = 2048;

/// Validates that a URL uses the HTTPS scheme.
pub fn validate_https_url(url: &str) -> Result<(), ValidationError> {
    let has_host = url
        .strip_prefix("https://")
        .map(|rest| !rest.is_empty() && !rest.starts_with('/'))
        .unwrap_or(false);

    if has_host {
        Ok(())
    } else {
        let mut err = ValidationError::new("https_required");
        err.message = Some("URL must use HTTPS protocol".into());
        Err(err)
    }
}

/// Validates that a display name is not only whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

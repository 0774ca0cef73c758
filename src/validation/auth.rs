use crate::error::{AppError, Result};

/// Upper bound for a posted fragment or query string.
const MAX_LANDING_PART_LEN: usize = 8 * 1024;

/// Validates the fragment and query a browser posted from its landing URL.
///
/// # Arguments
///
/// * `fragment` - The URL fragment, with or without the leading `#`.
/// * `query` - The query string, with or without the leading `?`.
///
/// # Returns
///
/// A `Result<()>` indicating whether the landing is acceptable.
pub fn validate_landing(fragment: &str, query: &str) -> Result<()> {
    if fragment.len() > MAX_LANDING_PART_LEN {
        return Err(AppError::Validation(
            "Fragment must be at most 8192 bytes".to_string(),
        ));
    }

    if query.len() > MAX_LANDING_PART_LEN {
        return Err(AppError::Validation(
            "Query must be at most 8192 bytes".to_string(),
        ));
    }

    if fragment.chars().chain(query.chars()).any(char::is_control) {
        return Err(AppError::Validation(
            "Landing URL parts cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

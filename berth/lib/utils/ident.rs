use crate::{BerthError, BerthResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Validates an app identifier before it is used in any filesystem path or
/// engine project name.
///
/// Identifiers are opaque strings chosen by the caller, but they end up as
/// directory names under the install and data roots, so anything that could
/// escape those roots is rejected: empty strings, path separators, and `..`
/// sequences.
pub fn validate_app_id(app_id: &str) -> BerthResult<()> {
    if app_id.trim().is_empty() {
        return Err(BerthError::InvalidAppId("empty identifier".to_string()));
    }

    if app_id.contains('/') || app_id.contains('\\') {
        return Err(BerthError::InvalidAppId(format!(
            "identifier contains a path separator: {}",
            app_id
        )));
    }

    if app_id.contains("..") {
        return Err(BerthError::InvalidAppId(format!(
            "identifier contains a parent-directory sequence: {}",
            app_id
        )));
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_app_id_accepts_plain_names() {
        assert!(validate_app_id("nextcloud").is_ok());
        assert!(validate_app_id("jellyfin-server").is_ok());
        assert!(validate_app_id("app_2").is_ok());
        assert!(validate_app_id("v2.example").is_ok());
    }

    #[test]
    fn test_validate_app_id_rejects_traversal() {
        assert!(validate_app_id("").is_err());
        assert!(validate_app_id("   ").is_err());
        assert!(validate_app_id("a/b").is_err());
        assert!(validate_app_id("/etc").is_err());
        assert!(validate_app_id("a\\b").is_err());
        assert!(validate_app_id("..").is_err());
        assert!(validate_app_id("a..b").is_err());
        assert!(validate_app_id("../escape").is_err());
    }
}

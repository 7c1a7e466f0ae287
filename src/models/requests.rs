//! Request DTOs for the diagnostics API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// Request body for POST /invalidate
///
/// # Fields
/// - `pattern`: Glob over cache keys, e.g. `kpis:*` or `session:u1`
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    /// Key pattern to delete
    pub pattern: String,
}

impl InvalidateRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid. Character
    /// set and length are checked again by the client.
    pub fn validate(&self) -> Option<String> {
        if self.pattern.trim().is_empty() {
            return Some("Pattern cannot be empty".to_string());
        }
        if self.pattern.chars().all(|c| c == '*' || c == '?') {
            return Some("Pattern must name at least one literal character".to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_request_deserialize() {
        let json = r#"{"pattern": "kpis:*"}"#;
        let req: InvalidateRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.pattern, "kpis:*");
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_validate_empty_pattern() {
        let req = InvalidateRequest {
            pattern: "  ".to_string(),
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_wildcard_only_pattern() {
        let req = InvalidateRequest {
            pattern: "*".to_string(),
        };
        assert!(req.validate().is_some());
    }
}

//! Typed error conditions shared by the provider tools.
//!
//! Application code wraps these in `anyhow::Error`; callers that need to
//! branch on a condition (the Netlify 422 fallback, zone lookups in tests)
//! downcast back to [`ToolError`].

use thiserror::Error;

/// HTTP status Netlify returns when a domain is already claimed elsewhere
pub const UNPROCESSABLE_ENTITY: u16 = 422;

#[derive(Debug, Error)]
pub enum ToolError {
    /// Mandatory credentials could not be resolved from env or config
    #[error("{provider} credentials not configured. {hint}")]
    MissingCredentials { provider: String, hint: String },

    /// No Route53 hosted zone matched the requested domain
    #[error("Hosted zone not found for domain: {0}")]
    ZoneNotFound(String),

    /// No record set matched name and type
    #[error("Record not found: {name} ({record_type})")]
    RecordNotFound { name: String, record_type: String },

    /// A vendor API answered with a non-success status
    #[error("{service} API error ({status}): {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    /// Setting a custom domain failed and so did the alias fallback
    #[error("Failed to add domain: {primary}. Alias fallback also failed: {fallback}")]
    DomainConflict { primary: String, fallback: String },

    /// Caller supplied an argument the operation cannot use
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A bounded wait elapsed
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A git subprocess failed
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    /// An OCR helper (page renderer or recognizer) failed
    #[error("{program} failed: {stderr}")]
    Ocr { program: String, stderr: String },
}

impl ToolError {
    /// Build an API error from a status code and response body
    pub fn api(service: &str, status: u16, message: impl Into<String>) -> Self {
        ToolError::Api {
            service: service.to_string(),
            status,
            message: message.into(),
        }
    }

    /// Build a missing-credentials error with a configuration hint
    pub fn missing_credentials(provider: &str, hint: &str) -> Self {
        ToolError::MissingCredentials {
            provider: provider.to_string(),
            hint: hint.to_string(),
        }
    }

    /// HTTP status of an API error, if this is one
    pub fn status(&self) -> Option<u16> {
        match self {
            ToolError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for an API error carrying HTTP 422
    pub fn is_unprocessable(&self) -> bool {
        self.status() == Some(UNPROCESSABLE_ENTITY)
    }
}

/// Find the first [`ToolError`] in an error chain
pub fn find_tool_error(err: &anyhow::Error) -> Option<&ToolError> {
    err.chain().find_map(|cause| cause.downcast_ref::<ToolError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_api_error_display() {
        let err = ToolError::api("Netlify", 422, "domain taken");
        assert_eq!(err.to_string(), "Netlify API error (422): domain taken");
        assert!(err.is_unprocessable());
    }

    #[test]
    fn test_non_api_error_has_no_status() {
        let err = ToolError::ZoneNotFound("example.com".to_string());
        assert_eq!(err.status(), None);
        assert!(!err.is_unprocessable());
    }

    #[test]
    fn test_find_tool_error_through_context() {
        let err: anyhow::Error = Err::<(), _>(ToolError::api("Route53", 400, "bad"))
            .context("Failed to change records")
            .unwrap_err();

        let found = find_tool_error(&err).unwrap();
        assert_eq!(found.status(), Some(400));
    }

    #[test]
    fn test_domain_conflict_mentions_both_failures() {
        let err = ToolError::DomainConflict {
            primary: "taken".to_string(),
            fallback: "also taken".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("taken"));
        assert!(msg.contains("also taken"));
    }
}

//! Error handling for the recipe cache

use recipe_sync_postgrest::PostgrestError;
use std::fmt;
use thiserror::Error;

/// Unified error type for recipe synchronization.
///
/// Errors are `Clone` so that a single in-flight refresh can hand the same
/// outcome to every caller that joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecipeError {
    /// Transport failure or timeout; re-invoking the operation may succeed
    #[error("Network error: {0}")]
    Network(String),

    /// Missing or expired session; the user has to sign in again
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Malformed payload or precondition violated by the caller
    #[error("Validation error: {0}")]
    Validation(String),

    /// Target id does not exist or is not owned by the caller
    #[error("Recipe not found: {0}")]
    NotFound(String),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RecipeError {
    pub fn network<T: fmt::Display>(msg: T) -> Self {
        RecipeError::Network(msg.to_string())
    }

    pub fn auth<T: fmt::Display>(msg: T) -> Self {
        RecipeError::Auth(msg.to_string())
    }

    pub fn validation<T: fmt::Display>(msg: T) -> Self {
        RecipeError::Validation(msg.to_string())
    }

    pub fn not_found<T: fmt::Display>(msg: T) -> Self {
        RecipeError::NotFound(msg.to_string())
    }

    pub fn config<T: fmt::Display>(msg: T) -> Self {
        RecipeError::Config(msg.to_string())
    }

    /// Only network failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, RecipeError::Network(_))
    }

    /// Message suitable for a toast or alert
    pub fn user_message(&self) -> String {
        match self {
            RecipeError::Network(_) => {
                "Couldn't reach the server. Check your connection and try again.".to_string()
            }
            RecipeError::Auth(_) => "Your session has expired. Please sign in again.".to_string(),
            RecipeError::Validation(detail) => format!("This recipe couldn't be saved: {}", detail),
            RecipeError::NotFound(_) => "This recipe no longer exists.".to_string(),
            RecipeError::Config(_) => "The app is misconfigured. Please update and retry.".to_string(),
        }
    }
}

impl From<PostgrestError> for RecipeError {
    fn from(err: PostgrestError) -> Self {
        if let Some(code) = err.code() {
            match code {
                "PGRST301" | "PGRST302" => return RecipeError::Auth(err.to_string()),
                "PGRST116" => return RecipeError::NotFound(err.to_string()),
                _ => {}
            }
        }

        if let Some(status) = err.status() {
            let code = status.as_u16();
            return match code {
                401 | 403 => RecipeError::Auth(err.to_string()),
                404 => RecipeError::NotFound(err.to_string()),
                408 | 429 => RecipeError::Network(err.to_string()),
                400..=499 => RecipeError::Validation(err.to_string()),
                _ => RecipeError::Network(err.to_string()),
            };
        }

        match err {
            PostgrestError::NetworkError(_) if err.is_timeout() => {
                RecipeError::Network(format!("request timed out: {}", err))
            }
            PostgrestError::NetworkError(_) => RecipeError::Network(err.to_string()),
            PostgrestError::UrlParseError(_) => RecipeError::Config(err.to_string()),
            _ => RecipeError::Validation(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RecipeError {
    fn from(err: serde_json::Error) -> Self {
        RecipeError::Validation(err.to_string())
    }
}

impl From<url::ParseError> for RecipeError {
    fn from(err: url::ParseError) -> Self {
        RecipeError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RecipeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use recipe_sync_postgrest::PostgrestApiErrorDetails;
    use reqwest::StatusCode;

    fn api_error(status: u16, code: Option<&str>) -> PostgrestError {
        PostgrestError::ApiError {
            details: PostgrestApiErrorDetails {
                code: code.map(str::to_string),
                message: Some("boom".to_string()),
                details: None,
                hint: None,
            },
            status: StatusCode::from_u16(status).unwrap(),
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(RecipeError::from(api_error(401, None)), RecipeError::Auth(_)));
        assert!(matches!(RecipeError::from(api_error(403, None)), RecipeError::Auth(_)));
        assert!(matches!(RecipeError::from(api_error(404, None)), RecipeError::NotFound(_)));
        assert!(matches!(RecipeError::from(api_error(400, None)), RecipeError::Validation(_)));
        assert!(matches!(RecipeError::from(api_error(422, None)), RecipeError::Validation(_)));
        assert!(matches!(RecipeError::from(api_error(429, None)), RecipeError::Network(_)));
        assert!(matches!(RecipeError::from(api_error(503, None)), RecipeError::Network(_)));
    }

    #[test]
    fn test_postgrest_codes_win_over_status() {
        assert!(matches!(
            RecipeError::from(api_error(406, Some("PGRST116"))),
            RecipeError::NotFound(_)
        ));
        assert!(matches!(
            RecipeError::from(api_error(400, Some("PGRST301"))),
            RecipeError::Auth(_)
        ));
    }

    #[test]
    fn test_only_network_is_retryable() {
        assert!(RecipeError::network("timeout").is_retryable());
        assert!(!RecipeError::auth("expired").is_retryable());
        assert!(!RecipeError::validation("title").is_retryable());
        assert!(!RecipeError::not_found("42").is_retryable());
    }

    #[test]
    fn test_user_message_includes_validation_detail() {
        let message = RecipeError::validation("title must not be empty").user_message();
        assert!(message.contains("title must not be empty"));
    }
}

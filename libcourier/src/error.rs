//! Error types for Courier

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CourierError>;

/* Error codes */

pub const API_ERROR: &str = "api.API_ERROR";
pub const BAD_REQUEST: &str = "api.BAD_REQUEST";
pub const CONNECTION_ERROR: &str = "api.CONNECTION_ERROR";
pub const DECODE_ERROR: &str = "api.DECODE_ERROR";
pub const INVALID_RESPONSE: &str = "api.INVALID_RESPONSE";
pub const NOT_FOUND: &str = "api.NOT_FOUND";
pub const PERMISSION_DENIED: &str = "api.PERMISSION_DENIED";
pub const UNAUTHORIZED: &str = "api.UNAUTHORIZED";
pub const UNKNOWN_ERROR: &str = "api.UNKNOWN_ERROR";

#[derive(Error, Debug)]
pub enum CourierError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

impl CourierError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CourierError::Api(ApiError::Unauthorized { .. })
            | CourierError::Api(ApiError::PermissionDenied { .. }) => 2,
            CourierError::Api(_) => 1,
            CourierError::Config(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Discriminant of an [`ApiError`].
///
/// Retry and error-handling policies are expressed as sets of kinds and
/// checked by equality, never by inspecting the error value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Unauthorized,
    PermissionDenied,
    NotFound,
    BadRequest,
    Unknown,
    Decode,
    InvalidResponse,
}

impl ErrorKind {
    /// Stable string code, suitable for storing in reducer state
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Connection => CONNECTION_ERROR,
            ErrorKind::Unauthorized => UNAUTHORIZED,
            ErrorKind::PermissionDenied => PERMISSION_DENIED,
            ErrorKind::NotFound => NOT_FOUND,
            ErrorKind::BadRequest => BAD_REQUEST,
            ErrorKind::Unknown => UNKNOWN_ERROR,
            ErrorKind::Decode => DECODE_ERROR,
            ErrorKind::InvalidResponse => INVALID_RESPONSE,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "Failed to establish a new connection.",
            ErrorKind::Unauthorized => "Incorrect credentials.",
            ErrorKind::PermissionDenied => "Permission denied.",
            ErrorKind::NotFound => "The requested object was not found.",
            ErrorKind::BadRequest => "Bad request",
            ErrorKind::Unknown => "An unknown error occurred.",
            ErrorKind::Decode => "Failed to parse response.",
            ErrorKind::InvalidResponse => "The response object contains errors.",
        }
    }
}

/// Anything that can be classified by [`ErrorKind`]
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Failures of a single API request or of decoding its response
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Error when connecting to {url}: Failed to establish a new connection.")]
    Connection { url: String },

    #[error("Error when connecting to {url}: Incorrect credentials.")]
    Unauthorized { url: String },

    #[error("Error when connecting to {url}: Permission denied.")]
    PermissionDenied { url: String },

    #[error("Error when connecting to {url}: The requested object was not found.")]
    NotFound { url: String },

    /// `data` holds the response body when it was valid JSON
    #[error("Bad request error when connecting to {url}:\n{}", pretty(.data))]
    BadRequest { url: String, data: Option<Value> },

    #[error("Error when connecting to {url}: An unknown error occurred.")]
    Unknown { url: String },

    #[error("Error when connecting to {url}: Failed to parse response.")]
    Decode { url: String },

    #[error("Invalid response:\n{}", pretty(.data))]
    InvalidResponse { data: Value, message: String },
}

fn pretty<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "null".to_string())
}

impl ApiError {
    /// Build an `InvalidResponse` for a payload that failed validation
    pub fn invalid_response(data: &Value, message: impl Into<String>) -> Self {
        ApiError::InvalidResponse {
            data: data.clone(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Short human-readable message, without URL or payload context
    pub fn message(&self) -> &str {
        match self {
            ApiError::InvalidResponse { message, .. } => message,
            other => other.kind().default_message(),
        }
    }

    /// Request URL, for errors raised while talking to the server
    pub fn url(&self) -> Option<&str> {
        match self {
            ApiError::Connection { url }
            | ApiError::Unauthorized { url }
            | ApiError::PermissionDenied { url }
            | ApiError::NotFound { url }
            | ApiError::BadRequest { url, .. }
            | ApiError::Unknown { url }
            | ApiError::Decode { url } => Some(url),
            ApiError::InvalidResponse { .. } => None,
        }
    }
}

impl Classify for ApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Connection { .. } => ErrorKind::Connection,
            ApiError::Unauthorized { .. } => ErrorKind::Unauthorized,
            ApiError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            ApiError::BadRequest { .. } => ErrorKind::BadRequest,
            ApiError::Unknown { .. } => ErrorKind::Unknown,
            ApiError::Decode { .. } => ErrorKind::Decode,
            ApiError::InvalidResponse { .. } => ErrorKind::InvalidResponse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exit_code_unauthorized() {
        let error = CourierError::Api(ApiError::Unauthorized {
            url: "http://example.test".to_string(),
        });
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_permission_denied() {
        let error = CourierError::Api(ApiError::PermissionDenied {
            url: "http://example.test".to_string(),
        });
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_connection_error() {
        let error = CourierError::Api(ApiError::Connection {
            url: "http://example.test".to_string(),
        });
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_error() {
        let error = CourierError::Config(ConfigError::MissingField("api.base_url".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_request_error_display_includes_url() {
        let error = ApiError::NotFound {
            url: "http://example.test/deliveries".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Error when connecting to http://example.test/deliveries: The requested object was not found."
        );
    }

    #[test]
    fn test_bad_request_display_includes_body() {
        let error = ApiError::BadRequest {
            url: "http://example.test".to_string(),
            data: Some(json!({"field": ["required"]})),
        };
        let rendered = error.to_string();
        assert!(rendered.starts_with("Bad request error when connecting to http://example.test:\n"));
        assert!(rendered.contains("\"field\""));
    }

    #[test]
    fn test_bad_request_without_body_renders_null() {
        let error = ApiError::BadRequest {
            url: "http://example.test".to_string(),
            data: None,
        };
        assert!(error.to_string().ends_with(":\nnull"));
    }

    #[test]
    fn test_invalid_response_display_includes_payload() {
        let error = ApiError::invalid_response(&json!({"count": -1}), "Invalid value for `count`.");
        assert!(error.to_string().starts_with("Invalid response:\n"));
        assert!(error.to_string().contains("\"count\": -1"));
        assert_eq!(error.message(), "Invalid value for `count`.");
        assert_eq!(error.url(), None);
    }

    #[test]
    fn test_codes_follow_kind() {
        let error = ApiError::Decode {
            url: "http://example.test".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::Decode);
        assert_eq!(error.code(), DECODE_ERROR);
        assert_eq!(error.message(), "Failed to parse response.");
        assert_eq!(error.url(), Some("http://example.test"));
    }

    #[test]
    fn test_api_error_can_be_cloned() {
        let error = ApiError::Connection {
            url: "http://example.test".to_string(),
        };
        assert_eq!(error.clone(), error);
    }
}

//! Custom error types for ragdesk

use thiserror::Error;

/// Main error type for ragdesk operations
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected before any request was made
    #[error("{0}")]
    Validation(String),

    /// Non-2xx response; the message comes from the body when the backend provides one
    #[error("{message}")]
    Http { status: u16, message: String },

    /// The request never reached the backend
    #[error(
        "Could not reach the backend at {url} ({reason}). Make sure RAGDESK_API_URL \
         (or api_url in config.toml) points to a running backend."
    )]
    Network { url: String, reason: String },

    #[error("Error al serializar los datos para enviar")]
    Serialization(#[source] serde_json::Error),

    #[error("Request cancelled")]
    Cancelled,

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not logged in: run 'ragdesk login' first")]
    NotLoggedIn,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// HTTP status of a backend rejection, if this is one
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The error text, or `fallback` when the error carries no message of its own
    pub fn message_or(&self, fallback: &str) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            fallback.to_string()
        } else {
            message
        }
    }
}

/// Result type alias for ragdesk
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_displays_backend_message() {
        let err = Error::Http {
            status: 404,
            message: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "not found");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_network_error_mentions_url_and_config_hint() {
        let err = Error::Network {
            url: "http://localhost:3000/api/AI/ask".to_string(),
            reason: "connection refused".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("http://localhost:3000/api/AI/ask"));
        assert!(message.contains("RAGDESK_API_URL"));
    }

    #[test]
    fn test_message_or_falls_back_on_empty() {
        let err = Error::Other(String::new());
        assert_eq!(err.message_or("fallback"), "fallback");
        assert_eq!(Error::Cancelled.message_or("fallback"), "Request cancelled");
    }
}

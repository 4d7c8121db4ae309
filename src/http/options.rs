//! Rejection response configuration.

use serde::{Deserialize, Serialize};

/// Header read for the caller's key when none is configured.
pub const DEFAULT_HEADER_KEY: &str = "RemoteAddr";
/// Status code returned to rejected callers.
pub const DEFAULT_STATUS_CODE: u16 = 429;
/// Content type of rejection and error responses.
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Body returned to rejected callers.
pub const DEFAULT_MESSAGE: &str = "Rate Limited! Too many requests.";

/// How the HTTP middleware finds the key and renders a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpOptions {
    /// Request header holding the caller's key
    #[serde(default = "default_header_key")]
    pub header_key: String,

    /// Status code of a rejected response
    #[serde(default = "default_status_code")]
    pub status_code: u16,

    /// Content type of a rejected response
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Body of a rejected response
    #[serde(default = "default_message")]
    pub message: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            header_key: default_header_key(),
            status_code: default_status_code(),
            content_type: default_content_type(),
            message: default_message(),
        }
    }
}

fn default_header_key() -> String {
    DEFAULT_HEADER_KEY.to_string()
}

fn default_status_code() -> u16 {
    DEFAULT_STATUS_CODE
}

fn default_content_type() -> String {
    JSON_CONTENT_TYPE.to_string()
}

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

impl HttpOptions {
    /// Set the header holding the caller's key.
    pub fn with_header_key(mut self, header_key: impl Into<String>) -> Self {
        self.header_key = header_key.into();
        self
    }

    /// Set the status code of a rejected response.
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// Set the content type of a rejected response.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Set the body of a rejected response.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

//! Gateway error types and formatting

use serde::Serialize;
use thiserror::Error;

/// Error codes surfaced at the gateway boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Admission
    Forbidden,

    // Routing
    NotFound,
    MethodNotAllowed,

    // Handler-reported client errors
    BadRequest,

    // Handler / store faults
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forbidden => "Forbidden",
            Self::NotFound => "NotFound",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::BadRequest => "BadRequest",
            Self::InternalError => "InternalServerError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::BadRequest => 400,
            // Handler faults surface as a bad upstream, matching the
            // proxy-integration convention.
            Self::InternalError => 502,
        }
    }
}

/// Gateway-level error carried to the HTTP boundary
#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Format as the `{"message": ...}` JSON body the gateway returns
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct JsonError<'a> {
            message: &'a str,
            #[serde(rename = "requestId")]
            request_id: &'a str,
        }

        let error = JsonError {
            message: &self.message,
            request_id: &self.request_id,
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(r#"{{"message":"{}"}}"#, self.code.as_str())
        })
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error as ThisError;

use crate::vendor::VendorError;

/// Names reported back to the client whenever a meeting payload fails validation.
pub const REQUIRED_MEETING_FIELDS: [&str; 4] = [
    "conference_date",
    "conference_location",
    "conference_theme",
    "conference_content",
];

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// A meeting payload is missing one or more required fields
    #[error("Missing required fields")]
    MissingFields,

    /// Uploaded file has a MIME type outside the allow-list
    #[error("Unsupported file type {mime}: only image files may be uploaded")]
    UnsupportedMediaType { mime: String },

    /// Uploaded file exceeds the configured size limit
    #[error("File exceeds the maximum upload size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// A vendor or remote call failed; `message` is the client-facing summary
    #[error("{message}: {source}")]
    Upstream {
        message: String,
        #[source]
        source: VendorError,
    },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn upstream(message: impl Into<String>, source: VendorError) -> Self {
        Error::Upstream {
            message: message.into(),
            source,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } | Error::MissingFields => StatusCode::BAD_REQUEST,
            Error::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Upstream { .. } | Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::Upstream { message, .. } => message.clone(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Detail placed in the `error` field: the vendor's own payload when it answered, otherwise
    /// the transport error message.
    fn detail(&self) -> Option<Value> {
        match self {
            Error::Upstream { source, .. } => Some(source.detail()),
            _ => None,
        }
    }

    fn log(&self) {
        match self {
            Error::Upstream { .. } | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::UnsupportedMediaType { .. } | Error::PayloadTooLarge { .. } => {
                tracing::info!("Upload rejected: {}", self);
            }
            Error::BadRequest { .. } | Error::MissingFields => {
                tracing::debug!("Client error: {}", self);
            }
        }
    }

    /// The `{success, message, ...}` body shared by every surface.
    fn body(&self) -> serde_json::Map<String, Value> {
        let mut body = serde_json::Map::new();
        body.insert("success".to_string(), Value::Bool(false));
        body.insert("message".to_string(), Value::String(self.user_message()));
        if let Some(detail) = self.detail() {
            body.insert("error".to_string(), detail);
        }
        if matches!(self, Error::MissingFields) {
            body.insert("required".to_string(), json!(REQUIRED_MEETING_FIELDS));
        }
        body
    }
}

/// Meeting record endpoints answer with `{code, success, message, error?}`.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status_code();
        let mut body = self.body();
        body.insert("code".to_string(), json!(status.as_u16()));
        (status, Json(Value::Object(body))).into_response()
    }
}

/// Error type for the upload and image proxy endpoints, whose envelope has no `code` field.
#[derive(Debug)]
pub struct MediaError(pub Error);

impl From<Error> for MediaError {
    fn from(err: Error) -> Self {
        MediaError(err)
    }
}

impl IntoResponse for MediaError {
    fn into_response(self) -> Response {
        self.0.log();
        (self.0.status_code(), Json(Value::Object(self.0.body()))).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

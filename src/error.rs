//! Error taxonomy for storage and credential operations

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use serde::Serialize;

pub type StorageResult<T> = Result<T, StorageError>;

/// A failed item of a fan-out operation, tagged with its position in the request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedFailure {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Not found: {prefix}")]
    NotFound { prefix: String },

    #[error("The {kind} name is duplicated: {name}")]
    NameCollision { kind: &'static str, name: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upload cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("{} of the operations failed", .failures.len())]
    Partial { failures: Vec<IndexedFailure> },

    #[error("{message}")]
    Service {
        message: String,
        status: Option<u16>,
        status_text: Option<String>,
    },
}

/// Normalized error shape shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub message: String,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub hide_error_code: bool,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Anything the dispatcher can put in an error dialog.
pub trait ResponseError {
    fn response(&self) -> ErrorResponse;
}

impl ResponseError for ErrorResponse {
    fn response(&self) -> ErrorResponse {
        self.clone()
    }
}

impl ResponseError for StorageError {
    fn response(&self) -> ErrorResponse {
        match self {
            StorageError::Service {
                message,
                status,
                status_text,
            } => ErrorResponse {
                message: if message.is_empty() {
                    "-".to_string()
                } else {
                    message.clone()
                },
                status: *status,
                status_text: status_text.clone(),
                hide_error_code: false,
            },
            StorageError::Partial { failures } => ErrorResponse {
                message: failures
                    .iter()
                    .map(|f| f.message.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                status: None,
                status_text: None,
                hide_error_code: true,
            },
            other => ErrorResponse {
                message: other.to_string(),
                status: None,
                status_text: None,
                hide_error_code: true,
            },
        }
    }
}

impl StorageError {
    pub fn service(message: impl Into<String>) -> Self {
        StorageError::Service {
            message: message.into(),
            status: None,
            status_text: None,
        }
    }

    /// HTTP status carried by a service error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            StorageError::Service { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status();
        StorageError::Service {
            message: err.to_string(),
            status: status.map(|s| s.as_u16()),
            status_text: status
                .and_then(|s| s.canonical_reason())
                .map(str::to_string),
        }
    }
}

/// Convert an SDK failure into `{message, status, statusText}`.
pub(crate) fn from_sdk<E>(err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = sdk_status(&err);
    let status_text = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    StorageError::Service {
        message,
        status,
        status_text,
    }
}

pub(crate) fn sdk_status<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|r| r.status().as_u16())
}

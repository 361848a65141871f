//! Error types for the MAL API client.
//!
//! Status failures keep the raw status and body. Transport failures and
//! undecodable bodies together form the processing condition reported by
//! [`MalError::is_processing`].

use reqwest::StatusCode;
use thiserror::Error;

use crate::xml::XmlError;

/// Result type returned by [`crate::MalClient`]
pub type Result<T> = std::result::Result<T, MalError>;

#[derive(Debug, Error)]
pub enum MalError {
    /// A required parameter was missing, empty or unusable. Raised before
    /// any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The service answered with a 4xx status, e.g. 401 for bad credentials.
    #[error("client error {status}: {body}")]
    Client { status: StatusCode, body: String },

    /// The service answered with a 5xx status.
    #[error("server error {status}: {body}")]
    Server { status: StatusCode, body: String },

    /// Any other non-2xx status, such as a redirect that was not followed.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    /// The connection failed, was dropped mid-response, or the response
    /// could not be read as HTTP.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The body was not the expected XML document.
    #[error("could not decode response: {0}")]
    Decode(#[from] XmlError),
}

impl MalError {
    pub(crate) fn missing(name: &str) -> Self {
        MalError::InvalidArgument(format!("{name} is required"))
    }

    /// Build the error for a non-2xx status
    pub(crate) fn from_status(status: StatusCode, body: String) -> Self {
        if status.is_client_error() {
            MalError::Client { status, body }
        } else if status.is_server_error() {
            MalError::Server { status, body }
        } else {
            MalError::UnexpectedStatus { status, body }
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            MalError::Client { status, .. }
            | MalError::Server { status, .. }
            | MalError::UnexpectedStatus { status, .. } => Some(*status),
            MalError::Transport(e) => e.status(),
            MalError::InvalidArgument(_) | MalError::Decode(_) => None,
        }
    }

    /// Raw response body for status errors
    pub fn body(&self) -> Option<&str> {
        match self {
            MalError::Client { body, .. }
            | MalError::Server { body, .. }
            | MalError::UnexpectedStatus { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, MalError::Client { .. })
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, MalError::Server { .. })
    }

    /// True when the response could not be received or understood
    pub fn is_processing(&self) -> bool {
        matches!(self, MalError::Transport(_) | MalError::Decode(_))
    }
}

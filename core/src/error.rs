//! Error types for the XRM XML API client.
//!
//! # Design
//! Every failure is an explicit `ApiError` value. Parse failures never
//! collapse into an empty success, auth failures leave the client
//! unauthenticated, and session rejections get their own variant so callers
//! can re-authenticate. Transports report failures through `TransportError`,
//! which converts into `ApiError::Transport` with `?`.

use thiserror::Error;

/// Errors returned by the request builder, response parser and client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The transport could not complete the round trip.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body is not well-formed XML.
    #[error("response is not well-formed XML: {0}")]
    Parse(String),

    /// The auth response did not carry a session token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A call was attempted before a successful `authenticate`.
    #[error("client is not authenticated")]
    NotAuthenticated,

    /// The server rejected the session token.
    #[error("session rejected by server")]
    SessionInvalid,

    /// A name or value cannot be represented in the request XML.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The server returned a non-success status that is not a session rejection.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

/// Failure reported by a `Transport` implementation.
#[derive(Debug, Error)]
#[error("transport failed: {message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

//! Centralized error types for the UniRemote core library.
//!
//! Each concern owns a focused `thiserror` enum next to its code
//! ([`TransportError`], [`ArtworkError`], [`PayloadError`], [`MessageError`],
//! [`IdentityError`]). This module gives them machine-readable codes and folds
//! them into the application-wide [`RemoteError`].
//!
//! Note that most session operations never return these errors: transport
//! faults are logged and surfaced as connectivity events instead. Errors are
//! returned from construction paths (bootstrap, identity, configuration) and
//! from the lower-level building blocks.

use serde::Serialize;
use thiserror::Error;

use crate::artwork::ArtworkError;
use crate::identity::IdentityError;
use crate::protocol::{MessageError, PayloadError};
use crate::transport::TransportError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::Mdns(_) => "mdns_daemon_failed",
            Self::Connect(_) => "connect_failed",
            Self::Timeout(_) => "connect_timeout",
            Self::FrameTooLarge(_) => "frame_too_large",
            Self::Io(_) => "transport_io",
            Self::Closed => "transport_closed",
        }
    }
}

impl ErrorCode for ArtworkError {
    fn code(&self) -> &'static str {
        match self {
            Self::EmptyKey => "artwork_empty_key",
            Self::Base64(_) => "artwork_base64",
            Self::Image(_) => "artwork_image",
            Self::Io(_) => "artwork_io",
            Self::QueueClosed => "artwork_queue_closed",
        }
    }
}

impl ErrorCode for PayloadError {
    fn code(&self) -> &'static str {
        match self {
            Self::Undecodable { .. } => "payload_undecodable",
        }
    }
}

impl ErrorCode for MessageError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownType(_) => "unknown_message_type",
            Self::MissingField { .. } => "missing_field",
        }
    }
}

impl ErrorCode for IdentityError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "identity_io",
            Self::Json(_) => "identity_json",
        }
    }
}

/// Application-wide error type.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum RemoteError {
    /// Transport setup or delivery failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Artwork decoding or persistence failed.
    #[error("Artwork error: {0}")]
    Artwork(String),

    /// An inbound payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The device identity could not be loaded or saved.
    #[error("Identity error: {0}")]
    Identity(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RemoteError {
    /// Returns a machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Artwork(_) => "artwork_error",
            Self::Decode(_) => "decode_error",
            Self::Identity(_) => "identity_error",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

impl From<TransportError> for RemoteError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<ArtworkError> for RemoteError {
    fn from(err: ArtworkError) -> Self {
        Self::Artwork(err.to_string())
    }
}

impl From<PayloadError> for RemoteError {
    fn from(err: PayloadError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<MessageError> for RemoteError {
    fn from(err: MessageError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<IdentityError> for RemoteError {
    fn from(err: IdentityError) -> Self {
        Self::Identity(err.to_string())
    }
}

use thiserror::Error;

use crate::types::RoomNameError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    InvalidRoomName(#[from] RoomNameError),

    #[error("room name is already taken")]
    RoomNameTaken,

    #[error("user already exists")]
    EmailTaken,

    #[error("room is full")]
    RoomFull,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("room is not active")]
    RoomInactive,

    #[error("account is deactivated")]
    AccountDisabled,

    #[error("invalid credential")]
    Unauthorized,

    #[error("user is banned from this room")]
    Banned,

    #[error(transparent)]
    Passkey(#[from] PasskeyError),

    #[error("media service error: {0}")]
    Media(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Terminal outcomes of a passkey ceremony.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PasskeyError {
    #[error("challenge expired or missing")]
    ChallengeExpiredOrMissing,

    #[error("credential not found")]
    CredentialNotFound,

    #[error("signature invalid")]
    SignatureInvalid,

    #[error("origin mismatch")]
    OriginMismatch,

    #[error("signature counter did not advance")]
    ReplayDetected,

    #[error("malformed authenticator response")]
    Malformed,
}

/// Stable classification of every error, used for HTTP mapping and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    Unauthorized,
    Banned,
    ReplayDetected,
    Dependency,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Banned => "banned",
            ErrorKind::ReplayDetected => "replay_detected",
            ErrorKind::Dependency => "dependency_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::InvalidRoomName(_) => ErrorKind::Validation,
            Error::RoomNameTaken | Error::EmailTaken | Error::RoomFull | Error::Conflict(_) => {
                ErrorKind::Conflict
            }
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Forbidden(_) | Error::RoomInactive | Error::AccountDisabled => {
                ErrorKind::Forbidden
            }
            Error::Unauthorized => ErrorKind::Unauthorized,
            Error::Banned => ErrorKind::Banned,
            Error::Passkey(PasskeyError::ReplayDetected) => ErrorKind::ReplayDetected,
            Error::Passkey(PasskeyError::Malformed) => ErrorKind::Validation,
            Error::Passkey(_) => ErrorKind::Unauthorized,
            Error::Media(_) => ErrorKind::Dependency,
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Crate-level error taxonomy.
//!
//! Each component returns its own error type (`StoreError`, `GatewayError`,
//! `EncodingError`, `SigningError`, `LifecycleError`). They all fold into
//! [`BftxError`] through `From`, so `?` in the service carries the failure
//! kind upward unchanged. Front ends match on [`BftxError::kind`], never on
//! message text.

use std::fmt;

use thiserror::Error;

use crate::consensus::GatewayError;
use crate::encoding::EncodingError;
use crate::storage::StoreError;
use crate::transaction::lifecycle::LifecycleError;
use crate::transaction::signing::SigningError;

pub type BftxResult<T> = Result<T, BftxError>;

/// Every way a BF_TX operation can fail.
#[derive(Debug, Error)]
pub enum BftxError {
    /// The identifier is absent from the store or from the consensus index.
    #[error("not found: {0}")]
    NotFound(String),

    /// A lifecycle guard refused the transition. Persisted state is unchanged.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The consensus engine or the store could not be reached in time.
    #[error("dependency unavailable: {0}")]
    UnavailableDependency(String),

    /// The consensus engine declined the broadcast.
    #[error("rejected by consensus engine (code {code}): {log}")]
    Rejected {
        /// Engine result code. Never zero.
        code: u32,
        /// Engine log line explaining the rejection.
        log: String,
    },

    /// Adapting between the canonical and encoded schema failed.
    #[error("conversion failure: {0}")]
    ConversionFailure(String),

    /// The encoding primitive rejected its input.
    #[error("encoding failure: {0}")]
    EncodingFailure(String),

    /// Content could not be serialized canonically, or stored bytes could
    /// not be read back.
    #[error("serialization failure: {0}")]
    SerializationFailure(String),

    /// Caller input is malformed: a payload that is not a non-empty JSON
    /// object, an unknown parameter set, an unqueryable identifier.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Field-less discriminant of [`BftxError`], for structural matching and
/// for use as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    UnavailableDependency,
    Rejected,
    ConversionFailure,
    EncodingFailure,
    SerializationFailure,
    InvalidPayload,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::UnavailableDependency => "unavailable_dependency",
            ErrorKind::Rejected => "rejected",
            ErrorKind::ConversionFailure => "conversion_failure",
            ErrorKind::EncodingFailure => "encoding_failure",
            ErrorKind::SerializationFailure => "serialization_failure",
            ErrorKind::InvalidPayload => "invalid_payload",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BftxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BftxError::NotFound(_) => ErrorKind::NotFound,
            BftxError::InvalidState(_) => ErrorKind::InvalidState,
            BftxError::UnavailableDependency(_) => ErrorKind::UnavailableDependency,
            BftxError::Rejected { .. } => ErrorKind::Rejected,
            BftxError::ConversionFailure(_) => ErrorKind::ConversionFailure,
            BftxError::EncodingFailure(_) => ErrorKind::EncodingFailure,
            BftxError::SerializationFailure(_) => ErrorKind::SerializationFailure,
            BftxError::InvalidPayload(_) => ErrorKind::InvalidPayload,
        }
    }
}

// ---------------------------------------------------------------------------
// Component error folding
// ---------------------------------------------------------------------------

impl From<StoreError> for BftxError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => BftxError::NotFound(id),
            StoreError::Corrupt { .. } => BftxError::SerializationFailure(err.to_string()),
            StoreError::Backend(_) | StoreError::Unavailable(_) => {
                BftxError::UnavailableDependency(err.to_string())
            }
        }
    }
}

impl From<GatewayError> for BftxError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected { code, log } => BftxError::Rejected { code, log },
            GatewayError::InvalidQuery(_) => BftxError::InvalidPayload(err.to_string()),
            GatewayError::Unavailable(_) | GatewayError::Protocol(_) | GatewayError::Closed => {
                BftxError::UnavailableDependency(err.to_string())
            }
        }
    }
}

impl From<EncodingError> for BftxError {
    fn from(err: EncodingError) -> Self {
        match err {
            EncodingError::Conversion(_) => BftxError::ConversionFailure(err.to_string()),
            EncodingError::UnknownParameterSet(_) => BftxError::InvalidPayload(err.to_string()),
            EncodingError::Keyring(_) => BftxError::UnavailableDependency(err.to_string()),
            EncodingError::Primitive(_)
            | EncodingError::MissingKey(_)
            | EncodingError::Kem(_)
            | EncodingError::Seal(_) => BftxError::EncodingFailure(err.to_string()),
        }
    }
}

impl From<SigningError> for BftxError {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::AlreadySigned => BftxError::InvalidState(err.to_string()),
            SigningError::Serialization(_) => BftxError::SerializationFailure(err.to_string()),
        }
    }
}

impl From<LifecycleError> for BftxError {
    fn from(err: LifecycleError) -> Self {
        BftxError::InvalidState(err.to_string())
    }
}

impl From<serde_json::Error> for BftxError {
    fn from(err: serde_json::Error) -> Self {
        BftxError::SerializationFailure(err.to_string())
    }
}

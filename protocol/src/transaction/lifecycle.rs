//! # Lifecycle State Machine
//!
//! One place that knows which transitions a record may take.
//!
//! ```text
//!              encode/decode (unsigned only)
//!                ┌──────────────┐
//!                ▼              │
//!   construct ─► Constructed ◄──► Encoded
//!                │                │
//!                └──── sign ──────┘
//!                      ▼
//!                    Signed ── broadcast ──► Transmitted
//!
//!   append: any state ──► parent.Amendment = child.Id (once)
//! ```
//!
//! [`check`] never mutates. It answers "may this action start from this
//! record?" and the service applies the transition only after a yes.

use std::fmt;

use thiserror::Error;

use super::types::{BfTx, EncodingState};

/// A guard that refused a transition. Always surfaces as `InvalidState`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("transaction already signed")]
    AlreadySigned,

    #[error("transaction not signed")]
    NotSigned,

    #[error("transaction already transmitted")]
    AlreadyTransmitted,

    #[error("transaction payload already encoded")]
    AlreadyEncoded,

    #[error("transaction payload is not encoded")]
    NotEncoded,

    #[error("transaction already amended by {0}")]
    AlreadyAmended(String),
}

/// Label derived from a record's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Constructed,
    Encoded,
    Signed,
    Transmitted,
}

impl LifecycleState {
    pub fn of(tx: &BfTx) -> Self {
        match (tx.verified, tx.transmitted, tx.encoding) {
            (_, true, _) => Self::Transmitted,
            (true, false, _) => Self::Signed,
            (false, false, EncodingState::Encoded) => Self::Encoded,
            (false, false, EncodingState::Plain) => Self::Constructed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Constructed => "constructed",
            Self::Encoded => "encoded",
            Self::Signed => "signed",
            Self::Transmitted => "transmitted",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transitions that start from an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Encode,
    Decode,
    Sign,
    Broadcast,
    /// Becoming the parent of an amendment.
    Amend,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Encode => "encode",
            Self::Decode => "decode",
            Self::Sign => "sign",
            Self::Broadcast => "broadcast",
            Self::Amend => "append",
        }
    }
}

/// May `action` start from `tx`?
pub fn check(tx: &BfTx, action: Action) -> Result<(), LifecycleError> {
    match action {
        Action::Encode | Action::Decode if tx.verified => Err(LifecycleError::AlreadySigned),
        Action::Encode if tx.encoding == EncodingState::Encoded => {
            Err(LifecycleError::AlreadyEncoded)
        }
        Action::Decode if tx.encoding == EncodingState::Plain => Err(LifecycleError::NotEncoded),
        Action::Encode | Action::Decode => Ok(()),

        Action::Sign if tx.verified => Err(LifecycleError::AlreadySigned),
        Action::Sign => Ok(()),

        Action::Broadcast if !tx.verified => Err(LifecycleError::NotSigned),
        Action::Broadcast if tx.transmitted => Err(LifecycleError::AlreadyTransmitted),
        Action::Broadcast => Ok(()),

        Action::Amend => match &tx.amendment {
            Some(existing) => Err(LifecycleError::AlreadyAmended(existing.clone())),
            None => Ok(()),
        },
    }
}

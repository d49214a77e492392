//! Mutation error taxonomy.

use cartkit_commerce::cart::{CartSnapshot, DiscountCodeState};
use cartkit_commerce::CommerceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of a failed command, for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NetworkError,
    BadInput,
    NotFound,
    Conflict,
    DiscountRejected,
    CurrencyMismatch,
    Unknown,
}

/// Why a command did not produce a new snapshot.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    /// No response from the platform.
    #[error("Network error: {detail}")]
    Network { detail: String },

    /// Structured rejection the caller can correct.
    #[error("Bad input ({code}): {message}")]
    BadInput {
        code: String,
        discount_code: Option<String>,
        reason: Option<String>,
        message: String,
    },

    /// The cart or a referenced entity does not exist.
    #[error("Not found: {detail}")]
    NotFound { detail: String },

    /// The presented version was stale and the command was not retried, or
    /// retries were exhausted.
    #[error("Version conflict (current version {current_version:?})")]
    Conflict { current_version: Option<u64> },

    /// The code was stored on the cart but does not apply to it.
    #[error("Discount code {code} rejected: {state}")]
    DiscountRejected {
        code: String,
        state: DiscountCodeState,
        /// Snapshot carrying the stored code.
        snapshot: Box<CartSnapshot>,
    },

    /// A snapshot mixed currencies.
    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: String, got: String },

    /// Success without payload, or a response nothing here recognises.
    #[error("Unknown failure: {detail}")]
    Unknown { detail: String },
}

impl MutationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MutationError::Network { .. } => ErrorKind::NetworkError,
            MutationError::BadInput { .. } => ErrorKind::BadInput,
            MutationError::NotFound { .. } => ErrorKind::NotFound,
            MutationError::Conflict { .. } => ErrorKind::Conflict,
            MutationError::DiscountRejected { .. } => ErrorKind::DiscountRejected,
            MutationError::CurrencyMismatch { .. } => ErrorKind::CurrencyMismatch,
            MutationError::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub(crate) fn unknown(detail: impl Into<String>) -> Self {
        MutationError::Unknown {
            detail: detail.into(),
        }
    }
}

impl From<CommerceError> for MutationError {
    fn from(e: CommerceError) -> Self {
        let message = e.to_string();
        match e {
            CommerceError::CurrencyMismatch { expected, got } => {
                MutationError::CurrencyMismatch { expected, got }
            }
            CommerceError::InvalidQuantity(_) => MutationError::BadInput {
                code: "InvalidQuantity".to_string(),
                discount_code: None,
                reason: None,
                message,
            },
            CommerceError::InvalidContractReference(_) => MutationError::BadInput {
                code: "InvalidContractReference".to_string(),
                discount_code: None,
                reason: None,
                message,
            },
            CommerceError::Overflow | CommerceError::BatchQuantityMismatch { .. } => {
                MutationError::unknown(message)
            }
        }
    }
}

//! Auxiliary storage collaborator.

use crate::error::MutationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Auxiliary store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the value.
    #[error("Store rejected write ({code}): {message}")]
    Rejected { code: String, message: String },
}

impl From<StoreError> for MutationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(detail) => MutationError::Network { detail },
            StoreError::Rejected { code, message } => MutationError::BadInput {
                code,
                discount_code: None,
                reason: None,
                message,
            },
        }
    }
}

/// One keyed value written outside the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxRecord {
    pub container: String,
    pub key: String,
    pub value: serde_json::Value,
}

impl AuxRecord {
    pub fn new(
        container: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
            value,
        }
    }
}

/// Key-value storage written before cart mutations that depend on it.
#[async_trait]
pub trait AuxiliaryStore: Send + Sync {
    async fn write(
        &self,
        container: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError>;
}

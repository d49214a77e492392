//! Commerce error types.

use thiserror::Error;

/// Errors raised while deriving views from a cart snapshot or planning
/// line-item changes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommerceError {
    /// Two amounts that must share a currency do not.
    #[error("Currency mismatch: cart is priced in {expected}, found {got}")]
    CurrencyMismatch { expected: String, got: String },

    #[error("Minor-unit arithmetic overflowed")]
    Overflow,

    /// The batch breakdown of a line does not add up to its quantity.
    #[error("Batch quantities of line {line_item_id} sum to {got}, line quantity is {expected}")]
    BatchQuantityMismatch {
        line_item_id: String,
        expected: u32,
        got: u32,
    },

    /// Quantity outside what the ledger accepts.
    #[error("Quantity {0} is not allowed here")]
    InvalidQuantity(u32),

    /// Contract reference cannot produce a stable key.
    #[error("Invalid contract reference: {0}")]
    InvalidContractReference(String),
}

//! Response decoding at the transport boundary.
//!
//! Classification looks at error codes and structured fields only. Anything
//! not recognised decodes to `Unknown`.

use crate::error::MutationError;
use crate::transport::{ProtocolError, TransportError, TransportResponse};
use cartkit_commerce::cart::CartSnapshot;

pub const CONCURRENT_MODIFICATION: &str = "ConcurrentModification";
pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFound";
pub const REFERENCED_RESOURCE_NOT_FOUND: &str = "ReferencedResourceNotFound";
pub const DISCOUNT_CODE_NON_APPLICABLE: &str = "DiscountCodeNonApplicable";
pub const INVALID_OPERATION: &str = "InvalidOperation";
pub const INVALID_INPUT: &str = "InvalidInput";
pub const INVALID_FIELD: &str = "InvalidField";
pub const DUPLICATE_FIELD: &str = "DuplicateField";

const BAD_INPUT_CODES: &[&str] = &[
    DISCOUNT_CODE_NON_APPLICABLE,
    INVALID_OPERATION,
    INVALID_INPUT,
    INVALID_FIELD,
    DUPLICATE_FIELD,
];

/// Decode a response into the snapshot it carries.
///
/// The error half wins over any data sent alongside it.
pub fn decode(response: TransportResponse) -> Result<CartSnapshot, MutationError> {
    match response {
        TransportResponse {
            error: Some(error), ..
        } => Err(classify(error)),
        TransportResponse {
            data: Some(snapshot),
            error: None,
        } => Ok(snapshot),
        TransportResponse {
            data: None,
            error: None,
        } => Err(MutationError::unknown("response carried neither data nor error")),
    }
}

/// Map a transport error onto the taxonomy.
pub fn classify(error: TransportError) -> MutationError {
    match error {
        TransportError::Transport { reason } => MutationError::Network { detail: reason },
        TransportError::Protocol(errors) => classify_protocol(&errors),
    }
}

fn classify_protocol(errors: &[ProtocolError]) -> MutationError {
    // A conflict anywhere in the list decides the outcome.
    if let Some(conflict) = errors.iter().find(|e| e.code == CONCURRENT_MODIFICATION) {
        return MutationError::Conflict {
            current_version: conflict.fields.get("currentVersion").and_then(|v| v.as_u64()),
        };
    }

    let Some(first) = errors.first() else {
        return MutationError::unknown("protocol error list was empty");
    };

    match first.code.as_str() {
        RESOURCE_NOT_FOUND | REFERENCED_RESOURCE_NOT_FOUND => MutationError::NotFound {
            detail: first.message.clone(),
        },
        code if BAD_INPUT_CODES.contains(&code) => MutationError::BadInput {
            code: first.code.clone(),
            discount_code: first.field_str("discountCode").map(str::to_string),
            reason: first.field_str("reason").map(str::to_string),
            message: first.message.clone(),
        },
        other => MutationError::unknown(format!("unrecognised error code {}", other)),
    }
}

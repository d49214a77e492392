//! Transport collaborator.
//!
//! The platform is reached through a request/response protocol. Every
//! state-changing operation answers with the authoritative snapshot, or with a
//! transport failure, or with a list of structured protocol errors.

use async_trait::async_trait;
use cartkit_commerce::cart::{CartAction, CartDraft, CartSnapshot};
use cartkit_commerce::ids::CartId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One remote operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum Operation {
    CreateCart {
        draft: CartDraft,
    },
    /// Actions are applied atomically against `version`.
    UpdateCart {
        cart_id: CartId,
        version: u64,
        actions: Vec<CartAction>,
    },
    DeleteCart {
        cart_id: CartId,
        version: u64,
    },
    FetchCart {
        cart_id: CartId,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateCart { .. } => OperationKind::Create,
            Operation::UpdateCart { .. } => OperationKind::Update,
            Operation::DeleteCart { .. } => OperationKind::Delete,
            Operation::FetchCart { .. } => OperationKind::Fetch,
        }
    }

    /// Operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateCart { .. } => "createCart",
            Operation::UpdateCart { .. } => "updateCart",
            Operation::DeleteCart { .. } => "deleteCart",
            Operation::FetchCart { .. } => "cart",
        }
    }

    /// Cart the operation targets, if it already exists.
    pub fn cart_id(&self) -> Option<&CartId> {
        match self {
            Operation::CreateCart { .. } => None,
            Operation::UpdateCart { cart_id, .. }
            | Operation::DeleteCart { cart_id, .. }
            | Operation::FetchCart { cart_id } => Some(cart_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Fetch,
}

/// Raw answer of the platform.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransportResponse {
    #[serde(default)]
    pub data: Option<CartSnapshot>,
    #[serde(default)]
    pub error: Option<TransportError>,
}

impl TransportResponse {
    pub fn data(snapshot: CartSnapshot) -> Self {
        Self {
            data: Some(snapshot),
            error: None,
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(TransportError::Transport {
                reason: reason.into(),
            }),
        }
    }

    pub fn protocol(errors: Vec<ProtocolError>) -> Self {
        Self {
            data: None,
            error: Some(TransportError::Protocol(errors)),
        }
    }
}

/// Failure half of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportError {
    /// The request never produced an answer.
    Transport { reason: String },
    /// The platform answered and rejected the request.
    Protocol(Vec<ProtocolError>),
}

/// One structured rejection. Only `code` and `fields` are interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolError {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl ProtocolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

/// Executes operations against the platform.
#[async_trait]
pub trait CartTransport: Send + Sync {
    async fn execute(&self, operation: Operation) -> TransportResponse;
}

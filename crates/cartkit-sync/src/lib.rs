//! Mutation consistency for platform-hosted carts.
//!
//! [`CartOrchestrator`] submits one command per business action, presenting
//! the version of the latest snapshot. Every successful command returns an
//! [`EnrichedCart`]: the new snapshot with its discount summary and totals
//! rebuilt from scratch. Failures are classified at the transport boundary
//! into [`MutationError`].
//!
//! Collaborators are injected:
//!
//! - [`CartTransport`] executes operations against the platform
//! - [`AuxiliaryStore`] holds records written before dependent cart updates
//!
//! [`memory::InMemoryPlatform`] implements both in process memory.
//!
//! # Example
//!
//! ```rust,ignore
//! use cartkit_sync::{CartOrchestrator, SyncConfig};
//! use cartkit_sync::memory::InMemoryPlatform;
//!
//! let platform = Arc::new(InMemoryPlatform::new());
//! let orchestrator = CartOrchestrator::new(platform.clone(), platform, SyncConfig::default());
//!
//! let cart = orchestrator.create_cart(draft).await?;
//! let cart = orchestrator.add_line_item(&cart.snapshot, item, 2).await?;
//! println!("Subtotal: {}", cart.totals.subtotal.display());
//! ```

pub mod config;
pub mod decode;
pub mod error;
pub mod memory;
pub mod migration;
pub mod orchestrator;
pub mod shipping;
pub mod store;
pub mod transport;

pub use config::{Backoff, ConfigError, MigrationConfig, RetryConfig, SyncConfig};
pub use error::{ErrorKind, MutationError};
pub use migration::{
    DroppedCode, LineMismatch, MigrationCause, MigrationFailure, MigrationOutcome,
    MigrationReport, MigrationState,
};
pub use orchestrator::{CartCommand, CartOrchestrator, EnrichedCart, MutationOutcome};
pub use shipping::{LineShippingAssignment, ShippingPlan, ShippingSetup};
pub use store::{AuxRecord, AuxiliaryStore, StoreError};
pub use transport::{CartTransport, Operation, OperationKind, TransportResponse};

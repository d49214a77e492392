//! Cart reconciliation domain for carts hosted on an external commerce
//! platform.
//!
//! The platform owns the cart and returns an authoritative snapshot after
//! every command. This crate turns a snapshot into one trustworthy picture of
//! what was saved and on what:
//!
//! - **Normalization**: the three platform discount breakdowns (line batches,
//!   cart total, shipping) become one list of [`cart::DiscountContribution`]s
//! - **Aggregation**: subtotal and per-source discount totals in integer minor
//!   units, with a strict single-currency rule
//! - **Resolution**: spot and contract line identity, and the update actions a
//!   quantity change needs
//!
//! # Example
//!
//! ```rust,ignore
//! use cartkit_commerce::prelude::*;
//!
//! let summary = normalize(&snapshot);
//! let totals = aggregate(&snapshot, &summary)?;
//! println!("Subtotal: {}", totals.subtotal.display());
//! for c in summary.contributions() {
//!     println!("{}: -{}", c.display_name(), c.amount);
//! }
//! ```

pub mod cart;
pub mod error;
pub mod ids;
pub mod money;

pub use error::CommerceError;
pub use ids::*;
pub use money::{Currency, Money};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::CommerceError;
    pub use crate::ids::*;
    pub use crate::money::{Currency, Money};

    pub use crate::cart::{
        aggregate, normalize, CanonicalDiscountSummary, CartAction, CartDraft, CartSnapshot,
        CartTotals, ContractItem, ContractRef, DiscountCodeState, DiscountContribution,
        DiscountSource, LineItem, LineItemIdentity, LineItemRequest, LineItemResolver,
        OwnershipContext, QuantityChange, SpotItem,
    };
}

//! Cart snapshot model and the views derived from it.
//!
//! Contains the snapshot types, the canonical discount model, pricing
//! aggregation, update actions and line item resolution.

mod action;
mod address;
mod discount;
mod normalize;
mod pricing;
mod resolution;
mod snapshot;

pub use action::{CartAction, CartDraft, LineItemDraft, ShippingMethodDraft};
pub use address::Address;
pub use discount::{
    CanonicalDiscountSummary, CodeActivation, DiscountCodeState, DiscountContribution,
    DiscountScope, DiscountSource, UNNAMED_DISCOUNT,
};
pub use normalize::normalize;
pub use pricing::{aggregate, line_subtotal, CartTotals, LineSubtotal};
pub use resolution::{
    ContractItem, ContractRef, ItemKind, LineItemIdentity, LineItemRequest, LineItemResolver,
    QuantityChange, Resolution, SpotItem,
};
pub use snapshot::{
    CartSnapshot, CustomFields, DiscountCodeRef, DiscountDescriptor, DiscountOnTotal,
    DiscountedShippingPrice, IncludedDiscount, LineItem, OwnershipContext, PriceBatch, PriceMode,
    ShippingEntry, ShippingMethodKind, ShippingTarget, TaxMode,
};

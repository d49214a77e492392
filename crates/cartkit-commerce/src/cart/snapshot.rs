//! Cart snapshot as returned by the platform after every command.
//!
//! A snapshot is never edited locally. Each command yields a new snapshot that
//! supersedes the previous one; every derived view (discount summary, totals)
//! is rebuilt from scratch from the snapshot it belongs to.

use crate::cart::{Address, ContractRef, DiscountCodeState};
use crate::ids::{
    BusinessUnitKey, CartId, CustomerId, DiscountCodeId, DiscountId, LineItemId, ProductId,
    ShippingEntryId, StoreKey, VariantId,
};
use crate::money::{Currency, Money};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Custom fields as the platform stores them.
pub type CustomFields = BTreeMap<String, serde_json::Value>;

/// Who owns a cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct OwnershipContext {
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub anonymous_id: Option<String>,
    #[serde(default)]
    pub store: Option<StoreKey>,
    #[serde(default)]
    pub business_unit: Option<BusinessUnitKey>,
}

impl OwnershipContext {
    /// Ownership by a registered customer.
    pub fn customer(customer_id: CustomerId) -> Self {
        Self {
            customer_id: Some(customer_id),
            ..Self::default()
        }
    }

    /// Scope the ownership to a store.
    pub fn in_store(mut self, store: StoreKey) -> Self {
        self.store = Some(store);
        self
    }

    /// Scope the ownership to a business unit.
    pub fn in_business_unit(mut self, unit: BusinessUnitKey) -> Self {
        self.business_unit = Some(unit);
        self
    }
}

/// Tax calculation mode of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TaxMode {
    #[default]
    Platform,
    External,
    ExternalAmount,
    Disabled,
}

/// How the unit price of a line was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PriceMode {
    /// Price selected by the platform from the catalog.
    #[default]
    Platform,
    /// Price supplied by the caller when the line was added.
    External,
}

/// Name and key of a discount rule, when the platform expands it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DiscountDescriptor {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// One discount rule's share of a discounted price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncludedDiscount {
    pub discount_id: DiscountId,
    /// Absent when the platform did not expand the rule.
    #[serde(default)]
    pub descriptor: Option<DiscountDescriptor>,
    /// Amount taken off by this rule. For line batches this is the total for
    /// the whole batch.
    pub amount: Money,
}

/// A run of units of one line sharing the same discounted price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceBatch {
    pub quantity: u32,
    /// Unit price after this batch's discounts.
    pub effective_price: Money,
    #[serde(default)]
    pub included_discounts: Vec<IncludedDiscount>,
}

/// Per-unit assignment of a line to a shipping address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingTarget {
    pub address_key: String,
    pub quantity: u32,
    #[serde(default)]
    pub shipping_entry: Option<ShippingEntryId>,
}

/// A line item in a cart snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    pub id: LineItemId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    #[serde(default)]
    pub name: Option<String>,
    /// User-defined line key; contract lines always carry one.
    #[serde(default)]
    pub key: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default)]
    pub price_mode: PriceMode,
    /// Representative discounted unit price. Derived by the platform from the
    /// batches; never summed.
    #[serde(default)]
    pub discounted_price: Option<Money>,
    #[serde(default)]
    pub batches: Vec<PriceBatch>,
    #[serde(default)]
    pub shipping_targets: Vec<ShippingTarget>,
    #[serde(default)]
    pub contract: Option<ContractRef>,
    #[serde(default)]
    pub custom_fields: CustomFields,
}

/// A discount code applied to a cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscountCodeRef {
    pub id: DiscountCodeId,
    pub code: String,
    pub state: DiscountCodeState,
    /// Cart discounts this code activates.
    #[serde(default)]
    pub cart_discounts: Vec<DiscountId>,
}

/// Discount taken off the cart total.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscountOnTotal {
    pub discounted_amount: Money,
    #[serde(default)]
    pub included_discounts: Vec<IncludedDiscount>,
}

/// Whether a shipping method comes from the platform catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ShippingMethodKind {
    Catalog { method_id: String },
    Custom { rate: Money },
}

/// Discounted price of one shipping entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscountedShippingPrice {
    pub value: Money,
    #[serde(default)]
    pub included_discounts: Vec<IncludedDiscount>,
}

/// One shipping method selected on the cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingEntry {
    pub key: ShippingEntryId,
    pub name: String,
    pub method: ShippingMethodKind,
    pub price: Money,
    #[serde(default)]
    pub address_key: Option<String>,
    #[serde(default)]
    pub discounted_price: Option<DiscountedShippingPrice>,
}

/// Authoritative cart state at one version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartSnapshot {
    pub id: CartId,
    /// Platform-assigned version token.
    pub version: u64,
    pub currency: Currency,
    #[serde(default)]
    pub ownership: OwnershipContext,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub discount_codes: Vec<DiscountCodeRef>,
    #[serde(default)]
    pub discount_on_total: Option<DiscountOnTotal>,
    #[serde(default)]
    pub shipping: Vec<ShippingEntry>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub item_shipping_addresses: Vec<Address>,
    #[serde(default)]
    pub tax_mode: TaxMode,
    #[serde(default)]
    pub custom_fields: CustomFields,
}

impl CartSnapshot {
    /// An empty snapshot at version 1.
    pub fn empty(id: CartId, currency: Currency) -> Self {
        Self {
            id,
            version: 1,
            currency,
            ownership: OwnershipContext::default(),
            line_items: Vec::new(),
            discount_codes: Vec::new(),
            discount_on_total: None,
            shipping: Vec::new(),
            shipping_address: None,
            billing_address: None,
            item_shipping_addresses: Vec::new(),
            tax_mode: TaxMode::default(),
            custom_fields: CustomFields::new(),
        }
    }

    /// Get a line by ID.
    pub fn line(&self, id: &LineItemId) -> Option<&LineItem> {
        self.line_items.iter().find(|l| &l.id == id)
    }

    /// Get a line by its key.
    pub fn line_by_key(&self, key: &str) -> Option<&LineItem> {
        self.line_items
            .iter()
            .find(|l| l.key.as_deref() == Some(key))
    }

    /// Get an applied code by its text.
    pub fn discount_code(&self, code: &str) -> Option<&DiscountCodeRef> {
        self.discount_codes.iter().find(|c| c.code == code)
    }

    /// Get a shipping entry by key.
    pub fn shipping_entry(&self, key: &ShippingEntryId) -> Option<&ShippingEntry> {
        self.shipping.iter().find(|s| &s.key == key)
    }

    /// Total units across all lines.
    pub fn item_count(&self) -> u64 {
        self.line_items.iter().map(|l| u64::from(l.quantity)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.line_items.is_empty()
    }
}

//! Update actions sent to the platform.
//!
//! An update is a batch of actions applied atomically against one cart
//! version. The vocabulary mirrors the platform's update actions; encoding is
//! the transport's job.

use crate::cart::{
    Address, ContractRef, CustomFields, OwnershipContext, ShippingMethodKind, ShippingTarget,
    TaxMode,
};
use crate::ids::{DiscountCodeId, LineItemId, ProductId, ShippingEntryId, VariantId};
use crate::money::{Currency, Money};
use serde::{Deserialize, Serialize};

/// Everything needed to create a cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartDraft {
    pub currency: Currency,
    pub ownership: OwnershipContext,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub tax_mode: TaxMode,
    #[serde(default)]
    pub custom_fields: CustomFields,
}

impl CartDraft {
    pub fn new(currency: Currency, ownership: OwnershipContext) -> Self {
        Self {
            currency,
            ownership,
            shipping_address: None,
            billing_address: None,
            tax_mode: TaxMode::default(),
            custom_fields: CustomFields::new(),
        }
    }
}

/// A new line as the platform receives it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItemDraft {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
    /// Set for externally priced lines; catalog lines leave pricing to the
    /// platform.
    #[serde(default)]
    pub external_price: Option<Money>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub contract: Option<ContractRef>,
    #[serde(default)]
    pub custom_fields: CustomFields,
}

/// A shipping method to select on the cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingMethodDraft {
    pub key: ShippingEntryId,
    pub name: String,
    pub method: ShippingMethodKind,
    #[serde(default)]
    pub address_key: Option<String>,
}

/// One update action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum CartAction {
    AddLineItem(LineItemDraft),
    ChangeLineItemQuantity {
        line_item_id: LineItemId,
        quantity: u32,
    },
    RemoveLineItem {
        line_item_id: LineItemId,
    },
    /// An empty target list clears the assignment.
    SetLineItemShippingTargets {
        line_item_id: LineItemId,
        targets: Vec<ShippingTarget>,
    },
    AddDiscountCode {
        code: String,
    },
    RemoveDiscountCode {
        discount_code_id: DiscountCodeId,
    },
    SetShippingAddress {
        address: Option<Address>,
    },
    SetBillingAddress {
        address: Option<Address>,
    },
    /// Adds the address, or replaces the one with the same key.
    UpsertItemShippingAddress {
        address: Address,
    },
    AddShippingMethod(ShippingMethodDraft),
    RemoveShippingMethod {
        key: ShippingEntryId,
    },
    SetTaxMode {
        tax_mode: TaxMode,
    },
    /// `None` removes the field.
    SetCustomField {
        name: String,
        value: Option<serde_json::Value>,
    },
}

impl CartAction {
    /// Action name as the platform spells it.
    pub fn name(&self) -> &'static str {
        match self {
            CartAction::AddLineItem(_) => "addLineItem",
            CartAction::ChangeLineItemQuantity { .. } => "changeLineItemQuantity",
            CartAction::RemoveLineItem { .. } => "removeLineItem",
            CartAction::SetLineItemShippingTargets { .. } => "setLineItemShippingTargets",
            CartAction::AddDiscountCode { .. } => "addDiscountCode",
            CartAction::RemoveDiscountCode { .. } => "removeDiscountCode",
            CartAction::SetShippingAddress { .. } => "setShippingAddress",
            CartAction::SetBillingAddress { .. } => "setBillingAddress",
            CartAction::UpsertItemShippingAddress { .. } => "upsertItemShippingAddress",
            CartAction::AddShippingMethod(_) => "addShippingMethod",
            CartAction::RemoveShippingMethod { .. } => "removeShippingMethod",
            CartAction::SetTaxMode { .. } => "setTaxMode",
            CartAction::SetCustomField { .. } => "setCustomField",
        }
    }
}

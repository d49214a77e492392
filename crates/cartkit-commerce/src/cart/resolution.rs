//! Line item resolution.
//!
//! Decides, per item kind, whether a quantity change updates an existing line
//! or adds a new one, and which actions the update batch needs for it.
//!
//! - **Spot** items are catalog priced and identified by product and variant.
//!   The platform merges repeated adds itself, so resolution only has to clear
//!   stale shipping targets on the matched line first.
//! - **Contract** items are externally priced and identified by a key derived
//!   from the contract reference. Resolution looks the key up in the snapshot.

use crate::cart::{CartAction, CartSnapshot, CustomFields, LineItem, LineItemDraft, PriceMode};
use crate::error::CommerceError;
use crate::ids::{LineItemId, ProductId, VariantId};
use crate::money::Money;
use serde::{Deserialize, Serialize};

/// Identity strategy of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Spot,
    Contract,
}

/// How a line is recognised across snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LineItemIdentity {
    Spot {
        product_id: ProductId,
        variant_id: VariantId,
    },
    Contract {
        key: String,
    },
}

impl LineItemIdentity {
    /// Identity of a line already in a snapshot.
    pub fn of(line: &LineItem) -> Self {
        match (&line.contract, &line.key) {
            (Some(contract), _) => Self::Contract {
                key: contract.key(),
            },
            (None, Some(key)) if line.price_mode == PriceMode::External => {
                Self::Contract { key: key.clone() }
            }
            _ => Self::Spot {
                product_id: line.product_id.clone(),
                variant_id: line.variant_id.clone(),
            },
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Spot { .. } => ItemKind::Spot,
            Self::Contract { .. } => ItemKind::Contract,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Spot { .. } => None,
            Self::Contract { key } => Some(key),
        }
    }
}

impl std::fmt::Display for LineItemIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spot {
                product_id,
                variant_id,
            } => write!(f, "spot:{}/{}", product_id, variant_id),
            Self::Contract { key } => write!(f, "contract:{}", key),
        }
    }
}

/// Reference to one line of an external contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractRef {
    pub year: u16,
    pub number: String,
    pub line_number: u32,
    #[serde(default)]
    pub suffix: Option<String>,
}

impl ContractRef {
    /// Validated contract reference.
    ///
    /// `number` and `suffix` become key segments, so they may not be empty or
    /// contain the `-` separator.
    pub fn new(
        year: u16,
        number: impl Into<String>,
        line_number: u32,
        suffix: Option<String>,
    ) -> Result<Self, CommerceError> {
        let number = number.into();
        validate_segment("contract number", &number)?;
        if let Some(suffix) = &suffix {
            validate_segment("suffix", suffix)?;
        }
        Ok(Self {
            year,
            number,
            line_number,
            suffix,
        })
    }

    /// Deterministic line key, e.g. `2024-C1001-3` or `2024-C1001-3-B`.
    pub fn key(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!(
                "{}-{}-{}-{}",
                self.year, self.number, self.line_number, suffix
            ),
            None => format!("{}-{}-{}", self.year, self.number, self.line_number),
        }
    }
}

fn validate_segment(field: &str, value: &str) -> Result<(), CommerceError> {
    if value.is_empty() || value.contains('-') {
        return Err(CommerceError::InvalidContractReference(format!(
            "{} {:?} must be non-empty and free of '-'",
            field, value
        )));
    }
    Ok(())
}

/// Requested change to a line's quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantityChange {
    /// Add units, creating the line if needed.
    Increase(u32),
    /// Set the line to an absolute quantity; zero removes it.
    SetTo(u32),
}

/// Actions a resolver contributes to one update batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    /// Existing line the change targets, if any.
    pub target: Option<LineItemId>,
    pub actions: Vec<CartAction>,
}

impl Resolution {
    /// Nothing to send.
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Resolves a quantity change into update actions against a snapshot.
pub trait LineItemResolver {
    fn identity(&self) -> LineItemIdentity;

    fn resolve(
        &self,
        snapshot: &CartSnapshot,
        change: QuantityChange,
    ) -> Result<Resolution, CommerceError>;

    /// The snapshot line this item resolves to.
    fn find<'a>(&self, snapshot: &'a CartSnapshot) -> Option<&'a LineItem> {
        let identity = self.identity();
        snapshot
            .line_items
            .iter()
            .find(|line| LineItemIdentity::of(line) == identity)
    }
}

/// A catalog-priced item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    #[serde(default)]
    pub custom_fields: CustomFields,
}

impl SpotItem {
    pub fn new(product_id: ProductId, variant_id: VariantId) -> Self {
        Self {
            product_id,
            variant_id,
            custom_fields: CustomFields::new(),
        }
    }

    pub fn with_custom_fields(mut self, custom_fields: CustomFields) -> Self {
        self.custom_fields = custom_fields;
        self
    }

    fn draft(&self, quantity: u32) -> LineItemDraft {
        LineItemDraft {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
            quantity,
            external_price: None,
            key: None,
            contract: None,
            custom_fields: self.custom_fields.clone(),
        }
    }
}

impl LineItemResolver for SpotItem {
    fn identity(&self) -> LineItemIdentity {
        LineItemIdentity::Spot {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
        }
    }

    fn resolve(
        &self,
        snapshot: &CartSnapshot,
        change: QuantityChange,
    ) -> Result<Resolution, CommerceError> {
        let matched = self.find(snapshot);
        let mut actions = Vec::new();

        // Quantity changes desynchronize per-unit targets; reset them in the
        // same batch.
        if let Some(line) = matched.filter(|l| !l.shipping_targets.is_empty()) {
            actions.push(CartAction::SetLineItemShippingTargets {
                line_item_id: line.id.clone(),
                targets: Vec::new(),
            });
        }

        match (change, matched) {
            (QuantityChange::Increase(0), _) => return Err(CommerceError::InvalidQuantity(0)),
            (QuantityChange::Increase(n), _) => {
                actions.push(CartAction::AddLineItem(self.draft(n)))
            }
            (QuantityChange::SetTo(n), Some(line)) => {
                actions.push(CartAction::ChangeLineItemQuantity {
                    line_item_id: line.id.clone(),
                    quantity: n,
                })
            }
            (QuantityChange::SetTo(0), None) => {}
            (QuantityChange::SetTo(n), None) => {
                actions.push(CartAction::AddLineItem(self.draft(n)))
            }
        }

        Ok(Resolution {
            target: matched.map(|l| l.id.clone()),
            actions,
        })
    }
}

/// An externally priced contract item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractItem {
    pub contract: ContractRef,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    /// Unit price agreed in the contract.
    pub unit_price: Money,
    #[serde(default)]
    pub custom_fields: CustomFields,
}

impl ContractItem {
    pub fn new(
        contract: ContractRef,
        product_id: ProductId,
        variant_id: VariantId,
        unit_price: Money,
    ) -> Self {
        Self {
            contract,
            product_id,
            variant_id,
            unit_price,
            custom_fields: CustomFields::new(),
        }
    }

    pub fn with_custom_fields(mut self, custom_fields: CustomFields) -> Self {
        self.custom_fields = custom_fields;
        self
    }

    fn draft(&self, quantity: u32) -> LineItemDraft {
        LineItemDraft {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
            quantity,
            external_price: Some(self.unit_price),
            key: Some(self.contract.key()),
            contract: Some(self.contract.clone()),
            custom_fields: self.custom_fields.clone(),
        }
    }
}

impl LineItemResolver for ContractItem {
    fn identity(&self) -> LineItemIdentity {
        LineItemIdentity::Contract {
            key: self.contract.key(),
        }
    }

    fn find<'a>(&self, snapshot: &'a CartSnapshot) -> Option<&'a LineItem> {
        snapshot.line_by_key(&self.contract.key())
    }

    fn resolve(
        &self,
        snapshot: &CartSnapshot,
        change: QuantityChange,
    ) -> Result<Resolution, CommerceError> {
        let matched = self.find(snapshot);

        let action = match (change, matched) {
            (QuantityChange::Increase(0), _) => return Err(CommerceError::InvalidQuantity(0)),
            (QuantityChange::Increase(n), Some(line)) => Some(CartAction::ChangeLineItemQuantity {
                line_item_id: line.id.clone(),
                quantity: line.quantity.checked_add(n).ok_or(CommerceError::Overflow)?,
            }),
            (QuantityChange::SetTo(n), Some(line)) => Some(CartAction::ChangeLineItemQuantity {
                line_item_id: line.id.clone(),
                quantity: n,
            }),
            (QuantityChange::SetTo(0), None) => None,
            (QuantityChange::Increase(n) | QuantityChange::SetTo(n), None) => {
                Some(CartAction::AddLineItem(self.draft(n)))
            }
        };

        Ok(Resolution {
            target: matched.map(|l| l.id.clone()),
            actions: action.into_iter().collect(),
        })
    }
}

/// Either kind of item, as commands carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineItemRequest {
    Spot(SpotItem),
    Contract(ContractItem),
}

impl LineItemRequest {
    /// Request that reproduces an existing line in another cart.
    pub fn from_line(line: &LineItem) -> Self {
        match &line.contract {
            Some(contract) => Self::Contract(ContractItem {
                contract: contract.clone(),
                product_id: line.product_id.clone(),
                variant_id: line.variant_id.clone(),
                unit_price: line.unit_price,
                custom_fields: line.custom_fields.clone(),
            }),
            None => Self::Spot(SpotItem {
                product_id: line.product_id.clone(),
                variant_id: line.variant_id.clone(),
                custom_fields: line.custom_fields.clone(),
            }),
        }
    }

    fn resolver(&self) -> &dyn LineItemResolver {
        match self {
            Self::Spot(item) => item,
            Self::Contract(item) => item,
        }
    }
}

impl LineItemResolver for LineItemRequest {
    fn identity(&self) -> LineItemIdentity {
        self.resolver().identity()
    }

    fn find<'a>(&self, snapshot: &'a CartSnapshot) -> Option<&'a LineItem> {
        self.resolver().find(snapshot)
    }

    fn resolve(
        &self,
        snapshot: &CartSnapshot,
        change: QuantityChange,
    ) -> Result<Resolution, CommerceError> {
        self.resolver().resolve(snapshot, change)
    }
}

impl From<SpotItem> for LineItemRequest {
    fn from(item: SpotItem) -> Self {
        Self::Spot(item)
    }
}

impl From<ContractItem> for LineItemRequest {
    fn from(item: ContractItem) -> Self {
        Self::Contract(item)
    }
}

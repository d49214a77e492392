//! Shipping-setup procedure.
//!
//! Setting up shipping touches two systems: an auxiliary record (delivery
//! instructions, scheduling) and the cart. The record is written first; the
//! cart part is one update batch in a fixed order:
//!
//! 1. shipping address and item address upserts
//! 2. removal of stale shipping methods
//! 3. addition of new shipping methods
//! 4. per-line shipping targets
//! 5. custom fields
//!
//! Catalog and custom methods go through the same diff.

use crate::error::MutationError;
use crate::orchestrator::{custom_field_actions, CartCommand, CartOrchestrator, MutationOutcome};
use crate::store::{AuxRecord, AuxiliaryStore};
use crate::transport::CartTransport;
use cartkit_commerce::cart::{
    Address, CartAction, CartSnapshot, CustomFields, ShippingEntry, ShippingMethodDraft,
    ShippingTarget,
};
use cartkit_commerce::ids::{LineItemId, ShippingEntryId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Per-unit shipping assignment of one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineShippingAssignment {
    pub line_item_id: LineItemId,
    pub targets: Vec<ShippingTarget>,
}

/// Desired shipping state of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingPlan {
    /// Left unchanged when `None`.
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub item_addresses: Vec<Address>,
    /// Complete set of methods the cart should end up with.
    #[serde(default)]
    pub methods: Vec<ShippingMethodDraft>,
    #[serde(default)]
    pub assignments: Vec<LineShippingAssignment>,
    #[serde(default)]
    pub custom_fields: CustomFields,
}

impl ShippingPlan {
    /// Ordered actions bringing `snapshot` to this plan.
    pub fn actions(&self, snapshot: &CartSnapshot) -> Vec<CartAction> {
        let mut actions = Vec::new();

        if let Some(address) = &self.shipping_address {
            actions.push(CartAction::SetShippingAddress {
                address: Some(address.clone()),
            });
        }
        actions.extend(
            self.item_addresses
                .iter()
                .map(|address| CartAction::UpsertItemShippingAddress {
                    address: address.clone(),
                }),
        );

        actions.extend(diff_shipping_methods(&snapshot.shipping, &self.methods).into_actions());

        actions.extend(self.assignments.iter().map(|assignment| {
            CartAction::SetLineItemShippingTargets {
                line_item_id: assignment.line_item_id.clone(),
                targets: assignment.targets.clone(),
            }
        }));

        actions.extend(custom_field_actions(&self.custom_fields));
        actions
    }
}

/// Method changes between the cart and a desired set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShippingDiff {
    pub remove: Vec<ShippingEntryId>,
    pub add: Vec<ShippingMethodDraft>,
}

impl ShippingDiff {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }

    /// Removals first, then additions.
    pub fn into_actions(self) -> Vec<CartAction> {
        self.remove
            .into_iter()
            .map(|key| CartAction::RemoveShippingMethod { key })
            .chain(self.add.into_iter().map(CartAction::AddShippingMethod))
            .collect()
    }
}

/// Diff the cart's shipping entries against the desired methods.
///
/// An entry is stale when its key is no longer wanted or its definition
/// changed; a changed entry is removed and added again.
pub fn diff_shipping_methods(
    existing: &[ShippingEntry],
    desired: &[ShippingMethodDraft],
) -> ShippingDiff {
    let unchanged = |draft: &ShippingMethodDraft| {
        existing.iter().any(|entry| {
            entry.key == draft.key
                && entry.name == draft.name
                && entry.method == draft.method
                && entry.address_key == draft.address_key
        })
    };

    let remove = existing
        .iter()
        .filter(|entry| {
            !desired
                .iter()
                .any(|draft| draft.key == entry.key && unchanged(draft))
        })
        .map(|entry| entry.key.clone())
        .collect();

    let add = desired
        .iter()
        .filter(|draft| !unchanged(draft))
        .cloned()
        .collect();

    ShippingDiff { remove, add }
}

/// Everything one shipping setup writes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShippingSetup {
    pub record: Option<AuxRecord>,
    pub plan: ShippingPlan,
}

impl<T: CartTransport, S: AuxiliaryStore> CartOrchestrator<T, S> {
    /// Run the shipping-setup procedure.
    ///
    /// The auxiliary record is written before the cart update. Because of that
    /// side effect a version conflict on the update is returned as `Conflict`,
    /// never retried.
    pub async fn setup_shipping(
        &self,
        current: &CartSnapshot,
        setup: ShippingSetup,
    ) -> MutationOutcome {
        if let Some(record) = setup.record {
            self.store()
                .write(&record.container, &record.key, record.value)
                .await
                .map_err(|e| {
                    warn!(
                        cart_id = %current.id,
                        container = %record.container,
                        error = %e,
                        "Auxiliary write failed, cart left unchanged"
                    );
                    MutationError::from(e)
                })?;
            info!(
                cart_id = %current.id,
                container = %record.container,
                key = %record.key,
                "Auxiliary shipping record written"
            );
        }

        self.apply(current, CartCommand::ConfigureShipping(setup.plan))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartkit_commerce::cart::ShippingMethodKind;
    use cartkit_commerce::ids::CartId;
    use cartkit_commerce::money::{Currency, Money};
    use serde_json::json;

    fn usd(amount: i64) -> Money {
        Money::new(amount, Currency::USD)
    }

    fn entry(key: &str, method: ShippingMethodKind) -> ShippingEntry {
        ShippingEntry {
            key: ShippingEntryId::new(key),
            name: key.to_string(),
            price: usd(500),
            method,
            address_key: None,
            discounted_price: None,
        }
    }

    fn draft(key: &str, method: ShippingMethodKind) -> ShippingMethodDraft {
        ShippingMethodDraft {
            key: ShippingEntryId::new(key),
            name: key.to_string(),
            method,
            address_key: None,
        }
    }

    fn catalog(id: &str) -> ShippingMethodKind {
        ShippingMethodKind::Catalog {
            method_id: id.to_string(),
        }
    }

    #[test]
    fn test_diff_keeps_unchanged_and_replaces_changed() {
        let existing = vec![
            entry("standard", catalog("sm-1")),
            entry("freight", ShippingMethodKind::Custom { rate: usd(2500) }),
            entry("express", catalog("sm-2")),
        ];
        let desired = vec![
            draft("standard", catalog("sm-1")),
            draft("freight", ShippingMethodKind::Custom { rate: usd(3000) }),
            draft("pickup", catalog("sm-3")),
        ];

        let diff = diff_shipping_methods(&existing, &desired);
        assert_eq!(
            diff.remove,
            vec![ShippingEntryId::new("freight"), ShippingEntryId::new("express")]
        );
        let added: Vec<_> = diff.add.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(added, vec!["freight", "pickup"]);
    }

    #[test]
    fn test_diff_of_identical_sets_is_empty() {
        let existing = vec![entry("standard", catalog("sm-1"))];
        let desired = vec![draft("standard", catalog("sm-1"))];
        assert!(diff_shipping_methods(&existing, &desired).is_empty());
    }

    #[test]
    fn test_plan_orders_actions() {
        let mut cart = CartSnapshot::empty(CartId::new("cart-1"), Currency::USD);
        cart.shipping.push(entry("express", catalog("sm-2")));

        let mut custom_fields = CustomFields::new();
        custom_fields.insert("deliveryWindow".to_string(), json!("AM"));

        let plan = ShippingPlan {
            shipping_address: Some(Address::new("US").with_key("home")),
            item_addresses: vec![Address::new("US").with_key("office")],
            methods: vec![draft("standard", catalog("sm-1"))],
            assignments: vec![LineShippingAssignment {
                line_item_id: LineItemId::new("li-1"),
                targets: vec![ShippingTarget {
                    address_key: "office".to_string(),
                    quantity: 1,
                    shipping_entry: Some(ShippingEntryId::new("standard")),
                }],
            }],
            custom_fields,
        };

        let names: Vec<_> = plan.actions(&cart).iter().map(CartAction::name).collect();
        assert_eq!(
            names,
            vec![
                "setShippingAddress",
                "upsertItemShippingAddress",
                "removeShippingMethod",
                "addShippingMethod",
                "setLineItemShippingTargets",
                "setCustomField",
            ]
        );
    }
}

//! Cart mutation orchestrator.
//!
//! Every command is planned against the latest snapshot, sent together with
//! that snapshot's version, and answered by a new snapshot from which the
//! discount summary and totals are rebuilt. A stale version is retried only
//! for additive commands, by re-fetching and re-planning.

use crate::config::SyncConfig;
use crate::decode::decode;
use crate::error::MutationError;
use crate::shipping::{diff_shipping_methods, ShippingPlan};
use crate::store::AuxiliaryStore;
use crate::transport::{CartTransport, Operation};
use cartkit_commerce::cart::{
    aggregate, normalize, Address, CanonicalDiscountSummary, CartAction, CartDraft, CartSnapshot,
    CartTotals, CustomFields, LineItemRequest, LineItemResolver, QuantityChange,
    ShippingMethodDraft, TaxMode,
};
use cartkit_commerce::ids::{CartId, LineItemId};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of one command.
pub type MutationOutcome = Result<EnrichedCart, MutationError>;

/// A snapshot with the views derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedCart {
    pub snapshot: CartSnapshot,
    pub discounts: CanonicalDiscountSummary,
    pub totals: CartTotals,
}

impl EnrichedCart {
    /// Rebuild summary and totals from scratch.
    pub fn from_snapshot(snapshot: CartSnapshot) -> Result<Self, MutationError> {
        let discounts = normalize(&snapshot);
        let totals = aggregate(&snapshot, &discounts)?;
        Ok(Self {
            snapshot,
            discounts,
            totals,
        })
    }

    pub fn id(&self) -> &CartId {
        &self.snapshot.id
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version
    }
}

/// One business action against an existing cart.
#[derive(Debug, Clone, PartialEq)]
pub enum CartCommand {
    /// Add units of an item, merging into its line if present.
    AddLineItem {
        item: LineItemRequest,
        quantity: u32,
    },
    /// Set an item's quantity; zero removes the line.
    ChangeQuantity {
        item: LineItemRequest,
        quantity: u32,
    },
    RemoveLineItem {
        line_item_id: LineItemId,
    },
    ApplyDiscountCode {
        code: String,
    },
    /// Removing a code that is not on the cart does nothing.
    RemoveDiscountCode {
        code: String,
    },
    /// Replace the selected shipping methods with `methods`.
    SetShippingMethods {
        methods: Vec<ShippingMethodDraft>,
    },
    SetAddresses {
        shipping: Option<Address>,
        billing: Option<Address>,
        item_addresses: Vec<Address>,
    },
    SetTaxMode {
        tax_mode: TaxMode,
    },
    /// A `null` value removes the field.
    SetCustomFields {
        fields: CustomFields,
    },
    /// Cart half of the shipping-setup procedure.
    ConfigureShipping(ShippingPlan),
}

impl CartCommand {
    pub fn name(&self) -> &'static str {
        match self {
            CartCommand::AddLineItem { .. } => "add_line_item",
            CartCommand::ChangeQuantity { .. } => "change_quantity",
            CartCommand::RemoveLineItem { .. } => "remove_line_item",
            CartCommand::ApplyDiscountCode { .. } => "apply_discount_code",
            CartCommand::RemoveDiscountCode { .. } => "remove_discount_code",
            CartCommand::SetShippingMethods { .. } => "set_shipping_methods",
            CartCommand::SetAddresses { .. } => "set_addresses",
            CartCommand::SetTaxMode { .. } => "set_tax_mode",
            CartCommand::SetCustomFields { .. } => "set_custom_fields",
            CartCommand::ConfigureShipping(_) => "configure_shipping",
        }
    }

    /// Whether the command may be re-planned and resent after a conflict.
    ///
    /// Only purely additive intents qualify: re-planned against a fresh
    /// snapshot they still mean the same thing.
    pub fn is_reapplicable(&self) -> bool {
        matches!(
            self,
            CartCommand::AddLineItem { .. } | CartCommand::ApplyDiscountCode { .. }
        )
    }

    /// Actions implementing the command against `snapshot`. Empty means there
    /// is nothing to send.
    pub fn plan(&self, snapshot: &CartSnapshot) -> Result<Vec<CartAction>, MutationError> {
        let actions = match self {
            CartCommand::AddLineItem { item, quantity } => {
                item.resolve(snapshot, QuantityChange::Increase(*quantity))?
                    .actions
            }
            CartCommand::ChangeQuantity { item, quantity } => {
                item.resolve(snapshot, QuantityChange::SetTo(*quantity))?
                    .actions
            }
            CartCommand::RemoveLineItem { line_item_id } => vec![CartAction::RemoveLineItem {
                line_item_id: line_item_id.clone(),
            }],
            // Already on the cart, possibly from a racing writer: only the
            // state check remains.
            CartCommand::ApplyDiscountCode { code } if snapshot.discount_code(code).is_some() => {
                Vec::new()
            }
            CartCommand::ApplyDiscountCode { code } => {
                vec![CartAction::AddDiscountCode { code: code.clone() }]
            }
            CartCommand::RemoveDiscountCode { code } => snapshot
                .discount_code(code)
                .map(|applied| CartAction::RemoveDiscountCode {
                    discount_code_id: applied.id.clone(),
                })
                .into_iter()
                .collect(),
            CartCommand::SetShippingMethods { methods } => {
                diff_shipping_methods(&snapshot.shipping, methods).into_actions()
            }
            CartCommand::SetAddresses {
                shipping,
                billing,
                item_addresses,
            } => {
                let mut actions = vec![
                    CartAction::SetShippingAddress {
                        address: shipping.clone(),
                    },
                    CartAction::SetBillingAddress {
                        address: billing.clone(),
                    },
                ];
                actions.extend(item_addresses.iter().map(|address| {
                    CartAction::UpsertItemShippingAddress {
                        address: address.clone(),
                    }
                }));
                actions
            }
            CartCommand::SetTaxMode { tax_mode } if *tax_mode == snapshot.tax_mode => Vec::new(),
            CartCommand::SetTaxMode { tax_mode } => vec![CartAction::SetTaxMode {
                tax_mode: *tax_mode,
            }],
            CartCommand::SetCustomFields { fields } => custom_field_actions(fields),
            CartCommand::ConfigureShipping(plan) => plan.actions(snapshot),
        };
        Ok(actions)
    }

    /// Post-check on the cart a command left behind.
    ///
    /// A matching code must also account for at least one contribution,
    /// either attributed to it or from a rule in its activation list.
    fn verify(&self, cart: EnrichedCart) -> MutationOutcome {
        let CartCommand::ApplyDiscountCode { code } = self else {
            return Ok(cart);
        };

        let Some(applied) = cart.snapshot.discount_code(code) else {
            return Err(MutationError::unknown(format!(
                "discount code {} missing from the updated cart",
                code
            )));
        };

        if applied.state.is_matching() {
            let contributes = cart.discounts.contributions().iter().any(|c| {
                c.activated_by.as_ref().map(|a| a.code.as_str()) == Some(code.as_str())
                    || applied.cart_discounts.contains(&c.discount_id)
            });
            if contributes {
                return Ok(cart);
            }
            return Err(MutationError::unknown(format!(
                "discount code {} matches but contributes no discount",
                code
            )));
        }

        let state = applied.state.clone();
        info!(
            cart_id = %cart.snapshot.id,
            code = %code,
            state = %state,
            "Discount code stored but not applied"
        );
        Err(MutationError::DiscountRejected {
            code: code.clone(),
            state,
            snapshot: Box::new(cart.snapshot),
        })
    }
}

pub(crate) fn custom_field_actions(fields: &CustomFields) -> Vec<CartAction> {
    fields
        .iter()
        .map(|(name, value)| CartAction::SetCustomField {
            name: name.clone(),
            value: (!value.is_null()).then(|| value.clone()),
        })
        .collect()
}

/// Submits commands for platform-hosted carts.
pub struct CartOrchestrator<T, S> {
    transport: Arc<T>,
    store: Arc<S>,
    config: SyncConfig,
}

impl<T: CartTransport, S: AuxiliaryStore> CartOrchestrator<T, S> {
    pub fn new(transport: Arc<T>, store: Arc<S>, config: SyncConfig) -> Self {
        Self {
            transport,
            store,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    /// Execute one operation and decode its response.
    async fn call(&self, operation: Operation) -> Result<CartSnapshot, MutationError> {
        debug!(
            operation = operation.name(),
            cart_id = ?operation.cart_id(),
            "Executing platform operation"
        );
        decode(self.transport.execute(operation).await)
    }

    pub async fn create_cart(&self, draft: CartDraft) -> MutationOutcome {
        let snapshot = self.call(Operation::CreateCart { draft }).await?;
        info!(cart_id = %snapshot.id, version = snapshot.version, "Cart created");
        EnrichedCart::from_snapshot(snapshot)
    }

    pub async fn fetch(&self, cart_id: &CartId) -> MutationOutcome {
        EnrichedCart::from_snapshot(self.fetch_snapshot(cart_id).await?)
    }

    async fn fetch_snapshot(&self, cart_id: &CartId) -> Result<CartSnapshot, MutationError> {
        self.call(Operation::FetchCart {
            cart_id: cart_id.clone(),
        })
        .await
    }

    /// Submit a command against the latest known snapshot.
    pub async fn apply(&self, current: &CartSnapshot, command: CartCommand) -> MutationOutcome {
        let mut snapshot = current.clone();
        let mut attempt = 0;

        loop {
            let actions = command.plan(&snapshot)?;
            if actions.is_empty() {
                debug!(cart_id = %snapshot.id, command = command.name(), "Nothing to send");
                return command.verify(EnrichedCart::from_snapshot(snapshot)?);
            }

            let result = self
                .call(Operation::UpdateCart {
                    cart_id: snapshot.id.clone(),
                    version: snapshot.version,
                    actions,
                })
                .await;

            match result {
                Ok(updated) => return command.verify(EnrichedCart::from_snapshot(updated)?),
                Err(err)
                    if err.is_conflict()
                        && command.is_reapplicable()
                        && self.config.retry.allows_retry(attempt) =>
                {
                    let delay = self.config.retry.backoff.delay_for_attempt(attempt);
                    attempt += 1;
                    info!(
                        cart_id = %snapshot.id,
                        command = command.name(),
                        stale_version = snapshot.version,
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        "Version conflict, re-fetching before retry"
                    );
                    tokio::time::sleep(delay).await;
                    snapshot = self.fetch_snapshot(&snapshot.id).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn add_line_item(
        &self,
        current: &CartSnapshot,
        item: impl Into<LineItemRequest>,
        quantity: u32,
    ) -> MutationOutcome {
        let command = CartCommand::AddLineItem {
            item: item.into(),
            quantity,
        };
        self.apply(current, command).await
    }

    pub async fn change_quantity(
        &self,
        current: &CartSnapshot,
        item: impl Into<LineItemRequest>,
        quantity: u32,
    ) -> MutationOutcome {
        let command = CartCommand::ChangeQuantity {
            item: item.into(),
            quantity,
        };
        self.apply(current, command).await
    }

    pub async fn remove_line_item(
        &self,
        current: &CartSnapshot,
        line_item_id: &LineItemId,
    ) -> MutationOutcome {
        let command = CartCommand::RemoveLineItem {
            line_item_id: line_item_id.clone(),
        };
        self.apply(current, command).await
    }

    /// Apply a code. A code the platform stores without applying fails with
    /// `DiscountRejected`, which carries the updated snapshot.
    pub async fn apply_discount_code(&self, current: &CartSnapshot, code: &str) -> MutationOutcome {
        let command = CartCommand::ApplyDiscountCode {
            code: code.to_string(),
        };
        self.apply(current, command).await
    }

    pub async fn remove_discount_code(
        &self,
        current: &CartSnapshot,
        code: &str,
    ) -> MutationOutcome {
        let command = CartCommand::RemoveDiscountCode {
            code: code.to_string(),
        };
        self.apply(current, command).await
    }

    pub async fn set_shipping_methods(
        &self,
        current: &CartSnapshot,
        methods: Vec<ShippingMethodDraft>,
    ) -> MutationOutcome {
        self.apply(current, CartCommand::SetShippingMethods { methods })
            .await
    }

    pub async fn set_addresses(
        &self,
        current: &CartSnapshot,
        shipping: Option<Address>,
        billing: Option<Address>,
        item_addresses: Vec<Address>,
    ) -> MutationOutcome {
        let command = CartCommand::SetAddresses {
            shipping,
            billing,
            item_addresses,
        };
        self.apply(current, command).await
    }

    pub async fn set_tax_mode(&self, current: &CartSnapshot, tax_mode: TaxMode) -> MutationOutcome {
        self.apply(current, CartCommand::SetTaxMode { tax_mode }).await
    }

    pub async fn set_custom_fields(
        &self,
        current: &CartSnapshot,
        fields: CustomFields,
    ) -> MutationOutcome {
        self.apply(current, CartCommand::SetCustomFields { fields })
            .await
    }

    /// Delete the cart at the version of `current`. Never retried.
    pub async fn delete_cart(&self, current: &CartSnapshot) -> Result<(), MutationError> {
        self.call(Operation::DeleteCart {
            cart_id: current.id.clone(),
            version: current.version,
        })
        .await?;
        info!(cart_id = %current.id, version = current.version, "Cart deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartkit_commerce::cart::{
        ContractItem, ContractRef, DiscountCodeRef, DiscountCodeState, SpotItem,
    };
    use cartkit_commerce::ids::{DiscountCodeId, ProductId, VariantId};
    use cartkit_commerce::money::{Currency, Money};
    use serde_json::json;

    fn cart() -> CartSnapshot {
        CartSnapshot::empty(CartId::new("cart-1"), Currency::USD)
    }

    #[test]
    fn test_only_additive_commands_are_reapplicable() {
        let spot = SpotItem::new(ProductId::new("p-1"), VariantId::new("1"));
        assert!(CartCommand::AddLineItem {
            item: spot.clone().into(),
            quantity: 1
        }
        .is_reapplicable());
        assert!(CartCommand::ApplyDiscountCode {
            code: "SUMMER20".to_string()
        }
        .is_reapplicable());

        assert!(!CartCommand::ChangeQuantity {
            item: spot.into(),
            quantity: 1
        }
        .is_reapplicable());
        assert!(!CartCommand::RemoveDiscountCode {
            code: "SUMMER20".to_string()
        }
        .is_reapplicable());
        assert!(!CartCommand::ConfigureShipping(ShippingPlan::default()).is_reapplicable());
        assert!(!CartCommand::SetTaxMode {
            tax_mode: TaxMode::External
        }
        .is_reapplicable());
    }

    #[test]
    fn test_plan_contract_add() {
        let item = ContractItem::new(
            ContractRef::new(2024, "C1001", 3, None).unwrap(),
            ProductId::new("p-9"),
            VariantId::new("1"),
            Money::new(4200, Currency::USD),
        );
        let actions = CartCommand::AddLineItem {
            item: item.into(),
            quantity: 2,
        }
        .plan(&cart())
        .unwrap();

        match &actions[..] {
            [CartAction::AddLineItem(draft)] => {
                assert_eq!(draft.key.as_deref(), Some("2024-C1001-3"));
                assert_eq!(draft.external_price, Some(Money::new(4200, Currency::USD)));
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_plan_zero_add_is_bad_input() {
        let spot = SpotItem::new(ProductId::new("p-1"), VariantId::new("1"));
        let err = CartCommand::AddLineItem {
            item: spot.into(),
            quantity: 0,
        }
        .plan(&cart())
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadInput);
    }

    #[test]
    fn test_plan_noops() {
        assert!(CartCommand::SetTaxMode {
            tax_mode: TaxMode::Platform
        }
        .plan(&cart())
        .unwrap()
        .is_empty());
        assert!(CartCommand::RemoveDiscountCode {
            code: "MISSING".to_string()
        }
        .plan(&cart())
        .unwrap()
        .is_empty());
    }

    #[test]
    fn test_plan_skips_code_already_on_cart() {
        let mut snapshot = cart();
        let apply = CartCommand::ApplyDiscountCode {
            code: "SUMMER20".to_string(),
        };
        assert_eq!(
            apply.plan(&snapshot).unwrap(),
            vec![CartAction::AddDiscountCode {
                code: "SUMMER20".to_string()
            }]
        );

        snapshot.discount_codes.push(DiscountCodeRef {
            id: DiscountCodeId::new("dc-1"),
            code: "SUMMER20".to_string(),
            state: DiscountCodeState::Matches,
            cart_discounts: Vec::new(),
        });
        assert!(apply.plan(&snapshot).unwrap().is_empty());
    }

    #[test]
    fn test_null_custom_field_removes() {
        let mut fields = CustomFields::new();
        fields.insert("poNumber".to_string(), json!("PO-17"));
        fields.insert("giftNote".to_string(), serde_json::Value::Null);

        let actions = custom_field_actions(&fields);
        assert_eq!(
            actions,
            vec![
                CartAction::SetCustomField {
                    name: "giftNote".to_string(),
                    value: None,
                },
                CartAction::SetCustomField {
                    name: "poNumber".to_string(),
                    value: Some(json!("PO-17")),
                },
            ]
        );
    }
}

//! In-memory platform.
//!
//! Implements both collaborators against carts held in process memory, with
//! version checks and atomic update batches like the hosted platform. Faults
//! can be queued per operation kind to exercise error paths.

use crate::decode::{
    CONCURRENT_MODIFICATION, DISCOUNT_CODE_NON_APPLICABLE, DUPLICATE_FIELD, INVALID_FIELD,
    INVALID_INPUT, INVALID_OPERATION, RESOURCE_NOT_FOUND,
};
use crate::store::{AuxRecord, AuxiliaryStore, StoreError};
use crate::transport::{CartTransport, Operation, OperationKind, ProtocolError, TransportResponse};
use async_trait::async_trait;
use cartkit_commerce::cart::{
    Address, CartAction, CartDraft, CartSnapshot, DiscountCodeRef, DiscountCodeState,
    DiscountDescriptor, DiscountOnTotal, IncludedDiscount, LineItem, LineItemDraft, PriceMode,
    ShippingEntry, ShippingMethodDraft, ShippingMethodKind,
};
use cartkit_commerce::ids::{
    CartId, CustomerId, DiscountCodeId, DiscountId, LineItemId, ProductId, VariantId,
};
use cartkit_commerce::money::Money;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Unit price of catalog items without a configured price.
pub const DEFAULT_UNIT_PRICE_MINOR: i64 = 1000;

/// A queued failure for the next operation of one kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// No answer; the operation is not applied.
    Transport(String),
    /// Structured rejection; the operation is not applied.
    Protocol(ProtocolError),
    /// Neither data nor error.
    EmptyPayload,
    /// Version conflict reported regardless of the presented version.
    Conflict,
}

/// How the platform evaluates a discount code.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeRule {
    pub discount_id: DiscountId,
    pub name: Option<String>,
    pub amount_minor: i64,
    /// State reported while the code applies.
    pub state: DiscountCodeState,
    /// Only carts of this customer match.
    pub customer: Option<CustomerId>,
}

impl CodeRule {
    /// A code taking a fixed amount off the cart total.
    pub fn amount_off(discount_id: impl Into<DiscountId>, amount_minor: i64) -> Self {
        Self {
            discount_id: discount_id.into(),
            name: None,
            amount_minor,
            state: DiscountCodeState::Matches,
            customer: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Report `state` instead of matching.
    pub fn with_state(mut self, state: DiscountCodeState) -> Self {
        self.state = state;
        self
    }

    pub fn restricted_to(mut self, customer: CustomerId) -> Self {
        self.customer = Some(customer);
        self
    }

    fn evaluate(&self, owner: Option<&CustomerId>) -> DiscountCodeState {
        match &self.customer {
            Some(customer) if owner != Some(customer) => {
                DiscountCodeState::DoesNotMatch
            }
            _ => self.state.clone(),
        }
    }
}

/// Something the platform was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Operation(Operation),
    StoreWrite(AuxRecord),
}

#[derive(Debug, Default)]
struct PlatformState {
    carts: BTreeMap<CartId, CartSnapshot>,
    next_id: u64,
    prices: BTreeMap<(ProductId, VariantId), Money>,
    shipping_rates: BTreeMap<String, Money>,
    codes: BTreeMap<String, CodeRule>,
    quantity_limit: Option<u32>,
    faults: HashMap<OperationKind, VecDeque<Fault>>,
    store_failures: VecDeque<StoreError>,
    records: Vec<AuxRecord>,
    calls: Vec<Call>,
}

impl PlatformState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn execute(&mut self, operation: Operation) -> TransportResponse {
        self.calls.push(Call::Operation(operation.clone()));

        let queued = self
            .faults
            .get_mut(&operation.kind())
            .and_then(VecDeque::pop_front);
        if let Some(fault) = queued {
            return self.fault_response(&operation, fault);
        }

        let result = match operation {
            Operation::CreateCart { draft } => Ok(self.create(draft)),
            Operation::FetchCart { cart_id } => self.existing(&cart_id).cloned(),
            Operation::DeleteCart { cart_id, version } => self.delete(&cart_id, version),
            Operation::UpdateCart {
                cart_id,
                version,
                actions,
            } => self.update(&cart_id, version, actions),
        };

        match result {
            Ok(snapshot) => TransportResponse::data(snapshot),
            Err(error) => TransportResponse::protocol(vec![error]),
        }
    }

    fn fault_response(&self, operation: &Operation, fault: Fault) -> TransportResponse {
        match fault {
            Fault::Transport(reason) => TransportResponse::transport(reason),
            Fault::Protocol(error) => TransportResponse::protocol(vec![error]),
            Fault::EmptyPayload => TransportResponse::default(),
            Fault::Conflict => {
                let current = operation
                    .cart_id()
                    .and_then(|id| self.carts.get(id))
                    .map(|cart| cart.version);
                TransportResponse::protocol(vec![conflict(current)])
            }
        }
    }

    fn create(&mut self, draft: CartDraft) -> CartSnapshot {
        let id = CartId::new(self.next_id("cart"));
        let mut cart = CartSnapshot::empty(id.clone(), draft.currency);
        cart.ownership = draft.ownership;
        cart.shipping_address = draft.shipping_address;
        cart.billing_address = draft.billing_address;
        cart.tax_mode = draft.tax_mode;
        cart.custom_fields = draft.custom_fields;
        self.carts.insert(id, cart.clone());
        cart
    }

    fn existing(&self, cart_id: &CartId) -> Result<&CartSnapshot, ProtocolError> {
        self.carts.get(cart_id).ok_or_else(|| {
            ProtocolError::new(
                RESOURCE_NOT_FOUND,
                format!("The Resource with ID '{}' was not found.", cart_id),
            )
        })
    }

    fn check_version(&self, cart_id: &CartId, version: u64) -> Result<(), ProtocolError> {
        let current = self.existing(cart_id)?.version;
        if current != version {
            return Err(conflict(Some(current)));
        }
        Ok(())
    }

    fn delete(&mut self, cart_id: &CartId, version: u64) -> Result<CartSnapshot, ProtocolError> {
        self.check_version(cart_id, version)?;
        self.carts.remove(cart_id).ok_or_else(|| {
            ProtocolError::new(RESOURCE_NOT_FOUND, format!("Cart '{}' was not found.", cart_id))
        })
    }

    /// Apply a batch to a working copy; commit only if every action succeeds.
    fn update(
        &mut self,
        cart_id: &CartId,
        version: u64,
        actions: Vec<CartAction>,
    ) -> Result<CartSnapshot, ProtocolError> {
        self.check_version(cart_id, version)?;
        let mut cart = self.existing(cart_id)?.clone();

        for action in actions {
            self.apply_action(&mut cart, action)?;
        }
        self.reprice_codes(&mut cart);
        cart.version += 1;

        self.carts.insert(cart_id.clone(), cart.clone());
        Ok(cart)
    }

    fn apply_action(
        &mut self,
        cart: &mut CartSnapshot,
        action: CartAction,
    ) -> Result<(), ProtocolError> {
        match action {
            CartAction::AddLineItem(draft) => self.add_line(cart, draft),
            CartAction::ChangeLineItemQuantity {
                line_item_id,
                quantity,
            } => {
                if quantity == 0 {
                    return remove_line(cart, &line_item_id);
                }
                self.check_quantity(quantity)?;
                let line = line_mut(cart, &line_item_id)?;
                line.quantity = quantity;
                line.shipping_targets.clear();
                Ok(())
            }
            CartAction::RemoveLineItem { line_item_id } => remove_line(cart, &line_item_id),
            CartAction::SetLineItemShippingTargets {
                line_item_id,
                targets,
            } => {
                let line = line_mut(cart, &line_item_id)?;
                let assigned: u64 = targets.iter().map(|t| u64::from(t.quantity)).sum();
                if assigned > u64::from(line.quantity) {
                    return Err(ProtocolError::new(
                        INVALID_INPUT,
                        "Shipping targets exceed the line quantity.",
                    ));
                }
                line.shipping_targets = targets;
                Ok(())
            }
            CartAction::AddDiscountCode { code } => self.add_code(cart, code),
            CartAction::RemoveDiscountCode { discount_code_id } => {
                let before = cart.discount_codes.len();
                cart.discount_codes.retain(|c| c.id != discount_code_id);
                if cart.discount_codes.len() == before {
                    return Err(ProtocolError::new(
                        INVALID_OPERATION,
                        format!("Discount code '{}' is not on the cart.", discount_code_id),
                    ));
                }
                Ok(())
            }
            CartAction::SetShippingAddress { address } => {
                cart.shipping_address = address;
                Ok(())
            }
            CartAction::SetBillingAddress { address } => {
                cart.billing_address = address;
                Ok(())
            }
            CartAction::UpsertItemShippingAddress { address } => upsert_address(cart, address),
            CartAction::AddShippingMethod(draft) => self.add_shipping(cart, draft),
            CartAction::RemoveShippingMethod { key } => {
                let before = cart.shipping.len();
                cart.shipping.retain(|entry| entry.key != key);
                if cart.shipping.len() == before {
                    return Err(ProtocolError::new(
                        INVALID_OPERATION,
                        format!("Shipping method '{}' is not on the cart.", key),
                    ));
                }
                Ok(())
            }
            CartAction::SetTaxMode { tax_mode } => {
                cart.tax_mode = tax_mode;
                Ok(())
            }
            CartAction::SetCustomField { name, value } => {
                match value {
                    Some(value) => cart.custom_fields.insert(name, value),
                    None => cart.custom_fields.remove(&name),
                };
                Ok(())
            }
        }
    }

    fn check_quantity(&self, quantity: u32) -> Result<(), ProtocolError> {
        match self.quantity_limit {
            Some(limit) if quantity > limit => Err(ProtocolError::new(
                INVALID_OPERATION,
                format!("Quantity {} exceeds the limit of {}.", quantity, limit),
            )
            .with_field("reason", json!("QuantityLimitExceeded"))),
            _ => Ok(()),
        }
    }

    fn add_line(
        &mut self,
        cart: &mut CartSnapshot,
        draft: LineItemDraft,
    ) -> Result<(), ProtocolError> {
        if draft.quantity == 0 {
            return Err(ProtocolError::new(INVALID_INPUT, "Quantity must be positive."));
        }

        if let Some(key) = &draft.key {
            if cart.line_by_key(key).is_some() {
                return Err(ProtocolError::new(
                    DUPLICATE_FIELD,
                    format!("A line item with key '{}' already exists.", key),
                )
                .with_field("field", json!("key"))
                .with_field("duplicateValue", json!(key)));
            }
        }

        let (unit_price, price_mode) = match draft.external_price {
            Some(price) if price.currency != cart.currency => {
                return Err(ProtocolError::new(
                    INVALID_FIELD,
                    format!(
                        "External price currency {} does not match cart currency {}.",
                        price.currency, cart.currency
                    ),
                )
                .with_field("field", json!("externalPrice")))
            }
            Some(price) => (price, PriceMode::External),
            None => (self.catalog_price(cart, &draft), PriceMode::Platform),
        };

        // Catalog lines with the same product, variant and custom fields merge.
        if price_mode == PriceMode::Platform && draft.key.is_none() {
            let merged = cart.line_items.iter_mut().find(|line| {
                line.price_mode == PriceMode::Platform
                    && line.key.is_none()
                    && line.contract.is_none()
                    && line.product_id == draft.product_id
                    && line.variant_id == draft.variant_id
                    && line.custom_fields == draft.custom_fields
            });
            if let Some(line) = merged {
                let quantity = line
                    .quantity
                    .checked_add(draft.quantity)
                    .ok_or_else(|| ProtocolError::new(INVALID_INPUT, "Quantity overflow."))?;
                self.check_quantity(quantity)?;
                line.quantity = quantity;
                line.shipping_targets.clear();
                return Ok(());
            }
        }

        self.check_quantity(draft.quantity)?;
        let id = LineItemId::new(self.next_id("li"));
        cart.line_items.push(LineItem {
            id,
            product_id: draft.product_id,
            variant_id: draft.variant_id,
            name: None,
            key: draft.key,
            quantity: draft.quantity,
            unit_price,
            price_mode,
            discounted_price: None,
            batches: Vec::new(),
            shipping_targets: Vec::new(),
            contract: draft.contract,
            custom_fields: draft.custom_fields,
        });
        Ok(())
    }

    fn catalog_price(&self, cart: &CartSnapshot, draft: &LineItemDraft) -> Money {
        self.prices
            .get(&(draft.product_id.clone(), draft.variant_id.clone()))
            .copied()
            .unwrap_or_else(|| Money::new(DEFAULT_UNIT_PRICE_MINOR, cart.currency))
    }

    fn add_code(&mut self, cart: &mut CartSnapshot, code: String) -> Result<(), ProtocolError> {
        let Some(rule) = self.codes.get(&code) else {
            return Err(ProtocolError::new(
                DISCOUNT_CODE_NON_APPLICABLE,
                format!("The discount code '{}' was not found.", code),
            )
            .with_field("discountCode", json!(code))
            .with_field("reason", json!("DoesNotExist")));
        };
        if cart.discount_code(&code).is_some() {
            return Err(ProtocolError::new(
                DUPLICATE_FIELD,
                format!("The discount code '{}' is already on the cart.", code),
            )
            .with_field("field", json!("discountCode")));
        }

        let discount_id = rule.discount_id.clone();
        let state = rule.evaluate(cart.ownership.customer_id.as_ref());
        let id = DiscountCodeId::new(self.next_id("dc"));
        cart.discount_codes.push(DiscountCodeRef {
            id,
            code,
            state,
            cart_discounts: vec![discount_id],
        });
        Ok(())
    }

    fn add_shipping(
        &mut self,
        cart: &mut CartSnapshot,
        draft: ShippingMethodDraft,
    ) -> Result<(), ProtocolError> {
        if cart.shipping_entry(&draft.key).is_some() {
            return Err(ProtocolError::new(
                DUPLICATE_FIELD,
                format!("Shipping key '{}' is already in use.", draft.key),
            )
            .with_field("field", json!("shippingKey")));
        }

        let price = match &draft.method {
            ShippingMethodKind::Catalog { method_id } => self
                .shipping_rates
                .get(method_id)
                .copied()
                .unwrap_or_else(|| Money::zero(cart.currency)),
            ShippingMethodKind::Custom { rate } => *rate,
        };
        if price.currency != cart.currency {
            return Err(ProtocolError::new(
                INVALID_FIELD,
                "Shipping rate currency does not match the cart.",
            ));
        }

        cart.shipping.push(ShippingEntry {
            key: draft.key,
            name: draft.name,
            method: draft.method,
            price,
            address_key: draft.address_key,
            discounted_price: None,
        });
        Ok(())
    }

    /// Re-evaluate code states and the cart-level discount.
    fn reprice_codes(&self, cart: &mut CartSnapshot) {
        let owner = cart.ownership.customer_id.clone();
        let currency = cart.currency;
        let mut included = Vec::new();
        for applied in &mut cart.discount_codes {
            let Some(rule) = self.codes.get(&applied.code) else {
                continue;
            };
            applied.state = rule.evaluate(owner.as_ref());
            if applied.state.is_matching() {
                included.push(IncludedDiscount {
                    discount_id: rule.discount_id.clone(),
                    descriptor: rule.name.clone().map(|name| DiscountDescriptor {
                        key: None,
                        name: Some(name),
                    }),
                    amount: Money::new(rule.amount_minor, currency),
                });
            }
        }

        cart.discount_on_total = if included.is_empty() {
            None
        } else {
            let total = included.iter().map(|d| d.amount.amount_minor).sum();
            Some(DiscountOnTotal {
                discounted_amount: Money::new(total, currency),
                included_discounts: included,
            })
        };
    }
}

fn conflict(current_version: Option<u64>) -> ProtocolError {
    let error = ProtocolError::new(
        CONCURRENT_MODIFICATION,
        "Object has a different version than expected.",
    );
    match current_version {
        Some(version) => error.with_field("currentVersion", json!(version)),
        None => error,
    }
}

fn line_mut<'a>(
    cart: &'a mut CartSnapshot,
    id: &LineItemId,
) -> Result<&'a mut LineItem, ProtocolError> {
    cart.line_items
        .iter_mut()
        .find(|line| &line.id == id)
        .ok_or_else(|| {
            ProtocolError::new(
                INVALID_OPERATION,
                format!("Line item '{}' is not on the cart.", id),
            )
        })
}

fn remove_line(cart: &mut CartSnapshot, id: &LineItemId) -> Result<(), ProtocolError> {
    line_mut(cart, id)?;
    cart.line_items.retain(|line| &line.id != id);
    Ok(())
}

fn upsert_address(cart: &mut CartSnapshot, address: Address) -> Result<(), ProtocolError> {
    if address.key.is_none() {
        return Err(ProtocolError::new(
            INVALID_INPUT,
            "Item shipping addresses require a key.",
        )
        .with_field("field", json!("key")));
    }
    match cart
        .item_shipping_addresses
        .iter_mut()
        .find(|existing| existing.key == address.key)
    {
        Some(existing) => *existing = address,
        None => cart.item_shipping_addresses.push(address),
    }
    Ok(())
}

/// Carts and auxiliary records held in memory.
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Catalog price of a product variant.
    pub fn with_price(self, product_id: ProductId, variant_id: VariantId, price: Money) -> Self {
        self.state().prices.insert((product_id, variant_id), price);
        self
    }

    /// Rate of a catalog shipping method.
    pub fn with_shipping_rate(self, method_id: impl Into<String>, rate: Money) -> Self {
        self.state().shipping_rates.insert(method_id.into(), rate);
        self
    }

    pub fn with_discount_code(self, code: impl Into<String>, rule: CodeRule) -> Self {
        self.state().codes.insert(code.into(), rule);
        self
    }

    /// Queue a fault for the next operation of `kind`.
    pub fn inject(&self, kind: OperationKind, fault: Fault) {
        self.state()
            .faults
            .entry(kind)
            .or_default()
            .push_back(fault);
    }

    /// Reject any line quantity above `limit`.
    pub fn set_quantity_limit(&self, limit: Option<u32>) {
        self.state().quantity_limit = limit;
    }

    /// Fail the next auxiliary write.
    pub fn fail_next_write(&self, error: StoreError) {
        self.state().store_failures.push_back(error);
    }

    /// Store a cart as is, e.g. one created by an older client.
    pub fn insert_cart(&self, cart: CartSnapshot) {
        self.state().carts.insert(cart.id.clone(), cart);
    }

    /// Change a cart as a concurrent writer would, bumping its version.
    pub fn mutate(
        &self,
        cart_id: &CartId,
        change: impl FnOnce(&mut CartSnapshot),
    ) -> Option<CartSnapshot> {
        let mut state = self.state();
        let cart = state.carts.get_mut(cart_id)?;
        change(cart);
        cart.version += 1;
        Some(cart.clone())
    }

    /// Apply actions as a concurrent writer would.
    pub fn update_concurrently(
        &self,
        cart_id: &CartId,
        actions: Vec<CartAction>,
    ) -> Option<CartSnapshot> {
        let mut state = self.state();
        let version = state.carts.get(cart_id)?.version;
        state.update(cart_id, version, actions).ok()
    }

    pub fn cart(&self, cart_id: &CartId) -> Option<CartSnapshot> {
        self.state().carts.get(cart_id).cloned()
    }

    pub fn records(&self) -> Vec<AuxRecord> {
        self.state().records.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Operations executed so far, faulted ones included.
    pub fn operations(&self) -> Vec<Operation> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Operation(operation) => Some(operation.clone()),
                Call::StoreWrite(_) => None,
            })
            .collect()
    }

    pub fn operation_count(&self, kind: OperationKind) -> usize {
        self.operations().iter().filter(|op| op.kind() == kind).count()
    }
}

#[async_trait]
impl CartTransport for InMemoryPlatform {
    async fn execute(&self, operation: Operation) -> TransportResponse {
        self.state().execute(operation)
    }
}

#[async_trait]
impl AuxiliaryStore for InMemoryPlatform {
    async fn write(
        &self,
        container: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        if let Some(error) = state.store_failures.pop_front() {
            return Err(error);
        }
        let record = AuxRecord::new(container, key, value);
        state.calls.push(Call::StoreWrite(record.clone()));
        state.records.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartkit_commerce::cart::OwnershipContext;
    use cartkit_commerce::money::Currency;

    fn platform_with_cart() -> (InMemoryPlatform, CartSnapshot) {
        let platform = InMemoryPlatform::new();
        let cart = platform
            .state()
            .create(CartDraft::new(Currency::USD, OwnershipContext::default()));
        (platform, cart)
    }

    fn spot(product: &str, quantity: u32) -> CartAction {
        CartAction::AddLineItem(LineItemDraft {
            product_id: ProductId::new(product),
            variant_id: VariantId::new("1"),
            quantity,
            external_price: None,
            key: None,
            contract: None,
            custom_fields: Default::default(),
        })
    }

    #[test]
    fn test_stale_version_is_rejected() {
        let (platform, cart) = platform_with_cart();
        let response = platform.state().execute(Operation::UpdateCart {
            cart_id: cart.id.clone(),
            version: cart.version + 1,
            actions: vec![spot("p-1", 1)],
        });
        let errors = match response.error {
            Some(crate::transport::TransportError::Protocol(errors)) => errors,
            other => panic!("unexpected error {:?}", other),
        };
        assert_eq!(errors[0].code, CONCURRENT_MODIFICATION);
        assert_eq!(errors[0].fields["currentVersion"], json!(1));
    }

    #[test]
    fn test_catalog_lines_merge() {
        let (platform, cart) = platform_with_cart();
        let updated = platform
            .update_concurrently(&cart.id, vec![spot("p-1", 1), spot("p-1", 2)])
            .unwrap();
        assert_eq!(updated.line_items.len(), 1);
        assert_eq!(updated.line_items[0].quantity, 3);
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn test_failed_batch_is_not_committed() {
        let (platform, cart) = platform_with_cart();
        let response = platform.state().execute(Operation::UpdateCart {
            cart_id: cart.id.clone(),
            version: 1,
            actions: vec![
                spot("p-1", 1),
                CartAction::RemoveLineItem {
                    line_item_id: LineItemId::new("li-missing"),
                },
            ],
        });
        assert!(response.error.is_some());
        let stored = platform.cart(&cart.id).unwrap();
        assert_eq!(stored.version, 1);
        assert!(stored.line_items.is_empty());
    }

    #[test]
    fn test_restricted_code_does_not_match_other_owner() {
        let platform = InMemoryPlatform::new().with_discount_code(
            "VIP",
            CodeRule::amount_off("vip", 300).restricted_to(CustomerId::new("c-1")),
        );
        let cart = platform
            .state()
            .create(CartDraft::new(Currency::USD, OwnershipContext::default()));
        let updated = platform
            .update_concurrently(
                &cart.id,
                vec![CartAction::AddDiscountCode {
                    code: "VIP".to_string(),
                }],
            )
            .unwrap();
        assert_eq!(updated.discount_codes[0].state, DiscountCodeState::DoesNotMatch);
        assert!(updated.discount_on_total.is_none());
    }
}

//! Cart pricing aggregation.

use crate::cart::{CanonicalDiscountSummary, CartSnapshot, DiscountSource, LineItem};
use crate::error::CommerceError;
use crate::ids::LineItemId;
use crate::money::{Currency, Money};
use serde::{Deserialize, Serialize};

/// Totals derived from one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartTotals {
    /// Sum of line subtotals.
    pub subtotal: Money,
    pub line_item_discount_total: Money,
    pub cart_discount_total: Money,
    pub shipping_discount_total: Money,
    /// Sum of the three per-source totals.
    pub grand_discount_total: Money,
    /// Per-line breakdown, in snapshot order.
    pub lines: Vec<LineSubtotal>,
}

impl CartTotals {
    /// Check if any discounts are applied.
    pub fn has_discounts(&self) -> bool {
        self.grand_discount_total.is_positive()
    }
}

/// Pricing breakdown for a single line item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineSubtotal {
    pub line_item_id: LineItemId,
    pub quantity: u32,
    pub subtotal: Money,
    /// Line-item contributions scoped to this line.
    pub discount: Money,
}

/// Aggregate a snapshot and its discount summary into totals.
///
/// A line with a batch breakdown is priced as the sum of
/// `batch.quantity * batch.effective_price`; only a line without batches falls
/// back to `quantity * unit_price`. Every amount involved must be in the cart
/// currency.
pub fn aggregate(
    snapshot: &CartSnapshot,
    summary: &CanonicalDiscountSummary,
) -> Result<CartTotals, CommerceError> {
    let currency = snapshot.currency;
    summary_currency(summary, currency)?;

    let lines = snapshot
        .line_items
        .iter()
        .map(|line| {
            Ok(LineSubtotal {
                line_item_id: line.id.clone(),
                quantity: line.quantity,
                subtotal: line_subtotal(line, currency)?,
                discount: Money::try_sum(summary.for_line(&line.id).map(|c| &c.amount), currency)?,
            })
        })
        .collect::<Result<Vec<_>, CommerceError>>()?;

    let subtotal = Money::try_sum(lines.iter().map(|l| &l.subtotal), currency)?;
    let line_item_discount_total = summary.source_total(DiscountSource::LineItem)?;
    let cart_discount_total = summary.source_total(DiscountSource::CartCode)?;
    let shipping_discount_total = summary.source_total(DiscountSource::Shipping)?;
    let grand_discount_total = Money::try_sum(
        [
            &line_item_discount_total,
            &cart_discount_total,
            &shipping_discount_total,
        ],
        currency,
    )?;

    Ok(CartTotals {
        subtotal,
        line_item_discount_total,
        cart_discount_total,
        shipping_discount_total,
        grand_discount_total,
        lines,
    })
}

/// Subtotal of one line in the cart currency.
pub fn line_subtotal(line: &LineItem, currency: Currency) -> Result<Money, CommerceError> {
    line.unit_price.ensure_currency(currency)?;

    if line.batches.is_empty() {
        return line.unit_price.checked_mul(line.quantity);
    }

    let batched: u64 = line.batches.iter().map(|b| u64::from(b.quantity)).sum();
    if batched != u64::from(line.quantity) {
        return Err(CommerceError::BatchQuantityMismatch {
            line_item_id: line.id.to_string(),
            expected: line.quantity,
            got: u32::try_from(batched).unwrap_or(u32::MAX),
        });
    }

    line.batches.iter().try_fold(Money::zero(currency), |acc, batch| {
        batch.effective_price.ensure_currency(currency)?;
        acc.checked_add(&batch.effective_price.checked_mul(batch.quantity)?)
    })
}

fn summary_currency(
    summary: &CanonicalDiscountSummary,
    currency: Currency,
) -> Result<(), CommerceError> {
    if summary.currency() != currency {
        return Err(CommerceError::CurrencyMismatch {
            expected: currency.code().to_string(),
            got: summary.currency().code().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{
        normalize, CustomFields, DiscountCodeRef, DiscountCodeState, DiscountOnTotal,
        IncludedDiscount, PriceBatch, PriceMode,
    };
    use crate::ids::*;

    fn usd(amount: i64) -> Money {
        Money::new(amount, Currency::USD)
    }

    fn included(id: &str, amount: Money) -> IncludedDiscount {
        IncludedDiscount {
            discount_id: DiscountId::new(id),
            descriptor: None,
            amount,
        }
    }

    fn line(id: &str, quantity: u32, unit_price: Money) -> LineItem {
        LineItem {
            id: LineItemId::new(id),
            product_id: ProductId::new(format!("p-{}", id)),
            variant_id: VariantId::new("1"),
            name: None,
            key: None,
            quantity,
            unit_price,
            price_mode: PriceMode::Platform,
            discounted_price: None,
            batches: Vec::new(),
            shipping_targets: Vec::new(),
            contract: None,
            custom_fields: CustomFields::new(),
        }
    }

    fn split_batch_cart() -> CartSnapshot {
        let mut li = line("li-1", 10, usd(1000));
        // The representative price must not leak into the subtotal.
        li.discounted_price = Some(usd(850));
        li.batches = vec![
            PriceBatch {
                quantity: 6,
                effective_price: usd(900),
                included_discounts: vec![included("bulk", usd(600))],
            },
            PriceBatch {
                quantity: 4,
                effective_price: usd(800),
                included_discounts: vec![included("bulk", usd(800))],
            },
        ];
        let mut cart = CartSnapshot::empty(CartId::new("cart-1"), Currency::USD);
        cart.line_items.push(li);
        cart
    }

    #[test]
    fn test_split_batches_subtotal() {
        let cart = split_batch_cart();
        let totals = aggregate(&cart, &normalize(&cart)).unwrap();

        assert_eq!(totals.lines[0].subtotal, usd(8600));
        assert_eq!(totals.subtotal, usd(8600));
        assert_eq!(totals.line_item_discount_total, usd(1400));
        assert_eq!(totals.lines[0].discount, usd(1400));
        assert_eq!(totals.grand_discount_total, usd(1400));
    }

    #[test]
    fn test_fallback_to_unit_price_without_batches() {
        let mut cart = CartSnapshot::empty(CartId::new("cart-1"), Currency::USD);
        cart.line_items.push(line("li-1", 2, usd(1000)));
        cart.line_items.push(line("li-2", 1, usd(2000)));

        let totals = aggregate(&cart, &normalize(&cart)).unwrap();
        assert_eq!(totals.subtotal, usd(4000));
        assert!(!totals.has_discounts());
    }

    #[test]
    fn test_cart_code_total() {
        let mut cart = CartSnapshot::empty(CartId::new("cart-1"), Currency::USD);
        cart.line_items.push(line("li-1", 1, usd(5000)));
        cart.discount_codes.push(DiscountCodeRef {
            id: DiscountCodeId::new("dc-1"),
            code: "SUMMER20".to_string(),
            state: DiscountCodeState::Matches,
            cart_discounts: vec![DiscountId::new("summer")],
        });
        cart.discount_on_total = Some(DiscountOnTotal {
            discounted_amount: usd(500),
            included_discounts: vec![included("summer", usd(500))],
        });

        let summary = normalize(&cart);
        let totals = aggregate(&cart, &summary).unwrap();
        assert_eq!(totals.cart_discount_total, usd(500));
        assert_eq!(totals.grand_discount_total, usd(500));
        assert!(totals.line_item_discount_total.is_zero());
    }

    #[test]
    fn test_contribution_in_foreign_currency_fails() {
        let mut cart = split_batch_cart();
        cart.line_items[0].batches[1].included_discounts[0].amount = Money::new(800, Currency::EUR);

        let err = aggregate(&cart, &normalize(&cart)).unwrap_err();
        assert!(matches!(err, CommerceError::CurrencyMismatch { .. }));
    }

    #[test]
    fn test_line_price_in_foreign_currency_fails() {
        let mut cart = CartSnapshot::empty(CartId::new("cart-1"), Currency::USD);
        cart.line_items.push(line("li-1", 1, Money::new(100, Currency::GBP)));

        let err = aggregate(&cart, &normalize(&cart)).unwrap_err();
        assert_eq!(
            err,
            CommerceError::CurrencyMismatch {
                expected: "USD".to_string(),
                got: "GBP".to_string(),
            }
        );
    }

    #[test]
    fn test_batch_quantities_must_cover_line() {
        let mut cart = split_batch_cart();
        cart.line_items[0].quantity = 11;

        let err = aggregate(&cart, &normalize(&cart)).unwrap_err();
        assert_eq!(
            err,
            CommerceError::BatchQuantityMismatch {
                line_item_id: "li-1".to_string(),
                expected: 11,
                got: 10,
            }
        );
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let cart = split_batch_cart();
        let summary = normalize(&cart);
        let first = aggregate(&cart, &summary).unwrap();
        let second = aggregate(&cart, &summary).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, aggregate(&cart.clone(), &normalize(&cart)).unwrap());
    }
}

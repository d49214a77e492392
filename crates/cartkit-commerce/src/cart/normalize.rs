//! Discount normalization.

use crate::cart::{
    CanonicalDiscountSummary, CartSnapshot, CodeActivation, DiscountContribution, IncludedDiscount,
};

/// Build the canonical discount summary of a snapshot.
///
/// Order is line items (batch by batch), then the cart total, then shipping
/// entries. Batch amounts are taken as reported; the line's representative
/// discounted price is ignored. Never fails: absent fragments contribute
/// nothing.
pub fn normalize(snapshot: &CartSnapshot) -> CanonicalDiscountSummary {
    let mut contributions = Vec::new();

    for line in &snapshot.line_items {
        for batch in &line.batches {
            contributions.extend(
                batch
                    .included_discounts
                    .iter()
                    .map(|d| DiscountContribution::line_item(line.id.clone(), d)),
            );
        }
    }

    if let Some(on_total) = &snapshot.discount_on_total {
        contributions.extend(
            on_total
                .included_discounts
                .iter()
                .map(|d| DiscountContribution::cart_code(d, activation_for(snapshot, d))),
        );
    }

    for entry in &snapshot.shipping {
        if let Some(discounted) = &entry.discounted_price {
            contributions.extend(
                discounted
                    .included_discounts
                    .iter()
                    .map(|d| DiscountContribution::shipping(entry.key.clone(), d)),
            );
        }
    }

    CanonicalDiscountSummary::new(snapshot.currency, contributions)
}

/// First applied code whose activation list names the rule.
fn activation_for(snapshot: &CartSnapshot, discount: &IncludedDiscount) -> Option<CodeActivation> {
    snapshot
        .discount_codes
        .iter()
        .find(|code| code.cart_discounts.contains(&discount.discount_id))
        .map(|code| CodeActivation {
            code_id: code.id.clone(),
            code: code.code.clone(),
        })
}

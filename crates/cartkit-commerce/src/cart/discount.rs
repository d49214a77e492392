//! Canonical discount model.
//!
//! The platform reports discounts in three unrelated shapes: per line batch,
//! on the cart total, and per shipping entry. All three become
//! [`DiscountContribution`]s with a source tag, so every consumer reads one
//! shape.

use crate::cart::IncludedDiscount;
use crate::error::CommerceError;
use crate::ids::{DiscountCodeId, DiscountId, LineItemId, ShippingEntryId};
use crate::money::{Currency, Money};
use serde::{Deserialize, Serialize};

/// Label shown for contributions whose rule was not expanded.
pub const UNNAMED_DISCOUNT: &str = "unnamed discount";

/// State the platform reports for an applied discount code.
///
/// States this crate does not know are kept verbatim in `Other` and never
/// count as matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DiscountCodeState {
    Matches,
    DoesNotMatch,
    MaxApplicationsReached,
    StoppedByPriorDiscount,
    Other(String),
}

impl DiscountCodeState {
    /// Parse the platform's state string.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "MatchesCart" => Self::Matches,
            "DoesNotMatchCart" => Self::DoesNotMatch,
            "MaxApplicationReached" => Self::MaxApplicationsReached,
            "ApplicationStoppedByPreviousDiscount" => Self::StoppedByPriorDiscount,
            other => Self::Other(other.to_string()),
        }
    }

    /// The platform's state string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Matches => "MatchesCart",
            Self::DoesNotMatch => "DoesNotMatchCart",
            Self::MaxApplicationsReached => "MaxApplicationReached",
            Self::StoppedByPriorDiscount => "ApplicationStoppedByPreviousDiscount",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_matching(&self) -> bool {
        matches!(self, Self::Matches)
    }
}

impl From<String> for DiscountCodeState {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<DiscountCodeState> for String {
    fn from(state: DiscountCodeState) -> Self {
        state.as_str().to_string()
    }
}

impl std::fmt::Display for DiscountCodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which platform breakdown a contribution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscountSource {
    LineItem,
    CartCode,
    Shipping,
}

/// What a contribution applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscountScope {
    LineItem(LineItemId),
    ShippingEntry(ShippingEntryId),
    Cart,
}

/// The applied code a cart-level contribution is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeActivation {
    pub code_id: DiscountCodeId,
    pub code: String,
}

/// One discount rule's effect on one part of the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountContribution {
    pub source: DiscountSource,
    pub discount_id: DiscountId,
    pub key: Option<String>,
    pub name: Option<String>,
    pub amount: Money,
    pub scope: DiscountScope,
    /// Set only on `CartCode` contributions whose rule is in some applied
    /// code's activation list.
    pub activated_by: Option<CodeActivation>,
}

impl DiscountContribution {
    /// Contribution of one rule to one batch of a line.
    pub fn line_item(line_item_id: LineItemId, discount: &IncludedDiscount) -> Self {
        Self::from_included(
            DiscountSource::LineItem,
            DiscountScope::LineItem(line_item_id),
            discount,
            None,
        )
    }

    /// Contribution of one rule to the cart total.
    pub fn cart_code(discount: &IncludedDiscount, activated_by: Option<CodeActivation>) -> Self {
        Self::from_included(
            DiscountSource::CartCode,
            DiscountScope::Cart,
            discount,
            activated_by,
        )
    }

    /// Contribution of one rule to one shipping entry.
    pub fn shipping(entry: ShippingEntryId, discount: &IncludedDiscount) -> Self {
        Self::from_included(
            DiscountSource::Shipping,
            DiscountScope::ShippingEntry(entry),
            discount,
            None,
        )
    }

    fn from_included(
        source: DiscountSource,
        scope: DiscountScope,
        discount: &IncludedDiscount,
        activated_by: Option<CodeActivation>,
    ) -> Self {
        let descriptor = discount.descriptor.as_ref();
        Self {
            source,
            discount_id: discount.discount_id.clone(),
            key: descriptor.and_then(|d| d.key.clone()),
            name: descriptor.and_then(|d| d.name.clone()),
            amount: discount.amount,
            scope,
            activated_by,
        }
    }

    /// Name for display.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNNAMED_DISCOUNT)
    }

    /// A cart-level contribution no applied code accounts for.
    pub fn is_unattributed(&self) -> bool {
        self.source == DiscountSource::CartCode && self.activated_by.is_none()
    }
}

/// Every discount contribution of one snapshot, in normalization order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalDiscountSummary {
    currency: Currency,
    contributions: Vec<DiscountContribution>,
}

impl CanonicalDiscountSummary {
    pub fn new(currency: Currency, contributions: Vec<DiscountContribution>) -> Self {
        Self {
            currency,
            contributions,
        }
    }

    /// Currency of the cart the summary was built from.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn contributions(&self) -> &[DiscountContribution] {
        &self.contributions
    }

    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }

    pub fn by_source(
        &self,
        source: DiscountSource,
    ) -> impl Iterator<Item = &DiscountContribution> + '_ {
        self.contributions.iter().filter(move |c| c.source == source)
    }

    pub fn for_line(&self, id: &LineItemId) -> impl Iterator<Item = &DiscountContribution> + '_ {
        let scope = DiscountScope::LineItem(id.clone());
        self.contributions.iter().filter(move |c| c.scope == scope)
    }

    pub fn for_shipping(
        &self,
        key: &ShippingEntryId,
    ) -> impl Iterator<Item = &DiscountContribution> + '_ {
        let scope = DiscountScope::ShippingEntry(key.clone());
        self.contributions.iter().filter(move |c| c.scope == scope)
    }

    /// Cart-level contributions attributed to the given code.
    pub fn for_code<'a>(
        &'a self,
        code: &'a str,
    ) -> impl Iterator<Item = &'a DiscountContribution> + 'a {
        self.contributions
            .iter()
            .filter(move |c| c.activated_by.as_ref().map(|a| a.code.as_str()) == Some(code))
    }

    /// Sum of one source's contributions.
    ///
    /// Fails with `CurrencyMismatch` if any contribution is not in the cart
    /// currency.
    pub fn source_total(&self, source: DiscountSource) -> Result<Money, CommerceError> {
        Money::try_sum(self.by_source(source).map(|c| &c.amount), self.currency)
    }

    /// Sum of every contribution.
    pub fn grand_total(&self) -> Result<Money, CommerceError> {
        Money::try_sum(self.contributions.iter().map(|c| &c.amount), self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::DiscountDescriptor;

    fn included(id: &str, amount: i64, name: Option<&str>) -> IncludedDiscount {
        IncludedDiscount {
            discount_id: DiscountId::new(id),
            descriptor: name.map(|n| DiscountDescriptor {
                key: Some(format!("{}-key", id)),
                name: Some(n.to_string()),
            }),
            amount: Money::new(amount, Currency::USD),
        }
    }

    #[test]
    fn test_code_state_parsing() {
        assert_eq!(DiscountCodeState::parse("MatchesCart"), DiscountCodeState::Matches);
        assert_eq!(
            DiscountCodeState::parse("ApplicationStoppedByPreviousDiscount"),
            DiscountCodeState::StoppedByPriorDiscount
        );

        let unknown = DiscountCodeState::parse("ApplicationStoppedByGroupBestDeal");
        assert_eq!(
            unknown,
            DiscountCodeState::Other("ApplicationStoppedByGroupBestDeal".to_string())
        );
        assert!(!unknown.is_matching());
        assert_eq!(unknown.as_str(), "ApplicationStoppedByGroupBestDeal");
    }

    #[test]
    fn test_code_state_serde_keeps_raw_string() {
        let state: DiscountCodeState = serde_json::from_str("\"NotActive\"").unwrap();
        assert_eq!(state, DiscountCodeState::Other("NotActive".to_string()));
        assert_eq!(serde_json::to_string(&state).unwrap(), "\"NotActive\"");
        assert_eq!(
            serde_json::to_string(&DiscountCodeState::DoesNotMatch).unwrap(),
            "\"DoesNotMatchCart\""
        );
    }

    #[test]
    fn test_constructors_copy_descriptor() {
        let c = DiscountContribution::line_item(
            LineItemId::new("li-1"),
            &included("d-1", 120, Some("Bulk")),
        );
        assert_eq!(c.source, DiscountSource::LineItem);
        assert_eq!(c.scope, DiscountScope::LineItem(LineItemId::new("li-1")));
        assert_eq!(c.key.as_deref(), Some("d-1-key"));
        assert_eq!(c.display_name(), "Bulk");
    }

    #[test]
    fn test_missing_descriptor_is_unnamed_but_keeps_amount() {
        let c = DiscountContribution::shipping(
            ShippingEntryId::new("ship-1"),
            &included("d-2", 300, None),
        );
        assert_eq!(c.display_name(), UNNAMED_DISCOUNT);
        assert_eq!(c.amount.amount_minor, 300);
        assert!(c.key.is_none());
    }

    #[test]
    fn test_summary_totals() {
        let summary = CanonicalDiscountSummary::new(
            Currency::USD,
            vec![
                DiscountContribution::line_item(
                    LineItemId::new("li-1"),
                    &included("d-1", 100, None),
                ),
                DiscountContribution::line_item(
                    LineItemId::new("li-2"),
                    &included("d-1", 50, None),
                ),
                DiscountContribution::cart_code(&included("d-3", 500, None), None),
            ],
        );
        assert_eq!(summary.source_total(DiscountSource::LineItem).unwrap().amount_minor, 150);
        assert_eq!(summary.source_total(DiscountSource::CartCode).unwrap().amount_minor, 500);
        assert!(summary.source_total(DiscountSource::Shipping).unwrap().is_zero());
        assert_eq!(summary.grand_total().unwrap().amount_minor, 650);
        assert_eq!(summary.for_line(&LineItemId::new("li-2")).count(), 1);
        assert!(summary.contributions()[2].is_unattributed());
    }

    #[test]
    fn test_summary_rejects_foreign_currency() {
        let mut foreign = included("d-1", 100, None);
        foreign.amount = Money::new(100, Currency::EUR);
        let summary = CanonicalDiscountSummary::new(
            Currency::USD,
            vec![DiscountContribution::cart_code(&foreign, None)],
        );
        assert!(matches!(
            summary.grand_total(),
            Err(CommerceError::CurrencyMismatch { .. })
        ));
    }
}

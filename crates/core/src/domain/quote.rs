use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::contractor::ContractorId;
use crate::domain::pricing::PricingRules;
use crate::domain::request::QuoteRequestId;
use crate::errors::{BusinessRule, DomainError};
use crate::pricing::calculator::{overflow, round_money, share_of, PricingViolation};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractorQuoteId(pub String);

impl fmt::Display for ContractorQuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    PendingReview,
    Approved,
    Rejected,
    RevisionNeeded,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::RevisionNeeded => "revision_needed",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending_review" => Ok(Self::PendingReview),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "revision_needed" => Ok(Self::RevisionNeeded),
            other => Err(DomainError::InvalidInput {
                field: "admin_status",
                reason: format!("unknown review status `{other}`"),
            }),
        }
    }
}

/// Result of decomposing a contractor base price into platform and
/// contractor shares.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialBreakdown {
    pub base_price: Decimal,
    pub markup_amount: Decimal,
    pub total_user_price: Decimal,
    pub commission_amount: Decimal,
    pub contractor_net_amount: Decimal,
    pub platform_revenue: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub platform_commission: Decimal,
    pub platform_markup: Decimal,
    pub user_price: Decimal,
    pub vendor_net_price: Decimal,
    pub vat_amount: Decimal,
    pub position: u32,
}

impl LineItem {
    /// Builds a line item whose platform shares are derived from `rules`.
    pub fn priced(
        item_name: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
        position: u32,
        rules: &PricingRules,
    ) -> Result<Self, PricingViolation> {
        let total = quantity.checked_mul(unit_price).ok_or_else(|| overflow("total_price"))?;
        let commission = share_of(total, rules.platform_commission_percent, "platform_commission")?;
        let markup = share_of(total, rules.platform_markup_percent, "platform_markup")?;
        let vendor_net = total.checked_sub(commission).ok_or_else(|| overflow("vendor_net_price"))?;
        let user_price = total.checked_add(markup).ok_or_else(|| overflow("user_price"))?;
        let vat = share_of(vendor_net, rules.vat_rate_percent, "vat_amount")?;

        Ok(Self {
            item_name: item_name.into(),
            quantity,
            unit_price,
            total_price: round_money(total),
            platform_commission: round_money(commission),
            platform_markup: round_money(markup),
            user_price: round_money(user_price),
            vendor_net_price: round_money(vendor_net),
            vat_amount: round_money(vat),
            position,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractorQuote {
    pub id: ContractorQuoteId,
    pub request_id: QuoteRequestId,
    pub contractor_id: ContractorId,
    pub system_size: Decimal,
    pub price_per_unit_capacity: Decimal,
    pub breakdown: FinancialBreakdown,
    pub review_status: ReviewStatus,
    pub review_notes: Option<String>,
    pub notes: Option<String>,
    pub line_items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContractorQuote {
    pub fn base_price(&self) -> Decimal {
        self.breakdown.base_price
    }

    pub fn can_transition_to(&self, next: ReviewStatus) -> bool {
        matches!(
            (self.review_status, next),
            (ReviewStatus::PendingReview, ReviewStatus::Approved)
                | (ReviewStatus::PendingReview, ReviewStatus::Rejected)
                | (ReviewStatus::PendingReview, ReviewStatus::RevisionNeeded)
                | (ReviewStatus::RevisionNeeded, ReviewStatus::Approved)
                | (ReviewStatus::RevisionNeeded, ReviewStatus::Rejected)
        )
    }

    pub fn review(
        &mut self,
        next: ReviewStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::BusinessRule {
                rule: BusinessRule::ReviewStatus,
                message: "invalid review status".to_string(),
                actual: Some(self.review_status.as_str().to_string()),
                limit: Some(next.as_str().to_string()),
            });
        }

        self.review_status = next;
        self.review_notes = notes;
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{
        ContractorQuote, ContractorQuoteId, FinancialBreakdown, LineItem, ReviewStatus,
    };
    use crate::domain::contractor::ContractorId;
    use crate::domain::pricing::PricingRules;
    use crate::domain::request::QuoteRequestId;
    use crate::errors::DomainError;
    use crate::pricing::PricingViolation;

    fn quote(status: ReviewStatus) -> ContractorQuote {
        ContractorQuote {
            id: ContractorQuoteId("CQ-1".to_string()),
            request_id: QuoteRequestId("REQ-1".to_string()),
            contractor_id: ContractorId("c-1".to_string()),
            system_size: Decimal::new(10, 0),
            price_per_unit_capacity: Decimal::new(1000, 0),
            breakdown: FinancialBreakdown {
                base_price: Decimal::new(10_000, 0),
                markup_amount: Decimal::new(1_000, 0),
                total_user_price: Decimal::new(11_000, 0),
                commission_amount: Decimal::new(1_500, 0),
                contractor_net_amount: Decimal::new(8_500, 0),
                platform_revenue: Decimal::new(2_500, 0),
            },
            review_status: status,
            review_notes: None,
            notes: None,
            line_items: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn pending_quote_can_be_approved() {
        let mut quote = quote(ReviewStatus::PendingReview);
        quote.review(ReviewStatus::Approved, Some("looks right".to_string()), Utc::now()).expect("approve");
        assert_eq!(quote.review_status, ReviewStatus::Approved);
        assert_eq!(quote.review_notes.as_deref(), Some("looks right"));
    }

    #[test]
    fn approved_quote_is_immutable() {
        let mut quote = quote(ReviewStatus::Approved);
        for next in [ReviewStatus::Rejected, ReviewStatus::RevisionNeeded, ReviewStatus::Approved] {
            let error = quote.review(next, None, Utc::now()).expect_err("approved is final");
            assert!(matches!(error, DomainError::BusinessRule { .. }));
        }
        assert_eq!(quote.review_status, ReviewStatus::Approved);
    }

    #[test]
    fn revision_needed_can_still_be_decided() {
        let mut quote = quote(ReviewStatus::PendingReview);
        quote.review(ReviewStatus::RevisionNeeded, None, Utc::now()).expect("request revision");
        quote.review(ReviewStatus::Rejected, None, Utc::now()).expect("reject after revision");
        assert_eq!(quote.review_status, ReviewStatus::Rejected);
    }

    #[test]
    fn priced_line_item_derives_shares_from_rules() {
        let item = LineItem::priced(
            "Inverter 5kW",
            Decimal::new(2, 0),
            Decimal::new(50_000, 2),
            0,
            &PricingRules::default(),
        )
        .expect("price line item");

        assert_eq!(item.total_price, Decimal::new(100_000, 2));
        assert_eq!(item.platform_commission, Decimal::new(15_000, 2));
        assert_eq!(item.platform_markup, Decimal::new(10_000, 2));
        assert_eq!(item.user_price, Decimal::new(110_000, 2));
        assert_eq!(item.vendor_net_price, Decimal::new(85_000, 2));
        assert_eq!(item.vat_amount, Decimal::new(12_750, 2));
    }

    #[test]
    fn priced_line_item_reports_overflow() {
        let error = LineItem::priced("Panels", Decimal::MAX, Decimal::TWO, 0, &PricingRules::default())
            .expect_err("quantity x unit price overflows");
        assert_eq!(error, PricingViolation::AmountOverflow { quantity: "total_price".to_string() });
    }
}

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::pricing::PricingRules;
use crate::domain::quote::{FinancialBreakdown, LineItem};
use crate::errors::{BusinessRule, ErrorKind};

pub const MONEY_SCALE: u32 = 2;

/// Rounds a monetary amount to cents, half-up.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount × percent / 100`, unrounded. `None` when the product leaves the
/// representable range.
pub fn percent_of(amount: Decimal, percent: Decimal) -> Option<Decimal> {
    amount.checked_mul(percent)?.checked_div(Decimal::ONE_HUNDRED)
}

pub(crate) fn share_of(amount: Decimal, percent: Decimal, quantity: &str) -> Result<Decimal, PricingViolation> {
    percent_of(amount, percent).ok_or_else(|| overflow(quantity))
}

pub(crate) fn overflow(quantity: &str) -> PricingViolation {
    PricingViolation::AmountOverflow { quantity: quantity.to_string() }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingInput {
    pub base_price: Decimal,
    pub price_per_unit_capacity: Decimal,
    pub system_size: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingField {
    BasePrice,
    PricePerUnitCapacity,
    SystemSize,
}

impl fmt::Display for PricingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BasePrice => "base_price",
            Self::PricePerUnitCapacity => "price_per_unit_capacity",
            Self::SystemSize => "system_size",
        })
    }
}

/// A submission that fails the pricing checks. Every variant carries the
/// offending value and the limit it was measured against.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PricingViolation {
    #[error("`{field}` must be greater than {limit} (got {value})")]
    OutOfRange { field: PricingField, value: Decimal, limit: Decimal },
    #[error("price per unit capacity {value} exceeds maximum {limit}")]
    PricePerUnitAboveMaximum { value: Decimal, limit: Decimal },
    #[error("system size {value} is below minimum {limit}")]
    SystemSizeBelowMinimum { value: Decimal, limit: Decimal },
    #[error("system size {value} exceeds maximum {limit}")]
    SystemSizeAboveMaximum { value: Decimal, limit: Decimal },
    #[error("line item totals {actual} do not match base price {expected}")]
    LineItemMismatch { expected: Decimal, actual: Decimal },
    #[error(
        "base price {value} deviates from price per unit x system size {expected} by more than {tolerance_percent}%"
    )]
    PriceInconsistent { value: Decimal, expected: Decimal, tolerance_percent: Decimal },
    #[error("`{quantity}` is too large to compute")]
    AmountOverflow { quantity: String },
}

impl PricingViolation {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfRange { .. }
            | Self::LineItemMismatch { .. }
            | Self::PriceInconsistent { .. }
            | Self::AmountOverflow { .. } => ErrorKind::Validation,
            Self::PricePerUnitAboveMaximum { .. }
            | Self::SystemSizeBelowMinimum { .. }
            | Self::SystemSizeAboveMaximum { .. } => ErrorKind::BusinessRule,
        }
    }

    pub fn rule(&self) -> Option<BusinessRule> {
        match self {
            Self::PricePerUnitAboveMaximum { .. } => Some(BusinessRule::MaxPricePerUnitCapacity),
            Self::SystemSizeBelowMinimum { .. } => Some(BusinessRule::MinSystemSize),
            Self::SystemSizeAboveMaximum { .. } => Some(BusinessRule::MaxSystemSize),
            _ => None,
        }
    }
}

/// Checks a submission against the active rules. The first failing check wins.
pub fn validate(input: &PricingInput, rules: &PricingRules) -> Result<(), PricingViolation> {
    let positive = [
        (PricingField::BasePrice, input.base_price),
        (PricingField::PricePerUnitCapacity, input.price_per_unit_capacity),
        (PricingField::SystemSize, input.system_size),
    ];
    for (field, value) in positive {
        if value <= Decimal::ZERO {
            return Err(PricingViolation::OutOfRange { field, value, limit: Decimal::ZERO });
        }
    }

    if input.price_per_unit_capacity > rules.max_price_per_unit_capacity {
        return Err(PricingViolation::PricePerUnitAboveMaximum {
            value: input.price_per_unit_capacity,
            limit: rules.max_price_per_unit_capacity,
        });
    }

    if input.system_size < rules.min_system_size {
        return Err(PricingViolation::SystemSizeBelowMinimum {
            value: input.system_size,
            limit: rules.min_system_size,
        });
    }

    if input.system_size > rules.max_system_size {
        return Err(PricingViolation::SystemSizeAboveMaximum {
            value: input.system_size,
            limit: rules.max_system_size,
        });
    }

    Ok(())
}

/// Decomposes the base price into platform and contractor shares.
///
/// Markup and commission are rounded once, straight from the unrounded
/// percentage product. The remaining amounts are built from those two shares
/// so the decomposition reconciles to the cent. Callers validate first;
/// invalid input yields well-defined but meaningless output. Amounts too
/// large for `Decimal` fail with [`PricingViolation::AmountOverflow`].
pub fn calculate(
    input: &PricingInput,
    rules: &PricingRules,
) -> Result<FinancialBreakdown, PricingViolation> {
    let base_price = input.base_price;
    let markup_amount =
        round_money(share_of(base_price, rules.platform_markup_percent, "markup_amount")?);
    let commission_amount =
        round_money(share_of(base_price, rules.platform_commission_percent, "commission_amount")?);

    let total_user_price =
        base_price.checked_add(markup_amount).ok_or_else(|| overflow("total_user_price"))?;
    let contractor_net_amount = base_price
        .checked_sub(commission_amount)
        .ok_or_else(|| overflow("contractor_net_amount"))?;
    let platform_revenue = commission_amount
        .checked_add(markup_amount)
        .ok_or_else(|| overflow("platform_revenue"))?;

    Ok(FinancialBreakdown {
        base_price,
        markup_amount,
        total_user_price: round_money(total_user_price),
        commission_amount,
        contractor_net_amount: round_money(contractor_net_amount),
        platform_revenue,
    })
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationTotals {
    pub total_price: Decimal,
    pub total_commission: Decimal,
    pub total_markup: Decimal,
    pub total_user_price: Decimal,
    pub total_vendor_net: Decimal,
    pub vat_amount: Decimal,
    pub total_payable: Decimal,
}

fn sum_of(
    items: &[LineItem],
    quantity: &str,
    amount: impl Fn(&LineItem) -> Decimal,
) -> Result<Decimal, PricingViolation> {
    items.iter().try_fold(Decimal::ZERO, |total, item| {
        total.checked_add(amount(item)).ok_or_else(|| overflow(quantity))
    })
}

/// Sums pre-priced line items. Shares are not re-derived from percentages.
pub fn aggregate_line_items(
    items: &[LineItem],
    vat_rate_percent: Decimal,
) -> Result<QuotationTotals, PricingViolation> {
    let total_price = sum_of(items, "total_price", |item| item.total_price)?;
    let total_commission = sum_of(items, "total_commission", |item| item.platform_commission)?;
    let total_markup = sum_of(items, "total_markup", |item| item.platform_markup)?;
    let total_user_price = sum_of(items, "total_user_price", |item| item.user_price)?;
    let total_vendor_net = sum_of(items, "total_vendor_net", |item| item.vendor_net_price)?;

    let vat_amount = share_of(total_vendor_net, vat_rate_percent, "vat_amount")?;
    let total_payable =
        total_vendor_net.checked_add(vat_amount).ok_or_else(|| overflow("total_payable"))?;

    Ok(QuotationTotals {
        total_price: round_money(total_price),
        total_commission: round_money(total_commission),
        total_markup: round_money(total_markup),
        total_user_price: round_money(total_user_price),
        total_vendor_net: round_money(total_vendor_net),
        vat_amount: round_money(vat_amount),
        total_payable: round_money(total_payable),
    })
}

pub fn check_line_items(base_price: Decimal, items: &[LineItem]) -> Result<(), PricingViolation> {
    if items.is_empty() {
        return Ok(());
    }

    let actual = sum_of(items, "line_item_total", |item| item.total_price)?;
    if round_money(actual) != round_money(base_price) {
        return Err(PricingViolation::LineItemMismatch {
            expected: round_money(base_price),
            actual: round_money(actual),
        });
    }

    Ok(())
}

/// Base price must sit within `tolerance_percent` of price-per-unit × size.
pub fn check_price_consistency(
    input: &PricingInput,
    tolerance_percent: Decimal,
) -> Result<(), PricingViolation> {
    let expected = input
        .price_per_unit_capacity
        .checked_mul(input.system_size)
        .ok_or_else(|| overflow("expected_base_price"))?;
    let allowed = share_of(expected, tolerance_percent, "price_tolerance")?
        .abs()
        .max(Decimal::new(1, MONEY_SCALE));
    let deviation =
        input.base_price.checked_sub(expected).ok_or_else(|| overflow("price_deviation"))?;

    if deviation.abs() > allowed {
        return Err(PricingViolation::PriceInconsistent {
            value: input.base_price,
            expected: round_money(expected),
            tolerance_percent,
        });
    }

    Ok(())
}

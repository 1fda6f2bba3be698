pub mod calculator;
pub mod provider;

pub use calculator::{
    aggregate_line_items, calculate, check_line_items, check_price_consistency, percent_of,
    round_money, validate, PricingField, PricingInput, PricingViolation, QuotationTotals,
};
pub use provider::{FixedPricingProvider, PricingConfigProvider, StoreBackedPricingProvider};

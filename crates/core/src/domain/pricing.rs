use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Percentage-based business rules applied to every contractor submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRules {
    pub max_price_per_unit_capacity: Decimal,
    pub min_system_size: Decimal,
    pub max_system_size: Decimal,
    pub platform_markup_percent: Decimal,
    pub platform_commission_percent: Decimal,
    pub vat_rate_percent: Decimal,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            max_price_per_unit_capacity: Decimal::new(2000, 0),
            min_system_size: Decimal::ONE,
            max_system_size: Decimal::new(100, 0),
            platform_markup_percent: Decimal::new(10, 0),
            platform_commission_percent: Decimal::new(15, 0),
            vat_rate_percent: Decimal::new(15, 0),
        }
    }
}

impl PricingRules {
    pub fn validate(&self) -> Result<(), DomainError> {
        let percentages = [
            ("platform_markup_percent", self.platform_markup_percent),
            ("platform_commission_percent", self.platform_commission_percent),
            ("vat_rate_percent", self.vat_rate_percent),
        ];
        for (field, value) in percentages {
            if value < Decimal::ZERO {
                return Err(DomainError::InvalidInput {
                    field,
                    reason: format!("percentage must be >= 0 (got {value})"),
                });
            }
        }

        if self.vat_rate_percent > Decimal::ONE_HUNDRED {
            return Err(DomainError::InvalidInput {
                field: "vat_rate_percent",
                reason: format!("percentage must be <= 100 (got {})", self.vat_rate_percent),
            });
        }

        if self.max_price_per_unit_capacity < Decimal::ZERO {
            return Err(DomainError::InvalidInput {
                field: "max_price_per_unit_capacity",
                reason: format!("must be >= 0 (got {})", self.max_price_per_unit_capacity),
            });
        }

        if self.min_system_size > self.max_system_size {
            return Err(DomainError::InvalidInput {
                field: "min_system_size",
                reason: format!(
                    "min_system_size {} exceeds max_system_size {}",
                    self.min_system_size, self.max_system_size
                ),
            });
        }

        Ok(())
    }
}

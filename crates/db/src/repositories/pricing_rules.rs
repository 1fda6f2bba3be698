use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;

use solquote_core::domain::pricing::PricingRules;
use solquote_core::ports::{PricingRulesStore, StoreError};

use super::{decimal, RepositoryError};
use crate::DbPool;

pub struct SqlPricingRulesRepository {
    pool: DbPool,
}

impl SqlPricingRulesRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load(&self) -> Result<Option<PricingRules>, RepositoryError> {
        let row = sqlx::query(
            "SELECT max_price_per_unit_capacity, min_system_size, max_system_size,
                    platform_markup_percent, platform_commission_percent, vat_rate_percent
             FROM pricing_rules WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_rules).transpose()
    }

    async fn save(&self, rules: &PricingRules) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO pricing_rules (id, max_price_per_unit_capacity, min_system_size,
                                        max_system_size, platform_markup_percent,
                                        platform_commission_percent, vat_rate_percent, updated_at)
             VALUES (1, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 max_price_per_unit_capacity = excluded.max_price_per_unit_capacity,
                 min_system_size = excluded.min_system_size,
                 max_system_size = excluded.max_system_size,
                 platform_markup_percent = excluded.platform_markup_percent,
                 platform_commission_percent = excluded.platform_commission_percent,
                 vat_rate_percent = excluded.vat_rate_percent,
                 updated_at = excluded.updated_at",
        )
        .bind(rules.max_price_per_unit_capacity.to_string())
        .bind(rules.min_system_size.to_string())
        .bind(rules.max_system_size.to_string())
        .bind(rules.platform_markup_percent.to_string())
        .bind(rules.platform_commission_percent.to_string())
        .bind(rules.vat_rate_percent.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_rules(row: &SqliteRow) -> Result<PricingRules, RepositoryError> {
    Ok(PricingRules {
        max_price_per_unit_capacity: decimal(row, "max_price_per_unit_capacity")?,
        min_system_size: decimal(row, "min_system_size")?,
        max_system_size: decimal(row, "max_system_size")?,
        platform_markup_percent: decimal(row, "platform_markup_percent")?,
        platform_commission_percent: decimal(row, "platform_commission_percent")?,
        vat_rate_percent: decimal(row, "vat_rate_percent")?,
    })
}

#[async_trait]
impl PricingRulesStore for SqlPricingRulesRepository {
    async fn load_pricing_rules(&self) -> Result<Option<PricingRules>, StoreError> {
        Ok(self.load().await?)
    }

    async fn save_pricing_rules(&self, rules: &PricingRules) -> Result<(), StoreError> {
        Ok(self.save(rules).await?)
    }
}

use sqlx::Executor;

use solquote_core::domain::pricing::PricingRules;
use solquote_core::ports::PricingRulesStore;

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlPricingRulesRepository};

const SEED_CONTRACTOR_IDS: &[&str] = &["ctr-sunpeak", "ctr-brightgrid", "ctr-helios"];

const SEED_REQUEST_ID: &str = "req-demo-001";

const SEED_ASSIGNMENT_IDS: &[&str] = &["asg-demo-001", "asg-demo-002"];

/// Demo dataset: the default pricing rules, three contractor profiles and
/// one pending request assigned to two of them. Every insert is a no-op when
/// the row already exists, so loading twice is safe.
pub struct SeedDataset;

impl SeedDataset {
    pub const SQL: &str = r#"
INSERT INTO pricing_rules (
    id, max_price_per_unit_capacity, min_system_size, max_system_size,
    platform_markup_percent, platform_commission_percent, vat_rate_percent, updated_at
) VALUES (1, '2000', '1', '100', '10', '15', '15', '2026-01-05T09:00:00+00:00')
ON CONFLICT(id) DO NOTHING;

INSERT INTO contractor_profile (id, display_name, company_name, rating, created_at) VALUES
    ('ctr-sunpeak', 'SunPeak Installers', 'SunPeak Installers LLC', 4.8, '2026-01-05T09:00:00+00:00'),
    ('ctr-brightgrid', 'BrightGrid Energy', 'BrightGrid Energy Co', 4.5, '2026-01-05T09:00:00+00:00'),
    ('ctr-helios', 'Helios Solar', NULL, NULL, '2026-01-05T09:00:00+00:00')
ON CONFLICT(id) DO NOTHING;

INSERT INTO quote_request (
    id, user_id, system_size, location, selected_contractors_json, status,
    cancellation_reason, selected_quote_id, property_details_json, created_at, updated_at
) VALUES (
    'req-demo-001', 'usr-demo-001', '8', 'Riyadh', '["ctr-sunpeak","ctr-brightgrid"]', 'pending',
    NULL, NULL, '{"roof_type":"flat","phase":"three"}',
    '2026-01-05T09:05:00+00:00', '2026-01-05T09:05:00+00:00'
)
ON CONFLICT(id) DO NOTHING;

INSERT INTO contractor_assignment (id, request_id, contractor_id, status, assigned_at, responded_at, response_notes) VALUES
    ('asg-demo-001', 'req-demo-001', 'ctr-sunpeak', 'assigned', '2026-01-05T09:05:00+00:00', NULL, NULL),
    ('asg-demo-002', 'req-demo-001', 'ctr-brightgrid', 'assigned', '2026-01-05T09:05:00+00:00', NULL, NULL)
ON CONFLICT DO NOTHING;
"#;

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            contractors: SEED_CONTRACTOR_IDS.len(),
            requests: 1,
            assignments: SEED_ASSIGNMENT_IDS.len(),
        })
    }

    /// Checks that every seeded row is present and readable.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let rules = SqlPricingRulesRepository::new(pool.clone())
            .load_pricing_rules()
            .await
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        checks.push(("pricing-rules", rules.is_some_and(|rules| rules.validate().is_ok())));

        let contractors: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM contractor_profile WHERE id IN {}",
            sql_array_from_ids(SEED_CONTRACTOR_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("contractor-profiles", contractors == SEED_CONTRACTOR_IDS.len() as i64));

        let request: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM quote_request WHERE id = ?1)")
                .bind(SEED_REQUEST_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("demo-request", request == 1));

        let assignments: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM contractor_assignment WHERE request_id = ?1")
                .bind(SEED_REQUEST_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("demo-assignments", assignments == SEED_ASSIGNMENT_IDS.len() as i64));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded rows. Pricing rules are left in place since other data
    /// may have been priced against them.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query(&format!(
            "DELETE FROM contractor_assignment WHERE id IN {}",
            sql_array_from_ids(SEED_ASSIGNMENT_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM quote_request WHERE id = ?1")
            .bind(SEED_REQUEST_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM contractor_profile WHERE id IN {}",
            sql_array_from_ids(SEED_CONTRACTOR_IDS)
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// The rules row written by [`SeedDataset::SQL`].
    pub fn pricing_rules() -> PricingRules {
        PricingRules::default()
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(", ");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub contractors: usize,
    pub requests: usize,
    pub assignments: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

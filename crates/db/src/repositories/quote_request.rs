use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use solquote_core::domain::contractor::{ContractorId, UserId};
use solquote_core::domain::quote::ContractorQuoteId;
use solquote_core::domain::request::{QuoteRequest, QuoteRequestId, RequestStatus};
use solquote_core::ports::{QuoteRequestStore, StoreError};

use super::{decimal, optional_text, parse_enum, text, timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlQuoteRequestRepository {
    pool: DbPool,
}

impl SqlQuoteRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find(&self, id: &QuoteRequestId) -> Result<Option<QuoteRequest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, system_size, location, selected_contractors_json, status,
                    cancellation_reason, selected_quote_id, property_details_json,
                    created_at, updated_at
             FROM quote_request WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn save(&self, request: &QuoteRequest) -> Result<(), RepositoryError> {
        let selected_json = selected_json(request)?;
        let details_json = serde_json::to_string(&request.property_details)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO quote_request (id, user_id, system_size, location,
                                        selected_contractors_json, status, cancellation_reason,
                                        selected_quote_id, property_details_json,
                                        created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 system_size = excluded.system_size,
                 location = excluded.location,
                 selected_contractors_json = excluded.selected_contractors_json,
                 status = excluded.status,
                 cancellation_reason = excluded.cancellation_reason,
                 selected_quote_id = excluded.selected_quote_id,
                 property_details_json = excluded.property_details_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&request.id.0)
        .bind(&request.user_id.0)
        .bind(request.system_size.to_string())
        .bind(&request.location)
        .bind(selected_json)
        .bind(request.status.as_str())
        .bind(&request.cancellation_reason)
        .bind(request.selected_quote_id.as_ref().map(|id| id.0.as_str()))
        .bind(details_json)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_if_unchanged(
        &self,
        expected: &QuoteRequest,
        request: &QuoteRequest,
    ) -> Result<(), RepositoryError> {
        let details_json = serde_json::to_string(&request.property_details)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE quote_request SET
                 system_size = ?, location = ?, selected_contractors_json = ?, status = ?,
                 cancellation_reason = ?, selected_quote_id = ?, property_details_json = ?,
                 updated_at = ?
             WHERE id = ? AND status = ? AND selected_contractors_json = ?",
        )
        .bind(request.system_size.to_string())
        .bind(&request.location)
        .bind(selected_json(request)?)
        .bind(request.status.as_str())
        .bind(&request.cancellation_reason)
        .bind(request.selected_quote_id.as_ref().map(|id| id.0.as_str()))
        .bind(details_json)
        .bind(request.updated_at.to_rfc3339())
        .bind(&expected.id.0)
        .bind(expected.status.as_str())
        .bind(selected_json(expected)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Stale(format!(
                "quote request `{}` is no longer `{}` with the expected contractors",
                expected.id, expected.status
            )));
        }
        Ok(())
    }
}

fn selected_json(request: &QuoteRequest) -> Result<String, RepositoryError> {
    let selected: Vec<&str> = request.selected_contractors.iter().map(|id| id.0.as_str()).collect();
    serde_json::to_string(&selected).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_request(row: &SqliteRow) -> Result<QuoteRequest, RepositoryError> {
    let selected_raw = text(row, "selected_contractors_json")?;
    let selected: Vec<String> = serde_json::from_str(&selected_raw)
        .map_err(|e| RepositoryError::Decode(format!("selected_contractors_json: {e}")))?;
    let details_raw = text(row, "property_details_json")?;
    let property_details: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&details_raw)
            .map_err(|e| RepositoryError::Decode(format!("property_details_json: {e}")))?;

    Ok(QuoteRequest {
        id: QuoteRequestId(text(row, "id")?),
        user_id: UserId(text(row, "user_id")?),
        system_size: decimal(row, "system_size")?,
        location: text(row, "location")?,
        selected_contractors: selected.into_iter().map(ContractorId).collect(),
        status: parse_enum::<RequestStatus>("status", &text(row, "status")?)?,
        cancellation_reason: optional_text(row, "cancellation_reason")?,
        selected_quote_id: optional_text(row, "selected_quote_id")?.map(ContractorQuoteId),
        property_details,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

#[async_trait]
impl QuoteRequestStore for SqlQuoteRequestRepository {
    async fn find_request(&self, id: &QuoteRequestId) -> Result<Option<QuoteRequest>, StoreError> {
        Ok(self.find(id).await?)
    }

    async fn save_request(&self, request: &QuoteRequest) -> Result<(), StoreError> {
        Ok(self.save(request).await?)
    }

    async fn update_request(
        &self,
        expected: &QuoteRequest,
        request: &QuoteRequest,
    ) -> Result<(), StoreError> {
        Ok(self.update_if_unchanged(expected, request).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use solquote_core::domain::contractor::{ContractorId, UserId};
    use solquote_core::domain::request::{QuoteRequest, QuoteRequestId, RequestStatus};
    use solquote_core::ports::{QuoteRequestStore, StoreError};

    use super::SqlQuoteRequestRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn request() -> QuoteRequest {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).single().expect("timestamp");
        let mut details = BTreeMap::new();
        details.insert("roof_type".to_string(), serde_json::json!("flat"));
        details.insert("monthly_kwh".to_string(), serde_json::json!(1450));

        QuoteRequest {
            id: QuoteRequestId("REQ-1".to_string()),
            user_id: UserId("user-1".to_string()),
            system_size: Decimal::new(125, 1),
            location: "Jeddah".to_string(),
            selected_contractors: vec![
                ContractorId("c-2".to_string()),
                ContractorId("c-1".to_string()),
            ],
            status: RequestStatus::Pending,
            cancellation_reason: None,
            selected_quote_id: None,
            property_details: details,
            created_at: created,
            updated_at: created,
        }
    }

    #[tokio::test]
    async fn save_and_find_preserves_every_field() {
        let repo = SqlQuoteRequestRepository::new(setup().await);
        let request = request();

        repo.save_request(&request).await.expect("save");
        let found = repo.find_request(&request.id).await.expect("find");

        assert_eq!(found, Some(request));
    }

    #[tokio::test]
    async fn save_updates_status_in_place() {
        let repo = SqlQuoteRequestRepository::new(setup().await);
        let mut request = request();
        repo.save_request(&request).await.expect("save");

        request.status = RequestStatus::Cancelled;
        request.cancellation_reason = Some("changed plans".to_string());
        repo.save_request(&request).await.expect("update");

        let found = repo.find_request(&request.id).await.expect("find").expect("present");
        assert_eq!(found.status, RequestStatus::Cancelled);
        assert_eq!(found.cancellation_reason.as_deref(), Some("changed plans"));
    }

    #[tokio::test]
    async fn conditional_update_refuses_a_changed_row() {
        let repo = SqlQuoteRequestRepository::new(setup().await);
        let loaded = request();
        repo.save_request(&loaded).await.expect("save");

        let mut cancelled = loaded.clone();
        cancelled.status = RequestStatus::Cancelled;
        cancelled.cancellation_reason = Some("changed plans".to_string());
        repo.update_request(&loaded, &cancelled).await.expect("first writer wins");

        let mut received = loaded.clone();
        received.status = RequestStatus::QuotesReceived;
        let error = repo.update_request(&loaded, &received).await.expect_err("stale snapshot");
        assert!(matches!(error, StoreError::Stale(_)));

        let found = repo.find_request(&loaded.id).await.expect("find").expect("present");
        assert_eq!(found.status, RequestStatus::Cancelled);
        assert_eq!(found.cancellation_reason.as_deref(), Some("changed plans"));
    }

    #[tokio::test]
    async fn conditional_update_checks_the_contractor_selection() {
        let repo = SqlQuoteRequestRepository::new(setup().await);
        let loaded = request();
        repo.save_request(&loaded).await.expect("save");

        let mut widened = loaded.clone();
        widened.selected_contractors.push(ContractorId("c-3".to_string()));
        repo.update_request(&loaded, &widened).await.expect("first selection");

        let mut other = loaded.clone();
        other.selected_contractors.push(ContractorId("c-4".to_string()));
        assert!(repo.update_request(&loaded, &other).await.is_err());

        let found = repo.find_request(&loaded.id).await.expect("find").expect("present");
        assert_eq!(found.selected_contractors, widened.selected_contractors);
    }

    #[tokio::test]
    async fn legacy_open_status_is_readable() {
        let pool = setup().await;
        sqlx::query(
            "INSERT INTO quote_request (id, user_id, system_size, location, status, created_at, updated_at)
             VALUES ('REQ-OLD', 'user-9', '5', 'Dammam', 'open', '2025-06-01T00:00:00Z', '2025-06-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert legacy row");

        let repo = SqlQuoteRequestRepository::new(pool);
        let found = repo
            .find_request(&QuoteRequestId("REQ-OLD".to_string()))
            .await
            .expect("find")
            .expect("present");
        assert_eq!(found.status, RequestStatus::Open);
        assert!(found.selected_contractors.is_empty());
        assert!(found.property_details.is_empty());
    }
}

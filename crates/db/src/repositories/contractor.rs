use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use solquote_core::domain::contractor::{ContractorId, ContractorInfo};
use solquote_core::ports::{ContractorDirectory, StoreError};

use super::{optional_text, text, RepositoryError};
use crate::DbPool;

/// Reads contractor display data from the locally mirrored `contractor_profile`
/// table.
pub struct SqlContractorDirectory {
    pool: DbPool,
}

impl SqlContractorDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_profile(&self, info: &ContractorInfo) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO contractor_profile (id, display_name, company_name, rating, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 company_name = excluded.company_name,
                 rating = excluded.rating",
        )
        .bind(&info.id.0)
        .bind(&info.display_name)
        .bind(&info.company_name)
        .bind(info.rating.map(f64::from))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_many(&self, ids: &[ContractorId]) -> Result<Vec<ContractorInfo>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, display_name, company_name, rating
             FROM contractor_profile WHERE id IN ({placeholders}) ORDER BY id ASC"
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(&id.0);
        }
        let rows: Vec<SqliteRow> = query.fetch_all(&self.pool).await?;

        rows.iter().map(row_to_info).collect::<Result<Vec<_>, _>>()
    }
}

fn row_to_info(row: &SqliteRow) -> Result<ContractorInfo, RepositoryError> {
    let rating: Option<f64> =
        row.try_get("rating").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ContractorInfo {
        id: ContractorId(text(row, "id")?),
        display_name: text(row, "display_name")?,
        company_name: optional_text(row, "company_name")?,
        rating: rating.map(|value| value as f32),
    })
}

#[async_trait]
impl ContractorDirectory for SqlContractorDirectory {
    async fn find_contractors(
        &self,
        ids: &[ContractorId],
    ) -> Result<Vec<ContractorInfo>, StoreError> {
        Ok(self.find_many(ids).await?)
    }
}

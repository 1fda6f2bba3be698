use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use solquote_core::domain::assignment::{AssignmentId, AssignmentStatus, ContractorAssignment};
use solquote_core::domain::contractor::ContractorId;
use solquote_core::domain::request::QuoteRequestId;
use solquote_core::ports::{AssignmentStore, StoreError};

use super::{optional_text, optional_timestamp, parse_enum, text, timestamp, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str =
    "SELECT id, request_id, contractor_id, status, assigned_at, responded_at, response_notes
     FROM contractor_assignment";

pub struct SqlAssignmentRepository {
    pool: DbPool,
}

impl SqlAssignmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn list(
        &self,
        request_id: &QuoteRequestId,
    ) -> Result<Vec<ContractorAssignment>, RepositoryError> {
        let rows: Vec<SqliteRow> = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE request_id = ? ORDER BY assigned_at ASC, contractor_id ASC"
        ))
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_assignment).collect::<Result<Vec<_>, _>>()
    }

    async fn find(
        &self,
        request_id: &QuoteRequestId,
        contractor_id: &ContractorId,
    ) -> Result<Option<ContractorAssignment>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE request_id = ? AND contractor_id = ?"
        ))
        .bind(&request_id.0)
        .bind(&contractor_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_assignment).transpose()
    }

    async fn insert_all(
        &self,
        assignments: &[ContractorAssignment],
    ) -> Result<Vec<AssignmentId>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::new();

        for assignment in assignments {
            let result = sqlx::query(
                "INSERT INTO contractor_assignment (id, request_id, contractor_id, status,
                                                    assigned_at, responded_at, response_notes)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(request_id, contractor_id) DO NOTHING",
            )
            .bind(&assignment.id.0)
            .bind(&assignment.request_id.0)
            .bind(&assignment.contractor_id.0)
            .bind(assignment.status.as_str())
            .bind(assignment.assigned_at.to_rfc3339())
            .bind(assignment.responded_at.map(|at| at.to_rfc3339()))
            .bind(&assignment.response_notes)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 1 {
                inserted.push(assignment.id.clone());
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn update(&self, assignment: &ContractorAssignment) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE contractor_assignment
             SET status = ?, responded_at = ?, response_notes = ?
             WHERE id = ?",
        )
        .bind(assignment.status.as_str())
        .bind(assignment.responded_at.map(|at| at.to_rfc3339()))
        .bind(&assignment.response_notes)
        .bind(&assignment.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_assignment(row: &SqliteRow) -> Result<ContractorAssignment, RepositoryError> {
    Ok(ContractorAssignment {
        id: AssignmentId(text(row, "id")?),
        request_id: QuoteRequestId(text(row, "request_id")?),
        contractor_id: ContractorId(text(row, "contractor_id")?),
        status: parse_enum::<AssignmentStatus>("status", &text(row, "status")?)?,
        assigned_at: timestamp(row, "assigned_at")?,
        responded_at: optional_timestamp(row, "responded_at")?,
        response_notes: optional_text(row, "response_notes")?,
    })
}

#[async_trait]
impl AssignmentStore for SqlAssignmentRepository {
    async fn list_for_request(
        &self,
        request_id: &QuoteRequestId,
    ) -> Result<Vec<ContractorAssignment>, StoreError> {
        Ok(self.list(request_id).await?)
    }

    async fn find_assignment(
        &self,
        request_id: &QuoteRequestId,
        contractor_id: &ContractorId,
    ) -> Result<Option<ContractorAssignment>, StoreError> {
        Ok(self.find(request_id, contractor_id).await?)
    }

    async fn insert_assignments(
        &self,
        assignments: &[ContractorAssignment],
    ) -> Result<Vec<AssignmentId>, StoreError> {
        Ok(self.insert_all(assignments).await?)
    }

    async fn update_assignment(&self, assignment: &ContractorAssignment) -> Result<(), StoreError> {
        Ok(self.update(assignment).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use solquote_core::domain::assignment::{
        AssignmentDecision, AssignmentId, AssignmentStatus, ContractorAssignment,
    };
    use solquote_core::domain::contractor::ContractorId;
    use solquote_core::domain::request::QuoteRequestId;
    use solquote_core::ports::AssignmentStore;

    use super::SqlAssignmentRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        sqlx::query(
            "INSERT INTO quote_request (id, user_id, system_size, location, status, created_at, updated_at)
             VALUES ('REQ-1', 'user-1', '10', 'Riyadh', 'pending', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert parent request");
        pool
    }

    fn assignment(id: &str, contractor: &str) -> ContractorAssignment {
        ContractorAssignment::new(
            AssignmentId(id.to_string()),
            QuoteRequestId("REQ-1".to_string()),
            ContractorId(contractor.to_string()),
            Utc.with_ymd_and_hms(2026, 1, 2, 8, 0, 0).single().expect("timestamp"),
        )
    }

    #[tokio::test]
    async fn insert_skips_existing_pairs() {
        let repo = SqlAssignmentRepository::new(setup().await);

        let first = repo
            .insert_assignments(&[assignment("A-1", "c-1"), assignment("A-2", "c-2")])
            .await
            .expect("first insert");
        assert_eq!(first.len(), 2);

        let second = repo
            .insert_assignments(&[assignment("A-3", "c-2"), assignment("A-4", "c-3")])
            .await
            .expect("second insert");
        assert_eq!(second, vec![AssignmentId("A-4".to_string())]);

        let all = repo
            .list_for_request(&QuoteRequestId("REQ-1".to_string()))
            .await
            .expect("list");
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn update_persists_response() {
        let repo = SqlAssignmentRepository::new(setup().await);
        repo.insert_assignments(&[assignment("A-1", "c-1")]).await.expect("insert");

        let request_id = QuoteRequestId("REQ-1".to_string());
        let contractor_id = ContractorId("c-1".to_string());
        let mut stored =
            repo.find_assignment(&request_id, &contractor_id).await.expect("find").expect("present");
        stored
            .respond(AssignmentDecision::Accept, Some("can start in May".to_string()), Utc::now())
            .expect("respond");
        repo.update_assignment(&stored).await.expect("update");

        let reloaded =
            repo.find_assignment(&request_id, &contractor_id).await.expect("find").expect("present");
        assert_eq!(reloaded.status, AssignmentStatus::Accepted);
        assert!(reloaded.responded_at.is_some());
        assert_eq!(reloaded.response_notes.as_deref(), Some("can start in May"));
    }
}

//! Derives a request's aggregate status from its contractor assignments.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::assignment::{
    AssignmentDecision, AssignmentId, ContractorAssignment,
};
use crate::domain::contractor::{new_record_id, ContractorId};
use crate::domain::request::{QuoteRequest, QuoteRequestId, RequestStatus};
use crate::errors::ApplicationError;
use crate::lifecycle::{AssignmentTally, QuoteRequestLifecycle, RequestEvent, TransitionOutcome};
use crate::ports::{AssignmentStore, QuoteRequestStore, StoreError};

/// A status write that loses a race re-reads the request and is decided
/// again, at most this many times.
const RECONCILE_ATTEMPTS: usize = 3;

pub struct AssignmentCoordinator {
    requests: Arc<dyn QuoteRequestStore>,
    assignments: Arc<dyn AssignmentStore>,
    lifecycle: QuoteRequestLifecycle,
}

impl AssignmentCoordinator {
    pub fn new(
        requests: Arc<dyn QuoteRequestStore>,
        assignments: Arc<dyn AssignmentStore>,
        lifecycle: QuoteRequestLifecycle,
    ) -> Self {
        Self { requests, assignments, lifecycle }
    }

    /// Creates one `assigned` record per contractor. Pairs that already
    /// exist, and repeats within `contractor_ids`, are skipped silently.
    pub async fn create_assignments(
        &self,
        request_id: &QuoteRequestId,
        contractor_ids: &[ContractorId],
    ) -> Result<Vec<ContractorAssignment>, ApplicationError> {
        let existing = self.assignments.list_for_request(request_id).await?;
        let now = Utc::now();

        let mut fresh: Vec<ContractorAssignment> = Vec::new();
        for contractor_id in contractor_ids {
            let known = existing.iter().any(|assignment| &assignment.contractor_id == contractor_id)
                || fresh.iter().any(|assignment| &assignment.contractor_id == contractor_id);
            if known {
                continue;
            }
            fresh.push(ContractorAssignment::new(
                AssignmentId(new_record_id()),
                request_id.clone(),
                contractor_id.clone(),
                now,
            ));
        }

        if fresh.is_empty() {
            return Ok(Vec::new());
        }

        let inserted = self.assignments.insert_assignments(&fresh).await?;
        fresh.retain(|assignment| inserted.contains(&assignment.id));
        Ok(fresh)
    }

    pub async fn mark_viewed(
        &self,
        request_id: &QuoteRequestId,
        contractor_id: &ContractorId,
    ) -> Result<ContractorAssignment, ApplicationError> {
        let mut assignment = self.find(request_id, contractor_id).await?;
        if assignment.mark_viewed() {
            self.assignments.update_assignment(&assignment).await?;
        }
        Ok(assignment)
    }

    /// Stores the contractor's response and re-derives the request status.
    pub async fn record_response(
        &self,
        request_id: &QuoteRequestId,
        contractor_id: &ContractorId,
        decision: AssignmentDecision,
        notes: Option<String>,
    ) -> Result<(ContractorAssignment, TransitionOutcome), ApplicationError> {
        let mut assignment = self.find(request_id, contractor_id).await?;
        assignment.respond(decision, notes, Utc::now())?;
        self.assignments.update_assignment(&assignment).await?;

        let outcome = self.reconcile(request_id).await?;
        Ok((assignment, outcome))
    }

    /// Re-derives the request status from a fresh read of every assignment.
    /// Idempotent, and independent of the order responses arrived in.
    pub async fn recompute(
        &self,
        request_id: &QuoteRequestId,
    ) -> Result<RequestStatus, ApplicationError> {
        Ok(self.reconcile(request_id).await?.to)
    }

    pub async fn reconcile(
        &self,
        request_id: &QuoteRequestId,
    ) -> Result<TransitionOutcome, ApplicationError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let loaded = self.load_request(request_id).await?;
            let assignments = self.assignments.list_for_request(request_id).await?;
            let tally = AssignmentTally::from_assignments(&assignments);

            let outcome =
                self.lifecycle.apply(loaded.status, &RequestEvent::AssignmentsTallied(tally))?;
            if !outcome.changed() {
                return Ok(outcome);
            }

            let mut request = loaded.clone();
            request.status = outcome.to;
            request.updated_at = Utc::now();
            match self.requests.update_request(&loaded, &request).await {
                Ok(()) => return Ok(outcome),
                Err(StoreError::Stale(_)) if attempt < RECONCILE_ATTEMPTS => continue,
                Err(error) => return Err(error.into()),
            }
        }
    }

    async fn find(
        &self,
        request_id: &QuoteRequestId,
        contractor_id: &ContractorId,
    ) -> Result<ContractorAssignment, ApplicationError> {
        self.assignments.find_assignment(request_id, contractor_id).await?.ok_or_else(|| {
            ApplicationError::not_found("assignment", format!("{request_id}/{contractor_id}"))
        })
    }

    async fn load_request(
        &self,
        request_id: &QuoteRequestId,
    ) -> Result<QuoteRequest, ApplicationError> {
        self.requests
            .find_request(request_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("quote_request", request_id.0.clone()))
    }
}

//! `QuoteService` is the engine's only entry point for callers. Every
//! operation takes plain data plus a [`CallContext`] and returns plain data
//! or an [`ApplicationError`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assignments::AssignmentCoordinator;
use crate::audit::{AuditContext, AuditEvent, AuditEventType, AuditSink, TracingAuditSink};
use crate::domain::assignment::{AssignmentDecision, AssignmentStatus, ContractorAssignment};
use crate::domain::contractor::{new_record_id, Actor, ContractorId, ContractorInfo, Role, UserId};
use crate::domain::quote::{
    ContractorQuote, ContractorQuoteId, FinancialBreakdown, LineItem, ReviewStatus,
};
use crate::domain::request::{QuoteRequest, QuoteRequestId, RequestStatus};
use crate::errors::{ApplicationError, BusinessRule, DomainError};
use crate::lifecycle::{
    LifecycleContext, QuoteRequestLifecycle, RequestEvent, SubmissionGate, TransitionOutcome,
};
use crate::ports::{
    AssignmentStore, ContractorDirectory, ContractorQuoteStore, QuoteRequestStore, StoreError,
};
use crate::pricing::{
    aggregate_line_items, calculate, check_line_items, check_price_consistency, validate,
    PricingConfigProvider, PricingField, PricingInput, PricingViolation, QuotationTotals,
};

/// Submissions re-read the request and retry when a concurrent write moved it
/// between load and store.
const SUBMISSION_ATTEMPTS: usize = 3;

/// The authenticated caller plus the correlation id threaded through logs
/// and audit events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub actor: Actor,
    pub correlation_id: String,
}

impl CallContext {
    pub fn new(actor: Actor) -> Self {
        Self { actor, correlation_id: new_record_id() }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    fn audit(&self, request_id: &QuoteRequestId) -> AuditContext {
        AuditContext::new(
            Some(request_id.clone()),
            self.correlation_id.clone(),
            self.actor.id.clone(),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_contractors_per_request: usize,
    pub submission_gate: SubmissionGate,
    pub consistency_tolerance_percent: Decimal,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_contractors_per_request: 10,
            submission_gate: SubmissionGate::Selected,
            consistency_tolerance_percent: Decimal::ONE,
        }
    }
}

/// Adapters the service is wired with.
#[derive(Clone)]
pub struct ServicePorts {
    pub requests: Arc<dyn QuoteRequestStore>,
    pub assignments: Arc<dyn AssignmentStore>,
    pub quotes: Arc<dyn ContractorQuoteStore>,
    pub directory: Arc<dyn ContractorDirectory>,
    pub pricing: Arc<dyn PricingConfigProvider>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewQuoteRequest {
    pub system_size: Decimal,
    pub location: String,
    #[serde(default)]
    pub contractor_ids: Vec<ContractorId>,
    #[serde(default)]
    pub property_details: BTreeMap<String, serde_json::Value>,
}

/// A contractor's submission. Line items arrive pre-priced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSubmission {
    pub request_id: QuoteRequestId,
    pub base_price: Decimal,
    pub price_per_unit_capacity: Decimal,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractorResponse {
    pub assignment: ContractorAssignment,
    pub request_status: RequestStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentView {
    pub contractor_id: ContractorId,
    pub status: AssignmentStatus,
    pub responded_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequestStatusView {
    pub request_id: QuoteRequestId,
    pub status: RequestStatus,
    pub selected_contractors: Vec<ContractorId>,
    pub assignments: Vec<AssignmentView>,
    pub quote_count: usize,
    pub selected_quote_id: Option<ContractorQuoteId>,
    pub cancellation_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestQuoteView {
    pub quote: ContractorQuote,
    pub contractor: Option<ContractorInfo>,
    pub totals: QuotationTotals,
}

pub struct QuoteService {
    requests: Arc<dyn QuoteRequestStore>,
    assignments: Arc<dyn AssignmentStore>,
    quotes: Arc<dyn ContractorQuoteStore>,
    directory: Arc<dyn ContractorDirectory>,
    pricing: Arc<dyn PricingConfigProvider>,
    coordinator: AssignmentCoordinator,
    lifecycle: QuoteRequestLifecycle,
    settings: EngineSettings,
    audit: Arc<dyn AuditSink>,
}

impl QuoteService {
    pub fn new(ports: ServicePorts, settings: EngineSettings) -> Self {
        let lifecycle = QuoteRequestLifecycle::new(LifecycleContext {
            submission_gate: settings.submission_gate,
        });
        let coordinator = AssignmentCoordinator::new(
            ports.requests.clone(),
            ports.assignments.clone(),
            lifecycle,
        );

        Self {
            requests: ports.requests,
            assignments: ports.assignments,
            quotes: ports.quotes,
            directory: ports.directory,
            pricing: ports.pricing,
            coordinator,
            lifecycle,
            settings,
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn create_quote_request(
        &self,
        ctx: &CallContext,
        input: NewQuoteRequest,
    ) -> Result<QuoteRequest, ApplicationError> {
        if ctx.actor.role != Role::User {
            return Err(ApplicationError::Forbidden(
                "only users can create quote requests".to_string(),
            ));
        }
        if input.system_size <= Decimal::ZERO {
            return Err(PricingViolation::OutOfRange {
                field: PricingField::SystemSize,
                value: input.system_size,
                limit: Decimal::ZERO,
            }
            .into());
        }
        if input.location.trim().is_empty() {
            return Err(DomainError::InvalidInput {
                field: "location",
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let mut request = QuoteRequest {
            id: QuoteRequestId(new_record_id()),
            user_id: UserId(ctx.actor.id.clone()),
            system_size: input.system_size,
            location: input.location.trim().to_string(),
            selected_contractors: Vec::new(),
            status: self.lifecycle.initial_state(),
            cancellation_reason: None,
            selected_quote_id: None,
            property_details: input.property_details,
            created_at: now,
            updated_at: now,
        };
        request.select_contractors(
            &input.contractor_ids,
            self.settings.max_contractors_per_request,
        )?;

        self.requests.save_request(&request).await?;
        let created = match self
            .coordinator
            .create_assignments(&request.id, &request.selected_contractors)
            .await
        {
            Ok(created) => created,
            Err(error) => {
                warn!(
                    event_name = "request.fan_out_failed",
                    correlation_id = %ctx.correlation_id,
                    request_id = %request.id,
                    error = %error,
                    "quote request stored without its assignments"
                );
                return Err(ApplicationError::Persistence(format!(
                    "quote request `{}` was stored but its assignments were not ({error}); \
                     repeat select_contractors on it to retry",
                    request.id
                )));
            }
        };

        info!(
            event_name = "request.created",
            correlation_id = %ctx.correlation_id,
            request_id = %request.id,
            contractors = created.len(),
            "quote request created"
        );
        self.audit.emit(
            AuditEvent::new(&ctx.audit(&request.id), AuditEventType::RequestCreated)
                .with_metadata("contractors", created.len().to_string()),
        );

        Ok(request)
    }

    /// Adds contractors to a request and fans out assignments for the whole
    /// selection. Contractors that already hold an assignment are skipped, so
    /// repeating the call repairs a request whose earlier fan-out failed.
    pub async fn select_contractors(
        &self,
        ctx: &CallContext,
        request_id: &QuoteRequestId,
        contractor_ids: &[ContractorId],
    ) -> Result<QuoteRequest, ApplicationError> {
        let loaded = self.load_request(request_id).await?;
        ensure_owner_or_admin(&ctx.actor, &loaded)?;

        let mut request = loaded.clone();
        let added = request
            .select_contractors(contractor_ids, self.settings.max_contractors_per_request)?;
        let outcome = self.apply_event(ctx, &request, RequestEvent::ContractorsSelected)?;
        request.status = outcome.to;
        request.updated_at = Utc::now();
        self.requests.update_request(&loaded, &request).await?;

        let created =
            self.coordinator.create_assignments(&request.id, &request.selected_contractors).await?;

        info!(
            event_name = "request.contractors_selected",
            correlation_id = %ctx.correlation_id,
            request_id = %request.id,
            added = added.len(),
            assignments_created = created.len(),
            "contractors selected"
        );
        self.audit.emit(
            AuditEvent::new(&ctx.audit(&request.id), AuditEventType::ContractorsSelected)
                .with_metadata("added", added.len().to_string()),
        );

        Ok(request)
    }

    pub async fn mark_assignment_viewed(
        &self,
        ctx: &CallContext,
        request_id: &QuoteRequestId,
    ) -> Result<ContractorAssignment, ApplicationError> {
        let contractor_id = require_contractor(&ctx.actor)?;
        let assignment = self.coordinator.mark_viewed(request_id, &contractor_id).await?;

        info!(
            event_name = "assignment.viewed",
            correlation_id = %ctx.correlation_id,
            request_id = %request_id,
            contractor_id = %contractor_id,
            status = assignment.status.as_str(),
            "assignment viewed"
        );
        Ok(assignment)
    }

    pub async fn contractor_respond(
        &self,
        ctx: &CallContext,
        request_id: &QuoteRequestId,
        decision: AssignmentDecision,
        notes: Option<String>,
    ) -> Result<ContractorResponse, ApplicationError> {
        let contractor_id = require_contractor(&ctx.actor)?;
        let request = self.load_request(request_id).await?;
        if request.status.is_terminal() {
            return Err(invalid_request_status(request.status));
        }

        let result =
            self.coordinator.record_response(request_id, &contractor_id, decision, notes).await;
        let (assignment, outcome) = match result {
            Ok(value) => value,
            Err(error) => {
                self.emit_rejected(ctx, request_id, AuditEventType::AssignmentResponseRejected, &error);
                return Err(error);
            }
        };

        info!(
            event_name = "assignment.responded",
            correlation_id = %ctx.correlation_id,
            request_id = %request_id,
            contractor_id = %contractor_id,
            decision = assignment.status.as_str(),
            request_status = outcome.to.as_str(),
            "contractor responded to assignment"
        );
        self.audit.emit(
            AuditEvent::new(&ctx.audit(request_id), AuditEventType::AssignmentResponded)
                .with_metadata("contractor_id", contractor_id.0.clone())
                .with_metadata("status", assignment.status.as_str()),
        );
        self.emit_transition(ctx, request_id, &outcome);

        Ok(ContractorResponse { assignment, request_status: outcome.to })
    }

    pub async fn submit_quote(
        &self,
        ctx: &CallContext,
        submission: QuoteSubmission,
    ) -> Result<ContractorQuote, ApplicationError> {
        let contractor_id = require_contractor(&ctx.actor)?;

        // The request row is written first and conditionally, so a request
        // cancelled mid-submission never gains a quote or a new status.
        let mut attempt = 0;
        let (request, quote, outcome) = loop {
            attempt += 1;
            let loaded = self.load_request(&submission.request_id).await?;

            let result = self.prepare_submission(&loaded, &contractor_id, &submission).await;
            let (quote, outcome) = match result {
                Ok(value) => value,
                Err(error) => {
                    self.emit_rejected(ctx, &loaded.id, AuditEventType::QuoteSubmissionRejected, &error);
                    return Err(error);
                }
            };

            let mut request = loaded.clone();
            request.status = outcome.to;
            request.updated_at = quote.created_at;
            match self.requests.update_request(&loaded, &request).await {
                Ok(()) => break (request, quote, outcome),
                Err(StoreError::Stale(_)) if attempt < SUBMISSION_ATTEMPTS => continue,
                Err(error) => return Err(error.into()),
            }
        };

        self.quotes.insert_quote_with_line_items(&quote).await?;

        info!(
            event_name = "quote.submitted",
            correlation_id = %ctx.correlation_id,
            request_id = %request.id,
            contractor_id = %contractor_id,
            quote_id = %quote.id,
            base_price = %quote.breakdown.base_price,
            total_user_price = %quote.breakdown.total_user_price,
            "contractor quote submitted"
        );
        self.audit.emit(
            AuditEvent::new(&ctx.audit(&request.id), AuditEventType::QuoteSubmitted)
                .with_metadata("quote_id", quote.id.0.clone())
                .with_metadata("contractor_id", contractor_id.0.clone())
                .with_metadata("base_price", quote.breakdown.base_price.to_string()),
        );
        self.emit_transition(ctx, &request.id, &outcome);

        Ok(quote)
    }

    async fn prepare_submission(
        &self,
        request: &QuoteRequest,
        contractor_id: &ContractorId,
        submission: &QuoteSubmission,
    ) -> Result<(ContractorQuote, TransitionOutcome), ApplicationError> {
        self.ensure_may_submit(request, contractor_id).await?;

        if self.quotes.find_by_request_and_contractor(&request.id, contractor_id).await?.is_some()
        {
            return Err(ApplicationError::Conflict(format!(
                "contractor `{contractor_id}` already submitted a quote for request `{}`",
                request.id
            )));
        }

        let outcome = self.lifecycle.apply(request.status, &RequestEvent::QuoteSubmitted)?;

        let input = PricingInput {
            base_price: submission.base_price,
            price_per_unit_capacity: submission.price_per_unit_capacity,
            system_size: request.system_size,
        };
        let rules = self.pricing.get_rules().await;
        validate(&input, &rules)?;
        check_price_consistency(&input, self.settings.consistency_tolerance_percent)?;
        check_line_items(input.base_price, &submission.line_items)?;

        let mut line_items = submission.line_items.clone();
        line_items.sort_by_key(|item| item.position);

        let now = Utc::now();
        let quote = ContractorQuote {
            id: ContractorQuoteId(new_record_id()),
            request_id: request.id.clone(),
            contractor_id: contractor_id.clone(),
            system_size: request.system_size,
            price_per_unit_capacity: input.price_per_unit_capacity,
            breakdown: calculate(&input, &rules)?,
            review_status: ReviewStatus::PendingReview,
            review_notes: None,
            notes: submission.notes.clone(),
            line_items,
            created_at: now,
            updated_at: now,
        };

        Ok((quote, outcome))
    }

    async fn ensure_may_submit(
        &self,
        request: &QuoteRequest,
        contractor_id: &ContractorId,
    ) -> Result<(), ApplicationError> {
        let eligible = match self.settings.submission_gate {
            SubmissionGate::Selected => request.has_selected(contractor_id),
            SubmissionGate::Accepted => self
                .assignments
                .find_assignment(&request.id, contractor_id)
                .await?
                .is_some_and(|assignment| assignment.status == AssignmentStatus::Accepted),
        };

        if eligible {
            return Ok(());
        }

        let limit = match self.settings.submission_gate {
            SubmissionGate::Selected => "selected_contractor",
            SubmissionGate::Accepted => "accepted_assignment",
        };
        Err(DomainError::BusinessRule {
            rule: BusinessRule::SubmissionEligibility,
            message: "contractor is not eligible to quote on this request".to_string(),
            actual: Some(contractor_id.0.clone()),
            limit: Some(limit.to_string()),
        }
        .into())
    }

    pub async fn approve_quote(
        &self,
        ctx: &CallContext,
        quote_id: &ContractorQuoteId,
        notes: Option<String>,
    ) -> Result<ContractorQuote, ApplicationError> {
        self.review_quote(ctx, quote_id, ReviewStatus::Approved, notes).await
    }

    pub async fn reject_quote(
        &self,
        ctx: &CallContext,
        quote_id: &ContractorQuoteId,
        notes: Option<String>,
    ) -> Result<ContractorQuote, ApplicationError> {
        self.review_quote(ctx, quote_id, ReviewStatus::Rejected, notes).await
    }

    pub async fn request_quote_revision(
        &self,
        ctx: &CallContext,
        quote_id: &ContractorQuoteId,
        notes: Option<String>,
    ) -> Result<ContractorQuote, ApplicationError> {
        self.review_quote(ctx, quote_id, ReviewStatus::RevisionNeeded, notes).await
    }

    async fn review_quote(
        &self,
        ctx: &CallContext,
        quote_id: &ContractorQuoteId,
        next: ReviewStatus,
        notes: Option<String>,
    ) -> Result<ContractorQuote, ApplicationError> {
        if !ctx.actor.is_admin() {
            return Err(ApplicationError::Forbidden("only admins can review quotes".to_string()));
        }

        let mut quote = self.load_quote(quote_id).await?;
        let previous = quote.review_status;
        if let Err(error) = quote.review(next, notes, Utc::now()) {
            let error = ApplicationError::from(error);
            self.emit_rejected(ctx, &quote.request_id, AuditEventType::QuoteReviewRejected, &error);
            return Err(error);
        }
        self.quotes.update_quote(&quote).await?;

        info!(
            event_name = "quote.reviewed",
            correlation_id = %ctx.correlation_id,
            request_id = %quote.request_id,
            quote_id = %quote.id,
            from = previous.as_str(),
            to = next.as_str(),
            "quote review status changed"
        );
        self.audit.emit(
            AuditEvent::new(&ctx.audit(&quote.request_id), AuditEventType::QuoteReviewed)
                .with_metadata("quote_id", quote.id.0.clone())
                .with_metadata("from", previous.as_str())
                .with_metadata("to", next.as_str()),
        );

        Ok(quote)
    }

    /// The request owner (or an admin) picks one approved quote.
    pub async fn select_quote(
        &self,
        ctx: &CallContext,
        quote_id: &ContractorQuoteId,
    ) -> Result<QuoteRequest, ApplicationError> {
        let quote = self.load_quote(quote_id).await?;
        let loaded = self.load_request(&quote.request_id).await?;
        ensure_owner_or_admin(&ctx.actor, &loaded)?;

        if quote.review_status != ReviewStatus::Approved {
            return Err(DomainError::BusinessRule {
                rule: BusinessRule::ReviewStatus,
                message: "only approved quotes can be selected".to_string(),
                actual: Some(quote.review_status.as_str().to_string()),
                limit: Some(ReviewStatus::Approved.as_str().to_string()),
            }
            .into());
        }

        let outcome = self.apply_event(ctx, &loaded, RequestEvent::QuoteSelected)?;
        let mut request = loaded.clone();
        request.status = outcome.to;
        request.selected_quote_id = Some(quote.id.clone());
        request.updated_at = Utc::now();
        self.requests.update_request(&loaded, &request).await?;

        info!(
            event_name = "request.quote_selected",
            correlation_id = %ctx.correlation_id,
            request_id = %request.id,
            quote_id = %quote.id,
            "quote selected"
        );
        self.emit_transition(ctx, &request.id, &outcome);

        Ok(request)
    }

    pub async fn complete_request(
        &self,
        ctx: &CallContext,
        request_id: &QuoteRequestId,
    ) -> Result<QuoteRequest, ApplicationError> {
        let loaded = self.load_request(request_id).await?;
        ensure_owner_or_admin(&ctx.actor, &loaded)?;

        let outcome = self.apply_event(ctx, &loaded, RequestEvent::Completed)?;
        let mut request = loaded.clone();
        request.status = outcome.to;
        request.updated_at = Utc::now();
        self.requests.update_request(&loaded, &request).await?;

        info!(
            event_name = "request.completed",
            correlation_id = %ctx.correlation_id,
            request_id = %request.id,
            "quote request completed"
        );
        self.emit_transition(ctx, &request.id, &outcome);

        Ok(request)
    }

    pub async fn cancel_quote_request(
        &self,
        ctx: &CallContext,
        request_id: &QuoteRequestId,
        reason: Option<String>,
    ) -> Result<QuoteRequest, ApplicationError> {
        let loaded = self.load_request(request_id).await?;
        ensure_owner_or_admin(&ctx.actor, &loaded)?;

        let outcome = self.apply_event(ctx, &loaded, RequestEvent::CancelRequested)?;
        let mut request = loaded.clone();
        request.status = outcome.to;
        request.cancellation_reason = reason.filter(|reason| !reason.trim().is_empty());
        request.updated_at = Utc::now();
        self.requests.update_request(&loaded, &request).await?;

        info!(
            event_name = "request.cancelled",
            correlation_id = %ctx.correlation_id,
            request_id = %request.id,
            from = outcome.from.as_str(),
            "quote request cancelled"
        );
        self.emit_transition(ctx, &request.id, &outcome);

        Ok(request)
    }

    pub async fn get_quote_request_status(
        &self,
        ctx: &CallContext,
        request_id: &QuoteRequestId,
    ) -> Result<QuoteRequestStatusView, ApplicationError> {
        let request = self.load_request(request_id).await?;
        let assignments = self.assignments.list_for_request(request_id).await?;

        let visible = ctx.actor.is_admin()
            || ctx.actor.is_user(&request.user_id)
            || ctx.actor.as_contractor().is_some_and(|contractor_id| {
                request.has_selected(&contractor_id)
                    || assignments.iter().any(|assignment| assignment.contractor_id == contractor_id)
            });
        if !visible {
            return Err(ApplicationError::Forbidden(format!(
                "caller may not view request `{request_id}`"
            )));
        }

        let quote_count = self.quotes.list_for_request(request_id).await?.len();

        Ok(QuoteRequestStatusView {
            request_id: request.id,
            status: request.status,
            selected_contractors: request.selected_contractors,
            assignments: assignments
                .into_iter()
                .map(|assignment| AssignmentView {
                    contractor_id: assignment.contractor_id,
                    status: assignment.status,
                    responded_at: assignment.responded_at,
                })
                .collect(),
            quote_count,
            selected_quote_id: request.selected_quote_id,
            cancellation_reason: request.cancellation_reason,
        })
    }

    /// Quotes on a request, with contractor display data attached. Owners and
    /// admins see every quote; a contractor sees only its own.
    pub async fn list_request_quotes(
        &self,
        ctx: &CallContext,
        request_id: &QuoteRequestId,
    ) -> Result<Vec<RequestQuoteView>, ApplicationError> {
        let request = self.load_request(request_id).await?;
        let mut quotes = self.quotes.list_for_request(request_id).await?;

        if let Some(contractor_id) = ctx.actor.as_contractor() {
            quotes.retain(|quote| quote.contractor_id == contractor_id);
        } else {
            ensure_owner_or_admin(&ctx.actor, &request)?;
        }

        let ids: Vec<ContractorId> = quotes.iter().map(|quote| quote.contractor_id.clone()).collect();
        let directory: BTreeMap<ContractorId, ContractorInfo> = if ids.is_empty() {
            BTreeMap::new()
        } else {
            self.directory
                .find_contractors(&ids)
                .await?
                .into_iter()
                .map(|info| (info.id.clone(), info))
                .collect()
        };
        if directory.len() < ids.len() {
            warn!(
                event_name = "directory.partial_enrichment",
                correlation_id = %ctx.correlation_id,
                request_id = %request_id,
                requested = ids.len(),
                found = directory.len(),
                "some contractors are missing from the directory"
            );
        }

        let rules = self.pricing.get_rules().await;
        let mut views = Vec::with_capacity(quotes.len());
        for quote in quotes {
            let totals = aggregate_line_items(&quote.line_items, rules.vat_rate_percent)?;
            let contractor = directory.get(&quote.contractor_id).cloned();
            views.push(RequestQuoteView { quote, contractor, totals });
        }
        Ok(views)
    }

    pub async fn quotation_totals(
        &self,
        ctx: &CallContext,
        quote_id: &ContractorQuoteId,
    ) -> Result<QuotationTotals, ApplicationError> {
        let quote = self.load_quote(quote_id).await?;
        let request = self.load_request(&quote.request_id).await?;

        let visible = ctx.actor.is_admin()
            || ctx.actor.is_user(&request.user_id)
            || ctx.actor.as_contractor().as_ref() == Some(&quote.contractor_id);
        if !visible {
            return Err(ApplicationError::not_found("contractor_quote", quote_id.0.clone()));
        }

        let rules = self.pricing.get_rules().await;
        Ok(aggregate_line_items(&quote.line_items, rules.vat_rate_percent)?)
    }

    /// Validates a price against the rules in force and returns the full
    /// breakdown. Nothing is stored.
    pub async fn compute_financials(
        &self,
        input: &PricingInput,
    ) -> Result<FinancialBreakdown, ApplicationError> {
        let rules = self.pricing.get_rules().await;
        validate(input, &rules)?;
        Ok(calculate(input, &rules)?)
    }

    fn apply_event(
        &self,
        ctx: &CallContext,
        request: &QuoteRequest,
        event: RequestEvent,
    ) -> Result<TransitionOutcome, ApplicationError> {
        Ok(self.lifecycle.apply_with_audit(
            request.status,
            &event,
            self.audit.as_ref(),
            &ctx.audit(&request.id),
        )?)
    }

    fn emit_transition(
        &self,
        ctx: &CallContext,
        request_id: &QuoteRequestId,
        outcome: &TransitionOutcome,
    ) {
        if !outcome.changed() {
            return;
        }
        self.audit.emit(
            AuditEvent::new(&ctx.audit(request_id), AuditEventType::RequestStatusChanged)
                .with_metadata("from", outcome.from.as_str())
                .with_metadata("to", outcome.to.as_str())
                .with_metadata("event", outcome.event.name()),
        );
    }

    fn emit_rejected(
        &self,
        ctx: &CallContext,
        request_id: &QuoteRequestId,
        event_type: AuditEventType,
        error: &ApplicationError,
    ) {
        warn!(
            event_name = event_type.as_str(),
            correlation_id = %ctx.correlation_id,
            request_id = %request_id,
            error_kind = ?error.kind(),
            error = %error,
            "operation rejected"
        );
        self.audit
            .emit(AuditEvent::new(&ctx.audit(request_id), event_type).with_error(error));
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

    async fn load_quote(
        &self,
        quote_id: &ContractorQuoteId,
    ) -> Result<ContractorQuote, ApplicationError> {
        self.quotes
            .find_quote(quote_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("contractor_quote", quote_id.0.clone()))
    }
}

fn require_contractor(actor: &Actor) -> Result<ContractorId, ApplicationError> {
    actor
        .as_contractor()
        .ok_or_else(|| ApplicationError::Forbidden("caller is not a contractor".to_string()))
}

fn ensure_owner_or_admin(actor: &Actor, request: &QuoteRequest) -> Result<(), ApplicationError> {
    if actor.is_admin() || actor.is_user(&request.user_id) {
        return Ok(());
    }
    Err(ApplicationError::Forbidden(format!(
        "caller does not own request `{}`",
        request.id
    )))
}

fn invalid_request_status(status: RequestStatus) -> ApplicationError {
    DomainError::BusinessRule {
        rule: BusinessRule::RequestStatus,
        message: "invalid request status".to_string(),
        actual: Some(status.as_str().to_string()),
        limit: None,
    }
    .into()
}

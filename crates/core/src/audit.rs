//! Audit trail of engine decisions. Every mutation, and every mutation the
//! engine refuses, produces one [`AuditEvent`]. Sinks decide where it goes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::request::QuoteRequestId;
use crate::errors::ApplicationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Request,
    Assignment,
    Submission,
    Review,
    Lifecycle,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Assignment => "assignment",
            Self::Submission => "submission",
            Self::Review => "review",
            Self::Lifecycle => "lifecycle",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
        }
    }
}

/// Closed set of things the engine audits. Category and outcome follow from
/// the type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventType {
    #[serde(rename = "request.created")]
    RequestCreated,
    #[serde(rename = "request.contractors_selected")]
    ContractorsSelected,
    #[serde(rename = "request.status_changed")]
    RequestStatusChanged,
    #[serde(rename = "assignment.responded")]
    AssignmentResponded,
    #[serde(rename = "assignment.response_rejected")]
    AssignmentResponseRejected,
    #[serde(rename = "quote.submitted")]
    QuoteSubmitted,
    #[serde(rename = "quote.submission_rejected")]
    QuoteSubmissionRejected,
    #[serde(rename = "quote.reviewed")]
    QuoteReviewed,
    #[serde(rename = "quote.review_rejected")]
    QuoteReviewRejected,
    #[serde(rename = "lifecycle.transition_applied")]
    TransitionApplied,
    #[serde(rename = "lifecycle.transition_rejected")]
    TransitionRejected,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestCreated => "request.created",
            Self::ContractorsSelected => "request.contractors_selected",
            Self::RequestStatusChanged => "request.status_changed",
            Self::AssignmentResponded => "assignment.responded",
            Self::AssignmentResponseRejected => "assignment.response_rejected",
            Self::QuoteSubmitted => "quote.submitted",
            Self::QuoteSubmissionRejected => "quote.submission_rejected",
            Self::QuoteReviewed => "quote.reviewed",
            Self::QuoteReviewRejected => "quote.review_rejected",
            Self::TransitionApplied => "lifecycle.transition_applied",
            Self::TransitionRejected => "lifecycle.transition_rejected",
        }
    }

    pub fn category(&self) -> AuditCategory {
        match self {
            Self::RequestCreated | Self::ContractorsSelected => AuditCategory::Request,
            Self::AssignmentResponded | Self::AssignmentResponseRejected => {
                AuditCategory::Assignment
            }
            Self::QuoteSubmitted | Self::QuoteSubmissionRejected => AuditCategory::Submission,
            Self::QuoteReviewed | Self::QuoteReviewRejected => AuditCategory::Review,
            Self::RequestStatusChanged | Self::TransitionApplied | Self::TransitionRejected => {
                AuditCategory::Lifecycle
            }
        }
    }

    pub fn outcome(&self) -> AuditOutcome {
        match self {
            Self::AssignmentResponseRejected
            | Self::QuoteSubmissionRejected
            | Self::QuoteReviewRejected
            | Self::TransitionRejected => AuditOutcome::Rejected,
            _ => AuditOutcome::Success,
        }
    }
}

/// Who acted, on which request, under which correlation id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub request_id: Option<QuoteRequestId>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        request_id: Option<QuoteRequestId>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { request_id, correlation_id: correlation_id.into(), actor: actor.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub request_id: Option<QuoteRequestId>,
    pub correlation_id: String,
    pub event_type: AuditEventType,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(context: &AuditContext, event_type: AuditEventType) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            request_id: context.request_id.clone(),
            correlation_id: context.correlation_id.clone(),
            event_type,
            category: event_type.category(),
            actor: context.actor.clone(),
            outcome: event_type.outcome(),
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Records why the engine refused the operation.
    pub fn with_error(self, error: &ApplicationError) -> Self {
        self.with_metadata("error_kind", error.kind().as_str())
            .with_metadata("error", error.to_string())
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Writes each event as a `debug` line under the `audit` target. Used when
/// the embedding service wires no sink of its own.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        debug!(
            target: "audit",
            event_id = %event.event_id,
            event_type = event.event_type.as_str(),
            category = event.category.as_str(),
            outcome = event.outcome.as_str(),
            correlation_id = %event.correlation_id,
            actor = %event.actor,
            request_id = event.request_id.as_ref().map(|id| id.0.as_str()).unwrap_or("-"),
            metadata = ?event.metadata,
            "audit event"
        );
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<AuditEventType> {
        self.events().into_iter().map(|event| event.event_type).collect()
    }

    /// Events about one request, oldest first.
    pub fn for_request(&self, request_id: &QuoteRequestId) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.request_id.as_ref() == Some(request_id))
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AuditCategory, AuditContext, AuditEvent, AuditEventType, AuditOutcome, AuditSink,
        InMemoryAuditSink, TracingAuditSink,
    };
    use crate::domain::request::QuoteRequestId;
    use crate::errors::ApplicationError;

    fn context(request: &str) -> AuditContext {
        AuditContext::new(Some(QuoteRequestId(request.to_owned())), "corr-7", "usr-7")
    }

    #[test]
    fn event_type_decides_category_and_outcome() {
        let event = AuditEvent::new(&context("REQ-1"), AuditEventType::QuoteReviewRejected);
        assert_eq!(event.category, AuditCategory::Review);
        assert_eq!(event.outcome, AuditOutcome::Rejected);

        let event = AuditEvent::new(&context("REQ-1"), AuditEventType::RequestStatusChanged);
        assert_eq!(event.category, AuditCategory::Lifecycle);
        assert_eq!(event.outcome, AuditOutcome::Success);
    }

    #[test]
    fn event_types_serialize_to_dotted_names() {
        let json = serde_json::to_string(&AuditEventType::QuoteSubmissionRejected)
            .expect("serialize event type");
        assert_eq!(json, format!("\"{}\"", AuditEventType::QuoteSubmissionRejected.as_str()));
    }

    #[test]
    fn in_memory_sink_filters_by_request() {
        let sink = InMemoryAuditSink::default();
        sink.emit(
            AuditEvent::new(&context("REQ-1"), AuditEventType::TransitionApplied)
                .with_metadata("from", "pending")
                .with_metadata("to", "quotes_received"),
        );
        sink.emit(
            AuditEvent::new(&context("REQ-2"), AuditEventType::QuoteSubmissionRejected)
                .with_error(&ApplicationError::Conflict("quote exists".to_owned())),
        );

        let first = sink.for_request(&QuoteRequestId("REQ-1".to_owned()));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].correlation_id, "corr-7");
        assert_eq!(first[0].metadata.get("to").map(String::as_str), Some("quotes_received"));

        let second = sink.for_request(&QuoteRequestId("REQ-2".to_owned()));
        assert_eq!(second[0].metadata.get("error_kind").map(String::as_str), Some("conflict"));
        assert_eq!(
            sink.event_types(),
            vec![AuditEventType::TransitionApplied, AuditEventType::QuoteSubmissionRejected]
        );
    }

    #[test]
    fn tracing_sink_accepts_events_without_a_subscriber() {
        TracingAuditSink.emit(AuditEvent::new(
            &AuditContext::new(None, "corr-1", "system"),
            AuditEventType::RequestCreated,
        ));
    }
}

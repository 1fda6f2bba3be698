use thiserror::Error;

use crate::audit::{AuditContext, AuditEvent, AuditEventType, AuditSink};
use crate::domain::request::RequestStatus;
use crate::lifecycle::states::{LifecycleContext, RequestEvent, SubmissionGate, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleTransitionError {
    #[error("invalid request status `{status}` for event `{event}`")]
    InvalidRequestStatus { status: RequestStatus, event: &'static str },
}

/// The only place request status transitions are decided.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuoteRequestLifecycle {
    context: LifecycleContext,
}

impl QuoteRequestLifecycle {
    pub fn new(context: LifecycleContext) -> Self {
        Self { context }
    }

    pub fn initial_state(&self) -> RequestStatus {
        RequestStatus::Pending
    }

    pub fn context(&self) -> LifecycleContext {
        self.context
    }

    pub fn apply(
        &self,
        current: RequestStatus,
        event: &RequestEvent,
    ) -> Result<TransitionOutcome, LifecycleTransitionError> {
        transition(current, event, &self.context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: RequestStatus,
        event: &RequestEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, LifecycleTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) if outcome.changed() => {
                sink.emit(
                    AuditEvent::new(audit, AuditEventType::TransitionApplied)
                        .with_metadata("from", outcome.from.as_str())
                        .with_metadata("to", outcome.to.as_str())
                        .with_metadata("event", outcome.event.name()),
                );
            }
            Ok(_) => {}
            Err(error) => {
                sink.emit(
                    AuditEvent::new(audit, AuditEventType::TransitionRejected)
                        .with_metadata("event", event.name())
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

fn transition(
    current: RequestStatus,
    event: &RequestEvent,
    context: &LifecycleContext,
) -> Result<TransitionOutcome, LifecycleTransitionError> {
    use RequestStatus::{
        Cancelled, Completed, ContractorsSelected, InProgress, Open, Pending, QuoteSelected,
        QuotesReceived, Rejected,
    };

    let invalid = || LifecycleTransitionError::InvalidRequestStatus {
        status: current,
        event: event.name(),
    };

    let to = match (current, event) {
        // Tallies arrive after every response; a settled request simply keeps its status.
        (Completed | Cancelled, RequestEvent::AssignmentsTallied(_)) => current,
        (Completed | Cancelled, _) => return Err(invalid()),

        (Pending | Open | ContractorsSelected, RequestEvent::ContractorsSelected) => {
            ContractorsSelected
        }

        (_, RequestEvent::AssignmentsTallied(tally)) if tally.accepted > 0 => match current {
            Pending | Open | ContractorsSelected | Rejected => InProgress,
            other => other,
        },
        (Pending | Open | ContractorsSelected, RequestEvent::AssignmentsTallied(tally))
            if tally.all_rejected() =>
        {
            Rejected
        }
        (_, RequestEvent::AssignmentsTallied(_)) => current,

        (Pending | ContractorsSelected | QuotesReceived | Open, RequestEvent::QuoteSubmitted) => {
            QuotesReceived
        }
        (InProgress, RequestEvent::QuoteSubmitted)
            if context.submission_gate == SubmissionGate::Accepted =>
        {
            QuotesReceived
        }

        (QuotesReceived, RequestEvent::QuoteSelected) => QuoteSelected,
        (QuoteSelected, RequestEvent::Completed) => Completed,
        (_, RequestEvent::CancelRequested) => Cancelled,

        _ => return Err(invalid()),
    };

    Ok(TransitionOutcome { from: current, to, event: event.clone() })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, AuditEventType, InMemoryAuditSink};
    use crate::domain::request::{QuoteRequestId, RequestStatus};
    use crate::lifecycle::engine::{LifecycleTransitionError, QuoteRequestLifecycle};
    use crate::lifecycle::states::{
        AssignmentTally, LifecycleContext, RequestEvent, SubmissionGate,
    };

    fn tally(total: usize, accepted: usize, rejected: usize) -> RequestEvent {
        RequestEvent::AssignmentsTallied(AssignmentTally { total, accepted, rejected })
    }

    #[test]
    fn happy_path_reaches_completed() {
        let lifecycle = QuoteRequestLifecycle::default();
        let mut status = lifecycle.initial_state();

        for event in [
            RequestEvent::ContractorsSelected,
            RequestEvent::QuoteSubmitted,
            RequestEvent::QuoteSubmitted,
            RequestEvent::QuoteSelected,
            RequestEvent::Completed,
        ] {
            status = lifecycle.apply(status, &event).expect("happy path transition").to;
        }

        assert_eq!(status, RequestStatus::Completed);
    }

    #[test]
    fn first_acceptance_moves_request_in_progress() {
        let lifecycle = QuoteRequestLifecycle::default();
        let outcome =
            lifecycle.apply(RequestStatus::Pending, &tally(2, 1, 0)).expect("tally applies");
        assert_eq!(outcome.to, RequestStatus::InProgress);
        assert!(outcome.changed());
    }

    #[test]
    fn in_progress_is_never_downgraded_by_rejections() {
        let lifecycle = QuoteRequestLifecycle::default();
        let outcome =
            lifecycle.apply(RequestStatus::InProgress, &tally(2, 0, 2)).expect("tally applies");
        assert_eq!(outcome.to, RequestStatus::InProgress);
        assert!(!outcome.changed());
    }

    #[test]
    fn all_rejected_without_acceptance_rejects_request() {
        let lifecycle = QuoteRequestLifecycle::default();
        assert_eq!(
            lifecycle.apply(RequestStatus::Pending, &tally(2, 0, 2)).expect("tally").to,
            RequestStatus::Rejected
        );
        assert_eq!(
            lifecycle.apply(RequestStatus::Pending, &tally(2, 0, 1)).expect("tally").to,
            RequestStatus::Pending
        );
        assert_eq!(
            lifecycle.apply(RequestStatus::Pending, &tally(0, 0, 0)).expect("tally").to,
            RequestStatus::Pending
        );
    }

    #[test]
    fn tallies_do_not_move_later_stages() {
        let lifecycle = QuoteRequestLifecycle::default();
        for status in [
            RequestStatus::QuotesReceived,
            RequestStatus::QuoteSelected,
            RequestStatus::Completed,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(lifecycle.apply(status, &tally(3, 1, 2)).expect("tally").to, status);
            assert_eq!(lifecycle.apply(status, &tally(3, 0, 3)).expect("tally").to, status);
        }
    }

    #[test]
    fn quote_submission_is_limited_to_open_statuses() {
        let lifecycle = QuoteRequestLifecycle::default();
        for status in [
            RequestStatus::Pending,
            RequestStatus::ContractorsSelected,
            RequestStatus::QuotesReceived,
            RequestStatus::Open,
        ] {
            let outcome = lifecycle.apply(status, &RequestEvent::QuoteSubmitted).expect("accepted");
            assert_eq!(outcome.to, RequestStatus::QuotesReceived);
        }

        for status in [
            RequestStatus::InProgress,
            RequestStatus::QuoteSelected,
            RequestStatus::Completed,
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
        ] {
            let error = lifecycle
                .apply(status, &RequestEvent::QuoteSubmitted)
                .expect_err("submission must be refused");
            assert!(error.to_string().contains("invalid request status"));
        }
    }

    #[test]
    fn accepted_gate_admits_submissions_while_in_progress() {
        let lifecycle = QuoteRequestLifecycle::new(LifecycleContext {
            submission_gate: SubmissionGate::Accepted,
        });
        let outcome = lifecycle
            .apply(RequestStatus::InProgress, &RequestEvent::QuoteSubmitted)
            .expect("in-progress accepts submissions under the accepted gate");
        assert_eq!(outcome.to, RequestStatus::QuotesReceived);
    }

    #[test]
    fn cancel_is_allowed_until_terminal() {
        let lifecycle = QuoteRequestLifecycle::default();
        for status in [
            RequestStatus::Pending,
            RequestStatus::ContractorsSelected,
            RequestStatus::InProgress,
            RequestStatus::QuotesReceived,
            RequestStatus::QuoteSelected,
            RequestStatus::Rejected,
        ] {
            let outcome =
                lifecycle.apply(status, &RequestEvent::CancelRequested).expect("cancel allowed");
            assert_eq!(outcome.to, RequestStatus::Cancelled);
        }

        let error = lifecycle
            .apply(RequestStatus::Cancelled, &RequestEvent::CancelRequested)
            .expect_err("cancelled is terminal");
        assert_eq!(
            error,
            LifecycleTransitionError::InvalidRequestStatus {
                status: RequestStatus::Cancelled,
                event: "cancel_requested",
            }
        );
        assert!(lifecycle.apply(RequestStatus::Cancelled, &RequestEvent::QuoteSubmitted).is_err());
    }

    #[test]
    fn quote_selection_requires_received_quotes() {
        let lifecycle = QuoteRequestLifecycle::default();
        assert!(lifecycle.apply(RequestStatus::Pending, &RequestEvent::QuoteSelected).is_err());
        assert!(lifecycle.apply(RequestStatus::QuotesReceived, &RequestEvent::Completed).is_err());
    }

    #[test]
    fn transitions_emit_audit_events() {
        let lifecycle = QuoteRequestLifecycle::default();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(Some(QuoteRequestId("REQ-9".to_owned())), "req-42", "user-1");

        lifecycle
            .apply_with_audit(RequestStatus::Pending, &RequestEvent::QuoteSubmitted, &sink, &audit)
            .expect("transition should succeed");
        let _ = lifecycle.apply_with_audit(
            RequestStatus::Cancelled,
            &RequestEvent::QuoteSubmitted,
            &sink,
            &audit,
        );
        lifecycle
            .apply_with_audit(RequestStatus::InProgress, &tally(1, 1, 0), &sink, &audit)
            .expect("no-op tally");

        assert_eq!(
            sink.event_types(),
            vec![AuditEventType::TransitionApplied, AuditEventType::TransitionRejected]
        );
        let events = sink.events();
        assert_eq!(events[0].correlation_id, "req-42");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("quotes_received"));
    }
}

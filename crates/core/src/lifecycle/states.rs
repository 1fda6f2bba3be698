use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::assignment::{AssignmentStatus, ContractorAssignment};
use crate::domain::request::RequestStatus;
use crate::errors::DomainError;

/// Which precondition gates a contractor's quote submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionGate {
    /// The contractor appears in the request's selected contractors.
    #[default]
    Selected,
    /// The contractor holds an accepted assignment on the request.
    Accepted,
}

impl FromStr for SubmissionGate {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "selected" => Ok(Self::Selected),
            "accepted" => Ok(Self::Accepted),
            other => Err(DomainError::InvalidInput {
                field: "submission_gate",
                reason: format!("unsupported submission gate `{other}` (expected selected|accepted)"),
            }),
        }
    }
}

/// Response counts across every assignment of one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentTally {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
}

impl AssignmentTally {
    pub fn from_assignments(assignments: &[ContractorAssignment]) -> Self {
        assignments.iter().fold(Self::default(), |mut tally, assignment| {
            tally.total += 1;
            match assignment.status {
                AssignmentStatus::Accepted => tally.accepted += 1,
                AssignmentStatus::Rejected => tally.rejected += 1,
                AssignmentStatus::Assigned | AssignmentStatus::Viewed => {}
            }
            tally
        })
    }

    pub fn all_rejected(&self) -> bool {
        self.total > 0 && self.rejected == self.total
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestEvent {
    ContractorsSelected,
    AssignmentsTallied(AssignmentTally),
    QuoteSubmitted,
    QuoteSelected,
    Completed,
    CancelRequested,
}

impl RequestEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContractorsSelected => "contractors_selected",
            Self::AssignmentsTallied(_) => "assignments_tallied",
            Self::QuoteSubmitted => "quote_submitted",
            Self::QuoteSelected => "quote_selected",
            Self::Completed => "completed",
            Self::CancelRequested => "cancel_requested",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleContext {
    pub submission_gate: SubmissionGate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub event: RequestEvent,
}

impl TransitionOutcome {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::contractor::ContractorId;
use crate::domain::request::QuoteRequestId;
use crate::errors::{BusinessRule, DomainError};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Viewed,
    Accepted,
    Rejected,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Viewed => "viewed",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_respondable(&self) -> bool {
        matches!(self, Self::Assigned | Self::Viewed)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "assigned" => Ok(Self::Assigned),
            "viewed" => Ok(Self::Viewed),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::InvalidInput {
                field: "status",
                reason: format!("unknown assignment status `{other}`"),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentDecision {
    Accept,
    Reject,
}

impl AssignmentDecision {
    pub fn resulting_status(&self) -> AssignmentStatus {
        match self {
            Self::Accept => AssignmentStatus::Accepted,
            Self::Reject => AssignmentStatus::Rejected,
        }
    }
}

impl FromStr for AssignmentDecision {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "accept" | "accepted" => Ok(Self::Accept),
            "reject" | "rejected" => Ok(Self::Reject),
            other => Err(DomainError::InvalidInput {
                field: "decision",
                reason: format!("unknown decision `{other}` (expected accept|reject)"),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractorAssignment {
    pub id: AssignmentId,
    pub request_id: QuoteRequestId,
    pub contractor_id: ContractorId,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub response_notes: Option<String>,
}

impl ContractorAssignment {
    pub fn new(
        id: AssignmentId,
        request_id: QuoteRequestId,
        contractor_id: ContractorId,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            request_id,
            contractor_id,
            status: AssignmentStatus::Assigned,
            assigned_at,
            responded_at: None,
            response_notes: None,
        }
    }

    /// Records the contractor's one-time accept/reject response.
    pub fn respond(
        &mut self,
        decision: AssignmentDecision,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.status.is_respondable() {
            return Err(DomainError::BusinessRule {
                rule: BusinessRule::AssignmentStatus,
                message: "invalid assignment status".to_string(),
                actual: Some(self.status.as_str().to_string()),
                limit: Some("assigned|viewed".to_string()),
            });
        }

        self.status = decision.resulting_status();
        self.responded_at = Some(at);
        self.response_notes = notes;
        Ok(())
    }

    /// Returns true when the status changed.
    pub fn mark_viewed(&mut self) -> bool {
        if self.status == AssignmentStatus::Assigned {
            self.status = AssignmentStatus::Viewed;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{AssignmentDecision, AssignmentId, AssignmentStatus, ContractorAssignment};
    use crate::domain::contractor::ContractorId;
    use crate::domain::request::QuoteRequestId;
    use crate::errors::{BusinessRule, DomainError};

    fn assignment() -> ContractorAssignment {
        ContractorAssignment::new(
            AssignmentId("ASG-1".to_string()),
            QuoteRequestId("REQ-1".to_string()),
            ContractorId("c-1".to_string()),
            Utc::now(),
        )
    }

    #[test]
    fn viewed_assignment_can_still_respond() {
        let mut assignment = assignment();
        assert!(assignment.mark_viewed());
        assert!(!assignment.mark_viewed());

        assignment
            .respond(AssignmentDecision::Accept, Some("happy to quote".to_string()), Utc::now())
            .expect("viewed -> accepted");
        assert_eq!(assignment.status, AssignmentStatus::Accepted);
        assert!(assignment.responded_at.is_some());
        assert_eq!(assignment.response_notes.as_deref(), Some("happy to quote"));
    }

    #[test]
    fn second_response_is_rejected() {
        let mut assignment = assignment();
        assignment.respond(AssignmentDecision::Reject, None, Utc::now()).expect("first response");

        let error = assignment
            .respond(AssignmentDecision::Accept, None, Utc::now())
            .expect_err("second response must fail");
        assert!(matches!(
            error,
            DomainError::BusinessRule { rule: BusinessRule::AssignmentStatus, ref message, .. }
                if message == "invalid assignment status"
        ));
        assert_eq!(assignment.status, AssignmentStatus::Rejected);
    }

    #[test]
    fn responded_assignment_is_not_marked_viewed() {
        let mut assignment = assignment();
        assignment.respond(AssignmentDecision::Accept, None, Utc::now()).expect("respond");
        assert!(!assignment.mark_viewed());
        assert_eq!(assignment.status, AssignmentStatus::Accepted);
    }

    #[test]
    fn decisions_parse_from_wire_values() {
        assert_eq!("accept".parse::<AssignmentDecision>().ok(), Some(AssignmentDecision::Accept));
        assert_eq!("REJECTED".parse::<AssignmentDecision>().ok(), Some(AssignmentDecision::Reject));
        assert!("maybe".parse::<AssignmentDecision>().is_err());
    }
}

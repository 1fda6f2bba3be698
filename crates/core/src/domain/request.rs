use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::contractor::{ContractorId, UserId};
use crate::domain::quote::ContractorQuoteId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteRequestId(pub String);

impl fmt::Display for QuoteRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aggregate status of a quote request.
///
/// `Open` is a legacy value still present in stored data; it is accepted on
/// read and treated like `Pending` by the lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "contractors_selected")]
    ContractorsSelected,
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "quotes_received")]
    QuotesReceived,
    #[serde(rename = "quote_selected")]
    QuoteSelected,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "rejected")]
    Rejected,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::ContractorsSelected => "contractors_selected",
            Self::InProgress => "in-progress",
            Self::QuotesReceived => "quotes_received",
            Self::QuoteSelected => "quote_selected",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "open" => Ok(Self::Open),
            "contractors_selected" => Ok(Self::ContractorsSelected),
            "in-progress" | "in_progress" => Ok(Self::InProgress),
            "quotes_received" => Ok(Self::QuotesReceived),
            "quote_selected" => Ok(Self::QuoteSelected),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::InvalidInput {
                field: "status",
                reason: format!("unknown request status `{other}`"),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub id: QuoteRequestId,
    pub user_id: UserId,
    pub system_size: Decimal,
    pub location: String,
    pub selected_contractors: Vec<ContractorId>,
    pub status: RequestStatus,
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub selected_quote_id: Option<ContractorQuoteId>,
    /// Opaque pass-through data (property details, consumption figures).
    /// Never read by pricing or lifecycle logic.
    #[serde(default)]
    pub property_details: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuoteRequest {
    pub fn has_selected(&self, contractor_id: &ContractorId) -> bool {
        self.selected_contractors.contains(contractor_id)
    }

    /// Appends contractors not yet selected, keeping first-seen order.
    /// Returns the ids that were newly added.
    pub fn select_contractors(
        &mut self,
        contractor_ids: &[ContractorId],
        max_contractors: usize,
    ) -> Result<Vec<ContractorId>, DomainError> {
        let mut added = Vec::new();
        for contractor_id in contractor_ids {
            if self.has_selected(contractor_id) || added.contains(contractor_id) {
                continue;
            }
            added.push(contractor_id.clone());
        }

        let total = self.selected_contractors.len() + added.len();
        if total > max_contractors {
            return Err(DomainError::TooManyContractors { requested: total, limit: max_contractors });
        }

        self.selected_contractors.extend(added.iter().cloned());
        Ok(added)
    }
}

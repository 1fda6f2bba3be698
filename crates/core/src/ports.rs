//! Ports the engine consumes. Adapters live in `solquote-db`; the service
//! receives them at construction time.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::assignment::{AssignmentId, ContractorAssignment};
use crate::domain::contractor::{ContractorId, ContractorInfo};
use crate::domain::pricing::PricingRules;
use crate::domain::quote::{ContractorQuote, ContractorQuoteId};
use crate::domain::request::{QuoteRequest, QuoteRequestId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored record could not be decoded: {0}")]
    Corrupt(String),
    /// The stored record changed since the snapshot a conditional write was
    /// based on. Nothing was written.
    #[error("stale record: {0}")]
    Stale(String),
}

#[async_trait]
pub trait PricingRulesStore: Send + Sync {
    async fn load_pricing_rules(&self) -> Result<Option<PricingRules>, StoreError>;
    async fn save_pricing_rules(&self, rules: &PricingRules) -> Result<(), StoreError>;
}

#[async_trait]
pub trait QuoteRequestStore: Send + Sync {
    async fn find_request(&self, id: &QuoteRequestId) -> Result<Option<QuoteRequest>, StoreError>;
    async fn save_request(&self, request: &QuoteRequest) -> Result<(), StoreError>;

    /// Overwrites an existing request only while the stored row still has
    /// the status and contractor selection of `expected`. Fails with
    /// `StoreError::Stale` otherwise.
    async fn update_request(
        &self,
        expected: &QuoteRequest,
        request: &QuoteRequest,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn list_for_request(
        &self,
        request_id: &QuoteRequestId,
    ) -> Result<Vec<ContractorAssignment>, StoreError>;

    async fn find_assignment(
        &self,
        request_id: &QuoteRequestId,
        contractor_id: &ContractorId,
    ) -> Result<Option<ContractorAssignment>, StoreError>;

    /// Inserts assignments, silently skipping (request, contractor) pairs
    /// that already exist. Returns the ids actually inserted.
    async fn insert_assignments(
        &self,
        assignments: &[ContractorAssignment],
    ) -> Result<Vec<AssignmentId>, StoreError>;

    async fn update_assignment(&self, assignment: &ContractorAssignment) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ContractorQuoteStore: Send + Sync {
    async fn find_quote(
        &self,
        id: &ContractorQuoteId,
    ) -> Result<Option<ContractorQuote>, StoreError>;

    async fn find_by_request_and_contractor(
        &self,
        request_id: &QuoteRequestId,
        contractor_id: &ContractorId,
    ) -> Result<Option<ContractorQuote>, StoreError>;

    async fn list_for_request(
        &self,
        request_id: &QuoteRequestId,
    ) -> Result<Vec<ContractorQuote>, StoreError>;

    /// Inserts the quote and its line items atomically. A second quote for
    /// the same (request, contractor) pair fails with `StoreError::Duplicate`.
    async fn insert_quote_with_line_items(&self, quote: &ContractorQuote)
        -> Result<(), StoreError>;

    async fn update_quote(&self, quote: &ContractorQuote) -> Result<(), StoreError>;
}

/// Read-only lookup of contractor display data owned by another service.
#[async_trait]
pub trait ContractorDirectory: Send + Sync {
    async fn find_contractors(
        &self,
        ids: &[ContractorId],
    ) -> Result<Vec<ContractorInfo>, StoreError>;
}

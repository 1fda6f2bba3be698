//! In-memory adapters for every engine port. Used by tests and by callers
//! that embed the engine without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use solquote_core::domain::assignment::{AssignmentId, ContractorAssignment};
use solquote_core::domain::contractor::{ContractorId, ContractorInfo};
use solquote_core::domain::pricing::PricingRules;
use solquote_core::domain::quote::{ContractorQuote, ContractorQuoteId};
use solquote_core::domain::request::{QuoteRequest, QuoteRequestId};
use solquote_core::ports::{
    AssignmentStore, ContractorDirectory, ContractorQuoteStore, PricingRulesStore,
    QuoteRequestStore, StoreError,
};

#[derive(Default)]
pub struct InMemoryPricingRulesRepository {
    rules: RwLock<Option<PricingRules>>,
}

impl InMemoryPricingRulesRepository {
    pub fn with_rules(rules: PricingRules) -> Self {
        Self { rules: RwLock::new(Some(rules)) }
    }
}

#[async_trait]
impl PricingRulesStore for InMemoryPricingRulesRepository {
    async fn load_pricing_rules(&self) -> Result<Option<PricingRules>, StoreError> {
        Ok(self.rules.read().await.clone())
    }

    async fn save_pricing_rules(&self, rules: &PricingRules) -> Result<(), StoreError> {
        *self.rules.write().await = Some(rules.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryQuoteRequestRepository {
    requests: RwLock<HashMap<String, QuoteRequest>>,
}

#[async_trait]
impl QuoteRequestStore for InMemoryQuoteRequestRepository {
    async fn find_request(&self, id: &QuoteRequestId) -> Result<Option<QuoteRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn save_request(&self, request: &QuoteRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn update_request(
        &self,
        expected: &QuoteRequest,
        request: &QuoteRequest,
    ) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        let stored = requests
            .get_mut(&expected.id.0)
            .filter(|stored| {
                stored.status == expected.status
                    && stored.selected_contractors == expected.selected_contractors
            })
            .ok_or_else(|| {
                StoreError::Stale(format!(
                    "quote request `{}` is no longer `{}` with the expected contractors",
                    expected.id, expected.status
                ))
            })?;
        *stored = request.clone();
        Ok(())
    }
}

/// Assignments are kept in insertion order per request.
#[derive(Default)]
pub struct InMemoryAssignmentRepository {
    assignments: RwLock<HashMap<String, Vec<ContractorAssignment>>>,
}

#[async_trait]
impl AssignmentStore for InMemoryAssignmentRepository {
    async fn list_for_request(
        &self,
        request_id: &QuoteRequestId,
    ) -> Result<Vec<ContractorAssignment>, StoreError> {
        let assignments = self.assignments.read().await;
        Ok(assignments.get(&request_id.0).cloned().unwrap_or_default())
    }

    async fn find_assignment(
        &self,
        request_id: &QuoteRequestId,
        contractor_id: &ContractorId,
    ) -> Result<Option<ContractorAssignment>, StoreError> {
        let assignments = self.assignments.read().await;
        Ok(assignments.get(&request_id.0).and_then(|entries| {
            entries.iter().find(|entry| &entry.contractor_id == contractor_id).cloned()
        }))
    }

    async fn insert_assignments(
        &self,
        new_assignments: &[ContractorAssignment],
    ) -> Result<Vec<AssignmentId>, StoreError> {
        let mut assignments = self.assignments.write().await;
        let mut inserted = Vec::new();

        for assignment in new_assignments {
            let entries = assignments.entry(assignment.request_id.0.clone()).or_default();
            if entries.iter().any(|entry| entry.contractor_id == assignment.contractor_id) {
                continue;
            }
            entries.push(assignment.clone());
            inserted.push(assignment.id.clone());
        }

        Ok(inserted)
    }

    async fn update_assignment(&self, assignment: &ContractorAssignment) -> Result<(), StoreError> {
        let mut assignments = self.assignments.write().await;
        let existing = assignments
            .get_mut(&assignment.request_id.0)
            .and_then(|entries| entries.iter_mut().find(|entry| entry.id == assignment.id));

        match existing {
            Some(entry) => {
                *entry = assignment.clone();
                Ok(())
            }
            None => Err(StoreError::Unavailable(format!(
                "assignment `{}` does not exist",
                assignment.id.0
            ))),
        }
    }
}

#[derive(Default)]
pub struct InMemoryContractorQuoteRepository {
    quotes: RwLock<Vec<ContractorQuote>>,
}

#[async_trait]
impl ContractorQuoteStore for InMemoryContractorQuoteRepository {
    async fn find_quote(
        &self,
        id: &ContractorQuoteId,
    ) -> Result<Option<ContractorQuote>, StoreError> {
        let quotes = self.quotes.read().await;
        Ok(quotes.iter().find(|quote| &quote.id == id).cloned())
    }

    async fn find_by_request_and_contractor(
        &self,
        request_id: &QuoteRequestId,
        contractor_id: &ContractorId,
    ) -> Result<Option<ContractorQuote>, StoreError> {
        let quotes = self.quotes.read().await;
        Ok(quotes
            .iter()
            .find(|quote| &quote.request_id == request_id && &quote.contractor_id == contractor_id)
            .cloned())
    }

    async fn list_for_request(
        &self,
        request_id: &QuoteRequestId,
    ) -> Result<Vec<ContractorQuote>, StoreError> {
        let quotes = self.quotes.read().await;
        Ok(quotes.iter().filter(|quote| &quote.request_id == request_id).cloned().collect())
    }

    /// Check and insert happen under one write lock.
    async fn insert_quote_with_line_items(
        &self,
        quote: &ContractorQuote,
    ) -> Result<(), StoreError> {
        let mut quotes = self.quotes.write().await;
        let duplicate = quotes.iter().any(|existing| {
            existing.id == quote.id
                || (existing.request_id == quote.request_id
                    && existing.contractor_id == quote.contractor_id)
        });
        if duplicate {
            return Err(StoreError::Duplicate(format!(
                "quote for request `{}` and contractor `{}` already exists",
                quote.request_id, quote.contractor_id
            )));
        }

        quotes.push(quote.clone());
        Ok(())
    }

    async fn update_quote(&self, quote: &ContractorQuote) -> Result<(), StoreError> {
        let mut quotes = self.quotes.write().await;
        match quotes.iter_mut().find(|existing| existing.id == quote.id) {
            Some(existing) => {
                *existing = quote.clone();
                Ok(())
            }
            None => Err(StoreError::Unavailable(format!("quote `{}` does not exist", quote.id))),
        }
    }
}

#[derive(Default)]
pub struct InMemoryContractorDirectory {
    profiles: RwLock<HashMap<String, ContractorInfo>>,
}

impl InMemoryContractorDirectory {
    pub async fn insert(&self, info: ContractorInfo) {
        self.profiles.write().await.insert(info.id.0.clone(), info);
    }
}

#[async_trait]
impl ContractorDirectory for InMemoryContractorDirectory {
    async fn find_contractors(
        &self,
        ids: &[ContractorId],
    ) -> Result<Vec<ContractorInfo>, StoreError> {
        let profiles = self.profiles.read().await;
        Ok(ids.iter().filter_map(|id| profiles.get(&id.0).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use solquote_core::domain::assignment::{AssignmentId, ContractorAssignment};
    use solquote_core::domain::contractor::ContractorId;
    use solquote_core::domain::pricing::PricingRules;
    use solquote_core::domain::request::QuoteRequestId;
    use solquote_core::ports::{AssignmentStore, PricingRulesStore};

    use super::{InMemoryAssignmentRepository, InMemoryPricingRulesRepository};

    fn assignment(id: &str, contractor: &str) -> ContractorAssignment {
        ContractorAssignment::new(
            AssignmentId(id.to_string()),
            QuoteRequestId("REQ-1".to_string()),
            ContractorId(contractor.to_string()),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn pricing_rules_start_empty_and_persist_saves() {
        let repo = InMemoryPricingRulesRepository::default();
        assert_eq!(repo.load_pricing_rules().await.expect("load"), None);

        let rules = PricingRules { vat_rate_percent: Decimal::new(5, 0), ..PricingRules::default() };
        repo.save_pricing_rules(&rules).await.expect("save");
        assert_eq!(repo.load_pricing_rules().await.expect("load"), Some(rules));
    }

    #[tokio::test]
    async fn assignment_insert_skips_existing_pairs() {
        let repo = InMemoryAssignmentRepository::default();

        let first = repo
            .insert_assignments(&[assignment("A-1", "c-1"), assignment("A-2", "c-1")])
            .await
            .expect("insert");
        assert_eq!(first, vec![AssignmentId("A-1".to_string())]);

        let listed =
            repo.list_for_request(&QuoteRequestId("REQ-1".to_string())).await.expect("list");
        assert_eq!(listed.len(), 1);
    }
}

use std::sync::Arc;
use std::time::Duration;

use solquote_core::domain::pricing::PricingRules;
use solquote_core::pricing::provider::{FixedPricingProvider, StoreBackedPricingProvider};
use solquote_core::service::ServicePorts;

pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{SeedDataset, SeedResult, VerificationResult};

use repositories::{
    InMemoryAssignmentRepository, InMemoryContractorDirectory, InMemoryContractorQuoteRepository,
    InMemoryQuoteRequestRepository, SqlAssignmentRepository, SqlContractorDirectory,
    SqlContractorQuoteRepository, SqlPricingRulesRepository, SqlQuoteRequestRepository,
};

/// Wires every engine port to SQLite. Pricing rules are read through a
/// cache that lives for `pricing_cache_ttl`.
pub fn sqlite_ports(pool: DbPool, pricing_cache_ttl: Duration) -> ServicePorts {
    let rules_store = Arc::new(SqlPricingRulesRepository::new(pool.clone()));
    ServicePorts {
        requests: Arc::new(SqlQuoteRequestRepository::new(pool.clone())),
        assignments: Arc::new(SqlAssignmentRepository::new(pool.clone())),
        quotes: Arc::new(SqlContractorQuoteRepository::new(pool.clone())),
        directory: Arc::new(SqlContractorDirectory::new(pool)),
        pricing: Arc::new(StoreBackedPricingProvider::new(rules_store, pricing_cache_ttl)),
    }
}

/// In-memory stores with handles kept so callers can inspect or seed them.
#[derive(Clone, Default)]
pub struct InMemoryStores {
    pub requests: Arc<InMemoryQuoteRequestRepository>,
    pub assignments: Arc<InMemoryAssignmentRepository>,
    pub quotes: Arc<InMemoryContractorQuoteRepository>,
    pub directory: Arc<InMemoryContractorDirectory>,
}

impl InMemoryStores {
    pub fn ports(&self, rules: PricingRules) -> ServicePorts {
        ServicePorts {
            requests: self.requests.clone(),
            assignments: self.assignments.clone(),
            quotes: self.quotes.clone(),
            directory: self.directory.clone(),
            pricing: Arc::new(FixedPricingProvider::new(rules)),
        }
    }
}

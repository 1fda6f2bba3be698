use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::pricing::PricingRules;
use crate::ports::PricingRulesStore;

/// Supplies the pricing rules in force. Never fails: implementations fall
/// back to `PricingRules::default()`.
#[async_trait]
pub trait PricingConfigProvider: Send + Sync {
    async fn get_rules(&self) -> PricingRules;
}

/// Serves one fixed rule set.
#[derive(Clone, Debug, Default)]
pub struct FixedPricingProvider {
    rules: PricingRules,
}

impl FixedPricingProvider {
    pub fn new(rules: PricingRules) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl PricingConfigProvider for FixedPricingProvider {
    async fn get_rules(&self) -> PricingRules {
        self.rules.clone()
    }
}

struct CachedRules {
    rules: PricingRules,
    loaded_at: Instant,
}

/// Loads rules lazily from the configuration store and caches them for
/// `cache_ttl`. A zero TTL disables caching.
///
/// Store failures are absorbed: the caller gets the defaults and a warning
/// is logged. Defaults served because of a failure are not cached, so the
/// store is retried on the next call.
pub struct StoreBackedPricingProvider {
    store: Arc<dyn PricingRulesStore>,
    cache_ttl: Duration,
    cache: RwLock<Option<CachedRules>>,
}

impl StoreBackedPricingProvider {
    pub fn new(store: Arc<dyn PricingRulesStore>, cache_ttl: Duration) -> Self {
        Self { store, cache_ttl, cache: RwLock::new(None) }
    }

    /// Drops cached rules after an out-of-band administrative update.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn cached(&self) -> Option<PricingRules> {
        if self.cache_ttl.is_zero() {
            return None;
        }
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|cached| cached.loaded_at.elapsed() < self.cache_ttl)
            .map(|cached| cached.rules.clone())
    }

    async fn remember(&self, rules: &PricingRules) {
        if self.cache_ttl.is_zero() {
            return;
        }
        *self.cache.write().await =
            Some(CachedRules { rules: rules.clone(), loaded_at: Instant::now() });
    }

    async fn load(&self) -> PricingRules {
        match self.store.load_pricing_rules().await {
            Ok(Some(rules)) => match rules.validate() {
                Ok(()) => {
                    self.remember(&rules).await;
                    rules
                }
                Err(error) => {
                    warn!(
                        event_name = "pricing.rules.invalid",
                        error = %error,
                        "stored pricing rules are invalid, using defaults"
                    );
                    PricingRules::default()
                }
            },
            Ok(None) => {
                let defaults = PricingRules::default();
                match self.store.save_pricing_rules(&defaults).await {
                    Ok(()) => {
                        info!(
                            event_name = "pricing.rules.seeded",
                            "no pricing rules stored, default record created"
                        );
                        self.remember(&defaults).await;
                    }
                    Err(error) => {
                        warn!(
                            event_name = "pricing.rules.seed_failed",
                            error = %error,
                            "could not create default pricing record"
                        );
                    }
                }
                defaults
            }
            Err(error) => {
                warn!(
                    event_name = "pricing.rules.fallback",
                    error = %error,
                    "pricing store unavailable, using default rules"
                );
                PricingRules::default()
            }
        }
    }
}

#[async_trait]
impl PricingConfigProvider for StoreBackedPricingProvider {
    async fn get_rules(&self) -> PricingRules {
        if let Some(rules) = self.cached().await {
            return rules;
        }
        self.load().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::{PricingConfigProvider, StoreBackedPricingProvider};
    use crate::domain::pricing::PricingRules;
    use crate::ports::{PricingRulesStore, StoreError};

    #[derive(Default)]
    struct ScriptedStore {
        rules: Mutex<Option<PricingRules>>,
        failing: AtomicBool,
        loads: AtomicUsize,
        saves: AtomicUsize,
    }

    impl ScriptedStore {
        fn with_rules(rules: PricingRules) -> Self {
            Self { rules: Mutex::new(Some(rules)), ..Self::default() }
        }

        fn stored(&self) -> Option<PricingRules> {
            self.rules.lock().map(|rules| rules.clone()).unwrap_or(None)
        }
    }

    #[async_trait]
    impl PricingRulesStore for ScriptedStore {
        async fn load_pricing_rules(&self) -> Result<Option<PricingRules>, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection refused".to_string()));
            }
            Ok(self.stored())
        }

        async fn save_pricing_rules(&self, rules: &PricingRules) -> Result<(), StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection refused".to_string()));
            }
            if let Ok(mut stored) = self.rules.lock() {
                *stored = Some(rules.clone());
            }
            Ok(())
        }
    }

    fn custom_rules() -> PricingRules {
        PricingRules { platform_markup_percent: Decimal::new(12, 0), ..PricingRules::default() }
    }

    #[tokio::test]
    async fn returns_stored_rules_and_caches_them() {
        let store = Arc::new(ScriptedStore::with_rules(custom_rules()));
        let provider = StoreBackedPricingProvider::new(store.clone(), Duration::from_secs(60));

        assert_eq!(provider.get_rules().await, custom_rules());
        assert_eq!(provider.get_rules().await, custom_rules());
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);

        provider.invalidate().await;
        provider.get_rules().await;
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_ttl_reads_the_store_every_time() {
        let store = Arc::new(ScriptedStore::with_rules(custom_rules()));
        let provider = StoreBackedPricingProvider::new(store.clone(), Duration::ZERO);

        provider.get_rules().await;
        provider.get_rules().await;
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_record_is_seeded_with_defaults() {
        let store = Arc::new(ScriptedStore::default());
        let provider = StoreBackedPricingProvider::new(store.clone(), Duration::from_secs(60));

        assert_eq!(provider.get_rules().await, PricingRules::default());
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
        assert_eq!(store.stored(), Some(PricingRules::default()));
    }

    #[tokio::test]
    async fn store_failure_falls_back_to_defaults_without_caching() {
        let store = Arc::new(ScriptedStore::with_rules(custom_rules()));
        store.failing.store(true, Ordering::SeqCst);
        let provider = StoreBackedPricingProvider::new(store.clone(), Duration::from_secs(60));

        assert_eq!(provider.get_rules().await, PricingRules::default());

        store.failing.store(false, Ordering::SeqCst);
        assert_eq!(provider.get_rules().await, custom_rules());
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_stored_rules_are_ignored() {
        let broken = PricingRules {
            min_system_size: Decimal::new(500, 0),
            max_system_size: Decimal::new(5, 0),
            ..PricingRules::default()
        };
        let store = Arc::new(ScriptedStore::with_rules(broken));
        let provider = StoreBackedPricingProvider::new(store, Duration::from_secs(60));

        assert_eq!(provider.get_rules().await, PricingRules::default());
    }
}

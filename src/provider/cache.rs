use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::config::CacheConfig;
use crate::provider::{DataKind, DataProvider, ProviderError};
use crate::types::{
    EntityId, H2hData, HealthCheck, League, Match, MatchDetails, MatchModel, MatchOdds,
    MatchSummary,
};

/// Staleness window per data kind.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheTtl {
    windows: HashMap<DataKind, Duration>,
}

impl CacheTtl {
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            windows: DataKind::ALL.iter().map(|kind| (*kind, ttl)).collect(),
        }
    }

    pub fn get(&self, kind: DataKind) -> Duration {
        self.windows
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_ttl())
    }

    pub fn set(&mut self, kind: DataKind, ttl: Duration) {
        self.windows.insert(kind, ttl);
    }
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            windows: DataKind::ALL
                .iter()
                .map(|kind| (*kind, kind.default_ttl()))
                .collect(),
        }
    }
}

impl From<&CacheConfig> for CacheTtl {
    fn from(config: &CacheConfig) -> Self {
        let mut ttl = Self::default();
        ttl.set(DataKind::Leagues, Duration::from_secs(config.leagues_secs));
        ttl.set(DataKind::UpcomingMatches, Duration::from_secs(config.matches_secs));
        ttl.set(DataKind::Summary, Duration::from_secs(config.summary_secs));
        ttl.set(DataKind::Details, Duration::from_secs(config.details_secs));
        ttl.set(DataKind::Odds, Duration::from_secs(config.odds_secs));
        ttl.set(DataKind::Model, Duration::from_secs(config.model_secs));
        ttl.set(DataKind::H2h, Duration::from_secs(config.h2h_secs));
        ttl.set(DataKind::Health, Duration::from_secs(config.health_secs));
        ttl
    }
}

struct CacheEntry {
    kind: DataKind,
    captured_at: Instant,
    value: Arc<dyn Any + Send + Sync>,
}

/// Wraps a provider and serves repeated reads from memory until they go stale.
/// Failures are never cached.
pub struct CachedProvider<P> {
    inner: P,
    ttl: CacheTtl,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl<P: DataProvider> CachedProvider<P> {
    pub fn new(inner: P, ttl: CacheTtl) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Drops every cached entry of `kind`, forcing the next read to refetch.
    pub fn invalidate(&self, kind: DataKind) {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        guard.retain(|_, entry| entry.kind != kind);
    }

    pub fn clear(&self) {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        guard.clear();
    }

    fn lookup<T: Clone + 'static>(&self, key: &str, kind: DataKind) -> Option<T> {
        let guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = guard.get(key)?;
        if entry.captured_at.elapsed() >= self.ttl.get(kind) {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    /// Number of entries currently held, fresh or not.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store<T: Send + Sync + 'static>(&self, key: String, kind: DataKind, value: T) {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        guard.retain(|_, entry| entry.captured_at.elapsed() < self.ttl.get(entry.kind));
        guard.insert(
            key,
            CacheEntry {
                kind,
                captured_at: Instant::now(),
                value: Arc::new(value),
            },
        );
    }

    async fn cached<T, F, Fut>(&self, kind: DataKind, key: String, fetch: F) -> Result<T, ProviderError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, ProviderError>> + Send,
    {
        if let Some(hit) = self.lookup::<T>(&key, kind) {
            debug!(key = %key, "cache hit");
            return Ok(hit);
        }
        let value = fetch().await?;
        self.store(key, kind, value.clone());
        Ok(value)
    }
}

#[async_trait]
impl<P: DataProvider> DataProvider for CachedProvider<P> {
    async fn fetch_leagues(&self) -> Result<Vec<League>, ProviderError> {
        self.cached(DataKind::Leagues, "leagues:top20".to_string(), || {
            self.inner.fetch_leagues()
        })
        .await
    }

    async fn fetch_upcoming_matches(
        &self,
        league_id: &EntityId,
        limit: usize,
    ) -> Result<Vec<Match>, ProviderError> {
        let key = format!("matches:upcoming:{league_id}:{limit}");
        self.cached(DataKind::UpcomingMatches, key, || {
            self.inner.fetch_upcoming_matches(league_id, limit)
        })
        .await
    }

    async fn fetch_match_summary(
        &self,
        match_id: &EntityId,
    ) -> Result<MatchSummary, ProviderError> {
        self.cached(DataKind::Summary, format!("match:{match_id}:summary"), || {
            self.inner.fetch_match_summary(match_id)
        })
        .await
    }

    async fn fetch_match_details(
        &self,
        match_id: &EntityId,
    ) -> Result<MatchDetails, ProviderError> {
        self.cached(DataKind::Details, format!("match:{match_id}:details"), || {
            self.inner.fetch_match_details(match_id)
        })
        .await
    }

    async fn fetch_match_odds(&self, match_id: &EntityId) -> Result<MatchOdds, ProviderError> {
        self.cached(DataKind::Odds, format!("match:{match_id}:odds"), || {
            self.inner.fetch_match_odds(match_id)
        })
        .await
    }

    async fn fetch_match_model(&self, match_id: &EntityId) -> Result<MatchModel, ProviderError> {
        self.cached(DataKind::Model, format!("match:{match_id}:model"), || {
            self.inner.fetch_match_model(match_id)
        })
        .await
    }

    async fn fetch_match_h2h(&self, match_id: &EntityId) -> Result<H2hData, ProviderError> {
        self.cached(DataKind::H2h, format!("match:{match_id}:h2h"), || {
            self.inner.fetch_match_h2h(match_id)
        })
        .await
    }

    async fn fetch_health(&self) -> Result<HealthCheck, ProviderError> {
        self.cached(DataKind::Health, "health".to_string(), || {
            self.inner.fetch_health()
        })
        .await
    }
}

pub mod cache;
pub mod http;

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::types::{
    EntityId, H2hData, HealthCheck, League, Match, MatchDetails, MatchModel, MatchOdds,
    MatchSummary, Opportunity,
};

pub use cache::{CacheTtl, CachedProvider};
pub use http::ApiClient;

pub const DEFAULT_UPCOMING_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET {url} returned {status}: {preview}")]
    Status {
        url: String,
        status: u16,
        preview: String,
    },
    #[error("invalid JSON response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Transport failures, throttling and server errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Unavailable(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode { .. } => false,
        }
    }
}

/// Read access to the EV backend. Implementations may cache or retry; callers
/// only see the final outcome.
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn fetch_leagues(&self) -> Result<Vec<League>, ProviderError>;
    async fn fetch_upcoming_matches(
        &self,
        league_id: &EntityId,
        limit: usize,
    ) -> Result<Vec<Match>, ProviderError>;
    async fn fetch_match_summary(&self, match_id: &EntityId)
        -> Result<MatchSummary, ProviderError>;
    async fn fetch_match_details(&self, match_id: &EntityId)
        -> Result<MatchDetails, ProviderError>;
    async fn fetch_match_odds(&self, match_id: &EntityId) -> Result<MatchOdds, ProviderError>;
    async fn fetch_match_model(&self, match_id: &EntityId) -> Result<MatchModel, ProviderError>;
    async fn fetch_match_h2h(&self, match_id: &EntityId) -> Result<H2hData, ProviderError>;
    async fn fetch_health(&self) -> Result<HealthCheck, ProviderError>;

    async fn fetch_opportunities(
        &self,
        match_id: &EntityId,
    ) -> Result<Vec<Opportunity>, ProviderError> {
        Ok(self.fetch_match_model(match_id).await?.markets.all_opportunities)
    }
}

/// Kinds of backend data, each with its own staleness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Leagues,
    UpcomingMatches,
    Summary,
    Details,
    Odds,
    Model,
    H2h,
    Health,
}

impl DataKind {
    pub const ALL: [DataKind; 8] = [
        DataKind::Leagues,
        DataKind::UpcomingMatches,
        DataKind::Summary,
        DataKind::Details,
        DataKind::Odds,
        DataKind::Model,
        DataKind::H2h,
        DataKind::Health,
    ];

    pub fn default_ttl(&self) -> Duration {
        let secs = match self {
            Self::Leagues => 3_600,
            Self::UpcomingMatches => 300,
            Self::Summary => 180,
            Self::Details => 300,
            Self::Odds => 60,
            Self::Model => 60,
            Self::H2h => 600,
            Self::Health => 30,
        };
        Duration::from_secs(secs)
    }

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Leagues => "leagues",
            Self::UpcomingMatches => "upcoming_matches",
            Self::Summary => "summary",
            Self::Details => "details",
            Self::Odds => "odds",
            Self::Model => "model",
            Self::H2h => "h2h",
            Self::Health => "health",
        }
    }
}

/// What a view shows for one piece of remote data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum FetchState<T> {
    Loading,
    Failed(String),
    Ready(T),
}

impl<T> FetchState<T> {
    pub fn from_result<E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(error) => Self::Failed(error.to_string()),
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchState<U> {
        match self {
            Self::Loading => FetchState::Loading,
            Self::Failed(message) => FetchState::Failed(message),
            Self::Ready(value) => FetchState::Ready(f(value)),
        }
    }

    /// Human-readable status for the failed and loading states.
    pub fn status_message(&self) -> Option<String> {
        match self {
            Self::Loading => Some("Loading...".to_string()),
            Self::Failed(message) => Some(format!(
                "Failed to load data: {message}. Run the command again to retry."
            )),
            Self::Ready(_) => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{DataProvider, ProviderError};
    use crate::types::{
        EntityId, H2hData, HealthCheck, League, Match, MatchDetails, MatchModel, MatchOdds,
        MatchSummary, ModelMarkets, Opportunity, RecentForm,
    };

    /// In-memory provider that counts calls and can be told to fail.
    #[derive(Default)]
    pub struct StubProvider {
        pub leagues: Vec<League>,
        pub opportunities: Mutex<HashMap<String, Vec<Opportunity>>>,
        pub fail_models: Mutex<bool>,
        pub calls: AtomicUsize,
    }

    impl StubProvider {
        pub fn with_opportunities(match_id: &str, opportunities: Vec<Opportunity>) -> Self {
            let stub = Self::default();
            stub.set_opportunities(match_id, opportunities);
            stub
        }

        pub fn set_opportunities(&self, match_id: &str, opportunities: Vec<Opportunity>) {
            self.opportunities
                .lock()
                .unwrap()
                .insert(match_id.to_string(), opportunities);
        }

        pub fn set_failing(&self, failing: bool) {
            *self.fail_models.lock().unwrap() = failing;
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn bump(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn opportunity(market: &str, outcome: &str, odds: f64, prob: f64, ev: f64) -> Opportunity {
        Opportunity {
            market: market.to_string(),
            outcome: outcome.to_string(),
            bookmaker: "bet365".to_string(),
            bookmaker_odds: odds,
            fair_odds: 1.0 / prob,
            probability: prob,
            ev_percent: ev,
            reason: None,
        }
    }

    #[async_trait]
    impl DataProvider for StubProvider {
        async fn fetch_leagues(&self) -> Result<Vec<League>, ProviderError> {
            self.bump();
            Ok(self.leagues.clone())
        }

        async fn fetch_upcoming_matches(
            &self,
            _league_id: &EntityId,
            _limit: usize,
        ) -> Result<Vec<Match>, ProviderError> {
            self.bump();
            Ok(Vec::new())
        }

        async fn fetch_match_summary(
            &self,
            match_id: &EntityId,
        ) -> Result<MatchSummary, ProviderError> {
            self.bump();
            Err(ProviderError::Unavailable(format!("no summary for {match_id}")))
        }

        async fn fetch_match_details(
            &self,
            _match_id: &EntityId,
        ) -> Result<MatchDetails, ProviderError> {
            self.bump();
            Ok(MatchDetails {
                lineups: serde_json::Value::Null,
                stats: serde_json::Value::Null,
                form: RecentForm::default(),
            })
        }

        async fn fetch_match_odds(&self, _match_id: &EntityId) -> Result<MatchOdds, ProviderError> {
            self.bump();
            Ok(MatchOdds::default())
        }

        async fn fetch_match_model(
            &self,
            match_id: &EntityId,
        ) -> Result<MatchModel, ProviderError> {
            self.bump();
            if *self.fail_models.lock().unwrap() {
                return Err(ProviderError::Unavailable("model service down".to_string()));
            }
            let all_opportunities = self
                .opportunities
                .lock()
                .unwrap()
                .get(match_id.as_str())
                .cloned()
                .unwrap_or_default();
            Ok(MatchModel {
                match_id: match_id.clone(),
                timestamp: String::new(),
                min_ev_threshold: 0.0,
                model_type: None,
                markets: ModelMarkets {
                    all_opportunities,
                    ..ModelMarkets::default()
                },
                match_info: None,
            })
        }

        async fn fetch_match_h2h(&self, _match_id: &EntityId) -> Result<H2hData, ProviderError> {
            self.bump();
            Ok(H2hData::default())
        }

        async fn fetch_health(&self) -> Result<HealthCheck, ProviderError> {
            self.bump();
            Ok(HealthCheck {
                ok: true,
                timestamp: String::new(),
                latency_ms: 3,
                environment: "test".to_string(),
                betsapi_configured: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{opportunity, StubProvider};
    use super::{DataKind, DataProvider, FetchState, ProviderError};
    use crate::types::EntityId;

    #[test]
    fn retries_only_transient_failures() {
        let throttled = ProviderError::Status {
            url: "u".to_string(),
            status: 429,
            preview: String::new(),
        };
        let missing = ProviderError::Status {
            url: "u".to_string(),
            status: 404,
            preview: String::new(),
        };
        assert!(throttled.is_retryable());
        assert!(!missing.is_retryable());
    }

    #[test]
    fn staleness_windows_span_thirty_seconds_to_an_hour() {
        let shortest = DataKind::ALL.iter().map(|k| k.default_ttl()).min();
        let longest = DataKind::ALL.iter().map(|k| k.default_ttl()).max();
        assert_eq!(shortest.map(|d| d.as_secs()), Some(30));
        assert_eq!(longest.map(|d| d.as_secs()), Some(3_600));
    }

    #[test]
    fn fetch_state_reports_failure_message() {
        let state: FetchState<u32> = FetchState::from_result(Err("timeout"));
        assert!(state.ready().is_none());
        let message = state.status_message().expect("failed state message");
        assert!(message.contains("timeout"));
        assert!(message.contains("retry"));

        let ready = FetchState::<u32>::from_result(Ok::<_, String>(3)).map(|v| v * 2);
        assert_eq!(ready.ready(), Some(&6));
    }

    #[test]
    fn opportunities_come_from_the_model_payload() {
        let stub = StubProvider::with_opportunities(
            "31",
            vec![opportunity("O/U 2.5", "over", 1.95, 0.55, 7.25)],
        );
        let found = tokio_test::block_on(stub.fetch_opportunities(&EntityId::from("31")));
        let found = tokio_test::assert_ok!(found);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].outcome, "over");

        let missing = tokio_test::block_on(stub.fetch_opportunities(&EntityId::from("32")));
        assert!(tokio_test::assert_ok!(missing).is_empty());
    }
}

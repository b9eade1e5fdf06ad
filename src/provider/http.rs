use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::provider::{DataProvider, ProviderError};
use crate::types::{
    EntityId, H2hData, HealthCheck, League, Match, MatchDetails, MatchModel, MatchOdds,
    MatchSummary,
};

const CONNECT_TIMEOUT_SECS: u64 = 6;
const RETRY_BACKOFF_MS: u64 = 400;
const PREVIEW_CHARS: usize = 180;

#[derive(Debug, Deserialize)]
struct LeaguesEnvelope {
    #[serde(default)]
    leagues: Vec<League>,
}

#[derive(Debug, Deserialize)]
struct MatchesEnvelope {
    #[serde(default)]
    matches: Vec<Match>,
}

/// REST client for the EV backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    retries: u32,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ev-board/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retries: config.retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = self.url(path);
        let mut attempt = 0;
        loop {
            match self.get_once(&url, query).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.retries && error.is_retryable() => {
                    attempt += 1;
                    warn!(%url, attempt, "request failed, retrying: {error}");
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt)))
                        .await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ProviderError::Transport {
                url: url.to_string(),
                source,
            })?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                preview: body.chars().take(PREVIEW_CHARS).collect(),
            });
        }
        decode_body(url, &body)
    }
}

pub(crate) fn decode_body<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|source| ProviderError::Decode {
        url: url.to_string(),
        source,
    })
}

#[async_trait]
impl DataProvider for ApiClient {
    async fn fetch_leagues(&self) -> Result<Vec<League>, ProviderError> {
        let envelope: LeaguesEnvelope = self.get_json("leagues/top20", &[]).await?;
        Ok(envelope.leagues)
    }

    async fn fetch_upcoming_matches(
        &self,
        league_id: &EntityId,
        limit: usize,
    ) -> Result<Vec<Match>, ProviderError> {
        let query = [
            ("league_id", league_id.to_string()),
            ("limit", limit.to_string()),
        ];
        let envelope: MatchesEnvelope = self.get_json("matches/upcoming", &query).await?;
        Ok(envelope.matches)
    }

    async fn fetch_match_summary(
        &self,
        match_id: &EntityId,
    ) -> Result<MatchSummary, ProviderError> {
        self.get_json(&format!("match/{match_id}/summary"), &[]).await
    }

    async fn fetch_match_details(
        &self,
        match_id: &EntityId,
    ) -> Result<MatchDetails, ProviderError> {
        self.get_json(&format!("match/{match_id}/details"), &[]).await
    }

    async fn fetch_match_odds(&self, match_id: &EntityId) -> Result<MatchOdds, ProviderError> {
        self.get_json(&format!("match/{match_id}/odds"), &[]).await
    }

    async fn fetch_match_model(&self, match_id: &EntityId) -> Result<MatchModel, ProviderError> {
        self.get_json(&format!("match/{match_id}/model"), &[]).await
    }

    async fn fetch_match_h2h(&self, match_id: &EntityId) -> Result<H2hData, ProviderError> {
        self.get_json(&format!("match/{match_id}/h2h"), &[]).await
    }

    async fn fetch_health(&self) -> Result<HealthCheck, ProviderError> {
        self.get_json("health", &[]).await
    }
}

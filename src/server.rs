use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::criteria::{FilterCriteria, MarketFilter, SortField, SortOrder};
use crate::output::format::{summary_line, to_rows, OpportunityRow, EMPTY_STATE};
use crate::preferences::{PreferenceStore, Preferences};
use crate::provider::{DataProvider, ProviderError, DEFAULT_UPCOMING_LIMIT};
use crate::ranking::rank;
use crate::types::{EntityId, League, Match};

pub type SharedPreferences = Arc<Mutex<Preferences<Box<dyn PreferenceStore>>>>;

#[derive(Clone)]
pub struct ApiState {
    provider: Arc<dyn DataProvider>,
    preferences: SharedPreferences,
}

impl ApiState {
    pub fn new(provider: Arc<dyn DataProvider>, preferences: SharedPreferences) -> Self {
        Self {
            provider,
            preferences,
        }
    }

    fn snapshot(&self) -> (FilterCriteria, Vec<String>) {
        let guard = self
            .preferences
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        (guard.criteria().clone(), guard.favorites().to_vec())
    }
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn upstream(error: ProviderError) -> Self {
        warn!("backend request failed: {error}");
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct LeagueEntry {
    #[serde(flatten)]
    league: League,
    favorite: bool,
}

#[derive(Debug, Default, Deserialize)]
struct MatchesQuery {
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct OpportunitiesQuery {
    market: Option<String>,
    min_ev: Option<f64>,
    sort: Option<String>,
    order: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpportunitiesResponse {
    match_id: EntityId,
    criteria: FilterCriteria,
    summary: String,
    total: usize,
    shown: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    empty_message: Option<&'static str>,
    opportunities: Vec<OpportunityRow>,
}

#[derive(Debug, Serialize)]
struct PreferencesResponse {
    favorites: Vec<String>,
    criteria: FilterCriteria,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/v1/leagues", get(leagues))
        .route("/v1/leagues/:league_id/matches", get(matches))
        .route("/v1/matches/:match_id/opportunities", get(opportunities))
        .route("/v1/preferences", get(preferences))
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(state: ApiState, bind: SocketAddr) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn leagues(State(state): State<ApiState>) -> ApiResult<Vec<LeagueEntry>> {
    let leagues = state
        .provider
        .fetch_leagues()
        .await
        .map_err(ApiError::upstream)?;
    let (_, favorites) = state.snapshot();
    let entries = leagues
        .into_iter()
        .map(|league| LeagueEntry {
            favorite: favorites.iter().any(|id| id == league.league_id.as_str()),
            league,
        })
        .collect();
    Ok(ok(entries))
}

async fn matches(
    State(state): State<ApiState>,
    Path(league_id): Path<String>,
    Query(query): Query<MatchesQuery>,
) -> ApiResult<Vec<Match>> {
    let league_id = EntityId::from(league_id);
    if league_id.is_empty() {
        return Err(ApiError::bad_request("league id must not be empty"));
    }
    let limit = query.limit.unwrap_or(DEFAULT_UPCOMING_LIMIT).max(1);
    let matches = state
        .provider
        .fetch_upcoming_matches(&league_id, limit)
        .await
        .map_err(ApiError::upstream)?;
    Ok(ok(matches))
}

async fn opportunities(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
    Query(query): Query<OpportunitiesQuery>,
) -> ApiResult<OpportunitiesResponse> {
    let match_id = EntityId::from(match_id);
    if match_id.is_empty() {
        return Err(ApiError::bad_request("match id must not be empty"));
    }
    let (stored, _) = state.snapshot();
    let criteria = apply_query(stored, &query)?;

    let fetched = state
        .provider
        .fetch_opportunities(&match_id)
        .await
        .map_err(ApiError::upstream)?;
    let ranked = rank(&fetched, &criteria);
    let rows = to_rows(&ranked);

    Ok(ok(OpportunitiesResponse {
        summary: summary_line(rows.len(), &criteria),
        total: fetched.len(),
        shown: rows.len(),
        empty_message: rows.is_empty().then_some(EMPTY_STATE),
        opportunities: rows,
        match_id,
        criteria,
    }))
}

async fn preferences(State(state): State<ApiState>) -> Json<ApiResponse<PreferencesResponse>> {
    let (criteria, favorites) = state.snapshot();
    ok(PreferencesResponse {
        favorites,
        criteria,
    })
}

/// Layers request overrides on top of the stored criteria without persisting them.
fn apply_query(
    mut criteria: FilterCriteria,
    query: &OpportunitiesQuery,
) -> std::result::Result<FilterCriteria, ApiError> {
    if let Some(raw) = &query.market {
        criteria.selected_market = MarketFilter::from_str(raw)
            .map_err(|_| ApiError::bad_request(format!("unknown market: {raw}")))?;
    }
    if let Some(min_ev) = query.min_ev {
        if !min_ev.is_finite() {
            return Err(ApiError::bad_request("min_ev must be a finite number"));
        }
        criteria.min_ev_percent = min_ev;
    }
    if let Some(raw) = &query.sort {
        criteria.sort_by =
            SortField::from_str(raw).map_err(|err| ApiError::bad_request(err.to_string()))?;
    }
    if let Some(raw) = &query.order {
        criteria.sort_order =
            SortOrder::from_str(raw).map_err(|err| ApiError::bad_request(err.to_string()))?;
    }
    Ok(criteria)
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;

    use super::{apply_query, leagues, opportunities, ApiState, OpportunitiesQuery};
    use crate::criteria::{FilterCriteria, MarketFilter, SortField, SortOrder};
    use crate::preferences::{MemoryPreferenceStore, PreferenceStore, Preferences};
    use crate::provider::testing::{opportunity, StubProvider};
    use crate::types::{EntityId, League};

    fn state(stub: StubProvider) -> ApiState {
        let store: Box<dyn PreferenceStore> = Box::new(MemoryPreferenceStore::new());
        let prefs = Preferences::load(store, 4.0).expect("preferences");
        ApiState::new(Arc::new(stub), Arc::new(Mutex::new(prefs)))
    }

    #[test]
    fn query_overrides_stored_criteria() {
        let query = OpportunitiesQuery {
            market: Some("btts".to_string()),
            min_ev: Some(1.25),
            sort: Some("odds".to_string()),
            order: Some("asc".to_string()),
        };
        let criteria = apply_query(FilterCriteria::default(), &query).expect("criteria");
        assert_eq!(criteria.selected_market, MarketFilter::Only("BTTS".to_string()));
        assert_eq!(criteria.min_ev_percent, 1.25);
        assert_eq!(criteria.sort_by, SortField::Odds);
        assert_eq!(criteria.sort_order, SortOrder::Ascending);
    }

    #[test]
    fn rejects_unknown_sort_field() {
        let query = OpportunitiesQuery {
            sort: Some("kelly".to_string()),
            ..OpportunitiesQuery::default()
        };
        let error = apply_query(FilterCriteria::default(), &query).expect_err("bad sort");
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn opportunities_are_ranked_with_stored_criteria() {
        let stub = StubProvider::with_opportunities(
            "12",
            vec![
                opportunity("1X2", "home", 2.0, 0.5, 4.0),
                opportunity("BTTS", "yes", 1.9, 0.6, 9.0),
                opportunity("1X2", "away", 4.0, 0.2, 3.5),
            ],
        );
        let response = opportunities(
            State(state(stub)),
            Path("12".to_string()),
            Query(OpportunitiesQuery::default()),
        )
        .await
        .expect("response");
        let body = &response.0.data;
        assert_eq!(body.total, 3);
        assert_eq!(body.shown, 2);
        assert_eq!(body.opportunities[0].outcome, "yes");
        assert_eq!(body.opportunities[1].key, "bet365-1X2-home-1");
        assert!(body.empty_message.is_none());
    }

    #[tokio::test]
    async fn backend_failure_maps_to_bad_gateway() {
        let stub = StubProvider::with_opportunities("12", Vec::new());
        stub.set_failing(true);
        let error = opportunities(
            State(state(stub)),
            Path("12".to_string()),
            Query(OpportunitiesQuery::default()),
        )
        .await
        .expect_err("should fail");
        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn leagues_carry_favorite_flag() {
        let stub = StubProvider {
            leagues: vec![League {
                league_id: EntityId::from("39"),
                name: "Premier League".to_string(),
                country: "England".to_string(),
                logo: String::new(),
                season_id: None,
            }],
            ..StubProvider::default()
        };
        let state = state(stub);
        state
            .preferences
            .lock()
            .expect("lock")
            .add_favorite(&EntityId::from("39"))
            .expect("favorite");
        let response = leagues(State(state)).await.expect("leagues");
        assert!(response.0.data[0].favorite);
    }
}

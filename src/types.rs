//! Wire model for the EV backend API.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};

/// Identifier that the backend sends either as a JSON string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Text(String),
    Int(i64),
    Float(f64),
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::Text(s) => s,
            StringOrNumber::Int(n) => n.to_string(),
            StringOrNumber::Float(n) => n.to_string(),
        };
        Ok(Self::new(raw))
    }
}

/// Unix seconds that may arrive as `"1718035200"` or `1718035200`.
fn unix_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Int(n) => Ok(n),
        StringOrNumber::Float(n) => Ok(n as i64),
        StringOrNumber::Text(s) => s
            .trim()
            .parse::<f64>()
            .map(|n| n as i64)
            .map_err(serde::de::Error::custom),
    }
}

fn optional_unix_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    let raw = Option::<StringOrNumber>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        StringOrNumber::Int(n) => Some(n),
        StringOrNumber::Float(n) => Some(n as i64),
        StringOrNumber::Text(s) => s.trim().parse::<f64>().ok().map(|n| n as i64),
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct League {
    pub league_id: EntityId,
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub logo: String,
    #[serde(default)]
    pub season_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    #[serde(other)]
    Unknown,
}

impl Display for MatchStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Scheduled => "SCHEDULED",
            Self::Live => "LIVE",
            Self::Finished => "FINISHED",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Match {
    pub match_id: EntityId,
    pub home_team: String,
    pub away_team: String,
    #[serde(deserialize_with = "unix_seconds")]
    pub start_time: i64,
    pub status: MatchStatus,
    #[serde(default)]
    pub home_logo: Option<String>,
    #[serde(default)]
    pub away_logo: Option<String>,
    #[serde(default)]
    pub league_name: Option<String>,
    #[serde(default)]
    pub score: Option<String>,
}

impl Match {
    /// Splits a `"2-1"` score into home and away parts.
    pub fn score_parts(&self) -> Option<(String, String)> {
        let score = self.score.as_deref()?;
        let (home, away) = score.split_once('-')?;
        Some((home.trim().to_string(), away.trim().to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeagueRef {
    pub league_id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchSummary {
    #[serde(flatten)]
    pub fixture: Match,
    pub league: LeagueRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RecentForm {
    #[serde(default)]
    pub home: Vec<String>,
    #[serde(default)]
    pub away: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchDetails {
    #[serde(default)]
    pub lineups: serde_json::Value,
    #[serde(default)]
    pub stats: serde_json::Value,
    #[serde(default)]
    pub form: RecentForm,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MarketPrices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub over: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub under: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no: Option<f64>,
}

impl MarketPrices {
    /// Quoted prices in a stable display order.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        [
            ("home", self.home),
            ("draw", self.draw),
            ("away", self.away),
            ("over", self.over),
            ("under", self.under),
            ("yes", self.yes),
            ("no", self.no),
        ]
        .into_iter()
        .filter_map(|(label, price)| price.map(|p| (label, p)))
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OddsMarket {
    pub market: String,
    pub bookmaker: String,
    #[serde(default)]
    pub odds: MarketPrices,
    #[serde(default, deserialize_with = "optional_unix_seconds")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MatchOdds {
    #[serde(default)]
    pub markets: Vec<OddsMarket>,
}

/// A single market outcome quoted by one bookmaker with the model's fair value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Opportunity {
    pub market: String,
    pub outcome: String,
    pub bookmaker: String,
    pub bookmaker_odds: f64,
    pub fair_odds: f64,
    pub probability: f64,
    #[serde(rename = "ev_pct")]
    pub ev_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataQuality {
    pub h2h_matches: u32,
    pub home_form_matches: u32,
    pub away_form_matches: u32,
    pub reliability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamScoring {
    pub home_avg: f64,
    pub away_avg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EvData {
    #[serde(default)]
    pub probabilities: BTreeMap<String, f64>,
    #[serde(default)]
    pub fair_odds: BTreeMap<String, f64>,
    #[serde(default)]
    pub opportunities: Vec<Opportunity>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub data_quality: Option<DataQuality>,
    #[serde(default)]
    pub expected_total_goals: Option<f64>,
    #[serde(default)]
    pub team_scoring: Option<TeamScoring>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TeamForm {
    pub goals_scored: f64,
    pub goals_conceded: f64,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub match_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct H2hSummary {
    pub home_wins: u32,
    pub draws: u32,
    pub away_wins: u32,
    pub avg_home_goals: f64,
    pub avg_away_goals: f64,
    pub match_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticalMetadata {
    pub model: String,
    pub home_expected_goals: f64,
    pub away_expected_goals: f64,
    pub h2h_summary: H2hSummary,
    pub home_form: TeamForm,
    pub away_form: TeamForm,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionMarket {
    pub market: String,
    pub prediction: String,
    pub probability: f64,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalNote {
    pub note: String,
    pub recent_matches: String,
    pub h2h_note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetailedTotal {
    pub prediction: f64,
    #[serde(default)]
    pub range: Option<PredictionRange>,
    pub confidence: f64,
    #[serde(default)]
    pub markets: Vec<PredictionMarket>,
    #[serde(default)]
    pub historical: Option<HistoricalNote>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StatTotal {
    Value(f64),
    Detailed(DetailedTotal),
}

impl StatTotal {
    pub fn prediction(&self) -> f64 {
        match self {
            Self::Value(v) => *v,
            Self::Detailed(detail) => detail.prediction,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatPrediction {
    #[serde(default)]
    pub total: Option<StatTotal>,
    pub home: f64,
    pub away: f64,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl StatPrediction {
    /// Explicit total when present, otherwise home + away.
    pub fn total_value(&self) -> f64 {
        self.total
            .as_ref()
            .map(StatTotal::prediction)
            .unwrap_or(self.home + self.away)
    }

    /// Top-level confidence, falling back to the detailed total's confidence.
    pub fn effective_confidence(&self) -> Option<f64> {
        self.confidence.or(match &self.total {
            Some(StatTotal::Detailed(detail)) => Some(detail.confidence),
            _ => None,
        })
    }

    pub fn markets(&self) -> &[PredictionMarket] {
        match &self.total {
            Some(StatTotal::Detailed(detail)) => &detail.markets,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsPredictions {
    pub corners: StatPrediction,
    pub shots: StatPrediction,
    pub shots_on_target: StatPrediction,
    pub offsides: StatPrediction,
    pub fouls: StatPrediction,
    pub cards: StatPrediction,
}

impl StatsPredictions {
    pub fn entries(&self) -> [(&'static str, &StatPrediction); 6] {
        [
            ("Corners", &self.corners),
            ("Shots", &self.shots),
            ("Shots on Target", &self.shots_on_target),
            ("Offsides", &self.offsides),
            ("Fouls", &self.fouls),
            ("Cards", &self.cards),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelMarkets {
    #[serde(rename = "1X2", default)]
    pub match_result: Option<EvData>,
    #[serde(rename = "O/U 2.5", default)]
    pub over_under: Option<EvData>,
    #[serde(rename = "BTTS", default)]
    pub btts: Option<EvData>,
    #[serde(default)]
    pub all_opportunities: Vec<Opportunity>,
    #[serde(default)]
    pub metadata: Option<StatisticalMetadata>,
    #[serde(default)]
    pub stats_predictions: Option<StatsPredictions>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchInfo {
    pub home_team: String,
    pub away_team: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchModel {
    pub match_id: EntityId,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub min_ev_threshold: f64,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub markets: ModelMarkets,
    #[serde(default)]
    pub match_info: Option<MatchInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct H2hMatch {
    pub match_id: EntityId,
    pub home_team: String,
    pub away_team: String,
    pub score: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct H2hRecord {
    pub home_wins: u32,
    pub draws: u32,
    pub away_wins: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct H2hData {
    #[serde(default)]
    pub matches: Vec<H2hMatch>,
    #[serde(default)]
    pub stats: H2hRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheck {
    pub ok: bool,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub betsapi_configured: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{EntityId, Match, MatchModel, MatchStatus, MatchSummary, StatTotal};

    #[test]
    fn entity_ids_accept_strings_and_numbers() {
        let from_number: EntityId = serde_json::from_value(json!(94)).expect("number id");
        let from_text: EntityId = serde_json::from_value(json!(" 94 ")).expect("text id");
        assert_eq!(from_number, from_text);
        assert_eq!(from_number.as_str(), "94");
    }

    #[test]
    fn parses_match_with_string_kickoff_and_unknown_status() {
        let fixture: Match = serde_json::from_value(json!({
            "match_id": 8812,
            "home_team": "Hibernians",
            "away_team": "Floriana",
            "start_time": "1718035200",
            "status": "postponed",
            "score": "2-1"
        }))
        .expect("match payload");
        assert_eq!(fixture.start_time, 1_718_035_200);
        assert_eq!(fixture.status, MatchStatus::Unknown);
        assert_eq!(
            fixture.score_parts(),
            Some(("2".to_string(), "1".to_string()))
        );
    }

    #[test]
    fn summary_flattens_match_fields() {
        let summary: MatchSummary = serde_json::from_value(json!({
            "match_id": "77",
            "home_team": "Valletta",
            "away_team": "Birkirkara",
            "start_time": 1718035200,
            "status": "scheduled",
            "league": { "league_id": 1, "name": "Premier League" }
        }))
        .expect("summary payload");
        assert_eq!(summary.fixture.home_team, "Valletta");
        assert_eq!(summary.league.name, "Premier League");
    }

    #[test]
    fn model_reads_market_keys_and_opportunities() {
        let model: MatchModel = serde_json::from_value(json!({
            "match_id": 77,
            "timestamp": "2024-06-10T12:00:00Z",
            "min_ev_threshold": 4.0,
            "markets": {
                "1X2": {
                    "probabilities": { "home": 0.51, "draw": 0.23, "away": 0.26 },
                    "fair_odds": { "home": 1.96 },
                    "opportunities": []
                },
                "O/U 2.5": null,
                "BTTS": null,
                "all_opportunities": [{
                    "market": "1X2",
                    "outcome": "home",
                    "bookmaker": "bet365",
                    "bookmaker_odds": 2.1,
                    "fair_odds": 1.95,
                    "probability": 0.51,
                    "ev_pct": 7.1
                }],
                "stats_predictions": null
            }
        }))
        .expect("model payload");
        assert!(model.markets.match_result.is_some());
        assert!(model.markets.over_under.is_none());
        assert_eq!(model.markets.all_opportunities.len(), 1);
        assert!((model.markets.all_opportunities[0].ev_percent - 7.1).abs() < 1e-9);
    }

    #[test]
    fn stat_total_accepts_plain_and_detailed_shapes() {
        let plain: StatTotal = serde_json::from_value(json!(10.5)).expect("plain total");
        let detailed: StatTotal = serde_json::from_value(json!({
            "prediction": 9.8,
            "confidence": 0.7,
            "markets": [{ "market": "Over 9.5", "prediction": "over", "probability": 0.55, "reasoning": "" }]
        }))
        .expect("detailed total");
        assert!((plain.prediction() - 10.5).abs() < 1e-9);
        assert!((detailed.prediction() - 9.8).abs() < 1e-9);
    }
}

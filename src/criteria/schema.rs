use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MATCH_RESULT: &str = "1X2";
pub const OVER_UNDER_25: &str = "O/U 2.5";
pub const BOTH_TEAMS_TO_SCORE: &str = "BTTS";

pub const MIN_EV_FLOOR: f64 = 0.0;
pub const MIN_EV_CEILING: f64 = 20.0;
pub const MIN_EV_STEP: f64 = 0.5;
pub const DEFAULT_MIN_EV: f64 = 4.0;

/// Market selection: every market, or one market identifier compared verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum MarketFilter {
    #[default]
    All,
    Only(String),
}

impl MarketFilter {
    pub const ALL_TOKEN: &'static str = "ALL";

    /// Filter choices offered to the user, in display order.
    pub fn known() -> [MarketFilter; 4] {
        [
            MarketFilter::All,
            MarketFilter::Only(MATCH_RESULT.to_string()),
            MarketFilter::Only(OVER_UNDER_25.to_string()),
            MarketFilter::Only(BOTH_TEAMS_TO_SCORE.to_string()),
        ]
    }

    pub fn matches(&self, market: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(selected) => selected == market,
        }
    }

    pub fn as_token(&self) -> &str {
        match self {
            Self::All => Self::ALL_TOKEN,
            Self::Only(market) => market.as_str(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::All => "All Markets".to_string(),
            Self::Only(market) => match market.as_str() {
                OVER_UNDER_25 => "Over/Under 2.5".to_string(),
                BOTH_TEAMS_TO_SCORE => "Both Teams to Score".to_string(),
                other => other.to_string(),
            },
        }
    }
}

impl Display for MarketFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_token())
    }
}

impl From<String> for MarketFilter {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case(Self::ALL_TOKEN) {
            Self::All
        } else {
            Self::Only(value)
        }
    }
}

impl From<MarketFilter> for String {
    fn from(value: MarketFilter) -> Self {
        value.as_token().to_string()
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("market filter cannot be empty")]
pub struct MarketParseError;

impl FromStr for MarketFilter {
    type Err = MarketParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(MarketParseError);
        }
        let normalized = trimmed.to_ascii_lowercase().replace('-', " ").replace('_', " ");
        let filter = match normalized.as_str() {
            "all" | "*" | "any" => Self::All,
            "1x2" | "match result" | "result" => Self::Only(MATCH_RESULT.to_string()),
            "o/u 2.5" | "ou25" | "ou 2.5" | "over under" | "over under 2.5" | "totals" => {
                Self::Only(OVER_UNDER_25.to_string())
            }
            "btts" | "both teams to score" => Self::Only(BOTH_TEAMS_TO_SCORE.to_string()),
            _ => Self::Only(trimmed.to_string()),
        };
        Ok(filter)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Ev,
    Odds,
    Probability,
}

impl SortField {
    pub const ALL: [SortField; 3] = [SortField::Ev, SortField::Odds, SortField::Probability];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Ev => "ev",
            Self::Odds => "odds",
            Self::Probability => "probability",
        }
    }
}

impl Display for SortField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[serde(rename = "asc", alias = "ascending")]
    Ascending,
    #[default]
    #[serde(rename = "desc", alias = "descending")]
    Descending,
}

impl SortOrder {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

impl Display for SortOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SortParseError {
    #[error("unknown sort field: {0} (expected ev, odds or probability)")]
    Field(String),
    #[error("unknown sort order: {0} (expected asc or desc)")]
    Order(String),
}

impl FromStr for SortField {
    type Err = SortParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ev" | "ev_pct" | "value" => Ok(Self::Ev),
            "odds" | "price" | "bookmaker_odds" => Ok(Self::Odds),
            "probability" | "prob" => Ok(Self::Probability),
            _ => Err(SortParseError::Field(s.to_string())),
        }
    }
}

impl FromStr for SortOrder {
    type Err = SortParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            _ => Err(SortParseError::Order(s.to_string())),
        }
    }
}

/// User-controlled view settings handed to the ranking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default)]
    pub selected_market: MarketFilter,
    #[serde(default = "default_min_ev", alias = "minEV")]
    pub min_ev_percent: f64,
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl FilterCriteria {
    pub fn with_min_ev(min_ev_percent: f64) -> Self {
        Self {
            min_ev_percent,
            ..Self::default()
        }
    }
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            selected_market: MarketFilter::All,
            min_ev_percent: DEFAULT_MIN_EV,
            sort_by: SortField::Ev,
            sort_order: SortOrder::Descending,
        }
    }
}

/// Clamps a user-entered threshold to [0, 20] and snaps it to the 0.5 grid.
pub fn normalize_min_ev(value: f64) -> f64 {
    if !value.is_finite() {
        return if value == f64::INFINITY {
            MIN_EV_CEILING
        } else {
            MIN_EV_FLOOR
        };
    }
    let clamped = value.clamp(MIN_EV_FLOOR, MIN_EV_CEILING);
    (clamped / MIN_EV_STEP).round() * MIN_EV_STEP
}

fn default_min_ev() -> f64 {
    DEFAULT_MIN_EV
}

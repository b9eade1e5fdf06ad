pub mod migrations;
pub mod store;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::criteria::{normalize_min_ev, FilterCriteria, MarketFilter, SortField, SortOrder};
use crate::types::EntityId;

pub use store::{MemoryPreferenceStore, PreferenceStore, SqlitePreferenceStore};

/// Key under which the whole preference blob is persisted.
pub const STORAGE_KEY: &str = "ev-betting-storage";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedPreferences {
    #[serde(default, deserialize_with = "lenient_favorites")]
    favorites: Vec<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    selected_market: Option<MarketFilter>,
    #[serde(
        default,
        rename = "minEV",
        alias = "minEvPercent",
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    min_ev: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    sort_by: Option<SortField>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    sort_order: Option<SortOrder>,
}

/// A field that fails to decode is dropped on its own so the rest of the blob survives.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value::<T>(value.clone()) {
        Ok(decoded) => Ok(Some(decoded)),
        Err(err) => {
            warn!(%value, "ignoring unreadable preference field: {err}");
            Ok(None)
        }
    }
}

/// Keeps every league id that decodes; ids may be strings or numbers.
fn lenient_favorites<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            warn!(%other, "ignoring unreadable favorites list");
            return Ok(Vec::new());
        }
    };
    let mut favorites = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<EntityId>(item.clone()) {
            Ok(id) if !id.is_empty() => favorites.push(id.to_string()),
            _ => warn!(%item, "ignoring unreadable favorite league id"),
        }
    }
    Ok(favorites)
}

/// Favorite leagues and current filter settings, written through to a
/// [`PreferenceStore`] on every change.
pub struct Preferences<S> {
    store: S,
    default_min_ev: f64,
    favorites: Vec<String>,
    criteria: FilterCriteria,
}

impl<S: PreferenceStore> Preferences<S> {
    /// Restores the last persisted state. A missing or unparsable blob yields
    /// defaults and a bad field falls back on its own; only storage failures
    /// are errors.
    pub fn load(store: S, default_min_ev: f64) -> Result<Self> {
        let default_min_ev = normalize_min_ev(default_min_ev);
        let persisted = match store.load(STORAGE_KEY)? {
            Some(blob) => match serde_json::from_str::<PersistedPreferences>(&blob) {
                Ok(persisted) => persisted,
                Err(err) => {
                    warn!("discarding unreadable preferences: {err}");
                    PersistedPreferences::default()
                }
            },
            None => PersistedPreferences::default(),
        };

        let mut favorites: Vec<String> = Vec::with_capacity(persisted.favorites.len());
        for id in persisted.favorites {
            if !favorites.contains(&id) {
                favorites.push(id);
            }
        }
        let criteria = FilterCriteria {
            selected_market: persisted.selected_market.unwrap_or_default(),
            min_ev_percent: persisted
                .min_ev
                .map(normalize_min_ev)
                .unwrap_or(default_min_ev),
            sort_by: persisted.sort_by.unwrap_or_default(),
            sort_order: persisted.sort_order.unwrap_or_default(),
        };

        Ok(Self {
            store,
            default_min_ev,
            favorites,
            criteria,
        })
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn favorites(&self) -> &[String] {
        &self.favorites
    }

    pub fn is_favorite(&self, league_id: &EntityId) -> bool {
        self.favorites.iter().any(|id| id == league_id.as_str())
    }

    pub fn set_market(&mut self, market: MarketFilter) -> Result<()> {
        self.criteria.selected_market = market;
        self.persist()
    }

    /// Stores the threshold clamped to the slider range and returns what was kept.
    pub fn set_min_ev(&mut self, value: f64) -> Result<f64> {
        let normalized = normalize_min_ev(value);
        self.criteria.min_ev_percent = normalized;
        self.persist()?;
        Ok(normalized)
    }

    pub fn set_sorting(&mut self, field: SortField, order: SortOrder) -> Result<()> {
        self.criteria.sort_by = field;
        self.criteria.sort_order = order;
        self.persist()
    }

    /// Restores filters to defaults; favorites are untouched.
    pub fn reset_filters(&mut self) -> Result<()> {
        self.criteria = FilterCriteria::with_min_ev(self.default_min_ev);
        self.persist()
    }

    /// Returns false when the league was already a favorite.
    pub fn add_favorite(&mut self, league_id: &EntityId) -> Result<bool> {
        if self.is_favorite(league_id) {
            return Ok(false);
        }
        self.favorites.push(league_id.to_string());
        self.persist()?;
        Ok(true)
    }

    /// Returns false when the league was not a favorite.
    pub fn remove_favorite(&mut self, league_id: &EntityId) -> Result<bool> {
        let before = self.favorites.len();
        self.favorites.retain(|id| id != league_id.as_str());
        if self.favorites.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Flips membership and reports whether the league is now a favorite.
    pub fn toggle_favorite(&mut self, league_id: &EntityId) -> Result<bool> {
        if self.is_favorite(league_id) {
            self.remove_favorite(league_id)?;
            Ok(false)
        } else {
            self.add_favorite(league_id)?;
            Ok(true)
        }
    }

    fn persist(&self) -> Result<()> {
        let blob = PersistedPreferences {
            favorites: self.favorites.clone(),
            selected_market: Some(self.criteria.selected_market.clone()),
            min_ev: Some(self.criteria.min_ev_percent),
            sort_by: Some(self.criteria.sort_by),
            sort_order: Some(self.criteria.sort_order),
        };
        let encoded = serde_json::to_string(&blob).context("failed encoding preferences")?;
        self.store
            .save(STORAGE_KEY, &encoded)
            .context("failed saving preferences")?;
        debug!(favorites = self.favorites.len(), "preferences saved");
        Ok(())
    }
}

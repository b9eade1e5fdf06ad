use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::criteria::{normalize_min_ev, DEFAULT_MIN_EV};

pub const ENV_API_BASE: &str = "EV_BOARD_API_BASE";
pub const ENV_MIN_EV: &str = "EV_BOARD_MIN_EV";
pub const ENV_POLL_SECS: &str = "EV_BOARD_POLL_SECS";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_leagues_secs")]
    pub leagues_secs: u64,
    #[serde(default = "default_matches_secs")]
    pub matches_secs: u64,
    #[serde(default = "default_summary_secs")]
    pub summary_secs: u64,
    #[serde(default = "default_details_secs")]
    pub details_secs: u64,
    #[serde(default = "default_odds_secs")]
    pub odds_secs: u64,
    #[serde(default = "default_model_secs")]
    pub model_secs: u64,
    #[serde(default = "default_h2h_secs")]
    pub h2h_secs: u64,
    #[serde(default = "default_health_secs")]
    pub health_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersConfig {
    #[serde(default = "default_min_ev")]
    pub default_min_ev: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub default_min_ev: Option<f64>,
}

impl ConfigOverrides {
    /// Reads `EV_BOARD_*` variables; unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_base = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty());
        let poll_interval_secs = lookup(ENV_POLL_SECS).and_then(|raw| match raw.trim().parse::<u64>() {
            Ok(secs) => Some(secs),
            Err(_) => {
                warn!("ignoring {ENV_POLL_SECS}={raw}: not a whole number of seconds");
                None
            }
        });
        let default_min_ev = lookup(ENV_MIN_EV).and_then(|raw| match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                warn!("ignoring {ENV_MIN_EV}={raw}: not a number");
                None
            }
        });
        Self {
            api_base,
            poll_interval_secs,
            default_min_ev,
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/ev-board/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("failed parsing TOML config: {}", path.display()))
    }

    pub fn parse(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(api_base) = overrides.api_base {
            self.api.base_url = api_base;
        }
        if let Some(secs) = overrides.poll_interval_secs {
            self.polling.interval_secs = secs;
        }
        if let Some(min_ev) = overrides.default_min_ev {
            self.filters.default_min_ev = min_ev;
        }
    }

    /// Startup threshold used whenever filters are created or reset.
    pub fn default_min_ev(&self) -> f64 {
        normalize_min_ev(self.filters.default_min_ev)
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn default_template() -> String {
        let template = r#"[api]
base_url = "http://localhost:3001/api"
timeout_secs = 15
retries = 2

[polling]
interval_secs = 60

[cache]
leagues_secs = 3600
matches_secs = 300
summary_secs = 180
details_secs = 300
odds_secs = 60
model_secs = 60
h2h_secs = 600
health_secs = 30

[filters]
default_min_ev = 4.0

[storage]
db_path = "~/.local/share/ev-board/preferences.db"
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            leagues_secs: default_leagues_secs(),
            matches_secs: default_matches_secs(),
            summary_secs: default_summary_secs(),
            details_secs: default_details_secs(),
            odds_secs: default_odds_secs(),
            model_secs: default_model_secs(),
            h2h_secs: default_h2h_secs(),
            health_secs: default_health_secs(),
        }
    }
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            default_min_ev: default_min_ev(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_api_base() -> String {
    "http://localhost:3001/api".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_retries() -> u32 {
    2
}

fn default_poll_secs() -> u64 {
    60
}

fn default_leagues_secs() -> u64 {
    3_600
}

fn default_matches_secs() -> u64 {
    300
}

fn default_summary_secs() -> u64 {
    180
}

fn default_details_secs() -> u64 {
    300
}

fn default_odds_secs() -> u64 {
    60
}

fn default_model_secs() -> u64 {
    60
}

fn default_h2h_secs() -> u64 {
    600
}

fn default_health_secs() -> u64 {
    30
}

fn default_min_ev() -> f64 {
    DEFAULT_MIN_EV
}

fn default_db_path() -> String {
    "~/.local/share/ev-board/preferences.db".to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{Config, ConfigOverrides, ENV_API_BASE, ENV_MIN_EV, ENV_POLL_SECS};

    #[test]
    fn template_parses_to_defaults() {
        let parsed = Config::parse(&Config::default_template()).expect("template parses");
        let defaults = Config::default();
        assert_eq!(parsed.api.base_url, defaults.api.base_url);
        assert_eq!(parsed.polling.interval_secs, 60);
        assert_eq!(parsed.cache.leagues_secs, 3_600);
        assert_eq!(parsed.filters.default_min_ev, 4.0);
    }

    #[test]
    fn partial_files_fill_missing_sections() {
        let parsed = Config::parse("[polling]\ninterval_secs = 15\n").expect("partial config");
        assert_eq!(parsed.polling.interval_secs, 15);
        assert_eq!(parsed.api.retries, 2);
        assert_eq!(parsed.cache.health_secs, 30);
    }

    #[test]
    fn environment_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_API_BASE, "https://ev.example.com/api"),
            (ENV_MIN_EV, "6.5"),
            (ENV_POLL_SECS, "soon"),
        ]);
        let overrides = ConfigOverrides::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(overrides.poll_interval_secs, None);

        let mut config = Config::default();
        config.apply_overrides(overrides);
        assert_eq!(config.api.base_url, "https://ev.example.com/api");
        assert_eq!(config.default_min_ev(), 6.5);
        assert_eq!(config.polling.interval_secs, 60);
    }

    #[test]
    fn default_min_ev_is_clamped_to_slider_range() {
        let mut config = Config::default();
        config.filters.default_min_ev = 37.0;
        assert_eq!(config.default_min_ev(), 20.0);
    }
}

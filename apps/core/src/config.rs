use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::prefs::{PrefBranch, PrefValue, DEFAULT_MAX_RICH_RESULTS};

const APP_DIR_NAME: &str = "urlbar-core";
const CONFIG_FILE_NAME: &str = "config.toml";
const PLACES_FILE_NAME: &str = "places.sqlite";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid toml: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("failed to write toml: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("invalid json5: {0}")]
    Json5(#[from] json5::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_results: u16,
    pub places_db_path: PathBuf,
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Overrides for `browser.urlbar.*` prefs, keyed by pref name.
    pub prefs: BTreeMap<String, PrefValue>,
}

impl Default for Config {
    fn default() -> Self {
        let base = stable_app_data_dir();
        Self {
            max_results: DEFAULT_MAX_RICH_RESULTS as u16,
            places_db_path: base.join(PLACES_FILE_NAME),
            config_path: base.join(CONFIG_FILE_NAME),
            prefs: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Seeds `branch` with `max_results` and every pref override; explicit
    /// overrides win.
    pub fn apply_to(&self, branch: &PrefBranch) {
        branch.set_int("maxRichResults", i64::from(self.max_results));
        for (name, value) in &self.prefs {
            branch.set(name, value.clone());
        }
    }
}

pub fn stable_app_data_dir() -> PathBuf {
    let base = std::env::var_os("XDG_DATA_HOME")
        .or_else(|| std::env::var_os("LOCALAPPDATA"))
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local").join("share"))
        })
        .unwrap_or_else(std::env::temp_dir);
    base.join(APP_DIR_NAME)
}

/// Reads the config at `path`, or the default location. A missing file
/// yields the defaults.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Config::default().config_path);

    let mut cfg = match fs::read_to_string(&config_path) {
        Ok(raw) => parse(&config_path, &raw)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(err) => return Err(err.into()),
    };
    cfg.config_path = config_path;
    validate(&cfg)?;
    Ok(cfg)
}

fn parse(path: &Path, raw: &str) -> Result<Config, ConfigError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("json5"))
        .unwrap_or(false);
    if is_json {
        Ok(json5::from_str(raw)?)
    } else {
        Ok(toml::from_str(raw)?)
    }
}

pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = cfg.config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let raw = toml::to_string_pretty(cfg)?;
    fs::write(&cfg.config_path, raw)?;
    Ok(())
}

pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.max_results < 1 || cfg.max_results > 100 {
        return Err(ConfigError::Invalid("max_results out of range".into()));
    }

    if cfg.places_db_path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("places_db_path is required".into()));
    }

    if cfg.config_path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("config_path is required".into()));
    }

    Ok(())
}

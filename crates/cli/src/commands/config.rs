use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use salescope_core::config::AppConfig;
use salescope_core::ApplicationError;
use serde::Serialize;
use toml::Value;

use crate::commands::{CommandOptions, CommandResult};

/// One effective setting and where its value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub source: String,
}

pub fn run(options: &CommandOptions) -> CommandResult {
    let config = match AppConfig::load(options.load_options()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::from_application_error("config", ApplicationError::from(error))
        }
    };

    let config_file_path = options.config_path.clone().or_else(detect_config_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let attribution = Attribution {
        doc: config_file_doc.as_ref(),
        path: config_file_path.as_deref(),
        overridden: overridden_keys(options),
    };

    let operating_year = match config.analytics.operating_year {
        Some(year) => year.to_string(),
        None => format!("{} (calendar year)", config.analytics.resolved_operating_year()),
    };

    let entries = vec![
        attribution.entry("database.url", redact_url(&config.database.url)),
        attribution
            .entry("database.max_connections", config.database.max_connections.to_string()),
        attribution.entry("database.timeout_secs", config.database.timeout_secs.to_string()),
        attribution.entry("analytics.operating_year", operating_year),
        attribution.entry(
            "analytics.movement_lookback_months",
            config.analytics.movement_lookback_months.to_string(),
        ),
        attribution.entry(
            "analytics.simulation_iterations",
            config.analytics.simulation_iterations.to_string(),
        ),
        attribution
            .entry("analytics.simulation_seed", config.analytics.simulation_seed.to_string()),
        attribution.entry(
            "analytics.default_page_size",
            config.analytics.default_page_size.to_string(),
        ),
        attribution.entry("logging.level", config.logging.level.clone()),
        attribution.entry("logging.format", format!("{:?}", config.logging.format)),
    ];

    CommandResult::report("config", &entries)
}

struct Attribution<'a> {
    doc: Option<&'a Value>,
    path: Option<&'a Path>,
    overridden: Vec<&'static str>,
}

impl Attribution<'_> {
    fn entry(&self, key: &'static str, value: String) -> ConfigEntry {
        ConfigEntry { key, value, source: self.source(key) }
    }

    /// Precedence mirrors the loader: flag > env > file > default.
    fn source(&self, key_path: &str) -> String {
        if self.overridden.iter().any(|key| *key == key_path) {
            return "flag".to_string();
        }

        let env_key = env_key(key_path);
        if env::var_os(&env_key).is_some() {
            return format!("env ({env_key})");
        }

        if let Some(doc) = self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn overridden_keys(options: &CommandOptions) -> Vec<&'static str> {
    let overrides = &options.overrides;
    let mut keys = Vec::new();
    if overrides.database_url.is_some() {
        keys.push("database.url");
    }
    if overrides.operating_year.is_some() {
        keys.push("analytics.operating_year");
    }
    if overrides.movement_lookback_months.is_some() {
        keys.push("analytics.movement_lookback_months");
    }
    if overrides.simulation_iterations.is_some() {
        keys.push("analytics.simulation_iterations");
    }
    if overrides.simulation_seed.is_some() {
        keys.push("analytics.simulation_seed");
    }
    if overrides.log_level.is_some() {
        keys.push("logging.level");
    }
    if overrides.log_format.is_some() {
        keys.push("logging.format");
    }
    keys
}

/// `analytics.simulation_seed` -> `SALESCOPE_ANALYTICS_SIMULATION_SEED`.
fn env_key(key_path: &str) -> String {
    format!("SALESCOPE_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("salescope.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/salescope.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Hides credentials embedded in server-style URLs; sqlite paths pass through.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((_, host)) => format!("{scheme}://<redacted>@{host}"),
        None => url.to_string(),
    }
}

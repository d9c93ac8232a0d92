//! Layered settings: built-in defaults, then `salescope.toml`, then
//! `SALESCOPE_*` environment variables, then caller overrides.

use std::env;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_CANDIDATES: [&str; 2] = ["salescope.toml", "config/salescope.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub analytics: AnalyticsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AnalyticsConfig {
    /// Year treated as "current" for YTD, rollups and previous-year defaults.
    /// Falls back to the local calendar year when unset.
    pub operating_year: Option<i32>,
    pub movement_lookback_months: u32,
    pub simulation_iterations: u32,
    pub simulation_seed: u64,
    pub default_page_size: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Values supplied by the caller (CLI flags). These win over every other layer.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub operating_year: Option<i32>,
    pub movement_lookback_months: Option<u32>,
    pub simulation_iterations: Option<u32>,
    pub simulation_seed: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("`{path}` is not valid salescope TOML: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("config file `{0}` does not exist")]
    MissingConfigFile(PathBuf),
    #[error("`${{{var}}}` is referenced in the config file but not set")]
    MissingEnvInterpolation { var: String },
    #[error("`${{` without a closing `}}` in the config file")]
    UnterminatedInterpolation,
    #[error("`{key}` holds `{value}`, which is not a valid value")]
    InvalidEnvOverride { key: String, value: String },
    #[error("invalid setting: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://salescope.db".to_owned(),
                max_connections: 5,
                timeout_secs: 30,
            },
            analytics: AnalyticsConfig {
                operating_year: None,
                movement_lookback_months: 1,
                simulation_iterations: 1_000,
                simulation_seed: 42,
                default_page_size: 25,
            },
            logging: LoggingConfig { level: "info".to_owned(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let format = match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            "json" => Self::Json,
            other => {
                return Err(ConfigError::Validation(format!(
                    "logging.format `{other}` is not one of compact, pretty, json"
                )))
            }
        };
        Ok(format)
    }
}

impl AnalyticsConfig {
    pub fn resolved_operating_year(&self) -> i32 {
        self.operating_year.unwrap_or_else(|| Local::now().year())
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let LoadOptions { config_path, require_file, overrides } = options;
        let mut config = Self::default();

        match locate_config_file(config_path.as_deref()) {
            Some(path) => read_file_layer(&path)?.merge_into(&mut config),
            None if require_file => {
                let expected =
                    config_path.unwrap_or_else(|| PathBuf::from(CONFIG_CANDIDATES[0]));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        config.merge_env()?;
        config.merge_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    fn merge_env(&mut self) -> Result<(), ConfigError> {
        let database = &mut self.database;
        replace(&mut database.url, env_value("SALESCOPE_DATABASE_URL"));
        replace(&mut database.max_connections, env_parsed("SALESCOPE_DATABASE_MAX_CONNECTIONS")?);
        replace(&mut database.timeout_secs, env_parsed("SALESCOPE_DATABASE_TIMEOUT_SECS")?);

        let analytics = &mut self.analytics;
        if let Some(year) = env_parsed("SALESCOPE_ANALYTICS_OPERATING_YEAR")? {
            analytics.operating_year = Some(year);
        }
        replace(
            &mut analytics.movement_lookback_months,
            env_parsed("SALESCOPE_ANALYTICS_MOVEMENT_LOOKBACK_MONTHS")?,
        );
        replace(
            &mut analytics.simulation_iterations,
            env_parsed("SALESCOPE_ANALYTICS_SIMULATION_ITERATIONS")?,
        );
        replace(&mut analytics.simulation_seed, env_parsed("SALESCOPE_ANALYTICS_SIMULATION_SEED")?);
        replace(
            &mut analytics.default_page_size,
            env_parsed("SALESCOPE_ANALYTICS_DEFAULT_PAGE_SIZE")?,
        );

        // The short LOG_* spellings are accepted as aliases.
        let level =
            env_value("SALESCOPE_LOGGING_LEVEL").or_else(|| env_value("SALESCOPE_LOG_LEVEL"));
        replace(&mut self.logging.level, level);
        let format =
            env_value("SALESCOPE_LOGGING_FORMAT").or_else(|| env_value("SALESCOPE_LOG_FORMAT"));
        if let Some(format) = format {
            self.logging.format = format.parse()?;
        }

        Ok(())
    }

    fn merge_overrides(&mut self, overrides: ConfigOverrides) {
        replace(&mut self.database.url, overrides.database_url);
        replace(&mut self.logging.level, overrides.log_level);
        replace(&mut self.logging.format, overrides.log_format);
        if overrides.operating_year.is_some() {
            self.analytics.operating_year = overrides.operating_year;
        }
        replace(&mut self.analytics.movement_lookback_months, overrides.movement_lookback_months);
        replace(&mut self.analytics.simulation_iterations, overrides.simulation_iterations);
        replace(&mut self.analytics.simulation_seed, overrides.simulation_seed);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.database.url.trim();
        if !(url.starts_with("sqlite:") || url == ":memory:") {
            return Err(ConfigError::Validation(format!(
                "database.url `{url}` is not a sqlite URL (sqlite://path, sqlite::memory: or :memory:)"
            )));
        }
        within("database.max_connections", self.database.max_connections, 1..=u32::MAX)?;
        within("database.timeout_secs", self.database.timeout_secs, 1..=300)?;

        let analytics = &self.analytics;
        if let Some(year) = analytics.operating_year {
            within("analytics.operating_year", year, 1970..=9999)?;
        }
        within("analytics.movement_lookback_months", analytics.movement_lookback_months, 1..=24)?;
        within("analytics.simulation_iterations", analytics.simulation_iterations, 1..=100_000)?;
        within("analytics.default_page_size", analytics.default_page_size, 1..=usize::MAX)?;

        let level = self.logging.level.trim().to_ascii_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level `{}` is not one of trace, debug, info, warn, error",
                self.logging.level
            )));
        }

        Ok(())
    }
}

fn replace<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn within<T>(key: &str, value: T, range: RangeInclusive<T>) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        return Ok(());
    }
    Err(ConfigError::Validation(format!(
        "{key} is {value}, expected {}..={}",
        range.start(),
        range.end()
    )))
}

fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => path.is_file().then(|| path.to_path_buf()),
        None => CONFIG_CANDIDATES.iter().map(PathBuf::from).find(|path| path.is_file()),
    }
}

fn read_file_layer(path: &Path) -> Result<FileLayer, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let expanded = expand_env_references(&raw)?;
    toml::from_str(&expanded)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Substitutes every `${NAME}` with the value of the environment variable.
fn expand_env_references(input: &str) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let name = &after[..end];
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_owned() })?;
        expanded.push_str(&value);
        rest = &after[end + 1..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    env_value(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_owned(), value: raw })
        })
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
struct FileLayer {
    #[serde(default)]
    database: DatabaseLayer,
    #[serde(default)]
    analytics: AnalyticsLayer,
    #[serde(default)]
    logging: LoggingLayer,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseLayer {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyticsLayer {
    operating_year: Option<i32>,
    movement_lookback_months: Option<u32>,
    simulation_iterations: Option<u32>,
    simulation_seed: Option<u64>,
    default_page_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingLayer {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl FileLayer {
    fn merge_into(self, config: &mut AppConfig) {
        let Self { database, analytics, logging } = self;

        replace(&mut config.database.url, database.url);
        replace(&mut config.database.max_connections, database.max_connections);
        replace(&mut config.database.timeout_secs, database.timeout_secs);

        if analytics.operating_year.is_some() {
            config.analytics.operating_year = analytics.operating_year;
        }
        replace(&mut config.analytics.movement_lookback_months, analytics.movement_lookback_months);
        replace(&mut config.analytics.simulation_iterations, analytics.simulation_iterations);
        replace(&mut config.analytics.simulation_seed, analytics.simulation_seed);
        replace(&mut config.analytics.default_page_size, analytics.default_page_size);

        replace(&mut config.logging.level, logging.level);
        replace(&mut config.logging.format, logging.format);
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    use tempfile::TempDir;

    use super::{
        expand_env_references, AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat,
    };

    fn serial() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(Mutex::default).lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `body` with the given variables set, removing them afterwards.
    fn with_vars<T>(vars: &[(&str, &str)], body: impl FnOnce() -> T) -> T {
        let _serial = serial();
        for (key, value) in vars {
            env::set_var(key, value);
        }
        let outcome = body();
        for (key, _) in vars {
            env::remove_var(key);
        }
        outcome
    }

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("salescope.toml");
        fs::write(&path, contents).expect("write config");
        path
    }

    fn load_from(path: PathBuf, overrides: ConfigOverrides) -> Result<AppConfig, ConfigError> {
        AppConfig::load(LoadOptions { config_path: Some(path), require_file: true, overrides })
    }

    #[test]
    fn defaults_apply_when_no_file_is_found() {
        let config = with_vars(&[], || {
            AppConfig::load(LoadOptions {
                config_path: Some("absent/salescope.toml".into()),
                ..LoadOptions::default()
            })
        })
        .expect("defaults load");

        assert_eq!(config.analytics.movement_lookback_months, 1);
        assert_eq!(config.analytics.simulation_iterations, 1_000);
        assert_eq!(config.analytics.simulation_seed, 42);
        assert_eq!(config.analytics.default_page_size, 25);
        assert_eq!(config.analytics.operating_year, None);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn required_file_must_exist() {
        let error = with_vars(&[], || {
            AppConfig::load(LoadOptions {
                config_path: Some("absent/salescope.toml".into()),
                require_file: true,
                ..LoadOptions::default()
            })
        })
        .expect_err("missing file is an error");

        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }

    #[test]
    fn analytics_section_is_read_from_file_with_interpolation() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_config(
            &dir,
            r#"
[database]
url = "sqlite://${SALESCOPE_TEST_DB_DIR}/book.db"

[analytics]
operating_year = 2026
simulation_iterations = 250
default_page_size = 10
"#,
        );

        let config = with_vars(&[("SALESCOPE_TEST_DB_DIR", "/var/lib/salescope")], || {
            load_from(path, ConfigOverrides::default())
        })
        .expect("file load");

        assert_eq!(config.database.url, "sqlite:///var/lib/salescope/book.db");
        assert_eq!(config.analytics.resolved_operating_year(), 2026);
        assert_eq!(config.analytics.simulation_iterations, 250);
        assert_eq!(config.analytics.default_page_size, 10);
    }

    #[test]
    fn flags_beat_environment_beat_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_config(
            &dir,
            r#"
[analytics]
operating_year = 2024
movement_lookback_months = 2
simulation_seed = 7

[logging]
level = "warn"
format = "json"
"#,
        );

        let config = with_vars(
            &[
                ("SALESCOPE_ANALYTICS_OPERATING_YEAR", "2025"),
                ("SALESCOPE_ANALYTICS_MOVEMENT_LOOKBACK_MONTHS", "3"),
                ("SALESCOPE_LOG_LEVEL", "error"),
            ],
            || {
                load_from(
                    path,
                    ConfigOverrides {
                        operating_year: Some(2026),
                        log_level: Some("debug".to_owned()),
                        ..ConfigOverrides::default()
                    },
                )
            },
        )
        .expect("layered load");

        assert_eq!(config.analytics.operating_year, Some(2026));
        assert_eq!(config.analytics.movement_lookback_months, 3);
        assert_eq!(config.analytics.simulation_seed, 7);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn unparseable_environment_value_names_the_variable() {
        let error = with_vars(&[("SALESCOPE_ANALYTICS_SIMULATION_ITERATIONS", "lots")], || {
            AppConfig::load(LoadOptions::default())
        })
        .expect_err("bad iterations");

        assert!(matches!(
            error,
            ConfigError::InvalidEnvOverride { ref key, ref value }
                if key == "SALESCOPE_ANALYTICS_SIMULATION_ITERATIONS" && value == "lots"
        ));
    }

    #[test]
    fn out_of_range_settings_fail_validation() {
        let error = with_vars(&[], || {
            AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    movement_lookback_months: Some(0),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
        })
        .expect_err("zero lookback");
        assert!(error.to_string().contains("analytics.movement_lookback_months"));

        let error = with_vars(&[("SALESCOPE_DATABASE_URL", "postgres://warehouse")], || {
            AppConfig::load(LoadOptions::default())
        })
        .expect_err("non-sqlite url");
        assert!(matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("database.url")
        ));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!("yaml".parse::<LogFormat>().is_err());
        assert_eq!(" Pretty ".parse::<LogFormat>().ok(), Some(LogFormat::Pretty));
    }

    #[test]
    fn env_references_expand_in_place() {
        let expanded = with_vars(&[("SALESCOPE_TEST_REGION", "emea")], || {
            expand_env_references("a=${SALESCOPE_TEST_REGION};b=$HOME;c=${SALESCOPE_TEST_REGION}")
        })
        .expect("expand");
        assert_eq!(expanded, "a=emea;b=$HOME;c=emea");

        let unterminated = with_vars(&[], || expand_env_references("url = \"${OPEN"));
        assert!(matches!(unterminated, Err(ConfigError::UnterminatedInterpolation)));
    }
}

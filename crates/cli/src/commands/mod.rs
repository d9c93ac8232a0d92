pub mod config;
pub mod migrate;
pub mod reports;
pub mod seed;

use std::path::PathBuf;

use salescope_core::config::{AppConfig, ConfigOverrides, DatabaseConfig, LoadOptions};
use salescope_core::{ApplicationError, DomainError};
use salescope_db::{connect_with_config, migrations, DbPool};
use serde::Serialize;
use tokio::runtime::Runtime;

/// Error class, message and exit code of a step that failed inside the runtime.
pub(crate) type StepFailure = (&'static str, String, u8);

/// Inputs every command shares: where configuration and ledgers come from.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    pub config_path: Option<PathBuf>,
    pub dataset_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

impl CommandOptions {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config_path.clone(),
            require_file: self.config_path.is_some(),
            overrides: self.overrides.clone(),
        }
    }

    /// Resolves configuration and a current-thread runtime for `command`.
    pub(crate) fn prepare(&self, command: &str) -> Result<(AppConfig, Runtime), CommandResult> {
        let config = AppConfig::load(self.load_options()).map_err(|error| {
            CommandResult::from_application_error(command, ApplicationError::from(error))
        })?;
        let runtime =
            tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
                CommandResult::failure(
                    command,
                    "runtime_init",
                    format!("failed to initialize async runtime: {error}"),
                    3,
                )
            })?;
        Ok((config, runtime))
    }
}

/// Connects to the configured database and brings its schema up to date.
pub(crate) async fn open_migrated_pool(config: &DatabaseConfig) -> Result<DbPool, StepFailure> {
    let pool = connect_with_config(config)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;
    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a, T: Serialize> {
    command: &'a str,
    status: &'a str,
    error_class: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a T>,
}

impl CommandResult {
    pub(crate) fn from_step(command: &str, outcome: Result<String, StepFailure>) -> Self {
        match outcome {
            Ok(message) => Self::success(command, message),
            Err((error_class, message, exit_code)) => {
                Self::failure(command, error_class, message, exit_code)
            }
        }
    }

    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome::<()> {
            command,
            status: "ok",
            error_class: None,
            correlation_id: None,
            message: Some(message.into()),
            result: None,
        };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    /// Success carrying a structured report under `result`.
    pub fn report<T: Serialize>(command: &str, result: &T) -> Self {
        let payload = CommandOutcome {
            command,
            status: "ok",
            error_class: None,
            correlation_id: None,
            message: None,
            result: Some(result),
        };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome::<()> {
            command,
            status: "error",
            error_class: Some(error_class),
            correlation_id: None,
            message: Some(message.into()),
            result: None,
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }

    /// Failure payload for an application error: the class and exit code
    /// follow the error kind, the message and correlation id come from its
    /// interface form.
    pub fn from_application_error(command: &str, error: ApplicationError) -> Self {
        let (error_class, exit_code) = match &error {
            ApplicationError::Domain(DomainError::InvalidFilter(_)) => ("bad_request", 8),
            ApplicationError::Domain(_) => ("not_found", 7),
            ApplicationError::Persistence(_) => ("service_unavailable", 4),
            ApplicationError::Configuration(_) => ("config_validation", 2),
        };
        let error = error.into_interface(format!("cli-{command}"));

        tracing::warn!(
            event_name = "cli.command.failed",
            command,
            error_class,
            correlation_id = error.correlation_id(),
            error = %error,
            "command failed"
        );

        let payload = CommandOutcome::<()> {
            command,
            status: "error",
            error_class: Some(error_class),
            correlation_id: Some(error.correlation_id()),
            message: Some(format!("{} ({error})", error.user_message())),
            result: None,
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }
}

fn serialize_payload<T: Serialize>(payload: &CommandOutcome<'_, T>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            payload.command,
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use salescope_core::{ApplicationError, DomainError, OpportunityId};
    use serde_json::Value;

    use super::CommandResult;

    #[test]
    fn success_payload_has_no_error_class() {
        let result = CommandResult::success("migrate", "applied pending migrations");
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 0);
        assert_eq!(payload["status"], "ok");
        assert!(payload["error_class"].is_null());
        assert!(payload.get("result").is_none());
    }

    #[test]
    fn report_payload_nests_the_result() {
        let result = CommandResult::report("funnel", &vec![1, 2, 3]);
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(payload["command"], "funnel");
        assert_eq!(payload["result"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn not_found_maps_to_its_own_exit_code() {
        let error = ApplicationError::from(DomainError::DealNotFound(OpportunityId(
            "D-404".to_owned(),
        )));
        let result = CommandResult::from_application_error("deal", error);
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 7);
        assert_eq!(payload["error_class"], "not_found");
        assert_eq!(payload["correlation_id"], "cli-deal");
        assert!(payload["message"].as_str().unwrap_or_default().contains("D-404"));
    }

    #[test]
    fn load_and_config_failures_keep_distinct_classes() {
        let unavailable = CommandResult::from_application_error(
            "overview",
            ApplicationError::Persistence("database is locked".to_owned()),
        );
        let payload: Value = serde_json::from_str(&unavailable.output).expect("json");
        assert_eq!(unavailable.exit_code, 4);
        assert_eq!(payload["error_class"], "service_unavailable");
        assert_eq!(payload["correlation_id"], "cli-overview");

        let misconfigured = CommandResult::from_application_error(
            "migrate",
            ApplicationError::Configuration("analytics.default_page_size is 0".to_owned()),
        );
        let payload: Value = serde_json::from_str(&misconfigured.output).expect("json");
        assert_eq!(misconfigured.exit_code, 2);
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("default_page_size"));
    }
}

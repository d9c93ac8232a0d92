use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use salescope_cli::commands::reports::{self, DealsRequest, RollupRequest};
use salescope_cli::commands::{config, migrate, seed, CommandOptions};
use salescope_cli::{FilterArgs, ForecastBy};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("SALESCOPE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run(&CommandOptions::default());
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_bad_env_override() {
    with_env(
        &[
            ("SALESCOPE_DATABASE_URL", "sqlite::memory:"),
            ("SALESCOPE_DATABASE_MAX_CONNECTIONS", "plenty"),
        ],
        || {
            let result = migrate::run(&CommandOptions::default());
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn seed_reports_demo_table_counts() {
    with_env(&[("SALESCOPE_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run(&CommandOptions::default(), None);
        assert_eq!(result.exit_code, 0, "expected demo seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("closed_deals=6"), "unexpected message: {message}");
        assert!(message.contains("pipeline_snapshots=9"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = TempDir::new().expect("tempdir");
    let url = sqlite_url(dir.path());
    with_env(&[("SALESCOPE_DATABASE_URL", url.as_str())], || {
        let first = parse_payload(&seed::run(&CommandOptions::default(), None).output);
        let second = parse_payload(&seed::run(&CommandOptions::default(), None).output);

        assert_eq!(first["status"], "ok");
        assert_eq!(second["status"], "ok");
        assert_eq!(first["message"], second["message"]);
    });
}

#[test]
fn overview_reads_the_seeded_ledgers() {
    with_seeded_db(|options| {
        let year = FilterArgs { years: vec![2026], ..FilterArgs::default() };
        let result = reports::overview(options, &year);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "overview");
        assert_eq!(payload["error_class"], Value::Null);
        assert_eq!(payload["result"]["closed"], "355000");
        assert_eq!(payload["result"]["years"], serde_json::json!([2026]));
    });
}

#[test]
fn movement_classifies_every_bucket_in_the_demo_snapshots() {
    with_seeded_db(|options| {
        let result = reports::movement(options, Some(1), &FilterArgs::default());
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let movement = &parse_payload(&result.output)["result"];
        for bucket in ["new", "increased", "decreased", "won", "lost"] {
            assert_eq!(movement[bucket]["count"], 1, "bucket `{bucket}`");
        }
        assert_eq!(movement["starting_pipeline"], "374000");
        assert_eq!(movement["ending_pipeline"], "272000");
        assert_eq!(movement["waterfall"].as_array().map(Vec::len), Some(7));
    });
}

#[test]
fn forecast_and_deals_commands_return_reports() {
    with_seeded_db(|options| {
        let quarterly = reports::forecast(options, ForecastBy::Quarter, &FilterArgs::default());
        let rows = parse_payload(&quarterly.output)["result"].clone();
        assert_eq!(rows.as_array().map(Vec::len), Some(4));

        let request = DealsRequest { sort: "value".to_owned(), ..DealsRequest::default() };
        let deals = parse_payload(&reports::deals(options, &request, &FilterArgs::default()).output);
        assert_eq!(deals["status"], "ok");
        assert_eq!(deals["result"]["items"][0]["id"], "P-2001");
    });
}

#[test]
fn rollup_uses_historical_rows_for_closed_out_years() {
    with_seeded_db(|options| {
        let historical = RollupRequest { year: Some(2025), ..RollupRequest::default() };
        let payload =
            parse_payload(&reports::rollup(options, &historical, &FilterArgs::default()).output);
        assert_eq!(payload["result"]["mode"], "historical");

        let computed = RollupRequest { year: Some(2026), ..RollupRequest::default() };
        let payload =
            parse_payload(&reports::rollup(options, &computed, &FilterArgs::default()).output);
        assert_eq!(payload["result"]["mode"], "computed");
        assert_eq!(payload["result"]["rows"].as_array().map(Vec::len), Some(5));
    });
}

#[test]
fn unknown_deal_is_not_found() {
    with_seeded_db(|options| {
        let result = reports::deal(options, "P-9999");
        assert_eq!(result.exit_code, 7);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "not_found");
        assert_eq!(payload["correlation_id"], "cli-deal");
    });
}

#[test]
fn out_of_range_quarter_is_a_bad_request() {
    with_seeded_db(|options| {
        let filters = FilterArgs { quarters: vec![5], ..FilterArgs::default() };
        let result = reports::funnel(options, &filters);
        assert_eq!(result.exit_code, 8);
        assert_eq!(parse_payload(&result.output)["error_class"], "bad_request");
    });
}

#[test]
fn json_export_can_stand_in_for_the_database() {
    let dir = TempDir::new().expect("tempdir");
    let export = dir.path().join("ledgers.json");
    fs::write(
        &export,
        r#"{
            "closed_deals": [{
                "deal_id": "X-1", "deal_name": "Export deal", "account_name": "Acme",
                "contract_id": null, "region": "EMEA", "vertical": "Retail",
                "segment": "SMB", "logo_type": "New Logo", "owner": "Rep", "sold_by": "Direct",
                "license_value": "1000", "implementation_value": "0",
                "close_date": "2026-02-01", "created_date": null
            }]
        }"#,
    )
    .expect("write export");

    with_env(&[("SALESCOPE_ANALYTICS_OPERATING_YEAR", "2026")], || {
        let options = CommandOptions { dataset_path: Some(export.clone()), ..Default::default() };
        let request = DealsRequest {
            closed: true,
            sort: "value".to_owned(),
            ..DealsRequest::default()
        };
        let result = reports::deals(&options, &request, &FilterArgs::default());
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert_eq!(parse_payload(&result.output)["result"]["total"], 1);
    });
}

#[test]
fn unreadable_dataset_is_reported_as_unavailable() {
    let dir = TempDir::new().expect("tempdir");
    let options = CommandOptions {
        dataset_path: Some(dir.path().join("missing-export.json")),
        ..CommandOptions::default()
    };

    with_env(&[("SALESCOPE_ANALYTICS_OPERATING_YEAR", "2026")], || {
        let result = reports::overview(&options, &FilterArgs::default());
        assert_eq!(result.exit_code, 4, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "service_unavailable");
        assert_eq!(payload["correlation_id"], "cli-overview");
        assert!(payload["message"].as_str().unwrap_or_default().contains("missing-export.json"));
    });
}

#[test]
fn migrate_reports_correlated_config_failure() {
    with_env(&[("SALESCOPE_ANALYTICS_DEFAULT_PAGE_SIZE", "0")], || {
        let result = migrate::run(&CommandOptions::default());
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
        assert_eq!(payload["correlation_id"], "cli-migrate");
    });
}

#[test]
fn config_attributes_env_values() {
    with_env(&[("SALESCOPE_ANALYTICS_SIMULATION_SEED", "7")], || {
        let result = config::run(&CommandOptions::default());
        assert_eq!(result.exit_code, 0);

        let entries = parse_payload(&result.output)["result"].clone();
        let seed = entries
            .as_array()
            .and_then(|entries| {
                entries.iter().find(|entry| entry["key"] == "analytics.simulation_seed")
            })
            .cloned()
            .expect("seed entry");
        assert_eq!(seed["value"], "7");
        assert_eq!(seed["source"], "env (SALESCOPE_ANALYTICS_SIMULATION_SEED)");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn sqlite_url(dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", dir.join("salescope.db").display())
}

fn with_seeded_db(test_fn: impl FnOnce(&CommandOptions)) {
    let dir = TempDir::new().expect("tempdir");
    let url = sqlite_url(dir.path());
    with_env(
        &[("SALESCOPE_DATABASE_URL", url.as_str()), ("SALESCOPE_ANALYTICS_OPERATING_YEAR", "2026")],
        || {
            let options = CommandOptions::default();
            let seeded = seed::run(&options, None);
            assert_eq!(seeded.exit_code, 0, "{}", seeded.output);
            test_fn(&options);
        },
    );
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SALESCOPE_DATABASE_URL",
        "SALESCOPE_DATABASE_MAX_CONNECTIONS",
        "SALESCOPE_DATABASE_TIMEOUT_SECS",
        "SALESCOPE_ANALYTICS_OPERATING_YEAR",
        "SALESCOPE_ANALYTICS_MOVEMENT_LOOKBACK_MONTHS",
        "SALESCOPE_ANALYTICS_SIMULATION_ITERATIONS",
        "SALESCOPE_ANALYTICS_SIMULATION_SEED",
        "SALESCOPE_ANALYTICS_DEFAULT_PAGE_SIZE",
        "SALESCOPE_LOGGING_LEVEL",
        "SALESCOPE_LOGGING_FORMAT",
        "SALESCOPE_LOG_LEVEL",
        "SALESCOPE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}

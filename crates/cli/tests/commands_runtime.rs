use std::env;
use std::sync::{Mutex, OnceLock};

use backoffice_cli::commands::{config, migrate, requests, seed, start};
use serde_json::Value;
use tempfile::TempDir;

const API_TOKEN: &str = "cli-test-token-0123456789";

#[test]
fn start_returns_success_with_valid_env() {
    let workdir = workdir();
    with_env(&valid_env(&workdir), || {
        let result = start::run();
        assert_eq!(result.exit_code, 0, "expected successful start preflight");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().unwrap_or("").contains("127.0.0.1:8080"));
    });
    assert!(workdir.path().join("documents").exists(), "preflight prepares document storage");
}

#[test]
fn start_returns_config_failure_without_api_token() {
    with_env(&[], || {
        let result = start::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_returns_success_with_valid_env() {
    let workdir = workdir();
    with_env(&valid_env(&workdir), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn seed_returns_summary_for_every_request_kind() {
    let workdir = workdir();
    with_env(&valid_env(&workdir), || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected deterministic seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        for line in [
            "  - private_purchase: seed-private-001",
            "  - equipment_purchase: seed-equipment-001",
            "  - client_request: seed-client-001",
            "  - permit: seed-permit-001",
        ] {
            assert!(message.contains(line), "missing `{line}` in {message}");
        }
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let workdir = workdir();
    with_env(&valid_env(&workdir), || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);

        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn config_output_redacts_api_token() {
    let workdir = workdir();
    with_env(&valid_env(&workdir), || {
        let output = config::run();
        assert!(output.contains("- auth.api_token = cli-*** (source: env (BACKOFFICE_AUTH_API_TOKEN))"));
        assert!(!output.contains(API_TOKEN));
        assert!(output.contains("- server.port = 8080 (source: default)"));
    });
}

#[test]
fn requests_reports_unreachable_server() {
    let workdir = workdir();
    with_env(&valid_env(&workdir), || {
        let result = requests::run(requests::RequestsArgs {
            server: "http://127.0.0.1:9".to_string(),
            kind: Some("permit".to_string()),
            status: None,
            actor_id: "operator".to_string(),
            actor_email: "operator@localhost".to_string(),
            actor_role: "admin".to_string(),
        });
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "requests");
        assert_eq!(payload["error_class"], "server_unreachable");
    });
}

fn workdir() -> TempDir {
    tempfile::tempdir().expect("temporary directory")
}

fn valid_env(workdir: &TempDir) -> Vec<(&'static str, String)> {
    vec![
        ("BACKOFFICE_AUTH_API_TOKEN", API_TOKEN.to_string()),
        (
            "BACKOFFICE_DATABASE_URL",
            format!("sqlite://{}", workdir.path().join("backoffice.db").display()),
        ),
        (
            "BACKOFFICE_DOCUMENTS_STORAGE_ROOT",
            workdir.path().join("documents").display().to_string(),
        ),
    ]
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&'static str, String)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "BACKOFFICE_DATABASE_URL",
        "BACKOFFICE_DATABASE_MAX_CONNECTIONS",
        "BACKOFFICE_DATABASE_TIMEOUT_SECS",
        "BACKOFFICE_SERVER_BIND_ADDRESS",
        "BACKOFFICE_SERVER_PORT",
        "BACKOFFICE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "BACKOFFICE_AUTH_API_TOKEN",
        "BACKOFFICE_AUTH_CONSENT_TOKEN_TTL_HOURS",
        "BACKOFFICE_DOCUMENTS_STORAGE_ROOT",
        "BACKOFFICE_DOCUMENTS_MAX_UPLOAD_BYTES",
        "BACKOFFICE_LOGGING_LEVEL",
        "BACKOFFICE_LOGGING_FORMAT",
        "BACKOFFICE_LOG_LEVEL",
        "BACKOFFICE_LOG_FORMAT",
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

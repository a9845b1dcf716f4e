use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use haulquote_cli::commands::{index, migrate, quote, seed};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(
        &[("HAULQUOTE_LLM_API_KEY", "sk-test"), ("HAULQUOTE_DATABASE_URL", "sqlite::memory:")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
        },
    );
}

#[test]
fn migrate_and_seed_run_without_an_api_key() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir.path().join("keyless.db"));
    with_env(&[("HAULQUOTE_DATABASE_URL", &url)], || {
        let migrated = migrate::run();
        assert_eq!(migrated.exit_code, 0, "migrate never talks to a model: {}", migrated.output);

        let seeded = seed::run();
        assert_eq!(seeded.exit_code, 0, "seed never talks to a model: {}", seeded.output);
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_settings() {
    with_env(
        &[("HAULQUOTE_DATABASE_URL", "sqlite::memory:"), ("HAULQUOTE_INDEX_TOP_K", "64")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn index_build_without_api_key_fails_before_touching_the_database() {
    let dir = TempDir::new().expect("tempdir");
    let db_path = dir.path().join("untouched.db");
    let url = database_url(&db_path);
    let index_dir = dir.path().join("estimation_rules").display().to_string();
    with_env(&[("HAULQUOTE_DATABASE_URL", &url), ("HAULQUOTE_INDEX_DIRECTORY", &index_dir)], || {
        let result = index::run(false);
        assert_eq!(result.exit_code, 7);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "model_client");
        assert!(payload["message"].as_str().unwrap_or("").contains("llm.api_key"));
    });
    assert!(!db_path.exists());
    assert!(!dir.path().join("estimation_rules").exists());
}

#[test]
fn seed_returns_demo_booking_summary() {
    with_env(
        &[("HAULQUOTE_LLM_API_KEY", "sk-test"), ("HAULQUOTE_DATABASE_URL", "sqlite::memory:")],
        || {
            let result = seed::run();
            assert_eq!(result.exit_code, 0, "expected demo seed success");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "seed");
            assert_eq!(payload["status"], "ok");

            let message = payload["message"].as_str().unwrap_or("");
            assert!(message.contains("5 active rules and 3 bookings"));
            assert!(message.contains(
                "  - bk-demo-garden [SW1A 1AA]: Garden clearance with a shed to dismantle"
            ));
            assert!(message.contains("  - bk-demo-empty [E1 6AN]"));
        },
    );
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir.path().join("seed.db"));
    with_env(&[("HAULQUOTE_LLM_API_KEY", "sk-test"), ("HAULQUOTE_DATABASE_URL", &url)], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        assert_eq!(parse_payload(&first.output)["message"], parse_payload(&second.output)["message"]);
    });
}

#[test]
fn index_status_reports_missing_marker_without_building() {
    let dir = TempDir::new().expect("tempdir");
    let index_dir = dir.path().join("estimation_rules");
    let index_dir_text = index_dir.display().to_string();
    with_env(
        &[("HAULQUOTE_LLM_API_KEY", "sk-test"), ("HAULQUOTE_INDEX_DIRECTORY", &index_dir_text)],
        || {
            let result = index::run(true);
            assert_eq!(result.exit_code, 0);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["data"]["marker_present"], false);
            assert_eq!(payload["data"]["snapshot_present"], false);
            assert!(!index_dir.exists(), "status must never build the index");
        },
    );
}

#[test]
fn index_builds_once_then_loads() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir.path().join("index.db"));
    let index_dir = dir.path().join("estimation_rules").display().to_string();
    with_env(
        &[
            ("HAULQUOTE_LLM_API_KEY", "sk-test"),
            ("HAULQUOTE_DATABASE_URL", &url),
            ("HAULQUOTE_INDEX_DIRECTORY", &index_dir),
        ],
        || {
            let first = parse_payload(&index::run(false).output);
            assert_eq!(first["status"], "ok", "{first}");
            assert_eq!(first["data"]["origin"], "built");
            assert_eq!(first["data"]["document_count"], 0);

            let second = parse_payload(&index::run(false).output);
            assert_eq!(second["data"]["origin"], "loaded");

            let status = parse_payload(&index::run(true).output);
            assert_eq!(status["data"]["marker_present"], true);
            assert_eq!(status["data"]["snapshot_present"], true);
        },
    );
}

#[test]
fn quote_for_unknown_booking_is_a_fetch_error() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir.path().join("quote.db"));
    let index_dir = dir.path().join("estimation_rules").display().to_string();
    with_env(
        &[
            ("HAULQUOTE_LLM_API_KEY", "sk-test"),
            ("HAULQUOTE_DATABASE_URL", &url),
            ("HAULQUOTE_INDEX_DIRECTORY", &index_dir),
        ],
        || {
            let result = quote::run("bk-missing");
            assert_eq!(result.exit_code, 8, "expected estimation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "quote");
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "fetch");
            assert!(payload["message"].as_str().unwrap_or("").contains("bk-missing"));
        },
    );
}

#[test]
fn quote_failure_after_opening_the_database_leaves_it_usable() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir.path().join("quote.db"));
    let index_path = dir.path().join("not-a-directory");
    std::fs::write(&index_path, b"occupied").expect("write blocking file");
    let index_dir = index_path.display().to_string();
    with_env(
        &[
            ("HAULQUOTE_LLM_API_KEY", "sk-test"),
            ("HAULQUOTE_DATABASE_URL", &url),
            ("HAULQUOTE_INDEX_DIRECTORY", &index_dir),
        ],
        || {
            let result = quote::run("bk-demo-garden");
            assert_eq!(result.exit_code, 7, "{}", result.output);
            assert_eq!(parse_payload(&result.output)["error_class"], "index_build");

            let failed_index = parse_payload(&index::run(false).output);
            assert_eq!(failed_index["error_class"], "index_build");

            let seeded = seed::run();
            assert_eq!(seeded.exit_code, 0, "database should still accept writes: {}", seeded.output);
        },
    );
}

fn database_url(path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", path.display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "HAULQUOTE_DATABASE_URL",
        "HAULQUOTE_DATABASE_MAX_CONNECTIONS",
        "HAULQUOTE_DATABASE_TIMEOUT_SECS",
        "HAULQUOTE_LLM_PROVIDER",
        "HAULQUOTE_LLM_API_KEY",
        "OPENAI_API_KEY",
        "HAULQUOTE_LLM_BASE_URL",
        "HAULQUOTE_LLM_MODEL",
        "HAULQUOTE_LLM_MAX_TOKENS",
        "HAULQUOTE_LLM_TIMEOUT_SECS",
        "HAULQUOTE_EMBEDDINGS_MODEL",
        "HAULQUOTE_EMBEDDINGS_BASE_URL",
        "HAULQUOTE_INDEX_DIRECTORY",
        "HAULQUOTE_INDEX_TOP_K",
        "HAULQUOTE_IMAGES_DOWNLOAD_TIMEOUT_SECS",
        "HAULQUOTE_IMAGES_LOCAL_ROOT",
        "HAULQUOTE_SERVER_BIND_ADDRESS",
        "HAULQUOTE_SERVER_PORT",
        "HAULQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "HAULQUOTE_LOGGING_LEVEL",
        "HAULQUOTE_LOGGING_FORMAT",
        "HAULQUOTE_LOG_LEVEL",
        "HAULQUOTE_LOG_FORMAT",
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

use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use costgate_cli::commands::{config, doctor, migrate, sync_ledger};
use costgate_core::config::LoadOptions;
use costgate_core::domain::cost::{ApprovalRecord, CostStatus, PaymentRecord};
use costgate_core::{CostRequest, CostRequestStore, NewCostRequest, UserId};
use costgate_db::{connect_with_settings, migrations, SqlCostRequestStore, SqlLedgerBook};
use rust_decimal::Decimal;
use serde_json::Value;

fn options() -> LoadOptions {
    LoadOptions {
        config_path: Some(PathBuf::from("does-not-exist/costgate.toml")),
        ..LoadOptions::default()
    }
}

fn file_url(path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", path.display())
}

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("COSTGATE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run(options());
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_reports_config_failure_for_non_sqlite_url() {
    with_env(&[("COSTGATE_DATABASE_URL", "postgres://localhost/costgate")], || {
        let result = migrate::run(options());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_flags_unmigrated_schema_then_passes_after_migrate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_url(&dir.path().join("doctor.db"));

    with_env(&[("COSTGATE_DATABASE_URL", url.as_str())], || {
        let report: Value =
            serde_json::from_str(&doctor::run(options(), true)).expect("doctor json");
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check_status(&report, "database_connectivity"), "pass");
        assert_eq!(check_status(&report, "schema_current"), "fail");

        assert_eq!(migrate::run(options()).exit_code, 0);

        let report: Value =
            serde_json::from_str(&doctor::run(options(), true)).expect("doctor json");
        assert_eq!(report["overall_status"], "pass", "{report}");
    });
}

#[test]
fn doctor_skips_database_checks_when_config_is_invalid() {
    with_env(&[("COSTGATE_DATABASE_TIMEOUT_SECS", "0")], || {
        let output = doctor::run(options(), false);
        assert!(output.starts_with("doctor: one or more readiness checks failed"));
        assert!(output.contains("- [fail] config_validation"));
        assert!(output.contains("- [skip] database_connectivity"));
    });
}

#[test]
fn config_reports_env_sources() {
    with_env(&[("COSTGATE_DATABASE_URL", "sqlite::memory:"), ("COSTGATE_LOG_LEVEL", "debug")], || {
        let output = config::run(options());
        assert!(output.contains("- database.url = sqlite::memory: (source: env (COSTGATE_DATABASE_URL))"));
        assert!(output.contains("- logging.level = debug (source: env (COSTGATE_LOG_LEVEL))"));
        assert!(output.contains("- server.port = 8080 (source: default)"));
        assert!(output.contains("- finance.startup_sync_actor = <unset> (source: default)"));
    });
}

#[test]
fn sync_ledger_rejects_blank_actor() {
    with_env(&[("COSTGATE_DATABASE_URL", "sqlite::memory:")], || {
        let result = sync_ledger::run(options(), "   ");
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sync-ledger");
        assert_eq!(payload["error_class"], "invalid_argument");
    });
}

#[test]
fn sync_ledger_mirrors_check_numbered_requests_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_url(&dir.path().join("sync.db"));
    seed_paid_request(&url);

    with_env(&[("COSTGATE_DATABASE_URL", url.as_str())], || {
        let first = sync_ledger::run(options(), "u-finance");
        assert_eq!(first.exit_code, 0, "{}", first.output);
        let payload = parse_payload(&first.output);
        assert!(payload["message"].as_str().is_some_and(|m| m.starts_with("synced 1 ")));

        let second = sync_ledger::run(options(), "u-finance");
        let payload = parse_payload(&second.output);
        assert!(payload["message"].as_str().is_some_and(|m| m.starts_with("synced 0 ")));
    });

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("rt");
    runtime.block_on(async {
        let pool = connect_with_settings(&url, 1, 5).await.expect("connect");
        let transactions = SqlLedgerBook::new(pool.clone()).list_transactions().await.expect("list");
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].title, "[Cost Request] Projector");
        assert_eq!(transactions[0].added_by, UserId("u-finance".to_string()));
        pool.close().await;
    });
}

fn seed_paid_request(url: &str) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("rt");
    runtime.block_on(async {
        let pool = connect_with_settings(url, 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let now = Utc::now();
        let approval = |who: &str| ApprovalRecord {
            approved_by: UserId(who.to_string()),
            approved_at: now,
            comment: None,
        };
        let mut request = CostRequest::open(
            NewCostRequest {
                title: "Projector".to_string(),
                description: "Hall projector".to_string(),
                amount: Decimal::new(800, 0),
                attachments: Vec::new(),
            },
            UserId("u-student".to_string()),
            now,
        );
        request.status = CostStatus::ApprovedFinal;
        request.approved_by_l1 = Some(approval("u-gs"));
        request.approved_by_l2 = Some(approval("u-vp"));
        request.approved_by_final = Some(approval("u-head"));
        request.payment =
            Some(PaymentRecord { check_number: "CHK-900".to_string(), check_date: now });

        SqlCostRequestStore::new(pool.clone()).insert(&request).await.expect("insert");
        pool.close().await;
    });
}

fn check_status<'a>(report: &'a Value, name: &str) -> &'a str {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or("missing")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "COSTGATE_DATABASE_URL",
        "COSTGATE_DATABASE_MAX_CONNECTIONS",
        "COSTGATE_DATABASE_TIMEOUT_SECS",
        "COSTGATE_SERVER_BIND_ADDRESS",
        "COSTGATE_SERVER_PORT",
        "COSTGATE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "COSTGATE_LOGGING_LEVEL",
        "COSTGATE_LOGGING_FORMAT",
        "COSTGATE_LOG_LEVEL",
        "COSTGATE_LOG_FORMAT",
        "COSTGATE_FINANCE_STARTUP_SYNC_ACTOR",
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

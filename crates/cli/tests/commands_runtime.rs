use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Mutex, OnceLock, PoisonError};

use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use medportal_cli::commands::config;
use medportal_cli::{execute, Command, ConsentCommand, GlobalArgs, QuoteCommand, SessionCommand};
use medportal_core::session::token::encode_unsigned;
use medportal_core::session::SessionSettings;
use medportal_core::storage::{
    FileStorage, Storage, APP_VERSION_KEY, AUTH_DATA_KEY, COOKIE_CONSENT_KEY,
    IS_AUTHENTICATED_KEY, TOKEN_KEY,
};
use serde_json::{json, Value};
use tempfile::TempDir;

#[test]
fn login_without_password_is_a_config_failure() {
    with_env(&[("MEDPORTAL_BACKEND_LOGIN", "rep-17")], || {
        let workspace = Workspace::new();

        let result = execute(&workspace.global(), Command::Login { login: None });
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "login");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn invalid_session_timing_fails_config_validation() {
    with_env(
        &[
            ("MEDPORTAL_SESSION_POLL_INTERVAL_SECS", "600"),
            ("MEDPORTAL_SESSION_WARNING_THRESHOLD_SECS", "300"),
        ],
        || {
            let workspace = Workspace::new();

            let result = execute(&workspace.global(), Command::Session(SessionCommand::Status));
            assert_eq!(result.exit_code, 2);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "session.status");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn status_without_stored_session_reports_expired() {
    with_env(&[], || {
        let workspace = Workspace::new();

        let result = execute(&workspace.global(), Command::Session(SessionCommand::Status));
        assert_eq!(result.exit_code, 3, "expected session failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "session_expired");
        assert!(payload["message"].as_str().unwrap_or_default().contains("missing_token"));
    });
}

#[test]
fn status_reports_a_stored_session() {
    with_env(&[], || {
        let workspace = Workspace::new();
        workspace.store_session(3_600);

        let result = execute(&workspace.global(), Command::Session(SessionCommand::Status));
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["state"]["state"], "authenticated");
        assert_eq!(payload["data"]["login"], "rep-17");
        assert_eq!(payload["data"]["subject"], "rep-17");
    });
}

#[test]
fn status_inside_the_warning_window_suggests_renewal() {
    with_env(&[], || {
        let workspace = Workspace::new();
        workspace.store_session(120);

        let result = execute(&workspace.global(), Command::Session(SessionCommand::Status));
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["state"]["state"], "warning_shown");
        assert!(payload["message"].as_str().unwrap_or_default().contains("session renew"));
    });
}

#[test]
fn expired_session_is_cleared_on_status() {
    with_env(&[], || {
        let workspace = Workspace::new();
        workspace.store_session(-60);

        let result = execute(&workspace.global(), Command::Session(SessionCommand::Status));
        assert_eq!(result.exit_code, 3);
        assert!(parse_payload(&result.output)["message"]
            .as_str()
            .unwrap_or_default()
            .contains("expired"));
        assert_eq!(workspace.storage().get(TOKEN_KEY).expect("read token"), None);
    });
}

#[test]
fn logout_clears_session_keys_but_keeps_consent() {
    with_env(&[], || {
        let workspace = Workspace::new();
        workspace.store_session(3_600);
        let accepted = execute(&workspace.global(), Command::Consent(ConsentCommand::Accept));
        assert_eq!(accepted.exit_code, 0);

        let result = execute(&workspace.global(), Command::Logout);
        assert_eq!(result.exit_code, 0);
        assert_eq!(parse_payload(&result.output)["message"], "signed out");

        let storage = workspace.storage();
        assert_eq!(storage.get(TOKEN_KEY).expect("read"), None);
        assert_eq!(storage.get(IS_AUTHENTICATED_KEY).expect("read"), None);
        assert_eq!(storage.get(AUTH_DATA_KEY).expect("read"), None);
        assert!(storage.get(COOKIE_CONSENT_KEY).expect("read").is_some());
    });
}

#[test]
fn consent_needs_prompt_until_decided() {
    with_env(&[], || {
        let workspace = Workspace::new();

        let before = execute(&workspace.global(), Command::Consent(ConsentCommand::Status));
        let before = parse_payload(&before.output);
        assert_eq!(before["data"]["status"], "undecided");
        assert_eq!(before["data"]["needs_prompt"], true);

        let declined = execute(&workspace.global(), Command::Consent(ConsentCommand::Decline));
        assert_eq!(parse_payload(&declined.output)["data"]["accepted"], false);

        let after = execute(&workspace.global(), Command::Consent(ConsentCommand::Status));
        let after = parse_payload(&after.output);
        assert_eq!(after["data"]["status"], "current");
        assert_eq!(after["data"]["needs_prompt"], false);
        assert_eq!(after["data"]["policy_version"], "1");
    });
}

#[test]
fn preview_walks_the_wizard_and_prints_the_payload() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let draft = workspace.write_draft(complete_draft());

        let result = execute(&workspace.global(), Command::Quote(QuoteCommand::Preview { draft }));
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        let body = &payload["data"];
        assert_eq!(body["DocObjectCode"], "oQuotations");
        assert_eq!(body["CardCode"], "C000301");
        assert_eq!(body["BPL_IDAssignedToInvoice"], 2);
        assert_eq!(body["DocumentLines"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["DocumentLines"][1]["LineNum"], 1);
        assert_eq!(body["DocumentLines"][1]["DiscountPercent"], 5.0);
        assert_eq!(body["TaxExtension"]["MainUsage"], 90);
        assert_eq!(payload["message"], "2 line(s), subtotal 69.5");
    });
}

#[test]
fn preview_reports_the_first_incomplete_step() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let draft = workspace.write_draft(json!({ "header": { "card_code": "C000301" } }));

        let result = execute(&workspace.global(), Command::Quote(QuoteCommand::Preview { draft }));
        assert_eq!(result.exit_code, 5);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "bad_request");
        assert!(payload["message"].as_str().unwrap_or_default().contains("tax_date"));
    });
}

#[test]
fn unreadable_draft_is_rejected() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let draft = workspace.dir.path().join("missing.json");

        let result = execute(&workspace.global(), Command::Quote(QuoteCommand::Preview { draft }));
        assert_eq!(result.exit_code, 5);
        assert!(parse_payload(&result.output)["message"]
            .as_str()
            .unwrap_or_default()
            .contains("could not read draft"));
    });
}

#[test]
fn quote_list_requires_a_session() {
    with_env(&[], || {
        let workspace = Workspace::new();

        let result = execute(&workspace.global(), Command::Quote(QuoteCommand::List));
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "session_expired");
    });
}

#[test]
fn watch_with_zero_budget_returns_current_state() {
    with_env(&[], || {
        let workspace = Workspace::new();
        workspace.store_session(3_600);

        let result = execute(
            &workspace.global(),
            Command::Session(SessionCommand::Watch { auto_renew: false, max_secs: Some(0) }),
        );
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
        assert_eq!(parse_payload(&result.output)["data"]["state"]["state"], "authenticated");
    });
}

#[test]
fn config_output_attributes_sources() {
    with_env(&[("MEDPORTAL_BACKEND_BASE_URL", "https://portal.example.com")], || {
        let workspace = Workspace::new();

        let output = config::run(&workspace.global());

        assert!(output.contains(
            "- backend.base_url = https://portal.example.com \
             (source: env (MEDPORTAL_BACKEND_BASE_URL))"
        ));
        assert!(output.contains("(source: flag (--storage))"));
        assert!(output.contains("- backend.password = <unset> (source: default)"));
    });
}

#[test]
fn config_output_redacts_the_password() {
    with_env(&[("MEDPORTAL_BACKEND_PASSWORD", "hunter2")], || {
        let output = config::run(&Workspace::new().global());

        assert!(!output.contains("hunter2"));
        assert!(output.contains("- backend.password = <redacted>"));
    });
}

#[test]
fn doctor_reports_unreachable_backend() {
    with_env(&[("MEDPORTAL_BACKEND_BASE_URL", "http://127.0.0.1:9")], || {
        let workspace = Workspace::new();

        let result = execute(&workspace.global(), Command::Doctor { json: true });
        let report = parse_payload(&result.output);

        assert_eq!(report["overall_status"], "fail");
        let checks = report["checks"].as_array().expect("checks array");
        let status_of = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].clone())
                .unwrap_or(Value::Null)
        };
        assert_eq!(status_of("config_validation"), "pass");
        assert_eq!(status_of("storage_access"), "pass");
        assert_eq!(status_of("session_token"), "skipped");
        assert_eq!(status_of("backend_reachability"), "fail");
    });
}

#[test]
fn login_submit_and_forced_logout_against_a_backend() {
    with_env(&[("MEDPORTAL_BACKEND_PASSWORD", "hunter2")], || {
        let token = encode_unsigned(&json!({
            "exp": Utc::now().timestamp() + 3_600,
            "sub": "mcosta",
        }));
        let router = Router::new()
            .route(
                "/auth/login",
                post(move || {
                    let token = token.clone();
                    async move {
                        Json(json!({
                            "token": token,
                            "user": { "login": "mcosta", "firstName": "Marina" }
                        }))
                    }
                }),
            )
            .route(
                "/Quotations",
                post(|| async {
                    (StatusCode::CREATED, Json(json!({ "DocEntry": 901, "DocNum": 7001 })))
                })
                .get(|| async {
                    Json(json!({ "value": [
                        { "DocEntry": 901, "CardCode": "C000301" },
                        { "DocEntry": 902, "CardCode": "C000302" }
                    ] }))
                }),
            )
            .route("/Quotations(5)", get(|| async { (StatusCode::UNAUTHORIZED, "") }));

        let mut workspace = Workspace::new();
        workspace.base_url = Some(spawn_backend(router));

        let login = execute(
            &workspace.global(),
            Command::Login { login: Some("mcosta".to_string()) },
        );
        assert_eq!(login.exit_code, 0, "unexpected output: {}", login.output);
        let login = parse_payload(&login.output);
        assert_eq!(login["message"], "signed in as Marina");
        assert_eq!(login["data"]["state"]["state"], "authenticated");

        let draft = workspace.write_draft(complete_draft());
        let submit = execute(
            &workspace.global(),
            Command::Quote(QuoteCommand::Submit { draft, doc_entry: None }),
        );
        assert_eq!(submit.exit_code, 0, "unexpected output: {}", submit.output);
        let submit = parse_payload(&submit.output);
        assert_eq!(submit["data"]["kind"], "created");
        assert_eq!(submit["data"]["doc_num"], 7001);

        let list = execute(&workspace.global(), Command::Quote(QuoteCommand::List));
        assert_eq!(parse_payload(&list.output)["message"], "2 quotation(s)");

        let rejected =
            execute(&workspace.global(), Command::Quote(QuoteCommand::Show { doc_entry: 5 }));
        assert_eq!(rejected.exit_code, 3);
        assert_eq!(workspace.storage().get(TOKEN_KEY).expect("read token"), None);

        let status = execute(&workspace.global(), Command::Session(SessionCommand::Status));
        assert_eq!(status.exit_code, 3);
    });
}

struct Workspace {
    dir: TempDir,
    base_url: Option<String>,
}

impl Workspace {
    fn new() -> Self {
        Self { dir: tempfile::tempdir().expect("temp dir"), base_url: None }
    }

    fn storage_path(&self) -> PathBuf {
        self.dir.path().join("storage.json")
    }

    fn global(&self) -> GlobalArgs {
        GlobalArgs {
            config: None,
            base_url: self.base_url.clone(),
            storage: Some(self.storage_path()),
        }
    }

    fn storage(&self) -> FileStorage {
        FileStorage::new(self.storage_path())
    }

    fn store_session(&self, expires_in_secs: i64) {
        let storage = self.storage();
        let token = encode_unsigned(&json!({
            "exp": Utc::now().timestamp() + expires_in_secs,
            "sub": "rep-17",
        }));
        storage
            .set(APP_VERSION_KEY, &SessionSettings::default().app_version)
            .expect("write version");
        storage.set(TOKEN_KEY, &token).expect("write token");
        storage.set(IS_AUTHENTICATED_KEY, "true").expect("write flag");
        storage
            .set(AUTH_DATA_KEY, &json!({ "login": "rep-17" }).to_string())
            .expect("write profile");
    }

    fn write_draft(&self, draft: Value) -> PathBuf {
        let path = self.dir.path().join("draft.json");
        write_json(&path, &draft);
        path
    }
}

fn complete_draft() -> Value {
    json!({
        "header": {
            "card_code": "C000301",
            "bpl_id": 2,
            "tax_date": "2026-07-28",
            "doc_due_date": "2026-08-04"
        },
        "lines": [
            { "item_code": "SRG-10", "quantity": 10, "price": "1.25" },
            { "item_code": "LUV-M", "quantity": 2, "price": 30, "discount_percent": 5 }
        ]
    })
}

fn write_json(path: &Path, value: &Value) {
    fs::write(path, value.to_string()).expect("write draft");
}

fn spawn_backend(router: Router) -> String {
    let (sender, receiver) = mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("backend runtime");
        runtime.block_on(async move {
            let listener =
                tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test backend");
            sender.send(listener.local_addr().expect("backend address")).expect("send address");
            axum::serve(listener, router).await.expect("test backend");
        });
    });
    format!("http://{}", receiver.recv().expect("backend address"))
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(PoisonError::into_inner);

    let keys = [
        "MEDPORTAL_BACKEND_BASE_URL",
        "MEDPORTAL_BACKEND_TIMEOUT_SECS",
        "MEDPORTAL_BACKEND_LOGIN",
        "MEDPORTAL_BACKEND_PASSWORD",
        "MEDPORTAL_SESSION_POLL_INTERVAL_SECS",
        "MEDPORTAL_SESSION_WARNING_THRESHOLD_SECS",
        "MEDPORTAL_SESSION_COUNTDOWN_TICK_SECS",
        "MEDPORTAL_STORAGE_PATH",
        "MEDPORTAL_QUOTATION_PRICE_SCALE",
        "MEDPORTAL_QUOTATION_DUE_DATE_OFFSET_DAYS",
        "MEDPORTAL_LOGGING_LEVEL",
        "MEDPORTAL_LOGGING_FORMAT",
        "MEDPORTAL_LOG_LEVEL",
        "MEDPORTAL_LOG_FORMAT",
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

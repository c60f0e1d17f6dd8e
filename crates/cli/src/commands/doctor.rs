use chrono::Utc;
use medportal_client::PortalClient;
use medportal_core::config::AppConfig;
use medportal_core::session::token::{self, TokenError};
use medportal_core::storage::{FileStorage, Storage, TOKEN_KEY};
use serde::Serialize;

use crate::GlobalArgs;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(global: &GlobalArgs, json_output: bool) -> String {
    let report = build_report(global);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\
                 \"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(global: &GlobalArgs) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(global.load_options()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            let storage = FileStorage::new(config.storage.path.clone());
            let stored_token = storage.get(TOKEN_KEY);
            checks.push(check_storage_access(&storage, stored_token.is_ok()));
            checks.push(check_session_token(stored_token.ok().flatten()));
            checks.push(check_backend_reachability(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["storage_access", "session_token", "backend_reachability"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    // A missing session is reported but does not make the install unhealthy.
    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_storage_access(storage: &FileStorage, readable: bool) -> DoctorCheck {
    let path = storage.path().display();
    if readable {
        DoctorCheck {
            name: "storage_access",
            status: CheckStatus::Pass,
            details: format!("storage `{path}` is readable"),
        }
    } else {
        DoctorCheck {
            name: "storage_access",
            status: CheckStatus::Fail,
            details: format!("storage `{path}` could not be read; run `medportal logout` to reset"),
        }
    }
}

fn check_session_token(raw: Option<String>) -> DoctorCheck {
    match token::decode(raw.as_deref()) {
        Ok(claims) if claims.remaining_secs(Utc::now()) > 0 => DoctorCheck {
            name: "session_token",
            status: CheckStatus::Pass,
            details: format!("session valid for {}s", claims.remaining_secs(Utc::now())),
        },
        Ok(_) | Err(TokenError::Expired) => DoctorCheck {
            name: "session_token",
            status: CheckStatus::Skipped,
            details: "stored session has expired; run `medportal login`".to_string(),
        },
        Err(TokenError::Missing) => DoctorCheck {
            name: "session_token",
            status: CheckStatus::Skipped,
            details: "no stored session".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "session_token",
            status: CheckStatus::Fail,
            details: format!("stored token is unusable: {error}"),
        },
    }
}

fn check_backend_reachability(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "backend_reachability",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let portal = PortalClient::new(&config.backend)?;
        portal.probe().await
    });

    match result {
        Ok(status) => DoctorCheck {
            name: "backend_reachability",
            status: CheckStatus::Pass,
            details: format!("`{}` answered with HTTP {status}", config.backend.base_url),
        },
        Err(error) => DoctorCheck {
            name: "backend_reachability",
            status: CheckStatus::Fail,
            details: format!("`{}` unreachable: {error}", config.backend.base_url),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use medportal_core::config::AppConfig;
use toml::Value;

use crate::GlobalArgs;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
    overridden: Option<&'static str>,
}

pub fn run(global: &GlobalArgs) -> String {
    let config = match AppConfig::load(global.load_options()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(global.config.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for field in fields(&config, global) {
        let source = field_source(
            &field,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig, global: &GlobalArgs) -> Vec<Field> {
    let backend = &config.backend;
    let session = &config.session;
    let quotation = &config.quotation;
    let password = if backend.password.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        Field {
            key: "backend.base_url",
            value: backend.base_url.clone(),
            env_keys: &["MEDPORTAL_BACKEND_BASE_URL"],
            overridden: global.base_url.as_ref().map(|_| "--base-url"),
        },
        Field {
            key: "backend.timeout_secs",
            value: backend.timeout_secs.to_string(),
            env_keys: &["MEDPORTAL_BACKEND_TIMEOUT_SECS"],
            overridden: None,
        },
        Field {
            key: "backend.login_path",
            value: backend.login_path.clone(),
            env_keys: &[],
            overridden: None,
        },
        Field {
            key: "backend.refresh_path",
            value: backend.refresh_path.clone(),
            env_keys: &[],
            overridden: None,
        },
        Field {
            key: "backend.quotations_path",
            value: backend.quotations_path.clone(),
            env_keys: &[],
            overridden: None,
        },
        Field {
            key: "backend.login",
            value: backend.login.clone().unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["MEDPORTAL_BACKEND_LOGIN"],
            overridden: None,
        },
        Field {
            key: "backend.password",
            value: password.to_string(),
            env_keys: &["MEDPORTAL_BACKEND_PASSWORD"],
            overridden: None,
        },
        Field {
            key: "session.poll_interval_secs",
            value: session.poll_interval_secs.to_string(),
            env_keys: &["MEDPORTAL_SESSION_POLL_INTERVAL_SECS"],
            overridden: None,
        },
        Field {
            key: "session.warning_threshold_secs",
            value: session.warning_threshold_secs.to_string(),
            env_keys: &["MEDPORTAL_SESSION_WARNING_THRESHOLD_SECS"],
            overridden: None,
        },
        Field {
            key: "session.countdown_tick_secs",
            value: session.countdown_tick_secs.to_string(),
            env_keys: &["MEDPORTAL_SESSION_COUNTDOWN_TICK_SECS"],
            overridden: None,
        },
        Field {
            key: "session.consent_policy_version",
            value: session.consent_policy_version.clone(),
            env_keys: &[],
            overridden: None,
        },
        Field {
            key: "session.consent_validity_days",
            value: session.consent_validity_days.to_string(),
            env_keys: &[],
            overridden: None,
        },
        Field {
            key: "storage.path",
            value: config.storage.path.display().to_string(),
            env_keys: &["MEDPORTAL_STORAGE_PATH"],
            overridden: global.storage.as_ref().map(|_| "--storage"),
        },
        Field {
            key: "quotation.price_scale",
            value: quotation.price_scale.to_string(),
            env_keys: &["MEDPORTAL_QUOTATION_PRICE_SCALE"],
            overridden: None,
        },
        Field {
            key: "quotation.due_date_offset_days",
            value: quotation.due_date_offset_days.to_string(),
            env_keys: &["MEDPORTAL_QUOTATION_DUE_DATE_OFFSET_DAYS"],
            overridden: None,
        },
        Field {
            key: "quotation.payment_group_code",
            value: quotation.payment_group_code.to_string(),
            env_keys: &[],
            overridden: None,
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["MEDPORTAL_LOGGING_LEVEL", "MEDPORTAL_LOG_LEVEL"],
            overridden: None,
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["MEDPORTAL_LOGGING_FORMAT", "MEDPORTAL_LOG_FORMAT"],
            overridden: None,
        },
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let root = PathBuf::from("medportal.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/medportal.toml");
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

fn field_source(
    field: &Field,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(flag) = field.overridden {
        return format!("flag ({flag})");
    }

    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

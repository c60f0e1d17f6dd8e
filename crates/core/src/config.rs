use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::quotation::LineRules;
use crate::flows::payload::{PayloadDefaults, DEFAULT_PAYMENT_GROUP_CODE};
use crate::session::monitor::SessionSettings;

const MAX_PRICE_SCALE: u32 = 6;
const MAX_POLL_INTERVAL_SECS: u64 = 3_600;
const MAX_COUNTDOWN_TICK_SECS: u64 = 60;
const MAX_WARNING_THRESHOLD_SECS: u64 = 86_400;
const MAX_CONSENT_VALIDITY_DAYS: u32 = 3_650;
const MAX_DUE_DATE_OFFSET_DAYS: u32 = 3_650;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub quotation: QuotationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub login_path: String,
    pub refresh_path: String,
    pub quotations_path: String,
    pub login: Option<String>,
    pub password: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub poll_interval_secs: u64,
    pub warning_threshold_secs: u64,
    pub countdown_tick_secs: u64,
    pub consent_policy_version: String,
    pub consent_validity_days: u32,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct QuotationConfig {
    pub price_scale: u32,
    pub due_date_offset_days: u32,
    pub payment_group_code: i32,
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub storage_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub login: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                base_url: "http://localhost:3000".to_string(),
                timeout_secs: 30,
                login_path: "/auth/login".to_string(),
                refresh_path: "/auth/refresh".to_string(),
                quotations_path: "/Quotations".to_string(),
                login: None,
                password: None,
            },
            session: SessionConfig {
                poll_interval_secs: 10,
                warning_threshold_secs: 300,
                countdown_tick_secs: 1,
                consent_policy_version: "1".to_string(),
                consent_validity_days: 365,
            },
            storage: StorageConfig { path: PathBuf::from(".medportal/storage.json") },
            quotation: QuotationConfig {
                price_scale: LineRules::default().scale,
                due_date_offset_days: 7,
                payment_group_code: DEFAULT_PAYMENT_GROUP_CODE,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("medportal.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            poll_interval: seconds(self.session.poll_interval_secs),
            warning_threshold: seconds(self.session.warning_threshold_secs),
            countdown_tick: seconds(self.session.countdown_tick_secs),
            ..SessionSettings::default()
        }
    }

    pub fn line_rules(&self) -> LineRules {
        LineRules { scale: self.quotation.price_scale }
    }

    pub fn payload_defaults(&self) -> PayloadDefaults {
        PayloadDefaults {
            payment_group_code: self.quotation.payment_group_code,
            due_date_offset_days: i64::from(self.quotation.due_date_offset_days),
        }
    }

    pub fn consent_validity(&self) -> Duration {
        Duration::try_days(i64::from(self.session.consent_validity_days)).unwrap_or(Duration::MAX)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(backend) = patch.backend {
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = base_url;
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
            if let Some(login_path) = backend.login_path {
                self.backend.login_path = login_path;
            }
            if let Some(refresh_path) = backend.refresh_path {
                self.backend.refresh_path = refresh_path;
            }
            if let Some(quotations_path) = backend.quotations_path {
                self.backend.quotations_path = quotations_path;
            }
            if let Some(login) = backend.login {
                self.backend.login = Some(login);
            }
            if let Some(password_value) = backend.password {
                self.backend.password = Some(secret_value(password_value));
            }
        }

        if let Some(session) = patch.session {
            if let Some(poll_interval_secs) = session.poll_interval_secs {
                self.session.poll_interval_secs = poll_interval_secs;
            }
            if let Some(warning_threshold_secs) = session.warning_threshold_secs {
                self.session.warning_threshold_secs = warning_threshold_secs;
            }
            if let Some(countdown_tick_secs) = session.countdown_tick_secs {
                self.session.countdown_tick_secs = countdown_tick_secs;
            }
            if let Some(policy_version) = session.consent_policy_version {
                self.session.consent_policy_version = policy_version;
            }
            if let Some(validity_days) = session.consent_validity_days {
                self.session.consent_validity_days = validity_days;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(path) = storage.path {
                self.storage.path = path;
            }
        }

        if let Some(quotation) = patch.quotation {
            if let Some(price_scale) = quotation.price_scale {
                self.quotation.price_scale = price_scale;
            }
            if let Some(due_date_offset_days) = quotation.due_date_offset_days {
                self.quotation.due_date_offset_days = due_date_offset_days;
            }
            if let Some(payment_group_code) = quotation.payment_group_code {
                self.quotation.payment_group_code = payment_group_code;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("MEDPORTAL_BACKEND_BASE_URL") {
            self.backend.base_url = value;
        }
        if let Some(value) = read_env("MEDPORTAL_BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("MEDPORTAL_BACKEND_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("MEDPORTAL_BACKEND_LOGIN") {
            self.backend.login = Some(value);
        }
        if let Some(value) = read_env("MEDPORTAL_BACKEND_PASSWORD") {
            self.backend.password = Some(secret_value(value));
        }

        if let Some(value) = read_env("MEDPORTAL_SESSION_POLL_INTERVAL_SECS") {
            self.session.poll_interval_secs =
                parse_u64("MEDPORTAL_SESSION_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("MEDPORTAL_SESSION_WARNING_THRESHOLD_SECS") {
            self.session.warning_threshold_secs =
                parse_u64("MEDPORTAL_SESSION_WARNING_THRESHOLD_SECS", &value)?;
        }
        if let Some(value) = read_env("MEDPORTAL_SESSION_COUNTDOWN_TICK_SECS") {
            self.session.countdown_tick_secs =
                parse_u64("MEDPORTAL_SESSION_COUNTDOWN_TICK_SECS", &value)?;
        }

        if let Some(value) = read_env("MEDPORTAL_STORAGE_PATH") {
            self.storage.path = PathBuf::from(value);
        }

        if let Some(value) = read_env("MEDPORTAL_QUOTATION_PRICE_SCALE") {
            self.quotation.price_scale = parse_u32("MEDPORTAL_QUOTATION_PRICE_SCALE", &value)?;
        }
        if let Some(value) = read_env("MEDPORTAL_QUOTATION_DUE_DATE_OFFSET_DAYS") {
            self.quotation.due_date_offset_days =
                parse_u32("MEDPORTAL_QUOTATION_DUE_DATE_OFFSET_DAYS", &value)?;
        }

        let log_level =
            read_env("MEDPORTAL_LOGGING_LEVEL").or_else(|| read_env("MEDPORTAL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MEDPORTAL_LOGGING_FORMAT").or_else(|| read_env("MEDPORTAL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.base_url {
            self.backend.base_url = base_url;
        }
        if let Some(storage_path) = overrides.storage_path {
            self.storage.path = storage_path;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(login) = overrides.login {
            self.backend.login = Some(login);
        }
        if let Some(password) = overrides.password {
            self.backend.password = Some(secret_value(password));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_backend(&self.backend)?;
        validate_session(&self.session)?;
        validate_quotation(&self.quotation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn seconds(secs: u64) -> Duration {
    i64::try_from(secs).ok().and_then(Duration::try_seconds).unwrap_or(Duration::MAX)
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("medportal.toml"), PathBuf::from("config/medportal.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    let base_url = backend.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "backend.base_url must start with http:// or https://".to_string(),
        ));
    }

    if backend.timeout_secs == 0 || backend.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "backend.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    for (name, path) in [
        ("backend.login_path", &backend.login_path),
        ("backend.refresh_path", &backend.refresh_path),
        ("backend.quotations_path", &backend.quotations_path),
    ] {
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(format!("{name} must start with `/`")));
        }
    }

    let blank_password = backend
        .password
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(false);
    if blank_password {
        return Err(ConfigError::Validation(
            "backend.password is set but empty; remove it or provide a value".to_string(),
        ));
    }

    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.poll_interval_secs == 0 || session.countdown_tick_secs == 0 {
        return Err(ConfigError::Validation(
            "session.poll_interval_secs and session.countdown_tick_secs must be greater than zero"
                .to_string(),
        ));
    }

    if session.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
        return Err(ConfigError::Validation(format!(
            "session.poll_interval_secs must be in range 1..={MAX_POLL_INTERVAL_SECS}"
        )));
    }

    if session.countdown_tick_secs > MAX_COUNTDOWN_TICK_SECS {
        return Err(ConfigError::Validation(format!(
            "session.countdown_tick_secs must be in range 1..={MAX_COUNTDOWN_TICK_SECS}"
        )));
    }

    if session.warning_threshold_secs > MAX_WARNING_THRESHOLD_SECS {
        return Err(ConfigError::Validation(format!(
            "session.warning_threshold_secs must not exceed {MAX_WARNING_THRESHOLD_SECS}"
        )));
    }

    if session.warning_threshold_secs <= session.poll_interval_secs {
        return Err(ConfigError::Validation(
            "session.warning_threshold_secs must exceed session.poll_interval_secs".to_string(),
        ));
    }

    if session.consent_validity_days == 0
        || session.consent_validity_days > MAX_CONSENT_VALIDITY_DAYS
    {
        return Err(ConfigError::Validation(format!(
            "session.consent_validity_days must be in range 1..={MAX_CONSENT_VALIDITY_DAYS}"
        )));
    }

    if session.consent_policy_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "session.consent_policy_version must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_quotation(quotation: &QuotationConfig) -> Result<(), ConfigError> {
    if quotation.price_scale > MAX_PRICE_SCALE {
        return Err(ConfigError::Validation(format!(
            "quotation.price_scale must be in range 0..={MAX_PRICE_SCALE}"
        )));
    }

    if quotation.due_date_offset_days > MAX_DUE_DATE_OFFSET_DAYS {
        return Err(ConfigError::Validation(format!(
            "quotation.due_date_offset_days must be in range 0..={MAX_DUE_DATE_OFFSET_DAYS}"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    backend: Option<BackendPatch>,
    session: Option<SessionPatch>,
    storage: Option<StoragePatch>,
    quotation: Option<QuotationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    login_path: Option<String>,
    refresh_path: Option<String>,
    quotations_path: Option<String>,
    login: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    poll_interval_secs: Option<u64>,
    warning_threshold_secs: Option<u64>,
    countdown_tick_secs: Option<u64>,
    consent_policy_version: Option<String>,
    consent_validity_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct QuotationPatch {
    price_scale: Option<u32>,
    due_date_offset_days: Option<u32>,
    payment_group_code: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

pub mod config;
pub mod consent;
pub mod doctor;
pub mod login;
pub mod quote;
pub mod session;

use std::future::Future;

use medportal_core::errors::ApplicationError;
use serde::Serialize;
use serde_json::Value;

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_SESSION: u8 = 3;
pub const EXIT_BACKEND: u8 = 4;
pub const EXIT_REJECTED: u8 = 5;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            correlation_id: None,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            correlation_id: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Maps an application error onto the user-facing class, message and exit
    /// code. The technical detail goes to the log, not to stdout.
    pub fn from_error(
        command: &str,
        error: impl Into<ApplicationError>,
        correlation_id: &str,
    ) -> Self {
        let interface = error.into().into_interface(correlation_id);
        tracing::warn!(
            event_name = "cli.command.failed",
            command,
            error_class = interface.error_class(),
            error = %interface,
            "command failed"
        );

        let exit_code = match interface.error_class() {
            "session_expired" => EXIT_SESSION,
            "service_unavailable" => EXIT_BACKEND,
            "bad_request" | "permission_denied" => EXIT_REJECTED,
            _ => EXIT_FAILURE,
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(interface.error_class().to_string()),
            message: format!("{} ({interface})", interface.user_message()),
            correlation_id: Some(interface.correlation_id().to_string()),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Each command drives its own single-threaded runtime.
pub(crate) fn block_on<F>(future: F) -> Result<F::Output, std::io::Error>
where
    F: Future,
{
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}

pub(crate) fn runtime_failure(command: &str, error: std::io::Error) -> CommandResult {
    CommandResult::failure(
        command,
        "internal",
        format!("failed to initialize async runtime: {error}"),
        EXIT_FAILURE,
    )
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

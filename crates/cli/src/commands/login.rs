use chrono::Utc;
use medportal_core::session::SessionState;
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::info;

use super::{block_on, runtime_failure, CommandResult, EXIT_CONFIG, EXIT_REJECTED};
use crate::context::CommandContext;

const COMMAND: &str = "login";

pub fn run(context: &CommandContext, login: Option<String>) -> CommandResult {
    let Some(login) = login.or_else(|| context.config.backend.login.clone()) else {
        return CommandResult::failure(
            COMMAND,
            "bad_request",
            "no login given; pass --login or set backend.login",
            EXIT_REJECTED,
        );
    };
    let Some(password) = context.config.backend.password.as_ref() else {
        return CommandResult::failure(
            COMMAND,
            "config_validation",
            "backend.password is not set (MEDPORTAL_BACKEND_PASSWORD)",
            EXIT_CONFIG,
        );
    };

    let portal = match context.portal() {
        Ok(portal) => portal,
        Err(error) => return CommandResult::from_error(COMMAND, error, &context.correlation_id),
    };
    let signed_in = match block_on(portal.login(&login, password)) {
        Ok(Ok(signed_in)) => signed_in,
        Ok(Err(error)) => return CommandResult::from_error(COMMAND, error, &context.correlation_id),
        Err(error) => return runtime_failure(COMMAND, error),
    };

    let now = Utc::now();
    let mut monitor = context.monitor();
    let established = monitor
        .startup(now)
        .and_then(|_| monitor.establish(signed_in.token.expose_secret(), &signed_in.profile, now));
    let outcome = match established {
        Ok(outcome) => outcome,
        Err(error) => return CommandResult::from_error(COMMAND, error, &context.correlation_id),
    };

    let expires_at = monitor.claims().ok().and_then(|claims| claims.expires_at());
    info!(event_name = "cli.login.succeeded", login = login.as_str(), "signed in");

    let message = match outcome.to {
        SessionState::WarningShown { remaining_secs } => format!(
            "signed in as {}; session expires in {remaining_secs}s",
            signed_in.profile.display_name()
        ),
        _ => format!("signed in as {}", signed_in.profile.display_name()),
    };
    CommandResult::success_with(
        COMMAND,
        message,
        Some(json!({
            "login": signed_in.profile.login,
            "state": outcome.to,
            "expires_at": expires_at,
            "actions": outcome.actions,
        })),
    )
}

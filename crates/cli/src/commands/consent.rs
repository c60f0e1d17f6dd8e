use chrono::Utc;
use medportal_core::session::consent::{self, ConsentDecision, ConsentStatus};
use serde_json::json;
use tracing::info;

use super::CommandResult;
use crate::context::CommandContext;

const COMMAND: &str = "consent";

pub fn decide(context: &CommandContext, accepted: bool) -> CommandResult {
    if let Err(error) = context.reset_stale_storage() {
        return CommandResult::from_error(COMMAND, error, &context.correlation_id);
    }

    let decision = ConsentDecision::new(
        accepted,
        Utc::now(),
        context.config.consent_validity(),
        context.config.session.consent_policy_version.as_str(),
    );
    if let Err(error) = consent::record(context.storage.as_ref(), &decision) {
        return CommandResult::from_error(COMMAND, error, &context.correlation_id);
    }
    info!(
        event_name = "cli.consent.recorded",
        accepted,
        policy_version = decision.policy_version.as_str(),
        "cookie consent recorded"
    );

    let message = if accepted { "cookies accepted" } else { "non-essential cookies declined" };
    CommandResult::success_with(COMMAND, message, serde_json::to_value(&decision).ok())
}

pub fn status(context: &CommandContext) -> CommandResult {
    if let Err(error) = context.reset_stale_storage() {
        return CommandResult::from_error(COMMAND, error, &context.correlation_id);
    }

    let policy_version = context.config.session.consent_policy_version.as_str();
    let status = match consent::status(context.storage.as_ref(), Utc::now(), policy_version) {
        Ok(status) => status,
        Err(error) => return CommandResult::from_error(COMMAND, error, &context.correlation_id),
    };

    let (label, decision) = match &status {
        ConsentStatus::Undecided => ("undecided", None),
        ConsentStatus::Current(decision) => ("current", Some(decision)),
        ConsentStatus::Stale(decision) => ("stale", Some(decision)),
    };
    let message = if status.needs_prompt() {
        "consent banner must be shown"
    } else {
        "consent decision is current"
    };

    CommandResult::success_with(
        COMMAND,
        message,
        Some(json!({
            "status": label,
            "needs_prompt": status.needs_prompt(),
            "policy_version": policy_version,
            "decision": decision,
        })),
    )
}

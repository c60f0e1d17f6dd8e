use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use medportal_client::PortalClient;
use medportal_core::session::{LogoutReason, SessionAction, SessionOutcome, SessionState};
use serde_json::json;
use tracing::{info, warn};

use super::{block_on, runtime_failure, CommandResult, EXIT_SESSION};
use crate::context::{CliMonitor, CommandContext};

pub fn status(context: &CommandContext) -> CommandResult {
    const COMMAND: &str = "session.status";

    let now = Utc::now();
    let mut monitor = context.monitor();
    let outcome = match monitor.startup(now) {
        Ok(outcome) => outcome,
        Err(error) => return CommandResult::from_error(COMMAND, error, &context.correlation_id),
    };

    if !outcome.to.is_authenticated() {
        return CommandResult::failure(
            COMMAND,
            "session_expired",
            format!("not signed in ({})", ended_reason(&outcome)),
            EXIT_SESSION,
        );
    }

    let claims = monitor.claims().ok();
    let profile = monitor.profile().ok().flatten();
    let remaining_secs = claims.as_ref().map(|claims| claims.remaining_secs(now));
    let message = match &outcome.to {
        SessionState::WarningShown { remaining_secs } => {
            format!("session expires in {remaining_secs}s; run `medportal session renew`")
        }
        _ => "session is active".to_string(),
    };

    CommandResult::success_with(
        COMMAND,
        message,
        Some(json!({
            "state": outcome.to,
            "login": profile.map(|profile| profile.login),
            "subject": claims.as_ref().and_then(|claims| claims.subject().map(str::to_string)),
            "expires_at": claims.as_ref().and_then(|claims| claims.expires_at()),
            "remaining_secs": remaining_secs,
        })),
    )
}

pub fn renew(context: &CommandContext) -> CommandResult {
    const COMMAND: &str = "session.renew";

    let now = Utc::now();
    let mut monitor = context.monitor();
    if let Err(error) = monitor.startup(now) {
        return CommandResult::from_error(COMMAND, error, &context.correlation_id);
    }
    let portal = match context.portal() {
        Ok(portal) => portal,
        Err(error) => return CommandResult::from_error(COMMAND, error, &context.correlation_id),
    };

    let outcome = match block_on(monitor.renew(&portal, now)) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(error)) => return CommandResult::from_error(COMMAND, error, &context.correlation_id),
        Err(error) => return runtime_failure(COMMAND, error),
    };

    if !outcome.to.is_authenticated() {
        return CommandResult::failure(
            COMMAND,
            "session_expired",
            format!("renewal failed; session ended ({})", ended_reason(&outcome)),
            EXIT_SESSION,
        );
    }

    let expires_at = monitor.claims().ok().and_then(|claims| claims.expires_at());
    CommandResult::success_with(
        COMMAND,
        "session renewed",
        Some(json!({ "state": outcome.to, "expires_at": expires_at, "actions": outcome.actions })),
    )
}

pub fn logout(context: &CommandContext) -> CommandResult {
    const COMMAND: &str = "logout";

    let mut monitor = context.monitor();
    let was_signed_in = match monitor.startup(Utc::now()) {
        Ok(outcome) => outcome.to.is_authenticated(),
        Err(error) => return CommandResult::from_error(COMMAND, error, &context.correlation_id),
    };
    monitor.logout(LogoutReason::UserRequested);

    let message = if was_signed_in { "signed out" } else { "no active session; storage cleared" };
    CommandResult::success(COMMAND, message)
}

/// Drives the poll and countdown timers against the wall clock until the
/// session ends or `max_secs` elapses.
pub fn watch(context: &CommandContext, auto_renew: bool, max_secs: Option<u64>) -> CommandResult {
    const COMMAND: &str = "session.watch";

    let started = Utc::now();
    let mut monitor = context.monitor();
    let outcome = match monitor.startup(started) {
        Ok(outcome) => outcome,
        Err(error) => return CommandResult::from_error(COMMAND, error, &context.correlation_id),
    };
    if !outcome.to.is_authenticated() {
        return CommandResult::failure(
            COMMAND,
            "session_expired",
            format!("not signed in ({})", ended_reason(&outcome)),
            EXIT_SESSION,
        );
    }

    let renewer = if auto_renew {
        match context.portal() {
            Ok(portal) => Some(portal),
            Err(error) => {
                return CommandResult::from_error(COMMAND, error, &context.correlation_id)
            }
        }
    } else {
        None
    };

    let stop_at = max_secs.map(|secs| {
        started + Duration::seconds(i64::from(u32::try_from(secs).unwrap_or(u32::MAX)))
    });
    let mut actions = outcome.actions.clone();
    report(&outcome);

    let mut watcher = Watcher { monitor: &mut monitor, renewer: renewer.as_ref(), stop_at };
    let first_warning = outcome.actions.iter().find_map(warning_secs);
    let observed = block_on(async {
        let mut observed = Vec::new();
        if let Some(remaining_secs) = first_warning {
            observed.extend(watcher.auto_renew(remaining_secs).await);
        }
        observed.extend(watcher.run().await);
        observed
    });
    match observed {
        Ok(observed) => actions.extend(observed),
        Err(error) => return runtime_failure(COMMAND, error),
    }

    let state = monitor.state().clone();
    let data = Some(json!({ "state": state, "actions": actions }));
    if state.is_authenticated() {
        CommandResult::success_with(COMMAND, "watch finished; session still active", data)
    } else {
        CommandResult::failure(
            COMMAND,
            "session_expired",
            "session ended while watching",
            EXIT_SESSION,
        )
    }
}

struct Watcher<'a> {
    monitor: &'a mut CliMonitor,
    renewer: Option<&'a PortalClient>,
    stop_at: Option<chrono::DateTime<Utc>>,
}

impl Watcher<'_> {
    async fn run(&mut self) -> Vec<SessionAction> {
        let mut observed = Vec::new();

        while self.monitor.state().is_authenticated() {
            let Some(deadline) = self.monitor.scheduler().next_deadline() else {
                break;
            };
            if self.stop_at.is_some_and(|stop_at| deadline > stop_at) {
                break;
            }

            let wait = (deadline - Utc::now()).to_std().unwrap_or(StdDuration::ZERO);
            tokio::time::sleep(wait).await;

            let now = Utc::now();
            for timer in self.monitor.scheduler().due(now) {
                let outcome = self.monitor.on_timer(timer, now);
                report(&outcome);
                let warning = outcome.actions.iter().find_map(warning_secs);
                observed.extend(outcome.actions);
                if let Some(remaining_secs) = warning {
                    observed.extend(self.auto_renew(remaining_secs).await);
                }
            }
        }

        observed
    }

    async fn auto_renew(&mut self, remaining_secs: i64) -> Vec<SessionAction> {
        let Some(renewer) = self.renewer else {
            return Vec::new();
        };

        info!(event_name = "cli.session.auto_renew", remaining_secs, "renewing before expiry");
        match self.monitor.renew(renewer, Utc::now()).await {
            Ok(outcome) => {
                report(&outcome);
                outcome.actions
            }
            Err(error) => {
                warn!(
                    event_name = "cli.session.auto_renew_skipped",
                    error = %error,
                    "renewal skipped"
                );
                Vec::new()
            }
        }
    }
}

fn warning_secs(action: &SessionAction) -> Option<i64> {
    match action {
        SessionAction::ShowWarning { remaining_secs } => Some(*remaining_secs),
        _ => None,
    }
}

fn report(outcome: &SessionOutcome) {
    for action in &outcome.actions {
        match action {
            SessionAction::ShowWarning { remaining_secs } => {
                warn!(event_name = "cli.session.warning", remaining_secs, "session about to expire")
            }
            SessionAction::UpdateCountdown { remaining_secs } => {
                info!(event_name = "cli.session.countdown", remaining_secs, "countdown")
            }
            SessionAction::DismissWarning => {
                info!(event_name = "cli.session.warning_dismissed", "expiry warning dismissed")
            }
            SessionAction::RedirectToLogin { reason } => {
                warn!(event_name = "cli.session.ended", reason = reason.as_str(), "sign in again")
            }
        }
    }
}

fn ended_reason(outcome: &SessionOutcome) -> &'static str {
    outcome
        .actions
        .iter()
        .find_map(|action| match action {
            SessionAction::RedirectToLogin { reason } => Some(reason.as_str()),
            _ => None,
        })
        .unwrap_or(LogoutReason::MissingToken.as_str())
}

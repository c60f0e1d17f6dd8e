use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gateway::{GatewayError, TokenRenewer};
use crate::scheduler::{Scheduler, TimerId};
use crate::session::profile::UserProfile;
use crate::session::token::{self, TokenClaims, TokenError};
use crate::session::version::{self, CacheResetOutcome};
use crate::storage::{
    Storage, StorageError, AUTH_DATA_KEY, IS_AUTHENTICATED_KEY, SESSION_KEYS, TOKEN_KEY,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    pub warning_threshold: Duration,
    pub countdown_tick: Duration,
    pub app_version: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::seconds(10),
            warning_threshold: Duration::minutes(5),
            countdown_tick: Duration::seconds(1),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    WarningShown { remaining_secs: i64 },
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::Unauthenticated)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    UserRequested,
    MissingToken,
    InvalidToken,
    Expired,
    CountdownElapsed,
    RenewalFailed,
    Unauthorized,
    StorageUnavailable,
}

impl LogoutReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserRequested => "user_requested",
            Self::MissingToken => "missing_token",
            Self::InvalidToken => "invalid_token",
            Self::Expired => "expired",
            Self::CountdownElapsed => "countdown_elapsed",
            Self::RenewalFailed => "renewal_failed",
            Self::Unauthorized => "unauthorized",
            Self::StorageUnavailable => "storage_unavailable",
        }
    }
}

impl From<&TokenError> for LogoutReason {
    fn from(value: &TokenError) -> Self {
        match value {
            TokenError::Missing => Self::MissingToken,
            TokenError::Expired => Self::Expired,
            TokenError::Sentinel(_)
            | TokenError::Malformed
            | TokenError::Payload(_)
            | TokenError::MissingExpiry => Self::InvalidToken,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SessionAction {
    ShowWarning { remaining_secs: i64 },
    UpdateCountdown { remaining_secs: i64 },
    DismissWarning,
    RedirectToLogin { reason: LogoutReason },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub from: SessionState,
    pub to: SessionState,
    pub actions: Vec<SessionAction>,
}

impl SessionOutcome {
    fn unchanged(state: &SessionState) -> Self {
        Self { from: state.clone(), to: state.clone(), actions: Vec::new() }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("renewal is only offered while the expiry warning is shown (state: {state:?})")]
    RenewalNotOffered { state: SessionState },
    #[error(transparent)]
    InvalidToken(#[from] TokenError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Token captured when a renewal starts. Completing it after the session it
/// belongs to has ended is a no-op.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenewalTicket {
    generation: u64,
    token: Option<String>,
}

impl RenewalTicket {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Keeps the authenticated state consistent with the stored token and gives
/// the user a countdown window to renew before the session is ended.
pub struct SessionMonitor<S, C> {
    storage: S,
    scheduler: C,
    settings: SessionSettings,
    state: SessionState,
    generation: u64,
}

impl<S, C> SessionMonitor<S, C>
where
    S: Storage,
    C: Scheduler,
{
    pub fn new(storage: S, scheduler: C, settings: SessionSettings) -> Self {
        Self { storage, scheduler, settings, state: SessionState::Unauthenticated, generation: 0 }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn scheduler(&self) -> &C {
        &self.scheduler
    }

    /// Incremented each time an authenticated session ends.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn claims(&self) -> Result<TokenClaims, SessionError> {
        let raw = self.storage.get(TOKEN_KEY)?;
        Ok(token::decode(raw.as_deref())?)
    }

    /// Profile stored at login. A missing or unreadable record reads as `None`.
    pub fn profile(&self) -> Result<Option<UserProfile>, SessionError> {
        let raw = self.storage.get(AUTH_DATA_KEY)?;
        Ok(raw.and_then(|raw| serde_json::from_str(&raw).ok()))
    }

    /// Runs the version-gated cache reset and then derives the initial state
    /// from storage. A session flagged as authenticated that fails the first
    /// check ends with a redirect, like one that expires while running.
    pub fn startup(&mut self, now: DateTime<Utc>) -> Result<SessionOutcome, SessionError> {
        if let CacheResetOutcome::Reset { previous } =
            version::reset_on_version_change(&self.storage, &self.settings.app_version)?
        {
            debug!(
                event_name = "session.startup.cache_reset",
                previous_version = previous.as_deref().unwrap_or("none"),
                "storage reset before session check"
            );
        }

        if self.state == SessionState::Unauthenticated
            && self.storage.get(IS_AUTHENTICATED_KEY)?.as_deref() == Some("true")
        {
            self.state = SessionState::Authenticated;
        }

        Ok(self.check_token(now))
    }

    /// Persists a freshly issued token and profile, then starts monitoring.
    pub fn establish(
        &mut self,
        raw_token: &str,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> Result<SessionOutcome, SessionError> {
        let claims = token::decode(Some(raw_token))?;
        if claims.remaining_millis(now) <= 0 {
            return Err(SessionError::InvalidToken(TokenError::Expired));
        }

        let auth_data = serde_json::to_string(&profile.for_storage())
            .map_err(|error| SessionError::Storage(StorageError::Serialize(error)))?;
        self.storage.set(TOKEN_KEY, raw_token.trim())?;
        self.storage.set(IS_AUTHENTICATED_KEY, "true")?;
        self.storage.set(AUTH_DATA_KEY, &auth_data)?;
        info!(
            event_name = "session.established",
            login = profile.login.as_str(),
            expires_at = claims.exp,
            "session established"
        );

        Ok(self.check_token(now))
    }

    pub fn on_timer(&mut self, timer: TimerId, now: DateTime<Utc>) -> SessionOutcome {
        match timer {
            TimerId::TokenPoll => self.check_token(now),
            TimerId::Countdown => self.countdown_tick(),
        }
    }

    pub fn check_token(&mut self, now: DateTime<Utc>) -> SessionOutcome {
        let raw = match self.storage.get(TOKEN_KEY) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "session.check.storage_failed",
                    error = %error,
                    "token unreadable"
                );
                return self.logout(LogoutReason::StorageUnavailable);
            }
        };

        let claims = match token::decode(raw.as_deref()) {
            Ok(claims) => claims,
            Err(error) => {
                if self.state.is_authenticated() {
                    warn!(
                        event_name = "session.check.invalid_token",
                        error = %error,
                        "token rejected"
                    );
                }
                return self.logout(LogoutReason::from(&error));
            }
        };

        let remaining_ms = claims.remaining_millis(now);
        if remaining_ms <= 0 {
            return self.logout(LogoutReason::Expired);
        }

        let remaining_secs = remaining_ms.saturating_add(999) / 1000;
        let from = self.state.clone();
        let mut actions = Vec::new();

        if !self.scheduler.is_running(TimerId::TokenPoll) {
            self.scheduler.start(TimerId::TokenPoll, self.settings.poll_interval, now);
        }

        if remaining_secs <= self.settings.warning_threshold.num_seconds() {
            if matches!(from, SessionState::WarningShown { .. }) {
                actions.push(SessionAction::UpdateCountdown { remaining_secs });
            } else {
                self.scheduler.start(TimerId::Countdown, self.settings.countdown_tick, now);
                actions.push(SessionAction::ShowWarning { remaining_secs });
                info!(
                    event_name = "session.warning.shown",
                    remaining_secs,
                    "session is about to expire"
                );
            }
            self.state = SessionState::WarningShown { remaining_secs };
        } else {
            if matches!(from, SessionState::WarningShown { .. }) {
                self.scheduler.stop(TimerId::Countdown);
                actions.push(SessionAction::DismissWarning);
            }
            self.state = SessionState::Authenticated;
        }

        SessionOutcome { from, to: self.state.clone(), actions }
    }

    pub fn countdown_tick(&mut self) -> SessionOutcome {
        let SessionState::WarningShown { remaining_secs } = self.state else {
            self.scheduler.stop(TimerId::Countdown);
            return SessionOutcome::unchanged(&self.state);
        };

        let remaining_secs = remaining_secs - self.settings.countdown_tick.num_seconds().max(1);
        if remaining_secs <= 0 {
            return self.logout(LogoutReason::CountdownElapsed);
        }

        let from = self.state.clone();
        self.state = SessionState::WarningShown { remaining_secs };
        SessionOutcome {
            from,
            to: self.state.clone(),
            actions: vec![SessionAction::UpdateCountdown { remaining_secs }],
        }
    }

    pub fn begin_renewal(&self) -> Result<RenewalTicket, SessionError> {
        if !matches!(self.state, SessionState::WarningShown { .. }) {
            return Err(SessionError::RenewalNotOffered { state: self.state.clone() });
        }

        let token = self.storage.get(TOKEN_KEY)?;
        Ok(RenewalTicket { generation: self.generation, token })
    }

    pub fn complete_renewal(
        &mut self,
        ticket: RenewalTicket,
        result: Result<String, GatewayError>,
        now: DateTime<Utc>,
    ) -> SessionOutcome {
        if ticket.generation != self.generation || !self.state.is_authenticated() {
            debug!(
                event_name = "session.renewal.stale_result",
                ticket_generation = ticket.generation,
                generation = self.generation,
                "renewal finished after the session ended; result ignored"
            );
            return SessionOutcome::unchanged(&self.state);
        }

        let renewed = match result {
            Ok(renewed) if token::is_valid(Some(&renewed), now) => renewed,
            Ok(_) => {
                warn!(event_name = "session.renewal.invalid_token", "renewed token is unusable");
                return self.logout(LogoutReason::RenewalFailed);
            }
            Err(error) => {
                warn!(
                    event_name = "session.renewal.failed",
                    error = %error,
                    "token renewal failed"
                );
                return self.logout(LogoutReason::RenewalFailed);
            }
        };

        if let Err(error) = self.storage.set(TOKEN_KEY, renewed.trim()) {
            warn!(
                event_name = "session.renewal.storage_failed",
                error = %error,
                "token not stored"
            );
            return self.logout(LogoutReason::StorageUnavailable);
        }

        let from = self.state.clone();
        self.scheduler.stop(TimerId::Countdown);
        self.scheduler.reschedule(TimerId::TokenPoll, self.settings.poll_interval, now);
        self.state = SessionState::Authenticated;
        info!(event_name = "session.renewal.succeeded", "session token renewed");

        SessionOutcome {
            from,
            to: self.state.clone(),
            actions: vec![SessionAction::DismissWarning],
        }
    }

    pub async fn renew<R>(
        &mut self,
        renewer: &R,
        now: DateTime<Utc>,
    ) -> Result<SessionOutcome, SessionError>
    where
        R: TokenRenewer + ?Sized,
    {
        let ticket = self.begin_renewal()?;
        let result = match ticket.token() {
            Some(current) => renewer.renew(current).await,
            None => Err(GatewayError::MissingToken),
        };

        Ok(self.complete_renewal(ticket, result, now))
    }

    /// Clears the session keys and both timers. Calling it again from
    /// `Unauthenticated` changes nothing further.
    pub fn logout(&mut self, reason: LogoutReason) -> SessionOutcome {
        for key in SESSION_KEYS {
            if let Err(error) = self.storage.remove(key) {
                warn!(
                    event_name = "session.logout.storage_failed",
                    key,
                    error = %error,
                    "session key could not be removed"
                );
            }
        }
        self.scheduler.stop_all();

        let from = std::mem::replace(&mut self.state, SessionState::Unauthenticated);
        let mut actions = Vec::new();
        if matches!(from, SessionState::WarningShown { .. }) {
            actions.push(SessionAction::DismissWarning);
        }
        if from.is_authenticated() {
            self.generation += 1;
            actions.push(SessionAction::RedirectToLogin { reason });
            info!(event_name = "session.logout", reason = reason.as_str(), "session ended");
        }

        SessionOutcome { from, to: SessionState::Unauthenticated, actions }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    use crate::gateway::{GatewayError, TokenRenewer};
    use crate::scheduler::{Scheduler, TimerId, TimerTable};
    use crate::session::profile::UserProfile;
    use crate::session::token::encode_unsigned;
    use crate::storage::{
        InMemoryStorage, Storage, APP_VERSION_KEY, AUTH_DATA_KEY, COOKIE_CONSENT_KEY,
        IS_AUTHENTICATED_KEY, TOKEN_KEY,
    };

    use super::{
        LogoutReason, SessionAction, SessionError, SessionMonitor, SessionSettings, SessionState,
    };

    const VERSION: &str = "3.1.0";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 14, 0, 0).unwrap()
    }

    fn token_expiring_at(at: DateTime<Utc>) -> String {
        encode_unsigned(&json!({ "exp": at.timestamp(), "sub": "rep-9" }))
    }

    fn settings() -> SessionSettings {
        SessionSettings { app_version: VERSION.to_string(), ..SessionSettings::default() }
    }

    fn monitor_with(
        entries: Vec<(&str, String)>,
    ) -> (SessionMonitor<InMemoryStorage, TimerTable>, InMemoryStorage, TimerTable) {
        let storage = InMemoryStorage::with_entries(entries);
        let timers = TimerTable::default();
        let monitor = SessionMonitor::new(storage.clone(), timers.clone(), settings());
        (monitor, storage, timers)
    }

    fn signed_in(
        expires_in: Duration,
    ) -> (SessionMonitor<InMemoryStorage, TimerTable>, InMemoryStorage, TimerTable) {
        monitor_with(vec![
            (APP_VERSION_KEY, VERSION.to_string()),
            (TOKEN_KEY, token_expiring_at(start() + expires_in)),
            (IS_AUTHENTICATED_KEY, "true".to_string()),
            (AUTH_DATA_KEY, r#"{"login":"rep9"}"#.to_string()),
        ])
    }

    /// Advances virtual time second by second, delivering due timers.
    fn advance(
        monitor: &mut SessionMonitor<InMemoryStorage, TimerTable>,
        timers: &TimerTable,
        from: DateTime<Utc>,
        secs: i64,
    ) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        for offset in 1..=secs {
            let now = from + Duration::seconds(offset);
            for timer in timers.due(now) {
                actions.extend(monitor.on_timer(timer, now).actions);
            }
        }
        actions
    }

    struct FixedRenewer(Result<String, GatewayError>);

    #[async_trait]
    impl TokenRenewer for FixedRenewer {
        async fn renew(&self, current_token: &str) -> Result<String, GatewayError> {
            assert!(!current_token.is_empty());
            self.0.clone()
        }
    }

    #[test]
    fn startup_with_long_lived_token_starts_polling() {
        let (mut monitor, _, timers) = signed_in(Duration::hours(2));

        let outcome = monitor.startup(start()).expect("startup");

        assert_eq!(outcome.to, SessionState::Authenticated);
        assert!(outcome.actions.is_empty());
        assert!(timers.is_running(TimerId::TokenPoll));
        assert!(!timers.is_running(TimerId::Countdown));
    }

    #[test]
    fn token_renewed_elsewhere_dismisses_the_warning() {
        let (mut monitor, storage, timers) = signed_in(Duration::seconds(200));
        monitor.startup(start()).expect("startup");
        assert!(timers.is_running(TimerId::Countdown));

        storage.set(TOKEN_KEY, &token_expiring_at(start() + Duration::hours(1))).expect("set");
        let outcome = monitor.check_token(start() + Duration::seconds(10));

        assert_eq!(outcome.to, SessionState::Authenticated);
        assert_eq!(outcome.actions, vec![SessionAction::DismissWarning]);
        assert!(!timers.is_running(TimerId::Countdown));
        assert!(timers.is_running(TimerId::TokenPoll));
    }

    #[test]
    fn poll_during_warning_resynchronises_remaining_time() {
        let (mut monitor, _, _) = signed_in(Duration::seconds(200));
        monitor.startup(start()).expect("startup");

        let outcome = monitor.check_token(start() + Duration::seconds(10));

        assert_eq!(outcome.to, SessionState::WarningShown { remaining_secs: 190 });
        assert_eq!(outcome.actions, vec![SessionAction::UpdateCountdown { remaining_secs: 190 }]);
    }

    #[test]
    fn token_with_two_minutes_left_warns_on_first_poll_cycle() {
        let (mut monitor, _, timers) = monitor_with(vec![(APP_VERSION_KEY, VERSION.to_string())]);
        monitor
            .storage()
            .set(TOKEN_KEY, &token_expiring_at(start() + Duration::seconds(130)))
            .expect("set");
        timers.clone().start(TimerId::TokenPoll, Duration::seconds(10), start());

        let actions = advance(&mut monitor, &timers, start(), 10);

        assert_eq!(actions, vec![SessionAction::ShowWarning { remaining_secs: 120 }]);
        assert_eq!(monitor.state(), &SessionState::WarningShown { remaining_secs: 120 });
    }

    #[test]
    fn expired_token_logs_out_without_warning() {
        let (mut monitor, storage, timers) = signed_in(Duration::seconds(-1));

        let outcome = monitor.startup(start()).expect("startup");

        assert_eq!(outcome.to, SessionState::Unauthenticated);
        assert!(!outcome
            .actions
            .iter()
            .any(|action| matches!(action, SessionAction::ShowWarning { .. })));
        assert_eq!(storage.get(TOKEN_KEY).expect("get"), None);
        assert!(timers.active().is_empty());
    }

    #[test]
    fn session_expired_before_startup_redirects_with_reason() {
        let (mut monitor, _, _) = signed_in(Duration::seconds(-30));

        let outcome = monitor.startup(start()).expect("startup");

        assert_eq!(outcome.from, SessionState::Authenticated);
        assert_eq!(
            outcome.actions,
            vec![SessionAction::RedirectToLogin { reason: LogoutReason::Expired }]
        );
        assert_eq!(monitor.generation(), 1);
    }

    #[test]
    fn extreme_expiry_claims_fail_closed_or_saturate() {
        for exp in [json!(i64::MIN), json!(-1e30)] {
            let (mut monitor, storage, timers) = monitor_with(vec![
                (APP_VERSION_KEY, VERSION.to_string()),
                (TOKEN_KEY, encode_unsigned(&json!({ "exp": exp }))),
                (IS_AUTHENTICATED_KEY, "true".to_string()),
            ]);

            let outcome = monitor.startup(start()).expect("startup");

            assert_eq!(outcome.to, SessionState::Unauthenticated);
            assert_eq!(
                outcome.actions,
                vec![SessionAction::RedirectToLogin { reason: LogoutReason::Expired }]
            );
            assert_eq!(storage.get(TOKEN_KEY).expect("get"), None);
            assert!(timers.active().is_empty());
        }

        let (mut monitor, _, _) = monitor_with(vec![
            (APP_VERSION_KEY, VERSION.to_string()),
            (TOKEN_KEY, encode_unsigned(&json!({ "exp": i64::MAX }))),
            (IS_AUTHENTICATED_KEY, "true".to_string()),
        ]);
        let outcome = monitor.startup(start()).expect("startup");
        assert_eq!(outcome.to, SessionState::Authenticated);
    }

    #[test]
    fn token_without_authenticated_flag_starts_silently() {
        let (mut monitor, _, _) = monitor_with(vec![(APP_VERSION_KEY, VERSION.to_string())]);

        let outcome = monitor.startup(start()).expect("startup");

        assert_eq!(outcome.to, SessionState::Unauthenticated);
        assert!(outcome.actions.is_empty());
        assert_eq!(monitor.generation(), 0);
    }

    #[test]
    fn expiry_while_authenticated_redirects_to_login() {
        let (mut monitor, _, timers) = signed_in(Duration::hours(1));
        monitor.startup(start()).expect("startup");

        monitor.storage().set(TOKEN_KEY, &token_expiring_at(start())).expect("set");
        let actions = advance(&mut monitor, &timers, start(), 10);

        assert_eq!(
            actions,
            vec![SessionAction::RedirectToLogin { reason: LogoutReason::Expired }]
        );
        assert_eq!(monitor.state(), &SessionState::Unauthenticated);
    }

    #[test]
    fn sentinel_and_garbage_tokens_fail_closed() {
        for raw in ["undefined", "null", "not-a-token"] {
            let (mut monitor, storage, _) = monitor_with(vec![
                (APP_VERSION_KEY, VERSION.to_string()),
                (TOKEN_KEY, raw.to_string()),
                (IS_AUTHENTICATED_KEY, "true".to_string()),
            ]);

            let outcome = monitor.startup(start()).expect("startup");

            assert_eq!(outcome.to, SessionState::Unauthenticated);
            assert!(storage.snapshot().get(IS_AUTHENTICATED_KEY).is_none());
        }
    }

    #[test]
    fn countdown_runs_every_second_and_ends_the_session() {
        let (mut monitor, storage, timers) = signed_in(Duration::seconds(4));
        let outcome = monitor.startup(start()).expect("startup");
        assert_eq!(outcome.actions, vec![SessionAction::ShowWarning { remaining_secs: 4 }]);

        let actions = advance(&mut monitor, &timers, start(), 4);

        assert_eq!(
            actions,
            vec![
                SessionAction::UpdateCountdown { remaining_secs: 3 },
                SessionAction::UpdateCountdown { remaining_secs: 2 },
                SessionAction::UpdateCountdown { remaining_secs: 1 },
                SessionAction::DismissWarning,
                SessionAction::RedirectToLogin { reason: LogoutReason::CountdownElapsed },
            ]
        );
        assert!(timers.active().is_empty());
        assert_eq!(storage.get(TOKEN_KEY).expect("get"), None);
    }

    #[test]
    fn logout_is_idempotent() {
        let (mut monitor, storage, timers) = signed_in(Duration::seconds(90));
        monitor.startup(start()).expect("startup");
        storage.set(COOKIE_CONSENT_KEY, "{}").expect("set");

        let first = monitor.logout(LogoutReason::UserRequested);
        let after_first = (storage.snapshot(), timers.active(), monitor.generation());
        let second = monitor.logout(LogoutReason::UserRequested);
        let after_second = (storage.snapshot(), timers.active(), monitor.generation());

        assert_eq!(
            first.actions,
            vec![
                SessionAction::DismissWarning,
                SessionAction::RedirectToLogin { reason: LogoutReason::UserRequested },
            ]
        );
        assert!(second.actions.is_empty());
        assert_eq!(after_first, after_second);
        assert!(after_first.1.is_empty());
        assert!(after_first.0.contains_key(COOKIE_CONSENT_KEY));
        assert!(after_first.0.contains_key(APP_VERSION_KEY));
        assert!(!after_first.0.contains_key(TOKEN_KEY));
        assert!(!after_first.0.contains_key(AUTH_DATA_KEY));
    }

    #[test]
    fn version_change_wipes_valid_session_before_check() {
        let (mut monitor, storage, timers) = monitor_with(vec![
            (APP_VERSION_KEY, "3.0.9".to_string()),
            (TOKEN_KEY, token_expiring_at(start() + Duration::hours(8))),
            (IS_AUTHENTICATED_KEY, "true".to_string()),
        ]);

        let outcome = monitor.startup(start()).expect("startup");

        assert_eq!(outcome.to, SessionState::Unauthenticated);
        let snapshot = storage.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(APP_VERSION_KEY).map(String::as_str), Some(VERSION));
        assert!(timers.active().is_empty());
    }

    #[test]
    fn establish_persists_session_and_profile() {
        let (mut monitor, storage, timers) =
            monitor_with(vec![(APP_VERSION_KEY, VERSION.to_string())]);
        let profile = UserProfile {
            login: "rep9".to_string(),
            email: "rep9@example.com".to_string(),
            token: Some("echo".to_string()),
            ..UserProfile::default()
        };

        let outcome = monitor
            .establish(&token_expiring_at(start() + Duration::hours(1)), &profile, start())
            .expect("establish");

        assert_eq!(outcome.to, SessionState::Authenticated);
        assert_eq!(storage.get(IS_AUTHENTICATED_KEY).expect("get").as_deref(), Some("true"));
        let stored = monitor.profile().expect("profile").expect("stored profile");
        assert_eq!(stored.login, "rep9");
        assert_eq!(stored.token, None);
        assert!(timers.is_running(TimerId::TokenPoll));
    }

    #[test]
    fn establish_rejects_undecodable_token() {
        let (mut monitor, storage, _) = monitor_with(vec![]);

        let error = monitor
            .establish("null", &UserProfile::default(), start())
            .expect_err("sentinel token must be rejected");

        assert!(matches!(error, SessionError::InvalidToken(_)));
        assert_eq!(storage.get(TOKEN_KEY).expect("get"), None);
    }

    #[tokio::test]
    async fn successful_renewal_returns_to_monitoring() {
        let (mut monitor, storage, timers) = signed_in(Duration::seconds(60));
        monitor.startup(start()).expect("startup");
        let fresh = token_expiring_at(start() + Duration::hours(1));

        let outcome = monitor
            .renew(&FixedRenewer(Ok(fresh.clone())), start() + Duration::seconds(3))
            .await
            .expect("renewal offered");

        assert_eq!(outcome.to, SessionState::Authenticated);
        assert_eq!(outcome.actions, vec![SessionAction::DismissWarning]);
        assert_eq!(storage.get(TOKEN_KEY).expect("get"), Some(fresh));
        assert!(timers.is_running(TimerId::TokenPoll));
        assert!(!timers.is_running(TimerId::Countdown));
        assert_eq!(timers.next_deadline(), Some(start() + Duration::seconds(13)));
    }

    #[tokio::test]
    async fn failed_renewal_forces_logout() {
        for result in [
            Err(GatewayError::Server { status: 502 }),
            Err(GatewayError::MissingToken),
            Ok(String::new()),
        ] {
            let (mut monitor, storage, timers) = signed_in(Duration::seconds(60));
            monitor.startup(start()).expect("startup");

            let outcome =
                monitor.renew(&FixedRenewer(result), start()).await.expect("renewal offered");

            assert_eq!(outcome.to, SessionState::Unauthenticated);
            assert!(outcome
                .actions
                .contains(&SessionAction::RedirectToLogin { reason: LogoutReason::RenewalFailed }));
            assert_eq!(storage.get(TOKEN_KEY).expect("get"), None);
            assert!(timers.active().is_empty());
        }
    }

    #[test]
    fn renewal_is_not_offered_outside_the_warning() {
        let (mut monitor, _, _) = signed_in(Duration::hours(1));
        monitor.startup(start()).expect("startup");

        let error = monitor.begin_renewal().expect_err("no warning shown");
        assert!(matches!(error, SessionError::RenewalNotOffered { .. }));
    }

    #[test]
    fn renewal_finishing_after_logout_is_ignored() {
        let (mut monitor, storage, timers) = signed_in(Duration::seconds(60));
        monitor.startup(start()).expect("startup");

        let ticket = monitor.begin_renewal().expect("renewal offered");
        monitor.logout(LogoutReason::UserRequested);
        let outcome = monitor.complete_renewal(
            ticket,
            Ok(token_expiring_at(start() + Duration::hours(1))),
            start(),
        );

        assert_eq!(outcome.to, SessionState::Unauthenticated);
        assert!(outcome.actions.is_empty());
        assert_eq!(storage.get(TOKEN_KEY).expect("get"), None);
        assert!(timers.active().is_empty());
    }
}

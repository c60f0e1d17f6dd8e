use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Storage, StorageError, COOKIE_CONSENT_KEY};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentDecision {
    pub accepted: bool,
    pub decided_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub policy_version: String,
}

impl ConsentDecision {
    pub fn new(
        accepted: bool,
        now: DateTime<Utc>,
        validity: Duration,
        policy_version: impl Into<String>,
    ) -> Self {
        Self {
            accepted,
            decided_at: now,
            expires_at: now.checked_add_signed(validity).unwrap_or(DateTime::<Utc>::MAX_UTC),
            policy_version: policy_version.into(),
        }
    }

    pub fn is_current(&self, now: DateTime<Utc>, policy_version: &str) -> bool {
        self.expires_at > now && self.policy_version == policy_version
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsentStatus {
    Undecided,
    Current(ConsentDecision),
    Stale(ConsentDecision),
}

impl ConsentStatus {
    pub fn needs_prompt(&self) -> bool {
        !matches!(self, Self::Current(_))
    }
}

pub fn record<S>(storage: &S, decision: &ConsentDecision) -> Result<(), StorageError>
where
    S: Storage + ?Sized,
{
    let raw = serde_json::to_string(decision).map_err(StorageError::Serialize)?;
    storage.set(COOKIE_CONSENT_KEY, &raw)
}

/// Unreadable records count as undecided so the user is asked again.
pub fn status<S>(
    storage: &S,
    now: DateTime<Utc>,
    policy_version: &str,
) -> Result<ConsentStatus, StorageError>
where
    S: Storage + ?Sized,
{
    let Some(raw) = storage.get(COOKIE_CONSENT_KEY)? else {
        return Ok(ConsentStatus::Undecided);
    };

    Ok(match serde_json::from_str::<ConsentDecision>(&raw) {
        Ok(decision) if decision.is_current(now, policy_version) => {
            ConsentStatus::Current(decision)
        }
        Ok(decision) => ConsentStatus::Stale(decision),
        Err(_) => ConsentStatus::Undecided,
    })
}

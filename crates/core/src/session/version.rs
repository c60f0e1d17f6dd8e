use tracing::info;

use crate::storage::{Storage, StorageError, APP_VERSION_KEY};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheResetOutcome {
    Unchanged,
    /// Storage was wiped. `previous` is the marker found before the wipe.
    Reset { previous: Option<String> },
}

/// Wipes every stored key, valid sessions included, whenever the stored
/// version marker differs from `running_version`, then writes the new marker.
pub fn reset_on_version_change<S>(
    storage: &S,
    running_version: &str,
) -> Result<CacheResetOutcome, StorageError>
where
    S: Storage + ?Sized,
{
    let stored = storage.get(APP_VERSION_KEY)?;
    if stored.as_deref() == Some(running_version) {
        return Ok(CacheResetOutcome::Unchanged);
    }

    storage.clear()?;
    storage.set(APP_VERSION_KEY, running_version)?;
    info!(
        event_name = "session.cache.version_reset",
        previous_version = stored.as_deref().unwrap_or("none"),
        running_version,
        "app version changed; persisted storage cleared"
    );

    Ok(CacheResetOutcome::Reset { previous: stored })
}

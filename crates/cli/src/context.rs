use std::sync::Arc;

use medportal_client::PortalClient;
use medportal_core::config::{AppConfig, ConfigError, LogFormat};
use medportal_core::gateway::GatewayError;
use medportal_core::scheduler::TimerTable;
use medportal_core::session::version::{reset_on_version_change, CacheResetOutcome};
use medportal_core::session::SessionMonitor;
use medportal_core::storage::{FileStorage, StorageError};
use uuid::Uuid;

use crate::GlobalArgs;

pub type CliMonitor = SessionMonitor<Arc<FileStorage>, TimerTable>;

/// Everything one command invocation needs: the validated config, the
/// on-disk store and an id tying its log lines together.
#[derive(Debug)]
pub struct CommandContext {
    pub config: AppConfig,
    pub storage: Arc<FileStorage>,
    pub correlation_id: String,
}

impl CommandContext {
    pub fn load(global: &GlobalArgs) -> Result<Self, ConfigError> {
        let config = AppConfig::load(global.load_options())?;
        let storage = Arc::new(FileStorage::new(config.storage.path.clone()));
        Ok(Self { config, storage, correlation_id: Uuid::new_v4().to_string() })
    }

    /// Logs go to stderr so stdout stays a single JSON outcome.
    pub fn init_logging(&self) {
        use tracing::Level;

        let level = self.config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
        let builder = tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(level)
            .with_writer(std::io::stderr);

        // A second command in the same process keeps the first subscriber.
        let _ = match self.config.logging.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
    }

    pub fn monitor(&self) -> CliMonitor {
        SessionMonitor::new(
            Arc::clone(&self.storage),
            TimerTable::default(),
            self.config.session_settings(),
        )
    }

    pub fn portal(&self) -> Result<PortalClient, GatewayError> {
        PortalClient::new(&self.config.backend)
    }

    /// Applies the version-gated wipe for commands that touch storage
    /// without going through the session monitor.
    pub fn reset_stale_storage(&self) -> Result<CacheResetOutcome, StorageError> {
        reset_on_version_change(self.storage.as_ref(), &self.config.session_settings().app_version)
    }
}

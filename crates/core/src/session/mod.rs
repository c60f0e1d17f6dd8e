pub mod consent;
pub mod monitor;
pub mod profile;
pub mod token;
pub mod version;

pub use consent::{ConsentDecision, ConsentStatus};
pub use monitor::{
    LogoutReason, RenewalTicket, SessionAction, SessionError, SessionMonitor, SessionOutcome,
    SessionSettings, SessionState,
};
pub use profile::UserProfile;
pub use token::{TokenClaims, TokenError};
pub use version::CacheResetOutcome;

pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod gateway;
pub mod scheduler;
pub mod session;
pub mod storage;

pub use domain::quotation::{CatalogItem, DocumentLine, LineField, LineRules, Quotation};
pub use domain::summary::{DocStatus, QuotationSummary};
pub use domain::usage::compute_usage;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::payload::{build_payload, PayloadDefaults, QuotationPayload};
pub use flows::wizard::{QuotationWizard, WizardStep, WizardTransitionError};
pub use gateway::{GatewayError, QuotationGateway, SavedQuotation, TokenRenewer};
pub use scheduler::{Scheduler, TimerId, TimerTable};
pub use session::monitor::{SessionMonitor, SessionOutcome, SessionSettings, SessionState};
pub use storage::{FileStorage, InMemoryStorage, Storage, StorageError};
